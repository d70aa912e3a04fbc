//! # Client Lifecycle Flows
//!
//! The registry manager listens to the batch client: requests queue while
//! the node is unreachable and start once `on_connected` fires. The
//! wallet-facing `TokenIdentityCache` sits on top.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use bcmr_authchain::testing::ChainFixture;
    use electrum_batch_client::{ConnectionListener, Transport};
    use token_registry::{
        RecordingListener, RequestStatus, TokenIdentityCache, TokenIdentityLoader,
    };

    use crate::integration::fixtures::{document, extend, genesis, pointer, stack, Stack};

    const URL: &str = "https://registry.example/token.json";

    /// Stack with a one-pointer token; returns the token id.
    fn token_stack() -> (Stack, String) {
        let mut fixture = ChainFixture::new();
        let (genesis, token_id) = genesis(&mut fixture);
        let doc = document(&token_id, "Lifecycle Token");
        extend(&mut fixture, &genesis, Some(&pointer(URL, &doc)), 101);
        let s = stack(&fixture);
        s.fetcher.serve(URL, doc);
        (s, token_id)
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn test_requests_wait_for_connection() {
        let (s, token_id) = token_stack();
        let manager: Arc<dyn ConnectionListener> = Arc::new(s.manager.clone());
        s.client.add_listener(manager);

        let listener = RecordingListener::new();
        s.manager.request_identity(&token_id, listener.clone());
        settle().await;
        assert_eq!(s.manager.pending_count(), 1);
        assert_eq!(s.fetcher.calls(), 0);

        s.client.init().await.unwrap();
        let log = tokio::time::timeout(Duration::from_secs(5), listener.wait())
            .await
            .unwrap();
        assert_eq!(
            log.statuses,
            vec![
                Some(RequestStatus::Pending),
                Some(RequestStatus::Loading),
                None
            ]
        );
        let identity = log.resolved[0].clone().unwrap();
        assert_eq!(identity.name, "Lifecycle Token");
        assert_eq!(s.manager.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_disconnect_holds_new_requests() {
        let (s, token_id) = token_stack();
        s.client.add_listener(Arc::new(s.manager.clone()));
        s.client.init().await.unwrap();
        settle().await;

        s.transport.drop_connection();
        settle().await;
        let listener = RecordingListener::new();
        s.manager.request_identity(&token_id, listener.clone());
        settle().await;
        assert_eq!(s.manager.pending_count(), 1);
        assert_eq!(s.manager.running_count(), 0);

        s.transport.connect().await.unwrap();
        let log = tokio::time::timeout(Duration::from_secs(5), listener.wait())
            .await
            .unwrap();
        assert_eq!(log.resolved.len(), 1);
        assert!(log.rejected.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_requests_share_one_download() {
        let (s, token_id) = token_stack();
        s.fetcher.set_delay(Duration::from_millis(100));
        s.manager.on_client_connected();

        let first = RecordingListener::new();
        let second = RecordingListener::new();
        s.manager.request_identity(&token_id, first.clone());
        s.manager.request_identity(&token_id, second.clone());

        let timeout = Duration::from_secs(5);
        let first = tokio::time::timeout(timeout, first.wait()).await.unwrap();
        let second = tokio::time::timeout(timeout, second.wait()).await.unwrap();
        assert_eq!(first.resolved, second.resolved);
        assert!(first.resolved[0].is_some());
        assert_eq!(s.fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_identity_cache_fills_from_registry() {
        let (s, token_id) = token_stack();
        s.manager.on_client_connected();
        let cache = TokenIdentityCache::new(Arc::new(s.manager.clone()), Duration::from_secs(3600));

        let first = cache.get(&token_id);
        assert!(first.value.is_none());
        assert!(first.loader_state.unwrap().request_status.is_some());

        let mut resolved = None;
        for _ in 0..100 {
            let entry = cache.get(&token_id);
            if entry.value.is_some() {
                resolved = Some(entry);
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        let entry = resolved.unwrap();
        assert_eq!(entry.value.unwrap().name, "Lifecycle Token");
        let state = entry.loader_state.unwrap();
        assert!(state.request_status.is_none());
        assert!(state.load_error.is_none());
        assert!(!state.has_no_record);
        assert_eq!(s.fetcher.calls(), 1);

        let native = cache.get("BCH");
        assert!(native.value.unwrap().is_native_token);
    }
}
