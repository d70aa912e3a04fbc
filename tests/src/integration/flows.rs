//! # Token Identity Flows
//!
//! A token id goes in, an identity comes out:
//!
//! ```text
//! [TokenRegistryManager] ──fetch_auth_chain──→ [AuthChainResolver]
//!         │                                          │
//!         │                              transaction.get / get_history
//!         │                                          ↓
//!         │                                   [BatchClient] → [MockTransport]
//!         ↓
//! [ContentFetcher] ──document──→ sha256 check → snapshot → TokenIdentity
//! ```

#[cfg(test)]
mod tests {
    use bcmr_authchain::testing::ChainFixture;
    use chrono::{TimeZone, Utc};
    use shared_types::ErrorKind;
    use token_registry::RegistryError;

    use crate::integration::fixtures::{document, extend, genesis, pointer, stack};

    const URL_A: &str = "https://registry.example/a.json";
    const URL_B: &str = "https://registry.example/b.json";

    #[tokio::test]
    async fn test_identity_from_newest_pointer() {
        let mut fixture = ChainFixture::new();
        let (genesis, token_id) = genesis(&mut fixture);
        let doc_a = document(&token_id, "Old Name");
        let doc_b = document(&token_id, "New Name");
        let link = extend(&mut fixture, &genesis, Some(&pointer(URL_A, &doc_a)), 101);
        let link = extend(&mut fixture, &link, None, 102);
        extend(&mut fixture, &link, Some(&pointer(URL_B, &doc_b)), 103);

        let s = stack(&fixture);
        s.fetcher.serve(URL_A, doc_a);
        s.fetcher.serve(URL_B, doc_b);
        s.manager.on_client_connected();

        let identity = s
            .manager
            .fetch_token_identity(&token_id, Utc::now())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(identity.name, "New Name");
        assert_eq!(identity.description.as_deref(), Some("New Name description"));
        assert_eq!(identity.symbol_text, "TKN");
        assert_eq!(identity.decimals, Some(2));
        assert_eq!(
            identity.icon_url.as_deref(),
            Some("https://ipfs.io/ipfs/cid/icon.svg")
        );
        assert!(!identity.is_native_token);
        assert_eq!(s.fetcher.requests(), vec![URL_B.to_string()]);
    }

    #[tokio::test]
    async fn test_tampered_newest_document_falls_back() {
        let mut fixture = ChainFixture::new();
        let (genesis, token_id) = genesis(&mut fixture);
        let doc_a = document(&token_id, "Old Name");
        let doc_b = document(&token_id, "New Name");
        let link = extend(&mut fixture, &genesis, Some(&pointer(URL_A, &doc_a)), 101);
        extend(&mut fixture, &link, Some(&pointer(URL_B, &doc_b)), 102);

        let s = stack(&fixture);
        s.fetcher.serve(URL_A, doc_a);
        s.fetcher.serve(URL_B, document(&token_id, "Impostor"));
        s.manager.on_client_connected();

        let identity = s
            .manager
            .fetch_token_identity(&token_id, Utc::now())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(identity.name, "Old Name");
        assert_eq!(
            s.fetcher.requests(),
            vec![URL_B.to_string(), URL_A.to_string()]
        );
    }

    #[tokio::test]
    async fn test_chain_without_pointers_has_no_record() {
        let mut fixture = ChainFixture::new();
        let (genesis, token_id) = genesis(&mut fixture);
        extend(&mut fixture, &genesis, None, 101);

        let s = stack(&fixture);
        s.manager.on_client_connected();

        let identity = s
            .manager
            .fetch_token_identity(&token_id, Utc::now())
            .await
            .unwrap();
        assert!(identity.is_none());
        assert_eq!(s.fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn test_snapshot_in_the_future_is_not_current() {
        let mut fixture = ChainFixture::new();
        let (genesis, token_id) = genesis(&mut fixture);
        let doc = document(&token_id, "Name");
        extend(&mut fixture, &genesis, Some(&pointer(URL_A, &doc)), 101);

        let s = stack(&fixture);
        s.fetcher.serve(URL_A, doc);
        s.manager.on_client_connected();

        let before_snapshot = Utc.with_ymd_and_hms(2022, 6, 1, 0, 0, 0).unwrap();
        let err = s
            .manager
            .fetch_token_identity(&token_id, before_snapshot)
            .await
            .unwrap_err();
        assert_eq!(err, RegistryError::NoCurrentIdentity);
        assert_eq!(err.kind(), ErrorKind::Data);
    }

    #[tokio::test]
    async fn test_second_lookup_uses_cached_document() {
        let mut fixture = ChainFixture::new();
        let (genesis, token_id) = genesis(&mut fixture);
        let doc = document(&token_id, "Name");
        extend(&mut fixture, &genesis, Some(&pointer(URL_A, &doc)), 101);

        let s = stack(&fixture);
        s.fetcher.serve(URL_A, doc);
        s.manager.on_client_connected();

        let first = s.manager.fetch_token_identity(&token_id, Utc::now()).await.unwrap();
        let second = s.manager.fetch_token_identity(&token_id, Utc::now()).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(s.fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_unknown_token_is_a_client_error() {
        let fixture = ChainFixture::new();
        let s = stack(&fixture);
        s.manager.on_client_connected();

        let token_id = "aa".repeat(32);
        let err = s
            .manager
            .fetch_token_identity(&token_id, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::AuthChain(_)));
        assert!(!s.transport.direct_requests().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_token_id_is_rejected() {
        let fixture = ChainFixture::new();
        let s = stack(&fixture);
        s.manager.on_client_connected();

        let err = s
            .manager
            .fetch_token_identity("not-hex", Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidTokenId(_)));
        assert!(s.transport.direct_requests().is_empty());
    }
}
