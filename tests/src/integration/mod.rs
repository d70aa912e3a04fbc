//! Integration flows.

pub mod connection;
pub mod flows;

#[cfg(test)]
pub(crate) mod fixtures {
    use std::sync::Arc;

    use bcmr_authchain::{
        encode_bcmr_op_return, testing::ChainFixture, AuthChainConfig, AuthChainResolver,
        BcmrPointer,
    };
    use electrum_batch_client::{BatchClient, BatchClientConfig, MockTransport};
    use serde_json::json;
    use sha2::{Digest, Sha256};
    use shared_types::{hash_to_hex, Hash, InMemoryKVStore};
    use token_registry::{MockContentFetcher, RegistryConfig, TokenRegistryManager};

    pub type Client = BatchClient<MockTransport>;
    pub type Resolver = AuthChainResolver<Client, InMemoryKVStore>;
    pub type Manager = TokenRegistryManager<Resolver, MockContentFetcher, InMemoryKVStore>;

    /// The full stack over a mock transport answering from a fixture.
    pub struct Stack {
        pub client: Arc<Client>,
        pub transport: Arc<MockTransport>,
        pub fetcher: Arc<MockContentFetcher>,
        pub manager: Manager,
    }

    pub fn stack(fixture: &ChainFixture) -> Stack {
        let (transport, events) = MockTransport::new();
        transport.set_responder(fixture.responder());
        let client = Arc::new(BatchClient::new(
            BatchClientConfig::for_testing(),
            Arc::clone(&transport),
            events,
        ));
        let resolver = AuthChainResolver::new(
            Arc::clone(&client),
            Arc::new(InMemoryKVStore::new()),
            AuthChainConfig::default(),
        )
        .unwrap();
        let fetcher = Arc::new(MockContentFetcher::new());
        let manager = TokenRegistryManager::new(
            RegistryConfig::for_testing(),
            Arc::new(resolver),
            Arc::clone(&fetcher),
            Arc::new(InMemoryKVStore::new()),
        );
        Stack {
            client,
            transport,
            fetcher,
            manager,
        }
    }

    /// Registry document with one identity snapshot for `token_id`.
    pub fn document(token_id: &str, name: &str) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "version": { "major": 1, "minor": 0, "patch": 0 },
            "latestRevision": "2023-01-01T00:00:00.000Z",
            "identities": { token_id: {
                "2023-01-01T00:00:00.000Z": {
                    "name": name,
                    "description": format!("{name} description"),
                    "token": { "category": token_id, "symbol": "TKN", "decimals": 2 },
                    "uris": { "icon": "ipfs://cid/icon.svg", "web": "https://token.example" }
                }
            }}
        }))
        .unwrap()
    }

    /// Pointer announcing `content` at `url`.
    pub fn pointer(url: &str, content: &[u8]) -> BcmrPointer {
        BcmrPointer {
            content_hash: Sha256::digest(content).into(),
            urls: vec![url.to_string()],
        }
    }

    /// Genesis transaction without a pointer; its txid is the token id.
    pub fn genesis(fixture: &mut ChainFixture) -> (Hash, String) {
        let genesis = fixture.build_chain(&[None])[0];
        (genesis, hash_to_hex(&genesis))
    }

    /// Append a link spending output #0 of `prev`, optionally announcing
    /// `pointer`.
    pub fn extend(
        fixture: &mut ChainFixture,
        prev: &Hash,
        pointer: Option<&BcmrPointer>,
        height: i64,
    ) -> Hash {
        let mut outputs = vec![fixture.fresh_address()];
        if let Some(pointer) = pointer {
            outputs.push(encode_bcmr_op_return(pointer));
        }
        fixture.add_transaction(&[(*prev, 0)], outputs, height)
    }
}
