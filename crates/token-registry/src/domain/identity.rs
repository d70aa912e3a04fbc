//! # Token Identities
//!
//! The public shape of a resolved token, the native coin's built-in
//! identity, the verified allow-list and URL rewriting.

use reqwest::Url;
use serde::{Deserialize, Serialize};
use shared_types::{hash_to_hex, Hash};

use super::registry::IdentitySnapshot;

/// Identity of a token as shown to users.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenIdentity {
    /// Token id and document hash are on the allow-list.
    pub verified: bool,
    /// The chain's native coin.
    pub is_native_token: bool,
    /// Display name.
    pub name: String,
    /// Longer description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Ticker symbol.
    pub symbol_text: String,
    /// Display decimals.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decimals: Option<u8>,
    /// Icon location.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
    /// Project web page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webpage_url: Option<String>,
}

/// Built-in identity of BCH.
pub fn native_bch_identity() -> TokenIdentity {
    TokenIdentity {
        verified: true,
        is_native_token: true,
        name: "Bitcoin Cash".to_string(),
        description: None,
        symbol_text: "BCH".to_string(),
        decimals: Some(8),
        icon_url: Some("/assets/bch-circle.svg".to_string()),
        webpage_url: None,
    }
}

/// Registry documents known to be authentic, by token id.
const VERIFIED_TOKEN_BCMR: &[(&str, &[&str])] = &[
    (
        "b38a33f750f84c5c169a6f23cb873e6e79605021585d4f3408789689ed87f366",
        &["0e9fd254f8ed69c524acffb692adcbe0500cb84a331e0a772788439788c742cb"],
    ),
    (
        "b79bfc8246b5fc4707e7c7dedcb6619ef1ab91f494a790c20b0f4c422ed95b92",
        &["c705cc90a56ac7ef9a15ef90ebbc8ba7e60e4c622e5464d52d8baf7887949fcc"],
    ),
];

/// Whether the document `content_hash` is the verified one for `token_id`.
pub fn is_verified(token_id: &str, content_hash: &Hash) -> bool {
    let hash = hash_to_hex(content_hash);
    VERIFIED_TOKEN_BCMR
        .iter()
        .find(|(id, _)| *id == token_id)
        .is_some_and(|(_, hashes)| hashes.contains(&hash.as_str()))
}

/// Turn a URL as written in a pointer or registry into a fetchable one.
///
/// - no scheme: `https://` is prepended;
/// - `ipfs://<cid>/<path>`: rewritten onto `ipfs_endpoint`;
/// - anything else is returned unchanged.
pub fn rewrite_url(uri: &str, ipfs_endpoint: &str) -> String {
    if !uri.contains("://") {
        return format!("https://{uri}");
    }
    match Url::parse(uri) {
        Ok(url) if url.scheme() == "ipfs" => {
            let path = match url.path() {
                "" | "/" => "",
                path => path,
            };
            format!("{}{}{}", ipfs_endpoint, url.host_str().unwrap_or_default(), path)
        }
        _ => uri.to_string(),
    }
}

/// Build the public identity of `token_id` from its current snapshot.
pub fn identity_from_snapshot(
    token_id: &str,
    content_hash: &Hash,
    snapshot: IdentitySnapshot,
    ipfs_endpoint: &str,
) -> Option<TokenIdentity> {
    let token = snapshot.token?;
    let uris = snapshot.uris.unwrap_or_default();
    let uri = |name: &str| uris.get(name).map(|u| rewrite_url(u, ipfs_endpoint));
    Some(TokenIdentity {
        verified: is_verified(token_id, content_hash),
        is_native_token: false,
        name: snapshot.name,
        description: snapshot.description,
        symbol_text: token.symbol,
        decimals: token.decimals,
        icon_url: uri("icon"),
        webpage_url: uri("web"),
    })
}
