//! # BCMR Registry Documents
//!
//! The subset of the BCMR v2 schema needed to describe a fungible token:
//!
//! ```json
//! { "identities": { "<authbase>": { "<iso date>": {
//!     "name": "...", "description": "...",
//!     "token": { "category": "<token id>", "symbol": "...", "decimals": 8 },
//!     "uris": { "icon": "...", "web": "..." } } } } }
//! ```

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use shared_types::Hash;
use std::collections::BTreeMap;

use super::errors::RegistryError;

/// A registry document.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Registry {
    /// Schema version object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<Value>,
    /// Revision timestamp of the document.
    #[serde(default, rename = "latestRevision", skip_serializing_if = "Option::is_none")]
    pub latest_revision: Option<String>,
    /// Identity histories by authbase, in document order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identities: Option<Map<String, Value>>,
}

/// Token part of a snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenCategory {
    /// Token category (token id).
    pub category: String,
    /// Ticker symbol.
    pub symbol: String,
    /// Display decimals.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decimals: Option<u8>,
}

/// Identity as of one date.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentitySnapshot {
    /// Display name.
    pub name: String,
    /// Longer description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Token described by this identity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<TokenCategory>,
    /// Named URIs (`icon`, `web`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uris: Option<BTreeMap<String, String>>,
}

/// Check `content` against `content_hash` and parse it.
pub fn validate_registry(content: &[u8], content_hash: &Hash) -> Result<Registry, RegistryError> {
    let digest: Hash = Sha256::digest(content).into();
    if &digest != content_hash {
        return Err(RegistryError::HashMismatch);
    }
    serde_json::from_slice(content).map_err(|e| RegistryError::InvalidDocument(e.to_string()))
}

/// Parse a snapshot key: RFC 3339 timestamp or plain date (midnight UTC).
fn parse_snapshot_date(key: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(key) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(key, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Pick the identity of `token_id` valid at `at`.
///
/// Only the first identity of the document is considered. Every snapshot
/// of it must belong to `token_id`; the newest one dated at or before `at`
/// is returned.
pub fn pull_identity_snapshot(
    registry: &Registry,
    token_id: &str,
    at: DateTime<Utc>,
) -> Result<IdentitySnapshot, RegistryError> {
    let Some((_authbase, history)) = registry.identities.as_ref().and_then(|ids| ids.iter().next())
    else {
        return Err(RegistryError::NoIdentities);
    };
    let history: BTreeMap<String, Option<IdentitySnapshot>> = serde_json::from_value(history.clone())
        .map_err(|e| RegistryError::InvalidDocument(e.to_string()))?;

    let mut entries: Vec<(DateTime<Utc>, IdentitySnapshot)> = Vec::new();
    for (key, snapshot) in history {
        let Some(snapshot) = snapshot else {
            continue;
        };
        if snapshot
            .token
            .as_ref()
            .is_some_and(|token| token.category != token_id)
        {
            return Err(RegistryError::CategoryMismatch);
        }
        if let Some(date) = parse_snapshot_date(&key) {
            entries.push((date, snapshot));
        }
    }
    entries.sort_by(|a, b| b.0.cmp(&a.0));

    let (_, current) = entries
        .into_iter()
        .find(|(date, _)| *date <= at)
        .ok_or(RegistryError::NoCurrentIdentity)?;
    match &current.token {
        None => Err(RegistryError::MissingToken),
        Some(token) if token.category != token_id => Err(RegistryError::CategoryMismatch),
        Some(_) => Ok(current),
    }
}
