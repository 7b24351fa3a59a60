//! Request and response models for the Handle server JSON REST API
//!
//! Field names follow the server's camelCase wire format.

use crate::types::{HandleId, HandleValue};
use serde::{Deserialize, Deserializer, Serialize};

/// Response to `POST /api/sessions`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCreated {
    pub session_id: String,
    #[serde(default)]
    pub nonce: String,
}

/// Response to `PUT /api/sessions/this`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionAuthorized {
    pub session_id: String,
    #[serde(default)]
    pub nonce: String,
    #[serde(default)]
    pub authenticated: bool,
    /// Authenticated identity, e.g. `312:21.12102/USER01`
    #[serde(default)]
    pub id: Option<String>,
}

/// One page of bare handle identifiers from `GET /api/handles`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandlePage {
    #[serde(default)]
    pub response_code: i32,
    #[serde(default)]
    pub prefix: String,
    /// Sent as a decimal string by the server
    #[serde(deserialize_with = "deserialize_count")]
    pub total_count: u64,
    #[serde(default)]
    pub page: u64,
    #[serde(default)]
    pub page_size: u64,
    #[serde(default)]
    pub handles: Vec<String>,
}

/// Body of `PUT /api/handles/<prefix>/<postfix>?index=various`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModifyValuesRequest {
    pub values: Vec<HandleValue>,
}

impl ModifyValuesRequest {
    /// Replace index 1 with an `HS_ALIAS` pointing at `target`
    pub fn alias_to(target: &HandleId) -> Self {
        Self {
            values: vec![HandleValue::alias(1, target)],
        }
    }
}

/// Response to a handle modification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModifyResponse {
    pub response_code: i32,
    pub handle: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CountRepr {
    Number(u64),
    Text(String),
}

fn deserialize_count<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    match CountRepr::deserialize(deserializer)? {
        CountRepr::Number(n) => Ok(n),
        CountRepr::Text(s) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid totalCount '{}'", s))),
    }
}
