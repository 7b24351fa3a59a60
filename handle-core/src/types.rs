//! Core types for handles and sessions

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::HandleError;

/// Value type that turns a handle into a redirect to another handle
pub const HS_ALIAS: &str = "HS_ALIAS";

/// Full identifier of a handle, `<prefix>/<postfix>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HandleId {
    pub prefix: String,
    pub postfix: String,
}

impl HandleId {
    pub fn new(prefix: impl Into<String>, postfix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            postfix: postfix.into(),
        }
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.prefix, self.postfix)
    }
}

impl FromStr for HandleId {
    type Err = HandleError;

    /// Split on the first `/`; the postfix itself may contain slashes.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((prefix, postfix)) if !prefix.is_empty() && !postfix.is_empty() => {
                Ok(Self::new(prefix, postfix))
            }
            _ => Err(HandleError::Parse(format!(
                "Invalid handle '{}', expected <prefix>/<postfix>",
                s
            ))),
        }
    }
}

/// Typed payload of a handle value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandleValueData {
    /// Payload format, e.g. `string` or `admin`; some servers omit it
    #[serde(default)]
    pub format: String,
    /// Payload; a plain string for `string`, an object for `admin`
    pub value: serde_json::Value,
}

impl HandleValueData {
    pub fn string(value: impl Into<String>) -> Self {
        Self {
            format: "string".to_string(),
            value: serde_json::Value::String(value.into()),
        }
    }
}

/// One entry in a handle's value list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandleValue {
    pub index: u32,
    #[serde(rename = "type")]
    pub value_type: String,
    pub data: HandleValueData,
    /// Server-managed fields such as `ttl` and `timestamp`
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl HandleValue {
    pub fn new(index: u32, value_type: impl Into<String>, data: HandleValueData) -> Self {
        Self {
            index,
            value_type: value_type.into(),
            data,
            extra: serde_json::Map::new(),
        }
    }

    /// Alias value pointing at `target`
    pub fn alias(index: u32, target: &HandleId) -> Self {
        Self::new(index, HS_ALIAS, HandleValueData::string(target.to_string()))
    }

    pub fn is_alias(&self) -> bool {
        self.value_type == HS_ALIAS
    }
}

/// Full record of a single handle as returned by the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandleRecord {
    pub response_code: i32,
    pub handle: String,
    #[serde(default)]
    pub values: Vec<HandleValue>,
}

impl HandleRecord {
    /// Target of the first `HS_ALIAS` value, if any
    pub fn alias_target(&self) -> Option<&str> {
        self.values
            .iter()
            .find(|v| v.is_alias())
            .and_then(|v| v.data.value.as_str())
    }
}

/// State of a server session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: String,
    pub authenticated: bool,
}
