pub mod address;
pub mod events;
pub mod params;
pub mod script;

pub use address::{AddressCodec, ADDRESS_LEN};
pub use events::{
    Event, EventAttribute, EventCreateNewScript, EventExecScript, EventScriptEvent,
    EventUpdateScript, TypedEvent,
};
pub use params::Params;
pub use script::*;

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Implemented by every message and query type that can travel as an [`AnyMsg`].
pub trait TypeUrl {
    const TYPE_URL: &'static str;
}

/// A message or query in its JSON `Any` form: `{"@type": "/pkg.Msg", ...fields}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnyMsg {
    #[serde(rename = "@type")]
    pub type_url: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl AnyMsg {
    pub fn new(type_url: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            type_url: type_url.into(),
            fields,
        }
    }

    pub fn pack<T: Serialize + TypeUrl>(msg: &T) -> Result<Self> {
        match serde_json::to_value(msg)? {
            Value::Object(fields) => Ok(Self::new(T::TYPE_URL, fields)),
            other => Err(Error::Invalid(format!(
                "{} does not serialize to an object: {}",
                T::TYPE_URL,
                other
            ))),
        }
    }

    pub fn unpack<T: DeserializeOwned + TypeUrl>(&self) -> Result<T> {
        if self.type_url != T::TYPE_URL {
            return Err(Error::Invalid(format!(
                "type mismatch: expected {}, got {}",
                T::TYPE_URL,
                self.type_url
            )));
        }
        Ok(serde_json::from_value(Value::Object(self.fields.clone()))?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Message body without the `@type` tag.
    pub fn body(&self) -> Value {
        Value::Object(self.fields.clone())
    }
}

impl fmt::Display for AnyMsg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_url)
    }
}

/// Block header handed to scripts and used for historical bookkeeping.
///
/// Field names follow the host chain's JSON header form, which interpreters
/// already parse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockHeader {
    #[serde(rename = "Height")]
    pub height: i64,
    #[serde(rename = "Time")]
    pub time: DateTime<Utc>,
    #[serde(rename = "ChainID")]
    pub chain_id: String,
    #[serde(rename = "AppHash")]
    pub app_hash: String,
    #[serde(rename = "Hash")]
    pub hash: String,
}

impl BlockHeader {
    pub fn new(height: i64, chain_id: impl Into<String>) -> Self {
        Self {
            height,
            time: Utc::now(),
            chain_id: chain_id.into(),
            app_hash: String::new(),
            hash: String::new(),
        }
    }
}
