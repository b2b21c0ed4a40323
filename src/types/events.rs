use super::{MsgExec, MsgExecResponse};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventAttribute {
    pub key: String,
    pub value: String,
}

/// An entry in the transaction's event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: String,
    pub attributes: Vec<EventAttribute>,
}

impl Event {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            attributes: Vec::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push(EventAttribute {
            key: key.into(),
            value: value.into(),
        });
        self
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.key == key)
            .map(|a| a.value.as_str())
    }
}

/// Structured events; every field becomes a JSON-encoded attribute.
pub trait TypedEvent: Serialize {
    const EVENT_TYPE: &'static str;

    fn to_event(&self) -> Result<Event> {
        let fields = match serde_json::to_value(self)? {
            Value::Object(fields) => fields,
            other => {
                return Err(Error::Invalid(format!(
                    "{} does not serialize to an object: {}",
                    Self::EVENT_TYPE,
                    other
                )))
            }
        };

        let mut event = Event::new(Self::EVENT_TYPE);
        for (key, value) in fields {
            event = event.with_attribute(key, serde_json::to_string(&value)?);
        }
        Ok(event)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventUpdateScript {
    pub address: String,
    pub version: u64,
}

impl TypedEvent for EventUpdateScript {
    const EVENT_TYPE: &'static str = "script.v1.EventUpdateScript";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventExecScript {
    pub request: MsgExec,
    pub response: MsgExecResponse,
}

impl TypedEvent for EventExecScript {
    const EVENT_TYPE: &'static str = "script.v1.EventExecScript";
}

/// Custom event raised by a running script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventScriptEvent {
    pub address: String,
    pub key: String,
    pub value: String,
}

impl TypedEvent for EventScriptEvent {
    const EVENT_TYPE: &'static str = "script.v1.EventScriptEvent";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventCreateNewScript {
    pub script_address: String,
    pub creator_address: String,
    pub version: u64,
}

impl TypedEvent for EventCreateNewScript {
    const EVENT_TYPE: &'static str = "script.v1.EventCreateNewScript";
}
