//! JSON-RPC envelope spoken on the bridge port.
//!
//! Requests are `{"method": "RpcService.<Op>", "params": [{...}], "id": ..}`.
//! Replies are `{"result": .., "error": null | "<message>", "id": ..}`.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// Service name every bridge method is registered under.
pub const SERVICE: &str = "RpcService";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    pub method: String,
    #[serde(default)]
    pub params: Value,
    #[serde(default)]
    pub id: Value,
}

impl RpcRequest {
    pub fn new<P: Serialize>(op: &str, params: &P) -> Result<Self> {
        Ok(RpcRequest {
            method: format!("{}.{}", SERVICE, op),
            params: Value::Array(vec![serde_json::to_value(params)?]),
            id: Value::from(0),
        })
    }

    /// Operation name with the service prefix removed.
    pub fn op(&self) -> Result<&str> {
        self.method
            .strip_prefix(SERVICE)
            .and_then(|rest| rest.strip_prefix('.'))
            .ok_or_else(|| Error::InvalidRequest(format!("unknown method {}", self.method)))
    }

    /// First positional parameter, or the params object itself.
    pub fn param<P: DeserializeOwned>(&self) -> Result<P> {
        let param = match &self.params {
            Value::Array(items) => items.first().cloned().unwrap_or(Value::Null),
            other => other.clone(),
        };
        let param = match param {
            Value::Null => Value::Object(Default::default()),
            other => other,
        };
        serde_json::from_value(param)
            .map_err(|e| Error::InvalidRequest(format!("bad params for {}: {}", self.method, e)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    pub result: Value,
    pub error: Option<String>,
    pub id: Value,
}

impl RpcResponse {
    pub fn ok(id: Value, result: Value) -> Self {
        RpcResponse {
            result,
            error: None,
            id,
        }
    }

    pub fn error(id: Value, message: impl Into<String>) -> Self {
        RpcResponse {
            result: Value::Null,
            error: Some(message.into()),
            id,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgRequest {
    pub json_msg: String,
    /// Zero means the caller's remaining gas.
    #[serde(default)]
    pub gas_limit: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub json_query: String,
    /// Zero means current state.
    #[serde(default)]
    pub query_height: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmitEventRequest {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumeGasRequest {
    #[serde(default)]
    pub amount: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_envelope() {
        let request: RpcRequest = serde_json::from_value(json!({
            "method": "RpcService.ConsumeGas",
            "params": [{"amount": 10}],
            "jsonrpc": "2.0",
            "id": 0
        }))
        .unwrap();
        assert_eq!(request.op().unwrap(), "ConsumeGas");
        assert_eq!(request.param::<ConsumeGasRequest>().unwrap().amount, 10);

        let bare: RpcRequest =
            serde_json::from_value(json!({"method": "RpcService.GasLimit", "id": 1})).unwrap();
        assert_eq!(bare.param::<ConsumeGasRequest>().unwrap().amount, 0);

        let other: RpcRequest =
            serde_json::from_value(json!({"method": "Other.GasLimit"})).unwrap();
        assert!(other.op().is_err());
    }

    #[test]
    fn test_response_envelope() {
        let ok = serde_json::to_value(RpcResponse::ok(json!(3), json!("done"))).unwrap();
        assert_eq!(ok, json!({"result": "done", "error": null, "id": 3}));

        let err = serde_json::to_value(RpcResponse::error(json!(3), "boom")).unwrap();
        assert_eq!(err["error"], "boom");
        assert_eq!(err["result"], Value::Null);
    }
}
