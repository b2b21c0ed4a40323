use super::{AnyMsg, Params, TypeUrl};
use serde::{Deserialize, Serialize};

/// A stored, versioned program keyed by its address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Script {
    pub address: String,
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub code: String,
}

impl Script {
    /// The implicit script of an address that has never been written.
    pub fn empty(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            version: 0,
            code: String::new(),
        }
    }
}

impl TypeUrl for Script {
    const TYPE_URL: &'static str = "/script.v1.Script";
}

/// Result of one dispatched message: its primary response, if the handler produced one.
pub type MsgResponse = Option<AnyMsg>;

/// Invokes a script on behalf of `executor_address`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MsgExec {
    pub executor_address: String,
    pub script_address: String,
    #[serde(default)]
    pub extra_code: String,
    #[serde(default)]
    pub function_name: String,
    #[serde(default)]
    pub args: String,
    #[serde(default)]
    pub kwargs: String,
    #[serde(default)]
    pub attached_messages: Vec<AnyMsg>,
}

impl TypeUrl for MsgExec {
    const TYPE_URL: &'static str = "/script.v1.MsgExec";
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MsgExecResponse {
    pub result: String,
    #[serde(default)]
    pub attached_message_results: Vec<MsgResponse>,
}

impl TypeUrl for MsgExecResponse {
    const TYPE_URL: &'static str = "/script.v1.MsgExecResponse";
}

/// Replaces the code at `address`, creating the script if needed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgUpdateScript {
    pub address: String,
    pub code: String,
}

impl TypeUrl for MsgUpdateScript {
    const TYPE_URL: &'static str = "/script.v1.MsgUpdateScript";
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgUpdateScriptResponse {
    pub version: u64,
}

impl TypeUrl for MsgUpdateScriptResponse {
    const TYPE_URL: &'static str = "/script.v1.MsgUpdateScriptResponse";
}

/// Stores code under an address derived from the creator and the code.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgCreateNewScript {
    pub creator_address: String,
    pub code: String,
}

impl TypeUrl for MsgCreateNewScript {
    const TYPE_URL: &'static str = "/script.v1.MsgCreateNewScript";
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgCreateNewScriptResponse {
    pub script_address: String,
    pub version: u64,
}

impl TypeUrl for MsgCreateNewScriptResponse {
    const TYPE_URL: &'static str = "/script.v1.MsgCreateNewScriptResponse";
}

/// Governance-gated parameter update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgUpdateParams {
    pub authority: String,
    pub params: Params,
}

impl TypeUrl for MsgUpdateParams {
    const TYPE_URL: &'static str = "/script.v1.MsgUpdateParams";
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgUpdateParamsResponse {}

impl TypeUrl for MsgUpdateParamsResponse {
    const TYPE_URL: &'static str = "/script.v1.MsgUpdateParamsResponse";
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryParamsRequest {}

impl TypeUrl for QueryParamsRequest {
    const TYPE_URL: &'static str = "/script.v1.QueryParamsRequest";
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryParamsResponse {
    pub params: Params,
}

impl TypeUrl for QueryParamsResponse {
    const TYPE_URL: &'static str = "/script.v1.QueryParamsResponse";
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryScriptInfoRequest {
    pub address: String,
}

impl TypeUrl for QueryScriptInfoRequest {
    const TYPE_URL: &'static str = "/script.v1.QueryScriptInfoRequest";
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryScriptInfoResponse {
    pub script: Script,
}

impl TypeUrl for QueryScriptInfoResponse {
    const TYPE_URL: &'static str = "/script.v1.QueryScriptInfoResponse";
}

/// Runs a script in query-only mode with an HTTP request payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryWebRequest {
    pub address_or_name: String,
    #[serde(default)]
    pub httprequest: String,
}

impl TypeUrl for QueryWebRequest {
    const TYPE_URL: &'static str = "/script.v1.QueryWebRequest";
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryWebResponse {
    pub httpresponse: String,
}

impl TypeUrl for QueryWebResponse {
    const TYPE_URL: &'static str = "/script.v1.QueryWebResponse";
}

/// Module state at chain start.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisState {
    #[serde(default)]
    pub params: Params,
    #[serde(default)]
    pub scripts: Vec<Script>,
}

impl GenesisState {
    pub fn validate(&self) -> crate::error::Result<()> {
        self.params.validate()?;
        let mut seen = ahash::AHashSet::new();
        for script in &self.scripts {
            if !seen.insert(script.address.as_str()) {
                return Err(crate::error::Error::Invalid(format!(
                    "duplicate script address in genesis: {}",
                    script.address
                )));
            }
        }
        Ok(())
    }
}
