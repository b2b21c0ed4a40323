use super::ScriptKeeper;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::router::{QueryHandler, QueryRouter};
use crate::storage::{ParamsStore, ScriptStore};
use crate::types::{
    QueryParamsRequest, QueryParamsResponse, QueryScriptInfoRequest, QueryScriptInfoResponse,
    QueryWebRequest, QueryWebResponse,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

pub const PARAMS_QUERY_PATH: &str = "/script.v1.Query/Params";
pub const SCRIPT_INFO_QUERY_PATH: &str = "/script.v1.Query/ScriptInfo";
pub const WEB_QUERY_PATH: &str = "/script.v1.Query/Web";

pub(super) fn register(keeper: &Arc<ScriptKeeper>, router: &mut QueryRouter) {
    router.register(PARAMS_QUERY_PATH, Arc::new(ParamsQuery(keeper.clone())));
    router.register(SCRIPT_INFO_QUERY_PATH, Arc::new(ScriptInfoQuery(keeper.clone())));
    router.register(WEB_QUERY_PATH, Arc::new(WebQuery(keeper.clone())));
}

fn decode<T: DeserializeOwned>(request: &[u8]) -> Result<T> {
    serde_json::from_slice(request).map_err(|e| Error::InvalidRequest(format!("bad query request: {}", e)))
}

fn encode<T: Serialize>(response: &T) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(response)?)
}

impl ScriptKeeper {
    pub fn params(&self, ctx: &Context<'_>, _req: &QueryParamsRequest) -> Result<QueryParamsResponse> {
        Ok(QueryParamsResponse {
            params: ctx.store().get_params()?,
        })
    }

    pub fn script_info(&self, ctx: &Context<'_>, req: &QueryScriptInfoRequest) -> Result<QueryScriptInfoResponse> {
        if req.address.is_empty() {
            return Err(Error::InvalidRequest("address cannot be empty".into()));
        }
        let address = ctx.address_codec().normalize(&req.address)?;
        Ok(QueryScriptInfoResponse {
            script: ctx.store().get_script(&address)?,
        })
    }

    pub fn web(&self, ctx: &mut Context<'_>, req: &QueryWebRequest) -> Result<QueryWebResponse> {
        Ok(QueryWebResponse {
            httpresponse: self.run_web(ctx, &req.address_or_name, &req.httprequest)?,
        })
    }
}

struct ParamsQuery(Arc<ScriptKeeper>);

impl QueryHandler for ParamsQuery {
    fn query(&self, ctx: &mut Context<'_>, request: &[u8]) -> Result<Vec<u8>> {
        encode(&self.0.params(ctx, &decode(request)?)?)
    }
}

struct ScriptInfoQuery(Arc<ScriptKeeper>);

impl QueryHandler for ScriptInfoQuery {
    fn query(&self, ctx: &mut Context<'_>, request: &[u8]) -> Result<Vec<u8>> {
        encode(&self.0.script_info(ctx, &decode(request)?)?)
    }
}

struct WebQuery(Arc<ScriptKeeper>);

impl QueryHandler for WebQuery {
    fn query(&self, ctx: &mut Context<'_>, request: &[u8]) -> Result<Vec<u8>> {
        encode(&self.0.web(ctx, &decode(request)?)?)
    }
}
