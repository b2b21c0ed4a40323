use super::wire::{
    ConsumeGasRequest, EmitEventRequest, MsgRequest, QueryRequest, RpcRequest, RpcResponse, SERVICE,
};
use crate::context::{Context, EventManager};
use crate::dispatch::dispatch_json_message;
use crate::error::{Error, Result, ResultExt};
use crate::gas::{GasInfo, GasMeter};
use crate::history::check_query_height;
use crate::router::{convert_rpc_path, response_type_url};
use crate::storage::{CacheStore, ParamsStore};
use crate::types::{AnyMsg, EventScriptEvent};
use serde_json::{json, Value};
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, warn};

/// Answers bridge calls for one running script.
///
/// The first authorization or gas failure a call runs into is remembered;
/// the invocation fails with it even if the script carries on.
pub struct BridgeService<'s> {
    script_address: &'s str,
    failure: Option<Error>,
}

impl<'s> BridgeService<'s> {
    pub fn new(script_address: &'s str) -> Self {
        BridgeService {
            script_address,
            failure: None,
        }
    }

    pub fn into_failure(self) -> Option<Error> {
        self.failure
    }

    pub fn handle(&mut self, ctx: &mut Context<'_>, request: &RpcRequest) -> RpcResponse {
        let id = request.id.clone();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.call(ctx, request)))
            .unwrap_or_else(|payload| Err(Error::from_panic(payload)));

        match outcome {
            Ok(result) => RpcResponse::ok(id, result),
            Err(e) => {
                debug!(method = %request.method, error = %e, "bridge call failed");
                let message = e.to_string();
                if self.failure.is_none() && (e.is_unauthorized() || e.is_out_of_gas()) {
                    self.failure = Some(e);
                }
                RpcResponse::error(id, message)
            }
        }
    }

    fn call(&self, ctx: &mut Context<'_>, request: &RpcRequest) -> Result<Value> {
        match request.op()? {
            "Msg" => Ok(Value::String(self.msg(ctx, request.param()?)?)),
            "Query" => Ok(Value::String(self.query(ctx, request.param()?)?)),
            "EmitEvent" => {
                self.emit_event(ctx, request.param()?)?;
                Ok(json!({}))
            }
            "ConsumeGas" => Ok(serde_json::to_value(self.consume_gas(ctx, request.param()?)?)?),
            "GasLimit" => Ok(serde_json::to_value(ctx.gas_meter().info())?),
            other => Err(Error::InvalidRequest(format!(
                "unknown method {}.{}",
                SERVICE, other
            ))),
        }
    }

    /// Dispatches one message as the script itself, in a sub-branch with its
    /// own gas limit.
    fn msg(&self, ctx: &mut Context<'_>, req: MsgRequest) -> Result<String> {
        let gas_limit = match req.gas_limit {
            0 => ctx.gas_meter().remaining(),
            limit => limit,
        };
        let executor = self.script_address;
        let (result, gas_used) = ctx.branch_with_gas_limit(gas_limit, |c| {
            dispatch_json_message(c, executor, &req.json_msg)
        });
        debug!(script = executor, gas_limit, gas_used, ok = result.is_ok(), "script message");
        result
    }

    fn query(&self, ctx: &mut Context<'_>, req: QueryRequest) -> Result<String> {
        let request = AnyMsg::from_json(&req.json_query).context("failed to parse query")?;
        let path = convert_rpc_path(&request.type_url).ok_or_else(|| {
            Error::InvalidRequest(format!("{} is not a query request type", request.type_url))
        })?;
        let handler = ctx.services().query_router.route(&path)?;
        let body = serde_json::to_vec(&request.body())?;

        // The block being built has no snapshot yet; its height means current state.
        let current = ctx.block_height();
        let response = if req.query_height == 0 || req.query_height == current {
            ctx.discard_branch(|c| handler.query(c, &body))
        } else {
            let params = ctx.store().get_params()?;
            check_query_height(current, req.query_height, &params)?;
            let state = ctx.services().history.state_at(req.query_height)?;

            let mut store = CacheStore::new(&*state.store);
            let mut gas = GasMeter::infinite();
            let mut events = EventManager::new();
            let mut historical = Context::new(
                &mut store,
                &mut gas,
                &mut events,
                &state.header,
                ctx.services(),
            );
            handler.query(&mut historical, &body)
        }
        .with_context(|| format!("failed to execute query {}", path))?;

        let fields = match serde_json::from_slice::<Value>(&response)? {
            Value::Object(fields) => fields,
            other => {
                return Err(Error::Internal(format!(
                    "query {} returned a non-object response: {}",
                    path, other
                )))
            }
        };
        AnyMsg::new(response_type_url(&request.type_url), fields).to_json()
    }

    fn emit_event(&self, ctx: &mut Context<'_>, req: EmitEventRequest) -> Result<()> {
        ctx.address_codec().validate(self.script_address)?;
        ctx.emit_typed(&EventScriptEvent {
            address: self.script_address.to_string(),
            key: req.key,
            value: req.value,
        })
    }

    fn consume_gas(&self, ctx: &mut Context<'_>, req: ConsumeGasRequest) -> Result<GasInfo> {
        if req.amount < 0 {
            return Err(Error::InvalidRequest(format!(
                "gas amount cannot be negative: {}",
                req.amount
            )));
        }
        let depth = ctx.depth();
        if let Err(e) = ctx
            .gas_meter_mut()
            .consume_scaled(req.amount as u64, depth, "script")
        {
            warn!(script = self.script_address, depth, error = %e, "script out of gas");
            return Err(e);
        }
        Ok(ctx.gas_meter().info())
    }
}
