//! The script module: storage-backed operations and the execution orchestrator.

mod abci;
mod genesis;
mod msg_server;
mod query;
mod resolver;

pub use abci::begin_block;
pub use genesis::{export_genesis, init_genesis};
pub use query::{PARAMS_QUERY_PATH, SCRIPT_INFO_QUERY_PATH, WEB_QUERY_PATH};
pub use resolver::{AddressResolver, NameResolver, StaticNameResolver};

use crate::bridge::run_with_bridge;
use crate::context::{Context, Services};
use crate::dispatch::dispatch_all;
use crate::error::{Error, Result, ResultExt};
use crate::gas::EXEC_SCRIPT_GAS;
use crate::runtime::{is_structured, Invocation, ScriptRuntime};
use crate::storage::ScriptStore;
use crate::types::{
    AnyMsg, BlockHeader, EventExecScript, MsgExec, MsgExecResponse, MsgResponse, Script,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Everything one script invocation needs; owned by that invocation.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub msg: MsgExec,
    pub script: Script,
    /// Results of the attached messages when the caller already dispatched them.
    pub attached_results: Option<Vec<MsgResponse>>,
    pub header: BlockHeader,
}

pub struct ScriptKeeper {
    runtime: Arc<dyn ScriptRuntime>,
    names: Arc<dyn NameResolver>,
    authority: String,
}

impl ScriptKeeper {
    pub fn new(
        runtime: Arc<dyn ScriptRuntime>,
        names: Arc<dyn NameResolver>,
        authority: impl Into<String>,
    ) -> Self {
        ScriptKeeper {
            runtime,
            names,
            authority: authority.into(),
        }
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }

    pub fn runtime(&self) -> &dyn ScriptRuntime {
        self.runtime.as_ref()
    }

    /// Registers the module's message handlers and query paths.
    pub fn register(self: &Arc<Self>, services: &mut Services) {
        msg_server::register(self, &mut services.msg_router);
        query::register(self, &mut services.query_router);
    }

    /// Resolves to the canonical address form used as the store key.
    pub(crate) fn resolve(&self, ctx: &Context<'_>, name_or_address: &str) -> Result<String> {
        self.names
            .resolve_name_or_address(ctx, name_or_address)
            .and_then(|address| ctx.address_codec().normalize(&address))
            .with_context(|| format!("failed to resolve address or name: {}", name_or_address))
    }

    /// Runs `msg` as a transaction step. The script is created empty on first
    /// reference; its run commits writes and emits [`EventExecScript`] only on
    /// success.
    pub fn exec_script(&self, ctx: &mut Context<'_>, msg: &MsgExec) -> Result<MsgExecResponse> {
        let address = self.resolve(ctx, &msg.script_address)?;
        let script = if ctx.store().has_script(&address) {
            ctx.store().get_script(&address)?
        } else {
            debug!(script = %address, "creating empty script on first execution");
            let script = Script::empty(address.clone());
            ctx.store_mut().set_script(&address, &script)?;
            script
        };

        let header = ctx.header().clone();
        ctx.branch(|c| {
            let exec = ExecutionContext {
                msg: msg.clone(),
                script,
                attached_results: None,
                header,
            };
            let response = self.execute(c, exec)?;
            c.emit_typed(&EventExecScript {
                request: msg.clone(),
                response: response.clone(),
            })?;
            Ok(response)
        })
    }

    /// Runs one interpreter invocation one script-call level below `ctx`.
    pub fn execute(&self, ctx: &mut Context<'_>, exec: ExecutionContext) -> Result<MsgExecResponse> {
        let mut ctx = ctx.descend();
        let depth = ctx.depth();
        let ExecutionContext {
            msg,
            script,
            attached_results,
            header,
        } = exec;

        ctx.address_codec()
            .validate(&msg.executor_address)
            .context("error getting executor address")?;

        let attached_results = match attached_results {
            Some(results) => {
                if results.len() != msg.attached_messages.len() {
                    return Err(Error::Invalid(format!(
                        "pre-populated attached message results length ({}) does not match attached messages length ({})",
                        results.len(),
                        msg.attached_messages.len()
                    )));
                }
                info!(script = %script.address, "using pre-populated attached message results");
                results
            }
            None => dispatch_all(&mut ctx, &msg.executor_address, &msg.attached_messages)?,
        };

        let msg_json = AnyMsg::pack(&msg)?.to_json()?;
        let script_json = AnyMsg::pack(&script)?.to_json()?;
        let attached_results_json = serde_json::to_string(&attached_results)?;
        let header_json = serde_json::to_string(&header)?;

        info!(
            script = %script.address,
            version = script.version,
            executor = %msg.executor_address,
            function = %msg.function_name,
            depth,
            "executing script"
        );
        let started = Instant::now();
        let run = run_with_bridge(&mut ctx, self.runtime(), &script.address, |port| {
            Invocation::Exec {
                msg_json,
                script_json,
                attached_results_json,
                header_json,
                port,
            }
        })?;

        ctx.gas_meter_mut().consume(EXEC_SCRIPT_GAS, "execScript")?;

        let result = run.output.result_line();
        info!(
            script = %script.address,
            depth,
            success = run.output.success,
            status = %run.output.status_text(),
            calls = run.calls,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "script finished"
        );

        if let Some(failure) = run.failure {
            return Err(failure.wrap(format!("script {} made a failing call", script.address)));
        }
        if !run.output.success {
            if is_structured(&result) {
                return Err(Error::ScriptExecution(result));
            }
            warn!(script = %script.address, stderr = %run.output.stderr, "interpreter failed");
            return Err(Error::InterpreterFailed {
                status: run.output.status_text(),
                output: result,
            });
        }

        Ok(MsgExecResponse {
            result,
            attached_message_results: attached_results,
        })
    }

    /// Runs a stored script in web mode against a throwaway branch and returns
    /// the interpreter's raw output.
    pub fn run_web(&self, ctx: &mut Context<'_>, address_or_name: &str, http_request: &str) -> Result<String> {
        ctx.discard_branch(|c| {
            let address = self.resolve(c, address_or_name)?;
            if !c.store().has_script(&address) {
                return Err(Error::NotFound(format!(
                    "script with address {} doesn't exist",
                    address
                )));
            }
            let script = c.store().get_script(&address)?;
            let script_json = AnyMsg::pack(&script)?.to_json()?;
            let header_json = serde_json::to_string(c.header())?;
            let http_request = http_request.to_string();

            let mut c = c.descend();
            let started = Instant::now();
            let run = run_with_bridge(&mut c, self.runtime(), &address, |port| Invocation::Web {
                port,
                script_json,
                header_json,
                http_request,
            })?;
            info!(
                script = %address,
                success = run.output.success,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "web request finished"
            );

            if let Some(failure) = run.failure {
                return Err(failure.wrap(format!("script {} made a failing call", address)));
            }
            if !run.output.success {
                return Err(Error::InterpreterFailed {
                    status: run.output.status_text(),
                    output: run.output.stdout,
                })
                .context("error running script");
            }
            Ok(run.output.stdout)
        })
    }
}
