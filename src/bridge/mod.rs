//! Loopback RPC bridge between a running interpreter and the host.
//!
//! The listener runs on its own thread and only forwards calls. Every call is
//! answered on the thread that owns the [`Context`], which waits in
//! [`run_with_bridge`] until the interpreter exits. A script that calls
//! another script re-enters the orchestrator from inside that loop, so nested
//! invocations stack on the same thread.

mod server;
mod service;
pub mod wire;

pub use server::BridgeServer;
pub use service::BridgeService;

use crate::context::Context;
use crate::error::{Error, Result};
use crate::runtime::{Invocation, RuntimeOutput, ScriptRuntime};
use std::sync::mpsc;
use std::thread;
use tokio::sync::oneshot;
use tracing::{debug, error};
use wire::{RpcRequest, RpcResponse};

pub enum BridgeEvent {
    Call {
        request: RpcRequest,
        reply: oneshot::Sender<RpcResponse>,
    },
    Exited(Result<RuntimeOutput>),
}

/// Outcome of one bridged interpreter run.
#[derive(Debug)]
pub struct BridgeRun {
    pub output: RuntimeOutput,
    /// First authorization or gas failure a bridge call ran into.
    pub failure: Option<Error>,
    pub calls: usize,
}

/// Starts a bridge for `script_address`, launches the interpreter with the
/// invocation built from the bridge port and serves its calls against `ctx`
/// until it exits. The bridge is stopped on every path out of this function.
pub fn run_with_bridge(
    ctx: &mut Context<'_>,
    runtime: &dyn ScriptRuntime,
    script_address: &str,
    invocation: impl FnOnce(u16) -> Invocation,
) -> Result<BridgeRun> {
    let (events_tx, events_rx) = mpsc::channel();
    let server = BridgeServer::start(events_tx.clone())?;
    let invocation = invocation(server.port());
    let running = runtime.spawn(&invocation)?;

    let waiter = thread::Builder::new()
        .name("script-waiter".to_string())
        .spawn(move || {
            let output = running.wait();
            let _ = events_tx.send(BridgeEvent::Exited(output));
        })?;

    let mut service = BridgeService::new(script_address);
    let mut calls = 0;
    let output = loop {
        match events_rx.recv() {
            Ok(BridgeEvent::Call { request, reply }) => {
                calls += 1;
                let response = service.handle(ctx, &request);
                if reply.send(response).is_err() {
                    debug!("bridge caller went away before the reply");
                }
            }
            Ok(BridgeEvent::Exited(output)) => break output,
            Err(_) => break Err(Error::Internal("script bridge channel closed".into())),
        }
    };

    let _ = waiter.join();
    if let Err(e) = server.stop() {
        error!(error = %e, "failed to stop script bridge");
        panic!("failed to stop script bridge: {}", e);
    }

    Ok(BridgeRun {
        output: output?,
        failure: service.into_failure(),
        calls,
    })
}
