use super::wire::{RpcRequest, RpcResponse};
use super::BridgeEvent;
use crate::error::{Error, Result};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle};
use tokio::sync::oneshot;
use tracing::{debug, error, info, trace};
use warp::Filter;

/// Largest request body the bridge accepts.
const MAX_BODY_BYTES: u64 = 4 * 1024 * 1024;

/// Loopback JSON-RPC listener for one script invocation.
///
/// Calls are forwarded to the owning thread over `calls`; the listener never
/// touches chain state itself. Stopping is mandatory: dropping a running
/// server stops it, and a failed stop panics.
pub struct BridgeServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl BridgeServer {
    /// Binds an ephemeral loopback port and starts serving.
    pub fn start(calls: Sender<BridgeEvent>) -> Result<Self> {
        let (bound_tx, bound_rx) = mpsc::sync_channel::<std::result::Result<SocketAddr, String>>(1);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let thread = thread::Builder::new()
            .name("script-bridge".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        let _ = bound_tx.send(Err(e.to_string()));
                        return;
                    }
                };

                runtime.block_on(async move {
                    let routes = rpc_filter(calls);
                    let bound = warp::serve(routes).try_bind_with_graceful_shutdown(
                        ([127, 0, 0, 1], 0),
                        async {
                            shutdown_rx.await.ok();
                        },
                    );
                    match bound {
                        Ok((addr, server)) => {
                            let _ = bound_tx.send(Ok(addr));
                            server.await;
                        }
                        Err(e) => {
                            let _ = bound_tx.send(Err(e.to_string()));
                        }
                    }
                });
            })?;

        let addr = match bound_rx.recv() {
            Ok(Ok(addr)) => addr,
            Ok(Err(e)) => {
                let _ = thread.join();
                return Err(Error::Runtime(format!("failed to start script bridge: {}", e)));
            }
            Err(_) => {
                let _ = thread.join();
                return Err(Error::Runtime("script bridge exited before binding".into()));
            }
        };

        info!(address = %addr, "started script bridge");
        Ok(BridgeServer {
            addr,
            shutdown: Some(shutdown_tx),
            thread: Some(thread),
        })
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stops the listener and waits for its thread.
    pub fn stop(mut self) -> Result<()> {
        self.shutdown_inner()
    }

    fn shutdown_inner(&mut self) -> Result<()> {
        if let Some(shutdown) = self.shutdown.take() {
            // Err means the server already finished on its own.
            let _ = shutdown.send(());
        }
        match self.thread.take() {
            Some(thread) => thread
                .join()
                .map_err(|_| Error::Internal("script bridge thread panicked".into()))?,
            None => return Ok(()),
        }
        trace!(address = %self.addr, "script bridge stopped");
        Ok(())
    }
}

impl Drop for BridgeServer {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown_inner() {
            error!(error = %e, "failed to stop script bridge");
            panic!("failed to stop script bridge: {}", e);
        }
    }
}

fn rpc_filter(
    calls: Sender<BridgeEvent>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    warp::path("rpc")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::json())
        .and_then(move |request: RpcRequest| {
            let calls = calls.clone();
            async move { forward(calls, request).await }
        })
}

async fn forward(
    calls: Sender<BridgeEvent>,
    request: RpcRequest,
) -> std::result::Result<warp::reply::Json, Infallible> {
    debug!(method = %request.method, "bridge call");
    let id = request.id.clone();
    let (reply_tx, reply_rx) = oneshot::channel();
    let response = match calls.send(BridgeEvent::Call {
        request,
        reply: reply_tx,
    }) {
        Ok(()) => reply_rx
            .await
            .unwrap_or_else(|_| RpcResponse::error(id, "script bridge dropped the call")),
        Err(_) => RpcResponse::error(id, "script bridge is shutting down"),
    };
    Ok(warp::reply::json(&response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_forwards_calls_to_owner() {
        let (tx, rx) = mpsc::channel();
        let server = BridgeServer::start(tx).unwrap();
        assert!(server.local_addr().ip().is_loopback());
        let url = format!("http://127.0.0.1:{}/rpc", server.port());

        let client = thread::spawn(move || {
            let http = reqwest::blocking::Client::builder().no_proxy().build().unwrap();
            let request = RpcRequest::new("GasLimit", &json!({})).unwrap();
            let response: RpcResponse = http.post(&url).json(&request).send().unwrap().json().unwrap();
            let not_found = http.get(&url).send().unwrap().status();
            (response, not_found)
        });

        match rx.recv().unwrap() {
            BridgeEvent::Call { request, reply } => {
                assert_eq!(request.op().unwrap(), "GasLimit");
                reply.send(RpcResponse::ok(request.id, json!({"GasLimit": 7}))).unwrap();
            }
            BridgeEvent::Exited(_) => panic!("unexpected exit"),
        }

        let (response, status) = client.join().unwrap();
        assert_eq!(response.result["GasLimit"], 7);
        assert!(response.error.is_none());
        assert!(status.is_client_error());
        server.stop().unwrap();
    }
}
