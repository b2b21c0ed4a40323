//! Message and query routing tables.

use crate::context::Context;
use crate::error::{Error, Result};
use crate::types::AnyMsg;
use ahash::AHashMap;
use std::sync::Arc;
use tracing::debug;

/// Handles one or more message types.
pub trait MsgHandler {
    /// Stateless self-validation, run before any signer check.
    fn validate_basic(&self, _ctx: &Context<'_>, _msg: &AnyMsg) -> Result<()> {
        Ok(())
    }

    /// Accounts that must have authorized `msg`.
    fn signers(&self, msg: &AnyMsg) -> Result<Vec<String>>;

    /// Applies `msg`. Events go to `ctx`; the primary response, if any, is returned.
    fn handle(&self, ctx: &mut Context<'_>, msg: &AnyMsg) -> Result<Option<AnyMsg>>;
}

#[derive(Default)]
pub struct MsgRouter {
    handlers: AHashMap<String, Arc<dyn MsgHandler>>,
}

impl MsgRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, type_url: impl Into<String>, handler: Arc<dyn MsgHandler>) {
        let type_url = type_url.into();
        debug!(%type_url, "registering message handler");
        self.handlers.insert(type_url, handler);
    }

    pub fn route(&self, type_url: &str) -> Result<Arc<dyn MsgHandler>> {
        self.handlers
            .get(type_url)
            .cloned()
            .ok_or_else(|| Error::NoHandler(format!("message {}", type_url)))
    }
}

/// Answers one query path. Request and response bodies are JSON bytes.
pub trait QueryHandler {
    fn query(&self, ctx: &mut Context<'_>, request: &[u8]) -> Result<Vec<u8>>;
}

impl<F> QueryHandler for F
where
    F: Fn(&mut Context<'_>, &[u8]) -> Result<Vec<u8>>,
{
    fn query(&self, ctx: &mut Context<'_>, request: &[u8]) -> Result<Vec<u8>> {
        self(ctx, request)
    }
}

#[derive(Default)]
pub struct QueryRouter {
    handlers: AHashMap<String, Arc<dyn QueryHandler>>,
}

impl QueryRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, path: impl Into<String>, handler: Arc<dyn QueryHandler>) {
        let path = path.into();
        debug!(%path, "registering query handler");
        self.handlers.insert(path, handler);
    }

    pub fn route(&self, path: &str) -> Result<Arc<dyn QueryHandler>> {
        self.handlers
            .get(path)
            .cloned()
            .ok_or_else(|| Error::NoHandler(format!("query path {}", path)))
    }
}

/// Maps a request type URL to its service path:
/// `/pkg.QueryBalanceRequest` becomes `/pkg.Query/Balance`.
///
/// The last `.Query` segment followed by a non-empty method name wins.
pub fn convert_rpc_path(type_url: &str) -> Option<String> {
    let stem = type_url.strip_suffix("Request")?;
    stem.rmatch_indices(".Query")
        .find_map(|(idx, marker)| {
            let service = &stem[..idx + marker.len()];
            let method = &stem[idx + marker.len()..];
            let valid = service.len() > marker.len() + 1
                && service.starts_with('/')
                && !method.is_empty()
                && !method.contains('/');
            valid.then(|| format!("{}/{}", service, method))
        })
}

/// `/pkg.QueryBalanceRequest` answers with `/pkg.QueryBalanceResponse`.
pub fn response_type_url(request_type_url: &str) -> String {
    match request_type_url.strip_suffix("Request") {
        Some(stem) => format!("{}Response", stem),
        None => format!("{}Response", request_type_url),
    }
}
