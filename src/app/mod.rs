//! A single-node host for the script module.
//!
//! [`App`] owns the committed store, the current block header and the
//! per-height snapshots that back historical queries. It is what the CLI and
//! the integration tests drive; a real chain would provide the same pieces.

use crate::config::RuntimeConfig;
use crate::context::{Context, EventManager, Services};
use crate::dispatch::dispatch_message;
use crate::error::{Error, Result, ResultExt};
use crate::gas::GasMeter;
use crate::history::{log_retention_requirement, HistoricalState, RetentionCheck, StateHistory};
use crate::keeper::{self, NameResolver, ScriptKeeper};
use crate::router::{convert_rpc_path, response_type_url};
use crate::runtime::ScriptRuntime;
use crate::storage::{MemoryStore, ParamsStore};
use crate::types::{AnyMsg, BlockHeader, Event, GenesisState, MsgResponse, Params};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

/// Committed state per height, pruned to the configured retention.
#[derive(Clone, Default)]
pub struct SnapshotHistory {
    snapshots: Arc<Mutex<BTreeMap<i64, HistoricalState>>>,
    retain: u64,
}

impl SnapshotHistory {
    /// `retain` is the number of most recent heights kept; 0 keeps every height.
    pub fn new(retain: u64) -> Self {
        Self {
            snapshots: Arc::new(Mutex::new(BTreeMap::new())),
            retain,
        }
    }

    pub fn record(&self, state: HistoricalState) {
        let height = state.header.height;
        let mut snapshots = self.snapshots.lock().unwrap_or_else(PoisonError::into_inner);
        snapshots.insert(height, state);

        if self.retain > 0 {
            let keep_from = height.saturating_sub(self.retain as i64 - 1);
            let before = snapshots.len();
            snapshots.retain(|h, _| *h >= keep_from);
            if snapshots.len() != before {
                debug!(height, keep_from, pruned = before - snapshots.len(), "pruned snapshots");
            }
        }
    }

    pub fn heights(&self) -> Vec<i64> {
        let snapshots = self.snapshots.lock().unwrap_or_else(PoisonError::into_inner);
        snapshots.keys().copied().collect()
    }
}

impl StateHistory for SnapshotHistory {
    fn state_at(&self, height: i64) -> Result<HistoricalState> {
        let snapshots = self.snapshots.lock().unwrap_or_else(PoisonError::into_inner);
        snapshots
            .get(&height)
            .cloned()
            .ok_or_else(|| Error::HistoricalState {
                height,
                reason: "state not retained".into(),
            })
    }
}

/// Outcome of a delivered message.
#[derive(Debug, Clone, PartialEq)]
pub struct TxResult {
    pub response: MsgResponse,
    pub events: Vec<Event>,
    pub gas_used: u64,
}

pub struct App {
    config: RuntimeConfig,
    services: Services,
    keeper: Arc<ScriptKeeper>,
    store: MemoryStore,
    header: BlockHeader,
    history: SnapshotHistory,
}

impl App {
    pub fn new(
        config: RuntimeConfig,
        runtime: Arc<dyn ScriptRuntime>,
        names: Arc<dyn NameResolver>,
    ) -> Result<Self> {
        config.validate()?;
        let history = SnapshotHistory::new(config.min_retain_blocks);
        let mut services = Services::new(Box::new(history.clone()), config.address_codec());
        let keeper = Arc::new(ScriptKeeper::new(runtime, names, config.authority()));
        keeper.register(&mut services);

        info!(
            chain_id = %config.chain_id,
            authority = %keeper.authority(),
            interpreter = %config.interpreter.program,
            "script runtime initialized"
        );
        Ok(App {
            header: BlockHeader::new(0, config.chain_id.clone()),
            config,
            services,
            keeper,
            store: MemoryStore::new(),
            history,
        })
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn keeper(&self) -> &Arc<ScriptKeeper> {
        &self.keeper
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    pub fn header(&self) -> &BlockHeader {
        &self.header
    }

    pub fn history(&self) -> &SnapshotHistory {
        &self.history
    }

    pub fn init_genesis(&mut self, genesis: &GenesisState) -> Result<()> {
        keeper::init_genesis(&mut self.store, genesis)?;
        log_retention_requirement(&genesis.params, self.config.min_retain_blocks);
        Ok(())
    }

    pub fn export_genesis(&self) -> Result<GenesisState> {
        keeper::export_genesis(&self.store)
    }

    /// Opens block `height`. Heights must increase.
    pub fn begin_block(&mut self, height: i64, time: DateTime<Utc>) -> Result<RetentionCheck> {
        if height <= self.header.height {
            return Err(Error::Invalid(format!(
                "block height {} does not follow {}",
                height, self.header.height
            )));
        }
        self.header = BlockHeader {
            height,
            time,
            chain_id: self.config.chain_id.clone(),
            app_hash: self.header.app_hash.clone(),
            hash: String::new(),
        };

        let mut gas = GasMeter::infinite();
        let mut events = EventManager::new();
        let ctx = Context::new(&mut self.store, &mut gas, &mut events, &self.header, &self.services);
        keeper::begin_block(&ctx)
    }

    /// Dispatches `msg` signed by `executor` as one transaction. State changes
    /// and events are kept only if the whole message succeeds.
    pub fn deliver(&mut self, executor: &str, msg: &AnyMsg, gas_limit: u64) -> Result<TxResult> {
        let mut gas = GasMeter::new(gas_limit);
        let mut events = EventManager::new();
        let result = {
            let mut ctx = Context::new(&mut self.store, &mut gas, &mut events, &self.header, &self.services);
            ctx.branch(|c| dispatch_message(c, executor, msg))
        };

        match result {
            Ok(response) => {
                debug!(type_url = %msg.type_url, gas_used = gas.consumed(), "delivered message");
                Ok(TxResult {
                    response,
                    events: events.into_events(),
                    gas_used: gas.consumed(),
                })
            }
            Err(e) => {
                warn!(type_url = %msg.type_url, gas_used = gas.consumed(), error = %e, "message failed");
                Err(e)
            }
        }
    }

    /// Seals the current height: records the app hash and a snapshot for
    /// historical queries. Returns the app hash.
    pub fn commit(&mut self) -> String {
        let app_hash = hex::encode(self.store.root_hash());
        self.header.app_hash = app_hash.clone();
        self.history.record(HistoricalState {
            header: self.header.clone(),
            store: Arc::new(self.store.clone()),
        });
        info!(height = self.header.height, app_hash = %app_hash, "committed");
        app_hash
    }

    /// Answers a query request message against the current state.
    pub fn query(&mut self, request: &AnyMsg) -> Result<AnyMsg> {
        let path = convert_rpc_path(&request.type_url).ok_or_else(|| {
            Error::InvalidRequest(format!("{} is not a query request type", request.type_url))
        })?;
        let handler = self.services.query_router.route(&path)?;
        let body = serde_json::to_vec(&request.body())?;

        let mut gas = GasMeter::infinite();
        let mut events = EventManager::new();
        let mut ctx = Context::new(&mut self.store, &mut gas, &mut events, &self.header, &self.services);
        let response = ctx
            .discard_branch(|c| handler.query(c, &body))
            .with_context(|| format!("failed to execute query {}", path))?;

        match serde_json::from_slice::<Value>(&response)? {
            Value::Object(fields) => Ok(AnyMsg::new(response_type_url(&request.type_url), fields)),
            other => Err(Error::Internal(format!(
                "query {} returned a non-object response: {}",
                path, other
            ))),
        }
    }

    pub fn params(&self) -> Result<Params> {
        self.store.get_params()
    }

    /// Number of raw entries in committed state.
    pub fn state_size(&self) -> usize {
        self.store.len()
    }
}
