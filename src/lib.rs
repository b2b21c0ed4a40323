pub mod app;
pub mod bridge;
pub mod cli;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod gas;
pub mod history;
pub mod keeper;
pub mod router;
pub mod runtime;
pub mod storage;
pub mod types;

// Re-export commonly used types
pub use app::{App, SnapshotHistory, TxResult};
pub use config::{InterpreterConfig, RuntimeConfig};
pub use context::{Context, EventManager, Services};
pub use error::{Error, Result};
pub use gas::{GasInfo, GasMeter};
pub use keeper::{ExecutionContext, ScriptKeeper};
pub use runtime::{Invocation, ProcessRuntime, RunningScript, RuntimeOutput, ScriptRuntime};
pub use storage::{KVStore, MemoryStore};
pub use types::{AnyMsg, BlockHeader, MsgExec, MsgExecResponse, Params, Script};
