use crate::error::Result;
use crate::storage::{KVStore, ParamsStore, ScriptStore};
use crate::types::GenesisState;
use tracing::info;

/// Loads params and scripts into an empty module store.
pub fn init_genesis(store: &mut dyn KVStore, genesis: &GenesisState) -> Result<()> {
    genesis.validate()?;
    store.set_params(&genesis.params)?;
    for script in &genesis.scripts {
        store.set_script(&script.address, script)?;
    }
    info!(scripts = genesis.scripts.len(), "initialized script genesis");
    Ok(())
}

/// Current params and every script, ordered by address.
pub fn export_genesis(store: &dyn KVStore) -> Result<GenesisState> {
    Ok(GenesisState {
        params: store.get_params()?,
        scripts: store.scripts()?,
    })
}
