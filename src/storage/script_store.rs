use super::KVStore;
use crate::error::{Error, Result};
use crate::types::{Params, Script};

pub const SCRIPT_PREFIX: u8 = 0x00;
pub const PARAMS_KEY: u8 = 0x01;

fn script_key(address: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(address.len() + 1);
    key.push(SCRIPT_PREFIX);
    key.extend_from_slice(address.as_bytes());
    key
}

/// Durable map from script address to [`Script`].
///
/// Performs no validation or version bookkeeping; callers own both.
pub trait ScriptStore: KVStore {
    fn get_script(&self, address: &str) -> Result<Script> {
        let bytes = self.get(&script_key(address)).ok_or_else(|| {
            Error::NotFound(format!("script with address {} doesn't exist", address))
        })?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn set_script(&mut self, address: &str, script: &Script) -> Result<()> {
        let bytes = serde_json::to_vec(script)?;
        self.set(script_key(address), bytes);
        Ok(())
    }

    fn has_script(&self, address: &str) -> bool {
        self.has(&script_key(address))
    }

    /// Every stored script, ordered by address.
    fn scripts(&self) -> Result<Vec<Script>> {
        self.prefix_entries(&[SCRIPT_PREFIX])
            .into_iter()
            .map(|(_, bytes)| serde_json::from_slice(&bytes).map_err(Error::from))
            .collect()
    }
}

impl<T: KVStore + ?Sized> ScriptStore for T {}

pub trait ParamsStore: KVStore {
    /// Stored params, or the defaults if none were ever written.
    fn get_params(&self) -> Result<Params> {
        match self.get(&[PARAMS_KEY]) {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => Ok(Params::default()),
        }
    }

    fn set_params(&mut self, params: &Params) -> Result<()> {
        params.validate()?;
        self.set(vec![PARAMS_KEY], serde_json::to_vec(params)?);
        Ok(())
    }
}

impl<T: KVStore + ?Sized> ParamsStore for T {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[test]
    fn test_script_store_operations() {
        let mut store = MemoryStore::new();
        assert!(!store.has_script("dys1a"));
        assert!(store.get_script("dys1a").unwrap_err().is_not_found());

        let script = Script {
            address: "dys1a".into(),
            version: 3,
            code: "x=1".into(),
        };
        store.set_script("dys1a", &script).unwrap();
        store.set_script("dys1b", &Script::empty("dys1b")).unwrap();

        assert!(store.has_script("dys1a"));
        assert_eq!(store.get_script("dys1a").unwrap(), script);
        assert_eq!(store.scripts().unwrap().len(), 2);
    }

    #[test]
    fn test_params_store_defaults_and_validation() {
        let mut store = MemoryStore::new();
        assert_eq!(store.get_params().unwrap(), Params::default());

        store.set_params(&Params::new(5, 1)).unwrap();
        assert_eq!(store.get_params().unwrap(), Params::new(5, 1));
        assert!(store.set_params(&Params::new(-5, 1)).is_err());
        assert_eq!(store.scripts().unwrap().len(), 0);
    }
}
