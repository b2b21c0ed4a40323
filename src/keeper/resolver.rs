use crate::context::Context;
use crate::error::{Error, Result};
use ahash::AHashMap;

/// Turns a script alias or address into a validated address.
pub trait NameResolver: Send + Sync {
    fn resolve_name_or_address(&self, ctx: &Context<'_>, name_or_address: &str) -> Result<String>;
}

/// Accepts well-formed addresses only.
#[derive(Debug, Default, Clone, Copy)]
pub struct AddressResolver;

impl NameResolver for AddressResolver {
    fn resolve_name_or_address(&self, ctx: &Context<'_>, name_or_address: &str) -> Result<String> {
        ctx.address_codec()
            .validate(name_or_address)
            .map_err(|e| Error::NameResolution {
                name: name_or_address.to_string(),
                reason: e.to_string(),
            })?;
        Ok(name_or_address.to_string())
    }
}

/// Fixed alias table on top of plain addresses.
#[derive(Debug, Default, Clone)]
pub struct StaticNameResolver {
    names: AHashMap<String, String>,
}

impl StaticNameResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>, address: impl Into<String>) -> Self {
        self.names.insert(name.into(), address.into());
        self
    }
}

impl NameResolver for StaticNameResolver {
    fn resolve_name_or_address(&self, ctx: &Context<'_>, name_or_address: &str) -> Result<String> {
        if ctx.address_codec().validate(name_or_address).is_ok() {
            return Ok(name_or_address.to_string());
        }
        match self.names.get(name_or_address) {
            Some(address) => Ok(address.clone()),
            None => Err(Error::NameResolution {
                name: name_or_address.to_string(),
                reason: "not a valid address or registered name".into(),
            }),
        }
    }
}
