//! Execution context and atomic branching.
//!
//! A [`Context`] is the view one operation has of the chain: a state store,
//! the ambient gas meter, the event log, the block header, the shared
//! [`Services`] and the current script-call depth. Branches are child contexts
//! over a [`CacheStore`]; their writes and events reach the parent only when
//! the branch succeeds. Because a child borrows its parent mutably, branches
//! always form a strict stack.

use crate::error::Result;
use crate::gas::GasMeter;
use crate::history::StateHistory;
use crate::router::{MsgRouter, QueryRouter};
use crate::storage::{CacheStore, KVStore};
use crate::types::{AddressCodec, BlockHeader, Event, TypedEvent};
use tracing::trace;

/// Registries and capabilities shared by every context of an application.
pub struct Services {
    pub msg_router: MsgRouter,
    pub query_router: QueryRouter,
    pub history: Box<dyn StateHistory>,
    pub address_codec: AddressCodec,
}

impl Services {
    pub fn new(history: Box<dyn StateHistory>, address_codec: AddressCodec) -> Self {
        Self {
            msg_router: MsgRouter::new(),
            query_router: QueryRouter::new(),
            history,
            address_codec,
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EventManager {
    events: Vec<Event>,
}

impl EventManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn emit_typed<E: TypedEvent>(&mut self, event: &E) -> Result<()> {
        self.events.push(event.to_event()?);
        Ok(())
    }

    pub fn extend(&mut self, events: impl IntoIterator<Item = Event>) {
        self.events.extend(events);
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn into_events(self) -> Vec<Event> {
        self.events
    }
}

pub struct Context<'a> {
    store: &'a mut dyn KVStore,
    gas: &'a mut GasMeter,
    events: &'a mut EventManager,
    header: &'a BlockHeader,
    services: &'a Services,
    depth: u32,
}

impl<'a> Context<'a> {
    pub fn new(
        store: &'a mut dyn KVStore,
        gas: &'a mut GasMeter,
        events: &'a mut EventManager,
        header: &'a BlockHeader,
        services: &'a Services,
    ) -> Self {
        Self {
            store,
            gas,
            events,
            header,
            services,
            depth: 0,
        }
    }

    pub fn store(&self) -> &dyn KVStore {
        &*self.store
    }

    pub fn store_mut(&mut self) -> &mut dyn KVStore {
        &mut *self.store
    }

    pub fn gas_meter(&self) -> &GasMeter {
        self.gas
    }

    pub fn gas_meter_mut(&mut self) -> &mut GasMeter {
        self.gas
    }

    pub fn events(&self) -> &EventManager {
        self.events
    }

    pub fn emit(&mut self, event: Event) {
        self.events.emit(event);
    }

    pub fn emit_typed<E: TypedEvent>(&mut self, event: &E) -> Result<()> {
        self.events.emit_typed(event)
    }

    pub fn emit_all(&mut self, events: Vec<Event>) {
        self.events.extend(events);
    }

    pub fn header(&self) -> &BlockHeader {
        self.header
    }

    pub fn block_height(&self) -> i64 {
        self.header.height
    }

    pub fn services(&self) -> &'a Services {
        self.services
    }

    pub fn address_codec(&self) -> &'a AddressCodec {
        &self.services.address_codec
    }

    /// Number of script invocations on the current call stack.
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Same view, one script-call level deeper. The parent's depth is
    /// untouched, so leaving the nested call restores it on every path.
    pub fn descend(&mut self) -> Context<'_> {
        Context {
            store: &mut *self.store,
            gas: &mut *self.gas,
            events: &mut *self.events,
            header: self.header,
            services: self.services,
            depth: self.depth + 1,
        }
    }

    /// Runs `f` in an isolated branch sharing this context's gas meter.
    /// Writes and events are promoted only if `f` succeeds.
    pub fn branch<T>(&mut self, f: impl FnOnce(&mut Context<'_>) -> Result<T>) -> Result<T> {
        let (result, changes, events) = {
            let mut cache = CacheStore::new(&*self.store);
            let mut events = EventManager::new();
            let result = {
                let mut child = Context {
                    store: &mut cache,
                    gas: &mut *self.gas,
                    events: &mut events,
                    header: self.header,
                    services: self.services,
                    depth: self.depth,
                };
                f(&mut child)
            };
            (result, cache.into_changes(), events)
        };

        if result.is_ok() {
            trace!(writes = changes.len(), "committing branch");
            self.store.apply(changes);
            self.events.extend(events.into_events());
        }
        result
    }

    /// Runs `f` in a branch with its own meter bounded by `gas_limit`.
    ///
    /// Gas used inside the branch is charged to this context whatever the
    /// outcome; writes and events are promoted only on success. Returns the
    /// result together with the gas the branch used.
    pub fn branch_with_gas_limit<T>(
        &mut self,
        gas_limit: u64,
        f: impl FnOnce(&mut Context<'_>) -> Result<T>,
    ) -> (Result<T>, u64) {
        let mut meter = GasMeter::new(gas_limit);
        let (result, changes, events) = {
            let mut cache = CacheStore::new(&*self.store);
            let mut events = EventManager::new();
            let result = {
                let mut child = Context {
                    store: &mut cache,
                    gas: &mut meter,
                    events: &mut events,
                    header: self.header,
                    services: self.services,
                    depth: self.depth,
                };
                f(&mut child)
            };
            (result, cache.into_changes(), events)
        };

        let gas_used = meter.consumed();
        let charged = self.gas.consume(gas_used, "sub-branch");
        let result = match (result, charged) {
            (Ok(value), Ok(())) => {
                self.store.apply(changes);
                self.events.extend(events.into_events());
                Ok(value)
            }
            (Err(e), _) | (Ok(_), Err(e)) => Err(e),
        };
        (result, gas_used)
    }

    /// Runs `f` in a branch that is always discarded.
    pub fn discard_branch<T>(&mut self, f: impl FnOnce(&mut Context<'_>) -> Result<T>) -> Result<T> {
        let mut cache = CacheStore::new(&*self.store);
        let mut events = EventManager::new();
        let mut child = Context {
            store: &mut cache,
            gas: &mut *self.gas,
            events: &mut events,
            header: self.header,
            services: self.services,
            depth: self.depth,
        };
        f(&mut child)
    }

    /// Runs `f` against this store with a fresh event log and returns the
    /// events it produced separately. Writes are not isolated.
    pub fn with_fresh_events<T>(
        &mut self,
        f: impl FnOnce(&mut Context<'_>) -> Result<T>,
    ) -> (Result<T>, Vec<Event>) {
        let mut events = EventManager::new();
        let result = {
            let mut child = Context {
                store: &mut *self.store,
                gas: &mut *self.gas,
                events: &mut events,
                header: self.header,
                services: self.services,
                depth: self.depth,
            };
            f(&mut child)
        };
        (result, events.into_events())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::history::NoHistory;
    use crate::storage::MemoryStore;

    fn services() -> Services {
        Services::new(Box::new(NoHistory), AddressCodec::default())
    }

    #[test]
    fn test_branch_commits_on_success_only() {
        let services = services();
        let header = BlockHeader::new(1, "test");
        let mut store = MemoryStore::new();
        let mut gas = GasMeter::new(100);
        let mut events = EventManager::new();
        let mut ctx = Context::new(&mut store, &mut gas, &mut events, &header, &services);

        ctx.branch(|c| {
            c.store_mut().set(b"ok".to_vec(), b"1".to_vec());
            c.emit(Event::new("kept"));
            Ok(())
        })
        .unwrap();

        let failed: Result<()> = ctx.branch(|c| {
            c.store_mut().set(b"bad".to_vec(), b"1".to_vec());
            c.emit(Event::new("dropped"));
            c.gas_meter_mut().consume(7, "test")?;
            Err(Error::Invalid("nope".into()))
        });
        assert!(failed.is_err());

        assert!(ctx.store().has(b"ok"));
        assert!(!ctx.store().has(b"bad"));
        assert_eq!(ctx.events().events().len(), 1);
        assert_eq!(ctx.gas_meter().consumed(), 7);
    }

    #[test]
    fn test_sub_branch_gas_always_charged() {
        let services = services();
        let header = BlockHeader::new(1, "test");
        let mut store = MemoryStore::new();
        let mut gas = GasMeter::new(100);
        let mut events = EventManager::new();
        let mut ctx = Context::new(&mut store, &mut gas, &mut events, &header, &services);

        let (result, used) = ctx.branch_with_gas_limit(10, |c| {
            c.store_mut().set(b"k".to_vec(), b"v".to_vec());
            c.gas_meter_mut().consume(25, "too much")
        });
        assert!(result.unwrap_err().is_out_of_gas());
        assert_eq!(used, 10);
        assert_eq!(ctx.gas_meter().consumed(), 10);
        assert!(!ctx.store().has(b"k"));

        let (result, used) = ctx.branch_with_gas_limit(10, |c| {
            c.store_mut().set(b"k".to_vec(), b"v".to_vec());
            c.gas_meter_mut().consume(4, "fine")
        });
        assert!(result.is_ok());
        assert_eq!(used, 4);
        assert_eq!(ctx.gas_meter().consumed(), 14);
        assert!(ctx.store().has(b"k"));
    }

    #[test]
    fn test_descend_and_discard() {
        let services = services();
        let header = BlockHeader::new(1, "test");
        let mut store = MemoryStore::new();
        let mut gas = GasMeter::infinite();
        let mut events = EventManager::new();
        let mut ctx = Context::new(&mut store, &mut gas, &mut events, &header, &services);

        {
            let mut nested = ctx.descend();
            assert_eq!(nested.depth(), 1);
            assert_eq!(nested.descend().depth(), 2);
        }
        assert_eq!(ctx.depth(), 0);

        ctx.discard_branch(|c| {
            c.store_mut().set(b"tmp".to_vec(), b"1".to_vec());
            Ok(())
        })
        .unwrap();
        assert!(!ctx.store().has(b"tmp"));
    }
}
