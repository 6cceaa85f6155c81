//! Ordered hook-chain dispatcher (spec §2 "Hook dispatcher", §4.3, §9).
//!
//! Modules contribute callbacks to named chains during initialization only;
//! the dispatcher is frozen before `GO` runs any worker thread so that
//! after that point every chain can be read without locking.

use std::collections::HashMap;
use std::sync::Arc;
use wiretest_core::Origin;

/// Every event point the core invokes modules at (spec §2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookId {
    ReadLine,
    BlockStart,
    BlockEnd,
    PreConnect,
    PostConnect,
    LineSent,
    WaitBegin,
    WaitEnd,
    ReadStatus,
    ReadHeader,
    ReadBuf,
    WorkerClone,
    WorkerFinally,
    WorkerJoined,
    ClientCreate,
    ClientStart,
    Accept,
    ServerPortArgs,
}

/// Event payload. Deliberately a flat enum of primitive data rather than a
/// reference to `Worker`/`Socket` types: hooks are meant to be implementable
/// by modules that know nothing about the interpreter's internals.
#[derive(Debug, Clone)]
pub enum HookPayload {
    Line { origin: Origin, text: String },
    Name(String),
    Address { host: String, port: u16 },
    Bytes(Vec<u8>),
    Text(String),
    None,
}

/// How a chain combines the results of its handlers (spec §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Run handlers in order until one returns `Some`; that result wins.
    FirstMatch,
    /// Run every handler; the last `Some` result wins.
    All,
}

pub type HookFn = Arc<dyn Fn(&HookPayload) -> Option<HookPayload> + Send + Sync>;

struct Chain {
    mode: RunMode,
    handlers: Vec<(i32, HookFn)>,
}

pub struct HookDispatcher {
    chains: HashMap<HookId, Chain>,
    frozen: bool,
}

impl Default for HookDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl HookDispatcher {
    pub fn new() -> Self {
        Self {
            chains: HashMap::new(),
            frozen: false,
        }
    }

    /// Register a callback on `id`'s chain. `priority` is a sort hint;
    /// handlers registered at equal priority run in registration order.
    /// Panics if called after [`HookDispatcher::freeze`] — registration is
    /// an initialization-time-only activity (spec §9 "Register during
    /// initialization only; freeze before GO").
    pub fn register(&mut self, id: HookId, mode: RunMode, priority: i32, handler: HookFn) {
        assert!(
            !self.frozen,
            "hook chains are frozen; cannot register {id:?} after GO"
        );
        let chain = self.chains.entry(id).or_insert_with(|| Chain {
            mode,
            handlers: Vec::new(),
        });
        debug_assert_eq!(chain.mode, mode, "hook {id:?} registered with inconsistent run mode");
        chain.handlers.push((priority, handler));
    }

    /// Freeze all chains: stable-sort by priority (preserving registration
    /// order among ties) and forbid further registration.
    pub fn freeze(&mut self) {
        for chain in self.chains.values_mut() {
            chain.handlers.sort_by_key(|(priority, _)| *priority);
        }
        self.frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Invoke `id`'s chain with `payload`, per its configured [`RunMode`].
    pub fn run(&self, id: HookId, payload: &HookPayload) -> Option<HookPayload> {
        let chain = self.chains.get(&id)?;
        let mut result = None;
        for (_, handler) in &chain.handlers {
            let out = handler(payload);
            match chain.mode {
                RunMode::FirstMatch => {
                    if out.is_some() {
                        return out;
                    }
                }
                RunMode::All => {
                    if out.is_some() {
                        result = out;
                    }
                }
            }
        }
        result
    }

    pub fn handler_count(&self, id: HookId) -> usize {
        self.chains.get(&id).map_or(0, |c| c.handlers.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_match_short_circuits() {
        let mut dispatcher = HookDispatcher::new();
        dispatcher.register(
            HookId::ReadLine,
            RunMode::FirstMatch,
            0,
            Arc::new(|_| None),
        );
        dispatcher.register(
            HookId::ReadLine,
            RunMode::FirstMatch,
            0,
            Arc::new(|_| Some(HookPayload::Text("rewritten".into()))),
        );
        dispatcher.register(
            HookId::ReadLine,
            RunMode::FirstMatch,
            0,
            Arc::new(|_| Some(HookPayload::Text("should not run".into()))),
        );
        dispatcher.freeze();
        let out = dispatcher.run(HookId::ReadLine, &HookPayload::None);
        match out {
            Some(HookPayload::Text(s)) => assert_eq!(s, "rewritten"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn all_mode_keeps_last_result() {
        let mut dispatcher = HookDispatcher::new();
        dispatcher.register(
            HookId::LineSent,
            RunMode::All,
            0,
            Arc::new(|_| Some(HookPayload::Text("first".into()))),
        );
        dispatcher.register(
            HookId::LineSent,
            RunMode::All,
            0,
            Arc::new(|_| Some(HookPayload::Text("second".into()))),
        );
        dispatcher.freeze();
        let out = dispatcher.run(HookId::LineSent, &HookPayload::None);
        match out {
            Some(HookPayload::Text(s)) => assert_eq!(s, "second"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unregistered_chain_returns_none() {
        let mut dispatcher = HookDispatcher::new();
        dispatcher.freeze();
        assert!(dispatcher.run(HookId::Accept, &HookPayload::None).is_none());
    }

    #[test]
    #[should_panic(expected = "frozen")]
    fn register_after_freeze_panics() {
        let mut dispatcher = HookDispatcher::new();
        dispatcher.freeze();
        dispatcher.register(HookId::Accept, RunMode::All, 0, Arc::new(|_| None));
    }
}
