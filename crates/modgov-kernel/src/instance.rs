use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use modgov_runtime::Container;
use modgov_types::ModuleId;

/// An instance's lifecycle state (spec §3: "state only advances").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum InstanceState {
    Starting = 0,
    Ready = 1,
    Dying = 2,
    Destroyed = 3,
}

impl InstanceState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => InstanceState::Starting,
            1 => InstanceState::Ready,
            2 => InstanceState::Dying,
            _ => InstanceState::Destroyed,
        }
    }
}

const REFCOUNT_BITS: u32 = 32;
const REFCOUNT_MASK: u64 = (1u64 << REFCOUNT_BITS) - 1;

fn pack(state: InstanceState, refcount: u32) -> u64 {
    ((state as u64) << REFCOUNT_BITS) | refcount as u64
}

fn unpack(word: u64) -> (InstanceState, u32) {
    (InstanceState::from_u8((word >> REFCOUNT_BITS) as u8), (word & REFCOUNT_MASK) as u32)
}

/// One running incarnation of a module at a specific version (spec §3).
///
/// State and reference count share a single atomic word so that observing
/// `state == Dying && refcount == 0` is consistent — two separate atomics
/// could be read in a torn combination that never actually existed.
pub struct Instance {
    pub module_id: ModuleId,
    pub version: String,
    pub labels: HashMap<String, String>,
    pub container: Arc<dyn Container>,
    word: AtomicU64,
}

impl Instance {
    pub fn new(
        module_id: ModuleId,
        version: impl Into<String>,
        labels: HashMap<String, String>,
        container: Arc<dyn Container>,
    ) -> Self {
        Instance {
            module_id,
            version: version.into(),
            labels,
            container,
            word: AtomicU64::new(pack(InstanceState::Starting, 0)),
        }
    }

    pub fn state(&self) -> InstanceState {
        unpack(self.word.load(Ordering::Acquire)).0
    }

    pub fn refcount(&self) -> u32 {
        unpack(self.word.load(Ordering::Acquire)).1
    }

    /// Advances state forward only; a no-op if `target` would move state
    /// backward or sideways. Returns the state actually in effect after the
    /// call so a caller that raced another advancer can react accordingly.
    pub fn advance_to(&self, target: InstanceState) -> InstanceState {
        loop {
            let current = self.word.load(Ordering::Acquire);
            let (state, refcount) = unpack(current);
            if target <= state {
                return state;
            }
            let next = pack(target, refcount);
            if self.word.compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire).is_ok() {
                return target;
            }
        }
    }

    /// Increments the reference count iff state is Ready or Dying.
    /// Returns `false` if the instance is Destroyed (caller must re-route).
    pub fn enter(&self) -> bool {
        loop {
            let current = self.word.load(Ordering::Acquire);
            let (state, refcount) = unpack(current);
            if !matches!(state, InstanceState::Ready | InstanceState::Dying) {
                return false;
            }
            let next = pack(state, refcount + 1);
            if self.word.compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire).is_ok() {
                return true;
            }
        }
    }

    /// Decrements the reference count. Returns `true` if, after the
    /// decrement, the instance is Dying with a zero refcount — the signal
    /// for the cleanup scheduler to destroy it.
    pub fn exit(&self) -> bool {
        loop {
            let current = self.word.load(Ordering::Acquire);
            let (state, refcount) = unpack(current);
            debug_assert!(refcount > 0, "exit() called without a matching enter()");
            let new_refcount = refcount.saturating_sub(1);
            let next = pack(state, new_refcount);
            if self.word.compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire).is_ok() {
                return state == InstanceState::Dying && new_refcount == 0;
            }
        }
    }

    pub fn is_destructible(&self) -> bool {
        let (state, refcount) = unpack(self.word.load(Ordering::Acquire));
        state == InstanceState::Dying && refcount == 0
    }
}

impl std::fmt::Debug for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instance")
            .field("module_id", &self.module_id)
            .field("version", &self.version)
            .field("state", &self.state())
            .field("refcount", &self.refcount())
            .finish()
    }
}
