// ============================================================================
// spark-observe - Core Types
// Identities and small value types shared by every layer
// ============================================================================

use std::fmt;

// =============================================================================
// IDENTITIES
// =============================================================================

/// Stable handle assigned to an observed record when it is wrapped.
///
/// The dependency store is keyed by this handle, never by the record itself,
/// so tracking a record does not extend its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId(pub(crate) u64);

impl RecordId {
    /// Raw numeric value of the handle
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "record#{}", self.0)
    }
}

/// Identity of a registered effect. Subscriber sets compare effects by this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EffectId(pub(crate) u64);

impl EffectId {
    /// Raw numeric value of the identity
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EffectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "effect#{}", self.0)
    }
}

/// Name of a field on an observed record.
pub type FieldKey = &'static str;

// =============================================================================
// EFFECT STATE
// =============================================================================

/// Where an effect currently is in its run cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EffectState {
    /// Not running and not waiting in the job queue
    #[default]
    Idle,
    /// On the active-effect stack
    Running,
    /// Waiting for the next flush
    Queued,
}

// =============================================================================
// TASKS
// =============================================================================

/// A unit of deferred work handed to a [`TaskQueue`](crate::TaskQueue).
pub type Task = Box<dyn FnOnce()>;
