// ============================================================================
// spark-observe - Core Module
// Identities, configuration, errors and per-runtime state
// ============================================================================

pub mod config;
pub(crate) mod context;
pub mod error;
pub mod types;

pub use config::{DEFAULT_MAX_CHAINED_FLUSHES, RuntimeConfig};
pub use error::{ReactiveError, Result};
pub use types::{EffectId, EffectState, FieldKey, RecordId, Task};
