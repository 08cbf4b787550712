// ============================================================================
// spark-observe - Observed Records and Batched Effects for Rust
// ============================================================================
//
// Wrap a plain record with Runtime::observe, register effects that read its
// fields, and the effects re-run after the fields they read are written.
// Writes in the same synchronous turn collapse into a single re-run per
// effect; an effect can opt out of batching with a custom dispatcher.
// ============================================================================

pub mod core;
pub mod primitives;
pub mod reactivity;
pub mod runtime;

mod macros;

// Re-export core items at crate root for ergonomic access
pub use crate::core::config::{DEFAULT_MAX_CHAINED_FLUSHES, RuntimeConfig};
pub use crate::core::error::{ReactiveError, Result};
pub use crate::core::types::{EffectId, EffectState, FieldKey, RecordId, Task};

// Re-export the engine handle and its primitives
pub use primitives::effect::{Dispatcher, Effect, EffectFn, EffectOptions, Runnable};
pub use primitives::observed::{Field, Observed};
pub use reactivity::scheduling::{MicrotaskQueue, TaskQueue};
pub use runtime::Runtime;

// =============================================================================
// TESTS
// =============================================================================
