// ============================================================================
// spark-observe - Primitives Module
// Observed records and the effects that react to them
// ============================================================================

pub mod effect;
pub mod observed;

// Re-export for convenience
pub use effect::{Dispatcher, Effect, EffectFn, EffectOptions, Runnable};
pub use observed::{Field, Observed};
