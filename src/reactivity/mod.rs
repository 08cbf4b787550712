// ============================================================================
// spark-observe - Reactivity Module
// Dependency tracking, triggering and batched effect scheduling
// ============================================================================

pub mod scheduling;
pub(crate) mod tracking;

// Re-export the task queue seam
pub use scheduling::{MicrotaskQueue, TaskQueue};
