// ============================================================================
// spark-observe - Runtime Configuration
// ============================================================================

/// Default cap on flush cycles chained back to back by effects that keep
/// writing fields other effects read.
pub const DEFAULT_MAX_CHAINED_FLUSHES: u32 = 1000;

/// Tunables for a [`Runtime`](crate::Runtime).
///
/// # Example
///
/// ```
/// use spark_observe::{Runtime, RuntimeConfig};
///
/// let config = RuntimeConfig::default()
///     .with_max_chained_flushes(16)
///     .with_catch_panics(false);
/// let rt = Runtime::with_config(config);
/// assert_eq!(rt.config().max_chained_flushes, 16);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// How many flush cycles may follow each other, each one requested by
    /// writes made during the previous, before the pending jobs are dropped.
    pub max_chained_flushes: u32,

    /// Catch panics raised by effect bodies and report them as
    /// [`ReactiveError::EffectPanicked`](crate::ReactiveError::EffectPanicked).
    /// When off, the panic unwinds to the caller once the runtime has
    /// restored its own state.
    pub catch_panics: bool,
}

impl RuntimeConfig {
    pub fn with_max_chained_flushes(mut self, limit: u32) -> Self {
        self.max_chained_flushes = limit;
        self
    }

    pub fn with_catch_panics(mut self, catch: bool) -> Self {
        self.catch_panics = catch;
        self
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_chained_flushes: DEFAULT_MAX_CHAINED_FLUSHES,
            catch_panics: true,
        }
    }
}
