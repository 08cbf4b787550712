// ============================================================================
// spark-observe - Runtime
// The public engine handle: observe records, register effects, drain flushes
// ============================================================================

use std::fmt;
use std::rc::Rc;

use crate::core::config::RuntimeConfig;
use crate::core::context::ReactiveContext;
use crate::core::error::{ReactiveError, Result};
use crate::primitives::effect::{Effect, EffectOptions, create_effect};
use crate::primitives::observed::Observed;
use crate::reactivity::scheduling::{MicrotaskQueue, TaskQueue};
use crate::reactivity::tracking::untracked;

/// One reactive engine instance.
///
/// Owns the dependency store, the active-effect stack, the job queue and the
/// flushing flag. Cloning the handle shares the engine; separate runtimes
/// never see each other's effects. The runtime is single-threaded.
///
/// # Example
///
/// ```
/// use spark_observe::{field, Field, Runtime};
/// use std::cell::Cell;
/// use std::rc::Rc;
///
/// struct Counter {
///     count: i32,
/// }
/// const COUNT: Field<Counter, i32> = field!(Counter, count);
///
/// let rt = Runtime::new();
/// let counter = rt.observe(Counter { count: 0 });
/// let seen = Rc::new(Cell::new(-1));
///
/// let c = counter.clone();
/// let seen_clone = seen.clone();
/// rt.register_effect(move || seen_clone.set(c.get(&COUNT))).unwrap();
/// assert_eq!(seen.get(), 0);
///
/// // Both writes land in the same turn and collapse into one re-run
/// counter.update(&COUNT, |n| *n += 1);
/// counter.update(&COUNT, |n| *n += 1);
/// assert_eq!(seen.get(), 0);
///
/// rt.tick();
/// assert_eq!(seen.get(), 2);
/// ```
#[derive(Clone)]
pub struct Runtime {
    ctx: Rc<ReactiveContext>,
    /// The built-in task queue, when no host queue was injected
    microtasks: Option<Rc<MicrotaskQueue>>,
}

impl Runtime {
    /// A runtime with default settings and its own microtask queue.
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    /// A runtime with its own microtask queue, drained by [`Runtime::tick`].
    pub fn with_config(config: RuntimeConfig) -> Self {
        let microtasks = Rc::new(MicrotaskQueue::new());
        let ctx = ReactiveContext::new(config, microtasks.clone());
        Self {
            ctx,
            microtasks: Some(microtasks),
        }
    }

    /// A runtime that hands its flush tasks to a host-provided queue.
    ///
    /// The host is responsible for running those tasks once its current
    /// synchronous work has finished; [`Runtime::tick`] does nothing.
    pub fn with_task_queue(config: RuntimeConfig, queue: Rc<dyn TaskQueue>) -> Self {
        Self {
            ctx: ReactiveContext::new(config, queue),
            microtasks: None,
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        self.ctx.config()
    }

    // =========================================================================
    // OBSERVE
    // =========================================================================

    /// Wrap a record so that reads track and writes trigger.
    ///
    /// Every call produces a new identity, even for equal records.
    pub fn observe<T>(&self, record: T) -> Observed<T> {
        Observed::new(&self.ctx, record)
    }

    // =========================================================================
    // EFFECTS
    // =========================================================================

    /// Register an effect with the default batched scheduling and run it once.
    pub fn register_effect<F>(&self, mut f: F) -> Result<Effect>
    where
        F: FnMut() + 'static,
    {
        self.register_effect_with(move || f(), EffectOptions::new())
    }

    /// Register an effect with explicit options and run it once.
    pub fn register_effect_with<F>(&self, mut f: F, options: EffectOptions) -> Result<Effect>
    where
        F: FnMut() + 'static,
    {
        create_effect(
            &self.ctx,
            Box::new(move || {
                f();
                Ok(())
            }),
            options,
        )
    }

    /// Register an effect whose body can fail.
    ///
    /// A failure of the first run is returned here; failures of later runs
    /// go to whoever ran the effect (a dispatcher, or
    /// [`Runtime::take_failures`] for flushes).
    pub fn try_register_effect<F, E>(&self, mut f: F, options: EffectOptions) -> Result<Effect>
    where
        F: FnMut() -> std::result::Result<(), E> + 'static,
        E: Into<anyhow::Error>,
    {
        create_effect(&self.ctx, Box::new(move || f().map_err(Into::into)), options)
    }

    // =========================================================================
    // SCHEDULING
    // =========================================================================

    /// Drain the built-in microtask queue, running any pending flush.
    ///
    /// Returns how many tasks ran. Always 0 for runtimes built with
    /// [`Runtime::with_task_queue`].
    pub fn tick(&self) -> usize {
        self.microtasks
            .as_ref()
            .map_or(0, |queue| queue.run_until_stalled())
    }

    /// Whether a flush has been requested and has not finished yet
    pub fn is_flush_pending(&self) -> bool {
        self.ctx.is_flushing()
    }

    /// Effects waiting for the next flush
    pub fn queued_effect_count(&self) -> usize {
        self.ctx.queued_len()
    }

    /// Errors from effects that ran during flushes, oldest first.
    pub fn take_failures(&self) -> Vec<ReactiveError> {
        self.ctx.take_failures()
    }

    // =========================================================================
    // TRACKING
    // =========================================================================

    /// Run `f` without subscribing the active effect to anything it reads.
    pub fn untrack<T>(&self, f: impl FnOnce() -> T) -> T {
        untracked(&self.ctx, f)
    }

    /// Whether reads right now would subscribe an effect
    pub fn is_tracking(&self) -> bool {
        self.ctx.active_effect().is_some() && !self.ctx.is_untracking()
    }

    /// Records that currently have at least one subscribed field
    pub fn tracked_record_count(&self) -> usize {
        self.ctx.store().record_count()
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("config", self.ctx.config())
            .field("tracked_records", &self.tracked_record_count())
            .field("queued_effects", &self.queued_effect_count())
            .field("flush_pending", &self.is_flush_pending())
            .finish()
    }
}

// =============================================================================
// TESTS
// =============================================================================
