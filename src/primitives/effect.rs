// ============================================================================
// spark-observe - Effect System
// Computations that re-run when the fields they read are written
// ============================================================================
//
// Every run of an effect:
// 1. leaves every dependency set joined during the previous run
// 2. pushes itself onto the active-effect stack
// 3. runs the body, whose reads join fresh dependency sets
// 4. pops itself, restoring whichever effect was active before
//
// Step 1 is what makes branch switching work: a field read only inside a
// branch that is no longer taken stops triggering the effect.
// Step 4 happens on every exit path, panics included.
// ============================================================================

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use tracing::{debug, trace, warn};

use crate::core::context::ReactiveContext;
use crate::core::error::{ReactiveError, Result};
use crate::core::types::{EffectId, EffectState};
use crate::reactivity::tracking::DepSet;

// =============================================================================
// TYPE ALIASES
// =============================================================================

/// Effect body as stored by the runtime
pub type EffectFn = Box<dyn FnMut() -> anyhow::Result<()>>;

/// Custom dispatch function. Receives the effect's runnable each time one of
/// its dependencies is written and decides whether and when to run it.
pub type Dispatcher = Rc<dyn Fn(Runnable)>;

// =============================================================================
// EFFECT OPTIONS
// =============================================================================

/// Registration options for an effect.
///
/// # Example
///
/// ```
/// use spark_observe::{EffectOptions, Runtime};
/// use std::cell::RefCell;
/// use std::rc::Rc;
///
/// let rt = Runtime::new();
/// let pending = Rc::new(RefCell::new(Vec::new()));
/// let pending_clone = pending.clone();
///
/// let options = EffectOptions::new().dispatch(move |runnable| {
///     pending_clone.borrow_mut().push(runnable);
/// });
/// let effect = rt.register_effect_with(|| {}, options).unwrap();
/// assert!(effect.has_dispatcher());
/// assert!(pending.borrow().is_empty());
/// ```
#[derive(Clone, Default)]
pub struct EffectOptions {
    pub(crate) dispatch: Option<Dispatcher>,
}

impl EffectOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace batched scheduling with a custom dispatcher for this effect.
    pub fn dispatch<F>(mut self, dispatch: F) -> Self
    where
        F: Fn(Runnable) + 'static,
    {
        self.dispatch = Some(Rc::new(dispatch));
        self
    }
}

impl fmt::Debug for EffectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectOptions")
            .field("dispatch", &self.dispatch.is_some())
            .finish()
    }
}

// =============================================================================
// EFFECT INNER
// =============================================================================

/// The shared state of one effect.
pub(crate) struct EffectInner {
    id: EffectId,

    /// The user computation
    func: RefCell<EffectFn>,

    /// Custom dispatcher, if registered with one
    dispatch: Option<Dispatcher>,

    /// Dependency sets joined during the latest run. Weak: the store owns
    /// them, and a set can disappear when its record is dropped.
    deps: RefCell<Vec<Weak<DepSet>>>,

    state: Cell<EffectState>,
    run_count: Cell<u64>,
}

impl EffectInner {
    pub(crate) fn new(id: EffectId, func: EffectFn, dispatch: Option<Dispatcher>) -> Rc<Self> {
        Rc::new(Self {
            id,
            func: RefCell::new(func),
            dispatch,
            deps: RefCell::new(Vec::new()),
            state: Cell::new(EffectState::Idle),
            run_count: Cell::new(0),
        })
    }

    pub(crate) fn id(&self) -> EffectId {
        self.id
    }

    pub(crate) fn dispatcher(&self) -> Option<Dispatcher> {
        self.dispatch.clone()
    }

    pub(crate) fn state(&self) -> EffectState {
        self.state.get()
    }

    pub(crate) fn set_state(&self, state: EffectState) {
        self.state.set(state);
    }

    pub(crate) fn run_count(&self) -> u64 {
        self.run_count.get()
    }

    pub(crate) fn add_dep(&self, set: &Rc<DepSet>) {
        self.deps.borrow_mut().push(Rc::downgrade(set));
    }

    /// Number of dependency sets still alive
    pub(crate) fn dependency_count(&self) -> usize {
        self.deps
            .borrow()
            .iter()
            .filter(|dep| dep.strong_count() > 0)
            .count()
    }
}

// =============================================================================
// EFFECT HANDLE
// =============================================================================

/// Handle to a registered effect.
///
/// Dropping the handle does not stop the effect: it keeps running for as
/// long as it is subscribed to anything.
#[derive(Clone)]
pub struct Effect {
    inner: Rc<EffectInner>,
}

impl Effect {
    pub(crate) fn from_inner(inner: Rc<EffectInner>) -> Self {
        Self { inner }
    }

    pub fn id(&self) -> EffectId {
        self.inner.id
    }

    pub fn state(&self) -> EffectState {
        self.inner.state()
    }

    /// How many times the body has been executed
    pub fn run_count(&self) -> u64 {
        self.inner.run_count()
    }

    /// How many fields the latest run read
    pub fn dependency_count(&self) -> usize {
        self.inner.dependency_count()
    }

    pub fn has_dispatcher(&self) -> bool {
        self.inner.dispatch.is_some()
    }
}

impl PartialEq for Effect {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Effect {}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.id())
            .field("state", &self.state())
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .finish()
    }
}

// =============================================================================
// RUNNABLE
// =============================================================================

/// What a custom dispatcher receives: a way to run one effect.
#[derive(Clone)]
pub struct Runnable {
    effect: Rc<EffectInner>,
    ctx: Weak<ReactiveContext>,
}

impl Runnable {
    pub(crate) fn new(effect: Rc<EffectInner>, ctx: Weak<ReactiveContext>) -> Self {
        Self { effect, ctx }
    }

    pub fn effect_id(&self) -> EffectId {
        self.effect.id
    }

    /// Run the effect now, re-collecting its dependencies.
    pub fn run(&self) -> Result<()> {
        let ctx = self.ctx.upgrade().ok_or(ReactiveError::RuntimeDropped)?;
        run_effect(&ctx, &self.effect)
    }
}

impl fmt::Debug for Runnable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runnable")
            .field("effect", &self.effect.id)
            .finish()
    }
}

// =============================================================================
// CLEANUP - Leave every dependency set of the previous run
// =============================================================================

fn cleanup_deps(ctx: &ReactiveContext, effect: &EffectInner) {
    let deps = effect.deps.replace(Vec::new());
    for set in deps.iter().filter_map(Weak::upgrade) {
        // Keep the returned Rc alive until the set's borrow is released
        let removed = set.unsubscribe(effect.id);
        trace!(
            effect = %effect.id,
            record = %set.record(),
            field = set.field(),
            "left dependency set"
        );
        ctx.store().prune(&set);
        drop(removed);
    }
}

// =============================================================================
// ACTIVE EFFECT GUARD
// =============================================================================

/// Holds the effect's slot on the active-effect stack; releases it on drop.
struct ActiveEffectGuard<'a> {
    ctx: &'a ReactiveContext,
    effect: &'a EffectInner,
}

impl<'a> ActiveEffectGuard<'a> {
    fn enter(ctx: &'a ReactiveContext, effect: &'a Rc<EffectInner>) -> Self {
        ctx.push_effect(effect.clone());
        effect.set_state(EffectState::Running);
        Self { ctx, effect }
    }
}

impl Drop for ActiveEffectGuard<'_> {
    fn drop(&mut self) {
        self.ctx.pop_effect();
        // Triggered by a nested effect while it was running
        let state = if self.ctx.is_job_queued(self.effect.id) {
            EffectState::Queued
        } else {
            EffectState::Idle
        };
        self.effect.set_state(state);
    }
}

// =============================================================================
// RUN EFFECT
// =============================================================================

/// Run an effect and re-collect its dependencies.
pub(crate) fn run_effect(ctx: &ReactiveContext, effect: &Rc<EffectInner>) -> Result<()> {
    if effect.state() == EffectState::Running {
        warn!(effect = %effect.id, "effect invoked while already running");
        return Err(ReactiveError::Reentrant { effect: effect.id });
    }

    cleanup_deps(ctx, effect);

    let _active = ActiveEffectGuard::enter(ctx, effect);
    effect.run_count.set(effect.run_count.get() + 1);
    trace!(effect = %effect.id, depth = ctx.effect_depth(), "running effect");

    let mut func = effect.func.borrow_mut();
    let outcome = if ctx.config().catch_panics {
        panic::catch_unwind(AssertUnwindSafe(|| (*func)()))
    } else {
        Ok((*func)())
    };

    match outcome {
        Ok(Ok(())) => Ok(()),
        Ok(Err(source)) => Err(ReactiveError::EffectFailed {
            effect: effect.id,
            source,
        }),
        Err(payload) => Err(ReactiveError::EffectPanicked {
            effect: effect.id,
            message: panic_message(&*payload),
        }),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        String::from("non-string panic payload")
    }
}

// =============================================================================
// CREATE EFFECT
// =============================================================================

/// Register an effect and run it once right away.
///
/// If that first run fails, the error is returned; the effect stays
/// subscribed to whatever it read before failing.
pub(crate) fn create_effect(
    ctx: &ReactiveContext,
    func: EffectFn,
    options: EffectOptions,
) -> Result<Effect> {
    let effect = EffectInner::new(ctx.next_effect_id(), func, options.dispatch);
    debug!(
        effect = %effect.id,
        custom_dispatch = effect.dispatch.is_some(),
        parent = ?ctx.active_effect_id(),
        "registered effect"
    );

    run_effect(ctx, &effect)?;
    Ok(Effect::from_inner(effect))
}

// =============================================================================
// TESTS
// =============================================================================
