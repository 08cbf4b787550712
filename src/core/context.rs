// ============================================================================
// spark-observe - Reactive Context
// All mutable state of one runtime instance
// ============================================================================
//
// Every runtime owns exactly one context. Nothing here is thread-local or
// static, so independent runtimes never observe each other's effects.
// ============================================================================

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use indexmap::IndexMap;

use super::config::RuntimeConfig;
use super::error::ReactiveError;
use super::types::{EffectId, RecordId, Task};
use crate::primitives::effect::EffectInner;
use crate::reactivity::scheduling::TaskQueue;
use crate::reactivity::tracking::DependencyStore;

// =============================================================================
// REACTIVE CONTEXT
// =============================================================================

/// Per-runtime reactive state: dependency store, active-effect stack,
/// job queue and flushing flag.
pub(crate) struct ReactiveContext {
    config: RuntimeConfig,

    /// Weak self-reference handed to deferred tasks and runnables
    self_weak: Weak<ReactiveContext>,

    // =========================================================================
    // TRACKING
    // =========================================================================
    /// (record, field) -> subscribed effects
    store: DependencyStore,

    /// Effects currently executing; the last one is active
    effect_stack: RefCell<Vec<Rc<EffectInner>>>,

    /// Whether reads currently skip tracking
    untracking: Cell<bool>,

    // =========================================================================
    // SCHEDULING
    // =========================================================================
    /// Effects awaiting the next flush, in first-enqueued order
    job_queue: RefCell<IndexMap<EffectId, Rc<EffectInner>>>,

    /// Set while a flush is requested or running
    flushing: Cell<bool>,

    /// Flush cycles requested back to back by writes made during a flush
    chained_flushes: Cell<u32>,

    /// Where deferred flush tasks go
    task_queue: Rc<dyn TaskQueue>,

    /// Failures from effects run outside a synchronous caller
    failures: RefCell<Vec<ReactiveError>>,

    // =========================================================================
    // IDENTITIES
    // =========================================================================
    next_record_id: Cell<u64>,
    next_effect_id: Cell<u64>,
}

impl ReactiveContext {
    pub(crate) fn new(config: RuntimeConfig, task_queue: Rc<dyn TaskQueue>) -> Rc<Self> {
        Rc::new_cyclic(|self_weak| Self {
            config,
            self_weak: self_weak.clone(),
            store: DependencyStore::default(),
            effect_stack: RefCell::new(Vec::new()),
            untracking: Cell::new(false),
            job_queue: RefCell::new(IndexMap::new()),
            flushing: Cell::new(false),
            chained_flushes: Cell::new(0),
            task_queue,
            failures: RefCell::new(Vec::new()),
            next_record_id: Cell::new(0),
            next_effect_id: Cell::new(0),
        })
    }

    pub(crate) fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub(crate) fn weak(&self) -> Weak<ReactiveContext> {
        self.self_weak.clone()
    }

    pub(crate) fn store(&self) -> &DependencyStore {
        &self.store
    }

    // =========================================================================
    // IDENTITIES
    // =========================================================================

    pub(crate) fn next_record_id(&self) -> RecordId {
        let id = self.next_record_id.get();
        self.next_record_id.set(id + 1);
        RecordId(id)
    }

    pub(crate) fn next_effect_id(&self) -> EffectId {
        let id = self.next_effect_id.get();
        self.next_effect_id.set(id + 1);
        EffectId(id)
    }

    // =========================================================================
    // ACTIVE-EFFECT STACK
    // =========================================================================

    pub(crate) fn push_effect(&self, effect: Rc<EffectInner>) {
        self.effect_stack.borrow_mut().push(effect);
    }

    pub(crate) fn pop_effect(&self) -> Option<Rc<EffectInner>> {
        self.effect_stack.borrow_mut().pop()
    }

    /// The effect on top of the stack
    pub(crate) fn active_effect(&self) -> Option<Rc<EffectInner>> {
        self.effect_stack.borrow().last().cloned()
    }

    pub(crate) fn active_effect_id(&self) -> Option<EffectId> {
        self.effect_stack.borrow().last().map(|effect| effect.id())
    }

    pub(crate) fn effect_depth(&self) -> usize {
        self.effect_stack.borrow().len()
    }

    /// Set untracking mode, returning the previous value
    pub(crate) fn set_untracking(&self, value: bool) -> bool {
        self.untracking.replace(value)
    }

    pub(crate) fn is_untracking(&self) -> bool {
        self.untracking.get()
    }

    // =========================================================================
    // JOB QUEUE
    // =========================================================================

    /// Add an effect to the job queue. Returns false if it was already there.
    pub(crate) fn enqueue_job(&self, effect: &Rc<EffectInner>) -> bool {
        let mut queue = self.job_queue.borrow_mut();
        if queue.contains_key(&effect.id()) {
            return false;
        }
        queue.insert(effect.id(), effect.clone());
        true
    }

    /// Take every queued effect, leaving the queue empty
    pub(crate) fn take_jobs(&self) -> Vec<Rc<EffectInner>> {
        let jobs = std::mem::take(&mut *self.job_queue.borrow_mut());
        jobs.into_values().collect()
    }

    /// Put effects back ahead of everything already queued, keeping their
    /// order. Effects already in the queue keep their place.
    pub(crate) fn requeue_front(&self, effects: impl IntoIterator<Item = Rc<EffectInner>>) {
        let mut queue = self.job_queue.borrow_mut();
        let queued = std::mem::take(&mut *queue);
        for effect in effects {
            queue.entry(effect.id()).or_insert(effect);
        }
        for (id, effect) in queued {
            queue.entry(id).or_insert(effect);
        }
    }

    pub(crate) fn is_job_queued(&self, id: EffectId) -> bool {
        self.job_queue.borrow().contains_key(&id)
    }

    pub(crate) fn queued_len(&self) -> usize {
        self.job_queue.borrow().len()
    }

    // =========================================================================
    // FLUSHING
    // =========================================================================

    /// Set the flushing flag, returning the previous value
    pub(crate) fn set_flushing(&self, value: bool) -> bool {
        self.flushing.replace(value)
    }

    pub(crate) fn is_flushing(&self) -> bool {
        self.flushing.get()
    }

    pub(crate) fn chained_flushes(&self) -> u32 {
        self.chained_flushes.get()
    }

    pub(crate) fn set_chained_flushes(&self, count: u32) {
        self.chained_flushes.set(count);
    }

    pub(crate) fn queue_task(&self, task: Task) {
        self.task_queue.queue_task(task);
    }

    // =========================================================================
    // FAILURES
    // =========================================================================

    pub(crate) fn record_failure(&self, error: ReactiveError) {
        self.failures.borrow_mut().push(error);
    }

    pub(crate) fn take_failures(&self) -> Vec<ReactiveError> {
        self.failures.replace(Vec::new())
    }
}

// =============================================================================
// TESTS
// =============================================================================
