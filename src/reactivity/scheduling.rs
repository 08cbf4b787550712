// ============================================================================
// spark-observe - Effect Scheduling
// The job queue, the single pending-flush guard and the deferred task queue
// ============================================================================
//
// Default-path effects are not run at trigger time. They are collected in an
// insertion-ordered, deduplicated job queue and run once by a deferred flush
// task. Rust has no microtasks, so "after the current synchronous work" is a
// TaskQueue the host drains explicitly (Runtime::tick for the built-in one).
//
// Key functions:
// - queue_job: add an effect to the job queue and request a flush
// - request_flush: schedule one flush task unless one is already pending
// - flush_jobs: run every queued effect once, then clear the flag
// ============================================================================

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::thread;

use tracing::{debug, error, trace, warn};

use crate::core::context::ReactiveContext;
use crate::core::error::ReactiveError;
use crate::core::types::{EffectState, Task};
use crate::primitives::effect::{EffectInner, run_effect};

// =============================================================================
// TASK QUEUE
// =============================================================================

/// Capability to run a task after the current synchronous work has finished.
///
/// The runtime hands its flush task to this queue. A host event loop can
/// implement it to integrate with its own turn boundaries.
pub trait TaskQueue {
    fn queue_task(&self, task: Task);
}

/// Single-threaded FIFO of deferred tasks with an explicit drain.
///
/// # Example
///
/// ```
/// use spark_observe::{MicrotaskQueue, TaskQueue};
/// use std::cell::Cell;
/// use std::rc::Rc;
///
/// let queue = MicrotaskQueue::new();
/// let ran = Rc::new(Cell::new(false));
/// let ran_clone = ran.clone();
/// queue.queue_task(Box::new(move || ran_clone.set(true)));
///
/// assert!(!ran.get());
/// assert_eq!(queue.run_until_stalled(), 1);
/// assert!(ran.get());
/// ```
#[derive(Default)]
pub struct MicrotaskQueue {
    tasks: RefCell<VecDeque<Task>>,
}

impl MicrotaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tasks.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.borrow().is_empty()
    }

    /// Run the oldest task. Returns false if there was none.
    pub fn run_next(&self) -> bool {
        // Release the borrow before running: tasks may queue more tasks
        let task = self.tasks.borrow_mut().pop_front();
        match task {
            Some(task) => {
                task();
                true
            }
            None => false,
        }
    }

    /// Run tasks until the queue is empty, including tasks queued by the
    /// tasks being run. Returns how many ran.
    pub fn run_until_stalled(&self) -> usize {
        let mut ran = 0;
        while self.run_next() {
            ran += 1;
        }
        ran
    }
}

impl TaskQueue for MicrotaskQueue {
    fn queue_task(&self, task: Task) {
        self.tasks.borrow_mut().push_back(task);
    }
}

// =============================================================================
// QUEUE JOB
// =============================================================================

/// Put a default-path effect in the job queue and request a flush.
///
/// An effect already in the queue, or still waiting in the cycle currently
/// being flushed, is left where it is.
pub(crate) fn queue_job(ctx: &ReactiveContext, effect: &Rc<EffectInner>) {
    if effect.state() == EffectState::Queued {
        trace!(effect = %effect.id(), "already queued");
        return;
    }

    if ctx.enqueue_job(effect) {
        // A running effect stays Running; it becomes Queued when it finishes
        if effect.state() == EffectState::Idle {
            effect.set_state(EffectState::Queued);
        }
        trace!(effect = %effect.id(), queued = ctx.queued_len(), "queued effect");
    }

    request_flush(ctx);
}

// =============================================================================
// REQUEST FLUSH
// =============================================================================

/// Schedule a flush unless one is already pending.
pub(crate) fn request_flush(ctx: &ReactiveContext) {
    if ctx.set_flushing(true) {
        return;
    }

    let weak = ctx.weak();
    ctx.queue_task(Box::new(move || {
        if let Some(ctx) = weak.upgrade() {
            flush_jobs(&ctx);
        }
    }));
}

// =============================================================================
// FLUSH JOBS
// =============================================================================

/// One flush cycle: the jobs taken from the queue, plus the cleanup that must
/// happen however the cycle ends.
struct FlushCycle<'a> {
    ctx: &'a ReactiveContext,
    pending: VecDeque<Rc<EffectInner>>,
}

impl Drop for FlushCycle<'_> {
    fn drop(&mut self) {
        self.ctx.set_flushing(false);

        // An effect panic unwound through the cycle: finish_cycle will not
        // run, so the unrun jobs and anything queued meanwhile need a flush
        if thread::panicking() {
            let ctx = self.ctx;
            ctx.requeue_front(self.pending.drain(..));
            if ctx.queued_len() > 0 {
                warn!(queued = ctx.queued_len(), "flush unwound; rescheduling queued effects");
                request_flush(ctx);
            }
        }
    }
}

/// Run every queued effect exactly once, in first-enqueued order, then clear
/// the flushing flag.
///
/// Writes made by those effects fill a fresh queue; if it is not empty at
/// the end of the cycle, another flush is requested.
pub(crate) fn flush_jobs(ctx: &ReactiveContext) {
    let jobs = ctx.take_jobs();
    debug!(jobs = jobs.len(), "flushing job queue");

    {
        let mut cycle = FlushCycle {
            ctx,
            pending: jobs.into(),
        };
        while let Some(effect) = cycle.pending.pop_front() {
            if let Err(err) = run_effect(ctx, &effect) {
                error!(effect = %effect.id(), error = %err, "effect failed during flush");
                ctx.record_failure(err);
            }
        }
    }

    finish_cycle(ctx);
}

/// Chain another cycle if effects queued more work, within the configured cap.
fn finish_cycle(ctx: &ReactiveContext) {
    if ctx.queued_len() == 0 {
        ctx.set_chained_flushes(0);
        return;
    }

    let chained = ctx.chained_flushes() + 1;
    let limit = ctx.config().max_chained_flushes;
    if chained > limit {
        let dropped = ctx.take_jobs();
        for effect in &dropped {
            if effect.state() == EffectState::Queued {
                effect.set_state(EffectState::Idle);
            }
        }
        ctx.set_chained_flushes(0);
        error!(limit, dropped = dropped.len(), "flush chain limit exceeded");
        ctx.record_failure(ReactiveError::FlushLimitExceeded {
            limit,
            dropped: dropped.len(),
        });
        return;
    }

    ctx.set_chained_flushes(chained);
    request_flush(ctx);
}

// =============================================================================
// TESTS
// =============================================================================
