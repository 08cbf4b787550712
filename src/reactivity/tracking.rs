// ============================================================================
// spark-observe - Dependency Tracking
// The dependency store plus track (on read) and trigger (on write)
// ============================================================================
//
// The store maps (record, field) to the set of effects that read that field
// during their latest run. Effects keep weak links back to the sets they
// joined so the next run can leave them before re-subscribing.
//
// Borrow scoping matters here: dispatchers and effect bodies can re-enter
// track/trigger, so every RefCell borrow is released before user code runs
// ("collect-then-mutate"), and removed entries are dropped only after the
// borrow that removed them has ended.
// ============================================================================

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::{debug, trace};

use crate::core::context::ReactiveContext;
use crate::core::types::{EffectId, FieldKey, RecordId};
use crate::primitives::effect::{EffectInner, Runnable};
use crate::reactivity::scheduling::queue_job;

// =============================================================================
// DEPENDENCY SET
// =============================================================================

/// Subscribers of one (record, field) pair.
pub(crate) struct DepSet {
    record: RecordId,
    field: FieldKey,
    subscribers: RefCell<IndexMap<EffectId, Rc<EffectInner>>>,
}

impl DepSet {
    fn new(record: RecordId, field: FieldKey) -> Self {
        Self {
            record,
            field,
            subscribers: RefCell::new(IndexMap::new()),
        }
    }

    pub(crate) fn record(&self) -> RecordId {
        self.record
    }

    pub(crate) fn field(&self) -> FieldKey {
        self.field
    }

    pub(crate) fn len(&self) -> usize {
        self.subscribers.borrow().len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, id: EffectId) -> bool {
        self.subscribers.borrow().contains_key(&id)
    }

    /// Subscribe an effect. Returns true if it was not subscribed yet.
    pub(crate) fn subscribe(&self, effect: &Rc<EffectInner>) -> bool {
        let mut subscribers = self.subscribers.borrow_mut();
        if subscribers.contains_key(&effect.id()) {
            return false;
        }
        subscribers.insert(effect.id(), effect.clone());
        true
    }

    /// Unsubscribe an effect, returning it so the caller decides when it drops
    pub(crate) fn unsubscribe(&self, id: EffectId) -> Option<Rc<EffectInner>> {
        self.subscribers.borrow_mut().shift_remove(&id)
    }

    /// Snapshot of the subscribers, minus `skip`
    fn run_set(&self, skip: Option<EffectId>) -> Vec<Rc<EffectInner>> {
        self.subscribers
            .borrow()
            .iter()
            .filter(|(id, _)| Some(**id) != skip)
            .map(|(_, effect)| effect.clone())
            .collect()
    }
}

// =============================================================================
// DEPENDENCY STORE
// =============================================================================

/// (record handle -> field -> subscriber set).
///
/// Keyed by [`RecordId`] only: the store never holds the record itself.
#[derive(Default)]
pub(crate) struct DependencyStore {
    records: RefCell<HashMap<RecordId, HashMap<FieldKey, Rc<DepSet>>>>,
}

impl DependencyStore {
    /// Get the subscriber set for (record, field), creating the path lazily
    pub(crate) fn dep_set_or_insert(&self, record: RecordId, field: FieldKey) -> Rc<DepSet> {
        self.records
            .borrow_mut()
            .entry(record)
            .or_default()
            .entry(field)
            .or_insert_with(|| Rc::new(DepSet::new(record, field)))
            .clone()
    }

    pub(crate) fn dep_set(&self, record: RecordId, field: FieldKey) -> Option<Rc<DepSet>> {
        self.records
            .borrow()
            .get(&record)
            .and_then(|fields| fields.get(field))
            .cloned()
    }

    /// Remove `set` from the store if it has no subscribers left and is still
    /// the set registered for its (record, field).
    pub(crate) fn prune(&self, set: &Rc<DepSet>) {
        if !set.is_empty() {
            return;
        }

        let removed = {
            let mut records = self.records.borrow_mut();
            let Some(fields) = records.get_mut(&set.record) else {
                return;
            };
            let is_current = fields
                .get(set.field)
                .is_some_and(|current| Rc::ptr_eq(current, set));
            let removed = if is_current {
                fields.remove(set.field)
            } else {
                None
            };
            if fields.is_empty() {
                records.remove(&set.record);
            }
            removed
        };
        drop(removed);
    }

    /// Drop every entry of a record. Returns how many fields were tracked.
    pub(crate) fn forget_record(&self, record: RecordId) -> usize {
        let removed = self.records.borrow_mut().remove(&record);
        let count = removed.as_ref().map_or(0, HashMap::len);
        drop(removed);
        count
    }

    pub(crate) fn subscriber_count(&self, record: RecordId, field: FieldKey) -> usize {
        self.dep_set(record, field).map_or(0, |set| set.len())
    }

    pub(crate) fn tracked_field_count(&self, record: RecordId) -> usize {
        self.records.borrow().get(&record).map_or(0, HashMap::len)
    }

    pub(crate) fn record_count(&self) -> usize {
        self.records.borrow().len()
    }
}

// =============================================================================
// TRACK - Register dependency when a field is read
// =============================================================================

/// Subscribe the active effect to (record, field).
///
/// No-op when no effect is running or reads are untracked.
pub(crate) fn track(ctx: &ReactiveContext, record: RecordId, field: FieldKey) {
    if ctx.is_untracking() {
        return;
    }
    let Some(effect) = ctx.active_effect() else {
        return;
    };

    let set = ctx.store().dep_set_or_insert(record, field);
    if set.subscribe(&effect) {
        effect.add_dep(&set);
        trace!(%record, field, effect = %effect.id(), "tracked read");
    }
}

// =============================================================================
// TRIGGER - Notify subscribers when a field is written
// =============================================================================

/// Dispatch every effect subscribed to (record, field), except the active one.
///
/// Effects with a custom dispatcher are handed their runnable right away;
/// the rest go to the job queue.
pub(crate) fn trigger(ctx: &ReactiveContext, record: RecordId, field: FieldKey) {
    let Some(set) = ctx.store().dep_set(record, field) else {
        return;
    };

    // An effect writing a field it reads must not re-trigger itself
    let run_set = set.run_set(ctx.active_effect_id());
    if run_set.is_empty() {
        return;
    }

    debug!(%record, field, subscribers = run_set.len(), "triggered write");

    for effect in run_set {
        match effect.dispatcher() {
            Some(dispatch) => dispatch(Runnable::new(effect.clone(), ctx.weak())),
            None => queue_job(ctx, &effect),
        }
    }
}

// =============================================================================
// UNTRACKED
// =============================================================================

/// Run `f` without attaching subscriptions for the reads it performs.
pub(crate) fn untracked<T>(ctx: &ReactiveContext, f: impl FnOnce() -> T) -> T {
    let prev = ctx.set_untracking(true);

    // Restore even if f panics
    struct UntrackGuard<'a> {
        ctx: &'a ReactiveContext,
        prev: bool,
    }

    impl Drop for UntrackGuard<'_> {
        fn drop(&mut self) {
            self.ctx.set_untracking(self.prev);
        }
    }

    let _guard = UntrackGuard { ctx, prev };
    f()
}

// =============================================================================
// TESTS
// =============================================================================
