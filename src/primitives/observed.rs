// ============================================================================
// spark-observe - Observed Records
// A plain record behind a wrapper whose field reads track and writes trigger
// ============================================================================
//
// The wrapper owns no reactive state: the record lives in a RefCell and the
// wrapper only carries the record's handle plus a weak link to the runtime.
// Field access is either name-based (read/write with a field name) or typed
// through Field descriptors built by the `field!` macro.
// ============================================================================

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::trace;

use crate::core::context::ReactiveContext;
use crate::core::types::{FieldKey, RecordId};
use crate::reactivity::tracking::{track, trigger, untracked};

// =============================================================================
// FIELD DESCRIPTOR
// =============================================================================

/// Typed accessor for one field of a record type.
///
/// Build one with [`field!`](crate::field):
///
/// ```
/// use spark_observe::{field, Field};
///
/// struct Counter {
///     count: i32,
/// }
///
/// const COUNT: Field<Counter, i32> = field!(Counter, count);
/// assert_eq!(COUNT.name(), "count");
/// ```
pub struct Field<T, V> {
    name: FieldKey,
    get: fn(&T) -> &V,
    get_mut: fn(&mut T) -> &mut V,
}

impl<T, V> Field<T, V> {
    pub const fn new(name: FieldKey, get: fn(&T) -> &V, get_mut: fn(&mut T) -> &mut V) -> Self {
        Self { name, get, get_mut }
    }

    pub const fn name(&self) -> FieldKey {
        self.name
    }
}

impl<T, V> Clone for Field<T, V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T, V> Copy for Field<T, V> {}

impl<T, V> fmt::Debug for Field<T, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Field").field(&self.name).finish()
    }
}

// =============================================================================
// OBSERVED
// =============================================================================

struct ObservedInner<T> {
    id: RecordId,
    data: RefCell<T>,
    ctx: Weak<ReactiveContext>,
}

impl<T> Drop for ObservedInner<T> {
    fn drop(&mut self) {
        // The store only knows the handle; purge it with the record
        if let Some(ctx) = self.ctx.upgrade() {
            let fields = ctx.store().forget_record(self.id);
            trace!(record = %self.id, fields, "forgot dropped record");
        }
    }
}

/// An observed view of a plain record.
///
/// Clones share the record and its identity. Reads made while an effect is
/// running subscribe that effect to the field; writes notify the field's
/// subscribers, whether or not the value changed.
///
/// # Example
///
/// ```
/// use spark_observe::Runtime;
/// use std::cell::Cell;
/// use std::rc::Rc;
///
/// struct Greeting {
///     text: String,
/// }
///
/// let rt = Runtime::new();
/// let greeting = rt.observe(Greeting { text: "Hello".into() });
/// let seen = Rc::new(Cell::new(0));
///
/// let g = greeting.clone();
/// let seen_clone = seen.clone();
/// rt.register_effect(move || {
///     g.read("text", |r| assert!(r.text.starts_with("Hello")));
///     seen_clone.set(seen_clone.get() + 1);
/// })
/// .unwrap();
///
/// greeting.write("text", |r| r.text = "Hello, World!".into());
/// assert_eq!(seen.get(), 1);
///
/// rt.tick();
/// assert_eq!(seen.get(), 2);
/// ```
pub struct Observed<T> {
    inner: Rc<ObservedInner<T>>,
}

impl<T> Clone for Observed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Observed<T> {
    pub(crate) fn new(ctx: &ReactiveContext, record: T) -> Self {
        let id = ctx.next_record_id();
        trace!(record = %id, "observing record");
        Self {
            inner: Rc::new(ObservedInner {
                id,
                data: RefCell::new(record),
                ctx: ctx.weak(),
            }),
        }
    }

    /// The handle the dependency store knows this record by
    pub fn id(&self) -> RecordId {
        self.inner.id
    }

    fn track(&self, field: FieldKey) {
        if let Some(ctx) = self.inner.ctx.upgrade() {
            track(&ctx, self.inner.id, field);
        }
    }

    fn trigger(&self, field: FieldKey) {
        if let Some(ctx) = self.inner.ctx.upgrade() {
            trigger(&ctx, self.inner.id, field);
        }
    }

    // =========================================================================
    // NAME-BASED ACCESS
    // =========================================================================

    /// Read through the record, tracking `field`.
    pub fn read<R>(&self, field: FieldKey, f: impl FnOnce(&T) -> R) -> R {
        self.track(field);
        f(&*self.inner.data.borrow())
    }

    /// Mutate the record, then trigger `field`.
    ///
    /// The record is released before subscribers are notified, so custom
    /// dispatchers may read it synchronously.
    pub fn write<R>(&self, field: FieldKey, f: impl FnOnce(&mut T) -> R) -> R {
        let out = f(&mut *self.inner.data.borrow_mut());
        self.trigger(field);
        out
    }

    // =========================================================================
    // TYPED ACCESS
    // =========================================================================

    /// Read a field's current value.
    pub fn get<V: Clone>(&self, field: &Field<T, V>) -> V {
        self.read(field.name, |record| (field.get)(record).clone())
    }

    /// Borrow a field's value for the duration of `f`.
    pub fn with<V, R>(&self, field: &Field<T, V>, f: impl FnOnce(&V) -> R) -> R {
        self.read(field.name, |record| f((field.get)(record)))
    }

    /// Store a value. Always succeeds, even if the value did not change.
    pub fn set<V>(&self, field: &Field<T, V>, value: V) -> bool {
        self.write(field.name, |record| *(field.get_mut)(record) = value);
        true
    }

    /// Mutate a field in place.
    pub fn update<V, R>(&self, field: &Field<T, V>, f: impl FnOnce(&mut V) -> R) -> R {
        self.write(field.name, |record| f((field.get_mut)(record)))
    }

    // =========================================================================
    // UNTRACKED ACCESS & INTROSPECTION
    // =========================================================================

    /// Read the whole record without subscribing to anything.
    pub fn peek<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        match self.inner.ctx.upgrade() {
            Some(ctx) => untracked(&ctx, || f(&*self.inner.data.borrow())),
            None => f(&*self.inner.data.borrow()),
        }
    }

    /// How many effects are subscribed to `field`
    pub fn subscriber_count(&self, field: FieldKey) -> usize {
        self.inner
            .ctx
            .upgrade()
            .map_or(0, |ctx| ctx.store().subscriber_count(self.inner.id, field))
    }

    /// How many of this record's fields have at least one subscriber
    pub fn tracked_field_count(&self) -> usize {
        self.inner
            .ctx
            .upgrade()
            .map_or(0, |ctx| ctx.store().tracked_field_count(self.inner.id))
    }
}

impl<T: fmt::Debug> fmt::Debug for Observed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = f.debug_struct("Observed");
        out.field("id", &self.inner.id);
        match self.inner.data.try_borrow() {
            Ok(record) => out.field("record", &*record),
            Err(_) => out.field("record", &"<borrowed>"),
        };
        out.finish()
    }
}

// =============================================================================
// TESTS
// =============================================================================
