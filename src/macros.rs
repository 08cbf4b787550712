// ============================================================================
// spark-observe - Ergonomic Macros
// ============================================================================

/// Build a typed [`Field`](crate::Field) accessor for a named struct field.
///
/// The field name doubles as the dependency key, so name-based and typed
/// access to the same field share subscribers.
///
/// # Usage
///
/// ```rust
/// use spark_observe::{field, Field, Runtime};
///
/// struct Todo {
///     title: String,
///     done: bool,
/// }
///
/// const DONE: Field<Todo, bool> = field!(Todo, done);
///
/// let rt = Runtime::new();
/// let todo = rt.observe(Todo { title: "write docs".into(), done: false });
///
/// todo.set(&DONE, true);
/// assert!(todo.get(&DONE));
/// assert!(todo.read("done", |t| t.done));
/// # let _ = todo.read("title", |t| t.title.len());
/// ```
#[macro_export]
macro_rules! field {
    ($record:ty, $name:ident) => {
        $crate::Field::<$record, _>::new(
            stringify!($name),
            |record: &$record| &record.$name,
            |record: &mut $record| &mut record.$name,
        )
    };
}

/// Helper macro to clone variables into a move closure.
///
/// This reduces the boilerplate of cloning `Observed` handles (or any `Rc`)
/// before moving them into an effect.
///
/// # Usage
///
/// ```rust
/// use spark_observe::{cloned, field, Field, Runtime};
///
/// struct Pair {
///     a: i32,
///     b: i32,
/// }
/// const A: Field<Pair, i32> = field!(Pair, a);
/// const B: Field<Pair, i32> = field!(Pair, b);
///
/// let rt = Runtime::new();
/// let pair = rt.observe(Pair { a: 1, b: 2 });
///
/// rt.register_effect(cloned!(pair => move || {
///     assert_eq!(pair.get(&A) + pair.get(&B), 3);
/// }))
/// .unwrap();
///
/// // `pair` is still usable here
/// assert_eq!(pair.get(&A), 1);
/// ```
#[macro_export]
macro_rules! cloned {
    ($($n:ident),+ => $e:expr) => {
        {
            $( let $n = $n.clone(); )+
            $e
        }
    };
}

/// Register an effect with automatic variable capturing.
///
/// Wraps `runtime.register_effect(cloned!(... => move || ...))` and
/// evaluates to its `Result<Effect>`.
///
/// # Usage
///
/// ```rust
/// use spark_observe::{effect, Runtime};
///
/// struct Log {
///     lines: Vec<String>,
/// }
///
/// let rt = Runtime::new();
/// let log = rt.observe(Log { lines: vec![] });
///
/// let watcher = effect!(rt; log => {
///     let _ = log.read("lines", |l| l.lines.len());
/// })
/// .unwrap();
///
/// assert_eq!(watcher.dependency_count(), 1);
/// ```
#[macro_export]
macro_rules! effect {
    // Case 1: With captured handles
    ($rt:expr; $($deps:ident),+ => $body:expr) => {
        $rt.register_effect($crate::cloned!($($deps),+ => move || { $body; }))
    };
    // Case 2: Nothing to capture
    ($rt:expr; $body:expr) => {
        $rt.register_effect(move || { $body; })
    };
}
