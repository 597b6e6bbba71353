use crate::error::Error;
use crate::schema::Schema;
use once_cell::sync::OnceCell;
use std::fmt;
use std::sync::{Mutex, PoisonError};
use std::thread::{self, ThreadId};
use tracing::debug;

type Supplier = Box<dyn Fn() -> Schema + Send + Sync>;

/// A schema built on first use, for shapes that refer to themselves.
///
/// The supplier runs at most once. Threads racing on the first use block
/// until the winner has stored its result; a supplier that asks for its own
/// node while still running gets [`Error::LazyCycle`] instead of a deadlock.
pub struct LazySchema {
    supplier: Supplier,
    resolved: OnceCell<Schema>,
    resolving: Mutex<Option<ThreadId>>,
}

impl LazySchema {
    pub(crate) fn new<F>(supplier: F) -> Self
    where
        F: Fn() -> Schema + Send + Sync + 'static,
    {
        Self {
            supplier: Box::new(supplier),
            resolved: OnceCell::new(),
            resolving: Mutex::new(None),
        }
    }

    /// The resolved schema, if resolution already happened.
    pub fn get(&self) -> Option<&Schema> {
        self.resolved.get()
    }

    pub fn resolve(&self) -> Result<&Schema, Error> {
        if let Some(schema) = self.resolved.get() {
            return Ok(schema);
        }

        let current = thread::current().id();
        if *self.lock_resolving() == Some(current) {
            return Err(Error::LazyCycle);
        }

        Ok(self.resolved.get_or_init(|| {
            let _guard = ResolvingGuard::enter(&self.resolving, current);
            debug!("resolving lazy schema");
            (self.supplier)()
        }))
    }

    fn lock_resolving(&self) -> std::sync::MutexGuard<'_, Option<ThreadId>> {
        self.resolving.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for LazySchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.resolved.get() {
            Some(schema) => f.debug_tuple("LazySchema").field(schema).finish(),
            None => f.write_str("LazySchema(<unresolved>)"),
        }
    }
}

/// Marks the current thread as running the supplier until dropped.
struct ResolvingGuard<'a> {
    slot: &'a Mutex<Option<ThreadId>>,
}

impl<'a> ResolvingGuard<'a> {
    fn enter(slot: &'a Mutex<Option<ThreadId>>, thread: ThreadId) -> Self {
        *slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(thread);
        Self { slot }
    }
}

impl Drop for ResolvingGuard<'_> {
    fn drop(&mut self) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}
