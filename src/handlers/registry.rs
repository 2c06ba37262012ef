//! Filter name to security handler registry

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use log::{debug, warn};

use super::callbacks::CallbackHandler;
use super::SecurityHandler;
use crate::error::{PDFSecurityError, PDFSecurityResult};

struct Entry {
    handler: Arc<dyn SecurityHandler>,
    builtin: bool,
    open_contexts: Arc<AtomicUsize>,
}

/// Registered security handlers keyed by exact, case-sensitive filter name.
///
/// Lookups share a read lock; registration and removal take the write lock.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<String, Entry>>,
}

/// Marks one open context derived from a registered handler
pub struct OpenContextGuard {
    filter: String,
    counter: Arc<AtomicUsize>,
}

impl OpenContextGuard {
    pub fn filter(&self) -> &str {
        &self.filter
    }
}

impl Drop for OpenContextGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::AcqRel);
    }
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under `filter`
    pub fn register(&self, filter: &str, handler: Arc<dyn SecurityHandler>) -> PDFSecurityResult<()> {
        self.insert(filter, handler, false)
    }

    /// Validate a callback builder and register the handler it describes
    pub fn register_callbacks<T, D>(&self, filter: &str, callbacks: CallbackHandler<T, D>) -> PDFSecurityResult<()>
    where
        T: Send + 'static,
        D: Send + 'static,
    {
        let handler = callbacks.build()?;
        self.register(filter, handler)
    }

    pub(crate) fn register_builtin(&self, filter: &str, handler: Arc<dyn SecurityHandler>) -> PDFSecurityResult<()> {
        self.insert(filter, handler, true)
    }

    fn insert(&self, filter: &str, handler: Arc<dyn SecurityHandler>, builtin: bool) -> PDFSecurityResult<()> {
        if filter.is_empty() {
            return Err(PDFSecurityError::invalid_param("empty security filter name"));
        }

        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        if handlers.contains_key(filter) {
            return Err(PDFSecurityError::Conflict(filter.to_string()));
        }

        debug!("Registering security handler {}", filter);
        handlers.insert(
            filter.to_string(),
            Entry {
                handler,
                builtin,
                open_contexts: Arc::new(AtomicUsize::new(0)),
            },
        );
        Ok(())
    }

    /// Remove a caller-registered handler.
    ///
    /// No context created from the handler may still be open.
    pub fn unregister(&self, filter: &str) -> PDFSecurityResult<()> {
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        let entry = handlers
            .get(filter)
            .ok_or_else(|| PDFSecurityError::not_found(format!("security filter {}", filter)))?;

        if entry.builtin {
            return Err(PDFSecurityError::invalid_param(format!(
                "built-in security filter {} cannot be unregistered",
                filter
            )));
        }

        let open = entry.open_contexts.load(Ordering::Acquire);
        debug_assert!(open == 0, "unregistering {} with {} open contexts", filter, open);
        if open != 0 {
            warn!("Unregistering {} while {} contexts are open", filter, open);
        }

        handlers.remove(filter);
        debug!("Unregistered security handler {}", filter);
        Ok(())
    }

    pub fn lookup(&self, filter: &str) -> Option<Arc<dyn SecurityHandler>> {
        let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
        handlers.get(filter).map(|entry| Arc::clone(&entry.handler))
    }

    /// Look up a handler and count a context opened from it
    pub(crate) fn acquire(&self, filter: &str) -> Option<(Arc<dyn SecurityHandler>, OpenContextGuard)> {
        let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
        handlers.get(filter).map(|entry| {
            entry.open_contexts.fetch_add(1, Ordering::AcqRel);
            let guard = OpenContextGuard {
                filter: filter.to_string(),
                counter: Arc::clone(&entry.open_contexts),
            };
            (Arc::clone(&entry.handler), guard)
        })
    }

    pub fn contains(&self, filter: &str) -> bool {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(filter)
    }

    /// Number of open contexts created from `filter`
    pub fn open_contexts(&self, filter: &str) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(filter)
            .map_or(0, |entry| entry.open_contexts.load(Ordering::Acquire))
    }

    /// Registered filter names, sorted
    pub fn filters(&self) -> Vec<String> {
        let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = handlers.keys().cloned().collect();
        names.sort();
        names
    }
}
