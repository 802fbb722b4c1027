//! Named observers referenced from configuration

use super::error::{LoggerError, Result};
use super::observer::ObserverRef;
use crate::observers::ObserverSpec;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Lazily invoked constructor for a named observer
pub type ObserverFactory = Arc<dyn Fn() -> Result<ObserverRef> + Send + Sync>;

#[derive(Clone)]
enum Source {
    Factory(ObserverFactory),
    Spec(ObserverSpec),
}

#[derive(Clone)]
struct Entry {
    source: Source,
    instance: Option<ObserverRef>,
}

/// Named observers, created on first use and then cached
///
/// Caching keeps repeated application of one configuration idempotent: the
/// same name keeps resolving to the same instance until it is re-registered
/// with a different definition.
#[derive(Default)]
pub struct ObserverRegistry {
    entries: Mutex<BTreeMap<String, Entry>>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory, dropping any cached instance under `name`
    pub fn register<F>(&self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Result<ObserverRef> + Send + Sync + 'static,
    {
        self.entries.lock().insert(
            name.into(),
            Entry {
                source: Source::Factory(Arc::new(factory)),
                instance: None,
            },
        );
    }

    /// Register an existing observer instance
    pub fn register_instance(&self, name: impl Into<String>, observer: ObserverRef) {
        let factory_copy = Arc::clone(&observer);
        self.entries.lock().insert(
            name.into(),
            Entry {
                source: Source::Factory(Arc::new(move || Ok(Arc::clone(&factory_copy)))),
                instance: Some(observer),
            },
        );
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.lock().contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.lock().keys().cloned().collect()
    }

    /// Look up `name`, creating the instance on first use
    ///
    /// `Ok(None)` means no observer is registered under that name.
    pub fn lookup(&self, name: &str) -> Result<Option<ObserverRef>> {
        let source = {
            let entries = self.entries.lock();
            match entries.get(name) {
                None => return Ok(None),
                Some(Entry {
                    instance: Some(instance),
                    ..
                }) => return Ok(Some(Arc::clone(instance))),
                Some(entry) => entry.source.clone(),
            }
        };

        // Build outside the lock; factories may be slow (opening files).
        let created = build(&source)?;
        let mut entries = self.entries.lock();
        match entries.get_mut(name) {
            Some(entry) => match &entry.instance {
                Some(existing) => Ok(Some(Arc::clone(existing))),
                None => {
                    entry.instance = Some(Arc::clone(&created));
                    Ok(Some(created))
                }
            },
            None => Ok(Some(created)),
        }
    }

    /// Like `lookup`, but an unregistered name is an error
    pub fn resolve(&self, name: &str) -> Result<ObserverRef> {
        self.lookup(name)?
            .ok_or_else(|| LoggerError::unknown_observer(name))
    }

    /// Prepare declared observer definitions without touching this registry
    ///
    /// Definitions identical to the registered ones keep their instance.
    pub(crate) fn stage(&self, specs: &BTreeMap<String, ObserverSpec>) -> Result<StagedObservers> {
        let mut staged = BTreeMap::new();
        for (name, spec) in specs {
            let existing = {
                let entries = self.entries.lock();
                entries.get(name).and_then(|entry| match (&entry.source, &entry.instance) {
                    (Source::Spec(current), Some(instance)) if current == spec => {
                        Some(Arc::clone(instance))
                    }
                    _ => None,
                })
            };
            let instance = match existing {
                Some(instance) => instance,
                None => spec
                    .build()
                    .map_err(|e| LoggerError::config(format!("observer.{}", name), e.to_string()))?,
            };
            staged.insert(
                name.clone(),
                Entry {
                    source: Source::Spec(spec.clone()),
                    instance: Some(instance),
                },
            );
        }
        Ok(StagedObservers { entries: staged })
    }

    pub(crate) fn commit(&self, staged: StagedObservers) {
        self.entries.lock().extend(staged.entries);
    }
}

fn build(source: &Source) -> Result<ObserverRef> {
    match source {
        Source::Factory(factory) => factory(),
        Source::Spec(spec) => spec.build(),
    }
}

/// Observers built for a pending configuration, not yet visible by name
pub(crate) struct StagedObservers {
    entries: BTreeMap<String, Entry>,
}

impl StagedObservers {
    /// Resolve against staged definitions first, then `registry`
    pub(crate) fn resolve(&self, registry: &ObserverRegistry, name: &str) -> Result<ObserverRef> {
        match self.entries.get(name).and_then(|e| e.instance.clone()) {
            Some(instance) => Ok(instance),
            None => registry.resolve(name),
        }
    }
}
