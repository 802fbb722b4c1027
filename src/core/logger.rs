//! Logger hierarchy and logger handles
//!
//! Loggers form a tree by dotted name (`a.b.c` under `a.b` under `a` under
//! the root). Each node may override its filter and observer; everything
//! else is inherited. Derived state (effective filter, observer chain and
//! the five per-level generators) is swapped in atomically on refresh, so
//! log calls always see a consistent snapshot without taking a lock.

use super::config::LogConfiguration;
use super::error::{LoggerError, Result};
use super::filter::Filter;
use super::generator::{EventBuilder, EventGenerator};
use super::log_level::LogLevel;
use super::marker::Marker;
use super::metrics::LoggerMetrics;
use super::observer::{null_observer, CompositeObserver, ObserverRef};
use super::registry::ObserverRegistry;
use super::status::StatusChannel;
use crate::observers::ConsoleObserver;
use arc_swap::ArcSwap;
use parking_lot::{Mutex, MutexGuard, RwLock};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

/// Name of the root logger
pub const ROOT_LOGGER_NAME: &str = "ROOT";

const STATUS_LOCATION: &str = "LoggerHierarchy";

/// Explicit configuration of one node
struct OwnConfig {
    filter: Option<Filter>,
    observer: ObserverRef,
    inherit: bool,
}

impl OwnConfig {
    fn unconfigured() -> Self {
        Self {
            filter: None,
            observer: null_observer(),
            inherit: true,
        }
    }

    fn is_configured(&self) -> bool {
        self.filter.is_some() || !self.observer.is_null() || !self.inherit
    }
}

/// Values derived from a node's own configuration and its ancestors
struct NodeState {
    filter: Filter,
    observer: ObserverRef,
    generators: [EventGenerator; 5],
}

struct LoggerNode {
    name: Arc<str>,
    parent: Option<Weak<LoggerNode>>,
    own: Mutex<OwnConfig>,
    state: ArcSwap<NodeState>,
    metrics: Arc<LoggerMetrics>,
}

impl LoggerNode {
    fn new(
        name: Arc<str>,
        parent: Option<Weak<LoggerNode>>,
        own: OwnConfig,
        metrics: Arc<LoggerMetrics>,
    ) -> Self {
        Self {
            name,
            parent,
            own: Mutex::new(own),
            state: ArcSwap::from_pointee(NodeState {
                filter: Filter::never(),
                observer: null_observer(),
                generators: Default::default(),
            }),
            metrics,
        }
    }

    fn parent(&self) -> Option<Arc<LoggerNode>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Recompute derived state from own configuration and the parent's state
    fn refresh(&self) {
        let parent = self.parent().map(|p| p.state.load_full());
        let own = self.own.lock();

        let filter = match (&own.filter, &parent) {
            (Some(filter), Some(parent)) => filter.with_parent(&parent.filter),
            (Some(filter), None) => filter.with_parent(&Filter::never()),
            (None, Some(parent)) => parent.filter.clone(),
            (None, None) => Filter::default(),
        };
        let observer = match &parent {
            Some(parent) if own.inherit => {
                CompositeObserver::combine([Arc::clone(&parent.observer), Arc::clone(&own.observer)])
            }
            _ => Arc::clone(&own.observer),
        };
        drop(own);

        let generators = LogLevel::ALL.map(|level| {
            EventGenerator::create(
                Arc::clone(&self.name),
                level,
                &observer,
                filter.predicate(level),
                Arc::clone(&self.metrics),
            )
        });
        self.state.store(Arc::new(NodeState {
            filter,
            observer,
            generators,
        }));
    }
}

/// Handle to a named logger
///
/// Cheap to clone. Handles stay valid across reconfiguration and always
/// log through the node's current configuration.
///
/// # Example
///
/// ```
/// use rust_logevents::prelude::*;
/// use std::sync::Arc;
///
/// let buffer = Arc::new(BufferObserver::new());
/// let hierarchy = LoggerHierarchy::builder()
///     .root_level(LogLevel::Warn)
///     .root_observer(buffer.clone())
///     .build();
///
/// let logger = hierarchy.get_logger("app.db");
/// logger.info("not delivered");
/// logger.warn("delivered");
/// assert_eq!(buffer.messages(), vec!["delivered".to_string()]);
/// ```
#[derive(Clone)]
pub struct Logger {
    node: Arc<LoggerNode>,
}

impl Logger {
    pub fn name(&self) -> &str {
        &self.node.name
    }

    pub fn is_root(&self) -> bool {
        self.node.is_root()
    }

    /// Name of the parent logger, `None` for the root
    pub fn parent_name(&self) -> Option<String> {
        self.node.parent().map(|p| p.name.to_string())
    }

    #[inline]
    pub fn is_enabled(&self, level: LogLevel) -> bool {
        self.node.state.load().generators[level.index()].is_enabled()
    }

    #[inline]
    pub fn is_enabled_for(&self, level: LogLevel, marker: &Marker) -> bool {
        self.node.state.load().generators[level.index()].is_enabled_for(Some(marker))
    }

    pub fn is_trace_enabled(&self) -> bool {
        self.is_enabled(LogLevel::Trace)
    }

    pub fn is_debug_enabled(&self) -> bool {
        self.is_enabled(LogLevel::Debug)
    }

    pub fn is_info_enabled(&self) -> bool {
        self.is_enabled(LogLevel::Info)
    }

    pub fn is_warn_enabled(&self) -> bool {
        self.is_enabled(LogLevel::Warn)
    }

    pub fn is_error_enabled(&self) -> bool {
        self.is_enabled(LogLevel::Error)
    }

    #[inline]
    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.node.state.load().generators[level.index()].log(message);
    }

    pub fn log_with_marker(&self, level: LogLevel, marker: &Marker, message: impl Into<String>) {
        self.node.state.load().generators[level.index()].log_with_marker(marker, message);
    }

    /// Fluent event for `level`, for markers, arguments and errors
    ///
    /// ```
    /// # use rust_logevents::prelude::*;
    /// # let hierarchy = LoggerHierarchy::builder().root_observer(std::sync::Arc::new(BufferObserver::new())).build();
    /// let logger = hierarchy.get_logger("app");
    /// logger.at(LogLevel::Warn).arg(3).arg("db-1").log("{} retries left on {}");
    /// ```
    pub fn at(&self, level: LogLevel) -> EventBuilder {
        self.node.state.load().generators[level.index()].event()
    }

    #[inline]
    pub fn trace(&self, message: impl Into<String>) {
        self.log(LogLevel::Trace, message);
    }

    #[inline]
    pub fn debug(&self, message: impl Into<String>) {
        self.log(LogLevel::Debug, message);
    }

    #[inline]
    pub fn info(&self, message: impl Into<String>) {
        self.log(LogLevel::Info, message);
    }

    #[inline]
    pub fn warn(&self, message: impl Into<String>) {
        self.log(LogLevel::Warn, message);
    }

    #[inline]
    pub fn error(&self, message: impl Into<String>) {
        self.log(LogLevel::Error, message);
    }

    /// Filter in effect after inheritance
    pub fn effective_filter(&self) -> Filter {
        self.node.state.load().filter.clone()
    }

    /// Least severe level that can be logged, `None` when fully disabled
    pub fn effective_threshold(&self) -> Option<LogLevel> {
        self.node.state.load().filter.threshold()
    }

    /// Observer chain in effect after inheritance
    pub fn observer(&self) -> ObserverRef {
        Arc::clone(&self.node.state.load().observer)
    }

    pub fn own_filter(&self) -> Option<Filter> {
        self.node.own.lock().filter.clone()
    }

    pub fn own_observer(&self) -> ObserverRef {
        Arc::clone(&self.node.own.lock().observer)
    }

    pub fn inherits_observers(&self) -> bool {
        self.node.own.lock().inherit
    }

    /// Whether this logger overrides anything it would otherwise inherit
    pub fn is_configured(&self) -> bool {
        self.node.own.lock().is_configured()
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("name", &self.name())
            .field("threshold", &self.effective_threshold())
            .field("observer", &self.observer().name())
            .finish()
    }
}

/// The tree of named loggers and the entry point for all configuration
///
/// Configuration changes are serialized against each other; log calls are
/// never blocked by them beyond an atomic pointer load.
pub struct LoggerHierarchy {
    root: Arc<LoggerNode>,
    loggers: RwLock<HashMap<String, Arc<LoggerNode>>>,
    config_lock: Mutex<()>,
    registry: ObserverRegistry,
    default_root_filter: Filter,
    default_root_observer: ObserverRef,
    metrics: Arc<LoggerMetrics>,
}

impl LoggerHierarchy {
    /// Hierarchy with the default root: INFO threshold, console observer
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> HierarchyBuilder {
        HierarchyBuilder::new()
    }

    fn from_builder(builder: HierarchyBuilder) -> Self {
        let metrics = Arc::new(LoggerMetrics::new());
        let default_root_observer = builder
            .root_observer
            .unwrap_or_else(|| Arc::new(ConsoleObserver::new()));
        let root = Arc::new(LoggerNode::new(
            Arc::from(ROOT_LOGGER_NAME),
            None,
            OwnConfig {
                filter: Some(builder.root_filter.clone()),
                observer: Arc::clone(&default_root_observer),
                inherit: false,
            },
            Arc::clone(&metrics),
        ));
        root.refresh();

        let registry = ObserverRegistry::new();
        registry.register("console", || Ok(Arc::new(ConsoleObserver::new()) as ObserverRef));
        for (name, observer) in builder.observers {
            registry.register_instance(name, observer);
        }

        Self {
            root,
            loggers: RwLock::new(HashMap::new()),
            config_lock: Mutex::new(()),
            registry,
            default_root_filter: builder.root_filter,
            default_root_observer,
            metrics,
        }
    }

    pub fn root(&self) -> Logger {
        Logger {
            node: Arc::clone(&self.root),
        }
    }

    /// Logger for `name`, created with its ancestors on first request
    pub fn get_logger(&self, name: &str) -> Logger {
        if is_root_name(name) {
            return self.root();
        }
        if let Some(node) = self.loggers.read().get(name) {
            return Logger {
                node: Arc::clone(node),
            };
        }
        let guard = self.config_lock.lock();
        Logger {
            node: self.materialize(name, &guard),
        }
    }

    /// Every logger created so far, sorted by name
    pub fn loggers(&self) -> Vec<Logger> {
        let mut loggers: Vec<Logger> = self
            .loggers
            .read()
            .values()
            .map(|node| Logger {
                node: Arc::clone(node),
            })
            .collect();
        loggers.sort_by(|a, b| a.name().cmp(b.name()));
        loggers
    }

    pub fn metrics(&self) -> &LoggerMetrics {
        &self.metrics
    }

    pub fn registry(&self) -> &ObserverRegistry {
        &self.registry
    }

    /// Register a named observer factory for use in configurations
    pub fn register_observer<F>(&self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Result<ObserverRef> + Send + Sync + 'static,
    {
        self.registry.register(name, factory);
    }

    /// Named observer, `Ok(None)` when not registered
    pub fn observer(&self, name: &str) -> Result<Option<ObserverRef>> {
        self.registry.lookup(name)
    }

    /// Set or clear the level threshold of `name`
    ///
    /// Clearing the root's level restores the default root threshold.
    /// Returns the previous explicit filter.
    pub fn set_level(&self, name: &str, level: Option<LogLevel>) -> Option<Filter> {
        self.set_filter(name, level.map(Filter::at_level))
    }

    /// Set or clear the filter of `name`, returning the previous one
    pub fn set_filter(&self, name: &str, filter: Option<Filter>) -> Option<Filter> {
        let guard = self.config_lock.lock();
        let node = self.node(name, &guard);
        let filter = match filter {
            None if node.is_root() => Some(self.default_root_filter.clone()),
            other => other,
        };
        let previous = std::mem::replace(&mut node.own.lock().filter, filter);
        self.refresh_cascade(&node);
        self.metrics.record_reconfiguration();
        previous
    }

    /// Replace the observer of `name`
    ///
    /// With `inherit` the parent's effective observers keep receiving the
    /// logger's events as well. Returns the previous own observer.
    pub fn set_observer(&self, name: &str, observer: ObserverRef, inherit: bool) -> ObserverRef {
        let guard = self.config_lock.lock();
        let node = self.node(name, &guard);
        let previous = {
            let mut own = node.own.lock();
            own.inherit = inherit;
            std::mem::replace(&mut own.observer, observer)
        };
        self.refresh_cascade(&node);
        self.metrics.record_reconfiguration();
        previous
    }

    /// Add an observer next to the ones `name` already has
    pub fn add_observer(&self, name: &str, observer: ObserverRef) {
        let guard = self.config_lock.lock();
        let node = self.node(name, &guard);
        {
            let mut own = node.own.lock();
            own.observer = CompositeObserver::combine([Arc::clone(&own.observer), observer]);
        }
        self.refresh_cascade(&node);
        self.metrics.record_reconfiguration();
    }

    /// Drop every explicit configuration and restore the default root
    pub fn reset(&self) {
        let guard = self.config_lock.lock();
        self.reset_locked(&guard);
        self.refresh_cascade(&self.root);
        self.metrics.record_reconfiguration();
    }

    fn reset_locked(&self, _guard: &MutexGuard<'_, ()>) {
        for node in self.loggers.read().values() {
            *node.own.lock() = OwnConfig::unconfigured();
        }
        *self.root.own.lock() = OwnConfig {
            filter: Some(self.default_root_filter.clone()),
            observer: Arc::clone(&self.default_root_observer),
            inherit: false,
        };
    }

    /// Replace the whole configuration
    ///
    /// Everything is validated before anything changes. An invalid
    /// configuration (unknown observer, malformed rule, broken observer
    /// definition) is reported to the status channel and leaves the previous
    /// configuration in place.
    pub fn apply_configuration(&self, configuration: &LogConfiguration) -> Result<()> {
        let plan = match self.plan(configuration) {
            Ok(plan) => plan,
            Err(e) => {
                self.metrics.record_rejected_reconfiguration();
                StatusChannel::global().add_fatal(
                    STATUS_LOCATION,
                    "Failed to apply configuration, keeping previous configuration",
                    Some(&e),
                );
                return Err(e);
            }
        };

        let guard = self.config_lock.lock();
        self.registry.commit(plan.observers);
        self.reset_locked(&guard);
        {
            let mut root = self.root.own.lock();
            if let Some(filter) = plan.root.filter {
                root.filter = Some(filter);
            }
            if let Some((observer, _)) = plan.root.observer {
                root.observer = observer;
            }
        }
        for (name, entry) in plan.loggers {
            let node = self.materialize(&name, &guard);
            let mut own = node.own.lock();
            own.filter = entry.filter;
            if let Some((observer, inherit)) = entry.observer {
                own.observer = observer;
                own.inherit = inherit;
            }
        }
        self.refresh_cascade(&self.root);
        drop(guard);

        self.metrics.record_reconfiguration();
        StatusChannel::global().add_config(
            STATUS_LOCATION,
            format!(
                "Applied configuration with {} logger entries",
                configuration.loggers.len()
            ),
        );
        Ok(())
    }

    fn plan(&self, configuration: &LogConfiguration) -> Result<ConfigurationPlan> {
        let observers = self.registry.stage(&configuration.observers)?;
        let resolve = |names: &[String]| -> Result<ObserverRef> {
            let resolved = names
                .iter()
                .map(|name| observers.resolve(&self.registry, name))
                .collect::<Result<Vec<_>>>()?;
            Ok(CompositeObserver::combine(resolved))
        };

        let root = match &configuration.root {
            Some(root) => PlannedLogger {
                filter: root.parse_filter()?,
                observer: match &root.observers {
                    Some(names) => Some((resolve(names)?, false)),
                    None => None,
                },
            },
            None => PlannedLogger::default(),
        };

        let mut loggers = Vec::with_capacity(configuration.loggers.len());
        for (name, entry) in &configuration.loggers {
            if is_root_name(name) {
                return Err(LoggerError::config(
                    format!("logger.{}", name),
                    "configure the root logger through 'root'",
                ));
            }
            let observer = match &entry.observers {
                Some(names) => Some((resolve(names)?, entry.include_parent)),
                None if !entry.include_parent => Some((null_observer(), false)),
                None => None,
            };
            loggers.push((
                name.clone(),
                PlannedLogger {
                    filter: entry.parse_filter()?,
                    observer,
                },
            ));
        }

        Ok(ConfigurationPlan {
            observers,
            root,
            loggers,
        })
    }

    fn node(&self, name: &str, guard: &MutexGuard<'_, ()>) -> Arc<LoggerNode> {
        if is_root_name(name) {
            Arc::clone(&self.root)
        } else {
            self.materialize(name, guard)
        }
    }

    /// Create `name` and any missing ancestors, parents first
    fn materialize(&self, name: &str, _guard: &MutexGuard<'_, ()>) -> Arc<LoggerNode> {
        if let Some(node) = self.loggers.read().get(name) {
            return Arc::clone(node);
        }

        let mut parent = Arc::clone(&self.root);
        for (end, _) in name.match_indices('.').chain(std::iter::once((name.len(), ""))) {
            let prefix = &name[..end];
            if prefix.is_empty() {
                continue;
            }
            let existing = self.loggers.read().get(prefix).cloned();
            parent = match existing {
                Some(node) => node,
                None => {
                    let node = Arc::new(LoggerNode::new(
                        Arc::from(prefix),
                        Some(Arc::downgrade(&parent)),
                        OwnConfig::unconfigured(),
                        Arc::clone(&self.metrics),
                    ));
                    node.refresh();
                    self.loggers
                        .write()
                        .insert(prefix.to_string(), Arc::clone(&node));
                    node
                }
            };
        }
        parent
    }

    /// Refresh `start` and every cached logger below it
    fn refresh_cascade(&self, start: &Arc<LoggerNode>) {
        let mut children: HashMap<*const LoggerNode, Vec<Arc<LoggerNode>>> = HashMap::new();
        for node in self.loggers.read().values() {
            if let Some(parent) = node.parent() {
                children
                    .entry(Arc::as_ptr(&parent))
                    .or_default()
                    .push(Arc::clone(node));
            }
        }

        let mut pending = vec![Arc::clone(start)];
        while let Some(node) = pending.pop() {
            node.refresh();
            if let Some(below) = children.remove(&Arc::as_ptr(&node)) {
                pending.extend(below);
            }
        }
    }
}

impl Default for LoggerHierarchy {
    fn default() -> Self {
        Self::new()
    }
}

fn is_root_name(name: &str) -> bool {
    name.is_empty() || name == ROOT_LOGGER_NAME
}

#[derive(Default)]
struct PlannedLogger {
    filter: Option<Filter>,
    observer: Option<(ObserverRef, bool)>,
}

struct ConfigurationPlan {
    observers: super::registry::StagedObservers,
    root: PlannedLogger,
    loggers: Vec<(String, PlannedLogger)>,
}

/// Builder for constructing a LoggerHierarchy with a fluent API
///
/// # Example
/// ```
/// use rust_logevents::prelude::*;
/// use std::sync::Arc;
///
/// let hierarchy = LoggerHierarchy::builder()
///     .root_level(LogLevel::Debug)
///     .root_observer(Arc::new(BufferObserver::new()))
///     .observer("audit", Arc::new(BufferObserver::with_capacity(100)))
///     .build();
///
/// assert!(hierarchy.root().is_debug_enabled());
/// assert!(hierarchy.observer("audit").unwrap().is_some());
/// ```
pub struct HierarchyBuilder {
    root_filter: Filter,
    root_observer: Option<ObserverRef>,
    observers: Vec<(String, ObserverRef)>,
}

impl HierarchyBuilder {
    /// Create a new builder with default values
    pub fn new() -> Self {
        Self {
            root_filter: Filter::at_level(LogLevel::Info),
            root_observer: None,
            observers: Vec::new(),
        }
    }

    /// Default threshold of the root logger
    #[must_use = "builder methods return a new value"]
    pub fn root_level(mut self, level: LogLevel) -> Self {
        self.root_filter = Filter::at_level(level);
        self
    }

    /// Default filter of the root logger
    #[must_use = "builder methods return a new value"]
    pub fn root_filter(mut self, filter: Filter) -> Self {
        self.root_filter = filter;
        self
    }

    /// Default observer of the root logger, replacing the console
    #[must_use = "builder methods return a new value"]
    pub fn root_observer(mut self, observer: ObserverRef) -> Self {
        self.root_observer = Some(observer);
        self
    }

    /// Named observer available to configurations
    #[must_use = "builder methods return a new value"]
    pub fn observer(mut self, name: impl Into<String>, observer: ObserverRef) -> Self {
        self.observers.push((name.into(), observer));
        self
    }

    pub fn build(self) -> LoggerHierarchy {
        LoggerHierarchy::from_builder(self)
    }
}

impl Default for HierarchyBuilder {
    fn default() -> Self {
        Self::new()
    }
}
