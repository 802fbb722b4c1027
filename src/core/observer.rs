//! Observer trait for event destinations, plus the structural observers
//! the dispatch engine composes: null, composite and conditional.

use super::error::Result;
use super::log_event::LogEvent;
use super::log_level::LogLevel;
use super::marker::Marker;
use super::predicate::Predicate;
use super::status::{panic_message, StatusChannel};
use once_cell::sync::Lazy;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// Shared handle to a destination
pub type ObserverRef = Arc<dyn Observer>;

/// Upcast helper so default trait methods can hand out `self` as an `ObserverRef`
pub trait IntoObserverRef {
    fn into_observer_ref(self: Arc<Self>) -> ObserverRef;
}

impl<T: Observer> IntoObserverRef for T {
    fn into_observer_ref(self: Arc<Self>) -> ObserverRef {
        self
    }
}

/// A destination for log events
///
/// Implementations must be cheap to share between threads. `log_event` may
/// be called concurrently from any application thread.
pub trait Observer: IntoObserverRef + Send + Sync + 'static {
    fn log_event(&self, event: &LogEvent) -> Result<()>;

    fn name(&self) -> &str;

    /// Observer to use for `level` events that must satisfy `predicate`
    ///
    /// Called once per configuration change, so implementations may do
    /// expensive simplification here. Returns the null observer when the
    /// result can never log.
    fn filtered_on(self: Arc<Self>, _level: LogLevel, predicate: &Predicate) -> ObserverRef {
        conditional(self.into_observer_ref(), predicate)
    }

    /// Statically known enablement for calls without a marker
    fn is_enabled(&self) -> bool {
        true
    }

    fn is_enabled_for(&self, _marker: Option<&Marker>) -> bool {
        self.is_enabled()
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }

    fn is_null(&self) -> bool {
        false
    }

    /// Members of a composite, used to flatten nested composites
    fn members(&self) -> Option<&[ObserverRef]> {
        None
    }
}

/// Gate `observer` behind `predicate`, collapsing the trivial cases
pub fn conditional(observer: ObserverRef, predicate: &Predicate) -> ObserverRef {
    match predicate {
        Predicate::Always => observer,
        Predicate::Never => null_observer(),
        _ if observer.is_null() => observer,
        condition => Arc::new(ConditionalObserver {
            delegate: observer,
            condition: condition.clone(),
        }),
    }
}

/// Observer that discards everything
#[derive(Debug, Default)]
pub struct NullObserver;

static NULL_OBSERVER: Lazy<ObserverRef> = Lazy::new(|| Arc::new(NullObserver));

/// Shared null observer instance
pub fn null_observer() -> ObserverRef {
    Arc::clone(&NULL_OBSERVER)
}

impl Observer for NullObserver {
    fn log_event(&self, _event: &LogEvent) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        "null"
    }

    fn filtered_on(self: Arc<Self>, _level: LogLevel, _predicate: &Predicate) -> ObserverRef {
        self
    }

    fn is_enabled(&self) -> bool {
        false
    }

    fn is_null(&self) -> bool {
        true
    }
}

fn same_observer(a: &ObserverRef, b: &ObserverRef) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

/// Fan-out to several destinations with per-destination failure isolation
pub struct CompositeObserver {
    members: Vec<ObserverRef>,
}

impl CompositeObserver {
    /// Combine observers into one, flattening nested composites
    ///
    /// Null observers and duplicates are dropped. Returns the null observer
    /// for an empty input and the single member when only one remains.
    pub fn combine(observers: impl IntoIterator<Item = ObserverRef>) -> ObserverRef {
        let mut members: Vec<ObserverRef> = Vec::new();
        for observer in observers {
            match observer.members() {
                Some(nested) => {
                    for member in nested {
                        push_unique(&mut members, member.clone());
                    }
                }
                None if observer.is_null() => {}
                None => push_unique(&mut members, observer),
            }
        }
        match members.len() {
            0 => null_observer(),
            1 => members.remove(0),
            _ => Arc::new(CompositeObserver { members }),
        }
    }
}

fn push_unique(members: &mut Vec<ObserverRef>, observer: ObserverRef) {
    if !members.iter().any(|m| same_observer(m, &observer)) {
        members.push(observer);
    }
}

impl Observer for CompositeObserver {
    fn log_event(&self, event: &LogEvent) -> Result<()> {
        for member in &self.members {
            let result = catch_unwind(AssertUnwindSafe(|| member.log_event(event)));
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => StatusChannel::global().add_error(
                    member.name(),
                    format!("Failed to log event from {}", event.logger),
                    Some(&e),
                ),
                Err(panic_info) => StatusChannel::global().add_fatal(
                    member.name(),
                    format!(
                        "Observer panicked: {}. Other observers continue to function.",
                        panic_message(&*panic_info)
                    ),
                    None,
                ),
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "composite"
    }

    fn filtered_on(self: Arc<Self>, level: LogLevel, predicate: &Predicate) -> ObserverRef {
        CompositeObserver::combine(
            self.members
                .iter()
                .map(|m| Arc::clone(m).filtered_on(level, predicate)),
        )
    }

    fn is_enabled(&self) -> bool {
        self.members.iter().any(|m| m.is_enabled())
    }

    fn is_enabled_for(&self, marker: Option<&Marker>) -> bool {
        self.members.iter().any(|m| m.is_enabled_for(marker))
    }

    fn flush(&self) -> Result<()> {
        let mut first_error = None;
        for member in &self.members {
            if let Err(e) = member.flush() {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn members(&self) -> Option<&[ObserverRef]> {
        Some(&self.members)
    }
}

/// Forwards only events matching a condition
pub struct ConditionalObserver {
    delegate: ObserverRef,
    condition: Predicate,
}

impl ConditionalObserver {
    pub fn condition(&self) -> &Predicate {
        &self.condition
    }

    pub fn delegate(&self) -> &ObserverRef {
        &self.delegate
    }
}

impl Observer for ConditionalObserver {
    fn log_event(&self, event: &LogEvent) -> Result<()> {
        if self.condition.test_event(event) {
            self.delegate.log_event(event)
        } else {
            Ok(())
        }
    }

    fn name(&self) -> &str {
        self.delegate.name()
    }

    fn filtered_on(self: Arc<Self>, level: LogLevel, predicate: &Predicate) -> ObserverRef {
        Arc::clone(&self.delegate).filtered_on(level, &self.condition.and(predicate))
    }

    fn is_enabled(&self) -> bool {
        self.condition.test() && self.delegate.is_enabled()
    }

    fn is_enabled_for(&self, marker: Option<&Marker>) -> bool {
        self.condition.test_marker(marker) && self.delegate.is_enabled_for(marker)
    }

    fn flush(&self) -> Result<()> {
        self.delegate.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{LoggerError, Mdc};
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<String>>,
    }

    impl Observer for Recorder {
        fn log_event(&self, event: &LogEvent) -> Result<()> {
            self.seen.lock().push(event.formatted_message());
            Ok(())
        }

        fn name(&self) -> &str {
            "recorder"
        }
    }

    struct Failing;

    impl Observer for Failing {
        fn log_event(&self, _event: &LogEvent) -> Result<()> {
            Err(LoggerError::destination("failing", "unreachable"))
        }

        fn name(&self) -> &str {
            "failing-observer-test"
        }
    }

    struct Panicking;

    impl Observer for Panicking {
        fn log_event(&self, _event: &LogEvent) -> Result<()> {
            panic!("destination exploded")
        }

        fn name(&self) -> &str {
            "panicking-observer-test"
        }
    }

    fn event(message: &str) -> LogEvent {
        LogEvent::new(Arc::from("test"), LogLevel::Info, message)
    }

    #[test]
    fn test_combine_flattens_and_drops_nulls() {
        let a: ObserverRef = Arc::new(Recorder::default());
        let b: ObserverRef = Arc::new(Recorder::default());
        let inner = CompositeObserver::combine([a.clone(), b.clone()]);
        let outer = CompositeObserver::combine([inner, null_observer(), a.clone()]);

        assert_eq!(outer.members().map(<[_]>::len), Some(2));
        assert!(CompositeObserver::combine([null_observer()]).is_null());
        assert!(same_observer(&CompositeObserver::combine([a.clone()]), &a));
    }

    #[test]
    fn test_composite_isolates_member_failures() {
        let recorder = Arc::new(Recorder::default());
        let composite = CompositeObserver::combine([
            Arc::new(Failing) as ObserverRef,
            Arc::new(Panicking) as ObserverRef,
            recorder.clone() as ObserverRef,
        ]);

        assert!(composite.log_event(&event("still delivered")).is_ok());
        assert_eq!(*recorder.seen.lock(), vec!["still delivered".to_string()]);
        assert!(!StatusChannel::global()
            .messages_for("failing-observer-test")
            .is_empty());
        assert!(!StatusChannel::global()
            .messages_for("panicking-observer-test")
            .is_empty());
    }

    #[test]
    fn test_filtered_on_collapses_trivial_predicates() {
        let recorder: ObserverRef = Arc::new(Recorder::default());
        let same = recorder.clone().filtered_on(LogLevel::Info, &Predicate::Always);
        assert!(same_observer(&same, &recorder));

        let never = recorder.clone().filtered_on(LogLevel::Info, &Predicate::Never);
        assert!(never.is_null());
        assert!(!never.is_enabled());
    }

    #[test]
    fn test_conditional_enablement_follows_mdc() {
        Mdc::clear();
        let recorder = Arc::new(Recorder::default());
        let observer = (recorder.clone() as ObserverRef).filtered_on(
            LogLevel::Info,
            &Predicate::required_mdc("user", ["admin"]),
        );

        assert!(!observer.is_enabled());
        observer.log_event(&event("dropped")).unwrap();

        let _user = Mdc::put("user", "admin");
        assert!(observer.is_enabled());
        observer.log_event(&event("kept")).unwrap();
        assert_eq!(*recorder.seen.lock(), vec!["kept".to_string()]);
    }

    #[test]
    fn test_conditional_refilter_merges_conditions() {
        let recorder: ObserverRef = Arc::new(Recorder::default());
        let ops = Predicate::required_marker([Marker::new("OPS")]);
        let once = recorder.filtered_on(LogLevel::Info, &ops);
        let twice = once.filtered_on(LogLevel::Info, &Predicate::Never);
        assert!(twice.is_null());
    }
}
