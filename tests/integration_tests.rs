//! Integration tests for rust_logevents
//!
//! These tests verify:
//! - End-to-end delivery through the hierarchy
//! - Conditional filters driven by the MDC
//! - Observer inheritance and cascade on reconfiguration
//! - Atomic configuration reloads
//! - File and console destinations
//! - Failure isolation between destinations

use rust_logevents::batch::{BatchPolicy, ManualScheduler, ThrottlePolicy};
use rust_logevents::core::status::StatusLevel;
use rust_logevents::observers::{BatchingObserver, SummaryProcessor};
use rust_logevents::prelude::*;
use std::fs;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// Writer whose output stays readable after being moved into an observer
#[derive(Clone, Default)]
struct SharedWriter(Arc<Mutex<Vec<u8>>>);

impl SharedWriter {
    fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl Write for SharedWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

struct PanickingObserver;

impl Observer for PanickingObserver {
    fn log_event(&self, _event: &LogEvent) -> Result<()> {
        panic!("destination exploded");
    }

    fn name(&self) -> &str {
        "panicking"
    }
}

struct FailingObserver;

impl Observer for FailingObserver {
    fn log_event(&self, _event: &LogEvent) -> Result<()> {
        Err(LoggerError::destination("failing", "remote returned 503"))
    }

    fn name(&self) -> &str {
        "failing"
    }
}

fn buffered_hierarchy() -> (LoggerHierarchy, Arc<BufferObserver>) {
    let buffer = Arc::new(BufferObserver::new());
    let hierarchy = LoggerHierarchy::builder()
        .root_observer(buffer.clone())
        .build();
    (hierarchy, buffer)
}

#[test]
fn test_warn_root_console_output() {
    let writer = SharedWriter::default();
    let console = Arc::new(ConsoleObserver::with_writer(writer.clone()));
    let hierarchy = LoggerHierarchy::builder()
        .root_level(LogLevel::Warn)
        .root_observer(console)
        .build();

    let logger = hierarchy.get_logger("org.example.Service");
    logger.info("x");
    assert!(writer.contents().is_empty());

    logger.warn("y");
    let output = writer.contents();
    let lines: Vec<&str> = output.lines().collect();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].contains("[WARN "));
    assert!(lines[0].ends_with("org.example.Service - y"));
}

#[test]
fn test_mdc_conditional_rule() {
    let buffer = Arc::new(BufferObserver::new());
    let hierarchy = LoggerHierarchy::builder()
        .root_filter(Filter::parse("WARN,INFO@mdc:user=admin|tester").unwrap())
        .root_observer(buffer.clone())
        .build();
    let logger = hierarchy.get_logger("org.example");

    Mdc::clear();
    assert!(!logger.is_info_enabled());
    logger.info("anonymous");

    {
        let _user = Mdc::put("user", "admin");
        assert!(logger.is_info_enabled());
        logger.info("from admin");
        assert!(!logger.is_debug_enabled());
    }
    {
        let _user = Mdc::put("user", "guest");
        assert!(!logger.is_info_enabled());
    }

    let events = buffer.events();
    assert_eq!(buffer.messages(), vec!["from admin"]);
    assert_eq!(events[0].mdc_value("user"), Some("admin"));
}

#[test]
fn test_children_share_parent_observer_in_order() {
    let (hierarchy, root_buffer) = buffered_hierarchy();
    let first = hierarchy.get_logger("app.first");
    let second = hierarchy.get_logger("app.second");

    let parent_buffer = Arc::new(BufferObserver::new());
    hierarchy.set_observer("app", parent_buffer.clone(), false);

    first.info("from first");
    second.info("from second");
    first.info("first again");

    assert_eq!(
        parent_buffer.messages(),
        vec!["from first", "from second", "first again"]
    );
    let loggers: Vec<String> = parent_buffer
        .events()
        .iter()
        .map(|e| e.logger.to_string())
        .collect();
    assert_eq!(loggers, vec!["app.first", "app.second", "app.first"]);
    assert!(root_buffer.is_empty());
}

#[test]
fn test_observer_change_cascades_to_materialized_descendants() {
    let (hierarchy, root_buffer) = buffered_hierarchy();
    let deep = hierarchy.get_logger("a.b.c.d");
    let sibling = hierarchy.get_logger("a.x");
    let overridden = hierarchy.get_logger("a.b.own");
    let own_buffer = Arc::new(BufferObserver::new());
    hierarchy.set_observer("a.b.own", own_buffer.clone(), false);

    let shared = Arc::new(BufferObserver::new());
    hierarchy.set_observer("a", shared.clone(), true);

    deep.info("deep");
    sibling.info("sibling");
    overridden.info("overridden");

    assert_eq!(shared.messages(), vec!["deep", "sibling"]);
    assert_eq!(root_buffer.messages(), vec!["deep", "sibling"]);
    assert_eq!(own_buffer.messages(), vec!["overridden"]);
}

#[test]
fn test_level_change_cascades_without_new_handles() {
    let (hierarchy, buffer) = buffered_hierarchy();
    let handle = hierarchy.get_logger("svc.worker.pool");
    assert!(!handle.is_debug_enabled());

    hierarchy.set_level("svc", Some(LogLevel::Trace));
    assert!(handle.is_trace_enabled());
    handle.trace("visible");

    hierarchy.set_level("svc.worker", Some(LogLevel::Error));
    handle.warn("hidden");
    assert_eq!(buffer.messages(), vec!["visible"]);
}

#[test]
fn test_properties_configuration_with_file_observer() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let log_file = temp_dir.path().join("app.log");
    let properties = format!(
        "# application logging\n\
         root=WARN out\n\
         logger.org.example=INFO,DEBUG@mdc:user=admin\n\
         observer.out=file\n\
         observer.out.path={}\n",
        log_file.display()
    );

    let configuration = LogConfiguration::from_properties(&properties).unwrap();
    let hierarchy = LoggerHierarchy::new();
    hierarchy.apply_configuration(&configuration).unwrap();

    let logger = hierarchy.get_logger("org.example.db");
    logger.debug("not for anonymous");
    logger.info("pool ready");
    {
        let _user = Mdc::put("user", "admin");
        logger.debug("admin detail");
    }
    hierarchy.get_logger("other").info("filtered by root");
    logger.observer().flush().unwrap();

    let content = fs::read_to_string(&log_file).expect("Failed to read log file");
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 2, "unexpected output: {}", content);
    assert!(lines[0].ends_with("org.example.db - pool ready"));
    assert!(lines[1].contains("admin detail"));
    assert!(lines[1].contains("user=admin"));
}

#[test]
fn test_reapplying_configuration_keeps_instances() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let json = format!(
        r#"{{
            "root": {{ "filter": "INFO", "observers": ["out"] }},
            "observers": {{ "out": {{ "kind": "file", "path": {:?} }} }}
        }}"#,
        temp_dir.path().join("json.log").display().to_string()
    );
    let configuration = LogConfiguration::from_json(&json).unwrap();
    let hierarchy = LoggerHierarchy::new();

    hierarchy.apply_configuration(&configuration).unwrap();
    let first = hierarchy.observer("out").unwrap().unwrap();
    hierarchy.apply_configuration(&configuration).unwrap();
    let second = hierarchy.observer("out").unwrap().unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(hierarchy.metrics().reconfigurations(), 2);
}

#[test]
fn test_failed_reload_keeps_previous_configuration() {
    let buffer = Arc::new(BufferObserver::new());
    let hierarchy = LoggerHierarchy::builder()
        .root_observer(Arc::new(BufferObserver::new()))
        .observer("mem", buffer.clone())
        .build();

    let good = LogConfiguration::from_properties("root=INFO mem\nlogger.app=DEBUG").unwrap();
    hierarchy.apply_configuration(&good).unwrap();
    let logger = hierarchy.get_logger("app.jobs");
    assert!(logger.is_debug_enabled());

    let unknown = LogConfiguration::from_properties("root=ERROR slack").unwrap();
    let result = hierarchy.apply_configuration(&unknown);
    assert!(matches!(result, Err(LoggerError::UnknownObserver { .. })));

    let malformed = LogConfiguration::from_properties("root=INFO mem\nlogger.app=LOUD").unwrap();
    assert!(hierarchy.apply_configuration(&malformed).is_err());

    assert!(logger.is_debug_enabled());
    logger.debug("still configured");
    assert_eq!(buffer.messages(), vec!["still configured"]);
    assert_eq!(hierarchy.metrics().rejected_reconfigurations(), 2);

    let reported = StatusChannel::global()
        .messages_at_least(StatusLevel::Fatal)
        .iter()
        .any(|m| m.location == "LoggerHierarchy" && m.message.contains("keeping previous"));
    assert!(reported);
}

#[test]
fn test_include_parent_false_detaches_from_root() {
    let (hierarchy, root_buffer) = buffered_hierarchy();
    let audit = Arc::new(BufferObserver::new());
    hierarchy.register_observer("audit", {
        let audit = audit.clone();
        move || Ok(audit.clone() as ObserverRef)
    });

    let configuration = LogConfiguration::from_properties(
        "logger.security=INFO audit\nincludeParent.security=false",
    )
    .unwrap();
    hierarchy.apply_configuration(&configuration).unwrap();

    hierarchy.get_logger("security.login").warn("failed login");
    hierarchy.get_logger("web").warn("slow request");

    assert_eq!(audit.messages(), vec!["failed login"]);
    assert_eq!(root_buffer.messages(), vec!["slow request"]);
    assert!(!hierarchy.get_logger("security").inherits_observers());
}

#[test]
fn test_none_disables_logger() {
    let (hierarchy, buffer) = buffered_hierarchy();
    let configuration = LogConfiguration::from_properties("logger.noisy=NONE").unwrap();
    hierarchy.apply_configuration(&configuration).unwrap();

    let noisy = hierarchy.get_logger("noisy.component");
    assert_eq!(noisy.effective_threshold(), None);
    noisy.error("dropped");
    assert!(buffer.is_empty());
}

#[test]
fn test_failing_destination_does_not_affect_siblings() {
    let (hierarchy, buffer) = buffered_hierarchy();
    hierarchy.add_observer("risky", Arc::new(PanickingObserver));
    hierarchy.add_observer("risky", Arc::new(FailingObserver));

    let logger = hierarchy.get_logger("risky.call");
    logger.error("first");
    logger.error("second");

    assert_eq!(buffer.messages(), vec!["first", "second"]);
    let status = StatusChannel::global();
    assert!(status
        .messages_for("panicking")
        .iter()
        .any(|m| m.message.contains("destination exploded")));
    assert!(!status.messages_for("failing").is_empty());
}

#[test]
fn test_fluent_event_with_marker_args_and_error() {
    let (hierarchy, buffer) = buffered_hierarchy();
    let logger = hierarchy.get_logger("billing");
    let payments = Marker::new("PAYMENTS");
    let error = io::Error::new(io::ErrorKind::TimedOut, "gateway timeout");

    logger
        .at(LogLevel::Error)
        .marker(&payments)
        .arg("inv-42")
        .arg(3)
        .error(&error)
        .log("invoice {} failed after {} attempts");

    let events = buffer.events();
    assert_eq!(events.len(), 1);
    assert_eq!(
        events[0].formatted_message(),
        "invoice inv-42 failed after 3 attempts"
    );
    assert_eq!(events[0].marker, Some(payments));
    assert_eq!(
        events[0].error.as_ref().map(|e| e.message.as_str()),
        Some("gateway timeout")
    );
}

#[test]
fn test_log_injection_is_escaped_in_files() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let log_file = temp_dir.path().join("injection.log");
    let file = Arc::new(FileObserver::open(&log_file).unwrap());
    let hierarchy = LoggerHierarchy::builder().root_observer(file.clone()).build();

    hierarchy
        .get_logger("auth")
        .info("User login\nERROR [2024-10-17] Fake error injected");
    file.flush().unwrap();

    let content = fs::read_to_string(&log_file).unwrap();
    assert_eq!(content.lines().count(), 1);
    assert!(content.contains("\\n"));
}

#[test]
fn test_batching_observer_in_hierarchy() {
    let (hierarchy, _) = buffered_hierarchy();
    let scheduler = ManualScheduler::new();
    let summaries = Arc::new(BufferObserver::new());
    let batching = BatchingObserver::builder("alerts", SummaryProcessor::new(summaries.clone()))
        .policy(BatchPolicy::Throttle(
            ThrottlePolicy::new(vec![Duration::from_secs(30), Duration::from_secs(300)]).unwrap(),
        ))
        .scheduler(Arc::new(scheduler.clone()))
        .build()
        .unwrap();
    hierarchy.set_observer("alerts", Arc::new(batching), false);

    let logger = hierarchy.get_logger("alerts.disk");
    logger.error("disk full");
    assert_eq!(scheduler.last_requested_delay(), Some(Duration::ZERO));
    logger.error("disk full");
    logger.error("disk full");
    assert!(summaries.is_empty());

    scheduler.fire_all();
    assert_eq!(summaries.messages(), vec!["disk full (x3)"]);
}
