//! Console destination

use crate::core::{EventFormatter, LogEvent, LogLevel, Observer, OutputFormat, Result, TimestampFormat};
#[cfg(feature = "console")]
use colored::Colorize;
use parking_lot::Mutex;
use std::io::Write;

enum Target {
    /// `Error` to stderr, everything else to stdout
    Std,
    Writer(Mutex<Box<dyn Write + Send>>),
}

pub struct ConsoleObserver {
    formatter: EventFormatter,
    use_colors: bool,
    target: Target,
}

impl ConsoleObserver {
    pub fn new() -> Self {
        Self {
            formatter: EventFormatter::default(),
            use_colors: true,
            target: Target::Std,
        }
    }

    pub fn with_colors(use_colors: bool) -> Self {
        Self {
            use_colors,
            ..Self::new()
        }
    }

    /// Write every line to `writer` instead of stdout/stderr, without colors
    ///
    /// # Example
    ///
    /// ```
    /// use rust_logevents::observers::ConsoleObserver;
    ///
    /// let observer = ConsoleObserver::with_writer(std::io::sink());
    /// ```
    pub fn with_writer(writer: impl Write + Send + 'static) -> Self {
        Self {
            formatter: EventFormatter::default(),
            use_colors: false,
            target: Target::Writer(Mutex::new(Box::new(writer))),
        }
    }

    #[must_use = "builder methods return a new value"]
    pub fn with_output_format(mut self, format: OutputFormat) -> Self {
        self.formatter.output_format = format;
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn with_timestamp_format(mut self, format: TimestampFormat) -> Self {
        self.formatter.timestamp_format = format;
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn with_formatter(mut self, formatter: EventFormatter) -> Self {
        self.formatter = formatter;
        self
    }

    pub fn formatter(&self) -> &EventFormatter {
        &self.formatter
    }

    fn render(&self, event: &LogEvent) -> String {
        #[cfg(feature = "console")]
        if self.use_colors && self.formatter.output_format == OutputFormat::Text {
            let level = format!("{:5}", event.level.to_str())
                .color(event.level.color_code())
                .to_string();
            return self.formatter.format_with_level(event, &level);
        }
        self.formatter.format(event)
    }
}

impl Default for ConsoleObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl Observer for ConsoleObserver {
    fn log_event(&self, event: &LogEvent) -> Result<()> {
        let line = self.render(event);
        match &self.target {
            Target::Std if event.level == LogLevel::Error => {
                writeln!(std::io::stderr().lock(), "{}", line)?;
            }
            Target::Std => {
                writeln!(std::io::stdout().lock(), "{}", line)?;
            }
            Target::Writer(writer) => {
                writeln!(writer.lock(), "{}", line)?;
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "console"
    }

    fn flush(&self) -> Result<()> {
        match &self.target {
            Target::Std => {
                std::io::stdout().flush()?;
                std::io::stderr().flush()?;
            }
            Target::Writer(writer) => writer.lock().flush()?,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    /// Writer sharing its bytes with the test
    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuffer {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock()).into_owned()
        }
    }

    #[test]
    fn test_writes_formatted_line() {
        let buffer = SharedBuffer::default();
        let observer = ConsoleObserver::with_writer(buffer.clone());
        observer
            .log_event(&LogEvent::new(Arc::from("app"), LogLevel::Warn, "disk at {}%").with_args(vec![91.into()]))
            .unwrap();

        let output = buffer.contents();
        assert_eq!(output.lines().count(), 1);
        assert!(output.contains("[WARN ]"));
        assert!(output.contains("app - disk at 91%"));
    }

    #[test]
    fn test_json_output() {
        let buffer = SharedBuffer::default();
        let observer =
            ConsoleObserver::with_writer(buffer.clone()).with_output_format(OutputFormat::Json);
        observer
            .log_event(&LogEvent::new(Arc::from("app"), LogLevel::Info, "ready"))
            .unwrap();

        let parsed: serde_json::Value = serde_json::from_str(buffer.contents().trim()).unwrap();
        assert_eq!(parsed["message"], "ready");
    }

    #[test]
    fn test_std_target_does_not_fail() {
        let observer = ConsoleObserver::with_colors(false);
        let event = LogEvent::new(Arc::from("app"), LogLevel::Error, "to stderr");
        assert!(observer.log_event(&event).is_ok());
        assert!(observer.flush().is_ok());
    }
}
