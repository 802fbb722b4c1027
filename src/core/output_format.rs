//! Rendering of log events to single lines
//!
//! - Text: `[2025-01-08T10:30:45.123Z] [INFO ] main app.db - Pool ready`
//! - Json: one object per line
//! - Logfmt: `key=value` pairs

use super::log_event::LogEvent;
use super::timestamp::TimestampFormat;
use super::error::LoggerError;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    Logfmt,
}

impl FromStr for OutputFormat {
    type Err = LoggerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "logfmt" => Ok(OutputFormat::Logfmt),
            other => Err(LoggerError::config(
                "format",
                format!("unknown output format '{}'", other),
            )),
        }
    }
}

/// Line formatter shared by the console and file destinations
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFormatter {
    pub output_format: OutputFormat,
    pub timestamp_format: TimestampFormat,
    /// Append `file:line` when the call site was captured
    pub include_location: bool,
}

impl EventFormatter {
    pub fn new(output_format: OutputFormat) -> Self {
        Self {
            output_format,
            ..Default::default()
        }
    }

    #[must_use = "builder methods return a new value"]
    pub fn with_timestamp_format(mut self, format: TimestampFormat) -> Self {
        self.timestamp_format = format;
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn with_location(mut self, include: bool) -> Self {
        self.include_location = include;
        self
    }

    pub fn format(&self, event: &LogEvent) -> String {
        self.format_with_level(event, &format!("{:5}", event.level.to_str()))
    }

    /// Format with a pre-rendered (e.g. colored) level for text output
    pub fn format_with_level(&self, event: &LogEvent, level: &str) -> String {
        match self.output_format {
            OutputFormat::Text => self.format_text(event, level),
            OutputFormat::Json => self.format_json(event),
            OutputFormat::Logfmt => self.format_logfmt(event),
        }
    }

    fn format_text(&self, event: &LogEvent, level: &str) -> String {
        let mut line = format!(
            "[{}] [{}] {} {} - {}",
            self.timestamp_format.format(&event.timestamp),
            level,
            event.thread,
            event.logger,
            event.formatted_message()
        );
        if let Some(ref marker) = event.marker {
            let _ = write!(line, " marker={}", marker);
        }
        for (key, value) in event.mdc.iter() {
            let _ = write!(line, " {}={}", key, value);
        }
        if self.include_location {
            if let Some(site) = event.call_site {
                let _ = write!(line, " ({}:{})", site.file, site.line);
            }
        }
        if let Some(ref error) = event.error {
            let _ = write!(line, " | {}", error);
        }
        line
    }

    fn format_json(&self, event: &LogEvent) -> String {
        let mut object = serde_json::Map::new();
        object.insert(
            "timestamp".to_string(),
            self.timestamp_format.to_json_value(&event.timestamp),
        );
        object.insert("level".to_string(), event.level.to_str().into());
        object.insert("logger".to_string(), event.logger.as_ref().into());
        object.insert("thread".to_string(), event.thread.as_ref().into());
        object.insert("message".to_string(), event.formatted_message().into());
        if let Some(ref marker) = event.marker {
            object.insert("marker".to_string(), marker.name().into());
        }
        if !event.mdc.is_empty() {
            let mdc: serde_json::Map<String, serde_json::Value> = event
                .mdc
                .iter()
                .map(|(k, v)| (k.clone(), v.as_str().into()))
                .collect();
            object.insert("mdc".to_string(), mdc.into());
        }
        if !event.args.is_empty() {
            object.insert(
                "args".to_string(),
                event.args.iter().map(|a| a.to_json_value()).collect(),
            );
        }
        if let Some(ref error) = event.error {
            object.insert("error".to_string(), error.message.as_str().into());
            if !error.causes.is_empty() {
                object.insert("causes".to_string(), error.causes.clone().into());
            }
        }
        if self.include_location {
            if let Some(site) = event.call_site {
                object.insert("file".to_string(), site.file.into());
                object.insert("line".to_string(), site.line.into());
                object.insert("module_path".to_string(), site.module_path.into());
            }
        }
        serde_json::Value::Object(object).to_string()
    }

    fn format_logfmt(&self, event: &LogEvent) -> String {
        let mut parts = vec![
            format!(
                "timestamp={}",
                escape_logfmt_value(&self.timestamp_format.format(&event.timestamp))
            ),
            format!("level={}", event.level.to_str()),
            format!("logger={}", escape_logfmt_value(&event.logger)),
            format!("thread={}", escape_logfmt_value(&event.thread)),
            format!("message={}", quote_logfmt_value(&event.formatted_message())),
        ];
        if let Some(ref marker) = event.marker {
            parts.push(format!("marker={}", escape_logfmt_value(marker.name())));
        }
        for (key, value) in event.mdc.iter() {
            parts.push(format!("{}={}", escape_logfmt_key(key), escape_logfmt_value(value)));
        }
        if let Some(ref error) = event.error {
            parts.push(format!("error={}", quote_logfmt_value(&error.message)));
        }
        if self.include_location {
            if let Some(site) = event.call_site {
                parts.push(format!("file={}", escape_logfmt_value(site.file)));
                parts.push(format!("line={}", site.line));
            }
        }
        parts.join(" ")
    }
}

fn escape_logfmt_key(key: &str) -> String {
    key.chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-' || *c == '.')
        .collect()
}

fn escape_logfmt_value(value: &str) -> String {
    if value.is_empty() || value.contains([' ', '"', '=']) {
        quote_logfmt_value(value)
    } else {
        value.to_string()
    }
}

fn quote_logfmt_value(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}
