//! Output handlers for CLI commands
//!
//! Supports console (pretty), JSON lines, and quiet output modes.

use crate::status::{NodeStatus, StatusEvent};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::{self, Write};

/// Output mode for CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    #[default]
    Console,
    Json,
    Quiet,
}

impl OutputMode {
    /// Parse from string
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => Self::Json,
            "quiet" => Self::Quiet,
            _ => Self::Console,
        }
    }
}

/// Events emitted while a command runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputEvent {
    RunStart {
        workflow: String,
        run_id: String,
    },
    Node {
        node_id: String,
        node_type: String,
        status: NodeStatus,
        at: DateTime<Utc>,
    },
    RunComplete {
        run_id: String,
        duration_ms: u64,
    },
    RunError {
        error: String,
    },
    Info {
        message: String,
    },
    Debug {
        message: String,
    },
}

impl From<StatusEvent> for OutputEvent {
    fn from(event: StatusEvent) -> Self {
        Self::Node {
            node_id: event.node_id,
            node_type: event.node_type,
            status: event.status,
            at: event.at,
        }
    }
}

/// Output handler trait
pub trait OutputHandler: Send + Sync {
    /// Emit an event
    fn emit(&self, event: OutputEvent);

    /// Write final result
    fn result(&self, success: bool, output: Option<&str>);
}

/// Console output handler
pub struct ConsoleHandler {
    debug: bool,
}

impl ConsoleHandler {
    /// Create a new console handler
    pub fn new(debug: bool) -> Self {
        Self { debug }
    }

    fn format_duration(ms: u64) -> String {
        if ms < 1000 {
            format!("{}ms", ms)
        } else {
            format!("{:.1}s", ms as f64 / 1000.0)
        }
    }
}

impl OutputHandler for ConsoleHandler {
    fn emit(&self, event: OutputEvent) {
        match event {
            OutputEvent::RunStart { workflow, run_id } => {
                eprintln!("Running workflow '{}' (run {})", workflow, run_id);
            }
            OutputEvent::Node {
                node_id,
                node_type,
                status,
                ..
            } => match status {
                NodeStatus::Loading => {
                    eprint!("  {} ({})... ", node_id, node_type);
                    let _ = io::stderr().flush();
                }
                NodeStatus::Success => eprintln!("✓"),
                NodeStatus::Error => eprintln!("✗"),
            },
            OutputEvent::RunComplete {
                run_id,
                duration_ms,
            } => {
                eprintln!();
                eprintln!(
                    "✓ Run {} completed in {}",
                    run_id,
                    Self::format_duration(duration_ms)
                );
            }
            OutputEvent::RunError { error } => {
                eprintln!("Error: {}", error);
            }
            OutputEvent::Info { message } => {
                eprintln!("{}", message);
            }
            OutputEvent::Debug { message } => {
                if self.debug {
                    eprintln!("[debug] {}", message);
                }
            }
        }
    }

    fn result(&self, _success: bool, output: Option<&str>) {
        if let Some(out) = output {
            println!("{}", out);
        }
    }
}

/// JSON lines output handler
pub struct JsonHandler {
    pretty: bool,
}

impl JsonHandler {
    /// Create a new JSON handler
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }

    fn print_json<T: Serialize>(&self, value: &T) {
        let json = if self.pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        };

        if let Ok(s) = json {
            println!("{}", s);
        }
    }
}

impl OutputHandler for JsonHandler {
    fn emit(&self, event: OutputEvent) {
        self.print_json(&event);
    }

    fn result(&self, success: bool, output: Option<&str>) {
        #[derive(Serialize)]
        struct FinalResult<'a> {
            #[serde(rename = "type")]
            kind: &'static str,
            success: bool,
            output: Option<serde_json::Value>,
            #[serde(skip_serializing_if = "Option::is_none")]
            raw: Option<&'a str>,
        }

        // Embed JSON output as a value rather than a quoted string
        let parsed = output.and_then(|o| serde_json::from_str(o).ok());
        let raw = if parsed.is_none() { output } else { None };
        self.print_json(&FinalResult {
            kind: "result",
            success,
            output: parsed,
            raw,
        });
    }
}

/// Quiet handler that only prints the final output
pub struct QuietHandler;

impl OutputHandler for QuietHandler {
    fn emit(&self, _event: OutputEvent) {}
    fn result(&self, _success: bool, output: Option<&str>) {
        if let Some(out) = output {
            println!("{}", out);
        }
    }
}

/// Create an output handler based on mode
pub fn create_handler(mode: OutputMode, debug: bool) -> Box<dyn OutputHandler> {
    match mode {
        OutputMode::Console => Box::new(ConsoleHandler::new(debug)),
        // One event per line so the stream can be piped
        OutputMode::Json => Box::new(JsonHandler::new(false)),
        OutputMode::Quiet => Box::new(QuietHandler),
    }
}
