//! CLI module for nodeflow
//!
//! This module provides:
//! - Command implementations (run, validate, providers, credentials)
//! - Output handlers (console, JSON lines, quiet)
//! - Signal handling for graceful shutdown
//!
//! # Example
//!
//! ```ignore
//! use nodeflow::cli::{commands, output};
//!
//! let handler = output::create_handler(output::OutputMode::Console, false);
//! let engine = commands::build_engine(&config, Some(dir))?;
//! let exit_code =
//!     commands::run_workflow(&engine, "summarize", &args, None, &cancel, &*handler).await?;
//! ```

pub mod commands;
pub mod output;
pub mod signals;

pub use commands::{
    NewCredential, add_credential, build_engine, build_registry, list_credentials,
    list_providers, run_workflow, validate_workflow,
};
pub use output::{OutputEvent, OutputHandler, OutputMode, create_handler};
pub use signals::setup_signal_handlers;
