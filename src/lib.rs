//! # Config Bridge
//!
//! Out-of-process plugin bridge for the configuration lifecycle.
//!
//! A plugin implements [`Config`] natively. The bridge carries its four
//! operations (attributes, load, validate, finalize) across a process
//! boundary so the host can use a [`ConfigClient`] exactly as if it were the
//! native implementation.
//!
//! ## Components
//!
//! - **Codec**: [`ConfigData`] to and from its JSON wire envelope
//! - **Context joiner**: [`join`] a call context with the plugin session
//! - **Error translator**: [`translate`] remote failures into session or business errors
//! - **Server adapter**: [`ConfigServer`] runs native calls under request cancellation
//! - **Client adapter**: [`ConfigClient`] implements [`Config`] over the wire
//!
//! ## Quick Start
//!
//! ```bash
//! # Serve the passthrough plugin on stdin/stdout
//! config-bridge serve
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
// Allow common patterns that are intentional in this codebase
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::significant_drop_tightening)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::redundant_closure_for_method_calls)]
#![allow(clippy::use_self)]

pub mod client;
pub mod codec;
pub mod config;
pub mod context;
pub mod error;
pub mod logging;
pub mod machine;
pub mod passthrough;
pub mod plugin;
pub mod rpc;
pub mod server;
pub mod settings;
pub mod translate;

// Re-export commonly used types
pub use client::ConfigClient;
pub use codec::ConfigData;
pub use config::Config;
pub use context::{join, CancelHandle, Context, ContextError};
pub use error::{Error, Result, SessionCause};
pub use machine::{JsonMachineCodec, MachineCodec};
pub use passthrough::PassthroughConfig;
pub use plugin::ConfigPlugin;
pub use server::ConfigServer;
pub use settings::Settings;
pub use translate::{translate, CallOutcome};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
