//! Configuration for Plancanvas.
//!
//! ## config.kdl - User preferences
//!
//! Located at:
//! - System: `~/.config/plancanvas/config.kdl`
//! - Data dir: `<data-dir>/config.kdl`
//!
//! Contains:
//! - `debounce-ms` - Quiet period before an autosave fires (default 3000)
//! - `backup-cap` - Backup versions kept per canvas (default 50)
//! - `slot-count` - Save slots per canvas (default 10)
//! - `event-limit` - Audit events listed by default (default 100)
//! - `output-format` - "json" or "human"
//!
//! ## Precedence
//!
//! CLI flag > data-dir config > system config > defaults
//!
//! Use the [`resolver`] module for precedence resolution.

pub mod resolver;
pub mod schema;

pub use resolver::{
    CONFIG_FILE_NAME, ConfigOverrides, Resolved, ResolvedConfig, ValueSource, read_config_file,
    resolve_config, system_config_path,
};
pub use schema::{CanvasConfig, OutputFormat};
