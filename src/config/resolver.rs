//! Precedence resolution for configuration.
//!
//! ## Precedence (highest to lowest)
//!
//! 1. CLI flags (passed at runtime)
//! 2. Data-dir config.kdl (`<data-dir>/config.kdl`)
//! 3. System config.kdl (`~/.config/plancanvas/config.kdl`)
//! 4. Built-in defaults
//!
//! Every resolved value remembers where it came from so `pc config show`
//! can explain itself.

use kdl::KdlDocument;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::audit::DEFAULT_EVENT_LIMIT;
use crate::autosave::DEFAULT_DEBOUNCE_MS;
use crate::backup::DEFAULT_BACKUP_CAP;
use crate::config::{CanvasConfig, OutputFormat};
use crate::slots::DEFAULT_SLOT_COUNT;
use crate::{Error, Result};

/// File name used at both config locations.
pub const CONFIG_FILE_NAME: &str = "config.kdl";

/// Tracks where a resolved value came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueSource {
    /// Value from CLI flag
    CliFlag,
    /// Value from `<data-dir>/config.kdl`
    DataDir,
    /// Value from the system config.kdl
    System,
    /// Built-in default value
    Default,
}

impl std::fmt::Display for ValueSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueSource::CliFlag => write!(f, "cli"),
            ValueSource::DataDir => write!(f, "data-dir"),
            ValueSource::System => write!(f, "system"),
            ValueSource::Default => write!(f, "default"),
        }
    }
}

impl Serialize for ValueSource {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A resolved value with its source.
#[derive(Debug, Clone, Serialize)]
pub struct Resolved<T> {
    pub value: T,
    pub source: ValueSource,
}

impl<T> Resolved<T> {
    pub fn new(value: T, source: ValueSource) -> Self {
        Self { value, source }
    }
}

/// Fully resolved configuration with source tracking.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ResolvedConfig {
    pub debounce_ms: Resolved<u64>,
    pub backup_cap: Resolved<usize>,
    pub slot_count: Resolved<u32>,
    pub event_limit: Resolved<usize>,
    pub output_format: Resolved<OutputFormat>,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            debounce_ms: Resolved::new(DEFAULT_DEBOUNCE_MS, ValueSource::Default),
            backup_cap: Resolved::new(DEFAULT_BACKUP_CAP, ValueSource::Default),
            slot_count: Resolved::new(DEFAULT_SLOT_COUNT, ValueSource::Default),
            event_limit: Resolved::new(DEFAULT_EVENT_LIMIT, ValueSource::Default),
            output_format: Resolved::new(OutputFormat::Json, ValueSource::Default),
        }
    }
}

impl ResolvedConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms.value)
    }

    pub fn backup_cap(&self) -> usize {
        self.backup_cap.value
    }

    pub fn slot_count(&self) -> u32 {
        self.slot_count.value
    }

    pub fn event_limit(&self) -> usize {
        self.event_limit.value
    }

    pub fn output_format(&self) -> OutputFormat {
        self.output_format.value
    }
}

/// CLI overrides for configuration resolution.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub debounce_ms: Option<u64>,
    pub output_format: Option<OutputFormat>,
}

impl ConfigOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_debounce_ms(mut self, ms: u64) -> Self {
        self.debounce_ms = Some(ms);
        self
    }

    pub fn with_output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = Some(format);
        self
    }
}

/// Location of the system-wide config file, if the platform has one.
pub fn system_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("plancanvas").join(CONFIG_FILE_NAME))
}

/// Read and validate one config file. A missing file is an empty config.
pub fn read_config_file(path: &Path) -> Result<CanvasConfig> {
    if !path.exists() {
        return Ok(CanvasConfig::default());
    }
    let content = fs::read_to_string(path)?;
    let doc: KdlDocument = content
        .parse()
        .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))?;
    let config = CanvasConfig::from_kdl(&doc);
    config
        .validate()
        .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
    Ok(config)
}

/// Pick the highest-precedence value among the layers.
fn pick<T: Clone>(
    target: &mut Resolved<T>,
    cli: Option<T>,
    data_dir: Option<T>,
    system: Option<T>,
) {
    if let Some(value) = cli {
        *target = Resolved::new(value, ValueSource::CliFlag);
    } else if let Some(value) = data_dir {
        *target = Resolved::new(value, ValueSource::DataDir);
    } else if let Some(value) = system {
        *target = Resolved::new(value, ValueSource::System);
    }
}

/// Resolve configuration with the full precedence chain.
///
/// `system_path` is usually [`system_config_path`]; passing `None` skips
/// the system layer.
pub fn resolve_config(
    data_dir: &Path,
    system_path: Option<&Path>,
    overrides: &ConfigOverrides,
) -> Result<ResolvedConfig> {
    let mut result = ResolvedConfig::default();

    let system = match system_path {
        Some(path) => read_config_file(path)?,
        None => CanvasConfig::default(),
    };
    let local = read_config_file(&data_dir.join(CONFIG_FILE_NAME))?;

    if overrides.debounce_ms == Some(0) {
        return Err(Error::Config("debounce-ms must be greater than 0".to_string()));
    }

    pick(
        &mut result.debounce_ms,
        overrides.debounce_ms,
        local.debounce_ms,
        system.debounce_ms,
    );
    pick(&mut result.backup_cap, None, local.backup_cap, system.backup_cap);
    pick(&mut result.slot_count, None, local.slot_count, system.slot_count);
    pick(&mut result.event_limit, None, local.event_limit, system.event_limit);
    pick(
        &mut result.output_format,
        overrides.output_format,
        local.output_format,
        system.output_format,
    );

    Ok(result)
}
