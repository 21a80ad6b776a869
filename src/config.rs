use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::classpath::split_classpath;
use crate::cli::Cli;
use crate::registry::KeyConflictPolicy;
use crate::resolve::DEFAULT_PLATFORM_PREFIXES;

pub const DEFAULT_MARKER: &str = "com.miven.spring.context.XmzComponent";
pub const DEFAULT_SCAN_ANNOTATION: &str = "com.miven.spring.context.XmzComponentScan";

pub const CONFIG_ENV: &str = "CLASS_REGISTRAR_CONFIG";
pub const CLASSPATH_ENV: &str = "CLASSPATH";

/// Everything the bootstrap needs to discover and register components.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegistrarConfig {
    pub classpath: Vec<PathBuf>,
    /// Explicit base packages. When empty they come from the entry point.
    pub base_packages: Vec<String>,
    /// Binary name of the application's entry class.
    pub entry_point: Option<String>,
    pub marker: String,
    pub scan_annotation: String,
    pub platform_prefixes: Vec<String>,
    pub key_conflict: KeyConflictPolicy,
    pub include_invisible_annotations: bool,
}

impl Default for RegistrarConfig {
    fn default() -> Self {
        Self {
            classpath: Vec::new(),
            base_packages: Vec::new(),
            entry_point: None,
            marker: DEFAULT_MARKER.to_string(),
            scan_annotation: DEFAULT_SCAN_ANNOTATION.to_string(),
            platform_prefixes: DEFAULT_PLATFORM_PREFIXES
                .iter()
                .map(|p| p.to_string())
                .collect(),
            key_conflict: KeyConflictPolicy::default(),
            include_invisible_annotations: false,
        }
    }
}

impl RegistrarConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let mut config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        // Relative class path entries are relative to the config file.
        if let Some(dir) = path.parent() {
            config.classpath = config
                .classpath
                .into_iter()
                .map(|p| if p.is_relative() { dir.join(p) } else { p })
                .collect();
        }
        Ok(config)
    }
}

/// Config file: `--config`, then `$CLASS_REGISTRAR_CONFIG`, then the default
/// file if present. Built-in defaults otherwise.
pub fn resolve_config(cli: &Cli) -> Result<RegistrarConfig> {
    let explicit = cli
        .config
        .clone()
        .or_else(|| env::var_os(CONFIG_ENV).map(PathBuf::from));

    let mut config = match explicit {
        Some(path) => RegistrarConfig::load(&path)?,
        None => match default_config_path() {
            Some(path) if path.is_file() => RegistrarConfig::load(&path)?,
            _ => RegistrarConfig::default(),
        },
    };

    config.classpath = resolve_classpath(cli, &config.classpath);
    Ok(config)
}

/// `--classpath`, then the config file, then `$CLASSPATH`, then `.`.
pub fn resolve_classpath(cli: &Cli, configured: &[PathBuf]) -> Vec<PathBuf> {
    if let Some(raw) = cli.classpath.as_deref() {
        return split_classpath(raw);
    }
    if !configured.is_empty() {
        return configured.to_vec();
    }
    if let Ok(raw) = env::var(CLASSPATH_ENV) {
        let paths = split_classpath(&raw);
        if !paths.is_empty() {
            return paths;
        }
    }
    vec![PathBuf::from(".")]
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("class-registrar").join("config.json"))
}
