use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Registry file declaring extra units and tagged types.
    #[serde(default)]
    pub registry: Option<PathBuf>,

    #[serde(default)]
    pub infer: InferConfig,

    #[serde(default)]
    pub errors: ErrorConfig,

    #[serde(default)]
    pub internal: InternalConfig,

    #[serde(default)]
    pub parallel: ParallelConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferConfig {
    /// Default unconstrained variables (units to scalar, types to `VOID`)
    /// instead of reporting them as ambiguous.
    #[serde(default = "default_true")]
    pub allow_defaulting: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorConfig {
    #[serde(default = "default_100")]
    pub max_errors: usize,

    #[serde(default = "default_true")]
    pub show_suggestions: bool,

    #[serde(default)]
    pub format: ErrorFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorFormat {
    #[default]
    Default,
    Json,
    Compact,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InternalConfig {
    /// Abort on engine invariant violations instead of reporting them.
    #[serde(default = "default_panic_on_internal_error")]
    pub panic_on_internal_error: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParallelConfig {
    /// Worker threads for batch checks (0 = rayon's default).
    #[serde(default)]
    pub workers: usize,
}

impl Default for InferConfig {
    fn default() -> Self {
        Self {
            allow_defaulting: true,
        }
    }
}

impl Default for ErrorConfig {
    fn default() -> Self {
        Self {
            max_errors: 100,
            show_suggestions: true,
            format: ErrorFormat::Default,
        }
    }
}

impl Default for InternalConfig {
    fn default() -> Self {
        Self {
            panic_on_internal_error: default_panic_on_internal_error(),
        }
    }
}

fn default_true() -> bool { true }
fn default_100() -> usize { 100 }
fn default_panic_on_internal_error() -> bool { cfg!(debug_assertions) }

/// Settings a single check reads from the configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckOptions {
    pub allow_defaulting: bool,
    pub max_errors: usize,
    pub panic_on_internal_error: bool,
}

impl Default for CheckOptions {
    fn default() -> Self {
        Config::default().check_options()
    }
}

impl Config {
    /// Load configuration from a .jellyrc file
    pub fn load(path: &Path) -> Result<Self, String> {
        let content = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config: {}", e))?;

        Self::parse(&content)
    }

    /// Parse configuration from TOML string
    pub fn parse(content: &str) -> Result<Self, String> {
        toml::from_str(content)
            .map_err(|e| format!("Failed to parse config: {}", e))
    }

    /// Find and load configuration file from current directory or parents
    pub fn discover() -> Self {
        std::env::current_dir()
            .ok()
            .and_then(|dir| Self::discover_from(&dir))
            .unwrap_or_default()
    }

    /// Walks from `start` towards the root looking for `.jellyrc` or
    /// `.jellyrc.toml`. A relative `registry` path is resolved against the
    /// directory holding the config file.
    pub fn discover_from(start: &Path) -> Option<Self> {
        let mut current = Some(start.to_path_buf());

        while let Some(dir) = current {
            for name in [".jellyrc", ".jellyrc.toml"] {
                let config_path = dir.join(name);
                if !config_path.exists() {
                    continue;
                }
                match Self::load(&config_path) {
                    Ok(mut config) => {
                        if let Some(registry) = &config.registry {
                            if registry.is_relative() {
                                config.registry = Some(dir.join(registry));
                            }
                        }
                        return Some(config);
                    }
                    Err(e) => tracing::warn!(path = %config_path.display(), "{}", e),
                }
            }

            current = dir.parent().map(|p| p.to_path_buf());
        }

        None
    }

    pub fn check_options(&self) -> CheckOptions {
        CheckOptions {
            allow_defaulting: self.infer.allow_defaulting,
            max_errors: self.errors.max_errors,
            panic_on_internal_error: self.internal.panic_on_internal_error,
        }
    }

    /// Generate default configuration file content
    pub fn generate_default() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate config"))
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<(), String> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize config: {}", e))?;

        fs::write(path, content)
            .map_err(|e| format!("Failed to write config: {}", e))
    }
}
