//! Runtime settings loader for omni-convert.
//!
//! Loads and merges:
//! - System defaults: `<PRJ_ROOT>/packages/conf/settings.yaml`
//! - User overrides:  `<PRJ_CONFIG_HOME>/omni-convert/settings.yaml`
//!
//! Merge precedence is user over system.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use serde::Deserialize;

const DEFAULT_SYSTEM_SETTINGS_RELATIVE_PATH: &str = "packages/conf/settings.yaml";
const DEFAULT_USER_SETTINGS_RELATIVE_PATH: &str = "omni-convert/settings.yaml";
const DEFAULT_CONFIG_HOME_RELATIVE_PATH: &str = ".config";
static CONFIG_HOME_OVERRIDE: OnceLock<PathBuf> = OnceLock::new();

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RuntimeSettings {
    #[serde(default)]
    pub jobs: JobsSettings,
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub state_store: StateStoreSettings,
    #[serde(default)]
    pub converter: ConverterSettings,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobsSettings {
    pub retention_secs: Option<u64>,
    pub sweep_schedule: Option<String>,
    pub conversion_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageSettings {
    pub upload_dir: Option<String>,
    pub output_dir: Option<String>,
    pub max_upload_bytes: Option<u64>,
    pub allowed_extension: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StateStoreSettings {
    /// `memory` or `valkey`.
    pub backend: Option<String>,
    pub valkey_url: Option<String>,
    pub key_prefix: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConverterSettings {
    pub freecad_bin: Option<String>,
    pub mesh_tolerance: Option<f64>,
}

impl RuntimeSettings {
    fn merge(self, overlay: Self) -> Self {
        Self {
            jobs: self.jobs.merge(overlay.jobs),
            storage: self.storage.merge(overlay.storage),
            state_store: self.state_store.merge(overlay.state_store),
            converter: self.converter.merge(overlay.converter),
        }
    }
}

impl JobsSettings {
    fn merge(self, overlay: Self) -> Self {
        Self {
            retention_secs: overlay.retention_secs.or(self.retention_secs),
            sweep_schedule: overlay.sweep_schedule.or(self.sweep_schedule),
            conversion_timeout_secs: overlay
                .conversion_timeout_secs
                .or(self.conversion_timeout_secs),
        }
    }
}

impl StorageSettings {
    fn merge(self, overlay: Self) -> Self {
        Self {
            upload_dir: overlay.upload_dir.or(self.upload_dir),
            output_dir: overlay.output_dir.or(self.output_dir),
            max_upload_bytes: overlay.max_upload_bytes.or(self.max_upload_bytes),
            allowed_extension: overlay.allowed_extension.or(self.allowed_extension),
        }
    }
}

impl StateStoreSettings {
    fn merge(self, overlay: Self) -> Self {
        Self {
            backend: overlay.backend.or(self.backend),
            valkey_url: overlay.valkey_url.or(self.valkey_url),
            key_prefix: overlay.key_prefix.or(self.key_prefix),
        }
    }
}

impl ConverterSettings {
    fn merge(self, overlay: Self) -> Self {
        Self {
            freecad_bin: overlay.freecad_bin.or(self.freecad_bin),
            mesh_tolerance: overlay.mesh_tolerance.or(self.mesh_tolerance),
        }
    }
}

/// Load merged runtime settings (user overrides system).
pub fn load_runtime_settings() -> RuntimeSettings {
    let (system_path, user_path) = runtime_settings_paths();
    load_runtime_settings_from_paths(&system_path, &user_path)
}

#[doc(hidden)]
pub fn runtime_settings_paths() -> (PathBuf, PathBuf) {
    let root = project_root();
    let system_path = root.join(DEFAULT_SYSTEM_SETTINGS_RELATIVE_PATH);
    let user_path = resolve_config_home(&root).join(DEFAULT_USER_SETTINGS_RELATIVE_PATH);
    (system_path, user_path)
}

#[doc(hidden)]
pub fn load_runtime_settings_from_paths(system: &Path, user: &Path) -> RuntimeSettings {
    load_one(system).merge(load_one(user))
}

fn load_one(path: &Path) -> RuntimeSettings {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
            return RuntimeSettings::default();
        }
        Err(error) => {
            tracing::warn!(
                path = %path.display(),
                error = %error,
                "failed to read settings file; ignoring"
            );
            return RuntimeSettings::default();
        }
    };
    serde_yaml::from_str::<RuntimeSettings>(&raw).unwrap_or_else(|error| {
        tracing::warn!(
            path = %path.display(),
            error = %error,
            "failed to parse settings yaml; ignoring file"
        );
        RuntimeSettings::default()
    })
}

fn env_path(name: &str) -> Option<PathBuf> {
    let value = std::env::var(name).ok()?;
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| PathBuf::from(trimmed))
}

fn project_root() -> PathBuf {
    env_path("PRJ_ROOT")
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Point the user settings lookup at `<path>/omni-convert/settings.yaml` (CLI `--conf`).
///
/// Relative paths resolve against `PRJ_ROOT` or the cwd. The first call wins.
pub fn set_config_home_override(path: impl Into<PathBuf>) {
    let requested: PathBuf = path.into();
    if requested.as_os_str().is_empty() {
        return;
    }
    if let Err(rejected) = CONFIG_HOME_OVERRIDE.set(requested)
        && let Some(active) = CONFIG_HOME_OVERRIDE.get()
        && active != &rejected
    {
        tracing::warn!(
            active = %active.display(),
            ignored = %rejected.display(),
            "config home already overridden; keeping the first value"
        );
    }
}

fn resolve_config_home(project_root: &Path) -> PathBuf {
    let home = CONFIG_HOME_OVERRIDE
        .get()
        .cloned()
        .or_else(|| env_path("PRJ_CONFIG_HOME"))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_HOME_RELATIVE_PATH));
    // An absolute home replaces the root on join.
    project_root.join(home)
}
