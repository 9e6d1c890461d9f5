//! Config namespace: YAML runtime settings and the resolved service config.

mod settings;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};

use crate::convert::FreecadConverterConfig;
use crate::lifecycle::{DEFAULT_CONVERSION_TIMEOUT_SECS, DEFAULT_RETENTION_SECS, LifecycleConfig};
use crate::store::{DEFAULT_JOB_KEY_PREFIX, StateStoreBackend, StateStoreConfig};
use crate::sweeper::{DEFAULT_SWEEP_SCHEDULE, SweepSchedule};

pub use settings::{
    ConverterSettings, JobsSettings, RuntimeSettings, StateStoreSettings, StorageSettings,
    load_runtime_settings, load_runtime_settings_from_paths, runtime_settings_paths,
    set_config_home_override,
};

const DEFAULT_UPLOAD_DIR: &str = "./uploads";
const DEFAULT_OUTPUT_DIR: &str = "./converted";
const DEFAULT_MAX_UPLOAD_BYTES: u64 = 50 * 1024 * 1024;
const DEFAULT_ALLOWED_EXTENSION: &str = "stl";

const ENV_VALKEY_URL: &str = "VALKEY_URL";
const ENV_RETENTION_SECS: &str = "OMNI_CONVERT_RETENTION_SECS";
const ENV_SWEEP_SCHEDULE: &str = "OMNI_CONVERT_SWEEP_SCHEDULE";
const ENV_UPLOAD_DIR: &str = "OMNI_CONVERT_UPLOAD_DIR";
const ENV_OUTPUT_DIR: &str = "OMNI_CONVERT_OUTPUT_DIR";

/// Upload acceptance rules and artifact directories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    pub upload_dir: PathBuf,
    pub output_dir: PathBuf,
    pub max_upload_bytes: u64,
    /// Accepted upload extension, lower-case without the dot.
    pub allowed_extension: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from(DEFAULT_UPLOAD_DIR),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            allowed_extension: DEFAULT_ALLOWED_EXTENSION.to_string(),
        }
    }
}

/// Fully resolved service configuration.
#[derive(Debug, Clone)]
pub struct ConvertConfig {
    pub lifecycle: LifecycleConfig,
    pub sweep_schedule: SweepSchedule,
    pub storage: StorageConfig,
    pub state_store: StateStoreConfig,
    pub converter: FreecadConverterConfig,
}

impl ConvertConfig {
    /// Merged YAML settings plus process environment overrides.
    pub fn load() -> Result<Self> {
        Self::from_settings(&load_runtime_settings())
    }

    /// Resolve `settings` against the process environment.
    pub fn from_settings(settings: &RuntimeSettings) -> Result<Self> {
        Self::resolve(settings, |name| std::env::var(name).ok())
    }

    /// Resolve `settings` against an explicit environment lookup.
    ///
    /// Precedence per field: environment, then settings, then default.
    #[doc(hidden)]
    pub fn resolve<F>(settings: &RuntimeSettings, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty_env = |name: &str| env(name).and_then(non_empty_string);

        let retention_secs = positive_u64_env(&env, ENV_RETENTION_SECS)
            .or(settings.jobs.retention_secs.filter(|value| *value > 0))
            .unwrap_or(DEFAULT_RETENTION_SECS);
        let conversion_timeout_secs = settings
            .jobs
            .conversion_timeout_secs
            .filter(|value| *value > 0)
            .unwrap_or(DEFAULT_CONVERSION_TIMEOUT_SECS);
        let schedule_expression = non_empty_env(ENV_SWEEP_SCHEDULE)
            .or_else(|| non_empty_string(settings.jobs.sweep_schedule.clone()?))
            .unwrap_or_else(|| DEFAULT_SWEEP_SCHEDULE.to_string());
        let sweep_schedule =
            SweepSchedule::parse(&schedule_expression).context("invalid jobs.sweep_schedule")?;

        let storage = StorageConfig {
            upload_dir: non_empty_env(ENV_UPLOAD_DIR)
                .or_else(|| non_empty_string(settings.storage.upload_dir.clone()?))
                .map_or_else(|| PathBuf::from(DEFAULT_UPLOAD_DIR), PathBuf::from),
            output_dir: non_empty_env(ENV_OUTPUT_DIR)
                .or_else(|| non_empty_string(settings.storage.output_dir.clone()?))
                .map_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR), PathBuf::from),
            max_upload_bytes: settings
                .storage
                .max_upload_bytes
                .filter(|value| *value > 0)
                .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
            allowed_extension: settings
                .storage
                .allowed_extension
                .as_deref()
                .map(|ext| ext.trim().trim_start_matches('.').to_ascii_lowercase())
                .filter(|ext| !ext.is_empty())
                .unwrap_or_else(|| DEFAULT_ALLOWED_EXTENSION.to_string()),
        };

        let valkey_url = non_empty_env(ENV_VALKEY_URL)
            .or_else(|| non_empty_string(settings.state_store.valkey_url.clone()?));
        let key_prefix = settings
            .state_store
            .key_prefix
            .clone()
            .and_then(non_empty_string)
            .unwrap_or_else(|| DEFAULT_JOB_KEY_PREFIX.to_string());
        let backend = match settings
            .state_store
            .backend
            .as_deref()
            .map(|raw| raw.trim().to_ascii_lowercase())
            .as_deref()
        {
            None | Some("") => match valkey_url {
                Some(url) => StateStoreBackend::Valkey { url, key_prefix },
                None => StateStoreBackend::Memory,
            },
            Some("memory") => StateStoreBackend::Memory,
            Some("valkey" | "redis") => {
                let Some(url) = valkey_url else {
                    bail!(
                        "state_store.backend=valkey requires valkey url (VALKEY_URL or state_store.valkey_url)"
                    );
                };
                StateStoreBackend::Valkey { url, key_prefix }
            }
            Some(other) => {
                bail!("unsupported state_store.backend `{other}` (expected memory or valkey)")
            }
        };

        let defaults = FreecadConverterConfig::default();
        let converter = FreecadConverterConfig {
            binary: settings
                .converter
                .freecad_bin
                .clone()
                .and_then(non_empty_string)
                .map_or(defaults.binary, PathBuf::from),
            mesh_tolerance: settings
                .converter
                .mesh_tolerance
                .filter(|value| value.is_finite() && *value > 0.0)
                .unwrap_or(defaults.mesh_tolerance),
        };

        Ok(Self {
            lifecycle: LifecycleConfig {
                retention: Duration::from_secs(retention_secs),
                conversion_timeout: Duration::from_secs(conversion_timeout_secs),
            },
            sweep_schedule,
            storage,
            state_store: StateStoreConfig { backend }.normalized(),
            converter,
        })
    }
}

fn positive_u64_env<F>(env: &F, name: &str) -> Option<u64>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = env(name)?;
    match raw.trim().parse::<u64>() {
        Ok(value) if value > 0 => Some(value),
        _ => {
            tracing::warn!(env_var = %name, value = %raw, "invalid positive integer env value");
            None
        }
    }
}

fn non_empty_string(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
