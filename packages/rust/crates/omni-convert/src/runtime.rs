//! Service wiring: state store, artifact store, lifecycle manager and sweeper.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::artifacts::{
    ArtifactStore, LocalArtifactStore, output_filename_for, stored_upload_name, validate_upload,
};
use crate::config::{ConvertConfig, StorageConfig};
use crate::convert::Converter;
use crate::jobs::NewJob;
use crate::lifecycle::JobLifecycleManager;
use crate::store::JobStateStore;
use crate::sweeper::{SweepSchedule, Sweeper, SweeperHandle, spawn_scheduled_sweeps};

/// Connected service components sharing one state store and artifact store.
pub struct ConvertRuntime {
    store: Arc<dyn JobStateStore>,
    artifacts: Arc<dyn ArtifactStore>,
    lifecycle: Arc<JobLifecycleManager>,
    sweeper: Arc<Sweeper>,
    storage: StorageConfig,
    schedule: SweepSchedule,
    scheduler: Option<SweeperHandle>,
}

impl ConvertRuntime {
    /// Build every component from `config` and connect the state store.
    pub async fn connect(config: ConvertConfig, converter: Arc<dyn Converter>) -> Result<Self> {
        let store = config
            .state_store
            .build_store()
            .context("failed to build job state store")?;
        let artifacts: Arc<dyn ArtifactStore> = Arc::new(LocalArtifactStore::new(
            config.storage.upload_dir.clone(),
            config.storage.output_dir.clone(),
        ));
        Self::connect_with(config, store, artifacts, converter).await
    }

    /// Like [`ConvertRuntime::connect`] with caller-supplied stores.
    pub async fn connect_with(
        config: ConvertConfig,
        store: Arc<dyn JobStateStore>,
        artifacts: Arc<dyn ArtifactStore>,
        converter: Arc<dyn Converter>,
    ) -> Result<Self> {
        artifacts
            .ensure_areas()
            .await
            .context("failed to create artifact directories")?;
        store.connect().await.with_context(|| {
            format!("failed to connect {} job state store", store.backend_name())
        })?;

        let lifecycle = Arc::new(JobLifecycleManager::new(
            Arc::clone(&store),
            Arc::clone(&artifacts),
            converter,
            config.lifecycle,
        ));
        let sweeper = Arc::new(Sweeper::new(
            Arc::clone(&store),
            Arc::clone(&artifacts),
            lifecycle.retention(),
        ));
        Ok(Self {
            store,
            artifacts,
            lifecycle,
            sweeper,
            storage: config.storage,
            schedule: config.sweep_schedule,
            scheduler: None,
        })
    }

    pub fn lifecycle(&self) -> &Arc<JobLifecycleManager> {
        &self.lifecycle
    }

    pub fn sweeper(&self) -> &Arc<Sweeper> {
        &self.sweeper
    }

    pub fn store(&self) -> &Arc<dyn JobStateStore> {
        &self.store
    }

    /// Start the scheduled sweeper. Calling it again keeps the running scheduler.
    pub fn start_sweeps(&mut self) {
        if self.scheduler.is_none() {
            self.scheduler = Some(spawn_scheduled_sweeps(
                Arc::clone(&self.sweeper),
                self.schedule.clone(),
            ));
        }
    }

    /// Whether the scheduled sweeper is running.
    pub fn sweeps_running(&self) -> bool {
        self.scheduler.is_some()
    }

    /// Copy a local file into the upload area and describe the job for it.
    ///
    /// Applies the configured extension and size rules first.
    pub async fn stage_upload(&self, source: &Path) -> Result<NewJob> {
        let original_filename = source
            .file_name()
            .and_then(|name| name.to_str())
            .with_context(|| format!("upload path has no file name: {}", source.display()))?
            .to_string();
        let size_bytes = tokio::fs::metadata(source)
            .await
            .with_context(|| format!("failed to stat upload {}", source.display()))?
            .len();
        validate_upload(
            &original_filename,
            size_bytes,
            self.storage.max_upload_bytes,
            &self.storage.allowed_extension,
        )?;

        let stored_name = stored_upload_name(&original_filename);
        let output_filename = output_filename_for(&stored_name);
        let input_path = self.artifacts.upload_path(&stored_name);
        let output_path = self.artifacts.output_path(&output_filename);
        tokio::fs::copy(source, &input_path).await.with_context(|| {
            format!(
                "failed to copy {} into {}",
                source.display(),
                input_path.display()
            )
        })?;
        Ok(NewJob {
            input_path,
            output_path,
            output_filename,
            original_filename,
        })
    }

    /// Stop the scheduler (waiting for an in-flight pass) and disconnect the store.
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(scheduler) = self.scheduler.take() {
            scheduler.stop().await;
        }
        self.store
            .disconnect()
            .await
            .context("failed to disconnect job state store")?;
        Ok(())
    }
}
