use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use omni_convert::{ConvertRuntime, JobError};

pub(crate) async fn serve(mut runtime: ConvertRuntime) -> Result<()> {
    runtime.start_sweeps();
    tracing::info!(
        backend = runtime.store().backend_name(),
        retention_secs = runtime.sweeper().retention().as_secs(),
        "omni-convert running; press Ctrl+C to stop"
    );
    shutdown_signal().await?;
    tracing::info!("shutdown requested; stopping scheduler");
    runtime.shutdown().await?;
    tracing::info!("omni-convert stopped");
    Ok(())
}

pub(crate) async fn convert(runtime: &ConvertRuntime, file: &Path) -> Result<()> {
    let request = runtime.stage_upload(file).await?;
    let lifecycle = runtime.lifecycle();
    let job = lifecycle.create_job(request).await?;
    let outcome = lifecycle.run_conversion(&job).await;
    // A failed conversion is still a recorded job; print its report before the error.
    match lifecycle.get_job(job.job_id()).await {
        Ok(view) => print_json(&view.report())?,
        Err(JobError::NotFound { .. }) => {}
        Err(error) => return Err(error.into()),
    }
    outcome.map(|_| ()).map_err(Into::into)
}

pub(crate) async fn status(runtime: &ConvertRuntime, job_id: &str) -> Result<()> {
    let view = runtime.lifecycle().get_job(job_id).await?;
    print_json(&view.report())
}

pub(crate) async fn fetch(
    runtime: &ConvertRuntime,
    job_id: &str,
    dest: Option<PathBuf>,
) -> Result<()> {
    let download = runtime.lifecycle().retrieve_artifact(job_id).await?;
    let dest = dest.unwrap_or_else(|| PathBuf::from(&download.filename));
    tokio::fs::copy(&download.path, &dest)
        .await
        .with_context(|| {
            format!(
                "failed to copy {} to {}",
                download.path.display(),
                dest.display()
            )
        })?;
    println!("{}", dest.display());
    Ok(())
}

pub(crate) async fn sweep(runtime: &ConvertRuntime) -> Result<()> {
    let summary = runtime.sweeper().sweep().await;
    print_json(&summary)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("failed to render json")?;
    println!("{rendered}");
    Ok(())
}

async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm =
            signal(SignalKind::terminate()).context("failed to listen for SIGTERM")?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result.context("failed to listen for Ctrl+C")?,
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .context("failed to listen for Ctrl+C")?;
    }
    Ok(())
}
