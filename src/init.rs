use crate::chain::PipelineConfig;
use crate::logi;
use anyhow::{Context, Result};
use std::path::Path;
use tokio::fs;

async fn ensure_dir(dir: &Path) -> Result<()> {
    if !dir.exists() {
        fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
        logi(format!("Created directory: {}", dir.display()));
    }
    Ok(())
}

/// Create the output directory and, when configured, the scratch directory
/// for temporary reference copies.
pub async fn ensure_directories(config: &PipelineConfig) -> Result<()> {
    ensure_dir(&config.output_dir).await?;
    if let Some(scratch) = &config.scratch_dir {
        ensure_dir(scratch).await?;
    }
    Ok(())
}
