use anyhow::{Context, Result};
use std::path::Path;

pub async fn run(home: &Path, namespace: &str, file: &Path) -> Result<()> {
    let orchestrator = super::orchestrator(home).await?;
    orchestrator
        .delete(file, namespace)
        .await
        .with_context(|| format!("Failed to delete the resources of {}", file.display()))?;
    orchestrator.context().store.flush().await?;

    println!("✓ Deleted the resources of {} from namespace '{}'", file.display(), namespace);
    Ok(())
}
