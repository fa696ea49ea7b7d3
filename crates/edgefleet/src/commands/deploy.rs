use anyhow::{Context, Result};
use std::path::Path;

pub async fn run(home: &Path, namespace: &str, file: &Path) -> Result<()> {
    let orchestrator = super::orchestrator(home).await?;
    orchestrator
        .deploy(file, namespace)
        .await
        .with_context(|| format!("Failed to deploy {}", file.display()))?;
    orchestrator.context().store.flush().await?;

    println!("✓ Deployed {} to namespace '{}'", file.display(), namespace);
    Ok(())
}
