use anyhow::{Context, Result};
use comfy_table::Table;
use std::path::Path;

pub async fn create(home: &Path, name: &str) -> Result<()> {
    let store = super::open_store(home).await?;
    store
        .create_namespace(name)
        .await
        .with_context(|| format!("Failed to create namespace '{name}'"))?;
    store.flush().await?;
    println!("✓ Created namespace '{name}'");
    Ok(())
}

pub async fn delete(home: &Path, name: &str, force: bool) -> Result<()> {
    let orchestrator = super::orchestrator(home).await?;
    orchestrator
        .delete_namespace(name, force)
        .await
        .with_context(|| format!("Failed to delete namespace '{name}'"))?;
    orchestrator.context().store.flush().await?;
    println!("✓ Deleted namespace '{name}'");
    Ok(())
}

pub async fn list(home: &Path) -> Result<()> {
    let store = super::open_store(home).await?;
    let namespaces = store.list_namespaces().await?;

    let mut table = Table::new();
    table.set_header(vec!["NAMESPACE", "CONTROL PLANE", "AGENTS", "CREATED"]);
    for ns in namespaces {
        let control_plane = ns
            .control_plane
            .as_ref()
            .map(|cp| cp.backend().to_string())
            .unwrap_or_else(|| "-".to_string());
        table.add_row(vec![
            ns.name.clone(),
            control_plane,
            ns.agents.len().to_string(),
            ns.created.format("%Y-%m-%d %H:%M:%S").to_string(),
        ]);
    }
    println!("{table}");
    Ok(())
}
