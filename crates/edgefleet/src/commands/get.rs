use anyhow::Result;
use comfy_table::Table;
use fleet_store::{Resource, RouterMode};
use std::path::Path;

pub async fn agents(home: &Path, namespace: &str) -> Result<()> {
    let store = super::open_store(home).await?;
    let agents = store.list_agents(namespace).await?;

    let mut table = Table::new();
    table.set_header(vec!["AGENT", "BACKEND", "HOST", "ROUTER", "UUID"]);
    for agent in &agents {
        let router = agent
            .config()
            .map(|c| c.mode())
            .unwrap_or(RouterMode::Edge);
        table.add_row(vec![
            agent.name().to_string(),
            agent.backend().to_string(),
            agent.host().to_string(),
            router.to_string(),
            agent.uuid().unwrap_or("-").to_string(),
        ]);
    }
    println!("{table}");
    Ok(())
}

pub async fn control_plane(home: &Path, namespace: &str) -> Result<()> {
    let store = super::open_store(home).await?;
    let control_plane = store.get_control_plane(namespace).await?;

    println!(
        "{} control plane '{}' ({})",
        control_plane.backend(),
        control_plane.name(),
        control_plane.endpoint().unwrap_or("no endpoint")
    );

    let mut table = Table::new();
    table.set_header(vec!["CONTROLLER", "ENDPOINT"]);
    for controller in control_plane.controllers() {
        table.add_row(vec![
            controller.name().to_string(),
            controller.endpoint().unwrap_or("-").to_string(),
        ]);
    }
    println!("{table}");
    Ok(())
}
