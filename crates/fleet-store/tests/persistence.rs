//! Namespace store persistence across process restarts

use fleet_store::{
    Agent, AgentConfiguration, ErrorKind, NamespaceStore, RemoteAgent, RouterMode, SshConfig,
    Volume,
};

fn remote_agent(name: &str) -> Agent {
    Agent::Remote(RemoteAgent {
        name: name.to_string(),
        host: "10.0.0.7".to_string(),
        ssh: SshConfig {
            user: "edge".to_string(),
            key_file: "/keys/id_ed25519".to_string(),
            port: 2222,
        },
        uuid: Some("4f1c".to_string()),
        package: None,
        config: Some(AgentConfiguration {
            router_mode: Some(RouterMode::Edge),
            upstream_routers: vec!["default-router".to_string()],
            host: Some("10.0.0.7".to_string()),
            ..Default::default()
        }),
    })
}

#[test]
fn test_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store");

    smol::block_on(async {
        let store = NamespaceStore::open(&path).await.unwrap();
        store.create_namespace("edge").await.unwrap();
        store.add_agent("edge", remote_agent("r1")).await.unwrap();
        store
            .add_volume(
                "edge",
                Volume {
                    name: "data".to_string(),
                    source: "/var/data".to_string(),
                    destination: "/data".to_string(),
                    permissions: "644".to_string(),
                    agents: vec!["r1".to_string()],
                },
            )
            .await
            .unwrap();
        store.flush().await.unwrap();
    });

    smol::block_on(async {
        let store = NamespaceStore::open(&path).await.unwrap();
        let ns = store.get_namespace("edge").await.unwrap();
        assert_eq!(ns.agents, vec![remote_agent("r1")]);
        assert_eq!(ns.volumes.len(), 1);

        let err = store.get_agent("edge", "missing").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    });
}

#[test]
fn test_list_namespaces_sorted() {
    smol::block_on(async {
        let store = NamespaceStore::in_memory();
        for name in ["zeta", "alpha", "mid"] {
            store.create_namespace(name).await.unwrap();
        }
        let names: Vec<_> = store
            .list_namespaces()
            .await
            .unwrap()
            .into_iter()
            .map(|ns| ns.name)
            .collect();
        assert_eq!(names, vec!["alpha", "mid", "zeta"]);

        // ensure_namespace is idempotent
        store.ensure_namespace("alpha").await.unwrap();
        assert_eq!(store.list_namespaces().await.unwrap().len(), 3);
    });
}
