use fleet_deploy::testing::TestHarness;
use fleet_deploy::{Error, Orchestrator};
use fleet_manifest::{Header, Kind, parse_str_with};
use fleet_store::{ErrorKind, Resource};

const CONTROL_PLANE: &str = r#"
apiVersion: edgefleet.io/v3
kind: RemoteControlPlane
metadata:
  name: cp
spec:
  admin:
    email: admin@example.com
    password: secret
  controllers:
    - name: ctrl-1
      host: 10.0.0.2
      ssh:
        user: deploy
        keyFile: /keys/id
"#;

const AGENTS: &str = r#"
apiVersion: edgefleet.io/v3
kind: RemoteAgent
metadata:
  name: r2
spec:
  host: 10.0.0.12
  ssh:
    user: deploy
    keyFile: /keys/id
  config:
    upstreamRouters: [r1]
---
apiVersion: edgefleet.io/v3
kind: RemoteAgent
metadata:
  name: r1
spec:
  host: 10.0.0.11
  ssh:
    user: deploy
    keyFile: /keys/id
"#;

const ROUTE: &str = r#"
apiVersion: edgefleet.io/v3
kind: Route
metadata:
  name: sensor-to-sink
spec:
  from: sensor
  to: sink
"#;

fn manifest(parts: &[&str]) -> Vec<Header> {
    let yaml = parts.join("\n---\n");
    parse_str_with(&yaml, |_| None).unwrap()
}

async fn harness() -> (TestHarness, Orchestrator) {
    let harness = TestHarness::new();
    harness.store.ensure_namespace("default").await.unwrap();
    let orchestrator = Orchestrator::new(harness.ctx.clone());
    (harness, orchestrator)
}

#[smol_potat::test]
async fn test_agents_are_configured_in_router_order_before_installation() {
    let (harness, orchestrator) = harness().await;
    orchestrator
        .deploy_manifest(&manifest(&[CONTROL_PLANE, AGENTS, ROUTE]), "default")
        .await
        .unwrap();

    let log = &harness.log;
    let controller = log.position("install controller ctrl-1").unwrap();
    let config_r1 = log.position("create agent r1").unwrap();
    let config_r2 = log.position("create agent r2").unwrap();
    let install_r1 = log.position("install agent r1").unwrap();
    let install_r2 = log.position("install agent r2").unwrap();
    let route = log.position("apply Route sensor-to-sink").unwrap();

    assert!(controller < config_r1);
    assert!(config_r1 < config_r2);
    assert!(config_r2 < install_r1 && config_r2 < install_r2);
    assert!(install_r1 < route && install_r2 < route);

    // r2 points at r1 by controller UUID
    let registered = harness.controller.registered();
    let r1 = registered.iter().find(|a| a.name == "r1").unwrap();
    let r2 = registered.iter().find(|a| a.name == "r2").unwrap();
    assert_eq!(r2.upstream_routers, vec![r1.uuid.clone()]);
    assert_eq!(r1.upstream_routers, vec!["default-router".to_string()]);
    assert_eq!(r2.host.as_deref(), Some("10.0.0.12"));

    let stored = harness.store.get_agent("default", "r1").await.unwrap();
    assert_eq!(stored.uuid(), Some(r1.uuid.as_str()));
    let control_plane = harness.store.get_control_plane("default").await.unwrap();
    assert_eq!(control_plane.endpoint(), Some("http://ctrl-1.default:51121"));
}

#[smol_potat::test]
async fn test_explicit_agent_config_wins_over_inline_config() {
    let explicit = r#"
apiVersion: edgefleet.io/v3
kind: AgentConfig
metadata:
  name: r2
spec:
  routerMode: none
  host: 10.0.0.99
"#;
    let (harness, orchestrator) = harness().await;
    orchestrator
        .deploy_manifest(&manifest(&[CONTROL_PLANE, AGENTS, explicit]), "default")
        .await
        .unwrap();

    let registered = harness.controller.registered();
    let r2 = registered.iter().find(|a| a.name == "r2").unwrap();
    assert!(r2.upstream_routers.is_empty());
    assert_eq!(r2.host.as_deref(), Some("10.0.0.99"));

    let stored = harness.store.get_agent("default", "r2").await.unwrap();
    assert_eq!(stored.config().and_then(|c| c.host.as_deref()), Some("10.0.0.99"));
}

#[smol_potat::test]
async fn test_agent_config_without_host_takes_the_agent_host() {
    let agent = r#"
apiVersion: edgefleet.io/v3
kind: RemoteAgent
metadata:
  name: r1
spec:
  host: 10.0.0.11
  ssh:
    user: deploy
    keyFile: /keys/id
"#;
    let config = r#"
apiVersion: edgefleet.io/v3
kind: AgentConfig
metadata:
  name: r1
spec:
  routerMode: edge
  upstreamRouters: [default-router]
"#;
    let (harness, orchestrator) = harness().await;
    orchestrator
        .deploy_manifest(&manifest(&[CONTROL_PLANE, agent, config]), "default")
        .await
        .unwrap();

    let registered = harness.controller.registered();
    let r1 = registered.iter().find(|a| a.name == "r1").unwrap();
    assert_eq!(r1.host.as_deref(), Some("10.0.0.11"));
    assert_eq!(r1.upstream_routers, vec!["default-router".to_string()]);
    assert!(harness.log.position("install agent r1").is_some());
}

#[smol_potat::test]
async fn test_agent_config_without_host_for_unknown_agent_is_rejected() {
    let config = r#"
apiVersion: edgefleet.io/v3
kind: AgentConfig
metadata:
  name: stray
spec:
  routerMode: edge
"#;
    let (harness, orchestrator) = harness().await;
    let err = orchestrator
        .deploy_manifest(&manifest(&[CONTROL_PLANE, config]), "default")
        .await
        .err()
        .unwrap();

    assert_eq!(err.kind(), ErrorKind::Input);
    assert!(err.to_string().contains("requires a host"));
    assert!(harness.log.events().is_empty());
}

#[smol_potat::test]
async fn test_upstream_router_already_on_the_controller_is_referenced_by_uuid() {
    let agent = r#"
apiVersion: edgefleet.io/v3
kind: RemoteAgent
metadata:
  name: b
spec:
  host: 10.0.0.13
  ssh:
    user: deploy
    keyFile: /keys/id
  config:
    upstreamRouters: [gateway]
"#;
    let harness = TestHarness::with_controller(|c| c.with_agent("gateway", "uuid-gw"));
    harness.store.ensure_namespace("default").await.unwrap();
    let orchestrator = Orchestrator::new(harness.ctx.clone());
    orchestrator
        .deploy_manifest(&manifest(&[CONTROL_PLANE, agent]), "default")
        .await
        .unwrap();

    let registered = harness.controller.registered();
    let b = registered.iter().find(|a| a.name == "b").unwrap();
    assert_eq!(b.upstream_routers, vec!["uuid-gw".to_string()]);
    assert!(harness.log.position("create agent gateway").is_none());
    assert!(harness.log.position("update agent gateway").is_none());
    assert!(harness.log.position("install agent gateway").is_none());
    assert!(harness.log.position("install agent b").is_some());
}

#[smol_potat::test]
async fn test_two_control_planes_fail_before_any_side_effect() {
    let local = r#"
apiVersion: edgefleet.io/v3
kind: LocalControlPlane
metadata:
  name: local
spec:
  admin:
    email: admin@example.com
    password: secret
"#;
    let (harness, orchestrator) = harness().await;
    let err = orchestrator
        .deploy_manifest(&manifest(&[CONTROL_PLANE, local, AGENTS]), "default")
        .await
        .err()
        .unwrap();

    assert!(matches!(err, Error::Input(_)));
    assert!(harness.log.events().is_empty());
    assert!(harness.store.get_control_plane("default").await.is_err());
}

#[smol_potat::test]
async fn test_router_cycle_is_reported_without_registering_agents() {
    let agent = |name: &str, upstream: &str| {
        format!(
            "apiVersion: edgefleet.io/v3\nkind: RemoteAgent\nmetadata:\n  name: {name}\nspec:\n  host: {name}.lan\n  ssh:\n    user: deploy\n    keyFile: /keys/id\n  config:\n    upstreamRouters: [{upstream}]\n"
        )
    };
    let (a, b, c) = (agent("A", "C"), agent("B", "A"), agent("C", "B"));
    let (harness, orchestrator) = harness().await;
    let err = orchestrator
        .deploy_manifest(&manifest(&[CONTROL_PLANE, &a, &b, &c]), "default")
        .await
        .err()
        .unwrap();

    assert_eq!(err.kind(), ErrorKind::Input);
    assert!(
        err.to_string()
            .contains("router dependency cycle between agents: A, B, C")
    );
    assert!(harness.controller.registered().is_empty());
    assert!(harness.log.position("install agent A").is_none());
}

#[smol_potat::test]
async fn test_failed_stage_stops_later_stages() {
    let (harness, orchestrator) = harness().await;
    harness.installer.fail_for("r2");

    let err = orchestrator
        .deploy_manifest(&manifest(&[CONTROL_PLANE, AGENTS, ROUTE]), "default")
        .await
        .err()
        .unwrap();

    match &err {
        Error::Stage { stage, failures } => {
            assert_eq!(stage, "agents");
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].executor, "RemoteAgent r2");
        }
        other => panic!("unexpected error: {other}"),
    }
    // Siblings in the failed stage still ran
    assert!(harness.log.position("install agent r1").is_some());
    assert!(harness.controller.resource(Kind::Route, "sensor-to-sink").is_none());
}

#[smol_potat::test]
async fn test_delete_is_idempotent() {
    let (harness, orchestrator) = harness().await;
    orchestrator
        .deploy_manifest(&manifest(&[CONTROL_PLANE, AGENTS]), "default")
        .await
        .unwrap();

    // The route was never applied; its deletion only warns
    let everything = manifest(&[CONTROL_PLANE, AGENTS, ROUTE]);
    orchestrator
        .delete_manifest(&everything, "default")
        .await
        .unwrap();

    let log = &harness.log;
    let deregister = log.position("delete agent r1").unwrap();
    let uninstall = log.position("uninstall agent r1").unwrap();
    let controller = log.position("uninstall controller ctrl-1").unwrap();
    assert!(deregister < uninstall && uninstall < controller);

    let err = harness.store.get_agent("default", "r1").await.err().unwrap();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(harness.controller.registered().is_empty());

    orchestrator
        .delete_manifest(&everything, "default")
        .await
        .unwrap();
}

#[smol_potat::test]
async fn test_forced_namespace_deletion_removes_everything() {
    let (harness, orchestrator) = harness().await;
    harness.store.create_namespace("edge").await.unwrap();
    let yaml = manifest(&[CONTROL_PLANE, AGENTS]);
    orchestrator.deploy_manifest(&yaml, "edge").await.unwrap();

    let err = orchestrator
        .delete_namespace("edge", false)
        .await
        .err()
        .unwrap();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    orchestrator.delete_namespace("edge", true).await.unwrap();
    assert!(harness.log.position("uninstall agent r2").is_some());
    assert!(harness.log.position("uninstall controller ctrl-1").is_some());
    let err = harness.store.get_namespace("edge").await.err().unwrap();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[smol_potat::test]
async fn test_missing_namespace_is_not_found() {
    let harness = TestHarness::new();
    let orchestrator = Orchestrator::new(harness.ctx.clone());
    let err = orchestrator
        .deploy_manifest(&manifest(&[AGENTS]), "nowhere")
        .await
        .err()
        .unwrap();
    assert!(err.is_not_found());
}
