//! Agent-configuration dependency resolver
//!
//! Agent configurations reference other agents as upstream or network
//! routers. A referenced agent must be configured before the agents that
//! route through it. This module builds that graph, rejects cycles and
//! replays the configurations sequentially in dependency order.
//!
//! Referenced agents that are not part of the deployment must already be
//! registered on the controller. They enter the graph as placeholder nodes
//! so their own router references still constrain the order, but nothing
//! is executed for them.

use crate::cache::ClientCache;
use crate::client::AgentInfo;
use crate::runner::Failure;
use crate::{EmptyExecutor, Error, Executor, Result};
use async_trait::async_trait;
use fleet_store::{DEFAULT_ROUTER_NAME, RouterMode};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, info};

struct Node {
    name: String,
    executor: Arc<dyn Executor>,
    placeholder: bool,
}

/// Dependency graph over the agent configurations of one namespace
pub struct DependencyGraph {
    namespace: String,
    nodes: Vec<Node>,
    index: HashMap<String, usize>,
    /// Adjacency list: dependency -> dependents
    edges: Vec<Vec<usize>>,
}

impl DependencyGraph {
    /// Build the graph for `executors`, resolving references to agents
    /// outside the set through `snapshot`.
    ///
    /// Every executor must configure an agent of `namespace`.
    pub fn build(
        namespace: &str,
        executors: Vec<Arc<dyn Executor>>,
        snapshot: &[AgentInfo],
    ) -> Result<Self> {
        let mut graph = Self {
            namespace: namespace.to_string(),
            nodes: Vec::new(),
            index: HashMap::new(),
            edges: Vec::new(),
        };

        for executor in executors {
            let decl = executor.agent_config().ok_or_else(|| {
                Error::Internal(format!("{} does not configure an agent", executor.name()))
            })?;
            if decl.namespace != namespace {
                return Err(Error::Internal(format!(
                    "{} targets namespace '{}', not '{}'",
                    executor.name(),
                    decl.namespace,
                    namespace
                )));
            }
            if graph.index.contains_key(&decl.name) {
                return Err(Error::Input(format!(
                    "agent '{}' is configured more than once in namespace '{}'",
                    decl.name, namespace
                )));
            }
            let name = decl.name.clone();
            graph.add_node(name, executor, false);
        }

        let declared: Vec<(usize, String, Vec<String>)> = graph
            .nodes
            .iter()
            .enumerate()
            .map(|(i, node)| {
                let deps = node
                    .executor
                    .agent_config()
                    .map(|decl| decl.dependencies())
                    .unwrap_or_default();
                (i, node.name.clone(), deps)
            })
            .collect();

        for (dependent, name, deps) in declared {
            for dep in deps {
                let dependency = graph.resolve(&dep, &name, snapshot)?;
                if graph.routes_nothing(dependency, snapshot) {
                    return Err(Error::Input(format!(
                        "agent '{name}' cannot route through '{}': its router mode is none",
                        graph.nodes[dependency].name
                    )));
                }
                graph.add_edge(dependency, dependent);
            }
        }

        debug!(
            "Dependency graph for namespace '{}': {} node(s), {} edge(s)",
            namespace,
            graph.nodes.len(),
            graph.edges.iter().map(Vec::len).sum::<usize>()
        );
        Ok(graph)
    }

    fn add_node(&mut self, name: String, executor: Arc<dyn Executor>, placeholder: bool) -> usize {
        let idx = self.nodes.len();
        self.index.insert(name.clone(), idx);
        self.nodes.push(Node {
            name,
            executor,
            placeholder,
        });
        self.edges.push(Vec::new());
        idx
    }

    fn add_edge(&mut self, from: usize, to: usize) {
        if !self.edges[from].contains(&to) {
            self.edges[from].push(to);
        }
    }

    /// Whether the agent at `idx` runs without a router
    fn routes_nothing(&self, idx: usize, snapshot: &[AgentInfo]) -> bool {
        let node = &self.nodes[idx];
        if node.placeholder {
            snapshot
                .iter()
                .find(|a| a.name == node.name)
                .is_some_and(|a| a.router_mode == Some(RouterMode::None))
        } else {
            node.executor
                .agent_config()
                .is_some_and(|decl| decl.config.mode() == RouterMode::None)
        }
    }

    /// Node index for `reference`, materializing a placeholder for agents
    /// that only exist on the controller
    fn resolve(&mut self, reference: &str, referrer: &str, snapshot: &[AgentInfo]) -> Result<usize> {
        let name = snapshot
            .iter()
            .find(|a| a.uuid == reference)
            .map(|a| a.name.clone())
            .unwrap_or_else(|| reference.to_string());

        if let Some(&idx) = self.index.get(&name) {
            return Ok(idx);
        }

        let info = snapshot.iter().find(|a| a.name == name);
        if info.is_none() && name != DEFAULT_ROUTER_NAME {
            return Err(Error::NotFound(format!(
                "router '{reference}' of agent '{referrer}' is neither deployed by this manifest nor registered in namespace '{}'",
                self.namespace
            )));
        }

        debug!("Agent '{}' already exists, adding a placeholder", name);
        let executor = Arc::new(EmptyExecutor::new(format!("existing agent {name}")));
        let idx = self.add_node(name.clone(), executor, true);

        let Some(info) = info else {
            return Ok(idx);
        };
        if info.router_mode == Some(RouterMode::None) {
            return Ok(idx);
        }

        let mut references: Vec<&String> = Vec::new();
        for r in info.upstream_routers.iter().chain(info.network_router.iter()) {
            if !references.contains(&r) {
                references.push(r);
            }
        }
        for reference in references {
            let known = snapshot
                .iter()
                .any(|a| &a.uuid == reference || &a.name == reference);
            if !known && reference != DEFAULT_ROUTER_NAME {
                // The controller accepted it; nothing here can order against it
                debug!("Ignoring unknown router {} of existing agent '{}'", reference, name);
                continue;
            }
            let dependency = self.resolve(reference, &name, snapshot)?;
            self.add_edge(dependency, idx);
        }
        Ok(idx)
    }

    /// Number of nodes, placeholders included
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph has no nodes
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether `name` is a node of the graph
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Whether `name` is a placeholder for an existing agent
    pub fn is_placeholder(&self, name: &str) -> bool {
        self.index
            .get(name)
            .is_some_and(|&idx| self.nodes[idx].placeholder)
    }

    /// Every edge as `(dependency, dependent)`
    pub fn edges(&self) -> Vec<(String, String)> {
        self.edges
            .iter()
            .enumerate()
            .flat_map(|(from, targets)| {
                targets
                    .iter()
                    .map(move |&to| (self.nodes[from].name.clone(), self.nodes[to].name.clone()))
            })
            .collect()
    }

    /// Strongly connected components that form cycles, as sorted agent names
    pub fn cycles(&self) -> Vec<Vec<String>> {
        let mut tarjan = Tarjan::new(&self.edges);
        for v in 0..self.nodes.len() {
            if tarjan.indices[v].is_none() {
                tarjan.strong_connect(v);
            }
        }
        tarjan
            .components
            .into_iter()
            .filter(|c| c.len() > 1 || self.edges[c[0]].contains(&c[0]))
            .map(|c| {
                let mut names: Vec<String> = c.into_iter().map(|i| self.nodes[i].name.clone()).collect();
                names.sort();
                names
            })
            .collect()
    }

    fn topological_order(&self) -> Result<Vec<usize>> {
        let cycles = self.cycles();
        if !cycles.is_empty() {
            return Err(Error::DependencyCycle(cycles.into_iter().flatten().collect()));
        }

        let mut in_degree = vec![0usize; self.nodes.len()];
        for targets in &self.edges {
            for &to in targets {
                in_degree[to] += 1;
            }
        }

        let mut queue: VecDeque<usize> = (0..self.nodes.len()).filter(|&i| in_degree[i] == 0).collect();
        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(node) = queue.pop_front() {
            order.push(node);
            for &dependent in &self.edges[node] {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    queue.push_back(dependent);
                }
            }
        }

        if order.len() != self.nodes.len() {
            let stuck = (0..self.nodes.len())
                .filter(|i| !order.contains(i))
                .map(|i| self.nodes[i].name.clone())
                .collect();
            return Err(Error::DependencyCycle(stuck));
        }
        Ok(order)
    }

    /// Every node name in execution order, placeholders included
    pub fn order(&self) -> Result<Vec<String>> {
        Ok(self
            .topological_order()?
            .into_iter()
            .map(|i| self.nodes[i].name.clone())
            .collect())
    }

    /// Executors to run, in dependency order; placeholders are left out
    pub fn execution_order(&self) -> Result<Vec<Arc<dyn Executor>>> {
        Ok(self
            .topological_order()?
            .into_iter()
            .filter(|&i| !self.nodes[i].placeholder)
            .map(|i| self.nodes[i].executor.clone())
            .collect())
    }

    /// Run the executors one after another in dependency order.
    ///
    /// The first failure stops the replay, since later configurations may
    /// route through the failed one.
    pub async fn execute(&self) -> Result<()> {
        for executor in self.execution_order()? {
            info!("Configuring {}", executor.name());
            if let Err(error) = executor.execute().await {
                return Err(Error::Stage {
                    stage: format!("agent configuration in namespace '{}'", self.namespace),
                    failures: vec![Failure::new(executor.name(), error)],
                });
            }
        }
        Ok(())
    }
}

struct Tarjan<'a> {
    edges: &'a [Vec<usize>],
    next_index: usize,
    indices: Vec<Option<usize>>,
    lowlink: Vec<usize>,
    on_stack: Vec<bool>,
    stack: Vec<usize>,
    components: Vec<Vec<usize>>,
}

impl<'a> Tarjan<'a> {
    fn new(edges: &'a [Vec<usize>]) -> Self {
        let n = edges.len();
        Self {
            edges,
            next_index: 0,
            indices: vec![None; n],
            lowlink: vec![0; n],
            on_stack: vec![false; n],
            stack: Vec::new(),
            components: Vec::new(),
        }
    }

    fn strong_connect(&mut self, v: usize) {
        self.indices[v] = Some(self.next_index);
        self.lowlink[v] = self.next_index;
        self.next_index += 1;
        self.stack.push(v);
        self.on_stack[v] = true;

        let edges = self.edges;
        for &w in &edges[v] {
            match self.indices[w] {
                None => {
                    self.strong_connect(w);
                    self.lowlink[v] = self.lowlink[v].min(self.lowlink[w]);
                }
                Some(w_index) if self.on_stack[w] => {
                    self.lowlink[v] = self.lowlink[v].min(w_index);
                }
                Some(_) => {}
            }
        }

        if self.indices[v] == Some(self.lowlink[v]) {
            let mut component = Vec::new();
            while let Some(w) = self.stack.pop() {
                self.on_stack[w] = false;
                component.push(w);
                if w == v {
                    break;
                }
            }
            self.components.push(component);
        }
    }
}

/// Group agent-configuration executors by target namespace
pub fn partition_by_namespace(
    executors: Vec<Arc<dyn Executor>>,
) -> Result<BTreeMap<String, Vec<Arc<dyn Executor>>>> {
    let mut partitions: BTreeMap<String, Vec<Arc<dyn Executor>>> = BTreeMap::new();
    for executor in executors {
        let namespace = executor
            .agent_config()
            .map(|decl| decl.namespace.clone())
            .ok_or_else(|| {
                Error::Internal(format!("{} does not configure an agent", executor.name()))
            })?;
        partitions.entry(namespace).or_default().push(executor);
    }
    Ok(partitions)
}

/// Resolves and replays the agent configurations of one namespace
pub struct PartitionExecutor {
    name: String,
    namespace: String,
    executors: Vec<Arc<dyn Executor>>,
    cache: Arc<ClientCache>,
}

impl PartitionExecutor {
    /// Wrap the agent configurations of `namespace`
    pub fn new(namespace: &str, executors: Vec<Arc<dyn Executor>>, cache: Arc<ClientCache>) -> Self {
        Self {
            name: format!("agent configuration in namespace '{namespace}'"),
            namespace: namespace.to_string(),
            executors,
            cache,
        }
    }
}

#[async_trait]
impl Executor for PartitionExecutor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self) -> Result<()> {
        // One snapshot for the whole resolution
        let snapshot = self.cache.agents(&self.namespace).await?;
        let graph = DependencyGraph::build(&self.namespace, self.executors.clone(), &snapshot)?;
        graph.execute().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AgentConfigDecl;
    use fleet_store::AgentConfiguration;
    use std::sync::Mutex;

    struct Config {
        name: String,
        decl: AgentConfigDecl,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Executor for Config {
        fn name(&self) -> &str {
            &self.name
        }

        async fn execute(&self) -> Result<()> {
            self.log.lock().unwrap().push(self.decl.name.clone());
            Ok(())
        }

        fn agent_config(&self) -> Option<&AgentConfigDecl> {
            Some(&self.decl)
        }
    }

    fn config(
        namespace: &str,
        name: &str,
        upstream: &[&str],
        log: &Arc<Mutex<Vec<String>>>,
    ) -> Arc<dyn Executor> {
        Arc::new(Config {
            name: format!("AgentConfig {name}"),
            decl: AgentConfigDecl {
                namespace: namespace.to_string(),
                name: name.to_string(),
                config: AgentConfiguration {
                    upstream_routers: upstream.iter().map(|s| s.to_string()).collect(),
                    host: Some(format!("{name}.local")),
                    ..Default::default()
                },
            },
            log: log.clone(),
        })
    }

    fn info(name: &str, uuid: &str, upstream: &[&str]) -> AgentInfo {
        AgentInfo {
            name: name.to_string(),
            uuid: uuid.to_string(),
            router_mode: Some(RouterMode::Edge),
            upstream_routers: upstream.iter().map(|s| s.to_string()).collect(),
            network_router: None,
            host: None,
        }
    }

    fn log() -> Arc<Mutex<Vec<String>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    #[test]
    fn test_every_edge_points_forward_in_the_order() {
        let log = log();
        let executors = vec![
            config("edge", "e", &["c", "d"], &log),
            config("edge", "d", &["b"], &log),
            config("edge", "c", &["a", "b"], &log),
            config("edge", "b", &["a"], &log),
            config("edge", "a", &[DEFAULT_ROUTER_NAME], &log),
        ];
        let graph = DependencyGraph::build("edge", executors, &[]).unwrap();
        let order = graph.order().unwrap();
        let position = |name: &str| order.iter().position(|n| n == name).unwrap();

        assert_eq!(order.len(), 6);
        for (from, to) in graph.edges() {
            assert!(position(&from) < position(&to), "{from} must precede {to}");
        }
    }

    #[test]
    fn test_cycle_lists_every_agent() {
        let log = log();
        let executors = vec![
            config("edge", "A", &["C"], &log),
            config("edge", "B", &["A"], &log),
            config("edge", "C", &["B"], &log),
        ];
        let graph = DependencyGraph::build("edge", executors, &[]).unwrap();
        let err = graph.order().unwrap_err();
        let msg = err.to_string();
        assert!(matches!(err, Error::DependencyCycle(_)));
        assert!(msg.contains('A') && msg.contains('B') && msg.contains('C'));
    }

    #[test]
    fn test_existing_agent_is_an_ordering_constraint_only() {
        let log = log();
        let snapshot = vec![info("gateway", "uuid-gw", &[])];
        let graph = DependencyGraph::build(
            "edge",
            vec![config("edge", "r1", &["gateway"], &log)],
            &snapshot,
        )
        .unwrap();

        assert!(graph.is_placeholder("gateway"));
        assert_eq!(graph.order().unwrap(), vec!["gateway", "r1"]);
        let executors = graph.execution_order().unwrap();
        assert_eq!(executors.len(), 1);
        assert_eq!(executors[0].name(), "AgentConfig r1");
    }

    #[test]
    fn test_placeholders_expand_transitively_and_are_memoized() {
        let log = log();
        let snapshot = vec![
            info("hub", "uuid-hub", &[]),
            info("relay", "uuid-relay", &["uuid-hub"]),
        ];
        let graph = DependencyGraph::build(
            "edge",
            vec![
                config("edge", "r1", &["relay"], &log),
                config("edge", "r2", &["relay", "uuid-hub"], &log),
            ],
            &snapshot,
        )
        .unwrap();

        assert_eq!(graph.len(), 4);
        let edges = graph.edges();
        assert!(edges.contains(&("hub".to_string(), "relay".to_string())));
        assert!(edges.contains(&("hub".to_string(), "r2".to_string())));
        let order = graph.order().unwrap();
        assert_eq!(&order[..2], &["hub".to_string(), "relay".to_string()]);
    }

    #[test]
    fn test_routerless_agent_cannot_be_an_upstream() {
        let log = log();
        let standalone: Arc<dyn Executor> = Arc::new(Config {
            name: "AgentConfig a".to_string(),
            decl: AgentConfigDecl {
                namespace: "edge".to_string(),
                name: "a".to_string(),
                config: AgentConfiguration {
                    router_mode: Some(RouterMode::None),
                    ..Default::default()
                },
            },
            log: log.clone(),
        });
        let err = DependencyGraph::build(
            "edge",
            vec![standalone, config("edge", "b", &["a"], &log)],
            &[],
        )
        .err()
        .unwrap();
        assert!(matches!(err, Error::Input(_)));
        let msg = err.to_string();
        assert!(msg.contains("'a'") && msg.contains("'b'"));

        let mut existing = info("sensor", "uuid-sensor", &[]);
        existing.router_mode = Some(RouterMode::None);
        let err = DependencyGraph::build(
            "edge",
            vec![config("edge", "b", &["uuid-sensor"], &log)],
            &[existing],
        )
        .err()
        .unwrap();
        assert!(matches!(err, Error::Input(_)));
        assert!(err.to_string().contains("'sensor'"));
    }

    #[test]
    fn test_unknown_router_is_not_found() {
        let log = log();
        let err = DependencyGraph::build("edge", vec![config("edge", "r1", &["ghost"], &log)], &[])
            .err()
            .unwrap();
        assert!(err.is_not_found());
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn test_default_router_is_always_resolvable() {
        let log = log();
        let graph = DependencyGraph::build(
            "edge",
            vec![config("edge", "r1", &[DEFAULT_ROUTER_NAME], &log)],
            &[],
        )
        .unwrap();
        assert!(graph.is_placeholder(DEFAULT_ROUTER_NAME));
    }

    #[test]
    fn test_namespaces_never_share_a_graph() {
        let log = log();
        // Combined, these four would form the cycle A -> B -> A
        let executors = vec![
            config("east", "A", &["B"], &log),
            config("east", "B", &[], &log),
            config("west", "B", &["A"], &log),
            config("west", "A", &[], &log),
        ];
        let partitions = partition_by_namespace(executors).unwrap();
        assert_eq!(partitions.len(), 2);

        let east = DependencyGraph::build("east", partitions["east"].clone(), &[]).unwrap();
        let west = DependencyGraph::build("west", partitions["west"].clone(), &[]).unwrap();
        assert_eq!(east.order().unwrap(), vec!["B", "A"]);
        assert_eq!(west.order().unwrap(), vec!["A", "B"]);
        assert_eq!(east.edges(), vec![("B".to_string(), "A".to_string())]);
    }

    #[test]
    fn test_duplicate_agent_in_namespace_rejected() {
        let log = log();
        let err = DependencyGraph::build(
            "edge",
            vec![config("edge", "r1", &[], &log), config("edge", "r1", &[], &log)],
            &[],
        )
        .err()
        .unwrap();
        assert!(matches!(err, Error::Input(_)));
    }

    #[smol_potat::test]
    async fn test_execute_replays_in_order() {
        let log = log();
        let graph = DependencyGraph::build(
            "edge",
            vec![config("edge", "r2", &["r1"], &log), config("edge", "r1", &[], &log)],
            &[],
        )
        .unwrap();
        graph.execute().await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["r1", "r2"]);
    }
}
