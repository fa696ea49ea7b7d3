//! Kind registry: maps manifest documents to executors

use crate::executors::{
    AgentConfigExecutor, AgentExecutor, ApplyResourceExecutor, ControlPlaneExecutor,
    ControllerExecutor, DeleteExecutor, VolumeExecutor,
};
use crate::executors::display_name;
use crate::runner::Failure;
use crate::{DeployContext, Error, Executor, Result};
use fleet_manifest::{Header, Kind};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, warn};

/// Everything a constructor gets from one document
#[derive(Debug, Clone)]
pub struct ExecutorSpec {
    /// Resolved kind
    pub kind: Kind,
    /// Target namespace
    pub namespace: String,
    /// Resource name
    pub name: String,
    /// Undecoded `spec` body
    pub spec: serde_yaml::Value,
    /// Tags from the metadata
    pub tags: Vec<String>,
}

/// Builds the executor of one document; `None` means nothing to do
pub type Constructor =
    Arc<dyn Fn(ExecutorSpec) -> Result<Option<Arc<dyn Executor>>> + Send + Sync>;

/// Executors grouped by kind
pub type ExecutorBuckets = BTreeMap<Kind, Vec<Arc<dyn Executor>>>;

/// Registry of constructors by kind
#[derive(Clone, Default)]
pub struct KindRegistry {
    constructors: HashMap<Kind, Constructor>,
}

impl KindRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the constructor of `kind`, replacing any previous one
    pub fn register<F>(&mut self, kind: Kind, constructor: F)
    where
        F: Fn(ExecutorSpec) -> Result<Option<Arc<dyn Executor>>> + Send + Sync + 'static,
    {
        self.constructors.insert(kind, Arc::new(constructor));
    }

    /// Whether `kind` has a constructor
    pub fn is_registered(&self, kind: Kind) -> bool {
        self.constructors.contains_key(&kind)
    }

    /// Registered kinds
    pub fn kinds(&self) -> Vec<Kind> {
        let mut kinds: Vec<Kind> = self.constructors.keys().copied().collect();
        kinds.sort();
        kinds
    }

    /// Run the constructor registered for `spec.kind`
    pub fn construct(&self, spec: ExecutorSpec) -> Result<Option<Arc<dyn Executor>>> {
        match self.constructors.get(&spec.kind) {
            Some(constructor) => constructor(spec),
            None => Ok(None),
        }
    }

    /// Constructors deploying every kind
    pub fn deploy_defaults(ctx: &DeployContext) -> Self {
        let mut registry = Self::new();
        for kind in Kind::ALL {
            let ctx = ctx.clone();
            match kind {
                k if k.is_control_plane() => registry.register(k, move |spec| {
                    Ok(Some(Arc::new(ControlPlaneExecutor::from_spec(&ctx, spec)?)))
                }),
                k if k.is_controller() => registry.register(k, move |spec| {
                    Ok(Some(Arc::new(ControllerExecutor::from_spec(&ctx, spec)?)))
                }),
                k if k.is_agent() => registry.register(k, move |spec| {
                    Ok(Some(Arc::new(AgentExecutor::from_spec(&ctx, spec)?)))
                }),
                Kind::AgentConfig => registry.register(kind, move |spec| {
                    Ok(Some(Arc::new(AgentConfigExecutor::from_spec(&ctx, spec)?)))
                }),
                Kind::Volume => registry.register(kind, move |spec| {
                    Ok(Some(Arc::new(VolumeExecutor::from_spec(&ctx, spec)?)))
                }),
                _ => registry.register(kind, move |spec| {
                    Ok(Some(Arc::new(ApplyResourceExecutor::from_spec(&ctx, spec)?)))
                }),
            }
        }
        registry
    }

    /// Constructors deleting every kind
    pub fn delete_defaults(ctx: &DeployContext) -> Self {
        let mut registry = Self::new();
        for kind in Kind::ALL {
            let ctx = ctx.clone();
            registry.register(kind, move |spec| {
                Ok(Some(Arc::new(DeleteExecutor::from_spec(&ctx, spec)?)))
            });
        }
        registry
    }

    /// Turn manifest documents into executors bucketed by kind.
    ///
    /// Unknown or unregistered kinds are skipped with a warning. Every
    /// invalid document is reported; a manifest without a single executor
    /// is an input error.
    pub fn dispatch(&self, headers: &[Header], namespace: &str) -> Result<ExecutorBuckets> {
        let mut buckets = ExecutorBuckets::new();
        let mut failures = Vec::new();

        for header in headers {
            let document = display_name(&header.kind, &header.metadata.name);
            if let Err(e) = header.check_namespace(namespace) {
                failures.push(Failure::new(document, Error::Input(e.to_string())));
                continue;
            }
            let Some(kind) = header.resolved_kind() else {
                warn!("Skipping {}: unknown kind '{}'", document, header.kind);
                continue;
            };
            let Some(constructor) = self.constructors.get(&kind) else {
                warn!("Skipping {}: no constructor registered for {}", document, kind);
                continue;
            };

            let spec = ExecutorSpec {
                kind,
                namespace: namespace.to_string(),
                name: header.metadata.name.trim().to_string(),
                spec: header.spec.clone(),
                tags: header.metadata.tags.clone(),
            };
            match constructor(spec) {
                Ok(Some(executor)) => {
                    debug!("Decoded {}", executor.name());
                    buckets.entry(kind).or_default().push(executor);
                }
                Ok(None) => debug!("{} needs no work", document),
                Err(e) => failures.push(Failure::new(document, e)),
            }
        }

        if !failures.is_empty() {
            return Err(Error::Stage {
                stage: "parse".to_string(),
                failures,
            });
        }
        if buckets.values().all(Vec::is_empty) {
            return Err(Error::Input(
                "manifest does not declare any deployable resource".to_string(),
            ));
        }
        Ok(buckets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EmptyExecutor;
    use fleet_manifest::parser::parse_str_with;
    use fleet_store::ErrorKind;

    fn headers(yaml: &str) -> Vec<Header> {
        parse_str_with(yaml, |_| None).unwrap()
    }

    fn empty_registry(kinds: &[Kind]) -> KindRegistry {
        let mut registry = KindRegistry::new();
        for &kind in kinds {
            registry.register(kind, |spec| {
                Ok(Some(Arc::new(EmptyExecutor::new(display_name(spec.kind, &spec.name)))))
            });
        }
        registry
    }

    const TWO_ROUTES: &str = r#"
apiVersion: edgefleet.io/v3
kind: Route
metadata:
  name: r1
spec: {}
---
apiVersion: edgefleet.io/v3
kind: Route
metadata:
  name: r2
spec: {}
---
apiVersion: edgefleet.io/v3
kind: Gadget
metadata:
  name: g
spec: {}
"#;

    #[test]
    fn test_documents_are_bucketed_and_unknown_kinds_skipped() {
        let registry = empty_registry(&[Kind::Route]);
        let buckets = registry.dispatch(&headers(TWO_ROUTES), "default").unwrap();
        assert_eq!(buckets.len(), 1);
        let names: Vec<&str> = buckets[&Kind::Route].iter().map(|e| e.name()).collect();
        assert_eq!(names, vec!["Route r1", "Route r2"]);
    }

    #[test]
    fn test_namespace_mismatch_is_input_error() {
        let yaml = "apiVersion: edgefleet.io/v3\nkind: Route\nmetadata:\n  name: r1\n  namespace: prod\nspec: {}\n";
        let registry = empty_registry(&[Kind::Route]);
        let err = registry.dispatch(&headers(yaml), "staging").err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Input);
        let msg = err.to_string();
        assert!(msg.contains("prod") && msg.contains("staging"));
    }

    #[test]
    fn test_manifest_without_executors_is_input_error() {
        let registry = empty_registry(&[Kind::Microservice]);
        let err = registry.dispatch(&headers(TWO_ROUTES), "default").err().unwrap();
        assert!(matches!(err, Error::Input(_)));
    }

    #[test]
    fn test_every_invalid_document_is_reported() {
        let mut registry = KindRegistry::new();
        registry.register(Kind::Route, |spec| {
            Err(Error::Input(format!("bad route {}", spec.name)))
        });
        match registry.dispatch(&headers(TWO_ROUTES), "default").err().unwrap() {
            Error::Stage { stage, failures } => {
                assert_eq!(stage, "parse");
                assert_eq!(failures.len(), 2);
                assert_eq!(failures[1].executor, "Route r2");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_defaults_cover_every_kind() {
        let ctx = crate::testing::TestHarness::new().ctx;
        assert_eq!(KindRegistry::deploy_defaults(&ctx).kinds().len(), Kind::ALL.len());
        assert_eq!(KindRegistry::delete_defaults(&ctx).kinds().len(), Kind::ALL.len());
    }
}
