//! Manifest parser with environment variable substitution

use crate::{Header, ManifestError, Result, SUPPORTED_API_VERSIONS};
use regex::Regex;
use serde::Deserialize;
use std::path::Path;
use tracing::debug;

/// Parse a manifest file into its documents
pub fn parse_file(path: impl AsRef<Path>) -> Result<Vec<Header>> {
    let path = path.as_ref();
    debug!("Reading manifest {:?}", path);
    let content = std::fs::read_to_string(path)?;
    parse_str(&content)
}

/// Parse a manifest from a string, substituting variables from the process environment
pub fn parse_str(content: &str) -> Result<Vec<Header>> {
    parse_str_with(content, |name| std::env::var(name).ok())
}

/// Parse a manifest from a string with a custom variable lookup
pub fn parse_str_with(
    content: &str,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<Vec<Header>> {
    let content = substitute_env_vars(content, lookup)?;
    let mut headers = Vec::new();

    for (index, document) in serde_yaml::Deserializer::from_str(&content).enumerate() {
        let value = serde_yaml::Value::deserialize(document)?;
        if value.is_null() {
            // Empty document, e.g. a trailing `---`
            continue;
        }
        let header: Header = serde_yaml::from_value(value)?;
        validate_header(index, &header)?;
        headers.push(header);
    }

    debug!("Decoded {} manifest documents", headers.len());
    Ok(headers)
}

fn validate_header(index: usize, header: &Header) -> Result<()> {
    if !SUPPORTED_API_VERSIONS.contains(&header.api_version.as_str()) {
        return Err(ManifestError::UnsupportedApiVersion {
            document: index,
            name: header.metadata.name.clone(),
            api_version: header.api_version.clone(),
            expected: SUPPORTED_API_VERSIONS.join(", "),
        });
    }
    if header.kind.trim().is_empty() {
        return Err(ManifestError::Validation(format!(
            "document {index} has no kind"
        )));
    }
    if header.metadata.name.trim().is_empty() {
        return Err(ManifestError::Validation(format!(
            "document {index} ({}) has no metadata.name",
            header.kind
        )));
    }
    Ok(())
}

/// Substitute `${VAR}` and `${VAR:-default}` references.
///
/// Comment lines are left untouched. Every missing variable without a
/// default is reported in one error.
pub fn substitute_env_vars(
    input: &str,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<String> {
    let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| ManifestError::Validation(e.to_string()))?;
    let mut missing: Vec<String> = Vec::new();
    let mut output = String::with_capacity(input.len());

    for line in input.split_inclusive('\n') {
        if line.trim_start().starts_with('#') {
            output.push_str(line);
            continue;
        }
        let replaced = re.replace_all(line, |caps: &regex::Captures<'_>| {
            let expr = &caps[1];
            let (name, default) = match expr.split_once(":-") {
                Some((name, default)) => (name, Some(default)),
                None => (expr, None),
            };
            match (lookup(name.trim()), default) {
                (Some(value), _) => value,
                (None, Some(default)) => default.to_string(),
                (None, None) => {
                    if !missing.iter().any(|m| m == name) {
                        missing.push(name.to_string());
                    }
                    caps[0].to_string()
                }
            }
        });
        output.push_str(&replaced);
    }

    if !missing.is_empty() {
        return Err(ManifestError::EnvVarNotFound(missing.join(", ")));
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_substitution_with_defaults() {
        let out = substitute_env_vars(
            "host: ${HOST}\nport: ${PORT:-51121}\n",
            vars(&[("HOST", "10.0.0.1")]),
        )
        .unwrap();
        assert_eq!(out, "host: 10.0.0.1\nport: 51121\n");
    }

    #[test]
    fn test_missing_variables_are_all_reported() {
        let err = substitute_env_vars("a: ${A}\nb: ${B}\nc: ${A}\n", vars(&[])).unwrap_err();
        match err {
            ManifestError::EnvVarNotFound(names) => assert_eq!(names, "A, B"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_comments_are_not_substituted() {
        let out = substitute_env_vars("# uses ${UNSET}\nkey: value\n", vars(&[])).unwrap();
        assert_eq!(out, "# uses ${UNSET}\nkey: value\n");
    }

    #[test]
    fn test_multi_document_stream() {
        let yaml = r#"
apiVersion: edgefleet.io/v3
kind: LocalControlPlane
metadata:
  name: cp
spec:
  admin:
    email: user@domain.com
    password: ${PASSWORD}
---
apiVersion: edgefleet.io/v3
kind: LocalAgent
metadata:
  name: local-agent
  tags: [dev]
spec: {}
---
"#;
        let headers = parse_str_with(yaml, vars(&[("PASSWORD", "s3cret")])).unwrap();
        assert_eq!(headers.len(), 2);
        assert_eq!(headers[0].kind, "LocalControlPlane");
        assert_eq!(
            headers[0].spec["admin"]["password"],
            serde_yaml::Value::String("s3cret".to_string())
        );
        assert_eq!(headers[1].metadata.tags, vec!["dev"]);
    }

    #[test]
    fn test_unsupported_api_version() {
        let yaml = "apiVersion: other.io/v1\nkind: Route\nmetadata:\n  name: r\nspec: {}\n";
        let err = parse_str_with(yaml, vars(&[])).unwrap_err();
        assert!(matches!(err, ManifestError::UnsupportedApiVersion { .. }));
    }

    #[test]
    fn test_missing_name_rejected() {
        let yaml = "apiVersion: edgefleet.io/v3\nkind: Route\nspec: {}\n";
        let err = parse_str_with(yaml, vars(&[])).unwrap_err();
        assert!(err.to_string().contains("metadata.name"));
    }
}
