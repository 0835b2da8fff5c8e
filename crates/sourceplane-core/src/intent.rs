use crate::error::{PlanError, Result};
use serde::{Deserialize, Serialize};
use serde_yaml::Mapping;
use std::collections::BTreeMap;
use std::path::Path;

/// Wildcard accepted in `selectors.components`.
pub const WILDCARD: &str = "*";

/// Sentinel written by the normalizer into dependency edges whose target
/// environment is "whatever environment the dependent lands in". Resolved
/// during expansion.
pub const SAME_ENVIRONMENT: &str = "__same__";

pub const DEFAULT_SCOPE: &str = "same-environment";
pub const DEFAULT_CONDITION: &str = "success";

/// The user-authored declaration of desired deployment state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Intent {
    pub api_version: String,
    pub kind: String,
    pub metadata: IntentMetadata,
    pub groups: BTreeMap<String, Group>,
    pub environments: BTreeMap<String, Environment>,
    pub components: Vec<Component>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IntentMetadata {
    pub name: String,
    pub description: String,
    pub namespace: String,
}

/// A policy group: a named domain carrying shared policies and defaults
/// that components opt into via their `domain` field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Group {
    pub policies: Mapping,
    pub defaults: Mapping,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Environment {
    pub selectors: Selectors,
    pub defaults: Mapping,
    pub policies: Mapping,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Selectors {
    pub components: Vec<String>,
    pub domains: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Component {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub domain: String,
    /// `None` until the normalizer applies the `true` default.
    pub enabled: Option<bool>,
    pub path: String,
    pub inputs: Mapping,
    pub labels: BTreeMap<String, String>,
    pub depends_on: Vec<DependencyRef>,
}

impl Component {
    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }
}

/// A component -> component dependency edge as authored. The empty
/// `environment` string means "the same environment as the dependent".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DependencyRef {
    pub component: String,
    pub environment: String,
    pub scope: String,
    pub condition: String,
}

/// Read and parse an intent document from disk.
pub fn load_intent(path: &Path) -> Result<Intent> {
    let content = std::fs::read_to_string(path).map_err(|e| PlanError::Read {
        path: path.to_path_buf(),
        source: e,
    })?;
    serde_yaml::from_str(&content).map_err(|e| PlanError::Parse {
        what: format!("intent '{}'", path.display()),
        detail: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const INTENT: &str = r#"
apiVersion: sourceplane.io/v1
kind: Intent
metadata:
  name: shop
  namespace: retail
groups:
  platform:
    policies:
      changeWindow: weekdays
    defaults:
      replicas: 2
environments:
  prod:
    selectors:
      components: ["*"]
    defaults:
      region: us-west-2
components:
  - name: web
    type: helm
    domain: platform
    inputs:
      image: web:1
    dependsOn:
      - component: db
  - name: db
    type: helm
    enabled: false
"#;

    #[test]
    fn test_parse_intent() {
        let intent: Intent = serde_yaml::from_str(INTENT).unwrap();
        assert_eq!(intent.metadata.name, "shop");
        assert_eq!(intent.components.len(), 2);
        assert_eq!(intent.components[0].type_name, "helm");
        assert_eq!(intent.components[0].depends_on[0].component, "db");
        assert_eq!(intent.components[1].enabled, Some(false));
        assert!(intent.components[0].enabled.is_none());
        assert!(intent.groups.contains_key("platform"));
        assert_eq!(
            intent.environments["prod"].selectors.components,
            vec!["*".to_string()]
        );
    }

    #[test]
    fn test_load_intent_missing_file() {
        let err = load_intent(Path::new("/nonexistent/intent.yaml")).unwrap_err();
        assert_eq!(err.kind(), "ReadError");
    }

    #[test]
    fn test_load_intent_malformed_yaml() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("intent.yaml");
        std::fs::write(&path, "components: [unbalanced").unwrap();
        let err = load_intent(&path).unwrap_err();
        assert_eq!(err.kind(), "ParseError");
    }
}
