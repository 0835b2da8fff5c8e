use crate::error::{PlanError, Result};
use crate::intent::{
    Component, Intent, DEFAULT_CONDITION, DEFAULT_SCOPE, SAME_ENVIRONMENT, WILDCARD,
};
use std::collections::HashMap;

/// The canonical intent: defaults applied, wildcards expanded, references
/// checked. Downstream stages may assume every invariant established here.
#[derive(Debug, Clone)]
pub struct NormalizedIntent {
    pub intent: Intent,
    component_index: HashMap<String, usize>,
}

impl NormalizedIntent {
    pub fn component(&self, name: &str) -> Option<&Component> {
        self.component_index
            .get(name)
            .map(|&i| &self.intent.components[i])
    }

    pub fn component_names(&self) -> Vec<String> {
        self.intent.components.iter().map(|c| c.name.clone()).collect()
    }
}

/// Canonicalize a raw intent. This is the only stage that applies defaults
/// or restructures references.
pub fn normalize(mut intent: Intent) -> Result<NormalizedIntent> {
    if intent.metadata.name.is_empty() {
        return Err(invalid("intent metadata has no name"));
    }

    let mut component_index: HashMap<String, usize> = HashMap::new();
    for (i, component) in intent.components.iter_mut().enumerate() {
        if component.name.is_empty() {
            return Err(invalid(&format!("component at index {i} has no name")));
        }
        if component.type_name.is_empty() {
            return Err(invalid(&format!(
                "component '{}' has no type",
                component.name
            )));
        }
        if component_index
            .insert(component.name.clone(), i)
            .is_some()
        {
            return Err(invalid(&format!(
                "duplicate component name '{}'",
                component.name
            )));
        }

        component.enabled.get_or_insert(true);

        for dep in &mut component.depends_on {
            if dep.component.is_empty() {
                return Err(invalid(&format!(
                    "component '{}' declares a dependency with no target",
                    component.name
                )));
            }
            if dep.environment.is_empty() {
                dep.environment = SAME_ENVIRONMENT.to_string();
            }
            if dep.scope.is_empty() {
                dep.scope = DEFAULT_SCOPE.to_string();
            }
            if dep.condition.is_empty() {
                dep.condition = DEFAULT_CONDITION.to_string();
            }
        }
    }

    // Reference checks: dependencies and domains must point at declared
    // things before the expander trusts them.
    for component in &intent.components {
        for dep in &component.depends_on {
            if !component_index.contains_key(&dep.component) {
                return Err(invalid(&format!(
                    "component '{}' depends on undeclared component '{}'",
                    component.name, dep.component
                )));
            }
        }
        if !component.domain.is_empty() && !intent.groups.contains_key(&component.domain) {
            return Err(invalid(&format!(
                "component '{}' references undeclared group '{}'",
                component.name, component.domain
            )));
        }
    }

    // Wildcard selectors become the full component list in declaration order.
    let all_names: Vec<String> = intent.components.iter().map(|c| c.name.clone()).collect();
    for (env_name, environment) in intent.environments.iter_mut() {
        if environment
            .selectors
            .components
            .iter()
            .any(|s| s == WILDCARD)
        {
            environment.selectors.components = all_names.clone();
        } else {
            for selected in &environment.selectors.components {
                if !component_index.contains_key(selected) {
                    return Err(invalid(&format!(
                        "environment '{env_name}' selects undeclared component '{selected}'"
                    )));
                }
            }
        }
    }

    Ok(NormalizedIntent {
        intent,
        component_index,
    })
}

fn invalid(detail: &str) -> PlanError {
    PlanError::Parse {
        what: "intent".to_string(),
        detail: detail.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::Intent;

    fn parse(yaml: &str) -> Intent {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_defaults_applied() {
        let intent = parse(
            r#"
metadata: { name: app }
components:
  - name: web
    type: helm
    dependsOn:
      - component: db
  - name: db
    type: helm
"#,
        );
        let normalized = normalize(intent).unwrap();
        let web = normalized.component("web").unwrap();
        assert_eq!(web.enabled, Some(true));
        assert_eq!(web.depends_on[0].environment, SAME_ENVIRONMENT);
        assert_eq!(web.depends_on[0].scope, "same-environment");
        assert_eq!(web.depends_on[0].condition, "success");
    }

    #[test]
    fn test_wildcard_selector_expands_in_declaration_order() {
        let intent = parse(
            r#"
metadata: { name: app }
environments:
  staging:
    selectors:
      components: ["*"]
components:
  - { name: zeta, type: helm }
  - { name: alpha, type: helm }
  - { name: mid, type: helm }
"#,
        );
        let normalized = normalize(intent).unwrap();
        assert_eq!(
            normalized.intent.environments["staging"].selectors.components,
            vec!["zeta", "alpha", "mid"]
        );
    }

    #[test]
    fn test_missing_intent_name_rejected() {
        let err = normalize(parse("components: []")).unwrap_err();
        assert_eq!(err.kind(), "ParseError");
    }

    #[test]
    fn test_missing_component_type_rejected() {
        let err = normalize(parse(
            r#"
metadata: { name: app }
components:
  - name: web
"#,
        ))
        .unwrap_err();
        assert!(err.to_string().contains("web"));
    }

    #[test]
    fn test_duplicate_component_names_rejected() {
        let err = normalize(parse(
            r#"
metadata: { name: app }
components:
  - { name: web, type: helm }
  - { name: web, type: kustomize }
"#,
        ))
        .unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_unknown_dependency_target_rejected() {
        let err = normalize(parse(
            r#"
metadata: { name: app }
components:
  - name: web
    type: helm
    dependsOn:
      - component: ghost
"#,
        ))
        .unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn test_unknown_selector_rejected() {
        let err = normalize(parse(
            r#"
metadata: { name: app }
environments:
  prod:
    selectors:
      components: [ghost]
components:
  - { name: web, type: helm }
"#,
        ))
        .unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn test_unknown_domain_rejected() {
        let err = normalize(parse(
            r#"
metadata: { name: app }
components:
  - { name: web, type: helm, domain: ghost }
"#,
        ))
        .unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn test_index_agrees_with_store() {
        let intent = parse(
            r#"
metadata: { name: app }
components:
  - { name: a, type: helm }
  - { name: b, type: helm }
"#,
        );
        let normalized = normalize(intent).unwrap();
        for name in normalized.component_names() {
            assert_eq!(normalized.component(&name).unwrap().name, name);
        }
    }
}
