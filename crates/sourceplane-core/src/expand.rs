use crate::intent::{Component, Environment, Group, SAME_ENVIRONMENT};
use crate::normalize::NormalizedIntent;
use regex::{NoExpand, Regex};
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;

const PATH_KEY: &str = "path";
const DEFAULT_PATH: &str = "./";

/// One materialization of a component for one environment, carrying fully
/// merged configuration and resolved dependency edges.
#[derive(Debug, Clone)]
pub struct ComponentInstance {
    pub component: String,
    pub environment: String,
    pub composition: String,
    pub domain: String,
    pub labels: BTreeMap<String, String>,
    pub inputs: Mapping,
    pub policies: Mapping,
    pub path: String,
    pub depends_on: Vec<ResolvedDependency>,
}

/// A dependency edge with its target environment made concrete.
#[derive(Debug, Clone)]
pub struct ResolvedDependency {
    pub component: String,
    pub environment: String,
    pub scope: String,
    pub condition: String,
}

/// Materialize one instance per (environment, selected component) pair.
///
/// Configuration precedence is realized here: component inputs override
/// group defaults, which override environment defaults, with `path` pulled
/// out of the defaults maps and resolved by its own priority chain. With a
/// non-empty `environment_filter` only that environment is expanded.
pub fn expand(
    intent: &NormalizedIntent,
    environment_filter: Option<&str>,
) -> BTreeMap<String, Vec<ComponentInstance>> {
    let interpolator = Interpolator::new();
    let mut expansion = BTreeMap::new();

    for (env_name, environment) in &intent.intent.environments {
        if let Some(filter) = environment_filter {
            if !filter.is_empty() && filter != env_name {
                continue;
            }
        }

        let mut instances = Vec::new();
        for selected in &environment.selectors.components {
            let Some(component) = intent.component(selected) else {
                continue;
            };
            if !component.is_enabled() {
                continue;
            }
            instances.push(materialize(
                &interpolator,
                intent,
                env_name,
                environment,
                component,
            ));
        }
        expansion.insert(env_name.clone(), instances);
    }

    expansion
}

fn materialize(
    interpolator: &Interpolator,
    intent: &NormalizedIntent,
    env_name: &str,
    environment: &Environment,
    component: &Component,
) -> ComponentInstance {
    let group = intent.intent.groups.get(&component.domain);

    let (merged, group_path, env_path) = merge_inputs(environment, group, component);
    let inputs = interpolator.render_mapping(&merged, env_name, &component.domain, &component.name);

    let raw_path = if !component.path.is_empty() {
        component.path.clone()
    } else if let Some(p) = group_path {
        p
    } else if let Some(p) = env_path {
        p
    } else {
        DEFAULT_PATH.to_string()
    };
    let path = interpolator.render_str(&raw_path, env_name, &component.domain, &component.name);

    let depends_on = component
        .depends_on
        .iter()
        .map(|dep| ResolvedDependency {
            component: dep.component.clone(),
            environment: if dep.environment == SAME_ENVIRONMENT {
                env_name.to_string()
            } else {
                dep.environment.clone()
            },
            scope: dep.scope.clone(),
            condition: dep.condition.clone(),
        })
        .collect();

    ComponentInstance {
        component: component.name.clone(),
        environment: env_name.to_string(),
        composition: component.type_name.clone(),
        domain: component.domain.clone(),
        labels: component.labels.clone(),
        inputs,
        policies: merge_policies(group, environment),
        path,
        depends_on,
    }
}

/// Shallow merge, later wins: environment defaults, then group defaults,
/// then component inputs. `path` keys in the defaults maps are set aside
/// for the path priority chain instead of landing in `inputs`.
fn merge_inputs(
    environment: &Environment,
    group: Option<&Group>,
    component: &Component,
) -> (Mapping, Option<String>, Option<String>) {
    let mut merged = Mapping::new();
    let mut env_path = None;
    let mut group_path = None;

    for (key, value) in &environment.defaults {
        if key.as_str() == Some(PATH_KEY) {
            env_path = value.as_str().map(String::from);
            continue;
        }
        merged.insert(key.clone(), value.clone());
    }

    if let Some(group) = group {
        for (key, value) in &group.defaults {
            if key.as_str() == Some(PATH_KEY) {
                group_path = value.as_str().map(String::from);
                continue;
            }
            merged.insert(key.clone(), value.clone());
        }
    }

    for (key, value) in &component.inputs {
        merged.insert(key.clone(), value.clone());
    }

    (merged, group_path, env_path)
}

/// Union of group and environment policies, environment winning. Policies
/// are carried on the instance as-is; they are never interpolated and
/// never merged into `inputs`.
fn merge_policies(group: Option<&Group>, environment: &Environment) -> Mapping {
    let mut merged = Mapping::new();
    if let Some(group) = group {
        for (key, value) in &group.policies {
            merged.insert(key.clone(), value.clone());
        }
    }
    for (key, value) in &environment.policies {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

/// Substitutes the expansion-scope placeholders in merged input values,
/// then strips whatever `{{…}}` remains and trims the result.
struct Interpolator {
    environment_re: Regex,
    group_re: Regex,
    component_re: Regex,
    residual_re: Regex,
}

impl Interpolator {
    fn new() -> Self {
        Self {
            environment_re: Regex::new(r"\{\{\s*\.environment\s*\}\}").unwrap(),
            group_re: Regex::new(r"\{\{\s*\.group\s*\}\}").unwrap(),
            component_re: Regex::new(r"\{\{\s*\.component\s*\}\}").unwrap(),
            residual_re: Regex::new(r"\{\{.*?\}\}").unwrap(),
        }
    }

    fn render_mapping(&self, mapping: &Mapping, env: &str, group: &str, component: &str) -> Mapping {
        mapping
            .iter()
            .map(|(key, value)| (key.clone(), self.render_value(value, env, group, component)))
            .collect()
    }

    fn render_value(&self, value: &Value, env: &str, group: &str, component: &str) -> Value {
        match value {
            Value::String(s) => Value::String(self.render_str(s, env, group, component)),
            Value::Sequence(items) => Value::Sequence(
                items
                    .iter()
                    .map(|v| self.render_value(v, env, group, component))
                    .collect(),
            ),
            Value::Mapping(nested) => {
                Value::Mapping(self.render_mapping(nested, env, group, component))
            }
            other => other.clone(),
        }
    }

    fn render_str(&self, s: &str, env: &str, group: &str, component: &str) -> String {
        let s = self.environment_re.replace_all(s, NoExpand(env));
        let s = self.group_re.replace_all(&s, NoExpand(group));
        let s = self.component_re.replace_all(&s, NoExpand(component));
        let s = self.residual_re.replace_all(&s, "");
        s.trim().to_string()
    }
}
