use crate::composition::CompositionRegistry;
use crate::error::{PlanError, Result};
use crate::intent::IntentMetadata;
use crate::planner::{JobInstance, RenderedStep};
use serde::{Deserialize, Serialize};
use serde_yaml::Mapping;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

pub const API_VERSION: &str = "sourceplane.io/v1";
pub const PLAN_KIND: &str = "Workflow";

/// The serialized output artifact: metadata, job bindings, and the
/// topologically ordered job sequence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub api_version: String,
    pub kind: String,
    pub metadata: PlanMetadata,
    pub spec: PlanSpec,
    pub jobs: Vec<PlanJob>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlanMetadata {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct PlanSpec {
    pub job_bindings: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlanJob {
    pub id: String,
    pub name: String,
    pub component: String,
    pub environment: String,
    pub composition: String,
    pub job_registry: String,
    pub job: String,
    pub path: String,
    pub steps: Vec<RenderedStep>,
    pub depends_on: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub timeout: String,
    pub retries: u32,
    pub env: Mapping,
    pub labels: BTreeMap<String, String>,
    pub config: Mapping,
}

/// Assemble the artifact from planned jobs in the given topological order.
pub fn build_plan(
    metadata: &IntentMetadata,
    registry: &CompositionRegistry,
    jobs: &HashMap<String, JobInstance>,
    order: &[String],
) -> Plan {
    let plan_jobs = order
        .iter()
        .filter_map(|id| jobs.get(id))
        .map(|job| PlanJob {
            id: job.id.clone(),
            name: format!("{}-{}", job.component, job.job),
            component: job.component.clone(),
            environment: job.environment.clone(),
            composition: job.composition.clone(),
            job_registry: job.registry_name.clone(),
            job: job.job.clone(),
            path: job.path.clone(),
            steps: job.steps.clone(),
            depends_on: job.depends_on.clone(),
            timeout: job.timeout.clone(),
            retries: job.retries,
            env: job.config.clone(),
            labels: job.labels.clone(),
            config: job.config.clone(),
        })
        .collect();

    Plan {
        api_version: API_VERSION.to_string(),
        kind: PLAN_KIND.to_string(),
        metadata: PlanMetadata {
            name: metadata.name.clone(),
            description: metadata.description.clone(),
        },
        spec: PlanSpec {
            job_bindings: registry.job_bindings(),
        },
        jobs: plan_jobs,
    }
}

pub fn to_yaml(plan: &Plan) -> Result<String> {
    serde_yaml::to_string(plan).map_err(|e| PlanError::Serialize {
        detail: e.to_string(),
    })
}

/// Two-space indented JSON with a trailing newline.
pub fn to_json(plan: &Plan) -> Result<String> {
    let mut out = serde_json::to_string_pretty(plan).map_err(|e| PlanError::Serialize {
        detail: e.to_string(),
    })?;
    out.push('\n');
    Ok(out)
}

/// Serialize by extension (`.yaml`/`.yml` mean YAML, anything else JSON)
/// and write the artifact, creating parent directories as needed.
pub fn write_plan(plan: &Plan, path: &Path) -> Result<()> {
    let serialized = match path.extension().and_then(|e| e.to_str()) {
        Some("yaml") | Some("yml") => to_yaml(plan)?,
        _ => to_json(plan)?,
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| PlanError::Write {
                path: path.to_path_buf(),
                source: e,
            })?;
        }
    }
    std::fs::write(path, serialized).map_err(|e| PlanError::Write {
        path: path.to_path_buf(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_plan() -> Plan {
        Plan {
            api_version: API_VERSION.to_string(),
            kind: PLAN_KIND.to_string(),
            metadata: PlanMetadata {
                name: "shop".to_string(),
                description: String::new(),
            },
            spec: PlanSpec {
                job_bindings: BTreeMap::from([
                    ("helm".to_string(), "helm-jobs".to_string()),
                ]),
            },
            jobs: vec![PlanJob {
                id: "web@prod.deploy".to_string(),
                name: "web-deploy".to_string(),
                component: "web".to_string(),
                environment: "prod".to_string(),
                composition: "helm".to_string(),
                job_registry: "helm-jobs".to_string(),
                job: "deploy".to_string(),
                path: "./".to_string(),
                steps: vec![RenderedStep {
                    name: "upgrade".to_string(),
                    run: "helm upgrade web".to_string(),
                    timeout: String::new(),
                    retry: None,
                    on_failure: "stop".to_string(),
                }],
                depends_on: Vec::new(),
                timeout: "10m".to_string(),
                retries: 2,
                env: Mapping::new(),
                labels: BTreeMap::new(),
                config: Mapping::new(),
            }],
        }
    }

    #[test]
    fn test_yaml_artifact_shape() {
        let yaml = to_yaml(&sample_plan()).unwrap();
        assert!(yaml.contains("apiVersion: sourceplane.io/v1"));
        assert!(yaml.contains("kind: Workflow"));
        assert!(yaml.contains("jobBindings:"));
        assert!(yaml.contains("id: web@prod.deploy"));
        assert!(yaml.contains("onFailure: stop"));
        // empty step timeout is omitted entirely
        assert!(!yaml.contains("retry:"));
    }

    #[test]
    fn test_json_round_trip() {
        let plan = sample_plan();
        let json = to_json(&plan).unwrap();
        let parsed: Plan = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, plan);
    }

    #[test]
    fn test_write_plan_by_extension() {
        let tmp = tempfile::tempdir().unwrap();
        let plan = sample_plan();

        let yaml_path = tmp.path().join("out/plan.yaml");
        write_plan(&plan, &yaml_path).unwrap();
        let yaml = std::fs::read_to_string(&yaml_path).unwrap();
        assert!(yaml.starts_with("apiVersion:"));

        let json_path = tmp.path().join("out/plan.json");
        write_plan(&plan, &json_path).unwrap();
        let json = std::fs::read_to_string(&json_path).unwrap();
        assert!(json.trim_start().starts_with('{'));
        assert!(json.contains("  \"apiVersion\""));
    }

    #[test]
    fn test_unknown_extension_means_json() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("plan.out");
        write_plan(&sample_plan(), &path).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.trim_start().starts_with('{'));
    }
}
