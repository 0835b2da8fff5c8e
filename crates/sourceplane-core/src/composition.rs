use crate::discovery::{discover_compositions, DiscoveredComposition, JOB_FILE, SCHEMA_FILE};
use crate::error::{PlanError, Result};
use jsonschema::Validator;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;

pub const REGISTRY_KIND: &str = "JobRegistry";

/// On-disk shape of a composition's `job.yaml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct JobRegistryDoc {
    pub api_version: String,
    pub kind: String,
    pub metadata: RegistryMetadata,
    pub jobs: Vec<JobSpec>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryMetadata {
    pub name: String,
    pub description: String,
}

/// A named job: a sequence of shell step templates plus scheduling data
/// (`timeout`, `retries`) that the planner carries through verbatim.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct JobSpec {
    pub name: String,
    pub description: String,
    pub timeout: String,
    pub retries: u32,
    pub labels: BTreeMap<String, String>,
    pub inputs: serde_yaml::Mapping,
    pub steps: Vec<StepTemplate>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StepTemplate {
    pub name: String,
    pub run: String,
    pub timeout: String,
    pub retry: Option<u32>,
    pub on_failure: String,
}

/// A component-type bundle: the compiled validation schema plus the job
/// registry loaded from one composition directory. `jobs[0]` is the
/// default job.
pub struct Composition {
    pub name: String,
    pub registry_name: String,
    pub registry_description: String,
    pub schema: Validator,
    pub jobs: Vec<JobSpec>,
    pub job_map: HashMap<String, usize>,
}

impl Composition {
    pub fn default_job(&self) -> Option<&JobSpec> {
        self.jobs.first()
    }
}

impl fmt::Debug for Composition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Composition")
            .field("name", &self.name)
            .field("registry_name", &self.registry_name)
            .field("jobs", &self.jobs.iter().map(|j| &j.name).collect::<Vec<_>>())
            .finish()
    }
}

/// All compositions discovered under one root, keyed by composition name.
#[derive(Debug, Default)]
pub struct CompositionRegistry {
    compositions: BTreeMap<String, Composition>,
}

impl CompositionRegistry {
    pub fn get(&self, name: &str) -> Option<&Composition> {
        self.compositions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.compositions.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Composition)> {
        self.compositions.iter()
    }

    pub fn len(&self) -> usize {
        self.compositions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.compositions.is_empty()
    }

    /// Mapping from composition name to its registry name, in sorted key
    /// order, as published under `spec.jobBindings`.
    pub fn job_bindings(&self) -> BTreeMap<String, String> {
        self.compositions
            .iter()
            .map(|(name, c)| (name.clone(), c.registry_name.clone()))
            .collect()
    }
}

/// Discover and load every composition under `root`.
pub fn load_compositions(root: &str) -> Result<CompositionRegistry> {
    let mut compositions = BTreeMap::new();
    for discovered in discover_compositions(root)? {
        let composition = load_composition(&discovered)?;
        compositions.insert(composition.name.clone(), composition);
    }

    if compositions.is_empty() {
        return Err(PlanError::EmptyCompositions {
            root: root.to_string(),
        });
    }

    Ok(CompositionRegistry { compositions })
}

fn load_composition(discovered: &DiscoveredComposition) -> Result<Composition> {
    let job_file = discovered
        .job_file
        .as_ref()
        .ok_or_else(|| PlanError::MissingSchema {
            composition: discovered.name.clone(),
            file: JOB_FILE.to_string(),
        })?;
    let schema_file = discovered
        .schema_file
        .as_ref()
        .ok_or_else(|| PlanError::MissingSchema {
            composition: discovered.name.clone(),
            file: SCHEMA_FILE.to_string(),
        })?;

    let doc = load_registry_doc(&discovered.name, job_file)?;
    let schema = compile_schema(&discovered.name, schema_file)?;

    let mut job_map = HashMap::new();
    for (i, job) in doc.jobs.iter().enumerate() {
        if job.name.is_empty() {
            return Err(PlanError::Parse {
                what: format!("'{}'", job_file.display()),
                detail: format!("job at index {i} has no name"),
            });
        }
        if job_map.insert(job.name.clone(), i).is_some() {
            return Err(PlanError::Parse {
                what: format!("'{}'", job_file.display()),
                detail: format!("duplicate job name '{}'", job.name),
            });
        }
    }

    Ok(Composition {
        name: discovered.name.clone(),
        registry_name: doc.metadata.name,
        registry_description: doc.metadata.description,
        schema,
        jobs: doc.jobs,
        job_map,
    })
}

fn load_registry_doc(name: &str, path: &Path) -> Result<JobRegistryDoc> {
    let content = std::fs::read_to_string(path).map_err(|e| PlanError::Read {
        path: path.to_path_buf(),
        source: e,
    })?;
    let mut doc: JobRegistryDoc =
        serde_yaml::from_str(&content).map_err(|e| PlanError::Parse {
            what: format!("'{}'", path.display()),
            detail: e.to_string(),
        })?;

    if !doc.kind.is_empty() && doc.kind != REGISTRY_KIND {
        return Err(PlanError::Parse {
            what: format!("'{}'", path.display()),
            detail: format!("unexpected kind '{}', want '{REGISTRY_KIND}'", doc.kind),
        });
    }
    if doc.jobs.is_empty() {
        return Err(PlanError::EmptyRegistry {
            composition: name.to_string(),
        });
    }

    // Unset onFailure means stop.
    for job in &mut doc.jobs {
        for step in &mut job.steps {
            if step.on_failure.is_empty() {
                step.on_failure = "stop".to_string();
            }
        }
    }

    Ok(doc)
}

/// Parse `schema.yaml` (YAML or JSON; YAML is a superset here) and compile
/// it as a draft 2020-12 validator. References outside the document are
/// rejected: no resolver is configured, and the pre-scan below fails them
/// with a useful message instead of a resolver lookup error.
fn compile_schema(name: &str, path: &Path) -> Result<Validator> {
    let content = std::fs::read_to_string(path).map_err(|e| PlanError::Read {
        path: path.to_path_buf(),
        source: e,
    })?;
    let yaml: serde_yaml::Value =
        serde_yaml::from_str(&content).map_err(|e| PlanError::Parse {
            what: format!("'{}'", path.display()),
            detail: e.to_string(),
        })?;
    let schema: serde_json::Value =
        serde_json::to_value(&yaml).map_err(|e| PlanError::Parse {
            what: format!("'{}'", path.display()),
            detail: e.to_string(),
        })?;

    if let Some(external) = find_external_ref(&schema) {
        return Err(PlanError::Parse {
            what: format!("'{}'", path.display()),
            detail: format!("external $ref '{external}' is not supported"),
        });
    }

    jsonschema::options()
        .with_draft(jsonschema::Draft::Draft202012)
        .build(&schema)
        .map_err(|e| PlanError::Parse {
            what: format!("schema for composition '{name}'"),
            detail: e.to_string(),
        })
}

fn find_external_ref(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Object(map) => {
            if let Some(serde_json::Value::String(target)) = map.get("$ref") {
                if !target.starts_with('#') {
                    return Some(target.clone());
                }
            }
            map.values().find_map(find_external_ref)
        }
        serde_json::Value::Array(items) => items.iter().find_map(find_external_ref),
        _ => None,
    }
}
