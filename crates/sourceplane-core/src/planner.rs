use crate::composition::{CompositionRegistry, JobSpec};
use crate::error::{PlanError, Result};
use crate::expand::ComponentInstance;
use crate::template::Template;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::collections::{BTreeMap, HashMap, HashSet};

/// A step with every template placeholder substituted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderedStep {
    pub name: String,
    pub run: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub timeout: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<u32>,
    pub on_failure: String,
}

/// A node of the final DAG: one component instance bound to its
/// composition's default job, steps rendered, dependencies resolved to
/// concrete job ids.
#[derive(Debug, Clone)]
pub struct JobInstance {
    pub id: String,
    pub job: String,
    pub component: String,
    pub environment: String,
    pub composition: String,
    pub registry_name: String,
    pub path: String,
    pub timeout: String,
    pub retries: u32,
    pub labels: BTreeMap<String, String>,
    pub config: Mapping,
    pub steps: Vec<RenderedStep>,
    pub depends_on: Vec<String>,
}

/// The job id is `{component}@{environment}.{job}`; unique because
/// component and environment names are unique and each instance binds
/// exactly one job.
pub fn job_id(component: &str, environment: &str, job: &str) -> String {
    format!("{component}@{environment}.{job}")
}

/// Bind every component instance to its default job, render step
/// templates, and wire inter-job dependency edges.
pub fn plan_jobs(
    expansion: &BTreeMap<String, Vec<ComponentInstance>>,
    registry: &CompositionRegistry,
) -> Result<HashMap<String, JobInstance>> {
    let mut planner = Planner {
        registry,
        template_cache: HashMap::new(),
    };

    // First pass: one job instance per component instance.
    let mut jobs: HashMap<String, JobInstance> = HashMap::new();
    let mut by_target: HashMap<(String, String), Vec<String>> = HashMap::new();
    for instances in expansion.values() {
        for instance in instances {
            let job = planner.bind(instance)?;
            by_target
                .entry((job.component.clone(), job.environment.clone()))
                .or_default()
                .push(job.id.clone());
            jobs.insert(job.id.clone(), job);
        }
    }

    // Second pass: resolve dependency edges against the jobs that exist,
    // in expansion order so the first failure is the same on every run.
    for instances in expansion.values() {
        for instance in instances {
            let ids = &by_target[&(instance.component.clone(), instance.environment.clone())];
            let id = ids[0].clone();

            let mut resolved = Vec::new();
            let mut seen = HashSet::new();
            for dep in &instance.depends_on {
                let targets = by_target
                    .get(&(dep.component.clone(), dep.environment.clone()))
                    .ok_or_else(|| PlanError::MissingDependency {
                        job: id.clone(),
                        target: dep.component.clone(),
                        environment: dep.environment.clone(),
                    })?;
                for target in targets {
                    if seen.insert(target.clone()) {
                        resolved.push(target.clone());
                    }
                }
            }

            if let Some(job) = jobs.get_mut(&id) {
                job.depends_on = resolved;
            }
        }
    }

    Ok(jobs)
}

struct Planner<'a> {
    registry: &'a CompositionRegistry,
    /// Parsed step templates keyed by (composition, step name); one parse
    /// per composition no matter how many instances bind it.
    template_cache: HashMap<(String, String), Template>,
}

impl<'a> Planner<'a> {
    fn bind(&mut self, instance: &ComponentInstance) -> Result<JobInstance> {
        let composition = self.registry.get(&instance.composition).ok_or_else(|| {
            PlanError::MissingDefaultJob {
                composition: instance.composition.clone(),
            }
        })?;
        let spec = composition
            .default_job()
            .ok_or_else(|| PlanError::MissingDefaultJob {
                composition: instance.composition.clone(),
            })?;

        let id = job_id(&instance.component, &instance.environment, &spec.name);
        let registry_name = composition.registry_name.clone();
        let spec = spec.clone();
        let steps = self.render_steps(instance, &spec, &id)?;

        let mut labels = spec.labels;
        labels.extend(instance.labels.clone());

        Ok(JobInstance {
            id,
            job: spec.name,
            component: instance.component.clone(),
            environment: instance.environment.clone(),
            composition: instance.composition.clone(),
            registry_name,
            path: instance.path.clone(),
            timeout: spec.timeout,
            retries: spec.retries,
            labels,
            config: instance.inputs.clone(),
            steps,
            depends_on: Vec::new(),
        })
    }

    fn render_steps(
        &mut self,
        instance: &ComponentInstance,
        spec: &JobSpec,
        id: &str,
    ) -> Result<Vec<RenderedStep>> {
        let context = step_context(instance);

        let mut steps = Vec::with_capacity(spec.steps.len());
        for step in &spec.steps {
            let key = (instance.composition.clone(), step.name.clone());
            if !self.template_cache.contains_key(&key) {
                let template =
                    Template::parse(&step.run).map_err(|detail| PlanError::TemplateParse {
                        composition: instance.composition.clone(),
                        step: step.name.clone(),
                        detail,
                    })?;
                self.template_cache.insert(key.clone(), template);
            }
            let template = &self.template_cache[&key];

            let run = template.render(&context).map_err(|detail| {
                PlanError::TemplateExec {
                    job: id.to_string(),
                    step: step.name.clone(),
                    detail,
                }
            })?;

            steps.push(RenderedStep {
                name: step.name.clone(),
                run,
                timeout: step.timeout.clone(),
                retry: step.retry,
                on_failure: step.on_failure.clone(),
            });
        }
        Ok(steps)
    }
}

/// Step rendering context: the built-in identity fields plus every merged
/// input with a string key. Built-ins win on collision.
fn step_context(instance: &ComponentInstance) -> HashMap<String, Value> {
    let mut context: HashMap<String, Value> = HashMap::new();
    for (key, value) in &instance.inputs {
        if let Some(key) = key.as_str() {
            context.insert(key.to_string(), value.clone());
        }
    }
    context.insert("Component".to_string(), Value::from(instance.component.as_str()));
    context.insert(
        "Environment".to_string(),
        Value::from(instance.environment.as_str()),
    );
    context.insert("Type".to_string(), Value::from(instance.composition.as_str()));
    context
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composition::load_compositions;
    use crate::expand::expand;
    use crate::normalize::normalize;
    use std::fs;
    use std::path::Path;

    fn write_composition(root: &Path, name: &str, job_yaml: &str) {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("job.yaml"), job_yaml).unwrap();
        fs::write(dir.join("schema.yaml"), "type: object").unwrap();
    }

    fn helm_registry(root: &Path) -> CompositionRegistry {
        write_composition(
            root,
            "helm",
            r#"
kind: JobRegistry
metadata: { name: helm-jobs }
jobs:
  - name: deploy
    timeout: 10m
    retries: 2
    labels: { tier: deploy }
    steps:
      - name: upgrade
        run: "helm upgrade {{.Component}} --env {{.Environment}}"
"#,
        );
        load_compositions(root.to_str().unwrap()).unwrap()
    }

    fn expansion_for(yaml: &str) -> BTreeMap<String, Vec<ComponentInstance>> {
        let intent = normalize(serde_yaml::from_str(yaml).unwrap()).unwrap();
        expand(&intent, None)
    }

    #[test]
    fn test_binds_default_job_and_renders_steps() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = helm_registry(tmp.path());
        let expansion = expansion_for(
            r#"
metadata: { name: app }
environments:
  prod:
    selectors: { components: [web] }
components:
  - name: web
    type: helm
    labels: { team: storefront }
"#,
        );

        let jobs = plan_jobs(&expansion, &registry).unwrap();
        assert_eq!(jobs.len(), 1);
        let job = &jobs["web@prod.deploy"];
        assert_eq!(job.job, "deploy");
        assert_eq!(job.registry_name, "helm-jobs");
        assert_eq!(job.timeout, "10m");
        assert_eq!(job.retries, 2);
        assert_eq!(job.steps[0].run, "helm upgrade web --env prod");
        assert_eq!(job.labels["tier"], "deploy");
        assert_eq!(job.labels["team"], "storefront");
        assert!(job.depends_on.is_empty());
    }

    #[test]
    fn test_dependency_edges_resolve_to_job_ids() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = helm_registry(tmp.path());
        let expansion = expansion_for(
            r#"
metadata: { name: app }
environments:
  prod:
    selectors: { components: [web, db] }
components:
  - name: web
    type: helm
    dependsOn:
      - component: db
  - { name: db, type: helm }
"#,
        );

        let jobs = plan_jobs(&expansion, &registry).unwrap();
        assert_eq!(jobs["web@prod.deploy"].depends_on, vec!["db@prod.deploy"]);
    }

    #[test]
    fn test_duplicate_edges_are_deduplicated() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = helm_registry(tmp.path());
        let expansion = expansion_for(
            r#"
metadata: { name: app }
environments:
  prod:
    selectors: { components: [web, db] }
components:
  - name: web
    type: helm
    dependsOn:
      - component: db
      - { component: db, environment: prod }
  - { name: db, type: helm }
"#,
        );

        let jobs = plan_jobs(&expansion, &registry).unwrap();
        assert_eq!(jobs["web@prod.deploy"].depends_on, vec!["db@prod.deploy"]);
    }

    #[test]
    fn test_missing_dependency_target() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = helm_registry(tmp.path());
        // db is only deployed to staging, so web@prod's explicit prod edge
        // has no target job.
        let expansion = expansion_for(
            r#"
metadata: { name: app }
environments:
  prod:
    selectors: { components: [web] }
  staging:
    selectors: { components: [db] }
components:
  - name: web
    type: helm
    dependsOn:
      - component: db
  - { name: db, type: helm }
"#,
        );

        let err = plan_jobs(&expansion, &registry).unwrap_err();
        assert_eq!(err.kind(), "MissingDependencyError");
        assert!(err.to_string().contains("web@prod.deploy"));
    }

    #[test]
    fn test_template_exec_error_carries_job_and_step() {
        let tmp = tempfile::tempdir().unwrap();
        write_composition(
            tmp.path(),
            "helm",
            r#"
kind: JobRegistry
metadata: { name: helm-jobs }
jobs:
  - name: deploy
    steps:
      - name: upgrade
        run: "helm upgrade {{.release}}"
"#,
        );
        let registry = load_compositions(tmp.path().to_str().unwrap()).unwrap();
        let expansion = expansion_for(
            r#"
metadata: { name: app }
environments:
  prod:
    selectors: { components: [web] }
components:
  - { name: web, type: helm }
"#,
        );

        let err = plan_jobs(&expansion, &registry).unwrap_err();
        assert_eq!(err.kind(), "TemplateExecError");
        let message = err.to_string();
        assert!(message.contains("web@prod.deploy"));
        assert!(message.contains("upgrade"));
    }

    #[test]
    fn test_template_parse_error_carries_composition() {
        let tmp = tempfile::tempdir().unwrap();
        write_composition(
            tmp.path(),
            "helm",
            r#"
kind: JobRegistry
metadata: { name: helm-jobs }
jobs:
  - name: deploy
    steps:
      - name: upgrade
        run: "helm upgrade {{.release"
"#,
        );
        let registry = load_compositions(tmp.path().to_str().unwrap()).unwrap();
        let expansion = expansion_for(
            r#"
metadata: { name: app }
environments:
  prod:
    selectors: { components: [web] }
components:
  - name: web
    type: helm
    inputs: { release: r1 }
"#,
        );

        let err = plan_jobs(&expansion, &registry).unwrap_err();
        assert_eq!(err.kind(), "TemplateParseError");
        assert!(err.to_string().contains("helm"));
    }

    #[test]
    fn test_context_inputs_reach_templates() {
        let tmp = tempfile::tempdir().unwrap();
        write_composition(
            tmp.path(),
            "helm",
            r#"
kind: JobRegistry
metadata: { name: helm-jobs }
jobs:
  - name: deploy
    steps:
      - name: upgrade
        run: "--r {{.replicas}} --reg {{.region}}"
"#,
        );
        let registry = load_compositions(tmp.path().to_str().unwrap()).unwrap();
        let expansion = expansion_for(
            r#"
metadata: { name: app }
groups:
  platform:
    defaults: { replicas: 2, region: us-west-2 }
environments:
  prod:
    selectors: { components: [web] }
    defaults: { replicas: 10 }
components:
  - name: web
    type: helm
    domain: platform
    inputs: { replicas: 5 }
"#,
        );

        let jobs = plan_jobs(&expansion, &registry).unwrap();
        assert_eq!(jobs["web@prod.deploy"].steps[0].run, "--r 5 --reg us-west-2");
    }
}
