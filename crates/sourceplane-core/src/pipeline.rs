use crate::composition::load_compositions;
use crate::error::Result;
use crate::expand::expand;
use crate::graph::JobGraph;
use crate::intent::load_intent;
use crate::normalize::normalize;
use crate::planner::plan_jobs;
use crate::render::{build_plan, Plan};
use crate::validate::validate_components;
use std::path::Path;

/// Compile an intent document plus a compositions root into a fully
/// materialized plan. The six stages run in sequence and the first error
/// aborts the run; no artifact is produced on failure.
pub fn compile(intent_path: &Path, compositions_root: &str) -> Result<Plan> {
    compile_for_environment(intent_path, compositions_root, "")
}

/// Like [`compile`], but with a non-empty `environment` the expansion is
/// restricted to that single environment.
pub fn compile_for_environment(
    intent_path: &Path,
    compositions_root: &str,
    environment: &str,
) -> Result<Plan> {
    let registry = load_compositions(compositions_root)?;
    let raw = load_intent(intent_path)?;
    let intent = normalize(raw)?;
    validate_components(&intent, &registry)?;

    let filter = (!environment.is_empty()).then_some(environment);
    let expansion = expand(&intent, filter);
    let jobs = plan_jobs(&expansion, &registry)?;

    let graph = JobGraph::build(&jobs);
    graph.check_cycles()?;
    let order = graph.topological_order()?;

    Ok(build_plan(&intent.intent.metadata, &registry, &jobs, &order))
}
