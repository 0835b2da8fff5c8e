use colored::*;
use sourceplane_core::CompositionRegistry;
use sourceplane_core::Plan;

/// Print a per-environment job summary for a compiled plan.
pub fn print_plan_summary(plan: &Plan) {
    eprintln!();
    eprintln!(
        "{}",
        format!(
            " Sourceplane v{} — plan '{}'",
            env!("CARGO_PKG_VERSION"),
            plan.metadata.name
        )
        .bold()
    );
    eprintln!();

    let mut environments: Vec<&str> = plan
        .jobs
        .iter()
        .map(|j| j.environment.as_str())
        .collect();
    environments.sort();
    environments.dedup();

    eprintln!(
        " {} {} job(s) across {} environment(s)",
        "|-".dimmed(),
        plan.jobs.len(),
        environments.len()
    );
    eprintln!(
        " {} bindings: {}",
        "|-".dimmed(),
        plan.spec
            .job_bindings
            .iter()
            .map(|(t, r)| format!("{t} -> {r}"))
            .collect::<Vec<_>>()
            .join(", ")
            .cyan()
    );
    eprintln!();

    // Group by environment, keeping each group's internal plan order.
    for environment in &environments {
        eprintln!("   {}", environment.cyan().bold());
        for job in plan.jobs.iter().filter(|j| j.environment == *environment) {
            let deps = if job.depends_on.is_empty() {
                String::new()
            } else {
                format!("  (after {})", job.depends_on.join(", "))
            };
            eprintln!("     {}{}", job.id.bold(), deps.dimmed());
            for step in &job.steps {
                eprintln!("        {} {}", "$".dimmed(), step.run);
            }
        }
    }
    eprintln!();
}

/// Print the discovered compositions with their registries and jobs.
pub fn print_compositions(registry: &CompositionRegistry) {
    eprintln!();
    eprintln!("{}", format!(" {} composition(s)", registry.len()).bold());
    eprintln!();
    for (name, composition) in registry.iter() {
        let jobs: Vec<&str> = composition.jobs.iter().map(|j| j.name.as_str()).collect();
        eprintln!(
            "   {}  registry '{}'  jobs: {}",
            name.bold(),
            composition.registry_name.cyan(),
            jobs.join(", ")
        );
    }
    eprintln!();
}
