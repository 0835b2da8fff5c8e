use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PlanError>;

/// Every failure the planning pipeline can produce. The pipeline is
/// fail-fast: the first error aborts the run and no artifact is written.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("failed to read '{path}'")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {what}: {detail}")]
    Parse { what: String, detail: String },

    #[error("job registry for composition '{composition}' declares no jobs")]
    EmptyRegistry { composition: String },

    #[error("composition '{composition}' is missing '{file}'")]
    MissingSchema { composition: String, file: String },

    #[error("no compositions found under '{root}'")]
    EmptyCompositions { root: String },

    #[error("component '{component}' references unknown composition type '{composition}'")]
    UnknownType {
        component: String,
        composition: String,
    },

    #[error(
        "component '{component}' failed validation against composition '{composition}': {detail}"
    )]
    SchemaValidation {
        component: String,
        composition: String,
        detail: String,
    },

    #[error("invalid template in step '{step}' of composition '{composition}': {detail}")]
    TemplateParse {
        composition: String,
        step: String,
        detail: String,
    },

    #[error("failed to render step '{step}' of job '{job}': {detail}")]
    TemplateExec {
        job: String,
        step: String,
        detail: String,
    },

    #[error("composition '{composition}' has no default job")]
    MissingDefaultJob { composition: String },

    #[error("job '{job}' depends on component '{target}' in environment '{environment}', which produced no job")]
    MissingDependency {
        job: String,
        target: String,
        environment: String,
    },

    #[error("dependency cycle detected: {path}")]
    Cycle { path: String },

    #[error("failed to serialize plan: {detail}")]
    Serialize { detail: String },

    #[error("failed to write plan to '{path}'")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PlanError {
    /// Stable machine-readable kind, for frontends that route on error class
    /// rather than message text.
    pub fn kind(&self) -> &'static str {
        match self {
            PlanError::Read { .. } => "ReadError",
            PlanError::Parse { .. } => "ParseError",
            PlanError::EmptyRegistry { .. } => "EmptyRegistryError",
            PlanError::MissingSchema { .. } => "MissingSchemaError",
            PlanError::EmptyCompositions { .. } => "EmptyCompositionError",
            PlanError::UnknownType { .. } => "UnknownTypeError",
            PlanError::SchemaValidation { .. } => "SchemaValidationError",
            PlanError::TemplateParse { .. } => "TemplateParseError",
            PlanError::TemplateExec { .. } => "TemplateExecError",
            PlanError::MissingDefaultJob { .. } => "MissingDefaultJobError",
            PlanError::MissingDependency { .. } => "MissingDependencyError",
            PlanError::Cycle { .. } => "CycleError",
            PlanError::Serialize { .. } => "SerializeError",
            PlanError::Write { .. } => "WriteError",
        }
    }
}
