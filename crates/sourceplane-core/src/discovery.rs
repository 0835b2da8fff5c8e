use crate::error::{PlanError, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const JOB_FILE: &str = "job.yaml";
pub const SCHEMA_FILE: &str = "schema.yaml";

/// A composition directory found under the compositions root. Either file
/// may be absent here; the loader turns a half-present pair into a
/// `MissingSchemaError`.
#[derive(Debug, Clone)]
pub struct DiscoveredComposition {
    pub name: String,
    pub dir: PathBuf,
    pub job_file: Option<PathBuf>,
    pub schema_file: Option<PathBuf>,
}

/// Scan a compositions root for `job.yaml`/`schema.yaml` pairs.
///
/// A root containing a glob wildcard is expanded, and every matched
/// directory is walked recursively. A plain root is enumerated one level
/// deep: each immediate subdirectory is one candidate composition. In both
/// modes the composition name is the directory that immediately contains
/// the pair.
pub fn discover_compositions(root: &str) -> Result<Vec<DiscoveredComposition>> {
    let mut found: BTreeMap<String, DiscoveredComposition> = BTreeMap::new();

    if root.contains('*') {
        let entries = glob::glob(root).map_err(|e| PlanError::Parse {
            what: format!("compositions glob '{root}'"),
            detail: e.to_string(),
        })?;
        for dir in entries.flatten().filter(|p| p.is_dir()) {
            walk_for_pairs(&dir, &mut found)?;
        }
    } else {
        let entries = std::fs::read_dir(root).map_err(|e| PlanError::Read {
            path: PathBuf::from(root),
            source: e,
        })?;
        for entry in entries {
            let entry = entry.map_err(|e| PlanError::Read {
                path: PathBuf::from(root),
                source: e,
            })?;
            let dir = entry.path();
            if dir.is_dir() {
                record_dir(&dir, &mut found);
            }
        }
    }

    Ok(found.into_values().collect())
}

fn walk_for_pairs(
    dir: &Path,
    found: &mut BTreeMap<String, DiscoveredComposition>,
) -> Result<()> {
    record_dir(dir, found);

    let entries = std::fs::read_dir(dir).map_err(|e| PlanError::Read {
        path: dir.to_path_buf(),
        source: e,
    })?;
    for entry in entries {
        let entry = entry.map_err(|e| PlanError::Read {
            path: dir.to_path_buf(),
            source: e,
        })?;
        let path = entry.path();
        if path.is_dir() {
            walk_for_pairs(&path, found)?;
        }
    }
    Ok(())
}

fn record_dir(dir: &Path, found: &mut BTreeMap<String, DiscoveredComposition>) {
    let job_file = dir.join(JOB_FILE);
    let schema_file = dir.join(SCHEMA_FILE);
    if !job_file.is_file() && !schema_file.is_file() {
        return;
    }

    let name = dir
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown")
        .to_string();

    found.insert(
        name.clone(),
        DiscoveredComposition {
            name,
            dir: dir.to_path_buf(),
            job_file: job_file.is_file().then_some(job_file),
            schema_file: schema_file.is_file().then_some(schema_file),
        },
    );
}
