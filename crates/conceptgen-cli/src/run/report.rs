use std::fs::{OpenOptions, create_dir_all};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use conceptgen_engine::ModelLibrary;
use indexmap::IndexMap;
use serde::Serialize;

use super::{RunError, RunResult};

/// Metadata captured when a generation run starts.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub blueprint: PathBuf,
    pub slug: String,
    pub concept: String,
    pub count: usize,
}

/// JSON summary of one generation run.
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub started_at: String,
    pub blueprint: String,
    pub slug: String,
    pub concept: String,
    pub count: usize,
    /// Record ids (`Entity#key`) grouped by library alias.
    pub records: IndexMap<String, Vec<String>>,
    pub actions: usize,
    pub rolled_back: bool,
    pub duration_ms: u64,
}

impl RunReport {
    pub fn new(
        ctx: &RunContext,
        library: &ModelLibrary,
        actions: usize,
        rolled_back: bool,
        duration_ms: u64,
    ) -> Self {
        let records = library
            .iter()
            .map(|(alias, value)| {
                let ids = value.ids().iter().map(ToString::to_string).collect();
                (alias.to_string(), ids)
            })
            .collect();

        Self {
            run_id: ctx.run_id.clone(),
            started_at: ctx.started_at.to_rfc3339(),
            blueprint: ctx.blueprint.display().to_string(),
            slug: ctx.slug.clone(),
            concept: ctx.concept.clone(),
            count: ctx.count,
            records,
            actions,
            rolled_back,
            duration_ms,
        }
    }
}

pub fn write_report(path: &Path, report: &RunReport) -> RunResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            create_dir_all(parent)?;
        }
    }
    let file = OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .open(path)?;
    serde_json::to_writer_pretty(file, report).map_err(RunError::from)
}
