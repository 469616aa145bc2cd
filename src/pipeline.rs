use crate::aggregate::HourlyAggregator;
use crate::city;
use crate::config::PipelineConfig;
use crate::error::{AppError, Result};
use crate::flatten::{flatten, Flattened};
use crate::merge::{has_usable_values, merge};
use crate::metrics::enrich;
use crate::model::{CanonicalRow, EnrichedRow};
use crate::output::write_artifact;
use crate::shape::{detect, ShapeKind};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub files_seen: usize,
    pub files_with_rows: usize,
    pub rows_written: usize,
    pub output_file: PathBuf,
}

pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Normalize every raw file under the configured directory and write the
    /// artifact. No input files still yields a header-only artifact.
    pub fn run(&self) -> Result<RunSummary> {
        let files = discover_raw_files(
            &self.config.raw_dir,
            &self.config.file_pattern,
            &self.config.extensions,
        )?;

        if files.is_empty() {
            warn!(
                "No raw files matching '{}' found in {}",
                self.config.file_pattern,
                self.config.raw_dir.display()
            );
        }

        self.run_files(files)
    }

    /// Normalize an explicit set of files. Paths are sorted first so output
    /// does not depend on the order they were supplied in.
    pub fn run_files(&self, paths: Vec<PathBuf>) -> Result<RunSummary> {
        let files_seen = paths.len();
        let (rows, files_with_rows) = transform(paths);

        write_artifact(&self.config.output_file, &rows)?;

        let summary = RunSummary {
            files_seen,
            files_with_rows,
            rows_written: rows.len(),
            output_file: self.config.output_file.clone(),
        };
        info!(
            "Transformed data saved to {} (files={}, contributing={}, rows={})",
            summary.output_file.display(),
            summary.files_seen,
            summary.files_with_rows,
            summary.rows_written
        );
        Ok(summary)
    }
}

/// Sort, normalize, merge, and enrich. Returns the rows and the number of
/// files that contributed at least one row.
pub fn transform(mut paths: Vec<PathBuf>) -> (Vec<EnrichedRow>, usize) {
    paths.sort();
    paths.dedup();

    let per_file: Vec<Vec<CanonicalRow>> = paths
        .iter()
        .map(|path| normalize_file(path, None))
        .collect();
    let contributing = per_file
        .iter()
        .filter(|rows| rows.iter().any(has_usable_values))
        .count();

    let rows = merge(per_file).into_iter().map(enrich).collect();
    (rows, contributing)
}

/// Read and normalize one file. Unreadable or malformed files produce no
/// rows rather than an error.
pub fn normalize_file(path: &Path, city_override: Option<&str>) -> Vec<CanonicalRow> {
    match read_payload(path) {
        Ok(payload) => normalize_payload(&payload, path, city_override),
        Err(e) => {
            warn!("Skipping {}: {}", path.display(), e);
            Vec::new()
        }
    }
}

pub fn normalize_payload(
    payload: &Value,
    path: &Path,
    city_override: Option<&str>,
) -> Vec<CanonicalRow> {
    let shape = detect(payload);
    let city = city::resolve(payload, path, city_override);
    let flattened = flatten(payload, shape, &city);

    debug!(
        "{}: shape {:?}, city '{}', {} flattened records",
        path.display(),
        shape,
        city,
        flattened.len()
    );

    if flattened.is_empty() {
        if shape == ShapeKind::Unknown {
            warn!("Unrecognised payload structure in {}, no measurements found", path.display());
        } else {
            warn!("No usable records in {} ({:?})", path.display(), shape);
        }
        return Vec::new();
    }

    let mut aggregator = HourlyAggregator::new();
    match flattened {
        Flattened::Rows(rows) => rows.into_iter().for_each(|row| aggregator.push_row(row)),
        Flattened::Tuples(tuples) => aggregator.extend(tuples),
    }

    let (rows, stats) = aggregator.finish();
    if stats.dropped_time > 0 || stats.dropped_value > 0 {
        debug!(
            "{}: dropped {} readings with unparseable time, {} with unparseable value",
            path.display(),
            stats.dropped_time,
            stats.dropped_value
        );
    }
    rows
}

fn read_payload(path: &Path) -> Result<Value> {
    let content = fs::read_to_string(path)?;
    let payload = serde_json::from_str(content.trim_start_matches('\u{feff}'))?;
    Ok(payload)
}

/// List files in `dir` whose name matches `pattern` and whose extension is
/// one of `extensions`, sorted by path. A missing directory yields nothing.
pub fn discover_raw_files(dir: &Path, pattern: &str, extensions: &[String]) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        warn!("Raw data directory {} does not exist", dir.display());
        return Ok(Vec::new());
    }

    let pattern = glob::Pattern::new(pattern)
        .map_err(|e| AppError::Config(format!("Invalid file pattern '{}': {}", pattern, e)))?;

    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }

        let name_matches = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|name| pattern.matches(name));
        let extension_allowed = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| extensions.iter().any(|allowed| allowed.eq_ignore_ascii_case(ext)));

        if name_matches && extension_allowed {
            files.push(path);
        }
    }

    files.sort();
    info!("Found {} raw files in {}", files.len(), dir.display());
    Ok(files)
}
