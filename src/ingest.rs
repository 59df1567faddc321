//! Reading source files into [`SourceRecord`]s.
//!
//! | extension                 | records                                   |
//! |---------------------------|-------------------------------------------|
//! | `json`                    | an array yields one record per element, anything else one record |
//! | `jsonl`                   | one record per non-empty line             |
//! | `yaml`, `yml`             | one record per document                   |
//! | `md`, `markdown`, `txt`   | one `{content: <text>}` record            |
//!
//! Directories are walked recursively with hidden entries skipped and files visited in path
//! order; files with other extensions are ignored there, but naming one explicitly is an error.

use serde::Deserialize;
use serde_json::{json, Value};
use std::{
    fs::{metadata, read_to_string},
    path::{Path, PathBuf},
    time::UNIX_EPOCH,
};
use walkdir::{DirEntry, WalkDir};

use crate::{
    error::WeaveError,
    record::{Provenance, SourceRecord},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Json,
    JsonLines,
    Yaml,
    Text,
}

impl SourceFormat {
    pub fn from_path(path: &Path) -> Option<SourceFormat> {
        match path.extension()?.to_str()?.to_ascii_lowercase().as_str() {
            "json" => Some(SourceFormat::Json),
            "jsonl" | "ndjson" => Some(SourceFormat::JsonLines),
            "yaml" | "yml" => Some(SourceFormat::Yaml),
            "md" | "markdown" | "txt" => Some(SourceFormat::Text),
            _ => None,
        }
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|s| s.starts_with('.'))
        .unwrap_or(false)
}

/// Expand files and directories into the ordered list of source files.
pub fn source_files<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<PathBuf>, WeaveError> {
    let mut files = Vec::new();
    for path in paths {
        let path = path.as_ref();
        if path.is_file() {
            if SourceFormat::from_path(path).is_none() {
                return Err(WeaveError::Config(format!(
                    "unsupported source format for {path:?}"
                )));
            }
            files.push(path.to_path_buf());
            continue;
        }
        if !path.is_dir() {
            return Err(WeaveError::NotFound(format!("{path:?}")));
        }
        let mut found = WalkDir::new(path)
            .into_iter()
            .filter_entry(|e| !is_hidden(e) || e.path() == path)
            .filter_map(|e| e.ok().map(|e| e.into_path()))
            .filter(|p| p.is_file() && SourceFormat::from_path(p).is_some())
            .collect::<Vec<PathBuf>>();
        found.sort_by(|a, b| a.components().cmp(b.components()));
        files.extend(found);
    }
    Ok(files)
}

/// Read every record from `paths`, in file order and then in-file order.
pub fn read_sources<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<SourceRecord>, WeaveError> {
    let mut records = Vec::new();
    for file in source_files(paths)? {
        let before = records.len();
        records.extend(read_file(&file)?);
        tracing::debug!(
            "[read_sources] {:?}: {} records",
            file,
            records.len() - before
        );
    }
    tracing::info!("[read_sources] read {} records", records.len());
    Ok(records)
}

/// Read the records of a single file.
pub fn read_file(path: &Path) -> Result<Vec<SourceRecord>, WeaveError> {
    let format = SourceFormat::from_path(path)
        .ok_or_else(|| WeaveError::Config(format!("unsupported source format for {path:?}")))?;
    let content = read_to_string(path)?;
    let mut base = Provenance::new(path.to_string_lossy());
    base.modified = metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs());
    parse_records(&content, format, &base)
}

/// Split `content` into records. `base` carries the file-level provenance; per-record size and
/// hash are computed from each record's own text.
pub fn parse_records(
    content: &str,
    format: SourceFormat,
    base: &Provenance,
) -> Result<Vec<SourceRecord>, WeaveError> {
    match format {
        SourceFormat::Json => match serde_json::from_str::<Value>(content)? {
            Value::Array(items) => items
                .into_iter()
                .enumerate()
                .map(|(index, item)| {
                    let raw = serde_json::to_string(&item)?;
                    Ok::<_, WeaveError>(SourceRecord::new(
                        item,
                        base.clone().with_index(index).with_content(&raw),
                    ))
                })
                .collect(),
            value => Ok(vec![SourceRecord::new(
                value,
                base.clone().with_content(content),
            )]),
        },
        SourceFormat::JsonLines => {
            let mut records = Vec::new();
            for (line_idx, line) in content.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                let value = serde_json::from_str::<Value>(line).map_err(|e| {
                    WeaveError::Serialization(format!(
                        "{}:{}: {e}",
                        base.source_path,
                        line_idx + 1
                    ))
                })?;
                let mut meta = base.clone().with_index(records.len()).with_content(line);
                meta.line = Some(line_idx + 1);
                records.push(SourceRecord::new(value, meta));
            }
            Ok(records)
        }
        SourceFormat::Yaml => {
            let mut records = Vec::new();
            for document in serde_yaml::Deserializer::from_str(content) {
                let value = Value::deserialize(document)?;
                if value.is_null() {
                    continue;
                }
                let raw = serde_json::to_string(&value)?;
                let meta = base.clone().with_index(records.len()).with_content(&raw);
                records.push(SourceRecord::new(value, meta));
            }
            Ok(records)
        }
        SourceFormat::Text => Ok(vec![SourceRecord::new(
            json!({ "content": content }),
            base.clone().with_content(content),
        )]),
    }
}
