//! Schema and query source loading
//!
//! A schema source is either one SQL file or a folder of migrations. For a
//! folder only the "up" section of each `.sql` file is kept, in file name
//! order.

use anyhow::{Context, Result};
use mangosql_core::InputConfig;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Read the DDL text for a schema source
pub fn load_schema(src: &Path, input: &InputConfig) -> Result<String> {
    if src.is_dir() {
        return load_migration_folder(src, input);
    }

    std::fs::read_to_string(src)
        .with_context(|| format!("Failed to read schema file {}", src.display()))
}

/// Read the query file belonging to a schema source, or `""` if there is none
pub fn load_queries(src: &Path, input: &InputConfig) -> Result<String> {
    let path = queries_path(src, input);
    if !path.is_file() {
        tracing::debug!(path = %path.display(), "No query file found");
        return Ok(String::new());
    }

    std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read query file {}", path.display()))
}

/// The query file sits inside a migration folder, or next to a schema file
pub fn queries_path(src: &Path, input: &InputConfig) -> PathBuf {
    let folder = if src.is_dir() {
        src
    } else {
        src.parent().unwrap_or_else(|| Path::new("."))
    };
    folder.join(&input.queries_file)
}

fn load_migration_folder(folder: &Path, input: &InputConfig) -> Result<String> {
    let mut files = Vec::new();
    for entry in WalkDir::new(folder)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.with_context(|| format!("Failed to list {}", folder.display()))?;
        let path = entry.path();

        if !entry.file_type().is_file() || path.extension().map_or(true, |ext| ext != "sql") {
            continue;
        }
        if entry.file_name() == input.queries_file.as_str() {
            continue;
        }
        files.push(path.to_path_buf());
    }

    let mut sections = Vec::new();
    for path in files {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read migration {}", path.display()))?;
        let section = up_section(&content, &input.up_marker, &input.down_marker);
        tracing::debug!(
            path = %path.display(),
            bytes = section.len(),
            "Loaded migration"
        );
        sections.push(section.trim().to_string());
    }

    Ok(sections.join("\n"))
}

/// The "up" part of a migration file
///
/// No up marker yields nothing; no down marker yields everything after the
/// up marker. A down marker placed first yields the text between the two.
pub fn up_section<'a>(content: &'a str, up_marker: &str, down_marker: &str) -> &'a str {
    let Some(up) = content.find(up_marker) else {
        return "";
    };
    let up_end = up + up_marker.len();

    match content.find(down_marker) {
        None => &content[up_end..],
        Some(down) if up < down => &content[up_end..down],
        Some(down) => &content[down + down_marker.len()..up],
    }
}
