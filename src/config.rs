//! Extraction configuration
//!
//! [`WriteOptions`] bundles how an extraction is written; [`load_variable_specs`]
//! reads the requested variables from a JSON file, either a list of paths or an
//! `output_name -> path` object.

use crate::dataset::VariableSpec;
use crate::errors::{Result, SubsetError};
use crate::subset::encoding::{ChunkOverrides, CompressionKind, EncodingPlanner};
use crate::subset::groups::Layout;
use serde_json::Value as JsonValue;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// How an extracted dataset is written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOptions {
    pub layout: Layout,
    pub compression: CompressionKind,
    /// Compression level, 0-9
    pub level: u8,
    pub shuffle: bool,
    /// Store a checksum with every chunk
    pub checksum: bool,
    pub chunk_overrides: ChunkOverrides,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            layout: Layout::Flat,
            compression: CompressionKind::Deflate,
            level: 4,
            shuffle: true,
            checksum: false,
            chunk_overrides: ChunkOverrides::new(),
        }
    }
}

impl WriteOptions {
    /// Uncompressed output with the given layout
    pub fn uncompressed(layout: Layout) -> Self {
        Self {
            layout,
            compression: CompressionKind::None,
            ..Self::default()
        }
    }

    pub fn planner(&self) -> Result<EncodingPlanner> {
        Ok(EncodingPlanner::new(self.compression, self.level)?
            .shuffle(self.shuffle)
            .checksum(self.checksum)
            .chunk_overrides(self.chunk_overrides.clone()))
    }
}

/// Parse variable specs from JSON text.
///
/// Accepts `["PRODUCT/latitude", ...]` or `{"lat": "PRODUCT/latitude", ...}`.
pub fn parse_variable_specs(text: &str) -> Result<Vec<VariableSpec>> {
    let value: JsonValue = serde_json::from_str(text)?;
    let specs = match value {
        JsonValue::Array(items) => {
            let paths = items
                .iter()
                .map(|item| {
                    item.as_str().ok_or_else(|| {
                        SubsetError::config(format!("Expected a variable path string, found {item}"))
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            VariableSpec::from_paths(paths)
        }
        JsonValue::Object(map) => {
            let pairs = map
                .iter()
                .map(|(name, path)| {
                    path.as_str().map(|p| (name.clone(), p)).ok_or_else(|| {
                        SubsetError::config(format!("Path for '{name}' must be a string, found {path}"))
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            VariableSpec::from_mapping(pairs)
        }
        other => {
            return Err(SubsetError::config(format!(
                "Variable spec must be a JSON array or object, found {other}"
            )))
        }
    };
    validate_specs(&specs)?;
    Ok(specs)
}

/// Read variable specs from a JSON file.
pub fn load_variable_specs(path: &Path) -> Result<Vec<VariableSpec>> {
    let text = fs::read_to_string(path)?;
    parse_variable_specs(&text)
}

/// Output names must be unique and paths non-empty.
pub fn validate_specs(specs: &[VariableSpec]) -> Result<()> {
    if specs.is_empty() {
        return Err(SubsetError::config("No variables requested"));
    }
    let mut names = HashSet::with_capacity(specs.len());
    for spec in specs {
        if spec.source_path.is_empty() {
            return Err(SubsetError::config(format!(
                "Variable '{}' has an empty source path",
                spec.output_name
            )));
        }
        if !names.insert(spec.output_name.as_str()) {
            return Err(SubsetError::config(format!(
                "Output name '{}' is requested more than once",
                spec.output_name
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_path_list() {
        let specs = parse_variable_specs(r#"["PRODUCT/latitude", "PRODUCT/longitude"]"#).unwrap();
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[1].output_name, "PRODUCT/longitude");
    }

    #[test]
    fn parses_rename_mapping() {
        let specs = parse_variable_specs(r#"{"lat": "PRODUCT/latitude", "no2": "PRODUCT/nitrogendioxide_tropospheric_column"}"#).unwrap();
        assert_eq!(specs[0].output_name, "lat");
        assert_eq!(specs[1].source_path.name(), "nitrogendioxide_tropospheric_column");
    }

    #[test]
    fn rejects_bad_shapes() {
        assert!(parse_variable_specs("42").is_err());
        assert!(parse_variable_specs("[1, 2]").is_err());
        assert!(parse_variable_specs("[]").is_err());
        assert!(parse_variable_specs(r#"["a", "/a"]"#).is_err());
    }

    #[test]
    fn defaults_match_subset_scripts() {
        let options = WriteOptions::default();
        assert_eq!(options.compression, CompressionKind::Deflate);
        assert_eq!(options.level, 4);
        assert!(options.shuffle);
        assert!(!options.checksum);
    }
}
