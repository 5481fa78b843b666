//! In-memory data model for an extraction
//!
//! A [`Dataset`] is the flat, ordered set of arrays pulled out of a source container,
//! keyed by output name. Arrays keep their raw stored values, their dimension names,
//! their attributes and, when the source exposes one, their native chunk layout.

use crate::errors::{Result, SubsetError};
use chrono::Utc;
use indexmap::IndexMap;
use ndarray::ArrayD;
use netcdf::AttributeValue;
use std::fmt;

/// Ordered attribute mapping
pub type Attributes = IndexMap<String, AttributeValue>;

/// Fixed metadata convention tag written to every output file
pub const CONVENTIONS: &str = "CF-1.8";

/// "/"-delimited path into a container's group tree
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct VariablePath(String);

impl VariablePath {
    pub fn new(path: impl AsRef<str>) -> Self {
        Self(path.as_ref().trim_matches('/').to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Group part of the path, empty for root-level variables
    pub fn group(&self) -> &str {
        self.0.rsplit_once('/').map(|(group, _)| group).unwrap_or("")
    }

    /// Variable name, the last path segment
    pub fn name(&self) -> &str {
        self.0.rsplit_once('/').map(|(_, name)| name).unwrap_or(&self.0)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for VariablePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for VariablePath {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

/// One requested variable: where to read it and what to call it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableSpec {
    pub output_name: String,
    pub source_path: VariablePath,
}

impl VariableSpec {
    pub fn new(output_name: impl Into<String>, source_path: impl AsRef<str>) -> Self {
        Self {
            output_name: output_name.into(),
            source_path: VariablePath::new(source_path),
        }
    }

    /// Specs for a plain list of paths; each path is also its output name.
    pub fn from_paths<I, S>(paths: I) -> Vec<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        paths
            .into_iter()
            .map(|p| {
                let path = VariablePath::new(p);
                Self {
                    output_name: path.as_str().to_string(),
                    source_path: path,
                }
            })
            .collect()
    }

    /// Specs for an `output_name -> source_path` mapping.
    pub fn from_mapping<I, K, V>(mapping: I) -> Vec<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: AsRef<str>,
    {
        mapping
            .into_iter()
            .map(|(name, path)| Self::new(name, path))
            .collect()
    }
}

/// Typed raw values of one array, exactly as stored in the source
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayValues {
    I8(ArrayD<i8>),
    U8(ArrayD<u8>),
    I16(ArrayD<i16>),
    U16(ArrayD<u16>),
    I32(ArrayD<i32>),
    U32(ArrayD<u32>),
    I64(ArrayD<i64>),
    U64(ArrayD<u64>),
    F32(ArrayD<f32>),
    F64(ArrayD<f64>),
    Str(ArrayD<String>),
}

macro_rules! each_values {
    ($values:expr, $arr:ident => $body:expr) => {
        match $values {
            ArrayValues::I8($arr) => $body,
            ArrayValues::U8($arr) => $body,
            ArrayValues::I16($arr) => $body,
            ArrayValues::U16($arr) => $body,
            ArrayValues::I32($arr) => $body,
            ArrayValues::U32($arr) => $body,
            ArrayValues::I64($arr) => $body,
            ArrayValues::U64($arr) => $body,
            ArrayValues::F32($arr) => $body,
            ArrayValues::F64($arr) => $body,
            ArrayValues::Str($arr) => $body,
        }
    };
}

impl ArrayValues {
    pub fn shape(&self) -> &[usize] {
        each_values!(self, arr => arr.shape())
    }

    pub fn ndim(&self) -> usize {
        self.shape().len()
    }

    pub fn len(&self) -> usize {
        each_values!(self, arr => arr.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::I8(_) => "i8",
            Self::U8(_) => "u8",
            Self::I16(_) => "i16",
            Self::U16(_) => "u16",
            Self::I32(_) => "i32",
            Self::U32(_) => "u32",
            Self::I64(_) => "i64",
            Self::U64(_) => "u64",
            Self::F32(_) => "f32",
            Self::F64(_) => "f64",
            Self::Str(_) => "string",
        }
    }

    pub fn is_string(&self) -> bool {
        matches!(self, Self::Str(_))
    }
}

/// Native chunk layout of a source array, one list of chunk extents per dimension
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeChunking {
    per_dim: Vec<Vec<usize>>,
}

impl NativeChunking {
    /// Layout from explicit per-dimension chunk extents.
    pub fn from_dim_chunks(per_dim: Vec<Vec<usize>>) -> Self {
        Self { per_dim }
    }

    /// Regular grid of `chunk` sized blocks over an array of `shape`.
    pub fn regular(shape: &[usize], chunk: &[usize]) -> Self {
        let per_dim = shape
            .iter()
            .zip(chunk)
            .map(|(&len, &size)| {
                let size = size.max(1);
                let mut chunks = vec![size; len / size];
                if len % size != 0 {
                    chunks.push(len % size);
                }
                chunks
            })
            .collect();
        Self { per_dim }
    }

    pub fn dim_chunks(&self) -> &[Vec<usize>] {
        &self.per_dim
    }

    /// One chunk size per dimension.
    ///
    /// A regular grid (equal chunks, possibly a smaller trailing one) resolves to its
    /// chunk size; a dimension whose chunks vary collapses to the largest extent.
    pub fn chunk_shape(&self) -> Vec<usize> {
        self.per_dim
            .iter()
            .map(|chunks| {
                let Some((&first, rest)) = chunks.split_first() else {
                    return 1;
                };
                let regular = match rest.split_last() {
                    None => true,
                    Some((&last, middle)) => middle.iter().all(|&c| c == first) && last <= first,
                };
                if regular {
                    first.max(1)
                } else {
                    chunks.iter().copied().max().unwrap_or(1).max(1)
                }
            })
            .collect()
    }
}

/// One named array: values, dimension names, attributes
#[derive(Debug, Clone, PartialEq)]
pub struct DataArray {
    pub values: ArrayValues,
    pub dims: Vec<String>,
    pub attrs: Attributes,
    pub source: VariablePath,
    native_chunks: Option<NativeChunking>,
}

impl DataArray {
    pub fn new(values: ArrayValues, dims: Vec<String>) -> Result<Self> {
        if values.ndim() != dims.len() {
            return Err(SubsetError::config(format!(
                "{} dimension names given for a {}-dimensional array",
                dims.len(),
                values.ndim()
            )));
        }
        Ok(Self {
            values,
            dims,
            attrs: Attributes::new(),
            source: VariablePath::default(),
            native_chunks: None,
        })
    }

    pub fn with_attrs(mut self, attrs: Attributes) -> Self {
        self.attrs = attrs;
        self
    }

    pub fn with_source(mut self, source: VariablePath) -> Self {
        self.source = source;
        self
    }

    pub fn with_native_chunking(mut self, chunks: NativeChunking) -> Self {
        self.native_chunks = Some(chunks);
        self
    }

    pub fn shape(&self) -> &[usize] {
        self.values.shape()
    }

    /// `(dimension name, length)` pairs in dimension order
    pub fn dim_sizes(&self) -> impl Iterator<Item = (&str, usize)> + '_ {
        self.dims
            .iter()
            .map(String::as_str)
            .zip(self.shape().iter().copied())
    }

    /// True when `name` is one of this array's own dimension names.
    pub fn is_dimension_coordinate(&self, name: &str) -> bool {
        self.dims.iter().any(|d| d == name)
    }

    pub fn has_native_chunking(&self) -> bool {
        self.native_chunks.is_some()
    }

    pub fn native_chunk_shape(&self) -> Option<Vec<usize>> {
        self.native_chunks.as_ref().map(NativeChunking::chunk_shape)
    }
}

/// Provenance attached to every written file
#[derive(Debug, Clone)]
pub struct Provenance {
    pub source_file: String,
    pub software: String,
}

impl Provenance {
    pub fn new(source_file: impl Into<String>) -> Self {
        Self {
            source_file: source_file.into(),
            software: format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Ordered collection of extracted arrays plus global attributes
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    arrays: IndexMap<String, DataArray>,
    pub attrs: Attributes,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_attrs(attrs: Attributes) -> Self {
        Self {
            arrays: IndexMap::new(),
            attrs,
        }
    }

    /// Insert an array, returning any array previously stored under `name`.
    pub fn insert(&mut self, name: impl Into<String>, array: DataArray) -> Option<DataArray> {
        self.arrays.insert(name.into(), array)
    }

    pub fn get(&self, name: &str) -> Option<&DataArray> {
        self.arrays.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.arrays.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.arrays.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &DataArray)> + '_ {
        self.arrays.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.arrays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arrays.is_empty()
    }

    /// Append provenance to the global attributes.
    ///
    /// `history` gets a new first line; `Conventions` is always overwritten.
    pub fn append_provenance(&mut self, provenance: &Provenance) {
        let line = format!(
            "{}: created by {} from {}",
            Utc::now().to_rfc3339(),
            provenance.software,
            provenance.source_file
        );
        let history = match self.attrs.get("history") {
            Some(AttributeValue::Str(previous)) if !previous.is_empty() => {
                format!("{line}\n{previous}")
            }
            _ => line,
        };
        self.attrs.insert(
            "source_file".to_string(),
            AttributeValue::Str(provenance.source_file.clone()),
        );
        self.attrs
            .insert("history".to_string(), AttributeValue::Str(history));
        self.attrs.insert(
            "Conventions".to_string(),
            AttributeValue::Str(CONVENTIONS.to_string()),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::IxDyn;

    fn f32_array(shape: &[usize]) -> ArrayValues {
        let n = shape.iter().product();
        ArrayValues::F32(ArrayD::from_shape_vec(IxDyn(shape), vec![0.0; n]).unwrap())
    }

    #[test]
    fn variable_path_splits_group_and_name() {
        let path = VariablePath::new("/PRODUCT/SUPPORT_DATA/GEOLOCATIONS/solar_zenith_angle");
        assert_eq!(path.group(), "PRODUCT/SUPPORT_DATA/GEOLOCATIONS");
        assert_eq!(path.name(), "solar_zenith_angle");

        let root = VariablePath::new("time");
        assert_eq!(root.group(), "");
        assert_eq!(root.name(), "time");
    }

    #[test]
    fn specs_from_paths_use_path_as_name() {
        let specs = VariableSpec::from_paths(["PRODUCT/latitude", "/time"]);
        assert_eq!(specs[0].output_name, "PRODUCT/latitude");
        assert_eq!(specs[1].output_name, "time");
    }

    #[test]
    fn dims_must_match_rank() {
        assert!(DataArray::new(f32_array(&[2, 3]), vec!["x".into()]).is_err());
        assert!(DataArray::new(f32_array(&[2, 3]), vec!["x".into(), "y".into()]).is_ok());
    }

    #[test]
    fn regular_native_chunks_keep_their_size() {
        let chunks = NativeChunking::regular(&[10, 4], &[3, 4]);
        assert_eq!(chunks.dim_chunks()[0], vec![3, 3, 3, 1]);
        assert_eq!(chunks.chunk_shape(), vec![3, 4]);
    }

    #[test]
    fn varying_native_chunks_collapse_to_max() {
        let chunks = NativeChunking::from_dim_chunks(vec![vec![2, 5, 3], vec![4]]);
        assert_eq!(chunks.chunk_shape(), vec![5, 4]);
    }

    #[test]
    fn provenance_prepends_history() {
        let mut attrs = Attributes::new();
        attrs.insert("history".into(), AttributeValue::Str("original".into()));
        let mut ds = Dataset::with_attrs(attrs);
        ds.append_provenance(&Provenance::new("S5P_NO2.nc"));

        match ds.attrs.get("history") {
            Some(AttributeValue::Str(h)) => {
                assert!(h.ends_with("\noriginal"));
                assert!(h.contains("S5P_NO2.nc"));
            }
            other => panic!("unexpected history {other:?}"),
        }
        assert_eq!(
            ds.attrs.get("Conventions"),
            Some(&AttributeValue::Str(CONVENTIONS.into()))
        );
    }
}
