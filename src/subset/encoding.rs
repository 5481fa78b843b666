//! Storage encoding planning
//!
//! Decides, per output variable, which compression filter, shuffle/checksum flags and
//! chunk shape the sink should apply. Nothing here compresses anything; the plan is
//! handed to a [`crate::data_source::ContainerSink`].

use crate::dataset::DataArray;
use crate::errors::{Result, SubsetError};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Compression algorithm requested for an output file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionKind {
    /// Store data as-is; produces an empty plan
    None,
    #[default]
    Deflate,
    Lzf,
    Gzip,
    Szip,
}

/// Concrete filter parameters for one variable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
    Deflate { level: u8 },
    Lzf,
    Gzip { level: u8 },
    Szip { pixels_per_block: u8 },
}

impl Filter {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Deflate { .. } => "deflate",
            Self::Lzf => "lzf",
            Self::Gzip { .. } => "gzip",
            Self::Szip { .. } => "szip",
        }
    }

    /// Deflate level for filters that are zlib underneath
    pub fn deflate_level(&self) -> Option<u8> {
        match *self {
            Self::Deflate { level } | Self::Gzip { level } => Some(level),
            Self::Lzf | Self::Szip { .. } => None,
        }
    }
}

struct CompressionScheme {
    kind: CompressionKind,
    names: &'static [&'static str],
    filter: fn(u8) -> Filter,
}

fn deflate(level: u8) -> Filter {
    Filter::Deflate { level }
}

fn lzf(_level: u8) -> Filter {
    Filter::Lzf
}

fn gzip(level: u8) -> Filter {
    Filter::Gzip { level }
}

fn szip(_level: u8) -> Filter {
    Filter::Szip {
        pixels_per_block: 32,
    }
}

static COMPRESSION_SCHEMES: [CompressionScheme; 4] = [
    CompressionScheme {
        kind: CompressionKind::Deflate,
        names: &["deflate", "zlib"],
        filter: deflate,
    },
    CompressionScheme {
        kind: CompressionKind::Lzf,
        names: &["lzf"],
        filter: lzf,
    },
    CompressionScheme {
        kind: CompressionKind::Gzip,
        names: &["gzip"],
        filter: gzip,
    },
    CompressionScheme {
        kind: CompressionKind::Szip,
        names: &["szip"],
        filter: szip,
    },
];

impl CompressionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Deflate => "deflate",
            Self::Lzf => "lzf",
            Self::Gzip => "gzip",
            Self::Szip => "szip",
        }
    }

    /// Filter for `level`, or `None` for [`CompressionKind::None`]
    pub fn filter(self, level: u8) -> Option<Filter> {
        COMPRESSION_SCHEMES
            .iter()
            .find(|scheme| scheme.kind == self)
            .map(|scheme| (scheme.filter)(level))
    }
}

impl fmt::Display for CompressionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CompressionKind {
    type Err = SubsetError;

    fn from_str(s: &str) -> Result<Self> {
        let name = s.trim().to_ascii_lowercase();
        if name == "none" {
            return Ok(Self::None);
        }
        COMPRESSION_SCHEMES
            .iter()
            .find(|scheme| scheme.names.contains(&name.as_str()))
            .map(|scheme| scheme.kind)
            .ok_or_else(|| {
                let valid: Vec<&str> = std::iter::once("none")
                    .chain(COMPRESSION_SCHEMES.iter().flat_map(|s| s.names.iter().copied()))
                    .collect();
                SubsetError::config(format!(
                    "Unsupported compression: {s}. Valid options: {}",
                    valid.join(", ")
                ))
            })
    }
}

/// Storage parameters for one variable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableEncoding {
    pub filter: Filter,
    pub shuffle: bool,
    pub checksum: bool,
    pub chunk_shape: Option<Vec<usize>>,
}

/// `output_name -> encoding`; variables without an entry are written unencoded
pub type EncodingPlan = IndexMap<String, VariableEncoding>;

/// `output_name -> dimension -> chunk size`
pub type ChunkOverrides = HashMap<String, HashMap<String, usize>>;

/// Variable handed to the planner: its output name, its name inside the output group,
/// and the array itself
#[derive(Debug, Clone, Copy)]
pub struct PlannedVariable<'a> {
    pub output_name: &'a str,
    pub local_name: &'a str,
    pub array: &'a DataArray,
}

/// Computes an [`EncodingPlan`] from compression settings
#[derive(Debug, Clone)]
pub struct EncodingPlanner {
    kind: CompressionKind,
    level: u8,
    shuffle: bool,
    checksum: bool,
    overrides: ChunkOverrides,
}

impl EncodingPlanner {
    pub fn new(kind: CompressionKind, level: u8) -> Result<Self> {
        if level > 9 {
            return Err(SubsetError::config(format!(
                "Compression level {level} is outside 0-9"
            )));
        }
        Ok(Self {
            kind,
            level,
            shuffle: true,
            checksum: false,
            overrides: ChunkOverrides::new(),
        })
    }

    pub fn shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    pub fn checksum(mut self, checksum: bool) -> Self {
        self.checksum = checksum;
        self
    }

    pub fn chunk_overrides(mut self, overrides: ChunkOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    /// Plan every data variable. Dimension-coordinates get no entry.
    pub fn plan<'a, I>(&self, variables: I) -> Result<EncodingPlan>
    where
        I: IntoIterator<Item = PlannedVariable<'a>>,
    {
        let Some(filter) = self.kind.filter(self.level) else {
            if !self.overrides.is_empty() {
                debug!("compression is off, chunk overrides are ignored");
            }
            return Ok(EncodingPlan::new());
        };

        let mut plan = EncodingPlan::new();
        let mut seen = Vec::new();
        for var in variables {
            seen.push(var.output_name);
            if var.array.is_dimension_coordinate(var.local_name) {
                if self.overrides.contains_key(var.output_name) {
                    return Err(SubsetError::config(format!(
                        "Chunk shape given for '{}', a dimension-coordinate, which is written without encoding",
                        var.output_name
                    )));
                }
                continue;
            }
            let chunk_shape = self.resolve_chunks(var.output_name, var.array)?;
            plan.insert(
                var.output_name.to_string(),
                VariableEncoding {
                    filter,
                    shuffle: self.shuffle,
                    checksum: self.checksum,
                    chunk_shape,
                },
            );
        }

        if let Some(unknown) = self.overrides.keys().find(|k| !seen.contains(&k.as_str())) {
            return Err(SubsetError::config(format!(
                "Chunk shape given for '{unknown}', which is not part of the request"
            )));
        }

        Ok(plan)
    }

    /// Explicit override, else the native layout, else nothing.
    fn resolve_chunks(&self, output_name: &str, array: &DataArray) -> Result<Option<Vec<usize>>> {
        if let Some(dims) = self.overrides.get(output_name) {
            for (dim, &size) in dims {
                if !array.dims.contains(dim) {
                    return Err(SubsetError::config(format!(
                        "Chunk shape for '{output_name}' names dimension '{dim}', which it does not have"
                    )));
                }
                if size == 0 {
                    return Err(SubsetError::config(format!(
                        "Chunk size for '{output_name}' along '{dim}' must be positive"
                    )));
                }
            }
            let shape = array
                .dim_sizes()
                .map(|(dim, len)| dims.get(dim).map_or(len, |&size| size.min(len)).max(1))
                .collect();
            return Ok(Some(shape));
        }

        if array.dims.is_empty() {
            return Ok(None);
        }

        Ok(array.native_chunk_shape().map(|native| {
            native
                .iter()
                .zip(array.shape())
                .map(|(&chunk, &len)| chunk.min(len).max(1))
                .collect()
        }))
    }
}
