//! Container I/O abstraction
//!
//! The subsetting engine never talks to a file format directly. It reads through a
//! [`ContainerSource`] and writes through a [`ContainerSink`]; [`crate::netcdf_io`]
//! implements both for NetCDF4/HDF5 files and [`crate::memory`] for in-memory trees.

use crate::dataset::{Attributes, DataArray, VariablePath};
use crate::errors::Result;
use crate::metadata::GroupTree;
use crate::subset::encoding::VariableEncoding;
use indexmap::IndexMap;
use std::path::Path;

/// How a group write treats the output file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Create the file, truncating anything already at the path
    Create,
    /// Add to a file that already exists
    Append,
}

/// Everything a sink needs to write one group
#[derive(Debug)]
pub struct GroupWrite<'a> {
    /// Group path, empty for the root group
    pub group_path: String,
    /// Variables keyed by their name inside the group
    pub variables: IndexMap<String, &'a DataArray>,
    /// Encodings keyed like `variables`; variables without an entry are stored as-is
    pub encoding: IndexMap<String, VariableEncoding>,
    /// File-level attributes, present on exactly one write per file
    pub global_attrs: Option<&'a Attributes>,
    /// Dimensions of the root group's dimension-coordinates. Set on the first write
    /// only, and defined at the root before the group itself so nested groups
    /// resolve them from there.
    pub root_dims: IndexMap<String, usize>,
}

impl GroupWrite<'_> {
    pub fn is_root(&self) -> bool {
        self.group_path.is_empty()
    }
}

/// Read side of a container
pub trait ContainerSource {
    /// Identifier recorded as provenance in outputs, usually the file name
    fn identifier(&self) -> String;

    /// Explicit picture of the container's groups and variables
    fn group_tree(&self) -> Result<GroupTree>;

    /// All variable paths, depth-first
    fn list_paths(&self) -> Result<Vec<VariablePath>> {
        Ok(self
            .group_tree()?
            .variable_paths()
            .into_iter()
            .map(VariablePath::new)
            .collect())
    }

    /// Raw stored values, dimension names and attributes of one variable.
    ///
    /// No scale/offset transform is ever applied.
    fn read_variable(&self, path: &VariablePath) -> Result<DataArray>;

    /// File-level attributes
    fn global_attributes(&self) -> Result<Attributes>;
}

/// Write side of a container
pub trait ContainerSink {
    fn output_path(&self) -> &Path;

    /// Reject encodings this sink cannot apply. Called for every planned encoding
    /// before the first write.
    fn check_encoding(
        &self,
        _name: &str,
        _array: &DataArray,
        _encoding: &VariableEncoding,
    ) -> Result<()> {
        Ok(())
    }

    /// Write one group. `Create` truncates, `Append` extends the existing file.
    fn write_group(&mut self, mode: WriteMode, group: &GroupWrite<'_>) -> Result<()>;

    /// Flush and release the output.
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}
