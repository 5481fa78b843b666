//! NetCDF container I/O
//!
//! [`NetcdfSource`] reads variables out of NetCDF4/HDF5 files with their stored type,
//! dimensions, attributes and chunk layout. [`NetcdfSink`] writes group after group
//! into one output file, creating nested groups and reusing dimensions that an
//! ancestor group already defines.

use crate::data_source::{ContainerSink, ContainerSource, GroupWrite, WriteMode};
use crate::dataset::{ArrayValues, Attributes, DataArray, NativeChunking, VariablePath};
use crate::errors::{Result, SubsetError};
use crate::metadata::{join_path, GroupTree};
use crate::subset::encoding::{Filter, VariableEncoding};
use crate::subset::groups::{group_of, leaf_of};
use indexmap::IndexMap;
use ndarray::{ArrayD, Dimension, IxDyn};
use netcdf::types::{FloatType, IntType, NcVariableType};
use netcdf::{Attribute, File, FileMut, GroupMut, Variable, VariableMut};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Read-only handle on a NetCDF file
pub struct NetcdfSource {
    path: PathBuf,
    file: File,
}

impl NetcdfSource {
    /// Open `path` for reading.
    ///
    /// # Errors
    ///
    /// `FileNotFound` when nothing exists at `path`, `Format` when the file cannot be
    /// parsed as NetCDF.
    pub fn open_for_read(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SubsetError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let file = netcdf::open(path).map_err(|e| SubsetError::Format {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file(&self) -> &File {
        &self.file
    }
}

impl ContainerSource for NetcdfSource {
    fn identifier(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }

    fn group_tree(&self) -> Result<GroupTree> {
        let mut tree = GroupTree::new("");
        tree.variables = self.file.variables().map(|v| v.name().to_string()).collect();

        let mut pending: Vec<(netcdf::Group<'_>, String)> = Vec::new();
        for group in self.file.groups()? {
            let path = group.name().to_string();
            tree.ensure_group(&path);
            pending.push((group, path));
        }
        pending.reverse();

        while let Some((group, path)) = pending.pop() {
            let node = tree.ensure_group(&path);
            node.variables = group.variables().map(|v| v.name().to_string()).collect();

            let mut children = Vec::new();
            for child in group.groups() {
                let child_path = join_path(&path, &child.name());
                tree.ensure_group(&child_path);
                children.push((child, child_path));
            }
            pending.extend(children.into_iter().rev());
        }

        Ok(tree)
    }

    fn read_variable(&self, path: &VariablePath) -> Result<DataArray> {
        let var = self
            .file
            .variable(path.as_str())
            .ok_or_else(|| SubsetError::variable_not_found(path.as_str()))?;

        let dims: Vec<String> = var.dimensions().iter().map(|d| d.name().to_string()).collect();
        let shape: Vec<usize> = var.dimensions().iter().map(|d| d.len()).collect();
        let values = read_values(&var, path, &shape)?;

        let mut array = DataArray::new(values, dims)?
            .with_attrs(collect_attributes(var.attributes()))
            .with_source(path.clone());
        if let Some(chunks) = var.chunking()? {
            array = array.with_native_chunking(NativeChunking::regular(&shape, &chunks));
        }

        debug!(variable = %path, shape = ?shape, dtype = array.values.type_name(), "read variable");
        Ok(array)
    }

    fn global_attributes(&self) -> Result<Attributes> {
        Ok(collect_attributes(self.file.attributes()))
    }
}

/// Attribute values by name; unreadable attributes are skipped with a warning.
fn collect_attributes<'a>(attrs: impl Iterator<Item = Attribute<'a>>) -> Attributes {
    let mut out = Attributes::new();
    for attr in attrs {
        match attr.value() {
            Ok(value) => {
                out.insert(attr.name().to_string(), value);
            }
            Err(e) => warn!("⚠ Skipped unreadable attribute '{}': {}", attr.name(), e),
        }
    }
    out
}

macro_rules! read_numeric {
    ($var:expr, $shape:expr, $ty:ty, $variant:ident) => {{
        let data: Vec<$ty> = if $shape.contains(&0) {
            Vec::new()
        } else {
            $var.get_values::<$ty, _>(..)?
        };
        ArrayValues::$variant(ArrayD::from_shape_vec(IxDyn($shape), data)?)
    }};
}

/// Raw stored values with their on-disk type.
fn read_values(var: &Variable<'_>, path: &VariablePath, shape: &[usize]) -> Result<ArrayValues> {
    let values = match var.vartype() {
        NcVariableType::Int(IntType::I8) => read_numeric!(var, shape, i8, I8),
        NcVariableType::Int(IntType::U8) => read_numeric!(var, shape, u8, U8),
        NcVariableType::Int(IntType::I16) => read_numeric!(var, shape, i16, I16),
        NcVariableType::Int(IntType::U16) => read_numeric!(var, shape, u16, U16),
        NcVariableType::Int(IntType::I32) => read_numeric!(var, shape, i32, I32),
        NcVariableType::Int(IntType::U32) => read_numeric!(var, shape, u32, U32),
        NcVariableType::Int(IntType::I64) => read_numeric!(var, shape, i64, I64),
        NcVariableType::Int(IntType::U64) => read_numeric!(var, shape, u64, U64),
        NcVariableType::Float(FloatType::F32) => read_numeric!(var, shape, f32, F32),
        NcVariableType::Float(FloatType::F64) => read_numeric!(var, shape, f64, F64),
        NcVariableType::String => ArrayValues::Str(read_strings(var, shape)?),
        other => {
            return Err(SubsetError::UnsupportedType {
                path: path.to_string(),
                vartype: format!("{other:?}"),
            })
        }
    };
    Ok(values)
}

fn read_strings(var: &Variable<'_>, shape: &[usize]) -> Result<ArrayD<String>> {
    if shape.is_empty() {
        return Ok(ArrayD::from_elem(IxDyn(&[]), var.get_string(..)?));
    }
    let mut data = Vec::with_capacity(shape.iter().product());
    for index in ndarray::indices(IxDyn(shape)) {
        data.push(var.get_string(index.slice())?);
    }
    Ok(ArrayD::from_shape_vec(IxDyn(shape), data)?)
}

/// Writes groups into one NetCDF4 file, keeping the handle open between writes
pub struct NetcdfSink {
    path: PathBuf,
    file: Option<FileMut>,
}

impl NetcdfSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: None,
        }
    }

    fn open(&mut self, mode: WriteMode) -> Result<&mut FileMut> {
        match mode {
            WriteMode::Create => {
                self.file = None;
                if self.path.exists() {
                    fs::remove_file(&self.path)?;
                }
                self.file = Some(netcdf::create(&self.path)?);
            }
            WriteMode::Append if self.file.is_none() => {
                if !self.path.exists() {
                    return Err(SubsetError::FileNotFound {
                        path: self.path.clone(),
                    });
                }
                self.file = Some(netcdf::append(&self.path)?);
            }
            WriteMode::Append => {}
        }
        self.file
            .as_mut()
            .ok_or_else(|| SubsetError::RuntimeOrder("output file is not open".to_string()))
    }
}

impl ContainerSink for NetcdfSink {
    fn output_path(&self) -> &Path {
        &self.path
    }

    fn check_encoding(&self, name: &str, _array: &DataArray, encoding: &VariableEncoding) -> Result<()> {
        match encoding.filter {
            Filter::Deflate { .. } | Filter::Gzip { .. } => {}
            other => {
                return Err(SubsetError::config(format!(
                    "{} compression for '{name}' is not available through the NetCDF backend",
                    other.name()
                )))
            }
        }
        if encoding.checksum {
            return Err(SubsetError::config(format!(
                "Checksums for '{name}' are not available through the NetCDF backend"
            )));
        }
        Ok(())
    }

    fn write_group(&mut self, mode: WriteMode, group: &GroupWrite<'_>) -> Result<()> {
        let file = self.open(mode)?;

        if let Some(attrs) = group.global_attrs {
            for (name, value) in attrs {
                file.add_attribute(name, value.clone())?;
            }
        }

        define_root_dimensions(file, &group.root_dims)?;
        ensure_group_path(file, &group.group_path)?;
        let new_dims = dimensions_to_define(file, group)?;

        with_group(file, &group.group_path, |target| {
            for (name, len) in &new_dims {
                target.add_dimension(name, *len)?;
            }
            for (name, array) in &group.variables {
                write_variable(target, name, array, group.encoding.get(name))?;
            }
            Ok(())
        })
    }

    fn finish(&mut self) -> Result<()> {
        // Dropping the handle closes and flushes the file.
        self.file = None;
        Ok(())
    }
}

fn with_group<R>(
    file: &mut FileMut,
    group_path: &str,
    f: impl FnOnce(&mut GroupMut<'_>) -> Result<R>,
) -> Result<R> {
    let group = if group_path.is_empty() {
        file.root_mut()
    } else {
        file.group_mut(group_path)?
    };
    let mut group = group.ok_or_else(|| {
        SubsetError::Format {
            path: PathBuf::from(group_path),
            message: "group is missing from the output file".to_string(),
        }
    })?;
    f(&mut group)
}

/// Define the root group's shared dimensions unless they already exist.
fn define_root_dimensions(file: &mut FileMut, dims: &IndexMap<String, usize>) -> Result<()> {
    for (dim, len) in dims {
        match file.dimension(dim).map(|d| d.len()) {
            Some(existing) if existing == *len => {}
            Some(existing) => {
                return Err(SubsetError::config(format!(
                    "Dimension '{dim}' already has length {existing} at the root, cannot redefine it as {len}"
                )))
            }
            None => {
                file.add_dimension(dim, *len)?;
            }
        }
    }
    Ok(())
}

/// Create every missing level of `group_path`.
fn ensure_group_path(file: &mut FileMut, group_path: &str) -> Result<()> {
    let mut prefix = String::new();
    for segment in group_path.split('/').filter(|s| !s.is_empty()) {
        let path = join_path(&prefix, segment);
        if file.group(&path)?.is_none() {
            with_group(file, &prefix, |parent| {
                parent.add_group(segment)?;
                Ok(())
            })?;
        }
        prefix = path;
    }
    Ok(())
}

/// Length of `dim` as seen from `group_path`, with the group that owns it.
fn visible_dimension(file: &FileMut, group_path: &str, dim: &str) -> Result<Option<(String, usize)>> {
    let mut path = group_path.to_string();
    loop {
        let found = if path.is_empty() {
            file.dimension(dim).map(|d| d.len())
        } else {
            file.group(&path)?.and_then(|g| g.dimension(dim).map(|d| d.len()))
        };
        if let Some(len) = found {
            return Ok(Some((path, len)));
        }
        if path.is_empty() {
            return Ok(None);
        }
        path = group_of(&path).to_string();
    }
}

/// Dimensions the group's variables need that are not visible with the right length.
fn dimensions_to_define(file: &FileMut, group: &GroupWrite<'_>) -> Result<Vec<(String, usize)>> {
    let mut needed: Vec<(String, usize)> = Vec::new();
    for array in group.variables.values() {
        for (dim, len) in array.dim_sizes() {
            if needed.iter().any(|(d, _)| d == dim) {
                continue;
            }
            match visible_dimension(file, &group.group_path, dim)? {
                Some((_, existing)) if existing == len => {}
                Some((owner, existing)) if owner == group.group_path => {
                    return Err(SubsetError::config(format!(
                        "Dimension '{dim}' already has length {existing} in group '{owner}', cannot redefine it as {len}"
                    )));
                }
                _ => needed.push((dim.to_string(), len)),
            }
        }
    }
    Ok(needed)
}

macro_rules! put_numeric {
    ($group:expr, $name:expr, $dims:expr, $arr:expr, $ty:ty, $array:expr, $encoding:expr) => {{
        let mut var = $group.add_variable::<$ty>($name, $dims)?;
        apply_encoding(&mut var, $name, $encoding, $arr.ndim())?;
        put_attributes(&mut var, &$array.attrs)?;
        if !$arr.is_empty() {
            let flat: Vec<$ty> = $arr.iter().copied().collect();
            var.put_values(&flat, ..)?;
        }
    }};
}

fn write_variable(
    group: &mut GroupMut<'_>,
    name: &str,
    array: &DataArray,
    encoding: Option<&VariableEncoding>,
) -> Result<()> {
    let dims: Vec<&str> = array.dims.iter().map(String::as_str).collect();
    match &array.values {
        ArrayValues::I8(arr) => put_numeric!(group, name, &dims, arr, i8, array, encoding),
        ArrayValues::U8(arr) => put_numeric!(group, name, &dims, arr, u8, array, encoding),
        ArrayValues::I16(arr) => put_numeric!(group, name, &dims, arr, i16, array, encoding),
        ArrayValues::U16(arr) => put_numeric!(group, name, &dims, arr, u16, array, encoding),
        ArrayValues::I32(arr) => put_numeric!(group, name, &dims, arr, i32, array, encoding),
        ArrayValues::U32(arr) => put_numeric!(group, name, &dims, arr, u32, array, encoding),
        ArrayValues::I64(arr) => put_numeric!(group, name, &dims, arr, i64, array, encoding),
        ArrayValues::U64(arr) => put_numeric!(group, name, &dims, arr, u64, array, encoding),
        ArrayValues::F32(arr) => put_numeric!(group, name, &dims, arr, f32, array, encoding),
        ArrayValues::F64(arr) => put_numeric!(group, name, &dims, arr, f64, array, encoding),
        ArrayValues::Str(arr) => {
            let mut var = group.add_string_variable(name, &dims)?;
            if encoding.is_some() {
                debug!(variable = name, "string variables are stored without compression");
            }
            put_attributes(&mut var, &array.attrs)?;
            for (index, value) in arr.indexed_iter() {
                if index.ndim() == 0 {
                    var.put_string(value, ..)?;
                } else {
                    var.put_string(value, index.slice())?;
                }
            }
        }
    }
    debug!(variable = name, "wrote variable");
    Ok(())
}

fn apply_encoding(
    var: &mut VariableMut<'_>,
    name: &str,
    encoding: Option<&VariableEncoding>,
    ndim: usize,
) -> Result<()> {
    let Some(encoding) = encoding else {
        return Ok(());
    };
    if ndim == 0 {
        debug!(variable = leaf_of(name), "scalar variables are stored contiguously");
        return Ok(());
    }
    if let Some(chunks) = &encoding.chunk_shape {
        var.set_chunking(chunks)?;
    }
    if let Some(level) = encoding.filter.deflate_level() {
        var.set_compression(i32::from(level), encoding.shuffle)?;
    }
    Ok(())
}

fn put_attributes(var: &mut VariableMut<'_>, attrs: &Attributes) -> Result<()> {
    for (name, value) in attrs {
        var.put_attribute(name, value.clone())?;
    }
    Ok(())
}
