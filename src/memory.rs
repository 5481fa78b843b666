//! In-memory container
//!
//! [`MemoryContainer`] holds a group tree of arrays and implements both
//! [`ContainerSource`] and [`ContainerSink`]. Every group write is recorded so the
//! sequence a writer produced can be inspected afterwards.

use crate::data_source::{ContainerSink, ContainerSource, GroupWrite, WriteMode};
use crate::dataset::{Attributes, DataArray, VariablePath};
use crate::errors::{Result, SubsetError};
use crate::metadata::{join_path, GroupTree};
use crate::subset::encoding::VariableEncoding;
use crate::subset::groups::group_of;
use indexmap::IndexMap;
use std::path::{Path, PathBuf};

/// One recorded call to [`ContainerSink::write_group`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedWrite {
    pub mode: WriteMode,
    pub group: String,
    pub variables: Vec<String>,
    pub with_global_attrs: bool,
    /// Root dimensions declared ahead of this group
    pub root_dims: Vec<(String, usize)>,
}

/// Group tree of arrays kept in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryContainer {
    name: PathBuf,
    exists: bool,
    groups: IndexMap<String, IndexMap<String, DataArray>>,
    encodings: IndexMap<String, VariableEncoding>,
    attrs: Attributes,
    writes: Vec<RecordedWrite>,
    fail_on_group: Option<String>,
}

impl MemoryContainer {
    /// Empty container that does not exist yet; the first write must create it.
    pub fn new(name: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Add a variable at `path`, creating its group. Marks the container as existing.
    pub fn with_variable(mut self, path: &str, array: DataArray) -> Self {
        let path = VariablePath::new(path);
        self.exists = true;
        self.ensure_groups(path.group());
        if let Some(group) = self.groups.get_mut(path.group()) {
            group.insert(path.name().to_string(), array);
        }
        self
    }

    pub fn with_global_attrs(mut self, attrs: Attributes) -> Self {
        self.exists = true;
        self.attrs = attrs;
        self
    }

    /// Make every write to `group` fail.
    pub fn fail_on_group(mut self, group: impl Into<String>) -> Self {
        self.fail_on_group = Some(group.into());
        self
    }

    pub fn writes(&self) -> &[RecordedWrite] {
        &self.writes
    }

    pub fn attrs(&self) -> &Attributes {
        &self.attrs
    }

    pub fn variable(&self, path: &str) -> Option<&DataArray> {
        let path = VariablePath::new(path);
        self.groups.get(path.group())?.get(path.name())
    }

    /// Encoding stored with the variable at `path`
    pub fn encoding(&self, path: &str) -> Option<&VariableEncoding> {
        self.encodings.get(VariablePath::new(path).as_str())
    }

    /// Variables of one group, in insertion order
    pub fn group_variables(&self, group: &str) -> Vec<&str> {
        self.groups
            .get(group)
            .map(|vars| vars.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    fn ensure_groups(&mut self, group_path: &str) {
        let mut path = group_path.to_string();
        let mut missing = Vec::new();
        while !self.groups.contains_key(&path) {
            missing.push(path.clone());
            if path.is_empty() {
                break;
            }
            path = group_of(&path).to_string();
        }
        for group in missing.into_iter().rev() {
            self.groups.insert(group, IndexMap::new());
        }
    }
}

impl ContainerSource for MemoryContainer {
    fn identifier(&self) -> String {
        self.name.display().to_string()
    }

    fn group_tree(&self) -> Result<GroupTree> {
        let mut tree = GroupTree::new("");
        for (group, vars) in &self.groups {
            tree.ensure_group(group)
                .variables
                .extend(vars.keys().cloned());
        }
        Ok(tree)
    }

    fn read_variable(&self, path: &VariablePath) -> Result<DataArray> {
        self.groups
            .get(path.group())
            .and_then(|vars| vars.get(path.name()))
            .cloned()
            .ok_or_else(|| SubsetError::variable_not_found(path.as_str()))
    }

    fn global_attributes(&self) -> Result<Attributes> {
        Ok(self.attrs.clone())
    }
}

impl ContainerSink for MemoryContainer {
    fn output_path(&self) -> &Path {
        &self.name
    }

    fn write_group(&mut self, mode: WriteMode, group: &GroupWrite<'_>) -> Result<()> {
        match mode {
            WriteMode::Create => {
                self.groups.clear();
                self.encodings.clear();
                self.attrs.clear();
                self.writes.clear();
                self.exists = true;
            }
            WriteMode::Append if !self.exists => {
                return Err(SubsetError::FileNotFound {
                    path: self.name.clone(),
                });
            }
            WriteMode::Append => {}
        }

        self.writes.push(RecordedWrite {
            mode,
            group: group.group_path.clone(),
            variables: group.variables.keys().cloned().collect(),
            with_global_attrs: group.global_attrs.is_some(),
            root_dims: group
                .root_dims
                .iter()
                .map(|(dim, len)| (dim.clone(), *len))
                .collect(),
        });
        if self.fail_on_group.as_deref() == Some(group.group_path.as_str()) {
            return Err(SubsetError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "simulated write failure",
            )));
        }

        if let Some(attrs) = group.global_attrs {
            self.attrs = attrs.clone();
        }
        self.ensure_groups(&group.group_path);
        for (name, array) in &group.variables {
            let path = join_path(&group.group_path, name);
            if let Some(encoding) = group.encoding.get(name) {
                self.encodings.insert(path, encoding.clone());
            }
            if let Some(vars) = self.groups.get_mut(&group.group_path) {
                vars.insert(name.clone(), (*array).clone());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::ArrayValues;
    use ndarray::{ArrayD, IxDyn};

    fn scalar(value: f64) -> DataArray {
        DataArray::new(ArrayValues::F64(ArrayD::from_elem(IxDyn(&[]), value)), vec![]).unwrap()
    }

    #[test]
    fn source_lists_variables_before_subgroups() {
        let container = MemoryContainer::new("mem")
            .with_variable("PRODUCT/SUPPORT_DATA/detail", scalar(1.0))
            .with_variable("PRODUCT/qa", scalar(2.0))
            .with_variable("time", scalar(3.0));
        let paths: Vec<String> = container
            .list_paths()
            .unwrap()
            .into_iter()
            .map(|p| p.to_string())
            .collect();
        assert_eq!(paths, vec!["time", "PRODUCT/qa", "PRODUCT/SUPPORT_DATA/detail"]);
    }

    #[test]
    fn append_to_missing_container_fails() {
        let mut sink = MemoryContainer::new("out");
        let write = GroupWrite {
            group_path: String::new(),
            variables: IndexMap::new(),
            encoding: IndexMap::new(),
            global_attrs: None,
            root_dims: IndexMap::new(),
        };
        let err = sink.write_group(WriteMode::Append, &write).unwrap_err();
        assert!(matches!(err, SubsetError::FileNotFound { .. }));
        sink.write_group(WriteMode::Create, &write).unwrap();
        sink.write_group(WriteMode::Append, &write).unwrap();
        assert_eq!(sink.writes().len(), 2);
    }
}
