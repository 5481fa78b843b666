//! Hierarchical writing
//!
//! [`HierarchicalWriter`] turns a [`Dataset`] into a sequence of group writes against
//! one [`ContainerSink`]. The first write creates the file, every later one appends a
//! group; everything that can be validated is validated before the first write.

use super::coords::{check_dimensions, deduplicate_group, root_coordinates, GroupSubset, Member};
use super::encoding::{EncodingPlan, PlannedVariable};
use super::groups::{leaf_of, place_variables, plan_groups, Layout};
use crate::config::WriteOptions;
use crate::data_source::{ContainerSink, GroupWrite, WriteMode};
use crate::dataset::Dataset;
use crate::errors::{Result, SubsetError};
use indexmap::IndexMap;
use std::path::PathBuf;
use tracing::{debug, info};

/// Progress of a writer through its group sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    NotStarted,
    /// First group written, file exists
    FileCreated,
    /// At least one group appended after the first
    Appending,
    Done,
}

/// What a completed write produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteSummary {
    pub output_path: PathBuf,
    /// Group paths in write order, "" for root
    pub groups: Vec<String>,
    pub variables_written: usize,
    /// Requested variables that were not written because they collided with a
    /// dimension name outside the root group
    pub stripped: Vec<String>,
}

/// Sequences group writes into one output container
pub struct HierarchicalWriter<'s, S: ContainerSink> {
    sink: &'s mut S,
    state: WriterState,
}

impl<'s, S: ContainerSink> HierarchicalWriter<'s, S> {
    pub fn new(sink: &'s mut S) -> Self {
        Self {
            sink,
            state: WriterState::NotStarted,
        }
    }

    pub fn state(&self) -> WriterState {
        self.state
    }

    /// Write `dataset` with `options`.
    ///
    /// A writer is single-use: calling this twice is a runtime order error. A failure
    /// after the first group leaves a partially written file behind.
    pub fn write(&mut self, dataset: &Dataset, options: &WriteOptions) -> Result<WriteSummary> {
        if self.state != WriterState::NotStarted {
            return Err(SubsetError::RuntimeOrder(format!(
                "writer for {} has already been used",
                self.sink.output_path().display()
            )));
        }
        if dataset.is_empty() {
            return Err(SubsetError::config("Nothing to write: the dataset has no variables"));
        }

        let placed = place_variables(dataset, options.layout)?;
        let members = members_by_group(dataset, &placed)?;
        let encoding = options.planner()?.plan(placed.iter().filter_map(|(path, name)| {
            dataset.get(name).map(|array| PlannedVariable {
                output_name: name.as_str(),
                local_name: leaf_of(path),
                array,
            })
        }))?;

        let subsets = build_subsets(members, options.layout);
        let subsets: Vec<GroupSubset<'_>> = subsets.into_iter().filter(|s| !s.is_empty()).collect();
        if subsets.is_empty() {
            return Err(SubsetError::config(
                "Nothing to write: every requested variable was stripped",
            ));
        }
        for subset in &subsets {
            check_dimensions(subset)?;
            for (local, member) in &subset.members {
                if let Some(enc) = encoding.get(member.output_name) {
                    self.sink.check_encoding(local, member.array, enc)?;
                }
            }
        }

        let attrs_at = subsets.iter().position(GroupSubset::is_root).unwrap_or(0);
        let mut summary = WriteSummary {
            output_path: self.sink.output_path().to_path_buf(),
            groups: Vec::with_capacity(subsets.len()),
            variables_written: 0,
            stripped: subsets.iter().flat_map(|s| s.stripped.iter().cloned()).collect(),
        };

        let mut root_dims = shared_root_dimensions(&subsets);
        for (idx, subset) in subsets.iter().enumerate() {
            let mut write = group_write(subset, &encoding, (idx == attrs_at).then_some(&dataset.attrs));
            write.root_dims = std::mem::take(&mut root_dims);
            self.write_group(&write)?;
            summary.groups.push(write.group_path.clone());
            summary.variables_written += write.variables.len();
        }

        let output_path = self.sink.output_path().to_path_buf();
        self.sink
            .finish()
            .map_err(|e| SubsetError::write(output_path, "", e))?;
        self.state = WriterState::Done;

        info!(
            output = %summary.output_path.display(),
            groups = summary.groups.len(),
            variables = summary.variables_written,
            "wrote subset"
        );
        Ok(summary)
    }

    fn write_group(&mut self, write: &GroupWrite<'_>) -> Result<()> {
        let mode = match self.state {
            WriterState::NotStarted => WriteMode::Create,
            WriterState::FileCreated | WriterState::Appending => WriteMode::Append,
            WriterState::Done => {
                return Err(SubsetError::RuntimeOrder(
                    "group write after the writer finished".to_string(),
                ))
            }
        };
        debug!(group = %write.group_path, ?mode, variables = write.variables.len(), "writing group");

        let output_path = self.sink.output_path().to_path_buf();
        self.sink
            .write_group(mode, write)
            .map_err(|e| SubsetError::write(output_path, write.group_path.clone(), e))?;

        self.state = match self.state {
            WriterState::NotStarted => WriterState::FileCreated,
            _ => WriterState::Appending,
        };
        Ok(())
    }
}

/// Requested members of every group, keyed by group path then local name.
fn members_by_group<'a>(
    dataset: &'a Dataset,
    placed: &'a IndexMap<String, String>,
) -> Result<IndexMap<String, IndexMap<String, Member<'a>>>> {
    let plan = plan_groups(placed.keys());
    let mut groups = IndexMap::with_capacity(plan.len());
    for (group, paths) in plan {
        let mut members = IndexMap::with_capacity(paths.len());
        for path in &paths {
            let output_name = placed
                .get(path)
                .ok_or_else(|| SubsetError::variable_not_found(path.clone()))?;
            let array = dataset
                .get(output_name)
                .ok_or_else(|| SubsetError::variable_not_found(output_name.clone()))?;
            members.insert(
                leaf_of(path).to_string(),
                Member {
                    output_name: output_name.as_str(),
                    array,
                    requested: true,
                },
            );
        }
        groups.insert(group, members);
    }
    Ok(groups)
}

/// Deduplicated sub-dataset for every group, in plan order.
fn build_subsets(
    mut groups: IndexMap<String, IndexMap<String, Member<'_>>>,
    layout: Layout,
) -> Vec<GroupSubset<'_>> {
    let inherited = match (layout, groups.get("")) {
        (Layout::Hierarchical, Some(root)) => root_coordinates(root),
        _ => IndexMap::new(),
    };
    groups
        .drain(..)
        .map(|(group, requested)| deduplicate_group(&group, requested, &inherited))
        .collect()
}

/// Dimensions of the root subset's dimension-coordinates, in member order.
fn shared_root_dimensions(subsets: &[GroupSubset<'_>]) -> IndexMap<String, usize> {
    let Some(root) = subsets.iter().find(|s| s.is_root()) else {
        return IndexMap::new();
    };
    let mut dims = IndexMap::new();
    for name in root.coordinate_names() {
        if let Some(member) = root.members.get(name) {
            for (dim, len) in member.array.dim_sizes() {
                dims.entry(dim.to_string()).or_insert(len);
            }
        }
    }
    dims
}

fn group_write<'a>(
    subset: &GroupSubset<'a>,
    encoding: &EncodingPlan,
    global_attrs: Option<&'a crate::dataset::Attributes>,
) -> GroupWrite<'a> {
    let variables = subset
        .members
        .iter()
        .map(|(local, m)| (local.clone(), m.array))
        .collect();
    let encoding = subset
        .members
        .iter()
        .filter_map(|(local, m)| encoding.get(m.output_name).map(|e| (local.clone(), e.clone())))
        .collect();
    GroupWrite {
        group_path: subset.group_path.clone(),
        variables,
        encoding,
        global_attrs,
        root_dims: IndexMap::new(),
    }
}
