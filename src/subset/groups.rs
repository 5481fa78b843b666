//! Group tree mapping
//!
//! Output names may carry a group prefix ("PRODUCT/latitude"). These helpers turn a
//! flat list of names back into a per-group plan for writing.

use crate::dataset::{Dataset, VariablePath};
use crate::errors::{Result, SubsetError};
use crate::metadata::join_path;
use indexmap::{IndexMap, IndexSet};
use std::str::FromStr;

/// `group_path -> names`, groups and names both in first-seen order
pub type GroupPlan = IndexMap<String, IndexSet<String>>;

/// Output structure of a write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Layout {
    /// Every variable at the root group
    #[default]
    Flat,
    /// Variables keep the group they were read from
    Hierarchical,
}

impl FromStr for Layout {
    type Err = SubsetError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "flat" => Ok(Self::Flat),
            "hierarchical" | "groups" => Ok(Self::Hierarchical),
            other => Err(SubsetError::config(format!(
                "Unknown layout '{other}'. Valid options: flat, hierarchical"
            ))),
        }
    }
}

/// Group part of a name: everything before the last "/", or "" for root.
pub fn group_of(name: &str) -> &str {
    name.rsplit_once('/').map(|(group, _)| group).unwrap_or("")
}

/// Name inside its group: everything after the last "/".
pub fn leaf_of(name: &str) -> &str {
    name.rsplit_once('/').map(|(_, leaf)| leaf).unwrap_or(name)
}

/// Groups names by [`group_of`], keeping first-seen order of groups and of names
/// within each group. Groups without names never appear.
pub fn plan_groups<I, S>(names: I) -> GroupPlan
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut plan = GroupPlan::new();
    for name in names {
        let name = name.as_ref();
        plan.entry(group_of(name).to_string())
            .or_default()
            .insert(name.to_string());
    }
    plan
}

/// Where a variable lands in the output.
///
/// Hierarchical: a group-qualified output name is used as-is, a bare one is placed in
/// the group it was read from. Flat: the bare name at root.
pub fn placement(output_name: &str, source: &VariablePath, layout: Layout) -> String {
    match layout {
        Layout::Flat => leaf_of(output_name).to_string(),
        Layout::Hierarchical if output_name.contains('/') => output_name.to_string(),
        Layout::Hierarchical => join_path(source.group(), output_name),
    }
}

/// Placement path of every array in `dataset`, mapped to its output name.
///
/// Fails when two arrays would land on the same path.
pub fn place_variables(dataset: &Dataset, layout: Layout) -> Result<IndexMap<String, String>> {
    let mut placed = IndexMap::with_capacity(dataset.len());
    for (name, array) in dataset.iter() {
        let path = placement(name, &array.source, layout);
        if leaf_of(&path).is_empty() {
            return Err(SubsetError::config(format!(
                "Output name '{name}' does not end in a variable name"
            )));
        }
        if let Some(previous) = placed.insert(path.clone(), name.to_string()) {
            return Err(SubsetError::config(format!(
                "Variables '{previous}' and '{name}' would both be written to '{path}'"
            )));
        }
    }
    Ok(placed)
}
