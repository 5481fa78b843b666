//! Coordinate deduplication
//!
//! Dimension-coordinates (arrays named after one of their own dimensions) are written
//! once, at the root group. Nested groups see them through dimension inheritance, so
//! every group's sub-dataset is pruned before it is written.

use crate::dataset::DataArray;
use crate::errors::{Result, SubsetError};
use indexmap::IndexMap;
use std::collections::HashMap;
use tracing::{debug, warn};

/// One array as it appears inside a group
#[derive(Debug, Clone, Copy)]
pub struct Member<'a> {
    /// Name the caller requested it under
    pub output_name: &'a str,
    pub array: &'a DataArray,
    /// Requested for this group, as opposed to inherited from the root
    pub requested: bool,
}

/// A group's variables after deduplication
#[derive(Debug, Clone)]
pub struct GroupSubset<'a> {
    pub group_path: String,
    /// Local name -> member
    pub members: IndexMap<String, Member<'a>>,
    /// Output names of requested variables that had to be dropped
    pub stripped: Vec<String>,
}

impl<'a> GroupSubset<'a> {
    pub fn is_root(&self) -> bool {
        self.group_path.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Local names of the arrays that are dimension-coordinates here
    pub fn coordinate_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.members
            .iter()
            .filter(|(name, m)| m.array.is_dimension_coordinate(name))
            .map(|(name, _)| name.as_str())
    }
}

/// Root-level dimension-coordinates among `members`, as inherited members.
pub fn root_coordinates<'a>(members: &IndexMap<String, Member<'a>>) -> IndexMap<String, Member<'a>> {
    members
        .iter()
        .filter(|(name, m)| m.array.is_dimension_coordinate(name))
        .map(|(name, m)| {
            (
                name.clone(),
                Member {
                    requested: false,
                    ..*m
                },
            )
        })
        .collect()
}

/// Build the sub-dataset written for `group_path`.
///
/// `requested` holds the group's own variables by local name; `inherited` the root's
/// dimension-coordinates. Inherited arrays survive only when a requested variable
/// uses their dimension. Outside the root every dimension-coordinate is stripped;
/// a requested one is reported in [`GroupSubset::stripped`] with a warning.
pub fn deduplicate_group<'a>(
    group_path: &str,
    requested: IndexMap<String, Member<'a>>,
    inherited: &IndexMap<String, Member<'a>>,
) -> GroupSubset<'a> {
    let used_dims: Vec<&'a str> = requested
        .values()
        .flat_map(|m| {
            let array: &'a DataArray = m.array;
            array.dims.iter().map(String::as_str)
        })
        .collect();

    let mut members = requested;
    for (name, coord) in inherited {
        if !members.contains_key(name) && used_dims.contains(&name.as_str()) {
            members.insert(name.clone(), *coord);
        }
    }
    members.retain(|name, m| {
        let keep = m.requested || used_dims.contains(&name.as_str());
        if !keep {
            debug!(group = group_path, coordinate = %name, "dropping unrelated coordinate");
        }
        keep
    });

    let mut stripped = Vec::new();
    if !group_path.is_empty() {
        members.retain(|name, m| {
            if !m.array.is_dimension_coordinate(name) {
                return true;
            }
            if m.requested {
                warn!(
                    group = group_path,
                    variable = m.output_name,
                    "'{name}' shares its name with one of its dimensions and is only kept at the root group; it is not written here"
                );
                stripped.push(m.output_name.to_string());
            }
            false
        });
    }

    GroupSubset {
        group_path: group_path.to_string(),
        members,
        stripped,
    }
}

/// Every dimension name inside one group must have a single length.
pub fn check_dimensions(subset: &GroupSubset<'_>) -> Result<()> {
    let mut lengths: HashMap<&str, (usize, &str)> = HashMap::new();
    for (name, member) in &subset.members {
        for (dim, len) in member.array.dim_sizes() {
            match lengths.get(dim) {
                Some(&(seen, other)) if seen != len => {
                    return Err(SubsetError::config(format!(
                        "Dimension '{dim}' has length {seen} for '{other}' but {len} for '{name}' in group '{}'",
                        subset.group_path
                    )));
                }
                Some(_) => {}
                None => {
                    lengths.insert(dim, (len, name.as_str()));
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::ArrayValues;
    use ndarray::{ArrayD, IxDyn};

    fn array(dims: &[(&str, usize)]) -> DataArray {
        let shape: Vec<usize> = dims.iter().map(|d| d.1).collect();
        let n = shape.iter().product();
        let values = ArrayValues::F64(ArrayD::from_shape_vec(IxDyn(&shape), vec![0.0; n]).unwrap());
        DataArray::new(values, dims.iter().map(|d| d.0.to_string()).collect()).unwrap()
    }

    fn member<'a>(name: &'a str, array: &'a DataArray) -> Member<'a> {
        Member {
            output_name: name,
            array,
            requested: true,
        }
    }

    #[test]
    fn root_keeps_requested_coordinates() {
        let time = array(&[("time", 3)]);
        let temp = array(&[("time", 3), ("lat", 2)]);
        let mut requested = IndexMap::new();
        requested.insert("time".to_string(), member("time", &time));
        requested.insert("temp".to_string(), member("temp", &temp));

        let subset = deduplicate_group("", requested, &IndexMap::new());
        assert_eq!(subset.members.len(), 2);
        assert_eq!(subset.coordinate_names().collect::<Vec<_>>(), vec!["time"]);
        assert!(subset.stripped.is_empty());
    }

    #[test]
    fn nested_groups_never_carry_inherited_coordinates() {
        let time = array(&[("time", 3)]);
        let depth = array(&[("depth", 4)]);
        let no2 = array(&[("time", 3)]);

        let mut root = IndexMap::new();
        root.insert("time".to_string(), member("time", &time));
        root.insert("depth".to_string(), member("depth", &depth));
        let inherited = root_coordinates(&root);
        assert_eq!(inherited.len(), 2);

        let mut requested = IndexMap::new();
        requested.insert("no2".to_string(), member("PRODUCT/no2", &no2));
        let subset = deduplicate_group("PRODUCT", requested, &inherited);

        assert_eq!(subset.members.keys().collect::<Vec<_>>(), vec!["no2"]);
        assert!(subset.stripped.is_empty());
    }

    #[test]
    fn requested_dimension_coordinate_in_nested_group_is_reported() {
        let scanline = array(&[("scanline", 5)]);
        let lat = array(&[("scanline", 5)]);
        let mut requested = IndexMap::new();
        requested.insert("scanline".to_string(), member("PRODUCT/scanline", &scanline));
        requested.insert("latitude".to_string(), member("PRODUCT/latitude", &lat));

        let subset = deduplicate_group("PRODUCT", requested, &IndexMap::new());
        assert_eq!(subset.members.keys().collect::<Vec<_>>(), vec!["latitude"]);
        assert_eq!(subset.stripped, vec!["PRODUCT/scanline".to_string()]);
    }

    #[test]
    fn conflicting_dimension_lengths_fail() {
        let a = array(&[("x", 3)]);
        let b = array(&[("x", 4)]);
        let mut requested = IndexMap::new();
        requested.insert("a".to_string(), member("a", &a));
        requested.insert("b".to_string(), member("b", &b));
        let subset = deduplicate_group("", requested, &IndexMap::new());
        assert!(check_dimensions(&subset).is_err());
    }
}
