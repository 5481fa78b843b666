//! Container structure inspection
//!
//! A [`GroupTree`] is an explicit picture of a container's group hierarchy: each node
//! is a group holding its variable names and its subgroups. Variable discovery is a
//! depth-first walk over that tree.

/// A group node: its own variables and nested groups, in container order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupTree {
    pub name: String,
    pub variables: Vec<String>,
    pub children: Vec<GroupTree>,
}

impl GroupTree {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Every variable path in the tree.
    ///
    /// Depth-first pre-order: a group's variables come before its subgroups, and
    /// subgroups are visited in container order.
    pub fn variable_paths(&self) -> Vec<String> {
        let mut paths = Vec::new();
        let mut stack: Vec<(&GroupTree, String)> = vec![(self, String::new())];

        while let Some((node, prefix)) = stack.pop() {
            for var in &node.variables {
                paths.push(join_path(&prefix, var));
            }
            for child in node.children.iter().rev() {
                stack.push((child, join_path(&prefix, &child.name)));
            }
        }

        paths
    }

    /// Find the node at `group_path`, creating missing levels.
    pub fn ensure_group(&mut self, group_path: &str) -> &mut GroupTree {
        let mut node = self;
        for segment in group_path.split('/').filter(|s| !s.is_empty()) {
            let idx = match node.children.iter().position(|c| c.name == segment) {
                Some(idx) => idx,
                None => {
                    node.children.push(GroupTree::new(segment));
                    node.children.len() - 1
                }
            };
            node = &mut node.children[idx];
        }
        node
    }
}

/// Join a group prefix and a name with "/"; an empty prefix is the root.
pub fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}/{name}")
    }
}

/// Prints every variable path in the container, one per line.
pub fn print_variable_paths(tree: &GroupTree) {
    let paths = tree.variable_paths();
    if paths.is_empty() {
        println!("   (No variables found)");
        return;
    }
    for path in paths {
        println!("{path}");
    }
}
