//! Association/Including tree.
//!
//! An [`IncludingTree`] is rooted at a structural type and describes which
//! related objects (reference elements) and nested complex attributes must be
//! loaded together with a result. Children are unique by name.

use ormx_proto::{MemberPath, TypeRef};
use serde::{Deserialize, Serialize};

use crate::catalog::{MemberKind, ObjectModel};
use crate::error::Error;

/// Kind of an including node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    /// Reference element (single object or collection).
    Reference {
        /// Whether the reference yields a collection.
        collection: bool,
    },
    /// Embedded complex attribute.
    Complex,
}

/// A node of the including tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncludeNode {
    /// Member name on the parent type.
    pub name: String,
    /// Node kind.
    pub kind: NodeKind,
    /// Element type of the member (the item type for collections).
    pub target: TypeRef,
    /// Child nodes, unique by name.
    pub children: Vec<IncludeNode>,
}

impl IncludeNode {
    fn child(&self, name: &str) -> Option<&IncludeNode> {
        self.children.iter().find(|c| c.name == name)
    }

    fn merge_children(&mut self, others: &[IncludeNode]) {
        merge_nodes(&mut self.children, others);
    }

    fn collect_paths(&self, prefix: &MemberPath, out: &mut Vec<MemberPath>) {
        let path = prefix.child(self.name.clone());
        out.push(path.clone());
        for child in &self.children {
            child.collect_paths(&path, out);
        }
    }
}

fn merge_nodes(into: &mut Vec<IncludeNode>, others: &[IncludeNode]) {
    for other in others {
        match into.iter_mut().find(|n| n.name == other.name) {
            Some(existing) => existing.merge_children(&other.children),
            None => into.push(other.clone()),
        }
    }
}

/// Tree of related data to load with a result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncludingTree {
    root_type: TypeRef,
    children: Vec<IncludeNode>,
}

impl IncludingTree {
    /// Create an empty tree rooted at a type.
    pub fn new(root_type: TypeRef) -> Self {
        Self {
            root_type,
            children: Vec::new(),
        }
    }

    /// Root type.
    pub fn root_type(&self) -> &TypeRef {
        &self.root_type
    }

    /// Top-level nodes.
    pub fn children(&self) -> &[IncludeNode] {
        &self.children
    }

    /// Check if the tree includes nothing.
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Grow the tree along `path`, creating missing nodes. Growing an
    /// existing path is a no-op.
    pub fn grow(&mut self, model: &ObjectModel, path: &MemberPath) -> Result<(), Error> {
        let mut owner = self.root_type.clone();
        let mut level = &mut self.children;
        for segment in path.segments() {
            let member = model.member(&owner, segment)?;
            if !member.is_navigable() {
                return Err(Error::type_mismatch(
                    "reference or complex member",
                    format!("attribute {segment} on {owner}"),
                ));
            }
            let kind = match member.kind {
                MemberKind::Complex => NodeKind::Complex,
                _ if matches!(member.element_type(), TypeRef::Complex(_)) => NodeKind::Complex,
                _ => NodeKind::Reference {
                    collection: member.is_collection(),
                },
            };
            let target = member.element_type().clone();
            let index = match level.iter().position(|n| &n.name == segment) {
                Some(index) => index,
                None => {
                    level.push(IncludeNode {
                        name: segment.clone(),
                        kind,
                        target: target.clone(),
                        children: Vec::new(),
                    });
                    level.len() - 1
                }
            };
            owner = target;
            level = &mut level[index].children;
        }
        Ok(())
    }

    /// Merge another tree (rooted at the same type) into this one.
    pub fn merge(&mut self, other: &IncludingTree) {
        merge_nodes(&mut self.children, &other.children);
    }

    fn node(&self, path: &MemberPath) -> Option<&IncludeNode> {
        let (first, rest) = path.segments().split_first()?;
        let mut node = self.children.iter().find(|n| &n.name == first)?;
        for segment in rest {
            node = node.child(segment)?;
        }
        Some(node)
    }

    /// Check whether a path is included.
    pub fn contains(&self, path: &MemberPath) -> bool {
        path.is_root() || self.node(path).is_some()
    }

    /// Sub-tree at `path`, re-rooted at the node's target type. Returns
    /// `None` when the path is not included; the root path yields a copy of
    /// the whole tree.
    pub fn search(&self, path: &MemberPath) -> Option<IncludingTree> {
        if path.is_root() {
            return Some(self.clone());
        }
        let node = self.node(path)?;
        Some(IncludingTree {
            root_type: node.target.clone(),
            children: node.children.clone(),
        })
    }

    /// Remap the tree through a projection: each `(name, source path)` entry
    /// becomes a top-level node `name` carrying the sub-tree found at the
    /// source path. A root source carries the whole tree under `name`.
    /// Entries whose path is not included are skipped; returns `None` when
    /// nothing survives.
    pub fn cut_by_mapping(
        &self,
        root_type: TypeRef,
        mapping: &[(String, MemberPath)],
    ) -> Option<IncludingTree> {
        let mut cut = IncludingTree::new(root_type);
        for (name, source) in mapping {
            if source.is_root() {
                if !self.is_empty() {
                    let node = IncludeNode {
                        name: name.clone(),
                        kind: NodeKind::Reference { collection: false },
                        target: self.root_type.clone(),
                        children: self.children.clone(),
                    };
                    merge_nodes(&mut cut.children, std::slice::from_ref(&node));
                }
                continue;
            }
            if let Some(node) = self.node(source) {
                let mut node = node.clone();
                node.name = name.clone();
                merge_nodes(&mut cut.children, std::slice::from_ref(&node));
            }
        }
        if cut.is_empty() {
            None
        } else {
            Some(cut)
        }
    }

    /// Attach `subtree` below `path`, growing the path first.
    pub fn graft(
        &mut self,
        model: &ObjectModel,
        path: &MemberPath,
        subtree: &IncludingTree,
    ) -> Result<(), Error> {
        if path.is_root() {
            self.merge(subtree);
            return Ok(());
        }
        self.grow(model, path)?;
        if let Some(node) = self.node_mut(path) {
            node.merge_children(&subtree.children);
        }
        Ok(())
    }

    fn node_mut(&mut self, path: &MemberPath) -> Option<&mut IncludeNode> {
        let (first, rest) = path.segments().split_first()?;
        let mut node = self.children.iter_mut().find(|n| &n.name == first)?;
        for segment in rest {
            node = node.children.iter_mut().find(|c| &c.name == segment)?;
        }
        Some(node)
    }

    /// Remove the node at `path` with its sub-tree.
    pub fn remove(&mut self, path: &MemberPath) -> Option<IncludeNode> {
        let parent = path.parent()?;
        let name = path.last()?;
        let siblings = if parent.is_root() {
            &mut self.children
        } else {
            &mut self.node_mut(&parent)?.children
        };
        let index = siblings.iter().position(|n| n.name == name)?;
        Some(siblings.remove(index))
    }

    /// Split off the parts overlapping `paths`. Returns the remaining tree
    /// and, for every path that is included, the sub-tree found there.
    pub fn split_overlapping(
        &self,
        paths: &[MemberPath],
    ) -> (IncludingTree, Vec<(MemberPath, IncludingTree)>) {
        let mut rest = self.clone();
        let mut overlapping = Vec::new();
        for path in paths {
            if let Some(subtree) = self.search(path) {
                if !path.is_root() {
                    rest.remove(path);
                    overlapping.push((path.clone(), subtree));
                }
            }
        }
        (rest, overlapping)
    }

    /// Every included path, parents before children.
    pub fn paths(&self) -> Vec<MemberPath> {
        let mut out = Vec::new();
        for child in &self.children {
            child.collect_paths(&MemberPath::root(), &mut out);
        }
        out
    }

    /// Paths of the leaves only (enough to regrow the tree).
    pub fn leaf_paths(&self) -> Vec<MemberPath> {
        let all = self.paths();
        all.iter()
            .filter(|p| !all.iter().any(|q| q.len() > p.len() && q.starts_with(p)))
            .cloned()
            .collect()
    }

    /// Compare two trees ignoring child order.
    pub fn equivalent(&self, other: &IncludingTree) -> bool {
        let mut a = self.paths();
        let mut b = other.paths();
        a.sort();
        b.sort();
        self.root_type == other.root_type && a == b
    }

    /// Same nodes under a different root type.
    pub fn rerooted(&self, root_type: TypeRef) -> IncludingTree {
        IncludingTree {
            root_type,
            children: self.children.clone(),
        }
    }
}
