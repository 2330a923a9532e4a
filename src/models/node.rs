// ABOUTME: Repository tree node - a folder or a repository leaf inside a group's tree

use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryNode {
    /// Normalized absolute path for repositories, a generated id for folders.
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub is_repository: bool,
    #[serde(default)]
    pub is_expanded: bool,
    /// Derived from the group's search filter.
    #[serde(skip, default = "default_visible")]
    pub is_visible: bool,
    /// Recomputed every time the tree is flattened into rows.
    #[serde(skip)]
    pub depth: usize,
    #[serde(default)]
    pub sub_nodes: Vec<RepositoryNode>,
}

fn default_visible() -> bool {
    true
}

impl RepositoryNode {
    pub fn folder(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            is_repository: false,
            is_expanded: false,
            is_visible: true,
            depth: 0,
            sub_nodes: Vec::new(),
        }
    }

    pub fn repository(path: impl AsRef<str>) -> Self {
        let id = normalize_id(path.as_ref());
        let name = id
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string();
        Self::repository_named(id, name)
    }

    pub fn repository_named(path: impl AsRef<str>, name: impl Into<String>) -> Self {
        Self {
            id: normalize_id(path.as_ref()),
            name: name.into(),
            is_repository: true,
            is_expanded: false,
            is_visible: true,
            depth: 0,
            sub_nodes: Vec::new(),
        }
    }

    pub fn with_children(mut self, children: Vec<RepositoryNode>) -> Self {
        self.sub_nodes = children;
        self
    }

    pub fn expanded(mut self) -> Self {
        self.is_expanded = true;
        self
    }

    pub fn has_children(&self) -> bool {
        !self.sub_nodes.is_empty()
    }

    /// A repository leaf whose directory has disappeared.
    pub fn is_invalid(&self) -> bool {
        self.is_repository && !Path::new(&self.id).is_dir()
    }

    pub fn find(&self, id: &str) -> Option<&RepositoryNode> {
        if self.id == id {
            return Some(self);
        }
        self.sub_nodes.iter().find_map(|node| node.find(id))
    }

    pub fn find_mut(&mut self, id: &str) -> Option<&mut RepositoryNode> {
        if self.id == id {
            return Some(self);
        }
        self.sub_nodes.iter_mut().find_map(|node| node.find_mut(id))
    }

    /// Detach the descendant with `id` from this subtree.
    pub fn remove(&mut self, id: &str) -> Option<RepositoryNode> {
        if let Some(idx) = self.sub_nodes.iter().position(|node| node.id == id) {
            return Some(self.sub_nodes.remove(idx));
        }
        self.sub_nodes.iter_mut().find_map(|node| node.remove(id))
    }

    /// Ids of every repository leaf in this subtree, pre-order.
    pub fn repository_ids(&self) -> Vec<String> {
        let mut ids = Vec::new();
        self.collect_repository_ids(&mut ids, false);
        ids
    }

    /// Ids of every visible repository leaf reachable through visible folders.
    pub fn visible_repository_ids(&self) -> Vec<String> {
        let mut ids = Vec::new();
        self.collect_repository_ids(&mut ids, true);
        ids
    }

    fn collect_repository_ids(&self, ids: &mut Vec<String>, visible_only: bool) {
        if visible_only && !self.is_visible {
            return;
        }
        if self.is_repository {
            ids.push(self.id.clone());
        }
        for node in &self.sub_nodes {
            node.collect_repository_ids(ids, visible_only);
        }
    }
}

/// Repository ids use forward slashes on every platform.
pub fn normalize_id(path: &str) -> String {
    path.replace('\\', "/")
}
