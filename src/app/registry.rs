// ABOUTME: Workspace-wide registry mapping repository nodes to their opened handles and owning groups

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

use crate::git::Repository;

/// Resolves a node id to its opened repository without going through any active page.
#[derive(Debug, Default)]
pub struct WorkspaceRegistry {
    groups: Vec<String>,
    repositories: HashMap<String, Arc<Repository>>,
    owners: HashMap<String, String>,
}

impl WorkspaceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Mutex<Self>> {
        Arc::new(Mutex::new(Self::default()))
    }

    /// Remember that the group rooted at `group_id` is open in this workspace.
    pub fn add_group(&mut self, group_id: &str) {
        if !self.groups.iter().any(|g| g == group_id) {
            self.groups.push(group_id.to_string());
        }
    }

    pub fn groups(&self) -> &[String] {
        &self.groups
    }

    pub fn register(&mut self, group_id: &str, repository: Arc<Repository>) {
        let node_id = repository.node_id().to_string();
        debug!("Registering {} under group {}", node_id, group_id);
        self.owners.insert(node_id.clone(), group_id.to_string());
        self.repositories.insert(node_id, repository);
    }

    pub fn unregister(&mut self, node_id: &str) -> Option<Arc<Repository>> {
        self.owners.remove(node_id);
        self.repositories.remove(node_id)
    }

    pub fn repository(&self, node_id: &str) -> Option<Arc<Repository>> {
        self.repositories.get(node_id).cloned()
    }

    pub fn owning_group(&self, node_id: &str) -> Option<&str> {
        self.owners.get(node_id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.repositories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.repositories.is_empty()
    }
}
