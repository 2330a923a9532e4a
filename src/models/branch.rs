// ABOUTME: Branch summary for one repository - current branch, tracking status, local branches

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchSummary {
    /// `None` on a detached or unborn HEAD.
    pub current: Option<String>,
    /// Commits on the current branch not yet on its upstream.
    pub ahead: usize,
    pub behind: usize,
    pub local: Vec<String>,
}

impl BranchSummary {
    pub fn has_outgoing(&self) -> bool {
        self.current.is_some() && self.ahead > 0
    }
}
