// ABOUTME: Multi-step operations a repository can be left in (merge, rebase, cherry-pick, revert)

use serde::{Deserialize, Serialize};
use std::fmt;

/// Declaration order is display priority: earlier kinds surface first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InProgressKind {
    Rebase,
    CherryPick,
    Revert,
    Merge,
}

impl InProgressKind {
    /// The `git` subcommand that owns the operation.
    pub fn command(self) -> &'static str {
        match self {
            Self::Rebase => "rebase",
            Self::CherryPick => "cherry-pick",
            Self::Revert => "revert",
            Self::Merge => "merge",
        }
    }
}

impl fmt::Display for InProgressKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.command())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InProgressContext {
    pub kind: InProgressKind,
    /// Full path of the repository that is mid-operation.
    pub repository: String,
}
