// ABOUTME: Core data models for repository groups - change records, tree nodes, branches, in-progress state

pub mod branch;
pub mod change;
pub mod in_progress;
pub mod node;

pub use branch::BranchSummary;
pub use change::{ChangeKey, ChangeRecord, ChangeState};
pub use in_progress::{InProgressContext, InProgressKind};
pub use node::RepositoryNode;
