// ABOUTME: Detects unfinished merges, rebases, cherry-picks and reverts from marker files in a git directory

use std::path::Path;
use tracing::trace;

use crate::models::InProgressKind;

/// Marker files checked in order; the first hit wins.
const MARKERS: &[(&str, InProgressKind)] = &[
    ("CHERRY_PICK_HEAD", InProgressKind::CherryPick),
    ("REBASE_HEAD", InProgressKind::Rebase),
    ("rebase-merge", InProgressKind::Rebase),
    ("rebase-apply", InProgressKind::Rebase),
    ("REVERT_HEAD", InProgressKind::Revert),
    ("MERGE_HEAD", InProgressKind::Merge),
];

/// Best-effort: unreadable directories report nothing.
pub fn scan(git_dir: &Path) -> Option<InProgressKind> {
    let found = MARKERS
        .iter()
        .find(|(marker, _)| git_dir.join(marker).exists())
        .map(|(_, kind)| *kind);
    if let Some(kind) = found {
        trace!("{} in progress in {}", kind, git_dir.display());
    }
    found
}
