//! Synchronization Pipeline Contract
//!
//! The two phases of a sync pass, as consumed by the coordinator. How a phase
//! reconciles databases or uploads chunks is up to the implementation; the
//! core only looks at the result codes and whether the change set is empty.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Outcome code of the pull (download) phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PullResultCode {
    /// Remote databases were downloaded and merged into the local view
    AppliedRemoteChanges,
    /// Nothing new on the remote side
    NoRemoteChanges,
}

/// Result of the pull phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullResult {
    pub result_code: PullResultCode,
    /// Number of remote database versions merged during this pull
    pub databases_applied: usize,
}

impl PullResult {
    pub fn no_changes() -> Self {
        Self {
            result_code: PullResultCode::NoRemoteChanges,
            databases_applied: 0,
        }
    }
}

/// Outcome code of the push (upload) phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PushResultCode {
    /// Local changes were indexed and uploaded
    AppliedChanges,
    /// The local tree matched the database, nothing uploaded
    NoChanges,
    /// Upload refused because unknown remote databases exist (pull first)
    UnknownDatabases,
}

/// Local file changes detected by the push phase.
///
/// Paths are relative to the synchronized root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    pub new_files: Vec<String>,
    pub changed_files: Vec<String>,
    pub deleted_files: Vec<String>,
    pub unchanged_files: Vec<String>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_new_file(mut self, path: impl Into<String>) -> Self {
        self.new_files.push(path.into());
        self
    }

    pub fn with_changed_file(mut self, path: impl Into<String>) -> Self {
        self.changed_files.push(path.into());
        self
    }

    pub fn with_deleted_file(mut self, path: impl Into<String>) -> Self {
        self.deleted_files.push(path.into());
        self
    }

    pub fn with_unchanged_file(mut self, path: impl Into<String>) -> Self {
        self.unchanged_files.push(path.into());
        self
    }

    /// Whether anything was created, modified or deleted.
    ///
    /// Unchanged files do not count.
    pub fn has_changes(&self) -> bool {
        !self.new_files.is_empty() || !self.changed_files.is_empty() || !self.deleted_files.is_empty()
    }

    /// Total number of created, modified and deleted files
    pub fn change_count(&self) -> usize {
        self.new_files.len() + self.changed_files.len() + self.deleted_files.len()
    }
}

/// Result of the push phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushResult {
    pub result_code: PushResultCode,
    pub change_set: ChangeSet,
}

impl PushResult {
    pub fn new(result_code: PushResultCode, change_set: ChangeSet) -> Self {
        Self {
            result_code,
            change_set,
        }
    }

    pub fn no_changes() -> Self {
        Self::new(PushResultCode::NoChanges, ChangeSet::new())
    }
}

/// Two-phase synchronization pipeline
///
/// `D` is the local database handle. It is owned by whoever builds the
/// coordinator and handed to every pass by reference; the coordinator never
/// runs two passes at once, so implementations may assume exclusive use for
/// the duration of a call.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::pipeline::{PullResult, PushResult, SyncPipeline};
///
/// struct Pipeline;
///
/// #[async_trait::async_trait]
/// impl SyncPipeline<LocalDatabase> for Pipeline {
///     async fn pull(&self, db: &LocalDatabase) -> Result<PullResult> {
///         db.merge_remote().await
///     }
///
///     async fn push(&self, db: &LocalDatabase) -> Result<PushResult> {
///         db.index_and_upload().await
///     }
/// }
/// ```
#[async_trait]
pub trait SyncPipeline<D>: Send + Sync
where
    D: Send + Sync + ?Sized,
{
    /// Download and merge remote changes into the local database
    async fn pull(&self, database: &D) -> Result<PullResult>;

    /// Index local changes and upload them
    async fn push(&self, database: &D) -> Result<PushResult>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_change_set_has_no_changes() {
        assert!(!ChangeSet::new().has_changes());
        assert_eq!(ChangeSet::new().change_count(), 0);
    }

    #[test]
    fn test_unchanged_files_do_not_count() {
        let set = ChangeSet::new()
            .with_unchanged_file("a.txt")
            .with_unchanged_file("b.txt");
        assert!(!set.has_changes());
    }

    #[test]
    fn test_change_count() {
        let set = ChangeSet::new()
            .with_new_file("new.txt")
            .with_changed_file("edited.txt")
            .with_deleted_file("gone.txt")
            .with_unchanged_file("same.txt");

        assert!(set.has_changes());
        assert_eq!(set.change_count(), 3);
    }

    #[test]
    fn test_deleted_only_is_a_change() {
        let set = ChangeSet::new().with_deleted_file("gone.txt");
        assert!(set.has_changes());
    }

    #[test]
    fn test_push_result_no_changes() {
        let result = PushResult::no_changes();
        assert_eq!(result.result_code, PushResultCode::NoChanges);
        assert!(!result.change_set.has_changes());
    }
}
