//! # Sync Runner
//!
//! Executes one pull-then-push pass against the local database and
//! classifies what it did. The push phase only runs after a successful pull,
//! so local changes are never uploaded against a stale base.

use crate::trigger::PassStatus;
use crate::SyncError;
use bridge_traits::pipeline::{ChangeSet, PushResultCode, SyncPipeline};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Result of one pass
#[derive(Debug)]
pub enum SyncOutcome {
    /// Pull and push succeeded, nothing was uploaded
    NoChanges,
    /// Push applied local changes
    Changes(ChangeSet),
    /// Pull or push failed
    Failed(SyncError),
}

impl SyncOutcome {
    pub fn status(&self) -> PassStatus {
        match self {
            SyncOutcome::NoChanges => PassStatus::NoChanges,
            SyncOutcome::Changes(_) => PassStatus::Changes,
            SyncOutcome::Failed(_) => PassStatus::Failed,
        }
    }

    pub fn has_changes(&self) -> bool {
        matches!(self, SyncOutcome::Changes(_))
    }
}

/// Runs the two pipeline phases in order
pub struct SyncRunner<D> {
    pipeline: Arc<dyn SyncPipeline<D>>,
}

impl<D> SyncRunner<D>
where
    D: Send + Sync + 'static,
{
    pub fn new(pipeline: Arc<dyn SyncPipeline<D>>) -> Self {
        Self { pipeline }
    }

    /// Run one pass. Never panics on phase errors; they come back as
    /// [`SyncOutcome::Failed`].
    #[instrument(skip_all)]
    pub async fn run(&self, database: &D) -> SyncOutcome {
        let pull = match self.pipeline.pull(database).await {
            Ok(pull) => pull,
            Err(e) => return SyncOutcome::Failed(SyncError::Pull(e)),
        };
        debug!(
            result = ?pull.result_code,
            databases_applied = pull.databases_applied,
            "Pull phase finished"
        );

        let push = match self.pipeline.push(database).await {
            Ok(push) => push,
            Err(e) => return SyncOutcome::Failed(SyncError::Push(e)),
        };
        debug!(
            result = ?push.result_code,
            changes = push.change_set.change_count(),
            "Push phase finished"
        );

        if push.result_code == PushResultCode::AppliedChanges && push.change_set.has_changes() {
            SyncOutcome::Changes(push.change_set)
        } else {
            SyncOutcome::NoChanges
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::{BridgeError, Result as BridgeResult};
    use bridge_traits::pipeline::{PullResult, PushResult};
    use std::sync::Mutex;

    struct Database;

    struct ScriptedPipeline {
        calls: Mutex<Vec<&'static str>>,
        fail_pull: bool,
        fail_push: bool,
        push: PushResult,
    }

    impl ScriptedPipeline {
        fn new(push: PushResult) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail_pull: false,
                fail_push: false,
                push,
            }
        }

        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SyncPipeline<Database> for ScriptedPipeline {
        async fn pull(&self, _database: &Database) -> BridgeResult<PullResult> {
            self.calls.lock().unwrap().push("pull");
            if self.fail_pull {
                return Err(BridgeError::Connection("storage offline".to_string()));
            }
            Ok(PullResult::no_changes())
        }

        async fn push(&self, _database: &Database) -> BridgeResult<PushResult> {
            self.calls.lock().unwrap().push("push");
            if self.fail_push {
                return Err(BridgeError::OperationFailed("upload rejected".to_string()));
            }
            Ok(self.push.clone())
        }
    }

    fn runner(pipeline: &Arc<ScriptedPipeline>) -> SyncRunner<Database> {
        SyncRunner::new(pipeline.clone())
    }

    #[tokio::test]
    async fn test_pull_runs_before_push() {
        let pipeline = Arc::new(ScriptedPipeline::new(PushResult::no_changes()));

        let outcome = runner(&pipeline).run(&Database).await;

        assert!(matches!(outcome, SyncOutcome::NoChanges));
        assert_eq!(pipeline.calls(), vec!["pull", "push"]);
    }

    #[tokio::test]
    async fn test_pull_failure_skips_push() {
        let mut pipeline = ScriptedPipeline::new(PushResult::no_changes());
        pipeline.fail_pull = true;
        let pipeline = Arc::new(pipeline);

        let outcome = runner(&pipeline).run(&Database).await;

        assert!(matches!(outcome, SyncOutcome::Failed(SyncError::Pull(_))));
        assert_eq!(outcome.status(), PassStatus::Failed);
        assert_eq!(pipeline.calls(), vec!["pull"]);
    }

    #[tokio::test]
    async fn test_push_failure_is_named() {
        let mut pipeline = ScriptedPipeline::new(PushResult::no_changes());
        pipeline.fail_push = true;
        let pipeline = Arc::new(pipeline);

        let outcome = runner(&pipeline).run(&Database).await;

        match outcome {
            SyncOutcome::Failed(err) => {
                assert!(matches!(err, SyncError::Push(_)));
                assert!(err.to_string().starts_with("Push phase failed"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_applied_changes_reported() {
        let change_set = ChangeSet::new().with_new_file("notes.txt");
        let pipeline = Arc::new(ScriptedPipeline::new(PushResult::new(
            PushResultCode::AppliedChanges,
            change_set.clone(),
        )));

        let outcome = runner(&pipeline).run(&Database).await;

        match outcome {
            SyncOutcome::Changes(set) => assert_eq!(set, change_set),
            other => panic!("expected changes, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_applied_code_with_empty_change_set_is_no_change() {
        let pipeline = Arc::new(ScriptedPipeline::new(PushResult::new(
            PushResultCode::AppliedChanges,
            ChangeSet::new().with_unchanged_file("same.txt"),
        )));

        let outcome = runner(&pipeline).run(&Database).await;

        assert!(!outcome.has_changes());
        assert_eq!(outcome.status(), PassStatus::NoChanges);
    }

    #[tokio::test]
    async fn test_changes_without_applied_code_is_no_change() {
        let pipeline = Arc::new(ScriptedPipeline::new(PushResult::new(
            PushResultCode::UnknownDatabases,
            ChangeSet::new().with_changed_file("draft.txt"),
        )));

        let outcome = runner(&pipeline).run(&Database).await;

        assert!(matches!(outcome, SyncOutcome::NoChanges));
    }
}
