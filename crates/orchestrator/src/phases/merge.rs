//! Merge phase: pull request, human approval, then exactly one merge.

use async_trait::async_trait;
use events::{ApprovalPayload, Event};
use phaseflow_core::{PullRequestRef, Task};
use serde_json::json;
use tracing::{info, warn};
use vcs::{CreatePrRequest, MergeMethod, MergeOptions, PrState, VcsError};

use crate::approval::ApprovalDecision;
use crate::core::{ContextUpdate, Phase, PhaseContext, PhaseSuccess};
use crate::error::{OrchestratorError, Result};
use crate::services::ExecutorContext;

/// Ships the task's branch.
///
/// 1. Commits leftover changes and pushes the task branch.
/// 2. Reuses the task's recorded PR while it is open, otherwise opens one and
///    records it. A recorded PR that is already merged ends the phase.
/// 3. Unless the task auto-merges, waits on the approval gate. A denial is a
///    successful phase with `merged: false`.
/// 4. Re-checks the live PR status; closed or conflicting PRs fail the phase,
///    failing checks only warn.
/// 5. Squash-merges and deletes the branch.
///
/// A cancelled run stops before the approval request and before the merge.
pub struct MergePhase;

impl MergePhase {
    async fn flush_changes(ctx: &ExecutorContext, task: &Task, context: &PhaseContext) -> Result<()> {
        let dir = &context.working_dir;
        if ctx.vcs.has_changes(dir).await? {
            info!(task_id = %task.id, "Committing uncommitted work before opening PR");
            ctx.vcs
                .commit_and_push(dir, &context.branch_name, &task.summary_title())
                .await?;
        } else {
            ctx.vcs.push_branch(dir, &context.branch_name).await?;
        }
        Ok(())
    }

    /// The task's recorded PR with its live state, unless it no longer exists
    async fn recorded_pull_request(
        ctx: &ExecutorContext,
        context: &PhaseContext,
    ) -> Result<Option<(PullRequestRef, PrState)>> {
        let Some(pr) = context.pull_request.clone() else {
            return Ok(None);
        };
        match ctx
            .vcs
            .get_pull_request_status(&context.working_dir, pr.number)
            .await
        {
            Ok(status) => Ok(Some((pr, status.state))),
            Err(VcsError::PullRequestNotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn open_pull_request(
        ctx: &ExecutorContext,
        task: &Task,
        context: &PhaseContext,
    ) -> Result<PullRequestRef> {
        let created = ctx
            .vcs
            .create_pull_request(
                &context.working_dir,
                CreatePrRequest {
                    title: task.summary_title(),
                    body: task.summary_body(),
                    base_branch: context.base_branch.clone(),
                    head_branch: Some(context.branch_name.clone()),
                    draft: ctx.config.draft_pull_requests,
                },
            )
            .await?;
        let pr = PullRequestRef {
            number: created.number,
            url: created.url,
        };

        ctx.store
            .set_pull_request(task.id, pr.number, &pr.url)
            .await?;
        info!(task_id = %task.id, pr_number = pr.number, pr_url = %pr.url, "Pull request created");
        ctx.emit_event(
            task.id,
            Event::MergePrCreated {
                pr_number: pr.number,
                pr_url: pr.url.clone(),
                title: created.title,
            },
        );
        Ok(pr)
    }

    async fn await_approval(
        ctx: &ExecutorContext,
        task: &Task,
        context: &PhaseContext,
        pr: &PullRequestRef,
    ) -> Result<ApprovalDecision> {
        let cancelled = ctx.cancellations.token(task.id);
        let request = ctx.approvals.request(
            task.id,
            ApprovalPayload {
                pr_number: pr.number,
                pr_url: pr.url.clone(),
                title: task.summary_title(),
                branch_name: context.branch_name.clone(),
                base_branch: context.base_branch.clone(),
            },
        );

        tokio::select! {
            biased;
            _ = cancelled.cancelled() => Err(OrchestratorError::Cancelled(task.id)),
            decision = request => decision,
        }
    }

    fn completed(pr: &PullRequestRef, merged: bool) -> PhaseSuccess {
        PhaseSuccess::new(json!({
            "pr_number": pr.number,
            "pr_url": pr.url,
            "merged": merged,
        }))
        .with_updates(ContextUpdate {
            pull_request: Some(pr.clone()),
            merged: Some(merged),
            ..Default::default()
        })
        .with_merged(merged)
    }
}

#[async_trait]
impl Phase for MergePhase {
    fn name(&self) -> &'static str {
        "merge"
    }

    async fn execute(
        &self,
        ctx: &ExecutorContext,
        task: &Task,
        context: &PhaseContext,
    ) -> Result<PhaseSuccess> {
        let dir = &context.working_dir;

        let recorded = Self::recorded_pull_request(ctx, context).await?;
        if let Some((pr, PrState::Merged)) = &recorded {
            info!(task_id = %task.id, pr_number = pr.number, "Recorded PR already merged");
            return Ok(Self::completed(pr, true));
        }

        Self::flush_changes(ctx, task, context).await?;

        let pr = match recorded {
            Some((pr, PrState::Open)) => {
                info!(task_id = %task.id, pr_number = pr.number, "Reusing open pull request");
                pr
            }
            _ => Self::open_pull_request(ctx, task, context).await?,
        };

        ctx.ensure_not_cancelled(task.id)?;

        if !task.auto_merge {
            let decision = Self::await_approval(ctx, task, context, &pr).await?;
            if decision == ApprovalDecision::Denied {
                info!(task_id = %task.id, pr_number = pr.number, "Merge denied, leaving PR open");
                ctx.emit_event(
                    task.id,
                    Event::MergeCompleted {
                        pr_number: pr.number,
                        merged: false,
                    },
                );
                return Ok(Self::completed(&pr, false));
            }
        }

        let status = ctx.vcs.get_pull_request_status(dir, pr.number).await?;
        if status.state != PrState::Open {
            return Err(OrchestratorError::ExecutionFailed(format!(
                "PR #{} is {}, cannot merge",
                pr.number,
                status.state.as_str()
            )));
        }
        if !status.mergeable {
            return Err(OrchestratorError::ExecutionFailed(format!(
                "PR #{} has merge conflicts with {}",
                pr.number, context.base_branch
            )));
        }
        if status.checks.failed > 0 {
            warn!(
                task_id = %task.id,
                pr_number = pr.number,
                failed = status.checks.failed,
                pending = status.checks.pending,
                "Merging with failing checks"
            );
        }

        ctx.ensure_not_cancelled(task.id)?;
        ctx.vcs
            .merge_pull_request(
                dir,
                pr.number,
                MergeOptions {
                    method: MergeMethod::Squash,
                    delete_after_merge: true,
                },
            )
            .await?;

        info!(task_id = %task.id, pr_number = pr.number, "Pull request merged");
        ctx.emit_event(
            task.id,
            Event::MergeCompleted {
                pr_number: pr.number,
                merged: true,
            },
        );

        Ok(Self::completed(&pr, true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ExecutionEngine, PhaseResult};
    use crate::test_support::TestHarness;
    use std::path::PathBuf;
    use uuid::Uuid;
    use vcs::{CheckSummary, PrStatus};

    async fn wait_for_approval_request(harness: &TestHarness, task_id: Uuid) {
        while !harness.context().approvals.is_pending(task_id) {
            tokio::task::yield_now().await;
        }
    }

    fn spawn_merge(harness: &TestHarness, task: Task) -> tokio::task::JoinHandle<PhaseResult> {
        let ctx = harness.context();
        tokio::spawn(async move {
            let context = PhaseContext::for_task(&task, "/repo", "main");
            ExecutionEngine::new(&ctx)
                .execute(&MergePhase, "ship", &task, &context)
                .await
        })
    }

    fn with_recorded_pr(task: Task) -> Task {
        Task {
            pull_request: Some(PullRequestRef {
                number: 7,
                url: "https://example/pr/7".to_string(),
            }),
            ..task
        }
    }

    fn names(observer: &mut events::TaskObserver) -> Vec<&'static str> {
        std::iter::from_fn(|| observer.try_recv())
            .map(|envelope| envelope.name())
            .collect()
    }

    fn open_status(mergeable: bool, failed: u32) -> PrStatus {
        PrStatus {
            state: PrState::Open,
            mergeable,
            checks: CheckSummary {
                passed: 1,
                failed,
                pending: 0,
            },
        }
    }

    #[tokio::test]
    async fn test_approved_merge_runs_exactly_once() {
        let harness = TestHarness::new();
        let task = Task::new("Add login", "Users sign in");
        let task_id = task.id;
        *harness.vcs.dirty.lock().unwrap() = true;

        let run = spawn_merge(&harness, task);
        wait_for_approval_request(&harness, task_id).await;
        harness
            .context()
            .approvals
            .resolve(task_id, ApprovalDecision::Approved)
            .unwrap();

        let result = run.await.unwrap();
        assert!(result.success);
        assert_eq!(result.merged, Some(true));
        assert_eq!(
            harness.vcs.merges(),
            vec![(
                42,
                MergeOptions {
                    method: MergeMethod::Squash,
                    delete_after_merge: true
                }
            )]
        );
        assert_eq!(harness.vcs.commits.lock().unwrap().len(), 1);
        assert_eq!(
            *harness.store.records.lock().unwrap(),
            vec![(task_id, 42, "https://example/pr/42".to_string())]
        );

        let request = harness.vcs.pr_requests.lock().unwrap()[0].clone();
        assert_eq!(request.base_branch, "main");
        assert_eq!(request.head_branch, Some(format!("task-{}", task_id)));
        assert_eq!(
            *harness.vcs.pushes.lock().unwrap(),
            vec![(PathBuf::from("/repo"), format!("task-{}", task_id))]
        );
    }

    #[tokio::test]
    async fn test_clean_tree_still_pushes_branch() {
        let harness = TestHarness::new();
        let task = Task::new("Add login", "").with_auto_merge(true);
        let branch = task.default_branch_name();

        let result = spawn_merge(&harness, task).await.unwrap();

        assert!(result.success);
        assert!(harness.vcs.commits.lock().unwrap().is_empty());
        assert_eq!(
            *harness.vcs.pushes.lock().unwrap(),
            vec![(PathBuf::from("/repo"), branch)]
        );
    }

    #[tokio::test]
    async fn test_denied_merge_succeeds_without_merging() {
        let harness = TestHarness::new();
        let task = Task::new("Add login", "");
        let task_id = task.id;

        let run = spawn_merge(&harness, task);
        wait_for_approval_request(&harness, task_id).await;
        harness
            .context()
            .approvals
            .resolve(task_id, ApprovalDecision::Denied)
            .unwrap();

        let result = run.await.unwrap();
        assert!(result.success);
        assert_eq!(result.merged, Some(false));
        assert!(harness.vcs.merges().is_empty());
    }

    #[tokio::test]
    async fn test_conflicting_pr_is_not_merged() {
        let harness = TestHarness::new();
        harness.vcs.set_status(open_status(false, 0));
        let task = Task::new("Add login", "").with_auto_merge(true);

        let result = spawn_merge(&harness, task).await.unwrap();

        assert!(!result.success);
        assert!(result.error.unwrap().contains("merge conflicts"));
        assert!(harness.vcs.merges().is_empty());
    }

    #[tokio::test]
    async fn test_closed_pr_is_not_merged() {
        let harness = TestHarness::new();
        harness.vcs.set_status(PrStatus {
            state: PrState::Closed,
            ..open_status(true, 0)
        });
        let task = Task::new("Add login", "").with_auto_merge(true);

        let result = spawn_merge(&harness, task).await.unwrap();

        assert!(!result.success);
        assert!(result.error.unwrap().contains("closed"));
        assert!(harness.vcs.merges().is_empty());
    }

    #[tokio::test]
    async fn test_failing_checks_only_warn() {
        let harness = TestHarness::new();
        harness.vcs.set_status(open_status(true, 2));
        let task = Task::new("Add login", "").with_auto_merge(true);

        let result = spawn_merge(&harness, task).await.unwrap();

        assert!(result.success);
        assert_eq!(harness.vcs.merges().len(), 1);
    }

    #[tokio::test]
    async fn test_pr_creation_failure_fails_immediately() {
        let harness = TestHarness::new();
        *harness.vcs.create_error.lock().unwrap() = Some("no commits between main and task".into());
        let task = Task::new("Add login", "");
        let mut observer = harness.bridge.subscribe(task.id);

        let result = spawn_merge(&harness, task).await.unwrap();

        assert!(!result.success);
        assert!(harness.store.records.lock().unwrap().is_empty());
        assert_eq!(harness.context().approvals.pending_count(), 0);

        let names: Vec<_> = std::iter::from_fn(|| observer.try_recv())
            .map(|envelope| envelope.name())
            .collect();
        assert_eq!(names, vec!["phase:start", "phase:complete"]);
    }

    #[tokio::test]
    async fn test_notifications_for_approved_merge() {
        let harness = TestHarness::new();
        let task = Task::new("Add login", "");
        let task_id = task.id;
        let mut observer = harness.bridge.subscribe(task_id);

        let run = spawn_merge(&harness, task);
        wait_for_approval_request(&harness, task_id).await;
        harness
            .context()
            .approvals
            .resolve(task_id, ApprovalDecision::Approved)
            .unwrap();
        run.await.unwrap();

        let names: Vec<_> = std::iter::from_fn(|| observer.try_recv())
            .map(|envelope| envelope.name())
            .collect();
        assert_eq!(
            names,
            vec![
                "phase:start",
                "merge:pr_created",
                "merge:approval_required",
                "merge:completed",
                "phase:complete"
            ]
        );
    }

    #[tokio::test]
    async fn test_cancelled_approval_fails_phase() {
        let harness = TestHarness::new();
        let task = Task::new("Add login", "");
        let task_id = task.id;

        let run = spawn_merge(&harness, task);
        wait_for_approval_request(&harness, task_id).await;
        assert!(harness.context().approvals.cancel(task_id));

        let result = run.await.unwrap();
        assert!(!result.success);
        assert!(harness.vcs.merges().is_empty());
    }

    #[tokio::test]
    async fn test_open_recorded_pr_is_reused() {
        let harness = TestHarness::new();
        let task = with_recorded_pr(Task::new("Add login", "").with_auto_merge(true));
        let mut observer = harness.bridge.subscribe(task.id);

        let result = spawn_merge(&harness, task).await.unwrap();

        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.output["pr_number"], 7);
        assert!(harness.vcs.pr_requests.lock().unwrap().is_empty());
        assert!(harness.store.records.lock().unwrap().is_empty());
        assert_eq!(harness.vcs.merges()[0].0, 7);
        assert_eq!(harness.vcs.pushes.lock().unwrap().len(), 1);
        assert!(!names(&mut observer).contains(&"merge:pr_created"));
    }

    #[tokio::test]
    async fn test_merged_recorded_pr_is_not_merged_again() {
        let harness = TestHarness::new();
        harness.vcs.set_status_for(
            7,
            PrStatus {
                state: PrState::Merged,
                ..open_status(true, 0)
            },
        );
        let task = with_recorded_pr(Task::new("Add login", "").with_auto_merge(true));

        let result = spawn_merge(&harness, task).await.unwrap();

        assert!(result.success);
        assert_eq!(result.merged, Some(true));
        assert!(harness.vcs.merges().is_empty());
        assert!(harness.vcs.pr_requests.lock().unwrap().is_empty());
        assert!(harness.vcs.pushes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_closed_recorded_pr_is_replaced() {
        let harness = TestHarness::new();
        harness.vcs.set_status_for(
            7,
            PrStatus {
                state: PrState::Closed,
                ..open_status(true, 0)
            },
        );
        let task = with_recorded_pr(Task::new("Add login", "").with_auto_merge(true));
        let task_id = task.id;

        let result = spawn_merge(&harness, task).await.unwrap();

        assert!(result.success, "{:?}", result.error);
        assert_eq!(harness.vcs.pr_requests.lock().unwrap().len(), 1);
        assert_eq!(
            *harness.store.records.lock().unwrap(),
            vec![(task_id, 42, "https://example/pr/42".to_string())]
        );
        assert_eq!(harness.vcs.merges()[0].0, 42);
    }

    #[tokio::test]
    async fn test_cancel_during_pr_creation_skips_approval() {
        let harness = TestHarness::new();
        let hold = harness.vcs.hold_pull_request();
        let task = Task::new("Add login", "");
        let task_id = task.id;
        harness.context().cancellations.register(task_id);
        let mut observer = harness.bridge.subscribe(task_id);

        let run = spawn_merge(&harness, task);
        hold.entered.notified().await;
        assert!(harness.context().cancellations.cancel(task_id));
        hold.release.notify_one();

        let result = run.await.unwrap();
        assert!(!result.success);
        assert_eq!(
            result.error,
            Some(format!("Run cancelled for task {}", task_id))
        );
        assert_eq!(harness.context().approvals.pending_count(), 0);
        assert!(harness.vcs.merges().is_empty());
        assert_eq!(
            names(&mut observer),
            vec!["phase:start", "merge:pr_created", "phase:complete"]
        );
    }

    #[tokio::test]
    async fn test_cancel_token_ends_approval_wait() {
        let harness = TestHarness::new();
        let task = Task::new("Add login", "");
        let task_id = task.id;
        harness.context().cancellations.register(task_id);

        let run = spawn_merge(&harness, task);
        wait_for_approval_request(&harness, task_id).await;
        harness.context().cancellations.cancel(task_id);

        let result = run.await.unwrap();
        assert!(!result.success);
        assert!(result.error.unwrap().contains("Run cancelled"));
        assert_eq!(harness.context().approvals.pending_count(), 0);
        assert!(harness.vcs.merges().is_empty());
    }
}
