use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::dispatcher::job::{Job, JobOutput, Operation, ReviewList};
use crate::engine::ReviewEngine;
use crate::error::{ReviewError, Result};

/// Runs dequeued jobs against the assignment engine.
#[derive(Clone)]
pub struct JobExecutor {
    engine: Arc<ReviewEngine>,
}

impl JobExecutor {
    pub fn new(engine: Arc<ReviewEngine>) -> Self {
        Self { engine }
    }

    /// Execute one job and deliver its result to the submitter.
    pub async fn execute(&self, worker: usize, mut job: Job) {
        let queued_ms = (Utc::now() - job.created_at).num_milliseconds().max(0);
        let started = Instant::now();

        let outcome = if job.is_cancelled() {
            Err(ReviewError::Canceled)
        } else {
            let params = std::mem::take(&mut job.params);
            match Operation::decode(&job.kind, params) {
                Ok(op) => self.run(op, &job.cancel).await,
                Err(e) => Err(e),
            }
        };
        let elapsed = started.elapsed();

        match &outcome {
            Ok(_) => tracing::info!(
                job_id = %job.id,
                kind = %job.kind,
                worker,
                queued_ms,
                elapsed_ms = elapsed.as_millis() as u64,
                "Job completed"
            ),
            Err(e) => tracing::warn!(
                job_id = %job.id,
                kind = %job.kind,
                worker,
                queued_ms,
                elapsed_ms = elapsed.as_millis() as u64,
                code = e.code(),
                error = %e,
                "Job failed"
            ),
        }

        if !job.respond(outcome, elapsed) {
            tracing::warn!(job_id = %job.id, kind = %job.kind, "Submitter gone, result dropped");
        }
    }

    /// Dispatch a decoded operation to the engine.
    pub async fn run(&self, op: Operation, cancel: &CancellationToken) -> Result<JobOutput> {
        let engine = &self.engine;
        match op {
            Operation::CreatePullRequest(new_pr) => engine
                .create_pull_request(new_pr, cancel)
                .await
                .map(JobOutput::PullRequest),
            Operation::MergePullRequest(p) => engine
                .merge_pull_request(&p.pull_request_id)
                .await
                .map(JobOutput::PullRequest),
            Operation::ReassignReviewer(p) => engine
                .reassign(&p.pull_request_id, &p.old_user_id, cancel)
                .await
                .map(JobOutput::Reassigned),
            Operation::GetTeam(p) => engine.get_team(&p.team_name).await.map(JobOutput::Team),
            Operation::SetUserActive(p) => engine
                .set_user_active(&p.user_id, p.is_active)
                .await
                .map(JobOutput::User),
            Operation::GetReviews(p) => {
                let pull_requests = engine.reviews_for(&p.user_id).await?;
                Ok(JobOutput::Reviews(ReviewList {
                    user_id: p.user_id,
                    pull_requests,
                }))
            }
            Operation::DeactivateTeam(p) => engine
                .deactivate_team(&p.team_name, cancel)
                .await
                .map(JobOutput::Deactivated),
        }
    }
}
