use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::engine::{DeactivationReport, Reassignment};
use crate::error::{ReviewError, Result};
use crate::model::{NewPullRequest, PullRequest, PullRequestShort, Team, User};

/// Operation kinds accepted by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    CreatePullRequest,
    MergePullRequest,
    ReassignReviewer,
    GetTeam,
    SetUserActive,
    GetReviews,
    DeactivateTeam,
}

impl JobKind {
    pub const ALL: [JobKind; 7] = [
        JobKind::CreatePullRequest,
        JobKind::MergePullRequest,
        JobKind::ReassignReviewer,
        JobKind::GetTeam,
        JobKind::SetUserActive,
        JobKind::GetReviews,
        JobKind::DeactivateTeam,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::CreatePullRequest => "create_pr",
            JobKind::MergePullRequest => "merge_pr",
            JobKind::ReassignReviewer => "reassign_pr",
            JobKind::GetTeam => "get_team",
            JobKind::SetUserActive => "set_user_active",
            JobKind::GetReviews => "get_reviews",
            JobKind::DeactivateTeam => "deactivate_team",
        }
    }

    pub fn parse(kind: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == kind)
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<JobKind> for String {
    fn from(kind: JobKind) -> Self {
        kind.as_str().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestRef {
    pub pull_request_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReassignParams {
    pub pull_request_id: String,
    pub old_user_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamRef {
    pub team_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserActivity {
    pub user_id: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    pub user_id: String,
}

/// A job's parameter bag decoded into a typed engine call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    CreatePullRequest(NewPullRequest),
    MergePullRequest(PullRequestRef),
    ReassignReviewer(ReassignParams),
    GetTeam(TeamRef),
    SetUserActive(UserActivity),
    GetReviews(UserRef),
    DeactivateTeam(TeamRef),
}

impl Operation {
    /// Decode `params` for `kind`. Unknown kinds yield `UnknownOperation`,
    /// a parameter bag of the wrong shape yields `InvalidInput`.
    pub fn decode(kind: &str, params: Value) -> Result<Self> {
        let kind =
            JobKind::parse(kind).ok_or_else(|| ReviewError::UnknownOperation(kind.to_string()))?;

        Ok(match kind {
            JobKind::CreatePullRequest => Operation::CreatePullRequest(decode_params(kind, params)?),
            JobKind::MergePullRequest => Operation::MergePullRequest(decode_params(kind, params)?),
            JobKind::ReassignReviewer => Operation::ReassignReviewer(decode_params(kind, params)?),
            JobKind::GetTeam => Operation::GetTeam(decode_params(kind, params)?),
            JobKind::SetUserActive => Operation::SetUserActive(decode_params(kind, params)?),
            JobKind::GetReviews => Operation::GetReviews(decode_params(kind, params)?),
            JobKind::DeactivateTeam => Operation::DeactivateTeam(decode_params(kind, params)?),
        })
    }

    pub fn kind(&self) -> JobKind {
        match self {
            Operation::CreatePullRequest(_) => JobKind::CreatePullRequest,
            Operation::MergePullRequest(_) => JobKind::MergePullRequest,
            Operation::ReassignReviewer(_) => JobKind::ReassignReviewer,
            Operation::GetTeam(_) => JobKind::GetTeam,
            Operation::SetUserActive(_) => JobKind::SetUserActive,
            Operation::GetReviews(_) => JobKind::GetReviews,
            Operation::DeactivateTeam(_) => JobKind::DeactivateTeam,
        }
    }
}

fn decode_params<T: DeserializeOwned>(kind: JobKind, params: Value) -> Result<T> {
    serde_json::from_value(params).map_err(|e| ReviewError::InvalidInput(format!("{}: {}", kind, e)))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReviewList {
    pub user_id: String,
    pub pull_requests: Vec<PullRequestShort>,
}

/// Payload of a successful job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum JobOutput {
    PullRequest(PullRequest),
    Reassigned(Reassignment),
    Team(Team),
    User(User),
    Reviews(ReviewList),
    Deactivated(DeactivationReport),
}

/// Exactly one of these is delivered per job.
#[derive(Debug, Clone)]
pub struct JobResult {
    pub job_id: Uuid,
    pub kind: String,
    pub elapsed: Duration,
    pub outcome: Result<JobOutput>,
}

/// A unit of work travelling through the dispatcher queue.
#[derive(Debug)]
pub struct Job {
    pub id: Uuid,
    pub kind: String,
    pub params: Value,
    pub cancel: CancellationToken,
    pub created_at: DateTime<Utc>,
    reply: Option<oneshot::Sender<JobResult>>,
}

impl Job {
    /// Create a job and the handle its submitter waits on.
    pub fn new(kind: impl Into<String>, params: Value) -> (Job, JobHandle) {
        Self::with_token(kind, params, CancellationToken::new())
    }

    /// Create a job bound to an existing cancellation token.
    pub fn with_token(
        kind: impl Into<String>,
        params: Value,
        cancel: CancellationToken,
    ) -> (Job, JobHandle) {
        let (tx, rx) = oneshot::channel();
        let job = Job {
            id: Uuid::new_v4(),
            kind: kind.into(),
            params,
            cancel: cancel.clone(),
            created_at: Utc::now(),
            reply: Some(tx),
        };
        let handle = JobHandle {
            id: job.id,
            cancel,
            reply: rx,
        };
        (job, handle)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Deliver the job's result. Only the first call has any effect.
    /// Returns false if the result could not be delivered.
    pub fn respond(&mut self, outcome: Result<JobOutput>, elapsed: Duration) -> bool {
        let Some(reply) = self.reply.take() else {
            return false;
        };
        reply
            .send(JobResult {
                job_id: self.id,
                kind: self.kind.clone(),
                elapsed,
                outcome,
            })
            .is_ok()
    }

    /// Answer the job with an error without running it.
    pub fn reject(&mut self, err: ReviewError) -> bool {
        self.respond(Err(err), Duration::ZERO)
    }
}

/// Submitter's side of a job.
#[derive(Debug)]
pub struct JobHandle {
    pub id: Uuid,
    cancel: CancellationToken,
    reply: oneshot::Receiver<JobResult>,
}

impl JobHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Result if one has already been delivered.
    pub fn try_result(&mut self) -> Option<JobResult> {
        self.reply.try_recv().ok()
    }

    /// Wait for the job's result. Resolves to `Canceled` if the job is
    /// cancelled first or dropped without an answer.
    pub async fn wait(self) -> Result<JobOutput> {
        let JobHandle { cancel, reply, .. } = self;
        tokio::select! {
            biased;
            result = reply => match result {
                Ok(result) => result.outcome,
                Err(_) => Err(ReviewError::Canceled),
            },
            _ = cancel.cancelled() => Err(ReviewError::Canceled),
        }
    }
}
