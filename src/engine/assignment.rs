use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::engine::{checkpoint, require, ReviewEngine};
use crate::error::{ReviewError, Result, StorageContext, StorageError};
use crate::model::{
    needs_more_reviewers, NewPullRequest, PrStatus, PullRequest, Reviewer, MAX_REVIEWERS,
};

/// Outcome of a successful reassignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reassignment {
    #[serde(rename = "pr")]
    pub pull_request: PullRequest,
    pub replaced_by: String,
}

impl ReviewEngine {
    /// Open a pull request and assign up to two reviewers from the author's team.
    pub async fn create_pull_request(
        &self,
        new_pr: NewPullRequest,
        cancel: &CancellationToken,
    ) -> Result<PullRequest> {
        require("pull_request_id", &new_pr.pull_request_id)?;
        require("pull_request_name", &new_pr.pull_request_name)?;
        require("author_id", &new_pr.author_id)?;

        let id = new_pr.pull_request_id.as_str();
        let _guard = self.locks.lock(id).await;

        match self.storage.get_pull_request(id).await {
            Ok(_) => return Err(ReviewError::AlreadyExists(id.to_string())),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(ReviewError::storage("load pull request", e)),
        }

        let team = self
            .storage
            .get_user_team(&new_pr.author_id)
            .await
            .context("resolve author team")?;
        let mut pool = self
            .storage
            .active_team_members_except(&team, Some(&new_pr.author_id))
            .await
            .context("list candidates")?;

        let mut reviewers = Vec::with_capacity(MAX_REVIEWERS);
        while reviewers.len() < MAX_REVIEWERS && !pool.is_empty() {
            checkpoint(cancel)?;
            if let Some(user) = self.draw_active(&mut pool).await? {
                reviewers.push(Reviewer::from(&user));
            }
        }

        let pr = PullRequest {
            pull_request_id: new_pr.pull_request_id.clone(),
            pull_request_name: new_pr.pull_request_name,
            author_id: new_pr.author_id,
            status: PrStatus::Open,
            need_more_reviewers: needs_more_reviewers(reviewers.len()),
            assigned_reviewers: reviewers,
            created_at: Utc::now(),
            merged_at: None,
        };

        match self.storage.insert_pull_request(&pr).await {
            Ok(()) => {}
            Err(StorageError::Conflict(_)) => {
                return Err(ReviewError::AlreadyExists(pr.pull_request_id))
            }
            Err(e) => return Err(ReviewError::storage("insert pull request", e)),
        }

        tracing::info!(
            pr = %pr.pull_request_id,
            author = %pr.author_id,
            reviewers = ?pr.reviewer_ids(),
            "Pull request created"
        );

        self.storage
            .get_pull_request(id)
            .await
            .context("load pull request")
    }

    /// Mark a pull request merged. Merging twice returns the stored record unchanged.
    pub async fn merge_pull_request(&self, pull_request_id: &str) -> Result<PullRequest> {
        require("pull_request_id", pull_request_id)?;
        let _guard = self.locks.lock(pull_request_id).await;

        let pr = self
            .storage
            .get_pull_request(pull_request_id)
            .await
            .context("load pull request")?;
        if pr.is_merged() {
            return Ok(pr);
        }

        let merged = self
            .storage
            .merge_pull_request(pull_request_id, Utc::now())
            .await
            .context("merge pull request")?;
        tracing::info!(pr = %pull_request_id, "Pull request merged");
        Ok(merged)
    }

    /// Replace `old_user_id` with a random active member of their team.
    pub async fn reassign(
        &self,
        pull_request_id: &str,
        old_user_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Reassignment> {
        require("pull_request_id", pull_request_id)?;
        require("old_user_id", old_user_id)?;
        let _guard = self.locks.lock(pull_request_id).await;

        let pr = self
            .storage
            .get_pull_request(pull_request_id)
            .await
            .context("load pull request")?;
        if pr.is_merged() {
            return Err(ReviewError::MergeFrozen(pull_request_id.to_string()));
        }
        if !pr.has_reviewer(old_user_id) {
            return Err(ReviewError::NotAssigned {
                pull_request_id: pull_request_id.to_string(),
                user_id: old_user_id.to_string(),
            });
        }

        let old = self
            .storage
            .get_user(old_user_id)
            .await
            .context("load reviewer")?;
        if !old.is_active {
            return Err(ReviewError::UserInactive(old_user_id.to_string()));
        }

        let mut pool: Vec<String> = self
            .storage
            .active_team_members_except(&old.team_name, Some(old_user_id))
            .await
            .context("list candidates")?
            .into_iter()
            .filter(|id| *id != pr.author_id && !pr.has_reviewer(id))
            .collect();
        if pool.is_empty() {
            return Err(ReviewError::NoCandidate(pull_request_id.to_string()));
        }

        checkpoint(cancel)?;
        let new_user_id = self
            .draw_active(&mut pool)
            .await?
            .map(|user| user.user_id)
            .ok_or_else(|| ReviewError::NoCandidate(pull_request_id.to_string()))?;

        let updated = self
            .storage
            .replace_reviewer(pull_request_id, old_user_id, &new_user_id)
            .await
            .context("replace reviewer")?;
        let updated = self
            .storage
            .set_need_more_reviewers(
                pull_request_id,
                needs_more_reviewers(updated.assigned_reviewers.len()),
            )
            .await
            .context("update reviewer demand")?;

        tracing::info!(
            pr = %pull_request_id,
            old = %old_user_id,
            new = %new_user_id,
            "Reviewer reassigned"
        );

        Ok(Reassignment {
            pull_request: updated,
            replaced_by: new_user_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::model::Team;
    use crate::storage::{InMemoryStorage, Storage};

    async fn engine_with(team: Team) -> ReviewEngine {
        let storage = Arc::new(InMemoryStorage::new());
        storage.upsert_team(&team).await.unwrap();
        ReviewEngine::new(storage)
    }

    #[tokio::test]
    async fn create_rejects_empty_fields() {
        let engine = engine_with(Team::new("t").with_member("u1", "A", true)).await;
        let err = engine
            .create_pull_request(NewPullRequest::new("", "x", "u1"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ReviewError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn create_with_canceled_token_stops_at_first_pick() {
        let engine = engine_with(
            Team::new("t")
                .with_member("u1", "A", true)
                .with_member("u2", "B", true),
        )
        .await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = engine
            .create_pull_request(NewPullRequest::new("pr-1", "x", "u1"), &cancel)
            .await
            .unwrap_err();
        assert_eq!(err, ReviewError::Canceled);
        assert!(engine
            .storage()
            .get_pull_request("pr-1")
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn solo_author_gets_no_reviewers() {
        let engine = engine_with(Team::new("t").with_member("u1", "A", true)).await;
        let pr = engine
            .create_pull_request(NewPullRequest::new("pr-1", "x", "u1"), &CancellationToken::new())
            .await
            .unwrap();
        assert!(pr.assigned_reviewers.is_empty());
        assert!(pr.need_more_reviewers);
    }
}
