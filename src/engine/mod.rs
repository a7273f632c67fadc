//! Reviewer assignment engine.
//!
//! Implements the business rules for opening, merging and reassigning pull
//! requests and for the team deactivation cascade. All persistence goes
//! through the [`Storage`] gateway; per pull request work is serialized by
//! [`PrLocks`].

mod assignment;
mod cascade;
mod locks;
mod selection;

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error::{ReviewError, Result, StorageContext};
use crate::model::{PullRequestShort, Team, User};
use crate::storage::Storage;

pub use assignment::Reassignment;
pub use cascade::{CascadeAction, DeactivationReport, ReviewerOutcome};
pub use locks::PrLocks;
pub use selection::pick_index;

pub struct ReviewEngine {
    storage: Arc<dyn Storage>,
    locks: PrLocks,
}

impl ReviewEngine {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            locks: PrLocks::new(),
        }
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// Create or update a team and its members.
    pub async fn add_team(&self, team: Team) -> Result<Team> {
        require("team_name", &team.team_name)?;

        let mut seen = HashSet::new();
        for member in &team.members {
            require("user_id", &member.user_id)?;
            if !seen.insert(member.user_id.as_str()) {
                return Err(ReviewError::InvalidInput(format!(
                    "duplicate member {} in team {}",
                    member.user_id, team.team_name
                )));
            }
        }

        let team = Team {
            is_active: true,
            ..team
        };
        self.storage.upsert_team(&team).await.context("save team")?;
        tracing::info!(team = %team.team_name, members = team.members.len(), "Team saved");

        self.storage
            .get_team(&team.team_name)
            .await
            .context("load team")
    }

    pub async fn get_team(&self, team_name: &str) -> Result<Team> {
        require("team_name", team_name)?;
        self.storage.get_team(team_name).await.context("load team")
    }

    pub async fn set_user_active(&self, user_id: &str, is_active: bool) -> Result<User> {
        require("user_id", user_id)?;
        let user = self
            .storage
            .set_user_active(user_id, is_active)
            .await
            .context("update user activity")?;
        tracing::info!(user = %user_id, is_active, "User activity updated");
        Ok(user)
    }

    /// Every pull request the user reviews, newest first.
    pub async fn reviews_for(&self, user_id: &str) -> Result<Vec<PullRequestShort>> {
        require("user_id", user_id)?;
        self.storage
            .pull_requests_for_reviewer(user_id)
            .await
            .context("list reviews")
    }

    /// Review assignment count per user.
    pub async fn reviewer_stats(&self) -> Result<BTreeMap<String, usize>> {
        self.storage.review_counts().await.context("count reviews")
    }

    /// Draw one candidate from `pool` and confirm they are still active.
    /// The drawn id is removed from the pool either way.
    async fn draw_active(&self, pool: &mut Vec<String>) -> Result<Option<User>> {
        let Some(idx) = pick_index(pool.len()) else {
            return Ok(None);
        };
        let candidate = pool.swap_remove(idx);

        match self.storage.get_user(&candidate).await {
            Ok(user) if user.is_active => Ok(Some(user)),
            Ok(_) => Ok(None),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(ReviewError::storage("load candidate", e)),
        }
    }
}

/// Cancellation checkpoint.
pub(crate) fn checkpoint(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(ReviewError::Canceled);
    }
    Ok(())
}

fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(ReviewError::InvalidInput(format!("{} must not be empty", field)));
    }
    Ok(())
}
