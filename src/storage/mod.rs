//! Storage gateway for teams, users, pull requests and reviewer assignments.
//!
//! The assignment engine only talks to storage through the [`Storage`] trait.
//! Every method is atomic with respect to the others; implementations provide
//! their own internal concurrency safety.
//!
//! # Components
//!
//! - [`Storage`]: the gateway contract
//! - [`InMemoryStorage`]: process-local implementation guarded by a `RwLock`

mod memory;

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StorageResult;
use crate::model::{PullRequest, PullRequestShort, Reviewer, Team, User};

pub use memory::InMemoryStorage;

#[async_trait]
pub trait Storage: Send + Sync {
    /// Insert or update a team and upsert all of its members.
    async fn upsert_team(&self, team: &Team) -> StorageResult<()>;

    async fn get_team(&self, team_name: &str) -> StorageResult<Team>;

    /// Set the team's active flag and the flag of every member.
    /// Returns the number of members updated.
    async fn set_team_active(&self, team_name: &str, is_active: bool) -> StorageResult<usize>;

    async fn get_user(&self, user_id: &str) -> StorageResult<User>;

    async fn set_user_active(&self, user_id: &str, is_active: bool) -> StorageResult<User>;

    async fn get_user_team(&self, user_id: &str) -> StorageResult<String>;

    /// Insert a new pull request with its initial reviewer set.
    /// Fails with `Conflict` if the id is taken.
    async fn insert_pull_request(&self, pull_request: &PullRequest) -> StorageResult<()>;

    async fn get_pull_request(&self, pull_request_id: &str) -> StorageResult<PullRequest>;

    /// Mark a pull request merged. A pull request that is already merged keeps
    /// its original timestamp.
    async fn merge_pull_request(
        &self,
        pull_request_id: &str,
        merged_at: DateTime<Utc>,
    ) -> StorageResult<PullRequest>;

    async fn get_reviewers(&self, pull_request_id: &str) -> StorageResult<Vec<Reviewer>>;

    /// Ids of active members of `team_name`, ordered by id, without `except`.
    async fn active_team_members_except(
        &self,
        team_name: &str,
        except: Option<&str>,
    ) -> StorageResult<Vec<String>>;

    /// Atomically swap `old_user_id` for `new_user_id` on an open pull request.
    async fn replace_reviewer(
        &self,
        pull_request_id: &str,
        old_user_id: &str,
        new_user_id: &str,
    ) -> StorageResult<PullRequest>;

    async fn remove_reviewer(
        &self,
        pull_request_id: &str,
        user_id: &str,
    ) -> StorageResult<PullRequest>;

    async fn set_need_more_reviewers(
        &self,
        pull_request_id: &str,
        need_more_reviewers: bool,
    ) -> StorageResult<PullRequest>;

    /// Open pull requests where `user_id` is a reviewer.
    async fn open_pull_requests_for_reviewer(
        &self,
        user_id: &str,
    ) -> StorageResult<Vec<PullRequestShort>>;

    /// Every pull request where `user_id` is a reviewer, newest first.
    async fn pull_requests_for_reviewer(
        &self,
        user_id: &str,
    ) -> StorageResult<Vec<PullRequestShort>>;

    /// Number of review assignments per user, including users with none.
    async fn review_counts(&self) -> StorageResult<BTreeMap<String, usize>>;
}
