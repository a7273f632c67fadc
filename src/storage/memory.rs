use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::error::{StorageError, StorageResult};
use crate::model::{PrStatus, PullRequest, PullRequestShort, Reviewer, Team, TeamMember, User};
use crate::storage::Storage;

#[derive(Debug, Clone)]
struct PullRequestRecord {
    pull_request_id: String,
    pull_request_name: String,
    author_id: String,
    status: PrStatus,
    need_more_reviewers: bool,
    created_at: DateTime<Utc>,
    merged_at: Option<DateTime<Utc>>,
    reviewers: Vec<String>,
}

impl PullRequestRecord {
    fn short(&self) -> PullRequestShort {
        PullRequestShort {
            pull_request_id: self.pull_request_id.clone(),
            pull_request_name: self.pull_request_name.clone(),
            author_id: self.author_id.clone(),
            status: self.status,
        }
    }
}

#[derive(Debug, Default)]
struct State {
    /// team name -> active flag
    teams: BTreeMap<String, bool>,
    users: BTreeMap<String, User>,
    pull_requests: HashMap<String, PullRequestRecord>,
}

impl State {
    fn team(&self, team_name: &str) -> StorageResult<Team> {
        let is_active = *self
            .teams
            .get(team_name)
            .ok_or_else(|| StorageError::not_found("team", team_name))?;

        let members = self
            .users
            .values()
            .filter(|u| u.team_name == team_name)
            .map(|u| TeamMember {
                user_id: u.user_id.clone(),
                username: u.username.clone(),
                is_active: u.is_active,
            })
            .collect();

        Ok(Team {
            team_name: team_name.to_string(),
            is_active,
            members,
        })
    }

    fn user(&self, user_id: &str) -> StorageResult<&User> {
        self.users
            .get(user_id)
            .ok_or_else(|| StorageError::not_found("user", user_id))
    }

    fn reviewers(&self, record: &PullRequestRecord) -> Vec<Reviewer> {
        let mut reviewers: Vec<Reviewer> = record
            .reviewers
            .iter()
            .filter_map(|id| self.users.get(id))
            .map(Reviewer::from)
            .collect();
        reviewers.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        reviewers
    }

    fn pull_request(&self, pull_request_id: &str) -> StorageResult<PullRequest> {
        let record = self.record(pull_request_id)?;
        Ok(PullRequest {
            pull_request_id: record.pull_request_id.clone(),
            pull_request_name: record.pull_request_name.clone(),
            author_id: record.author_id.clone(),
            status: record.status,
            assigned_reviewers: self.reviewers(record),
            need_more_reviewers: record.need_more_reviewers,
            created_at: record.created_at,
            merged_at: record.merged_at,
        })
    }

    fn record(&self, pull_request_id: &str) -> StorageResult<&PullRequestRecord> {
        self.pull_requests
            .get(pull_request_id)
            .ok_or_else(|| StorageError::not_found("pull request", pull_request_id))
    }

    fn open_record_mut(&mut self, pull_request_id: &str) -> StorageResult<&mut PullRequestRecord> {
        let record = self
            .pull_requests
            .get_mut(pull_request_id)
            .ok_or_else(|| StorageError::not_found("pull request", pull_request_id))?;
        if record.status == PrStatus::Merged {
            return Err(StorageError::Conflict(format!(
                "pull request {} is merged",
                pull_request_id
            )));
        }
        Ok(record)
    }

    fn reviewed_by(&self, user_id: &str, open_only: bool) -> Vec<PullRequestShort> {
        let mut records: Vec<&PullRequestRecord> = self
            .pull_requests
            .values()
            .filter(|r| r.reviewers.iter().any(|id| id == user_id))
            .filter(|r| !open_only || r.status == PrStatus::Open)
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records.into_iter().map(PullRequestRecord::short).collect()
    }
}

/// Process-local storage. All data is lost when the process exits.
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    state: RwLock<State>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn upsert_team(&self, team: &Team) -> StorageResult<()> {
        let mut state = self.state.write().await;
        state.teams.insert(team.team_name.clone(), team.is_active);
        for member in &team.members {
            state.users.insert(
                member.user_id.clone(),
                User {
                    user_id: member.user_id.clone(),
                    username: member.username.clone(),
                    team_name: team.team_name.clone(),
                    is_active: member.is_active,
                },
            );
        }
        Ok(())
    }

    async fn get_team(&self, team_name: &str) -> StorageResult<Team> {
        self.state.read().await.team(team_name)
    }

    async fn set_team_active(&self, team_name: &str, is_active: bool) -> StorageResult<usize> {
        let mut state = self.state.write().await;
        let flag = state
            .teams
            .get_mut(team_name)
            .ok_or_else(|| StorageError::not_found("team", team_name))?;
        *flag = is_active;

        let mut updated = 0;
        for user in state.users.values_mut().filter(|u| u.team_name == team_name) {
            user.is_active = is_active;
            updated += 1;
        }
        Ok(updated)
    }

    async fn get_user(&self, user_id: &str) -> StorageResult<User> {
        self.state.read().await.user(user_id).cloned()
    }

    async fn set_user_active(&self, user_id: &str, is_active: bool) -> StorageResult<User> {
        let mut state = self.state.write().await;
        let user = state
            .users
            .get_mut(user_id)
            .ok_or_else(|| StorageError::not_found("user", user_id))?;
        user.is_active = is_active;
        Ok(user.clone())
    }

    async fn get_user_team(&self, user_id: &str) -> StorageResult<String> {
        Ok(self.state.read().await.user(user_id)?.team_name.clone())
    }

    async fn insert_pull_request(&self, pull_request: &PullRequest) -> StorageResult<()> {
        let mut state = self.state.write().await;
        if state
            .pull_requests
            .contains_key(&pull_request.pull_request_id)
        {
            return Err(StorageError::Conflict(format!(
                "pull request {} already exists",
                pull_request.pull_request_id
            )));
        }
        for reviewer in &pull_request.assigned_reviewers {
            state.user(&reviewer.user_id)?;
        }

        state.pull_requests.insert(
            pull_request.pull_request_id.clone(),
            PullRequestRecord {
                pull_request_id: pull_request.pull_request_id.clone(),
                pull_request_name: pull_request.pull_request_name.clone(),
                author_id: pull_request.author_id.clone(),
                status: pull_request.status,
                need_more_reviewers: pull_request.need_more_reviewers,
                created_at: pull_request.created_at,
                merged_at: pull_request.merged_at,
                reviewers: pull_request
                    .assigned_reviewers
                    .iter()
                    .map(|r| r.user_id.clone())
                    .collect(),
            },
        );
        Ok(())
    }

    async fn get_pull_request(&self, pull_request_id: &str) -> StorageResult<PullRequest> {
        self.state.read().await.pull_request(pull_request_id)
    }

    async fn merge_pull_request(
        &self,
        pull_request_id: &str,
        merged_at: DateTime<Utc>,
    ) -> StorageResult<PullRequest> {
        let mut state = self.state.write().await;
        let record = state
            .pull_requests
            .get_mut(pull_request_id)
            .ok_or_else(|| StorageError::not_found("pull request", pull_request_id))?;
        if record.status == PrStatus::Open {
            record.status = PrStatus::Merged;
            record.merged_at = Some(merged_at);
        }
        state.pull_request(pull_request_id)
    }

    async fn get_reviewers(&self, pull_request_id: &str) -> StorageResult<Vec<Reviewer>> {
        let state = self.state.read().await;
        let record = state.record(pull_request_id)?;
        Ok(state.reviewers(record))
    }

    async fn active_team_members_except(
        &self,
        team_name: &str,
        except: Option<&str>,
    ) -> StorageResult<Vec<String>> {
        let state = self.state.read().await;
        Ok(state
            .users
            .values()
            .filter(|u| u.team_name == team_name && u.is_active)
            .filter(|u| except != Some(u.user_id.as_str()))
            .map(|u| u.user_id.clone())
            .collect())
    }

    async fn replace_reviewer(
        &self,
        pull_request_id: &str,
        old_user_id: &str,
        new_user_id: &str,
    ) -> StorageResult<PullRequest> {
        let mut state = self.state.write().await;
        state.user(new_user_id)?;

        let record = state.open_record_mut(pull_request_id)?;
        if record.reviewers.iter().any(|id| id == new_user_id) {
            return Err(StorageError::Conflict(format!(
                "{} already reviews pull request {}",
                new_user_id, pull_request_id
            )));
        }
        let slot = record
            .reviewers
            .iter_mut()
            .find(|id| id.as_str() == old_user_id)
            .ok_or_else(|| {
                StorageError::Conflict(format!(
                    "{} is not a reviewer of pull request {}",
                    old_user_id, pull_request_id
                ))
            })?;
        *slot = new_user_id.to_string();

        state.pull_request(pull_request_id)
    }

    async fn remove_reviewer(
        &self,
        pull_request_id: &str,
        user_id: &str,
    ) -> StorageResult<PullRequest> {
        let mut state = self.state.write().await;
        let record = state.open_record_mut(pull_request_id)?;
        let before = record.reviewers.len();
        record.reviewers.retain(|id| id != user_id);
        if record.reviewers.len() == before {
            return Err(StorageError::Conflict(format!(
                "{} is not a reviewer of pull request {}",
                user_id, pull_request_id
            )));
        }
        state.pull_request(pull_request_id)
    }

    async fn set_need_more_reviewers(
        &self,
        pull_request_id: &str,
        need_more_reviewers: bool,
    ) -> StorageResult<PullRequest> {
        let mut state = self.state.write().await;
        let record = state
            .pull_requests
            .get_mut(pull_request_id)
            .ok_or_else(|| StorageError::not_found("pull request", pull_request_id))?;
        record.need_more_reviewers = need_more_reviewers;
        state.pull_request(pull_request_id)
    }

    async fn open_pull_requests_for_reviewer(
        &self,
        user_id: &str,
    ) -> StorageResult<Vec<PullRequestShort>> {
        Ok(self.state.read().await.reviewed_by(user_id, true))
    }

    async fn pull_requests_for_reviewer(
        &self,
        user_id: &str,
    ) -> StorageResult<Vec<PullRequestShort>> {
        Ok(self.state.read().await.reviewed_by(user_id, false))
    }

    async fn review_counts(&self) -> StorageResult<BTreeMap<String, usize>> {
        let state = self.state.read().await;
        let mut counts: BTreeMap<String, usize> =
            state.users.keys().map(|id| (id.clone(), 0)).collect();
        for record in state.pull_requests.values() {
            for reviewer in &record.reviewers {
                *counts.entry(reviewer.clone()).or_default() += 1;
            }
        }
        Ok(counts)
    }
}
