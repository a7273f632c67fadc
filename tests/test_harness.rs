//! Shared fixtures for engine, dispatcher and API integration tests.
#![allow(dead_code)]

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;

use pr_reviewer::config::DispatcherConfig;
use pr_reviewer::dispatcher::Dispatcher;
use pr_reviewer::engine::ReviewEngine;
use pr_reviewer::error::StorageResult;
use pr_reviewer::model::{PullRequest, PullRequestShort, Reviewer, Team, User};
use pr_reviewer::storage::{InMemoryStorage, Storage};

/// Team "backend": u1 (author), u2 active, u3 inactive.
pub fn backend_team() -> Team {
    Team::new("backend")
        .with_member("u1", "Alice", true)
        .with_member("u2", "Bob", true)
        .with_member("u3", "Carol", false)
}

/// Team "platform": p1..p4, all active.
pub fn platform_team() -> Team {
    Team::new("platform")
        .with_member("p1", "Pam", true)
        .with_member("p2", "Pete", true)
        .with_member("p3", "Priya", true)
        .with_member("p4", "Paul", true)
}

pub async fn seeded_storage(teams: &[Team]) -> Arc<InMemoryStorage> {
    let storage = Arc::new(InMemoryStorage::new());
    for team in teams {
        storage.upsert_team(team).await.unwrap();
    }
    storage
}

pub async fn engine_with(teams: &[Team]) -> Arc<ReviewEngine> {
    Arc::new(ReviewEngine::new(seeded_storage(teams).await))
}

pub fn token() -> CancellationToken {
    CancellationToken::new()
}

pub fn dispatcher_config(workers: usize, queue_capacity: usize) -> DispatcherConfig {
    DispatcherConfig::default()
        .with_workers(workers)
        .with_queue_capacity(queue_capacity)
}

pub async fn started_dispatcher(engine: Arc<ReviewEngine>, workers: usize) -> Arc<Dispatcher> {
    let dispatcher = Arc::new(Dispatcher::new(dispatcher_config(workers, 64), engine));
    dispatcher.start().await;
    dispatcher
}

/// Poll `check` until it returns true or `timeout` elapses.
pub async fn assert_eventually<F, Fut>(timeout: Duration, mut check: F, msg: &str)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("condition not met within {:?}: {}", timeout, msg);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Storage wrapper that counts every call before delegating.
///
/// Optional hooks:
/// - `cancel_after_write`: fires a token once a reviewer is replaced or removed
/// - `stale_pool`: served by `active_team_members_except` instead of the real
///   membership, modelling a candidate list read before users went inactive
pub struct CountingStorage {
    inner: InMemoryStorage,
    calls: AtomicUsize,
    user_lookups: AtomicUsize,
    cancel_after_write: Option<CancellationToken>,
    stale_pool: Option<Vec<String>>,
}

impl CountingStorage {
    pub fn new(inner: InMemoryStorage) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
            user_lookups: AtomicUsize::new(0),
            cancel_after_write: None,
            stale_pool: None,
        }
    }

    pub fn with_cancel_after_write(mut self, token: CancellationToken) -> Self {
        self.cancel_after_write = Some(token);
        self
    }

    pub fn with_stale_pool(mut self, pool: &[&str]) -> Self {
        self.stale_pool = Some(pool.iter().map(|id| id.to_string()).collect());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of `get_user` calls.
    pub fn user_lookups(&self) -> usize {
        self.user_lookups.load(Ordering::SeqCst)
    }

    fn hit(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }

    fn after_write<T>(&self, result: StorageResult<T>) -> StorageResult<T> {
        if result.is_ok() {
            if let Some(token) = &self.cancel_after_write {
                token.cancel();
            }
        }
        result
    }
}

#[async_trait]
impl Storage for CountingStorage {
    async fn upsert_team(&self, team: &Team) -> StorageResult<()> {
        self.hit();
        self.inner.upsert_team(team).await
    }

    async fn get_team(&self, team_name: &str) -> StorageResult<Team> {
        self.hit();
        self.inner.get_team(team_name).await
    }

    async fn set_team_active(&self, team_name: &str, is_active: bool) -> StorageResult<usize> {
        self.hit();
        self.inner.set_team_active(team_name, is_active).await
    }

    async fn get_user(&self, user_id: &str) -> StorageResult<User> {
        self.hit();
        self.user_lookups.fetch_add(1, Ordering::SeqCst);
        self.inner.get_user(user_id).await
    }

    async fn set_user_active(&self, user_id: &str, is_active: bool) -> StorageResult<User> {
        self.hit();
        self.inner.set_user_active(user_id, is_active).await
    }

    async fn get_user_team(&self, user_id: &str) -> StorageResult<String> {
        self.hit();
        self.inner.get_user_team(user_id).await
    }

    async fn insert_pull_request(&self, pull_request: &PullRequest) -> StorageResult<()> {
        self.hit();
        self.inner.insert_pull_request(pull_request).await
    }

    async fn get_pull_request(&self, pull_request_id: &str) -> StorageResult<PullRequest> {
        self.hit();
        self.inner.get_pull_request(pull_request_id).await
    }

    async fn merge_pull_request(
        &self,
        pull_request_id: &str,
        merged_at: DateTime<Utc>,
    ) -> StorageResult<PullRequest> {
        self.hit();
        self.inner.merge_pull_request(pull_request_id, merged_at).await
    }

    async fn get_reviewers(&self, pull_request_id: &str) -> StorageResult<Vec<Reviewer>> {
        self.hit();
        self.inner.get_reviewers(pull_request_id).await
    }

    async fn active_team_members_except(
        &self,
        team_name: &str,
        except: Option<&str>,
    ) -> StorageResult<Vec<String>> {
        self.hit();
        if let Some(pool) = &self.stale_pool {
            return Ok(pool
                .iter()
                .filter(|id| except != Some(id.as_str()))
                .cloned()
                .collect());
        }
        self.inner.active_team_members_except(team_name, except).await
    }

    async fn replace_reviewer(
        &self,
        pull_request_id: &str,
        old_user_id: &str,
        new_user_id: &str,
    ) -> StorageResult<PullRequest> {
        self.hit();
        let result = self
            .inner
            .replace_reviewer(pull_request_id, old_user_id, new_user_id)
            .await;
        self.after_write(result)
    }

    async fn remove_reviewer(
        &self,
        pull_request_id: &str,
        user_id: &str,
    ) -> StorageResult<PullRequest> {
        self.hit();
        let result = self.inner.remove_reviewer(pull_request_id, user_id).await;
        self.after_write(result)
    }

    async fn set_need_more_reviewers(
        &self,
        pull_request_id: &str,
        need_more_reviewers: bool,
    ) -> StorageResult<PullRequest> {
        self.hit();
        self.inner
            .set_need_more_reviewers(pull_request_id, need_more_reviewers)
            .await
    }

    async fn open_pull_requests_for_reviewer(
        &self,
        user_id: &str,
    ) -> StorageResult<Vec<PullRequestShort>> {
        self.hit();
        self.inner.open_pull_requests_for_reviewer(user_id).await
    }

    async fn pull_requests_for_reviewer(
        &self,
        user_id: &str,
    ) -> StorageResult<Vec<PullRequestShort>> {
        self.hit();
        self.inner.pull_requests_for_reviewer(user_id).await
    }

    async fn review_counts(&self) -> StorageResult<BTreeMap<String, usize>> {
        self.hit();
        self.inner.review_counts().await
    }
}
