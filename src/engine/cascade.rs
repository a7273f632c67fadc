use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::engine::{checkpoint, require, ReviewEngine};
use crate::error::{Result, StorageContext, StorageResult};
use crate::model::{needs_more_reviewers, PullRequest};

/// What happened to one reviewer slot during a deactivation cascade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum CascadeAction {
    Replaced { new_reviewer_id: String },
    Removed,
    Skipped { reason: String },
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewerOutcome {
    pub pull_request_id: String,
    /// `None` when the outcome applies to the pull request as a whole.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewer_id: Option<String>,
    #[serde(flatten)]
    pub action: CascadeAction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeactivationReport {
    pub team_name: String,
    pub deactivated_members: usize,
    pub outcomes: Vec<ReviewerOutcome>,
}

impl DeactivationReport {
    fn new(team_name: &str, deactivated_members: usize) -> Self {
        Self {
            team_name: team_name.to_string(),
            deactivated_members,
            outcomes: Vec::new(),
        }
    }

    /// True if every affected reviewer slot was refilled.
    pub fn all_replaced(&self) -> bool {
        self.outcomes
            .iter()
            .all(|o| matches!(o.action, CascadeAction::Replaced { .. }))
    }

    pub fn outcomes_for<'a>(
        &'a self,
        pull_request_id: &'a str,
    ) -> impl Iterator<Item = &'a ReviewerOutcome> + 'a {
        self.outcomes
            .iter()
            .filter(move |o| o.pull_request_id == pull_request_id)
    }

    fn record(&mut self, pull_request_id: &str, reviewer_id: Option<&str>, action: CascadeAction) {
        self.outcomes.push(ReviewerOutcome {
            pull_request_id: pull_request_id.to_string(),
            reviewer_id: reviewer_id.map(str::to_string),
            action,
        });
    }
}

impl ReviewEngine {
    /// Deactivate a team and every member, then repair the reviewer sets of
    /// open pull requests those members were reviewing.
    ///
    /// Failures on one pull request are recorded in the report and do not stop
    /// the cascade. Cancellation stops it between pull requests; work already
    /// done is kept.
    pub async fn deactivate_team(
        &self,
        team_name: &str,
        cancel: &CancellationToken,
    ) -> Result<DeactivationReport> {
        require("team_name", team_name)?;

        let team = self
            .storage
            .get_team(team_name)
            .await
            .context("load team")?;
        let deactivated = self
            .storage
            .set_team_active(team_name, false)
            .await
            .context("deactivate team")?;
        tracing::info!(team = %team_name, members = deactivated, "Team deactivated");

        let mut report = DeactivationReport::new(team_name, deactivated);
        let mut visited = HashSet::new();

        for member in &team.members {
            checkpoint(cancel)?;

            let open = match self
                .storage
                .open_pull_requests_for_reviewer(&member.user_id)
                .await
            {
                Ok(open) => open,
                Err(e) => {
                    tracing::error!(user = %member.user_id, error = %e, "Failed to list open reviews");
                    continue;
                }
            };

            for pr in open {
                checkpoint(cancel)?;
                if !visited.insert(pr.pull_request_id.clone()) {
                    continue;
                }
                self.clean_up_pull_request(&pr.pull_request_id, &mut report)
                    .await;
            }
        }

        tracing::info!(
            team = %team_name,
            pull_requests = visited.len(),
            outcomes = report.outcomes.len(),
            "Deactivation cascade finished"
        );
        Ok(report)
    }

    async fn clean_up_pull_request(&self, pull_request_id: &str, report: &mut DeactivationReport) {
        let _guard = self.locks.lock(pull_request_id).await;

        let pr = match self.storage.get_pull_request(pull_request_id).await {
            Ok(pr) => pr,
            Err(e) => {
                tracing::error!(pr = %pull_request_id, error = %e, "Failed to load pull request");
                report.record(
                    pull_request_id,
                    None,
                    CascadeAction::Failed {
                        reason: e.to_string(),
                    },
                );
                return;
            }
        };
        if pr.is_merged() {
            report.record(
                pull_request_id,
                None,
                CascadeAction::Skipped {
                    reason: "merged".to_string(),
                },
            );
            return;
        }

        let author_team = match self.storage.get_user_team(&pr.author_id).await {
            Ok(team) => team,
            Err(e) => {
                tracing::error!(pr = %pull_request_id, author = %pr.author_id, error = %e, "Failed to resolve author team");
                report.record(
                    pull_request_id,
                    None,
                    CascadeAction::Failed {
                        reason: e.to_string(),
                    },
                );
                return;
            }
        };

        let mut touched = false;
        for reviewer in pr.assigned_reviewers.iter().filter(|r| !r.is_active) {
            let action = match self
                .replace_inactive(&pr, &author_team, &reviewer.user_id)
                .await
            {
                Ok(action) => {
                    touched = true;
                    action
                }
                Err(e) => {
                    tracing::error!(
                        pr = %pull_request_id,
                        user = %reviewer.user_id,
                        error = %e,
                        "Failed to replace inactive reviewer"
                    );
                    CascadeAction::Failed {
                        reason: e.to_string(),
                    }
                }
            };
            report.record(pull_request_id, Some(reviewer.user_id.as_str()), action);
        }

        if touched {
            if let Err(e) = self.refresh_need_more_reviewers(pull_request_id).await {
                tracing::error!(pr = %pull_request_id, error = %e, "Failed to update reviewer demand");
                report.record(
                    pull_request_id,
                    None,
                    CascadeAction::Failed {
                        reason: e.to_string(),
                    },
                );
            }
        }
    }

    /// Single-shot replacement of one inactive reviewer. Falls back to removing
    /// the reviewer when the author's team has nobody left to offer.
    async fn replace_inactive(
        &self,
        pr: &PullRequest,
        author_team: &str,
        reviewer_id: &str,
    ) -> Result<CascadeAction> {
        let assigned = self
            .storage
            .get_reviewers(&pr.pull_request_id)
            .await
            .context("load reviewers")?;
        let mut pool: Vec<String> = self
            .storage
            .active_team_members_except(author_team, Some(&pr.author_id))
            .await
            .context("list candidates")?
            .into_iter()
            .filter(|id| !assigned.iter().any(|r| r.user_id == *id))
            .collect();

        match self.draw_active(&mut pool).await? {
            Some(user) => {
                self.storage
                    .replace_reviewer(&pr.pull_request_id, reviewer_id, &user.user_id)
                    .await
                    .context("replace reviewer")?;
                tracing::info!(
                    pr = %pr.pull_request_id,
                    old = %reviewer_id,
                    new = %user.user_id,
                    "Inactive reviewer replaced"
                );
                Ok(CascadeAction::Replaced {
                    new_reviewer_id: user.user_id,
                })
            }
            None => {
                self.storage
                    .remove_reviewer(&pr.pull_request_id, reviewer_id)
                    .await
                    .context("remove reviewer")?;
                tracing::warn!(
                    pr = %pr.pull_request_id,
                    user = %reviewer_id,
                    "No replacement available, reviewer removed"
                );
                Ok(CascadeAction::Removed)
            }
        }
    }

    async fn refresh_need_more_reviewers(&self, pull_request_id: &str) -> StorageResult<()> {
        let reviewers = self.storage.get_reviewers(pull_request_id).await?;
        self.storage
            .set_need_more_reviewers(pull_request_id, needs_more_reviewers(reviewers.len()))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_serializes_flat() {
        let outcome = ReviewerOutcome {
            pull_request_id: "pr-1".into(),
            reviewer_id: Some("u2".into()),
            action: CascadeAction::Replaced {
                new_reviewer_id: "u5".into(),
            },
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["action"], "replaced");
        assert_eq!(json["new_reviewer_id"], "u5");
        assert_eq!(json["reviewer_id"], "u2");
    }

    #[test]
    fn all_replaced_is_false_after_removal() {
        let mut report = DeactivationReport::new("backend", 2);
        report.record(
            "pr-1",
            Some("u1"),
            CascadeAction::Replaced {
                new_reviewer_id: "u3".into(),
            },
        );
        assert!(report.all_replaced());

        report.record("pr-2", Some("u2"), CascadeAction::Removed);
        assert!(!report.all_replaced());
        assert_eq!(report.outcomes_for("pr-2").count(), 1);
    }
}
