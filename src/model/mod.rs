//! Domain records shared by the storage gateway, the assignment engine and
//! the HTTP façade.

pub mod pull_request;
pub mod team;

pub use pull_request::{
    needs_more_reviewers, NewPullRequest, PrStatus, PullRequest, PullRequestShort, Reviewer,
    MAX_REVIEWERS,
};
pub use team::{Team, TeamMember, User};
