//! Asynchronous job dispatcher.
//!
//! Submitters wrap an operation kind and a JSON parameter bag in a [`Job`],
//! hand it to [`Dispatcher::submit`] and wait on the returned [`JobHandle`].
//! A fixed pool of workers pulls jobs from one bounded queue and runs them
//! through the [`JobExecutor`].
//!
//! # Components
//!
//! - [`Dispatcher`]: bounded queue, worker pool, start and shutdown
//! - [`JobExecutor`]: decodes a job and calls the assignment engine
//! - [`Job`] / [`JobHandle`]: one job and its single reply slot

pub mod executor;
pub mod job;
mod pool;

pub use executor::JobExecutor;
pub use job::{
    Job, JobHandle, JobKind, JobOutput, JobResult, Operation, PullRequestRef, ReassignParams,
    ReviewList, TeamRef, UserActivity, UserRef,
};
pub use pool::Dispatcher;
