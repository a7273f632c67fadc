use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::DispatcherConfig;
use crate::dispatcher::executor::JobExecutor;
use crate::dispatcher::job::Job;
use crate::engine::ReviewEngine;
use crate::error::ReviewError;

/// Fixed pool of workers pulling jobs from one bounded queue.
pub struct Dispatcher {
    config: DispatcherConfig,
    executor: JobExecutor,
    sender: mpsc::Sender<Job>,
    receiver: Arc<Mutex<mpsc::Receiver<Job>>>,
    stop: CancellationToken,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Dispatcher {
    pub fn new(config: DispatcherConfig, engine: Arc<ReviewEngine>) -> Self {
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        Self {
            config,
            executor: JobExecutor::new(engine),
            sender,
            receiver: Arc::new(Mutex::new(receiver)),
            stop: CancellationToken::new(),
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Spawn the worker tasks. Calling this more than once has no effect.
    pub async fn start(&self) {
        let mut workers = self.workers.lock().await;
        if !workers.is_empty() || self.stop.is_cancelled() {
            return;
        }

        for worker in 0..self.config.workers {
            let executor = self.executor.clone();
            let receiver = self.receiver.clone();
            let stop = self.stop.clone();
            workers.push(tokio::spawn(async move {
                Self::worker_loop(worker, executor, receiver, stop).await;
            }));
        }

        tracing::info!(
            workers = self.config.workers,
            queue_capacity = self.config.queue_capacity,
            "Dispatcher started"
        );
    }

    /// Queue a job without blocking. Rejected jobs are answered immediately
    /// and `false` is returned.
    pub fn submit(&self, mut job: Job) -> bool {
        if self.stop.is_cancelled() {
            job.reject(ReviewError::Canceled);
            return false;
        }

        match self.sender.try_send(job) {
            Ok(()) => true,
            Err(TrySendError::Full(mut job)) => {
                tracing::warn!(job_id = %job.id, kind = %job.kind, "Job queue full, rejecting");
                job.reject(ReviewError::QueueFull);
                false
            }
            Err(TrySendError::Closed(mut job)) => {
                job.reject(ReviewError::Canceled);
                false
            }
        }
    }

    /// Number of jobs waiting in the queue.
    pub fn queued(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.is_cancelled()
    }

    /// Stop the workers, let in-flight jobs finish, then answer every job
    /// still queued with `Canceled`.
    pub async fn shutdown(&self) {
        self.stop.cancel();

        let workers: Vec<JoinHandle<()>> = self.workers.lock().await.drain(..).collect();
        for handle in workers {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Worker task failed");
            }
        }

        let mut receiver = self.receiver.lock().await;
        receiver.close();
        let mut drained = 0;
        while let Ok(mut job) = receiver.try_recv() {
            job.reject(ReviewError::Canceled);
            drained += 1;
        }

        tracing::info!(drained, "Dispatcher stopped");
    }

    async fn worker_loop(
        worker: usize,
        executor: JobExecutor,
        receiver: Arc<Mutex<mpsc::Receiver<Job>>>,
        stop: CancellationToken,
    ) {
        tracing::debug!(worker, "Worker started");
        loop {
            let job = tokio::select! {
                biased;
                _ = stop.cancelled() => break,
                job = async { receiver.lock().await.recv().await } => job,
            };

            match job {
                Some(job) => executor.execute(worker, job).await,
                None => break,
            }
        }
        tracing::debug!(worker, "Worker stopped");
    }
}
