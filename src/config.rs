use std::net::SocketAddr;
use std::time::Duration;

pub const DEFAULT_WORKERS: usize = 3;
pub const DEFAULT_QUEUE_CAPACITY: usize = 200;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

/// Sizing of the job dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Number of concurrent worker tasks
    pub workers: usize,
    /// Maximum number of jobs waiting in the queue before submissions are rejected
    pub queue_capacity: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl DispatcherConfig {
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    /// How long an HTTP request waits for its job before giving up
    pub request_timeout_ms: u64,
    pub dispatcher: DispatcherConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            // SAFETY: This is a hardcoded valid address that will always parse
            listen_addr: "0.0.0.0:8080"
                .parse()
                .expect("default listen address is valid"),
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            dispatcher: DispatcherConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn new(listen_addr: SocketAddr) -> Self {
        Self {
            listen_addr,
            ..Default::default()
        }
    }

    pub fn with_dispatcher(mut self, dispatcher: DispatcherConfig) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    pub fn with_request_timeout_ms(mut self, request_timeout_ms: u64) -> Self {
        self.request_timeout_ms = request_timeout_ms;
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatcher_config_default() {
        let cfg = DispatcherConfig::default();
        assert_eq!(cfg.workers, 3);
        assert_eq!(cfg.queue_capacity, 200);
    }

    #[test]
    fn dispatcher_config_builders() {
        let cfg = DispatcherConfig::default()
            .with_workers(1)
            .with_queue_capacity(4);
        assert_eq!(cfg.workers, 1);
        assert_eq!(cfg.queue_capacity, 4);
    }

    #[test]
    fn server_config_default() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.listen_addr.to_string(), "0.0.0.0:8080");
        assert_eq!(cfg.request_timeout(), Duration::from_secs(10));
        assert_eq!(cfg.dispatcher, DispatcherConfig::default());
    }

    #[test]
    fn server_config_new() {
        let addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        let cfg = ServerConfig::new(addr)
            .with_request_timeout_ms(250)
            .with_dispatcher(DispatcherConfig::default().with_workers(8));
        assert_eq!(cfg.listen_addr, addr);
        assert_eq!(cfg.request_timeout(), Duration::from_millis(250));
        assert_eq!(cfg.dispatcher.workers, 8);
    }
}
