//! Deferred background token refresh.
//!
//! A named task waits out an initial delay (45 minutes by default), waits
//! for the network, then runs its worker. The worker reports one of three
//! outcomes; the scheduler retries `Retry` with exponential backoff and
//! stops on `Success` or `Failure`. Enqueuing a name that is already
//! pending replaces the pending task.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::ApiError;
use crate::auth::{AuthGateway, AuthSession};

/// Name of the token refresh task.
pub const TOKEN_REFRESH_TASK: &str = "token-refresh";

/// Delay before the first refresh attempt.
pub const REFRESH_INITIAL_DELAY: Duration = Duration::from_secs(45 * 60);

const DEFAULT_BACKOFF: Duration = Duration::from_secs(30);
const DEFAULT_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_NETWORK_POLL: Duration = Duration::from_secs(15);
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkResult {
    Success,
    Retry,
    Failure,
}

#[async_trait]
pub trait Worker: Send + Sync {
    async fn run(&self) -> WorkResult;
}

#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh_token(&self) -> Result<AuthSession, ApiError>;
}

#[async_trait]
impl TokenRefresher for AuthGateway {
    async fn refresh_token(&self) -> Result<AuthSession, ApiError> {
        AuthGateway::refresh_token(self).await
    }
}

/// Runs a token refresh and reduces the outcome to retry/terminal.
pub struct RefreshWorker<R: ?Sized> {
    refresher: Arc<R>,
}

impl<R: TokenRefresher + ?Sized> RefreshWorker<R> {
    pub fn new(refresher: Arc<R>) -> Self {
        Self { refresher }
    }
}

#[async_trait]
impl<R: TokenRefresher + ?Sized> Worker for RefreshWorker<R> {
    async fn run(&self) -> WorkResult {
        match self.refresher.refresh_token().await {
            Ok(_) => {
                info!("Background token refresh succeeded");
                WorkResult::Success
            }
            Err(e) if e.is_retryable() => {
                warn!(error = %e, "Background token refresh failed, will retry");
                WorkResult::Retry
            }
            Err(e) => {
                warn!(error = %e, "Background token refresh failed permanently");
                WorkResult::Failure
            }
        }
    }
}

#[async_trait]
pub trait NetworkMonitor: Send + Sync {
    async fn is_connected(&self) -> bool;
}

/// Considers the network up when a TCP connection to `host:port` opens.
#[derive(Debug, Clone)]
pub struct HostProbe {
    addr: String,
}

impl HostProbe {
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }

    /// Probe the host of a base URL such as `https://api.glowscan.app`.
    pub fn for_url(url: &str) -> Option<Self> {
        let parsed = reqwest::Url::parse(url).ok()?;
        let host = parsed.host_str()?;
        let port = parsed.port_or_known_default()?;
        Some(Self::new(format!("{}:{}", host, port)))
    }
}

#[async_trait]
impl NetworkMonitor for HostProbe {
    async fn is_connected(&self) -> bool {
        matches!(
            tokio::time::timeout(PROBE_TIMEOUT, TcpStream::connect(&self.addr)).await,
            Ok(Ok(_))
        )
    }
}

/// Always online. For hosts that handle connectivity elsewhere.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysOnline;

#[async_trait]
impl NetworkMonitor for AlwaysOnline {
    async fn is_connected(&self) -> bool {
        true
    }
}

/// Timing and constraints for one enqueued task.
#[derive(Debug, Clone)]
pub struct WorkRequest {
    pub initial_delay: Duration,
    /// First retry delay; doubles after each retry.
    pub backoff: Duration,
    pub max_attempts: u32,
    pub network_poll: Duration,
}

impl Default for WorkRequest {
    fn default() -> Self {
        Self {
            initial_delay: REFRESH_INITIAL_DELAY,
            backoff: DEFAULT_BACKOFF,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            network_poll: DEFAULT_NETWORK_POLL,
        }
    }
}

impl WorkRequest {
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }
}

/// Holds at most one pending task per name.
pub struct WorkScheduler {
    monitor: Arc<dyn NetworkMonitor>,
    tasks: Mutex<HashMap<String, JoinHandle<WorkResult>>>,
}

impl WorkScheduler {
    pub fn new(monitor: Arc<dyn NetworkMonitor>) -> Self {
        Self {
            monitor,
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// Enqueue `worker` under `name`, aborting any task already pending
    /// under that name.
    pub fn enqueue_unique(&self, name: &str, request: WorkRequest, worker: Arc<dyn Worker>) {
        let monitor = Arc::clone(&self.monitor);
        let task_name = name.to_string();
        let handle = tokio::spawn(async move { run_task(task_name, request, worker, monitor).await });

        if let Some(previous) = self.tasks.lock().insert(name.to_string(), handle) {
            if !previous.is_finished() {
                debug!(task = name, "Replacing pending task");
            }
            previous.abort();
        }
    }

    pub fn is_pending(&self, name: &str) -> bool {
        self.tasks
            .lock()
            .get(name)
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Abort a pending task. Returns false if nothing was enqueued under `name`.
    pub fn cancel(&self, name: &str) -> bool {
        match self.tasks.lock().remove(name) {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Wait for the task under `name` to finish. `None` when nothing is
    /// enqueued or the task was aborted.
    pub async fn join(&self, name: &str) -> Option<WorkResult> {
        let handle = self.tasks.lock().remove(name)?;
        handle.await.ok()
    }
}

async fn run_task(
    name: String,
    request: WorkRequest,
    worker: Arc<dyn Worker>,
    monitor: Arc<dyn NetworkMonitor>,
) -> WorkResult {
    debug!(task = %name, delay_secs = request.initial_delay.as_secs(), "Task scheduled");
    tokio::time::sleep(request.initial_delay).await;

    let mut attempt = 0;
    let mut backoff = request.backoff;
    loop {
        while !monitor.is_connected().await {
            debug!(task = %name, "Waiting for network");
            tokio::time::sleep(request.network_poll).await;
        }

        attempt += 1;
        match worker.run().await {
            WorkResult::Retry if attempt < request.max_attempts => {
                debug!(task = %name, attempt, backoff_secs = backoff.as_secs(), "Task will retry");
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }
            WorkResult::Retry => {
                warn!(task = %name, attempt, "Task gave up after retries");
                return WorkResult::Retry;
            }
            result => {
                debug!(task = %name, attempt, ?result, "Task finished");
                return result;
            }
        }
    }
}

/// Enqueue the 45-minute token refresh for `gateway`.
pub fn schedule_token_refresh(scheduler: &WorkScheduler, gateway: Arc<AuthGateway>) {
    scheduler.enqueue_unique(
        TOKEN_REFRESH_TASK,
        WorkRequest::default(),
        Arc::new(RefreshWorker::new(gateway)),
    );
}
