//! Retrying request executor.
//!
//! Every network call the engine makes goes through `RetryingExecutor::execute`
//! (or `execute_read` when the body must be consumed inside the attempt). One call
//! to either is one logical operation: the executor owns its `RetryState`, applies
//! the bearer token on every attempt, backs off exponentially between attempts and
//! refreshes the credential once per failure episode.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::auth::Authorizer;
use crate::cancel::CancelToken;
use crate::error::EngineError;
use crate::http::{HttpTransport, RemoteRequest, RemoteResponse, TransportError};

/// Attempts for lightweight metadata calls.
pub const METADATA_ATTEMPTS: u32 = 6;

/// Attempts for bulk content calls (chunk uploads, range downloads).
pub const TRANSFER_ATTEMPTS: u32 = 10;

/// Statuses signalling server overload; the computed backoff is multiplied.
pub const SEVERE_STATUSES: &[u16] = &[429, 503, 509];

/// Multiplier applied to the computed backoff for severe statuses.
pub const SEVERE_MULTIPLIER: u32 = 20;

/// Conflict statuses handed back to the caller instead of being retried.
pub const CONFLICT_STATUSES: &[u16] = &[409, 412];

/// Ceiling on a server-specified `Retry-After` delay.
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(60 * 60);

/// Longest response body kept for diagnostics.
const DIAGNOSTIC_BODY_LIMIT: usize = 2048;

/// Which statuses end an operation and how.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expect {
    /// Success; returned immediately
    pub acceptable: Vec<u16>,
    /// Retried with a much longer backoff
    pub severe: Vec<u16>,
    /// Returned immediately so the caller can branch; never retried
    pub passthrough: Vec<u16>,
}

impl Expect {
    pub fn statuses(acceptable: &[u16]) -> Self {
        Expect {
            acceptable: acceptable.to_vec(),
            severe: SEVERE_STATUSES.to_vec(),
            passthrough: Vec::new(),
        }
    }

    /// 200 OK only.
    pub fn ok() -> Self {
        Self::statuses(&[200])
    }

    pub fn or_passthrough(mut self, statuses: &[u16]) -> Self {
        self.passthrough.extend_from_slice(statuses);
        self
    }

    /// Hand conflict statuses back to the caller.
    pub fn or_conflict(self) -> Self {
        self.or_passthrough(CONFLICT_STATUSES)
    }

    fn ends_operation(&self, status: u16) -> bool {
        self.acceptable.contains(&status) || self.passthrough.contains(&status)
    }

    fn is_severe(&self, status: u16) -> bool {
        self.severe.contains(&status)
    }
}

/// Backoff configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay after attempt `n` is `unit * 2^n / 2`
    pub backoff_unit: Duration,

    /// Upper bound on any single delay
    pub max_delay: Option<Duration>,

    /// Upper bound on the total time one operation may spend sleeping
    pub max_retry_wait: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            backoff_unit: Duration::from_secs(1),
            max_delay: None,
            max_retry_wait: None,
        }
    }
}

impl RetryPolicy {
    /// Delay before the attempt following `attempt`.
    ///
    /// `retry_after` (server-specified) replaces the exponential backoff. The
    /// severe multiplier applies to the exponential backoff only: a server that
    /// names a delay gets exactly that delay.
    pub fn delay(&self, attempt: u32, retry_after: Option<Duration>, severe: bool) -> Duration {
        let delay = match retry_after {
            Some(server_delay) => server_delay,
            None => {
                let exponent = attempt.saturating_sub(1).min(30);
                let base = self.backoff_unit.saturating_mul(1u32 << exponent);
                if severe {
                    base.saturating_mul(SEVERE_MULTIPLIER)
                } else {
                    base
                }
            }
        };
        match self.max_delay {
            Some(cap) => delay.min(cap),
            None => delay,
        }
    }
}

/// Per-operation retry bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryState {
    /// 1-based attempt counter
    pub attempt: u32,
    pub max_attempts: u32,
    pub next_delay: Duration,
    pub last_error: Option<String>,
    pub last_status: Option<u16>,
    pub last_body: String,
    /// Total time slept so far
    pub waited: Duration,
}

impl RetryState {
    pub fn new(max_attempts: u32) -> Self {
        RetryState {
            attempt: 1,
            max_attempts: max_attempts.max(1),
            next_delay: Duration::ZERO,
            last_error: None,
            last_status: None,
            last_body: String::new(),
            waited: Duration::ZERO,
        }
    }

    pub fn exhausted(&self) -> bool {
        self.attempt >= self.max_attempts
    }

    fn record_status(&mut self, status: u16, body: String) {
        self.last_status = Some(status);
        self.last_error = Some(format!("HTTP {status}"));
        self.last_body = body;
    }

    fn record_transport(&mut self, error: &TransportError) {
        self.last_error = Some(error.to_string());
        self.last_body = error.to_string();
    }

    fn into_error(self, action: &str) -> EngineError {
        EngineError::RemoteConnection {
            action: action.to_string(),
            attempts: self.attempt,
            status: self.last_status,
            body: self.last_body,
        }
    }
}

/// Blocks the calling thread between attempts.
pub trait Sleeper: Send + Sync {
    /// Sleep for `duration`, returning early with `Cancelled` if `cancel` fires.
    fn sleep(&self, duration: Duration, cancel: &CancelToken) -> Result<(), EngineError>;
}

/// Sleeps on the current thread in short slices so cancellation is noticed.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

const SLEEP_SLICE: Duration = Duration::from_millis(250);

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration, cancel: &CancelToken) -> Result<(), EngineError> {
        // Past the representable range the deadline is never reached.
        let deadline = Instant::now().checked_add(duration);
        loop {
            cancel.check()?;
            let remaining = match deadline {
                Some(deadline) => deadline.saturating_duration_since(Instant::now()),
                None => SLEEP_SLICE,
            };
            if remaining.is_zero() {
                return Ok(());
            }
            std::thread::sleep(remaining.min(SLEEP_SLICE));
        }
    }
}

/// Counters across every operation an executor has run.
#[derive(Debug, Default)]
pub struct ExecutorStats {
    attempts: AtomicU64,
    retries: AtomicU64,
    refreshes: AtomicU64,
}

impl ExecutorStats {
    /// Requests put on the wire, including retries.
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Attempts that followed a failed attempt.
    pub fn retries(&self) -> u64 {
        self.retries.load(Ordering::SeqCst)
    }

    /// Forced credential refreshes.
    pub fn refreshes(&self) -> u64 {
        self.refreshes.load(Ordering::SeqCst)
    }
}

/// Issues request descriptors with retries, backoff and credential refresh.
pub struct RetryingExecutor {
    transport: Arc<dyn HttpTransport>,
    authorizer: Arc<dyn Authorizer>,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
    cancel: CancelToken,
    stats: ExecutorStats,
}

impl RetryingExecutor {
    pub fn new(transport: Arc<dyn HttpTransport>, authorizer: Arc<dyn Authorizer>) -> Self {
        RetryingExecutor {
            transport,
            authorizer,
            policy: RetryPolicy::default(),
            sleeper: Arc::new(ThreadSleeper),
            cancel: CancelToken::new(),
            stats: ExecutorStats::default(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn stats(&self) -> &ExecutorStats {
        &self.stats
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Run one logical operation and return the response that ended it.
    ///
    /// The response status is either in `expect.acceptable` or in
    /// `expect.passthrough`; everything else is retried until `max_attempts`
    /// attempts have failed, at which point `RemoteConnection` is returned.
    pub fn execute(
        &self,
        action: &str,
        request: &RemoteRequest,
        expect: &Expect,
        max_attempts: u32,
    ) -> Result<RemoteResponse, EngineError> {
        self.execute_read(action, request, expect, max_attempts, Ok)
    }

    /// Like `execute`, but `read` consumes the response inside the attempt.
    ///
    /// A `TransportError` from `read` (short body, reset mid-stream) counts as a
    /// failed attempt, exactly like a connection failure.
    pub fn execute_read<T, F>(
        &self,
        action: &str,
        request: &RemoteRequest,
        expect: &Expect,
        max_attempts: u32,
        mut read: F,
    ) -> Result<T, EngineError>
    where
        F: FnMut(RemoteResponse) -> Result<T, TransportError>,
    {
        let mut state = RetryState::new(max_attempts);

        loop {
            self.cancel.check()?;

            let token = if request.authenticated {
                Some(self.authorizer.current_token()?)
            } else {
                None
            };

            self.stats.attempts.fetch_add(1, Ordering::SeqCst);
            tracing::debug!(
                action,
                attempt = state.attempt,
                method = %request.method,
                url = %request.url,
                "issuing request"
            );

            let mut retry_after = None;
            let mut severe = false;
            match self.transport.send(request, token.as_deref()) {
                Ok(response) if expect.ends_operation(response.status) => match read(response) {
                    Ok(value) => return Ok(value),
                    Err(e) => {
                        tracing::warn!(action, attempt = state.attempt, error = %e, "response body failed");
                        state.record_transport(&e);
                    }
                },
                Ok(response) => {
                    let status = response.status;
                    retry_after = response.header("retry-after").and_then(parse_retry_after);
                    severe = expect.is_severe(status);
                    let body = response.into_text_lossy(DIAGNOSTIC_BODY_LIMIT);
                    tracing::warn!(
                        action,
                        attempt = state.attempt,
                        max_attempts = state.max_attempts,
                        status,
                        body = %body,
                        "request failed"
                    );
                    state.record_status(status, body);
                }
                Err(e) => {
                    tracing::warn!(
                        action,
                        attempt = state.attempt,
                        max_attempts = state.max_attempts,
                        error = %e,
                        "connection failed"
                    );
                    state.record_transport(&e);
                }
            }

            if state.exhausted() {
                return Err(state.into_error(action));
            }

            state.next_delay = self.policy.delay(state.attempt, retry_after, severe);
            if let Some(budget) = self.policy.max_retry_wait {
                if state.waited.saturating_add(state.next_delay) > budget {
                    tracing::warn!(action, waited = ?state.waited, "retry budget exhausted");
                    return Err(state.into_error(action));
                }
            }

            self.sleeper.sleep(state.next_delay, &self.cancel)?;
            state.waited = state.waited.saturating_add(state.next_delay);

            if state.attempt == 1 && request.authenticated {
                self.authorizer.force_refresh()?;
                self.stats.refreshes.fetch_add(1, Ordering::SeqCst);
            }

            state.attempt += 1;
            self.stats.retries.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Parse a `Retry-After` value: delta-seconds or an HTTP date.
///
/// The result never exceeds `MAX_RETRY_AFTER`.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let value = value.trim();
    let wait = match value.parse::<u64>() {
        Ok(secs) => Duration::from_secs(secs),
        Err(_) => {
            let date = chrono::DateTime::parse_from_rfc2822(value).ok()?;
            let wait = date.with_timezone(&chrono::Utc) - chrono::Utc::now();
            wait.to_std().unwrap_or(Duration::ZERO)
        }
    };
    Some(wait.min(MAX_RETRY_AFTER))
}
