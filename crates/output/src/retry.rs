//! Retry wrapper - re-attempts failed writes with exponential backoff
//!
//! The retry loop is an explicit state machine:
//! `Idle -> Attempting(n) -> Backoff(n) -> Attempting(n + 1) ... -> Success | Exhausted`.
//! `ConnectionLost` drops the connection so the next attempt reconnects
//! first; callers above the wrapper only ever see the final outcome.

use std::sync::Arc;
use std::time::Duration;

use contracts::{Batch, RetryConfig, WriteError, Writer, WriterState};
use observability::record_write_retry;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};

use crate::metrics::OutputMetrics;

/// Exponential backoff schedule
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    multiplier: f64,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration, multiplier: f64) -> Self {
        Self {
            initial,
            max: max.max(initial),
            multiplier: multiplier.max(1.0),
        }
    }

    /// Delay before retry number `retry` (1-based), capped at `max`
    pub fn delay(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.initial.as_secs_f64() * self.multiplier.powi(exponent);
        if !secs.is_finite() || secs >= self.max.as_secs_f64() {
            return self.max;
        }
        Duration::from_secs_f64(secs)
    }
}

impl From<&RetryConfig> for Backoff {
    fn from(config: &RetryConfig) -> Self {
        Self::new(
            config.initial_interval(),
            config.max_interval(),
            config.multiplier,
        )
    }
}

/// State of one retried operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    /// Not started
    Idle,
    /// Attempt number `attempt` (1-based) is running
    Attempting { attempt: u32 },
    /// Waiting `delay` before retry number `retry`
    Backoff { retry: u32, delay: Duration },
    /// Gave up: fatal error, retry budget or elapsed budget spent
    Exhausted,
    /// Attempt succeeded
    Success,
}

/// Drives `RetryState` transitions; owns no timers
#[derive(Debug, Clone)]
pub struct RetryMachine {
    backoff: Backoff,
    max_retries: u32,
    max_elapsed: Option<Duration>,
    started: Option<Instant>,
    state: RetryState,
}

impl RetryMachine {
    pub fn new(backoff: Backoff, max_retries: u32, max_elapsed: Option<Duration>) -> Self {
        Self {
            backoff,
            max_retries,
            max_elapsed,
            started: None,
            state: RetryState::Idle,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(Backoff::from(config), config.max_retries, config.max_elapsed())
    }

    pub fn state(&self) -> RetryState {
        self.state
    }

    /// `Idle -> Attempting(1)`
    pub fn start(&mut self) -> RetryState {
        if self.state == RetryState::Idle {
            self.started = Some(Instant::now());
            self.state = RetryState::Attempting { attempt: 1 };
        }
        self.state
    }

    /// `Attempting -> Success`
    pub fn on_success(&mut self) -> RetryState {
        if matches!(self.state, RetryState::Attempting { .. }) {
            self.state = RetryState::Success;
        }
        self.state
    }

    /// `Attempting(n) -> Backoff(n) | Exhausted`
    pub fn on_failure(&mut self, error: &WriteError) -> RetryState {
        let RetryState::Attempting { attempt } = self.state else {
            return self.state;
        };
        let out_of_retries = self.max_retries > 0 && attempt > self.max_retries;
        let out_of_time = match (self.max_elapsed, self.started) {
            (Some(budget), Some(started)) => started.elapsed() >= budget,
            _ => false,
        };
        self.state = if !error.is_retryable() || out_of_retries || out_of_time {
            RetryState::Exhausted
        } else {
            RetryState::Backoff {
                retry: attempt,
                delay: self.backoff.delay(attempt),
            }
        };
        self.state
    }

    /// `Backoff(n) -> Attempting(n + 1)`
    pub fn on_backoff_elapsed(&mut self) -> RetryState {
        if let RetryState::Backoff { retry, .. } = self.state {
            self.state = RetryState::Attempting { attempt: retry + 1 };
        }
        self.state
    }
}

enum Operation<'a> {
    Connect,
    Write(&'a Batch),
}

impl Operation<'_> {
    fn label(&self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Write(_) => "write",
        }
    }
}

/// Writer wrapper adding connection management and retries
pub struct Retry<W> {
    inner: W,
    config: RetryConfig,
    state: Mutex<WriterState>,
    connect_lock: Mutex<()>,
    metrics: Arc<OutputMetrics>,
}

impl<W: Writer + Sync> Retry<W> {
    pub fn new(inner: W, config: RetryConfig, metrics: Arc<OutputMetrics>) -> Self {
        Self {
            inner,
            config,
            state: Mutex::new(WriterState::Unconnected),
            connect_lock: Mutex::new(()),
            metrics,
        }
    }

    /// Current connection state
    pub async fn state(&self) -> WriterState {
        *self.state.lock().await
    }

    /// Access the wrapped writer
    pub fn inner(&self) -> &W {
        &self.inner
    }

    async fn ensure_connected(&self) -> Result<(), WriteError> {
        let _connecting = self.connect_lock.lock().await;
        {
            let mut state = self.state.lock().await;
            match *state {
                WriterState::Connected => return Ok(()),
                WriterState::Closed => return Err(WriteError::fatal("writer is closed")),
                WriterState::Unconnected | WriterState::Connecting => {
                    *state = WriterState::Connecting;
                }
            }
        }

        let result = self.inner.connect().await;
        let mut state = self.state.lock().await;
        if *state == WriterState::Closed {
            drop(state);
            if result.is_ok() {
                // close() ran before this connection existed.
                if let Err(e) = self.inner.close().await {
                    warn!(writer = %self.inner.name(), error = %e, "closing late connection failed");
                }
            }
            return Err(WriteError::fatal("writer closed while connecting"));
        }
        match result {
            Ok(()) => {
                info!(writer = %self.inner.name(), "writer connected");
                *state = WriterState::Connected;
                Ok(())
            }
            Err(e) => {
                *state = WriterState::Unconnected;
                Err(e)
            }
        }
    }

    async fn mark_lost(&self) {
        let mut state = self.state.lock().await;
        if *state == WriterState::Connected {
            *state = WriterState::Unconnected;
        }
    }

    async fn attempt(&self, operation: &Operation<'_>) -> Result<(), WriteError> {
        self.ensure_connected().await?;
        let Operation::Write(batch) = operation else {
            return Ok(());
        };
        match self.inner.write(batch).await {
            Err(WriteError::ConnectionLost(message)) => {
                self.mark_lost().await;
                Err(WriteError::ConnectionLost(message))
            }
            result => result,
        }
    }

    async fn run(&self, operation: Operation<'_>) -> Result<(), WriteError> {
        let mut machine = RetryMachine::from_config(&self.config);
        let mut last_error = None;
        let mut state = machine.start();

        loop {
            match state {
                RetryState::Attempting { attempt } => match self.attempt(&operation).await {
                    Ok(()) => state = machine.on_success(),
                    Err(e) => {
                        debug!(attempt, error = %e, op = operation.label(), "attempt failed");
                        state = machine.on_failure(&e);
                        last_error = Some(e);
                    }
                },
                RetryState::Backoff { retry, delay } => {
                    let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
                    warn!(
                        writer = %self.inner.name(),
                        op = operation.label(),
                        retry,
                        max_retries = self.config.max_retries,
                        delay_ms,
                        error = ?last_error,
                        "Retryable error, will retry"
                    );
                    self.metrics.inc_retry_count();
                    record_write_retry(self.inner.name());
                    tokio::time::sleep(delay).await;
                    state = machine.on_backoff_elapsed();
                }
                RetryState::Success => return Ok(()),
                RetryState::Exhausted | RetryState::Idle => {
                    let error =
                        last_error.unwrap_or_else(|| WriteError::fatal("retry budget exhausted"));
                    error!(
                        writer = %self.inner.name(),
                        op = operation.label(),
                        error = %error,
                        "giving up"
                    );
                    return Err(error);
                }
            }
        }
    }
}

impl<W: Writer + Sync> Writer for Retry<W> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    #[instrument(name = "retry_connect", skip(self), fields(writer = %self.inner.name()))]
    async fn connect(&self) -> Result<(), WriteError> {
        self.run(Operation::Connect).await
    }

    #[instrument(
        name = "retry_write",
        skip(self, batch),
        fields(writer = %self.inner.name(), parts = batch.len())
    )]
    async fn write(&self, batch: &Batch) -> Result<(), WriteError> {
        self.run(Operation::Write(batch)).await
    }

    #[instrument(name = "retry_close", skip(self), fields(writer = %self.inner.name()))]
    async fn close(&self) -> Result<(), WriteError> {
        let mut state = self.state.lock().await;
        if *state == WriterState::Closed {
            return Ok(());
        }
        *state = WriterState::Closed;
        self.inner.close().await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex as StdMutex;

    /// Writer replaying a scripted sequence of outcomes
    pub(crate) struct ScriptedWriter {
        pub script: StdMutex<VecDeque<Result<(), WriteError>>>,
        pub connect_script: StdMutex<VecDeque<Result<(), WriteError>>>,
        pub writes: AtomicU32,
        pub connects: AtomicU32,
        pub closes: AtomicU32,
    }

    impl ScriptedWriter {
        pub fn new(script: Vec<Result<(), WriteError>>) -> Self {
            Self {
                script: StdMutex::new(script.into()),
                connect_script: StdMutex::new(VecDeque::new()),
                writes: AtomicU32::new(0),
                connects: AtomicU32::new(0),
                closes: AtomicU32::new(0),
            }
        }

        pub fn with_connects(self, script: Vec<Result<(), WriteError>>) -> Self {
            *self.connect_script.lock().unwrap() = script.into();
            self
        }
    }

    impl Writer for ScriptedWriter {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn connect(&self) -> Result<(), WriteError> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            self.connect_script.lock().unwrap().pop_front().unwrap_or(Ok(()))
        }

        async fn write(&self, _batch: &Batch) -> Result<(), WriteError> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            self.script.lock().unwrap().pop_front().unwrap_or(Ok(()))
        }

        async fn close(&self) -> Result<(), WriteError> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn config(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            initial_interval_ms: 100,
            max_interval_ms: 1_000,
            multiplier: 2.0,
            max_elapsed_ms: 0,
        }
    }

    fn retry(writer: ScriptedWriter, max_retries: u32) -> Retry<ScriptedWriter> {
        Retry::new(writer, config(max_retries), Arc::new(OutputMetrics::new()))
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let backoff = Backoff::new(Duration::from_millis(100), Duration::from_millis(500), 2.0);
        assert_eq!(backoff.delay(1), Duration::from_millis(100));
        assert_eq!(backoff.delay(2), Duration::from_millis(200));
        assert_eq!(backoff.delay(3), Duration::from_millis(400));
        assert_eq!(backoff.delay(4), Duration::from_millis(500));
        assert_eq!(backoff.delay(u32::MAX), Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_machine_transitions() {
        let mut machine = RetryMachine::from_config(&config(2));
        assert_eq!(machine.state(), RetryState::Idle);
        assert_eq!(machine.start(), RetryState::Attempting { attempt: 1 });

        let err = WriteError::retryable("busy");
        assert_eq!(
            machine.on_failure(&err),
            RetryState::Backoff {
                retry: 1,
                delay: Duration::from_millis(100)
            }
        );
        assert_eq!(machine.on_backoff_elapsed(), RetryState::Attempting { attempt: 2 });
        assert!(matches!(machine.on_failure(&err), RetryState::Backoff { retry: 2, .. }));
        machine.on_backoff_elapsed();
        assert_eq!(machine.on_failure(&err), RetryState::Exhausted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_error_exhausts_immediately() {
        let mut machine = RetryMachine::from_config(&config(0));
        machine.start();
        assert_eq!(machine.on_failure(&WriteError::fatal("bad config")), RetryState::Exhausted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_elapsed_budget_exhausts() {
        let mut machine = RetryMachine::new(
            Backoff::new(Duration::from_millis(10), Duration::from_millis(10), 1.0),
            0,
            Some(Duration::from_millis(50)),
        );
        machine.start();
        tokio::time::advance(Duration::from_millis(60)).await;
        assert_eq!(machine.on_failure(&WriteError::retryable("busy")), RetryState::Exhausted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retryable_failures_then_success() {
        let writer = ScriptedWriter::new(vec![
            Err(WriteError::retryable("busy")),
            Err(WriteError::retryable("busy")),
            Ok(()),
        ]);
        let retry = retry(writer, 3);

        let result = retry.write(&Batch::from_payloads(["a"])).await;

        assert_eq!(result, Ok(()));
        assert_eq!(retry.inner().writes.load(Ordering::SeqCst), 3);
        assert_eq!(retry.metrics.retry_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exceeding_max_retries_surfaces_last_error() {
        let writer = ScriptedWriter::new(vec![Err(WriteError::retryable("busy")); 5]);
        let retry = retry(writer, 2);

        let result = retry.write(&Batch::from_payloads(["a"])).await;

        assert_eq!(result, Err(WriteError::retryable("busy")));
        assert_eq!(retry.inner().writes.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connection_lost_reconnects_transparently() {
        let writer = ScriptedWriter::new(vec![Err(WriteError::connection_lost("reset")), Ok(())]);
        let retry = retry(writer, 3);

        assert_eq!(retry.write(&Batch::from_payloads(["a"])).await, Ok(()));
        assert_eq!(retry.inner().connects.load(Ordering::SeqCst), 2);
        assert_eq!(retry.state().await, WriterState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_retried_before_write() {
        let writer = ScriptedWriter::new(vec![Ok(())])
            .with_connects(vec![Err(WriteError::retryable("unavailable")), Ok(())]);
        let retry = retry(writer, 0);

        assert_eq!(retry.write(&Batch::from_payloads(["a"])).await, Ok(()));
        assert_eq!(retry.inner().connects.load(Ordering::SeqCst), 2);
        assert_eq!(retry.inner().writes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_misconfigured_connect_is_fatal() {
        let writer =
            ScriptedWriter::new(vec![]).with_connects(vec![Err(WriteError::fatal("no such host"))]);
        let retry = retry(writer, 0);

        assert_eq!(retry.connect().await, Err(WriteError::fatal("no such host")));
        assert_eq!(retry.inner().writes.load(Ordering::SeqCst), 0);
        assert_eq!(retry.state().await, WriterState::Unconnected);
    }

    #[tokio::test]
    async fn test_write_after_close_is_fatal() {
        let retry = retry(ScriptedWriter::new(vec![]), 0);
        retry.close().await.unwrap();
        retry.close().await.unwrap();

        assert!(matches!(
            retry.write(&Batch::from_payloads(["a"])).await,
            Err(WriteError::Fatal(_))
        ));
        assert_eq!(retry.inner().closes.load(Ordering::SeqCst), 1);
    }

    /// Writer whose connect waits for the test to release it
    struct GatedConnectWriter {
        gate: tokio::sync::Notify,
        closes: AtomicU32,
    }

    impl Writer for GatedConnectWriter {
        fn name(&self) -> &str {
            "gated"
        }

        async fn connect(&self) -> Result<(), WriteError> {
            self.gate.notified().await;
            Ok(())
        }

        async fn write(&self, _batch: &Batch) -> Result<(), WriteError> {
            Ok(())
        }

        async fn close(&self) -> Result<(), WriteError> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_close_during_connect_closes_late_connection() {
        let retry = Arc::new(Retry::new(
            GatedConnectWriter {
                gate: tokio::sync::Notify::new(),
                closes: AtomicU32::new(0),
            },
            RetryConfig::default(),
            Arc::new(OutputMetrics::new()),
        ));

        let write = tokio::spawn({
            let retry = Arc::clone(&retry);
            async move { retry.write(&Batch::from_payloads(["a"])).await }
        });
        while retry.state().await != WriterState::Connecting {
            tokio::task::yield_now().await;
        }

        retry.close().await.unwrap();
        retry.inner().gate.notify_one();

        assert!(matches!(write.await.unwrap(), Err(WriteError::Fatal(_))));
        assert_eq!(retry.inner().closes.load(Ordering::SeqCst), 2);
        assert_eq!(retry.state().await, WriterState::Closed);
    }
}
