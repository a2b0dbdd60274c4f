use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::MockSatelliteError;
use crate::fault::FaultInjector;
use crate::handler::{
    ERROR_PATH, PREMATURE_CLOSE_PATH, REPORT_PATH, REPORTS_PATH, SPANS_PATH,
    STREAMING_REPORT_PATH, SatelliteState, THROTTLE_PATH, TIMEOUT_PATH, arm_error,
    arm_premature_close, arm_timeout, disable_throttle, enable_throttle, get_reports, get_spans,
    handle_report,
};
use crate::pipeline::{DEFAULT_QUEUE_CAPACITY, DrainHandle, IngestionPipeline};
use crate::proto::{ReportRequest, Span};
use crate::store::ReportStore;

/// Delay inserted before each streamed span while throttling is enabled.
pub const DEFAULT_THROTTLE_DELAY: Duration = Duration::from_millis(100);

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// A mock satellite for testing tracer clients.
pub struct MockSatellite {
    store: Arc<RwLock<ReportStore>>,
    host: IpAddr,
    port: u16,
    queue_capacity: usize,
    throttle_delay: Duration,
}

impl MockSatellite {
    /// Creates a builder for configuring the satellite.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use mock_satellite::MockSatellite;
    /// use std::time::Duration;
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let server = MockSatellite::builder()
    ///     .port(0)
    ///     .throttle_delay(Duration::from_millis(20))
    ///     .start()
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn builder() -> MockSatelliteBuilder {
        MockSatelliteBuilder::default()
    }

    /// Binds the listener, starts the ingestion pipeline and serves requests
    /// in the background.
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to bind to the configured address.
    pub async fn start(self) -> Result<ServerHandle, MockSatelliteError> {
        let addr = SocketAddr::new(self.host, self.port);
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| MockSatelliteError::BindError { addr, source })?;
        let bound_addr = listener
            .local_addr()
            .map_err(|source| MockSatelliteError::BindError { addr, source })?;

        let faults = Arc::new(FaultInjector::new());
        let shutdown = CancellationToken::new();
        let (sender, drain) = IngestionPipeline::spawn(self.store.clone(), self.queue_capacity);

        let app = router(SatelliteState {
            sender,
            store: self.store.clone(),
            faults: faults.clone(),
            shutdown: shutdown.clone(),
            throttle_delay: self.throttle_delay,
        });

        let signal = shutdown.clone();
        let server_task = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    signal.cancelled().await;
                })
                .await
                .map_err(|e| MockSatelliteError::ServerError(e.to_string()))
        });

        info!(
            addr = %bound_addr,
            queue_capacity = self.queue_capacity,
            "mock satellite listening"
        );

        Ok(ServerHandle {
            store: self.store,
            faults,
            addr: bound_addr,
            shutdown,
            task: Some(server_task),
            drain: Some(drain),
        })
    }
}

fn router(state: SatelliteState) -> Router {
    Router::new()
        .route(REPORT_PATH, post(handle_report))
        .route(STREAMING_REPORT_PATH, post(handle_report))
        .route(REPORTS_PATH, get(get_reports))
        .route(SPANS_PATH, get(get_spans))
        .route(ERROR_PATH, post(arm_error))
        .route(TIMEOUT_PATH, post(arm_timeout))
        .route(THROTTLE_PATH, post(enable_throttle).delete(disable_throttle))
        .route(PREMATURE_CLOSE_PATH, post(arm_premature_close))
        .layer(DefaultBodyLimit::disable())
        .with_state(state)
}

/// Builder for configuring a [`MockSatellite`].
#[derive(Debug)]
pub struct MockSatelliteBuilder {
    store: Option<Arc<RwLock<ReportStore>>>,
    host: IpAddr,
    port: u16,
    queue_capacity: usize,
    throttle_delay: Duration,
}

impl Default for MockSatelliteBuilder {
    fn default() -> Self {
        Self {
            store: None,
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 0,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            throttle_delay: DEFAULT_THROTTLE_DELAY,
        }
    }
}

impl MockSatelliteBuilder {
    /// Sets the host address to bind to. Defaults to 127.0.0.1.
    #[must_use]
    pub fn host(mut self, host: IpAddr) -> Self {
        self.host = host;
        self
    }

    /// Sets the port. Defaults to 0, which lets the OS pick one.
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets how many reports may queue before handlers block. Defaults to 5.
    ///
    /// A capacity of zero is raised to one.
    #[must_use]
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Sets the per-span delay applied while throttling. Defaults to 100ms.
    #[must_use]
    pub fn throttle_delay(mut self, delay: Duration) -> Self {
        self.throttle_delay = delay;
        self
    }

    /// Records into an existing store, e.g. one shared between servers.
    #[must_use]
    pub fn store(mut self, store: Arc<RwLock<ReportStore>>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn build(self) -> MockSatellite {
        MockSatellite {
            store: self
                .store
                .unwrap_or_else(|| Arc::new(RwLock::new(ReportStore::new()))),
            host: self.host,
            port: self.port,
            queue_capacity: self.queue_capacity,
            throttle_delay: self.throttle_delay,
        }
    }

    /// Builds and starts the satellite.
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to bind to the configured address.
    pub async fn start(self) -> Result<ServerHandle, MockSatelliteError> {
        self.build().start().await
    }
}

/// A handle to a running mock satellite.
///
/// Use this to inspect the store, arm faults directly, or shut the server down.
pub struct ServerHandle {
    store: Arc<RwLock<ReportStore>>,
    faults: Arc<FaultInjector>,
    addr: SocketAddr,
    shutdown: CancellationToken,
    task: Option<tokio::task::JoinHandle<Result<(), MockSatelliteError>>>,
    drain: Option<DrainHandle>,
}

impl std::fmt::Debug for ServerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerHandle")
            .field("addr", &self.addr)
            .field("faults", &self.faults)
            .field("store", &"<RwLock<ReportStore>>")
            .finish()
    }
}

impl ServerHandle {
    /// Returns a clone of the store's Arc for direct access.
    pub fn store(&self) -> Arc<RwLock<ReportStore>> {
        self.store.clone()
    }

    /// Runs a closure with read access to the store.
    pub async fn with_store<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&ReportStore) -> R,
    {
        let store = self.store.read().await;
        f(&store)
    }

    /// Snapshot of every stored report, in store order.
    pub async fn reports(&self) -> Vec<ReportRequest> {
        self.store.read().await.snapshot_reports()
    }

    /// Snapshot of every stored span, flattened in store order.
    pub async fn spans(&self) -> Vec<Span> {
        self.store.read().await.snapshot_spans()
    }

    /// The fault toggles this server consults, for arming without HTTP.
    pub fn faults(&self) -> &FaultInjector {
        &self.faults
    }

    /// Returns the actual bound address of the server.
    ///
    /// This is useful when using port 0 for OS-assigned ports.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Waits until at least `count` reports have been stored.
    ///
    /// # Errors
    ///
    /// Returns [`MockSatelliteError::WaitTimeout`] if the count is not reached in time.
    pub async fn wait_for_reports(
        &self,
        count: usize,
        timeout: Duration,
    ) -> Result<(), MockSatelliteError> {
        self.wait_until("reports", count, timeout, ReportStore::report_count)
            .await
    }

    /// Waits until at least `count` spans have been stored.
    ///
    /// # Errors
    ///
    /// Returns [`MockSatelliteError::WaitTimeout`] if the count is not reached in time.
    pub async fn wait_for_spans(
        &self,
        count: usize,
        timeout: Duration,
    ) -> Result<(), MockSatelliteError> {
        self.wait_until("spans", count, timeout, ReportStore::span_count)
            .await
    }

    async fn wait_until<F>(
        &self,
        what: &'static str,
        expected: usize,
        timeout: Duration,
        measure: F,
    ) -> Result<(), MockSatelliteError>
    where
        F: Fn(&ReportStore) -> usize,
    {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let found = measure(&*self.store.read().await);
            if found >= expected {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(MockSatelliteError::WaitTimeout {
                    what,
                    expected,
                    found,
                    timeout,
                });
            }
            tokio::time::sleep(WAIT_POLL_INTERVAL).await;
        }
    }

    /// Resolves once the listener has been closed, either by a premature
    /// close fault or by shutdown.
    pub async fn stopped(&self) {
        self.shutdown.cancelled().await;
    }

    pub fn is_stopped(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Stops accepting connections, drops connections held by the timeout
    /// fault, and waits for every queued report to reach the store.
    ///
    /// Returns the number of reports the pipeline stored over the server's life.
    ///
    /// # Errors
    ///
    /// Returns an error if the server task panicked or the pipeline consumer
    /// died before draining.
    pub async fn shutdown(mut self) -> Result<usize, MockSatelliteError> {
        self.shutdown.cancel();
        if let Some(task) = self.task.take() {
            task.await??;
        }
        match self.drain.take() {
            Some(drain) => {
                let stored = drain.wait_drained().await?;
                info!(addr = %self.addr, stored, "mock satellite stopped");
                Ok(stored)
            }
            None => Ok(0),
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let builder = MockSatellite::builder();
        assert_eq!(builder.host, IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(builder.port, 0);
        assert_eq!(builder.queue_capacity, DEFAULT_QUEUE_CAPACITY);
        assert_eq!(builder.throttle_delay, DEFAULT_THROTTLE_DELAY);
        assert!(builder.store.is_none());
    }

    #[test]
    fn test_zero_queue_capacity_is_raised() {
        let satellite = MockSatellite::builder().queue_capacity(0).build();
        assert_eq!(satellite.queue_capacity, 1);
    }

    #[tokio::test]
    async fn test_start_and_shutdown_without_traffic() {
        let server = MockSatellite::builder().start().await.unwrap();
        assert_ne!(server.addr().port(), 0);
        assert!(!server.is_stopped());
        assert_eq!(server.shutdown().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_bind_conflict_is_reported() {
        let first = MockSatellite::builder().start().await.unwrap();
        let result = MockSatellite::builder()
            .port(first.addr().port())
            .start()
            .await;
        assert!(matches!(result, Err(MockSatelliteError::BindError { .. })));
        first.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_wait_times_out_with_counts() {
        let server = MockSatellite::builder().start().await.unwrap();
        let err = server
            .wait_for_spans(1, Duration::from_millis(30))
            .await
            .unwrap_err();
        match err {
            MockSatelliteError::WaitTimeout {
                what,
                expected,
                found,
                ..
            } => {
                assert_eq!(what, "spans");
                assert_eq!(expected, 1);
                assert_eq!(found, 0);
            }
            other => panic!("unexpected error: {other}"),
        }
        server.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_shared_store_is_used() {
        let store = Arc::new(RwLock::new(ReportStore::new()));
        store.write().await.append(ReportRequest::default());

        let server = MockSatellite::builder()
            .store(store.clone())
            .start()
            .await
            .unwrap();
        assert!(Arc::ptr_eq(&server.store(), &store));
        assert_eq!(server.with_store(|s| s.report_count()).await, 1);
        server.shutdown().await.unwrap();
    }
}
