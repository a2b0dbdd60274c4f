//! HTTP handlers for report ingestion, store queries and fault arming.

use std::fmt;
use std::panic;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use futures_util::TryStreamExt;
use prost::Message;
use prost_types::Timestamp;
use tokio::sync::RwLock;
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::MockSatelliteError;
use crate::fault::FaultInjector;
use crate::frame::{EmbeddedMessage, FrameDecoder};
use crate::pipeline::ReportSender;
use crate::proto::{ReportRequest, ReportResponse, Reports, Spans};
use crate::store::ReportStore;

pub const REPORT_PATH: &str = "/api/v2/reports";
pub const STREAMING_REPORT_PATH: &str = "/report-mock-streaming";
pub const REPORTS_PATH: &str = "/reports";
pub const SPANS_PATH: &str = "/spans";
pub const ERROR_PATH: &str = "/error-on-next-report";
pub const TIMEOUT_PATH: &str = "/timeout-on-next-report";
pub const THROTTLE_PATH: &str = "/throttle-reports";
pub const PREMATURE_CLOSE_PATH: &str = "/premature-close-next-report";

const PROTOBUF_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Clone)]
pub(crate) struct SatelliteState {
    pub(crate) sender: ReportSender,
    pub(crate) store: Arc<RwLock<ReportStore>>,
    pub(crate) faults: Arc<FaultInjector>,
    pub(crate) shutdown: CancellationToken,
    pub(crate) throttle_delay: Duration,
}

/// Where a report request was when decoding failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestPhase {
    ReadingPrologue,
    ReadingSpan,
}

impl fmt::Display for RequestPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestPhase::ReadingPrologue => f.write_str("reading prologue"),
            RequestPhase::ReadingSpan => f.write_str("reading span"),
        }
    }
}

/// Unwind payload for connections that are dropped without a response.
struct ConnectionDropped;

pub(crate) fn is_streaming(path: &str, headers: &HeaderMap) -> bool {
    if path == STREAMING_REPORT_PATH {
        return true;
    }
    headers
        .get_all(header::TRANSFER_ENCODING)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|coding| coding.trim().eq_ignore_ascii_case("chunked"))
}

/// Aborts the request on a protocol violation.
///
/// Malformed reports are bugs in the client under test, so they fail loudly
/// instead of being answered.
#[allow(clippy::panic)]
pub(crate) fn fatal(phase: RequestPhase, violation: impl fmt::Display) -> ! {
    let violation = violation.to_string();
    error!(%phase, %violation, "report protocol violation");
    panic!("report protocol violation while {phase}: {violation}");
}

fn drop_connection() -> ! {
    panic::resume_unwind(Box::new(ConnectionDropped))
}

fn now() -> Timestamp {
    Timestamp::from(SystemTime::now())
}

fn protobuf_response<M: Message>(message: &M) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, PROTOBUF_CONTENT_TYPE)],
        message.encode_to_vec(),
    )
        .into_response()
}

pub(crate) async fn handle_report(
    State(state): State<SatelliteState>,
    request: Request,
) -> Response {
    let receive_timestamp = now();

    let consumed = if is_streaming(request.uri().path(), request.headers()) {
        serve_streaming(&state, request.into_body()).await
    } else {
        serve_fixed(&state, request).await
    };

    if let Err(e) = consumed {
        error!(error = %e, "failed to queue report");
        return (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response();
    }

    respond(&state, receive_timestamp).await
}

async fn serve_fixed(state: &SatelliteState, request: Request) -> Result<(), MockSatelliteError> {
    let phase = RequestPhase::ReadingPrologue;
    let declared = request
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<usize>().ok())
        .unwrap_or_else(|| fatal(phase, "missing or invalid content-length"));

    let body = axum::body::to_bytes(request.into_body(), declared)
        .await
        .unwrap_or_else(|e| fatal(phase, e));
    if body.len() != declared {
        fatal(
            phase,
            format!("declared {} bytes, received {}", declared, body.len()),
        );
    }

    let report = ReportRequest::decode_embedded(&body).unwrap_or_else(|e| fatal(phase, e));
    debug!(spans = report.spans.len(), "fixed report decoded");
    state.sender.send(report).await
}

async fn serve_streaming(state: &SatelliteState, body: Body) -> Result<(), MockSatelliteError> {
    let reader = StreamReader::new(body.into_data_stream().map_err(std::io::Error::other));
    let mut decoder = FrameDecoder::new(reader);

    let header = decoder
        .read_header()
        .await
        .unwrap_or_else(|e| fatal(RequestPhase::ReadingPrologue, e));
    let reporter = header.reporter.clone();
    let auth = header.auth.clone();
    state.sender.send(header).await?;

    let mut spans = 0usize;
    loop {
        if state.faults.is_throttled() {
            tokio::time::sleep(state.throttle_delay).await;
        }

        let span = match decoder.next_span().await {
            Ok(Some(span)) => span,
            Ok(None) => break,
            Err(e) => fatal(RequestPhase::ReadingSpan, e),
        };

        // Internal metrics only travel with the header so they are counted once.
        state
            .sender
            .send(ReportRequest {
                reporter: reporter.clone(),
                auth: auth.clone(),
                spans: vec![span],
                ..Default::default()
            })
            .await?;
        spans += 1;
    }

    debug!(spans, "streamed report consumed");
    Ok(())
}

async fn respond(state: &SatelliteState, receive_timestamp: Timestamp) -> Response {
    if state.faults.consume_premature_close() {
        warn!("premature close: closing listener and dropping connection");
        state.shutdown.cancel();
        drop_connection();
    }

    if state.faults.consume_timeout() {
        warn!("timeout: holding connection until shutdown");
        state.shutdown.cancelled().await;
        drop_connection();
    }

    if state.faults.consume_error() {
        warn!("error: answering report with an error status");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    protobuf_response(&ReportResponse {
        receive_timestamp: Some(receive_timestamp),
        transmit_timestamp: Some(now()),
        ..Default::default()
    })
}

pub(crate) async fn get_reports(State(state): State<SatelliteState>) -> Response {
    let reports = state.store.read().await.snapshot_reports();
    protobuf_response(&Reports { reports })
}

pub(crate) async fn get_spans(State(state): State<SatelliteState>) -> Response {
    let spans = state.store.read().await.snapshot_spans();
    protobuf_response(&Spans { spans })
}

pub(crate) async fn arm_error(State(state): State<SatelliteState>) -> StatusCode {
    state.faults.arm_error();
    info!("error armed for next report");
    StatusCode::OK
}

pub(crate) async fn arm_timeout(State(state): State<SatelliteState>) -> StatusCode {
    state.faults.arm_timeout();
    info!("timeout armed for next report");
    StatusCode::OK
}

pub(crate) async fn enable_throttle(State(state): State<SatelliteState>) -> StatusCode {
    state.faults.set_throttle(true);
    info!(delay = ?state.throttle_delay, "throttling streamed reports");
    StatusCode::OK
}

pub(crate) async fn disable_throttle(State(state): State<SatelliteState>) -> StatusCode {
    state.faults.set_throttle(false);
    info!("throttling disabled");
    StatusCode::OK
}

pub(crate) async fn arm_premature_close(State(state): State<SatelliteState>) -> StatusCode {
    state.faults.arm_premature_close();
    info!("premature close armed for next report");
    StatusCode::OK
}
