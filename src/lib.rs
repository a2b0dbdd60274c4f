//! A mock trace satellite for testing tracer clients.
//!
//! The satellite accepts span reports over HTTP, either as one fixed-length
//! protobuf `ReportRequest` or as a stream of length-delimited sub-messages,
//! and records everything it decodes in an ordered [`ReportStore`]. Tests can
//! then query the store, assert on it, and inject faults to see how a client
//! copes with slow, failing and vanishing endpoints.
//!
//! # Features
//!
//! - **Fixed and Streaming Ingestion**: whole reports or a reporter/auth/metrics
//!   prologue followed by spans, one stored report per streamed span
//! - **Fault Injection**: error, timeout and premature close on the next
//!   report, plus sticky throttling of streamed spans
//! - **Fluent Assertion API**: count-based and negative assertions over
//!   reports and spans
//! - **Bounded Ingestion**: a single consumer drains a bounded queue, so a
//!   stalled store applies backpressure to request handlers
//!
//! # Quick Start
//!
//! ```no_run
//! use mock_satellite::MockSatellite;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = MockSatellite::builder().start().await?;
//!
//!     // Point the tracer under test at server.addr() and send reports...
//!
//!     server.wait_for_spans(3, Duration::from_secs(5)).await?;
//!     server
//!         .with_store(|store| {
//!             store
//!                 .expect_span_with_operation("checkout")
//!                 .with_tag("component", "cart")
//!                 .assert_exists();
//!             store.expect_report().with_internal_metrics().assert_count(1);
//!         })
//!         .await;
//!
//!     let stored = server.shutdown().await?;
//!     println!("stored {stored} reports");
//!     Ok(())
//! }
//! ```
//!
//! # HTTP Surface
//!
//! | Method | Path | Effect |
//! |--------|------|--------|
//! | POST | [`REPORT_PATH`] | Ingest a report, streamed if sent chunked |
//! | POST | [`STREAMING_REPORT_PATH`] | Ingest a streamed report |
//! | GET | [`REPORTS_PATH`] | Every stored report as a protobuf `Reports` |
//! | GET | [`SPANS_PATH`] | Every stored span as a protobuf `Spans` |
//! | POST | [`ERROR_PATH`] | Answer the next report with a 500 |
//! | POST | [`TIMEOUT_PATH`] | Never answer the next report |
//! | POST/DELETE | [`THROTTLE_PATH`] | Enable or disable throttling |
//! | POST | [`PREMATURE_CLOSE_PATH`] | Close the listener on the next report |
//!
//! Faults can also be armed without HTTP through [`ServerHandle::faults`].

mod error;
mod fault;
mod frame;
mod handler;
mod pipeline;
pub mod proto;
mod server;
mod store;

pub use error::{FrameError, MockSatelliteError};
pub use fault::FaultInjector;
pub use frame::{EmbeddedMessage, FrameDecoder, encode_embedded, encode_stream, field_tag};
pub use handler::{
    ERROR_PATH, PREMATURE_CLOSE_PATH, REPORT_PATH, REPORTS_PATH, RequestPhase, SPANS_PATH,
    STREAMING_REPORT_PATH, THROTTLE_PATH, TIMEOUT_PATH,
};
pub use pipeline::{DEFAULT_QUEUE_CAPACITY, DrainHandle, IngestionPipeline, ReportSender};
pub use server::{DEFAULT_THROTTLE_DELAY, MockSatellite, MockSatelliteBuilder, ServerHandle};
pub use store::{ReportAssertion, ReportStore, SpanAssertion};
