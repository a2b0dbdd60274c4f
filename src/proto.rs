//! Collector protobuf messages.
//!
//! These mirror the subset of the collector schema a tracer client sends and
//! expects back. The mock only relies on the field numbers of
//! [`ReportRequest`]; everything inside a [`Span`] is carried through untouched.

use std::collections::HashMap;

use prost_types::Timestamp;

/// Field number of [`ReportRequest::reporter`].
pub const REPORTER_FIELD: u32 = 1;
/// Field number of [`ReportRequest::auth`].
pub const AUTH_FIELD: u32 = 2;
/// Field number of [`ReportRequest::spans`].
pub const SPANS_FIELD: u32 = 3;
/// Field number of [`ReportRequest::internal_metrics`].
pub const INTERNAL_METRICS_FIELD: u32 = 6;

#[derive(Clone, PartialEq, prost::Message)]
pub struct SpanContext {
    #[prost(uint64, tag = "1")]
    pub trace_id: u64,
    #[prost(uint64, tag = "2")]
    pub span_id: u64,
    #[prost(map = "string, string", tag = "3")]
    pub baggage: HashMap<String, String>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct KeyValue {
    #[prost(string, tag = "1")]
    pub key: String,
    #[prost(oneof = "key_value::Value", tags = "2, 3, 4, 5, 6")]
    pub value: Option<key_value::Value>,
}

pub mod key_value {
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Value {
        #[prost(string, tag = "2")]
        StringValue(String),
        #[prost(int64, tag = "3")]
        IntValue(i64),
        #[prost(double, tag = "4")]
        DoubleValue(f64),
        #[prost(bool, tag = "5")]
        BoolValue(bool),
        #[prost(string, tag = "6")]
        JsonValue(String),
    }
}

impl KeyValue {
    pub fn string(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: Some(key_value::Value::StringValue(value.into())),
        }
    }
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Log {
    #[prost(message, optional, tag = "1")]
    pub timestamp: Option<Timestamp>,
    #[prost(message, repeated, tag = "2")]
    pub fields: Vec<KeyValue>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Reference {
    #[prost(enumeration = "reference::Relationship", tag = "1")]
    pub relationship: i32,
    #[prost(message, optional, tag = "2")]
    pub span_context: Option<SpanContext>,
}

pub mod reference {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
    #[repr(i32)]
    pub enum Relationship {
        ChildOf = 0,
        FollowsFrom = 1,
    }
}

/// A finished span as reported by a tracer.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Span {
    #[prost(message, optional, tag = "1")]
    pub span_context: Option<SpanContext>,
    #[prost(string, tag = "2")]
    pub operation_name: String,
    #[prost(message, repeated, tag = "3")]
    pub references: Vec<Reference>,
    #[prost(message, optional, tag = "4")]
    pub start_timestamp: Option<Timestamp>,
    #[prost(uint64, tag = "5")]
    pub duration_micros: u64,
    #[prost(message, repeated, tag = "6")]
    pub tags: Vec<KeyValue>,
    #[prost(message, repeated, tag = "7")]
    pub logs: Vec<Log>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Reporter {
    #[prost(uint64, tag = "1")]
    pub reporter_id: u64,
    #[prost(message, repeated, tag = "4")]
    pub tags: Vec<KeyValue>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct MetricsSample {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(oneof = "metrics_sample::Value", tags = "2, 3")]
    pub value: Option<metrics_sample::Value>,
}

pub mod metrics_sample {
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Value {
        #[prost(int64, tag = "2")]
        IntValue(i64),
        #[prost(double, tag = "3")]
        DoubleValue(f64),
    }
}

/// Tracer self-telemetry, sent once per stream in the header.
#[derive(Clone, PartialEq, prost::Message)]
pub struct InternalMetrics {
    #[prost(message, optional, tag = "1")]
    pub start_timestamp: Option<Timestamp>,
    #[prost(uint64, tag = "2")]
    pub duration_micros: u64,
    #[prost(message, repeated, tag = "3")]
    pub logs: Vec<Log>,
    #[prost(message, repeated, tag = "4")]
    pub counts: Vec<MetricsSample>,
    #[prost(message, repeated, tag = "5")]
    pub gauges: Vec<MetricsSample>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Auth {
    #[prost(string, tag = "1")]
    pub access_token: String,
}

/// One report as accepted by the satellite.
///
/// Streamed requests are split into a header report (reporter, auth and
/// internal metrics) followed by one report per span.
#[derive(Clone, PartialEq, prost::Message)]
pub struct ReportRequest {
    #[prost(message, optional, tag = "1")]
    pub reporter: Option<Reporter>,
    #[prost(message, optional, tag = "2")]
    pub auth: Option<Auth>,
    #[prost(message, repeated, tag = "3")]
    pub spans: Vec<Span>,
    #[prost(int64, tag = "5")]
    pub timestamp_offset_micros: i64,
    #[prost(message, optional, tag = "6")]
    pub internal_metrics: Option<InternalMetrics>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Command {
    #[prost(bool, tag = "1")]
    pub disable: bool,
    #[prost(bool, tag = "2")]
    pub dev_mode: bool,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ReportResponse {
    #[prost(message, repeated, tag = "1")]
    pub commands: Vec<Command>,
    #[prost(message, optional, tag = "2")]
    pub receive_timestamp: Option<Timestamp>,
    #[prost(message, optional, tag = "3")]
    pub transmit_timestamp: Option<Timestamp>,
    #[prost(string, repeated, tag = "4")]
    pub errors: Vec<String>,
    #[prost(string, repeated, tag = "5")]
    pub warnings: Vec<String>,
    #[prost(string, repeated, tag = "6")]
    pub infos: Vec<String>,
}

/// Body of `GET /reports`.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Reports {
    #[prost(message, repeated, tag = "1")]
    pub reports: Vec<ReportRequest>,
}

/// Body of `GET /spans`.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Spans {
    #[prost(message, repeated, tag = "1")]
    pub spans: Vec<Span>,
}
