//! Decoder for framed report streams.
//!
//! A streamed report is a sequence of length-delimited sub-messages laid out
//! exactly as protobuf would encode the corresponding `ReportRequest` fields:
//!
//! ```text
//! varint(field << 3 | 2) | varint(len) | len bytes of payload
//! ```
//!
//! The stream opens with the reporter, auth and internal metrics sub-messages
//! in that order and continues with any number of span sub-messages until the
//! body ends.

use prost::Message;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

use crate::error::FrameError;
use crate::proto::{
    AUTH_FIELD, Auth, INTERNAL_METRICS_FIELD, InternalMetrics, REPORTER_FIELD, ReportRequest,
    Reporter, SPANS_FIELD, Span,
};

const LENGTH_DELIMITED: u64 = 2;
const MAX_VARINT_LEN: usize = 10;

/// A message that can be decoded from an exact-length payload.
pub trait EmbeddedMessage: Sized {
    fn decode_embedded(payload: &[u8]) -> Result<Self, prost::DecodeError>;
}

impl<M: Message + Default> EmbeddedMessage for M {
    fn decode_embedded(payload: &[u8]) -> Result<Self, prost::DecodeError> {
        M::decode(payload)
    }
}

/// Computes the tag of a length-delimited field.
pub fn field_tag(field: u32) -> u64 {
    (u64::from(field) << 3) | LENGTH_DELIMITED
}

/// Reads tagged, length-delimited sub-messages from a byte stream.
#[derive(Debug)]
pub struct FrameDecoder<R> {
    reader: R,
}

impl<R: AsyncBufRead + Unpin> FrameDecoder<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Decodes the reporter, auth and internal metrics prologue into a header report.
    pub async fn read_header(&mut self) -> Result<ReportRequest, FrameError> {
        let reporter: Reporter = self.read_embedded(REPORTER_FIELD).await?;
        let auth: Auth = self.read_embedded(AUTH_FIELD).await?;
        let internal_metrics: InternalMetrics = self.read_embedded(INTERNAL_METRICS_FIELD).await?;
        Ok(ReportRequest {
            reporter: Some(reporter),
            auth: Some(auth),
            internal_metrics: Some(internal_metrics),
            ..Default::default()
        })
    }

    /// Decodes the next span, or returns `None` if the stream ended on a
    /// sub-message boundary.
    pub async fn next_span(&mut self) -> Result<Option<Span>, FrameError> {
        if self.at_end().await? {
            return Ok(None);
        }
        self.read_embedded(SPANS_FIELD).await.map(Some)
    }

    /// Returns true if no more bytes are available. Does not consume input.
    pub async fn at_end(&mut self) -> Result<bool, FrameError> {
        let available = self.reader.fill_buf().await.map_err(FrameError::Io)?;
        Ok(available.is_empty())
    }

    /// Decodes one sub-message that must carry `field`.
    pub async fn read_embedded<M: EmbeddedMessage>(&mut self, field: u32) -> Result<M, FrameError> {
        let expected = field_tag(field);
        let found = self.read_varint().await?;
        if found != expected {
            return Err(FrameError::UnexpectedTag {
                field,
                expected,
                found,
            });
        }

        let declared = self.read_varint().await?;
        // Grow with what actually arrives; the declared length is untrusted.
        let mut payload = Vec::new();
        let read = (&mut self.reader)
            .take(declared)
            .read_to_end(&mut payload)
            .await? as u64;
        if read != declared {
            return Err(FrameError::Truncated { declared, read });
        }

        Ok(M::decode_embedded(&payload)?)
    }

    async fn read_varint(&mut self) -> Result<u64, FrameError> {
        let mut value = 0u64;
        for index in 0..MAX_VARINT_LEN {
            let byte = self.reader.read_u8().await?;
            if index == MAX_VARINT_LEN - 1 && byte > 1 {
                return Err(FrameError::MalformedVarint);
            }
            value |= u64::from(byte & 0x7f) << (7 * index);
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(FrameError::MalformedVarint)
    }
}

/// Appends `message` to `buf` as a sub-message of `field`.
pub fn encode_embedded<M: Message>(field: u32, message: &M, buf: &mut Vec<u8>) {
    prost::encoding::message::encode(field, message, buf);
}

/// Encodes a complete report stream: the header prologue followed by one
/// sub-message per span.
///
/// Missing header parts are written as empty messages so the prologue is
/// always complete.
pub fn encode_stream(header: &ReportRequest, spans: &[Span]) -> Vec<u8> {
    let mut buf = Vec::new();
    encode_embedded(
        REPORTER_FIELD,
        &header.reporter.clone().unwrap_or_default(),
        &mut buf,
    );
    encode_embedded(AUTH_FIELD, &header.auth.clone().unwrap_or_default(), &mut buf);
    encode_embedded(
        INTERNAL_METRICS_FIELD,
        &header.internal_metrics.clone().unwrap_or_default(),
        &mut buf,
    );
    for span in spans {
        encode_embedded(SPANS_FIELD, span, &mut buf);
    }
    buf
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::proto::{KeyValue, MetricsSample, metrics_sample};

    fn header() -> ReportRequest {
        ReportRequest {
            reporter: Some(Reporter {
                reporter_id: 7,
                tags: vec![KeyValue::string("lightstep.component_name", "checkout")],
            }),
            auth: Some(Auth {
                access_token: "abc123".to_string(),
            }),
            internal_metrics: Some(InternalMetrics {
                counts: vec![MetricsSample {
                    name: "spans.dropped".to_string(),
                    value: Some(metrics_sample::Value::IntValue(2)),
                }],
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn span(name: &str) -> Span {
        Span {
            operation_name: name.to_string(),
            duration_micros: 15,
            ..Default::default()
        }
    }

    #[test]
    fn test_field_tag() {
        assert_eq!(field_tag(REPORTER_FIELD), 10);
        assert_eq!(field_tag(AUTH_FIELD), 18);
        assert_eq!(field_tag(SPANS_FIELD), 26);
        assert_eq!(field_tag(INTERNAL_METRICS_FIELD), 50);
    }

    #[tokio::test]
    async fn test_decodes_header_and_spans_in_order() {
        let body = encode_stream(&header(), &[span("a"), span("b"), span("c")]);
        let mut decoder = FrameDecoder::new(body.as_slice());

        let decoded = decoder.read_header().await.unwrap();
        assert_eq!(decoded.reporter.as_ref().unwrap().reporter_id, 7);
        assert_eq!(decoded.auth.as_ref().unwrap().access_token, "abc123");
        assert_eq!(decoded.internal_metrics.as_ref().unwrap().counts.len(), 1);
        assert!(decoded.spans.is_empty());

        let mut names = Vec::new();
        while let Some(span) = decoder.next_span().await.unwrap() {
            names.push(span.operation_name);
        }
        assert_eq!(names, ["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_header_only_stream_has_no_spans() {
        let body = encode_stream(&header(), &[]);
        let mut decoder = FrameDecoder::new(body.as_slice());

        decoder.read_header().await.unwrap();
        assert!(decoder.at_end().await.unwrap());
        assert!(decoder.next_span().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_at_end_does_not_consume() {
        let body = encode_stream(&header(), &[span("only")]);
        let mut decoder = FrameDecoder::new(body.as_slice());

        decoder.read_header().await.unwrap();
        assert!(!decoder.at_end().await.unwrap());
        assert!(!decoder.at_end().await.unwrap());
        let span = decoder.next_span().await.unwrap().unwrap();
        assert_eq!(span.operation_name, "only");
    }

    #[tokio::test]
    async fn test_prologue_out_of_order_is_rejected() {
        let mut body = Vec::new();
        encode_embedded(AUTH_FIELD, &Auth::default(), &mut body);
        let mut decoder = FrameDecoder::new(body.as_slice());

        match decoder.read_header().await {
            Err(FrameError::UnexpectedTag {
                field,
                expected,
                found,
            }) => {
                assert_eq!(field, REPORTER_FIELD);
                assert_eq!(expected, 10);
                assert_eq!(found, 18);
            }
            other => panic!("expected tag mismatch, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_wrong_wire_type_is_rejected() {
        // Field 3 with varint wire type instead of length-delimited.
        let mut body = encode_stream(&header(), &[]);
        body.extend_from_slice(&[0x18, 0x01]);
        let mut decoder = FrameDecoder::new(body.as_slice());

        decoder.read_header().await.unwrap();
        assert!(matches!(
            decoder.next_span().await,
            Err(FrameError::UnexpectedTag { found: 24, .. })
        ));
    }

    #[tokio::test]
    async fn test_empty_body_fails_prologue() {
        let mut decoder = FrameDecoder::new(&[][..]);
        assert!(matches!(
            decoder.read_header().await,
            Err(FrameError::UnexpectedEof)
        ));
    }

    #[tokio::test]
    async fn test_eof_inside_length_is_rejected() {
        let mut body = encode_stream(&header(), &[]);
        body.push(0x1a);
        let mut decoder = FrameDecoder::new(body.as_slice());

        decoder.read_header().await.unwrap();
        assert!(matches!(
            decoder.next_span().await,
            Err(FrameError::UnexpectedEof)
        ));
    }

    #[tokio::test]
    async fn test_truncated_payload_is_rejected() {
        let mut body = encode_stream(&header(), &[span("cut")]);
        body.truncate(body.len() - 2);
        let mut decoder = FrameDecoder::new(body.as_slice());

        decoder.read_header().await.unwrap();
        assert!(matches!(
            decoder.next_span().await,
            Err(FrameError::Truncated { .. })
        ));
    }

    #[tokio::test]
    async fn test_huge_declared_length_reports_bytes_read() {
        // Tag for field 1, length 2^40, then three bytes of payload.
        let body = [0x0a, 0x80, 0x80, 0x80, 0x80, 0x80, 0x20, 1, 2, 3];
        let mut decoder = FrameDecoder::new(&body[..]);

        match decoder.read_embedded::<Reporter>(REPORTER_FIELD).await {
            Err(FrameError::Truncated { declared, read }) => {
                assert_eq!(declared, 1 << 40);
                assert_eq!(read, 3);
            }
            other => panic!("expected truncation, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_overlong_varint_is_rejected() {
        let body = [0xff; 11];
        let mut decoder = FrameDecoder::new(&body[..]);
        assert!(matches!(
            decoder.read_header().await,
            Err(FrameError::MalformedVarint)
        ));
    }

    #[tokio::test]
    async fn test_undecodable_payload_is_rejected() {
        let body = [0x0a, 0x01, 0xff];
        let mut decoder = FrameDecoder::new(&body[..]);
        assert!(matches!(
            decoder.read_embedded::<Reporter>(REPORTER_FIELD).await,
            Err(FrameError::Decode(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_header_parts_encode_as_empty_messages() {
        let body = encode_stream(&ReportRequest::default(), &[span("x")]);
        let mut decoder = FrameDecoder::new(body.as_slice());

        let decoded = decoder.read_header().await.unwrap();
        assert_eq!(decoded.reporter, Some(Reporter::default()));
        assert_eq!(decoded.auth, Some(Auth::default()));
        assert_eq!(decoded.internal_metrics, Some(InternalMetrics::default()));
        assert!(decoder.next_span().await.unwrap().is_some());
    }
}
