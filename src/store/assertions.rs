use serde_json::Value;

use super::helpers::{check_tags, format_report, format_tags};
use super::predicates::impl_assertion_methods;
use crate::proto::{ReportRequest, Span};

/// A builder for constructing assertions over stored reports.
#[derive(Debug)]
pub struct ReportAssertion<'a> {
    reports: Vec<&'a ReportRequest>,
    access_token: Option<String>,
    reporter_id: Option<u64>,
    reporter_tags: Option<Vec<(String, Value)>>,
    internal_metrics: Option<bool>,
    span_count: Option<usize>,
}

impl<'a> ReportAssertion<'a> {
    pub(crate) fn new(reports: &'a [ReportRequest]) -> Self {
        Self {
            reports: reports.iter().collect(),
            access_token: None,
            reporter_id: None,
            reporter_tags: None,
            internal_metrics: None,
            span_count: None,
        }
    }

    impl_assertion_methods!(reports, ReportRequest, "reports", format_matching_reports);

    #[must_use]
    pub fn with_access_token<S: Into<String>>(mut self, token: S) -> Self {
        self.access_token = Some(token.into());
        self
    }

    #[must_use]
    pub fn with_reporter_id(mut self, reporter_id: u64) -> Self {
        self.reporter_id = Some(reporter_id);
        self
    }

    /// Adds reporter tag criteria.
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use mock_satellite::ReportStore;
    /// # let store = ReportStore::new();
    /// store
    ///     .expect_report()
    ///     .with_reporter_tags([("lightstep.component_name", "checkout")])
    ///     .assert_exists();
    /// ```
    #[must_use]
    pub fn with_reporter_tags<I, K, V>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        self.reporter_tags = Some(
            tags.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }

    /// Only matches reports that carry internal metrics (stream headers and
    /// fixed reports that sent them).
    #[must_use]
    pub fn with_internal_metrics(mut self) -> Self {
        self.internal_metrics = Some(true);
        self
    }

    #[must_use]
    pub fn without_internal_metrics(mut self) -> Self {
        self.internal_metrics = Some(false);
        self
    }

    #[must_use]
    pub fn with_span_count(mut self, count: usize) -> Self {
        self.span_count = Some(count);
        self
    }

    fn matches(&self, report: &ReportRequest) -> bool {
        if let Some(ref expected) = self.access_token {
            let token = report.auth.as_ref().map(|a| a.access_token.as_str());
            if token != Some(expected.as_str()) {
                return false;
            }
        }

        if let Some(expected) = self.reporter_id
            && report.reporter.as_ref().map(|r| r.reporter_id) != Some(expected)
        {
            return false;
        }

        if let Some(ref expected_tags) = self.reporter_tags {
            match &report.reporter {
                Some(reporter) if check_tags(&reporter.tags, expected_tags) => {}
                _ => return false,
            }
        }

        if let Some(expected) = self.internal_metrics
            && report.internal_metrics.is_some() != expected
        {
            return false;
        }

        if let Some(expected) = self.span_count
            && report.spans.len() != expected
        {
            return false;
        }

        true
    }

    fn format_criteria(&self) -> String {
        let mut criteria = Vec::new();
        if let Some(ref token) = self.access_token {
            criteria.push(format!("access_token={:?}", token));
        }
        if let Some(id) = self.reporter_id {
            criteria.push(format!("reporter_id={}", id));
        }
        if let Some(ref tags) = self.reporter_tags {
            criteria.push(format!("reporter_tags={:?}", tags));
        }
        if let Some(metrics) = self.internal_metrics {
            criteria.push(format!("internal_metrics={}", metrics));
        }
        if let Some(count) = self.span_count {
            criteria.push(format!("span_count={}", count));
        }
        criteria.join(", ")
    }

    fn format_matching_reports(&self) -> String {
        let matching = self.get_all();
        if matching.is_empty() {
            return String::new();
        }

        let mut output = String::from("Matching reports:\n");
        for (idx, report) in matching.iter().enumerate() {
            output.push_str(&format!("  [{}] {}\n", idx, format_report(report)));
        }
        output
    }

    fn build_error_message(&self) -> String {
        let mut msg = String::from("No reports matched the assertion.\n\n");
        msg.push_str(&format!("Expected:\n  {}\n\n", self.format_criteria()));
        msg.push_str(&format!("Found {} report(s) in store", self.reports.len()));

        if !self.reports.is_empty() {
            msg.push_str(":\n");
            for (idx, report) in self.reports.iter().enumerate().take(10) {
                msg.push_str(&format!("  [{}] {}\n", idx, format_report(report)));
            }
            if self.reports.len() > 10 {
                msg.push_str(&format!("  ... and {} more\n", self.reports.len() - 10));
            }
        }

        msg
    }
}

/// A builder for constructing assertions over the flattened span view.
#[derive(Debug)]
pub struct SpanAssertion<'a> {
    spans: Vec<&'a Span>,
    operation_name: Option<String>,
    trace_id: Option<u64>,
    tags: Option<Vec<(String, Value)>>,
}

impl<'a> SpanAssertion<'a> {
    pub(crate) fn new(spans: Vec<&'a Span>, operation_name: Option<String>) -> Self {
        Self {
            spans,
            operation_name,
            trace_id: None,
            tags: None,
        }
    }

    impl_assertion_methods!(spans, Span, "spans", format_matching_spans);

    #[must_use]
    pub fn with_trace_id(mut self, trace_id: u64) -> Self {
        self.trace_id = Some(trace_id);
        self
    }

    /// Adds span tag criteria. All tags must be present with equal values.
    #[must_use]
    pub fn with_tags<I, K, V>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        self.tags = Some(
            tags.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }

    /// Adds a single tag criterion. Can be chained for tags of mixed types.
    #[must_use]
    pub fn with_tag<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        self.tags
            .get_or_insert_with(Vec::new)
            .push((key.into(), value.into()));
        self
    }

    fn matches(&self, span: &Span) -> bool {
        if let Some(ref expected_name) = self.operation_name
            && &span.operation_name != expected_name
        {
            return false;
        }

        if let Some(expected) = self.trace_id
            && span.span_context.as_ref().map(|c| c.trace_id) != Some(expected)
        {
            return false;
        }

        if let Some(ref expected_tags) = self.tags
            && !check_tags(&span.tags, expected_tags)
        {
            return false;
        }

        true
    }

    fn format_criteria(&self) -> String {
        let mut criteria = Vec::new();
        if let Some(ref name) = self.operation_name {
            criteria.push(format!("operation_name={:?}", name));
        }
        if let Some(trace_id) = self.trace_id {
            criteria.push(format!("trace_id={}", trace_id));
        }
        if let Some(ref tags) = self.tags {
            criteria.push(format!("tags={:?}", tags));
        }
        criteria.join(", ")
    }

    fn format_matching_spans(&self) -> String {
        let matching = self.get_all();
        if matching.is_empty() {
            return String::new();
        }

        let mut output = String::from("Matching spans:\n");
        for (idx, span) in matching.iter().enumerate() {
            output.push_str(&format!(
                "  [{}] operation_name=\"{}\"\n",
                idx, span.operation_name
            ));
        }
        output
    }

    fn build_error_message(&self) -> String {
        let mut msg = String::from("No spans matched the assertion.\n\n");
        msg.push_str(&format!("Expected:\n  {}\n\n", self.format_criteria()));
        msg.push_str(&format!("Found {} span(s) in store", self.spans.len()));

        if !self.spans.is_empty() {
            msg.push_str(":\n");
            for (idx, span) in self.spans.iter().enumerate().take(10) {
                msg.push_str(&format!("  [{}] operation_name=\"{}\"", idx, span.operation_name));
                if !span.tags.is_empty() {
                    msg.push_str(&format!(", tags={}", format_tags(&span.tags, 3)));
                }
                msg.push('\n');
            }
            if self.spans.len() > 10 {
                msg.push_str(&format!("  ... and {} more\n", self.spans.len() - 10));
            }
        }

        msg
    }
}
