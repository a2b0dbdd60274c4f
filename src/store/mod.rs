mod assertions;
mod helpers;
mod predicates;

pub use assertions::{ReportAssertion, SpanAssertion};

use helpers::format_report;

use crate::proto::{ReportRequest, Span};

/// Ordered record of every report the satellite has accepted.
///
/// Only the ingestion pipeline appends; everything else reads. Streamed
/// requests appear as a header report followed by one report per span, in
/// the order they were decoded.
#[derive(Debug, Clone, Default)]
pub struct ReportStore {
    reports: Vec<ReportRequest>,
}

impl ReportStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, report: ReportRequest) {
        self.reports.push(report);
    }

    pub fn reports(&self) -> &[ReportRequest] {
        &self.reports
    }

    pub fn report_count(&self) -> usize {
        self.reports.len()
    }

    /// Iterates over every stored span in report order, then span order.
    pub fn spans(&self) -> impl Iterator<Item = &Span> {
        self.reports.iter().flat_map(|report| report.spans.iter())
    }

    pub fn span_count(&self) -> usize {
        self.reports.iter().map(|report| report.spans.len()).sum()
    }

    pub fn snapshot_reports(&self) -> Vec<ReportRequest> {
        self.reports.clone()
    }

    pub fn snapshot_spans(&self) -> Vec<Span> {
        let mut spans = Vec::with_capacity(self.span_count());
        spans.extend(self.spans().cloned());
        spans
    }

    pub fn dump(&self) -> String {
        let mut output = format!(
            "Report store: {} report(s), {} span(s)\n",
            self.report_count(),
            self.span_count()
        );
        for (idx, report) in self.reports.iter().enumerate() {
            output.push_str(&format!("\n[{}] {}", idx, format_report(report)));
        }
        output
    }

    /// Starts building an assertion over stored reports.
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use mock_satellite::ReportStore;
    /// # let store = ReportStore::new();
    /// store
    ///     .expect_report()
    ///     .with_access_token("abc123")
    ///     .with_internal_metrics()
    ///     .assert_count(1);
    /// ```
    pub fn expect_report(&self) -> ReportAssertion<'_> {
        ReportAssertion::new(&self.reports)
    }

    pub fn expect_span_with_operation<S: Into<String>>(&self, name: S) -> SpanAssertion<'_> {
        SpanAssertion::new(self.spans().collect(), Some(name.into()))
    }

    /// Starts building an assertion for spans without specifying an operation.
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use mock_satellite::ReportStore;
    /// # let store = ReportStore::new();
    /// store
    ///     .expect_span()
    ///     .with_tag("error", true)
    ///     .assert_not_exists();
    /// ```
    pub fn expect_span(&self) -> SpanAssertion<'_> {
        SpanAssertion::new(self.spans().collect(), None)
    }
}
