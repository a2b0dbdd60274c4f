use serde_json::Value;

use crate::proto::{KeyValue, ReportRequest, key_value};

pub(crate) fn format_value(value: &Option<key_value::Value>) -> String {
    match value {
        Some(key_value::Value::StringValue(s)) => format!("\"{}\"", s),
        Some(key_value::Value::IntValue(i)) => i.to_string(),
        Some(key_value::Value::DoubleValue(d)) => format!("{:.6}", d),
        Some(key_value::Value::BoolValue(b)) => b.to_string(),
        Some(key_value::Value::JsonValue(json)) => format!("json:{}", json),
        None => "<none>".to_string(),
    }
}

pub(crate) fn format_tags(tags: &[KeyValue], max_items: usize) -> String {
    let mut output = String::from("{");
    for (i, tag) in tags.iter().take(max_items).enumerate() {
        if i > 0 {
            output.push_str(", ");
        }
        output.push_str(&tag.key);
        output.push('=');
        output.push_str(&format_value(&tag.value));
    }
    if tags.len() > max_items {
        output.push_str(&format!(", ... +{}", tags.len() - max_items));
    }
    output.push('}');
    output
}

/// One-line summary of a stored report, used by dumps and failure messages.
pub(crate) fn format_report(report: &ReportRequest) -> String {
    let reporter_id = report
        .reporter
        .as_ref()
        .map(|r| r.reporter_id.to_string())
        .unwrap_or_else(|| "<none>".to_string());
    let token = report
        .auth
        .as_ref()
        .map(|a| a.access_token.as_str())
        .unwrap_or("<none>");
    let operations: Vec<&str> = report
        .spans
        .iter()
        .map(|s| s.operation_name.as_str())
        .collect();

    let mut output = format!(
        "reporter_id={}, access_token={:?}, internal_metrics={}, spans={:?}",
        reporter_id,
        token,
        if report.internal_metrics.is_some() {
            "yes"
        } else {
            "no"
        },
        operations
    );
    if let Some(reporter) = &report.reporter
        && !reporter.tags.is_empty()
    {
        output.push_str(&format!(", reporter_tags={}", format_tags(&reporter.tags, 3)));
    }
    output
}

pub(crate) fn check_tags(tags: &[KeyValue], expected: &[(String, Value)]) -> bool {
    expected.iter().all(|(key, value)| {
        tags.iter()
            .any(|kv| &kv.key == key && value_matches(&kv.value, value))
    })
}

pub(crate) fn value_matches(tag_value: &Option<key_value::Value>, expected: &Value) -> bool {
    match tag_value {
        Some(key_value::Value::StringValue(s)) | Some(key_value::Value::JsonValue(s)) => {
            expected.as_str().map(|exp| s == exp).unwrap_or(false)
        }
        Some(key_value::Value::IntValue(i)) => {
            expected.as_i64().map(|exp| *i == exp).unwrap_or(false)
        }
        Some(key_value::Value::DoubleValue(d)) => expected
            .as_f64()
            .map(|n| (*d - n).abs() < f64::EPSILON)
            .unwrap_or(false),
        Some(key_value::Value::BoolValue(b)) => {
            expected.as_bool().map(|exp| *b == exp).unwrap_or(false)
        }
        None => false,
    }
}
