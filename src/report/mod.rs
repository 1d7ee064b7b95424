//! Human-readable comparison report for an A/B run.

use std::fmt::Write;

use serde_json::Value;

use crate::diff::DiffResult;
use crate::exec::{ExecutionOutcome, ExecutionResult, FailureKind, PairedResults, Variant};

fn field_title(field: &str) -> String {
    let mut title = String::new();
    for word in field.split('_') {
        let mut chars = word.chars();
        if let Some(first) = chars.next() {
            if !title.is_empty() {
                title.push(' ');
            }
            title.extend(first.to_uppercase());
            title.push_str(chars.as_str());
        }
    }
    title
}

fn format_output(output: &Value) -> String {
    match output {
        Value::String(s) => s.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

fn write_result(out: &mut String, result: &ExecutionResult) {
    let label = match result.variant {
        Variant::Original => "Original",
        Variant::Candidate => "Candidate",
    };
    let _ = writeln!(out, "=== {label} ({}) ===", result.slug);
    match &result.outcome {
        ExecutionOutcome::Succeeded { output, trace_url, .. } => {
            let _ = writeln!(out, "{}", format_output(output));
            if let Some(url) = trace_url {
                let _ = writeln!(out, "trace: {url}");
            }
        }
        ExecutionOutcome::Failed { kind, message, .. } => {
            let kind = match kind {
                FailureKind::Timeout => "timeout",
                FailureKind::Invocation => "invocation error",
            };
            let _ = writeln!(out, "FAILED ({kind}): {message}");
        }
    }
    out.push('\n');
}

fn duration_cell(result: &ExecutionResult) -> String {
    match result.duration_ms() {
        Some(ms) => format!("{ms}ms"),
        None => "failed".to_string(),
    }
}

fn write_comparison(out: &mut String, results: &PairedResults) {
    out.push_str("=== Comparison ===\n");
    let _ = writeln!(out, "original:  {}", duration_cell(&results.original));
    let _ = writeln!(out, "candidate: {}", duration_cell(&results.candidate));
    match results.duration_delta_ms() {
        Some(delta) if delta < 0 => {
            let _ = writeln!(out, "delta:     {delta}ms (candidate faster)");
        }
        Some(delta) if delta > 0 => {
            let _ = writeln!(out, "delta:     +{delta}ms (candidate slower)");
        }
        Some(_) => out.push_str("delta:     0ms (same)\n"),
        None => out.push_str("delta:     unavailable\n"),
    }
}

/// Render field diffs and, when the prompts were run, both outputs and their
/// timing. Output depends only on the arguments.
pub fn render(diffs: &[DiffResult], results: Option<&PairedResults>) -> String {
    let mut out = String::new();

    for diff in diffs {
        let _ = writeln!(out, "=== {} Diff ===", field_title(&diff.field));
        out.push_str(&diff.unified());
        out.push('\n');
    }

    if let Some(results) = results {
        write_result(&mut out, &results.original);
        write_result(&mut out, &results.candidate);
        write_comparison(&mut out, results);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::diff;
    use serde_json::json;

    fn succeeded(variant: Variant, slug: &str, output: Value, ms: u64) -> ExecutionResult {
        ExecutionResult {
            variant,
            slug: slug.to_string(),
            outcome: ExecutionOutcome::Succeeded {
                output,
                duration_ms: ms,
                trace_url: None,
            },
        }
    }

    fn failed(variant: Variant, slug: &str, kind: FailureKind) -> ExecutionResult {
        ExecutionResult {
            variant,
            slug: slug.to_string(),
            outcome: ExecutionOutcome::Failed {
                kind,
                message: "timed out after 50ms".to_string(),
                duration_ms: 50,
            },
        }
    }

    #[test]
    fn test_full_report() {
        let diffs = vec![
            diff("system_message", "You are helpful.", "You are an expert."),
            diff("user_template", "{{q}}", "{{q}}"),
        ];
        let results = PairedResults {
            original: succeeded(Variant::Original, "greet", json!("hello"), 120),
            candidate: succeeded(Variant::Candidate, "greet-v2", json!({"answer": 1}), 90),
        };

        let report = render(&diffs, Some(&results));
        let expected = "\
=== System Message Diff ===
--- current
+++ proposed
-You are helpful.
+You are an expert.

=== User Template Diff ===
(no changes)

=== Original (greet) ===
hello

=== Candidate (greet-v2) ===
{
  \"answer\": 1
}

=== Comparison ===
original:  120ms
candidate: 90ms
delta:     -30ms (candidate faster)
";
        assert_eq!(report, expected);
        assert_eq!(render(&diffs, Some(&results)), report);
    }

    #[test]
    fn test_failed_side_gets_notice() {
        let results = PairedResults {
            original: succeeded(Variant::Original, "greet", json!("hello"), 10),
            candidate: failed(Variant::Candidate, "greet-v2", FailureKind::Timeout),
        };
        let report = render(&[], Some(&results));

        assert!(report.contains("=== Candidate (greet-v2) ===\nFAILED (timeout): timed out after 50ms"));
        assert!(report.contains("candidate: failed"));
        assert!(report.contains("delta:     unavailable"));
    }

    #[test]
    fn test_slower_and_same_labels() {
        let slower = PairedResults {
            original: succeeded(Variant::Original, "a", json!("x"), 10),
            candidate: succeeded(Variant::Candidate, "a-v2", json!("x"), 25),
        };
        assert!(render(&[], Some(&slower)).contains("+15ms (candidate slower)"));

        let same = PairedResults {
            original: succeeded(Variant::Original, "a", json!("x"), 10),
            candidate: succeeded(Variant::Candidate, "a-v2", json!("x"), 10),
        };
        assert!(render(&[], Some(&same)).contains("0ms (same)"));
    }

    #[test]
    fn test_diff_only_mode() {
        let diffs = vec![diff("model", "a", "b")];
        let report = render(&diffs, None);
        assert!(report.starts_with("=== Model Diff ==="));
        assert!(!report.contains("Comparison"));
    }

    #[test]
    fn test_invocation_failure_label() {
        let results = PairedResults {
            original: failed(Variant::Original, "a", FailureKind::Invocation),
            candidate: succeeded(Variant::Candidate, "a-v2", json!("ok"), 5),
        };
        assert!(render(&[], Some(&results)).contains("FAILED (invocation error)"));
    }
}
