use serde_json::Value;

use crate::models::ExecutionStep;

/// Coerce a cost-bearing metadata value to a number.
///
/// Numbers pass through unchanged. Strings are parsed after stripping
/// surrounding whitespace and a leading currency symbol ("$0.0042" → 0.0042).
/// Anything unparseable contributes zero rather than failing the run.
pub fn coerce_cost(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => {
            let trimmed = s.trim();
            let trimmed = trimmed.strip_prefix('$').unwrap_or(trimmed).trim();
            trimmed.parse().unwrap_or(0.0)
        }
        _ => 0.0,
    }
}

/// Sum every cost field across all execution steps. A field counts as
/// cost-bearing when its key contains "cost", case-insensitively.
pub fn total_cost(steps: &[ExecutionStep]) -> f64 {
    steps
        .iter()
        .flat_map(|step| step.metadata.iter())
        .filter(|(key, _)| key.to_lowercase().contains("cost"))
        .map(|(_, value)| coerce_cost(value))
        .sum()
}

/// Linear cost extrapolation for hypothetical record volumes.
#[derive(Debug, Clone, PartialEq)]
pub enum CostProjection {
    /// Zero records or zero reported cost: no meaningful per-record rate.
    Unavailable,
    Available {
        total: f64,
        record_count: usize,
        per_record: f64,
        lines: Vec<(u64, f64)>,
    },
}

/// Compute the projection, guarding the zero-record / zero-cost cases so the
/// division never happens on a zero denominator.
pub fn project(total: f64, record_count: usize, volumes: &[u64]) -> CostProjection {
    if record_count == 0 || total == 0.0 {
        return CostProjection::Unavailable;
    }
    let per_record = total / record_count as f64;
    let lines = volumes
        .iter()
        .map(|&volume| (volume, volume as f64 * per_record))
        .collect();
    CostProjection::Available {
        total,
        record_count,
        per_record,
        lines,
    }
}

/// Group an integer's digits with thousands separators: 1000000 → "1,000,000".
pub fn group_digits(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Format a dollar amount with thousands separators and two decimals:
/// 1234.5 → "$1,234.50".
pub fn format_usd(amount: f64) -> String {
    let cents = format!("{:.2}", amount);
    let (whole, frac) = cents.split_once('.').unwrap_or((cents.as_str(), "00"));
    // f64 totals in this pipeline are always small and non-negative.
    let whole: u64 = whole.parse().unwrap_or(0);
    format!("${}.{}", group_digits(whole), frac)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numeric_costs_pass_through() {
        assert_eq!(coerce_cost(&json!(0.0042)), 0.0042);
        assert_eq!(coerce_cost(&json!(3)), 3.0);
    }

    #[test]
    fn currency_strings_parse() {
        assert_eq!(coerce_cost(&json!("$0.123")), 0.123);
        assert_eq!(coerce_cost(&json!("  $ 1.5  ")), 1.5);
        assert_eq!(coerce_cost(&json!("0.25")), 0.25);
    }

    #[test]
    fn unparseable_values_contribute_zero() {
        assert_eq!(coerce_cost(&json!("n/a")), 0.0);
        assert_eq!(coerce_cost(&json!(true)), 0.0);
        assert_eq!(coerce_cost(&json!(null)), 0.0);
        assert_eq!(coerce_cost(&json!({"nested": 1})), 0.0);
    }

    #[test]
    fn sums_cost_fields_case_insensitively() {
        let steps = vec![
            ExecutionStep::new("fetch").with("duration_ms", 812),
            ExecutionStep::new("generate")
                .with("Cost ($)", "$0.0030")
                .with("total_tokens", 1540),
            ExecutionStep::new("finalize").with("llm_cost", 0.0010),
        ];
        let total = total_cost(&steps);
        assert!((total - 0.0040).abs() < 1e-9);
    }

    #[test]
    fn projection_unavailable_on_zero_records_or_cost() {
        assert_eq!(project(1.0, 0, &[100]), CostProjection::Unavailable);
        assert_eq!(project(0.0, 20, &[100]), CostProjection::Unavailable);
    }

    #[test]
    fn projection_is_linear() {
        match project(4.0, 20, &[1_000]) {
            CostProjection::Available {
                per_record, lines, ..
            } => {
                assert!((per_record - 0.20).abs() < 1e-9);
                assert_eq!(lines.len(), 1);
                assert_eq!(lines[0].0, 1_000);
                assert!((lines[0].1 - 200.0).abs() < 1e-9);
            }
            CostProjection::Unavailable => panic!("expected a projection"),
        }
    }

    #[test]
    fn digit_grouping() {
        assert_eq!(group_digits(0), "0");
        assert_eq!(group_digits(100), "100");
        assert_eq!(group_digits(1_000), "1,000");
        assert_eq!(group_digits(1_000_000), "1,000,000");
    }

    #[test]
    fn usd_formatting() {
        assert_eq!(format_usd(1234.5), "$1,234.50");
        assert_eq!(format_usd(0.2), "$0.20");
        assert_eq!(format_usd(200.0), "$200.00");
    }
}
