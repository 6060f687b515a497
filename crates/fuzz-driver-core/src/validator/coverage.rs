//! Aggregate coverage score from an `llvm-cov report` summary.
//!
//! The summary's `TOTAL` row must carry exactly four percentage columns
//! (regions, functions, lines, branches). Their mean is the score. Any other
//! shape is rejected rather than guessed at.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

/// Marker of the aggregate row.
pub const TOTAL_MARKER: &str = "TOTAL";

/// Number of percentage columns in the aggregate row.
pub const PERCENT_FIELDS: usize = 4;

static PERCENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+(?:\.\d+)?%$").expect("percent pattern is valid"));

#[derive(Debug, Clone, PartialEq)]
pub enum CoverageParseError {
    /// The aggregate row does not have exactly four percentage fields.
    FieldCount { row: String, found: usize },
    /// A percentage field is outside 0..=100.
    OutOfRange { field: String },
}

impl fmt::Display for CoverageParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FieldCount { row, found } => write!(
                f,
                "expected {} percentage fields in aggregate row, found {}: {}",
                PERCENT_FIELDS,
                found,
                row.trim()
            ),
            Self::OutOfRange { field } => write!(f, "percentage out of range: {}", field),
        }
    }
}

impl std::error::Error for CoverageParseError {}

/// Mean of the four percentages on the first `TOTAL` row. A report without
/// such a row scores 0.0.
pub fn parse_coverage_summary(summary: &str) -> Result<f64, CoverageParseError> {
    let Some(row) = summary.lines().find(|line| line.contains(TOTAL_MARKER)) else {
        return Ok(0.0);
    };

    let fields: Vec<&str> = row
        .split_whitespace()
        .filter(|token| PERCENT.is_match(token))
        .collect();
    if fields.len() != PERCENT_FIELDS {
        return Err(CoverageParseError::FieldCount {
            row: row.to_string(),
            found: fields.len(),
        });
    }

    let mut sum = 0.0;
    for field in fields {
        let value: f64 = field
            .trim_end_matches('%')
            .parse()
            .map_err(|_| CoverageParseError::OutOfRange {
                field: field.to_string(),
            })?;
        if !(0.0..=100.0).contains(&value) {
            return Err(CoverageParseError::OutOfRange {
                field: field.to_string(),
            });
        }
        sum += value;
    }
    Ok(sum / PERCENT_FIELDS as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SUMMARY: &str = "\
Filename                      Regions    Missed Regions     Cover   Functions  Missed Functions  Executed       Lines      Missed Lines     Cover    Branches   Missed Branches     Cover
-----------------------------------------------------------------------------------------------------------------------------------------------------------------------------------
xmllint.c                          40                 4    90.00%          20                 3    85.00%         200                10    95.00%          10                 0   100.00%
-----------------------------------------------------------------------------------------------------------------------------------------------------------------------------------
TOTAL                              40                 4    90.00%          20                 3    85.00%         200                10    95.00%          10                 0   100.00%
";

    #[test]
    fn test_mean_of_four_fields() {
        assert_eq!(parse_coverage_summary(SUMMARY).unwrap(), 92.5);
    }

    #[test]
    fn test_missing_total_scores_zero() {
        assert_eq!(parse_coverage_summary("no summary here\n").unwrap(), 0.0);
        assert_eq!(parse_coverage_summary("").unwrap(), 0.0);
    }

    #[test]
    fn test_format_drift_fails_loudly() {
        let err = parse_coverage_summary("TOTAL 10 2 80.00% 5 1 80.00% 7 1 85.71%").unwrap_err();
        assert!(matches!(err, CoverageParseError::FieldCount { found: 3, .. }));

        let err = parse_coverage_summary("TOTAL 0 0 - 0 0 - 0 0 - 0 0 -").unwrap_err();
        assert!(err.to_string().contains("found 0"));
    }

    #[test]
    fn test_out_of_range_percentage() {
        let err = parse_coverage_summary("TOTAL 1% 2% 3% 250%").unwrap_err();
        assert_eq!(
            err,
            CoverageParseError::OutOfRange {
                field: "250%".to_string()
            }
        );
    }
}
