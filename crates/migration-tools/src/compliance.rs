//! Structural comparison of source and target column catalogs.
//!
//! Column names are expected to be unique within each catalog. With duplicate names
//! the match count can exceed what a one-to-one pairing would give, so the verdict is
//! only meaningful for catalogs that honour that precondition.

use crate::error::MigrationError;
use colmigrate_core::Column;
use tracing::{error, info};

/// Outcome of comparing two column catalogs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComplianceReport {
    /// Whether the tables are compliant
    pub compliant: bool,
    /// Number of source columns
    pub source_count: usize,
    /// Number of target columns
    pub target_count: usize,
    /// Source/target pairs sharing name and type
    pub matches: usize,
}

impl ComplianceReport {
    /// Column count difference when the catalogs differ in length, otherwise the
    /// number of source columns without a same-name, same-type counterpart.
    pub fn mismatches(&self) -> usize {
        if self.source_count != self.target_count {
            self.source_count.abs_diff(self.target_count)
        } else {
            self.source_count.saturating_sub(self.matches)
        }
    }

    /// Human-readable verdict.
    pub fn summary(&self) -> String {
        if self.compliant {
            "Tables are compliant with each other.".to_string()
        } else if self.source_count != self.target_count {
            format!(
                "Tables from source and target have divergent number of columns ({} vs {}): {} mismatch(es) among {} columns.",
                self.source_count,
                self.target_count,
                self.mismatches(),
                self.source_count.max(self.target_count)
            )
        } else {
            format!(
                "Tables are not compliant with each other: {} mismatch(es) among {} columns.",
                self.mismatches(),
                self.source_count
            )
        }
    }

    /// Convert a negative verdict into [`MigrationError::Compliance`].
    pub fn into_result(self) -> Result<Self, MigrationError> {
        if self.compliant {
            Ok(self)
        } else {
            Err(MigrationError::Compliance(self.summary()))
        }
    }
}

/// Compare two catalogs by column count, then by name-and-type pairs.
///
/// Position is ignored: a target column matches a source column wherever it sits.
pub fn check(source: &[Column], target: &[Column]) -> ComplianceReport {
    let mut report = ComplianceReport {
        compliant: false,
        source_count: source.len(),
        target_count: target.len(),
        matches: 0,
    };

    if source.len() != target.len() {
        error!("{}", report.summary());
        return report;
    }

    report.matches = source
        .iter()
        .map(|s| {
            target
                .iter()
                .filter(|t| t.name == s.name && t.data_type == s.data_type)
                .count()
        })
        .sum();
    report.compliant = report.matches == source.len();

    if report.compliant {
        info!("{}", report.summary());
    } else {
        error!(
            mismatches = report.mismatches(),
            columns = report.source_count,
            "{}",
            report.summary()
        );
    }
    report
}

/// Shorthand for `check(source, target).compliant`.
pub fn is_compliant(source: &[Column], target: &[Column]) -> bool {
    check(source, target).compliant
}

#[cfg(test)]
mod tests {
    use super::*;
    use colmigrate_core::DataTypeTag;

    fn col(name: &str, data_type: DataTypeTag) -> Column {
        Column::new(name, data_type)
    }

    #[test]
    fn test_same_columns_any_order_are_compliant() {
        let source = vec![col("id", DataTypeTag::Int32), col("name", DataTypeTag::Text)];
        let target = vec![col("name", DataTypeTag::Text), col("id", DataTypeTag::Int32)];

        let report = check(&source, &target);
        assert!(report.compliant);
        assert_eq!(report.matches, 2);
        assert!(report.summary().contains("compliant with each other"));
    }

    #[test]
    fn test_count_difference_is_reported() {
        let source = vec![
            col("id", DataTypeTag::Int32),
            col("name", DataTypeTag::Text),
            col("age", DataTypeTag::Int16),
        ];
        let target = vec![col("id", DataTypeTag::Int32), col("name", DataTypeTag::Text)];

        let report = check(&source, &target);
        assert!(!report.compliant);
        assert_eq!(report.mismatches(), 1);
        assert!(report.summary().contains("3 vs 2"));
        assert!(report.summary().contains("1 mismatch(es) among 3 columns"));
    }

    #[test]
    fn test_type_mismatch_counts() {
        let source = vec![
            col("id", DataTypeTag::Int32),
            col("name", DataTypeTag::Text),
            col("at", DataTypeTag::Timestamp),
        ];
        let target = vec![
            col("id", DataTypeTag::Long),
            col("name", DataTypeTag::Text),
            col("at", DataTypeTag::Timestamp),
        ];

        let report = check(&source, &target);
        assert!(!report.compliant);
        assert_eq!(report.mismatches(), 1);
        assert_eq!(
            report.summary(),
            "Tables are not compliant with each other: 1 mismatch(es) among 3 columns."
        );
        assert!(matches!(
            report.into_result(),
            Err(MigrationError::Compliance(_))
        ));
    }

    #[test]
    fn test_empty_catalogs_are_compliant() {
        assert!(is_compliant(&[], &[]));
    }
}
