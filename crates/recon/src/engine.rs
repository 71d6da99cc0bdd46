use log::info;

use crate::config::ReconConfig;
use crate::error::ReconError;
use crate::matcher::match_records;
use crate::model::{RawTable, ReconciliationReport, ReportMeta, Source};
use crate::normalize::normalize;
use crate::report::{assemble, InputCounts};

/// Run a reconciliation over two raw tables.
///
/// ERP is normalized before bank, so a structural problem in the ERP file is
/// the one reported when both are broken.
pub fn reconcile(
    config: &ReconConfig,
    erp: &RawTable,
    bank: &RawTable,
) -> Result<ReconciliationReport, ReconError> {
    config.validate()?;

    let erp = normalize(erp, Source::Erp, &config.erp, &config.input)?;
    let bank = normalize(bank, Source::Bank, &config.bank, &config.input)?;

    let counts = InputCounts {
        erp: erp.input_rows(),
        bank: bank.input_rows(),
    };
    let result = match_records(&erp.records, &bank.records, &config.matching);

    let mut rejected = erp.rejected;
    rejected.extend(bank.rejected);

    let report = assemble(
        result,
        rejected,
        counts,
        ReportMeta {
            config_name: config.name.clone(),
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            amount_scale: config.input.amount_scale,
        },
    )?;

    let s = &report.summary;
    info!(
        "reconciled '{}': {} matched, {} unmatched ({} rejected), {} entries",
        config.name, s.match_count, s.unmatch_count, s.rejected_rows, s.total_records
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RowErrorPolicy;
    use crate::model::MatchTier;

    fn table(rows: &[&[&str]]) -> RawTable {
        RawTable::from_rows(rows.iter().map(|r| r.iter().copied()))
    }

    #[test]
    fn end_to_end_small() {
        let erp = table(&[
            &["date", "amount", "reference", "description"],
            &["2024-01-05", "100.00", "INV001", "Acme"],
            &["2024-01-06", "250.00", "INV002", "Globex"],
        ]);
        let bank = table(&[
            &["date", "amount", "reference"],
            &["2024-01-05", "100.00", "INV001"],
            &["2024-01-30", "999.00", "X"],
        ]);
        let report = reconcile(&ReconConfig::default(), &erp, &bank).unwrap();
        assert_eq!(report.summary.match_count, 1);
        assert_eq!(report.summary.unmatch_count, 2);
        assert_eq!(report.result.matched[0].tier, MatchTier::Exact);
        assert_eq!(report.result.matched[0].erp.row_index, 2);
        assert_eq!(report.meta.amount_scale, 2);
    }

    #[test]
    fn erp_errors_surface_first() {
        let erp = table(&[&["date", "amount"], &["2024-01-05", "1"]]);
        let bank = table(&[&["nothing"]]);
        let err = reconcile(&ReconConfig::default(), &erp, &bank).unwrap_err();
        assert_eq!(err.origin(), Some(Source::Erp));
        assert_eq!(err.code(), "column_missing");
    }

    #[test]
    fn lenient_rows_count_as_unmatched() {
        let erp = table(&[
            &["date", "amount", "reference"],
            &["2024-01-05", "100.00", "INV001"],
        ]);
        let bank = table(&[
            &["date", "amount", "reference"],
            &["2024-01-05", "100.00", "INV001"],
            &["2024-01-05", "abc", "INV002"],
        ]);
        let mut config = ReconConfig::default();
        config.input.row_error_policy = RowErrorPolicy::Lenient;
        let report = reconcile(&config, &erp, &bank).unwrap();
        assert_eq!(report.summary.match_count, 1);
        assert_eq!(report.summary.unmatch_count, 1);
        assert_eq!(report.summary.rejected_rows, 1);
        assert_eq!(report.rejected[0].row_index, 3);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = ReconConfig::default();
        config.matching.fuzzy_threshold = 0.0;
        let empty = RawTable::default();
        let err = reconcile(&config, &empty, &empty).unwrap_err();
        assert!(err.is_config());
    }
}
