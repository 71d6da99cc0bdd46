use std::collections::{BTreeMap, HashSet};

use crate::error::ReconError;
use crate::model::{
    MatchResult, MatchTier, ReconciliationReport, RejectedRow, Record, ReportLine, ReportMeta,
    ReportSummary, Source,
};

/// Input row counts per source, the denominator of the partition check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputCounts {
    pub erp: usize,
    pub bank: usize,
}

/// Build the report from a match result and the rows rejected during
/// normalization.
///
/// Fails with `InternalConsistency` when the result is not a partition of
/// the inputs: every row must appear exactly once, in its own source's slot.
pub fn assemble(
    result: MatchResult,
    rejected: Vec<RejectedRow>,
    counts: InputCounts,
    meta: ReportMeta,
) -> Result<ReconciliationReport, ReconError> {
    check_partition(&result, &rejected, counts)?;

    let mut result = result;
    result.matched.sort_by_key(|p| p.erp.row_index);
    result.unmatched_erp.sort_by_key(|r| r.row_index);
    result.unmatched_bank.sort_by_key(|r| r.row_index);
    let mut rejected = rejected;
    rejected.sort_by_key(|r| (r.source, r.row_index));

    let lines = build_lines(&result, &rejected);
    let summary = compute_summary(&result, &rejected, counts);

    Ok(ReconciliationReport {
        meta,
        summary,
        result,
        rejected,
        lines,
    })
}

impl ReconciliationReport {
    pub fn to_json_pretty(&self) -> Result<String, ReconError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| ReconError::InternalConsistency(format!("report serialization: {e}")))
    }

    /// Lines of one block, in rendering order.
    pub fn block(&self, kind: Block) -> impl Iterator<Item = &ReportLine> {
        self.lines.iter().filter(move |line| Block::of(line) == kind)
    }
}

/// Rendering block a report line belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Block {
    Matched,
    UnmatchedErp,
    UnmatchedBank,
}

impl Block {
    pub const ALL: [Block; 3] = [Block::Matched, Block::UnmatchedErp, Block::UnmatchedBank];

    pub fn of(line: &ReportLine) -> Block {
        match line {
            ReportLine::Matched(_) => Block::Matched,
            ReportLine::UnmatchedErp(_) => Block::UnmatchedErp,
            ReportLine::UnmatchedBank(_) => Block::UnmatchedBank,
            ReportLine::Rejected(row) => match row.source {
                Source::Erp => Block::UnmatchedErp,
                Source::Bank => Block::UnmatchedBank,
            },
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Block::Matched => "Matched",
            Block::UnmatchedErp => "Unmatched ERP",
            Block::UnmatchedBank => "Unmatched bank",
        }
    }
}

fn check_partition(
    result: &MatchResult,
    rejected: &[RejectedRow],
    counts: InputCounts,
) -> Result<(), ReconError> {
    let mut seen: HashSet<(Source, usize)> = HashSet::new();
    let mut place = |source: Source, row_index: usize, slot: Source| -> Result<(), ReconError> {
        if source != slot {
            return Err(ReconError::InternalConsistency(format!(
                "{source} row {row_index} placed in the {slot} slot"
            )));
        }
        if !seen.insert((source, row_index)) {
            return Err(ReconError::InternalConsistency(format!(
                "{source} row {row_index} appears more than once"
            )));
        }
        Ok(())
    };

    for pair in &result.matched {
        place(pair.erp.source, pair.erp.row_index, Source::Erp)?;
        place(pair.bank.source, pair.bank.row_index, Source::Bank)?;
    }
    for r in &result.unmatched_erp {
        place(r.source, r.row_index, Source::Erp)?;
    }
    for r in &result.unmatched_bank {
        place(r.source, r.row_index, Source::Bank)?;
    }
    for r in rejected {
        place(r.source, r.row_index, r.source)?;
    }

    let erp_seen = seen.iter().filter(|(s, _)| *s == Source::Erp).count();
    let bank_seen = seen.len() - erp_seen;
    if erp_seen != counts.erp || bank_seen != counts.bank {
        return Err(ReconError::InternalConsistency(format!(
            "partition covers {erp_seen} ERP and {bank_seen} bank rows, input had {} and {}",
            counts.erp, counts.bank
        )));
    }
    Ok(())
}

fn build_lines(result: &MatchResult, rejected: &[RejectedRow]) -> Vec<ReportLine> {
    let mut lines: Vec<ReportLine> = result
        .matched
        .iter()
        .cloned()
        .map(ReportLine::Matched)
        .collect();
    lines.extend(unmatched_block(&result.unmatched_erp, rejected, Source::Erp));
    lines.extend(unmatched_block(&result.unmatched_bank, rejected, Source::Bank));
    lines
}

/// Unmatched records and rejected rows of one source, merged by row index.
fn unmatched_block(records: &[Record], rejected: &[RejectedRow], source: Source) -> Vec<ReportLine> {
    let mut block: Vec<(usize, ReportLine)> = records
        .iter()
        .map(|r| {
            let line = match source {
                Source::Erp => ReportLine::UnmatchedErp(r.clone()),
                Source::Bank => ReportLine::UnmatchedBank(r.clone()),
            };
            (r.row_index, line)
        })
        .collect();
    block.extend(
        rejected
            .iter()
            .filter(|r| r.source == source)
            .map(|r| (r.row_index, ReportLine::Rejected(r.clone()))),
    );
    block.sort_by_key(|(row, _)| *row);
    block.into_iter().map(|(_, line)| line).collect()
}

fn compute_summary(result: &MatchResult, rejected: &[RejectedRow], counts: InputCounts) -> ReportSummary {
    let mut tier_counts: BTreeMap<String, usize> =
        MatchTier::ALL.iter().map(|t| (t.to_string(), 0)).collect();
    for pair in &result.matched {
        *tier_counts.entry(pair.tier.to_string()).or_insert(0) += 1;
    }

    let match_count = result.matched.len();
    let unmatch_count = result.unmatched_erp.len() + result.unmatched_bank.len() + rejected.len();

    ReportSummary {
        match_count,
        unmatch_count,
        total_records: match_count + unmatch_count,
        input_records: counts.erp + counts.bank,
        erp_records: counts.erp,
        bank_records: counts.bank,
        rejected_rows: rejected.len(),
        tier_counts,
    }
}
