use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Erp,
    Bank,
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Erp => write!(f, "ERP"),
            Self::Bank => write!(f, "BANK"),
        }
    }
}

/// Every physical row of one sheet or delimited file, cells rendered to text.
/// `rows[0]` is physical row 1.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawTable {
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn new(rows: Vec<Vec<String>>) -> Self {
        Self { rows }
    }

    /// Build a table from string slices. Handy for fixtures.
    pub fn from_rows<R, C>(rows: R) -> Self
    where
        R: IntoIterator<Item = C>,
        C: IntoIterator,
        C::Item: Into<String>,
    {
        Self {
            rows: rows
                .into_iter()
                .map(|row| row.into_iter().map(Into::into).collect())
                .collect(),
        }
    }
}

/// One normalized transaction line. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Record {
    pub source: Source,
    /// Physical 1-based row number in the source sheet; unique per source.
    pub row_index: usize,
    pub date: NaiveDate,
    /// Signed amount in minor units at the configured scale.
    pub amount_minor: i64,
    /// Reference as written in the source, trimmed.
    pub reference: String,
    /// Upper-cased alphanumeric reference used as the matching key.
    pub match_key: String,
    pub description: String,
}

/// A row that failed normalization under the lenient policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedRow {
    pub source: Source,
    pub row_index: usize,
    pub column: String,
    pub value: String,
    pub reason: String,
}

// ---------------------------------------------------------------------------
// Matching
// ---------------------------------------------------------------------------

/// Confidence tier, declared in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchTier {
    Exact,
    Near,
    Fuzzy,
}

impl MatchTier {
    pub const ALL: [MatchTier; 3] = [MatchTier::Exact, MatchTier::Near, MatchTier::Fuzzy];

    pub fn score(self) -> u8 {
        match self {
            Self::Exact => 3,
            Self::Near => 2,
            Self::Fuzzy => 1,
        }
    }
}

impl std::fmt::Display for MatchTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exact => write!(f, "exact"),
            Self::Near => write!(f, "near"),
            Self::Fuzzy => write!(f, "fuzzy"),
        }
    }
}

/// Scored potential pairing. Indices point into the ERP and bank slices
/// handed to the engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchCandidate {
    pub erp: usize,
    pub bank: usize,
    pub tier: MatchTier,
    pub score: u8,
    /// Reference similarity in [0, 1]; 1.0 for exact and near tiers.
    pub similarity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchedPair {
    pub erp: Record,
    pub bank: Record,
    pub tier: MatchTier,
    pub score: u8,
    /// `bank.date - erp.date` in calendar days.
    pub date_offset_days: i64,
    pub similarity: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MatchResult {
    /// Ordered by ascending ERP row index.
    pub matched: Vec<MatchedPair>,
    pub unmatched_erp: Vec<Record>,
    pub unmatched_bank: Vec<Record>,
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReportLine {
    Matched(MatchedPair),
    UnmatchedErp(Record),
    UnmatchedBank(Record),
    Rejected(RejectedRow),
}

impl ReportLine {
    pub fn is_matched(&self) -> bool {
        matches!(self, Self::Matched(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportSummary {
    pub match_count: usize,
    pub unmatch_count: usize,
    /// Report entries: `match_count + unmatch_count`. A pair is one entry.
    pub total_records: usize,
    /// Input rows over both sources: `2 * match_count + unmatch_count`.
    pub input_records: usize,
    pub erp_records: usize,
    pub bank_records: usize,
    pub rejected_rows: usize,
    pub tier_counts: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportMeta {
    pub config_name: String,
    pub engine_version: String,
    pub amount_scale: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconciliationReport {
    pub meta: ReportMeta,
    pub summary: ReportSummary,
    pub result: MatchResult,
    pub rejected: Vec<RejectedRow>,
    /// Rendering order: matched pairs, unmatched ERP block, unmatched bank block.
    pub lines: Vec<ReportLine>,
}
