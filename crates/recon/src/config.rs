use serde::{Deserialize, Serialize};

use crate::error::ReconError;
use crate::model::Source;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReconConfig {
    pub name: String,
    pub matching: MatchConfig,
    pub input: InputConfig,
    pub erp: SourceConfig,
    pub bank: SourceConfig,
}

impl Default for ReconConfig {
    fn default() -> Self {
        Self {
            name: "ERP vs bank".into(),
            matching: MatchConfig::default(),
            input: InputConfig::default(),
            erp: SourceConfig::default(),
            bank: SourceConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Matching
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AmountSignMode {
    /// Compare absolute values; sources disagree on debit/credit sign.
    #[default]
    Absolute,
    Signed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FuzzyMetric {
    #[default]
    EditDistance,
    TokenOverlap,
}

/// How a tier's candidate graph is turned into pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// Sorted by (ERP row, bank row), commit while both sides are free.
    #[default]
    Greedy,
    /// Augmenting-path maximum-cardinality matching.
    Maximum,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct MatchConfig {
    pub date_window_days: u32,
    pub amount_sign_mode: AmountSignMode,
    pub fuzzy_metric: FuzzyMetric,
    pub fuzzy_threshold: f64,
    pub resolution: Resolution,
    /// Company-form words removed before fuzzy comparison.
    pub noise_words: Vec<String>,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            date_window_days: 3,
            amount_sign_mode: AmountSignMode::Absolute,
            fuzzy_metric: FuzzyMetric::EditDistance,
            fuzzy_threshold: 0.80,
            resolution: Resolution::Greedy,
            noise_words: default_noise_words(),
        }
    }
}

fn default_noise_words() -> Vec<String> {
    [
        "(주)", "주식회사", "㈜", "유한회사", "CO.,LTD", "CO.", "INC", "LTD", "LLC", "COMPANY",
    ]
    .iter()
    .map(|w| w.to_string())
    .collect()
}

// ---------------------------------------------------------------------------
// Input parsing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RowErrorPolicy {
    /// First unparseable row fails the whole run.
    #[default]
    Strict,
    /// Unparseable rows are skipped, reported and counted as unmatched.
    Lenient,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct InputConfig {
    pub row_error_policy: RowErrorPolicy,
    /// Per-source ceiling on data rows.
    pub max_rows: usize,
    /// Digits after the decimal point kept in minor units.
    pub amount_scale: u32,
    pub decimal_separator: char,
    /// chrono format strings, tried in order.
    pub date_formats: Vec<String>,
    pub header_search_rows: usize,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            row_error_policy: RowErrorPolicy::Strict,
            max_rows: 50_000,
            amount_scale: 2,
            decimal_separator: '.',
            date_formats: ["%Y-%m-%d", "%Y/%m/%d", "%Y.%m.%d", "%Y%m%d", "%m/%d/%Y", "%d.%m.%Y"]
                .iter()
                .map(|f| f.to_string())
                .collect(),
            header_search_rows: 30,
        }
    }
}

// ---------------------------------------------------------------------------
// Per-source layout
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct SourceConfig {
    /// Worksheet name; first sheet when absent.
    pub sheet: Option<String>,
    /// 1-based header row; auto-detected when absent.
    pub header_row: Option<usize>,
    /// Text encoding label for delimited input (e.g. "euc-kr").
    pub encoding: Option<String>,
    pub columns: ColumnMapping,
}

const DEFAULT_AMOUNT_COLUMN: &str = "amount";

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ColumnMapping {
    pub date: String,
    /// Signed amount column; `"amount"` when no amount layout is given.
    pub amount: Option<String>,
    /// Money in. With `outflow`, amount = inflow - outflow.
    pub inflow: Option<String>,
    pub outflow: Option<String>,
    pub reference: String,
    pub description: Option<String>,
}

impl Default for ColumnMapping {
    fn default() -> Self {
        Self {
            date: "date".into(),
            amount: None,
            inflow: None,
            outflow: None,
            reference: "reference".into(),
            description: Some("description".into()),
        }
    }
}

/// Resolved amount layout of a source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AmountColumns<'a> {
    Single(&'a str),
    Split {
        inflow: Option<&'a str>,
        outflow: Option<&'a str>,
    },
}

impl ColumnMapping {
    pub fn amount_columns(&self) -> AmountColumns<'_> {
        match (&self.amount, self.inflow.as_deref(), self.outflow.as_deref()) {
            (Some(col), _, _) => AmountColumns::Single(col),
            (None, None, None) => AmountColumns::Single(DEFAULT_AMOUNT_COLUMN),
            (None, inflow, outflow) => AmountColumns::Split { inflow, outflow },
        }
    }

    /// Columns that must be present in the header, in check order.
    pub fn required(&self) -> Vec<&str> {
        let mut cols = vec![self.date.as_str()];
        match self.amount_columns() {
            AmountColumns::Single(col) => cols.push(col),
            AmountColumns::Split { inflow, outflow } => {
                cols.extend(inflow);
                cols.extend(outflow);
            }
        }
        cols.push(&self.reference);
        cols
    }
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl ReconConfig {
    pub fn from_toml(input: &str) -> Result<Self, ReconError> {
        let config: ReconConfig =
            toml::from_str(input).map_err(|e| ReconError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ReconError> {
        toml::to_string_pretty(self).map_err(|e| ReconError::ConfigParse(e.to_string()))
    }

    pub fn source(&self, source: Source) -> &SourceConfig {
        match source {
            Source::Erp => &self.erp,
            Source::Bank => &self.bank,
        }
    }

    pub fn validate(&self) -> Result<(), ReconError> {
        let m = &self.matching;
        if !(m.fuzzy_threshold > 0.0 && m.fuzzy_threshold <= 1.0) {
            return Err(ReconError::ConfigValidation(format!(
                "matching.fuzzy_threshold must be in (0, 1], got {}",
                m.fuzzy_threshold
            )));
        }

        let i = &self.input;
        if i.amount_scale > 6 {
            return Err(ReconError::ConfigValidation(format!(
                "input.amount_scale must be at most 6, got {}",
                i.amount_scale
            )));
        }
        if i.date_formats.is_empty() {
            return Err(ReconError::ConfigValidation(
                "input.date_formats must list at least one format".into(),
            ));
        }
        if i.max_rows == 0 {
            return Err(ReconError::ConfigValidation("input.max_rows must be positive".into()));
        }
        if i.header_search_rows == 0 {
            return Err(ReconError::ConfigValidation(
                "input.header_search_rows must be positive".into(),
            ));
        }
        if i.decimal_separator != '.' && i.decimal_separator != ',' {
            return Err(ReconError::ConfigValidation(format!(
                "input.decimal_separator must be '.' or ',', got '{}'",
                i.decimal_separator
            )));
        }

        for source in [Source::Erp, Source::Bank] {
            let sc = self.source(source);
            let label = match source {
                Source::Erp => "erp",
                Source::Bank => "bank",
            };
            if sc.header_row == Some(0) {
                return Err(ReconError::ConfigValidation(format!(
                    "{label}.header_row is 1-based, got 0"
                )));
            }
            let cols = &sc.columns;
            if cols.amount.is_some() && (cols.inflow.is_some() || cols.outflow.is_some()) {
                return Err(ReconError::ConfigValidation(format!(
                    "{label}.columns: set either 'amount' or 'inflow'/'outflow', not both"
                )));
            }
            let named = [&cols.date, &cols.reference]
                .into_iter()
                .chain(cols.amount.iter())
                .chain(cols.inflow.iter())
                .chain(cols.outflow.iter())
                .chain(cols.description.iter());
            for name in named {
                if name.trim().is_empty() {
                    return Err(ReconError::ConfigValidation(format!(
                        "{label}.columns: column names must not be empty"
                    )));
                }
            }
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
