use chrono::NaiveDate;
use log::{debug, warn};

use crate::config::{AmountColumns, ColumnMapping, InputConfig, RowErrorPolicy, SourceConfig};
use crate::error::ReconError;
use crate::model::{RawTable, Record, RejectedRow, Source};

const CURRENCY_SYMBOLS: &[char] = &['$', '€', '£', '¥', '₩', '￦', '₹', '¢', '원'];

/// Output of normalizing one source.
#[derive(Debug, Clone, Default)]
pub struct NormalizedSource {
    pub records: Vec<Record>,
    /// Rows skipped under the lenient policy.
    pub rejected: Vec<RejectedRow>,
    /// 1-based physical row of the header.
    pub header_row: usize,
}

impl NormalizedSource {
    /// Data rows that entered normalization, parsed or not.
    pub fn input_rows(&self) -> usize {
        self.records.len() + self.rejected.len()
    }
}

/// Resolved 0-based column positions for one source.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ColumnIndex {
    date: usize,
    amount: AmountIndex,
    reference: usize,
    description: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum AmountIndex {
    Single(usize),
    Split {
        inflow: Option<usize>,
        outflow: Option<usize>,
    },
}

/// Convert one raw table into canonical records.
///
/// Structural problems (missing columns, no rows, too many rows) fail before
/// any row is parsed. Row-level parse failures follow the configured policy.
pub fn normalize(
    table: &RawTable,
    source: Source,
    source_config: &SourceConfig,
    input: &InputConfig,
) -> Result<NormalizedSource, ReconError> {
    let columns = &source_config.columns;
    let (header_idx, index) = locate_header(
        table,
        source,
        columns,
        source_config.header_row,
        input.header_search_rows,
    )?;
    debug!("{source}: header at row {}", header_idx + 1);

    let mut no_movement = 0usize;
    let data_rows: Vec<(usize, &Vec<String>)> = table
        .rows
        .iter()
        .enumerate()
        .skip(header_idx + 1)
        .filter(|(_, row)| row.iter().any(|cell| !cell.trim().is_empty()))
        .filter(|(_, row)| {
            let skip = is_empty_movement(row, &index, input);
            no_movement += usize::from(skip);
            !skip
        })
        .map(|(i, row)| (i + 1, row))
        .collect();
    if no_movement > 0 {
        debug!("{source}: skipped {no_movement} rows with no inflow or outflow");
    }

    if data_rows.is_empty() {
        return Err(ReconError::EmptyDataset { origin: source });
    }
    if data_rows.len() > input.max_rows {
        return Err(ReconError::InputTooLarge {
            origin: source,
            rows: data_rows.len(),
            limit: input.max_rows,
        });
    }

    let mut out = NormalizedSource {
        records: Vec::with_capacity(data_rows.len()),
        rejected: Vec::new(),
        header_row: header_idx + 1,
    };

    for (row_index, row) in data_rows {
        match normalize_row(row, row_index, source, columns, &index, input) {
            Ok(record) => out.records.push(record),
            Err(err) => match input.row_error_policy {
                RowErrorPolicy::Strict => return Err(err),
                RowErrorPolicy::Lenient => {
                    warn!("skipping row: {err}");
                    out.rejected.push(rejected_row(source, row_index, err));
                }
            },
        }
    }

    debug!(
        "{source}: {} records, {} rejected",
        out.records.len(),
        out.rejected.len()
    );
    Ok(out)
}

/// Split-column rows with nothing in and nothing out are balance or memo
/// lines, not transactions.
fn is_empty_movement(row: &[String], index: &ColumnIndex, input: &InputConfig) -> bool {
    let AmountIndex::Split { inflow, outflow } = &index.amount else {
        return false;
    };
    [*inflow, *outflow].into_iter().flatten().all(|i| {
        let raw = row.get(i).map(|s| s.trim()).unwrap_or("");
        raw.is_empty() || parse_amount(raw, input.amount_scale, input.decimal_separator) == Some(0)
    })
}

fn rejected_row(source: Source, row_index: usize, err: ReconError) -> RejectedRow {
    let reason = err.to_string();
    let (column, value) = match err {
        ReconError::DateParse { column, value, .. } | ReconError::AmountParse { column, value, .. } => {
            (column, value)
        }
        _ => (String::new(), String::new()),
    };
    RejectedRow {
        source,
        row_index,
        column,
        value,
        reason,
    }
}

fn normalize_row(
    row: &[String],
    row_index: usize,
    source: Source,
    columns: &ColumnMapping,
    index: &ColumnIndex,
    input: &InputConfig,
) -> Result<Record, ReconError> {
    let cell = |i: usize| row.get(i).map(|s| s.trim()).unwrap_or("");

    let date_raw = cell(index.date);
    let date = parse_date(date_raw, &input.date_formats).ok_or_else(|| ReconError::DateParse {
        origin: source,
        row_index,
        column: columns.date.clone(),
        value: date_raw.to_string(),
    })?;

    let amount_err = |column: &str, value: &str| ReconError::AmountParse {
        origin: source,
        row_index,
        column: column.to_string(),
        value: value.to_string(),
    };
    let scale = input.amount_scale;
    let sep = input.decimal_separator;

    let amount_minor = match (&index.amount, columns.amount_columns()) {
        (AmountIndex::Single(i), AmountColumns::Single(name)) => {
            let raw = cell(*i);
            parse_amount(raw, scale, sep).ok_or_else(|| amount_err(name, raw))?
        }
        (AmountIndex::Split { inflow, outflow }, AmountColumns::Split { inflow: in_name, outflow: out_name }) => {
            let side = |idx: Option<usize>, name: Option<&str>| -> Result<Option<i64>, ReconError> {
                let (Some(i), Some(name)) = (idx, name) else {
                    return Ok(None);
                };
                let raw = cell(i);
                if raw.is_empty() {
                    return Ok(None);
                }
                parse_amount(raw, scale, sep).map(Some).ok_or_else(|| amount_err(name, raw))
            };
            let money_in = side(*inflow, in_name)?;
            let money_out = side(*outflow, out_name)?;
            match (money_in, money_out) {
                (None, None) => {
                    let name = in_name.or(out_name).unwrap_or_default();
                    return Err(amount_err(name, ""));
                }
                (a, b) => a
                    .unwrap_or(0)
                    .checked_sub(b.unwrap_or(0))
                    .ok_or_else(|| amount_err(in_name.or(out_name).unwrap_or_default(), "overflow"))?,
            }
        }
        _ => {
            return Err(ReconError::InternalConsistency(
                "amount column index does not match mapping".into(),
            ))
        }
    };

    let reference = cell(index.reference).to_string();
    let description = index.description.map(cell).unwrap_or("").to_string();

    Ok(Record {
        source,
        row_index,
        date,
        amount_minor,
        match_key: normalize_reference(&reference),
        reference,
        description,
    })
}

// ---------------------------------------------------------------------------
// Header location
// ---------------------------------------------------------------------------

fn same_header(cell: &str, name: &str) -> bool {
    cell.trim().to_lowercase() == name.trim().to_lowercase()
}

fn find_column(row: &[String], name: &str) -> Option<usize> {
    row.iter().position(|cell| same_header(cell, name))
}

fn locate_header(
    table: &RawTable,
    source: Source,
    columns: &ColumnMapping,
    header_row: Option<usize>,
    search_rows: usize,
) -> Result<(usize, ColumnIndex), ReconError> {
    let required = columns.required();

    let header_idx = match header_row {
        Some(n) => n.saturating_sub(1),
        None => {
            let window = table.rows.iter().take(search_rows).enumerate();
            let full = window
                .clone()
                .find(|(_, row)| required.iter().all(|name| find_column(row, name).is_some()));
            match full {
                Some((i, _)) => i,
                // Best partial row decides which column gets reported missing
                None => window
                    .max_by_key(|(i, row)| {
                        let hits = required.iter().filter(|n| find_column(row, n).is_some()).count();
                        (hits, std::cmp::Reverse(*i))
                    })
                    .map(|(i, _)| i)
                    .unwrap_or(0),
            }
        }
    };

    let empty = Vec::new();
    let header = table.rows.get(header_idx).unwrap_or(&empty);
    let resolve = |name: &str| {
        find_column(header, name).ok_or_else(|| ReconError::ColumnMissing {
            origin: source,
            column: name.to_string(),
        })
    };

    let date = resolve(&columns.date)?;
    let amount = match columns.amount_columns() {
        AmountColumns::Single(name) => AmountIndex::Single(resolve(name)?),
        AmountColumns::Split { inflow, outflow } => AmountIndex::Split {
            inflow: inflow.map(resolve).transpose()?,
            outflow: outflow.map(resolve).transpose()?,
        },
    };
    let reference = resolve(&columns.reference)?;
    let description = columns
        .description
        .as_deref()
        .and_then(|name| find_column(header, name));

    Ok((
        header_idx,
        ColumnIndex {
            date,
            amount,
            reference,
            description,
        },
    ))
}

// ---------------------------------------------------------------------------
// Value parsing
// ---------------------------------------------------------------------------

/// Parse a calendar date using the first matching format.
/// A trailing time of day (`" 13:45"`, `"T13:45:00"`) is discarded.
pub fn parse_date(value: &str, formats: &[String]) -> Option<NaiveDate> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    formats.iter().find_map(|fmt| {
        let (date, rest) = NaiveDate::parse_and_remainder(value, fmt).ok()?;
        (rest.is_empty() || rest.starts_with(' ') || rest.starts_with('T')).then_some(date)
    })
}

/// Parse a money string into minor units at `scale` digits.
///
/// Accepts currency symbols, a three-letter ISO code, thousands separators,
/// leading `+`/`-`, trailing `-` and accounting parentheses. Excess fraction
/// digits round half away from zero.
pub fn parse_amount(value: &str, scale: u32, decimal_separator: char) -> Option<i64> {
    let mut s = value.trim();
    let mut negative = false;

    if let Some(inner) = s.strip_prefix('(').and_then(|v| v.strip_suffix(')')) {
        negative = true;
        s = inner;
    }

    let cleaned: String = s.chars().filter(|c| !CURRENCY_SYMBOLS.contains(c)).collect();
    let mut body = strip_iso_code(cleaned.trim());

    if let Some(rest) = body.strip_prefix('-') {
        if negative {
            return None;
        }
        negative = true;
        body = rest.trim_start();
    } else if let Some(rest) = body.strip_prefix('+') {
        body = rest.trim_start();
    } else if let Some(rest) = body.strip_suffix('-') {
        if negative {
            return None;
        }
        negative = true;
        body = rest.trim_end();
    }
    // Code may follow the sign: "-USD 12.00"
    let body = strip_iso_code(body);

    let mut int_digits = String::new();
    let mut frac_digits = String::new();
    let mut seen_decimal = false;
    for c in body.chars() {
        if c.is_ascii_digit() {
            if seen_decimal {
                frac_digits.push(c);
            } else {
                int_digits.push(c);
            }
        } else if c == decimal_separator {
            if seen_decimal {
                return None;
            }
            seen_decimal = true;
        } else if !seen_decimal && is_group_separator(c, decimal_separator) {
            continue;
        } else {
            return None;
        }
    }
    if int_digits.is_empty() && frac_digits.is_empty() {
        return None;
    }

    let factor = 10i64.checked_pow(scale)?;
    let mut minor: i64 = 0;
    for d in int_digits.chars() {
        minor = minor.checked_mul(10)?.checked_add(digit(d))?;
    }
    minor = minor.checked_mul(factor)?;

    let mut frac_value: i64 = 0;
    let mut frac_chars = frac_digits.chars();
    for _ in 0..scale {
        let d = frac_chars.next().map(digit).unwrap_or(0);
        frac_value = frac_value * 10 + d;
    }
    if frac_chars.next().map(digit).unwrap_or(0) >= 5 {
        frac_value += 1;
    }
    minor = minor.checked_add(frac_value)?;

    Some(if negative { -minor } else { minor })
}

fn digit(c: char) -> i64 {
    c.to_digit(10).map(i64::from).unwrap_or(0)
}

fn is_group_separator(c: char, decimal_separator: char) -> bool {
    let thousands = if decimal_separator == '.' { ',' } else { '.' };
    c == thousands || c == ' ' || c == '\'' || c == '\u{a0}' || c == '\u{202f}'
}

fn strip_iso_code(s: &str) -> &str {
    let is_code = |part: &str| part.len() == 3 && part.chars().all(|c| c.is_ascii_uppercase());
    let mut s = s;
    if s.len() >= 3 && s.is_char_boundary(3) && is_code(&s[..3]) {
        let after = &s[3..];
        if !after.starts_with(|c: char| c.is_ascii_alphabetic()) {
            s = after.trim_start();
        }
    }
    if s.len() >= 3 && s.is_char_boundary(s.len() - 3) && is_code(&s[s.len() - 3..]) {
        let before = &s[..s.len() - 3];
        if !before.ends_with(|c: char| c.is_ascii_alphabetic()) {
            s = before.trim_end();
        }
    }
    s
}

/// Matching key for a reference: trimmed, upper-cased, alphanumerics only.
pub fn normalize_reference(reference: &str) -> String {
    reference
        .trim()
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_uppercase)
        .collect()
}

/// Render minor units back to a decimal string, e.g. `-12345, 2` -> `"-123.45"`.
pub fn format_amount(minor: i64, scale: u32) -> String {
    let sign = if minor < 0 { "-" } else { "" };
    let magnitude = minor.unsigned_abs();
    if scale == 0 {
        return format!("{sign}{magnitude}");
    }
    let factor = 10u64.pow(scale);
    format!(
        "{sign}{}.{:0width$}",
        magnitude / factor,
        magnitude % factor,
        width = scale as usize
    )
}

/// Minor units as a display number. Never used for comparison.
pub fn minor_to_f64(minor: i64, scale: u32) -> f64 {
    minor as f64 / 10f64.powi(scale as i32)
}
