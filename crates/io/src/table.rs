// Raw table reading: spreadsheet workbooks and delimited text

use std::io::Cursor;
use std::path::Path;

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use chrono::{Duration, NaiveDate};
use encoding_rs::Encoding;
use log::debug;

use ledgermatch_recon::config::SourceConfig;
use ledgermatch_recon::{RawTable, ReconError, Source};

/// Accepted input formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFormat {
    /// xlsx, xlsm, xlsb, xls, ods
    Workbook,
    /// csv, tsv, txt
    Delimited,
}

impl TableFormat {
    pub fn from_extension(ext: &str) -> Option<TableFormat> {
        match ext.to_ascii_lowercase().as_str() {
            "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => Some(TableFormat::Workbook),
            "csv" | "tsv" | "txt" => Some(TableFormat::Delimited),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<TableFormat> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(TableFormat::from_extension)
    }
}

/// Read every physical row of one source into a [`RawTable`].
pub fn read_table(
    bytes: &[u8],
    format: TableFormat,
    source_config: &SourceConfig,
    origin: Source,
) -> Result<RawTable, ReconError> {
    let table = match format {
        TableFormat::Workbook => read_workbook(bytes, source_config.sheet.as_deref(), origin)?,
        TableFormat::Delimited => {
            let text = decode_text(bytes, source_config.encoding.as_deref(), origin)?;
            read_delimited(&text, origin)?
        }
    };
    debug!("{origin}: read {} physical rows", table.rows.len());
    Ok(table)
}

// ---------------------------------------------------------------------------
// Workbooks
// ---------------------------------------------------------------------------

fn read_workbook(bytes: &[u8], sheet: Option<&str>, origin: Source) -> Result<RawTable, ReconError> {
    let read_err = |message: String| ReconError::Read { origin, message };

    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))
        .map_err(|e| read_err(format!("not a readable workbook: {e}")))?;

    let names = workbook.sheet_names().to_vec();
    let name = match sheet {
        Some(wanted) => names
            .iter()
            .find(|n| n.as_str() == wanted)
            .cloned()
            .ok_or_else(|| read_err(format!("no sheet named '{wanted}' (sheets: {})", names.join(", "))))?,
        None => names
            .first()
            .cloned()
            .ok_or_else(|| read_err("workbook contains no sheets".into()))?,
    };

    let range = workbook
        .worksheet_range(&name)
        .map_err(|e| read_err(format!("cannot read sheet '{name}': {e}")))?;

    // Range start offset (data may not begin at A1); pad so row numbers match the sheet
    let (start_row, start_col) = range.start().unwrap_or((0, 0));
    let mut rows: Vec<Vec<String>> = vec![Vec::new(); start_row as usize];
    for row in range.rows() {
        let mut cells = vec![String::new(); start_col as usize];
        cells.extend(row.iter().map(render_cell));
        rows.push(cells);
    }
    Ok(RawTable::new(rows))
}

/// Render one cell as the text the normalizer parses.
fn render_cell(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        // Integers without decimals
        Data::Float(n) => {
            if n.fract() == 0.0 && n.abs() < 1e15 {
                format!("{}", *n as i64)
            } else {
                format!("{n}")
            }
        }
        Data::Int(n) => n.to_string(),
        Data::Bool(b) => (if *b { "TRUE" } else { "FALSE" }).to_string(),
        Data::Error(_) => "#ERR".to_string(),
        Data::DateTime(dt) => serial_to_text(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
    }
}

/// Excel serial (1900 system) to `YYYY-MM-DD`, with ` HH:MM:SS` when the
/// serial carries a time of day.
fn serial_to_text(serial: f64) -> String {
    let Some(epoch) = NaiveDate::from_ymd_opt(1899, 12, 30) else {
        return serial.to_string();
    };
    let mut days = serial.floor() as i64;
    let mut seconds = ((serial - serial.floor()) * 86_400.0).round() as i64;
    if seconds >= 86_400 {
        days += 1;
        seconds -= 86_400;
    }
    let Some(date) = Duration::try_days(days).and_then(|d| epoch.checked_add_signed(d)) else {
        return serial.to_string();
    };
    if seconds == 0 {
        date.format("%Y-%m-%d").to_string()
    } else {
        format!(
            "{} {:02}:{:02}:{:02}",
            date.format("%Y-%m-%d"),
            seconds / 3600,
            (seconds % 3600) / 60,
            seconds % 60
        )
    }
}

// ---------------------------------------------------------------------------
// Delimited text
// ---------------------------------------------------------------------------

/// Decode bytes to text. With a label, that encoding is used. Otherwise UTF-8
/// (BOM stripped), falling back to Windows-1252 for Excel-exported files.
fn decode_text(bytes: &[u8], label: Option<&str>, origin: Source) -> Result<String, ReconError> {
    if let Some(label) = label {
        let encoding = Encoding::for_label(label.trim().as_bytes()).ok_or_else(|| ReconError::Read {
            origin,
            message: format!("unknown encoding '{label}'"),
        })?;
        let (decoded, _, had_errors) = encoding.decode(bytes);
        if had_errors {
            debug!("{origin}: replacement characters while decoding as {}", encoding.name());
        }
        return Ok(decoded.into_owned());
    }

    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(s) => Ok(s.to_string()),
        Err(_) => {
            debug!("{origin}: not UTF-8, decoding as windows-1252");
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
            Ok(decoded.into_owned())
        }
    }
}

fn read_delimited(content: &str, origin: Source) -> Result<RawTable, ReconError> {
    let delimiter = sniff_delimiter(content);
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());

    // Blank lines produce no record and csv's own line counter skips them,
    // so the text line comes from the record's byte offset.
    let bytes = content.as_bytes();
    let mut rows: Vec<Vec<String>> = Vec::new();
    let (mut scanned, mut line) = (0usize, 1usize);
    for result in reader.records() {
        let record = result.map_err(|e| ReconError::Read {
            origin,
            message: e.to_string(),
        })?;
        if let Some(pos) = record.position() {
            let start = (pos.byte() as usize).min(bytes.len());
            if start > scanned {
                line += bytes[scanned..start].iter().filter(|&&b| b == b'\n').count();
                scanned = start;
            }
            while rows.len() + 1 < line {
                rows.push(Vec::new());
            }
        }
        rows.push(record.iter().map(str::to_string).collect());
    }
    Ok(RawTable::new(rows))
}

/// Detect the most likely field delimiter by checking consistency across the first few lines.
///
/// For each candidate (tab, semicolon, comma, pipe), count fields per line. The delimiter
/// that produces the most consistent field count (>1 field) wins.
pub fn sniff_delimiter(content: &str) -> u8 {
    let candidates: &[u8] = &[b'\t', b';', b',', b'|'];
    let sample_lines: Vec<&str> = content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .take(10)
        .collect();

    let mut best = b',';
    let mut best_score = 0u64;

    for &delim in candidates {
        let counts: Vec<usize> = sample_lines
            .iter()
            .map(|line| {
                csv::ReaderBuilder::new()
                    .delimiter(delim)
                    .has_headers(false)
                    .flexible(true)
                    .from_reader(line.as_bytes())
                    .records()
                    .next()
                    .and_then(|r| r.ok())
                    .map(|r| r.len())
                    .unwrap_or(1)
            })
            .collect();

        // The most common field count wins; bank exports often open with a
        // one-cell title line, so line 1 alone is not trusted.
        let Some(target) = mode(&counts) else {
            continue;
        };
        if target <= 1 {
            continue;
        }
        let consistent = counts.iter().filter(|&&c| c == target).count() as u64;
        let score = consistent * target as u64;

        if score > best_score {
            best_score = score;
            best = delim;
        }
    }

    best
}

fn mode(counts: &[usize]) -> Option<usize> {
    let mut best: Option<(usize, usize)> = None;
    for &c in counts {
        let n = counts.iter().filter(|&&x| x == c).count();
        if best.map_or(true, |(_, bn)| n > bn) {
            best = Some((c, n));
        }
    }
    best.map(|(c, _)| c)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgermatch_recon::ReconConfig;
    use rust_xlsxwriter::{Format, Workbook};

    fn source() -> SourceConfig {
        SourceConfig::default()
    }

    #[test]
    fn format_from_extension() {
        assert_eq!(TableFormat::from_path(Path::new("a/ledger.XLSX")), Some(TableFormat::Workbook));
        assert_eq!(TableFormat::from_path(Path::new("bank.csv")), Some(TableFormat::Delimited));
        assert_eq!(TableFormat::from_path(Path::new("bank.tsv")), Some(TableFormat::Delimited));
        assert_eq!(TableFormat::from_path(Path::new("bank.pdf")), None);
        assert_eq!(TableFormat::from_path(Path::new("bank")), None);
    }

    #[test]
    fn test_sniff_semicolon_delimiter() {
        assert_eq!(sniff_delimiter("date;amount;reference\n2024-01-05;1,50;INV1\n"), b';');
    }

    #[test]
    fn test_sniff_tab_delimiter() {
        assert_eq!(sniff_delimiter("date\tamount\n2024-01-05\t100\n"), b'\t');
    }

    #[test]
    fn test_sniff_skips_title_line() {
        let content = "Statement for account 123\ndate,amount,ref\n2024-01-05,100,A\n2024-01-06,200,B\n";
        assert_eq!(sniff_delimiter(content), b',');
    }

    #[test]
    fn delimited_with_bom_and_ragged_rows() {
        let bytes = "\u{feff}date,amount,reference\n2024-01-05,100.00\n".as_bytes();
        let table = read_table(bytes, TableFormat::Delimited, &source(), Source::Bank).unwrap();
        assert_eq!(table.rows[0][0], "date");
        assert_eq!(table.rows[1], vec!["2024-01-05", "100.00"]);
    }

    #[test]
    fn blank_lines_keep_line_numbers() {
        let bytes = b"date,amount,reference\n\n2024-01-05,100,A\n";
        let table = read_table(bytes, TableFormat::Delimited, &source(), Source::Bank).unwrap();
        assert_eq!(table.rows.len(), 3);
        assert!(table.rows[1].is_empty());
        assert_eq!(table.rows[2][2], "A");
    }

    #[test]
    fn row_numbers_survive_blank_runs_and_quoted_newlines() {
        let bytes = b"date,amount,reference\n\n2024-01-05,100,\"A\nB\"\n\n\n2024-01-06,200,C\n";
        let table = read_table(bytes, TableFormat::Delimited, &source(), Source::Bank).unwrap();
        // header on line 1, quoted record on lines 3-4, last record on line 7
        assert_eq!(table.rows.len(), 7);
        assert_eq!(table.rows[2][2], "A\nB");
        assert!(table.rows[3].is_empty() && table.rows[4].is_empty() && table.rows[5].is_empty());
        assert_eq!(table.rows[6][2], "C");
    }

    #[test]
    fn parse_errors_name_the_text_line() {
        let erp = read_table(
            b"date,amount,reference\n2024-01-05,100,A\n",
            TableFormat::Delimited,
            &source(),
            Source::Erp,
        )
        .unwrap();
        let bank = read_table(
            b"date,amount,reference\n\n\n2024-01-05,abc,A\n",
            TableFormat::Delimited,
            &source(),
            Source::Bank,
        )
        .unwrap();
        let err = ledgermatch_recon::reconcile(&ReconConfig::default(), &erp, &bank).unwrap_err();
        assert!(err.to_string().starts_with("BANK row 4:"), "{err}");
    }

    #[test]
    fn windows_1252_fallback() {
        // 0xE9 is 'é' in windows-1252 and invalid UTF-8
        let bytes = b"date,amount,reference\n2024-01-05,100,Caf\xE9\n";
        let table = read_table(bytes, TableFormat::Delimited, &source(), Source::Bank).unwrap();
        assert_eq!(table.rows[1][2], "Café");
    }

    #[test]
    fn euc_kr_label() {
        let (bytes, _, _) = encoding_rs::EUC_KR.encode("거래일시,입금액,내용\n2024-03-05,1500000,한빛상사\n");
        let config = SourceConfig {
            encoding: Some("euc-kr".into()),
            ..SourceConfig::default()
        };
        let table = read_table(&bytes, TableFormat::Delimited, &config, Source::Bank).unwrap();
        assert_eq!(table.rows[0], vec!["거래일시", "입금액", "내용"]);
        assert_eq!(table.rows[1][2], "한빛상사");
    }

    #[test]
    fn unknown_encoding_label() {
        let config = SourceConfig {
            encoding: Some("klingon".into()),
            ..SourceConfig::default()
        };
        let err = read_table(b"a,b", TableFormat::Delimited, &config, Source::Erp).unwrap_err();
        assert_eq!(err.code(), "read");
    }

    fn sample_workbook() -> Vec<u8> {
        let mut workbook = Workbook::new();
        let date_format = Format::new().set_num_format("yyyy-mm-dd");
        let sheet = workbook.add_worksheet().set_name("Ledger").unwrap();
        // Title in row 2, header in row 3, data from row 4
        sheet.write_string(1, 1, "General ledger").unwrap();
        sheet.write_string(2, 1, "date").unwrap();
        sheet.write_string(2, 2, "amount").unwrap();
        sheet.write_string(2, 3, "reference").unwrap();
        sheet.write_number_with_format(3, 1, 45296.0, &date_format).unwrap();
        sheet.write_number(3, 2, 1500.0).unwrap();
        sheet.write_string(3, 3, "INV001").unwrap();
        sheet.write_number_with_format(4, 1, 45297.5, &date_format).unwrap();
        sheet.write_number(4, 2, -12.34).unwrap();
        sheet.write_boolean(4, 3, true).unwrap();
        workbook.add_worksheet().set_name("Other").unwrap();
        workbook.save_to_buffer().unwrap()
    }

    #[test]
    fn workbook_cells_keep_physical_positions() {
        let bytes = sample_workbook();
        let table = read_table(&bytes, TableFormat::Workbook, &source(), Source::Erp).unwrap();

        assert!(table.rows[0].iter().all(|c| c.is_empty()));
        assert_eq!(table.rows[2][1..], ["date", "amount", "reference"]);
        assert_eq!(table.rows[2][0], "");
        assert_eq!(table.rows[3][1..], ["2024-01-05", "1500", "INV001"]);
        assert_eq!(table.rows[4][1..], ["2024-01-06 12:00:00", "-12.34", "TRUE"]);
    }

    #[test]
    fn workbook_feeds_the_engine() {
        let bytes = sample_workbook();
        let table = read_table(&bytes, TableFormat::Workbook, &source(), Source::Erp).unwrap();
        let out = ledgermatch_recon::normalize::normalize(
            &table,
            Source::Erp,
            &source(),
            &ledgermatch_recon::config::InputConfig::default(),
        )
        .unwrap();
        assert_eq!(out.header_row, 3);
        assert_eq!(out.records[0].row_index, 4);
        assert_eq!(out.records[0].amount_minor, 150_000);
        assert_eq!(out.records[1].amount_minor, -1234);
    }

    #[test]
    fn named_sheet() {
        let bytes = sample_workbook();
        let config = SourceConfig {
            sheet: Some("Other".into()),
            ..SourceConfig::default()
        };
        let table = read_table(&bytes, TableFormat::Workbook, &config, Source::Erp).unwrap();
        assert!(table.rows.iter().all(|r| r.iter().all(|c| c.is_empty())));

        let config = SourceConfig {
            sheet: Some("Missing".into()),
            ..SourceConfig::default()
        };
        let err = read_table(&bytes, TableFormat::Workbook, &config, Source::Erp).unwrap_err();
        assert!(err.to_string().contains("no sheet named 'Missing'"), "{err}");
    }

    #[test]
    fn garbage_is_not_a_workbook() {
        let err = read_table(b"not a zip", TableFormat::Workbook, &source(), Source::Bank).unwrap_err();
        assert!(matches!(err, ReconError::Read { origin: Source::Bank, .. }));
    }

    #[test]
    fn serial_dates() {
        assert_eq!(serial_to_text(45296.0), "2024-01-05");
        assert_eq!(serial_to_text(45296.25), "2024-01-05 06:00:00");
        assert_eq!(serial_to_text(45296.9999999), "2024-01-06");
    }
}
