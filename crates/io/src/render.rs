// Report rendering: annotated workbook and flat CSV

use rust_xlsxwriter::{Color, Format, FormatAlign, FormatBorder, Workbook, Worksheet, XlsxError};
use thiserror::Error;

use ledgermatch_recon::normalize::{format_amount, minor_to_f64};
use ledgermatch_recon::{Block, ReconciliationReport, Record, RejectedRow, ReportLine, Source};

pub const COLUMNS: [&str; 15] = [
    "ERP Row",
    "ERP Date",
    "ERP Amount",
    "ERP Reference",
    "ERP Description",
    "Tier",
    "Score",
    "Day Offset",
    "Similarity",
    "Bank Row",
    "Bank Date",
    "Bank Amount",
    "Bank Reference",
    "Bank Description",
    "Note",
];

const COLUMN_WIDTHS: [f64; 15] = [
    8.0, 12.0, 14.0, 20.0, 28.0, 8.0, 7.0, 10.0, 10.0, 8.0, 12.0, 14.0, 20.0, 28.0, 40.0,
];

// First column of each side's block
const ERP_SIDE: usize = 0;
const BANK_SIDE: usize = 9;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("workbook: {0}")]
    Xlsx(#[from] XlsxError),
    #[error("csv: {0}")]
    Csv(#[from] csv::Error),
    #[error("csv: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv output is not UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// One rendered value, typed so the workbook keeps numbers as numbers.
#[derive(Debug, Clone, PartialEq)]
enum Value {
    Empty,
    Text(String),
    Int(i64),
    Amount(i64),
    Ratio(f64),
}

impl Value {
    fn to_text(&self, scale: u32) -> String {
        match self {
            Value::Empty => String::new(),
            Value::Text(s) => s.clone(),
            Value::Int(n) => n.to_string(),
            Value::Amount(minor) => format_amount(*minor, scale),
            Value::Ratio(r) => format!("{r:.4}"),
        }
    }
}

fn line_values(line: &ReportLine) -> Vec<Value> {
    let mut values = vec![Value::Empty; COLUMNS.len()];
    match line {
        ReportLine::Matched(pair) => {
            put_record(&mut values, ERP_SIDE, &pair.erp);
            put_record(&mut values, BANK_SIDE, &pair.bank);
            values[5] = Value::Text(pair.tier.to_string());
            values[6] = Value::Int(i64::from(pair.score));
            values[7] = Value::Int(pair.date_offset_days);
            values[8] = Value::Ratio(pair.similarity);
        }
        ReportLine::UnmatchedErp(r) => {
            put_record(&mut values, ERP_SIDE, r);
            values[14] = Value::Text("no bank match".into());
        }
        ReportLine::UnmatchedBank(r) => {
            put_record(&mut values, BANK_SIDE, r);
            values[14] = Value::Text("no ERP match".into());
        }
        ReportLine::Rejected(row) => put_rejected(&mut values, row),
    }
    values
}

fn put_record(values: &mut [Value], side: usize, r: &Record) {
    values[side] = Value::Int(r.row_index as i64);
    values[side + 1] = Value::Text(r.date.format("%Y-%m-%d").to_string());
    values[side + 2] = Value::Amount(r.amount_minor);
    values[side + 3] = Value::Text(r.reference.clone());
    values[side + 4] = Value::Text(r.description.clone());
}

fn put_rejected(values: &mut [Value], row: &RejectedRow) {
    let side = match row.source {
        Source::Erp => ERP_SIDE,
        Source::Bank => BANK_SIDE,
    };
    values[side] = Value::Int(row.row_index as i64);
    values[14] = Value::Text(format!("rejected: {}", row.reason));
}

// ---------------------------------------------------------------------------
// Workbook
// ---------------------------------------------------------------------------

/// Excel number format for amounts at the given scale.
fn amount_format(scale: u32) -> String {
    if scale == 0 {
        "#,##0".to_string()
    } else {
        format!("#,##0.{}", "0".repeat(scale as usize))
    }
}

/// Render the report as an xlsx workbook.
pub fn render_workbook(report: &ReconciliationReport) -> Result<Vec<u8>, RenderError> {
    let scale = report.meta.amount_scale;
    let header_format = Format::new()
        .set_bold()
        .set_background_color(Color::RGB(0xD9E1F2))
        .set_border_bottom(FormatBorder::Thin)
        .set_align(FormatAlign::Center);
    let title_format = Format::new().set_bold().set_background_color(Color::RGB(0xF2F2F2));
    let formats = ValueFormats {
        money: Format::new().set_num_format(amount_format(scale)),
        ratio: Format::new().set_num_format("0.00%"),
    };

    let mut workbook = Workbook::new();

    let sheet = workbook.add_worksheet().set_name("Reconciliation")?;
    for (col, (name, width)) in COLUMNS.iter().zip(COLUMN_WIDTHS).enumerate() {
        sheet.write_string_with_format(0, col as u16, *name, &header_format)?;
        sheet.set_column_width(col as u16, width)?;
    }
    sheet.set_freeze_panes(1, 0)?;

    let mut row: u32 = 1;
    for block in Block::ALL {
        let lines: Vec<&ReportLine> = report.block(block).collect();
        let title = format!("{} ({})", block.title(), lines.len());
        sheet.write_string_with_format(row, 0, &title, &title_format)?;
        for col in 1..COLUMNS.len() {
            sheet.write_blank(row, col as u16, &title_format)?;
        }
        row += 1;

        for line in lines {
            for (col, value) in line_values(line).iter().enumerate() {
                write_value(sheet, row, col as u16, value, scale, &formats)?;
            }
            row += 1;
        }
    }

    write_summary(workbook.add_worksheet().set_name("Summary")?, report, &header_format)?;

    Ok(workbook.save_to_buffer()?)
}

fn write_value(
    sheet: &mut Worksheet,
    row: u32,
    col: u16,
    value: &Value,
    scale: u32,
    formats: &ValueFormats,
) -> Result<(), XlsxError> {
    match value {
        Value::Empty => {}
        Value::Text(s) => {
            sheet.write_string(row, col, s)?;
        }
        Value::Int(n) => {
            sheet.write_number(row, col, *n as f64)?;
        }
        Value::Amount(minor) => {
            sheet.write_number_with_format(row, col, minor_to_f64(*minor, scale), &formats.money)?;
        }
        Value::Ratio(r) => {
            sheet.write_number_with_format(row, col, *r, &formats.ratio)?;
        }
    }
    Ok(())
}

struct ValueFormats {
    money: Format,
    ratio: Format,
}

fn write_summary(
    sheet: &mut Worksheet,
    report: &ReconciliationReport,
    header_format: &Format,
) -> Result<(), XlsxError> {
    let s = &report.summary;
    sheet.write_string_with_format(0, 0, "Item", header_format)?;
    sheet.write_string_with_format(0, 1, "Value", header_format)?;
    sheet.set_column_width(0, 24)?;
    sheet.set_column_width(1, 24)?;

    let mut rows: Vec<(String, SummaryValue)> = vec![
        ("Configuration".into(), SummaryValue::Text(report.meta.config_name.clone())),
        ("Engine version".into(), SummaryValue::Text(report.meta.engine_version.clone())),
        ("Matched".into(), SummaryValue::Count(s.match_count)),
        ("Unmatched".into(), SummaryValue::Count(s.unmatch_count)),
        ("Total entries".into(), SummaryValue::Count(s.total_records)),
        ("Input rows".into(), SummaryValue::Count(s.input_records)),
        ("ERP rows".into(), SummaryValue::Count(s.erp_records)),
        ("Bank rows".into(), SummaryValue::Count(s.bank_records)),
        ("Rejected rows".into(), SummaryValue::Count(s.rejected_rows)),
    ];
    for (tier, count) in &s.tier_counts {
        rows.push((format!("Tier {tier}"), SummaryValue::Count(*count)));
    }

    for (i, (label, value)) in rows.iter().enumerate() {
        let row = i as u32 + 1;
        sheet.write_string(row, 0, label)?;
        match value {
            SummaryValue::Text(t) => sheet.write_string(row, 1, t)?,
            SummaryValue::Count(n) => sheet.write_number(row, 1, *n as f64)?,
        };
    }
    Ok(())
}

enum SummaryValue {
    Text(String),
    Count(usize),
}

// ---------------------------------------------------------------------------
// CSV
// ---------------------------------------------------------------------------

/// Render the report as CSV: one header line, then one line per report line.
pub fn render_csv(report: &ReconciliationReport) -> Result<String, RenderError> {
    let scale = report.meta.amount_scale;
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(COLUMNS)?;
    for line in &report.lines {
        let fields: Vec<String> = line_values(line).iter().map(|v| v.to_text(scale)).collect();
        writer.write_record(&fields)?;
    }
    let bytes = writer.into_inner().map_err(|e| e.into_error())?;
    Ok(String::from_utf8(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use calamine::{open_workbook_auto_from_rs, Data, Reader};
    use ledgermatch_recon::config::RowErrorPolicy;
    use ledgermatch_recon::{reconcile, RawTable, ReconConfig};
    use std::io::Cursor;

    fn report() -> ReconciliationReport {
        let mut config = ReconConfig::default();
        config.input.row_error_policy = RowErrorPolicy::Lenient;
        let erp = RawTable::from_rows([
            vec!["date", "amount", "reference", "description"],
            vec!["2024-01-05", "1,234.50", "INV001", "Acme"],
            vec!["2024-01-06", "20.00", "INV002", "Globex"],
        ]);
        let bank = RawTable::from_rows([
            vec!["date", "amount", "reference", "description"],
            vec!["2024-01-07", "1234.50", "INV001", "ACME PAYMENT"],
            vec!["2024-01-07", "n/a", "INV003", ""],
        ]);
        reconcile(&config, &erp, &bank).unwrap()
    }

    #[test]
    fn workbook_layout() {
        let bytes = render_workbook(&report()).unwrap();
        let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes)).unwrap();
        assert_eq!(workbook.sheet_names(), vec!["Reconciliation", "Summary"]);

        let range = workbook.worksheet_range("Reconciliation").unwrap();
        let cell = |r: u32, c: u32| range.get_value((r, c)).cloned().unwrap_or(Data::Empty);

        assert_eq!(cell(0, 0), Data::String("ERP Row".into()));
        assert_eq!(cell(0, 14), Data::String("Note".into()));
        assert_eq!(cell(1, 0), Data::String("Matched (1)".into()));
        assert_eq!(cell(2, 0), Data::Float(2.0));
        assert_eq!(cell(2, 2), Data::Float(1234.5));
        assert_eq!(cell(2, 5), Data::String("near".into()));
        assert_eq!(cell(2, 7), Data::Float(2.0));
        assert_eq!(cell(2, 9), Data::Float(2.0));
        assert_eq!(cell(3, 0), Data::String("Unmatched ERP (1)".into()));
        assert_eq!(cell(4, 3), Data::String("INV002".into()));
        assert_eq!(cell(5, 0), Data::String("Unmatched bank (1)".into()));
        assert_eq!(cell(6, 9), Data::Float(3.0));
        match cell(6, 14) {
            Data::String(note) => assert!(note.starts_with("rejected: "), "{note}"),
            other => panic!("expected note, got {other:?}"),
        }

        let summary = workbook.worksheet_range("Summary").unwrap();
        assert_eq!(summary.get_value((3, 0)), Some(&Data::String("Matched".into())));
        assert_eq!(summary.get_value((3, 1)), Some(&Data::Float(1.0)));
        assert_eq!(summary.get_value((4, 1)), Some(&Data::Float(2.0)));
    }

    #[test]
    fn csv_lines() {
        let csv = render_csv(&report()).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("ERP Row,ERP Date,ERP Amount"));
        assert_eq!(
            lines[1],
            "2,2024-01-05,1234.50,INV001,Acme,near,2,2,1.0000,2,2024-01-07,1234.50,INV001,ACME PAYMENT,"
        );
        assert_eq!(lines[2], "3,2024-01-06,20.00,INV002,Globex,,,,,,,,,,no bank match");
        assert!(lines[3].starts_with(",,,,,,,,,3,,,,,rejected: "));
    }

    #[test]
    fn amount_formats() {
        assert_eq!(amount_format(0), "#,##0");
        assert_eq!(amount_format(2), "#,##0.00");
        assert_eq!(amount_format(3), "#,##0.000");
    }
}
