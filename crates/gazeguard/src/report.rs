//! Daily attendance workbook: an `Attendance` sheet and a `Summary` sheet.

use crate::session::{Session, Summary};
use chrono::NaiveDate;
use rust_xlsxwriter::{Format, Workbook, XlsxError};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const ATTENDANCE_SHEET: &str = "Attendance";
pub const SUMMARY_SHEET: &str = "Summary";

const ATTENDANCE_HEADERS: [&str; 3] = ["Name", "Time of Arrival", "Status"];
const SUMMARY_HEADERS: [&str; 5] = [
    "Total Students",
    "Present Students",
    "Absent Students",
    "Present Student Names",
    "Absent Student Names",
];

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("failed to create {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("xlsx: {0}")]
    Xlsx(#[from] XlsxError),
}

/// A single worksheet cell.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Text(String),
    Number(f64),
    Empty,
}

/// A worksheet as a header row plus data rows.
#[derive(Debug, Clone, PartialEq)]
pub struct SheetTable {
    pub name: &'static str,
    pub headers: &'static [&'static str],
    pub rows: Vec<Vec<CellValue>>,
}

/// `<dir>/<YYYY-MM-DD>.xlsx`, one workbook per calendar day.
pub fn attendance_file_path(dir: &Path, date: NaiveDate) -> PathBuf {
    dir.join(format!("{}.xlsx", date.format("%Y-%m-%d")))
}

pub fn attendance_table(session: &Session) -> SheetTable {
    let rows = session
        .records()
        .iter()
        .map(|record| {
            let arrival = match record.arrival_text() {
                t if t.is_empty() => CellValue::Empty,
                t => CellValue::Text(t),
            };
            vec![
                CellValue::Text(record.name.clone()),
                arrival,
                CellValue::Text(record.status.to_string()),
            ]
        })
        .collect();

    SheetTable {
        name: ATTENDANCE_SHEET,
        headers: &ATTENDANCE_HEADERS,
        rows,
    }
}

pub fn summary_table(summary: &Summary) -> SheetTable {
    SheetTable {
        name: SUMMARY_SHEET,
        headers: &SUMMARY_HEADERS,
        rows: vec![vec![
            CellValue::Number(summary.total as f64),
            CellValue::Number(summary.present() as f64),
            CellValue::Number(summary.absent() as f64),
            CellValue::Text(summary.present_names.join(", ")),
            CellValue::Text(summary.absent_names.join(", ")),
        ]],
    }
}

/// Write both sheets to `path`, replacing any workbook already there.
pub fn write_report(path: &Path, session: &Session) -> Result<Summary, ReportError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|source| ReportError::CreateDir {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let summary = session.summary();
    let tables = [attendance_table(session), summary_table(&summary)];

    let mut workbook = Workbook::new();
    let header_format = Format::new().set_bold();

    for table in &tables {
        let sheet = workbook.add_worksheet();
        sheet.set_name(table.name)?;

        for (col, header) in table.headers.iter().enumerate() {
            sheet.write_string_with_format(0, col as u16, *header, &header_format)?;
        }

        for (r, row) in table.rows.iter().enumerate() {
            let row_num = r as u32 + 1;
            for (col, cell) in row.iter().enumerate() {
                match cell {
                    CellValue::Text(text) => {
                        sheet.write_string(row_num, col as u16, text.as_str())?;
                    }
                    CellValue::Number(n) => {
                        sheet.write_number(row_num, col as u16, *n)?;
                    }
                    CellValue::Empty => {}
                }
            }
        }
    }

    workbook.save(path)?;
    tracing::info!(
        path = %path.display(),
        total = summary.total,
        present = summary.present(),
        absent = summary.absent(),
        "attendance report written"
    );
    Ok(summary)
}
