//! Upload file parser for CSV and delimited text visit files.
//!
//! Both formats require a header row naming the columns
//! `AADHAR_NO,NAME,AGE,GENDER,ADDRESS,PHONE,DEPARTMENT_VISITED` (any order,
//! any case). `AADHAR_NO`, `NAME` and `DEPARTMENT_VISITED` are mandatory.
//! Text files may be tab-, pipe- or comma-delimited; the header line decides.

use std::path::Path;

use csv::{ReaderBuilder, StringRecord, Trim};
use serde::Serialize;
use thiserror::Error;

use super::validator;
use crate::models::VisitRecord;

/// File-level parse errors. Row-level problems are reported as [`LineError`]s.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("File is empty or has no header row")]
    Empty,

    #[error("Missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

pub type ParseResult<T> = Result<T, ParseError>;

/// Supported upload formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Csv,
    Text,
}

impl FileFormat {
    /// Pick the format from a file name's extension (`.csv` or `.txt`).
    pub fn from_file_name(file_name: &str) -> Option<Self> {
        let ext = Path::new(file_name).extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "csv" => Some(FileFormat::Csv),
            "txt" => Some(FileFormat::Text),
            _ => None,
        }
    }
}

/// A row that passed parsing and validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRecord {
    /// 1-based line in the source file
    pub line: usize,
    pub record: VisitRecord,
}

/// A row that was rejected.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LineError {
    pub line: usize,
    pub message: String,
}

/// Row counts for a parsed file. Blank lines are not counted.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ParseSummary {
    pub total_lines: usize,
    pub valid_lines: usize,
    pub invalid_lines: usize,
}

/// Parsed upload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedFile {
    pub records: Vec<ParsedRecord>,
    pub errors: Vec<LineError>,
    pub summary: ParseSummary,
}

impl ParsedFile {
    /// Valid records in file order, ready for batch processing.
    pub fn visit_records(&self) -> Vec<VisitRecord> {
        self.records.iter().map(|r| r.record.clone()).collect()
    }
}

/// Column positions resolved from the header row.
struct Columns {
    width: usize,
    identifier: usize,
    name: usize,
    department: usize,
    age: Option<usize>,
    gender: Option<usize>,
    address: Option<usize>,
    phone: Option<usize>,
}

impl Columns {
    fn from_headers(headers: &StringRecord) -> ParseResult<Self> {
        let find = |names: &[&str]| {
            headers
                .iter()
                .position(|h| names.iter().any(|n| h.trim().eq_ignore_ascii_case(n)))
        };

        let identifier = find(&["AADHAR_NO", "IDENTIFIER"]);
        let name = find(&["NAME"]);
        let department = find(&["DEPARTMENT_VISITED", "DEPARTMENT"]);

        match (identifier, name, department) {
            (Some(identifier), Some(name), Some(department)) => Ok(Self {
                width: headers.len(),
                identifier,
                name,
                department,
                age: find(&["AGE"]),
                gender: find(&["GENDER"]),
                address: find(&["ADDRESS"]),
                phone: find(&["PHONE"]),
            }),
            _ => {
                let missing = [
                    ("AADHAR_NO", identifier),
                    ("NAME", name),
                    ("DEPARTMENT_VISITED", department),
                ]
                .iter()
                .filter(|(_, idx)| idx.is_none())
                .map(|(col, _)| col.to_string())
                .collect();
                Err(ParseError::MissingColumns(missing))
            }
        }
    }

    fn shape(&self, row: &StringRecord) -> VisitRecord {
        let text = |idx: usize| row.get(idx).unwrap_or_default().to_string();
        let optional = |idx: Option<usize>| {
            idx.and_then(|i| row.get(i))
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        VisitRecord {
            identifier: text(self.identifier),
            name: text(self.name),
            age: optional(self.age).and_then(|a| a.parse().ok()),
            gender: optional(self.gender),
            address: optional(self.address),
            phone: optional(self.phone),
            department: text(self.department),
        }
    }
}

/// Parse raw upload bytes.
///
/// Content is decoded as UTF-8 (lossy) and a leading byte-order mark is ignored.
pub fn parse_bytes(bytes: &[u8], format: FileFormat) -> ParseResult<ParsedFile> {
    parse(&String::from_utf8_lossy(bytes), format)
}

/// Parse upload content into validated records, rejected rows and a summary.
pub fn parse(content: &str, format: FileFormat) -> ParseResult<ParsedFile> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let source = Source::new(content).ok_or(ParseError::Empty)?;

    let delimiter = match format {
        FileFormat::Csv => b',',
        FileFormat::Text => detect_delimiter(source.header_line()),
    };

    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(source.body.as_bytes());

    let columns = Columns::from_headers(reader.headers()?)?;
    let mut parsed = ParsedFile::default();

    for result in reader.records() {
        let row = match result {
            Ok(row) => row,
            Err(e) => {
                let line = e.position().map(|p| source.line_at(p.byte())).unwrap_or_default();
                parsed.errors.push(LineError {
                    line,
                    message: e.to_string(),
                });
                continue;
            }
        };

        // Whitespace-only line
        if row.len() == 1 && row[0].is_empty() {
            continue;
        }

        let line = row.position().map(|p| source.line_at(p.byte())).unwrap_or_default();

        if row.len() > columns.width {
            parsed.errors.push(LineError {
                line,
                message: format!(
                    "Expected at most {} fields, found {}",
                    columns.width,
                    row.len()
                ),
            });
            continue;
        }

        match validator::prepare(columns.shape(&row)) {
            Ok(record) => parsed.records.push(ParsedRecord { line, record }),
            Err(errors) => parsed.errors.push(LineError {
                line,
                message: errors.join("; "),
            }),
        }
    }

    parsed.summary = ParseSummary {
        total_lines: parsed.records.len() + parsed.errors.len(),
        valid_lines: parsed.records.len(),
        invalid_lines: parsed.errors.len(),
    };
    Ok(parsed)
}

/// Upload text starting at the header row, with the number of blank lines
/// skipped before it.
struct Source<'a> {
    body: &'a str,
    skipped_lines: usize,
}

impl<'a> Source<'a> {
    fn new(content: &'a str) -> Option<Self> {
        let mut offset = 0;
        let mut skipped_lines = 0;
        for line in content.split_inclusive('\n') {
            if !line.trim().is_empty() {
                return Some(Self {
                    body: &content[offset..],
                    skipped_lines,
                });
            }
            offset += line.len();
            skipped_lines += 1;
        }
        None
    }

    fn header_line(&self) -> &'a str {
        self.body.lines().next().unwrap_or_default()
    }

    /// 1-based physical line of the record starting at `byte`.
    ///
    /// The csv reader reports a record's start before the blank lines it
    /// skips, so line breaks at `byte` belong to earlier lines.
    fn line_at(&self, byte: u64) -> usize {
        let bytes = self.body.as_bytes();
        let mut pos = usize::try_from(byte).unwrap_or(bytes.len()).min(bytes.len());
        while pos < bytes.len() && matches!(bytes[pos], b'\r' | b'\n') {
            pos += 1;
        }
        let newlines = bytes[..pos].iter().filter(|&&b| b == b'\n').count();
        self.skipped_lines + newlines + 1
    }
}

fn detect_delimiter(header_line: &str) -> u8 {
    if header_line.contains('\t') {
        b'\t'
    } else if header_line.contains('|') {
        b'|'
    } else {
        b','
    }
}
