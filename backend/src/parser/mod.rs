//! Tabular decoder: uploaded bytes to ordered [`RawRow`]s.
//!
//! Handles encoding and delimiter detection and checks the header against the
//! schema registry. It applies no value constraints; that is the validator's
//! job. Any error here is `MalformedInput` and fails the whole upload.

use std::collections::HashSet;
use std::path::Path;

use crate::error::{DecodeError, DecodeResult};
use crate::models::{EntityKind, RawRow};
use crate::schema;

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Decoded rows plus what was detected along the way.
#[derive(Debug, Clone)]
pub struct ParseResult {
    /// Rows in file order, ascending `row_number`.
    pub rows: Vec<RawRow>,
    /// Detected encoding.
    pub encoding: String,
    /// Detected delimiter.
    pub delimiter: char,
    /// Header cells as written in the file.
    pub headers: Vec<String>,
    /// Header cells that matched no column of the kind.
    pub ignored_columns: Vec<String>,
}

/// Decode an upload into rows for `kind`.
pub fn decode(bytes: &[u8], kind: EntityKind) -> DecodeResult<Vec<RawRow>> {
    decode_with_metadata(bytes, kind).map(|r| r.rows)
}

/// Decode a file from disk.
pub fn decode_file<P: AsRef<Path>>(path: P, kind: EntityKind) -> DecodeResult<ParseResult> {
    let bytes = std::fs::read(path.as_ref())?;
    decode_with_metadata(&bytes, kind)
}

/// Detect the encoding of raw bytes using chardet
pub fn detect_encoding(bytes: &[u8]) -> String {
    let charset = chardet::detect(bytes).0;

    match charset.to_lowercase().as_str() {
        "ascii" | "utf-8" | "utf8" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        other => other.to_string(),
    }
}

/// Decode bytes to a string using the given encoding label.
pub fn decode_content(bytes: &[u8], encoding: &str) -> DecodeResult<String> {
    match encoding.to_lowercase().as_str() {
        "utf-8" | "utf8" | "ascii" => String::from_utf8(bytes.to_vec())
            .map_err(|_| DecodeError::UnsupportedEncoding("invalid utf-8".to_string())),
        "iso-8859-1" | "latin-1" | "latin1" => {
            Ok(encoding_rs::ISO_8859_15.decode(bytes).0.into_owned())
        }
        "windows-1252" | "cp1252" => Ok(encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned()),
        other => Err(DecodeError::UnsupportedEncoding(other.to_string())),
    }
}

/// Detect the delimiter by counting occurrences in the first line.
///
/// Comma wins ties and is the fallback for single-column files.
pub fn detect_delimiter(content: &str) -> char {
    let first_line = content.lines().find(|l| !l.trim().is_empty()).unwrap_or("");

    let separators = [',', ';', '\t', '|'];
    let mut best_sep = ',';
    let mut best_count = 0;

    for &sep in &separators {
        let count = first_line.matches(sep).count();
        if count > best_count {
            best_count = count;
            best_sep = sep;
        }
    }

    best_sep
}

/// Turn bytes into text, rejecting binary or undecodable content.
fn decode_text(bytes: &[u8]) -> DecodeResult<(String, String)> {
    if bytes.starts_with(&[0xFF, 0xFE]) || bytes.starts_with(&[0xFE, 0xFF]) {
        return Err(DecodeError::UnsupportedEncoding("utf-16".to_string()));
    }
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    if bytes.contains(&0) {
        return Err(DecodeError::BinaryContent);
    }

    if let Ok(text) = std::str::from_utf8(bytes) {
        return Ok((text.to_string(), "utf-8".to_string()));
    }

    let encoding = detect_encoding(bytes);
    let text = decode_content(bytes, &encoding)?;
    Ok((text, encoding))
}

/// Maps record byte offsets to 1-based physical line numbers.
///
/// A record's reported offset can precede line terminators skipped before
/// it, so those are stepped over before counting.
struct LineCounter<'a> {
    text: &'a [u8],
    byte: usize,
    line: u64,
}

impl<'a> LineCounter<'a> {
    fn new(text: &'a str) -> Self {
        Self { text: text.as_bytes(), byte: 0, line: 1 }
    }

    fn line_at(&mut self, offset: u64) -> u64 {
        let mut start = (offset as usize).min(self.text.len());
        while start < self.text.len() && matches!(self.text[start], b'\n' | b'\r') {
            start += 1;
        }
        if start > self.byte {
            let newlines = self.text[self.byte..start].iter().filter(|&&b| b == b'\n').count();
            self.line += newlines as u64;
            self.byte = start;
        }
        self.line
    }
}

fn parse_error(err: csv::Error) -> DecodeError {
    DecodeError::Parse {
        line: err.position().map(|p| p.line()).unwrap_or(0),
        message: err.to_string(),
    }
}

/// Decode with detection metadata.
pub fn decode_with_metadata(bytes: &[u8], kind: EntityKind) -> DecodeResult<ParseResult> {
    let (text, encoding) = decode_text(bytes)?;
    if text.trim().is_empty() {
        return Err(DecodeError::EmptyInput);
    }

    let delimiter = detect_delimiter(&text);
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter as u8)
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let mut records = reader.records();
    let mut lines = LineCounter::new(&text);

    let header = records
        .next()
        .ok_or(DecodeError::MissingHeader)?
        .map_err(parse_error)?;
    let header_line = header.position().map(|p| lines.line_at(p.byte())).unwrap_or(1);
    let headers: Vec<String> = header.iter().map(str::to_string).collect();
    if headers.iter().all(|h| h.is_empty()) {
        return Err(DecodeError::MissingHeader);
    }

    // Header position -> canonical column name; first occurrence wins.
    let mut seen: HashSet<&'static str> = HashSet::new();
    let mut ignored_columns = Vec::new();
    let positions: Vec<Option<&'static str>> = headers
        .iter()
        .map(|cell| {
            let normalized = cell.to_lowercase();
            match schema::column(kind, &normalized) {
                Some(col) if seen.insert(col.name) => Some(col.name),
                Some(_) => None,
                None => {
                    if !cell.is_empty() {
                        ignored_columns.push(cell.clone());
                    }
                    None
                }
            }
        })
        .collect();

    let missing: Vec<String> = schema::required_columns(kind)
        .into_iter()
        .filter(|name| !seen.contains(name))
        .map(str::to_string)
        .collect();
    if !missing.is_empty() {
        return Err(DecodeError::MissingColumns { columns: missing });
    }

    let mut rows = Vec::new();
    let mut fallback_line = header_line;
    for record in records {
        let record = record.map_err(parse_error)?;
        let line = record
            .position()
            .map(|p| lines.line_at(p.byte()))
            .unwrap_or(fallback_line + 1);
        fallback_line = line;

        if record.iter().all(|cell| cell.is_empty()) {
            continue;
        }

        let mut row = RawRow::new((line - header_line) as usize);
        for (idx, name) in positions.iter().enumerate() {
            if let Some(name) = name {
                let value = record.get(idx).unwrap_or("");
                row.fields.insert((*name).to_string(), value.to_string());
            }
        }
        rows.push(row);
    }

    Ok(ParseResult {
        rows,
        encoding,
        delimiter,
        headers,
        ignored_columns,
    })
}
