//! CSV / TSV → GFM table.
//!
//! The first row is the header. Ragged rows are padded to the widest row,
//! cell pipes are escaped and embedded newlines become `<br>`.

use super::{decode_text, file_stem, looks_like_text};
use crate::error::Any2MdError;
use crate::output::{ConfigMap, RawResult};
use crate::registry::{Converter, ConverterConfig, ConverterInput};
use async_trait::async_trait;
use tracing::debug;

const MAX_SIZE: usize = 100 * 1024 * 1024;
const DELIMITERS: [char; 4] = [',', ';', '\t', '|'];

pub struct CsvConverter {
    config: ConverterConfig,
}

impl CsvConverter {
    pub fn new() -> Self {
        Self {
            config: ConverterConfig::new("csv")
                .extensions(&["csv", "tsv"])
                .mime_types(&["text/csv", "text/tab-separated-values"])
                .max_size(MAX_SIZE),
        }
    }
}

impl Default for CsvConverter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Converter for CsvConverter {
    fn config(&self) -> &ConverterConfig {
        &self.config
    }

    fn validate(&self, input: &ConverterInput) -> bool {
        looks_like_text(input)
    }

    async fn convert(
        &self,
        input: ConverterInput,
        name: &str,
        _api_key: Option<&str>,
        options: &ConfigMap,
    ) -> Result<RawResult, Any2MdError> {
        let text = decode_text(&input, "csv")?;
        let delimiter = match options.get("delimiter").and_then(|v| v.as_str()) {
            Some(d) if d.len() == 1 => d.as_bytes()[0],
            Some("\\t") | Some("tab") => b'\t',
            _ if name.to_lowercase().ends_with(".tsv") => b'\t',
            _ => detect_delimiter(&text) as u8,
        };
        debug!("Parsing {} with delimiter {:?}", name, delimiter as char);

        let rows = read_rows(&text, delimiter)?;
        if rows.is_empty() {
            return Ok(RawResult::markdown("").with_metadata("rows", 0).with_metadata("columns", 0));
        }
        let columns = rows.iter().map(Vec::len).max().unwrap_or(0);
        let table = to_markdown_table(&rows, columns);

        Ok(RawResult::markdown(format!("# {}\n\n{}", file_stem(name), table))
            .with_metadata("rows", rows.len() - 1)
            .with_metadata("columns", columns)
            .with_metadata("delimiter", (delimiter as char).to_string()))
    }
}

/// The candidate delimiter that occurs most often on the first line.
fn detect_delimiter(text: &str) -> char {
    let first_line = text.lines().next().unwrap_or_default();
    DELIMITERS
        .iter()
        .copied()
        .max_by_key(|d| first_line.matches(*d).count())
        .filter(|d| first_line.contains(*d))
        .unwrap_or(',')
}

fn read_rows(text: &str, delimiter: u8) -> Result<Vec<Vec<String>>, Any2MdError> {
    let mut reader = ::csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(text.as_bytes());

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| Any2MdError::conversion_failed("csv", e))?;
        let row: Vec<String> = record.iter().map(|f| f.trim().to_string()).collect();
        if row.iter().any(|c| !c.is_empty()) {
            rows.push(row);
        }
    }
    Ok(rows)
}

fn to_markdown_table(rows: &[Vec<String>], columns: usize) -> String {
    let mut out = String::new();
    for (i, row) in rows.iter().enumerate() {
        let cells: Vec<String> = (0..columns)
            .map(|c| escape_cell(row.get(c).map(String::as_str).unwrap_or("")))
            .collect();
        out.push_str(&format!("| {} |\n", cells.join(" | ")));
        if i == 0 {
            out.push_str(&format!("|{}\n", " --- |".repeat(columns)));
        }
    }
    out
}

fn escape_cell(cell: &str) -> String {
    cell.replace('|', "\\|")
        .replace("\r\n", "<br>")
        .replace('\n', "<br>")
}
