// Permission export loading

use std::collections::{HashMap, HashSet};
use std::io::{Cursor, Read};
use std::path::Path;

use tracing::{error, warn};

use crate::config::{AnalysisConfig, ColumnAliases, Field};
use crate::error::{PolecheckError, Result};
use crate::geo::{parse_latitude, parse_longitude};
use crate::model::{LoadStats, PermissionRecord};

/// Lazy, single-pass record stream over a delimited source.
///
/// Malformed rows (field count differs from the header) are skipped and
/// counted in [`LoadStats`]; iteration never fails.
pub struct Records<R: Read> {
    reader: csv::Reader<R>,
    columns: HashMap<Field, usize>,
    header_len: usize,
    record: csv::StringRecord,
    stats: LoadStats,
    done: bool,
}

impl<R: Read> Records<R> {
    /// Read the header and resolve recognized columns. Only a failure to
    /// read the header is an error.
    pub fn new(source: R, delimiter: u8, aliases: &ColumnAliases) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(true)
            .flexible(true)
            .from_reader(source);

        let headers: Vec<String> = reader.headers()?.iter().map(normalize_header).collect();
        let (columns, missing) = resolve_columns(&headers, aliases);

        for field in &missing {
            warn!(column = field.as_str(), "recognized column not found; values default to empty");
        }

        Ok(Self {
            reader,
            columns,
            header_len: headers.len(),
            record: csv::StringRecord::new(),
            stats: LoadStats {
                missing_columns: missing,
                ..LoadStats::default()
            },
            done: false,
        })
    }

    pub fn stats(&self) -> &LoadStats {
        &self.stats
    }

    pub fn into_stats(self) -> LoadStats {
        self.stats
    }

    fn build(&mut self, line: usize) -> PermissionRecord {
        let get = |field: Field| -> String {
            self.columns
                .get(&field)
                .and_then(|&i| self.record.get(i))
                .unwrap_or("")
                .trim()
                .to_string()
        };

        let latitude = parse_latitude(&get(Field::Latitude));
        let longitude = parse_longitude(&get(Field::Longitude));
        let record = PermissionRecord {
            line,
            property_id: get(Field::PropertyId),
            pole_number: get(Field::PoleNumber),
            status: get(Field::Status),
            agent_name: get(Field::AgentName),
            address: get(Field::Address),
            latitude,
            longitude,
            survey_date: get(Field::SurveyDate),
        };

        self.stats.tally(&record);
        record
    }
}

impl<R: Read> Iterator for Records<R> {
    type Item = PermissionRecord;

    fn next(&mut self) -> Option<PermissionRecord> {
        while !self.done {
            match self.reader.read_record(&mut self.record) {
                Ok(false) => self.done = true,
                Ok(true) => {
                    self.stats.rows_read += 1;
                    let line = self.record.position().map(|p| p.line() as usize).unwrap_or(0);
                    if self.record.len() != self.header_len {
                        self.stats.malformed_rows += 1;
                        warn!(
                            line,
                            fields = self.record.len(),
                            expected = self.header_len,
                            "skipping malformed row"
                        );
                        continue;
                    }
                    return Some(self.build(line));
                }
                Err(e) => {
                    self.stats.rows_read += 1;
                    self.stats.malformed_rows += 1;
                    if let csv::ErrorKind::Io(_) = e.kind() {
                        // The reader cannot make progress after an I/O failure.
                        error!(error = %e, "input stream failed; stopping load");
                        self.done = true;
                    } else {
                        warn!(error = %e, "skipping unparseable row");
                    }
                }
            }
        }
        None
    }
}

/// Open a file, decode it and sniff the delimiter unless the config fixes one.
pub fn open_path(path: &Path, config: &AnalysisConfig) -> Result<Records<Cursor<Vec<u8>>>> {
    let bytes = std::fs::read(path).map_err(|source| PolecheckError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    from_bytes(bytes, config)
}

/// Drain a reader, decode it and build a record stream.
pub fn open_reader<R: Read>(mut source: R, config: &AnalysisConfig) -> Result<Records<Cursor<Vec<u8>>>> {
    let mut bytes = Vec::new();
    source.read_to_end(&mut bytes).map_err(PolecheckError::ReadInput)?;
    from_bytes(bytes, config)
}

fn from_bytes(bytes: Vec<u8>, config: &AnalysisConfig) -> Result<Records<Cursor<Vec<u8>>>> {
    let text = decode_text(bytes);
    let delimiter = config
        .input
        .delimiter
        .as_byte()
        .unwrap_or_else(|| sniff_delimiter(&text, &config.columns));
    Records::new(Cursor::new(text.into_bytes()), delimiter, &config.columns)
}

/// UTF-8 first; on failure fall back to Windows-1252 (Excel exports).
/// A leading BOM is dropped.
pub fn decode_text(bytes: Vec<u8>) -> String {
    let text = match String::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => {
            let bytes = e.into_bytes();
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(&bytes);
            decoded.into_owned()
        }
    };
    match text.strip_prefix('\u{feff}') {
        Some(rest) => rest.to_string(),
        None => text,
    }
}

/// Pick the delimiter whose header split names the most recognized columns.
///
/// Candidates are tab, semicolon and comma. Ties (including no recognized
/// column at all) go to the candidate whose header field count repeats on
/// the most sample lines; the header must split into more than one field.
/// Falls back to comma.
pub fn sniff_delimiter(content: &str, aliases: &ColumnAliases) -> u8 {
    let candidates: &[u8] = &[b'\t', b';', b','];
    let sample_lines: Vec<&str> = content.lines().filter(|l| !l.trim().is_empty()).take(10).collect();
    let Some((header, _)) = sample_lines.split_first() else {
        return b',';
    };

    let known: HashSet<String> = Field::ALL
        .iter()
        .flat_map(|&f| aliases.for_field(f))
        .map(|a| normalize_header(a))
        .filter(|a| !a.is_empty())
        .collect();

    let mut best = b',';
    let mut best_score = (0usize, 0usize);

    for &delim in candidates {
        let header_cells = split_line(header, delim);
        if header_cells.len() < 2 {
            continue;
        }
        let recognized = header_cells
            .iter()
            .filter(|cell| known.contains(&normalize_header(cell)))
            .count();
        let consistent = sample_lines
            .iter()
            .filter(|line| split_line(line, delim).len() == header_cells.len())
            .count();
        let score = (recognized, consistent * header_cells.len());

        if score > best_score {
            best_score = score;
            best = delim;
        }
    }

    best
}

fn split_line(line: &str, delimiter: u8) -> Vec<String> {
    csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(line.as_bytes())
        .records()
        .next()
        .and_then(|r| r.ok())
        .map(|r| r.iter().map(str::to_string).collect())
        .unwrap_or_default()
}

fn normalize_header(raw: &str) -> String {
    raw.trim_start_matches('\u{feff}')
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Map each field to a header position. Aliases are tried in order, so an
/// earlier alias beats a later one even if the later column comes first.
fn resolve_columns(headers: &[String], aliases: &ColumnAliases) -> (HashMap<Field, usize>, Vec<String>) {
    let mut columns = HashMap::new();
    let mut missing = Vec::new();

    for field in Field::ALL {
        let found = aliases
            .for_field(field)
            .iter()
            .map(|alias| normalize_header(alias))
            .filter(|alias| !alias.is_empty())
            .find_map(|alias| headers.iter().position(|h| *h == alias));

        match found {
            Some(idx) => {
                columns.insert(field, idx);
            }
            None => missing.push(field.name().to_string()),
        }
    }

    (columns, missing)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "Property ID,Pole Number,Status,Location Address,Latitude,Longitude,Survey Date,Field Agent Name";

    fn load(csv: &str) -> (Vec<PermissionRecord>, LoadStats) {
        let mut records = open_reader(csv.as_bytes(), &AnalysisConfig::default()).unwrap();
        let rows: Vec<_> = records.by_ref().collect();
        (rows, records.into_stats())
    }

    #[test]
    fn load_basic() {
        let csv = format!(
            "{HEADER}\n\
             1001,LAW.P.B167,Pole Permission: Approved,12 Main Rd,-26.38,27.81,2025-05-01 10:00:00,Alice\n\
             1002,LAW.P.B168, Pole Permission: Pending ,14 Main Rd,,,2025-05-02,\n"
        );
        let (rows, stats) = load(&csv);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].line, 2);
        assert_eq!(rows[0].pole_number, "LAW.P.B167");
        assert_eq!(rows[0].agent_name, "Alice");
        assert_eq!(rows[0].latitude, Some(-26.38));
        assert_eq!(rows[1].status, "Pole Permission: Pending");
        assert_eq!(rows[1].latitude, None);
        assert_eq!(stats.rows_loaded, 2);
        assert_eq!(stats.missing_coordinates, 1);
        assert_eq!(stats.missing_agents, 1);
        assert_eq!(stats.missing_status, 0);
        assert_eq!(stats.approved_rows, 1);
        assert_eq!(stats.approved_without_agent, 0);
        assert!(stats.missing_columns.is_empty());
    }

    #[test]
    fn malformed_rows_are_skipped_and_counted() {
        let csv = format!(
            "{HEADER}\n\
             1001,P1,Approved,A1,-26.0,27.0,2025-05-01,Alice\n\
             1002,P1,Approved\n\
             1003,P1,Approved,A1,-26.0,27.0,2025-05-01,Bob\n"
        );
        let (rows, stats) = load(&csv);
        assert_eq!(rows.len(), 2);
        assert_eq!(stats.rows_read, 3);
        assert_eq!(stats.malformed_rows, 1);
        assert_eq!(rows[1].line, 4);
    }

    #[test]
    fn headers_are_case_and_whitespace_tolerant() {
        let csv = "  POLE   number ,location address,FIELD AGENT NAME (POLE PERMISSION),status\n\
                   P9,Somewhere,Dineo,Approved\n";
        let (rows, stats) = load(csv);
        assert_eq!(rows[0].pole_number, "P9");
        assert_eq!(rows[0].address, "Somewhere");
        assert_eq!(rows[0].agent_name, "Dineo");
        assert!(stats.missing_columns.contains(&"latitude".to_string()));
        assert!(stats.missing_columns.contains(&"survey_date".to_string()));
        assert_eq!(rows[0].survey_date, "");
    }

    #[test]
    fn unknown_columns_ignored() {
        let csv = "Pole Number,Flow Name Groups,Status\nP1,Survey|Permission,Approved\n";
        let (rows, _) = load(csv);
        assert_eq!(rows[0].pole_number, "P1");
        assert_eq!(rows[0].status, "Approved");
    }

    #[test]
    fn semicolon_input_is_sniffed() {
        let csv = "Pole Number;Location Address;Latitude;Longitude\nP1;12 Main Rd, Lawley;-26.1;27.1\n";
        let (rows, stats) = load(csv);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].address, "12 Main Rd, Lawley");
        assert_eq!(rows[0].longitude, Some(27.1));
        assert_eq!(stats.malformed_rows, 0);
    }

    #[test]
    fn sniff_falls_back_to_consistent_delimiter() {
        let aliases = ColumnAliases::default();
        assert_eq!(sniff_delimiter("a;b;c\n1;2;3\n", &aliases), b';');
        assert_eq!(sniff_delimiter("a,b,c\n1,2,3\n", &aliases), b',');
        assert_eq!(sniff_delimiter("a\tb\n1\t2\n", &aliases), b'\t');
        assert_eq!(sniff_delimiter("", &aliases), b',');
    }

    #[test]
    fn sniff_prefers_recognized_header_cells() {
        // Commas split every line into three fields, but only the
        // semicolon split yields a known column name.
        let csv = "Pole Number;Location Address, unit, floor\nP1;Main Rd, 4, 2\nP2;Oak Ave, 7, 1\n";
        let aliases = ColumnAliases::default();
        assert_eq!(sniff_delimiter(csv, &aliases), b';');

        let mut custom = ColumnAliases::default();
        custom.pole_number = vec!["Mast".into()];
        assert_eq!(sniff_delimiter("mast|x,status\nP1|a,Approved\n", &custom), b',');
        assert_eq!(sniff_delimiter("Mast\tStatus\nP1\tApproved\n", &custom), b'\t');
    }

    #[test]
    fn bad_coordinates_become_none() {
        let csv = "Pole Number,Latitude,Longitude\nP1,abc,27.0\nP2,-95,27.0\nP3,-26.0,27.0\n";
        let (rows, stats) = load(csv);
        assert_eq!(rows[0].latitude, None);
        assert_eq!(rows[0].longitude, Some(27.0));
        assert_eq!(rows[1].latitude, None);
        assert!(rows[2].gps().is_some());
        assert_eq!(stats.missing_coordinates, 2);
    }

    #[test]
    fn windows_1252_and_bom_are_decoded() {
        let mut bytes = b"Pole Number,Location Address\nP1,Caf".to_vec();
        bytes.push(0xE9); // é in Windows-1252
        bytes.push(b'\n');
        let text = decode_text(bytes);
        assert!(text.contains("Café"));

        let with_bom = "\u{feff}Pole Number,Status\nP1,Approved\n".as_bytes().to_vec();
        let (rows, stats) = load(&decode_text(with_bom));
        assert_eq!(rows[0].pole_number, "P1");
        assert!(!stats.missing_columns.contains(&"pole_number".to_string()));
    }

    #[test]
    fn empty_input_yields_nothing() {
        let (rows, stats) = load("");
        assert!(rows.is_empty());
        assert_eq!(stats.rows_read, 0);
    }

    #[test]
    fn fixed_delimiter_overrides_sniffing() {
        let mut config = AnalysisConfig::default();
        config.input.delimiter = crate::config::Delimiter::Comma;
        let csv = "Pole Number;Status\nP1;Approved\n";
        let mut records = open_reader(csv.as_bytes(), &config).unwrap();
        let rows: Vec<_> = records.by_ref().collect();
        // One column named "pole number;status" → nothing recognized
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].pole_number, "");
        assert_eq!(records.stats().rows_without_pole, 1);
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = open_path(Path::new("/definitely/not/here.csv"), &AnalysisConfig::default())
            .err()
            .unwrap();
        assert!(matches!(err, PolecheckError::Io { .. }));
    }
}
