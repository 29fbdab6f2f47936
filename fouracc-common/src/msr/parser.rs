//! Line-oriented state machine for MSR files

use std::fmt;
use std::io::BufRead;
use std::num::ParseFloatError;
use std::time::Duration;

use chrono::NaiveDateTime;
use thiserror::Error;
use tracing::debug;

use super::{Column, ColumnData, MsrFile, TIME_COLUMN};

const START_TIME_FORMAT: &str = "%Y-%m-%d;%H:%M:%S";
const ROW_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";
const DELIMITER: char = ';';

/// Section of an MSR file, selected by a `*MARKER` line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Section {
    #[default]
    Undefined,
    Creator,
    StartTime,
    Module,
    Name,
    TimeDelay,
    Channel,
    Unit,
    Limits,
    Calibration,
    Data,
    Unknown,
}

impl Section {
    fn from_marker(marker: &str) -> Self {
        match marker {
            "*CREATOR" => Section::Creator,
            "*STARTTIME" => Section::StartTime,
            "*MODUL" => Section::Module,
            "*NAME" => Section::Name,
            "*TIMEDELAY" => Section::TimeDelay,
            "*CHANNEL" => Section::Channel,
            "*UNIT" => Section::Unit,
            "*LIMITS" => Section::Limits,
            "*CALIBRATION" => Section::Calibration,
            "*DATA" => Section::Data,
            _ => Section::Unknown,
        }
    }

    fn marker(&self) -> &'static str {
        match self {
            Section::Undefined => "<no section>",
            Section::Creator => "*CREATOR",
            Section::StartTime => "*STARTTIME",
            Section::Module => "*MODUL",
            Section::Name => "*NAME",
            Section::TimeDelay => "*TIMEDELAY",
            Section::Channel => "*CHANNEL",
            Section::Unit => "*UNIT",
            Section::Limits => "*LIMITS",
            Section::Calibration => "*CALIBRATION",
            Section::Data => "*DATA",
            Section::Unknown => "<unknown section>",
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.marker())
    }
}

/// MSR parse failure
#[derive(Debug, Error)]
pub enum ParseError {
    /// A line could not be interpreted in its section
    #[error("line {line} in {section}: {kind}")]
    Syntax {
        /// 1-based line number
        line: usize,
        section: Section,
        kind: SyntaxError,
    },

    /// A mandatory section never appeared
    #[error("missing {0} section")]
    MissingSection(Section),

    #[error("could not scan MSR file: {0}")]
    Io(#[from] std::io::Error),
}

impl ParseError {
    /// 1-based line of the fault, when attributable to a line
    pub fn line(&self) -> Option<usize> {
        match self {
            ParseError::Syntax { line, .. } => Some(*line),
            _ => None,
        }
    }

    /// Section active when the fault was detected
    pub fn section(&self) -> Option<Section> {
        match self {
            ParseError::Syntax { section, .. } => Some(*section),
            ParseError::MissingSection(section) => Some(*section),
            ParseError::Io(_) => None,
        }
    }
}

/// What went wrong on a single line
#[derive(Debug, Error)]
pub enum SyntaxError {
    #[error("could not parse start-time {text:?}: {source}")]
    StartTime {
        text: String,
        source: chrono::ParseError,
    },

    #[error("start-time declared more than once")]
    DuplicateStartTime,

    #[error("column description before *MODUL")]
    NoColumns,

    #[error("{found} fields for {expected} columns")]
    TooManyFields { found: usize, expected: usize },

    #[error("could not parse #{index}-th time-delay {text:?}")]
    TimeDelay { index: usize, text: String },

    #[error("could not parse data row[{row}] {text:?}: {source}")]
    Timestamp {
        row: usize,
        text: String,
        source: chrono::ParseError,
    },

    #[error("could not parse float {token:?} in row {row}: {source}")]
    Float {
        row: usize,
        token: String,
        source: ParseFloatError,
    },
}

/// Parses an MSR stream.
///
/// Partial results are never returned: any malformed line aborts the parse.
pub fn parse<R: BufRead>(reader: R) -> Result<MsrFile, ParseError> {
    let mut state = ParserState::default();

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        if text.starts_with('*') {
            state.section = Section::from_marker(text);
            continue;
        }
        let section = state.section;
        state.consume(text).map_err(|kind| ParseError::Syntax {
            line: idx + 1,
            section,
            kind,
        })?;
    }

    let start = state
        .start
        .ok_or(ParseError::MissingSection(Section::StartTime))?;
    debug!(
        columns = state.columns.len(),
        rows = state.rows,
        "parsed MSR stream"
    );
    Ok(MsrFile {
        start,
        columns: state.columns,
    })
}

#[derive(Default)]
struct ParserState {
    section: Section,
    start: Option<NaiveDateTime>,
    columns: Vec<Column>,
    rows: usize,
}

impl ParserState {
    fn consume(&mut self, text: &str) -> Result<(), SyntaxError> {
        let tokens: Vec<&str> = text.split(DELIMITER).collect();
        match self.section {
            Section::Undefined
            | Section::Unknown
            | Section::Creator
            | Section::Name
            | Section::Limits
            | Section::Calibration => Ok(()),
            Section::StartTime => self.start_time(text),
            Section::Module => {
                self.module(&tokens);
                Ok(())
            }
            Section::TimeDelay => self.time_delay(&tokens),
            Section::Channel => self.channel(&tokens),
            Section::Unit => self.unit(&tokens),
            Section::Data => self.data_row(&tokens),
        }
    }

    fn start_time(&mut self, text: &str) -> Result<(), SyntaxError> {
        if self.start.is_some() {
            return Err(SyntaxError::DuplicateStartTime);
        }
        let trimmed = text.trim_end_matches(DELIMITER);
        let start = NaiveDateTime::parse_from_str(trimmed, START_TIME_FORMAT).map_err(|source| {
            SyntaxError::StartTime {
                text: text.to_string(),
                source,
            }
        })?;
        self.start = Some(start);
        Ok(())
    }

    fn module(&mut self, tokens: &[&str]) {
        self.columns = tokens[..significant_fields(tokens)]
            .iter()
            .enumerate()
            .map(|(i, tok)| {
                let data = match i {
                    0 => ColumnData::Timestamps(Vec::new()),
                    _ => ColumnData::Numeric(Vec::new()),
                };
                Column::new(tok, data)
            })
            .collect();
    }

    fn described_columns(&mut self, found: usize) -> Result<&mut [Column], SyntaxError> {
        if self.columns.is_empty() {
            return Err(SyntaxError::NoColumns);
        }
        if found > self.columns.len() {
            return Err(SyntaxError::TooManyFields {
                found,
                expected: self.columns.len(),
            });
        }
        Ok(&mut self.columns)
    }

    fn time_delay(&mut self, tokens: &[&str]) -> Result<(), SyntaxError> {
        let columns = self.described_columns(significant_fields(tokens))?;
        let unit = tokens[0];
        for (i, tok) in tokens.iter().enumerate().skip(1) {
            if tok.is_empty() {
                continue;
            }
            columns[i].time_delay = parse_delay(tok, unit).ok_or_else(|| SyntaxError::TimeDelay {
                index: i,
                text: format!("{}{}", tok, unit),
            })?;
        }
        Ok(())
    }

    fn channel(&mut self, tokens: &[&str]) -> Result<(), SyntaxError> {
        let columns = self.described_columns(significant_fields(tokens))?;
        for (col, tok) in columns.iter_mut().zip(tokens) {
            col.name = match *tok {
                "TIME" => TIME_COLUMN.to_string(),
                name => name.to_string(),
            };
        }
        Ok(())
    }

    fn unit(&mut self, tokens: &[&str]) -> Result<(), SyntaxError> {
        let columns = self.described_columns(significant_fields(tokens))?;
        for (col, tok) in columns.iter_mut().zip(tokens).skip(1) {
            col.unit = tok.to_string();
        }
        Ok(())
    }

    fn data_row(&mut self, tokens: &[&str]) -> Result<(), SyntaxError> {
        let row = self.rows;
        let found = significant_fields(tokens);
        let columns = self.described_columns(found)?;

        let time = NaiveDateTime::parse_from_str(tokens[0], ROW_TIME_FORMAT).map_err(|source| {
            SyntaxError::Timestamp {
                row,
                text: tokens.join(";"),
                source,
            }
        })?;

        // Parse the whole row before touching any column so a bad token
        // cannot leave columns of unequal length behind.
        let mut values = Vec::with_capacity(columns.len().saturating_sub(1));
        for (i, col) in columns.iter().enumerate().skip(1) {
            let tok = tokens.get(i).copied().unwrap_or("");
            let value = if tok.is_empty() {
                match &col.data {
                    ColumnData::Numeric(vs) => vs.last().copied().unwrap_or(0.0),
                    ColumnData::Timestamps(_) => 0.0,
                }
            } else {
                tok.parse::<f64>().map_err(|source| SyntaxError::Float {
                    row,
                    token: tok.to_string(),
                    source,
                })?
            };
            values.push(value);
        }

        if let ColumnData::Timestamps(ts) = &mut columns[0].data {
            ts.push(time);
        }
        for (col, value) in columns.iter_mut().skip(1).zip(values) {
            if let ColumnData::Numeric(vs) = &mut col.data {
                vs.push(value);
            }
        }
        self.rows += 1;
        Ok(())
    }
}

/// Field count ignoring trailing empty fields (rows often end with `;`)
fn significant_fields(tokens: &[&str]) -> usize {
    tokens
        .iter()
        .rposition(|tok| !tok.is_empty())
        .map_or(1, |last| last + 1)
}

fn parse_delay(value: &str, unit: &str) -> Option<Duration> {
    let value: f64 = value.trim().parse().ok()?;
    let scale = match unit.trim() {
        "ns" => 1e-9,
        "us" | "µs" | "μs" => 1e-6,
        "ms" => 1e-3,
        "s" => 1.0,
        "m" => 60.0,
        "h" => 3600.0,
        _ => return None,
    };
    Duration::try_from_secs_f64(value * scale).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const HEADER: &str = "*CREATOR\nMSR Electronics GmbH;MSR145\n*STARTTIME\n2019-05-03;10:00:00;\n";

    fn parse_str(text: &str) -> Result<MsrFile, ParseError> {
        parse(Cursor::new(text.as_bytes()))
    }

    #[test]
    fn test_section_markers() {
        assert_eq!(Section::from_marker("*MODUL"), Section::Module);
        assert_eq!(Section::from_marker("*DATA"), Section::Data);
        assert_eq!(Section::from_marker("*WHATEVER"), Section::Unknown);
        assert_eq!(Section::Channel.to_string(), "*CHANNEL");
    }

    #[test]
    fn test_trailing_empty_fields_ignored() {
        assert_eq!(significant_fields(&["a", "b", "", ""]), 2);
        assert_eq!(significant_fields(&["a", "", "c"]), 3);
        assert_eq!(significant_fields(&[""]), 1);
    }

    #[test]
    fn test_parse_delay_units() {
        assert_eq!(parse_delay("250", "ms"), Some(Duration::from_millis(250)));
        assert_eq!(parse_delay("2", "s"), Some(Duration::from_secs(2)));
        assert_eq!(parse_delay("2", "fortnights"), None);
        assert_eq!(parse_delay("-1", "s"), None);
    }

    #[test]
    fn test_duplicate_start_time() {
        let text = format!("{}2019-05-03;11:00:00;\n", HEADER);
        let err = parse_str(&text).unwrap_err();
        assert_eq!(err.line(), Some(5));
        assert!(matches!(
            err,
            ParseError::Syntax {
                kind: SyntaxError::DuplicateStartTime,
                ..
            }
        ));
    }

    #[test]
    fn test_missing_start_time() {
        let err = parse_str("*CREATOR\nsomeone\n").unwrap_err();
        assert!(matches!(
            err,
            ParseError::MissingSection(Section::StartTime)
        ));
    }

    #[test]
    fn test_channel_before_module() {
        let text = format!("{}*CHANNEL\nTIME;ACC x\n", HEADER);
        let err = parse_str(&text).unwrap_err();
        assert_eq!(err.section(), Some(Section::Channel));
        assert!(matches!(
            err,
            ParseError::Syntax {
                kind: SyntaxError::NoColumns,
                ..
            }
        ));
    }
}
