//! GB-004: CSV roster and deadline timestamp parsing.

use super::error::Error;
use super::types::{Entries, Entry};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use indexmap::IndexMap;
use std::path::Path;

/// Load a CSV roster from disk.
pub fn load_entries(path: &Path) -> Result<Entries, Error> {
    let file = std::fs::File::open(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::LocalFileMissing(path.display().to_string())
        } else {
            Error::Io(e)
        }
    })?;
    let entries = parse_entries(file).map_err(|source| Error::Csv {
        path: path.display().to_string(),
        source,
    })?;
    tracing::debug!(
        "Loaded {} entries with columns {:?} from {}",
        entries.len(),
        entries.header(),
        path.display()
    );
    Ok(entries)
}

/// Parse a CSV roster (header row required) from any reader.
///
/// Short rows are padded with empty values; columns beyond the header are
/// dropped.
pub fn parse_entries<R: std::io::Read>(reader: R) -> Result<Entries, csv::Error> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(reader);

    let header: Vec<String> = csv_reader.headers()?.iter().map(str::to_string).collect();
    let mut rows = Vec::new();
    for record in csv_reader.records() {
        let record = record?;
        let columns: IndexMap<String, String> = header
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), record.get(i).unwrap_or("").to_string()))
            .collect();
        rows.push(Entry::new(columns));
    }
    Ok(Entries::new(header, rows))
}

/// Parse a deadline: `now`, RFC 3339, or `YYYY-MM-DD[ HH:MM[:SS]]` (UTC).
pub fn parse_deadline(value: &str) -> Result<DateTime<Utc>, Error> {
    parse_deadline_at(value, Utc::now())
}

/// Same as [`parse_deadline`] with an explicit "now".
pub fn parse_deadline_at(value: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>, Error> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("now") {
        return Ok(now);
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(Utc.from_utc_datetime(&midnight));
        }
    }
    Err(Error::InvalidDeadline(value.to_string()))
}
