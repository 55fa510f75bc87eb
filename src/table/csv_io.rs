// src/table/csv_io.rs
use csv::{ReaderBuilder, Writer};
use std::{
    fs::File,
    io::{Read, Write},
    path::{Path, PathBuf},
};
use tempfile::NamedTempFile;
use tracing::{debug, instrument};

use super::Table;
use crate::error::{MigrateError, Result};

/// Read a comma-separated file whose first record is the header.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub fn read_table(path: &Path) -> Result<Table> {
    let file = File::open(path).map_err(|source| MigrateError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let table = read_from(file, path)?;
    debug!(rows = table.len(), columns = table.headers().len(), "loaded table");
    Ok(table)
}

/// Parse CSV from any reader; `source` only labels errors.
pub fn read_from<R: Read>(reader: R, source: &Path) -> Result<Table> {
    let csv_err = |e: csv::Error| MigrateError::Csv {
        path: source.to_path_buf(),
        source: e,
    };

    let mut rdr = ReaderBuilder::new().has_headers(true).from_reader(reader);
    let headers: Vec<String> = rdr
        .headers()
        .map_err(csv_err)?
        .iter()
        .map(str::to_string)
        .collect();

    let mut records: Vec<Vec<String>> = Vec::new();
    for result in rdr.records() {
        let record = result.map_err(csv_err)?;
        records.push(record.iter().map(str::to_string).collect());
    }
    Table::from_records(headers, records)
}

/// Write `table` to `path`, header first, columns in header order.
///
/// The data goes to a temporary file next to `path` which is renamed into
/// place once complete, so a failed write leaves no partial output.
#[instrument(level = "info", skip_all, fields(path = %path.display(), rows = table.len()))]
pub fn write_table(path: &Path, table: &Table) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let tmp = NamedTempFile::new_in(&dir).map_err(|source| MigrateError::Io {
        path: dir.clone(),
        source,
    })?;
    write_to(tmp.as_file(), table, path)?;
    tmp.persist(path)
        .map_err(|e| MigrateError::Io {
            path: path.to_path_buf(),
            source: e.error,
        })?;
    Ok(())
}

/// Serialize `table` as CSV into any writer; `target` only labels errors.
pub fn write_to<W: Write>(writer: W, table: &Table, target: &Path) -> Result<()> {
    let csv_err = |e: csv::Error| MigrateError::Csv {
        path: target.to_path_buf(),
        source: e,
    };

    let mut wtr = Writer::from_writer(writer);
    wtr.write_record(table.headers()).map_err(csv_err)?;
    for row in table.rows() {
        wtr.write_record(table.headers().iter().map(|h| row.get(h)))
            .map_err(csv_err)?;
    }
    wtr.flush().map_err(|source| MigrateError::Io {
        path: target.to_path_buf(),
        source,
    })
}
