//! Timestamp-indexed candle tables and the segment reader that feeds them.

use std::collections::HashSet;
use std::io;
use std::path::Path;

use candles_core::{Timestamp, TS_COLUMN};
use serde::Serialize;

use crate::error::{CacheError, CacheResult};

/// Rows of numeric candle columns indexed by timestamp.
///
/// Row order is the order the rows were stitched in; timestamps are unique.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandleTable {
    columns: Vec<String>,
    index: Vec<Timestamp>,
    rows: Vec<Vec<f64>>,
}

impl CandleTable {
    /// Empty table with the given value columns.
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            index: Vec::new(),
            rows: Vec::new(),
        }
    }

    /// Value column names (the timestamp index is not included).
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn index(&self) -> &[Timestamp] {
        &self.index
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// `(rows, value columns)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.len(), self.columns.len())
    }

    /// Values of the row at `ts`.
    pub fn get(&self, ts: Timestamp) -> Option<&[f64]> {
        let pos = self.index.iter().position(|t| *t == ts)?;
        Some(&self.rows[pos])
    }

    /// All values of one column, in row order.
    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let pos = self.columns.iter().position(|c| c == name)?;
        Some(self.rows.iter().map(|row| row[pos]).collect())
    }

    pub fn iter(&self) -> impl Iterator<Item = (Timestamp, &[f64])> {
        self.index
            .iter()
            .copied()
            .zip(self.rows.iter().map(Vec::as_slice))
    }

    /// Write the table as CSV with a leading `ts` column of epoch seconds.
    pub fn write_csv<W: io::Write>(&self, writer: W) -> csv::Result<()> {
        let mut out = csv::Writer::from_writer(writer);

        let mut header = Vec::with_capacity(self.columns.len() + 1);
        header.push(TS_COLUMN.to_string());
        header.extend(self.columns.iter().cloned());
        out.write_record(&header)?;

        for (ts, values) in self.iter() {
            let mut record = Vec::with_capacity(values.len() + 1);
            record.push(ts.as_secs().to_string());
            record.extend(values.iter().map(f64::to_string));
            out.write_record(&record)?;
        }

        out.flush()?;
        Ok(())
    }

    fn push(&mut self, ts: Timestamp, values: Vec<f64>) {
        self.index.push(ts);
        self.rows.push(values);
    }
}

/// Builds a [`CandleTable`] from segment files read in collection order.
///
/// Keeps only rows with `start <= ts < stop`, and only the first row seen
/// for each timestamp.
pub(crate) struct TableBuilder {
    table: CandleTable,
    start: Timestamp,
    stop: Timestamp,
    seen: HashSet<Timestamp>,
}

impl TableBuilder {
    /// `columns` may mention `ts`; it becomes the index rather than a value
    /// column.
    pub(crate) fn new(columns: &[&str], start: Timestamp, stop: Timestamp) -> Self {
        let columns = columns
            .iter()
            .filter(|c| **c != TS_COLUMN)
            .map(|c| c.to_string())
            .collect();

        Self {
            table: CandleTable::new(columns),
            start,
            stop,
            seen: HashSet::new(),
        }
    }

    /// Project one segment onto the table columns and append its rows.
    pub(crate) fn append_segment(&mut self, path: &Path) -> CacheResult<()> {
        let read_err = |source: csv::Error| CacheError::SegmentRead {
            path: path.to_path_buf(),
            source,
        };

        let mut reader = csv::Reader::from_path(path).map_err(read_err)?;
        let headers = reader.headers().map_err(read_err)?.clone();

        let position = |column: &str| {
            headers
                .iter()
                .position(|h| h == column)
                .ok_or_else(|| CacheError::MissingColumn {
                    path: path.to_path_buf(),
                    column: column.to_string(),
                })
        };
        let ts_pos = position(TS_COLUMN)?;
        let value_pos = self
            .table
            .columns
            .iter()
            .map(|c| position(c.as_str()))
            .collect::<CacheResult<Vec<_>>>()?;

        for (record_no, record) in reader.records().enumerate() {
            let record = record.map_err(read_err)?;
            let record_no = record_no as u64 + 1;

            let invalid = |column: &str, value: &str| CacheError::InvalidValue {
                path: path.to_path_buf(),
                record: record_no,
                column: column.to_string(),
                value: value.to_string(),
            };

            let raw_ts = record.get(ts_pos).unwrap_or("");
            let ts = raw_ts
                .trim()
                .parse::<i64>()
                .map(Timestamp::from_secs)
                .map_err(|_| invalid(TS_COLUMN, raw_ts))?;

            if ts < self.start || ts >= self.stop || !self.seen.insert(ts) {
                continue;
            }

            let mut values = Vec::with_capacity(value_pos.len());
            for (column, pos) in self.table.columns.iter().zip(&value_pos) {
                let raw = record.get(*pos).unwrap_or("");
                let value = raw
                    .trim()
                    .parse::<f64>()
                    .map_err(|_| invalid(column.as_str(), raw))?;
                values.push(value);
            }

            self.table.push(ts, values);
        }

        Ok(())
    }

    pub(crate) fn finish(self) -> CandleTable {
        self.table
    }
}
