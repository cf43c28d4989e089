//! Bounded-chunk CSV reading.
//!
//! Source extracts are latin-1 encoded and much larger than memory budgets
//! allow, so a file is exposed as a lazy sequence of [`RowBatch`]es holding
//! at most `chunk_size` rows each. Only the columns named in the dataset's
//! descriptor list survive; cells are kept as raw strings in descriptor order
//! for the transformer.

use std::fs::File;
use std::path::Path;

use csv::ByteRecord;
use encoding_rs::WINDOWS_1252;
use tracing::debug;

use crate::loader::LoadError;
use crate::schema::{descriptors, normalize_column_name, Dataset};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowBatch {
    pub dataset: Dataset,
    pub file_row_offset: u64,
    pub rows: Vec<Vec<String>>,
}

impl RowBatch {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

pub struct ChunkedCsvReader {
    dataset: Dataset,
    chunk_size: usize,
    positions: Vec<usize>,
    reader: csv::Reader<File>,
    record: ByteRecord,
    rows_read: u64,
    finished: bool,
}

impl ChunkedCsvReader {
    pub fn open(path: &Path, dataset: Dataset, chunk_size: usize) -> Result<Self, LoadError> {
        if chunk_size == 0 {
            return Err(LoadError::InvalidConfig(
                "chunk_size must be > 0".to_string(),
            ));
        }

        let file = File::open(path)?;
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(file);

        let header: Vec<String> = reader
            .byte_headers()?
            .iter()
            .map(|cell| normalize_column_name(&decode_latin1(cell)))
            .collect();
        let positions = resolve_positions(path, dataset, &header)?;

        debug!(
            component = "reader",
            event = "reader.open",
            path = %path.display(),
            dataset = dataset.table_name(),
            header_columns = header.len(),
            retained_columns = positions.len(),
            chunk_size
        );

        Ok(Self {
            dataset,
            chunk_size,
            positions,
            reader,
            record: ByteRecord::new(),
            rows_read: 0,
            finished: false,
        })
    }

    pub fn rows_read(&self) -> u64 {
        self.rows_read
    }

    fn read_batch(&mut self) -> Result<Option<RowBatch>, LoadError> {
        let mut rows = Vec::with_capacity(self.chunk_size);
        while rows.len() < self.chunk_size {
            if !self.reader.read_byte_record(&mut self.record)? {
                self.finished = true;
                break;
            }
            let row = self
                .positions
                .iter()
                .map(|idx| self.record.get(*idx).map(decode_latin1).unwrap_or_default())
                .collect();
            rows.push(row);
        }

        if rows.is_empty() {
            return Ok(None);
        }

        let batch = RowBatch {
            dataset: self.dataset,
            file_row_offset: self.rows_read,
            rows,
        };
        self.rows_read += batch.len() as u64;
        Ok(Some(batch))
    }
}

impl Iterator for ChunkedCsvReader {
    type Item = Result<RowBatch, LoadError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.read_batch() {
            Ok(Some(batch)) => Some(Ok(batch)),
            Ok(None) => None,
            Err(err) => {
                self.finished = true;
                Some(Err(err))
            }
        }
    }
}

fn resolve_positions(
    path: &Path,
    dataset: Dataset,
    header: &[String],
) -> Result<Vec<usize>, LoadError> {
    let mut positions = Vec::new();
    let mut missing = Vec::new();

    for descriptor in descriptors(dataset) {
        let wanted = normalize_column_name(descriptor.raw_name);
        match header.iter().position(|name| *name == wanted) {
            Some(idx) => positions.push(idx),
            None => missing.push(descriptor.raw_name.to_string()),
        }
    }

    if !missing.is_empty() {
        return Err(LoadError::SchemaMismatch {
            path: path.to_path_buf(),
            missing,
        });
    }

    Ok(positions)
}

// WHATWG maps the latin-1 label to windows-1252, which agrees with ISO-8859-1
// everywhere except the C1 control range.
fn decode_latin1(bytes: &[u8]) -> String {
    WINDOWS_1252
        .decode_without_bom_handling(bytes)
        .0
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn weather_csv(rows: usize) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "STATION, STATION_NAME,ELEVATION,LATITUDE,LONGITUDE,DATE,REPORTTYPE,HOURLYVISIBILITY,HOURLYDRYBULBTEMPF,HOURLYWETBULBTEMPF,HOURLY DewPointTempF,HOURLYRelativeHumidity,HOURLYPrecip,HOURLYWindSpeed,HOURLYWindDirection,HOURLYWindGustSpeed,HOURLYStationPressure"
        )
        .unwrap();
        for idx in 0..rows {
            writeln!(
                file,
                "WBAN:14751,HARRISBURG INTERNATIONAL AIRPORT PA US,93.6,40.2017,-76.7625,2017-06-01 {:02}:56,FM-15,10.00,70,60,55,58,0.00,7,270,,29.80",
                idx % 24
            )
            .unwrap();
        }
        file
    }

    #[test]
    fn splits_into_bounded_batches_with_offsets() {
        let file = weather_csv(5);
        let mut reader = ChunkedCsvReader::open(file.path(), Dataset::Weather, 2).unwrap();
        let batches: Vec<RowBatch> = reader.by_ref().map(|b| b.unwrap()).collect();

        assert_eq!(batches.len(), 3);
        assert_eq!(
            batches.iter().map(RowBatch::len).collect::<Vec<_>>(),
            vec![2, 2, 1]
        );
        assert_eq!(batches[2].file_row_offset, 4);
        assert_eq!(reader.rows_read(), 5);
    }

    #[test]
    fn retains_descriptor_columns_in_descriptor_order() {
        let file = weather_csv(1);
        let mut reader = ChunkedCsvReader::open(file.path(), Dataset::Weather, 10).unwrap();
        let batch = reader.next().unwrap().unwrap();

        let row = &batch.rows[0];
        assert_eq!(row.len(), descriptors(Dataset::Weather).len());
        assert_eq!(row[0], "WBAN:14751");
        assert_eq!(row[5], "2017-06-01 00:56");
        // REPORTTYPE is not a descriptor column.
        assert_eq!(row[6], "10.00");
        assert!(reader.next().is_none());
    }

    #[test]
    fn missing_required_column_is_schema_mismatch() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "STATION,DATE").unwrap();
        writeln!(file, "WBAN:14751,2017-06-01 00:56").unwrap();

        let err = ChunkedCsvReader::open(file.path(), Dataset::Weather, 10)
            .err()
            .expect("open must fail");
        match err {
            LoadError::SchemaMismatch { missing, .. } => {
                assert!(missing.contains(&"LATITUDE".to_string()));
                assert!(!missing.contains(&"STATION".to_string()));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        let file = weather_csv(1);
        assert!(matches!(
            ChunkedCsvReader::open(file.path(), Dataset::Weather, 0),
            Err(LoadError::InvalidConfig(_))
        ));
    }

    #[test]
    fn latin1_bytes_are_decoded() {
        assert_eq!(decode_latin1(b"San Jos\xe9"), "San José");
    }
}
