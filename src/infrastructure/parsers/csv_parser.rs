use csv::{ByteRecord, Reader, ReaderBuilder};
use encoding_rs::WINDOWS_1252;
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::Path;
use tracing::{debug, info, warn, error};
use crate::domain::{error::IngestionError, models::Row};

const SAMPLE_BYTES: usize = 4096;
const SAMPLE_CHARS: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceEncoding {
    Utf8,
    Latin1,
    Windows1252,
}

impl SourceEncoding {
    /// Tried in this order when sniffing a file.
    pub const CANDIDATES: [SourceEncoding; 3] = [
        SourceEncoding::Utf8,
        SourceEncoding::Latin1,
        SourceEncoding::Windows1252,
    ];

    pub fn label(self) -> &'static str {
        match self {
            SourceEncoding::Utf8 => "utf-8",
            SourceEncoding::Latin1 => "latin-1",
            SourceEncoding::Windows1252 => "cp1252",
        }
    }

    pub fn decode(self, bytes: &[u8]) -> Result<String, IngestionError> {
        match self {
            SourceEncoding::Utf8 => std::str::from_utf8(bytes)
                .map(str::to_string)
                .map_err(|e| IngestionError::Decode(format!("invalid utf-8: {}", e))),
            SourceEncoding::Latin1 => Ok(bytes.iter().map(|&b| b as char).collect()),
            SourceEncoding::Windows1252 => WINDOWS_1252
                .decode_without_bom_handling_and_without_replacement(bytes)
                .map(|s| s.into_owned())
                .ok_or_else(|| IngestionError::Decode("invalid cp1252".to_string())),
        }
    }

    /// Like `decode`, but tolerates a multi-byte sequence cut off at the end of a sample.
    fn decode_sample(self, bytes: &[u8]) -> Result<String, IngestionError> {
        if let SourceEncoding::Utf8 = self {
            if let Err(e) = std::str::from_utf8(bytes) {
                if e.error_len().is_none() {
                    return self.decode(&bytes[..e.valid_up_to()]);
                }
            }
        }
        self.decode(bytes)
    }
}

#[derive(Debug, Clone)]
pub struct CsvLayout {
    pub headers: Vec<String>,
    pub delimiter: u8,
    pub encoding: SourceEncoding,
}

pub fn file_size(path: &Path) -> Result<u64, IngestionError> {
    if !path.exists() {
        error!("File not found: {}", path.display());
        return Err(IngestionError::FileNotFound(path.to_path_buf()));
    }
    let size = std::fs::metadata(path)?.len();
    info!("File size: {} bytes ({:.2} GB)", size, size as f64 / 1024.0 / 1024.0 / 1024.0);
    Ok(size)
}

/// Tab wins only when commas are absent or outnumbered.
pub fn sniff_delimiter(sample: &str) -> u8 {
    let commas = sample.matches(',').count();
    let tabs = sample.matches('\t').count();
    if commas > 0 && commas > tabs {
        b','
    } else if tabs > 0 {
        b'\t'
    } else {
        b','
    }
}

pub fn detect_layout(path: &Path) -> Result<CsvLayout, IngestionError> {
    debug!("Reading CSV headers from {}", path.display());
    if !path.exists() {
        error!("File not found: {}", path.display());
        return Err(IngestionError::FileNotFound(path.to_path_buf()));
    }

    let mut last_error = String::from("no encoding candidates");
    for encoding in SourceEncoding::CANDIDATES {
        match try_layout(path, encoding) {
            Ok(layout) => {
                info!(
                    "✅ Encoding: {}, delimiter: {:?}, columns: {}",
                    encoding.label(),
                    layout.delimiter as char,
                    layout.headers.len()
                );
                return Ok(layout);
            }
            Err(e) => {
                warn!("Error with {}: {}", encoding.label(), e);
                last_error = e.to_string();
            }
        }
    }

    Err(IngestionError::HeaderDetection(last_error))
}

fn try_layout(path: &Path, encoding: SourceEncoding) -> Result<CsvLayout, IngestionError> {
    let mut sample_bytes = Vec::with_capacity(SAMPLE_BYTES);
    File::open(path)?
        .take(SAMPLE_BYTES as u64)
        .read_to_end(&mut sample_bytes)?;
    let sample: String = encoding
        .decode_sample(&sample_bytes)?
        .chars()
        .take(SAMPLE_CHARS)
        .collect();
    let delimiter = sniff_delimiter(&sample);

    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_path(path)?;
    let mut record = ByteRecord::new();
    if !reader.read_byte_record(&mut record)? {
        return Err(IngestionError::Parse("file has no header row".to_string()));
    }
    let headers = record
        .iter()
        .map(|field| encoding.decode(field))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(CsvLayout { headers, delimiter, encoding })
}

/// Streams data rows of a file, header excluded, in source order.
pub struct RowReader<R: Read> {
    reader: Reader<R>,
    encoding: SourceEncoding,
    record: ByteRecord,
}

impl RowReader<File> {
    pub fn open(path: &Path, layout: &CsvLayout) -> Result<Self, IngestionError> {
        let reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .delimiter(layout.delimiter)
            .from_path(path)
            .map_err(|e| {
                error!("Failed to open {}: {}", path.display(), e);
                IngestionError::from(e)
            })?;
        Ok(Self::new(reader, layout.encoding))
    }
}

impl<R: Read> RowReader<R> {
    pub fn new(reader: Reader<R>, encoding: SourceEncoding) -> Self {
        Self {
            reader,
            encoding,
            record: ByteRecord::new(),
        }
    }
}

impl<R: Read> Iterator for RowReader<R> {
    type Item = Result<Row, IngestionError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.reader.read_byte_record(&mut self.record) {
            Ok(false) => None,
            Ok(true) => {
                let line = self.record.position().map(|p| p.line()).unwrap_or(0);
                let row = self
                    .record
                    .iter()
                    .map(|field| self.encoding.decode(field))
                    .collect::<Result<Row, _>>()
                    .map_err(|e| {
                        error!("Failed to decode CSV record at line {}: {}", line, e);
                        IngestionError::Decode(format!("line {}: {}", line, e))
                    });
                Some(row)
            }
            Err(e) => {
                error!("Failed to read CSV record: {}", e);
                Some(Err(IngestionError::from(e)))
            }
        }
    }
}

/// Parses an uploaded comma-delimited body, dropping the header row.
pub fn parse_upload(bytes: &[u8]) -> Result<Vec<Row>, IngestionError> {
    let text = std::str::from_utf8(bytes).map_err(|e| {
        warn!("Upload is not valid UTF-8: {}", e);
        IngestionError::InvalidUpload("Uploaded file is not valid UTF-8".to_string())
    })?;

    debug!("Creating CSV reader with headers enabled");
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(Cursor::new(text.as_bytes()));

    let mut rows: Vec<Row> = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| {
            error!("Failed to read CSV record at row {}: {}", rows.len() + 1, e);
            IngestionError::InvalidUpload(format!("Malformed CSV: {}", e))
        })?;
        rows.push(record.iter().map(str::to_string).collect());

        if rows.len() % 1000 == 0 {
            debug!("Processed {} CSV rows", rows.len());
        }
    }

    info!("Parsed {} rows from CSV", rows.len());
    Ok(rows)
}
