//! Output format providers: serialization and part-buffer bookkeeping.

use std::sync::Arc;

use ferrofhir_core::ExportedResource;
use parquet::data_type::{ByteArray, ByteArrayType};
use parquet::file::properties::WriterProperties;
use parquet::file::writer::SerializedFileWriter;
use parquet::schema::parser::parse_message_type;
use parquet::schema::types::Type;

use crate::error::ExportError;
use crate::params::ExportFormat;

/// Serializes read pages into output parts for one partition.
///
/// Providers buffer encoded resources; the writer drains the buffer into
/// object-store parts when the configured thresholds trip. NDJSON parts are
/// plain byte ranges and concatenate into one valid object; Parquet parts
/// are each a complete standalone file, so the Parquet provider does not
/// support multipart assembly.
pub trait ExportProvider: Send {
    /// The format this provider writes.
    fn format(&self) -> ExportFormat;

    /// Whether parts may be concatenated into a single object.
    fn supports_multipart(&self) -> bool;

    /// Appends resources to the current part buffer.
    ///
    /// # Errors
    ///
    /// Returns a serialization error when a resource body fails to encode.
    fn encode(&mut self, items: &[ExportedResource]) -> Result<(), ExportError>;

    /// Resources buffered in the current part.
    fn buffered_count(&self) -> u64;

    /// Approximate bytes buffered in the current part.
    fn buffered_bytes(&self) -> usize;

    /// Drains the buffer into one finished part.
    ///
    /// # Errors
    ///
    /// Returns a format error when the part cannot be finalized.
    fn take_part(&mut self) -> Result<Vec<u8>, ExportError>;
}

/// Constructs the provider for an output format.
#[must_use]
pub fn provider_for(format: ExportFormat) -> Box<dyn ExportProvider> {
    match format {
        ExportFormat::Ndjson => Box::new(NdjsonProvider::new()),
        ExportFormat::Parquet => Box::new(ParquetProvider::new()),
    }
}

/// Newline-delimited JSON output.
#[derive(Debug, Default)]
pub struct NdjsonProvider {
    buffer: Vec<u8>,
    count: u64,
}

impl NdjsonProvider {
    /// Creates an empty provider.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ExportProvider for NdjsonProvider {
    fn format(&self) -> ExportFormat {
        ExportFormat::Ndjson
    }

    fn supports_multipart(&self) -> bool {
        true
    }

    fn encode(&mut self, items: &[ExportedResource]) -> Result<(), ExportError> {
        for item in items {
            let mut line = serde_json::to_vec(&item.body)?;
            line.push(b'\n');
            self.buffer.extend_from_slice(&line);
            self.count += 1;
        }
        Ok(())
    }

    fn buffered_count(&self) -> u64 {
        self.count
    }

    fn buffered_bytes(&self) -> usize {
        self.buffer.len()
    }

    fn take_part(&mut self) -> Result<Vec<u8>, ExportError> {
        self.count = 0;
        Ok(std::mem::take(&mut self.buffer))
    }
}

/// Parquet output: one single-column (`resource` UTF8) file per part.
pub struct ParquetProvider {
    schema: Arc<Type>,
    properties: Arc<WriterProperties>,
    rows: Vec<String>,
    buffered_bytes: usize,
}

impl ParquetProvider {
    /// Creates an empty provider.
    #[must_use]
    pub fn new() -> Self {
        let schema = Arc::new(
            parse_message_type("message export { required binary resource (STRING); }")
                .expect("constant parquet schema"),
        );
        Self {
            schema,
            properties: Arc::new(WriterProperties::builder().build()),
            rows: Vec::new(),
            buffered_bytes: 0,
        }
    }
}

impl Default for ParquetProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl ExportProvider for ParquetProvider {
    fn format(&self) -> ExportFormat {
        ExportFormat::Parquet
    }

    fn supports_multipart(&self) -> bool {
        false
    }

    fn encode(&mut self, items: &[ExportedResource]) -> Result<(), ExportError> {
        for item in items {
            let row = serde_json::to_string(&item.body)?;
            self.buffered_bytes += row.len();
            self.rows.push(row);
        }
        Ok(())
    }

    fn buffered_count(&self) -> u64 {
        self.rows.len() as u64
    }

    fn buffered_bytes(&self) -> usize {
        self.buffered_bytes
    }

    fn take_part(&mut self) -> Result<Vec<u8>, ExportError> {
        let rows = std::mem::take(&mut self.rows);
        self.buffered_bytes = 0;

        let mut writer =
            SerializedFileWriter::new(Vec::new(), self.schema.clone(), self.properties.clone())?;
        {
            let mut row_group = writer.next_row_group()?;
            if let Some(mut column) = row_group.next_column()? {
                let values: Vec<ByteArray> =
                    rows.iter().map(|row| ByteArray::from(row.as_str())).collect();
                column
                    .typed::<ByteArrayType>()
                    .write_batch(&values, None, None)?;
                column.close()?;
            }
            row_group.close()?;
        }

        Ok(writer.into_inner()?)
    }
}
