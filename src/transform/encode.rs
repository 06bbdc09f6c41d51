//! Record batches to parquet bytes.

use bytes::Bytes;
use datafusion::arrow::datatypes::SchemaRef;
use datafusion::arrow::record_batch::RecordBatch;
use datafusion::parquet::arrow::ArrowWriter;
use datafusion::parquet::basic::Compression;
use datafusion::parquet::file::properties::WriterProperties;
use snafu::prelude::*;

use crate::error::{ParquetEncodeSnafu, TransformError};

/// Encode batches into a single in-memory parquet object.
///
/// The whole object is built before upload so the storage write is a single
/// PUT with no partial-write visibility.
pub(super) fn to_parquet_bytes(
    schema: SchemaRef,
    batches: &[RecordBatch],
) -> Result<Bytes, TransformError> {
    let properties = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();

    let mut buffer = Vec::new();
    let mut writer =
        ArrowWriter::try_new(&mut buffer, schema, Some(properties)).context(ParquetEncodeSnafu)?;
    for batch in batches {
        writer.write(batch).context(ParquetEncodeSnafu)?;
    }
    writer.close().context(ParquetEncodeSnafu)?;

    Ok(Bytes::from(buffer))
}
