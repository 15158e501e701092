//! Row copy loop shared by clone and backup.

use async_trait::async_trait;
use tracing::trace;

use crate::core::{row_channel, Catalog, Column, Table};
use crate::error::{CloneError, Result};
use crate::sqlgen::{insertable_columns, SqlGenerator};

/// INSERT text collected before a batch is handed on (256 KiB).
pub const DEFAULT_BATCH_BYTES: usize = 256 * 1024;

/// Destination of rendered INSERT batches.
#[async_trait]
pub(crate) trait BatchSink: Send {
    async fn write_batch(&mut self, batch: String) -> Result<()>;
}

/// Stream the rows of `definition` from `source` into `sink`.
///
/// Rows are rendered as they arrive. Whenever at least `batch_bytes` of
/// INSERT text is pending it is handed to `sink` as one self-contained batch,
/// so memory is bounded by the batch size, not the table size. Returns the
/// number of rows copied.
pub(crate) async fn copy_rows<S: BatchSink>(
    source: &dyn Catalog,
    generator: &SqlGenerator,
    definition: &Table,
    batch_bytes: usize,
    sink: &mut S,
) -> Result<u64> {
    let select = generator.select_rows(definition)?;
    let columns: Vec<Column> = insertable_columns(definition).cloned().collect();
    let mut writer = generator.insert_writer(definition)?;
    let (tx, mut rx) = row_channel();

    let render = async {
        while let Some(row) = rx.recv().await {
            writer.write_row(row.as_slice())?;
            if writer.pending_len() >= batch_bytes {
                if let Some(batch) = writer.take_batch() {
                    trace!("Flushing {} byte batch of {}", batch.len(), definition.table);
                    sink.write_batch(batch).await?;
                }
            }
        }
        if let Some(batch) = writer.take_batch() {
            sink.write_batch(batch).await?;
        }
        Ok::<(), CloneError>(())
    };

    tokio::try_join!(source.stream_rows(&select, &columns, tx), render)?;
    Ok(writer.rows())
}
