//! SQL backups: table structure and data rendered to files, and replay.
//!
//! A backup file is a sequence of batches separated by `GO` lines: the
//! CREATE TABLE of each table, then its rows in bounded INSERT batches that
//! each switch IDENTITY_INSERT on and off themselves.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tracing::{debug, info};

use crate::core::{Catalog, ShallowTable};
use crate::error::{CloneError, Result};
use crate::sqlgen::SqlGenerator;

use super::rows::{copy_rows, BatchSink, DEFAULT_BATCH_BYTES};

/// File written when a backup is not split per table.
pub const SINGLE_FILE_NAME: &str = "0_backup.sql";

/// Line ending a batch in a backup file.
pub const BATCH_SEPARATOR: &str = "GO";

/// Renders tables of one catalog to SQL text and replays backups into it.
pub struct Exporter<'a> {
    catalog: &'a dyn Catalog,
    generator: SqlGenerator,
    batch_bytes: usize,
}

impl<'a> Exporter<'a> {
    pub fn new(catalog: &'a dyn Catalog) -> Self {
        Self {
            catalog,
            generator: SqlGenerator::new(),
            batch_bytes: DEFAULT_BATCH_BYTES,
        }
    }

    /// INSERT text per batch; zero is treated as one byte.
    pub fn with_batch_bytes(mut self, batch_bytes: usize) -> Self {
        self.batch_bytes = batch_bytes.max(1);
        self
    }

    /// Write CREATE TABLE for `table` to `out`, followed by its rows unless
    /// `skip_data`. Rows are streamed; returns how many were written.
    pub async fn write_table<W>(
        &self,
        out: &mut W,
        table: &ShallowTable,
        skip_data: bool,
    ) -> Result<u64>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let definition = self.catalog.load_table(table).await?;

        let create = self.generator.create_table(&definition)?;
        write_batch(out, &create).await?;
        if skip_data {
            return Ok(0);
        }

        let mut batches = FileBatches { out };
        let rows = copy_rows(
            self.catalog,
            &self.generator,
            &definition,
            self.batch_bytes,
            &mut batches,
        )
        .await?;
        debug!("Wrote {} row(s) of {}", rows, table);
        Ok(rows)
    }

    /// Write every table, in order, to one file.
    pub async fn export_to_file(
        &self,
        path: &Path,
        tables: &[ShallowTable],
        skip_data: bool,
    ) -> Result<()> {
        let mut file = BufWriter::new(fs::File::create(path).await?);
        for table in tables {
            self.write_table(&mut file, table, skip_data).await?;
        }
        file.flush().await?;

        info!("Exported {} table(s) to {}", tables.len(), path.display());
        Ok(())
    }

    /// Write a backup into `dir`, one file per table when `split`.
    ///
    /// Split files are named `<index>_<schema>_<table>.sql` with a zero-padded
    /// index starting at 1, so file name order is dependency order. Returns
    /// the files written.
    pub async fn export_to_directory(
        &self,
        dir: &Path,
        tables: &[ShallowTable],
        split: bool,
        skip_data: bool,
    ) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(dir).await?;

        if !split {
            let path = dir.join(SINGLE_FILE_NAME);
            self.export_to_file(&path, tables, skip_data).await?;
            return Ok(vec![path]);
        }

        let mut written = Vec::with_capacity(tables.len());
        for (i, table) in tables.iter().enumerate() {
            let path = dir.join(backup_file_name(i + 1, table));
            self.export_to_file(&path, std::slice::from_ref(table), skip_data)
                .await?;
            written.push(path);
        }

        info!("Exported {} table(s) to {}", tables.len(), dir.display());
        Ok(written)
    }

    /// Execute the backup files in `dir` in index order.
    ///
    /// Every file must be named `<digits>_<anything>.sql`; otherwise nothing
    /// is executed. Each file is read line by line and executed one batch at
    /// a time. Returns the files executed.
    pub async fn import_from_directory(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let mut files: Vec<(u64, PathBuf)> = Vec::new();
        let mut invalid: Vec<String> = Vec::new();

        let mut entries = fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            match backup_index(&name) {
                Some(index) => files.push((index, entry.path())),
                None => invalid.push(name),
            }
        }

        if !invalid.is_empty() {
            invalid.sort();
            return Err(CloneError::Usage(format!(
                "{} contains files that are not backups: {}",
                dir.display(),
                invalid.join(", ")
            )));
        }

        files.sort();
        for (_, path) in &files {
            info!("Importing {}", path.display());
            let batches = self.import_file(path).await?;
            debug!("{}: {} batch(es)", path.display(), batches);
        }

        Ok(files.into_iter().map(|(_, path)| path).collect())
    }

    async fn import_file(&self, path: &Path) -> Result<usize> {
        let mut lines = BufReader::new(fs::File::open(path).await?).lines();
        let mut batch = String::new();
        let mut executed = 0;

        while let Some(line) = lines.next_line().await? {
            if line.trim().eq_ignore_ascii_case(BATCH_SEPARATOR) {
                if !batch.trim().is_empty() {
                    self.catalog.execute(&batch).await?;
                    executed += 1;
                }
                batch.clear();
            } else {
                batch.push_str(&line);
                batch.push('\n');
            }
        }
        if !batch.trim().is_empty() {
            self.catalog.execute(&batch).await?;
            executed += 1;
        }
        Ok(executed)
    }
}

/// Writes INSERT batches to a backup file as they fill.
struct FileBatches<'w, W> {
    out: &'w mut W,
}

#[async_trait]
impl<W> BatchSink for FileBatches<'_, W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn write_batch(&mut self, batch: String) -> Result<()> {
        write_batch(&mut *self.out, &batch).await
    }
}

/// Append `batch` and its separator line.
async fn write_batch<W>(out: &mut W, batch: &str) -> Result<()>
where
    W: AsyncWrite + Unpin + Send,
{
    out.write_all(batch.as_bytes()).await?;
    if !batch.ends_with('\n') {
        out.write_all(b"\n").await?;
    }
    out.write_all(BATCH_SEPARATOR.as_bytes()).await?;
    out.write_all(b"\n").await?;
    Ok(())
}

fn backup_file_name(index: usize, table: &ShallowTable) -> String {
    format!("{:04}_{}_{}.sql", index, table.schema, table.name)
}

/// Index of a `<digits>_<anything>.sql` file name.
fn backup_index(name: &str) -> Option<u64> {
    let stem = name.strip_suffix(".sql")?;
    let (digits, _) = stem.split_once('_')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}
