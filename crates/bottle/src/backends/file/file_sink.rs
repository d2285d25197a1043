use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::{
    fs::{File, OpenOptions},
    io::AsyncWriteExt,
    sync::Mutex,
};
use tracing::{debug, trace, warn};

use crate::backends::PoemSink;
use crate::backends::sink::{PoemReceipt, PoemRow};
use crate::common::Poem;

// -- 🚰 FileSinkConfig, co-located with the FileSink that reads it. One backend, one config, one file.
#[derive(Debug, Deserialize, Clone)]
pub struct FileSinkConfig {
    /// 📁 Where the `<table>.ndjson` files live. Created if missing.
    pub directory: String,
}

/// 📄 One table's file, how long it is, and the id its next row gets.
///
/// No `BufWriter`: a row is written whole and flushed, or cut back off the file.
/// A buffer could keep half a failed row around and glue it to the next one.
#[derive(Debug)]
struct TableFile {
    file: File,
    len: u64,
    next_id: u64,
}

impl TableFile {
    /// ✍️ Append one complete row, or leave the file exactly as long as it was.
    async fn append_row(&mut self, row: &[u8]) -> std::io::Result<()> {
        let written = self.write_row(row).await;
        if written.is_err() {
            if let Err(truncate_err) = self.file.set_len(self.len).await {
                warn!("⚠️ could not cut a half-written row back off, the next open repairs it: {truncate_err}");
            }
            return written;
        }
        self.len += row.len() as u64;
        self.next_id += 1;
        Ok(())
    }

    async fn write_row(&mut self, row: &[u8]) -> std::io::Result<()> {
        self.file.write_all(row).await?;
        self.file.flush().await
    }
}

/// 🩹 How much of an existing table file is whole rows, and how many rows that is.
///
/// Everything after the last newline is a row a crash interrupted.
fn whole_rows(existing: &[u8]) -> (u64, u64) {
    let keep = memchr::memrchr(b'\n', existing).map_or(0, |last| last + 1);
    let rows = memchr::memchr_iter(b'\n', &existing[..keep]).count();
    (keep as u64, rows as u64)
}

/// 🗄️ FilePoemSink: one NDJSON file per table, one poem per line, ids counting up from 1.
///
/// Appends only. The one exception is cutting a half-written row back off the end.
/// Each table has its own lock, so Love and Death can be written at the same time
/// without stepping on each other (a sentence I never expected to type).
///
/// ⚠️ Ids pick up from the number of lines already in the file. Two processes
/// writing the same directory will hand out the same ids. Don't do that.
#[derive(Debug)]
pub(crate) struct FilePoemSink {
    directory: PathBuf,
    tables: Mutex<HashMap<String, Arc<Mutex<TableFile>>>>,
}

impl FilePoemSink {
    pub(crate) async fn new(sink_config: FileSinkConfig) -> Result<Self> {
        let directory = PathBuf::from(&sink_config.directory);
        tokio::fs::create_dir_all(&directory).await.context(format!(
            "💀 The poem directory '{}' could not be conjured into existence. \
             We stared at the path. The path stared back.",
            directory.display()
        ))?;
        Ok(Self {
            directory,
            tables: Mutex::new(HashMap::new()),
        })
    }

    fn table_path(&self, table: &str) -> Result<PathBuf> {
        let file_name = format!("{table}.ndjson");
        // -- a table name is a file name, never a path
        if table.is_empty() || Path::new(&file_name).file_name() != Some(std::ffi::OsStr::new(&file_name)) {
            bail!("💀 '{table}' is not usable as a table name for the file sink");
        }
        Ok(self.directory.join(file_name))
    }

    async fn table(&self, table: &str) -> Result<Arc<Mutex<TableFile>>> {
        let mut tables = self.tables.lock().await;
        if let Some(existing) = tables.get(table) {
            return Ok(existing.clone());
        }

        let path = self.table_path(table)?;
        let existing = match tokio::fs::read(&path).await {
            Ok(existing) => existing,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(err) => {
                return Err(err).context(format!("💀 Could not read table file '{}'", path.display()));
            }
        };
        let (len, rows) = whole_rows(&existing);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .context(format!("💀 Could not open table file '{}'", path.display()))?;
        if len < existing.len() as u64 {
            warn!(
                "🩹 table '{table}' ended in {} bytes of a half-written row, cutting them off",
                existing.len() as u64 - len
            );
            file.set_len(len)
                .await
                .context(format!("💀 Could not repair table file '{}'", path.display()))?;
        }
        let next_id = rows + 1;
        debug!("🗄️ table '{table}' ready at '{}', next poem is #{next_id}", path.display());

        let table_file = Arc::new(Mutex::new(TableFile { file, len, next_id }));
        tables.insert(table.to_string(), table_file.clone());
        Ok(table_file)
    }
}

#[async_trait]
impl PoemSink for FilePoemSink {
    /// 🏗️ "CREATE TABLE IF NOT EXISTS", file edition.
    async fn prepare(&self, tables: &[String]) -> Result<()> {
        for table in tables {
            self.table(table).await?;
        }
        Ok(())
    }

    /// 📡 One row, one line, flushed before we say yes.
    async fn store(&self, table: &str, poem: Poem) -> Result<PoemReceipt> {
        let table_file = self.table(table).await?;
        let mut table_file = table_file.lock().await;

        let id = table_file.next_id;
        let mut line = serde_json::to_string(&PoemRow::new(&poem, Some(id)))
            .context("💀 A poem refused to become JSON")?;
        line.push('\n');
        trace!("📬 {} bytes walked into table '{table}'", line.len());

        table_file.append_row(line.as_bytes()).await.context(format!(
            "💀 Error writing poem #{id} to table '{table}'. The bytes could SEE the disk. They never made it."
        ))?;

        Ok(PoemReceipt {
            table: table.to_string(),
            id: Some(id),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn poem(content: &[&str], authors: &[u64]) -> Poem {
        let lines: Vec<String> = content.iter().map(|line| line.to_string()).collect();
        Poem::new("Nature", &lines, authors.iter().copied().collect::<BTreeSet<_>>())
    }

    fn rows(path: &Path) -> Result<Vec<PoemRow>> {
        let text = std::fs::read_to_string(path)?;
        text.lines()
            .map(|line| serde_json::from_str(line).map_err(Into::into))
            .collect()
    }

    #[tokio::test]
    async fn the_one_where_poems_land_one_per_line_with_ids() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let sink = FilePoemSink::new(FileSinkConfig {
            directory: dir.path().join("poems").display().to_string(),
        })
        .await?;
        sink.prepare(&["Nature".to_string(), "Love".to_string()]).await?;

        let first = sink.store("Nature", poem(&["moss", "stone"], &[2, 1])).await?;
        let second = sink.store("Nature", poem(&["rain"], &[3])).await?;
        assert_eq!(first.id, Some(1));
        assert_eq!(second.id, Some(2));

        let nature = rows(&dir.path().join("poems").join("Nature.ndjson"))?;
        assert_eq!(nature.len(), 2);
        assert_eq!(nature[0].poem_id, Some(1));
        assert_eq!(nature[0].content, "moss\nstone");
        assert_eq!(nature[0].author_ids, vec![1, 2]);
        assert!(dir.path().join("poems").join("Love.ndjson").exists());
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_restart_keeps_counting_instead_of_starting_over() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let config = FileSinkConfig {
            directory: dir.path().display().to_string(),
        };
        let sink = FilePoemSink::new(config.clone()).await?;
        sink.store("Nature", poem(&["one"], &[1])).await?;
        drop(sink);

        let reborn = FilePoemSink::new(config).await?;
        let receipt = reborn.store("Nature", poem(&["two"], &[1])).await?;
        assert_eq!(receipt.id, Some(2));
        assert_eq!(rows(&dir.path().join("Nature.ndjson"))?.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_half_written_row_is_cut_off_on_open() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("Nature.ndjson");
        let whole = serde_json::to_string(&PoemRow::new(&poem(&["one"], &[1]), Some(1)))?;
        std::fs::write(&path, format!("{whole}\n{{\"poem_id\":2,\"cont"))?;

        let sink = FilePoemSink::new(FileSinkConfig {
            directory: dir.path().display().to_string(),
        })
        .await?;
        let receipt = sink.store("Nature", poem(&["two"], &[2])).await?;

        assert_eq!(receipt.id, Some(2));
        let rows = rows(&path)?;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].content, "two");
        Ok(())
    }

    #[test]
    fn the_one_where_only_complete_lines_count_as_rows() {
        assert_eq!(whole_rows(b""), (0, 0));
        assert_eq!(whole_rows(b"{}\n{}\n"), (6, 2));
        assert_eq!(whole_rows(b"{}\n{\"half"), (3, 1));
        assert_eq!(whole_rows(b"{\"half"), (0, 0));
    }

    #[tokio::test]
    async fn the_one_where_a_sneaky_table_name_is_refused() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let sink = FilePoemSink::new(FileSinkConfig {
            directory: dir.path().display().to_string(),
        })
        .await?;
        assert!(sink.store("../escape", poem(&["x"], &[1])).await.is_err());
        assert!(sink.store("", poem(&["x"], &[1])).await.is_err());
        Ok(())
    }
}
