use crate::error::Result;
use crate::sql::{StatementBuilder, StorageEngine, Verb};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

/// Writes table rows to JSON Lines files, one per table
pub struct TableWriter {
    dir: PathBuf,
    writers: HashMap<String, BufWriter<File>>,
}

impl TableWriter {
    /// Create a writer that puts `<table>.jsonl` files in `output_dir`
    pub fn new<P: AsRef<Path>>(output_dir: P) -> Result<Self> {
        std::fs::create_dir_all(&output_dir)?;
        Ok(TableWriter {
            dir: output_dir.as_ref().to_path_buf(),
            writers: HashMap::new(),
        })
    }

    /// Append rows to the table's file, creating it on first use
    pub fn write_rows<I>(&mut self, table: &str, rows: I) -> Result<usize>
    where
        I: IntoIterator<Item = Map<String, Value>>,
    {
        if !self.writers.contains_key(table) {
            let path = self.dir.join(format!("{}.jsonl", table));
            let file = File::create(&path)?;
            self.writers.insert(table.to_string(), BufWriter::new(file));
        }
        let Some(writer) = self.writers.get_mut(table) else {
            return Ok(0);
        };

        let mut written = 0;
        for row in rows {
            serde_json::to_writer(&mut *writer, &row)?;
            writer.write_all(b"\n")?;
            written += 1;
        }
        Ok(written)
    }

    /// Flush all writers
    pub fn flush(&mut self) -> Result<()> {
        for writer in self.writers.values_mut() {
            writer.flush()?;
        }
        Ok(())
    }
}

/// Dump every row of each table. Returns the number of rows written.
pub async fn dump_tables<E: StorageEngine + ?Sized>(
    engine: &E,
    tables: &[String],
    writer: &mut TableWriter,
) -> Result<usize> {
    let mut total = 0;
    for table in tables {
        let statement = StatementBuilder::new(Verb::Read, "SELECT * FROM {table}")
            .ident("table", table.as_str())
            .build()?;
        let result = engine.execute(&statement).await?;
        let written = writer.write_rows(table, result.records())?;
        info!(table = %table, rows = written, "dumped table");
        total += written;
    }
    writer.flush()?;
    Ok(total)
}
