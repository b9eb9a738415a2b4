use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::path::{Path, PathBuf};

use super::schema_gen::{
    generate_create_table, generate_insert, generate_loads_table, qualified, quote_ident,
    staging_name, LOADS_TABLE,
};
use crate::error::{PipelineError, Result};
use crate::parser::Row;

const PROGRESS_EVERY: u64 = 10_000;

/// Bookkeeping for one table replacement, stored in `_loads`
#[derive(Debug, Clone)]
pub struct LoadRecord<'a> {
    pub load_id: &'a str,
    pub pipeline_name: &'a str,
    pub source_file: &'a Path,
    pub loaded_at: &'a str,
}

/// SQLite destination.
///
/// The database file is attached under the dataset name, so every table is
/// addressed as `"<dataset>"."<table>"`.
pub struct SqliteWriter {
    conn: Connection,
    schema: String,
    path: PathBuf,
}

impl SqliteWriter {
    pub fn open(db_path: &Path, schema: &str) -> Result<Self> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| PipelineError::io(parent, e))?;
        }

        let conn = Connection::open_in_memory().map_err(PipelineError::db("opening connection"))?;
        conn.execute(
            "ATTACH DATABASE ?1 AS ?2",
            params![db_path.to_string_lossy(), schema],
        )
        .map_err(PipelineError::db(format!("attaching {:?}", db_path)))?;

        let schema_q = quote_ident(schema);
        conn.execute_batch(&format!(
            "PRAGMA {schema_q}.journal_mode = WAL;
             PRAGMA {schema_q}.synchronous = NORMAL;"
        ))
        .map_err(PipelineError::db("configuring database"))?;

        conn.execute(&generate_loads_table(schema), [])
            .map_err(PipelineError::db("creating the loads table"))?;

        Ok(Self {
            conn,
            schema: schema.to_string(),
            path: db_path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace `table` with the given rows.
    ///
    /// Rows go into a staging table which is swapped in for the old table and
    /// recorded in `_loads`, all inside one transaction. An error from `rows`
    /// or the database rolls everything back and leaves the old table intact.
    pub fn replace_table<I>(
        &mut self,
        table: &str,
        columns: &[String],
        rows: I,
        record: &LoadRecord<'_>,
        mut on_progress: impl FnMut(u64),
    ) -> Result<u64>
    where
        I: IntoIterator<Item = Result<Row>>,
    {
        let staging = staging_name(table);
        let staging_q = qualified(&self.schema, &staging);
        let target_q = qualified(&self.schema, table);

        let tx = self
            .conn
            .transaction()
            .map_err(PipelineError::db("starting transaction"))?;

        tx.execute_batch(&format!(
            "DROP TABLE IF EXISTS {staging_q};\n{};",
            generate_create_table(&self.schema, &staging, columns)
        ))
        .map_err(PipelineError::db(format!("creating staging table for {}", table)))?;

        let mut count: u64 = 0;
        {
            let mut stmt = tx
                .prepare(&generate_insert(&self.schema, &staging, columns))
                .map_err(PipelineError::db(format!("preparing insert for {}", table)))?;

            for row in rows {
                let row = row?;
                stmt.execute(params_from_iter(row.iter()))
                    .map_err(PipelineError::db(format!("inserting row {} of {}", count + 1, table)))?;
                count += 1;
                if count % PROGRESS_EVERY == 0 {
                    on_progress(count);
                }
            }
        }

        tx.execute_batch(&format!(
            "DROP TABLE IF EXISTS {target_q};\nALTER TABLE {staging_q} RENAME TO {};",
            quote_ident(table)
        ))
        .map_err(PipelineError::db(format!("swapping in {}", table)))?;

        tx.execute(
            &format!(
                "INSERT INTO {} (load_id, pipeline_name, table_name, source_file, row_count, loaded_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                qualified(&self.schema, LOADS_TABLE)
            ),
            params![
                record.load_id,
                record.pipeline_name,
                table,
                record.source_file.to_string_lossy(),
                count as i64,
                record.loaded_at,
            ],
        )
        .map_err(PipelineError::db(format!("recording load of {}", table)))?;

        tx.commit()
            .map_err(PipelineError::db(format!("committing {}", table)))?;

        on_progress(count);
        Ok(count)
    }

    /// Data tables in the dataset, sorted by name
    pub fn table_names(&self) -> Result<Vec<String>> {
        let sql = format!(
            "SELECT name FROM {}.sqlite_master
             WHERE type = 'table' AND name NOT LIKE '\\_%' ESCAPE '\\'
             ORDER BY name",
            quote_ident(&self.schema)
        );
        let mut stmt = self
            .conn
            .prepare(&sql)
            .map_err(PipelineError::db("listing tables"))?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())
            .map_err(PipelineError::db("listing tables"))?;
        Ok(names)
    }

    /// Row count of a table, or `None` if it does not exist
    pub fn row_count(&self, table: &str) -> Result<Option<u64>> {
        let exists: Option<String> = self
            .conn
            .query_row(
                &format!(
                    "SELECT name FROM {}.sqlite_master WHERE type = 'table' AND name = ?1",
                    quote_ident(&self.schema)
                ),
                [table],
                |row| row.get(0),
            )
            .optional()
            .map_err(PipelineError::db(format!("looking up {}", table)))?;

        if exists.is_none() {
            return Ok(None);
        }

        let count: i64 = self
            .conn
            .query_row(
                &format!("SELECT COUNT(*) FROM {}", qualified(&self.schema, table)),
                [],
                |row| row.get(0),
            )
            .map_err(PipelineError::db(format!("counting {}", table)))?;
        Ok(Some(count as u64))
    }

    /// Finalize the database
    pub fn finalize(self) -> Result<()> {
        self.conn
            .execute_batch(&format!("PRAGMA {}.optimize;", quote_ident(&self.schema)))
            .map_err(PipelineError::db("optimizing database"))?;
        Ok(())
    }
}
