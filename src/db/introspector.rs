use crate::db::executor::{execute, Row};
use crate::db::schema::{quote_ident, ColumnSchema, SchemaContext, TableSchema};
use duckdb::Connection;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum IntrospectError {
    #[error("failed to list tables: {0}")]
    ListTables(#[source] duckdb::Error),
}

const TABLES_QUERY: &str = "
    SELECT table_name
    FROM information_schema.tables
    WHERE table_catalog = current_database() AND table_schema = 'main'
    ORDER BY table_name";

const COLUMNS_QUERY: &str = "
    SELECT column_name, data_type, is_nullable
    FROM information_schema.columns
    WHERE table_catalog = current_database() AND table_schema = 'main' AND table_name = ?
    ORDER BY ordinal_position";

/// Reads table/column metadata and up to `sample_rows` rows per table.
///
/// Only the table listing is fatal. A table whose columns or samples cannot
/// be read is still reported, with whatever could be gathered.
pub fn introspect(conn: &Connection, sample_rows: usize) -> Result<SchemaContext, IntrospectError> {
    let table_names = list_tables(conn).map_err(IntrospectError::ListTables)?;
    debug!("Found {} tables: {:?}", table_names.len(), table_names);

    let mut tables = Vec::with_capacity(table_names.len());
    let mut samples = BTreeMap::new();

    for table_name in table_names {
        let columns = match list_columns(conn, &table_name) {
            Ok(columns) => columns,
            Err(e) => {
                warn!("Could not read columns of table {}: {}", table_name, e);
                Vec::new()
            }
        };

        samples.insert(table_name.clone(), sample_table(conn, &table_name, sample_rows));
        tables.push(TableSchema {
            name: table_name,
            columns,
        });
    }

    info!("Introspected {} tables", tables.len());
    Ok(SchemaContext { tables, samples })
}

fn list_tables(conn: &Connection) -> duckdb::Result<Vec<String>> {
    let mut stmt = conn.prepare(TABLES_QUERY)?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
    rows.collect()
}

fn list_columns(conn: &Connection, table_name: &str) -> duckdb::Result<Vec<ColumnSchema>> {
    let mut stmt = conn.prepare(COLUMNS_QUERY)?;
    let rows = stmt.query_map(duckdb::params![table_name], |row| {
        Ok(ColumnSchema {
            name: row.get(0)?,
            declared_type: row.get(1)?,
            nullable: row.get::<_, String>(2)? == "YES",
        })
    })?;
    rows.collect()
}

fn sample_table(conn: &Connection, table_name: &str, limit: usize) -> Vec<Row> {
    if limit == 0 {
        return Vec::new();
    }

    let sql = format!("SELECT * FROM {} LIMIT {}", quote_ident(table_name), limit);
    match execute(conn, &sql) {
        Ok(result) => result.rows,
        Err(e) => {
            warn!("Could not sample table {}: {}", table_name, e);
            Vec::new()
        }
    }
}
