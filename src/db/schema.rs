use crate::db::executor::Row;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ColumnSchema {
    pub name: String,
    /// Type as declared by the engine, e.g. `INTEGER` or `TIMESTAMP`
    pub declared_type: String,
    pub nullable: bool,
}

impl ColumnSchema {
    pub fn to_sql_definition(&self) -> String {
        let nullable_str = if self.nullable { "" } else { " NOT NULL" };
        format!(
            "{} {}{}",
            quote_ident(&self.name),
            self.declared_type,
            nullable_str
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnSchema>,
}

impl TableSchema {
    pub fn to_create_table_sql(&self) -> String {
        let columns_sql: Vec<String> = self
            .columns
            .iter()
            .map(|col| col.to_sql_definition())
            .collect();

        format!(
            "CREATE TABLE {} (\n    {}\n);",
            quote_ident(&self.name),
            columns_sql.join(",\n    ")
        )
    }
}

/// Everything the model is told about one project database.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SchemaContext {
    /// Tables ordered by name, columns in ordinal order
    pub tables: Vec<TableSchema>,
    /// Up to a handful of rows per table; empty when sampling failed
    pub samples: BTreeMap<String, Vec<Row>>,
}

impl SchemaContext {
    pub fn table_names(&self) -> Vec<String> {
        self.tables.iter().map(|t| t.name.clone()).collect()
    }

    /// DDL for every table, in table order.
    pub fn description(&self) -> String {
        self.tables
            .iter()
            .map(TableSchema::to_create_table_sql)
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// One JSON object per sample row, grouped under the table name.
    pub fn samples_text(&self) -> String {
        let mut out = String::new();
        for table in &self.tables {
            out.push_str(&format!("{}:\n", table.name));
            match self.samples.get(&table.name) {
                Some(rows) if !rows.is_empty() => {
                    for row in rows {
                        let line = serde_json::to_string(row).unwrap_or_else(|_| "{}".to_string());
                        out.push_str(&format!("  {}\n", line));
                    }
                }
                _ => out.push_str("  (no sample rows)\n"),
            }
        }
        out
    }
}

/// Double-quotes an identifier, escaping embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entries_table() -> TableSchema {
        TableSchema {
            name: "table1".to_string(),
            columns: vec![
                ColumnSchema {
                    name: "id".to_string(),
                    declared_type: "INTEGER".to_string(),
                    nullable: false,
                },
                ColumnSchema {
                    name: "created_at".to_string(),
                    declared_type: "TIMESTAMP".to_string(),
                    nullable: true,
                },
            ],
        }
    }

    #[test]
    fn create_table_sql_quotes_names() {
        assert_eq!(
            entries_table().to_create_table_sql(),
            "CREATE TABLE \"table1\" (\n    \"id\" INTEGER NOT NULL,\n    \"created_at\" TIMESTAMP\n);"
        );
        assert_eq!(quote_ident("odd\"name"), "\"odd\"\"name\"");
    }

    #[test]
    fn samples_text_marks_empty_tables() {
        let mut row = Row::new();
        row.insert("id".to_string(), json!(1));
        row.insert("created_at".to_string(), json!("2024-01-01"));

        let mut context = SchemaContext {
            tables: vec![entries_table(), TableSchema { name: "locked".to_string(), columns: vec![] }],
            samples: BTreeMap::new(),
        };
        context.samples.insert("table1".to_string(), vec![row]);
        context.samples.insert("locked".to_string(), vec![]);

        let text = context.samples_text();
        assert!(text.contains("table1:\n  {\"id\":1,\"created_at\":\"2024-01-01\"}\n"));
        assert!(text.contains("locked:\n  (no sample rows)\n"));
        assert_eq!(context.table_names(), vec!["table1", "locked"]);
    }
}
