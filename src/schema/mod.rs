//! Static description of the relational schema the model writes SQL against.
//!
//! The description is hand-authored data: loaded once at startup (either the
//! built-in invoice schema or a `[schema]` table from the config file) and
//! shared read-only behind an `Arc` afterwards.

mod invoice;

use serde::{Deserialize, Serialize};

pub use invoice::invoice_schema;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub semantic_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDef {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub columns: Vec<ColumnDef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub from_table: String,
    pub from_column: String,
    pub to_table: String,
    pub to_column: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaDescription {
    pub version: String,
    #[serde(default = "default_dialect")]
    pub dialect: String,
    pub tables: Vec<TableDef>,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
    #[serde(default)]
    pub rules: Vec<String>,
}

fn default_dialect() -> String {
    "DuckDB".to_string()
}

impl SchemaDescription {
    /// Renders the schema as the plain-text listing embedded in prompts.
    ///
    /// Tables and columns keep their declared order.
    pub fn render(&self) -> String {
        let mut out = String::from("Database Schema:\n");

        for (i, table) in self.tables.iter().enumerate() {
            let columns = table
                .columns
                .iter()
                .map(|c| format!("{} ({})", c.name, c.semantic_type))
                .collect::<Vec<_>>()
                .join(", ");
            out.push_str(&format!("{}. {} table: {}", i + 1, table.name, columns));
            if let Some(description) = &table.description {
                out.push_str(&format!(" -- {}", description));
            }
            out.push('\n');
        }

        if !self.relationships.is_empty() {
            out.push_str("\nRelationships:\n");
            for rel in &self.relationships {
                out.push_str(&format!(
                    "- {}.{} -> {}.{}\n",
                    rel.from_table, rel.from_column, rel.to_table, rel.to_column
                ));
            }
        }

        out
    }

    pub fn table(&self, name: &str) -> Option<&TableDef> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Checks internal consistency: non-empty, and every relationship points at declared columns.
    pub fn validate(&self) -> Result<(), String> {
        if self.tables.is_empty() {
            return Err("schema description declares no tables".to_string());
        }

        for table in &self.tables {
            if table.columns.is_empty() {
                return Err(format!("table '{}' declares no columns", table.name));
            }
        }

        for rel in &self.relationships {
            for (table, column) in [
                (&rel.from_table, &rel.from_column),
                (&rel.to_table, &rel.to_column),
            ] {
                let known = self
                    .table(table)
                    .map(|t| t.columns.iter().any(|c| &c.name == column))
                    .unwrap_or(false);
                if !known {
                    return Err(format!(
                        "relationship references unknown column {}.{}",
                        table, column
                    ));
                }
            }
        }

        Ok(())
    }
}

impl Default for SchemaDescription {
    fn default() -> Self {
        invoice_schema()
    }
}
