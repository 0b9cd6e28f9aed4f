use super::{ColumnDef, Relationship, SchemaDescription, TableDef};

fn table(name: &str, description: &str, columns: &[(&str, &str)]) -> TableDef {
    TableDef {
        name: name.to_string(),
        description: Some(description.to_string()),
        columns: columns
            .iter()
            .map(|(name, ty)| ColumnDef {
                name: name.to_string(),
                semantic_type: ty.to_string(),
            })
            .collect(),
    }
}

fn rel(from: (&str, &str), to: (&str, &str)) -> Relationship {
    Relationship {
        from_table: from.0.to_string(),
        from_column: from.1.to_string(),
        to_table: to.0.to_string(),
        to_column: to.1.to_string(),
    }
}

/// Built-in invoice analytics schema. The fallback queries are written against it.
pub fn invoice_schema() -> SchemaDescription {
    SchemaDescription {
        version: "invoices-v1".to_string(),
        dialect: "DuckDB".to_string(),
        tables: vec![
            table(
                "Invoice",
                "one row per invoice",
                &[
                    ("id", "integer, primary key"),
                    ("invoiceRef", "text"),
                    ("invoiceDate", "timestamp"),
                    ("totalAmount", "decimal currency amount"),
                    ("paymentDueDate", "timestamp"),
                    ("vendorId", "integer"),
                    ("customerId", "integer"),
                ],
            ),
            table(
                "Vendor",
                "suppliers that issue invoices",
                &[("id", "integer, primary key"), ("name", "text"), ("taxId", "text")],
            ),
            table(
                "Customer",
                "invoice recipients",
                &[("id", "integer, primary key"), ("name", "text"), ("address", "text")],
            ),
            table(
                "LineItem",
                "invoice lines extracted from documents",
                &[
                    ("id", "integer, primary key"),
                    ("description", "text"),
                    ("quantity", "numeric"),
                    ("unitPrice", "decimal currency amount"),
                    ("totalPrice", "decimal currency amount"),
                    ("documentId", "integer"),
                ],
            ),
            table(
                "Document",
                "uploaded source documents",
                &[
                    ("id", "integer, primary key"),
                    ("name", "text"),
                    ("fileSize", "integer, bytes"),
                    ("isValidatedByHuman", "boolean"),
                ],
            ),
        ],
        relationships: vec![
            rel(("Invoice", "vendorId"), ("Vendor", "id")),
            rel(("Invoice", "customerId"), ("Customer", "id")),
            rel(("LineItem", "documentId"), ("Document", "id")),
        ],
        rules: vec![
            "Table and column names are case sensitive: always wrap them in double quotes exactly as written".to_string(),
            "Use table aliases and explicit JOIN ... ON clauses".to_string(),
            "Only use tables and columns listed in the schema".to_string(),
            "Add ORDER BY and LIMIT when the question asks for a ranking or the most recent rows".to_string(),
        ],
    }
}
