pub mod db_pool;
pub mod executor;
pub mod marshal;

#[cfg(test)]
pub mod testing {
    use duckdb::Connection;
    use std::path::Path;

    /// Creates `invoices.duckdb` under `dir` with the built-in schema and a few rows.
    ///
    /// Vendor totals: Acme Supplies 500.0, Globex 250.5, Initech 50.0.
    pub fn seed_invoices(dir: &Path) -> String {
        let path = dir.join("invoices.duckdb");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE "Vendor" (id INTEGER PRIMARY KEY, name VARCHAR, "taxId" VARCHAR);
            CREATE TABLE "Customer" (id INTEGER PRIMARY KEY, name VARCHAR, address VARCHAR);
            CREATE TABLE "Invoice" (
                id INTEGER PRIMARY KEY,
                "invoiceRef" VARCHAR,
                "invoiceDate" TIMESTAMP,
                "totalAmount" DOUBLE,
                "paymentDueDate" TIMESTAMP,
                "vendorId" INTEGER,
                "customerId" INTEGER
            );
            INSERT INTO "Vendor" VALUES (1, 'Acme Supplies', 'TX-1'), (2, 'Globex', 'TX-2'), (3, 'Initech', 'TX-3');
            INSERT INTO "Customer" VALUES (1, 'Buyer Co', '1 Main St');
            INSERT INTO "Invoice" VALUES
                (1, 'INV-001', TIMESTAMP '2024-01-15 09:30:00', 100.0, TIMESTAMP '2024-02-15 00:00:00', 1, 1),
                (2, 'INV-002', TIMESTAMP '2024-02-01 12:00:00', 250.5, NULL, 2, 1),
                (3, 'INV-003', TIMESTAMP '2024-03-01 12:30:45', 400.0, NULL, 1, 1),
                (4, 'INV-004', TIMESTAMP '2024-02-20 08:00:00', 50.0, NULL, 3, 1);
            "#,
        )
        .unwrap();
        path.to_string_lossy().to_string()
    }
}
