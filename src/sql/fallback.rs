//! Deterministic SQL used when the model path is unavailable.
//!
//! Rules are checked in order and the first match wins. The statements are
//! hand-written against the built-in invoice schema.

pub const TOP_VENDORS_SQL: &str = r#"SELECT v.name AS vendor, SUM(i."totalAmount") AS total FROM "Vendor" v JOIN "Invoice" i ON i."vendorId" = v.id GROUP BY v.name ORDER BY total DESC LIMIT 10;"#;

pub const RECENT_INVOICES_SQL: &str = r#"SELECT id, "invoiceRef", "invoiceDate", "totalAmount" FROM "Invoice" ORDER BY "invoiceDate" DESC LIMIT 100;"#;

struct FallbackRule {
    /// Every keyword must appear in the lowercased question.
    keywords: &'static [&'static str],
    sql: &'static str,
}

const RULES: &[FallbackRule] = &[FallbackRule {
    keywords: &["top", "vendor"],
    sql: TOP_VENDORS_SQL,
}];

const DEFAULT_SQL: &str = RECENT_INVOICES_SQL;

pub fn generate(question: &str) -> &'static str {
    let question = question.to_lowercase();

    RULES
        .iter()
        .find(|rule| rule.keywords.iter().all(|kw| question.contains(kw)))
        .map(|rule| rule.sql)
        .unwrap_or(DEFAULT_SQL)
}
