use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

static SELECT_KEYWORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bselect\b").expect("valid regex"));

/// Opening of a real CTE: `WITH [RECURSIVE] name [(cols)] AS (`.
static CTE_OPENER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)^with\s+(recursive\s+)?("[^"]+"|\w+)\s*(\([^)]*\)\s*)?as\s*\("#)
        .expect("valid regex")
});

static FENCE_LANGUAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(sql|postgresql|postgres|duckdb)\s").expect("valid regex"));

/// Isolates the SQL statement in free-form model output.
///
/// Best-effort text surgery, not a parser: a `;` inside a string literal ends the
/// statement early. Empty output means "no usable SQL".
pub fn extract_sql(raw: &str) -> String {
    let text = strip_fences(raw);
    if text.is_empty() {
        return String::new();
    }

    let start = if CTE_OPENER.is_match(text) {
        Some(0)
    } else {
        SELECT_KEYWORD.find(text).map(|m| m.start())
    };

    match start {
        Some(start) => {
            let statement = &text[start..];
            let end = statement.find(';').unwrap_or(statement.len());
            let sql = strip_fences(&statement[..end]).to_string();
            debug!("Extracted SQL: {}", sql);
            sql
        }
        None => {
            debug!("No SELECT found in model output, using it verbatim");
            text.to_string()
        }
    }
}

fn strip_fences(raw: &str) -> &str {
    let trimmed = raw.trim().trim_matches('`').trim();
    let fenced = raw.trim_start().starts_with('`');

    match FENCE_LANGUAGE.find(trimmed) {
        Some(tag) if fenced => trimmed[tag.end()..].trim(),
        _ => trimmed,
    }
}
