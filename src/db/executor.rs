use duckdb::types::Value;
use duckdb::Connection;
use r2d2::{Pool, PooledConnection};
use regex::Regex;
use std::error::Error;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::path::Path;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tracing::{debug, error, info};

use crate::config::DatabaseConfig;
use crate::db::db_pool::{build_pool, DuckDBConnectionManager};
use crate::util::retry::{retry, tokio_sleeper, RetryPolicy, Sleeper};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    ConnectionUnavailable { attempts: u32, cause: String },
    Statement(String),
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionError::ConnectionUnavailable { attempts, cause } => write!(
                f,
                "database connection failed after {} attempt(s): {}",
                attempts, cause
            ),
            ExecutionError::Statement(msg) => write!(f, "{}", msg),
        }
    }
}

impl Error for ExecutionError {}

#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    RowsReturned {
        columns: Vec<String>,
        rows: Vec<Vec<Value>>,
    },
    RowsAffected {
        count: usize,
    },
    ExecutionFailed {
        reason: ExecutionError,
        attempted_sql: String,
    },
}

static ROW_RETURNING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(select|with|values|from|table|show|describe|desc|explain|pragma|summarize|call)\b",
    )
    .expect("valid regex")
});

static RETURNING_CLAUSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\breturning\b").expect("valid regex"));

/// Whether the statement yields a result set rather than an affected-row count.
pub fn returns_rows(sql: &str) -> bool {
    let body = skip_leading_noise(sql);
    ROW_RETURNING.is_match(body) || RETURNING_CLAUSE.is_match(&mask_literals(body))
}

/// Replaces quoted strings, quoted identifiers and comments with spaces so keyword
/// searches only see SQL tokens. Doubled quotes inside a literal are handled.
fn mask_literals(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\'' | '"' => {
                out.push(' ');
                while let Some(inner) = chars.next() {
                    if inner == c {
                        if chars.peek() == Some(&c) {
                            chars.next();
                            continue;
                        }
                        break;
                    }
                }
            }
            '-' if chars.peek() == Some(&'-') => {
                out.push(' ');
                for inner in chars.by_ref() {
                    if inner == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                out.push(' ');
                let mut prev = '\0';
                for inner in chars.by_ref() {
                    if prev == '*' && inner == '/' {
                        break;
                    }
                    prev = inner;
                }
            }
            _ => out.push(c),
        }
    }

    out
}

/// Skips whitespace, opening parentheses and leading SQL comments.
fn skip_leading_noise(sql: &str) -> &str {
    let mut rest = sql;
    loop {
        rest = rest.trim_start_matches(|c: char| c.is_whitespace() || c == '(');
        if let Some(comment) = rest.strip_prefix("--") {
            rest = comment.split_once('\n').map(|(_, tail)| tail).unwrap_or("");
        } else if let Some(comment) = rest.strip_prefix("/*") {
            rest = comment.split_once("*/").map(|(_, tail)| tail).unwrap_or("");
        } else {
            return rest;
        }
    }
}

/// A checked-out connection; dropping it returns it to the pool or closes it.
enum Lease {
    Pooled(PooledConnection<DuckDBConnectionManager>),
    Dedicated(Connection),
}

impl Deref for Lease {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        match self {
            Lease::Pooled(conn) => conn,
            Lease::Dedicated(conn) => conn,
        }
    }
}

impl DerefMut for Lease {
    fn deref_mut(&mut self) -> &mut Connection {
        match self {
            Lease::Pooled(conn) => conn,
            Lease::Dedicated(conn) => conn,
        }
    }
}

pub struct QueryExecutor {
    pool: Pool<DuckDBConnectionManager>,
    default_target: String,
    connect_timeout: Duration,
    retry: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl QueryExecutor {
    pub fn new(config: &DatabaseConfig) -> Self {
        Self {
            pool: build_pool(config),
            default_target: config.connection_string.clone(),
            connect_timeout: config.connect_timeout(),
            retry: config.connect_retry(),
            sleeper: tokio_sleeper(),
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn default_target(&self) -> &str {
        &self.default_target
    }

    /// Executes exactly one statement. Never retries the statement itself.
    ///
    /// `target` selects a database other than the configured default; a blank or
    /// identical target uses the shared pool.
    pub async fn execute(&self, target: Option<&str>, sql: &str) -> ExecutionOutcome {
        let lease = match self.acquire(target).await {
            Ok(lease) => lease,
            Err(reason) => {
                error!("{}", reason);
                return ExecutionOutcome::ExecutionFailed {
                    reason,
                    attempted_sql: sql.to_string(),
                };
            }
        };

        let statement = sql.to_string();
        let task = tokio::task::spawn_blocking(move || run_statement(lease, &statement));

        let reason = match task.await {
            Ok(Ok(outcome)) => return outcome,
            Ok(Err(e)) => ExecutionError::Statement(e.to_string()),
            Err(join_err) => {
                ExecutionError::Statement(format!("Database task execution failed: {}", join_err))
            }
        };

        error!("SQL execution error: {}", reason);
        ExecutionOutcome::ExecutionFailed {
            reason,
            attempted_sql: sql.to_string(),
        }
    }

    async fn acquire(&self, target: Option<&str>) -> Result<Lease, ExecutionError> {
        let target = target
            .map(str::trim)
            .filter(|t| !t.is_empty() && *t != self.default_target());

        retry(&self.retry, self.sleeper.as_ref(), "Database connection", |_| {
            self.connect_once(target)
        })
        .await
        .map_err(|cause| ExecutionError::ConnectionUnavailable {
            attempts: self.retry.max_attempts,
            cause,
        })
    }

    async fn connect_once(&self, target: Option<&str>) -> Result<Lease, String> {
        let timeout = self.connect_timeout;

        match target {
            None => {
                let pool = self.pool.clone();
                tokio::task::spawn_blocking(move || pool.get_timeout(timeout))
                    .await
                    .map_err(|e| e.to_string())?
                    .map(Lease::Pooled)
                    .map_err(|e| e.to_string())
            }
            Some(target) => {
                // Opening a missing file would create an empty database.
                if target != ":memory:" && !Path::new(target).exists() {
                    return Err(format!("database file not found: {}", target));
                }

                debug!("Opening dedicated connection to {}", target);
                let target = target.to_string();
                let task = tokio::task::spawn_blocking(move || Connection::open(&target));
                match tokio::time::timeout(timeout, task).await {
                    Ok(Ok(Ok(conn))) => Ok(Lease::Dedicated(conn)),
                    Ok(Ok(Err(e))) => Err(e.to_string()),
                    Ok(Err(join_err)) => Err(join_err.to_string()),
                    Err(_) => Err(format!("connect timed out after {:?}", timeout)),
                }
            }
        }
    }
}

/// Runs one statement in its own transaction: committed on success, rolled back
/// when the transaction guard drops on any error path.
fn run_statement(mut conn: Lease, sql: &str) -> duckdb::Result<ExecutionOutcome> {
    let tx = conn.transaction()?;

    let outcome = if returns_rows(sql) {
        let mut stmt = tx.prepare(sql)?;
        let mut rows = stmt.query([])?;
        let columns = rows.as_ref().map(|s| s.column_names()).unwrap_or_default();

        let mut data = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(columns.len());
            for i in 0..columns.len() {
                values.push(row.get::<_, Value>(i)?);
            }
            data.push(values);
        }

        info!("Query returned {} row(s)", data.len());
        ExecutionOutcome::RowsReturned {
            columns,
            rows: data,
        }
    } else {
        let count = tx.execute(sql, [])?;
        info!("Statement affected {} row(s)", count);
        ExecutionOutcome::RowsAffected { count }
    };

    tx.commit()?;
    Ok(outcome)
}
