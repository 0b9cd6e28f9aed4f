pub mod extract;
pub mod fallback;

pub use extract::extract_sql;
