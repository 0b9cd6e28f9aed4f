//! Question → SQL → result pipeline.
//!
//! Stages run strictly in order: build prompt, translate, extract, execute,
//! marshal. Translation trouble drops to the fallback generator (unless strict
//! mode is configured); execution trouble ends the request with the attempted
//! SQL in the envelope. Execution is never retried.

use std::error::Error;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{AppConfig, LlmConfig};
use crate::db::executor::QueryExecutor;
use crate::db::marshal::{marshal, ResponseEnvelope};
use crate::llm::models::{FallbackReason, TranslationResult};
use crate::llm::prompt::{PromptBuilder, PromptTooLarge};
use crate::llm::{LlmError, LlmTranslator};
use crate::schema::SchemaDescription;
use crate::sql::{extract_sql, fallback};

/// A question as received from a caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationRequest {
    pub question: String,
    pub database_target: Option<String>,
}

impl TranslationRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            database_target: None,
        }
    }
}

/// Settings fixed at startup and threaded into the pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub schema: Arc<SchemaDescription>,
    pub context_limit_tokens: usize,
    pub reserved_completion_tokens: usize,
    pub fallback_enabled: bool,
}

impl PipelineConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self::new(Arc::new(config.schema_description()), &config.llm)
    }

    pub fn new(schema: Arc<SchemaDescription>, llm: &LlmConfig) -> Self {
        Self {
            schema,
            context_limit_tokens: llm.context_limit_tokens,
            reserved_completion_tokens: llm.max_tokens,
            fallback_enabled: llm.fallback_enabled,
        }
    }
}

#[derive(Debug)]
pub enum StartupError {
    /// The schema alone does not fit the model context.
    PromptTooLarge(PromptTooLarge),
}

impl fmt::Display for StartupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartupError::PromptTooLarge(e) => write!(f, "schema description too large: {}", e),
        }
    }
}

impl Error for StartupError {}

/// How a request ended; the web layer maps this to an HTTP status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Answered,
    Rejected,
    LlmUnavailable,
    ExecutionFailed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineResponse {
    pub disposition: Disposition,
    pub envelope: ResponseEnvelope,
}

pub struct Pipeline {
    config: PipelineConfig,
    prompts: PromptBuilder,
    translator: LlmTranslator,
    executor: QueryExecutor,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        translator: LlmTranslator,
        executor: QueryExecutor,
    ) -> Result<Self, StartupError> {
        let prompts = PromptBuilder::new(config.context_limit_tokens, config.reserved_completion_tokens);

        // A schema that cannot fit even an empty question is a configuration error.
        prompts
            .build("", &config.schema)
            .map_err(StartupError::PromptTooLarge)?;

        Ok(Self {
            config,
            prompts,
            translator,
            executor,
        })
    }

    pub fn schema(&self) -> &SchemaDescription {
        &self.config.schema
    }

    pub fn translator(&self) -> &LlmTranslator {
        &self.translator
    }

    pub fn database_target(&self) -> &str {
        self.executor.default_target()
    }

    pub async fn run(&self, request: &TranslationRequest) -> PipelineResponse {
        let started = Instant::now();
        let question = request.question.trim();

        if question.is_empty() {
            return PipelineResponse {
                disposition: Disposition::Rejected,
                envelope: ResponseEnvelope::failure(None, "Question cannot be empty"),
            };
        }

        info!("Received question: {}", question);

        let translation = self.translate(question).await;
        debug!("Translation result: {:?}", translation);

        if let TranslationResult::TranslationFailed { reason } = &translation {
            return PipelineResponse {
                disposition: Disposition::LlmUnavailable,
                envelope: ResponseEnvelope::failure(Some(question), reason.clone()),
            };
        }

        let outcome = self
            .executor
            .execute(request.database_target.as_deref(), translation.sql())
            .await;

        let envelope = marshal(question, &translation, outcome);
        let disposition = if envelope.success {
            Disposition::Answered
        } else {
            Disposition::ExecutionFailed
        };

        info!(
            "Question handled in {}ms (source: {:?}, success: {})",
            started.elapsed().as_millis(),
            envelope.source,
            envelope.success
        );

        PipelineResponse {
            disposition,
            envelope,
        }
    }

    /// BuildingPrompt → Translating → Extracting, with the fallback edge.
    async fn translate(&self, question: &str) -> TranslationResult {
        let raw = match self.prompts.build(question, &self.config.schema) {
            Ok(prompt) => self.translator.translate(&prompt).await,
            Err(e) => {
                warn!("Prompt rejected: {}", e);
                return self.fall_back(question, FallbackReason::PromptTooLarge(e.to_string()));
            }
        };

        let raw = match raw {
            Ok(raw) => raw,
            Err(LlmError::Unconfigured) => {
                return self.fall_back(question, FallbackReason::Unconfigured);
            }
            Err(e) => {
                warn!("LLM translation failed: {}", e);
                return self.fall_back(question, FallbackReason::LlmFailed(e.to_string()));
            }
        };

        let sql = extract_sql(&raw);
        if sql.is_empty() {
            warn!("Model output contained no SQL");
            return self.fall_back(question, FallbackReason::ExtractionEmpty);
        }

        info!("Generated SQL: {}", sql);
        TranslationResult::Translated { sql }
    }

    fn fall_back(&self, question: &str, reason: FallbackReason) -> TranslationResult {
        if !self.config.fallback_enabled {
            return TranslationResult::TranslationFailed {
                reason: reason.to_string(),
            };
        }

        let sql = fallback::generate(question).to_string();
        info!("Using fallback SQL ({}): {}", reason, sql);
        TranslationResult::FallbackUsed { sql, reason }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use crate::db::testing::seed_invoices;
    use crate::llm::testing::ScriptedClient;
    use crate::schema::invoice_schema;
    use crate::util::retry::testing::RecordingSleeper;
    use crate::util::retry::RetryPolicy;
    use serde_json::json;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn pipeline_config(fallback_enabled: bool) -> PipelineConfig {
        PipelineConfig {
            schema: Arc::new(invoice_schema()),
            context_limit_tokens: 32768,
            reserved_completion_tokens: 1024,
            fallback_enabled,
        }
    }

    fn executor(path: &str) -> QueryExecutor {
        QueryExecutor::new(&DatabaseConfig {
            connection_string: path.to_string(),
            ..DatabaseConfig::default()
        })
    }

    fn scripted(replies: Vec<Result<String, LlmError>>) -> (LlmTranslator, Arc<AtomicUsize>) {
        let client = ScriptedClient::new(replies);
        let calls = client.calls.clone();
        let translator = LlmTranslator::with_client(
            Box::new(client),
            RetryPolicy::linear(3, Duration::from_secs(1)),
            Arc::new(RecordingSleeper::default()),
        );
        (translator, calls)
    }

    fn unconfigured() -> LlmTranslator {
        LlmTranslator::unconfigured(RetryPolicy::linear(3, Duration::from_secs(1)))
    }

    fn seeded_pipeline(dir: &Path, translator: LlmTranslator) -> Pipeline {
        Pipeline::new(pipeline_config(true), translator, executor(&seed_invoices(dir))).unwrap()
    }

    #[tokio::test]
    async fn empty_question_is_rejected_before_any_work() {
        let dir = tempfile::tempdir().unwrap();
        let (translator, calls) = scripted(vec![Ok("SELECT 1".to_string())]);
        let pipeline = seeded_pipeline(dir.path(), translator);

        let response = pipeline.run(&TranslationRequest::new("   ")).await;

        assert_eq!(response.disposition, Disposition::Rejected);
        assert!(!response.envelope.success);
        assert_eq!(response.envelope.sql, "");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn model_sql_is_extracted_and_executed() {
        let dir = tempfile::tempdir().unwrap();
        let (translator, calls) = scripted(vec![Ok(
            "```sql\nSELECT name FROM \"Vendor\" ORDER BY id LIMIT 2;\n```".to_string(),
        )]);
        let pipeline = seeded_pipeline(dir.path(), translator);

        let response = pipeline.run(&TranslationRequest::new("first two vendors")).await;

        assert_eq!(response.disposition, Disposition::Answered);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let envelope = response.envelope;
        assert_eq!(envelope.sql, "SELECT name FROM \"Vendor\" ORDER BY id LIMIT 2");
        assert_eq!(
            serde_json::to_value(envelope.results.unwrap()).unwrap(),
            json!([{ "name": "Acme Supplies" }, { "name": "Globex" }])
        );
    }

    #[tokio::test]
    async fn missing_credential_uses_fallback_without_network() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = seeded_pipeline(dir.path(), unconfigured());

        let response = pipeline
            .run(&TranslationRequest::new("Who are our TOP Vendors?"))
            .await;

        assert_eq!(response.disposition, Disposition::Answered);
        let envelope = response.envelope;
        assert_eq!(envelope.sql, fallback::TOP_VENDORS_SQL);
        assert_eq!(envelope.fallback_reason.as_deref(), Some("LLM API key not configured"));
        assert_eq!(
            serde_json::to_value(envelope.results.unwrap()).unwrap(),
            json!([
                { "vendor": "Acme Supplies", "total": 500.0 },
                { "vendor": "Globex", "total": 250.5 },
                { "vendor": "Initech", "total": 50.0 }
            ])
        );
    }

    #[tokio::test]
    async fn repeated_llm_failures_fall_back_to_recent_invoices() {
        let dir = tempfile::tempdir().unwrap();
        let path = seed_invoices(dir.path());
        let (translator, calls) = scripted(vec![
            Err(LlmError::Timeout("t".to_string())),
            Err(LlmError::RateLimited(None)),
            Err(LlmError::Unknown("u".to_string())),
        ]);
        let pipeline = Pipeline::new(pipeline_config(true), translator, executor(&path)).unwrap();

        let response = pipeline.run(&TranslationRequest::new("show invoices")).await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(response.disposition, Disposition::Answered);
        let envelope = response.envelope;
        assert!(envelope.success);
        assert_eq!(envelope.sql, fallback::RECENT_INVOICES_SQL);

        // Same rows as running the fallback statement directly.
        let direct = marshal(
            "show invoices",
            &TranslationResult::Translated {
                sql: fallback::RECENT_INVOICES_SQL.to_string(),
            },
            pipeline.executor.execute(None, fallback::RECENT_INVOICES_SQL).await,
        );
        assert_eq!(envelope.results, direct.results);

        let results = envelope.results.unwrap();
        assert_eq!(results.len(), 4);
        assert_eq!(results[0]["invoiceRef"], json!("INV-003"));
        assert_eq!(results[0]["invoiceDate"], json!("2024-03-01T12:30:45"));
    }

    #[tokio::test]
    async fn unusable_model_output_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let (translator, _) = scripted(vec![Ok("``` ```".to_string())]);
        let pipeline = seeded_pipeline(dir.path(), translator);

        let response = pipeline.run(&TranslationRequest::new("anything")).await;

        assert_eq!(response.envelope.sql, fallback::RECENT_INVOICES_SQL);
        assert_eq!(
            response.envelope.fallback_reason.as_deref(),
            Some("model returned no usable SQL")
        );
    }

    #[tokio::test]
    async fn write_statement_reports_rows_affected() {
        let dir = tempfile::tempdir().unwrap();
        let (translator, _) = scripted(vec![Ok(
            "UPDATE \"Invoice\" SET \"totalAmount\" = 1 WHERE \"vendorId\" = 1".to_string(),
        )]);
        let pipeline = seeded_pipeline(dir.path(), translator);

        let response = pipeline.run(&TranslationRequest::new("zero acme")).await;

        assert_eq!(response.disposition, Disposition::Answered);
        assert_eq!(response.envelope.rows_affected, Some(2));
        assert!(response.envelope.results.is_none());
    }

    #[tokio::test]
    async fn bad_generated_sql_is_reported_not_retried() {
        let dir = tempfile::tempdir().unwrap();
        let (translator, calls) = scripted(vec![Ok("SELECT missing FROM nowhere".to_string())]);
        let pipeline = seeded_pipeline(dir.path(), translator);

        let response = pipeline.run(&TranslationRequest::new("broken")).await;

        assert_eq!(response.disposition, Disposition::ExecutionFailed);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!response.envelope.success);
        assert_eq!(response.envelope.sql, "SELECT missing FROM nowhere");
        assert!(response.envelope.error.unwrap().contains("nowhere"));
    }

    #[tokio::test]
    async fn unreachable_database_keeps_attempted_sql() {
        let config = DatabaseConfig {
            connection_string: "/nonexistent/dir/db.duckdb".to_string(),
            connect_timeout_secs: 0,
            connect_retry_delay_ms: 0,
            ..DatabaseConfig::default()
        };
        let executor = QueryExecutor::new(&config).with_sleeper(Arc::new(RecordingSleeper::default()));
        let pipeline = Pipeline::new(pipeline_config(true), unconfigured(), executor).unwrap();

        let response = pipeline.run(&TranslationRequest::new("top vendors")).await;

        assert_eq!(response.disposition, Disposition::ExecutionFailed);
        assert_eq!(response.envelope.sql, fallback::TOP_VENDORS_SQL);
        assert!(response
            .envelope
            .error
            .unwrap()
            .contains("database connection failed after 3 attempt(s)"));
    }

    #[tokio::test]
    async fn strict_mode_reports_translation_failure() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::new(
            pipeline_config(false),
            unconfigured(),
            executor(&seed_invoices(dir.path())),
        )
        .unwrap();

        let response = pipeline.run(&TranslationRequest::new("top vendors")).await;

        assert_eq!(response.disposition, Disposition::LlmUnavailable);
        assert_eq!(response.envelope.sql, "");
        assert_eq!(
            response.envelope.error.as_deref(),
            Some("LLM API key not configured")
        );
    }

    #[tokio::test]
    async fn oversized_question_falls_back_without_calling_model() {
        let dir = tempfile::tempdir().unwrap();
        let (translator, calls) = scripted(vec![Ok("SELECT 1".to_string())]);
        let mut config = pipeline_config(true);
        config.context_limit_tokens = 3000;
        config.reserved_completion_tokens = 1024;
        let pipeline =
            Pipeline::new(config, translator, executor(&seed_invoices(dir.path()))).unwrap();

        let question = format!("top vendor {}", "very long question ".repeat(2000));
        let response = pipeline.run(&TranslationRequest::new(question)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(response.envelope.sql, fallback::TOP_VENDORS_SQL);
        assert!(response
            .envelope
            .fallback_reason
            .unwrap()
            .starts_with("prompt too large"));
    }

    #[test]
    fn schema_larger_than_context_is_a_startup_error() {
        let mut config = pipeline_config(true);
        config.context_limit_tokens = 100;

        let result = Pipeline::new(config, unconfigured(), executor(":memory:"));
        assert!(matches!(result, Err(StartupError::PromptTooLarge(_))));
    }
}
