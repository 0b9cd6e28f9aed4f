use std::error::Error;
use std::fmt;

use crate::schema::SchemaDescription;

pub const SYSTEM_PROMPT: &str =
    "You are a SQL expert. Output only a single SQL statement, with no explanations and no markdown.";

/// The two chat messages sent to the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTooLarge {
    pub estimated_tokens: usize,
    pub limit: usize,
}

impl fmt::Display for PromptTooLarge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "prompt needs about {} tokens but the model context allows {}",
            self.estimated_tokens, self.limit
        )
    }
}

impl Error for PromptTooLarge {}

/// Rough token estimate: four characters per token, rounded up.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

pub struct PromptBuilder {
    context_limit_tokens: usize,
    reserved_completion_tokens: usize,
}

impl PromptBuilder {
    pub fn new(context_limit_tokens: usize, reserved_completion_tokens: usize) -> Self {
        Self {
            context_limit_tokens,
            reserved_completion_tokens,
        }
    }

    /// Builds the prompt for `question`. Never truncates the schema: an oversized
    /// prompt is an error.
    pub fn build(&self, question: &str, schema: &SchemaDescription) -> Result<Prompt, PromptTooLarge> {
        let mut rules = String::new();
        for rule in &schema.rules {
            rules.push_str("- ");
            rules.push_str(rule);
            rules.push('\n');
        }

        let user = format!(
            r#"### Instructions:
Your task is to convert a question into a single {dialect} SQL query, given a database schema.
Adhere to these rules:
{rules}- Use only tables, columns and relationships listed in the schema

### Schema (version {version}):
{schema}
### Question:
{question}

### Response:
Return ONLY the SQL statement. Do not include explanations, comments or markdown code fences."#,
            dialect = schema.dialect,
            rules = rules,
            version = schema.version,
            schema = schema.render(),
            question = question.trim(),
        );

        let estimated_tokens =
            estimate_tokens(SYSTEM_PROMPT) + estimate_tokens(&user) + self.reserved_completion_tokens;
        if estimated_tokens > self.context_limit_tokens {
            return Err(PromptTooLarge {
                estimated_tokens,
                limit: self.context_limit_tokens,
            });
        }

        Ok(Prompt {
            system: SYSTEM_PROMPT.to_string(),
            user,
        })
    }
}
