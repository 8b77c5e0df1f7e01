//! Prompt construction for LLM requests.
//!
//! Builds the SQL generation prompt (with database schema context) and the
//! answer prompt that turns a query result into prose.

use crate::llm::types::Message;

/// Label that introduces the execution result in the answer prompt.
pub const RESULT_MARKER: &str = "SQL Result: ";

/// Label that ends the answer prompt.
pub const ANSWER_MARKER: &str = "\nAnswer:";

/// System prompt template for SQL generation.
const GENERATION_PROMPT_TEMPLATE: &str = r#"You are a {dialect} expert working on the MedShop medical inventory database. Given an input question, create one syntactically correct {dialect} query that answers it.

DATABASE SCHEMA:
{schema}

INSTRUCTIONS:
- Generate only valid {dialect} SQL
- Only read data: use SELECT (optionally with WITH). Never modify data or the schema
- Unless the question asks for a specific number of results, return at most {row_limit} rows using a LIMIT clause
- Select only the columns needed to answer the question
- Use only tables and columns that appear in the schema above
- Use appropriate JOINs based on foreign keys

OUTPUT FORMAT:
Return the SQL query wrapped in ```sql code blocks, with no explanation."#;

/// Instruction line of the answer synthesis prompt.
const ANSWER_INSTRUCTION: &str =
    "Given the following user question, corresponding SQL query, and SQL result, answer the user question.";

/// Builds the system prompt with dialect, schema and row limit injected.
pub fn build_generation_prompt(dialect: &str, schema: &str, row_limit: usize) -> String {
    GENERATION_PROMPT_TEMPLATE
        .replace("{dialect}", dialect)
        .replace("{row_limit}", &row_limit.to_string())
        .replace("{schema}", schema)
}

/// Builds the message list for a SQL generation request.
pub fn build_generation_messages(
    dialect: &str,
    schema: &str,
    row_limit: usize,
    question: &str,
) -> Vec<Message> {
    vec![
        Message::system(build_generation_prompt(dialect, schema, row_limit)),
        Message::user(question),
    ]
}

/// Builds the message list for an answer synthesis request.
pub fn build_answer_messages(question: &str, query: &str, result: &str) -> Vec<Message> {
    let prompt = format!(
        "{ANSWER_INSTRUCTION}\n\nQuestion: {question}\nSQL Query: {query}\n{RESULT_MARKER}{result}{ANSWER_MARKER} "
    );
    vec![Message::user(prompt)]
}
