use crate::db::schema::SchemaContext;

/// Everything the prompt is built from. Borrowed; building has no side effects.
pub struct PromptInput<'a> {
    pub question: &'a str,
    pub history: &'a [String],
    pub history_window: usize,
    pub schema: &'a SchemaContext,
    pub top_k: usize,
}

const EXAMPLES: &[(&str, &str)] = &[
    (
        "New question: list recent entries from table1",
        "SELECT * FROM table1 ORDER BY created_at DESC LIMIT 5;",
    ),
    (
        "Continue question: filter above by status = 'active'",
        "SELECT * FROM table1 WHERE status = 'active' ORDER BY created_at DESC LIMIT 5;",
    ),
];

/// The last `window` entries of `history`, oldest first.
pub fn window_history(history: &[String], window: usize) -> &[String] {
    let start = history.len().saturating_sub(window);
    &history[start..]
}

pub fn build_prompt(input: &PromptInput<'_>) -> String {
    let history = window_history(input.history, input.history_window);
    let history_text = if history.is_empty() {
        "(none)".to_string()
    } else {
        history.join("\n")
    };

    let examples_text = EXAMPLES
        .iter()
        .map(|(question, answer)| format!("Question: {}\n```sql\n{}\n```", question, answer))
        .collect::<Vec<_>>()
        .join("\n\n");

    let schema_text = if input.schema.tables.is_empty() {
        "(no tables)".to_string()
    } else {
        input.schema.description()
    };

    format!(
        r#"### Instructions:
You are an assistant that writes valid DuckDB SQL queries for a multi-table database.
Adhere to these rules:
- **Use the exact spelling of table and column names as provided in the schema**
- **Use the conversation history for context**; entries starting with "Previous SQL error" describe a failed attempt that must be fixed
- **Use Table Aliases** to prevent ambiguity. For example, `SELECT t1.col1, t2.col1 FROM table1 t1 JOIN table2 t2 ON t1.id = t2.id`.
- Make sure to use double quotes around column names with spaces or special characters
- Only output the SQL query, enclosed in a single ```sql code block

### Examples:
{examples_text}

### Conversation History:
{history_text}

### Database Schema:
{schema_text}

### Sample Rows:
{samples}
### Row Limit:
Unless the question asks for a specific number of rows, return at most {top_k} rows.

### Current Question:
{question}

### Response:
"#,
        samples = input.schema.samples_text(),
        top_k = input.top_k,
        question = input.question,
    )
}
