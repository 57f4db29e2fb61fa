pub mod ollama;
pub mod remote;

/// Shared prompt framing for both providers: the model must produce an
/// `Answer:` line (the answer template) and the SQL in a fenced block,
/// which is what `llm::parse` expects on the way back out.
pub fn prepare_prompt(question: &str, schema: &str) -> String {
    format!(
        r#"
### Instructions:
Your task is to answer a question about a DuckDB database by writing a SQL query for it.
Adhere to these rules:
- **Be careful with column names - they are case sensitive**
- **Use the exact spelling of column names as provided in the schema**
- **Deliberately go through the question and database schema word by word** to appropriately answer the question
- **Use Table Aliases** to prevent ambiguity. For example, `SELECT table1.col1, table2.col1 FROM table1 JOIN table2 ON table1.id = table2.id`.
- When creating a ratio, always cast the numerator as float

### Input:
Answer the question `{}`.
The query will run on a DuckDB database with the following tables and columns:

{}

### Expected Response Format:
Reply with exactly two parts:
1. One line starting with `Answer:` followed by a short phrase that introduces the result, for example `Answer: Total users:`
2. The SQL query in a ```sql fenced block, ending with a semicolon. Use lowercase for SQL keywords and double quotes around column names with spaces or special characters.

### Response:
"#,
        question, schema
    )
}
