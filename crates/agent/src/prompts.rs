//! Prompt builders for the three generation stages.

use askdb_core::config::DatabaseBackend;

pub fn schema_prompt(schema_text: &str, question: &str) -> String {
    format!(
        "You are the Schema Agent.
Your job is to identify the relevant tables and columns needed for the user's question.
You MUST ALWAYS respond using EXACTLY this structured format:

Relevant Tables:
 - table1
 - table2

Relevant Columns:
 - table1.columnA
 - table2.columnB

DO NOT add anything else.
DO NOT explain.
DO NOT generate SQL.

Schema:
{schema_text}

Question:
{question}

Return a concise plain-text answer listing relevant tables and fields.
"
    )
}

pub fn sql_prompt(backend: DatabaseBackend, schema_text: &str, question: &str) -> String {
    let dialect = backend.dialect_name();
    format!(
        "You are the SQL Generator Agent.
Convert this natural language question into a valid {dialect} SQL query using the schema below.
Use only SELECT or WITH queries (no DROP/DELETE/INSERT/UPDATE). Use correct date functions for {dialect}.
Return only the SQL query or queries needed with no surrounding explanation.

Schema:
{schema_text}

Question:
{question}
"
    )
}

pub fn synthesis_prompt(question: &str, sql: &str, result_json: &str) -> String {
    format!(
        "You are the Synthesizer Agent.
Your job: convert SQL results into a clear, short natural-language answer.

Rules:
1. If the result contains an error, explain the error simply.
2. If rows exist, summarize them briefly, correctly, and factually.
3. DO NOT invent or hallucinate numbers.
4. Write at most 4 lines, formatted professionally.

User question: {question}

The SQL generated was:
{sql}

The SQL execution result was:
{result_json}

If the SQL execution result contains an 'error', explain why and give a helpful suggestion
(e.g., column/table not found, check field names, or adjust the question). Otherwise,
return a brief natural language answer summarizing the results. Do not fabricate numbers.
"
    )
}
