//! Prompt text for the LLM providers.

use crate::session::RepairFeedback;

/// System prompt for translating a natural-language question into AQL.
pub const SYSTEM_PROMPT: &str = r#"You are an AI assistant specialized in generating Aparavi Querying Language (AQL) queries from natural language requests.

## AQL limitations you must respect:
- AQL is SQL-92 compliant with limitations: NO joins, NO subqueries.
- NO standard SQL date functions: YEAR(), MONTH(), DAY(), DATE_ADD(), DATE_SUB() and INTERVAL are invalid.
  For date extraction use SUBSTRING over the ISO timestamp:
  year = SUBSTRING(createTime, 1, 4), month = SUBSTRING(createTime, 6, 2), day = SUBSTRING(createTime, 9, 2).
- Do NOT use COUNT(DISTINCT column); AQL does not support it.

## AQL structure requirements:
- Always begin queries with "SET @@DEFAULT_COLUMNS=" listing only valid physical columns
  (parentPath, name, size, createTime, modifyTime, objectId, instanceId, extension, ...).
  Never list derived columns, aliases or function outputs there.
- Use double quotes for column aliases: fieldName as "Display Name".
- In GROUP BY use original column names, not aliases.
- In ORDER BY always use quoted column aliases: ORDER BY "Year", "Month".
- Wrap each WHERE condition in parentheses: WHERE (condition1) AND (condition2).
- Use 'YYYY-MM-DD' date literals, or the date template variables
  {{TODAY}}, {{DATE_MINUS_30_DAYS}}, {{DATE_MINUS_90_DAYS}}, {{DATE_MINUS_6_MONTHS}},
  {{DATE_MINUS_1_YEAR}}, {{DATE_MINUS_2_YEARS}}, {{DATE_MINUS_3_YEARS}},
  {{DATE_MINUS_5_YEARS}}, {{DATE_MINUS_7_YEARS}}, {{DATE_MINUS_10_YEARS}}
  which are substituted with concrete dates before execution.
- File extensions have no leading dot: extension = 'pdf'.
- Do NOT use a FROM clause except with the STORE function.

Respond with ONLY a JSON object in this exact format, no other text:
{"understanding": "what the user asked for", "query": "the AQL query", "explanation": "what the query does"}"#;

/// System prompt for repairing an invalid AQL query.
pub const REPAIR_SYSTEM_PROMPT: &str = r#"You are an expert in Aparavi Query Language (AQL).
Fix the following invalid AQL query based on the error message.
Keep these AQL syntax requirements in mind:

1. AQL DOES NOT SUPPORT standard SQL date functions like YEAR(), MONTH(), DATE_ADD(), DATE_SUB().
2. For date extraction use SUBSTRING(): year = SUBSTRING(createTime, 1, 4), month = SUBSTRING(createTime, 6, 2), day = SUBSTRING(createTime, 9, 2).
3. In GROUP BY and ORDER BY always use quoted column aliases with commas: GROUP BY "Year", "Month".
4. For complex WHERE conditions use parentheses: WHERE (condition1) OR (condition2).
5. Only reference columns that exist in the database.
6. Make minimal changes to fix the specific error.
7. Do not repeat a candidate that already failed in a previous attempt.

Respond with ONLY a JSON object in this exact format, no other text:
{"query": "the fixed AQL query", "explanation": "what was changed and why"}"#;

/// Build the user prompt for one repair call, carrying the full error
/// context and every previous attempt so the model does not repeat itself.
pub fn repair_user_prompt(question: &str, invalid_query: &str, feedback: &RepairFeedback) -> String {
    let mut prompt = format!(
        "ORIGINAL QUESTION: {}\n\nINVALID QUERY:\n{}\n\nERROR MESSAGE:\n{}",
        question, invalid_query, feedback.error
    );

    if let Some(detail) = &feedback.detail {
        prompt.push_str(&format!(
            "\n\nERROR DETAILS:\n{}",
            serde_json::to_string_pretty(detail).unwrap_or_else(|_| "{}".to_string())
        ));

        if !detail.expecting.is_empty() {
            prompt.push_str(&format!(
                "\n\nEXPECTED TOKENS AT ERROR POSITION:\n{}\n\nThe parser encountered '{}' but was expecting one of the tokens listed above.",
                detail.expecting.join(", "),
                detail.token.as_deref().unwrap_or("unknown token"),
            ));
        }
    }

    if !feedback.previous_attempts.is_empty() {
        prompt.push_str(&format!(
            "\n\nPREVIOUS ATTEMPTS (do not repeat these):\n{}",
            serde_json::to_string_pretty(&feedback.previous_attempts)
                .unwrap_or_else(|_| "[]".to_string())
        ));
    }

    prompt.push_str("\n\nPlease fix this query by addressing the error. Return only the corrected query as JSON.");
    prompt
}
