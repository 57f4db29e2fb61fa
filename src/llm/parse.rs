//! Extraction of (answer template, SQL) from raw model output.
//!
//! Grammar, tried in order:
//! 1. the content of the first ```sql fence (case-insensitive tag); an
//!    unterminated fence runs to the end of the input
//! 2. the content of the first bare ``` fence whose body starts with a SQL
//!    keyword
//! 3. line scanning: from the first line starting with a SQL keyword,
//!    collecting lines until a terminating semicolon or a fence marker
//! 4. otherwise the SQL is absent
//!
//! The answer template is the first non-empty, non-fence line before the
//! SQL region, with a leading `Answer:` label stripped.

const SQL_KEYWORDS: [&str; 8] = [
    "SELECT", "WITH", "INSERT", "UPDATE", "DELETE", "CREATE", "ALTER", "DROP",
];

const DEFAULT_ANSWER: &str = "Here is what I found:";

const ANSWER_LABEL: &str = "Answer:";

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedReply {
    pub answer: String,
    pub sql: Option<String>,
}

/// Splits raw model output into the answer template and the SQL statement.
/// An absent SQL statement is a terminal condition for the turn; the
/// caller decides what to do about it.
pub fn parse_reply(raw: &str) -> ParsedReply {
    let extracted = extract_sql(raw);

    let (answer_region, sql) = match extracted {
        Some((sql_start, sql)) => (&raw[..sql_start], Some(sql)),
        None => (raw, None),
    };

    let sql = sql.filter(|s| !s.trim().is_empty());

    ParsedReply {
        answer: extract_answer(answer_region),
        sql,
    }
}

fn starts_with_sql_keyword(text: &str) -> bool {
    let upper = text.trim_start().to_uppercase();
    SQL_KEYWORDS.iter().any(|kw| upper.starts_with(kw))
}

/// Finds the SQL statement and the byte offset where its region starts.
fn extract_sql(content: &str) -> Option<(usize, String)> {
    // Stage 1: ```sql fence (tag matched case-insensitively)
    let mut search_from = 0;
    while let Some(rel) = content[search_from..].find("```") {
        let start = search_from + rel;
        let tag = &content[start + 3..];
        if tag.len() >= 3 && tag.is_char_boundary(3) && tag[..3].eq_ignore_ascii_case("sql") {
            let body_start = start + "```sql".len();
            let body = match content[body_start..].find("```") {
                Some(end) => &content[body_start..body_start + end],
                None => &content[body_start..],
            };
            return Some((start, body.trim().to_string()));
        }
        search_from = start + 3;
    }

    // Stage 2: bare fence whose body looks like SQL
    if let Some(start) = content.find("```") {
        let body_start = start + 3;
        if let Some(end) = content[body_start..].find("```") {
            let body = content[body_start..body_start + end].trim();
            if starts_with_sql_keyword(body) {
                return Some((start, body.to_string()));
            }
        }
    }

    // Stage 3: line scanning for a statement outside any fence
    let lines: Vec<&str> = content.lines().collect();
    for (i, line) in lines.iter().enumerate() {
        if !starts_with_sql_keyword(line) {
            continue;
        }
        let line_start = line.as_ptr() as usize - content.as_ptr() as usize;

        let mut sql = line.trim().to_string();
        if !sql.ends_with(';') {
            for next_line in &lines[i + 1..] {
                let next = next_line.trim();
                if next.starts_with("```") {
                    break;
                }
                sql.push(' ');
                sql.push_str(next);
                if next.ends_with(';') {
                    break;
                }
            }
        }
        return Some((line_start, sql));
    }

    None
}

fn extract_answer(region: &str) -> String {
    for line in region.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with("```") {
            continue;
        }
        if let Some(rest) = line.strip_prefix(ANSWER_LABEL) {
            let rest = rest.trim();
            if !rest.is_empty() {
                return rest.to_string();
            }
            continue;
        }
        return line.to_string();
    }
    DEFAULT_ANSWER.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_labeled_answer_and_fenced_sql() {
        let raw = "Answer: Total users:\n```sql\nSELECT COUNT(*) FROM users;\n```";
        let reply = parse_reply(raw);
        assert_eq!(reply.answer, "Total users:");
        assert_eq!(reply.sql.as_deref(), Some("SELECT COUNT(*) FROM users;"));
    }

    #[test]
    fn sql_fence_tag_is_case_insensitive() {
        let raw = "Answer: Count:\n```SQL\nSELECT 1;\n```";
        let reply = parse_reply(raw);
        assert_eq!(reply.sql.as_deref(), Some("SELECT 1;"));
    }

    #[test]
    fn unterminated_fence_runs_to_end() {
        let raw = "Answer: Count:\n```sql\nSELECT COUNT(*) FROM users;";
        let reply = parse_reply(raw);
        assert_eq!(reply.sql.as_deref(), Some("SELECT COUNT(*) FROM users;"));
    }

    #[test]
    fn bare_fence_with_sql_body() {
        let raw = "Top cities:\n```\nSELECT city, COUNT(*) FROM users GROUP BY city;\n```";
        let reply = parse_reply(raw);
        assert_eq!(reply.answer, "Top cities:");
        assert_eq!(
            reply.sql.as_deref(),
            Some("SELECT city, COUNT(*) FROM users GROUP BY city;")
        );
    }

    #[test]
    fn bare_fence_with_non_sql_body_is_ignored() {
        let raw = "Some notes\n```\njust prose, nothing else\n```";
        let reply = parse_reply(raw);
        assert_eq!(reply.sql, None);
    }

    #[test]
    fn line_scan_collects_until_semicolon() {
        let raw = "The answer is below.\nSELECT name\nFROM users\nWHERE age > 30;\nHope that helps.";
        let reply = parse_reply(raw);
        assert_eq!(
            reply.sql.as_deref(),
            Some("SELECT name FROM users WHERE age > 30;")
        );
        assert_eq!(reply.answer, "The answer is below.");
    }

    #[test]
    fn no_sql_yields_absent() {
        let reply = parse_reply("I cannot answer that question from this schema.");
        assert_eq!(reply.sql, None);
        assert_eq!(reply.answer, "I cannot answer that question from this schema.");
    }

    #[test]
    fn empty_fence_yields_absent_sql() {
        let reply = parse_reply("Answer: nothing\n```sql\n\n```");
        assert_eq!(reply.sql, None);
    }

    #[test]
    fn missing_answer_falls_back_to_default() {
        let reply = parse_reply("```sql\nSELECT 1;\n```");
        assert_eq!(reply.answer, DEFAULT_ANSWER);
        assert_eq!(reply.sql.as_deref(), Some("SELECT 1;"));
    }

    #[test]
    fn with_clause_is_recognized() {
        let raw = "Answer: Monthly totals:\n```sql\nWITH t AS (SELECT 1) SELECT * FROM t;\n```";
        let reply = parse_reply(raw);
        assert!(reply.sql.unwrap().starts_with("WITH"));
    }
}
