//! Rule-based query rewriting
//!
//! A data-driven table of known AQL syntax limitations. Rules with a
//! replacement template perform a global substitution; rules without one are
//! diagnose-only and surface through [`lint`]. Rewriting is pure and
//! idempotent on its own output: re-running [`rewrite`] on a rewritten query
//! yields no further changes.

use lazy_static::lazy_static;
use regex::Regex;

/// One entry in the rewrite table.
pub struct RuleEntry {
    pub pattern: Regex,
    /// Replacement template; `None` means the construct is recognized but
    /// has no automatic fix.
    pub replacement: Option<&'static str>,
    pub description: &'static str,
}

lazy_static! {
    /// Known AQL limitations, in application order. Date extraction
    /// functions rewrite to SUBSTRING over the ISO timestamp; the rest are
    /// diagnose-only.
    pub static ref RULES: Vec<RuleEntry> = vec![
        RuleEntry {
            pattern: Regex::new(r"(?i)YEAR\s*\(\s*(\w+)\s*\)").unwrap(),
            replacement: Some("SUBSTRING(${1}, 1, 4)"),
            description: "YEAR(column) with SUBSTRING(column, 1, 4)",
        },
        RuleEntry {
            pattern: Regex::new(r"(?i)MONTH\s*\(\s*(\w+)\s*\)").unwrap(),
            replacement: Some("SUBSTRING(${1}, 6, 2)"),
            description: "MONTH(column) with SUBSTRING(column, 6, 2)",
        },
        RuleEntry {
            pattern: Regex::new(r"(?i)DAY\s*\(\s*(\w+)\s*\)").unwrap(),
            replacement: Some("SUBSTRING(${1}, 9, 2)"),
            description: "DAY(column) with SUBSTRING(column, 9, 2)",
        },
        RuleEntry {
            pattern: Regex::new(r"(?i)DATE_ADD\s*\(").unwrap(),
            replacement: None,
            description: "DATE_ADD()",
        },
        RuleEntry {
            pattern: Regex::new(r"(?i)DATE_SUB\s*\(").unwrap(),
            replacement: None,
            description: "DATE_SUB()",
        },
        RuleEntry {
            pattern: Regex::new(r"(?i)\bINTERVAL\b").unwrap(),
            replacement: None,
            description: "INTERVAL expressions",
        },
        RuleEntry {
            pattern: Regex::new(r"(?i)COUNT\s*\(\s*DISTINCT").unwrap(),
            replacement: None,
            description: "COUNT(DISTINCT ...)",
        },
    ];

    static ref GROUP_BY_CLAUSE: Regex =
        Regex::new(r"(?is)GROUP\s+BY\s+(.*?)(?:ORDER\s+BY|HAVING|LIMIT|;|$)").unwrap();
    static ref ORDER_BY_CLAUSE: Regex =
        Regex::new(r"(?is)ORDER\s+BY\s+(.*?)(?:LIMIT|;|$)").unwrap();
    static ref ALIAS_IN_GROUP_BY: Regex = Regex::new(r#"(?i)\bAS\s+[^",\s]+"#).unwrap();
    static ref WHERE_CLAUSE: Regex =
        Regex::new(r"(?is)WHERE\s+(.*?)(?:GROUP\s+BY|ORDER\s+BY|LIMIT|;|$)").unwrap();
}

/// Result of a rewrite pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteOutcome {
    pub query: String,
    /// Human-readable description of each substitution made; empty when the
    /// query was left unchanged.
    pub changes: Vec<String>,
}

/// Apply every replacement rule globally, then keep GROUP BY / ORDER BY
/// clauses textually consistent with the rewritten projection.
pub fn rewrite(query: &str) -> RewriteOutcome {
    let mut out = query.to_string();
    let mut changes = Vec::new();

    for rule in RULES.iter() {
        let Some(replacement) = rule.replacement else {
            continue;
        };
        let count = rule.pattern.find_iter(&out).count();
        if count > 0 {
            out = rule.pattern.replace_all(&out, replacement).into_owned();
            changes.push(format!("replaced {} occurrence(s) of {}", count, rule.description));
        }
    }

    // An aggregate expression rewritten in the projection must be rewritten
    // the same way where it reappears in GROUP BY / ORDER BY.
    for (clause_re, clause_name) in [(&*GROUP_BY_CLAUSE, "GROUP BY"), (&*ORDER_BY_CLAUSE, "ORDER BY")] {
        if let Some(caps) = clause_re.captures(&out) {
            let clause = caps.get(1).map(|m| m.as_str().to_string()).unwrap_or_default();
            let mut fixed_clause = clause.clone();
            for rule in RULES.iter() {
                if let Some(replacement) = rule.replacement {
                    if rule.pattern.is_match(&fixed_clause) {
                        fixed_clause = rule.pattern.replace_all(&fixed_clause, replacement).into_owned();
                    }
                }
            }
            if fixed_clause != clause {
                out = out.replace(&clause, &fixed_clause);
                changes.push(format!("updated {} clause to match rewritten expressions", clause_name));
            }
        }
    }

    RewriteOutcome { query: out, changes }
}

/// Diagnose-only structural checks. These never alter the query; they
/// produce explanations for constructs the service is known to reject.
pub fn lint(query: &str) -> Vec<String> {
    let mut findings = Vec::new();

    for rule in RULES.iter() {
        if rule.replacement.is_none() && rule.pattern.is_match(query) {
            findings.push(format!("AQL does not support {}", rule.description));
        }
    }

    if let Some(caps) = GROUP_BY_CLAUSE.captures(query) {
        let columns = caps.get(1).map(|m| m.as_str().trim()).unwrap_or_default();
        if ALIAS_IN_GROUP_BY.is_match(columns) {
            findings.push("In GROUP BY, use original column names, not aliases".to_string());
        }
    }

    if let Some(caps) = ORDER_BY_CLAUSE.captures(query) {
        let columns = caps.get(1).map(|m| m.as_str().trim()).unwrap_or_default();
        let all_quoted = columns
            .split(',')
            .map(|c| c.trim().trim_end_matches(|ch: char| ch.is_whitespace()))
            .filter(|c| !c.is_empty())
            .all(|c| c.contains('"'));
        if !columns.is_empty() && !all_quoted {
            findings.push("In ORDER BY, use quoted column aliases: ORDER BY \"Column\"".to_string());
        }
    }

    if let Some(caps) = WHERE_CLAUSE.captures(query) {
        let condition = caps.get(1).map(|m| m.as_str().trim()).unwrap_or_default();
        if (condition.contains(" AND ") || condition.contains(" OR ")) && !condition.starts_with('(') {
            findings.push("Wrap each WHERE condition in parentheses: WHERE (a) AND (b)".to_string());
        }
    }

    if !query.trim().to_uppercase().starts_with("SET @@DEFAULT_COLUMNS") {
        findings.push("Start AQL queries with SET @@DEFAULT_COLUMNS=".to_string());
    }

    findings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_year_rewritten_to_substring() {
        let out = rewrite("SELECT YEAR(createTime) as \"Year\"");
        assert_eq!(out.query, "SELECT SUBSTRING(createTime, 1, 4) as \"Year\"");
        assert_eq!(out.changes.len(), 1);
        assert!(out.changes[0].contains("YEAR(column)"));
    }

    #[test]
    fn test_month_and_day_rewritten() {
        let out = rewrite("SELECT MONTH(modifyTime), DAY(modifyTime)");
        assert_eq!(
            out.query,
            "SELECT SUBSTRING(modifyTime, 6, 2), SUBSTRING(modifyTime, 9, 2)"
        );
        assert_eq!(out.changes.len(), 2);
    }

    #[test]
    fn test_case_insensitive_match() {
        let out = rewrite("select year(createTime)");
        assert_eq!(out.query, "select SUBSTRING(createTime, 1, 4)");
    }

    #[test]
    fn test_group_by_clause_stays_consistent() {
        let q = "SELECT YEAR(createTime) as \"Year\", COUNT(name) as \"Count\" GROUP BY YEAR(createTime)";
        let out = rewrite(q);
        assert!(out.query.contains("GROUP BY SUBSTRING(createTime, 1, 4)"));
        assert!(!out.query.to_uppercase().contains("YEAR("));
    }

    #[test]
    fn test_diagnose_only_rules_never_rewrite() {
        let q = "SELECT COUNT(DISTINCT extension) WHERE createTime > DATE_SUB(now)";
        let out = rewrite(q);
        assert_eq!(out.query, q);
        assert!(out.changes.is_empty());

        let findings = lint(q);
        assert!(findings.iter().any(|f| f.contains("COUNT(DISTINCT")));
        assert!(findings.iter().any(|f| f.contains("DATE_SUB()")));
    }

    #[test]
    fn test_no_match_returns_input_unchanged() {
        let q = "SET @@DEFAULT_COLUMNS=name,size;\nSELECT name, size WHERE (size > 100)";
        let out = rewrite(q);
        assert_eq!(out.query, q);
        assert!(out.changes.is_empty());
    }

    #[test]
    fn test_rewrite_is_idempotent_on_own_output() {
        let queries = [
            "SELECT YEAR(createTime), MONTH(createTime) GROUP BY YEAR(createTime)",
            "SELECT DAY(t) ORDER BY DAY(t)",
            "SELECT name WHERE (size > 1)",
            "SELECT COUNT(DISTINCT name)",
        ];
        for q in queries {
            let first = rewrite(q);
            let second = rewrite(&first.query);
            assert_eq!(second.query, first.query);
            assert!(second.changes.is_empty(), "second pass changed {:?}", q);
        }
    }

    #[test]
    fn test_lint_flags_unquoted_order_by() {
        let findings = lint("SET @@DEFAULT_COLUMNS=size;\nSELECT size as \"Size\" ORDER BY size DESC");
        assert!(findings.iter().any(|f| f.contains("ORDER BY")));
    }

    #[test]
    fn test_lint_flags_bare_where_conjunction() {
        let findings = lint("SET @@DEFAULT_COLUMNS=size;\nSELECT name WHERE size > 1 AND name LIKE '%a%'");
        assert!(findings.iter().any(|f| f.contains("parentheses")));
    }

    #[test]
    fn test_lint_flags_missing_default_columns() {
        let findings = lint("SELECT name");
        assert!(findings.iter().any(|f| f.contains("@@DEFAULT_COLUMNS")));
    }
}
