//! Rewrites a query so it only sees rows that satisfy the boundary
//! constraints.
//!
//! Constraints attach to the first top-level MATCH: conjoined in front of its
//! WHERE, or as a new WHERE straight after it. The existing filter is
//! parenthesised so operator precedence cannot lift it out of the
//! conjunction. A query that only creates new data passes through; any other
//! query without a MATCH to anchor on is rejected.

use tracing::debug;

use crate::error::AuthorizationError;
use crate::pattern::{clauses, Clause};

/// Clause verbs that never read or change existing data on their own.
const CREATE_ONLY: [&str; 8] = [
    "CREATE", "UNWIND", "WITH", "WHERE", "RETURN", "BY", "SKIP", "LIMIT",
];

/// Attach `constraints` to `query`.
///
/// Fails with [`AuthorizationError::UnconstrainedQuery`] when the query
/// would touch existing data with no filter the constraints can join.
pub fn inject_constraints(
    query: &str,
    constraints: &[String],
) -> Result<String, AuthorizationError> {
    if constraints.is_empty() {
        return Ok(query.to_string());
    }

    let all = clauses(query);
    let top: Vec<&Clause> = all.iter().filter(|c| c.depth == 0).collect();
    // A second UNION branch would run unfiltered.
    if top.iter().any(|c| c.keyword == "UNION") {
        return Err(AuthorizationError::UnconstrainedQuery);
    }

    let joined = constraints.join(" AND ");
    let anchor = top
        .iter()
        .position(|c| matches!(c.keyword.as_str(), "MATCH" | "OPTIONAL MATCH"));
    if let Some(i) = anchor {
        let next = top.get(i + 1);
        let guarded = match next {
            Some(filter) if filter.keyword == "WHERE" => {
                let end = top.get(i + 2).map_or(query.len(), |c| c.start);
                conjoin(query, filter, end, &joined)
            }
            _ => insert(query, next.map_or(query.len(), |c| c.start), &joined),
        };
        return Ok(guarded);
    }

    if all.iter().all(|c| CREATE_ONLY.contains(&c.verb())) {
        debug!("Query only creates new data; no boundary filter attached");
        return Ok(query.to_string());
    }
    Err(AuthorizationError::UnconstrainedQuery)
}

/// `WHERE (<constraints>) AND (<existing filter>)`, keeping the text around
/// the filter intact.
fn conjoin(query: &str, filter: &Clause, end: usize, joined: &str) -> String {
    let existing = &query[filter.body_start..end];
    let kept = existing.trim_end();
    let trailing = &existing[kept.len()..];
    let tail = &query[end..];
    let separator = if trailing.is_empty() && !tail.is_empty() {
        " "
    } else {
        trailing
    };
    format!(
        "{}WHERE ({joined}) AND ({}){separator}{tail}",
        &query[..filter.start],
        kept.trim_start()
    )
}

fn insert(query: &str, at: usize, joined: &str) -> String {
    let (head, tail) = query.split_at(at);
    let lead = if head.is_empty() || head.ends_with(char::is_whitespace) {
        ""
    } else {
        " "
    };
    let trail = if tail.is_empty() { "" } else { " " };
    format!("{head}{lead}WHERE {joined}{trail}{tail}")
}
