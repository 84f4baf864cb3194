//! Targeted pattern extraction over raw Cypher text.
//!
//! These are heuristics, not a parser. Clause boundaries skip string
//! literals and comments; label extraction does not. Label expressions are read in full (`:A:B`, `:A|B`, `:A&B`);
//! negated, wildcard, dynamic and parenthesised label expressions yield
//! tokens such as `!Task`, `%`, `$` or `(` that no subgraph lists, so those
//! queries are rejected rather than let through. Everything here is a pure
//! function so it can be exercised without a store.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use warden_core::CrudOperation;

/// One label in a label expression.
const LABEL_ATOM: &str = r"!?\s*(?:`[^`]*`|\w+|%|\$|\()";

fn build(pattern: &str) -> Regex {
    Regex::new(pattern).expect("static pattern must compile")
}

fn compiled(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| build(pattern))
}

/// `:Label` followed by any further `:`, `|` or `&` separated labels.
fn label_chain() -> String {
    format!(r":\s*{LABEL_ATOM}(?:(?:\s*[:|&])+\s*{LABEL_ATOM})*")
}

fn create_keyword() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    compiled(&RE, r"(?i)\bCREATE\b")
}

fn delete_keyword() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    compiled(&RE, r"(?i)\b(?:DELETE|REMOVE)\b")
}

fn update_keyword() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    compiled(&RE, r"(?i)\b(?:SET|MERGE)\b")
}

fn node_label() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| build(&format!(r"\(\s*(\w*)\s*({})", label_chain())))
}

fn relationship_label() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| build(&format!(r"\[\s*\w*\s*({})", label_chain())))
}

/// String literals, quoted identifiers and comments.
fn quoted() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    compiled(
        &RE,
        r#"'(?:[^'\\]|\\.)*'|"(?:[^"\\]|\\.)*"|`[^`]*`|//[^\n]*|(?s:/\*.*?\*/)"#,
    )
}

fn label_atom() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    compiled(&RE, LABEL_ATOM)
}

fn clause_keyword() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    compiled(
        &RE,
        r"(?i)\b(OPTIONAL\s+MATCH|MATCH|ON\s+CREATE|ON\s+MATCH|CREATE|MERGE|SET|REMOVE|DETACH\s+DELETE|DELETE|WITH|RETURN|WHERE|UNWIND|CALL|FOREACH|ORDER\s+BY|SKIP|LIMIT|UNION)\b",
    )
}

/// `alias.prop =`, `alias +=`, `alias =` or `alias:Label` at the start of a
/// SET/REMOVE item.
fn assignment_target() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        build(&format!(
            r"(?:^|,)\s*(\w+)\s*(?:({})|\.|\+=|=)",
            label_chain()
        ))
    })
}

/// `alias:Label` inside a filter.
fn label_predicate() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| build(&format!(r"\b\w+\s*({})", label_chain())))
}

fn map_literal() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    compiled(&RE, r"\{[^{}]*\}")
}

fn nested_literal() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    compiled(&RE, r"\{[^{}]*\}|\[[^\[\]]*\]|\([^()]*\)")
}

fn identifier() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    compiled(&RE, r"\w+")
}

/// Classify a query by keyword. CREATE wins over DELETE, DELETE over
/// UPDATE; anything else is a READ.
pub fn classify_operation(query: &str) -> CrudOperation {
    if create_keyword().is_match(query) {
        CrudOperation::Create
    } else if delete_keyword().is_match(query) {
        CrudOperation::Delete
    } else if update_keyword().is_match(query) {
        CrudOperation::Update
    } else {
        CrudOperation::Read
    }
}

/// Every node label the query names, in order, duplicates retained: inline
/// `( alias? :Label...` patterns, labels assigned or removed by SET/REMOVE,
/// and `alias:Label` predicates in filters.
pub fn extract_node_types(query: &str) -> Vec<String> {
    let mut found: Vec<(usize, String)> = Vec::new();
    for node in node_patterns(query) {
        found.extend(node.labels.into_iter().map(|l| (node.position, l)));
    }

    for clause in clauses(query) {
        let body = clause.body(query);
        match clause.verb() {
            "SET" | "REMOVE" => {
                for assignment in assignments(body) {
                    found.extend(assignment.labels.into_iter().map(|l| (clause.start, l)));
                }
            }
            "WHERE" => {
                for (offset, label) in label_predicates(body) {
                    found.push((clause.body_start + offset, label));
                }
            }
            _ => {}
        }
    }

    found.sort_by_key(|(position, _)| *position);
    found.into_iter().map(|(_, label)| label).collect()
}

/// Every relationship type `[ alias? :TYPE...`, in order, duplicates retained.
pub fn extract_relationship_types(query: &str) -> Vec<String> {
    relationship_label()
        .captures_iter(query)
        .flat_map(|c| labels_in(c.get(1).map_or("", |m| m.as_str())))
        .collect()
}

/// Node types the query writes: labels declared inside CREATE/MERGE
/// patterns, labels set or removed by SET/REMOVE, plus the declared labels
/// of aliases targeted by SET, REMOVE or DELETE. Aliases that never carry a
/// label are ignored.
pub fn extract_mutated_node_types(query: &str) -> Vec<String> {
    let mut aliases: HashMap<&str, Vec<String>> = HashMap::new();
    for node in node_patterns(query) {
        if !node.alias.is_empty() {
            aliases.entry(node.alias).or_insert(node.labels);
        }
    }

    let mut mutated = Vec::new();
    for clause in clauses(query) {
        let body = clause.body(query);
        match clause.verb() {
            "CREATE" | "MERGE" => {
                mutated.extend(node_patterns(body).into_iter().flat_map(|n| n.labels));
            }
            "SET" | "REMOVE" => {
                for assignment in assignments(body) {
                    if let Some(labels) = aliases.get(assignment.alias.as_str()) {
                        mutated.extend(labels.iter().cloned());
                    }
                    mutated.extend(assignment.labels);
                }
            }
            "DELETE" => {
                for token in identifier().find_iter(body) {
                    if let Some(labels) = aliases.get(token.as_str()) {
                        mutated.extend(labels.iter().cloned());
                    }
                }
            }
            _ => {}
        }
    }
    mutated
}

// ── Helpers ───────────────────────────────────────────────────────

struct NodePattern<'q> {
    position: usize,
    alias: &'q str,
    labels: Vec<String>,
}

fn node_patterns(text: &str) -> Vec<NodePattern<'_>> {
    node_label()
        .captures_iter(text)
        .map(|c| NodePattern {
            position: c.get(0).map_or(0, |m| m.start()),
            alias: c.get(1).map_or("", |m| m.as_str()),
            labels: c.get(2).map(|m| labels_in(m.as_str())).unwrap_or_default(),
        })
        .collect()
}

fn labels_in(chain: &str) -> Vec<String> {
    label_atom()
        .find_iter(chain)
        .map(|m| {
            let raw = m.as_str().trim();
            match raw.strip_prefix('!') {
                Some(rest) => format!("!{}", rest.trim_start().trim_matches('`')),
                None => raw.trim_matches('`').to_string(),
            }
        })
        .collect()
}

struct Assignment {
    alias: String,
    labels: Vec<String>,
}

/// Items of a SET/REMOVE body. Literals are blanked first so commas inside
/// maps, lists and calls do not start new items.
fn assignments(body: &str) -> Vec<Assignment> {
    let flat = blank(body, nested_literal());
    assignment_target()
        .captures_iter(&flat)
        .map(|c| Assignment {
            alias: c[1].to_string(),
            labels: c.get(2).map(|m| labels_in(m.as_str())).unwrap_or_default(),
        })
        .collect()
}

/// `alias:Label` predicates in a filter body, with their byte offsets.
/// Matches opened by `(` or `[` are node or relationship patterns and are
/// picked up by the pattern extractors instead.
fn label_predicates(body: &str) -> Vec<(usize, String)> {
    let flat = blank(body, map_literal());
    let mut found = Vec::new();
    for c in label_predicate().captures_iter(&flat) {
        let (Some(whole), Some(chain)) = (c.get(0), c.get(1)) else {
            continue;
        };
        let opener = flat[..whole.start()].trim_end().chars().next_back();
        if matches!(opener, Some('(') | Some('[')) {
            continue;
        }
        found.extend(labels_in(chain.as_str()).into_iter().map(|l| (whole.start(), l)));
    }
    found
}

/// Replace every match of `literal` with spaces until none is left. Byte
/// offsets are preserved.
fn blank(text: &str, literal: &Regex) -> String {
    let mut current = text.to_string();
    loop {
        let next = literal
            .replace_all(&current, |c: &Captures| " ".repeat(c[0].len()))
            .into_owned();
        if next == current {
            return current;
        }
        current = next;
    }
}

/// A clause keyword and the text it governs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Clause {
    /// Upper-cased keyword with single spaces, e.g. `OPTIONAL MATCH`.
    pub keyword: String,
    pub start: usize,
    pub body_start: usize,
    pub end: usize,
    /// Bracket nesting at the keyword; 0 for top-level clauses.
    pub depth: usize,
}

impl Clause {
    /// Last word of the keyword: `DETACH DELETE` is a `DELETE`.
    pub fn verb(&self) -> &str {
        self.keyword.rsplit(' ').next().unwrap_or_default()
    }

    pub fn body<'q>(&self, query: &'q str) -> &'q str {
        &query[self.body_start..self.end]
    }

    pub fn is_write(&self) -> bool {
        matches!(
            self.verb(),
            "CREATE" | "MERGE" | "SET" | "REMOVE" | "DELETE" | "FOREACH"
        )
    }
}

/// Split a query into clauses. Each body runs to the next keyword at any
/// depth. Keywords used as property or parameter names, or inside string
/// literals and comments, are skipped.
pub(crate) fn clauses(query: &str) -> Vec<Clause> {
    let masked = blank(query, quoted());
    let found: Vec<_> = clause_keyword()
        .find_iter(&masked)
        .filter(|m| !matches!(masked[..m.start()].chars().next_back(), Some('.') | Some('$')))
        .collect();

    found
        .iter()
        .enumerate()
        .map(|(i, m)| Clause {
            keyword: m
                .as_str()
                .split_whitespace()
                .map(str::to_ascii_uppercase)
                .collect::<Vec<_>>()
                .join(" "),
            start: m.start(),
            body_start: m.end(),
            end: found.get(i + 1).map_or(query.len(), |next| next.start()),
            depth: nesting_depth(&masked[..m.start()]),
        })
        .collect()
}

fn nesting_depth(prefix: &str) -> usize {
    prefix.chars().fold(0usize, |depth, c| match c {
        '(' | '[' | '{' => depth + 1,
        ')' | ']' | '}' => depth.saturating_sub(1),
        _ => depth,
    })
}

/// Everything the boundary needs to know about a query, extracted once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryFootprint {
    pub operation: CrudOperation,
    pub node_types: Vec<String>,
    pub relationship_types: Vec<String>,
    pub mutated_node_types: Vec<String>,
}

impl QueryFootprint {
    pub fn of(query: &str) -> Self {
        Self {
            operation: classify_operation(query),
            node_types: extract_node_types(query),
            relationship_types: extract_relationship_types(query),
            mutated_node_types: extract_mutated_node_types(query),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_each_operation_kind() {
        assert_eq!(classify_operation("CREATE (t:Task {id: $id})"), CrudOperation::Create);
        assert_eq!(classify_operation("MATCH (t:Task) RETURN t"), CrudOperation::Read);
        assert_eq!(
            classify_operation("MATCH (t:Task {id: $id}) SET t.done = true"),
            CrudOperation::Update
        );
        assert_eq!(classify_operation("MERGE (t:Task {id: $id})"), CrudOperation::Update);
        assert_eq!(classify_operation("DELETE (t:Task {id:$id})"), CrudOperation::Delete);
        assert_eq!(
            classify_operation("MATCH (t:Task) DETACH DELETE t"),
            CrudOperation::Delete
        );
        assert_eq!(
            classify_operation("MATCH (t:Task) REMOVE t.flag"),
            CrudOperation::Delete
        );
    }

    #[test]
    fn classification_is_case_insensitive() {
        assert_eq!(classify_operation("create (t:Task)"), CrudOperation::Create);
        assert_eq!(classify_operation("match (t) set t.x = 1"), CrudOperation::Update);
    }

    #[test]
    fn ambiguous_queries_resolve_to_earliest_checked_kind() {
        assert_eq!(
            classify_operation("MATCH (a:Task) DELETE a CREATE (b:Task)"),
            CrudOperation::Create
        );
        assert_eq!(
            classify_operation("MATCH (a:Task) SET a.x = 1 DELETE a"),
            CrudOperation::Delete
        );
        assert_eq!(
            classify_operation("MERGE (t:Task {id: $id}) ON CREATE SET t.created = 1"),
            CrudOperation::Create
        );
    }

    #[test]
    fn keywords_inside_identifiers_do_not_count() {
        assert_eq!(
            classify_operation("MATCH (t:Task) RETURN t.created_at, t.offset"),
            CrudOperation::Read
        );
    }

    #[test]
    fn extracts_node_types_in_order_with_duplicates() {
        let types = extract_node_types("MATCH (t:Task)-[:BLOCKS]->(o:Task), ( :Persona) RETURN t");
        assert_eq!(types, vec!["Task", "Task", "Persona"]);
    }

    #[test]
    fn ignores_unlabelled_nodes_and_maps() {
        assert!(extract_node_types("MATCH (n {id: $id}) RETURN n").is_empty());
    }

    #[test]
    fn extracts_relationship_types() {
        let types = extract_relationship_types(
            "MATCH (a)-[r:HAS_SUBTASK]->(b)-[ :BLOCKS*1..3]->(c) RETURN [x IN collect(a) | x.id]",
        );
        assert_eq!(types, vec!["HAS_SUBTASK", "BLOCKS"]);
    }

    #[test]
    fn mutated_types_from_create_pattern_only() {
        let mutated =
            extract_mutated_node_types("MATCH (p:Product {id: $pid}) CREATE (t:Task)-[:FOR]->(p)");
        assert_eq!(mutated, vec!["Task"]);
    }

    #[test]
    fn mutated_types_follow_set_and_delete_aliases() {
        let mutated = extract_mutated_node_types(
            "MATCH (p:Product), (t:Task) SET p.name = $name, t.done = true",
        );
        assert_eq!(mutated, vec!["Product", "Task"]);

        let mutated = extract_mutated_node_types("MATCH (p:Product) DETACH DELETE p");
        assert_eq!(mutated, vec!["Product"]);
    }

    #[test]
    fn merge_on_create_set_counts_merged_label() {
        let mutated = extract_mutated_node_types(
            "MERGE (t:Task {id: $id}) ON CREATE SET t.created = timestamp() RETURN t",
        );
        assert_eq!(mutated, vec!["Task", "Task"]);
    }

    #[test]
    fn read_queries_mutate_nothing() {
        assert!(extract_mutated_node_types("MATCH (t:Task) WHERE t.x = 1 RETURN t").is_empty());
    }

    #[test]
    fn footprint_bundles_extractions() {
        let fp = QueryFootprint::of("MATCH (t:Task)-[:BLOCKS]->(o:Task) RETURN t");
        assert_eq!(fp.operation, CrudOperation::Read);
        assert_eq!(fp.node_types, vec!["Task", "Task"]);
        assert_eq!(fp.relationship_types, vec!["BLOCKS"]);
        assert!(fp.mutated_node_types.is_empty());
    }

    #[test]
    fn every_label_of_a_multi_label_node_is_extracted() {
        assert_eq!(
            extract_node_types("CREATE (t:Task:Persona {id: $id})"),
            vec!["Task", "Persona"]
        );
        assert_eq!(
            extract_node_types("MATCH (n:Task|Product), (m:Bug&Release) RETURN n"),
            vec!["Task", "Product", "Bug", "Release"]
        );
        assert_eq!(
            extract_mutated_node_types("CREATE (t:Task:Product {id: $id})"),
            vec!["Task", "Product"]
        );
    }

    #[test]
    fn relationship_alternation_yields_every_type() {
        assert_eq!(
            extract_relationship_types("MATCH (a)-[:HAS_SUBTASK|BLOCKS]->(b) RETURN b"),
            vec!["HAS_SUBTASK", "BLOCKS"]
        );
        assert_eq!(
            extract_relationship_types("MATCH (a)-[r:HAS_SUBTASK|:BLOCKS]->(b) RETURN r"),
            vec!["HAS_SUBTASK", "BLOCKS"]
        );
    }

    #[test]
    fn label_assignment_is_a_mutation_of_that_label() {
        let query = "MATCH (t:Task {id: $id}) SET t:Product";
        assert_eq!(extract_node_types(query), vec!["Task", "Product"]);
        assert_eq!(extract_mutated_node_types(query), vec!["Task", "Product"]);

        let query = "MATCH (t:Task) REMOVE t:Archived, t.flag";
        assert_eq!(extract_node_types(query), vec!["Task", "Archived"]);
        assert_eq!(extract_mutated_node_types(query), vec!["Task", "Archived", "Task"]);
    }

    #[test]
    fn label_predicates_in_filters_are_node_types() {
        assert_eq!(
            extract_node_types("MATCH (t) WHERE t:Persona AND t.x = 1 RETURN t"),
            vec!["Persona"]
        );
        // Inline patterns inside a filter are counted once.
        assert_eq!(
            extract_node_types("MATCH (t:Task) WHERE (t)-[:BLOCKS]->(:Bug) RETURN t"),
            vec!["Task", "Bug"]
        );
    }

    #[test]
    fn unsupported_label_expressions_yield_unlistable_tokens() {
        assert_eq!(extract_node_types("MATCH (n:!Task) RETURN n"), vec!["!Task"]);
        assert_eq!(extract_node_types("MATCH (n:%) RETURN n"), vec!["%"]);
        assert_eq!(extract_node_types("MATCH (n:`Task`) RETURN n"), vec!["Task"]);
    }

    #[test]
    fn map_literals_do_not_look_like_assignments() {
        let query = "MATCH (t:Task {id: $id}) SET t += {status: 'done', owner: $owner}";
        assert_eq!(extract_node_types(query), vec!["Task"]);
        assert_eq!(extract_mutated_node_types(query), vec!["Task"]);
    }

    #[test]
    fn clauses_track_nesting_and_skip_property_names() {
        let query = "MATCH (t:Task) WHERE EXISTS { MATCH (t)-[:BLOCKS]->(o) } RETURN t.set";
        let keywords: Vec<_> = clauses(query)
            .iter()
            .map(|c| (c.keyword.clone(), c.depth))
            .collect();
        assert_eq!(
            keywords,
            vec![
                ("MATCH".to_string(), 0),
                ("WHERE".to_string(), 0),
                ("MATCH".to_string(), 1),
                ("RETURN".to_string(), 0),
            ]
        );
    }

    #[test]
    fn keywords_in_literals_and_comments_are_not_clauses() {
        let query = "MATCH (t:Task) WHERE t.note = 'set with (' // return\nRETURN t";
        let keywords: Vec<_> = clauses(query).iter().map(|c| c.keyword.clone()).collect();
        assert_eq!(keywords, vec!["MATCH", "WHERE", "RETURN"]);
        assert!(clauses(query).iter().all(|c| c.depth == 0));
    }
}
