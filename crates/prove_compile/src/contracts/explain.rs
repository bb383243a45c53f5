//! Controlled-natural-language analysis of `explain` rows.
//!
//! The tokenizer is intentionally lightweight: split a row into words, find
//! the first recognized operation verb, classify the rest as connectors,
//! sugar, references, or filler. Words only count as *references* when they
//! look like code — a known parameter, local, or `result`, or a dotted
//! field chain — so ordinary prose never trips the reference check, while a
//! misspelled identifier does.
//!
//! The operation set and connector set are both extended by the project
//! manifest's `[explain]` section.

use std::collections::HashSet;

/// Operation verbs recognized out of the box.
pub const BUILTIN_OPERATIONS: &[&str] = &[
    "add", "append", "bound", "build", "check", "clamp", "compare", "compute", "convert",
    "count", "create", "decrement", "divide", "filter", "find", "increment", "join",
    "lowercase", "make", "map", "multiply", "normalize", "parse", "read", "reduce",
    "return", "select", "split", "subtract", "sum", "trim", "unwrap", "uppercase",
    "validate", "wrap", "write",
];

/// Connector prepositions recognized out of the box.
pub const BUILTIN_CONNECTORS: &[&str] = &[
    "above", "against", "at", "below", "between", "by", "for", "from", "in", "into", "of",
    "onto", "over", "through", "to", "using", "with",
];

/// Words with no semantic weight; skipped entirely.
pub const SUGAR_WORDS: &[&str] = &["the", "a", "an", "all", "applicable", "every", "some"];

/// Extra operation verbs and connector words from `prove.toml`.
#[derive(Debug, Clone, Default)]
pub struct ExplainConfig {
    pub operations: Vec<String>,
    pub connectors: Vec<String>,
}

impl ExplainConfig {
    fn is_operation(&self, word: &str) -> bool {
        BUILTIN_OPERATIONS.contains(&word) || self.operations.iter().any(|o| o == word)
    }

    fn is_connector(&self, word: &str) -> bool {
        BUILTIN_CONNECTORS.contains(&word) || self.connectors.iter().any(|c| c == word)
    }
}

/// One analyzed row.
#[derive(Debug, Clone, Default)]
pub struct ParsedRow {
    /// First recognized operation verb, if any.
    pub operation: Option<String>,
    pub connectors: Vec<String>,
    /// Words that matched a known reference.
    pub references: Vec<String>,
    /// Identifier-shaped words that matched nothing.
    pub unknown_references: Vec<String>,
}

/// The contract shape an operation verb promises, checked against the
/// called function's own `ensures` clauses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractShape {
    /// e.g. `sum`: output is monotone non-decreasing on non-negative input.
    MonotoneNonDecreasing,
    /// e.g. `reduce`: the contract states the output's shape via `result`.
    OutputShape,
    /// e.g. `add`: the operation commutes.
    Commutative,
}

/// The claim lookup table: operation verb to expected contract shape.
pub fn expected_shape(operation: &str) -> Option<ContractShape> {
    match operation {
        "sum" => Some(ContractShape::MonotoneNonDecreasing),
        "reduce" => Some(ContractShape::OutputShape),
        "add" => Some(ContractShape::Commutative),
        _ => None,
    }
}

/// Tokenizes and classifies one row against the set of known references
/// (parameters, locals, `result`).
pub fn parse_row(text: &str, config: &ExplainConfig, known_refs: &HashSet<String>) -> ParsedRow {
    let mut row = ParsedRow::default();
    for raw in text.split_whitespace() {
        let word = raw.trim_matches(|c: char| c.is_ascii_punctuation() && c != '.' && c != '_');
        let word = word.trim_matches('.');
        if word.is_empty() {
            continue;
        }
        let lower = word.to_ascii_lowercase();
        if SUGAR_WORDS.contains(&lower.as_str()) {
            continue;
        }
        if row.operation.is_none() && config.is_operation(&lower) {
            row.operation = Some(lower);
            continue;
        }
        if config.is_connector(&lower) {
            row.connectors.push(lower);
            continue;
        }
        if known_refs.contains(word) || word == "result" {
            row.references.push(word.to_string());
            continue;
        }
        // Dotted chains reference fields: known when the head is known.
        if let Some((head, _)) = word.split_once('.') {
            if known_refs.contains(head) {
                row.references.push(word.to_string());
            } else {
                row.unknown_references.push(word.to_string());
            }
            continue;
        }
        // Identifier-shaped words (snake_case) are reference attempts;
        // anything else is prose filler.
        if word.contains('_') {
            row.unknown_references.push(word.to_string());
        }
    }
    row
}

#[cfg(test)]
mod tests {
    use super::*;

    fn refs(names: &[&str]) -> HashSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn first_operation_wins() {
        let row = parse_row(
            "bound value from below using lo",
            &ExplainConfig::default(),
            &refs(&["lo", "hi", "x"]),
        );
        assert_eq!(row.operation.as_deref(), Some("bound"));
        assert_eq!(row.connectors, vec!["from", "below", "using"]);
        assert_eq!(row.references, vec!["lo"]);
        assert!(row.unknown_references.is_empty());
    }

    #[test]
    fn sugar_words_are_ignored() {
        let row = parse_row(
            "sum all the applicable line_totals",
            &ExplainConfig::default(),
            &refs(&["line_totals"]),
        );
        assert_eq!(row.operation.as_deref(), Some("sum"));
        assert_eq!(row.references, vec!["line_totals"]);
    }

    #[test]
    fn result_is_always_a_reference() {
        let row = parse_row("return result", &ExplainConfig::default(), &refs(&[]));
        assert_eq!(row.operation.as_deref(), Some("return"));
        assert_eq!(row.references, vec!["result"]);
    }

    #[test]
    fn unknown_snake_case_word_is_flagged() {
        let row = parse_row(
            "clamp the raw_valu against hi",
            &ExplainConfig::default(),
            &refs(&["raw_value", "hi"]),
        );
        assert_eq!(row.unknown_references, vec!["raw_valu"]);
    }

    #[test]
    fn field_chains_resolve_through_their_head() {
        let known = refs(&["config"]);
        let good = parse_row("read config.port", &ExplainConfig::default(), &known);
        assert_eq!(good.references, vec!["config.port"]);
        let bad = parse_row("read confg.port", &ExplainConfig::default(), &known);
        assert_eq!(bad.unknown_references, vec!["confg.port"]);
    }

    #[test]
    fn config_extends_operations_and_connectors() {
        let config = ExplainConfig {
            operations: vec!["tally".to_string()],
            connectors: vec!["across".to_string()],
        };
        let row = parse_row("tally entries across days", &config, &refs(&["entries"]));
        assert_eq!(row.operation.as_deref(), Some("tally"));
        assert_eq!(row.connectors, vec!["across"]);
    }

    #[test]
    fn prose_filler_is_not_a_reference() {
        let row = parse_row(
            "bound value from below",
            &ExplainConfig::default(),
            &refs(&["lo"]),
        );
        assert!(row.references.is_empty());
        assert!(row.unknown_references.is_empty());
    }

    #[test]
    fn shape_table_covers_spec_examples() {
        assert_eq!(expected_shape("sum"), Some(ContractShape::MonotoneNonDecreasing));
        assert_eq!(expected_shape("reduce"), Some(ContractShape::OutputShape));
        assert_eq!(expected_shape("add"), Some(ContractShape::Commutative));
        assert_eq!(expected_shape("trim"), None);
    }
}
