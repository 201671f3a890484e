//! Call-site renaming over a tree-sitter JavaScript tree.
//!
//! A [`RewriteRule`] names a callee identifier and its replacement. One
//! generic pre-order visitor applies every rule to `call_expression` nodes
//! whose `function` field is a bare `identifier`; declarations, assignments,
//! member calls (`obj.App()`) and value uses of the same name are untouched.
//! Edits are spliced into the original text, so everything else (comments,
//! formatting) is preserved byte for byte.

use std::fmt;

use tree_sitter::{Node, Parser, Tree};

/// Rename calls to `callee` into calls to `replacement`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RewriteRule {
    pub callee: String,
    pub replacement: String,
}

impl RewriteRule {
    #[must_use]
    pub fn new(callee: impl Into<String>, replacement: impl Into<String>) -> Self {
        Self {
            callee: callee.into(),
            replacement: replacement.into(),
        }
    }
}

/// Errors from parsing or rewriting a script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RewriteError {
    /// Failed to set up the tree-sitter parser.
    ParserSetup(String),
    /// tree-sitter returned no tree.
    ParseFailed,
    /// The script contains a syntax error at the given 1-based position.
    Syntax { line: usize, column: usize },
}

impl fmt::Display for RewriteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ParserSetup(msg) => write!(f, "parser setup failed: {msg}"),
            Self::ParseFailed => write!(f, "tree-sitter failed to parse script"),
            Self::Syntax { line, column } => {
                write!(f, "syntax error at line {line}, column {column}")
            }
        }
    }
}

impl std::error::Error for RewriteError {}

/// Result of applying rewrite rules.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rewritten {
    pub source: String,
    /// Number of call sites renamed.
    pub renamed: usize,
}

/// Parse `source` as JavaScript, rejecting scripts with syntax errors.
///
/// # Errors
/// Returns [`RewriteError::Syntax`] pointing at the first error node.
pub fn parse_script(source: &str) -> Result<Tree, RewriteError> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_javascript::LANGUAGE.into())
        .map_err(|e| RewriteError::ParserSetup(format!("{e}")))?;

    let tree = parser
        .parse(source, None)
        .ok_or(RewriteError::ParseFailed)?;

    if tree.root_node().has_error() {
        let mut first = None;
        visit_preorder(&tree, |node| {
            if first.is_none() && (node.is_error() || node.is_missing()) {
                let pos = node.start_position();
                first = Some(RewriteError::Syntax {
                    line: pos.row + 1,
                    column: pos.column + 1,
                });
            }
        });
        return Err(first.unwrap_or(RewriteError::ParseFailed));
    }

    Ok(tree)
}

/// Apply `rules` to every matching call site in `source`.
///
/// # Errors
/// Returns [`RewriteError`] if `source` does not parse cleanly.
pub fn rewrite_calls(source: &str, rules: &[RewriteRule]) -> Result<Rewritten, RewriteError> {
    let tree = parse_script(source)?;
    let bytes = source.as_bytes();

    // (start, end, replacement) in document order.
    let mut edits: Vec<(usize, usize, &str)> = Vec::new();
    visit_preorder(&tree, |node| {
        if node.kind() != "call_expression" {
            return;
        }
        let Some(callee) = node.child_by_field_name("function") else {
            return;
        };
        if callee.kind() != "identifier" {
            return;
        }
        let Ok(name) = callee.utf8_text(bytes) else {
            return;
        };
        if let Some(rule) = rules.iter().find(|r| r.callee == name) {
            edits.push((callee.start_byte(), callee.end_byte(), rule.replacement.as_str()));
        }
    });

    let mut out = String::with_capacity(source.len());
    let mut cursor = 0;
    for (start, end, replacement) in &edits {
        out.push_str(&source[cursor..*start]);
        out.push_str(replacement);
        cursor = *end;
    }
    out.push_str(&source[cursor..]);

    Ok(Rewritten {
        source: out,
        renamed: edits.len(),
    })
}

/// Walk every node of `tree` in document order.
fn visit_preorder<'t>(tree: &'t Tree, mut f: impl FnMut(Node<'t>)) {
    let mut cursor = tree.walk();
    loop {
        f(cursor.node());
        if cursor.goto_first_child() {
            continue;
        }
        loop {
            if cursor.goto_next_sibling() {
                break;
            }
            if !cursor.goto_parent() {
                return;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
