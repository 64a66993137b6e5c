/// Builds and generalizes wildcard templates from pairs of lines
use crate::block_matcher::match_blocks;
use crate::tokenizer::{tokenize, Token};
use serde::{Deserialize, Serialize};

/// Wildcard marker separating static fragments in a pattern.
pub const WILDCARD: &str = ".*";

/// Join sentinel for rebuilding a template into a synthetic line.
/// Lines read from text files do not contain NUL, so a sentinel token
/// can never match a line token and block runs cannot cross a
/// fragment boundary.
const SENTINEL: char = '\0';

/// A pattern of literal fragments interleaved with `.*` gaps, plus the
/// ordered fragments it was built from. The pattern never contains two
/// adjacent `.*` markers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub pattern: String,
    pub static_parts: Vec<String>,
}

impl Template {
    /// A fresh single-line template: the whole line is static.
    pub fn from_line(line: &str) -> Self {
        Self {
            pattern: line.to_string(),
            static_parts: vec![line.to_string()],
        }
    }

    /// The fully general template produced when two lines share nothing.
    pub fn degenerate() -> Self {
        Self {
            pattern: WILDCARD.to_string(),
            static_parts: Vec::new(),
        }
    }

    pub fn wildcard_count(&self) -> usize {
        self.pattern.matches(WILDCARD).count()
    }
}

/// Result of a template derivation together with the similarity the
/// clusterer compares against its threshold.
#[derive(Debug, Clone)]
pub struct TemplateUpdate {
    pub template: Template,
    pub similarity: f64,
}

enum Piece {
    Gap,
    Literal(String),
}

/// Assemble a pattern from pieces, collapsing runs of gaps so the
/// canonical form never holds two adjacent wildcards.
fn canonicalize(pieces: Vec<Piece>) -> Template {
    let mut pattern = String::new();
    let mut static_parts = Vec::new();
    let mut last_was_gap = false;
    for piece in pieces {
        match piece {
            Piece::Gap => {
                if !last_was_gap {
                    pattern.push_str(WILDCARD);
                    last_was_gap = true;
                }
            }
            Piece::Literal(text) => {
                pattern.push_str(&text);
                static_parts.push(text);
                last_was_gap = false;
            }
        }
    }
    Template {
        pattern,
        static_parts,
    }
}

fn concat_tokens(tokens: &[Token]) -> String {
    tokens.iter().map(|t| t.text).collect()
}

fn matched_chars(parts: &[String]) -> usize {
    parts.iter().map(|p| p.len()).sum()
}

/// Derive a template from two raw lines.
///
/// Similarity is `2 * matched_len / (len(a) + len(b))` where
/// `matched_len` counts the characters of the emitted static
/// fragments.
pub fn extract_template(a: &str, b: &str) -> TemplateUpdate {
    if a.is_empty() && b.is_empty() {
        // Two empty lines are identical; keep the empty template.
        return TemplateUpdate {
            template: Template {
                pattern: String::new(),
                static_parts: Vec::new(),
            },
            similarity: 1.0,
        };
    }

    let ta = tokenize(a);
    let tb = tokenize(b);
    let blocks = match_blocks(&ta, &tb);
    if blocks.is_empty() {
        return TemplateUpdate {
            template: Template::degenerate(),
            similarity: 0.0,
        };
    }

    let mut pieces = Vec::with_capacity(blocks.len() * 2 + 1);
    if blocks[0].a_start > 0 {
        pieces.push(Piece::Gap);
    }
    for (i, bl) in blocks.iter().enumerate() {
        if i > 0 {
            pieces.push(Piece::Gap);
        }
        pieces.push(Piece::Literal(concat_tokens(&ta[bl.a_start..bl.a_end])));
    }
    if blocks[blocks.len() - 1].a_end < ta.len() {
        pieces.push(Piece::Gap);
    }

    let template = canonicalize(pieces);
    let similarity =
        2.0 * matched_chars(&template.static_parts) as f64 / (a.len() + b.len()) as f64;
    TemplateUpdate {
        template,
        similarity,
    }
}

/// Generalize an existing template against a new line.
///
/// The template is rebuilt into a synthetic line by joining its static
/// parts with the sentinel, matched against the new line, and
/// reassembled. Matched runs whose text is nothing but sentinels mark
/// a boundary between static parts and become gaps. Similarity is
/// `2 * matched_len / (pattern_len + line_len)`; the asymmetry with
/// extraction is deliberate and cluster membership depends on it.
pub fn merge_with_template(tmpl: &Template, line: &str) -> TemplateUpdate {
    if tmpl.pattern.is_empty() && line.is_empty() {
        return TemplateUpdate {
            template: tmpl.clone(),
            similarity: 1.0,
        };
    }

    // Edge sentinels keep existing leading/trailing wildcards from
    // being forgotten: a block can then never start at position 0 or
    // end at the last token, so the edge gaps are re-emitted.
    let mut synthetic = String::new();
    if tmpl.pattern.starts_with(WILDCARD) {
        synthetic.push(SENTINEL);
    }
    synthetic.push_str(&tmpl.static_parts.join("\0"));
    if tmpl.pattern.ends_with(WILDCARD) {
        synthetic.push(SENTINEL);
    }

    let ta = tokenize(&synthetic);
    let tb = tokenize(line);
    let blocks = match_blocks(&ta, &tb);
    if blocks.is_empty() {
        return TemplateUpdate {
            template: Template::degenerate(),
            similarity: 0.0,
        };
    }

    let mut pieces = Vec::with_capacity(blocks.len() * 2 + 1);
    if blocks[0].a_start > 0 {
        pieces.push(Piece::Gap);
    }
    for (i, bl) in blocks.iter().enumerate() {
        if i > 0 {
            pieces.push(Piece::Gap);
        }
        let raw = concat_tokens(&ta[bl.a_start..bl.a_end]);
        let stripped: String = raw.chars().filter(|&c| c != SENTINEL).collect();
        if stripped.is_empty() {
            pieces.push(Piece::Gap);
        } else {
            pieces.push(Piece::Literal(stripped));
        }
    }
    if blocks[blocks.len() - 1].a_end < ta.len() {
        pieces.push(Piece::Gap);
    }

    let template = canonicalize(pieces);
    let similarity = 2.0 * matched_chars(&template.static_parts) as f64
        / (tmpl.pattern.len() + line.len()) as f64;
    TemplateUpdate {
        template,
        similarity,
    }
}
