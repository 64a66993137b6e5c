/// Splits log lines into typed tokens for the block matcher
use smallvec::SmallVec;

/// Token sequences for typical log lines fit on the stack.
pub type TokenSeq<'a> = SmallVec<[Token<'a>; 16]>;

/// A slice of the input line, classified as word or delimiter.
///
/// A word is a maximal run of `[A-Za-z0-9_]`; a delimiter is a maximal
/// run of whitespace or a maximal run of other punctuation. Non-ASCII
/// characters fall into the punctuation class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub text: &'a str,
    pub is_delimiter: bool,
}

impl Token<'_> {
    /// Words of length >= 2 carry enough information to anchor a block.
    pub fn is_significant(&self) -> bool {
        !self.is_delimiter && self.text.len() >= 2
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CharClass {
    Word,
    Space,
    Punct,
}

fn classify(c: char) -> CharClass {
    if c.is_ascii_alphanumeric() || c == '_' {
        CharClass::Word
    } else if c.is_whitespace() {
        CharClass::Space
    } else {
        CharClass::Punct
    }
}

/// Tokenize a line. Concatenating the resulting token texts always
/// reproduces the input exactly.
pub fn tokenize(s: &str) -> TokenSeq<'_> {
    let mut tokens = TokenSeq::new();
    let mut start = 0;
    let mut class: Option<CharClass> = None;

    for (i, c) in s.char_indices() {
        let k = classify(c);
        match class {
            Some(prev) if prev == k => {}
            Some(prev) => {
                tokens.push(Token {
                    text: &s[start..i],
                    is_delimiter: prev != CharClass::Word,
                });
                start = i;
                class = Some(k);
            }
            None => class = Some(k),
        }
    }

    if let Some(prev) = class {
        tokens.push(Token {
            text: &s[start..],
            is_delimiter: prev != CharClass::Word,
        });
    }

    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts<'a>(tokens: &[Token<'a>]) -> Vec<&'a str> {
        tokens.iter().map(|t| t.text).collect()
    }

    #[test]
    fn test_round_trip() {
        let inputs = [
            "User john logged in from 192.168.1.1",
            "  leading and trailing  ",
            "a=b&c=d;e",
            "[2024-01-01 00:00:00] boot",
            "",
            "no_delims_here",
        ];
        for s in inputs {
            let joined: String = tokenize(s).iter().map(|t| t.text).collect();
            assert_eq!(joined, s);
        }
    }

    #[test]
    fn test_classification() {
        let tokens = tokenize("GET /api/v1 200");
        assert_eq!(texts(&tokens), vec!["GET", " ", "/", "api", "/", "v1", " ", "200"]);
        assert!(!tokens[0].is_delimiter);
        assert!(tokens[1].is_delimiter);
        assert!(tokens[2].is_delimiter);
    }

    #[test]
    fn test_punctuation_runs_merge() {
        let tokens = tokenize("a:=b");
        assert_eq!(texts(&tokens), vec!["a", ":=", "b"]);
    }

    #[test]
    fn test_whitespace_and_punct_are_separate_runs() {
        let tokens = tokenize("x , y");
        assert_eq!(texts(&tokens), vec!["x", " ", ",", " ", "y"]);
    }

    #[test]
    fn test_empty_input() {
        assert!(tokenize("").is_empty());
    }

    #[test]
    fn test_significance() {
        let tokens = tokenize("a bb :: 7");
        let significant: Vec<&str> = tokens
            .iter()
            .filter(|t| t.is_significant())
            .map(|t| t.text)
            .collect();
        assert_eq!(significant, vec!["bb"]);
    }

    #[test]
    fn test_non_ascii_is_delimiter_class() {
        let tokens = tokenize("héllo");
        assert_eq!(texts(&tokens), vec!["h", "é", "llo"]);
        assert!(tokens[1].is_delimiter);
        let joined: String = tokens.iter().map(|t| t.text).collect();
        assert_eq!(joined, "héllo");
    }
}
