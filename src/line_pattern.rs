/// Pattern language for grep and filters: `/re/` is a regular
/// expression, anything else is a plain substring.
use anyhow::{anyhow, Result};
use memchr::memmem;
use regex::Regex;

#[derive(Debug)]
pub enum LinePattern {
    Substring(memmem::Finder<'static>),
    Regex(Regex),
}

impl LinePattern {
    /// Compile a raw pattern. A malformed regex is reported as an
    /// `Invalid regex` error rather than a panic or a silent fallback.
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.len() >= 2 && raw.starts_with('/') && raw.ends_with('/') {
            let source = &raw[1..raw.len() - 1];
            let regex = Regex::new(source).map_err(|e| anyhow!("Invalid regex: {e}"))?;
            Ok(LinePattern::Regex(regex))
        } else {
            Ok(LinePattern::Substring(memmem::Finder::new(raw).into_owned()))
        }
    }

    pub fn matches(&self, line: &str) -> bool {
        match self {
            LinePattern::Substring(finder) => finder.find(line.as_bytes()).is_some(),
            LinePattern::Regex(regex) => regex.is_match(line),
        }
    }
}
