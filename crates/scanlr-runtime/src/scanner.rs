//! Terminal matching against the input text.

use crate::engine::ParseError;
use regex::Regex;
use scanlr::{rule::Terminal, types::Map};

/// Matches terminals at a byte offset. Patterns are compiled once,
/// anchored at the offset.
#[derive(Debug, Default)]
pub struct Scanner {
    patterns: Map<String, Regex>,
}

impl Scanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// The end offset of a match of `terminal` starting at `pos`.
    ///
    /// Empty terminals always match with zero width. The lookahead
    /// sentinels never match as terminals, except that end-of-text matches
    /// (with zero width) at the end.
    pub fn match_terminal(
        &mut self,
        terminal: &Terminal,
        text: &str,
        pos: usize,
    ) -> Result<Option<usize>, ParseError> {
        let rest = text.get(pos..).unwrap_or_default();
        let end = match terminal {
            Terminal::Literal(value) => rest.starts_with(value.as_str()).then(|| pos + value.len()),
            Terminal::Pattern(pattern) => self.compile(pattern)?.find(rest).map(|m| pos + m.end()),
            Terminal::Empty => Some(pos),
            Terminal::EndOfText => (pos == text.len()).then_some(pos),
            Terminal::AnyLookahead | Terminal::UseParentLookahead => None,
        };
        Ok(end)
    }

    fn compile(&mut self, pattern: &str) -> Result<&Regex, ParseError> {
        if !self.patterns.contains_key(pattern) {
            let regex = Regex::new(&format!("^(?:{})", pattern)).map_err(|source| {
                ParseError::InvalidPattern {
                    pattern: pattern.into(),
                    source,
                }
            })?;
            tracing::trace!("compiled pattern {:?}", pattern);
            self.patterns.insert(pattern.into(), regex);
        }
        Ok(&self.patterns[pattern])
    }
}
