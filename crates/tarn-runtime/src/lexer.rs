//! The DFA lexer driver.

use crate::tables::{LexerTables, TerminalId};

/// A matched lexeme: the accepted symbol plus the byte range it covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lexeme {
    pub symbol: TerminalId,
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum LexError {
    #[error("no lexeme matches the input at byte offset {offset}")]
    NoMatch { offset: usize },
}

/// Runs the DFA over a string, producing the longest match at each
/// position. When a longer attempt fails, the lexer rewinds to the most
/// recent accepting state.
#[derive(Debug)]
pub struct Lexer<'a> {
    tables: &'a LexerTables,
    input: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(tables: &'a LexerTables, input: &'a str) -> Self {
        Self {
            tables,
            input,
            pos: 0,
        }
    }

    /// The text of a previously returned lexeme.
    pub fn text(&self, lexeme: &Lexeme) -> &'a str {
        &self.input[lexeme.start..lexeme.end]
    }
}

impl Iterator for Lexer<'_> {
    type Item = Result<Lexeme, LexError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.input.len() {
            return None;
        }

        let start = self.pos;
        let mut state = 0u32;
        let mut last_accept: Option<(TerminalId, usize)> = None;

        for (offset, ch) in self.input[start..].char_indices() {
            let Some(class) = self.tables.class_of(ch as u32) else {
                break;
            };
            let Some(next) = self.tables.states[state as usize].transition(class) else {
                break;
            };
            state = next;
            if let Some(symbol) = self.tables.states[state as usize].accept {
                last_accept = Some((symbol, start + offset + ch.len_utf8()));
            }
        }

        match last_accept {
            Some((symbol, end)) => {
                self.pos = end;
                Some(Ok(Lexeme {
                    symbol,
                    start,
                    end,
                }))
            }
            None => {
                // Leave the cursor where it is; the caller decides whether
                // to resynchronise or abort.
                self.pos = self.input.len();
                Some(Err(LexError::NoMatch { offset: start }))
            }
        }
    }
}
