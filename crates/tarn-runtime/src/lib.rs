//! Runtime support for table-driven parsers produced by `tarn`.
//!
//! The generator emits a [`tables::LexerTables`]/[`tables::ParserTables`]
//! pair; this crate contains the drivers that execute them: a longest-match
//! DFA lexer and an LR parser engine with support for weak reductions and
//! guard lookahead.

pub mod lexer;
pub mod parser;
pub mod tables;
