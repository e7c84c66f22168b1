//! Runs the compilation stages in order against a console and a
//! configuration, stopping before table emission once an error has been
//! reported.

use crate::ast::{DefinitionFile, LanguageBlock, Pos, TopLevelBlock};
use crate::config::Config;
use crate::dfa::Dfa;
use crate::diag::{Console, Diagnostic};
use crate::grammar::{Grammar, NonterminalID};
use crate::lalr::{self, BuildStats};
use crate::language;
use crate::lexer_stage;
use crate::weak::{IgnoreRewriter, WeakSymbols, WeakSymbolRewriter};
use tarn_runtime::tables::{LexerTables, ParserTables};

/// Everything a finished compilation produces.
#[derive(Debug)]
pub struct Compilation {
    pub grammar: Grammar,
    pub lexer: LexerTables,
    pub parser: ParserTables,
    /// The final lexer automaton, for emitters that want its shape.
    pub dfa: Dfa,
    pub weak: WeakSymbols,
    pub start_symbols: Vec<NonterminalID>,
    pub parser_stats: BuildStats,
}

/// Compiles one language block of a definition file into tables.
///
/// Returns `None` when a diagnostic of error severity (or worse) was
/// reported; the console then holds the reasons.
pub fn compile(
    file: &DefinitionFile,
    filename: &str,
    config: &Config,
    console: &mut dyn Console,
) -> Option<Compilation> {
    let block = select_language(file, filename, config, console)?;

    let mut data = language::compile(block, filename, console);
    if console.aborted() {
        return None;
    }

    let artifacts = lexer_stage::compile(&mut data, config, console);
    if console.aborted() {
        return None;
    }

    let start_symbols = resolve_start_symbols(&data.grammar, filename, config, console);
    if console.aborted() {
        return None;
    }
    for &id in &start_symbols {
        data.grammar.add_start(id);
    }

    let (parser, parser_stats) = {
        let mut builder = lalr::Builder::new(&data.grammar, &artifacts.weak);
        builder.add_rewriter(Box::new(WeakSymbolRewriter::new(&artifacts.weak)));
        builder.add_rewriter(Box::new(IgnoreRewriter::new(&data.ignored)));
        builder.build(filename, console)
    };
    if console.aborted() {
        return None;
    }

    Some(Compilation {
        grammar: data.grammar,
        lexer: artifacts.tables,
        parser,
        dfa: artifacts.dfa,
        weak: artifacts.weak,
        start_symbols,
        parser_stats,
    })
}

fn select_language<'f>(
    file: &'f DefinitionFile,
    filename: &str,
    config: &Config,
    console: &mut dyn Console,
) -> Option<&'f LanguageBlock> {
    let blocks: Vec<&LanguageBlock> = file
        .blocks
        .iter()
        .filter_map(|block| match block {
            TopLevelBlock::Language(language) => Some(language),
            _ => None,
        })
        .collect();

    match &config.compile_language {
        Some(name) => {
            let found = blocks.iter().find(|block| block.name == *name).copied();
            if found.is_none() {
                console.report(Diagnostic::error(
                    "MISSING_TARGET_LANGUAGE",
                    filename,
                    Pos::NONE,
                    format!("Could not find the target language '{}'", name),
                ));
            }
            found
        }
        None => match blocks.as_slice() {
            [only] => {
                console.report(Diagnostic::info(
                    "INFERRED_LANGUAGE",
                    filename,
                    only.pos,
                    format!("Language name not explicitly specified: will use '{}'", only.name),
                ));
                Some(only)
            }
            [] => {
                console.report(Diagnostic::error(
                    "NO_LANGUAGE_SPECIFIED",
                    filename,
                    Pos::NONE,
                    "Could not determine which language block to compile",
                ));
                None
            }
            _ => {
                console.report(Diagnostic::error(
                    "NO_LANGUAGE_SPECIFIED",
                    filename,
                    Pos::NONE,
                    "Multiple language blocks; specify one with the compile-language option",
                ));
                None
            }
        },
    }
}

fn resolve_start_symbols(
    grammar: &Grammar,
    filename: &str,
    config: &Config,
    console: &mut dyn Console,
) -> Vec<NonterminalID> {
    if config.start_symbols.is_empty() {
        return match grammar.first_named_nonterminal() {
            Some(id) => {
                console.report(Diagnostic::info(
                    "INFERRED_START_SYMBOL",
                    filename,
                    Pos::NONE,
                    format!(
                        "No start symbol specified: will use '{}'",
                        grammar.nonterminal_name(id)
                    ),
                ));
                vec![id]
            }
            None => {
                console.report(Diagnostic::error(
                    "NO_START_SYMBOLS",
                    filename,
                    Pos::NONE,
                    "Could not determine a start symbol for the language \
                     (use the start-symbol option to specify one manually)",
                ));
                Vec::new()
            }
        };
    }

    let mut ids = Vec::with_capacity(config.start_symbols.len());
    for name in &config.start_symbols {
        match grammar.lookup_nonterminal(name) {
            Some(id) => ids.push(id),
            None => console.report(Diagnostic::error(
                "UNDEFINED_NONTERMINAL",
                filename,
                Pos::NONE,
                format!("Undefined start symbol: {}", name),
            )),
        }
    }
    ids
}
