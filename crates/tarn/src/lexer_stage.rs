//! The lexer construction stage: takes the NFA the language compiler
//! built and produces the final, compacted DFA and its tables.
//!
//! Stages run in a fixed order; each consumes its predecessor, so the
//! intermediate automata are released as soon as the next stage owns the
//! data. The two final passes can be disabled by configuration without
//! changing semantics.

use crate::config::Config;
use crate::dfa::{self, Dfa};
use crate::diag::{Console, Diagnostic};
use crate::grammar::TerminalID;
use crate::language::LanguageData;
use crate::translator::SymbolTranslator;
use crate::types::{Map, Set};
use crate::weak::{self, WeakSymbols};
use tarn_runtime::tables::{LexerState, LexerTables};

#[derive(Debug)]
pub struct LexerArtifacts {
    pub tables: LexerTables,
    pub weak: WeakSymbols,
    /// The final automaton, kept for the output stage.
    pub dfa: Dfa,
}

pub fn compile(
    data: &mut LanguageData,
    config: &Config,
    console: &mut dyn Console,
) -> LexerArtifacts {
    tracing::debug!("constructing final lexer");

    coalesce_bland_ignores(data);

    let stage0 = std::mem::take(&mut data.nfa);
    tracing::debug!(
        states = stage0.count_states(),
        classes = stage0.alphabet.len(),
        "initial NFA"
    );

    let stage1 = dfa::with_unique_symbols(stage0);
    tracing::debug!(classes = stage1.alphabet.len(), "unique symbol classes");

    let mut stage2 = dfa::determinize(stage1);
    tracing::debug!(states = stage2.count_states(), "subset construction");

    report_unreachable_symbols(&stage2, data, console);

    let weak_symbols = if data.weak.is_empty() {
        WeakSymbols::empty()
    } else {
        weak::add_symbols(&mut stage2, &data.weak, &mut data.grammar.terminals)
    };

    let stage3 = if config.disable_compact_dfa {
        stage2
    } else {
        let compacted = dfa::compact(stage2);
        tracing::debug!(states = compacted.count_states(), "compacted DFA");
        compacted
    };

    let stage4 = if config.disable_merged_dfa {
        stage3
    } else {
        let merged = dfa::merge_symbols(stage3);
        tracing::debug!(classes = merged.alphabet.len(), "merged symbol classes");
        merged
    };

    let tables = build_tables(&stage4);
    LexerArtifacts {
        tables,
        weak: weak_symbols,
        dfa: stage4,
    }
}

/// Ignored symbols the grammar never references all map to a single
/// accept identity, so equivalent skip definitions do not keep otherwise
/// mergeable DFA states apart.
fn coalesce_bland_ignores(data: &mut LanguageData) {
    let bland: Vec<TerminalID> = data
        .ignored
        .iter()
        .filter(|id| !data.used_ignored.contains(*id))
        .copied()
        .collect();
    let Some(&lead) = bland.first() else {
        return;
    };
    let bland: Set<TerminalID> = bland.into_iter().collect();

    for state in &mut data.nfa.states {
        for accept in &mut state.accepts {
            if bland.contains(&accept.symbol) {
                accept.symbol = lead;
            }
        }
        let mut seen = Vec::with_capacity(state.accepts.len());
        state.accepts.retain(|accept| {
            if seen.contains(accept) {
                false
            } else {
                seen.push(*accept);
                true
            }
        });
    }
}

/// Terminals that are never the effective accept of any DFA state can
/// never be produced by the lexer; warn, and name the symbols shadowing
/// them.
fn report_unreachable_symbols(dfa: &Dfa, data: &LanguageData, console: &mut dyn Console) {
    let mut unseen: Set<TerminalID> = data.unit_kinds.keys().copied().collect();
    let mut clashes: Map<TerminalID, Set<TerminalID>> = Map::default();

    for state in &dfa.states {
        let Some(highest) = state.effective_accept().copied() else {
            continue;
        };
        for action in &state.accepts {
            if action.symbol != highest.symbol {
                clashes
                    .entry(action.symbol)
                    .or_default()
                    .insert(highest.symbol);
            }
        }
        unseen.swap_remove(&highest.symbol);
    }

    for &symbol in &unseen {
        if data.ignored.contains(&symbol) {
            continue;
        }
        let name = data.grammar.terminals.name(symbol);
        let pos = data
            .positions
            .get(&symbol)
            .copied()
            .unwrap_or(crate::ast::Pos::NONE);
        console.report(Diagnostic::warning(
            "SYMBOL_CANNOT_BE_GENERATED",
            &data.filename,
            pos,
            format!("Lexer symbol can never be generated: {}", name),
        ));
        if let Some(shadowers) = clashes.get(&symbol) {
            for &shadower in shadowers {
                console.report(Diagnostic::detail(
                    "SYMBOL_CLASHES_WITH",
                    &data.filename,
                    data.positions
                        .get(&shadower)
                        .copied()
                        .unwrap_or(crate::ast::Pos::NONE),
                    format!(
                        "'{}' clashes with: {}",
                        name,
                        data.grammar.terminals.name(shadower)
                    ),
                ));
            }
        }
    }
}

fn build_tables(dfa: &Dfa) -> LexerTables {
    let translator = SymbolTranslator::new(&dfa.alphabet);
    let symbol_map = translator
        .entries()
        .iter()
        .map(|&(lo, hi, class)| (lo, hi, class.0))
        .collect();
    let states = dfa
        .states
        .iter()
        .map(|state| LexerState {
            transitions: state
                .transitions
                .iter()
                .map(|&(class, target)| (class.0, target))
                .collect(),
            accept: state.effective_accept().map(|a| a.symbol.raw()),
        })
        .collect();
    LexerTables { symbol_map, states }
}
