//! Weak-symbol support.
//!
//! A weak terminal is one whose classification depends on parse context:
//! a weak keyword is only reserved where the grammar expects it and falls
//! back to its underlying lexical category (usually an identifier)
//! elsewhere. This module derives the `weak -> strong` sibling map from
//! the lexer DFA and provides the action rewriters that encode the
//! fallback into the parser tables.

use crate::dfa::Dfa;
use crate::grammar::{TerminalDict, TerminalID};
use crate::lalr::{ActionRewriter, LrAction, Row, StateID};
use crate::nfa::AcceptAction;
use crate::types::{Map, Set};

/// The weak/strong sibling relation produced by DFA augmentation.
#[derive(Debug, Default)]
pub struct WeakSymbols {
    /// For each weak terminal, the strong symbol the same lexeme would
    /// produce if the weak definition did not exist.
    pub strong_for: Map<TerminalID, TerminalID>,
    /// Number of shadow terminals synthesized because a weak terminal had
    /// no underlying category of its own.
    pub injected: usize,
}

impl WeakSymbols {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn siblings(&self) -> impl Iterator<Item = (TerminalID, TerminalID)> + '_ {
        self.strong_for.iter().map(|(&weak, &strong)| (weak, strong))
    }
}

/// Augments the DFA for the given weak terminals.
///
/// For every state whose effective accept is weak, the underlying
/// category is the strongest non-weak accept the state also carries.
/// A weak terminal with no such accept anywhere gets a strong shadow
/// synthesized into the dictionary and added as a standard-priority
/// accept in place, so the parser can always distinguish the two
/// identities of the lexeme.
pub fn add_symbols(dfa: &mut Dfa, weak: &Set<TerminalID>, dict: &mut TerminalDict) -> WeakSymbols {
    let mut strong_for: Map<TerminalID, TerminalID> = Map::default();
    let mut orphans: Map<TerminalID, Vec<usize>> = Map::default();

    for (index, state) in dfa.states.iter().enumerate() {
        let Some(effective) = state.effective_accept() else {
            continue;
        };
        if !weak.contains(&effective.symbol) {
            continue;
        }
        let strongest = state.accepts.iter().filter(|a| !a.is_weak()).max();
        match strongest {
            Some(strong) => {
                strong_for.entry(effective.symbol).or_insert(strong.symbol);
            }
            None => orphans.entry(effective.symbol).or_default().push(index),
        }
    }

    let mut injected = 0;
    for (symbol, states) in orphans {
        if strong_for.contains_key(&symbol) {
            continue;
        }
        let name = format!("{}#strong", dict.name(symbol));
        let shadow = dict.add(&name);
        for index in states {
            dfa.states[index]
                .accepts
                .push(AcceptAction::standard(shadow));
        }
        strong_for.insert(symbol, shadow);
        injected += 1;
    }

    tracing::debug!(
        siblings = strong_for.len(),
        injected,
        "weak symbols resolved"
    );
    WeakSymbols {
        strong_for,
        injected,
    }
}

/// Rewrites action rows so that a weak terminal can stand in for its
/// strong sibling: reduce actions keyed on the sibling are cloned onto
/// the weak key as weak reductions, and a weak-keyed cell that gains
/// alternatives keeps no unconditional reduce.
#[derive(Debug)]
pub struct WeakSymbolRewriter {
    siblings: Vec<(TerminalID, TerminalID)>,
}

impl WeakSymbolRewriter {
    pub fn new(weak: &WeakSymbols) -> Self {
        Self {
            siblings: weak.siblings().collect(),
        }
    }
}

impl ActionRewriter for WeakSymbolRewriter {
    fn rewrite(&self, _state: StateID, row: &mut Row) {
        for &(weak, strong) in &self.siblings {
            let cloned: Vec<LrAction> = row
                .actions
                .get(&strong)
                .map(|cell| {
                    cell.iter()
                        .filter_map(|action| match *action {
                            LrAction::Reduce(rule) | LrAction::WeakReduce(rule) => {
                                Some(LrAction::WeakReduce(rule))
                            }
                            _ => None,
                        })
                        .collect()
                })
                .unwrap_or_default();

            if !cloned.is_empty() {
                let cell = row.actions.entry(weak).or_default();
                for action in cloned {
                    if !cell.contains(&action) {
                        cell.push(action);
                    }
                }
            }

            if let Some(cell) = row.actions.get_mut(&weak) {
                if cell.len() > 1 {
                    for action in cell.iter_mut() {
                        if let LrAction::Reduce(rule) = *action {
                            *action = LrAction::WeakReduce(rule);
                        }
                    }
                    let mut seen = Vec::with_capacity(cell.len());
                    cell.retain(|action| {
                        if seen.contains(action) {
                            false
                        } else {
                            seen.push(*action);
                            true
                        }
                    });
                }
            }
        }
    }
}

/// Adds an `ignore` action for every ignored terminal in states that
/// have no explicit action for it, so skipped tokens are consumed
/// wherever they occur.
#[derive(Debug)]
pub struct IgnoreRewriter {
    ignored: Vec<TerminalID>,
}

impl IgnoreRewriter {
    pub fn new(ignored: &Set<TerminalID>) -> Self {
        Self {
            ignored: ignored.iter().copied().collect(),
        }
    }
}

impl ActionRewriter for IgnoreRewriter {
    fn rewrite(&self, _state: StateID, row: &mut Row) {
        for &terminal in &self.ignored {
            let cell = row.actions.entry(terminal).or_default();
            if cell.is_empty() {
                cell.push(LrAction::Ignore);
            }
        }
    }
}
