//! The lexer NFA: numbered states over a shared alphabet of symbol
//! classes, epsilon transitions, and prioritised accept actions.

use crate::ast::UnitKind;
use crate::charset::RangeSet;
use crate::grammar::TerminalID;
use crate::types::Map;
use std::cmp::Ordering;
use std::fmt;

/// Index of a symbol class in an [`Alphabet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassID(pub u32);

impl ClassID {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ClassID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}", self.0)
    }
}

/// The collection of named symbol sets transitions refer to. Classes are
/// interned so equal sets share an id.
#[derive(Debug, Clone, Default)]
pub struct Alphabet {
    sets: Vec<RangeSet>,
    index: Map<RangeSet, ClassID>,
}

impl Alphabet {
    pub fn intern(&mut self, set: RangeSet) -> ClassID {
        if let Some(&id) = self.index.get(&set) {
            return id;
        }
        let id = ClassID(self.sets.len() as u32);
        self.sets.push(set.clone());
        self.index.insert(set, id);
        id
    }

    pub fn set(&self, id: ClassID) -> &RangeSet {
        &self.sets[id.index()]
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ClassID, &RangeSet)> + '_ {
        self.sets
            .iter()
            .enumerate()
            .map(|(i, set)| (ClassID(i as u32), set))
    }
}

/// Priority of an accept action. The total order makes keyword-like
/// tokens outrank broader regex categories and prefers weak variants
/// where they overlap stronger ones, so context-sensitive reductions
/// stay possible downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AcceptPriority {
    /// An accept not defined by a language unit; loses to all of them.
    Standard,
    Language {
        weak: bool,
        unit: UnitKind,
    },
}

/// An accept action: the terminal produced when a state accepts, ranked
/// by priority and, as a tiebreaker, by symbol id (lower id wins).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AcceptAction {
    pub symbol: TerminalID,
    pub priority: AcceptPriority,
}

impl AcceptAction {
    pub fn standard(symbol: TerminalID) -> Self {
        Self {
            symbol,
            priority: AcceptPriority::Standard,
        }
    }

    pub fn language(symbol: TerminalID, unit: UnitKind, weak: bool) -> Self {
        Self {
            symbol,
            priority: AcceptPriority::Language { weak, unit },
        }
    }

    pub fn is_weak(&self) -> bool {
        matches!(self.priority, AcceptPriority::Language { weak: true, .. })
    }

    fn rank(&self) -> (u8, u8, u8) {
        match self.priority {
            AcceptPriority::Standard => (0, 0, 0),
            AcceptPriority::Language { weak, unit } => (1, weak as u8, unit.priority()),
        }
    }
}

impl Ord for AcceptAction {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank()
            .cmp(&other.rank())
            // Lower symbol ids outrank higher ones.
            .then_with(|| other.symbol.cmp(&self.symbol))
    }
}

impl PartialOrd for AcceptAction {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Identifier of an NFA (or DFA) state.
pub type StateID = u32;

#[derive(Debug, Clone, Default)]
pub struct State {
    /// `(class, target)` pairs, kept sorted by class.
    pub transitions: Vec<(ClassID, StateID)>,
    pub epsilon: Vec<StateID>,
    pub accepts: Vec<AcceptAction>,
}

#[derive(Debug, Clone)]
pub struct Nfa {
    pub alphabet: Alphabet,
    pub states: Vec<State>,
}

impl Default for Nfa {
    fn default() -> Self {
        Self::new()
    }
}

impl Nfa {
    /// An NFA with the single start state `0`.
    pub fn new() -> Self {
        Self {
            alphabet: Alphabet::default(),
            states: vec![State::default()],
        }
    }

    pub fn add_state(&mut self) -> StateID {
        let id = self.states.len() as StateID;
        self.states.push(State::default());
        id
    }

    pub fn count_states(&self) -> usize {
        self.states.len()
    }

    pub fn add_transition(&mut self, from: StateID, class: ClassID, to: StateID) {
        let transitions = &mut self.states[from as usize].transitions;
        let at = transitions.partition_point(|&(c, t)| (c, t) <= (class, to));
        if at == 0 || transitions[at - 1] != (class, to) {
            transitions.insert(at, (class, to));
        }
    }

    /// Adds a transition on a symbol set, interning the class.
    pub fn add_set_transition(&mut self, from: StateID, set: RangeSet, to: StateID) {
        let class = self.alphabet.intern(set);
        self.add_transition(from, class, to);
    }

    pub fn add_epsilon(&mut self, from: StateID, to: StateID) {
        let epsilon = &mut self.states[from as usize].epsilon;
        if !epsilon.contains(&to) {
            epsilon.push(to);
        }
    }

    pub fn add_accept(&mut self, state: StateID, action: AcceptAction) {
        let accepts = &mut self.states[state as usize].accepts;
        if !accepts.contains(&action) {
            accepts.push(action);
        }
    }

    /// Extends `states` with everything reachable through epsilon moves.
    pub fn epsilon_closure(&self, states: &mut Vec<StateID>) {
        let mut i = 0;
        while i < states.len() {
            let id = states[i];
            for &next in &self.states[id as usize].epsilon {
                if !states.contains(&next) {
                    states.push(next);
                }
            }
            i += 1;
        }
        states.sort_unstable();
    }

    /// Reference simulation: feed `input` from the start state and return
    /// the effective accept of the final live state set, if any. Used to
    /// cross-check the determinised automaton.
    pub fn simulate(&self, input: impl IntoIterator<Item = u32>) -> Option<AcceptAction> {
        let mut current = vec![0];
        self.epsilon_closure(&mut current);
        for symbol in input {
            let mut next = Vec::new();
            for &state in &current {
                for &(class, target) in &self.states[state as usize].transitions {
                    if self.alphabet.set(class).contains(symbol) && !next.contains(&target) {
                        next.push(target);
                    }
                }
            }
            if next.is_empty() {
                return None;
            }
            self.epsilon_closure(&mut next);
            current = next;
        }
        current
            .iter()
            .flat_map(|&state| self.states[state as usize].accepts.iter())
            .max()
            .copied()
    }
}
