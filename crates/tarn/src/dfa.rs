//! The NFA-to-DFA pipeline: unique-symbol rewrite, subset construction,
//! state compaction and symbol-class merging.
//!
//! Each pass consumes its predecessor. The two final passes are optional
//! and only change table size, never the accepted language.

use crate::charset::RangeSet;
use crate::nfa::{AcceptAction, Alphabet, ClassID, Nfa, StateID};
use crate::types::Map;
use std::collections::VecDeque;

/// A deterministic automaton. State `0` is the start state; ids are in
/// BFS order from it, so identical inputs produce identical tables.
#[derive(Debug, Clone)]
pub struct Dfa {
    pub alphabet: Alphabet,
    pub states: Vec<DfaState>,
}

#[derive(Debug, Clone, Default)]
pub struct DfaState {
    /// `(class, target)` pairs sorted by class.
    pub transitions: Vec<(ClassID, StateID)>,
    pub accepts: Vec<AcceptAction>,
}

impl DfaState {
    pub fn transition(&self, class: ClassID) -> Option<StateID> {
        self.transitions
            .binary_search_by_key(&class, |&(c, _)| c)
            .ok()
            .map(|i| self.transitions[i].1)
    }

    /// The accept that wins under the priority order, if any.
    pub fn effective_accept(&self) -> Option<&AcceptAction> {
        self.accepts.iter().max()
    }
}

impl Dfa {
    pub fn count_states(&self) -> usize {
        self.states.len()
    }

    /// Runs the automaton over raw symbols and returns the effective
    /// accept of the state the input ends in, if the whole input is
    /// consumed and that state accepts.
    pub fn run_from_start(&self, input: impl IntoIterator<Item = u32>) -> Option<AcceptAction> {
        let translator = crate::translator::SymbolTranslator::new(&self.alphabet);
        let mut state = 0 as StateID;
        for symbol in input {
            let class = translator.class_of(symbol)?;
            state = self.states[state as usize].transition(class)?;
        }
        self.states[state as usize].effective_accept().copied()
    }
}

/// Pass 1: refine the alphabet so that no two symbol classes overlap.
///
/// The refined classes are the distinct membership signatures of the
/// atomic intervals between class boundaries; transitions on an old class
/// are rewritten to one transition per covering new class.
pub fn with_unique_symbols(nfa: Nfa) -> Nfa {
    let mut boundaries: Vec<u32> = Vec::new();
    for (_, set) in nfa.alphabet.iter() {
        for range in set.ranges() {
            boundaries.push(range.lo);
            boundaries.push(range.hi);
        }
    }
    boundaries.sort_unstable();
    boundaries.dedup();

    // Group atomic intervals by the set of old classes covering them.
    let mut groups: Map<Vec<ClassID>, RangeSet> = Map::default();
    for window in boundaries.windows(2) {
        let (lo, hi) = (window[0], window[1]);
        let members: Vec<ClassID> = nfa
            .alphabet
            .iter()
            .filter(|(_, set)| set.contains(lo))
            .map(|(id, _)| id)
            .collect();
        if members.is_empty() {
            continue;
        }
        groups
            .entry(members)
            .or_default()
            .insert(crate::charset::SymbolRange::new(lo, hi));
    }

    let mut alphabet = Alphabet::default();
    let mut covers: Map<ClassID, Vec<ClassID>> = Map::default();
    for (members, set) in &groups {
        let new_id = alphabet.intern(set.clone());
        for &old in members {
            covers.entry(old).or_default().push(new_id);
        }
    }

    let mut out = Nfa {
        alphabet,
        states: Vec::with_capacity(nfa.states.len()),
    };
    for state in &nfa.states {
        let mut transitions = Vec::new();
        for &(class, target) in &state.transitions {
            for &new_class in covers.get(&class).map(|v| v.as_slice()).unwrap_or(&[]) {
                transitions.push((new_class, target));
            }
        }
        transitions.sort_unstable();
        transitions.dedup();
        out.states.push(crate::nfa::State {
            transitions,
            epsilon: state.epsilon.clone(),
            accepts: state.accepts.clone(),
        });
    }
    out
}

/// Pass 2: subset construction. Requires a unique-symbol alphabet. The
/// accept list of a DFA state is the union of its constituents' accepts.
pub fn determinize(nfa: Nfa) -> Dfa {
    let mut states: Vec<DfaState> = Vec::new();
    let mut index: Map<Vec<StateID>, StateID> = Map::default();
    let mut queue: VecDeque<Vec<StateID>> = VecDeque::new();

    let mut start = vec![0];
    nfa.epsilon_closure(&mut start);
    index.insert(start.clone(), 0);
    queue.push_back(start);

    while let Some(members) = queue.pop_front() {
        let mut accepts: Vec<AcceptAction> = Vec::new();
        for &member in &members {
            for &action in &nfa.states[member as usize].accepts {
                if !accepts.contains(&action) {
                    accepts.push(action);
                }
            }
        }

        // `moves[class]` is the set of NFA states reachable on it.
        let mut moves: Map<ClassID, Vec<StateID>> = Map::default();
        for &member in &members {
            for &(class, target) in &nfa.states[member as usize].transitions {
                let entry = moves.entry(class).or_default();
                if !entry.contains(&target) {
                    entry.push(target);
                }
            }
        }

        let mut transitions = Vec::with_capacity(moves.len());
        for (class, mut targets) in moves {
            nfa.epsilon_closure(&mut targets);
            let next = match index.get(&targets) {
                Some(&id) => id,
                None => {
                    let id = index.len() as StateID;
                    index.insert(targets.clone(), id);
                    queue.push_back(targets);
                    id
                }
            };
            transitions.push((class, next));
        }
        transitions.sort_unstable();

        states.push(DfaState {
            transitions,
            accepts,
        });
    }

    Dfa {
        alphabet: nfa.alphabet,
        states,
    }
}

/// Pass 3 (optional): merge equivalent states. Two states are equivalent
/// when their accept sets match and their transitions lead to equivalent
/// states class for class. Classic partition refinement.
pub fn compact(dfa: Dfa) -> Dfa {
    let n = dfa.states.len();

    // Initial partition: accept-set signature.
    let mut block_of: Vec<usize> = Vec::with_capacity(n);
    {
        let mut signatures: Map<Vec<AcceptAction>, usize> = Map::default();
        for state in &dfa.states {
            let mut sig = state.accepts.clone();
            sig.sort_unstable();
            let next_block = signatures.len();
            block_of.push(*signatures.entry(sig).or_insert(next_block));
        }
    }

    // Refine until transition signatures agree within every block.
    loop {
        let mut signatures: Map<(usize, Vec<(ClassID, usize)>), usize> = Map::default();
        let mut next: Vec<usize> = Vec::with_capacity(n);
        for state_id in 0..n {
            let sig: Vec<(ClassID, usize)> = dfa.states[state_id]
                .transitions
                .iter()
                .map(|&(class, target)| (class, block_of[target as usize]))
                .collect();
            let key = (block_of[state_id], sig);
            let fresh = signatures.len();
            next.push(*signatures.entry(key).or_insert(fresh));
        }
        if next == block_of {
            break;
        }
        block_of = next;
    }

    // Renumber the surviving blocks in BFS order from the start state.
    let mut new_id: Map<usize, StateID> = Map::default();
    let mut representative: Vec<usize> = Vec::new();
    let mut queue = VecDeque::new();
    new_id.insert(block_of[0], 0);
    representative.push(0);
    queue.push_back(0usize);
    while let Some(state_id) = queue.pop_front() {
        for &(_, target) in &dfa.states[state_id].transitions {
            let block = block_of[target as usize];
            if !new_id.contains_key(&block) {
                new_id.insert(block, representative.len() as StateID);
                representative.push(target as usize);
                queue.push_back(target as usize);
            }
        }
    }

    let states = representative
        .iter()
        .map(|&old| {
            let state = &dfa.states[old];
            let mut transitions: Vec<(ClassID, StateID)> = state
                .transitions
                .iter()
                .map(|&(class, target)| (class, new_id[&block_of[target as usize]]))
                .collect();
            transitions.sort_unstable();
            DfaState {
                transitions,
                accepts: state.accepts.clone(),
            }
        })
        .collect();

    Dfa {
        alphabet: dfa.alphabet,
        states,
    }
}

/// Pass 4 (optional): merge symbol classes that behave identically, i.e.
/// produce the same transition in every state, then renumber the
/// alphabet.
pub fn merge_symbols(dfa: Dfa) -> Dfa {
    // The full transition column of each class.
    let mut columns: Map<Vec<Option<StateID>>, Vec<ClassID>> = Map::default();
    for (class, _) in dfa.alphabet.iter() {
        let column: Vec<Option<StateID>> = dfa
            .states
            .iter()
            .map(|state| state.transition(class))
            .collect();
        columns.entry(column).or_default().push(class);
    }

    let mut alphabet = Alphabet::default();
    let mut renumbered: Map<ClassID, ClassID> = Map::default();
    // Iterate classes in id order so the merged alphabet is stable.
    let mut merged_sets: Map<ClassID, (RangeSet, Vec<ClassID>)> = Map::default();
    for (column, classes) in columns {
        if column.iter().all(|t| t.is_none()) {
            // A dead column would survive as an unreachable class.
            continue;
        }
        let lead = *classes.iter().min().unwrap();
        let mut set = RangeSet::new();
        for &class in &classes {
            set = set.union(dfa.alphabet.set(class));
        }
        merged_sets.insert(lead, (set, classes));
    }
    merged_sets.sort_keys();
    for (_, (set, classes)) in &merged_sets {
        let new_id = alphabet.intern(set.clone());
        for &class in classes {
            renumbered.insert(class, new_id);
        }
    }

    let states = dfa
        .states
        .iter()
        .map(|state| {
            let mut transitions: Vec<(ClassID, StateID)> = state
                .transitions
                .iter()
                .filter_map(|&(class, target)| {
                    renumbered.get(&class).map(|&new| (new, target))
                })
                .collect();
            transitions.sort_unstable();
            transitions.dedup();
            DfaState {
                transitions,
                accepts: state.accepts.clone(),
            }
        })
        .collect();

    Dfa { alphabet, states }
}
