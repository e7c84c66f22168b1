//! LALR(1) table construction.
//!
//! The automaton is LR(0) in structure (states are identified by their
//! kernel item sets) with LALR(1) lookaheads computed by discovery and
//! propagation: each kernel item is closed once under a sentinel
//! lookahead; terminals generated by the closure become spontaneous
//! lookaheads at the goto targets, occurrences of the sentinel become
//! propagation edges, and a fixpoint pushes everything through.
//!
//! Weak terminals ride their strong sibling's transitions: when kernel
//! items advance over the sibling, the same items are also registered
//! under the weak terminal, so both readings of the token are carried
//! forward by ordinary LR state identity until one token disambiguates.

use crate::diag::{Console, Diagnostic};
use crate::grammar::{
    FirstSets, Grammar, Item, NonterminalID, NonterminalKind, RuleID, TerminalID, TokenSet,
};
use crate::types::{Map, Set};
use crate::weak::WeakSymbols;
use std::collections::VecDeque;
use std::fmt;
use tarn_runtime::tables as rt;

/// Identifier of a parser automaton state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateID(u32);

impl StateID {
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for StateID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{:02}", self.0)
    }
}

/// An LR(0) item: a rule plus a dot position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LR0Item {
    pub rule: RuleID,
    pub dot: u32,
}

/// The symbol a transition is keyed by. Guard items transition on their
/// pseudo-terminal, everything else on its own symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum SymbolKey {
    T(TerminalID),
    N(NonterminalID),
}

/// A parser action before packaging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LrAction {
    Shift(StateID),
    Reduce(RuleID),
    WeakReduce(RuleID),
    Accept(RuleID),
    Guard(StateID),
    Divert(StateID),
    Ignore,
}

impl LrAction {
    /// Emission order inside one cell: conditional actions first, so the
    /// parser can fall through to an unconditional alternative.
    fn rank(&self) -> u8 {
        match self {
            LrAction::Guard(_) => 0,
            LrAction::WeakReduce(_) => 1,
            LrAction::Shift(_) | LrAction::Accept(_) => 2,
            LrAction::Reduce(_) => 3,
            LrAction::Divert(_) => 4,
            LrAction::Ignore => 5,
        }
    }
}

/// One state's actions while rewriters may still transform them.
#[derive(Debug, Default)]
pub struct Row {
    pub actions: Map<TerminalID, Vec<LrAction>>,
    pub gotos: Map<NonterminalID, StateID>,
}

/// A transformation applied to every row before emission. Rewriters run
/// in registration order and compose.
pub trait ActionRewriter {
    fn rewrite(&self, state: StateID, row: &mut Row);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BuildStats {
    pub states: usize,
    pub conflicts: usize,
}

struct State {
    kernel: Vec<LR0Item>,
    /// Transition symbol -> (target, the advanced items that formed it).
    edges: Map<SymbolKey, (StateID, Vec<LR0Item>)>,
}

/// Lookahead context during closure: a token set plus the sentinel flag
/// used by the discovery pass.
#[derive(Debug, Clone, Default)]
struct Ctx {
    tokens: TokenSet,
    sharp: bool,
}

pub struct Builder<'g> {
    grammar: &'g Grammar,
    firsts: FirstSets,
    siblings: Vec<(TerminalID, TerminalID)>,
    rewriters: Vec<Box<dyn ActionRewriter>>,
}

impl<'g> Builder<'g> {
    pub fn new(grammar: &'g Grammar, weak: &WeakSymbols) -> Self {
        Self {
            grammar,
            firsts: FirstSets::new(grammar),
            siblings: weak.siblings().collect(),
            rewriters: Vec::new(),
        }
    }

    pub fn add_rewriter(&mut self, rewriter: Box<dyn ActionRewriter>) {
        self.rewriters.push(rewriter);
    }

    /// Builds the automaton and packages it in the runtime format.
    pub fn build(
        &self,
        filename: &str,
        console: &mut dyn Console,
    ) -> (rt::ParserTables, BuildStats) {
        let (states, start_states, guard_starts) = self.construct_states();
        let lookaheads = self.compute_lookaheads(&states, &start_states, &guard_starts);
        let rows = self.build_rows(&states, &lookaheads, &guard_starts);
        let (rows, conflicts) = self.rewrite_and_check(rows, filename, console);

        let stats = BuildStats {
            states: states.len(),
            conflicts,
        };
        tracing::debug!(
            states = stats.states,
            conflicts = stats.conflicts,
            "parser automaton built"
        );

        (self.package(rows, &start_states), stats)
    }

    // === LR(0) state construction ===

    fn construct_states(
        &self,
    ) -> (
        Vec<State>,
        Vec<(NonterminalID, StateID)>,
        Map<NonterminalID, StateID>,
    ) {
        let mut states: Vec<State> = Vec::new();
        let mut index: Map<Vec<LR0Item>, StateID> = Map::default();
        let mut queue: VecDeque<StateID> = VecDeque::new();

        let mut intern = |kernel: Vec<LR0Item>,
                          states: &mut Vec<State>,
                          queue: &mut VecDeque<StateID>|
         -> StateID {
            if let Some(&id) = index.get(&kernel) {
                return id;
            }
            let id = StateID(states.len() as u32);
            index.insert(kernel.clone(), id);
            states.push(State {
                kernel,
                edges: Map::default(),
            });
            queue.push_back(id);
            id
        };

        let mut start_states = Vec::new();
        for &start in self.grammar.starts() {
            let rule = self.grammar.nonterminal(start).rules[0];
            let kernel = vec![LR0Item { rule, dot: 0 }];
            let id = intern(kernel, &mut states, &mut queue);
            start_states.push((start, id));
        }

        let mut guard_starts = Map::default();
        for (guard, body, _) in self.grammar.guards() {
            let kernel = vec![LR0Item { rule: body, dot: 0 }];
            let id = intern(kernel, &mut states, &mut queue);
            guard_starts.insert(guard, id);
        }

        while let Some(current) = queue.pop_front() {
            let closure = self.lr0_closure(&states[current.index()].kernel);

            let mut buckets: Map<SymbolKey, Set<LR0Item>> = Map::default();
            for &item in &closure {
                let rule = self.grammar.rule(item.rule);
                let Some(&symbol) = rule.items.get(item.dot as usize) else {
                    continue;
                };
                let key = match symbol {
                    Item::Terminal(t) => SymbolKey::T(t),
                    Item::Nonterminal(n) => match self.grammar.nonterminal(n).kind {
                        NonterminalKind::Guard { symbol, .. } => SymbolKey::T(symbol),
                        _ => SymbolKey::N(n),
                    },
                };
                buckets.entry(key).or_default().insert(LR0Item {
                    rule: item.rule,
                    dot: item.dot + 1,
                });
            }

            // Weak terminals take their strong sibling's transitions too.
            for &(weak, strong) in &self.siblings {
                if let Some(items) = buckets.get(&SymbolKey::T(strong)).cloned() {
                    buckets.entry(SymbolKey::T(weak)).or_default().extend(items);
                }
            }

            let mut edges = Map::default();
            for (key, items) in buckets {
                let mut kernel: Vec<LR0Item> = items.into_iter().collect();
                kernel.sort_unstable();
                let target = intern(kernel.clone(), &mut states, &mut queue);
                edges.insert(key, (target, kernel));
            }
            states[current.index()].edges = edges;
        }

        (states, start_states, guard_starts)
    }

    fn lr0_closure(&self, kernel: &[LR0Item]) -> Set<LR0Item> {
        let mut items: Set<LR0Item> = kernel.iter().copied().collect();
        let mut cursor = 0;
        while cursor < items.len() {
            let item = *items.get_index(cursor).unwrap();
            cursor += 1;
            let rule = self.grammar.rule(item.rule);
            let Some(&Item::Nonterminal(n)) = rule.items.get(item.dot as usize) else {
                continue;
            };
            if matches!(
                self.grammar.nonterminal(n).kind,
                NonterminalKind::Guard { .. }
            ) {
                continue;
            }
            for &r in &self.grammar.nonterminal(n).rules {
                items.insert(LR0Item { rule: r, dot: 0 });
            }
        }
        items
    }

    /// LR(1) closure of a seeded item map. `sharp` marks the sentinel
    /// lookahead of the discovery pass.
    fn lr1_closure(&self, seed: Map<LR0Item, Ctx>) -> Map<LR0Item, Ctx> {
        let mut items = seed;
        let mut changed = true;
        while changed {
            changed = false;

            let mut additions: Vec<(LR0Item, TokenSet, bool)> = Vec::new();
            for (item, ctx) in &items {
                let rule = self.grammar.rule(item.rule);
                let Some(&Item::Nonterminal(n)) = rule.items.get(item.dot as usize) else {
                    continue;
                };
                if matches!(
                    self.grammar.nonterminal(n).kind,
                    NonterminalKind::Guard { .. }
                ) {
                    continue;
                }
                let rest = &rule.items[item.dot as usize + 1..];
                let (mut first, nullable) = self.firsts.first_of_items(rest);
                let sharp = nullable && ctx.sharp;
                if nullable {
                    first.union_with(&ctx.tokens);
                }
                for &r in &self.grammar.nonterminal(n).rules {
                    additions.push((LR0Item { rule: r, dot: 0 }, first.clone(), sharp));
                }
            }

            for (item, tokens, sharp) in additions {
                if let Some(ctx) = items.get_mut(&item) {
                    changed |= ctx.tokens.union_with(&tokens);
                    if sharp && !ctx.sharp {
                        ctx.sharp = true;
                        changed = true;
                    }
                } else {
                    items.insert(item, Ctx { tokens, sharp });
                    changed = true;
                }
            }
        }
        items
    }

    // === lookahead discovery and propagation ===

    fn compute_lookaheads(
        &self,
        states: &[State],
        start_states: &[(NonterminalID, StateID)],
        guard_starts: &Map<NonterminalID, StateID>,
    ) -> Vec<Vec<TokenSet>> {
        let mut lookaheads: Vec<Vec<TokenSet>> = states
            .iter()
            .map(|s| vec![TokenSet::default(); s.kernel.len()])
            .collect();

        // Only the start items carry an end marker initially.
        for &(_, id) in start_states {
            lookaheads[id.index()][0].insert(TerminalID::EOI);
        }
        for (_, &id) in guard_starts {
            lookaheads[id.index()][0].insert(TerminalID::EOG);
        }

        // Discovery: close each kernel item under the sentinel.
        let mut propagations: Vec<((usize, usize), (usize, usize))> = Vec::new();
        for (s, state) in states.iter().enumerate() {
            for (k, &kernel_item) in state.kernel.iter().enumerate() {
                let mut seed = Map::default();
                seed.insert(
                    kernel_item,
                    Ctx {
                        tokens: TokenSet::default(),
                        sharp: true,
                    },
                );
                let closure = self.lr1_closure(seed);

                for (target, advanced) in state.edges.values() {
                    for &item in advanced {
                        let source = LR0Item {
                            rule: item.rule,
                            dot: item.dot - 1,
                        };
                        let Some(ctx) = closure.get(&source) else {
                            continue;
                        };
                        let t = target.index();
                        let i = states[t]
                            .kernel
                            .binary_search(&item)
                            .expect("advanced item must be in the target kernel");
                        lookaheads[t][i].union_with(&ctx.tokens);
                        if ctx.sharp {
                            propagations.push(((s, k), (t, i)));
                        }
                    }
                }
            }
        }

        // Propagate to a fixed point.
        let mut changed = true;
        while changed {
            changed = false;
            for &((s, k), (t, i)) in &propagations {
                if (s, k) == (t, i) {
                    continue;
                }
                let tokens = lookaheads[s][k].clone();
                changed |= lookaheads[t][i].union_with(&tokens);
            }
        }

        lookaheads
    }

    // === action construction ===

    fn build_rows(
        &self,
        states: &[State],
        lookaheads: &[Vec<TokenSet>],
        guard_starts: &Map<NonterminalID, StateID>,
    ) -> Vec<Row> {
        let mut rows = Vec::with_capacity(states.len());
        for (s, state) in states.iter().enumerate() {
            let mut row = Row::default();

            for (&key, &(target, _)) in &state.edges {
                match key {
                    SymbolKey::T(t) => {
                        let action = if self.grammar.guard_of_symbol(t).is_some() {
                            LrAction::Divert(target)
                        } else {
                            LrAction::Shift(target)
                        };
                        row.actions.entry(t).or_default().push(action);
                    }
                    SymbolKey::N(n) => {
                        row.gotos.insert(n, target);
                    }
                }
            }

            let seed: Map<LR0Item, Ctx> = state
                .kernel
                .iter()
                .enumerate()
                .map(|(k, &item)| {
                    (
                        item,
                        Ctx {
                            tokens: lookaheads[s][k].clone(),
                            sharp: false,
                        },
                    )
                })
                .collect();
            let closure = self.lr1_closure(seed);

            for (item, ctx) in &closure {
                let rule = self.grammar.rule(item.rule);

                if let Some(&Item::Nonterminal(n)) = rule.items.get(item.dot as usize) {
                    // A guard in waiting position emits its lookahead
                    // probe on every token the guarded body can start with.
                    if let NonterminalKind::Guard { body, .. } = self.grammar.nonterminal(n).kind {
                        let start = guard_starts[&n];
                        let (first, _) =
                            self.firsts.first_of_items(&self.grammar.rule(body).items);
                        for t in first.iter() {
                            let action = LrAction::Guard(start);
                            let cell = row.actions.entry(t).or_default();
                            if !cell.contains(&action) {
                                cell.push(action);
                            }
                        }
                    }
                    continue;
                }
                if (item.dot as usize) < rule.items.len() {
                    continue;
                }

                match self.grammar.nonterminal(rule.left).kind {
                    NonterminalKind::Start { .. } => {
                        if ctx.tokens.contains(TerminalID::EOI) {
                            row.actions
                                .entry(TerminalID::EOI)
                                .or_default()
                                .push(LrAction::Accept(item.rule));
                        }
                    }
                    NonterminalKind::Guard { .. } => {
                        if ctx.tokens.contains(TerminalID::EOG) {
                            row.actions
                                .entry(TerminalID::EOG)
                                .or_default()
                                .push(LrAction::Accept(item.rule));
                        }
                    }
                    _ => {
                        for t in ctx.tokens.iter() {
                            let action = LrAction::Reduce(item.rule);
                            let cell = row.actions.entry(t).or_default();
                            if !cell.contains(&action) {
                                cell.push(action);
                            }
                        }
                    }
                }
            }

            rows.push(row);
        }
        rows
    }

    fn rewrite_and_check(
        &self,
        mut rows: Vec<Row>,
        filename: &str,
        console: &mut dyn Console,
    ) -> (Vec<Row>, usize) {
        for (s, row) in rows.iter_mut().enumerate() {
            for rewriter in &self.rewriters {
                rewriter.rewrite(StateID(s as u32), row);
            }
        }

        // Conflicts are reported, never resolved: every action stays in
        // the table. Cells containing conditional actions are the
        // designed disambiguation and exempt.
        let mut conflicts = 0;
        for (s, row) in rows.iter().enumerate() {
            for (&terminal, cell) in &row.actions {
                if cell.len() <= 1 {
                    continue;
                }
                if cell.iter().any(|a| {
                    matches!(
                        a,
                        LrAction::Guard(_)
                            | LrAction::WeakReduce(_)
                            | LrAction::Divert(_)
                            | LrAction::Ignore
                    )
                }) {
                    continue;
                }
                let shifts = cell
                    .iter()
                    .filter(|a| matches!(a, LrAction::Shift(_) | LrAction::Accept(_)))
                    .count();
                let reduces = cell
                    .iter()
                    .filter(|a| matches!(a, LrAction::Reduce(_)))
                    .count();
                let name = self.grammar.terminals.name(terminal);
                if shifts > 0 && reduces > 0 {
                    conflicts += 1;
                    console.report(Diagnostic::warning(
                        "SHIFT_REDUCE_CONFLICT",
                        filename,
                        crate::ast::Pos::NONE,
                        format!("Shift/reduce conflict on {} in state s{:02}", name, s),
                    ));
                } else if reduces > 1 {
                    conflicts += 1;
                    console.report(Diagnostic::warning(
                        "REDUCE_REDUCE_CONFLICT",
                        filename,
                        crate::ast::Pos::NONE,
                        format!("Reduce/reduce conflict on {} in state s{:02}", name, s),
                    ));
                }
            }
        }

        (rows, conflicts)
    }

    // === packaging ===

    fn package(
        &self,
        rows: Vec<Row>,
        start_states: &[(NonterminalID, StateID)],
    ) -> rt::ParserTables {
        let rules = self
            .grammar
            .rules()
            .map(|(id, rule)| rt::RuleInfo {
                left: rule.left.raw(),
                len: rule.items.len() as u32,
                guard: match self.grammar.nonterminal(rule.left).kind {
                    NonterminalKind::Guard { body, symbol } if body == id => Some(symbol.raw()),
                    _ => None,
                },
            })
            .collect();

        let packaged_rows = rows
            .into_iter()
            .map(|row| {
                let mut terminals: Vec<(u32, rt::Action)> = Vec::new();
                let mut cells: Vec<(TerminalID, Vec<LrAction>)> = row.actions.into_iter().collect();
                cells.sort_by_key(|(t, _)| *t);
                for (terminal, mut cell) in cells {
                    cell.sort_by_key(LrAction::rank);
                    for action in cell {
                        terminals.push((terminal.raw(), convert(action)));
                    }
                }

                let mut nonterminals: Vec<(u32, rt::Action)> = row
                    .gotos
                    .into_iter()
                    .map(|(n, target)| (n.raw(), rt::Action::Goto(target.raw())))
                    .collect();
                nonterminals.sort_by_key(|&(n, _)| n);

                rt::ActionRow {
                    terminals,
                    nonterminals,
                }
            })
            .collect();

        rt::ParserTables {
            rows: packaged_rows,
            rules,
            start_states: start_states
                .iter()
                .map(|&(n, s)| (n.raw(), s.raw()))
                .collect(),
        }
    }
}

fn convert(action: LrAction) -> rt::Action {
    match action {
        LrAction::Shift(s) => rt::Action::Shift(s.raw()),
        LrAction::Reduce(r) => rt::Action::Reduce(r.raw()),
        LrAction::WeakReduce(r) => rt::Action::WeakReduce(r.raw()),
        LrAction::Accept(r) => rt::Action::Accept(r.raw()),
        LrAction::Guard(s) => rt::Action::Guard(s.raw()),
        LrAction::Divert(s) => rt::Action::Divert(s.raw()),
        LrAction::Ignore => rt::Action::Ignore,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::ConsoleBuffer;
    use tarn_runtime::parser::{ParseEvent, Parser};

    /// Expr = Expr "+" Term | Term ; Term = num
    fn arithmetic() -> Grammar {
        let mut grammar = Grammar::new();
        let num = grammar.terminals.add("num");
        let plus = grammar.terminals.add("plus");
        let expr = grammar.nonterminal_id("Expr");
        let term = grammar.nonterminal_id("Term");
        grammar.push_rule(
            expr,
            vec![
                Item::Nonterminal(expr),
                Item::Terminal(plus),
                Item::Nonterminal(term),
            ],
        );
        grammar.push_rule(expr, vec![Item::Nonterminal(term)]);
        grammar.push_rule(term, vec![Item::Terminal(num)]);
        grammar.add_start(expr);
        grammar
    }

    #[test]
    fn builds_a_consistent_arithmetic_automaton() {
        let grammar = arithmetic();
        let builder = Builder::new(&grammar, &WeakSymbols::empty());
        let mut console = ConsoleBuffer::new();
        let (tables, stats) = builder.build("test.lang", &mut console);

        assert_eq!(stats.conflicts, 0);
        assert!(console.diagnostics.is_empty());
        assert!(stats.states >= 5);
        assert_eq!(tables.start_states.len(), 1);

        let num = grammar.terminals.lookup("num").unwrap().raw();
        let plus = grammar.terminals.lookup("plus").unwrap().raw();

        // num + num parses; the reduce trace is Term, Expr, Term, Expr+Term.
        let events = Parser::new(&tables, [num, plus, num].into_iter())
            .run()
            .unwrap();
        let reduces: Vec<u32> = events
            .iter()
            .filter_map(|e| match e {
                ParseEvent::Reduce(r) => Some(*r),
                _ => None,
            })
            .collect();
        assert_eq!(reduces.len(), 4);
        assert!(matches!(events.last(), Some(ParseEvent::Accept(_))));

        // Truncated input rejects.
        assert!(Parser::new(&tables, [num, plus].into_iter()).run().is_err());
        // Leading operator rejects.
        assert!(Parser::new(&tables, [plus].into_iter()).run().is_err());
    }

    #[test]
    fn reports_shift_reduce_conflicts_and_keeps_actions() {
        // The classic dangling-else shape:
        //   S = "i" S | "i" S "e" S | "x"
        let mut grammar = Grammar::new();
        let i = grammar.terminals.add("i");
        let e = grammar.terminals.add("e");
        let x = grammar.terminals.add("x");
        let s = grammar.nonterminal_id("S");
        grammar.push_rule(s, vec![Item::Terminal(i), Item::Nonterminal(s)]);
        grammar.push_rule(
            s,
            vec![
                Item::Terminal(i),
                Item::Nonterminal(s),
                Item::Terminal(e),
                Item::Nonterminal(s),
            ],
        );
        grammar.push_rule(s, vec![Item::Terminal(x)]);
        grammar.add_start(s);

        let builder = Builder::new(&grammar, &WeakSymbols::empty());
        let mut console = ConsoleBuffer::new();
        let (tables, stats) = builder.build("test.lang", &mut console);

        assert!(stats.conflicts > 0);
        assert!(console.has_code("SHIFT_REDUCE_CONFLICT"));

        // Both actions stay in the conflicted cell.
        let conflicted = tables
            .rows
            .iter()
            .any(|row| row.terminal_actions(e.raw()).count() > 1);
        assert!(conflicted);
    }

    #[test]
    fn empty_rules_reduce_on_lookahead() {
        // S = A "x" ; A = <empty>
        let mut grammar = Grammar::new();
        let x = grammar.terminals.add("x");
        let s = grammar.nonterminal_id("S");
        let a = grammar.nonterminal_id("A");
        grammar.push_rule(s, vec![Item::Nonterminal(a), Item::Terminal(x)]);
        grammar.push_rule(a, vec![]);
        grammar.add_start(s);

        let builder = Builder::new(&grammar, &WeakSymbols::empty());
        let mut console = ConsoleBuffer::new();
        let (tables, _) = builder.build("test.lang", &mut console);

        let events = Parser::new(&tables, [x.raw()].into_iter()).run().unwrap();
        // The empty A reduces before x is shifted.
        assert!(matches!(events[0], ParseEvent::Reduce(_)));
        assert!(matches!(events.last(), Some(ParseEvent::Accept(_))));
    }
}
