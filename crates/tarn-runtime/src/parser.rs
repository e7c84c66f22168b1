//! The table-driven LR parser engine.
//!
//! The engine walks each state's action cell in table order. Conditional
//! actions (guards, weak reductions) are tried first and fall through to
//! the next entry when they do not apply, which is what makes
//! context-dependent keywords work without backtracking.

use crate::tables::{Action, NonterminalId, ParserTables, RuleId, StateId, TerminalId, EOG, EOI};
use std::collections::VecDeque;

/// What the parser did, in the order it did it. The reduce sequence is the
/// bottom-up derivation of the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseEvent {
    Shift(TerminalId),
    Reduce(RuleId),
    Accept(RuleId),
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("no viable action for symbol {symbol} in state {state}")]
    Syntax { state: StateId, symbol: TerminalId },

    #[error("missing goto for nonterminal {nonterminal} in state {state}")]
    MissingGoto {
        state: StateId,
        nonterminal: NonterminalId,
    },
}

/// A single parsing session over a token stream.
#[derive(Debug)]
pub struct Parser<'t, I>
where
    I: Iterator<Item = TerminalId>,
{
    tables: &'t ParserTables,
    tokens: I,
    lookahead: VecDeque<TerminalId>,
    exhausted: bool,
    stack: Vec<StateId>,
    events: Vec<ParseEvent>,
}

impl<'t, I> Parser<'t, I>
where
    I: Iterator<Item = TerminalId>,
{
    /// Create a parser entering at the first configured start state.
    pub fn new(tables: &'t ParserTables, tokens: I) -> Self {
        Self::with_start(tables, tokens, 0)
    }

    /// Create a parser entering at the n-th configured start state.
    pub fn with_start(tables: &'t ParserTables, tokens: I, start: usize) -> Self {
        let initial = tables.start_states[start].1;
        Self {
            tables,
            tokens,
            lookahead: VecDeque::new(),
            exhausted: false,
            stack: vec![initial],
            events: Vec::new(),
        }
    }

    /// Run to completion, returning the full event log on acceptance.
    pub fn run(mut self) -> Result<Vec<ParseEvent>, ParseError> {
        loop {
            let symbol = self.look(0);
            if self.step(symbol)? {
                return Ok(self.events);
            }
        }
    }

    fn look(&mut self, offset: usize) -> TerminalId {
        while self.lookahead.len() <= offset && !self.exhausted {
            match self.tokens.next() {
                Some(token) => self.lookahead.push_back(token),
                None => self.exhausted = true,
            }
        }
        self.lookahead.get(offset).copied().unwrap_or(EOI)
    }

    fn advance(&mut self) {
        if self.lookahead.pop_front().is_none() && !self.exhausted {
            if self.tokens.next().is_none() {
                self.exhausted = true;
            }
        }
    }

    /// Dispatch one action for the given lookahead; `Ok(true)` on accept.
    fn step(&mut self, symbol: TerminalId) -> Result<bool, ParseError> {
        let tables = self.tables;
        let state = *self.stack.last().unwrap();
        let actions: Vec<Action> = tables.rows[state as usize]
            .terminal_actions(symbol)
            .copied()
            .collect();

        for action in actions {
            match action {
                Action::Guard(start) => {
                    if let Some(guard_symbol) = self.check_guard(start, 0) {
                        if self.substitute(state, guard_symbol) {
                            return Ok(false);
                        }
                    }
                }
                Action::WeakReduce(rule) => {
                    if self.can_reduce(symbol) {
                        self.reduce(rule)?;
                        return Ok(false);
                    }
                }
                Action::Shift(next) => {
                    self.stack.push(next);
                    self.events.push(ParseEvent::Shift(symbol));
                    self.advance();
                    return Ok(false);
                }
                Action::Accept(rule) => {
                    self.events.push(ParseEvent::Accept(rule));
                    return Ok(true);
                }
                Action::Reduce(rule) => {
                    self.reduce(rule)?;
                    return Ok(false);
                }
                Action::Divert(next) => {
                    self.stack.push(next);
                    return Ok(false);
                }
                Action::Ignore => {
                    self.advance();
                    return Ok(false);
                }
                Action::Goto(_) => {}
            }
        }

        Err(ParseError::Syntax { state, symbol })
    }

    /// Execute the actions a matched guard symbol carries in this state.
    fn substitute(&mut self, state: StateId, guard_symbol: TerminalId) -> bool {
        let tables = self.tables;
        for &action in tables.rows[state as usize].terminal_actions(guard_symbol) {
            if let Action::Divert(next) = action {
                self.stack.push(next);
                return true;
            }
        }
        false
    }

    fn reduce(&mut self, rule: RuleId) -> Result<(), ParseError> {
        let info = &self.tables.rules[rule as usize];
        let keep = self.stack.len() - info.len as usize;
        self.stack.truncate(keep);
        let top = *self.stack.last().unwrap();
        let next = self
            .goto_target(top, info.left)
            .ok_or(ParseError::MissingGoto {
                state: top,
                nonterminal: info.left,
            })?;
        self.stack.push(next);
        self.events.push(ParseEvent::Reduce(rule));
        Ok(())
    }

    fn goto_target(&self, state: StateId, nonterminal: NonterminalId) -> Option<StateId> {
        self.tables.rows[state as usize]
            .nonterminal_actions(nonterminal)
            .find_map(|action| match action {
                Action::Goto(next) => Some(*next),
                _ => None,
            })
    }

    /// True if reducing on `symbol` from the current stack eventually lets
    /// the parser shift (or accept) it.
    pub fn can_reduce(&self, symbol: TerminalId) -> bool {
        self.can_reduce_on(symbol, &self.stack)
    }

    fn can_reduce_on(&self, symbol: TerminalId, base: &[StateId]) -> bool {
        self.simulate(symbol, base.len() - 1, Vec::new(), base)
    }

    /// Simulates reduce/goto sequences on a scratch extension of the stack;
    /// `depth` indexes the deepest `base` entry still in play and `pushed`
    /// holds the states pushed by simulated gotos.
    fn simulate(
        &self,
        symbol: TerminalId,
        mut depth: usize,
        mut pushed: Vec<StateId>,
        base: &[StateId],
    ) -> bool {
        'restart: loop {
            let state = *pushed.last().unwrap_or(&base[depth]);
            let actions: Vec<Action> = self.tables.rows[state as usize]
                .terminal_actions(symbol)
                .copied()
                .collect();

            for action in actions {
                match action {
                    Action::Shift(_) | Action::Accept(_) => return true,
                    Action::Divert(next) => {
                        pushed.push(next);
                        continue 'restart;
                    }
                    Action::WeakReduce(rule) => {
                        let mut w_depth = depth;
                        let mut w_pushed = pushed.clone();
                        if self.fake_reduce(rule, &mut w_depth, &mut w_pushed, base)
                            && self.simulate(symbol, w_depth, w_pushed, base)
                        {
                            return true;
                        }
                        // Keep looking for a stronger action.
                    }
                    Action::Reduce(rule) => {
                        if !self.fake_reduce(rule, &mut depth, &mut pushed, base) {
                            return false;
                        }
                        continue 'restart;
                    }
                    _ => return false,
                }
            }

            return false;
        }
    }

    fn fake_reduce(
        &self,
        rule: RuleId,
        depth: &mut usize,
        pushed: &mut Vec<StateId>,
        base: &[StateId],
    ) -> bool {
        let info = &self.tables.rules[rule as usize];
        for _ in 0..info.len {
            if pushed.pop().is_none() {
                if *depth == 0 {
                    return false;
                }
                *depth -= 1;
            }
        }
        let state = *pushed.last().unwrap_or(&base[*depth]);
        match self.goto_target(state, info.left) {
            Some(next) => {
                pushed.push(next);
                true
            }
            None => false,
        }
    }

    /// Run the guard sub-parser from `start` against the lookahead stream
    /// beginning at `base_offset`. On a match, returns the guard symbol to
    /// substitute for the lookahead. No input is consumed either way.
    fn check_guard(&mut self, start: StateId, base_offset: usize) -> Option<TerminalId> {
        let tables = self.tables;
        let mut offset = base_offset;
        let mut stack = vec![start];

        'next: loop {
            let lookahead = self.look(offset);
            let state = *stack.last().unwrap();
            let row = &tables.rows[state as usize];

            // Close the guard as soon as the end-of-guard marker is
            // viable. A guard disambiguates what follows it, so it cannot
            // close once the input is exhausted; the parser then falls
            // through to the non-guarded actions instead.
            let mut symbol = lookahead;
            if lookahead != EOI
                && row.terminal_actions(EOG).next().is_some()
                && self.can_reduce_on(EOG, &stack)
            {
                symbol = EOG;
            }

            let actions: Vec<Action> = row.terminal_actions(symbol).copied().collect();
            for action in actions {
                match action {
                    Action::Accept(rule) => {
                        return tables.rules[rule as usize].guard;
                    }
                    Action::WeakReduce(rule) => {
                        if self.can_reduce_on(symbol, &stack)
                            && self.guard_reduce(rule, &mut stack)
                        {
                            continue 'next;
                        }
                    }
                    Action::Shift(next) => {
                        stack.push(next);
                        offset += 1;
                        continue 'next;
                    }
                    Action::Reduce(rule) => {
                        if !self.guard_reduce(rule, &mut stack) {
                            return None;
                        }
                        continue 'next;
                    }
                    Action::Divert(next) => {
                        stack.push(next);
                        continue 'next;
                    }
                    Action::Ignore => {
                        offset += 1;
                        continue 'next;
                    }
                    Action::Guard(inner) => {
                        if let Some(inner_symbol) = self.check_guard(inner, offset) {
                            for &a in tables.rows[state as usize].terminal_actions(inner_symbol) {
                                if let Action::Divert(next) = a {
                                    stack.push(next);
                                    continue 'next;
                                }
                            }
                        }
                    }
                    Action::Goto(_) => {}
                }
            }

            return None;
        }
    }

    /// A reduce performed on the guard scratch stack. Fails (rejecting the
    /// guard) if it would pop the guard's entry state.
    fn guard_reduce(&self, rule: RuleId, stack: &mut Vec<StateId>) -> bool {
        let info = &self.tables.rules[rule as usize];
        let Some(keep) = stack.len().checked_sub(info.len as usize) else {
            return false;
        };
        if keep == 0 {
            return false;
        }
        stack.truncate(keep);
        let top = *stack.last().unwrap();
        match self.goto_target(top, info.left) {
            Some(next) => {
                stack.push(next);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::{ActionRow, RuleInfo};

    // A hand-built table for the grammar
    //   S' -> S          (rule 0, accept)
    //   S  -> a S        (rule 1)
    //   S  -> b          (rule 2)
    // terminals: a = 2, b = 3; nonterminal S = 1, S' = 0.
    fn tiny_tables() -> ParserTables {
        let rules = vec![
            RuleInfo {
                left: 0,
                len: 1,
                guard: None,
            },
            RuleInfo {
                left: 1,
                len: 2,
                guard: None,
            },
            RuleInfo {
                left: 1,
                len: 1,
                guard: None,
            },
        ];
        let rows = vec![
            // state 0: shift a -> 1, shift b -> 2, goto S -> 3
            ActionRow {
                terminals: vec![(2, Action::Shift(1)), (3, Action::Shift(2))],
                nonterminals: vec![(1, Action::Goto(3))],
            },
            // state 1: [S -> a . S]
            ActionRow {
                terminals: vec![(2, Action::Shift(1)), (3, Action::Shift(2))],
                nonterminals: vec![(1, Action::Goto(4))],
            },
            // state 2: [S -> b .]
            ActionRow {
                terminals: vec![(EOI, Action::Reduce(2))],
                nonterminals: vec![],
            },
            // state 3: [S' -> S .]
            ActionRow {
                terminals: vec![(EOI, Action::Accept(0))],
                nonterminals: vec![],
            },
            // state 4: [S -> a S .]
            ActionRow {
                terminals: vec![(EOI, Action::Reduce(1))],
                nonterminals: vec![],
            },
        ];
        ParserTables {
            rows,
            rules,
            start_states: vec![(0, 0)],
        }
    }

    #[test]
    fn accepts_simple_recursion() {
        let tables = tiny_tables();
        let events = Parser::new(&tables, [2, 2, 3].into_iter()).run().unwrap();
        assert_eq!(
            events,
            vec![
                ParseEvent::Shift(2),
                ParseEvent::Shift(2),
                ParseEvent::Shift(3),
                ParseEvent::Reduce(2),
                ParseEvent::Reduce(1),
                ParseEvent::Reduce(1),
                ParseEvent::Accept(0),
            ]
        );
    }

    #[test]
    fn rejects_truncated_input() {
        let tables = tiny_tables();
        let err = Parser::new(&tables, [2].into_iter()).run().unwrap_err();
        assert!(matches!(err, ParseError::Syntax { state: 1, .. }));
    }

    #[test]
    fn rejects_empty_input() {
        let tables = tiny_tables();
        let err = Parser::new(&tables, std::iter::empty()).run().unwrap_err();
        assert!(matches!(err, ParseError::Syntax { state: 0, symbol: EOI }));
    }
}
