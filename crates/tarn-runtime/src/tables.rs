//! The table formats shared between the generator and the drivers.

/// Identifier of a state in the parser automaton or the lexer DFA.
pub type StateId = u32;

/// Identifier of a terminal symbol.
///
/// Ids `0` and `1` are reserved for the end-of-input and end-of-guard
/// markers; symbols from the terminal dictionary start at `2`.
pub type TerminalId = u32;

/// Identifier of a nonterminal symbol (named nonterminals, EBNF wrapper
/// instances and augmented start symbols share this id space).
pub type NonterminalId = u32;

/// Identifier of a production rule.
pub type RuleId = u32;

/// The end-of-input marker.
pub const EOI: TerminalId = 0;

/// The end-of-guard marker used by guard sub-parses.
pub const EOG: TerminalId = 1;

/// A single parser action.
///
/// `Reduce` and `WeakReduce` differ only in that a weak reduction is
/// performed solely when [`can_reduce`](crate::parser::Parser::can_reduce)
/// holds for the lookahead; otherwise the parser falls through to the next
/// action in the cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Consume the lookahead and move to the given state.
    Shift(StateId),
    /// Pop the rule's length, then push the goto target of its left side.
    Reduce(RuleId),
    /// As `Reduce`, but only if the lookahead survives the reduction.
    WeakReduce(RuleId),
    /// The input (or a guard) has been matched completely.
    Accept(RuleId),
    /// Transition taken after reducing to a nonterminal.
    Goto(StateId),
    /// Run the guard sub-parser from the given state against the lookahead
    /// stream; on a match the lookahead is substituted by the guard symbol.
    Guard(StateId),
    /// Push the given state without consuming the lookahead.
    Divert(StateId),
    /// Consume the lookahead and stay in the current state.
    Ignore,
}

/// Static description of a production rule.
#[derive(Debug, Clone)]
pub struct RuleInfo {
    /// The nonterminal the rule reduces to.
    pub left: NonterminalId,
    /// Number of symbols popped by the reduction.
    pub len: u32,
    /// For the body rule of a guard, the pseudo-terminal produced when the
    /// guard sub-parse accepts.
    pub guard: Option<TerminalId>,
}

/// One state's worth of parser actions.
///
/// Both segments are sorted by symbol id so a lookup is a binary search;
/// entries sharing a symbol are ordered so that conditional actions come
/// before unconditional ones.
#[derive(Debug, Clone, Default)]
pub struct ActionRow {
    pub terminals: Vec<(TerminalId, Action)>,
    pub nonterminals: Vec<(NonterminalId, Action)>,
}

impl ActionRow {
    /// All actions registered for the given terminal, in table order.
    pub fn terminal_actions(&self, symbol: TerminalId) -> impl Iterator<Item = &Action> + '_ {
        let start = self.terminals.partition_point(|&(t, _)| t < symbol);
        self.terminals[start..]
            .iter()
            .take_while(move |&&(t, _)| t == symbol)
            .map(|(_, action)| action)
    }

    /// All actions registered for the given nonterminal, in table order.
    pub fn nonterminal_actions(&self, symbol: NonterminalId) -> impl Iterator<Item = &Action> + '_ {
        let start = self.nonterminals.partition_point(|&(n, _)| n < symbol);
        self.nonterminals[start..]
            .iter()
            .take_while(move |&&(n, _)| n == symbol)
            .map(|(_, action)| action)
    }
}

/// The complete parser table set.
#[derive(Debug, Clone, Default)]
pub struct ParserTables {
    pub rows: Vec<ActionRow>,
    pub rules: Vec<RuleInfo>,
    /// `(start nonterminal, entry state)` per configured start symbol, in
    /// configuration order.
    pub start_states: Vec<(NonterminalId, StateId)>,
}

/// One lexer DFA state: outgoing transitions sorted by symbol class, plus
/// the effective accept symbol, if any.
#[derive(Debug, Clone, Default)]
pub struct LexerState {
    pub transitions: Vec<(u32, StateId)>,
    pub accept: Option<TerminalId>,
}

impl LexerState {
    pub fn transition(&self, class: u32) -> Option<StateId> {
        self.transitions
            .binary_search_by_key(&class, |&(c, _)| c)
            .ok()
            .map(|i| self.transitions[i].1)
    }
}

/// The complete lexer table set.
#[derive(Debug, Clone, Default)]
pub struct LexerTables {
    /// `(lo, hi, class)` triples sorted by `lo`; ranges are half-open and
    /// disjoint. Symbols outside every range belong to no class.
    pub symbol_map: Vec<(u32, u32, u32)>,
    /// DFA states; state `0` is the start state.
    pub states: Vec<LexerState>,
}

impl LexerTables {
    /// Map a raw symbol to its class, or `None` if it has no class.
    pub fn class_of(&self, symbol: u32) -> Option<u32> {
        let idx = self.symbol_map.partition_point(|&(lo, _, _)| lo <= symbol);
        if idx == 0 {
            return None;
        }
        let (_, hi, class) = self.symbol_map[idx - 1];
        (symbol < hi).then_some(class)
    }
}
