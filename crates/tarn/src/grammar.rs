//! The grammar model: the terminal dictionary, nonterminal symbols
//! (including EBNF wrapper instances and synthesized start symbols) and
//! the production rule arena.
//!
//! EBNF wrappers are not desugared away: each distinct wrapper is interned
//! as its own symbol that remembers its structure, and contributes a small
//! set of implicit rules to the closure instead. This keeps the surface
//! shape available for AST emission while letting the LALR construction
//! work on plain `(rule, dot)` items.

use crate::types::Map;
use std::borrow::Cow;
use std::fmt;

/// Identifier of a terminal symbol. Ids `0` and `1` are the reserved
/// end-of-input and end-of-guard markers; dictionary symbols start at 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TerminalID(u32);

impl TerminalID {
    pub const EOI: Self = Self(0);
    pub const EOG: Self = Self(1);
    pub(crate) const OFFSET: u32 = 2;

    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for TerminalID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::EOI => f.write_str("$end"),
            Self::EOG => f.write_str("$eog"),
            Self(raw) => write!(f, "t{}", raw),
        }
    }
}

/// A set of terminals (lookahead sets, weak symbol sets).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenSet {
    inner: bit_set::BitSet,
}

impl TokenSet {
    pub fn contains(&self, id: TerminalID) -> bool {
        self.inner.contains(id.raw() as usize)
    }

    pub fn insert(&mut self, id: TerminalID) -> bool {
        self.inner.insert(id.raw() as usize)
    }

    /// Merges `other` into `self`; true if anything was added.
    pub fn union_with(&mut self, other: &Self) -> bool {
        let before = self.inner.len();
        self.inner.union_with(&other.inner);
        self.inner.len() != before
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = TerminalID> + '_ {
        self.inner.iter().map(|raw| TerminalID(raw as u32))
    }
}

impl FromIterator<TerminalID> for TokenSet {
    fn from_iter<I: IntoIterator<Item = TerminalID>>(iter: I) -> Self {
        let mut set = Self::default();
        for id in iter {
            set.insert(id);
        }
        set
    }
}

/// The bidirectional `name <-> id` map for terminals. Ids are assigned in
/// insertion order and never change.
#[derive(Debug, Clone, Default)]
pub struct TerminalDict {
    names: Map<String, TerminalID>,
}

impl TerminalDict {
    pub fn lookup(&self, name: &str) -> Option<TerminalID> {
        self.names.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains_key(name)
    }

    /// Adds a symbol, or returns the existing id for an already-known name.
    pub fn add(&mut self, name: &str) -> TerminalID {
        if let Some(&id) = self.names.get(name) {
            return id;
        }
        let id = TerminalID(self.names.len() as u32 + TerminalID::OFFSET);
        self.names.insert(name.to_owned(), id);
        id
    }

    pub fn name(&self, id: TerminalID) -> &str {
        match id {
            TerminalID::EOI => "$end",
            TerminalID::EOG => "$eog",
            TerminalID(raw) => self
                .names
                .get_index((raw - TerminalID::OFFSET) as usize)
                .map(|(name, _)| name.as_str())
                .unwrap_or("<bogus>"),
        }
    }

    /// Number of dictionary symbols (the reserved markers not included).
    pub fn count(&self) -> usize {
        self.names.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (TerminalID, &str)> + '_ {
        self.names.iter().map(|(name, &id)| (id, name.as_str()))
    }
}

/// Identifier of a nonterminal-side symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NonterminalID(u32);

impl NonterminalID {
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

impl fmt::Display for NonterminalID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Identifier of a rule in the arena. Derived from the rule's left symbol
/// and item sequence by interning, so structurally identical rules share
/// an id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuleID(u32);

impl RuleID {
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

impl fmt::Display for RuleID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// An item of a production rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Item {
    Terminal(TerminalID),
    Nonterminal(NonterminalID),
}

#[derive(Debug, Clone)]
pub struct Rule {
    pub left: NonterminalID,
    pub items: Vec<Item>,
}

/// What a nonterminal-side symbol is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NonterminalKind {
    /// A named nonterminal from the grammar source.
    Plain,
    /// An augmented start symbol for `target`.
    Start { target: NonterminalID },
    /// `X?`: matches the body rule or nothing.
    Optional { body: RuleID },
    /// `X*`: the implicit rules are left-recursive.
    RepeatZero { body: RuleID },
    /// `X+`.
    RepeatOne { body: RuleID },
    /// `X | Y` as a grammar item.
    Alternate { left: RuleID, right: RuleID },
    /// `[=> X]`: contributes no closure items; `symbol` is the
    /// pseudo-terminal produced when the guard matches.
    Guard { body: RuleID, symbol: TerminalID },
}

#[derive(Debug, Clone)]
pub struct Nonterminal {
    pub name: Option<String>,
    pub kind: NonterminalKind,
    /// The rules the symbol contributes to an LR closure. Empty for
    /// guards, which only ever start their own sub-automaton.
    pub rules: Vec<RuleID>,
}

/// Key for structural interning of wrapper instances.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum WrapperKey {
    Optional(Vec<Item>),
    RepeatZero(Vec<Item>),
    RepeatOne(Vec<Item>),
    Alternate(Vec<Item>, Vec<Item>),
    Guard(Vec<Item>),
}

#[derive(Debug, Default)]
pub struct Grammar {
    pub terminals: TerminalDict,
    nonterminals: Vec<Nonterminal>,
    names: Map<String, NonterminalID>,
    rules: Vec<Rule>,
    rule_index: Map<(NonterminalID, Vec<Item>), RuleID>,
    wrappers: Map<WrapperKey, NonterminalID>,
    guard_symbols: Map<TerminalID, NonterminalID>,
    starts: Vec<NonterminalID>,
}

impl Grammar {
    pub fn new() -> Self {
        Self::default()
    }

    fn alloc(&mut self, name: Option<String>, kind: NonterminalKind) -> NonterminalID {
        let id = NonterminalID(self.nonterminals.len() as u32);
        self.nonterminals.push(Nonterminal {
            name,
            kind,
            rules: Vec::new(),
        });
        id
    }

    /// The id for a named nonterminal, creating it on first reference.
    pub fn nonterminal_id(&mut self, name: &str) -> NonterminalID {
        if let Some(&id) = self.names.get(name) {
            return id;
        }
        let id = self.alloc(Some(name.to_owned()), NonterminalKind::Plain);
        self.names.insert(name.to_owned(), id);
        id
    }

    pub fn lookup_nonterminal(&self, name: &str) -> Option<NonterminalID> {
        self.names.get(name).copied()
    }

    pub fn nonterminal(&self, id: NonterminalID) -> &Nonterminal {
        &self.nonterminals[id.index()]
    }

    /// One past the largest allocated nonterminal id.
    pub fn max_nonterminal(&self) -> u32 {
        self.nonterminals.len() as u32
    }

    pub fn nonterminals(&self) -> impl Iterator<Item = (NonterminalID, &Nonterminal)> + '_ {
        self.nonterminals
            .iter()
            .enumerate()
            .map(|(i, nt)| (NonterminalID(i as u32), nt))
    }

    /// The first nonterminal defined with a name, if any.
    pub fn first_named_nonterminal(&self) -> Option<NonterminalID> {
        self.names.values().next().copied()
    }

    fn intern_rule(&mut self, left: NonterminalID, items: Vec<Item>) -> RuleID {
        if let Some(&id) = self.rule_index.get(&(left, items.clone())) {
            return id;
        }
        let id = RuleID(self.rules.len() as u32);
        self.rules.push(Rule {
            left,
            items: items.clone(),
        });
        self.rule_index.insert((left, items), id);
        id
    }

    /// Interns a rule and attaches it to its nonterminal.
    pub fn push_rule(&mut self, left: NonterminalID, items: Vec<Item>) -> RuleID {
        let id = self.intern_rule(left, items);
        self.nonterminals[left.index()].rules.push(id);
        id
    }

    /// Drops the rules of a nonterminal (the `=>` replace form).
    pub fn clear_rules(&mut self, id: NonterminalID) {
        self.nonterminals[id.index()].rules.clear();
    }

    pub fn rule(&self, id: RuleID) -> &Rule {
        &self.rules[id.index()]
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    pub fn rules(&self) -> impl Iterator<Item = (RuleID, &Rule)> + '_ {
        self.rules
            .iter()
            .enumerate()
            .map(|(i, rule)| (RuleID(i as u32), rule))
    }

    pub fn optional(&mut self, items: Vec<Item>) -> NonterminalID {
        let key = WrapperKey::Optional(items.clone());
        if let Some(&id) = self.wrappers.get(&key) {
            return id;
        }
        let id = self.alloc(None, NonterminalKind::Plain);
        self.push_rule(id, Vec::new());
        let body = self.push_rule(id, items);
        self.nonterminals[id.index()].kind = NonterminalKind::Optional { body };
        self.wrappers.insert(key, id);
        id
    }

    pub fn repeat_zero(&mut self, items: Vec<Item>) -> NonterminalID {
        let key = WrapperKey::RepeatZero(items.clone());
        if let Some(&id) = self.wrappers.get(&key) {
            return id;
        }
        let id = self.alloc(None, NonterminalKind::Plain);
        self.push_rule(id, Vec::new());
        let mut recursive = Vec::with_capacity(items.len() + 1);
        recursive.push(Item::Nonterminal(id));
        recursive.extend(items.iter().copied());
        self.push_rule(id, recursive);
        let body = self.intern_rule(id, items);
        self.nonterminals[id.index()].kind = NonterminalKind::RepeatZero { body };
        self.wrappers.insert(key, id);
        id
    }

    pub fn repeat_one(&mut self, items: Vec<Item>) -> NonterminalID {
        let key = WrapperKey::RepeatOne(items.clone());
        if let Some(&id) = self.wrappers.get(&key) {
            return id;
        }
        let id = self.alloc(None, NonterminalKind::Plain);
        let body = self.push_rule(id, items.clone());
        let mut recursive = Vec::with_capacity(items.len() + 1);
        recursive.push(Item::Nonterminal(id));
        recursive.extend(items);
        self.push_rule(id, recursive);
        self.nonterminals[id.index()].kind = NonterminalKind::RepeatOne { body };
        self.wrappers.insert(key, id);
        id
    }

    pub fn alternate(&mut self, left_items: Vec<Item>, right_items: Vec<Item>) -> NonterminalID {
        let key = WrapperKey::Alternate(left_items.clone(), right_items.clone());
        if let Some(&id) = self.wrappers.get(&key) {
            return id;
        }
        let id = self.alloc(None, NonterminalKind::Plain);
        let left = self.push_rule(id, left_items);
        let right = self.push_rule(id, right_items);
        self.nonterminals[id.index()].kind = NonterminalKind::Alternate { left, right };
        self.wrappers.insert(key, id);
        id
    }

    pub fn guard(&mut self, items: Vec<Item>) -> NonterminalID {
        let key = WrapperKey::Guard(items.clone());
        if let Some(&id) = self.wrappers.get(&key) {
            return id;
        }
        let id = self.alloc(None, NonterminalKind::Plain);
        let body = self.intern_rule(id, items);
        let symbol = self.terminals.add(&format!("#guard{}", id.raw()));
        self.nonterminals[id.index()].kind = NonterminalKind::Guard { body, symbol };
        self.wrappers.insert(key, id);
        self.guard_symbols.insert(symbol, id);
        id
    }

    /// Synthesizes an augmented start symbol for `target`.
    pub fn add_start(&mut self, target: NonterminalID) -> NonterminalID {
        let id = self.alloc(None, NonterminalKind::Start { target });
        self.push_rule(id, vec![Item::Nonterminal(target)]);
        self.starts.push(id);
        id
    }

    pub fn starts(&self) -> &[NonterminalID] {
        &self.starts
    }

    /// All interned guard instances, in creation order.
    pub fn guards(&self) -> impl Iterator<Item = (NonterminalID, RuleID, TerminalID)> + '_ {
        self.nonterminals
            .iter()
            .enumerate()
            .filter_map(|(i, nt)| match nt.kind {
                NonterminalKind::Guard { body, symbol } => {
                    Some((NonterminalID(i as u32), body, symbol))
                }
                _ => None,
            })
    }

    /// The guard instance a pseudo-terminal belongs to, if any.
    pub fn guard_of_symbol(&self, symbol: TerminalID) -> Option<NonterminalID> {
        self.guard_symbols.get(&symbol).copied()
    }

    pub fn nonterminal_name(&self, id: NonterminalID) -> Cow<'_, str> {
        let nt = &self.nonterminals[id.index()];
        if let Some(name) = &nt.name {
            return Cow::Borrowed(name.as_str());
        }
        Cow::Owned(match nt.kind {
            NonterminalKind::Start { target } => {
                format!("$start({})", self.nonterminal_name(target))
            }
            NonterminalKind::Optional { .. } => format!("#opt{}", id.raw()),
            NonterminalKind::RepeatZero { .. } => format!("#star{}", id.raw()),
            NonterminalKind::RepeatOne { .. } => format!("#plus{}", id.raw()),
            NonterminalKind::Alternate { .. } => format!("#alt{}", id.raw()),
            NonterminalKind::Guard { .. } => format!("#guard{}", id.raw()),
            NonterminalKind::Plain => format!("#anon{}", id.raw()),
        })
    }

    pub fn display_rule(&self, id: RuleID) -> impl fmt::Display + '_ {
        crate::util::display_fn(move |f| {
            let rule = self.rule(id);
            write!(f, "{} ->", self.nonterminal_name(rule.left))?;
            if rule.items.is_empty() {
                write!(f, " <empty>")?;
            }
            for item in &rule.items {
                match item {
                    Item::Terminal(t) => write!(f, " {}", self.terminals.name(*t))?,
                    Item::Nonterminal(n) => write!(f, " {}", self.nonterminal_name(*n))?,
                }
            }
            Ok(())
        })
    }
}

/// First sets and nullability for every nonterminal-side symbol, computed
/// to a fixed point over the whole rule arena. Guards derive both from
/// their body rule: the tokens that can begin a guarded alternative are
/// exactly the tokens the guard has to match first.
#[derive(Debug)]
pub struct FirstSets {
    first: Vec<TokenSet>,
    nullable: Vec<bool>,
}

impl FirstSets {
    pub fn new(grammar: &Grammar) -> Self {
        let n = grammar.max_nonterminal() as usize;
        let mut first = vec![TokenSet::default(); n];
        let mut nullable = vec![false; n];

        let mut changed = true;
        while changed {
            changed = false;
            for (id, _) in grammar.nonterminals() {
                for rule_id in Self::derivation_rules(grammar, id) {
                    let rule = grammar.rule(rule_id);
                    let i = id.index();

                    if !nullable[i]
                        && rule.items.iter().all(|item| match item {
                            Item::Terminal(_) => false,
                            Item::Nonterminal(m) => nullable[m.index()],
                        })
                    {
                        nullable[i] = true;
                        changed = true;
                    }

                    let mut acc = TokenSet::default();
                    for item in &rule.items {
                        match item {
                            Item::Terminal(t) => {
                                acc.insert(*t);
                                break;
                            }
                            Item::Nonterminal(m) => {
                                acc.union_with(&first[m.index()]);
                                if !nullable[m.index()] {
                                    break;
                                }
                            }
                        }
                    }
                    changed |= first[i].union_with(&acc);
                }
            }
        }

        Self { first, nullable }
    }

    fn derivation_rules(grammar: &Grammar, id: NonterminalID) -> Vec<RuleID> {
        match grammar.nonterminal(id).kind {
            NonterminalKind::Guard { body, .. } => vec![body],
            _ => grammar.nonterminal(id).rules.clone(),
        }
    }

    pub fn first(&self, id: NonterminalID) -> &TokenSet {
        &self.first[id.index()]
    }

    pub fn nullable(&self, id: NonterminalID) -> bool {
        self.nullable[id.index()]
    }

    /// `First` of an item sequence plus whether the whole sequence can
    /// match empty.
    pub fn first_of_items(&self, items: &[Item]) -> (TokenSet, bool) {
        let mut set = TokenSet::default();
        for item in items {
            match item {
                Item::Terminal(t) => {
                    set.insert(*t);
                    return (set, false);
                }
                Item::Nonterminal(n) => {
                    set.union_with(&self.first[n.index()]);
                    if !self.nullable[n.index()] {
                        return (set, false);
                    }
                }
            }
        }
        (set, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dictionary_assigns_stable_ids() {
        let mut dict = TerminalDict::default();
        let a = dict.add("a");
        let b = dict.add("b");
        assert_eq!(a, TerminalID::from_raw(2));
        assert_eq!(b, TerminalID::from_raw(3));
        assert_eq!(dict.add("a"), a);
        assert_eq!(dict.lookup("b"), Some(b));
        assert_eq!(dict.name(a), "a");
        assert_eq!(dict.name(TerminalID::EOI), "$end");
        assert_eq!(dict.count(), 2);
    }

    #[test]
    fn rules_are_interned_by_structure() {
        let mut grammar = Grammar::new();
        let t = grammar.terminals.add("x");
        let a = grammar.nonterminal_id("A");
        let r1 = grammar.push_rule(a, vec![Item::Terminal(t)]);
        let r2 = grammar.intern_rule(a, vec![Item::Terminal(t)]);
        assert_eq!(r1, r2);
        assert_eq!(grammar.rule_count(), 1);
    }

    #[test]
    fn wrappers_share_identity() {
        let mut grammar = Grammar::new();
        let t = grammar.terminals.add("x");
        let w1 = grammar.repeat_zero(vec![Item::Terminal(t)]);
        let w2 = grammar.repeat_zero(vec![Item::Terminal(t)]);
        assert_eq!(w1, w2);

        // The star wrapper derives empty and left-recursive rules.
        let rules = &grammar.nonterminal(w1).rules;
        assert_eq!(rules.len(), 2);
        assert!(grammar.rule(rules[0]).items.is_empty());
        assert_eq!(
            grammar.rule(rules[1]).items[0],
            Item::Nonterminal(w1),
        );
    }

    #[test]
    fn guards_contribute_no_closure_rules() {
        let mut grammar = Grammar::new();
        let t = grammar.terminals.add("x");
        let g = grammar.guard(vec![Item::Terminal(t)]);
        assert!(grammar.nonterminal(g).rules.is_empty());
        let (_, body, symbol) = grammar.guards().next().unwrap();
        assert_eq!(grammar.rule(body).items, vec![Item::Terminal(t)]);
        assert_eq!(grammar.guard_of_symbol(symbol), Some(g));
    }

    #[test]
    fn first_sets_cover_wrappers_and_guards() {
        let mut grammar = Grammar::new();
        let x = grammar.terminals.add("x");
        let y = grammar.terminals.add("y");
        let a = grammar.nonterminal_id("A");
        let star = grammar.repeat_zero(vec![Item::Terminal(x)]);
        grammar.push_rule(a, vec![Item::Nonterminal(star), Item::Terminal(y)]);
        let guard = grammar.guard(vec![Item::Terminal(x)]);

        let firsts = FirstSets::new(&grammar);
        assert!(firsts.nullable(star));
        assert!(!firsts.nullable(a));
        assert!(firsts.first(star).contains(x));
        assert!(firsts.first(a).contains(x));
        assert!(firsts.first(a).contains(y));
        assert!(firsts.first(guard).contains(x));
        assert!(!firsts.nullable(guard));

        let (set, empty) = firsts.first_of_items(&[Item::Nonterminal(star), Item::Terminal(y)]);
        assert!(set.contains(x) && set.contains(y));
        assert!(!empty);
    }
}
