//! The language compiler: walks a language block and populates the
//! terminal dictionary, the lexer NFA and the grammar.
//!
//! Phases run in a fixed order: lexer-symbols blocks (a placeholder),
//! the priority-ordered lexer passes, implicit symbols referenced by the
//! grammar, grammar lowering, and finally the unused/undefined
//! diagnostics. Terminal ids are frozen once this stage completes.

use crate::ast::{
    EbnfItem, LanguageBlock, LexemeDef, LexemeKind, Pos, ProductionDef, UnitKind,
};
use crate::diag::{Console, Diagnostic};
use crate::grammar::{Grammar, Item, NonterminalID, NonterminalKind, TerminalID};
use crate::nfa::{AcceptAction, Nfa};
use crate::regex::{CaseOptions, ExpressionStore, RegexCompiler};
use crate::types::{Map, Set};
use crate::util::dequote_string;

/// Everything the later stages consume: the grammar (which owns the
/// terminal dictionary), the lexer NFA, and the symbol classifications.
#[derive(Debug)]
pub struct LanguageData {
    pub filename: String,
    pub grammar: Grammar,
    pub nfa: Nfa,
    pub expressions: ExpressionStore,
    /// Terminals defined in weak blocks or implicitly by the grammar.
    pub weak: Set<TerminalID>,
    pub ignored: Set<TerminalID>,
    /// Ignored terminals the grammar references as real symbols.
    pub used_ignored: Set<TerminalID>,
    pub unit_kinds: Map<TerminalID, UnitKind>,
    pub positions: Map<TerminalID, Pos>,
    pub implicit_count: usize,
}

pub fn compile(
    block: &LanguageBlock,
    filename: &str,
    console: &mut dyn Console,
) -> LanguageData {
    let mut compiler = Compiler {
        filename,
        console,
        grammar: Grammar::new(),
        nfa: Nfa::new(),
        expressions: ExpressionStore::default(),
        weak: Set::default(),
        ignored: Set::default(),
        referenced: Set::default(),
        unused: Set::default(),
        unit_kinds: Map::default(),
        positions: Map::default(),
        first_usage: Map::default(),
        implicit_count: 0,
    };
    compiler.run(block);
    compiler.finish()
}

struct Compiler<'c> {
    filename: &'c str,
    console: &'c mut dyn Console,
    grammar: Grammar,
    nfa: Nfa,
    expressions: ExpressionStore,
    weak: Set<TerminalID>,
    ignored: Set<TerminalID>,
    referenced: Set<TerminalID>,
    unused: Set<TerminalID>,
    unit_kinds: Map<TerminalID, UnitKind>,
    positions: Map<TerminalID, Pos>,
    first_usage: Map<NonterminalID, Pos>,
    implicit_count: usize,
}

impl Compiler<'_> {
    fn run(&mut self, block: &LanguageBlock) {
        tracing::debug!(language = %block.name, "constructing lexer NFA");

        // Phase 1: lexer-symbols blocks. Reserved for named macro
        // definitions; nothing is wired through yet.
        for unit in &block.units {
            if let Some((UnitKind::LexerSymbols, _)) = unit.lexer_block() {
                tracing::trace!("skipping lexer-symbols block");
            }
        }

        // Phase 2: lexer blocks, one pass per unit kind so that symbol
        // ids reflect the priority order.
        for pass in UnitKind::PASS_ORDER {
            for unit in &block.units {
                match unit.lexer_block() {
                    Some((kind, lexer)) if kind == pass => {
                        for item in &lexer.items {
                            self.define_lexeme(kind, item);
                        }
                    }
                    _ => {}
                }
            }
        }

        // Phase 3: symbols the grammar defines implicitly. These are all
        // weak, so they must exist before the grammar is lowered.
        for unit in &block.units {
            if let Some(grammar_block) = unit.grammar_block() {
                for nonterminal in &grammar_block.nonterminals {
                    for production in &nonterminal.productions {
                        for item in &production.items {
                            self.add_implicit_symbols(item);
                        }
                    }
                }
            }
        }

        // Phase 4: grammar lowering.
        for unit in &block.units {
            if let Some(grammar_block) = unit.grammar_block() {
                for nonterminal in &grammar_block.nonterminals {
                    self.define_nonterminal(nonterminal);
                }
            }
        }

        // Phase 5: diagnostics for symbols that never took part.
        self.report_unused();
        self.report_undefined();

        tracing::debug!(
            nfa_states = self.nfa.count_states(),
            terminals = self.grammar.terminals.count(),
            weak = self.weak.len(),
            implicit = self.implicit_count,
            ignored = self.ignored.len(),
            nonterminals = self.grammar.max_nonterminal(),
            "language compiled"
        );
    }

    fn finish(self) -> LanguageData {
        let used_ignored = self
            .ignored
            .iter()
            .filter(|id| self.referenced.contains(*id))
            .copied()
            .collect();
        LanguageData {
            filename: self.filename.to_owned(),
            grammar: self.grammar,
            nfa: self.nfa,
            expressions: self.expressions,
            weak: self.weak,
            ignored: self.ignored,
            used_ignored,
            unit_kinds: self.unit_kinds,
            positions: self.positions,
            implicit_count: self.implicit_count,
        }
    }

    fn define_lexeme(&mut self, kind: UnitKind, item: &LexemeDef) {
        if self.grammar.terminals.contains(&item.name) {
            self.console.report(Diagnostic::error(
                "DUPLICATE_LEXER_SYMBOL",
                self.filename,
                item.pos,
                format!("Duplicate lexer symbol: {}", item.name),
            ));
            return;
        }

        let id = self.grammar.terminals.add(&item.name);
        self.unit_kinds.insert(id, kind);
        self.positions.insert(id, item.pos);
        // Ignored symbols are unused by definition.
        if kind != UnitKind::Ignore {
            self.unused.insert(id);
        }

        let accept = AcceptAction::language(id, kind, kind.is_weak());
        let case = if item.case_insensitive {
            CaseOptions::insensitive()
        } else {
            CaseOptions::default()
        };
        let mut compiler = RegexCompiler::new(&mut self.nfa, &self.expressions);
        compiler.set_case_options(case);

        match item.kind {
            LexemeKind::Regex => {
                // Strip the surrounding '/' delimiters.
                let pattern = item
                    .definition
                    .strip_prefix('/')
                    .and_then(|p| p.strip_suffix('/'))
                    .unwrap_or(&item.definition);
                if let Err(err) = compiler.add_regex(pattern, accept) {
                    self.console.report(Diagnostic::error(
                        "INVALID_REGEX",
                        self.filename,
                        item.pos,
                        format!("Cannot compile regular expression for {}: {}", item.name, err),
                    ));
                }
            }
            LexemeKind::Literal => compiler.add_literal(&item.name, accept),
            LexemeKind::String | LexemeKind::Character => {
                compiler.add_literal(&dequote_string(&item.definition), accept)
            }
        }

        match kind {
            UnitKind::Ignore => {
                self.ignored.insert(id);
            }
            UnitKind::WeakKeywords | UnitKind::WeakLexer => {
                self.weak.insert(id);
            }
            _ => {}
        }
    }

    /// Creates the weak literal symbols a grammar item implies. Symbols
    /// defined this way outrank nothing and must exist before lowering.
    fn add_implicit_symbols(&mut self, item: &EbnfItem) {
        match item {
            EbnfItem::Group(children)
            | EbnfItem::Optional(children)
            | EbnfItem::RepeatZero(children)
            | EbnfItem::RepeatOne(children)
            | EbnfItem::Guard(children) => {
                for child in children {
                    self.add_implicit_symbols(child);
                }
            }
            EbnfItem::Alternative(left, right) => {
                for child in left.iter().chain(right) {
                    self.add_implicit_symbols(child);
                }
            }
            EbnfItem::Terminal { name, source, pos } => {
                if source.is_some() || self.grammar.terminals.contains(name) {
                    return;
                }
                self.console.report(Diagnostic::warning(
                    "IMPLICIT_LEXER_SYMBOL",
                    self.filename,
                    *pos,
                    format!("Implicitly defining keyword: {}", name),
                ));
                self.define_implicit(name, name, *pos);
            }
            EbnfItem::TerminalString { text, pos }
            | EbnfItem::TerminalCharacter { text, pos } => {
                // Quoted literals use their quoted spelling as the name.
                if self.grammar.terminals.contains(text) {
                    return;
                }
                let literal = dequote_string(text);
                self.define_implicit(text, &literal, *pos);
            }
            EbnfItem::Nonterminal { .. } => {}
        }
    }

    fn define_implicit(&mut self, name: &str, literal: &str, pos: Pos) {
        let id = self.grammar.terminals.add(name);
        let accept = AcceptAction::language(id, UnitKind::WeakKeywords, true);
        let mut compiler = RegexCompiler::new(&mut self.nfa, &self.expressions);
        compiler.add_literal(literal, accept);

        self.unused.insert(id);
        self.unit_kinds.insert(id, UnitKind::WeakKeywords);
        self.positions.insert(id, pos);
        self.weak.insert(id);
        self.implicit_count += 1;
    }

    fn define_nonterminal(&mut self, definition: &crate::ast::NonterminalDef) {
        let id = self.grammar.nonterminal_id(&definition.name);
        let already_defined = !self.grammar.nonterminal(id).rules.is_empty();

        match definition.op {
            crate::ast::DefinitionOp::Assign if already_defined => {
                self.console.report(Diagnostic::error(
                    "DUPLICATE_NONTERMINAL_DEFINITION",
                    self.filename,
                    definition.pos,
                    format!("Duplicate nonterminal definition: {}", definition.name),
                ));
            }
            crate::ast::DefinitionOp::Replace if already_defined => {
                self.grammar.clear_rules(id);
            }
            _ => {}
        }

        for production in &definition.productions {
            let items = self.lower_production(production);
            self.grammar.push_rule(id, items);
        }
    }

    fn lower_production(&mut self, production: &ProductionDef) -> Vec<Item> {
        let mut items = Vec::with_capacity(production.items.len());
        for item in &production.items {
            self.lower_item(&mut items, item);
        }
        items
    }

    fn lower_item(&mut self, out: &mut Vec<Item>, item: &EbnfItem) {
        match item {
            EbnfItem::Terminal { name, .. } => self.push_terminal(out, name, item.pos()),
            EbnfItem::TerminalString { text, .. } | EbnfItem::TerminalCharacter { text, .. } => {
                self.push_terminal(out, text, item.pos())
            }
            EbnfItem::Nonterminal { name, pos, .. } => {
                let id = self.grammar.nonterminal_id(name);
                self.first_usage.entry(id).or_insert(*pos);
                out.push(Item::Nonterminal(id));
            }
            EbnfItem::Group(children) => {
                // Parenthesized groups are spliced into the enclosing rule.
                for child in children {
                    self.lower_item(out, child);
                }
            }
            EbnfItem::Optional(children) => {
                let body = self.lower_items(children);
                let wrapper = self.grammar.optional(body);
                out.push(Item::Nonterminal(wrapper));
            }
            EbnfItem::RepeatZero(children) => {
                let body = self.lower_items(children);
                let wrapper = self.grammar.repeat_zero(body);
                out.push(Item::Nonterminal(wrapper));
            }
            EbnfItem::RepeatOne(children) => {
                let body = self.lower_items(children);
                let wrapper = self.grammar.repeat_one(body);
                out.push(Item::Nonterminal(wrapper));
            }
            EbnfItem::Alternative(left, right) => {
                let left_items = self.lower_items(left);
                let right_items = self.lower_items(right);
                let wrapper = self.grammar.alternate(left_items, right_items);
                out.push(Item::Nonterminal(wrapper));
            }
            EbnfItem::Guard(children) => {
                let body = self.lower_items(children);
                let wrapper = self.grammar.guard(body);
                out.push(Item::Nonterminal(wrapper));
            }
        }
    }

    fn lower_items(&mut self, items: &[EbnfItem]) -> Vec<Item> {
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            self.lower_item(&mut out, item);
        }
        out
    }

    fn push_terminal(&mut self, out: &mut Vec<Item>, name: &str, pos: Pos) {
        match self.grammar.terminals.lookup(name) {
            Some(id) => {
                self.unused.swap_remove(&id);
                self.referenced.insert(id);
                out.push(Item::Terminal(id));
            }
            None => {
                // Implicit definition already ran; a miss here is ours.
                self.console.report(Diagnostic::bug(
                    "BUG_UNKNOWN_SYMBOL",
                    self.filename,
                    pos,
                    format!("Terminal disappeared from the dictionary: {}", name),
                ));
            }
        }
    }

    fn report_unused(&mut self) {
        for &id in &self.unused {
            if self.ignored.contains(&id) {
                continue;
            }
            let pos = self.positions.get(&id).copied().unwrap_or(Pos::NONE);
            self.console.report(Diagnostic::warning(
                "UNUSED_TERMINAL_SYMBOL",
                self.filename,
                pos,
                format!(
                    "Unused terminal symbol definition: {}",
                    self.grammar.terminals.name(id)
                ),
            ));
        }
    }

    fn report_undefined(&mut self) {
        let undefined: Vec<(NonterminalID, String)> = self
            .grammar
            .nonterminals()
            .filter(|(_, nt)| matches!(nt.kind, NonterminalKind::Plain) && nt.rules.is_empty())
            .filter(|(_, nt)| nt.name.is_some())
            .map(|(id, nt)| (id, nt.name.clone().unwrap_or_default()))
            .collect();
        for (id, name) in undefined {
            let pos = self.first_usage.get(&id).copied().unwrap_or(Pos::NONE);
            self.console.report(Diagnostic::error(
                "UNDEFINED_NONTERMINAL",
                self.filename,
                pos,
                format!("Undefined nonterminal: {}", name),
            ));
        }
    }
}
