//! The emission interface: a finished compilation is streamed to an
//! [`OutputStage`] as an ordered sequence of events. Emitters override
//! the callbacks they care about; every default is a no-op.

use crate::charset::SymbolRange;
use crate::grammar::{Item, NonterminalID, RuleID, TerminalID};
use crate::session::Compilation;
use tarn_runtime::tables::ParserTables;

#[allow(unused_variables)]
pub trait OutputStage {
    fn begin_output(&mut self) {}
    fn end_output(&mut self) {}

    fn begin_terminal_symbols(&mut self) {}
    fn terminal_symbol(&mut self, name: &str, id: TerminalID) {}
    fn end_terminal_symbols(&mut self) {}

    fn begin_nonterminal_symbols(&mut self) {}
    fn nonterminal_symbol(&mut self, name: &str, id: NonterminalID) {}
    fn end_nonterminal_symbols(&mut self) {}

    fn begin_lexer_definitions(&mut self) {}
    fn begin_lexer_symbol_map(&mut self, classes: usize) {}
    fn symbol_map_range(&mut self, range: SymbolRange, class: u32) {}
    fn end_lexer_symbol_map(&mut self) {}
    fn begin_lexer_state_machine(&mut self, states: usize) {}
    fn begin_lexer_state(&mut self, state: u32) {}
    fn lexer_state_transition(&mut self, class: u32, target: u32) {}
    fn end_lexer_state(&mut self) {}
    fn end_lexer_state_machine(&mut self) {}
    fn begin_lexer_accept_table(&mut self) {}
    fn nonaccepting_state(&mut self, state: u32) {}
    fn accepting_state(&mut self, state: u32, symbol: TerminalID) {}
    fn end_lexer_accept_table(&mut self) {}
    fn end_lexer_definitions(&mut self) {}

    fn begin_parser_definitions(&mut self) {}
    fn parser_tables(&mut self, tables: &ParserTables) {}
    fn end_parser_definitions(&mut self) {}

    fn begin_ast_definitions(&mut self) {}
    fn begin_ast_nonterminal(&mut self, id: NonterminalID, name: &str) {}
    fn begin_ast_rule(&mut self, id: RuleID) {}
    fn ast_rule_item_terminal(&mut self, id: TerminalID) {}
    fn ast_rule_item_nonterminal(&mut self, id: NonterminalID) {}
    fn end_ast_rule(&mut self) {}
    fn end_ast_nonterminal(&mut self) {}
    fn end_ast_definitions(&mut self) {}
}

/// Streams a compilation to `stage` in the fixed emission order:
/// symbols, lexer tables, parser tables, AST structure.
pub fn write_output(compilation: &Compilation, stage: &mut dyn OutputStage) {
    stage.begin_output();

    stage.begin_terminal_symbols();
    for (id, name) in compilation.grammar.terminals.iter() {
        stage.terminal_symbol(name, id);
    }
    stage.end_terminal_symbols();

    stage.begin_nonterminal_symbols();
    for (id, _) in compilation.grammar.nonterminals() {
        stage.nonterminal_symbol(&compilation.grammar.nonterminal_name(id), id);
    }
    stage.end_nonterminal_symbols();

    stage.begin_lexer_definitions();
    stage.begin_lexer_symbol_map(compilation.dfa.alphabet.len());
    for &(lo, hi, class) in &compilation.lexer.symbol_map {
        stage.symbol_map_range(SymbolRange::new(lo, hi), class);
    }
    stage.end_lexer_symbol_map();

    stage.begin_lexer_state_machine(compilation.lexer.states.len());
    for (id, state) in compilation.lexer.states.iter().enumerate() {
        stage.begin_lexer_state(id as u32);
        for &(class, target) in &state.transitions {
            stage.lexer_state_transition(class, target);
        }
        stage.end_lexer_state();
    }
    stage.end_lexer_state_machine();

    stage.begin_lexer_accept_table();
    for (id, state) in compilation.lexer.states.iter().enumerate() {
        match state.accept {
            Some(symbol) => stage.accepting_state(id as u32, TerminalID::from_raw(symbol)),
            None => stage.nonaccepting_state(id as u32),
        }
    }
    stage.end_lexer_accept_table();
    stage.end_lexer_definitions();

    stage.begin_parser_definitions();
    stage.parser_tables(&compilation.parser);
    stage.end_parser_definitions();

    stage.begin_ast_definitions();
    for (id, nonterminal) in compilation.grammar.nonterminals() {
        stage.begin_ast_nonterminal(id, &compilation.grammar.nonterminal_name(id));
        for &rule in &nonterminal.rules {
            stage.begin_ast_rule(rule);
            for item in &compilation.grammar.rule(rule).items {
                match *item {
                    Item::Terminal(t) => stage.ast_rule_item_terminal(t),
                    Item::Nonterminal(n) => stage.ast_rule_item_nonterminal(n),
                }
            }
            stage.end_ast_rule();
        }
        stage.end_ast_nonterminal();
    }
    stage.end_ast_definitions();

    stage.end_output();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{
        DefinitionFile, EbnfItem, GrammarBlock, LanguageBlock, LanguageUnit, LexemeDef,
        LexerBlock, NonterminalDef, Pos, ProductionDef, TopLevelBlock,
    };
    use crate::config::Config;
    use crate::diag::ConsoleBuffer;

    #[derive(Default)]
    struct RecordingStage {
        events: Vec<String>,
        terminals: Vec<String>,
    }

    impl OutputStage for RecordingStage {
        fn begin_output(&mut self) {
            self.events.push("begin".into());
        }
        fn end_output(&mut self) {
            self.events.push("end".into());
        }
        fn begin_terminal_symbols(&mut self) {
            self.events.push("terminals".into());
        }
        fn terminal_symbol(&mut self, name: &str, _id: TerminalID) {
            self.terminals.push(name.to_owned());
        }
        fn begin_lexer_definitions(&mut self) {
            self.events.push("lexer".into());
        }
        fn begin_parser_definitions(&mut self) {
            self.events.push("parser".into());
        }
        fn begin_ast_definitions(&mut self) {
            self.events.push("ast".into());
        }
    }

    #[test]
    fn events_arrive_in_the_fixed_order() {
        let file = DefinitionFile {
            blocks: vec![TopLevelBlock::Language(LanguageBlock {
                name: "Demo".to_owned(),
                inherits: vec![],
                units: vec![
                    LanguageUnit::Lexer(LexerBlock {
                        items: vec![LexemeDef::regex("num", "[0-9]+")],
                        pos: Pos::NONE,
                    }),
                    LanguageUnit::Grammar(GrammarBlock {
                        nonterminals: vec![NonterminalDef {
                            name: "S".to_owned(),
                            op: crate::ast::DefinitionOp::Assign,
                            productions: vec![ProductionDef {
                                items: vec![EbnfItem::terminal("num")],
                                pos: Pos::NONE,
                            }],
                            pos: Pos::NONE,
                        }],
                        pos: Pos::NONE,
                    }),
                ],
                pos: Pos::NONE,
            })],
        };

        let mut console = ConsoleBuffer::new();
        let compilation =
            crate::session::compile(&file, "demo.lang", &Config::default(), &mut console)
                .expect("compilation must succeed");

        let mut stage = RecordingStage::default();
        write_output(&compilation, &mut stage);

        assert_eq!(stage.events, ["begin", "terminals", "lexer", "parser", "ast", "end"]);
        assert_eq!(stage.terminals, ["num"]);
    }
}
