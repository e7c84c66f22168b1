//! End-to-end scenarios: a language definition goes through the whole
//! pipeline and the resulting tables are driven by the runtime.

use tarn::ast::{
    DefinitionFile, DefinitionOp, EbnfItem, GrammarBlock, LanguageBlock, LanguageUnit,
    LexemeDef, LexerBlock, NonterminalDef, Pos, ProductionDef, TopLevelBlock,
};
use tarn::config::Config;
use tarn::diag::ConsoleBuffer;
use tarn::grammar::{RuleID, TerminalID};
use tarn::session::{self, Compilation};
use tarn_runtime::lexer::Lexer;
use tarn_runtime::parser::{ParseError, ParseEvent, Parser};
use tarn_runtime::tables::Action;

fn lexer_block(items: Vec<LexemeDef>) -> LexerBlock {
    LexerBlock {
        items,
        pos: Pos::NONE,
    }
}

fn grammar_block(nonterminals: Vec<NonterminalDef>) -> GrammarBlock {
    GrammarBlock {
        nonterminals,
        pos: Pos::NONE,
    }
}

fn rule(name: &str, productions: Vec<Vec<EbnfItem>>) -> NonterminalDef {
    NonterminalDef {
        name: name.to_owned(),
        op: DefinitionOp::Assign,
        productions: productions
            .into_iter()
            .map(|items| ProductionDef {
                items,
                pos: Pos::NONE,
            })
            .collect(),
        pos: Pos::NONE,
    }
}

fn compile(units: Vec<LanguageUnit>) -> (Compilation, ConsoleBuffer) {
    let file = DefinitionFile {
        blocks: vec![TopLevelBlock::Language(LanguageBlock {
            name: "Test".to_owned(),
            inherits: vec![],
            units,
            pos: Pos::NONE,
        })],
    };
    let mut console = ConsoleBuffer::new();
    let compilation = session::compile(&file, "test.lang", &Config::default(), &mut console)
        .unwrap_or_else(|| panic!("compilation failed: {:#?}", console.diagnostics));
    (compilation, console)
}

fn tokens(compilation: &Compilation, input: &str) -> Vec<u32> {
    Lexer::new(&compilation.lexer, input)
        .map(|lexeme| lexeme.expect("input must lex").symbol)
        .collect()
}

fn parse(compilation: &Compilation, input: &str) -> Result<Vec<ParseEvent>, ParseError> {
    Parser::new(&compilation.parser, tokens(compilation, input).into_iter()).run()
}

/// The trace as symbol/rule names: shifted terminals by their dictionary
/// name, reductions by the nonterminal they reduce to.
fn trace(compilation: &Compilation, input: &str) -> Vec<String> {
    parse(compilation, input)
        .expect("input must parse")
        .into_iter()
        .filter_map(|event| match event {
            ParseEvent::Shift(t) => Some(
                compilation
                    .grammar
                    .terminals
                    .name(TerminalID::from_raw(t))
                    .to_owned(),
            ),
            ParseEvent::Reduce(r) => {
                let left = compilation.grammar.rule(RuleID::from_raw(r)).left;
                Some(compilation.grammar.nonterminal_name(left).into_owned())
            }
            ParseEvent::Accept(_) => None,
        })
        .collect()
}

/// Invariant: a cell holding several actions for one terminal must
/// involve a conditional action; plain shift/reduce sets never clash.
fn assert_no_unguarded_conflicts(compilation: &Compilation) {
    for (state, row) in compilation.parser.rows.iter().enumerate() {
        let mut cells: std::collections::BTreeMap<u32, Vec<Action>> = Default::default();
        for &(terminal, action) in &row.terminals {
            cells.entry(terminal).or_default().push(action);
        }
        for (terminal, cell) in cells {
            if cell.len() <= 1 {
                continue;
            }
            assert!(
                cell.iter().any(|a| matches!(
                    a,
                    Action::Guard(_) | Action::WeakReduce(_) | Action::Divert(_)
                )),
                "unconditional conflict on terminal {} in state {}: {:?}",
                terminal,
                state,
                cell
            );
        }
    }
}

fn arithmetic_units() -> Vec<LanguageUnit> {
    vec![
        LanguageUnit::Lexer(lexer_block(vec![
            LexemeDef::regex("num", "[0-9]+"),
            LexemeDef::string("plus", "\"+\""),
            LexemeDef::string("times", "\"*\""),
            LexemeDef::string("lparen", "\"(\""),
            LexemeDef::string("rparen", "\")\""),
        ])),
        LanguageUnit::Ignore(lexer_block(vec![LexemeDef::regex("ws", "[ \t]+")])),
        LanguageUnit::Grammar(grammar_block(vec![
            rule(
                "Expr",
                vec![
                    vec![
                        EbnfItem::nonterminal("Expr"),
                        EbnfItem::terminal("plus"),
                        EbnfItem::nonterminal("Term"),
                    ],
                    vec![EbnfItem::nonterminal("Term")],
                ],
            ),
            rule(
                "Term",
                vec![
                    vec![
                        EbnfItem::nonterminal("Term"),
                        EbnfItem::terminal("times"),
                        EbnfItem::nonterminal("Factor"),
                    ],
                    vec![EbnfItem::nonterminal("Factor")],
                ],
            ),
            rule(
                "Factor",
                vec![
                    vec![EbnfItem::terminal("num")],
                    vec![
                        EbnfItem::terminal("lparen"),
                        EbnfItem::nonterminal("Expr"),
                        EbnfItem::terminal("rparen"),
                    ],
                ],
            ),
        ])),
    ]
}

#[test]
fn s1_arithmetic_grammar() {
    let (compilation, console) = compile(arithmetic_units());
    assert_eq!(compilation.parser_stats.conflicts, 0);
    assert!(!console.has_code("SHIFT_REDUCE_CONFLICT"));
    assert_no_unguarded_conflicts(&compilation);

    assert_eq!(
        trace(&compilation, "1+2*3"),
        [
            "num", "Factor", "Term", "Expr", "plus", "num", "Factor", "Term", "times", "num",
            "Factor", "Term", "Expr"
        ]
    );

    // Operator precedence falls out of the grammar shape.
    assert_eq!(
        trace(&compilation, "(1+2)*3"),
        [
            "lparen", "num", "Factor", "Term", "Expr", "plus", "num", "Factor", "Term", "Expr",
            "rparen", "Factor", "Term", "times", "num", "Factor", "Term", "Expr"
        ]
    );

    // Truncated input rejects at end of input.
    assert!(matches!(
        parse(&compilation, "1+"),
        Err(ParseError::Syntax { .. })
    ));
}

fn weak_keyword_units() -> Vec<LanguageUnit> {
    vec![
        LanguageUnit::Lexer(lexer_block(vec![LexemeDef::regex(
            "identifier",
            "[a-z]+",
        )])),
        LanguageUnit::WeakKeywords(lexer_block(vec![LexemeDef::literal("if", "if")])),
        LanguageUnit::Ignore(lexer_block(vec![LexemeDef::regex("ws", "[ ]+")])),
        LanguageUnit::Grammar(grammar_block(vec![rule(
            "S",
            vec![
                vec![EbnfItem::terminal("if"), EbnfItem::terminal("identifier")],
                vec![EbnfItem::terminal("identifier")],
            ],
        )])),
    ]
}

#[test]
fn s2_weak_keyword() {
    let (compilation, _console) = compile(weak_keyword_units());
    assert_no_unguarded_conflicts(&compilation);

    let kw = compilation.grammar.terminals.lookup("if").unwrap();
    // The lexer classifies "if" as the weak keyword, not the identifier.
    assert_eq!(tokens(&compilation, "if"), vec![kw.raw()]);
    // Its underlying category is the identifier.
    let identifier = compilation.grammar.terminals.lookup("identifier").unwrap();
    assert_eq!(compilation.weak.strong_for.get(&kw), Some(&identifier));

    // "if x" takes the keyword alternative.
    let events = parse(&compilation, "if x").unwrap();
    let reduces: Vec<u32> = events
        .iter()
        .filter_map(|e| match e {
            ParseEvent::Reduce(r) => Some(*r),
            _ => None,
        })
        .collect();
    assert_eq!(reduces.len(), 1);
    assert_eq!(compilation.parser.rules[reduces[0] as usize].len, 2);

    // "if" alone is an identifier: the two-symbol alternative is dead and
    // the keyword lexeme reduces through the one-symbol rule.
    let events = parse(&compilation, "if").unwrap();
    let reduces: Vec<u32> = events
        .iter()
        .filter_map(|e| match e {
            ParseEvent::Reduce(r) => Some(*r),
            _ => None,
        })
        .collect();
    assert_eq!(reduces.len(), 1);
    assert_eq!(compilation.parser.rules[reduces[0] as usize].len, 1);
}

#[test]
fn s3_ignored_whitespace_changes_nothing() {
    let (compilation, _console) = compile(arithmetic_units());
    assert_eq!(trace(&compilation, "1 + 2"), trace(&compilation, "1+2"));
    assert_eq!(
        trace(&compilation, "( 1\t+ 2 ) * 3"),
        trace(&compilation, "(1+2)*3")
    );
}

fn guard_units() -> Vec<LanguageUnit> {
    vec![
        LanguageUnit::Lexer(lexer_block(vec![
            LexemeDef::regex("identifier", "[a-z]+"),
            LexemeDef::string("lparen", "\"(\""),
            LexemeDef::string("rparen", "\")\""),
        ])),
        LanguageUnit::WeakKeywords(lexer_block(vec![LexemeDef::literal("print", "print")])),
        LanguageUnit::Grammar(grammar_block(vec![rule(
            "Expr",
            vec![
                vec![
                    EbnfItem::Guard(vec![EbnfItem::terminal("print")]),
                    EbnfItem::terminal("print"),
                    EbnfItem::terminal("lparen"),
                    EbnfItem::nonterminal("Expr"),
                    EbnfItem::terminal("rparen"),
                ],
                vec![EbnfItem::terminal("identifier")],
            ],
        )])),
    ]
}

#[test]
fn s4_guarded_alternative() {
    let (compilation, _console) = compile(guard_units());
    assert_no_unguarded_conflicts(&compilation);

    // "print(x)" takes the guarded alternative: the outer reduction pops
    // the guard slot plus four symbols.
    let events = parse(&compilation, "print(x)").unwrap();
    let last_reduce = events
        .iter()
        .rev()
        .find_map(|e| match e {
            ParseEvent::Reduce(r) => Some(*r),
            _ => None,
        })
        .unwrap();
    assert_eq!(compilation.parser.rules[last_reduce as usize].len, 5);

    // "print" alone reduces as an identifier.
    let events = parse(&compilation, "print").unwrap();
    let reduces: Vec<u32> = events
        .iter()
        .filter_map(|e| match e {
            ParseEvent::Reduce(r) => Some(*r),
            _ => None,
        })
        .collect();
    assert_eq!(reduces.len(), 1);
    assert_eq!(compilation.parser.rules[reduces[0] as usize].len, 1);
}

#[test]
fn s5_repetition_wrapper() {
    let (compilation, _console) = compile(vec![
        LanguageUnit::Lexer(lexer_block(vec![LexemeDef::regex("item", "[a-z]+")])),
        LanguageUnit::Ignore(lexer_block(vec![LexemeDef::regex("ws", "[ ]+")])),
        LanguageUnit::Grammar(grammar_block(vec![rule(
            "Items",
            vec![vec![EbnfItem::RepeatZero(vec![EbnfItem::terminal("item")])]],
        )])),
    ]);

    // Empty input: the star matches nothing and Items reduces over it.
    let events = parse(&compilation, "").unwrap();
    let reduces = events
        .iter()
        .filter(|e| matches!(e, ParseEvent::Reduce(_)))
        .count();
    assert_eq!(reduces, 2);
    assert!(matches!(events.last(), Some(ParseEvent::Accept(_))));

    // Three items ride the left-recursive spine of the wrapper.
    let events = parse(&compilation, "a a a").unwrap();
    let shifts = events
        .iter()
        .filter(|e| matches!(e, ParseEvent::Shift(_)))
        .count();
    let reduces = events
        .iter()
        .filter(|e| matches!(e, ParseEvent::Reduce(_)))
        .count();
    assert_eq!(shifts, 3);
    // empty seed + one spine step per item + the Items rule itself.
    assert_eq!(reduces, 5);
}

#[test]
fn s6_implicit_keyword() {
    let (compilation, console) = compile(vec![LanguageUnit::Grammar(grammar_block(vec![
        rule("S", vec![vec![EbnfItem::terminal("while")]]),
    ]))]);

    assert!(console.has_code("IMPLICIT_LEXER_SYMBOL"));

    let kw = compilation.grammar.terminals.lookup("while").unwrap();
    // The implicit keyword is weak; with no broader category to fall
    // back on, a strong shadow was injected for it.
    assert_eq!(compilation.weak.injected, 1);
    assert!(compilation.weak.strong_for.contains_key(&kw));

    assert_eq!(tokens(&compilation, "while"), vec![kw.raw()]);
    let events = parse(&compilation, "while").unwrap();
    assert!(matches!(events.last(), Some(ParseEvent::Accept(_))));
}

#[test]
fn weak_reductions_are_conditional() {
    // T = identifier ; S = T identifier | T "if". Reducing T on the
    // lookahead "if" must be a weak reduction cloned from the identifier
    // cell, never an unconditional one.
    let (compilation, _console) = compile(vec![
        LanguageUnit::Lexer(lexer_block(vec![LexemeDef::regex(
            "identifier",
            "[a-z]+",
        )])),
        LanguageUnit::WeakKeywords(lexer_block(vec![LexemeDef::literal("if", "if")])),
        LanguageUnit::Ignore(lexer_block(vec![LexemeDef::regex("ws", "[ ]+")])),
        LanguageUnit::Grammar(grammar_block(vec![
            rule(
                "S",
                vec![
                    vec![
                        EbnfItem::nonterminal("T"),
                        EbnfItem::terminal("identifier"),
                    ],
                    vec![EbnfItem::nonterminal("T"), EbnfItem::terminal("if")],
                ],
            ),
            rule("T", vec![vec![EbnfItem::terminal("identifier")]]),
        ])),
    ]);

    let kw = compilation.grammar.terminals.lookup("if").unwrap().raw();

    let mut saw_weak_reduce = false;
    for row in &compilation.parser.rows {
        let cell: Vec<Action> = row.terminal_actions(kw).copied().collect();
        let has_weak = cell
            .iter()
            .any(|a| matches!(a, Action::WeakReduce(_)));
        saw_weak_reduce |= has_weak;
        if has_weak {
            assert!(
                !cell.iter().any(|a| matches!(a, Action::Reduce(_))),
                "a weak cell must not keep an unconditional reduce: {:?}",
                cell
            );
        }
    }
    assert!(saw_weak_reduce);

    // Both readings of the keyword parse.
    assert!(parse(&compilation, "x if").is_ok());
    assert!(parse(&compilation, "x y").is_ok());
    assert!(parse(&compilation, "if if").is_ok());
}

#[test]
fn duplicate_literal_round_trip() {
    // A keyword and a weak keyword for the same name: one terminal entry
    // (from the pass that runs first) plus a duplicate diagnostic.
    let file = DefinitionFile {
        blocks: vec![TopLevelBlock::Language(LanguageBlock {
            name: "Test".to_owned(),
            inherits: vec![],
            units: vec![
                LanguageUnit::Keywords(lexer_block(vec![LexemeDef::literal("if", "if")])),
                LanguageUnit::WeakKeywords(lexer_block(vec![LexemeDef::literal("if", "if")])),
                LanguageUnit::Grammar(grammar_block(vec![rule(
                    "S",
                    vec![vec![EbnfItem::terminal("if")]],
                )])),
            ],
            pos: Pos::NONE,
        })],
    };
    let mut console = ConsoleBuffer::new();
    let result = session::compile(&file, "test.lang", &Config::default(), &mut console);

    // The duplicate is an error, so no tables are produced, and the
    // dictionary retained exactly one entry for the name.
    assert!(result.is_none());
    assert!(console.has_code("DUPLICATE_LEXER_SYMBOL"));
    assert_eq!(
        console
            .diagnostics
            .iter()
            .filter(|d| d.code == "DUPLICATE_LEXER_SYMBOL")
            .count(),
        1
    );
}

#[test]
fn multiple_start_symbols_get_their_own_entry_states() -> anyhow::Result<()> {
    let file = DefinitionFile {
        blocks: vec![TopLevelBlock::Language(LanguageBlock {
            name: "Test".to_owned(),
            inherits: vec![],
            units: vec![
                LanguageUnit::Lexer(lexer_block(vec![
                    LexemeDef::regex("num", "[0-9]+"),
                    LexemeDef::regex("word", "[a-z]+"),
                ])),
                LanguageUnit::Grammar(grammar_block(vec![
                    rule("A", vec![vec![EbnfItem::terminal("num")]]),
                    rule("B", vec![vec![EbnfItem::terminal("word")]]),
                ])),
            ],
            pos: Pos::NONE,
        })],
    };
    let mut console = ConsoleBuffer::new();
    let mut config = Config::default();
    config.start_symbols = vec!["A".to_owned(), "B".to_owned()];
    let compilation = session::compile(&file, "test.lang", &config, &mut console)
        .unwrap_or_else(|| panic!("compilation failed: {:#?}", console.diagnostics));

    assert_eq!(compilation.parser.start_states.len(), 2);

    let num = compilation.grammar.terminals.lookup("num").unwrap().raw();
    let word = compilation.grammar.terminals.lookup("word").unwrap().raw();

    // Entry 0 accepts a number, entry 1 a word, and not vice versa.
    Parser::with_start(&compilation.parser, [num].into_iter(), 0).run()?;
    Parser::with_start(&compilation.parser, [word].into_iter(), 1).run()?;
    assert!(Parser::with_start(&compilation.parser, [word].into_iter(), 0)
        .run()
        .is_err());
    assert!(Parser::with_start(&compilation.parser, [num].into_iter(), 1)
        .run()
        .is_err());
    Ok(())
}
