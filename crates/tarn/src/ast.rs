//! The parsed form of a language definition file.
//!
//! A front end (out of scope here) produces this tree; the pipeline only
//! reads it. Only language blocks are consumed by the compiler; import
//! and parser blocks are carried so a front end has somewhere to put them.

/// A source position, or `Pos::NONE` when unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pos {
    pub offset: i32,
    pub line: i32,
    pub column: i32,
}

impl Pos {
    pub const NONE: Self = Self {
        offset: -1,
        line: -1,
        column: -1,
    };

    pub fn new(offset: i32, line: i32, column: i32) -> Self {
        Self {
            offset,
            line,
            column,
        }
    }
}

impl Default for Pos {
    fn default() -> Self {
        Self::NONE
    }
}

#[derive(Debug, Clone, Default)]
pub struct DefinitionFile {
    pub blocks: Vec<TopLevelBlock>,
}

#[derive(Debug, Clone)]
pub enum TopLevelBlock {
    Language(LanguageBlock),
    Import(ImportBlock),
    Parser(ParserBlock),
}

#[derive(Debug, Clone)]
pub struct ImportBlock {
    pub filename: String,
    pub pos: Pos,
}

#[derive(Debug, Clone)]
pub struct ParserBlock {
    pub name: String,
    pub language: String,
    pub pos: Pos,
}

#[derive(Debug, Clone)]
pub struct LanguageBlock {
    pub name: String,
    pub inherits: Vec<String>,
    pub units: Vec<LanguageUnit>,
    pub pos: Pos,
}

/// One unit of a language block.
#[derive(Debug, Clone)]
pub enum LanguageUnit {
    LexerSymbols(LexerBlock),
    WeakKeywords(LexerBlock),
    WeakLexer(LexerBlock),
    Keywords(LexerBlock),
    Lexer(LexerBlock),
    Ignore(LexerBlock),
    Grammar(GrammarBlock),
}

impl LanguageUnit {
    /// The lexer block carried by this unit, if it is a lexer-style unit.
    pub fn lexer_block(&self) -> Option<(UnitKind, &LexerBlock)> {
        match self {
            Self::LexerSymbols(block) => Some((UnitKind::LexerSymbols, block)),
            Self::WeakKeywords(block) => Some((UnitKind::WeakKeywords, block)),
            Self::WeakLexer(block) => Some((UnitKind::WeakLexer, block)),
            Self::Keywords(block) => Some((UnitKind::Keywords, block)),
            Self::Lexer(block) => Some((UnitKind::Lexer, block)),
            Self::Ignore(block) => Some((UnitKind::Ignore, block)),
            Self::Grammar(_) => None,
        }
    }

    pub fn grammar_block(&self) -> Option<&GrammarBlock> {
        match self {
            Self::Grammar(block) => Some(block),
            _ => None,
        }
    }
}

/// The kind of lexer unit a symbol was defined in. The variants double as
/// priority levels for accept-action disambiguation; `priority` is highest
/// for weak keywords and lowest for lexer-symbols blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum UnitKind {
    WeakKeywords,
    WeakLexer,
    Keywords,
    Lexer,
    Ignore,
    LexerSymbols,
}

impl UnitKind {
    /// The order lexer passes run in, which is also symbol priority order.
    pub const PASS_ORDER: [UnitKind; 5] = [
        UnitKind::WeakKeywords,
        UnitKind::WeakLexer,
        UnitKind::Keywords,
        UnitKind::Lexer,
        UnitKind::Ignore,
    ];

    pub fn priority(self) -> u8 {
        match self {
            UnitKind::WeakKeywords => 5,
            UnitKind::WeakLexer => 4,
            UnitKind::Keywords => 3,
            UnitKind::Lexer => 2,
            UnitKind::Ignore => 1,
            UnitKind::LexerSymbols => 0,
        }
    }

    pub fn is_weak(self) -> bool {
        matches!(self, UnitKind::WeakKeywords | UnitKind::WeakLexer)
    }
}

#[derive(Debug, Clone, Default)]
pub struct LexerBlock {
    pub items: Vec<LexemeDef>,
    pub pos: Pos,
}

/// A single lexeme definition.
///
/// The two case flags are independent so that a definition referenced by
/// `{name}` interpolation can force either behaviour: an explicitly
/// case-insensitive definition folds case even in a sensitive scope, and
/// an explicitly case-sensitive one stays exact inside an otherwise
/// case-insensitive expression. With neither flag set the definition
/// inherits the case options of whatever references it.
#[derive(Debug, Clone)]
pub struct LexemeDef {
    pub name: String,
    pub kind: LexemeKind,
    /// The definition text as written: `/regex/` with its delimiters,
    /// quoted strings/characters with their quotes, literals verbatim.
    pub definition: String,
    pub case_insensitive: bool,
    pub case_sensitive: bool,
    pub pos: Pos,
}

impl LexemeDef {
    pub fn regex(name: &str, pattern: &str) -> Self {
        Self {
            name: name.to_owned(),
            kind: LexemeKind::Regex,
            definition: format!("/{}/", pattern),
            case_insensitive: false,
            case_sensitive: false,
            pos: Pos::NONE,
        }
    }

    pub fn literal(name: &str, text: &str) -> Self {
        Self {
            name: name.to_owned(),
            kind: LexemeKind::Literal,
            definition: text.to_owned(),
            case_insensitive: false,
            case_sensitive: false,
            pos: Pos::NONE,
        }
    }

    pub fn string(name: &str, quoted: &str) -> Self {
        Self {
            name: name.to_owned(),
            kind: LexemeKind::String,
            definition: quoted.to_owned(),
            case_insensitive: false,
            case_sensitive: false,
            pos: Pos::NONE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LexemeKind {
    Regex,
    Literal,
    String,
    Character,
}

#[derive(Debug, Clone, Default)]
pub struct GrammarBlock {
    pub nonterminals: Vec<NonterminalDef>,
    pub pos: Pos,
}

#[derive(Debug, Clone)]
pub struct NonterminalDef {
    pub name: String,
    pub op: DefinitionOp,
    pub productions: Vec<ProductionDef>,
    pub pos: Pos,
}

/// How a nonterminal definition combines with earlier definitions of the
/// same name: `=` defines, `=>` replaces, `|=` appends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefinitionOp {
    Assign,
    Replace,
    Append,
}

#[derive(Debug, Clone, Default)]
pub struct ProductionDef {
    pub items: Vec<EbnfItem>,
    pub pos: Pos,
}

/// An item of a production, before lowering into the grammar model.
#[derive(Debug, Clone)]
pub enum EbnfItem {
    /// A named terminal, possibly qualified with a source language.
    Terminal {
        name: String,
        source: Option<String>,
        pos: Pos,
    },
    /// A double-quoted string used directly in the grammar.
    TerminalString { text: String, pos: Pos },
    /// A single-quoted character used directly in the grammar.
    TerminalCharacter { text: String, pos: Pos },
    Nonterminal {
        name: String,
        source: Option<String>,
        pos: Pos,
    },
    /// A parenthesized group, spliced into the enclosing production.
    Group(Vec<EbnfItem>),
    Optional(Vec<EbnfItem>),
    RepeatZero(Vec<EbnfItem>),
    RepeatOne(Vec<EbnfItem>),
    Alternative(Vec<EbnfItem>, Vec<EbnfItem>),
    /// `[=> ...]`, a lookahead guard over the wrapped items.
    Guard(Vec<EbnfItem>),
}

impl EbnfItem {
    pub fn terminal(name: &str) -> Self {
        Self::Terminal {
            name: name.to_owned(),
            source: None,
            pos: Pos::NONE,
        }
    }

    pub fn terminal_string(quoted: &str) -> Self {
        Self::TerminalString {
            text: quoted.to_owned(),
            pos: Pos::NONE,
        }
    }

    pub fn nonterminal(name: &str) -> Self {
        Self::Nonterminal {
            name: name.to_owned(),
            source: None,
            pos: Pos::NONE,
        }
    }

    pub fn pos(&self) -> Pos {
        match self {
            Self::Terminal { pos, .. }
            | Self::TerminalString { pos, .. }
            | Self::TerminalCharacter { pos, .. }
            | Self::Nonterminal { pos, .. } => *pos,
            _ => Pos::NONE,
        }
    }
}
