//! Compiles regular expressions and literal strings into NFA fragments.
//!
//! Supported syntax: `|`, `*`, `+`, `?`, `(`/`)`, `[...]`/`[^...]`
//! character classes with ranges, `.`, backslash escapes and `{name}`
//! interpolation of named sub-expressions. Unknown names fall back to a
//! literal interpretation of the braced text.

use crate::charset::{RangeSet, SymbolRange};
use crate::nfa::{AcceptAction, Nfa, StateID};
use crate::types::Map;

const MAX_EXPANSION_DEPTH: usize = 64;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegexError {
    #[error("unmatched ')' in regular expression")]
    UnmatchedClose,
    #[error("unterminated group in regular expression")]
    UnterminatedGroup,
    #[error("unterminated character class in regular expression")]
    UnterminatedClass,
    #[error("dangling quantifier '{0}'")]
    DanglingQuantifier(char),
    #[error("trailing backslash in regular expression")]
    TrailingEscape,
    #[error("named expressions nest too deeply (cycle through '{0}'?)")]
    ExpansionTooDeep(String),
}

/// Case folding flags. When a flag is set, literal symbols also match the
/// corresponding case variant. The flags behave as a stack: groups and
/// named-expression expansions restore the enclosing scope's flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaseOptions {
    pub make_lower: bool,
    pub make_upper: bool,
}

impl CaseOptions {
    pub fn insensitive() -> Self {
        Self {
            make_lower: true,
            make_upper: true,
        }
    }
}

/// A named sub-expression available to `{name}` interpolation.
///
/// A definition with neither case flag set inherits the case options of
/// the referencing scope; either flag overrides the scope in its own
/// direction, so a case-sensitive island can sit inside an otherwise
/// case-insensitive expression and vice versa.
#[derive(Debug, Clone)]
pub struct NamedExpression {
    pub is_regex: bool,
    /// The definition with delimiters already stripped.
    pub definition: String,
    pub case_insensitive: bool,
    pub case_sensitive: bool,
}

/// The `name -> definitions` store consulted by `{name}` interpolation.
/// A name may carry several definitions; they are alternated.
#[derive(Debug, Clone, Default)]
pub struct ExpressionStore {
    map: Map<String, Vec<NamedExpression>>,
}

impl ExpressionStore {
    pub fn add(&mut self, name: &str, expression: NamedExpression) {
        self.map
            .entry(name.to_owned())
            .or_default()
            .push(expression);
    }

    pub fn get(&self, name: &str) -> Option<&[NamedExpression]> {
        self.map.get(name).map(|v| v.as_slice())
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Appends expression fragments to an NFA. Every fragment starts at the
/// NFA's start state; the accept action marks its final state.
#[derive(Debug)]
pub struct RegexCompiler<'a> {
    nfa: &'a mut Nfa,
    expressions: &'a ExpressionStore,
    case: CaseOptions,
    depth: usize,
}

impl<'a> RegexCompiler<'a> {
    pub fn new(nfa: &'a mut Nfa, expressions: &'a ExpressionStore) -> Self {
        Self {
            nfa,
            expressions,
            case: CaseOptions::default(),
            depth: 0,
        }
    }

    pub fn set_case_options(&mut self, case: CaseOptions) {
        self.case = case;
    }

    /// Compiles `pattern` from the start state and marks the final state
    /// with `accept`.
    pub fn add_regex(&mut self, pattern: &str, accept: AcceptAction) -> Result<(), RegexError> {
        let chars: Vec<char> = pattern.chars().collect();
        let mut pos = 0;
        let end = self.alternation(&chars, &mut pos, 0)?;
        if pos < chars.len() {
            // Only an unbalanced ')' stops the parser early.
            return Err(RegexError::UnmatchedClose);
        }
        self.nfa.add_accept(end, accept);
        Ok(())
    }

    /// Adds `text` as a chain of single-symbol transitions from the start
    /// state, honouring the case flags, and marks the end with `accept`.
    pub fn add_literal(&mut self, text: &str, accept: AcceptAction) {
        let end = self.literal_chain(0, text);
        self.nfa.add_accept(end, accept);
    }

    /// One alternation level: `seq ('|' seq)*`, each branch from `from`.
    fn alternation(
        &mut self,
        chars: &[char],
        pos: &mut usize,
        from: StateID,
    ) -> Result<StateID, RegexError> {
        let mut ends = vec![self.sequence(chars, pos, from)?];
        while chars.get(*pos) == Some(&'|') {
            *pos += 1;
            ends.push(self.sequence(chars, pos, from)?);
        }
        Ok(self.join(ends))
    }

    fn sequence(
        &mut self,
        chars: &[char],
        pos: &mut usize,
        from: StateID,
    ) -> Result<StateID, RegexError> {
        let mut current = from;
        while let Some(&ch) = chars.get(*pos) {
            if ch == '|' || ch == ')' {
                break;
            }
            if matches!(ch, '*' | '+' | '?') {
                return Err(RegexError::DanglingQuantifier(ch));
            }
            let unit_start = current;
            let unit_end = self.unit(chars, pos, current)?;
            current = self.quantify(chars, pos, unit_start, unit_end);
        }
        Ok(current)
    }

    /// A single expression unit compiled from `from`.
    fn unit(
        &mut self,
        chars: &[char],
        pos: &mut usize,
        from: StateID,
    ) -> Result<StateID, RegexError> {
        let ch = chars[*pos];
        match ch {
            '(' => {
                *pos += 1;
                let saved = self.case;
                let end = self.alternation(chars, pos, from)?;
                if chars.get(*pos) != Some(&')') {
                    return Err(RegexError::UnterminatedGroup);
                }
                *pos += 1;
                self.case = saved;
                Ok(end)
            }
            '[' => {
                *pos += 1;
                let set = self.char_class(chars, pos)?;
                let next = self.nfa.add_state();
                self.nfa.add_set_transition(from, set, next);
                Ok(next)
            }
            '.' => {
                *pos += 1;
                let next = self.nfa.add_state();
                self.nfa.add_set_transition(from, RangeSet::all(), next);
                Ok(next)
            }
            '\\' => {
                *pos += 1;
                let escaped = self.escape(chars, pos)?;
                Ok(self.literal_symbol(from, escaped))
            }
            '{' => self.interpolation(chars, pos, from),
            _ => {
                *pos += 1;
                Ok(self.literal_symbol(from, ch))
            }
        }
    }

    /// Applies a postfix quantifier, if present, to the fragment
    /// `unit_start -> unit_end`.
    fn quantify(
        &mut self,
        chars: &[char],
        pos: &mut usize,
        unit_start: StateID,
        unit_end: StateID,
    ) -> StateID {
        match chars.get(*pos) {
            Some('*') => {
                *pos += 1;
                let next = self.nfa.add_state();
                self.nfa.add_epsilon(unit_end, unit_start);
                self.nfa.add_epsilon(unit_start, next);
                next
            }
            Some('+') => {
                *pos += 1;
                let next = self.nfa.add_state();
                self.nfa.add_epsilon(unit_end, unit_start);
                self.nfa.add_epsilon(unit_end, next);
                next
            }
            Some('?') => {
                *pos += 1;
                let next = self.nfa.add_state();
                self.nfa.add_epsilon(unit_start, next);
                self.nfa.add_epsilon(unit_end, next);
                next
            }
            _ => unit_end,
        }
    }

    /// `[...]` body, after the opening bracket.
    fn char_class(&mut self, chars: &[char], pos: &mut usize) -> Result<RangeSet, RegexError> {
        let negate = chars.get(*pos) == Some(&'^');
        if negate {
            *pos += 1;
        }
        let mut set = RangeSet::new();
        loop {
            match chars.get(*pos) {
                None => return Err(RegexError::UnterminatedClass),
                Some(']') => {
                    *pos += 1;
                    break;
                }
                Some(_) => {}
            }
            let lo = self.class_char(chars, pos)?;
            if chars.get(*pos) == Some(&'-') && chars.get(*pos + 1).is_some_and(|&c| c != ']') {
                *pos += 1;
                let hi = self.class_char(chars, pos)?;
                set.insert(SymbolRange::new(lo as u32, hi as u32 + 1));
            } else {
                for variant in self.case_variants(lo) {
                    set.insert(SymbolRange::single(variant as u32));
                }
            }
        }
        if negate {
            set = RangeSet::all().difference(&set);
        }
        Ok(set)
    }

    fn class_char(&mut self, chars: &[char], pos: &mut usize) -> Result<char, RegexError> {
        match chars.get(*pos) {
            Some('\\') => {
                *pos += 1;
                self.escape(chars, pos)
            }
            Some(&ch) => {
                *pos += 1;
                Ok(ch)
            }
            None => Err(RegexError::UnterminatedClass),
        }
    }

    /// The character following a backslash.
    fn escape(&mut self, chars: &[char], pos: &mut usize) -> Result<char, RegexError> {
        let ch = *chars.get(*pos).ok_or(RegexError::TrailingEscape)?;
        *pos += 1;
        match ch {
            'n' => Ok('\n'),
            'r' => Ok('\r'),
            't' => Ok('\t'),
            'x' | 'u' => {
                if chars.get(*pos) != Some(&'{') {
                    // Without braces the escape stands for the letter.
                    return Ok(ch);
                }
                let mut value: u32 = 0;
                let mut cursor = *pos + 1;
                while let Some(&digit) = chars.get(cursor) {
                    if digit == '}' {
                        *pos = cursor + 1;
                        return Ok(char::from_u32(value).unwrap_or('\u{fffd}'));
                    }
                    match digit.to_digit(16) {
                        Some(d) => value = value.saturating_mul(16).saturating_add(d),
                        None => break,
                    }
                    cursor += 1;
                }
                Ok(ch)
            }
            other => Ok(other),
        }
    }

    /// `{name}`: expands a named sub-expression, or falls back to the
    /// braced text as literal characters when the name is unknown.
    fn interpolation(
        &mut self,
        chars: &[char],
        pos: &mut usize,
        from: StateID,
    ) -> Result<StateID, RegexError> {
        let close = chars[*pos + 1..].iter().position(|&c| c == '}');
        let Some(close) = close else {
            *pos += 1;
            return Ok(self.literal_symbol(from, '{'));
        };
        let name: String = chars[*pos + 1..*pos + 1 + close].iter().collect();
        *pos += close + 2;

        let store = self.expressions;
        let Some(items) = store.get(&name) else {
            return Ok(self.literal_chain(from, &format!("{{{}}}", name)));
        };

        if self.depth >= MAX_EXPANSION_DEPTH {
            return Err(RegexError::ExpansionTooDeep(name));
        }
        self.depth += 1;
        let saved = self.case;

        let mut ends = Vec::with_capacity(items.len());
        for item in items {
            // An explicit case flag on the definition overrides the
            // enclosing scope in its own direction; otherwise the
            // scope's flags are inherited.
            self.case = if item.case_insensitive {
                CaseOptions::insensitive()
            } else if item.case_sensitive {
                CaseOptions::default()
            } else {
                saved
            };
            let end = if item.is_regex {
                let sub: Vec<char> = item.definition.chars().collect();
                let mut sub_pos = 0;
                let end = self.alternation(&sub, &mut sub_pos, from)?;
                if sub_pos < sub.len() {
                    return Err(RegexError::UnmatchedClose);
                }
                end
            } else {
                self.literal_chain(from, &item.definition)
            };
            ends.push(end);
        }

        self.case = saved;
        self.depth -= 1;
        Ok(self.join(ends))
    }

    fn join(&mut self, ends: Vec<StateID>) -> StateID {
        if ends.len() == 1 {
            return ends[0];
        }
        let join = self.nfa.add_state();
        for end in ends {
            self.nfa.add_epsilon(end, join);
        }
        join
    }

    fn literal_chain(&mut self, from: StateID, text: &str) -> StateID {
        let mut current = from;
        for ch in text.chars() {
            current = self.literal_symbol(current, ch);
        }
        current
    }

    fn literal_symbol(&mut self, from: StateID, ch: char) -> StateID {
        let next = self.nfa.add_state();
        let mut set = RangeSet::new();
        for variant in self.case_variants(ch) {
            set.insert(SymbolRange::single(variant as u32));
        }
        self.nfa.add_set_transition(from, set, next);
        next
    }

    fn case_variants(&self, ch: char) -> Vec<char> {
        match (self.case.make_lower, self.case.make_upper) {
            (false, false) => vec![ch],
            (true, false) => vec![single_case(ch, true)],
            (false, true) => vec![single_case(ch, false)],
            (true, true) => {
                let mut variants = vec![ch];
                for mapped in [single_case(ch, true), single_case(ch, false)] {
                    if !variants.contains(&mapped) {
                        variants.push(mapped);
                    }
                }
                variants
            }
        }
    }
}

/// The single-character case mapping; multi-character expansions keep the
/// original character.
fn single_case(ch: char, lower: bool) -> char {
    let mut mapped = if lower {
        ch.to_lowercase().collect::<Vec<_>>()
    } else {
        ch.to_uppercase().collect::<Vec<_>>()
    };
    if mapped.len() == 1 {
        mapped.pop().unwrap()
    } else {
        ch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::UnitKind;
    use crate::grammar::TerminalID;

    fn accept(raw: u32) -> AcceptAction {
        AcceptAction::language(TerminalID::from_raw(raw), UnitKind::Lexer, false)
    }

    fn accepts(nfa: &Nfa, input: &str) -> Option<u32> {
        nfa.simulate(input.chars().map(|c| c as u32))
            .map(|action| action.symbol.raw())
    }

    #[test]
    fn compiles_character_classes_and_repetition() {
        let mut nfa = Nfa::new();
        let store = ExpressionStore::default();
        let mut compiler = RegexCompiler::new(&mut nfa, &store);
        compiler.add_regex("[0-9]+", accept(2)).unwrap();

        assert_eq!(accepts(&nfa, "7"), Some(2));
        assert_eq!(accepts(&nfa, "123"), Some(2));
        assert_eq!(accepts(&nfa, ""), None);
        assert_eq!(accepts(&nfa, "12a"), None);
    }

    #[test]
    fn compiles_alternation_groups_and_optional() {
        let mut nfa = Nfa::new();
        let store = ExpressionStore::default();
        let mut compiler = RegexCompiler::new(&mut nfa, &store);
        compiler.add_regex("ab|c(d|e)?", accept(2)).unwrap();

        for matching in ["ab", "c", "cd", "ce"] {
            assert_eq!(accepts(&nfa, matching), Some(2), "input {:?}", matching);
        }
        for failing in ["a", "cde", "x"] {
            assert_eq!(accepts(&nfa, failing), None, "input {:?}", failing);
        }
    }

    #[test]
    fn compiles_negated_classes_and_escapes() {
        let mut nfa = Nfa::new();
        let store = ExpressionStore::default();
        let mut compiler = RegexCompiler::new(&mut nfa, &store);
        compiler.add_regex("[^a-z]\\n\\x{21}", accept(2)).unwrap();

        assert_eq!(accepts(&nfa, "A\n!"), Some(2));
        assert_eq!(accepts(&nfa, "a\n!"), None);
    }

    #[test]
    fn literal_case_folding() {
        let mut nfa = Nfa::new();
        let store = ExpressionStore::default();
        let mut compiler = RegexCompiler::new(&mut nfa, &store);
        compiler.set_case_options(CaseOptions::insensitive());
        compiler.add_literal("if", accept(2));

        for matching in ["if", "IF", "If", "iF"] {
            assert_eq!(accepts(&nfa, matching), Some(2), "input {:?}", matching);
        }
    }

    #[test]
    fn interpolation_uses_the_store_with_literal_fallback() {
        let mut store = ExpressionStore::default();
        store.add(
            "digit",
            NamedExpression {
                is_regex: true,
                definition: "[0-9]".to_owned(),
                case_insensitive: false,
                case_sensitive: false,
            },
        );

        let mut nfa = Nfa::new();
        let mut compiler = RegexCompiler::new(&mut nfa, &store);
        compiler.add_regex("{digit}+", accept(2)).unwrap();
        compiler.add_regex("{word}", accept(3)).unwrap();

        assert_eq!(accepts(&nfa, "42"), Some(2));
        // The unknown name matches its braced spelling literally.
        assert_eq!(accepts(&nfa, "{word}"), Some(3));
    }

    #[test]
    fn case_flags_of_named_expressions_override_the_scope() {
        let mut store = ExpressionStore::default();
        // "exact" keeps its case even inside an insensitive scope;
        // "loose" inherits whatever the referencing scope uses.
        store.add(
            "exact",
            NamedExpression {
                is_regex: false,
                definition: "if".to_owned(),
                case_insensitive: false,
                case_sensitive: true,
            },
        );
        store.add(
            "loose",
            NamedExpression {
                is_regex: false,
                definition: "if".to_owned(),
                case_insensitive: false,
                case_sensitive: false,
            },
        );

        let mut nfa = Nfa::new();
        let mut compiler = RegexCompiler::new(&mut nfa, &store);
        compiler.set_case_options(CaseOptions::insensitive());
        compiler.add_regex("{exact}x", accept(2)).unwrap();
        compiler.add_regex("{loose}y", accept(3)).unwrap();

        // The sensitive island matches exactly; the trailing symbol
        // still folds with the enclosing scope.
        assert_eq!(accepts(&nfa, "ifx"), Some(2));
        assert_eq!(accepts(&nfa, "ifX"), Some(2));
        assert_eq!(accepts(&nfa, "IFx"), None);
        assert_eq!(accepts(&nfa, "Ifx"), None);

        // The inheriting definition folds along with the scope.
        assert_eq!(accepts(&nfa, "IFY"), Some(3));
        assert_eq!(accepts(&nfa, "ify"), Some(3));
    }

    #[test]
    fn reports_malformed_patterns() {
        let mut nfa = Nfa::new();
        let store = ExpressionStore::default();
        let mut compiler = RegexCompiler::new(&mut nfa, &store);
        assert_eq!(
            compiler.add_regex("(ab", accept(2)),
            Err(RegexError::UnterminatedGroup)
        );
        assert_eq!(
            compiler.add_regex("a)", accept(2)),
            Err(RegexError::UnmatchedClose)
        );
        assert_eq!(
            compiler.add_regex("*a", accept(2)),
            Err(RegexError::DanglingQuantifier('*'))
        );
        assert_eq!(
            compiler.add_regex("[ab", accept(2)),
            Err(RegexError::UnterminatedClass)
        );
    }
}
