//! Compilation options, parsed from the host tool's key/value map.

use crate::ast::Pos;
use crate::diag::{Console, Diagnostic};

#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Skip the DFA state-compaction pass.
    pub disable_compact_dfa: bool,
    /// Skip the symbol-class merging pass.
    pub disable_merged_dfa: bool,
    /// Name of the language block to compile; inferred when the file holds
    /// exactly one language block.
    pub compile_language: Option<String>,
    /// Start nonterminals, one generated start state each.
    pub start_symbols: Vec<String>,

    // Passed through to the emitter.
    pub class_name: Option<String>,
    pub namespace_name: Option<String>,
    pub target_language: Option<String>,
    pub output_language: Option<String>,
}

impl Config {
    /// Builds a configuration from `(option, value)` pairs. `start-symbol`
    /// may repeat; unrecognised options produce an `info` diagnostic.
    pub fn from_options<'a, I>(options: I, console: &mut dyn Console) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut config = Self::default();
        for (key, value) in options {
            match key {
                "disable-compact-dfa" => config.disable_compact_dfa = true,
                "disable-merged-dfa" => config.disable_merged_dfa = true,
                "compile-language" => config.compile_language = Some(value.to_owned()),
                "start-symbol" => config.start_symbols.push(value.to_owned()),
                "class-name" => config.class_name = Some(value.to_owned()),
                "namespace-name" => config.namespace_name = Some(value.to_owned()),
                "target-language" => config.target_language = Some(value.to_owned()),
                "output-language" => config.output_language = Some(value.to_owned()),
                other => console.report(Diagnostic::info(
                    "UNKNOWN_OPTION",
                    "",
                    Pos::NONE,
                    format!("Unrecognised option: {}", other),
                )),
            }
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::ConsoleBuffer;

    #[test]
    fn recognises_known_options() {
        let mut console = ConsoleBuffer::new();
        let config = Config::from_options(
            [
                ("disable-compact-dfa", ""),
                ("compile-language", "Demo"),
                ("start-symbol", "Expr"),
                ("start-symbol", "Stmt"),
            ],
            &mut console,
        );
        assert!(config.disable_compact_dfa);
        assert!(!config.disable_merged_dfa);
        assert_eq!(config.compile_language.as_deref(), Some("Demo"));
        assert_eq!(config.start_symbols, ["Expr", "Stmt"]);
        assert!(console.diagnostics.is_empty());
    }

    #[test]
    fn flags_unknown_options() {
        let mut console = ConsoleBuffer::new();
        let _ = Config::from_options([("no-such-option", "x")], &mut console);
        assert!(console.has_code("UNKNOWN_OPTION"));
    }
}
