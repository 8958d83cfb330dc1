use rhai::packages::{
    ArithmeticPackage, BasicArrayPackage, BasicIteratorPackage, BasicMapPackage,
    BasicMathPackage, BasicStringPackage, LanguageCorePackage, LogicPackage, MoreStringPackage,
    Package,
};
use rhai::Engine;

/// Host capabilities that exist in general-purpose script runtimes and are
/// refused here with `SANDBOX_NOT_PERMITTED`.
pub const DENIED_FUNCTIONS: &[&str] = &[
    "read_file",
    "write_file",
    "open",
    "exec",
    "system",
    "spawn",
    "getenv",
    "exit",
    "require",
    "load",
    "reflect",
];

/// Keywords removed from the grammar; scripts using them fail to compile.
pub const DISABLED_SYMBOLS: &[&str] = &["eval", "import", "print", "debug"];

/// Extra weight charged on top of rhai's per-operation count.
pub const CALL_WEIGHT: u64 = 50;
pub const BULK_WEIGHT: u64 = 10;

/// Words that cannot be bound as script variables. Story variables with
/// these names stay reachable through `get_var`.
const RESERVED_WORDS: &[&str] = &[
    "true", "false", "let", "const", "if", "else", "switch", "do", "while", "until", "loop",
    "for", "in", "break", "continue", "return", "throw", "try", "catch", "fn", "private",
    "import", "export", "as", "global", "this", "is_def_var", "is_def_fn", "is_shared", "Fn",
    "call", "curry", "type_of", "print", "debug", "eval", "var", "static", "shared", "with",
    "goto", "exit", "match", "case", "public", "protected", "new", "use", "module", "package",
    "super", "spawn", "thread", "go", "sync", "async", "await", "yield", "default", "void",
    "null", "nil",
];

pub fn is_bindable_name(name: &str) -> bool {
    ql_loader::is_identifier(name) && !RESERVED_WORDS.contains(&name)
}

/// The fixed allow-list. Only these packages are loaded into a raw engine,
/// so nothing outside the table is reachable from scripts.
pub(crate) fn install_allowed_packages(engine: &mut Engine) {
    LanguageCorePackage::new().register_into_engine(engine);
    ArithmeticPackage::new().register_into_engine(engine);
    LogicPackage::new().register_into_engine(engine);
    BasicStringPackage::new().register_into_engine(engine);
    MoreStringPackage::new().register_into_engine(engine);
    BasicIteratorPackage::new().register_into_engine(engine);
    BasicArrayPackage::new().register_into_engine(engine);
    BasicMapPackage::new().register_into_engine(engine);
    BasicMathPackage::new().register_into_engine(engine);
}

pub(crate) fn disable_symbols(engine: &mut Engine) {
    for symbol in DISABLED_SYMBOLS {
        engine.disable_symbol(*symbol);
    }
}

#[cfg(test)]
mod capabilities_tests {
    use super::*;

    #[test]
    fn reserved_words_are_not_bindable() {
        assert!(is_bindable_name("gold"));
        assert!(is_bindable_name("_scratch"));
        assert!(!is_bindable_name("loop"));
        assert!(!is_bindable_name("my-var"));
        assert!(!is_bindable_name("__alt:p:1"));
    }

    #[test]
    fn deny_list_and_disabled_symbols_do_not_overlap() {
        for name in DENIED_FUNCTIONS {
            assert!(!DISABLED_SYMBOLS.contains(name));
        }
    }
}
