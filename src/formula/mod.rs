//! Custom index formulas
//!
//! A closed arithmetic grammar (numbers, parameter symbols, `+ - * /`, unary
//! minus, parentheses and a finite `sum(expr over [..])`). Formulas are parsed
//! into an immutable tree, resolved against the registry and a standard, and
//! interpreted by the calculator. Nothing here executes user text.

pub mod ast;
pub mod lexer;
pub mod parser;
pub mod resolve;
pub mod serializer;

pub use ast::{BinaryOp, Binding, Expr, SumRange};
pub use parser::{parse_formula, MAX_DEPTH, MAX_FORMULA_LEN};
pub use resolve::{resolve, ResolveContext};
pub use serializer::serialize_formula;

pub const KW_SUM: &str = "sum";
pub const KW_OVER: &str = "over";
pub const KW_PARAMS: &str = "params";

/// Words that cannot be used as parameter symbols
pub fn is_reserved_word(word: &str) -> bool {
    matches!(word, KW_SUM | KW_OVER | KW_PARAMS) || Binding::from_symbol(word).is_some()
}
