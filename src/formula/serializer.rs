use std::fmt;

use crate::formula::ast::{Expr, SumRange};
use crate::formula::{KW_OVER, KW_PARAMS, KW_SUM};

const NEG_PRECEDENCE: u8 = 3;
const ATOM_PRECEDENCE: u8 = 4;

/// Render an expression tree as canonical formula text.
///
/// Only the parentheses needed to preserve the tree shape are emitted, so
/// re-parsing the output yields an identical tree.
pub fn serialize_formula(expr: &Expr) -> String {
    let mut out = String::new();
    write_expr(expr, &mut out);
    out
}

fn precedence(expr: &Expr) -> u8 {
    match expr {
        Expr::Binary { op, .. } => op.precedence(),
        Expr::Neg(_) => NEG_PRECEDENCE,
        Expr::Number(n) if n.is_sign_negative() => NEG_PRECEDENCE,
        _ => ATOM_PRECEDENCE,
    }
}

fn write_wrapped(expr: &Expr, parenthesize: bool, out: &mut String) {
    if parenthesize {
        out.push('(');
        write_expr(expr, out);
        out.push(')');
    } else {
        write_expr(expr, out);
    }
}

/// Shortest of the plain and exponent forms; both parse back to the same value
fn format_number(n: f64) -> String {
    let plain = n.to_string();
    let scientific = format!("{:e}", n);
    if scientific.len() < plain.len() {
        scientific
    } else {
        plain
    }
}

fn write_expr(expr: &Expr, out: &mut String) {
    match expr {
        Expr::Number(n) if n.is_sign_negative() => {
            out.push('-');
            out.push_str(&format_number(n.abs()));
        }
        Expr::Number(n) => out.push_str(&format_number(*n)),
        Expr::Parameter(name) => out.push_str(name),
        Expr::Bound(binding) => out.push_str(binding.symbol()),
        Expr::Neg(inner) => {
            out.push('-');
            write_wrapped(inner, precedence(inner) < NEG_PRECEDENCE, out);
        }
        Expr::Binary { op, lhs, rhs } => {
            let p = op.precedence();
            write_wrapped(lhs, precedence(lhs) < p, out);
            out.push(' ');
            out.push(op.symbol());
            out.push(' ');
            // Same-precedence right operands keep their grouping
            write_wrapped(rhs, precedence(rhs) <= p, out);
        }
        Expr::Sum { body, range } => {
            out.push_str(KW_SUM);
            out.push('(');
            write_expr(body, out);
            out.push(' ');
            out.push_str(KW_OVER);
            out.push(' ');
            match range {
                SumRange::List(names) => {
                    out.push('[');
                    out.push_str(&names.join(", "));
                    out.push(']');
                }
                SumRange::Definition => out.push_str(KW_PARAMS),
            }
            out.push(')');
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&serialize_formula(self))
    }
}
