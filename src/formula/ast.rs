use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Binary arithmetic operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    pub fn symbol(&self) -> char {
        match self {
            BinaryOp::Add => '+',
            BinaryOp::Sub => '-',
            BinaryOp::Mul => '*',
            BinaryOp::Div => '/',
        }
    }

    pub fn precedence(&self) -> u8 {
        match self {
            BinaryOp::Add | BinaryOp::Sub => 1,
            BinaryOp::Mul | BinaryOp::Div => 2,
        }
    }
}

/// Per-parameter quantities available inside `sum(...)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Binding {
    /// `Mi`: measured concentration
    Measured,
    /// `Ii`: ideal value
    Ideal,
    /// `Si`: permissible limit
    Limit,
    /// `Wi`: weight
    Weight,
    /// `Qi`: quality rating
    Quality,
}

impl Binding {
    pub const ALL: [Binding; 5] = [
        Binding::Measured,
        Binding::Ideal,
        Binding::Limit,
        Binding::Weight,
        Binding::Quality,
    ];

    pub fn symbol(&self) -> &'static str {
        match self {
            Binding::Measured => "Mi",
            Binding::Ideal => "Ii",
            Binding::Limit => "Si",
            Binding::Weight => "Wi",
            Binding::Quality => "Qi",
        }
    }

    pub fn from_symbol(symbol: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|b| b.symbol() == symbol)
    }
}

/// Parameters a `sum(...)` iterates over
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SumRange {
    /// `[a, b, c]`
    List(Vec<String>),
    /// `params`: the owning definition's parameter list
    Definition,
}

/// Immutable expression tree of a custom formula
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Number(f64),
    /// Measured value of a named parameter
    Parameter(String),
    Bound(Binding),
    Neg(Box<Expr>),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Sum {
        body: Box<Expr>,
        range: SumRange,
    },
}

impl Expr {
    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    /// Parameter names referenced anywhere in the tree, including sum lists.
    /// `params` ranges contribute nothing here.
    pub fn parameter_names(&self) -> BTreeSet<&str> {
        let mut names = BTreeSet::new();
        self.collect_names(&mut names);
        names
    }

    fn collect_names<'a>(&'a self, names: &mut BTreeSet<&'a str>) {
        match self {
            Expr::Number(_) | Expr::Bound(_) => {}
            Expr::Parameter(name) => {
                names.insert(name.as_str());
            }
            Expr::Neg(inner) => inner.collect_names(names),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.collect_names(names);
                rhs.collect_names(names);
            }
            Expr::Sum { body, range } => {
                body.collect_names(names);
                if let SumRange::List(list) = range {
                    names.extend(list.iter().map(String::as_str));
                }
            }
        }
    }

    /// Whether `binding` appears anywhere in the tree
    pub fn uses_binding(&self, binding: Binding) -> bool {
        match self {
            Expr::Number(_) | Expr::Parameter(_) => false,
            Expr::Bound(b) => *b == binding,
            Expr::Neg(inner) => inner.uses_binding(binding),
            Expr::Binary { lhs, rhs, .. } => lhs.uses_binding(binding) || rhs.uses_binding(binding),
            Expr::Sum { body, .. } => body.uses_binding(binding),
        }
    }
}
