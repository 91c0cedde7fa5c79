use std::collections::HashSet;

use crate::error::ValidationError;
use crate::formula::ast::{BinaryOp, Binding, Expr, SumRange};
use crate::formula::lexer::{tokenize, Token, TokenKind};
use crate::formula::{KW_OVER, KW_PARAMS, KW_SUM};

/// Most non-blank bytes a formula may hold
pub const MAX_FORMULA_LEN: usize = 4096;

/// Cap on raw text including whitespace. Canonical spacing adds at most two
/// blanks per significant byte, so serialized formulas always fit.
const MAX_RAW_LEN: usize = MAX_FORMULA_LEN * 4;

/// Deepest nesting of parentheses / unary minus accepted
pub const MAX_DEPTH: usize = 64;

fn check_length(input: &str) -> Result<(), ValidationError> {
    if input.len() > MAX_RAW_LEN {
        return Err(ValidationError::Syntax {
            position: MAX_RAW_LEN,
            message: format!("formula text exceeds {} bytes", MAX_RAW_LEN),
        });
    }
    let overflow = input
        .bytes()
        .enumerate()
        .filter(|(_, b)| !b.is_ascii_whitespace())
        .nth(MAX_FORMULA_LEN);
    if let Some((position, _)) = overflow {
        return Err(ValidationError::Syntax {
            position,
            message: format!("formula exceeds {} non-blank bytes", MAX_FORMULA_LEN),
        });
    }
    Ok(())
}

/// Parse custom formula text into an expression tree.
///
/// ```text
/// expr    := term (('+' | '-') term)*
/// term    := unary (('*' | '/') unary)*
/// unary   := '-' unary | primary
/// primary := NUMBER | SYMBOL | '(' expr ')' | 'sum' '(' expr 'over' range ')'
/// range   := '[' SYMBOL (',' SYMBOL)* ']' | 'params'
/// ```
pub fn parse_formula(input: &str) -> Result<Expr, ValidationError> {
    check_length(input)?;

    let tokens = tokenize(input)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
        in_sum: false,
    };

    if parser.peek().kind == TokenKind::End {
        return Err(ValidationError::Syntax {
            position: 0,
            message: "formula is empty".to_string(),
        });
    }

    let expr = parser.expr()?;
    let trailing = parser.peek();
    if trailing.kind != TokenKind::End {
        return Err(syntax(trailing, "expected an operator"));
    }
    Ok(expr)
}

fn syntax(token: &Token, expected: &str) -> ValidationError {
    ValidationError::Syntax {
        position: token.position,
        message: format!("{}, found {}", expected, token.kind.describe()),
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
    in_sum: bool,
}

impl Parser {
    fn peek(&self) -> &Token {
        // tokenize() guarantees a trailing End token
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, kind: TokenKind, expected: &str) -> Result<Token, ValidationError> {
        if self.peek().kind == kind {
            Ok(self.advance())
        } else {
            Err(syntax(self.peek(), expected))
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<(), ValidationError> {
        match &self.peek().kind {
            TokenKind::Ident(name) if name == keyword => {
                self.advance();
                Ok(())
            }
            _ => Err(syntax(self.peek(), &format!("expected '{}'", keyword))),
        }
    }

    fn expr(&mut self) -> Result<Expr, ValidationError> {
        let mut lhs = self.term()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.term()?;
            lhs = Expr::binary(op, lhs, rhs);
        }
    }

    fn term(&mut self) -> Result<Expr, ValidationError> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.unary()?;
            lhs = Expr::binary(op, lhs, rhs);
        }
    }

    fn unary(&mut self) -> Result<Expr, ValidationError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ValidationError::Syntax {
                position: self.peek().position,
                message: format!("formula nests deeper than {} levels", MAX_DEPTH),
            });
        }

        let result = if self.peek().kind == TokenKind::Minus {
            self.advance();
            self.unary().map(|inner| Expr::Neg(Box::new(inner)))
        } else {
            self.primary()
        };

        self.depth -= 1;
        result
    }

    fn primary(&mut self) -> Result<Expr, ValidationError> {
        let token = self.advance();
        match token.kind {
            TokenKind::Number(value) => Ok(Expr::Number(value)),
            TokenKind::LParen => {
                let inner = self.expr()?;
                self.expect(TokenKind::RParen, "expected ')'")?;
                Ok(inner)
            }
            TokenKind::Ident(ref name) if name == KW_SUM => self.sum(&token),
            TokenKind::Ident(ref name) if name == KW_OVER || name == KW_PARAMS => {
                Err(syntax(&token, "expected a value"))
            }
            TokenKind::Ident(name) => Ok(match Binding::from_symbol(&name) {
                Some(binding) => Expr::Bound(binding),
                None => Expr::Parameter(name),
            }),
            _ => Err(syntax(
                &token,
                "expected a number, parameter, '(' or 'sum'",
            )),
        }
    }

    fn sum(&mut self, keyword: &Token) -> Result<Expr, ValidationError> {
        if self.in_sum {
            return Err(ValidationError::Syntax {
                position: keyword.position,
                message: "sum(...) cannot be nested".to_string(),
            });
        }

        self.expect(TokenKind::LParen, "expected '(' after 'sum'")?;
        self.in_sum = true;
        let body = self.expr();
        self.in_sum = false;
        let body = body?;

        self.expect_keyword(KW_OVER)?;
        let range = self.range()?;
        self.expect(TokenKind::RParen, "expected ')' to close sum")?;

        Ok(Expr::Sum {
            body: Box::new(body),
            range,
        })
    }

    fn range(&mut self) -> Result<SumRange, ValidationError> {
        if matches!(&self.peek().kind, TokenKind::Ident(name) if name == KW_PARAMS) {
            self.advance();
            return Ok(SumRange::Definition);
        }

        self.expect(TokenKind::LBracket, "expected '[' or 'params'")?;
        let mut names = Vec::new();
        let mut seen = HashSet::new();
        loop {
            let token = self.advance();
            match token.kind {
                TokenKind::Ident(ref name)
                    if !crate::formula::is_reserved_word(name) =>
                {
                    if !seen.insert(name.clone()) {
                        return Err(ValidationError::Syntax {
                            position: token.position,
                            message: format!("parameter '{}' listed twice", name),
                        });
                    }
                    names.push(name.clone());
                }
                _ => return Err(syntax(&token, "expected a parameter name")),
            }

            match self.peek().kind {
                TokenKind::Comma => {
                    self.advance();
                }
                TokenKind::RBracket => {
                    self.advance();
                    return Ok(SumRange::List(names));
                }
                _ => return Err(syntax(self.peek(), "expected ',' or ']'")),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn param(name: &str) -> Expr {
        Expr::Parameter(name.to_string())
    }

    #[test]
    fn test_precedence() {
        let expr = parse_formula("a + b * c").unwrap();
        assert_eq!(
            expr,
            Expr::binary(
                BinaryOp::Add,
                param("a"),
                Expr::binary(BinaryOp::Mul, param("b"), param("c"))
            )
        );
    }

    #[test]
    fn test_left_associativity() {
        let expr = parse_formula("a - b - c").unwrap();
        assert_eq!(
            expr,
            Expr::binary(
                BinaryOp::Sub,
                Expr::binary(BinaryOp::Sub, param("a"), param("b")),
                param("c")
            )
        );
    }

    #[test]
    fn test_unary_minus_binds_tightest() {
        let expr = parse_formula("-a * b").unwrap();
        assert_eq!(
            expr,
            Expr::binary(BinaryOp::Mul, Expr::Neg(Box::new(param("a"))), param("b"))
        );
    }

    #[test]
    fn test_parse_sum() {
        let expr = parse_formula("sum((Mi-Ii)/(Si-Ii)*100 over [pH])").unwrap();
        match expr {
            Expr::Sum { body, range } => {
                assert_eq!(range, SumRange::List(vec!["pH".to_string()]));
                assert!(body.uses_binding(Binding::Measured));
                assert!(body.uses_binding(Binding::Limit));
            }
            other => panic!("expected sum, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_sum_over_params() {
        let expr = parse_formula("sum(Wi * Qi over params) / sum(Wi over params)").unwrap();
        assert!(matches!(expr, Expr::Binary { op: BinaryOp::Div, .. }));
    }

    #[test]
    fn test_empty_formula() {
        assert!(matches!(
            parse_formula("   "),
            Err(ValidationError::Syntax { position: 0, .. })
        ));
    }

    #[test]
    fn test_syntax_error_position() {
        match parse_formula("pH + * 2") {
            Err(ValidationError::Syntax { position, .. }) => assert_eq!(position, 5),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_unclosed_paren() {
        match parse_formula("(pH + 2") {
            Err(ValidationError::Syntax { position, message }) => {
                assert_eq!(position, 7);
                assert!(message.contains("')'"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_trailing_tokens() {
        assert!(parse_formula("pH 7").is_err());
    }

    #[test]
    fn test_nested_sum_rejected() {
        let err = parse_formula("sum(sum(Mi over [a]) over [b])").unwrap_err();
        assert_eq!(
            err,
            ValidationError::Syntax {
                position: 4,
                message: "sum(...) cannot be nested".to_string()
            }
        );
    }

    #[test]
    fn test_duplicate_range_entry() {
        assert!(parse_formula("sum(Mi over [lead, lead])").is_err());
    }

    #[test]
    fn test_empty_range() {
        assert!(parse_formula("sum(Mi over [])").is_err());
    }

    #[test]
    fn test_missing_over() {
        assert!(parse_formula("sum(Mi [lead])").is_err());
    }

    #[test]
    fn test_depth_limit() {
        let deep = format!("{}1{}", "(".repeat(MAX_DEPTH + 1), ")".repeat(MAX_DEPTH + 1));
        assert!(parse_formula(&deep).is_err());

        let shallow = format!("{}1{}", "(".repeat(10), ")".repeat(10));
        assert_eq!(parse_formula(&shallow).unwrap(), Expr::Number(1.0));
    }

    #[test]
    fn test_length_limit() {
        let long = "1+".repeat(MAX_FORMULA_LEN);
        assert!(parse_formula(&long).is_err());

        // Blanks do not count against the limit
        let spaced = format!("1{}", " + 1".repeat(MAX_FORMULA_LEN / 2 - 1));
        assert!(spaced.len() > MAX_FORMULA_LEN);
        assert!(parse_formula(&spaced).is_ok());

        let padded = format!("1{}", " ".repeat(MAX_FORMULA_LEN * 4));
        assert!(parse_formula(&padded).is_err());
    }

    #[test]
    fn test_keywords_not_values() {
        assert!(parse_formula("over + 1").is_err());
        assert!(parse_formula("params").is_err());
    }
}
