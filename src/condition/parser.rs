//! Recursive-descent parser from tokens to a type-checked `Expr`
//!
//! Precedence, loosest first: `||`, `&&`, equality, comparison, additive,
//! multiplicative, unary. Every node is type-checked as it is built, so an
//! ill-typed condition never leaves the compiler.

use crate::condition::ast::{Attribute, BinaryOp, Builtin, Expr, Ty, UnaryOp, Variable};
use crate::condition::lexer::{tokenize, Token, TokenKind};
use crate::condition::value::Value;
use crate::condition::CompileError;

/// Deepest nesting of parentheses, calls and prefix operators
pub const MAX_NESTING: usize = 64;

/// Parse and type-check a full expression
pub fn parse(source: &str) -> Result<Expr, CompileError> {
    let tokens = tokenize(source)?;
    let mut parser = ExprParser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let expr = parser.or_expr()?;
    let trailing = parser.peek();
    if trailing.kind != TokenKind::Eof {
        return Err(parser.syntax_error(&trailing, "expected end of expression"));
    }
    Ok(expr)
}

struct ExprParser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl ExprParser {
    fn peek(&self) -> Token {
        // tokenize always ends the stream with Eof
        self.tokens[self.pos.min(self.tokens.len() - 1)].clone()
    }

    fn advance(&mut self) -> Token {
        let token = self.peek();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if &self.peek().kind == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token, CompileError> {
        let token = self.peek();
        if token.kind == kind {
            Ok(self.advance())
        } else {
            Err(self.syntax_error(&token, &format!("expected '{}'", kind)))
        }
    }

    fn syntax_error(&self, token: &Token, message: &str) -> CompileError {
        CompileError::Syntax {
            token: token.kind.to_string(),
            position: token.position,
            message: message.to_string(),
        }
    }

    fn or_expr(&mut self) -> Result<Expr, CompileError> {
        let mut lhs = self.and_expr()?;
        loop {
            let token = self.peek();
            if token.kind != TokenKind::Or {
                return Ok(lhs);
            }
            self.advance();
            let rhs = self.and_expr()?;
            lhs = binary(BinaryOp::Or, lhs, rhs, token.position)?;
        }
    }

    fn and_expr(&mut self) -> Result<Expr, CompileError> {
        let mut lhs = self.equality()?;
        loop {
            let token = self.peek();
            if token.kind != TokenKind::And {
                return Ok(lhs);
            }
            self.advance();
            let rhs = self.equality()?;
            lhs = binary(BinaryOp::And, lhs, rhs, token.position)?;
        }
    }

    fn equality(&mut self) -> Result<Expr, CompileError> {
        let mut lhs = self.comparison()?;
        loop {
            let token = self.peek();
            let op = match token.kind {
                TokenKind::Eq => BinaryOp::Eq,
                TokenKind::Ne => BinaryOp::Ne,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.comparison()?;
            lhs = binary(op, lhs, rhs, token.position)?;
        }
    }

    fn comparison(&mut self) -> Result<Expr, CompileError> {
        let mut lhs = self.additive()?;
        loop {
            let token = self.peek();
            let op = match token.kind {
                TokenKind::Lt => BinaryOp::Lt,
                TokenKind::Le => BinaryOp::Le,
                TokenKind::Gt => BinaryOp::Gt,
                TokenKind::Ge => BinaryOp::Ge,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.additive()?;
            lhs = binary(op, lhs, rhs, token.position)?;
        }
    }

    fn additive(&mut self) -> Result<Expr, CompileError> {
        let mut lhs = self.multiplicative()?;
        loop {
            let token = self.peek();
            let op = match token.kind {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.multiplicative()?;
            lhs = binary(op, lhs, rhs, token.position)?;
        }
    }

    fn multiplicative(&mut self) -> Result<Expr, CompileError> {
        let mut lhs = self.unary()?;
        loop {
            let token = self.peek();
            let op = match token.kind {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Rem,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.unary()?;
            lhs = binary(op, lhs, rhs, token.position)?;
        }
    }

    /// Every nested sub-expression passes through here
    fn unary(&mut self) -> Result<Expr, CompileError> {
        if self.depth >= MAX_NESTING {
            return Err(self.syntax_error(&self.peek(), "expression nested too deeply"));
        }
        self.depth += 1;
        let result = self.prefixed();
        self.depth -= 1;
        result
    }

    fn prefixed(&mut self) -> Result<Expr, CompileError> {
        let token = self.peek();
        match token.kind {
            TokenKind::Not => {
                self.advance();
                let operand = self.unary()?;
                expect_type(&operand, Ty::Bool, token.position, "operand of '!'")?;
                Ok(Expr::Unary(UnaryOp::Not, Box::new(operand)))
            }
            TokenKind::Minus => {
                self.advance();
                let operand = self.unary()?;
                expect_type(&operand, Ty::Int, token.position, "operand of '-'")?;
                match operand {
                    Expr::Literal(Value::Int(n)) => Ok(Expr::Literal(Value::Int(-n))),
                    other => Ok(Expr::Unary(UnaryOp::Neg, Box::new(other))),
                }
            }
            _ => self.primary(),
        }
    }

    fn primary(&mut self) -> Result<Expr, CompileError> {
        let token = self.advance();
        match token.kind {
            TokenKind::Int(n) => Ok(Expr::Literal(Value::Int(n))),
            TokenKind::Str(s) => Ok(Expr::Literal(Value::Str(s))),
            TokenKind::True => Ok(Expr::Literal(Value::Bool(true))),
            TokenKind::False => Ok(Expr::Literal(Value::Bool(false))),
            TokenKind::LParen => {
                let inner = self.or_expr()?;
                self.expect(TokenKind::RParen)?;
                Ok(inner)
            }
            TokenKind::Ident(ref name) if name == "entity" => self.attribute(),
            TokenKind::Ident(ref name) if self.peek().kind == TokenKind::LParen => {
                let name = name.clone();
                self.call(&name, token.position)
            }
            TokenKind::Ident(ref name) => match Variable::from_name(name) {
                Some(var) => Ok(Expr::Variable(var)),
                None => Err(CompileError::Semantic {
                    position: token.position,
                    message: format!("unknown identifier '{}'", name),
                }),
            },
            _ => Err(self.syntax_error(&token, "expected an expression")),
        }
    }

    fn attribute(&mut self) -> Result<Expr, CompileError> {
        self.expect(TokenKind::Dot)?;
        let token = self.advance();
        let name = match &token.kind {
            TokenKind::Ident(name) => name.clone(),
            _ => return Err(self.syntax_error(&token, "expected an attribute name")),
        };
        let attr = match name.as_str() {
            "id" => Attribute::Id,
            "type" => Attribute::Type,
            "x" => Attribute::X,
            "y" => Attribute::Y,
            "properties" => {
                self.expect(TokenKind::Dot)?;
                let prop = self.advance();
                match prop.kind {
                    TokenKind::Ident(p) => Attribute::Property(p),
                    _ => return Err(self.syntax_error(&prop, "expected a property name")),
                }
            }
            other => {
                return Err(CompileError::Semantic {
                    position: token.position,
                    message: format!("unknown entity attribute '{}'", other),
                })
            }
        };
        Ok(Expr::Attribute(attr))
    }

    fn call(&mut self, name: &str, position: usize) -> Result<Expr, CompileError> {
        self.expect(TokenKind::LParen)?;
        let mut args = Vec::new();
        if !self.eat(&TokenKind::RParen) {
            loop {
                args.push(self.or_expr()?);
                if self.eat(&TokenKind::Comma) {
                    continue;
                }
                self.expect(TokenKind::RParen)?;
                break;
            }
        }
        builtin(name, args, position).map(Expr::Builtin)
    }
}

fn binary(op: BinaryOp, lhs: Expr, rhs: Expr, position: usize) -> Result<Expr, CompileError> {
    let context = format!("operands of '{}'", op.symbol());
    match op {
        BinaryOp::And | BinaryOp::Or => {
            expect_type(&lhs, Ty::Bool, position, &context)?;
            expect_type(&rhs, Ty::Bool, position, &context)?;
        }
        BinaryOp::Eq | BinaryOp::Ne => {
            if !lhs.ty().fits(rhs.ty()) {
                return Err(CompileError::Semantic {
                    position,
                    message: format!("cannot compare {} with {}", lhs.ty(), rhs.ty()),
                });
            }
        }
        _ => {
            expect_type(&lhs, Ty::Int, position, &context)?;
            expect_type(&rhs, Ty::Int, position, &context)?;
        }
    }
    Ok(Expr::Binary(op, Box::new(lhs), Box::new(rhs)))
}

fn expect_type(expr: &Expr, expected: Ty, position: usize, context: &str) -> Result<(), CompileError> {
    let found = expr.ty();
    if found.fits(expected) {
        Ok(())
    } else {
        Err(CompileError::Semantic {
            position,
            message: format!("{} must be {}, found {}", context, expected, found),
        })
    }
}

fn builtin(name: &str, args: Vec<Expr>, position: usize) -> Result<Builtin, CompileError> {
    let arity = match name {
        "has_support_below" => 0,
        "adjacent_to" | "has_property" | "is_type" | "count_entities_on_goals"
        | "count_entities" => 1,
        "distance_to" | "count_nearby" | "can_move_to" | "cell_at" | "can_see" => 2,
        "entity_at" => 3,
        _ => {
            return Err(CompileError::Semantic {
                position,
                message: format!("unknown built-in '{}'", name),
            })
        }
    };
    if args.len() != arity {
        return Err(CompileError::Semantic {
            position,
            message: format!("{} takes {} argument(s), got {}", name, arity, args.len()),
        });
    }

    let mut args = args.into_iter();
    let mut next = || args.next().unwrap_or(Expr::Literal(Value::Null));
    let literal = |expr: Expr| match expr {
        Expr::Literal(Value::Str(s)) => Ok(s),
        _ => Err(CompileError::Semantic {
            position,
            message: format!("{} expects a string literal as its first argument", name),
        }),
    };
    let int = |expr: Expr| -> Result<Box<Expr>, CompileError> {
        expect_type(&expr, Ty::Int, position, &format!("argument of {}", name))?;
        Ok(Box::new(expr))
    };

    Ok(match name {
        "adjacent_to" => Builtin::AdjacentTo(literal(next())?),
        "has_property" => Builtin::HasProperty(literal(next())?),
        "is_type" => Builtin::IsType(literal(next())?),
        "count_entities_on_goals" => Builtin::CountEntitiesOnGoals(literal(next())?),
        "count_entities" => Builtin::CountEntities(literal(next())?),
        "distance_to" => Builtin::DistanceTo(literal(next())?, int(next())?),
        "count_nearby" => Builtin::CountNearby(literal(next())?, int(next())?),
        "can_see" => Builtin::CanSee(literal(next())?, int(next())?),
        "can_move_to" => Builtin::CanMoveTo(int(next())?, int(next())?),
        "cell_at" => Builtin::CellAt(int(next())?, int(next())?),
        "entity_at" => Builtin::EntityAt(literal(next())?, int(next())?, int(next())?),
        _ => Builtin::HasSupportBelow,
    })
}
