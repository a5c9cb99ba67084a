//! The expression language behind `if` conditions and `set` assignments.
//!
//! Expressions are tokenized by [`crate::lexer`], parsed by a small
//! recursive-descent parser into an [`Expr`] tree, and evaluated against a
//! [`Lookup`]. Nothing is ever executed beyond this grammar:
//!
//! ```text
//! or         = and ( ("||" | "or") and )*
//! and        = equality ( ("&&" | "and") equality )*
//! equality   = comparison ( ("==" | "!=") comparison )*
//! comparison = additive ( ("<" | "<=" | ">" | ">=") additive )*
//! additive   = term ( ("+" | "-") term )*
//! term       = unary ( ("*" | "/" | "%") unary )*
//! unary      = ("!" | "not" | "-") unary | primary
//! primary    = NUMBER | STRING | true | false | null | PATH | "(" or ")"
//! ```

use std::cmp::Ordering;
use std::fmt;
use std::iter::Peekable;
use std::vec::IntoIter;

use float_cmp::approx_eq;
use thiserror::Error;

use crate::Value;
use crate::lexer::tokenize;
use crate::path;
use crate::scope::Lookup;
use crate::tokens::Token;
use crate::value::format_number;
use crate::value::numeric_literal;

/// Bare identifiers at least this long are not treated as undefined
/// references by condition evaluation.
const MAX_GUARDED_IDENTIFIER_LEN: usize = 30;

/// Parentheses and unary operators nested deeper than this are rejected.
pub const MAX_NESTING: usize = 64;

/// Expressions with more tokens than this are rejected before parsing.
pub const MAX_TOKENS: usize = 512;

#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum ExpressionError {
	#[error("unexpected `{text}` at offset {offset}")]
	UnexpectedCharacter { text: String, offset: usize },
	#[error("invalid string literal at offset {offset}")]
	InvalidString { offset: usize },
	#[error("unexpected end of expression")]
	UnexpectedEnd,
	#[error("unexpected token `{0}`")]
	UnexpectedToken(String),
	#[error("empty expression")]
	Empty,
	#[error("undefined variable `{0}`")]
	UndefinedVariable(String),
	#[error("division by zero")]
	DivisionByZero,
	#[error("cannot apply `{op}` to `{left}` and `{right}`")]
	InvalidOperands {
		op: BinaryOp,
		left: String,
		right: String,
	},
	#[error("cannot negate `{0}`")]
	InvalidNegation(String),
	#[error("expression nests deeper than {limit} levels")]
	TooDeep { limit: usize },
	#[error("expression has more than {limit} tokens")]
	TooLong { limit: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
	Neg,
	Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
	Add,
	Sub,
	Mul,
	Div,
	Rem,
	Eq,
	NotEq,
	Lt,
	LtEq,
	Gt,
	GtEq,
	And,
	Or,
}

impl fmt::Display for BinaryOp {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let symbol = match self {
			Self::Add => "+",
			Self::Sub => "-",
			Self::Mul => "*",
			Self::Div => "/",
			Self::Rem => "%",
			Self::Eq => "==",
			Self::NotEq => "!=",
			Self::Lt => "<",
			Self::LtEq => "<=",
			Self::Gt => ">",
			Self::GtEq => ">=",
			Self::And => "&&",
			Self::Or => "||",
		};
		write!(f, "{symbol}")
	}
}

/// A parsed expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
	Literal(Value),
	/// A name or dotted path resolved at evaluation time.
	Variable(String),
	Unary {
		op: UnaryOp,
		operand: Box<Expr>,
	},
	Binary {
		op: BinaryOp,
		left: Box<Expr>,
		right: Box<Expr>,
	},
}

/// Parse an expression into its tree.
pub fn parse(source: &str) -> Result<Expr, ExpressionError> {
	let tokens = tokenize(source)?;
	if tokens.is_empty() {
		return Err(ExpressionError::Empty);
	}
	if tokens.len() > MAX_TOKENS {
		return Err(ExpressionError::TooLong { limit: MAX_TOKENS });
	}

	let mut parser = Parser {
		tokens: tokens.into_iter().peekable(),
		depth: 0,
	};
	let expr = parser.parse_or()?;

	match parser.tokens.next() {
		Some(token) => Err(ExpressionError::UnexpectedToken(token.to_string())),
		None => Ok(expr),
	}
}

/// Evaluate an `if` condition.
///
/// Two shortcuts run before parsing: an expression that is exactly one known
/// name is true when that value is non-empty, and a lone bare word that is
/// not a known name is simply false.
pub fn evaluate_condition<L>(source: &str, lookup: &L) -> Result<bool, ExpressionError>
where
	L: Lookup + ?Sized,
{
	let source = source.trim();

	if let Some(value) = lookup.get(source) {
		return Ok(value.is_truthy());
	}

	if is_guarded_identifier(source) {
		tracing::trace!(name = source, "undefined name in condition evaluates to false");
		return Ok(false);
	}

	let expr = parse(source)?;
	Ok(evaluate(&expr, lookup)?.is_truthy())
}

/// Evaluate the right-hand side of a `set` assignment.
pub fn evaluate_assignment<L>(source: &str, lookup: &L) -> Result<Value, ExpressionError>
where
	L: Lookup + ?Sized,
{
	let expr = parse(source.trim())?;
	evaluate(&expr, lookup)
}

/// Evaluate a parsed expression.
pub fn evaluate<L>(expr: &Expr, lookup: &L) -> Result<Value, ExpressionError>
where
	L: Lookup + ?Sized,
{
	match expr {
		Expr::Literal(value) => Ok(value.clone()),
		Expr::Variable(name) => {
			let value = path::resolve(name, lookup)
				.ok_or_else(|| ExpressionError::UndefinedVariable(name.clone()))?;
			Ok(coerce_numeric(value))
		}
		Expr::Unary { op, operand } => {
			let value = evaluate(operand, lookup)?;
			match op {
				UnaryOp::Not => Ok(Value::Bool(!value.is_truthy())),
				UnaryOp::Neg => {
					value
						.as_number()
						.map(|n| Value::Number(-n))
						.ok_or_else(|| ExpressionError::InvalidNegation(value.to_string()))
				}
			}
		}
		Expr::Binary { op, left, right } => {
			match op {
				BinaryOp::And => {
					let left = evaluate(left, lookup)?;
					if !left.is_truthy() {
						return Ok(Value::Bool(false));
					}
					Ok(Value::Bool(evaluate(right, lookup)?.is_truthy()))
				}
				BinaryOp::Or => {
					let left = evaluate(left, lookup)?;
					if left.is_truthy() {
						return Ok(Value::Bool(true));
					}
					Ok(Value::Bool(evaluate(right, lookup)?.is_truthy()))
				}
				_ => {
					let left = evaluate(left, lookup)?;
					let right = evaluate(right, lookup)?;
					apply_binary(*op, &left, &right)
				}
			}
		}
	}
}

/// Strings that read as numbers take part in arithmetic as numbers. Strings
/// with a leading zero such as `"0123"` stay strings.
fn coerce_numeric(value: &Value) -> Value {
	match value {
		Value::String(s) => numeric_literal(s).map_or_else(|| value.clone(), Value::Number),
		_ => value.clone(),
	}
}

fn is_guarded_identifier(source: &str) -> bool {
	source.len() < MAX_GUARDED_IDENTIFIER_LEN
		&& !source.is_empty()
		&& source.chars().all(|c| c.is_alphanumeric() || c == '_')
		&& !matches!(
			source.to_ascii_lowercase().as_str(),
			"true" | "false" | "null"
		)
		&& !source.starts_with(|c: char| c.is_ascii_digit())
}

fn apply_binary(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, ExpressionError> {
	let invalid = || {
		ExpressionError::InvalidOperands {
			op,
			left: left.to_string(),
			right: right.to_string(),
		}
	};

	match op {
		BinaryOp::Add => {
			if matches!(left, Value::String(_)) || matches!(right, Value::String(_)) {
				return Ok(Value::String(format!("{left}{right}")));
			}
			let (a, b) = numbers(left, right).ok_or_else(invalid)?;
			Ok(Value::Number(a + b))
		}
		BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => {
			let (a, b) = numbers(left, right).ok_or_else(invalid)?;
			let result = match op {
				BinaryOp::Sub => a - b,
				BinaryOp::Mul => a * b,
				BinaryOp::Div if b == 0.0 => return Err(ExpressionError::DivisionByZero),
				BinaryOp::Div => a / b,
				BinaryOp::Rem if b == 0.0 => return Err(ExpressionError::DivisionByZero),
				_ => a % b,
			};
			Ok(Value::Number(result))
		}
		BinaryOp::Eq => Ok(Value::Bool(loose_eq(left, right))),
		BinaryOp::NotEq => Ok(Value::Bool(!loose_eq(left, right))),
		BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq => {
			let ordering = compare(left, right).ok_or_else(invalid)?;
			let result = match op {
				BinaryOp::Lt => ordering == Ordering::Less,
				BinaryOp::LtEq => ordering != Ordering::Greater,
				BinaryOp::Gt => ordering == Ordering::Greater,
				_ => ordering != Ordering::Less,
			};
			Ok(Value::Bool(result))
		}
		BinaryOp::And | BinaryOp::Or => unreachable!("logical operators short-circuit"),
	}
}

fn numbers(left: &Value, right: &Value) -> Option<(f64, f64)> {
	Some((left.as_number()?, right.as_number()?))
}

fn loose_eq(left: &Value, right: &Value) -> bool {
	match (left, right) {
		(Value::Number(a), Value::Number(b)) => approx_eq!(f64, *a, *b, ulps = 4),
		(Value::String(a), Value::String(b)) => a == b,
		(Value::Number(n), Value::String(s)) | (Value::String(s), Value::Number(n)) => {
			format_number(*n) == *s
		}
		(Value::Null, other) | (other, Value::Null) => other.is_empty(),
		(Value::Bool(b), other) | (other, Value::Bool(b)) => *b == other.is_truthy(),
		_ => left == right,
	}
}

fn compare(left: &Value, right: &Value) -> Option<Ordering> {
	match (left, right) {
		(Value::String(a), Value::String(b)) => Some(a.cmp(b)),
		(Value::List(_) | Value::Object(_), _) | (_, Value::List(_) | Value::Object(_)) => None,
		_ => {
			match numbers(left, right) {
				Some((a, b)) => a.partial_cmp(&b),
				None => Some(left.to_string().cmp(&right.to_string())),
			}
		}
	}
}

struct Parser {
	tokens: Peekable<IntoIter<Token>>,
	/// Current nesting of parentheses and unary operators.
	depth: usize,
}

impl Parser {
	fn nested(
		&mut self,
		parse: fn(&mut Self) -> Result<Expr, ExpressionError>,
	) -> Result<Expr, ExpressionError> {
		if self.depth >= MAX_NESTING {
			return Err(ExpressionError::TooDeep { limit: MAX_NESTING });
		}

		self.depth += 1;
		let expr = parse(self);
		self.depth -= 1;
		expr
	}

	fn next(&mut self) -> Result<Token, ExpressionError> {
		self.tokens.next().ok_or(ExpressionError::UnexpectedEnd)
	}

	fn eat(&mut self, expected: &Token) -> bool {
		if self.tokens.peek() == Some(expected) {
			self.tokens.next();
			true
		} else {
			false
		}
	}

	fn binary_level(
		&mut self,
		operators: &[(Token, BinaryOp)],
		next: fn(&mut Self) -> Result<Expr, ExpressionError>,
	) -> Result<Expr, ExpressionError> {
		let mut left = next(self)?;

		'outer: loop {
			for (token, op) in operators {
				if self.eat(token) {
					let right = next(self)?;
					left = Expr::Binary {
						op: *op,
						left: Box::new(left),
						right: Box::new(right),
					};
					continue 'outer;
				}
			}
			return Ok(left);
		}
	}

	fn parse_or(&mut self) -> Result<Expr, ExpressionError> {
		self.binary_level(&[(Token::Or, BinaryOp::Or)], Self::parse_and)
	}

	fn parse_and(&mut self) -> Result<Expr, ExpressionError> {
		self.binary_level(&[(Token::And, BinaryOp::And)], Self::parse_equality)
	}

	fn parse_equality(&mut self) -> Result<Expr, ExpressionError> {
		self.binary_level(
			&[(Token::Eq, BinaryOp::Eq), (Token::NotEq, BinaryOp::NotEq)],
			Self::parse_comparison,
		)
	}

	fn parse_comparison(&mut self) -> Result<Expr, ExpressionError> {
		self.binary_level(
			&[
				(Token::LtEq, BinaryOp::LtEq),
				(Token::GtEq, BinaryOp::GtEq),
				(Token::Lt, BinaryOp::Lt),
				(Token::Gt, BinaryOp::Gt),
			],
			Self::parse_additive,
		)
	}

	fn parse_additive(&mut self) -> Result<Expr, ExpressionError> {
		self.binary_level(
			&[(Token::Plus, BinaryOp::Add), (Token::Minus, BinaryOp::Sub)],
			Self::parse_term,
		)
	}

	fn parse_term(&mut self) -> Result<Expr, ExpressionError> {
		self.binary_level(
			&[
				(Token::Star, BinaryOp::Mul),
				(Token::Slash, BinaryOp::Div),
				(Token::Percent, BinaryOp::Rem),
			],
			Self::parse_unary,
		)
	}

	fn parse_unary(&mut self) -> Result<Expr, ExpressionError> {
		let op = if self.eat(&Token::Not) {
			UnaryOp::Not
		} else if self.eat(&Token::Minus) {
			UnaryOp::Neg
		} else {
			return self.parse_primary();
		};

		Ok(Expr::Unary {
			op,
			operand: Box::new(self.nested(Self::parse_unary)?),
		})
	}

	fn parse_primary(&mut self) -> Result<Expr, ExpressionError> {
		match self.next()? {
			Token::Number(n) => Ok(Expr::Literal(Value::Number(n))),
			Token::String(s, _) => Ok(Expr::Literal(Value::String(s))),
			Token::True => Ok(Expr::Literal(Value::Bool(true))),
			Token::False => Ok(Expr::Literal(Value::Bool(false))),
			Token::Null => Ok(Expr::Literal(Value::Null)),
			Token::Ident(name) => Ok(Expr::Variable(name)),
			Token::LParen => {
				let inner = self.nested(Self::parse_or)?;
				if self.eat(&Token::RParen) {
					Ok(inner)
				} else {
					match self.tokens.next() {
						Some(token) => Err(ExpressionError::UnexpectedToken(token.to_string())),
						None => Err(ExpressionError::UnexpectedEnd),
					}
				}
			}
			token => Err(ExpressionError::UnexpectedToken(token.to_string())),
		}
	}
}
