use std::fmt::Display;

use float_cmp::approx_eq;

/// Tokens of the expression language used by `if` conditions and `set`
/// assignments.
#[derive(Debug, Clone)]
pub enum Token {
	/// A numeric literal, e.g. `12.5`
	Number(f64),
	/// A quoted string literal with escapes processed, e.g. `"net"`
	String(String, u8),
	/// A name or dotted path, e.g. `total` or `invoice.customer.name`
	Ident(String),
	/// `true`
	True,
	/// `false`
	False,
	/// `null`
	Null,
	/// `+`
	Plus,
	/// `-`
	Minus,
	/// `*`
	Star,
	/// `/`
	Slash,
	/// `%`
	Percent,
	/// `==`
	Eq,
	/// `!=`
	NotEq,
	/// `<`
	Lt,
	/// `<=`
	LtEq,
	/// `>`
	Gt,
	/// `>=`
	GtEq,
	/// `&&` | `and`
	And,
	/// `||` | `or`
	Or,
	/// `!` | `not`
	Not,
	/// `(`
	LParen,
	/// `)`
	RParen,
}

impl Eq for Token {}
impl PartialEq for Token {
	fn eq(&self, other: &Self) -> bool {
		match (self, other) {
			(Token::Number(value), Token::Number(other_value)) => {
				approx_eq!(f64, *value, *other_value, ulps = 2)
			}
			(Token::String(value, delimiter), Token::String(other_value, other_delimiter)) => {
				value == other_value && delimiter == other_delimiter
			}
			(Token::Ident(value), Token::Ident(other_value)) => value == other_value,
			_ => std::mem::discriminant(self) == std::mem::discriminant(other),
		}
	}
}

impl Display for Token {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Token::Number(number) => write!(f, "{number}"),
			Token::String(string, ch) => {
				let ch = *ch as char;
				write!(f, "{ch}{string}{ch}")
			}
			Token::Ident(ident) => write!(f, "{ident}"),
			Token::True => write!(f, "true"),
			Token::False => write!(f, "false"),
			Token::Null => write!(f, "null"),
			Token::Plus => write!(f, "+"),
			Token::Minus => write!(f, "-"),
			Token::Star => write!(f, "*"),
			Token::Slash => write!(f, "/"),
			Token::Percent => write!(f, "%"),
			Token::Eq => write!(f, "=="),
			Token::NotEq => write!(f, "!="),
			Token::Lt => write!(f, "<"),
			Token::LtEq => write!(f, "<="),
			Token::Gt => write!(f, ">"),
			Token::GtEq => write!(f, ">="),
			Token::And => write!(f, "&&"),
			Token::Or => write!(f, "||"),
			Token::Not => write!(f, "!"),
			Token::LParen => write!(f, "("),
			Token::RParen => write!(f, ")"),
		}
	}
}
