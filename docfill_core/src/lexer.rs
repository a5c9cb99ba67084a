use logos::Logos;
use snailquote::unescape;

use crate::expression::ExpressionError;
use crate::tokens::Token;

/// Raw tokens produced by logos. Keywords are lexed as identifiers and
/// mapped afterwards so `android` or `order` never split.
#[derive(Logos, Debug, PartialEq)]
#[logos(skip r"[ \t\r\n\f]+")]
enum RawToken {
	#[token("(")]
	LParen,
	#[token(")")]
	RParen,
	#[token("+")]
	Plus,
	#[token("-")]
	Minus,
	#[token("*")]
	Star,
	#[token("/")]
	Slash,
	#[token("%")]
	Percent,
	#[token("==")]
	Eq,
	#[token("!=")]
	NotEq,
	#[token("<=")]
	LtEq,
	#[token(">=")]
	GtEq,
	#[token("<")]
	Lt,
	#[token(">")]
	Gt,
	#[token("&&")]
	And,
	#[token("||")]
	Or,
	#[token("!")]
	Not,
	#[token("=")]
	Assign,
	#[regex(r"[a-zA-Z_][a-zA-Z0-9_]*(\.[a-zA-Z0-9_]+)*")]
	Ident,
	#[regex(r#""([^"\\]|\\.)*""#)]
	DoubleQuotedString,
	#[regex(r"'([^'\\]|\\.)*'")]
	SingleQuotedString,
	#[regex(r"[0-9]+(\.[0-9]+)?([eE][+-]?[0-9]+)?")]
	Number,
}

/// Tokenize an expression.
pub fn tokenize(source: &str) -> Result<Vec<Token>, ExpressionError> {
	let mut tokens = Vec::new();

	for (result, span) in RawToken::lexer(source).spanned() {
		let slice = &source[span.clone()];
		let Ok(raw) = result else {
			return Err(ExpressionError::UnexpectedCharacter {
				text: slice.to_string(),
				offset: span.start,
			});
		};

		let token = match raw {
			RawToken::LParen => Token::LParen,
			RawToken::RParen => Token::RParen,
			RawToken::Plus => Token::Plus,
			RawToken::Minus => Token::Minus,
			RawToken::Star => Token::Star,
			RawToken::Slash => Token::Slash,
			RawToken::Percent => Token::Percent,
			RawToken::Eq => Token::Eq,
			RawToken::NotEq => Token::NotEq,
			RawToken::LtEq => Token::LtEq,
			RawToken::GtEq => Token::GtEq,
			RawToken::Lt => Token::Lt,
			RawToken::Gt => Token::Gt,
			RawToken::And => Token::And,
			RawToken::Or => Token::Or,
			RawToken::Not => Token::Not,
			// A lone `=` is how compound assignment like `+=` shows up.
			RawToken::Assign => {
				return Err(ExpressionError::UnexpectedCharacter {
					text: slice.to_string(),
					offset: span.start,
				});
			}
			RawToken::Ident => keyword_or_ident(slice),
			RawToken::DoubleQuotedString => process_string(slice, b'"', span.start)?,
			RawToken::SingleQuotedString => process_string(slice, b'\'', span.start)?,
			RawToken::Number => {
				let value = slice
					.parse::<f64>()
					.map_err(|_| ExpressionError::UnexpectedCharacter {
						text: slice.to_string(),
						offset: span.start,
					})?;
				Token::Number(value)
			}
		};

		tokens.push(token);
	}

	Ok(tokens)
}

fn keyword_or_ident(slice: &str) -> Token {
	match slice.to_ascii_lowercase().as_str() {
		"true" => Token::True,
		"false" => Token::False,
		"null" => Token::Null,
		"and" => Token::And,
		"or" => Token::Or,
		"not" => Token::Not,
		_ => Token::Ident(slice.to_string()),
	}
}

/// Strip the surrounding quotes and unescape if needed.
fn process_string(slice: &str, delimiter: u8, offset: usize) -> Result<Token, ExpressionError> {
	let inner = &slice[1..slice.len() - 1];

	if !inner.contains('\\') {
		return Ok(Token::String(inner.to_string(), delimiter));
	}

	let unescaped = unescape(inner).map_err(|_| ExpressionError::InvalidString { offset })?;
	Ok(Token::String(unescaped, delimiter))
}
