use std::fmt;

use derive_more::Deref;
use serde::Serialize;

/// Opening marker of a placeholder.
pub const OPEN: &str = "{{";
/// Closing marker of a placeholder.
pub const CLOSE: &str = "}}";

/// How a placeholder is dispatched, decided by the first word of its
/// directive text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum PlaceholderKind {
	/// A value lookup followed by an optional directive pipeline, e.g.
	/// `{{ name | upper }}`.
	Simple,
	/// `{{ set total = total + price }}`
	Set,
	/// `{{ import partials/footer.html }}`
	Import,
	/// `{{ if cond }}...{{ elseif cond }}...{{ else }}...{{ endif }}`
	If,
	/// `{{ for item in items }}...{{ elsefor }}...{{ endfor }}`
	For,
}

impl PlaceholderKind {
	/// Classify normalized directive text.
	pub fn classify(directive: &str) -> Self {
		let (keyword, rest) = split_keyword(directive);
		let has_body = !rest.trim().is_empty();

		match keyword.to_ascii_lowercase().as_str() {
			"if" if has_body => Self::If,
			"for" if has_body => Self::For,
			"set" if has_body => Self::Set,
			"import" if has_body => Self::Import,
			_ => Self::Simple,
		}
	}

	/// The keyword that closes a block of this kind.
	pub fn closing_keyword(self) -> Option<&'static str> {
		match self {
			Self::If => Some("endif"),
			Self::For => Some("endfor"),
			_ => None,
		}
	}
}

impl fmt::Display for PlaceholderKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Simple => write!(f, "simple"),
			Self::Set => write!(f, "set"),
			Self::Import => write!(f, "import"),
			Self::If => write!(f, "if"),
			Self::For => write!(f, "for"),
		}
	}
}

/// A placeholder found in template text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Placeholder {
	/// The literal text that gets replaced, braces included. For blocks this
	/// runs from the opening tag through the closing tag.
	pub raw: String,
	/// The normalized, trimmed text inside the opening tag.
	pub directive: String,
	pub kind: PlaceholderKind,
	/// Byte offset of the first occurrence in the scanned text.
	pub offset: usize,
}

/// Placeholders in order of first occurrence. Identical literal spans
/// collapse into one entry since substitution replaces every occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deref, Serialize)]
pub struct Placeholders(Vec<Placeholder>);

impl Placeholders {
	fn upsert(&mut self, placeholder: Placeholder) {
		if let Some(existing) = self.0.iter_mut().find(|p| p.raw == placeholder.raw) {
			existing.directive = placeholder.directive;
			existing.kind = placeholder.kind;
		} else {
			self.0.push(placeholder);
		}
	}
}

impl IntoIterator for Placeholders {
	type IntoIter = std::vec::IntoIter<Placeholder>;
	type Item = Placeholder;

	fn into_iter(self) -> Self::IntoIter {
		self.0.into_iter()
	}
}

/// Find every placeholder in `text`.
///
/// `if` and `for` spans extend to the first `}}` after the first
/// case-insensitive `endif` / `endfor`. Nested blocks of the same kind are
/// not balanced: the first closing keyword wins. An opening `{{` without a
/// closing `}}` is skipped.
pub fn scan(text: &str) -> Placeholders {
	let lower = text.to_ascii_lowercase();
	let mut placeholders = Placeholders::default();
	let mut cursor = 0;

	while let Some(found) = text[cursor..].find(OPEN) {
		let first_open = cursor + found;
		let first_inner = first_open + OPEN.len();

		let Some(close) = text[first_inner..].find(CLOSE).map(|idx| first_inner + idx) else {
			tracing::trace!(offset = first_open, "skipping placeholder without closing marker");
			cursor = first_inner;
			continue;
		};
		let open = innermost_open(text, first_open, close);
		let inner_start = open + OPEN.len();

		let directive = normalize(&text[inner_start..close]);
		let kind = PlaceholderKind::classify(&directive);
		let tag_end = close + CLOSE.len();

		let end = match kind.closing_keyword() {
			Some(keyword) => {
				let Some(end) = find_block_end(text, &lower, tag_end, keyword) else {
					tracing::trace!(offset = open, keyword, "skipping unclosed block");
					cursor = inner_start;
					continue;
				};
				end
			}
			None => tag_end,
		};

		placeholders.upsert(Placeholder {
			raw: text[open..end].to_string(),
			directive,
			kind,
			offset: open,
		});
		cursor = end;
	}

	placeholders
}

/// Normalize directive text: HTML non-breaking spaces and any whitespace
/// become plain spaces, then the result is trimmed.
pub fn normalize(inner: &str) -> String {
	inner
		.replace("&nbsp;", " ")
		.replace("&#160;", " ")
		.chars()
		.map(|c| if c.is_whitespace() { ' ' } else { c })
		.collect::<String>()
		.trim()
		.to_string()
}

/// A tag found inside a block span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Tag {
	/// Byte range of the whole tag, braces included.
	pub start: usize,
	pub end: usize,
	/// Lower-cased leading keyword.
	pub keyword: String,
	/// Normalized text after the keyword.
	pub rest: String,
}

/// Every `{{ ... }}` tag in `text` in order, without block extension.
pub(crate) fn tags(text: &str) -> Vec<Tag> {
	let mut tags = Vec::new();
	let mut cursor = 0;

	while let Some(found) = text[cursor..].find(OPEN) {
		let first = cursor + found + OPEN.len();
		let Some(close) = text[first..].find(CLOSE).map(|idx| first + idx) else {
			break;
		};
		let start = innermost_open(text, cursor + found, close);
		let inner_start = start + OPEN.len();
		let end = close + CLOSE.len();
		let directive = normalize(&text[inner_start..close]);
		let (keyword, rest) = split_keyword(&directive);

		tags.push(Tag {
			start,
			end,
			keyword: keyword.to_ascii_lowercase(),
			rest: rest.trim().to_string(),
		});
		cursor = end;
	}

	tags
}

/// The last opening marker before `close`. A stray `{{` in running text
/// belongs to the text, not to the tag that follows it.
fn innermost_open(text: &str, open: usize, close: usize) -> usize {
	let inner_start = open + OPEN.len();
	text[inner_start..close]
		.rfind(OPEN)
		.map_or(open, |idx| inner_start + idx)
}

/// Split directive text into its leading alphabetic keyword and the rest.
pub(crate) fn split_keyword(directive: &str) -> (&str, &str) {
	let end = directive
		.find(|c: char| !c.is_ascii_alphabetic())
		.unwrap_or(directive.len());
	let (keyword, rest) = directive.split_at(end);

	// `if2` or `format_date` must not count as `if` / `for`.
	if rest.starts_with(|c: char| c.is_alphanumeric() || c == '_' || c == '.') {
		return ("", directive);
	}

	(keyword, rest)
}

fn find_block_end(text: &str, lower: &str, from: usize, keyword: &str) -> Option<usize> {
	let keyword_at = from + lower[from..].find(keyword)?;
	let after = keyword_at + keyword.len();
	let close = after + text[after..].find(CLOSE)?;
	Some(close + CLOSE.len())
}
