use crate::EngineConfig;
use crate::IssueKind;
use crate::RenderIssue;
use crate::Value;
use crate::directives::Directive;
use crate::directives::DirectiveRegistry;
use crate::directives::MAX_BUILTIN_ARGS;
use crate::path;
use crate::scope::Env;
use crate::scope::Lookup;
use crate::scope::Scope;

/// A directive call inside a pipeline segment, e.g. `round(2;,;.)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Invocation<'a> {
	pub name: &'a str,
	/// The unsplit text between the parentheses, if there were any.
	pub raw_args: Option<&'a str>,
}

impl<'a> Invocation<'a> {
	pub fn parse(segment: &'a str) -> Self {
		let segment = segment.trim();
		let Some(open) = segment.find('(') else {
			return Self {
				name: segment,
				raw_args: None,
			};
		};

		let inner = &segment[open + 1..];
		let inner = inner.strip_suffix(')').unwrap_or(inner);

		Self {
			name: segment[..open].trim(),
			raw_args: Some(inner),
		}
	}

	/// Arguments for a built-in: split on the separator, trimmed, and capped
	/// at [`MAX_BUILTIN_ARGS`].
	pub fn args(&self, separator: char) -> Vec<String> {
		let Some(raw) = self.raw_args else {
			return Vec::new();
		};

		let mut args = split_args(raw, separator);
		args.truncate(MAX_BUILTIN_ARGS);
		args
	}
}

/// Split a pipeline on `|`, ignoring pipes inside parentheses or quotes so
/// regular expressions like `replace(/a|b/;x)` stay intact.
pub fn split_pipes(text: &str) -> Vec<&str> {
	split_outside(text, '|', true)
		.into_iter()
		.map(str::trim)
		.collect()
}

/// Split raw directive arguments on `separator`, ignoring separators inside
/// quotes.
pub fn split_args(raw: &str, separator: char) -> Vec<String> {
	if raw.trim().is_empty() {
		return Vec::new();
	}

	split_outside(raw, separator, false)
		.into_iter()
		.map(|arg| arg.trim().to_string())
		.collect()
}

fn split_outside(text: &str, delimiter: char, track_parens: bool) -> Vec<&str> {
	let mut parts = Vec::new();
	let mut depth = 0usize;
	let mut quote: Option<char> = None;
	let mut start = 0;

	for (idx, c) in text.char_indices() {
		match quote {
			Some(q) if c == q => quote = None,
			Some(_) => {}
			None => {
				match c {
					'"' | '\'' => quote = Some(c),
					'(' if track_parens => depth += 1,
					')' if track_parens => depth = depth.saturating_sub(1),
					_ if c == delimiter && depth == 0 => {
						parts.push(&text[start..idx]);
						start = idx + c.len_utf8();
					}
					_ => {}
				}
			}
		}
	}

	parts.push(&text[start..]);
	parts
}

/// Everything a pipeline needs to run.
pub(crate) struct Pipeline<'a> {
	pub config: &'a EngineConfig,
	pub registry: &'a DirectiveRegistry,
	pub env: Env<'a>,
	/// The caller's values, used by `concat`.
	pub values: &'a Scope,
}

impl Pipeline<'_> {
	/// Run a simple placeholder's pipeline. `None` means the placeholder is
	/// unresolved.
	pub fn run(&self, text: &str, issues: &mut Vec<RenderIssue>) -> Option<Value> {
		let mut segments = split_pipes(text).into_iter();
		let first = segments.next()?;
		let mut accumulator = self.initial(text, first, issues)?;

		for segment in segments {
			accumulator = self.invoke(text, segment, accumulator, issues);
		}

		if matches!(accumulator, Value::Object(_)) {
			issues.push(RenderIssue::new(
				IssueKind::UnresolvedReference,
				text,
				"an object cannot be rendered as text",
			));
			return None;
		}

		Some(accumulator)
	}

	fn initial(&self, text: &str, first: &str, issues: &mut Vec<RenderIssue>) -> Option<Value> {
		if let Some(value) = self.env.get(first) {
			return Some(value.clone());
		}

		if path::is_dotted_path(first) {
			let value = path::resolve(first, &self.env).cloned();
			if value.is_none() {
				issues.push(RenderIssue::new(
					IssueKind::UnresolvedReference,
					text,
					format!("`{first}` could not be resolved"),
				));
			}
			return value;
		}

		let invocation = Invocation::parse(first);
		if let Some(value) = self.call(invocation, &Value::Null) {
			return Some(value);
		}

		if first.is_empty() {
			return None;
		}

		if invocation.raw_args.is_none() && path::is_identifier(first) {
			issues.push(RenderIssue::new(
				IssueKind::UnresolvedReference,
				text,
				format!("no value named `{first}`"),
			));
		} else {
			issues.push(RenderIssue::new(
				IssueKind::UnsupportedDirective,
				text,
				format!("`{}` is not a known directive", invocation.name),
			));
		}

		None
	}

	fn invoke(
		&self,
		text: &str,
		segment: &str,
		accumulator: Value,
		issues: &mut Vec<RenderIssue>,
	) -> Value {
		let invocation = Invocation::parse(segment);

		match self.call(invocation, &accumulator) {
			Some(value) => value,
			None => {
				issues.push(RenderIssue::new(
					IssueKind::UnsupportedDirective,
					text,
					format!("`{}` is not a known directive", invocation.name),
				));
				accumulator
			}
		}
	}

	/// Call a built-in, then a registered directive. `None` if neither exists.
	fn call(&self, invocation: Invocation<'_>, value: &Value) -> Option<Value> {
		if let Some(directive) = Directive::from_name(invocation.name) {
			let args = invocation.args(self.config.separator);
			return Some(directive.apply(value, &args, self.config, self.values));
		}

		let dynamic = self.registry.get(invocation.name)?;
		Some(dynamic(value, invocation.raw_args.unwrap_or("")))
	}
}
