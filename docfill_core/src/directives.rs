use std::collections::HashMap;
use std::fmt;
use std::fmt::Write;

use chrono::DateTime;
use chrono::Duration;
use chrono::Local;
use chrono::NaiveDate;
use chrono::NaiveDateTime;
use chrono::NaiveTime;
use chrono::TimeZone;
use regex::RegexBuilder;

use crate::EngineConfig;
use crate::Value;
use crate::path;
use crate::scope::Scope;

/// Built-in directives accept at most this many explicit arguments after the
/// threaded value.
pub const MAX_BUILTIN_ARGS: usize = 3;

const DEFAULT_TRUNCATE_LENGTH: usize = 20;
const DEFAULT_TRUNCATE_SUFFIX: &str = "...";
const DEFAULT_ROUND_DECIMALS: usize = 2;
/// More decimals than `f64` can carry are clamped to this.
const MAX_ROUND_DECIMALS: usize = 20;

const DATETIME_FORMATS: &[&str] = &[
	"%Y-%m-%d %H:%M:%S",
	"%Y-%m-%d %H:%M:%S%.f",
	"%Y-%m-%dT%H:%M:%S%.f",
	"%Y-%m-%d %H:%M",
	"%Y-%m-%dT%H:%M",
	"%d.%m.%Y %H:%M:%S",
	"%d.%m.%Y %H:%M",
	"%m/%d/%Y %H:%M:%S",
	"%m/%d/%Y %H:%M",
];
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%d.%m.%Y", "%d-%m-%Y", "%m/%d/%Y"];
const TIME_FORMATS: &[&str] = &["%H:%M:%S", "%H:%M"];

/// A directive that ships with the engine.
///
/// ```text
/// {{ name | upper }}
/// {{ price | round(2;,;.) }}
/// {{ created | date(%d.%m.%Y) }}
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Directive {
	/// Current unix timestamp, optionally shifted by a number of seconds.
	Now,
	/// Today's date formatted, optionally shifted by a number of days.
	Today,
	/// Format a date.
	Date,
	/// Format a time.
	Time,
	/// Format a date and a time joined by a separator.
	DateTime,
	Upper,
	Lower,
	/// Capitalize the first letter of every word.
	Title,
	/// Round and format a number with decimal and thousands separators.
	Round,
	/// Escape `<`, `>`, `&`, and `"` for HTML.
	Escape,
	/// Insert `<br />` before every line break.
	Nl2br,
	/// Cut the value to a number of characters and append a suffix.
	Truncate,
	/// Trim whitespace or a given set of characters.
	Trim,
	/// Append a literal or a supplied value with a glue string.
	Concat,
	/// Replace a substring or a delimited regular expression.
	Replace,
}

impl Directive {
	/// Look up a built-in by name. Names ignore case; `e` is an alias of
	/// `escape`.
	pub fn from_name(name: &str) -> Option<Self> {
		let directive = match name.to_ascii_lowercase().as_str() {
			"now" => Self::Now,
			"today" => Self::Today,
			"date" => Self::Date,
			"time" => Self::Time,
			"datetime" => Self::DateTime,
			"upper" => Self::Upper,
			"lower" => Self::Lower,
			"title" => Self::Title,
			"round" => Self::Round,
			"escape" | "e" => Self::Escape,
			"nl2br" => Self::Nl2br,
			"truncate" => Self::Truncate,
			"trim" => Self::Trim,
			"concat" => Self::Concat,
			"replace" => Self::Replace,
			_ => return None,
		};
		Some(directive)
	}

	/// Apply the directive to the threaded value. `values` are the values
	/// originally supplied to the render.
	pub fn apply(self, value: &Value, args: &[String], config: &EngineConfig, values: &Scope) -> Value {
		let arg = |idx: usize| args.get(idx).map(|a| unquote(a)).filter(|a| !a.is_empty());

		match self {
			Self::Now => {
				let shift = arg(0).and_then(|s| s.parse::<i64>().ok()).unwrap_or(0);
				Value::Number((Local::now().timestamp() + shift) as f64)
			}
			Self::Today => {
				let format = arg(0).unwrap_or(config.date_format.as_str());
				let shift = arg(1).and_then(|s| s.parse::<i64>().ok()).unwrap_or(0);
				Duration::try_days(shift)
					.and_then(|shift| Local::now().date_naive().checked_add_signed(shift))
					.and_then(|day| format_datetime(&day.and_time(NaiveTime::MIN), format))
					.map_or_else(|| value.clone(), Value::String)
			}
			Self::Date => {
				let format = arg(0).unwrap_or(config.date_format.as_str());
				reformat(value, |dt| format_datetime(dt, format))
			}
			Self::Time => {
				let format = arg(0).unwrap_or(config.time_format.as_str());
				reformat(value, |dt| format_datetime(dt, format))
			}
			Self::DateTime => {
				let date_format = arg(0).unwrap_or(config.date_format.as_str());
				let time_format = arg(1).unwrap_or(config.time_format.as_str());
				let separator = args.get(2).map_or(" ", |s| unquote(s));
				reformat(value, |dt| {
					let date = format_datetime(dt, date_format)?;
					let time = format_datetime(dt, time_format)?;
					Some(format!("{date}{separator}{time}"))
				})
			}
			Self::Upper => Value::String(value.to_string().to_uppercase()),
			Self::Lower => Value::String(value.to_string().to_lowercase()),
			Self::Title => Value::String(title_case(&value.to_string())),
			Self::Round => {
				let decimals = arg(0)
					.and_then(|s| s.parse::<usize>().ok())
					.unwrap_or(DEFAULT_ROUND_DECIMALS);
				let decimal_point = args
					.get(1)
					.map_or(config.decimal_point.as_str(), |s| unquote(s));
				let thousands = args
					.get(2)
					.map_or(config.thousands_separator.as_str(), |s| unquote(s));
				let number = match value {
					Value::Number(number) => Some(*number),
					_ => parse_localized_number(&value.to_string(), decimal_point, thousands),
				};
				match number {
					Some(number) => {
						Value::String(number_format(number, decimals, decimal_point, thousands))
					}
					None => value.clone(),
				}
			}
			Self::Escape => Value::String(escape_html(&value.to_string())),
			Self::Nl2br => Value::String(nl2br(&value.to_string())),
			Self::Truncate => {
				let max = arg(0)
					.and_then(|s| s.parse::<usize>().ok())
					.unwrap_or(DEFAULT_TRUNCATE_LENGTH);
				let suffix = args.get(1).map_or(DEFAULT_TRUNCATE_SUFFIX, |s| unquote(s));
				let text = value.to_string();
				if text.chars().count() > max {
					let mut truncated: String = text.chars().take(max).collect();
					truncated.push_str(suffix);
					Value::String(truncated)
				} else {
					Value::String(text)
				}
			}
			Self::Trim => {
				let text = value.to_string();
				match arg(0) {
					Some(chars) => Value::String(text.trim_matches(|c: char| chars.contains(c)).to_string()),
					None => Value::String(text.trim().to_string()),
				}
			}
			Self::Concat => {
				let Some(raw) = args.first() else {
					return value.clone();
				};
				let text = if is_quoted(raw) {
					unquote(raw).to_string()
				} else {
					path::resolve(raw, values).map_or_else(|| raw.clone(), ToString::to_string)
				};
				let glue = args.get(1).map_or(" ", |s| unquote(s));
				Value::String(format!("{value}{glue}{text}"))
			}
			Self::Replace => {
				let Some(pattern) = arg(0) else {
					return value.clone();
				};
				let replacement = args.get(1).map_or("", |s| unquote(s));
				replace(&value.to_string(), pattern, replacement)
					.map_or_else(|| value.clone(), Value::String)
			}
		}
	}
}

impl fmt::Display for Directive {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			Self::Now => "now",
			Self::Today => "today",
			Self::Date => "date",
			Self::Time => "time",
			Self::DateTime => "datetime",
			Self::Upper => "upper",
			Self::Lower => "lower",
			Self::Title => "title",
			Self::Round => "round",
			Self::Escape => "escape",
			Self::Nl2br => "nl2br",
			Self::Truncate => "truncate",
			Self::Trim => "trim",
			Self::Concat => "concat",
			Self::Replace => "replace",
		};
		write!(f, "{name}")
	}
}

/// A user-supplied directive. It receives the threaded value and the raw,
/// unsplit argument text.
pub type DynamicDirective = Box<dyn Fn(&Value, &str) -> Value>;

/// Directives registered at runtime. Built-ins always take precedence over
/// a registered directive of the same name.
#[derive(Default)]
pub struct DirectiveRegistry {
	directives: HashMap<String, DynamicDirective>,
}

impl DirectiveRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Register a directive, replacing an earlier one with the same name.
	/// Returns `false` when a built-in of that name shadows it.
	pub fn register<F>(&mut self, name: impl Into<String>, directive: F) -> bool
	where
		F: Fn(&Value, &str) -> Value + 'static,
	{
		let name = name.into().to_ascii_lowercase();
		let shadowed = Directive::from_name(&name).is_some();
		if shadowed {
			tracing::warn!(name = %name, "registered directive is shadowed by a built-in");
		}
		self.directives.insert(name, Box::new(directive));
		!shadowed
	}

	pub fn get(&self, name: &str) -> Option<&DynamicDirective> {
		self.directives.get(&name.to_ascii_lowercase())
	}
}

impl fmt::Debug for DirectiveRegistry {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let mut names: Vec<_> = self.directives.keys().collect();
		names.sort();
		f.debug_struct("DirectiveRegistry")
			.field("directives", &names)
			.finish()
	}
}

fn is_quoted(text: &str) -> bool {
	text.len() >= 2
		&& ((text.starts_with('"') && text.ends_with('"'))
			|| (text.starts_with('\'') && text.ends_with('\'')))
}

/// Strip one pair of matching surrounding quotes.
pub fn unquote(text: &str) -> &str {
	if is_quoted(text) {
		&text[1..text.len() - 1]
	} else {
		text
	}
}

/// Reformat a value when it reads as a date or time. Anything else passes
/// through unchanged.
fn reformat(value: &Value, format: impl FnOnce(&NaiveDateTime) -> Option<String>) -> Value {
	let Some(parsed) = parse_datetime(value) else {
		return value.clone();
	};

	match format(&parsed) {
		Some(formatted) => Value::String(formatted),
		None => {
			tracing::warn!("invalid date or time format string");
			value.clone()
		}
	}
}

/// Interpret a value as a point in time: a unix timestamp, or a string with at
/// least one digit in one of the accepted date / time layouts.
pub fn parse_datetime(value: &Value) -> Option<NaiveDateTime> {
	match value {
		Value::Number(n) => from_timestamp(*n as i64),
		Value::String(s) => parse_datetime_str(s.trim()),
		_ => None,
	}
}

fn parse_datetime_str(text: &str) -> Option<NaiveDateTime> {
	if !text.chars().any(|c| c.is_ascii_digit()) {
		return None;
	}

	let digits = text.strip_prefix('-').unwrap_or(text);
	if digits.chars().all(|c| c.is_ascii_digit()) {
		return text.parse::<i64>().ok().and_then(from_timestamp);
	}

	if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
		return Some(dt.naive_local());
	}

	DATETIME_FORMATS
		.iter()
		.find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
		.or_else(|| {
			DATE_FORMATS
				.iter()
				.find_map(|format| NaiveDate::parse_from_str(text, format).ok())
				.map(|date| date.and_time(NaiveTime::MIN))
		})
		.or_else(|| {
			TIME_FORMATS
				.iter()
				.find_map(|format| NaiveTime::parse_from_str(text, format).ok())
				.map(|time| Local::now().date_naive().and_time(time))
		})
}

fn from_timestamp(seconds: i64) -> Option<NaiveDateTime> {
	Local
		.timestamp_opt(seconds, 0)
		.single()
		.map(|dt| dt.naive_local())
}

/// Format with a strftime pattern. Invalid patterns yield `None` instead of
/// panicking inside `Display`.
fn format_datetime(dt: &NaiveDateTime, format: &str) -> Option<String> {
	let mut out = String::new();
	write!(out, "{}", dt.format(format)).ok()?;
	Some(out)
}

fn title_case(text: &str) -> String {
	let mut result = String::with_capacity(text.len());
	let mut at_word_start = true;

	for c in text.chars() {
		if c.is_whitespace() {
			at_word_start = true;
			result.push(c);
		} else if at_word_start {
			result.extend(c.to_uppercase());
			at_word_start = false;
		} else {
			result.extend(c.to_lowercase());
		}
	}

	result
}

/// Read a number written with the given separators, ignoring spaces and
/// thousands separators.
fn parse_localized_number(text: &str, decimal_point: &str, thousands: &str) -> Option<f64> {
	let mut normalized: String = text
		.chars()
		.filter(|c| !c.is_whitespace() && *c != '\u{a0}')
		.collect();
	if !thousands.is_empty() {
		normalized = normalized.replace(thousands, "");
	}
	if !decimal_point.is_empty() && decimal_point != "." {
		normalized = normalized.replace(decimal_point, ".");
	}

	normalized.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Round half away from zero and format with grouped thousands.
pub fn number_format(number: f64, decimals: usize, decimal_point: &str, thousands: &str) -> String {
	let decimals = decimals.min(MAX_ROUND_DECIMALS);
	let factor = 10_f64.powi(decimals as i32);
	let scaled = number * factor;
	let rounded = if scaled.is_finite() {
		scaled.round() / factor
	} else {
		number
	};
	let formatted = format!("{:.*}", decimals, rounded.abs());
	let (integer, fraction) = formatted
		.split_once('.')
		.map_or((formatted.as_str(), ""), |(i, f)| (i, f));

	let mut grouped = String::with_capacity(formatted.len() + integer.len() / 3 * thousands.len());
	for (idx, digit) in integer.chars().enumerate() {
		if idx > 0 && (integer.len() - idx) % 3 == 0 {
			grouped.push_str(thousands);
		}
		grouped.push(digit);
	}

	let mut result = String::new();
	if rounded < 0.0 {
		result.push('-');
	}
	result.push_str(&grouped);
	if !fraction.is_empty() {
		result.push_str(decimal_point);
		result.push_str(fraction);
	}
	result
}

pub fn escape_html(text: &str) -> String {
	let mut escaped = String::with_capacity(text.len());
	for c in text.chars() {
		match c {
			'&' => escaped.push_str("&amp;"),
			'<' => escaped.push_str("&lt;"),
			'>' => escaped.push_str("&gt;"),
			'"' => escaped.push_str("&quot;"),
			_ => escaped.push(c),
		}
	}
	escaped
}

fn nl2br(text: &str) -> String {
	let mut result = String::with_capacity(text.len());
	let mut chars = text.chars().peekable();

	while let Some(c) = chars.next() {
		match c {
			'\r' if chars.peek() == Some(&'\n') => {
				chars.next();
				result.push_str("<br />\r\n");
			}
			'\r' | '\n' => {
				result.push_str("<br />");
				result.push(c);
			}
			_ => result.push(c),
		}
	}

	result
}

/// Replace with a delimited regular expression like `/a+b/i`, or with a
/// plain substring otherwise. Returns `None` for an invalid expression.
fn replace(text: &str, pattern: &str, replacement: &str) -> Option<String> {
	let Some((body, flags)) = split_delimited_regex(pattern) else {
		return Some(text.replace(pattern, replacement));
	};

	let mut builder = RegexBuilder::new(body);
	for flag in flags.chars() {
		match flag {
			'i' => builder.case_insensitive(true),
			'm' => builder.multi_line(true),
			's' => builder.dot_matches_new_line(true),
			'x' => builder.ignore_whitespace(true),
			_ => &mut builder,
		};
	}

	match builder.build() {
		Ok(regex) => Some(regex.replace_all(text, replacement).into_owned()),
		Err(error) => {
			tracing::warn!(pattern, %error, "invalid regular expression in replace");
			None
		}
	}
}

fn split_delimited_regex(pattern: &str) -> Option<(&str, &str)> {
	let delimiter = pattern.chars().next().filter(|c| matches!(*c, '/' | '#' | '~'))?;
	let rest = &pattern[delimiter.len_utf8()..];
	let end = rest.rfind(delimiter)?;
	let flags = &rest[end + delimiter.len_utf8()..];

	flags
		.chars()
		.all(|c| matches!(c, 'i' | 'm' | 's' | 'x' | 'u'))
		.then(|| (&rest[..end], flags))
}
