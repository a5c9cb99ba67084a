use std::fmt;

use derive_more::Deref;
use derive_more::DerefMut;
use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::de;
use serde::de::MapAccess;
use serde::de::SeqAccess;
use serde::de::Visitor;

/// A value that can be substituted into a template or consulted by an
/// expression.
///
/// Scalars (`Null`, `Bool`, `Number`, `String`) print directly. `List` and
/// `Object` are containers reached through dotted paths, `for` loops, and
/// custom directives.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
	#[default]
	Null,
	Bool(bool),
	Number(f64),
	String(String),
	List(Vec<Value>),
	Object(Object),
}

impl Value {
	/// Convert any serializable value. Structs and maps become an [`Object`]
	/// tagged with the short name of `T`, so they can be supplied
	/// positionally and looked up by type name.
	pub fn from_serialize<T: Serialize>(value: &T) -> serde_json::Result<Self> {
		let mut converted = Self::from(serde_json::to_value(value)?);
		if let Self::Object(object) = &mut converted {
			object.type_name = Some(short_type_name::<T>());
		}
		Ok(converted)
	}

	/// Whether the value counts as empty: `null`, `false`, `0`, `""`, `"0"`,
	/// or an empty list or object.
	pub fn is_empty(&self) -> bool {
		match self {
			Self::Null => true,
			Self::Bool(b) => !b,
			Self::Number(n) => *n == 0.0,
			Self::String(s) => s.is_empty() || s == "0",
			Self::List(items) => items.is_empty(),
			Self::Object(object) => object.is_empty(),
		}
	}

	pub fn is_truthy(&self) -> bool {
		!self.is_empty()
	}

	pub fn is_container(&self) -> bool {
		matches!(self, Self::List(_) | Self::Object(_))
	}

	/// The numeric reading of this value, if it has one. Strings only count
	/// when they pass [`numeric_literal`].
	pub fn as_number(&self) -> Option<f64> {
		match self {
			Self::Number(n) => Some(*n),
			Self::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
			Self::Null => Some(0.0),
			Self::String(s) => numeric_literal(s),
			Self::List(_) | Self::Object(_) => None,
		}
	}

	/// Look up a field of an object (case-insensitive) or an index of a
	/// list.
	pub fn get(&self, key: &str) -> Option<&Value> {
		match self {
			Self::Object(object) => object.get(key),
			Self::List(items) => key.parse::<usize>().ok().and_then(|idx| items.get(idx)),
			_ => None,
		}
	}
}

impl fmt::Display for Value {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Null | Self::Bool(false) | Self::Object(_) => Ok(()),
			Self::Bool(true) => write!(f, "1"),
			Self::Number(n) => write!(f, "{}", format_number(*n)),
			Self::String(s) => write!(f, "{s}"),
			Self::List(items) => {
				for (idx, item) in items.iter().enumerate() {
					if idx > 0 {
						write!(f, ", ")?;
					}
					write!(f, "{item}")?;
				}
				Ok(())
			}
		}
	}
}

/// Parse a string as a number unless it carries a leading zero like
/// `"0123"`, which must stay a string so identifiers and zip codes keep
/// their digits.
pub fn numeric_literal(text: &str) -> Option<f64> {
	let trimmed = text.trim();
	if trimmed.is_empty() || trimmed != text {
		return None;
	}

	let digits = trimmed.strip_prefix('-').unwrap_or(trimmed);
	let mut chars = digits.chars();
	if let (Some('0'), Some(next)) = (chars.next(), chars.next()) {
		if next.is_ascii_digit() {
			return None;
		}
	}

	if !digits.starts_with(|c: char| c.is_ascii_digit()) {
		return None;
	}

	trimmed.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Format a number without a trailing `.0` for integral values and without
/// binary rounding noise such as `0.30000000000000004`.
pub fn format_number(n: f64) -> String {
	if !n.is_finite() {
		return n.to_string();
	}

	if n.abs() >= 1e15 {
		return format!("{n}");
	}

	if (n - n.round()).abs() < 1e-9 {
		return format!("{}", n.round() as i64);
	}

	let rounded = (n * 1e10).round() / 1e10;
	format!("{rounded}")
}

/// The last path segment of `T`'s type name without generics, e.g.
/// `Invoice` for `billing::model::Invoice<Line>`.
pub fn short_type_name<T: ?Sized>() -> String {
	let full = std::any::type_name::<T>();
	let base = full.split('<').next().unwrap_or(full);
	base.rsplit("::").next().unwrap_or(base).to_string()
}

/// A read-only record of named fields. Field lookup ignores case.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Object {
	type_name: Option<String>,
	fields: Vec<(String, Value)>,
}

impl Object {
	pub fn new() -> Self {
		Self::default()
	}

	/// An empty object carrying a type name, used when it is supplied
	/// positionally.
	pub fn typed(type_name: impl Into<String>) -> Self {
		Self {
			type_name: Some(type_name.into()),
			fields: Vec::new(),
		}
	}

	#[must_use]
	pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
		self.insert(name, value);
		self
	}

	/// Insert a field, replacing an existing one with the same exact name.
	pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
		let name = name.into();
		let value = value.into();
		if let Some(slot) = self.fields.iter_mut().find(|(key, _)| *key == name) {
			slot.1 = value;
		} else {
			self.fields.push((name, value));
		}
	}

	pub fn get(&self, name: &str) -> Option<&Value> {
		self.fields
			.iter()
			.find(|(key, _)| key == name)
			.or_else(|| {
				self.fields
					.iter()
					.find(|(key, _)| key.eq_ignore_ascii_case(name))
			})
			.map(|(_, value)| value)
	}

	pub fn type_name(&self) -> Option<&str> {
		self.type_name.as_deref()
	}

	pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
		self.fields.iter().map(|(key, value)| (key.as_str(), value))
	}

	pub fn len(&self) -> usize {
		self.fields.len()
	}

	pub fn is_empty(&self) -> bool {
		self.fields.is_empty()
	}
}

/// The values a caller hands to a render, in the order they were supplied.
///
/// Entries pushed without a name get their position as key. Object entries
/// under such numeric keys are later re-keyed by their type name when the
/// scope is built.
#[derive(Debug, Clone, PartialEq, Default, Deref, DerefMut)]
pub struct Values(Vec<(String, Value)>);

impl Values {
	pub fn new() -> Self {
		Self::default()
	}

	#[must_use]
	pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
		self.insert(key, value);
		self
	}

	/// Insert a named value, replacing any existing entry with the same key.
	pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
		let key = key.into();
		let value = value.into();
		if let Some(slot) = self.0.iter_mut().find(|(existing, _)| *existing == key) {
			slot.1 = value;
		} else {
			self.0.push((key, value));
		}
	}

	/// Append a value under its position.
	pub fn push(&mut self, value: impl Into<Value>) {
		let key = self.0.len().to_string();
		self.0.push((key, value.into()));
	}

	/// Append a serializable struct positionally; it becomes reachable under
	/// its lower-cased type name.
	pub fn push_serialize<T: Serialize>(&mut self, value: &T) -> serde_json::Result<()> {
		self.push(Value::from_serialize(value)?);
		Ok(())
	}

	pub fn get(&self, key: &str) -> Option<&Value> {
		self.0
			.iter()
			.find(|(existing, _)| existing == key)
			.map(|(_, value)| value)
	}

	pub fn into_inner(self) -> Vec<(String, Value)> {
		self.0
	}
}

impl<K, V> FromIterator<(K, V)> for Values
where
	K: Into<String>,
	V: Into<Value>,
{
	fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
		let mut values = Self::new();
		for (key, value) in iter {
			values.insert(key, value);
		}
		values
	}
}

impl From<serde_json::Value> for Value {
	fn from(value: serde_json::Value) -> Self {
		match value {
			serde_json::Value::Null => Self::Null,
			serde_json::Value::Bool(b) => Self::Bool(b),
			serde_json::Value::Number(n) => n.as_f64().map_or(Self::Null, Self::Number),
			serde_json::Value::String(s) => Self::String(s),
			serde_json::Value::Array(items) => {
				Self::List(items.into_iter().map(Self::from).collect())
			}
			serde_json::Value::Object(map) => {
				let mut object = Object::new();
				for (key, value) in map {
					object.insert(key, Self::from(value));
				}
				Self::Object(object)
			}
		}
	}
}

/// Data files deserialize straight into values. Integers become numbers and
/// maps keep their key order.
impl<'de> Deserialize<'de> for Value {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		deserializer.deserialize_any(ValueVisitor)
	}
}

struct ValueVisitor;

impl<'de> Visitor<'de> for ValueVisitor {
	type Value = Value;

	fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("a scalar, list, or table")
	}

	fn visit_bool<E: de::Error>(self, v: bool) -> Result<Value, E> {
		Ok(Value::Bool(v))
	}

	fn visit_i64<E: de::Error>(self, v: i64) -> Result<Value, E> {
		Ok(Value::Number(v as f64))
	}

	fn visit_u64<E: de::Error>(self, v: u64) -> Result<Value, E> {
		Ok(Value::Number(v as f64))
	}

	fn visit_f64<E: de::Error>(self, v: f64) -> Result<Value, E> {
		Ok(Value::Number(v))
	}

	fn visit_str<E: de::Error>(self, v: &str) -> Result<Value, E> {
		Ok(Value::String(v.to_string()))
	}

	fn visit_string<E: de::Error>(self, v: String) -> Result<Value, E> {
		Ok(Value::String(v))
	}

	fn visit_unit<E: de::Error>(self) -> Result<Value, E> {
		Ok(Value::Null)
	}

	fn visit_none<E: de::Error>(self) -> Result<Value, E> {
		Ok(Value::Null)
	}

	fn visit_some<D>(self, deserializer: D) -> Result<Value, D::Error>
	where
		D: Deserializer<'de>,
	{
		Value::deserialize(deserializer)
	}

	fn visit_seq<A>(self, mut seq: A) -> Result<Value, A::Error>
	where
		A: SeqAccess<'de>,
	{
		let mut items = Vec::new();
		while let Some(item) = seq.next_element()? {
			items.push(item);
		}
		Ok(Value::List(items))
	}

	fn visit_map<A>(self, mut map: A) -> Result<Value, A::Error>
	where
		A: MapAccess<'de>,
	{
		let mut object = Object::new();
		while let Some((key, value)) = map.next_entry::<String, Value>()? {
			object.insert(key, value);
		}
		Ok(Value::Object(object))
	}
}

impl From<&str> for Value {
	fn from(value: &str) -> Self {
		Self::String(value.to_string())
	}
}

impl From<String> for Value {
	fn from(value: String) -> Self {
		Self::String(value)
	}
}

impl From<bool> for Value {
	fn from(value: bool) -> Self {
		Self::Bool(value)
	}
}

impl From<f64> for Value {
	fn from(value: f64) -> Self {
		Self::Number(value)
	}
}

impl From<i64> for Value {
	fn from(value: i64) -> Self {
		Self::Number(value as f64)
	}
}

impl From<i32> for Value {
	fn from(value: i32) -> Self {
		Self::Number(f64::from(value))
	}
}

impl From<usize> for Value {
	fn from(value: usize) -> Self {
		Self::Number(value as f64)
	}
}

impl From<Object> for Value {
	fn from(value: Object) -> Self {
		Self::Object(value)
	}
}

impl<T: Into<Value>> From<Vec<T>> for Value {
	fn from(value: Vec<T>) -> Self {
		Self::List(value.into_iter().map(Into::into).collect())
	}
}

impl<T: Into<Value>> From<Option<T>> for Value {
	fn from(value: Option<T>) -> Self {
		value.map_or(Self::Null, Into::into)
	}
}
