use derive_more::Deref;

use crate::Value;
use crate::Values;

/// Name lookup over a set of bindings.
pub trait Lookup {
	/// Exact, case-sensitive lookup.
	fn get(&self, key: &str) -> Option<&Value>;

	/// Case-insensitive lookup that only matches objects.
	fn get_object(&self, key: &str) -> Option<&Value>;

	fn contains_key(&self, key: &str) -> bool {
		self.get(key).is_some()
	}
}

/// An ordered mapping of names to values. Inserting an existing name
/// replaces its value in place.
#[derive(Debug, Clone, PartialEq, Default, Deref)]
pub struct Scope(Vec<(String, Value)>);

impl Scope {
	pub fn new() -> Self {
		Self::default()
	}

	/// Build the scope for a render from caller-supplied values.
	///
	/// - Objects under a purely numeric key are re-keyed by their lower-cased
	///   type name. Anything else under a numeric key is dropped.
	/// - Objects under a named key are stored under the lower-cased name.
	/// - Scalars and lists keep their key as given.
	/// - `null` values are kept.
	pub fn from_values(values: &Values) -> Self {
		let mut scope = Self::new();

		for (key, value) in values.iter() {
			let is_positional = !key.is_empty() && key.bytes().all(|b| b.is_ascii_digit());

			match value {
				Value::Object(object) if is_positional => {
					if let Some(type_name) = object.type_name() {
						scope.insert(type_name.to_lowercase(), value.clone());
					} else {
						tracing::trace!(key = %key, "dropping untyped positional object");
					}
				}
				_ if is_positional => {
					tracing::trace!(key = %key, "dropping positional non-object value");
				}
				Value::Object(_) => scope.insert(key.to_lowercase(), value.clone()),
				_ => scope.insert(key.clone(), value.clone()),
			}
		}

		scope
	}

	pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
		let key = key.into();
		let value = value.into();
		if let Some(slot) = self.0.iter_mut().find(|(existing, _)| *existing == key) {
			slot.1 = value;
		} else {
			self.0.push((key, value));
		}
	}

	pub fn clear(&mut self) {
		self.0.clear();
	}

	pub fn keys(&self) -> impl Iterator<Item = &str> {
		self.0.iter().map(|(key, _)| key.as_str())
	}
}

impl Lookup for Scope {
	fn get(&self, key: &str) -> Option<&Value> {
		self.0
			.iter()
			.find(|(existing, _)| existing == key)
			.map(|(_, value)| value)
	}

	fn get_object(&self, key: &str) -> Option<&Value> {
		self.0
			.iter()
			.find(|(existing, value)| {
				matches!(value, Value::Object(_)) && existing.eq_ignore_ascii_case(key)
			})
			.map(|(_, value)| value)
	}
}

impl<K, V> FromIterator<(K, V)> for Scope
where
	K: Into<String>,
	V: Into<Value>,
{
	fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
		let mut scope = Self::new();
		for (key, value) in iter {
			scope.insert(key, value);
		}
		scope
	}
}

/// The layered view a placeholder is evaluated against. Loop bindings shadow
/// global variables, which shadow the caller's values.
#[derive(Debug, Clone, Copy)]
pub struct Env<'a> {
	pub locals: &'a Scope,
	pub globals: &'a Scope,
	pub values: &'a Scope,
}

impl Env<'_> {
	fn layers(&self) -> [&Scope; 3] {
		[self.locals, self.globals, self.values]
	}
}

impl Lookup for Env<'_> {
	fn get(&self, key: &str) -> Option<&Value> {
		self.layers().into_iter().find_map(|layer| layer.get(key))
	}

	fn get_object(&self, key: &str) -> Option<&Value> {
		self.layers()
			.into_iter()
			.find_map(|layer| layer.get_object(key))
	}
}
