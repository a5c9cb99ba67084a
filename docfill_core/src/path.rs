use crate::Value;
use crate::scope::Lookup;

/// Resolve a dotted path such as `invoice.customer.name` or `items.0.price`.
///
/// A key that matches the whole path verbatim wins over traversal. Otherwise
/// the first segment must name an object or list; every further segment is
/// a field (objects, case-insensitive) or an index (lists). Any missing
/// segment makes the whole path unresolved.
pub fn resolve<'a, L>(path: &str, lookup: &'a L) -> Option<&'a Value>
where
	L: Lookup + ?Sized,
{
	if let Some(value) = lookup.get(path) {
		return Some(value);
	}

	let mut segments = path.split('.');
	let first = segments.next()?;
	let mut current = lookup
		.get(first)
		.filter(|value| value.is_container())
		.or_else(|| lookup.get_object(first))?;

	let mut traversed = false;
	for segment in segments {
		current = current.get(segment)?;
		traversed = true;
	}

	traversed.then_some(current)
}

/// Whether `text` has the shape of a dotted path: identifier segments (or
/// list indexes after the first) joined by dots.
pub fn is_dotted_path(text: &str) -> bool {
	let mut segments = text.split('.');
	let Some(first) = segments.next() else {
		return false;
	};

	if !is_identifier(first) {
		return false;
	}

	let mut count = 0;
	for segment in segments {
		if segment.is_empty() || !segment.chars().all(|c| c.is_alphanumeric() || c == '_') {
			return false;
		}
		count += 1;
	}

	count > 0
}

/// A word made of letters, digits, and underscores that does not start with a
/// digit.
pub fn is_identifier(text: &str) -> bool {
	let mut chars = text.chars();
	matches!(chars.next(), Some(c) if c.is_alphabetic() || c == '_')
		&& chars.all(|c| c.is_alphanumeric() || c == '_')
}
