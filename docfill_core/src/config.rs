use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;
use std::str::FromStr;

use serde::Deserialize;

use crate::DocfillError;
use crate::DocfillResult;
use crate::Object;
use crate::Value;
use crate::Values;

/// Supported config file locations in discovery order (highest precedence
/// first).
pub const CONFIG_FILE_CANDIDATES: [&str; 3] = [
	"docfill.toml",
	".docfill.toml",
	".config/docfill.toml",
];

/// Default nesting limit for block, loop, and import renders.
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// What to do with placeholders that could not be resolved.
///
/// ```toml
/// force_replace = false        # leave `{{ missing }}` in the output
/// force_replace = true         # replace it with an empty string
/// force_replace = "[missing]"  # replace it with this literal
/// ```
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
#[non_exhaustive]
pub enum ForceReplace {
	/// `false` leaves unresolved placeholders untouched, `true` removes them.
	Bool(bool),
	/// Replace unresolved placeholders with this literal.
	Text(String),
}

impl ForceReplace {
	/// The replacement text for an unresolved placeholder, if any.
	pub fn replacement(&self) -> Option<&str> {
		match self {
			Self::Bool(false) => None,
			Self::Bool(true) => Some(""),
			Self::Text(text) => Some(text),
		}
	}
}

impl Default for ForceReplace {
	fn default() -> Self {
		Self::Bool(false)
	}
}

/// Data source entry for a `[data]` namespace.
///
/// ```toml
/// [data]
/// invoice = "invoice.json"
/// company = { path = "company", format = "yaml" }
/// ```
#[derive(Debug, Clone, Deserialize, Eq, PartialEq)]
#[serde(untagged)]
#[non_exhaustive]
pub enum DataSource {
	Path(PathBuf),
	Typed(TypedDataSource),
}

impl DataSource {
	pub fn path(&self) -> &Path {
		match self {
			Self::Path(path) => path,
			Self::Typed(typed) => &typed.path,
		}
	}

	/// The explicit format, falling back to the file extension.
	pub fn format(&self) -> DocfillResult<DataFormat> {
		match self {
			Self::Path(path) => DataFormat::from_path(path),
			Self::Typed(typed) => typed.format.parse(),
		}
	}
}

/// Typed data source configuration for `[data]` entries.
#[derive(Debug, Clone, Deserialize, Eq, PartialEq)]
pub struct TypedDataSource {
	pub path: PathBuf,
	pub format: String,
}

/// Engine configuration, usually loaded from `docfill.toml`.
///
/// ```toml
/// separator = ";"
/// force_replace = false
/// log_errors = true
/// date_format = "%d.%m.%Y"
/// time_format = "%H:%M"
/// decimal_point = ","
/// thousands_separator = "."
/// template_root = "templates"
/// max_depth = 64
///
/// [data]
/// invoice = "invoice.json"
/// ```
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
	/// Separator between directive arguments, e.g. `round(2;,;.)`.
	pub separator: char,
	/// Policy for unresolved placeholders.
	pub force_replace: ForceReplace,
	/// Whether non-fatal issues are collected for [`crate::Engine::errors`].
	pub log_errors: bool,
	/// Default strftime format for `date`, `datetime`, and `today`.
	pub date_format: String,
	/// Default strftime format for `time` and `datetime`.
	pub time_format: String,
	/// Default decimal point for `round`.
	pub decimal_point: String,
	/// Default thousands separator for `round`.
	pub thousands_separator: String,
	/// Directory that every `import` must stay inside. Relative paths in a
	/// config file resolve against the file's directory.
	pub template_root: Option<PathBuf>,
	/// Maximum nesting of blocks and imports before rendering fails.
	pub max_depth: usize,
	/// Map of value name to data file.
	pub data: HashMap<String, DataSource>,
}

impl Default for EngineConfig {
	fn default() -> Self {
		Self {
			separator: ';',
			force_replace: ForceReplace::default(),
			log_errors: true,
			date_format: "%Y-%m-%d".to_string(),
			time_format: "%H:%M".to_string(),
			decimal_point: ".".to_string(),
			thousands_separator: ",".to_string(),
			template_root: None,
			max_depth: DEFAULT_MAX_DEPTH,
			data: HashMap::new(),
		}
	}
}

impl EngineConfig {
	/// Resolve the config path from known discovery candidates.
	#[must_use]
	pub fn resolve_path(root: &Path) -> Option<PathBuf> {
		CONFIG_FILE_CANDIDATES
			.iter()
			.map(|candidate| root.join(candidate))
			.find(|path| path.is_file())
	}

	/// Load the config from the first discovered config file at `root`.
	/// Returns `None` if there is no config file.
	pub fn load(root: &Path) -> DocfillResult<Option<EngineConfig>> {
		let Some(config_path) = Self::resolve_path(root) else {
			return Ok(None);
		};

		let content = std::fs::read_to_string(&config_path)?;
		let mut config = Self::from_toml(&content)?;

		if let Some(template_root) = &config.template_root {
			if template_root.is_relative() {
				let base = config_path.parent().unwrap_or(root);
				config.template_root = Some(base.join(template_root));
			}
		}

		tracing::debug!(path = %config_path.display(), "loaded config");
		Ok(Some(config))
	}

	pub fn from_toml(content: &str) -> DocfillResult<EngineConfig> {
		toml::from_str(content).map_err(|e| DocfillError::ConfigParse(e.to_string()))
	}

	/// Read each `[data]` file into a named value.
	pub fn load_values(&self, root: &Path) -> DocfillResult<Values> {
		let mut values = Values::new();

		let mut names: Vec<_> = self.data.iter().collect();
		names.sort_by(|a, b| a.0.cmp(b.0));

		for (name, source) in names {
			let value = read_data_file(&root.join(source.path()), source.format()?)?;
			values.insert(name.clone(), value);
		}

		Ok(values)
	}
}

/// The formats a data file can be written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum DataFormat {
	/// The whole file as one string.
	Text,
	Json,
	Toml,
	Yaml,
	/// Nodes become fields. Repeated node names collect into a list.
	Kdl,
	Ini,
}

impl DataFormat {
	/// The format named by a path's extension.
	pub fn from_path(path: &Path) -> DocfillResult<Self> {
		path.extension()
			.and_then(|e| e.to_str())
			.unwrap_or("")
			.parse()
	}

	/// Parse file content into a value. Errors are returned as the reason
	/// text for [`DocfillError::DataFile`].
	pub fn parse(self, content: &str) -> Result<Value, String> {
		match self {
			Self::Text => Ok(Value::String(content.to_string())),
			Self::Json => serde_json::from_str(content).map_err(|e| e.to_string()),
			Self::Toml => {
				toml::from_str::<toml::Table>(content)
					.map(|table| toml_value(toml::Value::Table(table)))
					.map_err(|e| e.to_string())
			}
			Self::Yaml => serde_yaml_ng::from_str(content).map_err(|e| e.to_string()),
			Self::Kdl => {
				content
					.parse::<kdl::KdlDocument>()
					.map(|doc| Value::Object(kdl_document(&doc)))
					.map_err(|e| e.to_string())
			}
			Self::Ini => serde_ini::from_str(content).map_err(|e| e.to_string()),
		}
	}
}

impl FromStr for DataFormat {
	type Err = DocfillError;

	fn from_str(name: &str) -> Result<Self, Self::Err> {
		match name.trim().to_ascii_lowercase().as_str() {
			"text" | "string" | "raw" | "txt" => Ok(Self::Text),
			"json" => Ok(Self::Json),
			"toml" => Ok(Self::Toml),
			"yaml" | "yml" => Ok(Self::Yaml),
			"kdl" => Ok(Self::Kdl),
			"ini" => Ok(Self::Ini),
			other => Err(DocfillError::UnsupportedDataFormat(other.to_string())),
		}
	}
}

/// Load a data file whose top-level table becomes the supplied values, one
/// entry per key.
pub fn load_data_file(path: &Path) -> DocfillResult<Values> {
	match read_data_file(path, DataFormat::from_path(path)?)? {
		Value::Object(object) => {
			Ok(object
				.fields()
				.map(|(key, value)| (key, value.clone()))
				.collect())
		}
		_ => {
			Err(DocfillError::DataFile {
				path: path.display().to_string(),
				reason: "the top level must be a table of named values".to_string(),
			})
		}
	}
}

fn read_data_file(path: &Path, format: DataFormat) -> DocfillResult<Value> {
	let data_error = |reason: String| {
		DocfillError::DataFile {
			path: path.display().to_string(),
			reason,
		}
	};

	let content = std::fs::read_to_string(path).map_err(|e| data_error(e.to_string()))?;
	tracing::debug!(path = %path.display(), ?format, "reading data file");
	format.parse(&content).map_err(data_error)
}

/// TOML datetimes have no counterpart and are kept as their text, which the
/// date directives understand.
fn toml_value(value: toml::Value) -> Value {
	match value {
		toml::Value::String(s) => Value::String(s),
		toml::Value::Integer(i) => Value::from(i),
		toml::Value::Float(f) => Value::Number(f),
		toml::Value::Boolean(b) => Value::Bool(b),
		toml::Value::Datetime(dt) => Value::String(dt.to_string()),
		toml::Value::Array(items) => Value::List(items.into_iter().map(toml_value).collect()),
		toml::Value::Table(table) => {
			let mut object = Object::new();
			for (key, value) in table {
				object.insert(key, toml_value(value));
			}
			Value::Object(object)
		}
	}
}

/// Top-level nodes become fields. A name used more than once collects its
/// nodes into a list, so repeated `item` nodes can drive a `for` loop.
fn kdl_document(doc: &kdl::KdlDocument) -> Object {
	let mut groups: Vec<(&str, Vec<Value>)> = Vec::new();

	for node in doc.nodes() {
		let name = node.name().value();
		let value = kdl_node(node);
		match groups.iter_mut().find(|(existing, _)| *existing == name) {
			Some((_, values)) => values.push(value),
			None => groups.push((name, vec![value])),
		}
	}

	let mut object = Object::new();
	for (name, mut values) in groups {
		let value = if values.len() == 1 {
			values.remove(0)
		} else {
			Value::List(values)
		};
		object.insert(name, value);
	}

	object
}

/// - children and properties become an object
/// - a bare node such as `paid` is a `true` flag
/// - one argument is that value, several are a list
fn kdl_node(node: &kdl::KdlNode) -> Value {
	let mut fields = node.children().map(kdl_document).unwrap_or_default();
	let mut arguments = Vec::new();

	for entry in node.entries() {
		match entry.name() {
			Some(name) => fields.insert(name.value(), kdl_scalar(entry.value())),
			None => arguments.push(kdl_scalar(entry.value())),
		}
	}

	if !fields.is_empty() {
		match arguments.len() {
			0 => {}
			1 => fields.insert("value", arguments.remove(0)),
			_ => fields.insert("values", Value::List(arguments)),
		}
		return Value::Object(fields);
	}

	match arguments.len() {
		0 => Value::Bool(true),
		1 => arguments.remove(0),
		_ => Value::List(arguments),
	}
}

fn kdl_scalar(value: &kdl::KdlValue) -> Value {
	match value {
		kdl::KdlValue::String(s) => Value::String(s.clone()),
		kdl::KdlValue::Integer(i) => Value::Number(*i as f64),
		kdl::KdlValue::Float(f) => Value::Number(*f),
		kdl::KdlValue::Bool(b) => Value::Bool(*b),
		kdl::KdlValue::Null => Value::Null,
	}
}
