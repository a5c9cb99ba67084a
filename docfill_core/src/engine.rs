use std::collections::HashMap;
use std::fmt;

use regex::Captures;
use regex::RegexBuilder;

use crate::DocfillError;
use crate::DocfillResult;
use crate::EngineConfig;
use crate::IssueKind;
use crate::Object;
use crate::RenderIssue;
use crate::Value;
use crate::Values;
use crate::directives::DirectiveRegistry;
use crate::directives::unquote;
use crate::expression;
use crate::import::FsLoader;
use crate::import::TemplateLoader;
use crate::import::resolve_import;
use crate::path;
use crate::pipeline::Pipeline;
use crate::scanner::Placeholder;
use crate::scanner::PlaceholderKind;
use crate::scanner::Placeholders;
use crate::scanner::Tag;
use crate::scanner::scan;
use crate::scanner::split_keyword;
use crate::scanner::tags;
use crate::scope::Env;
use crate::scope::Lookup;
use crate::scope::Scope;

/// Snapshot of the most recent top-level render.
#[derive(Debug, Clone, PartialEq)]
pub struct Resources {
	/// Each resolved placeholder and the text that replaced it.
	pub final_map: Vec<(String, String)>,
	pub placeholders: Placeholders,
	pub values: Values,
	pub raw: String,
}

/// Renders templates. Configuration, registered directives, collected issues
/// and `set` variables live on the engine, so use one engine per concurrent
/// render.
///
/// ```
/// use docfill_core::Engine;
/// use docfill_core::Values;
///
/// let mut engine = Engine::new();
/// let values = Values::new().with("who", "world");
/// let output = engine.render("Hello {{ who }}!", &values).unwrap();
/// assert_eq!(output, "Hello world!");
/// ```
pub struct Engine {
	config: EngineConfig,
	registry: DirectiveRegistry,
	loader: Box<dyn TemplateLoader>,
	errors: Vec<RenderIssue>,
	globals: Scope,
	resources: Option<Resources>,
}

impl Default for Engine {
	fn default() -> Self {
		Self::new()
	}
}

impl fmt::Debug for Engine {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Engine")
			.field("config", &self.config)
			.field("registry", &self.registry)
			.field("errors", &self.errors)
			.field("globals", &self.globals)
			.finish_non_exhaustive()
	}
}

impl Engine {
	pub fn new() -> Self {
		Self::with_config(EngineConfig::default())
	}

	pub fn with_config(config: EngineConfig) -> Self {
		Self {
			config,
			registry: DirectiveRegistry::new(),
			loader: Box::new(FsLoader),
			errors: Vec::new(),
			globals: Scope::new(),
			resources: None,
		}
	}

	pub fn config(&self) -> &EngineConfig {
		&self.config
	}

	pub fn config_mut(&mut self) -> &mut EngineConfig {
		&mut self.config
	}

	/// Replace the file system loader used for `import`.
	pub fn set_loader(&mut self, loader: impl TemplateLoader + 'static) {
		self.loader = Box::new(loader);
	}

	/// Register a directive. It receives the threaded value and the raw
	/// argument text. Returns `false` when a built-in of the same name will
	/// shadow it.
	pub fn register_directive<F>(&mut self, name: impl Into<String>, directive: F) -> bool
	where
		F: Fn(&Value, &str) -> Value + 'static,
	{
		self.registry.register(name, directive)
	}

	/// Render `text`, starting with no `set` variables.
	pub fn render(&mut self, text: &str, values: &Values) -> DocfillResult<String> {
		self.globals.clear();
		self.render_keeping_globals(text, values)
	}

	/// Render `text` while keeping the `set` variables left by the previous
	/// render.
	pub fn render_keeping_globals(&mut self, text: &str, values: &Values) -> DocfillResult<String> {
		let scope = Scope::from_values(values);
		let mut renderer = Renderer {
			config: &self.config,
			registry: &self.registry,
			loader: self.loader.as_ref(),
			values: &scope,
			globals: &mut self.globals,
			issues: &mut self.errors,
		};

		let rendered = renderer.render(text, &Scope::new(), 0)?;

		self.resources = Some(Resources {
			final_map: rendered.replacements,
			placeholders: rendered.placeholders,
			values: values.clone(),
			raw: text.to_string(),
		});

		Ok(rendered.output)
	}

	/// Find the placeholders in `text` without rendering it.
	pub fn placeholders(&self, text: &str) -> Placeholders {
		scan(text)
	}

	/// Issues collected since the last [`Engine::clear_errors`].
	pub fn errors(&self) -> &[RenderIssue] {
		&self.errors
	}

	pub fn error_messages(&self) -> Vec<String> {
		self.errors.iter().map(ToString::to_string).collect()
	}

	pub fn clear_errors(&mut self) {
		self.errors.clear();
	}

	/// Variables assigned by `set` during the last render.
	pub fn globals(&self) -> &Scope {
		&self.globals
	}

	/// The snapshot of the last render. With `reset` the snapshot is taken
	/// out of the engine.
	pub fn resources(&mut self, reset: bool) -> Option<Resources> {
		if reset {
			self.resources.take()
		} else {
			self.resources.clone()
		}
	}
}

struct Rendered {
	output: String,
	replacements: Vec<(String, String)>,
	placeholders: Placeholders,
}

/// State threaded through one top-level render and all of its nested
/// renders.
struct Renderer<'e> {
	config: &'e EngineConfig,
	registry: &'e DirectiveRegistry,
	loader: &'e dyn TemplateLoader,
	values: &'e Scope,
	globals: &'e mut Scope,
	issues: &'e mut Vec<RenderIssue>,
}

impl Renderer<'_> {
	fn render(&mut self, text: &str, locals: &Scope, depth: usize) -> DocfillResult<Rendered> {
		if depth > self.config.max_depth {
			return Err(DocfillError::RecursionLimit {
				limit: self.config.max_depth,
			});
		}

		let placeholders = scan(text);
		let mut replacements = Vec::with_capacity(placeholders.len());

		for placeholder in placeholders.iter() {
			let resolved = match placeholder.kind {
				PlaceholderKind::Simple => self.render_simple(placeholder, locals),
				PlaceholderKind::Set => self.render_set(placeholder, locals),
				PlaceholderKind::If => self.render_if(placeholder, locals, depth)?,
				PlaceholderKind::For => self.render_for(placeholder, locals, depth)?,
				PlaceholderKind::Import => self.render_import(placeholder, locals, depth)?,
			};

			let replacement = resolved.or_else(|| {
				self.config
					.force_replace
					.replacement()
					.map(ToString::to_string)
			});

			if let Some(replacement) = replacement {
				replacements.push((placeholder.raw.clone(), replacement));
			}
		}

		Ok(Rendered {
			output: substitute(text, &replacements)?,
			replacements,
			placeholders,
		})
	}

	fn env<'a>(&'a self, locals: &'a Scope) -> Env<'a> {
		Env {
			locals,
			globals: &*self.globals,
			values: self.values,
		}
	}

	fn record(&mut self, issues: impl IntoIterator<Item = RenderIssue>) {
		for issue in issues {
			tracing::warn!(
				kind = %issue.kind,
				placeholder = %issue.placeholder,
				"{}",
				issue.message
			);
			if self.config.log_errors {
				self.issues.push(issue);
			}
		}
	}

	fn render_simple(&mut self, placeholder: &Placeholder, locals: &Scope) -> Option<String> {
		let mut issues = Vec::new();
		let pipeline = Pipeline {
			config: self.config,
			registry: self.registry,
			env: self.env(locals),
			values: self.values,
		};
		let value = pipeline.run(&placeholder.directive, &mut issues);
		self.record(issues);

		value.map(|value| value.to_string())
	}

	/// `set name = expression`. Always resolves to an empty string.
	fn render_set(&mut self, placeholder: &Placeholder, locals: &Scope) -> Option<String> {
		let (_, body) = split_keyword(&placeholder.directive);

		let Some((name, source)) = body
			.split_once('=')
			.map(|(name, source)| (name.trim(), source.trim()))
			.filter(|(name, _)| path::is_identifier(name))
		else {
			self.record([RenderIssue::new(
				IssueKind::ExpressionEvaluation,
				&placeholder.directive,
				"expected `set <name> = <expression>`",
			)]);
			return Some(String::new());
		};

		if !self.env(locals).contains_key(name) {
			self.globals.insert(name, Value::Null);
		}

		let result = expression::evaluate_assignment(source, &self.env(locals));
		match result {
			Ok(value) => {
				tracing::debug!(name, value = %value, "set variable");
				self.globals.insert(name, value);
			}
			Err(e) => {
				self.record([RenderIssue::new(
					IssueKind::ExpressionEvaluation,
					&placeholder.directive,
					e.to_string(),
				)]);
			}
		}

		Some(String::new())
	}

	fn render_if(
		&mut self,
		placeholder: &Placeholder,
		locals: &Scope,
		depth: usize,
	) -> DocfillResult<Option<String>> {
		let raw = &placeholder.raw;
		let boundaries: Vec<Tag> = tags(raw)
			.into_iter()
			.filter(|tag| matches!(tag.keyword.as_str(), "if" | "elseif" | "else" | "endif"))
			.collect();

		for pair in boundaries.windows(2) {
			let (tag, next) = (&pair[0], &pair[1]);
			let is_match = match tag.keyword.as_str() {
				"else" => true,
				"endif" => break,
				_ => {
					let result = expression::evaluate_condition(&tag.rest, &self.env(locals));
					match result {
						Ok(is_match) => is_match,
						Err(e) => {
							self.record([RenderIssue::new(
								IssueKind::ExpressionEvaluation,
								&placeholder.directive,
								format!("condition `{}` failed: {e}", tag.rest),
							)]);
							return Ok(None);
						}
					}
				}
			};

			if is_match {
				let body = &raw[tag.end..next.start];
				return Ok(Some(self.render(body, locals, depth + 1)?.output));
			}
		}

		Ok(Some(String::new()))
	}

	fn render_for(
		&mut self,
		placeholder: &Placeholder,
		locals: &Scope,
		depth: usize,
	) -> DocfillResult<Option<String>> {
		let (_, body) = split_keyword(&placeholder.directive);
		let Some((item_name, list_name)) = parse_loop_header(body) else {
			self.record([RenderIssue::new(
				IssueKind::ExpressionEvaluation,
				&placeholder.directive,
				"expected `for <item> in <list>`",
			)]);
			return Ok(None);
		};

		let raw = &placeholder.raw;
		let boundaries: Vec<Tag> = tags(raw)
			.into_iter()
			.filter(|tag| matches!(tag.keyword.as_str(), "for" | "elsefor" | "endfor"))
			.collect();
		let (Some(open), Some(next)) = (boundaries.first(), boundaries.get(1)) else {
			return Ok(None);
		};
		let loop_body = &raw[open.end..next.start];
		let else_body = match (next.keyword.as_str(), boundaries.get(2)) {
			("elsefor", Some(end)) => Some(&raw[next.end..end.start]),
			_ => None,
		};

		let items: Vec<Value> = match path::resolve(list_name, &self.env(locals)) {
			Some(Value::List(items)) => items.clone(),
			Some(Value::Object(object)) => object.fields().map(|(_, v)| v.clone()).collect(),
			_ => Vec::new(),
		};

		if items.is_empty() {
			return match else_body {
				Some(body) => Ok(Some(self.render(body, locals, depth + 1)?.output)),
				None => Ok(Some(String::new())),
			};
		}

		let length = items.len();
		let mut outputs = Vec::with_capacity(length);

		for (index, item) in items.into_iter().enumerate() {
			let mut scope = locals.clone();
			scope.insert(item_name, item);
			scope.insert(
				"loop",
				Object::new()
					.with("index", index + 1)
					.with("index0", index)
					.with("length", length)
					.with("first", index == 0)
					.with("last", index + 1 == length),
			);

			outputs.push(self.render(loop_body, &scope, depth + 1)?.output);
		}

		Ok(Some(outputs.join("\n").trim().to_string()))
	}

	fn render_import(
		&mut self,
		placeholder: &Placeholder,
		locals: &Scope,
		depth: usize,
	) -> DocfillResult<Option<String>> {
		let (_, body) = split_keyword(&placeholder.directive);
		let import = unquote(body.trim());

		let Some(root) = self.config.template_root.as_deref() else {
			return Err(DocfillError::MissingTemplateRoot {
				path: import.to_string(),
			});
		};

		let path = resolve_import(root, import)?;
		tracing::debug!(path = %path.display(), "importing template");
		let content = self.loader.load(root, &path)?;

		Ok(Some(self.render(&content, locals, depth + 1)?.output))
	}
}

/// `item in items`
fn parse_loop_header(body: &str) -> Option<(&str, &str)> {
	let mut words = body.split_whitespace();
	let item = words.next()?;
	let keyword = words.next()?;
	let list = words.next()?;

	(words.next().is_none()
		&& keyword.eq_ignore_ascii_case("in")
		&& path::is_identifier(item)
		&& (path::is_identifier(list) || path::is_dotted_path(list)))
	.then_some((item, list))
}

/// Upper bound on the compiled size of the substitution pattern.
const SUBSTITUTION_SIZE_LIMIT: usize = 256 * (1 << 20);

/// Replace every occurrence of each placeholder in a single pass so that
/// replacement text is never substituted again. Where two placeholders start
/// at the same offset the longer one wins.
fn substitute(text: &str, replacements: &[(String, String)]) -> DocfillResult<String> {
	if replacements.is_empty() {
		return Ok(text.to_string());
	}

	let mut lookup: HashMap<&str, &str> = HashMap::with_capacity(replacements.len());
	for (raw, replacement) in replacements {
		lookup.entry(raw.as_str()).or_insert(replacement.as_str());
	}

	let mut raws: Vec<&str> = lookup.keys().copied().collect();
	raws.sort_unstable_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

	let pattern = raws
		.iter()
		.map(|raw| regex::escape(raw))
		.collect::<Vec<_>>()
		.join("|");
	let matcher = RegexBuilder::new(&pattern)
		.size_limit(SUBSTITUTION_SIZE_LIMIT)
		.build()?;

	let output = matcher.replace_all(text, |captures: &Captures<'_>| {
		let raw = captures.get(0).map_or("", |found| found.as_str());
		lookup.get(raw).copied().unwrap_or(raw).to_string()
	});

	Ok(output.into_owned())
}

#[cfg(test)]
mod tests {
	use similar_asserts::assert_eq;

	use super::*;

	#[test]
	fn substitute_does_not_rescan_replacements() {
		let replacements = vec![
			("{{ a }}".to_string(), "{{ b }}".to_string()),
			("{{ b }}".to_string(), "B".to_string()),
		];
		assert_eq!(
			substitute("{{ a }} {{ b }}", &replacements).unwrap(),
			"{{ b }} B"
		);
	}

	#[test]
	fn substitute_prefers_the_longest_match() {
		let replacements = vec![
			("{{ a }}".to_string(), "short".to_string()),
			("{{ a }}!".to_string(), "long".to_string()),
			("{{ a }}".to_string(), "ignored".to_string()),
		];
		assert_eq!(
			substitute("{{ a }}! {{ a }}", &replacements).unwrap(),
			"long short"
		);
	}

	#[test]
	fn loop_header_requires_in() {
		assert_eq!(parse_loop_header("item in items"), Some(("item", "items")));
		assert_eq!(
			parse_loop_header("row IN invoice.rows"),
			Some(("row", "invoice.rows"))
		);
		assert_eq!(parse_loop_header("item items"), None);
		assert_eq!(parse_loop_header("item in items extra"), None);
	}
}
