use std::fmt;

use miette::Diagnostic;
use thiserror::Error;

/// Errors that abort a render. Everything else is collected as a
/// [`RenderIssue`] and the render carries on.
#[derive(Debug, Diagnostic, Error)]
#[non_exhaustive]
pub enum DocfillError {
	#[error(transparent)]
	#[diagnostic(code(docfill::io_error))]
	Io(#[from] std::io::Error),

	#[error("failed to parse config file: {0}")]
	#[diagnostic(
		code(docfill::config_parse),
		help("check that docfill.toml is valid TOML")
	)]
	ConfigParse(String),

	#[error("failed to load data file `{path}`: {reason}")]
	#[diagnostic(code(docfill::data_file))]
	DataFile { path: String, reason: String },

	#[error("unsupported data file format: `{0}`")]
	#[diagnostic(
		code(docfill::unsupported_format),
		help("supported formats: text, json, toml, yaml, yml, kdl, ini")
	)]
	UnsupportedDataFormat(String),

	#[error("cannot import `{path}`: no template root is configured")]
	#[diagnostic(
		code(docfill::missing_template_root),
		help("set `template_root` in docfill.toml or pass `--root`")
	)]
	MissingTemplateRoot { path: String },

	#[error("import `{path}` resolves outside of the template root `{root}`")]
	#[diagnostic(
		code(docfill::import_security_violation),
		help("imports must be relative paths that stay inside the template root")
	)]
	ImportSecurityViolation { path: String, root: String },

	#[error("import `{path}` was not found under the template root `{root}`")]
	#[diagnostic(code(docfill::import_not_found))]
	ImportNotFound { path: String, root: String },

	#[error("template nesting exceeded the maximum depth of {limit}")]
	#[diagnostic(
		code(docfill::recursion_limit),
		help("check for templates that import themselves or raise `max_depth`")
	)]
	RecursionLimit { limit: usize },

	#[error("too many distinct placeholders to substitute in one pass: {0}")]
	#[diagnostic(
		code(docfill::substitution),
		help("split the template into smaller templates joined with `import`")
	)]
	Substitution(#[from] regex::Error),
}

pub type DocfillResult<T> = Result<T, DocfillError>;
pub type AnyError = Box<dyn std::error::Error>;
pub type AnyEmptyResult = Result<(), AnyError>;
pub type AnyResult<T> = Result<T, AnyError>;

/// The kind of a non-fatal problem met while rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum IssueKind {
	/// The placeholder syntax was fine but no value could be found for it.
	UnresolvedReference,
	/// An `if` condition or `set` expression failed to parse or evaluate.
	ExpressionEvaluation,
	/// A pipeline named a directive that is neither built in nor registered.
	UnsupportedDirective,
}

impl fmt::Display for IssueKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::UnresolvedReference => write!(f, "unresolved reference"),
			Self::ExpressionEvaluation => write!(f, "expression evaluation error"),
			Self::UnsupportedDirective => write!(f, "unsupported directive"),
		}
	}
}

/// A non-fatal problem recorded during a render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderIssue {
	pub kind: IssueKind,
	/// The trimmed directive text of the placeholder that produced the issue.
	pub placeholder: String,
	pub message: String,
}

impl RenderIssue {
	pub fn new(kind: IssueKind, placeholder: impl Into<String>, message: impl Into<String>) -> Self {
		Self {
			kind,
			placeholder: placeholder.into(),
			message: message.into(),
		}
	}
}

impl fmt::Display for RenderIssue {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{} in `{{{{ {} }}}}`: {}", self.kind, self.placeholder, self.message)
	}
}
