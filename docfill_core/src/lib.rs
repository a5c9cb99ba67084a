//! `docfill_core` fills `{{ ... }}` placeholders in text documents such as
//! invoice or contract HTML. It substitutes supplied values, runs directive
//! pipelines, evaluates conditions, and expands loops, assignments, and
//! imports.
//!
//! ## Processing Pipeline
//!
//! ```text
//! template text
//!   → Scanner (finds placeholders, extends if/for spans to their closing tag)
//!   → Scope (normalizes supplied values into named bindings)
//!   → Engine (dispatches blocks, set, import; simple placeholders run the pipeline)
//!   → Pipeline (value lookup, dotted paths, chained directives)
//!   → substitution of every resolved placeholder
//! ```
//!
//! ## Syntax
//!
//! ```text
//! {{ customer.name | upper }}
//! {{ price | round(2;,;.) }}
//! {{ if total > 100 }}big{{ elseif total > 10 }}medium{{ else }}small{{ endif }}
//! {{ for item in items }}{{ loop.index }}. {{ item.name }}{{ elsefor }}none{{ endfor }}
//! {{ set total = total + item.price }}
//! {{ import partials/footer.html }}
//! ```
//!
//! ## Modules
//!
//! - [`config`]: engine settings loaded from `docfill.toml` and data files.
//! - [`directives`]: the built-in directive catalog and the registry for
//!   custom directives.
//! - [`expression`]: the safe expression language for `if` and `set`.
//! - [`scanner`]: placeholder discovery and classification.
//!
//! ## Quick Start
//!
//! ```rust
//! use docfill_core::Engine;
//! use docfill_core::Object;
//! use docfill_core::Values;
//!
//! let mut engine = Engine::new();
//! let values = Values::new()
//! 	.with("customer", Object::new().with("name", "Ada"))
//! 	.with("items", vec!["pen", "ink"]);
//!
//! let output = engine
//! 	.render(
//! 		"{{ customer.name | upper }}: {{ for i in items }}{{ i }}{{ endfor }}",
//! 		&values,
//! 	)
//! 	.unwrap();
//! assert_eq!(output, "ADA: pen\nink");
//! ```

pub use config::*;
pub use engine::*;
pub use error::*;
pub use import::*;
pub use scanner::Placeholder;
pub use scanner::PlaceholderKind;
pub use scanner::Placeholders;
pub use scope::Env;
pub use scope::Lookup;
pub use scope::Scope;
pub use value::*;

pub mod config;
pub mod directives;
mod engine;
#[allow(unused_assignments)]
mod error;
pub mod expression;
mod import;
pub(crate) mod lexer;
pub mod path;
mod pipeline;
pub mod scanner;
mod scope;
pub(crate) mod tokens;
mod value;
