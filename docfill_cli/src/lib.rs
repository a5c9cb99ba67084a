use std::path::PathBuf;

use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;

#[derive(Parser)]
#[command(
	author,
	version,
	about = "Fill document templates with data.",
	long_about = "docfill renders text templates such as invoice or contract HTML by filling \
	              `{{ ... }}` placeholders with values from data files.\n\nTemplates support \
	              directive pipelines (`{{ price | round(2) }}`), conditionals, loops, variable \
	              assignment, and sandboxed imports.\n\nQuick start:\n  docfill render \
	              invoice.html --data invoice.json\n  docfill check invoice.html expected.html \
	              --data invoice.json\n  docfill scan invoice.html"
)]
pub struct DocfillCli {
	#[command(subcommand)]
	pub command: Option<Commands>,

	/// Path to the project root used to discover `docfill.toml`.
	#[arg(long, short, global = true)]
	pub path: Option<PathBuf>,

	/// Enable verbose output.
	#[arg(long, short, global = true, default_value_t = false)]
	pub verbose: bool,

	/// Disable colored output.
	#[arg(long, global = true, default_value_t = false)]
	pub no_color: bool,
}

#[derive(Subcommand)]
pub enum Commands {
	/// Render a template and print the result.
	///
	/// Values come from the `[data]` table of `docfill.toml` and from every
	/// `--data` file, later files overriding earlier names. Unresolved
	/// placeholders and other non-fatal issues are reported as warnings.
	Render {
		/// The template file to render.
		template: PathBuf,

		#[command(flatten)]
		options: RenderOptions,

		/// Write the rendered output to this file instead of stdout.
		#[arg(long, short)]
		output: Option<PathBuf>,
	},
	/// Render a template and compare it with an expected output file.
	///
	/// Exits with a non-zero status code when the rendered output differs.
	/// Use `--diff` to see exactly what changed.
	Check {
		/// The template file to render.
		template: PathBuf,

		/// The file holding the expected output.
		expected: PathBuf,

		#[command(flatten)]
		options: RenderOptions,

		/// Show a unified diff between the expected and the rendered output.
		#[arg(long, default_value_t = false)]
		diff: bool,
	},
	/// List the placeholders found in a template.
	Scan {
		/// The template file to scan.
		template: PathBuf,

		/// Output format. Use `text` for human-readable output or `json` for
		/// programmatic consumption.
		#[arg(long, value_enum, default_value_t = OutputFormat::Text)]
		format: OutputFormat,
	},
}

/// Options shared by commands that render.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct RenderOptions {
	/// Data file whose top-level keys become template values. Can be given
	/// multiple times.
	#[arg(long, short)]
	pub data: Vec<PathBuf>,

	/// Directory that `import` placeholders must stay inside. Overrides
	/// `template_root` from `docfill.toml`.
	#[arg(long)]
	pub root: Option<PathBuf>,

	/// Replace unresolved placeholders with this text. Without a value they
	/// are removed.
	#[arg(long, num_args = 0..=1, default_missing_value = "")]
	pub force_replace: Option<String>,

	/// Separator between directive arguments.
	#[arg(long)]
	pub separator: Option<char>,
}

#[derive(Clone, Copy, Debug, Default, ValueEnum)]
pub enum OutputFormat {
	#[default]
	Text,
	Json,
}
