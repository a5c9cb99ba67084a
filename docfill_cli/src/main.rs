use std::path::Path;
use std::path::PathBuf;
use std::process;

use clap::Parser;
use docfill_cli::Commands;
use docfill_cli::DocfillCli;
use docfill_cli::OutputFormat;
use docfill_cli::RenderOptions;
use docfill_core::Engine;
use docfill_core::EngineConfig;
use docfill_core::ForceReplace;
use docfill_core::Placeholders;
use docfill_core::RenderIssue;
use docfill_core::Values;
use docfill_core::load_data_file;
use owo_colors::OwoColorize;
use serde::Serialize;
use similar::ChangeTag;
use similar::TextDiff;
use tracing_subscriber::EnvFilter;

static USE_COLOR: std::sync::atomic::AtomicBool = std::sync::atomic::AtomicBool::new(true);

fn color_enabled() -> bool {
	USE_COLOR.load(std::sync::atomic::Ordering::Relaxed)
}

/// Apply ANSI color codes only when color is enabled.
macro_rules! colored {
	($text:expr,red) => {
		if color_enabled() {
			format!("{}", $text.red())
		} else {
			format!("{}", $text)
		}
	};
	($text:expr,green) => {
		if color_enabled() {
			format!("{}", $text.green())
		} else {
			format!("{}", $text)
		}
	};
	($text:expr,yellow) => {
		if color_enabled() {
			format!("{}", $text.yellow())
		} else {
			format!("{}", $text)
		}
	};
	($text:expr,bold) => {
		if color_enabled() {
			format!("{}", $text.bold())
		} else {
			format!("{}", $text)
		}
	};
}

fn main() {
	let args = DocfillCli::parse();

	// Respect NO_COLOR env var, --no-color flag, and terminals without color.
	let use_color = !args.no_color
		&& std::env::var_os("NO_COLOR").is_none()
		&& supports_color::on(supports_color::Stream::Stderr).is_some();
	if !use_color {
		USE_COLOR.store(false, std::sync::atomic::Ordering::Relaxed);
	}

	// Install miette's fancy handler for rich error diagnostics.
	miette::set_hook(Box::new(move |_| {
		Box::new(
			miette::MietteHandlerOpts::new()
				.color(use_color)
				.unicode(use_color)
				.build(),
		)
	}))
	.ok();

	init_tracing(args.verbose, use_color);

	let result = match &args.command {
		Some(Commands::Render {
			template,
			options,
			output,
		}) => run_render(&args, template, options, output.as_deref()),
		Some(Commands::Check {
			template,
			expected,
			options,
			diff,
		}) => run_check(&args, template, expected, options, *diff),
		Some(Commands::Scan { template, format }) => run_scan(template, *format),
		None => {
			eprintln!("No subcommand specified. Run `docfill --help` for usage.");
			process::exit(1);
		}
	};

	if let Err(e) = result {
		// Render through miette for rich diagnostics with help text and error
		// codes.
		match e.downcast::<docfill_core::DocfillError>() {
			Ok(docfill_err) => {
				let report: miette::Report = (*docfill_err).into();
				eprintln!("{report:?}");
			}
			Err(e) => {
				eprintln!("{} {e}", colored!("error:", red));
			}
		}
		process::exit(2);
	}
}

fn init_tracing(verbose: bool, use_color: bool) {
	let default_level = if verbose { "debug" } else { "error" };
	let filter =
		EnvFilter::try_from_env("DOCFILL_LOG").unwrap_or_else(|_| EnvFilter::new(default_level));

	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_writer(std::io::stderr)
		.with_ansi(use_color)
		.without_time()
		.init();
}

fn resolve_root(args: &DocfillCli) -> PathBuf {
	args.path
		.clone()
		.unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
}

/// Build the engine and the values for a render from `docfill.toml` and the
/// command-line overrides.
fn prepare(
	args: &DocfillCli,
	options: &RenderOptions,
) -> Result<(Engine, Values), Box<dyn std::error::Error>> {
	let root = resolve_root(args);
	let mut config = EngineConfig::load(&root)?.unwrap_or_default();
	let mut values = config.load_values(&root)?;

	for data in &options.data {
		tracing::debug!(path = %data.display(), "loading data file");
		for (key, value) in load_data_file(data)?.into_inner() {
			values.insert(key, value);
		}
	}

	if let Some(template_root) = &options.root {
		config.template_root = Some(template_root.clone());
	}

	if let Some(replacement) = &options.force_replace {
		config.force_replace = if replacement.is_empty() {
			ForceReplace::Bool(true)
		} else {
			ForceReplace::Text(replacement.clone())
		};
	}

	if let Some(separator) = options.separator {
		config.separator = separator;
	}

	if args.verbose {
		eprintln!(
			"{} {} value(s), template root: {}",
			colored!("Loaded", bold),
			values.len(),
			config
				.template_root
				.as_ref()
				.map_or_else(|| "none".to_string(), |root| root.display().to_string())
		);
	}

	Ok((Engine::with_config(config), values))
}

fn render_template(
	args: &DocfillCli,
	template: &Path,
	options: &RenderOptions,
) -> Result<String, Box<dyn std::error::Error>> {
	let (mut engine, values) = prepare(args, options)?;
	let text = std::fs::read_to_string(template)?;
	let output = engine.render(&text, &values)?;

	print_issues(engine.errors());

	Ok(output)
}

fn print_issues(issues: &[RenderIssue]) {
	for issue in issues {
		eprintln!("{} {issue}", colored!("warning:", yellow));
	}
}

fn run_render(
	args: &DocfillCli,
	template: &Path,
	options: &RenderOptions,
	output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
	let rendered = render_template(args, template, options)?;

	match output {
		Some(path) => {
			std::fs::write(path, &rendered)?;
			println!(
				"{} {} to {}",
				colored!("Rendered", green),
				template.display(),
				path.display()
			);
		}
		None => print!("{rendered}"),
	}

	Ok(())
}

fn run_check(
	args: &DocfillCli,
	template: &Path,
	expected: &Path,
	options: &RenderOptions,
	show_diff: bool,
) -> Result<(), Box<dyn std::error::Error>> {
	let rendered = render_template(args, template, options)?;
	let expected_text = std::fs::read_to_string(expected)?;

	if rendered == expected_text {
		println!("Check passed: output matches {}.", expected.display());
		return Ok(());
	}

	eprintln!(
		"{} rendered output of {} differs from {}",
		colored!("Check failed:", red),
		template.display(),
		expected.display()
	);

	if show_diff {
		print_diff(&expected_text, &rendered);
	} else {
		eprintln!("Run with `--diff` to see the changes.");
	}

	process::exit(1);
}

#[derive(Serialize)]
struct ScanReport<'a> {
	template: String,
	placeholders: &'a Placeholders,
}

fn run_scan(template: &Path, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
	let text = std::fs::read_to_string(template)?;
	let placeholders = Engine::new().placeholders(&text);

	match format {
		OutputFormat::Json => {
			let report = ScanReport {
				template: template.display().to_string(),
				placeholders: &placeholders,
			};
			println!("{}", serde_json::to_string_pretty(&report)?);
		}
		OutputFormat::Text => {
			if placeholders.is_empty() {
				println!("No placeholders found in {}.", template.display());
				return Ok(());
			}

			println!("{}", colored!(template.display().to_string(), bold));
			for placeholder in placeholders.iter() {
				println!(
					"  {:>6}  {:<6}  {}",
					placeholder.offset,
					placeholder.kind.to_string(),
					placeholder.directive
				);
			}
			println!();
			println!("{} placeholder(s) found.", placeholders.len());
		}
	}

	Ok(())
}

fn print_diff(expected: &str, rendered: &str) {
	let diff = TextDiff::from_lines(expected, rendered);
	for change in diff.iter_all_changes() {
		match change.tag() {
			ChangeTag::Delete => {
				eprint!("  {}", colored!(format!("-{change}"), red));
			}
			ChangeTag::Insert => {
				eprint!("  {}", colored!(format!("+{change}"), green));
			}
			ChangeTag::Equal => {
				eprint!("   {change}");
			}
		}
	}
	eprintln!();
}
