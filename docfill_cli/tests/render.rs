mod common;

use docfill_core::AnyEmptyResult;
use predicates::prelude::PredicateBooleanExt;

#[test]
fn render_fills_values_from_data_file() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	let template = tmp.path().join("invoice.html");
	let data = tmp.path().join("invoice.json");
	std::fs::write(
		&template,
		"<h1>{{ customer.name | upper }}</h1>\n<p>Total: {{ total | round(2) }}</p>\n",
	)?;
	std::fs::write(&data, r#"{"customer": {"name": "Ada"}, "total": 41.5}"#)?;

	common::docfill_cmd()
		.arg("render")
		.arg(&template)
		.arg("--data")
		.arg(&data)
		.assert()
		.success()
		.stdout("<h1>ADA</h1>\n<p>Total: 41.50</p>\n");

	Ok(())
}

#[test]
fn render_later_data_files_override_earlier_names() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	let template = tmp.path().join("note.txt");
	let first = tmp.path().join("first.json");
	let second = tmp.path().join("second.yaml");
	std::fs::write(&template, "{{ greeting }}, {{ name }}")?;
	std::fs::write(&first, r#"{"greeting": "Hello", "name": "Ada"}"#)?;
	std::fs::write(&second, "name: Grace\n")?;

	common::docfill_cmd()
		.arg("render")
		.arg(&template)
		.arg("-d")
		.arg(&first)
		.arg("-d")
		.arg(&second)
		.assert()
		.success()
		.stdout("Hello, Grace");

	Ok(())
}

#[test]
fn render_writes_output_file() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	let template = tmp.path().join("letter.txt");
	let data = tmp.path().join("letter.toml");
	let output = tmp.path().join("out.txt");
	std::fs::write(&template, "Dear {{ name }},")?;
	std::fs::write(&data, "name = \"Ada\"\n")?;

	common::docfill_cmd()
		.arg("render")
		.arg(&template)
		.arg("--data")
		.arg(&data)
		.arg("--output")
		.arg(&output)
		.assert()
		.success()
		.stdout(predicates::str::contains("Rendered"));

	let written = std::fs::read_to_string(&output)?;
	assert_eq!(written, "Dear Ada,");

	Ok(())
}

#[test]
fn render_warns_about_unresolved_placeholders() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	let template = tmp.path().join("note.txt");
	std::fs::write(&template, "Hi {{ missing }}!")?;

	common::docfill_cmd()
		.arg("render")
		.arg(&template)
		.assert()
		.success()
		.stdout("Hi {{ missing }}!")
		.stderr(predicates::str::contains(
			"warning: unresolved reference in `{{ missing }}`: no value named `missing`",
		));

	Ok(())
}

#[test]
fn render_force_replace_removes_unresolved_placeholders() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	let template = tmp.path().join("note.txt");
	std::fs::write(&template, "Hi {{ missing }}!")?;

	common::docfill_cmd()
		.arg("render")
		.arg(&template)
		.arg("--force-replace")
		.assert()
		.success()
		.stdout("Hi !");

	Ok(())
}

#[test]
fn render_force_replace_with_text() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	let template = tmp.path().join("note.txt");
	std::fs::write(&template, "Hi {{ missing }}!")?;

	common::docfill_cmd()
		.arg("render")
		.arg(&template)
		.arg("--force-replace=N/A")
		.assert()
		.success()
		.stdout("Hi N/A!");

	Ok(())
}

#[test]
fn render_custom_separator() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	let template = tmp.path().join("note.txt");
	let data = tmp.path().join("data.json");
	std::fs::write(&template, "{{ title | truncate(5,...) }}")?;
	std::fs::write(&data, r#"{"title": "Quarterly report"}"#)?;

	common::docfill_cmd()
		.arg("render")
		.arg(&template)
		.arg("--data")
		.arg(&data)
		.arg("--separator")
		.arg(",")
		.assert()
		.success()
		.stdout("Quart...");

	Ok(())
}

#[test]
fn render_imports_from_template_root() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	let partials = tmp.path().join("partials");
	std::fs::create_dir_all(&partials)?;
	std::fs::write(partials.join("footer.html"), "<footer>{{ company }}</footer>")?;
	let template = tmp.path().join("page.html");
	let data = tmp.path().join("data.json");
	std::fs::write(&template, "<main></main>{{ import partials/footer.html }}")?;
	std::fs::write(&data, r#"{"company": "Acme"}"#)?;

	common::docfill_cmd()
		.arg("render")
		.arg(&template)
		.arg("--data")
		.arg(&data)
		.arg("--root")
		.arg(tmp.path())
		.assert()
		.success()
		.stdout("<main></main><footer>Acme</footer>");

	Ok(())
}

#[test]
fn render_rejects_import_outside_template_root() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	let root = tmp.path().join("templates");
	std::fs::create_dir_all(&root)?;
	std::fs::write(tmp.path().join("secret.txt"), "secret")?;
	let template = root.join("page.html");
	std::fs::write(&template, "{{ import ../secret.txt }}")?;

	common::docfill_cmd()
		.arg("render")
		.arg(&template)
		.arg("--root")
		.arg(&root)
		.assert()
		.code(2)
		.stdout(predicates::str::contains("secret").not())
		.stderr(predicates::str::contains("outside of the template root"));

	Ok(())
}

#[test]
fn render_reads_config_from_project_path() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	std::fs::write(
		tmp.path().join("docfill.toml"),
		"force_replace = \"?\"\n\n[data]\ncustomer = \"data/customer.json\"\n",
	)?;
	std::fs::create_dir_all(tmp.path().join("data"))?;
	std::fs::write(
		tmp.path().join("data/customer.json"),
		r#"{"name": "Ada", "city": "London"}"#,
	)?;
	let template = tmp.path().join("card.txt");
	std::fs::write(&template, "{{ customer.name }} of {{ customer.city }} {{ nope }}")?;

	common::docfill_cmd()
		.arg("render")
		.arg(&template)
		.arg("--path")
		.arg(tmp.path())
		.assert()
		.success()
		.stdout("Ada of London ?");

	Ok(())
}

#[test]
fn render_reports_invalid_config() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	std::fs::write(tmp.path().join("docfill.toml"), "separator = [1, 2]\n")?;
	let template = tmp.path().join("card.txt");
	std::fs::write(&template, "plain")?;

	common::docfill_cmd()
		.arg("render")
		.arg(&template)
		.arg("--path")
		.arg(tmp.path())
		.assert()
		.code(2)
		.stderr(predicates::str::contains("failed to parse config file"));

	Ok(())
}

#[test]
fn render_verbose_reports_loaded_values() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	let template = tmp.path().join("note.txt");
	let data = tmp.path().join("data.json");
	std::fs::write(&template, "{{ a }}{{ b }}")?;
	std::fs::write(&data, r#"{"a": 1, "b": 2}"#)?;

	common::docfill_cmd()
		.arg("render")
		.arg(&template)
		.arg("--data")
		.arg(&data)
		.arg("--verbose")
		.assert()
		.success()
		.stdout("12")
		.stderr(predicates::str::contains("Loaded 2 value(s), template root: none"));

	Ok(())
}

#[test]
fn no_subcommand_prints_usage_hint() {
	common::docfill_cmd()
		.assert()
		.code(1)
		.stderr(predicates::str::contains("No subcommand specified"));
}
