mod common;

use docfill_core::AnyEmptyResult;

const TEMPLATE: &str = "{{ name | upper }} {{ if paid }}PAID{{ endif }} {{ set n = 1 }}";

#[test]
fn scan_lists_placeholders_as_text() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	let template = tmp.path().join("invoice.html");
	std::fs::write(&template, TEMPLATE)?;

	common::docfill_cmd()
		.arg("scan")
		.arg(&template)
		.assert()
		.success()
		.stdout(predicates::str::contains("simple"))
		.stdout(predicates::str::contains("name | upper"))
		.stdout(predicates::str::contains("if"))
		.stdout(predicates::str::contains("set n = 1"))
		.stdout(predicates::str::contains("3 placeholder(s) found."));

	Ok(())
}

#[test]
fn scan_reports_template_without_placeholders() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	let template = tmp.path().join("plain.txt");
	std::fs::write(&template, "nothing to fill")?;

	common::docfill_cmd()
		.arg("scan")
		.arg(&template)
		.assert()
		.success()
		.stdout(predicates::str::contains("No placeholders found"));

	Ok(())
}

#[test]
fn scan_json_output() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	let template = tmp.path().join("invoice.html");
	std::fs::write(&template, TEMPLATE)?;

	let output = common::docfill_cmd()
		.arg("scan")
		.arg(&template)
		.arg("--format")
		.arg("json")
		.output()?;

	assert!(output.status.success());
	let report: serde_json::Value = serde_json::from_slice(&output.stdout)?;
	let placeholders = report["placeholders"]
		.as_array()
		.ok_or("placeholders should be an array")?;

	assert_eq!(placeholders.len(), 3);
	assert_eq!(placeholders[0]["kind"], "simple");
	assert_eq!(placeholders[0]["directive"], "name | upper");
	assert_eq!(placeholders[1]["kind"], "if");
	assert_eq!(placeholders[1]["raw"], "{{ if paid }}PAID{{ endif }}");
	assert_eq!(placeholders[2]["kind"], "set");

	Ok(())
}
