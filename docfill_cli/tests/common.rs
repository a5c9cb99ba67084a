use assert_cmd::Command;
use insta_cmd::get_cargo_bin;

pub fn docfill_cmd() -> Command {
	let mut cmd = Command::new(get_cargo_bin("docfill"));
	cmd.env("NO_COLOR", "1");
	cmd.env_remove("DOCFILL_LOG");
	cmd
}
