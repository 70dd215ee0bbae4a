use crate::app::cli::{help_text, parse_cli_verb, CliVerb};

pub mod profiles;
pub mod runs;

pub fn run_cli(args: Vec<String>) -> Result<String, String> {
    if args.is_empty() {
        return Ok(help_text());
    }

    match parse_cli_verb(args[0].as_str()) {
        CliVerb::Profiles => profiles::cmd_profiles(&args[1..]),
        CliVerb::Run => runs::cmd_run(&args[1..]),
        CliVerb::Resume => runs::cmd_resume(&args[1..]),
        CliVerb::Status => runs::cmd_status(&args[1..]),
        CliVerb::Runs => runs::cmd_runs(&args[1..]),
        CliVerb::Delete => runs::cmd_delete(&args[1..]),
        CliVerb::Help => Ok(help_text()),
        CliVerb::Unknown => Err(format!("unknown command `{}`", args[0])),
    }
}
