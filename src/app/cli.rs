#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CliVerb {
    Profiles,
    Run,
    Resume,
    Status,
    Runs,
    Delete,
    Help,
    Unknown,
}

pub fn parse_cli_verb(input: &str) -> CliVerb {
    match input {
        "profiles" => CliVerb::Profiles,
        "run" => CliVerb::Run,
        "resume" => CliVerb::Resume,
        "status" => CliVerb::Status,
        "runs" => CliVerb::Runs,
        "delete" => CliVerb::Delete,
        "help" | "--help" | "-h" => CliVerb::Help,
        _ => CliVerb::Unknown,
    }
}

pub fn cli_help_lines() -> Vec<String> {
    vec![
        "Commands:".to_string(),
        "  profiles                               List migration profiles and their steps"
            .to_string(),
        "  run <profile> [--site <url>] [--time-scale <f>]".to_string(),
        "                                         Create, start and drive a run in the foreground"
            .to_string(),
        "  resume <run_id>                        Recover a persisted run and drive it".to_string(),
        "  status <run_id>                        Show a run and its steps".to_string(),
        "  runs                                   List runs, newest first".to_string(),
        "  delete <run_id>                        Delete a run and its step records".to_string(),
        "  help                                   Show this help".to_string(),
        String::new(),
        "While a run is driven, type `pause`, `resume` or `cancel` and press enter.".to_string(),
    ]
}

pub(crate) fn help_text() -> String {
    cli_help_lines().join("\n")
}
