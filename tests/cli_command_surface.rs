use sitelift::app::command_handlers::profiles::render_catalog;
use sitelift::app::command_handlers::run_cli;
use sitelift::app::command_handlers::runs::{
    drive_foreground, format_event, parse_control_command, parse_run_args, ControlCommand,
};
use sitelift::config::CONFIG_ENV_VAR;
use sitelift::migration::{
    DriverOptions, FileRunStore, MemoryRunStore, NewRun, RetryPolicy, RunContext, RunController,
    RunEvent, RunEventKind, RunStatus, RunStore, SimulatedExecutor, StaticIdentity, StepCatalog,
    ACTOR_ENV_VAR,
};
use sitelift::shared::ids::{ActorId, ProfileId};
use std::fs;
use std::path::Path;
use std::sync::{mpsc, Arc, Mutex};
use tempfile::tempdir;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn args(raw: &[&str]) -> Vec<String> {
    raw.iter().map(|value| value.to_string()).collect()
}

fn write_config(dir: &Path, store: &str) {
    fs::write(
        dir.join("config.yaml"),
        format!(
            "state_root: {}\nstore: {store}\ntime_scale: 0.00001\nactor: cli-tester\n",
            dir.join("state").display()
        ),
    )
    .expect("write config");
}

fn with_config<T>(store: &str, body: impl FnOnce(&Path) -> T) -> T {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|err| err.into_inner());
    let temp = tempdir().expect("tempdir");
    write_config(temp.path(), store);
    let old_config = std::env::var_os(CONFIG_ENV_VAR);
    let old_actor = std::env::var_os(ACTOR_ENV_VAR);
    std::env::set_var(CONFIG_ENV_VAR, temp.path().join("config.yaml"));
    std::env::remove_var(ACTOR_ENV_VAR);

    let result = body(temp.path());

    match old_config {
        Some(value) => std::env::set_var(CONFIG_ENV_VAR, value),
        None => std::env::remove_var(CONFIG_ENV_VAR),
    }
    if let Some(value) = old_actor {
        std::env::set_var(ACTOR_ENV_VAR, value);
    }
    result
}

#[test]
fn help_and_unknown_commands() {
    let help = run_cli(Vec::new()).expect("help");
    assert!(help.contains("run <profile>"));
    assert_eq!(run_cli(args(&["help"])).expect("help"), help);
    let err = run_cli(args(&["migrate"])).expect_err("unknown command");
    assert_eq!(err, "unknown command `migrate`");
}

#[test]
fn run_args_parse_options() {
    let parsed = parse_run_args(&args(&[
        "static",
        "--site",
        "https://blog.example.com",
        "--time-scale",
        "0.5",
    ]))
    .expect("parse");
    assert_eq!(parsed.profile.as_str(), "static");
    assert_eq!(parsed.site_url.as_deref(), Some("https://blog.example.com"));
    assert_eq!(parsed.time_scale, Some(0.5));

    assert!(parse_run_args(&[]).is_err());
    assert!(parse_run_args(&args(&["static", "--site"])).is_err());
    assert!(parse_run_args(&args(&["static", "--time-scale", "0"])).is_err());
    assert!(parse_run_args(&args(&["static", "--force", "yes"])).is_err());
}

#[test]
fn control_commands_parse() {
    assert_eq!(
        parse_control_command(" Pause "),
        Ok(Some(ControlCommand::Pause))
    );
    assert_eq!(parse_control_command("r"), Ok(Some(ControlCommand::Resume)));
    assert_eq!(
        parse_control_command("cancel"),
        Ok(Some(ControlCommand::Cancel))
    );
    assert_eq!(parse_control_command(""), Ok(None));
    assert!(parse_control_command("stop").is_err());
}

#[test]
fn catalog_listing_shows_every_step() {
    let listing = render_catalog(&StepCatalog::builtin());
    assert!(listing.contains("profile=dynamic steps=6 estimated=42m"));
    assert!(listing.contains("profile=static steps=6 estimated=28m"));
    assert!(listing.contains("  2. Code Modernization (8m)"));
}

#[test]
fn progress_events_print_every_tenth_percent() {
    let store = Arc::new(MemoryRunStore::new());
    let context = RunContext::new(
        store,
        Arc::new(StepCatalog::builtin()),
        Arc::new(SimulatedExecutor),
    );
    let notifier = context.notifier.clone();
    let (_subscription, rx) = notifier.subscribe_channel();
    let mut controller = RunController::create(
        context,
        &StaticIdentity::new(ActorId::parse("alice").expect("actor")),
        NewRun::for_profile(ProfileId::parse("static").expect("profile")),
        1,
    )
    .expect("create");
    controller.start(1).expect("start");
    for now in 2..22 {
        controller.tick(now).expect("tick");
    }

    let events = rx.try_iter().collect::<Vec<RunEvent>>();
    let lines = events.iter().filter_map(format_event).collect::<Vec<_>>();
    let run_id = controller.run().id.to_string();
    assert_eq!(
        lines,
        vec![
            format!("run={run_id} status=running"),
            format!("run={run_id} step=1 name=\"Create Backup\" status=running progress=0%"),
            format!("run={run_id} step=1 progress=10%"),
            format!("run={run_id} step=1 progress=20%"),
        ]
    );
    assert!(events
        .iter()
        .any(|event| event.kind == RunEventKind::StepProgressed));
}

#[test]
fn foreground_driver_applies_control_commands() {
    let store = Arc::new(MemoryRunStore::new());
    let context = RunContext::new(
        Arc::clone(&store) as Arc<dyn RunStore>,
        Arc::new(StepCatalog::builtin()),
        Arc::new(SimulatedExecutor),
    )
    .with_retry(RetryPolicy::no_backoff(1));
    let mut controller = RunController::create(
        context,
        &StaticIdentity::new(ActorId::parse("alice").expect("actor")),
        NewRun::for_profile(ProfileId::parse("static").expect("profile")),
        1,
    )
    .expect("create");
    controller.start(1).expect("start");

    let (sender, receiver) = mpsc::channel();
    sender.send(ControlCommand::Pause).expect("send pause");
    sender.send(ControlCommand::Cancel).expect("send cancel");
    let run = drive_foreground(
        controller,
        DriverOptions {
            time_scale: 1.0,
            max_consecutive_failures: 1,
        },
        receiver,
    )
    .expect("drive");
    assert_eq!(run.status, RunStatus::Cancelled);
}

#[test]
fn closed_command_source_shuts_down_a_paused_run() {
    let store = Arc::new(MemoryRunStore::new());
    let context = RunContext::new(
        Arc::clone(&store) as Arc<dyn RunStore>,
        Arc::new(StepCatalog::builtin()),
        Arc::new(SimulatedExecutor),
    );
    let mut controller = RunController::create(
        context,
        &StaticIdentity::new(ActorId::parse("alice").expect("actor")),
        NewRun::for_profile(ProfileId::parse("static").expect("profile")),
        1,
    )
    .expect("create");
    controller.start(1).expect("start");

    let (sender, receiver) = mpsc::channel();
    sender.send(ControlCommand::Pause).expect("send pause");
    drop(sender);
    let run = drive_foreground(controller, DriverOptions::default(), receiver).expect("drive");
    assert_eq!(run.status, RunStatus::Paused);
    let stored = store.load_run(&run.id).expect("load").expect("run");
    assert_eq!(stored.status, RunStatus::Paused);
}

#[test]
fn status_runs_and_delete_read_the_configured_store() {
    with_config("file", |root| {
        assert_eq!(run_cli(args(&["runs"])).expect("runs"), "no runs");

        let store: Arc<dyn RunStore> = Arc::new(FileRunStore::new(root.join("state")));
        let context = RunContext::new(
            store,
            Arc::new(StepCatalog::builtin()),
            Arc::new(SimulatedExecutor),
        );
        let mut controller = RunController::create(
            context,
            &StaticIdentity::new(ActorId::parse("alice").expect("actor")),
            NewRun {
                profile: ProfileId::parse("dynamic").expect("profile"),
                site_url: Some("https://shop.example.com".to_string()),
                run_id: None,
            },
            1_700_000_000,
        )
        .expect("create");
        controller.start(1_700_000_001).expect("start");
        controller.pause(1_700_000_002).expect("pause");
        let run_id = controller.run().id.to_string();

        let listing = run_cli(args(&["runs"])).expect("runs");
        assert!(listing.starts_with(&run_id));
        assert!(listing.contains("profile=dynamic status=paused"));

        let status = run_cli(args(&["status", &run_id])).expect("status");
        assert!(status.contains("status=paused"));
        assert!(status.contains("site=https://shop.example.com"));
        assert!(status.contains("  1. Create Backup status=paused progress=0%"));
        assert!(status.contains("  6. SSL Certificate status=pending"));

        let deleted = run_cli(args(&["delete", &run_id])).expect("delete");
        assert!(deleted.contains(&format!("run_id={run_id}")));
        let err = run_cli(args(&["status", &run_id])).expect_err("deleted run");
        assert!(err.contains("not found"));
        assert!(run_cli(args(&["delete", &run_id])).is_err());
    });
}

#[test]
fn run_and_resume_drive_through_the_sqlite_store() {
    with_config("sqlite", |root| {
        let output = run_cli(args(&["run", "static", "--site", "https://a.example.com"]))
            .expect("run");
        assert!(output.contains("status=completed"));
        assert!(output.contains("owner=cli-tester"));
        assert!(root.join("state/sitelift.db").is_file());
        assert!(root.join("state/logs/sitelift.log").is_file());

        let run_id = output
            .lines()
            .find_map(|line| line.strip_prefix("run_id="))
            .expect("run id line")
            .to_string();
        let err = run_cli(args(&["resume", &run_id])).expect_err("completed run");
        assert!(err.contains("already completed"));

        let err = run_cli(args(&["run", "serverless"])).expect_err("unknown profile");
        assert!(err.contains("unknown migration profile"));
    });
}
