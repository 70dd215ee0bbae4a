use crate::app::command_support::{map_migration_err, parse_run_id, CommandEnv};
use crate::migration::{
    DriverOptions, MigrationError, NewRun, Notifier, Run, RunController, RunDriver, RunEvent,
    RunEventKind, RunHandle, RunProgress, RunStatus, StepRecord, Subscription,
};
use crate::shared::ids::{ProfileId, RunId};
use crate::shared::time::{format_optional_timestamp, format_timestamp, now_secs};
use std::io::BufRead;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::Duration;

const CONTROL_POLL_INTERVAL: Duration = Duration::from_millis(50);
const PROGRESS_PRINT_STRIDE: u8 = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct RunArgs {
    pub profile: ProfileId,
    pub site_url: Option<String>,
    pub time_scale: Option<f64>,
}

pub fn parse_run_args(args: &[String]) -> Result<RunArgs, String> {
    const USAGE: &str = "usage: run <profile> [--site <url>] [--time-scale <f>]";
    let Some(profile) = args.first() else {
        return Err(USAGE.to_string());
    };
    let profile = ProfileId::parse(profile)?;
    let mut site_url = None;
    let mut time_scale = None;

    let mut idx = 1;
    while idx < args.len() {
        let value = args.get(idx + 1).ok_or_else(|| USAGE.to_string())?;
        match args[idx].as_str() {
            "--site" => {
                let trimmed = value.trim();
                if trimmed.is_empty() {
                    return Err("--site must be non-empty".to_string());
                }
                site_url = Some(trimmed.to_string());
            }
            "--time-scale" => {
                let scale = value
                    .parse::<f64>()
                    .map_err(|_| format!("invalid --time-scale `{value}`"))?;
                if !scale.is_finite() || scale <= 0.0 {
                    return Err("--time-scale must be a positive number".to_string());
                }
                time_scale = Some(scale);
            }
            other => return Err(format!("unknown option `{other}`\n{USAGE}")),
        }
        idx += 2;
    }

    Ok(RunArgs {
        profile,
        site_url,
        time_scale,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    Pause,
    Resume,
    Cancel,
}

/// `Ok(None)` for blank input.
pub fn parse_control_command(line: &str) -> Result<Option<ControlCommand>, String> {
    match line.trim().to_ascii_lowercase().as_str() {
        "" => Ok(None),
        "pause" | "p" => Ok(Some(ControlCommand::Pause)),
        "resume" | "r" => Ok(Some(ControlCommand::Resume)),
        "cancel" | "c" => Ok(Some(ControlCommand::Cancel)),
        other => Err(format!(
            "unknown control `{other}`; expected pause, resume or cancel"
        )),
    }
}

pub fn cmd_run(args: &[String]) -> Result<String, String> {
    let run_args = parse_run_args(args)?;
    let env = CommandEnv::load()?;
    env.context
        .catalog
        .steps(&run_args.profile)
        .map_err(map_migration_err)?;

    let mut options = env.settings.driver_options();
    if let Some(scale) = run_args.time_scale {
        options.time_scale = scale;
    }

    let request = NewRun {
        profile: run_args.profile,
        site_url: run_args.site_url,
        run_id: None,
    };
    let mut controller =
        RunController::create(env.context.clone(), &env.identity(), request, now_secs())
            .map_err(map_migration_err)?;
    let run_id = controller.run().id.clone();
    println!("run created\nrun_id={run_id}");

    let _printer = print_events(&env.context.notifier, run_id.clone());
    controller.start(now_secs()).map_err(map_migration_err)?;
    let run = drive_foreground(controller, options, spawn_stdin_controls())?;
    finish_output(&env, &run)
}

pub fn cmd_resume(args: &[String]) -> Result<String, String> {
    if args.len() != 1 {
        return Err("usage: resume <run_id>".to_string());
    }
    let run_id = parse_run_id(&args[0])?;
    let env = CommandEnv::load()?;
    let _printer = print_events(&env.context.notifier, run_id.clone());
    let mut controller = RunController::recover(env.context.clone(), &run_id, now_secs())
        .map_err(map_migration_err)?;

    let now = now_secs();
    match controller.run().status {
        RunStatus::Created => controller.start(now).map_err(map_migration_err)?,
        RunStatus::Paused => controller.resume(now).map_err(map_migration_err)?,
        RunStatus::Running => {}
        status => return Err(format!("run `{run_id}` is already {status}")),
    }
    let run = drive_foreground(controller, env.settings.driver_options(), spawn_stdin_controls())?;
    finish_output(&env, &run)
}

pub fn cmd_status(args: &[String]) -> Result<String, String> {
    if args.len() != 1 {
        return Err("usage: status <run_id>".to_string());
    }
    let run_id = parse_run_id(&args[0])?;
    let env = CommandEnv::load()?;
    let (run, steps) = load_run_with_steps(&env, &run_id)?;
    Ok(render_status(&run, &steps))
}

pub fn cmd_runs(args: &[String]) -> Result<String, String> {
    if !args.is_empty() {
        return Err("usage: runs".to_string());
    }
    let env = CommandEnv::load()?;
    let runs = env.store().list_runs().map_err(|e| e.to_string())?;
    if runs.is_empty() {
        return Ok("no runs".to_string());
    }
    Ok(runs
        .iter()
        .map(|run| {
            format!(
                "{} profile={} status={} created_at={}",
                run.id,
                run.profile,
                run.status,
                format_timestamp(run.created_at)
            )
        })
        .collect::<Vec<_>>()
        .join("\n"))
}

pub fn cmd_delete(args: &[String]) -> Result<String, String> {
    if args.len() != 1 {
        return Err("usage: delete <run_id>".to_string());
    }
    let run_id = parse_run_id(&args[0])?;
    let env = CommandEnv::load()?;
    let deleted = env.store().delete_run(&run_id).map_err(|e| e.to_string())?;
    if !deleted {
        return Err(map_migration_err(MigrationError::UnknownRun {
            run_id: run_id.to_string(),
        }));
    }
    if let Some(logger) = &env.context.logger {
        logger.info("run.deleted", Some(run_id.as_str()), "run and step records removed");
    }
    Ok(format!("run deleted\nrun_id={run_id}"))
}

/// Drives `controller` on its own thread and applies `commands` until the run
/// stops. When the command source closes while the run is paused, the driver
/// is shut down and the run stays paused in the store.
pub fn drive_foreground(
    controller: RunController,
    options: DriverOptions,
    commands: Receiver<ControlCommand>,
) -> Result<Run, String> {
    let handle = RunDriver::spawn(controller, options);
    let mut commands_open = true;
    while !handle.is_finished() {
        if !commands_open {
            if handle.snapshot().0.status == RunStatus::Paused {
                handle.shutdown();
                break;
            }
            thread::sleep(CONTROL_POLL_INTERVAL);
            continue;
        }
        match commands.recv_timeout(CONTROL_POLL_INTERVAL) {
            Ok(command) => {
                if let Err(err) = apply_control(&handle, command) {
                    eprintln!("{err}");
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => commands_open = false,
        }
    }
    handle.wait().map_err(map_migration_err)
}

fn apply_control(handle: &RunHandle, command: ControlCommand) -> Result<(), MigrationError> {
    match command {
        ControlCommand::Pause => handle.pause(),
        ControlCommand::Resume => handle.resume(),
        ControlCommand::Cancel => handle.cancel(),
    }
}

fn spawn_stdin_controls() -> Receiver<ControlCommand> {
    let (sender, receiver) = mpsc::channel();
    thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else {
                break;
            };
            match parse_control_command(&line) {
                Ok(Some(command)) => {
                    if sender.send(command).is_err() {
                        break;
                    }
                }
                Ok(None) => {}
                Err(err) => eprintln!("{err}"),
            }
        }
    });
    receiver
}

fn print_events(notifier: &Notifier, run_id: RunId) -> Subscription {
    notifier.subscribe_run(run_id, |event| {
        if let Some(line) = format_event(event) {
            println!("{line}");
        }
    })
}

/// One display line per event. Progress is reported every 10%.
pub fn format_event(event: &RunEvent) -> Option<String> {
    match (event.kind, event.step.as_ref()) {
        (RunEventKind::RunStatusChanged, _) => Some(format!(
            "run={} status={}",
            event.run.id, event.run.status
        )),
        (RunEventKind::StepStatusChanged, Some(step)) => {
            let mut line = format!(
                "run={} step={} name=\"{}\" status={} progress={}%",
                event.run.id, step.order, step.step_name, step.status, step.progress
            );
            if let Some(reason) = &step.failure_reason {
                line.push_str(&format!(" reason=\"{reason}\""));
            }
            Some(line)
        }
        (RunEventKind::StepProgressed, Some(step))
            if step.progress % PROGRESS_PRINT_STRIDE == 0 =>
        {
            Some(format!(
                "run={} step={} progress={}%",
                event.run.id, step.order, step.progress
            ))
        }
        _ => None,
    }
}

pub fn render_status(run: &Run, steps: &[StepRecord]) -> String {
    let progress = RunProgress::from_records(run, steps);
    let mut lines = vec![
        format!("run_id={}", run.id),
        format!("profile={}", run.profile),
        format!("status={}", run.status),
        format!("owner={}", run.owner_id),
        format!("site={}", run.site_url.as_deref().unwrap_or("-")),
        format!("created_at={}", format_timestamp(run.created_at)),
        format!("updated_at={}", format_timestamp(run.updated_at)),
        format!(
            "completed_at={}",
            format_optional_timestamp(run.completed_at)
        ),
        format!("progress={}%", progress.overall_percent),
        format!("summary={}", progress.summary),
    ];
    if !steps.is_empty() {
        lines.push("steps:".to_string());
    }
    for step in steps {
        lines.push(format!(
            "  {}. {} status={} progress={}% started={} ended={}",
            step.order,
            step.step_name,
            step.status,
            step.progress,
            format_optional_timestamp(step.started_at),
            format_optional_timestamp(step.ended_at)
        ));
        if let Some(reason) = &step.failure_reason {
            lines.push(format!("     failure={reason}"));
        }
    }
    lines.join("\n")
}

fn load_run_with_steps(env: &CommandEnv, run_id: &RunId) -> Result<(Run, Vec<StepRecord>), String> {
    let run = env
        .store()
        .load_run(run_id)
        .map_err(|e| e.to_string())?
        .ok_or_else(|| {
            map_migration_err(MigrationError::UnknownRun {
                run_id: run_id.to_string(),
            })
        })?;
    let steps = env.store().load_steps(run_id).map_err(|e| e.to_string())?;
    Ok((run, steps))
}

fn finish_output(env: &CommandEnv, run: &Run) -> Result<String, String> {
    let (run, steps) = load_run_with_steps(env, &run.id)?;
    Ok(render_status(&run, &steps))
}
