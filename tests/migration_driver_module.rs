use sitelift::migration::{
    DriverOptions, MemoryRunStore, MigrationError, NewRun, RetryPolicy, RunContext,
    RunController, RunDriver, RunStatus, RunStore, SimulatedExecutor, StaticIdentity,
    StepCatalog, StepStatus, STATIC_PROFILE,
};
use sitelift::shared::ids::{ActorId, ProfileId};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn started_controller(store: Arc<MemoryRunStore>) -> RunController {
    let context = RunContext::new(
        store,
        Arc::new(StepCatalog::builtin()),
        Arc::new(SimulatedExecutor),
    )
    .with_retry(RetryPolicy::no_backoff(1));
    let mut controller = RunController::create(
        context,
        &StaticIdentity::new(ActorId::parse("alice").expect("actor")),
        NewRun::for_profile(ProfileId::parse(STATIC_PROFILE).expect("profile")),
        1,
    )
    .expect("create");
    controller.start(1).expect("start");
    controller
}

fn options(time_scale: f64) -> DriverOptions {
    DriverOptions {
        time_scale,
        max_consecutive_failures: 3,
    }
}

#[test]
fn driver_runs_to_completion() {
    let store = Arc::new(MemoryRunStore::new());
    let controller = started_controller(Arc::clone(&store));
    let run_id = controller.run().id.clone();

    let run = RunDriver::spawn(controller, options(0.000_1))
        .wait()
        .expect("driver result");
    assert_eq!(run.status, RunStatus::Completed);
    assert!(run.completed_at.is_some());

    let steps = store.load_steps(&run_id).expect("steps");
    assert!(steps
        .iter()
        .all(|step| step.status == StepStatus::Completed && step.progress == 100));
}

#[test]
fn paused_driver_holds_progress_until_resumed() {
    let controller = started_controller(Arc::new(MemoryRunStore::new()));
    let handle = RunDriver::spawn(controller, options(0.001));
    thread::sleep(Duration::from_millis(20));

    handle.pause().expect("pause");
    let (run, steps) = handle.snapshot();
    assert_eq!(run.status, RunStatus::Paused);
    let held = steps
        .iter()
        .find(|step| step.status == StepStatus::Paused)
        .map(|step| (step.order, step.progress))
        .expect("paused step");

    thread::sleep(Duration::from_millis(50));
    let (_, steps) = handle.snapshot();
    let still = steps
        .iter()
        .find(|step| step.status == StepStatus::Paused)
        .map(|step| (step.order, step.progress));
    assert_eq!(still, Some(held));
    assert!(!handle.is_finished());

    handle.resume().expect("resume");
    let run = handle.wait().expect("driver result");
    assert_eq!(run.status, RunStatus::Completed);
}

#[test]
fn cancel_ends_the_driver() {
    let controller = started_controller(Arc::new(MemoryRunStore::new()));
    let handle = RunDriver::spawn(controller, options(1.0));
    handle.cancel().expect("cancel");
    let run = handle.wait().expect("driver result");
    assert_eq!(run.status, RunStatus::Cancelled);
}

#[test]
fn control_errors_are_reported_to_the_caller() {
    let controller = started_controller(Arc::new(MemoryRunStore::new()));
    let handle = RunDriver::spawn(controller, options(1.0));
    assert!(matches!(
        handle.resume(),
        Err(MigrationError::InvalidState { .. })
    ));
    handle.cancel().expect("cancel");
    handle.wait().expect("driver result");
}

#[test]
fn shutdown_leaves_a_paused_run_paused() {
    let mut controller = started_controller(Arc::new(MemoryRunStore::new()));
    controller.pause(2).expect("pause");
    let handle = RunDriver::spawn(controller, options(1.0));
    handle.shutdown();
    let run = handle.wait().expect("driver result");
    assert_eq!(run.status, RunStatus::Paused);
}

#[test]
fn driver_gives_up_after_repeated_persistence_failures() {
    let store = Arc::new(MemoryRunStore::new());
    let controller = started_controller(Arc::clone(&store));
    store.fail_next_saves(1_000);

    let err = RunDriver::spawn(controller, options(0.000_1))
        .wait()
        .expect_err("persistence failure");
    assert!(matches!(err, MigrationError::Persistence { .. }));
}

#[test]
fn progress_snapshot_tracks_the_run() {
    let controller = started_controller(Arc::new(MemoryRunStore::new()));
    let handle = RunDriver::spawn(controller, options(1.0));
    let progress = handle.progress();
    assert_eq!(progress.status, RunStatus::Running);
    assert_eq!(progress.total_steps, 6);
    assert_eq!(progress.current_step.as_deref(), Some("Create Backup"));
    handle.cancel().expect("cancel");
    handle.wait().expect("driver result");
}
