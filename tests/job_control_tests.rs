// Background jobs, wait, kill and traps through the binary.

use std::process::{Command, Output};
use std::time::{Duration, Instant};

fn run_marsh(script: &str) -> Output {
    Command::new(env!("CARGO_BIN_EXE_marsh"))
        .arg("-c")
        .arg(script)
        .output()
        .expect("failed to execute marsh")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn test_background_and_wait_status() {
    let output =
        run_marsh("(sleep 0.1; exit 5) & pid=$!; echo started; wait $pid; echo \"status $?\"");
    assert_eq!(stdout(&output), "started\nstatus 5\n");
}

#[test]
fn test_background_runs_concurrently() {
    let start = Instant::now();
    let output = run_marsh("sleep 0.4 & sleep 0.4 & sleep 0.4 & wait");
    assert!(output.status.success());
    assert!(start.elapsed() < Duration::from_millis(1100));
}

#[test]
fn test_jobs_listing() {
    let output = run_marsh("sleep 5 & jobs; kill %1; wait %1; echo \"killed $?\"");
    let text = stdout(&output);
    assert!(text.starts_with("[1]+  Running"));
    assert!(text.contains("sleep 5 &"));
    assert!(text.ends_with("killed 143\n"));
}

#[test]
fn test_wait_unknown_pid() {
    let output = run_marsh("wait 999999; echo $?");
    assert_eq!(stdout(&output), "127\n");
}

#[test]
fn test_trap_on_signal_to_self() {
    let script = "trap 'echo caught TERM' TERM; kill -TERM $$; sleep 0.1; echo after";
    let output = run_marsh(script);
    assert_eq!(stdout(&output), "caught TERM\nafter\n");
    assert_eq!(output.status.code(), Some(0));
}

#[test]
fn test_ignored_signal() {
    let output = run_marsh("trap '' USR1; kill -USR1 $$; sleep 0.1; echo survived");
    assert_eq!(stdout(&output), "survived\n");
}

#[test]
fn test_trap_reset_and_listing() {
    let output = run_marsh("trap 'echo x' INT HUP; trap - HUP; trap");
    assert_eq!(stdout(&output), "trap -- 'echo x' INT\n");
}

#[test]
fn test_pipeline_stages_are_concurrent() {
    let output = run_marsh("yes | head -n 3");
    assert_eq!(stdout(&output), "y\ny\ny\n");
    assert!(output.status.success());
}

#[test]
fn test_pipestatus() {
    let output = run_marsh("true | (exit 3) | false; echo \"${PIPESTATUS[@]}\"");
    assert_eq!(stdout(&output), "0 3 1\n");
}
