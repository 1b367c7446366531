use std::io::Write;
use std::process::{Command, Stdio};
use std::time::Duration;

fn run_shell(lines: &[&str]) -> std::process::Output {
    let mut child = Command::new(env!("CARGO_BIN_EXE_quill"))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn quill");

    {
        let stdin = child.stdin.as_mut().expect("stdin");
        for line in lines {
            writeln!(stdin, "{line}").expect("write line");
        }
        writeln!(stdin, "exit").expect("write exit");
    }

    child.wait_with_output().expect("wait output")
}

#[test]
fn echo_preserves_trailing_space_before_newline() {
    let output = run_shell(&["echo hello world"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("hello world \n"), "stdout was: {stdout:?}");
}

#[test]
fn pipe_forwards_bytes_between_stages() {
    let output = run_shell(&["echo foo | cat"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("foo \n"), "stdout was: {stdout:?}");
}

#[test]
fn redirection_truncates_then_append_adds_a_second_line() {
    let dir = tempfile::tempdir().expect("tempdir");
    let target = dir.path().join("out.txt");
    let target_str = target.to_string_lossy().to_string();

    run_shell(&[&format!("echo bar > {target_str}")]);
    let contents = std::fs::read_to_string(&target).unwrap();
    assert_eq!(contents, "bar \n");

    run_shell(&[&format!("echo bar >> {target_str}")]);
    let contents = std::fs::read_to_string(&target).unwrap();
    assert_eq!(contents, "bar \nbar \n");
}

#[cfg(unix)]
#[test]
fn background_job_reports_start_and_completion() {
    let mut child = Command::new(env!("CARGO_BIN_EXE_quill"))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn quill");

    {
        let stdin = child.stdin.as_mut().expect("stdin");
        writeln!(stdin, "sleep 1 &").unwrap();
        writeln!(stdin, "jobs").unwrap();
    }
    std::thread::sleep(Duration::from_millis(1500));
    {
        let stdin = child.stdin.as_mut().expect("stdin");
        writeln!(stdin, "echo done").unwrap();
        writeln!(stdin, "exit").unwrap();
    }

    let output = child.wait_with_output().expect("wait output");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Background job started: [1]"), "stdout was: {stdout:?}");
    assert!(stdout.contains("[1]\t"), "jobs listing missing: {stdout:?}");
    assert!(stdout.contains("Completed: \t[1]"), "stdout was: {stdout:?}");
    assert!(stdout.contains("done \n"), "stdout was: {stdout:?}");
}

#[test]
fn cd_then_pwd_reports_new_directory() {
    let output = run_shell(&["cd /tmp", "pwd"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let resolved = std::fs::canonicalize("/tmp").unwrap();
    assert!(stdout.contains(&resolved.to_string_lossy().to_string()), "stdout was: {stdout:?}");
}

#[test]
fn exit_terminates_the_repl_with_status_zero() {
    let output = run_shell(&[]);
    assert!(output.status.success());
}

#[test]
fn export_makes_a_variable_visible_to_children() {
    let output = run_shell(&["export GREETING hello", "sh -c 'echo $GREETING'"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("hello"), "stdout was: {stdout:?}");
}

#[test]
fn unresolved_program_reports_diagnostic_and_continues() {
    let output = run_shell(&["definitely-not-a-real-binary-xyz", "echo still-alive"]);
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stderr.contains("ERROR: Failed to execute program: definitely-not-a-real-binary-xyz"));
    assert!(stdout.contains("still-alive"));
}

#[test]
fn redirection_on_a_stage_overrides_its_pipe_input() {
    let dir = tempfile::tempdir().expect("tempdir");
    let target = dir.path().join("in.txt");
    std::fs::write(&target, "from file\n").unwrap();
    let target_str = target.to_string_lossy().to_string();

    // `cat` is piped `x` from `echo x`, but also redirected to read from a
    // file — the redirection must win, so `x` never appears on stdout.
    let output = run_shell(&[&format!("echo x | cat < {target_str}")]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("from file"), "stdout was: {stdout:?}");
    assert!(!stdout.contains('x'), "stdout was: {stdout:?}");
}

#[cfg(unix)]
#[test]
fn all_builtin_background_pipeline_is_still_tracked_and_completes() {
    let mut child = Command::new(env!("CARGO_BIN_EXE_quill"))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn quill");

    {
        let stdin = child.stdin.as_mut().expect("stdin");
        writeln!(stdin, "echo hi &").unwrap();
        writeln!(stdin, "jobs").unwrap();
    }
    std::thread::sleep(Duration::from_millis(300));
    {
        let stdin = child.stdin.as_mut().expect("stdin");
        writeln!(stdin, "echo next").unwrap();
        writeln!(stdin, "exit").unwrap();
    }

    let output = child.wait_with_output().expect("wait output");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Background job started: [1]"), "stdout was: {stdout:?}");
    assert!(stdout.contains("Completed: \t[1]"), "stdout was: {stdout:?}");
}
