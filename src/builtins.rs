//! Builtin Dispatcher (`spec.md` §4.4): two dispatch points, one for
//! commands that must mutate the shell's own state (`parent_run`) and one
//! for commands that only need to write to a redirected stream
//! (`child_run`).

use std::io::Write;

use crate::command::Command;
use crate::environment;
use crate::jobs::JobTable;

/// Commands that write to stdout and have no business touching shell
/// state. Run wherever redirection is wired up — a real child for
/// `External`, a worker in `crate::launcher` for these.
///
/// `jobs_snapshot` is a pre-captured `JobTable::list()` — `Jobs` only ever
/// reads the table, but by the time it may run on a worker thread
/// (`crate::launcher`) the table itself is no longer reachable there, so
/// the caller snapshots it up front.
pub fn child_run(
    command: &Command,
    jobs_snapshot: &[(usize, i32, String)],
    stdout: &mut dyn Write,
    stderr: &mut dyn Write,
) -> i32 {
    match command {
        Command::Echo(argv) => run_echo(argv, stdout),
        Command::Pwd => run_pwd(stdout, stderr),
        Command::Jobs => run_jobs(jobs_snapshot, stdout),
        other => {
            let _ = writeln!(stderr, "quill: not a child-capable builtin: {}", other.name());
            1
        }
    }
}

/// Commands that mutate shell state and so must run in the shell process
/// itself, never in a child.
pub fn parent_run(command: &Command, job_table: &mut JobTable) -> i32 {
    match command {
        Command::Export(name, value) => run_export(name, value),
        Command::Cd(path) => run_cd(path.as_deref()),
        Command::Kill(sig, job_id) => run_kill(*sig, *job_id, job_table),
        other => {
            eprintln!("quill: not a parent-only builtin: {}", other.name());
            1
        }
    }
}

/// Print each argument after the command name separated by a single space,
/// with a trailing space before the newline.
///
/// `spec.md` §9 documents this as a deliberate carry-over of the original
/// implementation's `printf("%s ", ...)` behaviour, preserved because the
/// end-to-end scenarios' expected output assumes it.
fn run_echo(argv: &[String], stdout: &mut dyn Write) -> i32 {
    for word in argv.iter().skip(1) {
        let _ = write!(stdout, "{word} ");
    }
    let _ = writeln!(stdout);
    let _ = stdout.flush();
    0
}

fn run_pwd(stdout: &mut dyn Write, stderr: &mut dyn Write) -> i32 {
    match environment::current_directory() {
        Ok(cwd) => {
            let _ = writeln!(stdout, "{cwd}");
            let _ = stdout.flush();
            0
        }
        Err(e) => {
            let _ = writeln!(stderr, "pwd: {e}");
            1
        }
    }
}

fn run_jobs(snapshot: &[(usize, i32, String)], stdout: &mut dyn Write) -> i32 {
    for (id, pid, text) in snapshot {
        let _ = writeln!(stdout, "[{id}]\t{pid}\t{text}");
    }
    let _ = stdout.flush();
    0
}

fn run_export(name: &str, value: &str) -> i32 {
    environment::env_set(name, value);
    0
}

/// `cd` resolves the target to an absolute path, chdirs, and records
/// `OLD_PWD`/`PWD`. On failure, leaves the CWD unchanged (`spec.md` §4.4).
fn run_cd(path: Option<&str>) -> i32 {
    let target = match path {
        Some(p) => p.to_string(),
        None => match environment::env_get("HOME") {
            Some(home) => home,
            None => {
                eprintln!("cd: HOME not set");
                return 1;
            }
        },
    };

    let old_cwd = match environment::current_directory() {
        Ok(cwd) => cwd,
        Err(e) => {
            eprintln!("cd: {e}");
            return 1;
        }
    };

    // Resolved absolute path, per spec.md §9's open-question resolution:
    // PWD must reflect the canonical path, not the user-supplied argument.
    let resolved = match std::fs::canonicalize(&target) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("cd: {target}: {e}");
            return 1;
        }
    };

    if let Err(e) = std::env::set_current_dir(&resolved) {
        eprintln!("cd: {}: {e}", resolved.display());
        return 1;
    }

    environment::env_set("OLD_PWD", &old_cwd);
    environment::env_set("PWD", &resolved.to_string_lossy());
    0
}

fn run_kill(sig: i32, job_id: usize, job_table: &mut JobTable) -> i32 {
    job_table.signal(job_id, sig);
    0
}
