//! Process Launcher (`spec.md` §4.3): wires up redirections/pipes for one
//! stage and starts it — a real child for `External`, a worker thread for
//! `ChildBuiltin` (see `SPEC_FULL.md` §4.3 for why a thread stands in for
//! `fork()` here), or a synchronous in-process call for `ParentBuiltin`.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::process::{Command as OsCommand, Stdio};
use std::thread::JoinHandle;

use os_pipe::{PipeReader, PipeWriter, pipe};

use crate::builtins;
use crate::command::{Command, Stage};
use crate::environment;
use crate::error::EngineError;
use crate::jobs::JobTable;
use crate::planner::{PlannedStage, StageKind};

/// The two reusable pipe slots of `spec.md` §3: stage `i` writes into slot
/// `i % 2` and the next stage reads from whatever was written there. Using
/// `(index + 1) % 2` rather than `(index - 1) % 2` to find the read slot
/// sidesteps `usize` underflow at `index == 0` — the two are equal mod 2.
#[derive(Default)]
pub struct PipeSlots {
    pending_read_ends: [Option<PipeReader>; 2],
}

impl PipeSlots {
    pub fn new() -> Self {
        PipeSlots::default()
    }

    fn open_write(&mut self, index: usize) -> io::Result<PipeWriter> {
        let (reader, writer) = pipe()?;
        self.pending_read_ends[index % 2] = Some(reader);
        Ok(writer)
    }

    fn take_read(&mut self, index: usize) -> Option<PipeReader> {
        self.pending_read_ends[(index + 1) % 2].take()
    }
}

/// What a launched stage turned into, for the engine driver to wait on.
pub enum StageOutcome {
    /// An external program, running as a real child process.
    Process(std::process::Child),
    /// A child-capable builtin that isn't the pipeline's last stage,
    /// running on a worker thread so the downstream stage (not yet
    /// spawned) has a pipe reader by the time it writes.
    Worker(JoinHandle<i32>),
    /// A builtin that already ran to completion synchronously — either a
    /// parent-only builtin (always), or a child-capable builtin that was
    /// the pipeline's last (or only) stage.
    Immediate(i32),
}

enum StdinSource {
    Inherit,
    Pipe(PipeReader),
    File(File),
}

enum StdoutSource {
    Inherit,
    Pipe(PipeWriter),
    File(File),
}

impl StdinSource {
    fn into_stdio(self) -> Stdio {
        match self {
            StdinSource::Inherit => Stdio::inherit(),
            StdinSource::Pipe(r) => Stdio::from(r),
            StdinSource::File(f) => Stdio::from(f),
        }
    }

    fn into_reader(self) -> Box<dyn Read + Send> {
        match self {
            StdinSource::Inherit => Box::new(io::stdin()),
            StdinSource::Pipe(r) => Box::new(r),
            StdinSource::File(f) => Box::new(f),
        }
    }
}

impl StdoutSource {
    fn into_stdio(self) -> Stdio {
        match self {
            StdoutSource::Inherit => Stdio::inherit(),
            StdoutSource::Pipe(w) => Stdio::from(w),
            StdoutSource::File(f) => Stdio::from(f),
        }
    }

    fn into_writer(self) -> Box<dyn Write + Send> {
        match self {
            StdoutSource::Inherit => Box::new(io::stdout()),
            StdoutSource::Pipe(w) => Box::new(w),
            StdoutSource::File(f) => Box::new(f),
        }
    }
}

/// Resolve this stage's stdin. `spec.md` §4.3 step c: the pipe end (if any)
/// is installed first, then the redirection (if any) is applied *on top of
/// it*, overriding it — matching `original_source/src/execute.c`'s dup2
/// order (pipe-in, pipe-out, then redirect-in, redirect-out). The pipe's
/// read end is still taken out of `slots` even when a redirection wins, so
/// slot bookkeeping for later stages stays correct; it is simply dropped,
/// closing that end.
fn resolve_stdin(stage: &Stage, index: usize, slots: &mut PipeSlots) -> Result<StdinSource, EngineError> {
    let piped = if stage.flags.pipe_in {
        Some(
            slots
                .take_read(index)
                .expect("planner guarantees a pipe_in stage has an upstream pipe_out writer"),
        )
    } else {
        None
    };

    if let Some(path) = &stage.redirect_in {
        let file = File::open(path).map_err(|e| EngineError::Redirect(format!("{path}: {e}")))?;
        drop(piped);
        return Ok(StdinSource::File(file));
    }
    if let Some(reader) = piped {
        return Ok(StdinSource::Pipe(reader));
    }
    Ok(StdinSource::Inherit)
}

/// Resolve this stage's stdout. Same override rule as `resolve_stdin`: the
/// pipe write end is opened first (so `slots` stays consistent for the
/// next stage), then a redirection, if present, overrides it as the
/// stage's actual stdout.
fn resolve_stdout(stage: &Stage, index: usize, slots: &mut PipeSlots) -> Result<StdoutSource, EngineError> {
    let piped = if stage.flags.pipe_out {
        Some(slots.open_write(index).map_err(EngineError::Pipe)?)
    } else {
        None
    };

    if let Some(path) = &stage.redirect_out {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(stage.append)
            .truncate(!stage.append)
            .open(path)
            .map_err(|e| EngineError::Redirect(format!("{path}: {e}")))?;
        drop(piped);
        return Ok(StdoutSource::File(file));
    }
    if let Some(writer) = piped {
        return Ok(StdoutSource::Pipe(writer));
    }
    Ok(StdoutSource::Inherit)
}

/// Launch one planned stage. See `spec.md` §4.3 for the full contract;
/// `SPEC_FULL.md` §4.3 for how each step maps onto `std::process::Command`
/// and worker threads instead of raw `fork`/`dup2`. `background` is the
/// enclosing pipeline's `spec.md` §3 `Background` flag — a child-capable
/// builtin that would otherwise run inline as the pipeline's last stage
/// instead runs on a worker thread when backgrounded, so it (a) doesn't
/// block the engine driver before the job can be registered and (b) leaves
/// a `JoinHandle` the job table can track (`crate::jobs`).
pub fn launch(
    planned: &PlannedStage,
    slots: &mut PipeSlots,
    job_table: &mut JobTable,
    background: bool,
) -> Result<StageOutcome, EngineError> {
    match planned.kind {
        StageKind::ParentBuiltin => launch_parent_builtin(planned, slots, job_table),
        StageKind::ChildBuiltin => launch_child_builtin(planned, slots, job_table, background),
        StageKind::External => launch_external(planned, slots),
        StageKind::Sentinel => unreachable!("planner never yields a Sentinel stage"),
    }
}

/// Tie-break from `spec.md` §4.2: a parent-only builtin with pipe flags is
/// still treated as a no-op producer/consumer — its pipe end is opened (to
/// keep slot bookkeeping consistent for the next stage) and then
/// immediately dropped, which closes it. Any redirection on such a stage is
/// a documented limitation: it is ignored, with a diagnostic.
fn launch_parent_builtin(
    planned: &PlannedStage,
    slots: &mut PipeSlots,
    job_table: &mut JobTable,
) -> Result<StageOutcome, EngineError> {
    let stage = planned.stage;

    if stage.flags.pipe_in {
        drop(slots.take_read(planned.index));
    }
    if stage.flags.pipe_out {
        drop(slots.open_write(planned.index).map_err(EngineError::Pipe)?);
    }
    if stage.redirect_in.is_some() || stage.redirect_out.is_some() {
        eprintln!(
            "quill: redirections on '{}' are ignored (parent-only builtin)",
            stage.command.name()
        );
    }

    let code = builtins::parent_run(&stage.command, job_table);
    Ok(StageOutcome::Immediate(code))
}

fn launch_child_builtin(
    planned: &PlannedStage,
    slots: &mut PipeSlots,
    job_table: &mut JobTable,
    background: bool,
) -> Result<StageOutcome, EngineError> {
    let stage = planned.stage;
    let stdin = resolve_stdin(stage, planned.index, slots)?;
    let stdout = resolve_stdout(stage, planned.index, slots)?;
    let jobs_snapshot = job_table.list();
    let command = stage.command.clone();

    if planned.is_last && !background {
        let mut reader = stdin.into_reader();
        let mut writer = stdout.into_writer();
        let mut stderr = io::stderr();
        let code = builtins::child_run(&command, &jobs_snapshot, writer.as_mut(), &mut stderr);
        let _ = reader.read(&mut []); // drain nothing; keeps the reader alive until after the write
        Ok(StageOutcome::Immediate(code))
    } else {
        // Either not the last stage (the downstream stage hasn't been
        // spawned yet, so running this synchronously could deadlock once
        // its output exceeds the pipe buffer) or the pipeline is
        // backgrounded (running it synchronously here would block the
        // engine driver before the job can be registered). A worker thread
        // mirrors how an external stage is already a concurrent OS process
        // either way.
        let handle = std::thread::spawn(move || {
            let mut reader = stdin.into_reader();
            let mut writer = stdout.into_writer();
            let mut stderr = io::stderr();
            let code = builtins::child_run(&command, &jobs_snapshot, writer.as_mut(), &mut stderr);
            let _ = reader.read(&mut []);
            let _ = writer.flush();
            code
        });
        Ok(StageOutcome::Worker(handle))
    }
}

fn launch_external(planned: &PlannedStage, slots: &mut PipeSlots) -> Result<StageOutcome, EngineError> {
    let stage = planned.stage;
    let Command::External(argv) = &stage.command else {
        unreachable!("planner classifies only Command::External as StageKind::External")
    };
    let program_name = argv.first().map(String::as_str).unwrap_or("");

    let Some(resolved) = environment::resolve_on_path(program_name) else {
        // Stdin/stdout sources are still resolved (and thus closed on
        // drop) even though nothing runs, so pipe topology stays correct.
        let _ = resolve_stdin(stage, planned.index, slots)?;
        let _ = resolve_stdout(stage, planned.index, slots)?;
        eprintln!("{}", EngineError::Resolve(program_name.to_string()));
        return Ok(StageOutcome::Immediate(1));
    };

    let stdin = resolve_stdin(stage, planned.index, slots)?;
    let stdout = resolve_stdout(stage, planned.index, slots)?;

    let mut command = OsCommand::new(&resolved);
    command.args(&argv[1..]);
    command.stdin(stdin.into_stdio());
    command.stdout(stdout.into_stdio());

    match command.spawn() {
        Ok(child) => Ok(StageOutcome::Process(child)),
        Err(e) => Err(EngineError::Spawn(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipe_slot_reuse_stays_within_two_open_pipes() {
        let mut slots = PipeSlots::new();
        slots.open_write(0).unwrap();
        assert!(slots.pending_read_ends[0].is_some());
        let reader = slots.take_read(1);
        assert!(reader.is_some());
        assert!(slots.pending_read_ends[0].is_none());
    }

    #[test]
    fn round_robin_slot_index_matches_spec_mod_arithmetic() {
        // Stage i writes slot i%2, stage i+1 reads (i+1-1)%2 == i%2.
        for i in 1usize..6 {
            assert_eq!((i - 1) % 2, (i + 1) % 2);
        }
    }

    #[test]
    fn redirect_in_overrides_pipe_in_when_both_are_set() {
        let dir = std::env::temp_dir().join(format!("quill-launcher-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("in.txt");
        std::fs::write(&path, b"from file").unwrap();

        let mut slots = PipeSlots::new();
        slots.open_write(0).unwrap(); // stage 0 would have piped into stage 1's slot

        let mut stage = Stage::new(Command::External(vec!["cat".into()]));
        stage.flags.pipe_in = true;
        stage.redirect_in = Some(path.to_string_lossy().into_owned());

        let resolved = resolve_stdin(&stage, 1, &mut slots).unwrap();
        assert!(matches!(resolved, StdinSource::File(_)));
        // The pipe's read end was still taken out of the slot (and dropped),
        // not left dangling for a later stage to pick up by mistake.
        assert!(slots.pending_read_ends[0].is_none());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn redirect_out_overrides_pipe_out_when_both_are_set() {
        let dir = std::env::temp_dir().join(format!("quill-launcher-test-out-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("out.txt");

        let mut slots = PipeSlots::new();
        let mut stage = Stage::new(Command::External(vec!["echo".into()]));
        stage.flags.pipe_out = true;
        stage.redirect_out = Some(path.to_string_lossy().into_owned());

        let resolved = resolve_stdout(&stage, 0, &mut slots).unwrap();
        assert!(matches!(resolved, StdoutSource::File(_)));
        // The pipe's write end was opened (so slot bookkeeping is intact)
        // but then dropped in favor of the file.
        assert!(slots.pending_read_ends[0].is_some());

        std::fs::remove_dir_all(&dir).ok();
    }
}
