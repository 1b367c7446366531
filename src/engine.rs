//! Engine Driver (`spec.md` §4.6): the per-pipeline orchestration loop.
//! Owns the one [`JobTable`] for the shell session and ties the planner,
//! launcher, and job table together.

use crate::command::Pipeline;
use crate::jobs::{JobMember, JobTable};
use crate::launcher::{self, PipeSlots, StageOutcome};
use crate::planner;

/// What the REPL driver (`main.rs`) should do after a pipeline ran.
pub enum EngineOutcome {
    /// Keep reading commands; carry this exit status into `$?`.
    Continue(i32),
    /// `exit` was seen; the process should terminate with this code.
    Exit(i32),
}

pub struct Engine {
    jobs: JobTable,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        Engine { jobs: JobTable::new() }
    }

    #[cfg(test)]
    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    /// Run one parsed pipeline to completion (or, if backgrounded, to
    /// registration). `command_text` is the rendered source line, used for
    /// job notices. Steps follow `spec.md` §4.6:
    ///
    /// 1. Reap finished background jobs (non-blocking).
    /// 2. Handle `exit` as a pipeline of exactly one sentinel stage.
    /// 3. Plan the pipeline's real stages.
    /// 4. Launch each stage left to right, sharing one [`PipeSlots`].
    /// 5. If backgrounded, register every stage's trackable member (PID or
    ///    builtin worker handle) as a job and return immediately with
    ///    status 0.
    /// 6. Otherwise wait for every stage; the last stage's status is the
    ///    pipeline's exit status.
    pub fn run(&mut self, pipeline: &Pipeline, command_text: &str) -> EngineOutcome {
        self.jobs.poll();

        if let Some(exit_status) = exit_status_of(pipeline) {
            return EngineOutcome::Exit(exit_status);
        }

        if pipeline.is_empty() {
            return EngineOutcome::Continue(0);
        }

        let planned = planner::plan(pipeline);
        let mut slots = PipeSlots::new();
        let mut outcomes = Vec::with_capacity(planned.len());

        let background = pipeline.background();
        for stage in &planned {
            match launcher::launch(stage, &mut slots, &mut self.jobs, background) {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    eprintln!("quill: {e}");
                    outcomes.push(StageOutcome::Immediate(1));
                }
            }
        }

        if background {
            // Every `External` stage becomes a `Process`, and — because
            // `launcher::launch` was told this pipeline is backgrounded —
            // every `ChildBuiltin` stage becomes a `Worker` rather than
            // running inline, so a purely-builtin background pipeline
            // (`echo hi &`) still yields a trackable member instead of
            // silently completing before it can be registered. Only
            // `ParentBuiltin` stages (which always run synchronously,
            // per the `spec.md` §4.2 tie-break) contribute nothing here.
            let members: Vec<JobMember> = outcomes
                .into_iter()
                .filter_map(|outcome| match outcome {
                    StageOutcome::Process(child) => Some(JobMember::Pid(child.id() as i32)),
                    StageOutcome::Worker(handle) => Some(JobMember::Worker(handle)),
                    StageOutcome::Immediate(_) => None,
                })
                .collect();
            if !members.is_empty() {
                self.jobs.register(members, command_text.to_string());
            }
            return EngineOutcome::Continue(0);
        }

        let mut last_status = 0;
        for (stage, outcome) in planned.iter().zip(outcomes) {
            let status = match outcome {
                StageOutcome::Process(mut child) => match child.wait() {
                    Ok(status) => crate::status::exit_code(status),
                    Err(e) => {
                        eprintln!("quill: {e}");
                        1
                    }
                },
                StageOutcome::Worker(handle) => handle.join().unwrap_or(1),
                StageOutcome::Immediate(code) => code,
            };
            if stage.is_last {
                last_status = status;
            }
        }

        EngineOutcome::Continue(last_status)
    }
}

/// A pipeline is treated as an `exit` request only when its single real
/// stage is `Command::Exit` (`spec.md` §4.6 step 2) — `exit` never appears
/// mid-pipeline.
fn exit_status_of(pipeline: &Pipeline) -> Option<i32> {
    let mut real = pipeline.real_stages();
    let only = real.next()?;
    if real.next().is_some() {
        return None;
    }
    match &only.command {
        crate::command::Command::Exit(code) => Some(code.unwrap_or(0)),
        _ => None,
    }
}
