//! Pipeline Planner (`spec.md` §4.2): classifies each stage of a pipeline
//! so the launcher knows whether it runs in the shell process or a child,
//! and whether its pipe end needs to be handled specially.

use crate::command::{Command, Pipeline, Stage};

/// What a stage is, for dispatch purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    /// `Export`, `Cd`, `Kill` — mutate shell state, must run in the parent.
    ParentBuiltin,
    /// `Echo`, `Pwd`, `Jobs` — write to stdout, run where redirection works
    /// uniformly (a real child for `External`, a worker thread for these).
    ChildBuiltin,
    /// Resolved via the Environment Facade and exec'd in a child.
    External,
    /// `Exit`, `End` — handled by the engine driver before planning, never
    /// reach the launcher.
    Sentinel,
}

pub fn classify(command: &Command) -> StageKind {
    match command {
        Command::Export(..) | Command::Cd(..) | Command::Kill(..) => StageKind::ParentBuiltin,
        Command::Echo(..) | Command::Pwd | Command::Jobs => StageKind::ChildBuiltin,
        Command::External(..) => StageKind::External,
        Command::Exit(..) | Command::End => StageKind::Sentinel,
    }
}

/// One stage annotated with its index in the pipeline and its kind.
#[derive(Debug)]
pub struct PlannedStage<'a> {
    pub index: usize,
    pub is_last: bool,
    pub stage: &'a Stage,
    pub kind: StageKind,
}

/// Walk a pipeline's real stages (up to the `End` sentinel), assigning each
/// an index and a [`StageKind`].
///
/// Tie-break (`spec.md` §4.2): a parent-only builtin stage with a pipe flag
/// or `background` set still classifies as `ParentBuiltin` — parent-only
/// semantics win. The launcher is responsible for closing that stage's pipe
/// end immediately (treating it as a no-op producer/consumer) and for
/// ignoring any redirections on it.
pub fn plan(pipeline: &Pipeline) -> Vec<PlannedStage<'_>> {
    let stages: Vec<&Stage> = pipeline.real_stages().collect();
    let n = stages.len();
    stages
        .into_iter()
        .enumerate()
        .map(|(index, stage)| PlannedStage {
            index,
            is_last: index + 1 == n,
            stage,
            kind: classify(&stage.command),
        })
        .collect()
}

/// True if a [`StageKind`] is expected to contribute a waitable handle
/// (a child process or a worker thread) to the engine driver.
pub fn runs_outside_parent(kind: StageKind) -> bool {
    matches!(kind, StageKind::ChildBuiltin | StageKind::External)
}
