//! Job Table (`spec.md` §4.5 / §3): tracks background pipelines and reaps
//! them non-blockingly.
//!
//! A job's members are tracked as raw PIDs rather than owned
//! `std::process::Child` handles, because `Job`'s `leader_pid` display
//! identity must survive that same process being reaped independently of
//! the others (`spec.md` §4.5). A `std::process::Child` dropped without
//! being waited on does not reap the process — it just stops being
//! trackable through `std`'s own API — so it is safe to let the `Child`
//! handle go once its PID has been copied out.
//!
//! A background pipeline's child-capable builtin stages (`Echo`/`Pwd`/
//! `Jobs`) never get a real PID — they run as a worker thread in the shell
//! process itself (`crate::launcher`) — so [`JobMember::Worker`] tracks
//! those by their `JoinHandle` instead, reaped via `is_finished`/`join`
//! rather than `waitpid`. This keeps an all-builtin background pipeline
//! (e.g. `echo hi &`) a trackable job like any other, instead of silently
//! vanishing.

use std::thread::JoinHandle;

use crate::status;

/// One spawned unit within a job: either a real child process or a worker
/// thread running a child-capable builtin.
pub enum JobMember {
    Pid(i32),
    Worker(JoinHandle<i32>),
}

/// A single tracked background job.
pub struct Job {
    pub id: usize,
    pub command_text: String,
    pub leader_pid: i32,
    members: Vec<JobMember>,
}

impl Job {
    pub fn is_done(&self) -> bool {
        self.members.is_empty()
    }
}

/// Process-wide-singleton-turned-explicit-handle: an instance is created
/// once per shell session (or once per test) rather than as global mutable
/// state, per `spec.md` §9's "Global mutable state" design note.
pub struct JobTable {
    jobs: Vec<Job>,
    next_job_id: usize,
}

impl Default for JobTable {
    fn default() -> Self {
        Self::new()
    }
}

impl JobTable {
    pub fn new() -> Self {
        JobTable { jobs: Vec::new(), next_job_id: 1 }
    }

    /// Register a freshly-launched background pipeline. `members` must be
    /// non-empty; its first element is the leader. A worker-thread leader
    /// has no OS PID of its own — it runs inside the shell process — so
    /// its display identity is the shell's own PID, which is accurate
    /// rather than a fabricated number. Returns the assigned id and prints
    /// the "Background job started" notice.
    pub fn register(&mut self, members: Vec<JobMember>, command_text: String) -> usize {
        let id = self.next_job_id;
        self.next_job_id += 1;
        let leader_pid = match members.first().expect("register called with no members") {
            JobMember::Pid(pid) => *pid,
            JobMember::Worker(_) => std::process::id() as i32,
        };

        println!("Background job started: [{id}]\t{leader_pid}\t{command_text}");

        self.jobs.push(Job { id, command_text, leader_pid, members });
        id
    }

    /// Non-blocking reap of every tracked job's members. Called once at the
    /// top of every pipeline invocation (`spec.md` §4.5 Ordering), never
    /// mid-wait.
    pub fn poll(&mut self) {
        let mut finished_indices = Vec::new();

        for (idx, job) in self.jobs.iter_mut().enumerate() {
            let pending = std::mem::take(&mut job.members);
            job.members = pending.into_iter().filter(|member| !member_is_done(member)).collect();
            if job.is_done() {
                finished_indices.push(idx);
            }
        }

        // Remove back-to-front so earlier indices stay valid.
        for idx in finished_indices.into_iter().rev() {
            let job = self.jobs.remove(idx);
            println!(
                "Completed: \t[{}]\t{}\t{}",
                job.id, job.leader_pid, job.command_text
            );
        }
    }

    /// Deliver `sig` to every retained PID of `job_id`. Silent no-op if the
    /// job no longer exists (`spec.md` §9 open question, resolved as
    /// no-op). Worker-thread members have no OS-level signal target and are
    /// skipped — they run inside the shell process itself.
    pub fn signal(&self, job_id: usize, sig: i32) {
        if let Some(job) = self.jobs.iter().find(|j| j.id == job_id) {
            for member in &job.members {
                if let JobMember::Pid(pid) = member {
                    send_signal(*pid, sig);
                }
            }
        }
    }

    /// Snapshot of every live job, ordered by id.
    pub fn list(&self) -> Vec<(usize, i32, String)> {
        self.jobs
            .iter()
            .map(|j| (j.id, j.leader_pid, j.command_text.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

/// True if this member has finished (and, for a worker, has been joined).
fn member_is_done(member: &JobMember) -> bool {
    match member {
        JobMember::Pid(pid) => try_reap(*pid),
        JobMember::Worker(handle) => handle.is_finished(),
    }
}

#[cfg(unix)]
fn try_reap(pid: i32) -> bool {
    let mut raw_status: libc::c_int = 0;
    // SAFETY: pid is a PID this process previously spawned and has not yet
    // reaped; WNOHANG never blocks.
    let rc = unsafe { libc::waitpid(pid, &mut raw_status, libc::WNOHANG) };
    if rc == pid {
        return true;
    }
    if rc < 0 {
        // ECHILD: already reaped elsewhere (or never existed) — treat as done
        // rather than polling forever.
        return std::io::Error::last_os_error().raw_os_error() == Some(libc::ECHILD);
    }
    let _ = status::exit_code_from_wait_status(raw_status);
    false
}

#[cfg(not(unix))]
fn try_reap(_pid: i32) -> bool {
    true
}

#[cfg(unix)]
fn send_signal(pid: i32, sig: i32) {
    // SAFETY: pid is a PID this job table previously spawned.
    unsafe {
        libc::kill(pid, sig);
    }
}

#[cfg(not(unix))]
fn send_signal(_pid: i32, _sig: i32) {}
