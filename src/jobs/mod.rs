//! The job table.
//!
//! Only the execution thread touches the table. Background children are
//! reaped by [`ChildReaper`], and their state changes are folded in by
//! [`JobTable::refresh`].

use crate::signal::ChildReaper;
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::WaitStatus;
use nix::unistd::Pid;
use indexmap::IndexMap;
use std::collections::BTreeMap;

/// How many statuses of removed jobs are kept for `wait PID`.
const MAX_REAPED: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Running,
    Stopped,
    Exited(i32),
    Signaled(i32),
}

impl ProcessState {
    pub fn is_finished(&self) -> bool {
        matches!(self, ProcessState::Exited(_) | ProcessState::Signaled(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Running,
    Stopped,
    Done(i32),
    Terminated(i32),
}

impl JobStatus {
    pub fn describe(&self) -> String {
        match self {
            JobStatus::Running => "Running".to_string(),
            JobStatus::Stopped => "Stopped".to_string(),
            JobStatus::Done(0) => "Done".to_string(),
            JobStatus::Done(code) => format!("Exit {}", code),
            JobStatus::Terminated(sig) => match Signal::try_from(*sig) {
                Ok(signal) => format!("Terminated ({})", signal.as_str()),
                Err(_) => "Terminated".to_string(),
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct JobProcess {
    pub pid: i32,
    pub state: ProcessState,
}

#[derive(Debug, Clone)]
pub struct Job {
    pub id: usize,
    pub pgid: i32,
    pub processes: Vec<JobProcess>,
    pub command: String,
    /// The job leads its own process group, so signals go to the group.
    pub own_group: bool,
}

impl Job {
    pub fn status(&self) -> JobStatus {
        if self.processes.iter().any(|p| p.state == ProcessState::Stopped) {
            return JobStatus::Stopped;
        }
        if self.processes.iter().any(|p| p.state == ProcessState::Running) {
            return JobStatus::Running;
        }
        match self.processes.last().map(|p| p.state) {
            Some(ProcessState::Signaled(sig)) => JobStatus::Terminated(sig),
            Some(ProcessState::Exited(code)) => JobStatus::Done(code),
            _ => JobStatus::Done(0),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.processes.iter().all(|p| p.state.is_finished())
    }

    /// Exit status as `$?` reports it.
    pub fn exit_status(&self) -> i32 {
        match self.status() {
            JobStatus::Done(code) => code,
            JobStatus::Terminated(sig) => 128 + sig,
            JobStatus::Stopped => 128 + libc::SIGTSTP,
            JobStatus::Running => 0,
        }
    }

    pub fn pids(&self) -> Vec<i32> {
        self.processes.iter().map(|p| p.pid).collect()
    }

    /// Send `signal` to the job's process group, or to each member.
    pub fn signal(&self, signal: Signal) -> nix::Result<()> {
        if self.own_group {
            kill(Pid::from_raw(-self.pgid), signal)
        } else {
            for process in self.processes.iter().filter(|p| !p.state.is_finished()) {
                kill(Pid::from_raw(process.pid), signal)?;
            }
            Ok(())
        }
    }

    pub fn mark_running(&mut self) {
        for process in &mut self.processes {
            if process.state == ProcessState::Stopped {
                process.state = ProcessState::Running;
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct JobTable {
    jobs: BTreeMap<usize, Job>,
    current: Option<usize>,
    previous: Option<usize>,
    /// Exit statuses of reaped pids whose jobs were already removed,
    /// oldest first.
    reaped: IndexMap<i32, i32>,
    reaper: ChildReaper,
}

impl JobTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reaper(&self) -> &ChildReaper {
        &self.reaper
    }

    /// Track a launched pipeline. Its pids are handed to the reaper.
    pub fn add(&mut self, pgid: i32, pids: &[i32], command: String, own_group: bool) -> usize {
        let id = self.jobs.keys().next_back().map(|id| id + 1).unwrap_or(1);
        for pid in pids {
            self.reaper.watch(*pid);
        }
        self.jobs.insert(
            id,
            Job {
                id,
                pgid,
                processes: pids
                    .iter()
                    .map(|pid| JobProcess {
                        pid: *pid,
                        state: ProcessState::Running,
                    })
                    .collect(),
                command,
                own_group,
            },
        );
        self.make_current(id);
        tracing::debug!(job = id, pgid, ?pids, "job added");
        id
    }

    fn make_current(&mut self, id: usize) {
        if self.current != Some(id) {
            self.previous = self.current;
            self.current = Some(id);
        }
    }

    /// Record a state change for `pid`.
    pub fn apply(&mut self, pid: i32, status: WaitStatus) {
        let state = match status {
            WaitStatus::Exited(_, code) => ProcessState::Exited(code),
            WaitStatus::Signaled(_, signal, _) => ProcessState::Signaled(signal as i32),
            WaitStatus::Stopped(..) => ProcessState::Stopped,
            WaitStatus::Continued(_) => ProcessState::Running,
            _ => return,
        };
        let mut stopped_job = None;
        for job in self.jobs.values_mut() {
            if let Some(process) = job.processes.iter_mut().find(|p| p.pid == pid) {
                process.state = state;
                tracing::debug!(job = job.id, pid, ?state, "job state change");
                if state == ProcessState::Stopped {
                    stopped_job = Some(job.id);
                }
            }
        }
        if let Some(id) = stopped_job {
            self.make_current(id);
        }
    }

    /// Fold in everything the reaper has collected.
    pub fn refresh(&mut self) {
        self.reaper.reap();
        for (pid, status) in self.reaper.drain() {
            self.apply(pid, status);
        }
    }

    pub fn get(&self, id: usize) -> Option<&Job> {
        self.jobs.get(&id)
    }

    pub fn get_mut(&mut self, id: usize) -> Option<&mut Job> {
        self.jobs.get_mut(&id)
    }

    pub fn list(&self) -> Vec<&Job> {
        self.jobs.values().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn current(&self) -> Option<usize> {
        self.current.filter(|id| self.jobs.contains_key(id))
    }

    pub fn previous(&self) -> Option<usize> {
        self.previous.filter(|id| self.jobs.contains_key(id))
    }

    /// `+` for the current job, `-` for the previous one.
    pub fn marker(&self, id: usize) -> char {
        if self.current() == Some(id) {
            '+'
        } else if self.previous() == Some(id) {
            '-'
        } else {
            ' '
        }
    }

    pub fn job_for_pid(&self, pid: i32) -> Option<usize> {
        self.jobs
            .values()
            .find(|job| job.processes.iter().any(|p| p.pid == pid))
            .map(|job| job.id)
    }

    pub fn remove(&mut self, id: usize) -> Option<Job> {
        let job = self.jobs.remove(&id)?;
        for process in &job.processes {
            self.reaper.unwatch(process.pid);
        }
        if let Some(last) = job.processes.last() {
            self.reaped.shift_remove(&last.pid);
            self.reaped.insert(last.pid, job.exit_status());
            if self.reaped.len() > MAX_REAPED {
                self.reaped.shift_remove_index(0);
            }
        }
        if self.current == Some(id) {
            self.current = self.previous.take();
        } else if self.previous == Some(id) {
            self.previous = None;
        }
        Some(job)
    }

    /// Status of a pid whose job has already been removed. A status is
    /// handed out once.
    pub fn take_reaped_status(&mut self, pid: i32) -> Option<i32> {
        self.reaped.shift_remove(&pid)
    }

    /// Remove and return every finished job.
    pub fn take_finished(&mut self) -> Vec<Job> {
        let finished: Vec<usize> = self
            .jobs
            .values()
            .filter(|job| job.is_finished())
            .map(|job| job.id)
            .collect();
        finished.into_iter().filter_map(|id| self.remove(id)).collect()
    }

    /// Resolve a job specification:
    /// - `%n` or `n`: job number n
    /// - `%%`, `%+` or `%`: current job
    /// - `%-`: previous job
    /// - `%string`: job whose command begins with string
    /// - `%?string`: job whose command contains string
    pub fn parse_spec(&self, spec: &str) -> Result<usize, String> {
        let Some(body) = spec.strip_prefix('%') else {
            return match spec.parse::<usize>() {
                Ok(id) if self.jobs.contains_key(&id) => Ok(id),
                Ok(_) => Err(format!("{}: no such job", spec)),
                Err(_) => Err(format!("{}: invalid job specification", spec)),
            };
        };
        match body {
            "" | "%" | "+" => self.current().ok_or_else(|| "no current job".to_string()),
            "-" => self.previous().ok_or_else(|| "no previous job".to_string()),
            _ => {
                if let Ok(id) = body.parse::<usize>() {
                    return self
                        .jobs
                        .contains_key(&id)
                        .then_some(id)
                        .ok_or_else(|| format!("{}: no such job", spec));
                }
                let matching: Vec<usize> = match body.strip_prefix('?') {
                    Some(needle) => self
                        .jobs
                        .values()
                        .filter(|j| j.command.contains(needle))
                        .map(|j| j.id)
                        .collect(),
                    None => self
                        .jobs
                        .values()
                        .filter(|j| j.command.starts_with(body))
                        .map(|j| j.id)
                        .collect(),
                };
                match matching.as_slice() {
                    [id] => Ok(*id),
                    [] => Err(format!("{}: no such job", spec)),
                    _ => Err(format!("{}: ambiguous job spec", spec)),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exited(pid: i32, code: i32) -> WaitStatus {
        WaitStatus::Exited(Pid::from_raw(pid), code)
    }

    #[test]
    fn test_add_assigns_increasing_ids() {
        let mut table = JobTable::new();
        assert_eq!(table.add(100, &[100], "sleep 100".into(), true), 1);
        assert_eq!(table.add(200, &[200, 201], "cat | wc".into(), true), 2);
        assert_eq!(table.current(), Some(2));
        assert_eq!(table.previous(), Some(1));
        assert_eq!(table.marker(2), '+');
        assert_eq!(table.marker(1), '-');
    }

    #[test]
    fn test_job_status_follows_processes() {
        let mut table = JobTable::new();
        let id = table.add(200, &[200, 201], "a | b".into(), true);
        table.apply(200, exited(200, 0));
        assert_eq!(table.get(id).unwrap().status(), JobStatus::Running);
        table.apply(201, exited(201, 3));
        let job = table.get(id).unwrap();
        assert_eq!(job.status(), JobStatus::Done(3));
        assert_eq!(job.exit_status(), 3);
        assert!(job.is_finished());
    }

    #[test]
    fn test_stopped_and_signaled() {
        let mut table = JobTable::new();
        let id = table.add(300, &[300], "vim".into(), true);
        table.apply(300, WaitStatus::Stopped(Pid::from_raw(300), Signal::SIGTSTP));
        assert_eq!(table.get(id).unwrap().status(), JobStatus::Stopped);
        table.get_mut(id).unwrap().mark_running();
        assert_eq!(table.get(id).unwrap().status(), JobStatus::Running);
        table.apply(300, WaitStatus::Signaled(Pid::from_raw(300), Signal::SIGKILL, false));
        assert_eq!(table.get(id).unwrap().exit_status(), 137);
    }

    #[test]
    fn test_take_finished_remembers_status() {
        let mut table = JobTable::new();
        let id = table.add(400, &[400], "false".into(), false);
        table.add(401, &[401], "sleep 5".into(), false);
        table.apply(400, exited(400, 1));
        let finished = table.take_finished();
        assert_eq!(finished.len(), 1);
        assert_eq!(finished[0].id, id);
        assert!(table.get(id).is_none());
        assert_eq!(table.current(), Some(2));
        assert_eq!(table.take_reaped_status(400), Some(1));
        assert_eq!(table.take_reaped_status(400), None);
    }

    #[test]
    fn test_reaped_statuses_are_bounded() {
        let mut table = JobTable::new();
        for pid in 1000..1000 + MAX_REAPED as i32 + 10 {
            let id = table.add(pid, &[pid], "true".into(), false);
            table.apply(pid, exited(pid, 0));
            table.remove(id);
        }
        assert_eq!(table.reaped.len(), MAX_REAPED);
        assert_eq!(table.take_reaped_status(1000), None);
        assert_eq!(table.take_reaped_status(1000 + MAX_REAPED as i32 + 9), Some(0));
    }

    #[test]
    fn test_parse_job_spec() {
        let mut table = JobTable::new();
        table.add(1, &[1], "sleep 100".into(), true);
        table.add(2, &[2], "make build".into(), true);
        table.add(3, &[3], "sleep 5".into(), true);
        assert_eq!(table.parse_spec("%2"), Ok(2));
        assert_eq!(table.parse_spec("2"), Ok(2));
        assert_eq!(table.parse_spec("%%"), Ok(3));
        assert_eq!(table.parse_spec("%+"), Ok(3));
        assert_eq!(table.parse_spec("%-"), Ok(2));
        assert_eq!(table.parse_spec("%make"), Ok(2));
        assert_eq!(table.parse_spec("%?build"), Ok(2));
        assert!(table.parse_spec("%sleep").unwrap_err().contains("ambiguous"));
        assert!(table.parse_spec("%9").is_err());
        assert!(table.parse_spec("abc").is_err());
    }

    #[test]
    fn test_status_descriptions() {
        assert_eq!(JobStatus::Done(0).describe(), "Done");
        assert_eq!(JobStatus::Done(2).describe(), "Exit 2");
        assert_eq!(JobStatus::Terminated(9).describe(), "Terminated (SIGKILL)");
    }
}
