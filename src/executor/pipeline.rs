//! Pipelines and background jobs.
//!
//! Every stage of a multi-stage pipeline runs in its own forked copy of the
//! shell, builtins included, connected by OS pipes. Under job control the
//! first stage leads a process group the others join.

use super::Executor;
use crate::error::{ExecResult, ShellError};
use crate::parser::ast::*;
use crate::runtime::Subscript;
use std::os::unix::io::AsRawFd;

/// Exit status of a pipeline from the statuses of its stages.
pub fn pipeline_status(statuses: &[i32], pipefail: bool) -> i32 {
    if pipefail {
        statuses.iter().rev().find(|s| **s != 0).copied().unwrap_or(0)
    } else {
        statuses.last().copied().unwrap_or(0)
    }
}

impl Executor {
    pub fn execute_pipeline(&mut self, pipeline: &Pipeline) -> ExecResult {
        let statuses = if pipeline.stages.len() == 1 {
            vec![self.execute_command(&pipeline.stages[0].command, false)?]
        } else {
            self.run_stages(pipeline)?
        };

        let elements = statuses
            .iter()
            .map(|s| (None::<Subscript>, s.to_string()))
            .collect();
        self.runtime.assign_array("PIPESTATUS", elements, false)?;

        let status = pipeline_status(&statuses, self.runtime.options.pipefail);
        Ok(if pipeline.negate {
            (status == 0) as i32
        } else {
            status
        })
    }

    fn run_stages(&mut self, pipeline: &Pipeline) -> Result<Vec<i32>, ShellError> {
        let last = pipeline.stages.len() - 1;
        let mut pids = Vec::with_capacity(pipeline.stages.len());
        let mut pgid: Option<i32> = None;
        let mut input: Option<os_pipe::PipeReader> = None;

        for (i, stage) in pipeline.stages.iter().enumerate() {
            let (reader, writer) = if i < last {
                let (r, w) = os_pipe::pipe()?;
                (Some(r), Some(w))
            } else {
                (None, None)
            };
            let stdin_fd = input.as_ref().map(|r| r.as_raw_fd());
            let stdout_fd = writer.as_ref().map(|w| w.as_raw_fd());
            let next_fd = reader.as_ref().map(|r| r.as_raw_fd());
            let pipe_stderr = stage.pipe_stderr;

            let pid = self.fork_child(pgid, true, |exec| {
                unsafe {
                    if let Some(fd) = stdin_fd {
                        libc::dup2(fd, 0);
                        libc::close(fd);
                    }
                    if let Some(fd) = stdout_fd {
                        libc::dup2(fd, 1);
                        if pipe_stderr {
                            libc::dup2(fd, 2);
                        }
                        libc::close(fd);
                    }
                    if let Some(fd) = next_fd {
                        libc::close(fd);
                    }
                }
                exec.run_in_child(&stage.command)
            })?;

            if pgid.is_none() {
                pgid = Some(pid);
                if self.job_control() {
                    let _ = self.terminal.give_to(pid);
                }
            }
            pids.push(pid);
            // the parent keeps only the read end for the next stage
            drop(writer);
            input = reader;
        }
        drop(input);

        let group = pgid.unwrap_or_default();
        tracing::debug!(stages = pids.len(), pgid = group, "pipeline started");
        Ok(self.wait_foreground(group, &pids, &describe_pipeline(pipeline)))
    }

    /// Run a command as the whole of a forked child.
    pub(crate) fn run_in_child(&mut self, command: &Command) -> i32 {
        match self.execute_command(command, true) {
            Ok(status) => status,
            Err(unwind) => self.unwind_status(unwind),
        }
    }

    /// Start `and_or` as a background job. Returns its pid.
    pub fn spawn_background(&mut self, and_or: &AndOr) -> Result<i32, ShellError> {
        let job_control = self.job_control();
        let pid = self.fork_child(None, false, |exec| {
            if !job_control {
                Executor::ignore_interrupts();
                if let Ok(null) = std::fs::File::open("/dev/null") {
                    unsafe { libc::dup2(null.as_raw_fd(), 0) };
                }
            }
            let first = &and_or.first;
            if and_or.rest.is_empty() && first.stages.len() == 1 && !first.negate {
                // a lone command may replace the child outright
                return exec.run_in_child(&first.stages[0].command);
            }
            match exec.execute_and_or(and_or) {
                Ok(status) => status,
                Err(unwind) => exec.unwind_status(unwind),
            }
        })?;

        let description = describe_and_or(and_or);
        let id = self.runtime.jobs.add(pid, &[pid], description, job_control);
        self.runtime.last_background = Some(pid);
        tracing::debug!(pid, job = id, "background job");
        if self.runtime.interactive {
            self.eprint(&format!("[{}] {}\n", id, pid));
        }
        Ok(pid)
    }
}

fn describe_words(words: &[Word]) -> String {
    words.iter().map(|w| w.raw.as_str()).collect::<Vec<_>>().join(" ")
}

/// Source-like text of a command for the job table.
pub fn describe_command(command: &Command) -> String {
    match command {
        Command::Simple(simple) => {
            let mut parts: Vec<String> = simple
                .assignments
                .iter()
                .map(|a| match &a.value {
                    AssignValue::Scalar(word) => format!("{}={}", a.name, word.raw),
                    AssignValue::Array(_) => format!("{}=(...)", a.name),
                })
                .collect();
            if !simple.words.is_empty() {
                parts.push(describe_words(&simple.words));
            }
            parts.join(" ")
        }
        Command::Compound(compound, _) => match compound {
            CompoundCommand::BraceGroup(_) => "{ ... }".to_string(),
            CompoundCommand::Subshell(_) => "( ... )".to_string(),
            CompoundCommand::If { .. } => "if ...".to_string(),
            CompoundCommand::While { until: false, .. } => "while ...".to_string(),
            CompoundCommand::While { until: true, .. } => "until ...".to_string(),
            CompoundCommand::For { var, .. } | CompoundCommand::Select { var, .. } => {
                format!("for {} ...", var)
            }
            CompoundCommand::CFor { .. } => "for ((...))".to_string(),
            CompoundCommand::Case { subject, .. } => format!("case {} ...", subject.raw),
            CompoundCommand::Arith(source) => format!("(({}))", source),
            CompoundCommand::Cond(_) => "[[ ... ]]".to_string(),
        },
        Command::FunctionDef(def) => format!("{} () ...", def.name),
    }
}

pub fn describe_pipeline(pipeline: &Pipeline) -> String {
    let stages: Vec<String> = pipeline
        .stages
        .iter()
        .map(|stage| describe_command(&stage.command))
        .collect();
    let text = stages.join(" | ");
    if pipeline.negate {
        format!("! {}", text)
    } else {
        text
    }
}

pub fn describe_and_or(and_or: &AndOr) -> String {
    let mut text = describe_pipeline(&and_or.first);
    for (connector, pipeline) in &and_or.rest {
        let op = match connector {
            Connector::And => "&&",
            Connector::Or => "||",
        };
        text.push_str(&format!(" {} {}", op, describe_pipeline(pipeline)));
    }
    text
}
