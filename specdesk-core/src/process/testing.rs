//! Scripted process runner for unit tests.
//!
//! Responses are keyed by the full command line (`program arg1 arg2`). Each
//! key holds a queue of scripts: every call pops the front, except the last
//! script which repeats. Unscripted commands fail with `NotFound`, which is
//! exactly what a host without the executable reports.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{
    CommandSpec, LaunchError, LineSender, OperationOutcome, OutputStream, ProcessRunner,
    StreamLine,
};

/// Scripted behaviour for one call.
#[derive(Debug, Clone)]
pub enum Script {
    /// Emit the lines in order, then exit with `code`.
    Exit { lines: Vec<StreamLine>, code: i32 },
    /// Fail to launch.
    LaunchFail(LaunchError),
    /// Never finish.
    Hang,
}

impl Script {
    /// Exit 0 with each line of `stdout` on the `Out` stream.
    pub fn ok(stdout: &str) -> Self {
        Self::Exit {
            lines: stdout.lines().map(StreamLine::out).collect(),
            code: 0,
        }
    }

    /// Exit with `code` and a single `Err` line.
    pub fn fail(code: i32, stderr: &str) -> Self {
        Self::Exit {
            lines: vec![StreamLine::err(stderr)],
            code,
        }
    }

    pub fn lines(lines: Vec<StreamLine>, code: i32) -> Self {
        Self::Exit { lines, code }
    }
}

#[derive(Debug, Default)]
pub struct ScriptedRunner {
    scripts: Mutex<HashMap<String, VecDeque<Script>>>,
    calls: Mutex<Vec<CommandSpec>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a script for `command_line`.
    pub fn script(&self, command_line: &str, script: Script) -> &Self {
        self.scripts
            .lock()
            .entry(command_line.to_string())
            .or_default()
            .push_back(script);
        self
    }

    /// Every command launched so far, in call order.
    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().clone()
    }

    /// Number of launches of `command_line`.
    pub fn call_count(&self, command_line: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.command_line() == command_line)
            .count()
    }

    /// Total number of launch attempts.
    pub fn launch_count(&self) -> usize {
        self.calls.lock().len()
    }

    fn next_script(&self, command_line: &str) -> Option<Script> {
        let mut scripts = self.scripts.lock();
        let queue = scripts.get_mut(command_line)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

#[async_trait]
impl ProcessRunner for ScriptedRunner {
    async fn run(
        &self,
        command: CommandSpec,
        lines: Option<LineSender>,
    ) -> Result<OperationOutcome, LaunchError> {
        let command_line = command.command_line();
        self.calls.lock().push(command.clone());

        let script = self.next_script(&command_line).unwrap_or_else(|| {
            Script::LaunchFail(LaunchError::NotFound {
                program: command.program.clone(),
            })
        });

        match script {
            Script::LaunchFail(e) => Err(e),
            Script::Hang => {
                futures::future::pending::<()>().await;
                unreachable!("pending future never resolves")
            }
            Script::Exit {
                lines: scripted,
                code,
            } => {
                let mut stdout = String::new();
                let mut stderr = String::new();
                for line in scripted {
                    let target = match line.stream {
                        OutputStream::Out => &mut stdout,
                        OutputStream::Err => &mut stderr,
                    };
                    target.push_str(&line.text);
                    target.push('\n');
                    if let Some(sink) = &lines {
                        let _ = sink.send(line);
                    }
                    tokio::task::yield_now().await;
                }
                Ok(OperationOutcome {
                    exit_code: code,
                    stdout,
                    stderr,
                })
            }
        }
    }
}
