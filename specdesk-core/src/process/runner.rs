//! Tokio-backed process runner.

use std::ffi::OsString;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::{
    CommandSpec, LaunchError, LineSender, OperationOutcome, OutputStream, ProcessRunner,
    StreamLine,
};

/// Runs commands as direct child processes of the engine.
#[derive(Debug, Clone, Default)]
pub struct SystemProcessRunner {
    /// Replacement `PATH` for children, if any.
    search_path: Option<OsString>,
}

impl SystemProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a runner whose children see `search_path` as their `PATH`.
    pub fn with_search_path(search_path: OsString) -> Self {
        Self {
            search_path: Some(search_path),
        }
    }
}

#[async_trait]
impl ProcessRunner for SystemProcessRunner {
    async fn run(
        &self,
        command: CommandSpec,
        lines: Option<LineSender>,
    ) -> Result<OperationOutcome, LaunchError> {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args);

        if let Some(dir) = &command.cwd {
            cmd.current_dir(dir);
        }

        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        // Headless environment
        cmd.env("TERM", "dumb");
        cmd.env("NO_COLOR", "1");
        cmd.env("CLICOLOR", "0");

        if let Some(path) = &self.search_path {
            cmd.env("PATH", path);
        }

        info!(command = %command, cwd = ?command.cwd, "Launching process");

        let mut child = cmd
            .spawn()
            .map_err(|e| LaunchError::from_io(&command.program, &e))?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let (stdout_text, stderr_text) = tokio::join!(
            pump_lines(stdout, OutputStream::Out, lines.clone()),
            pump_lines(stderr, OutputStream::Err, lines),
        );

        let exit_code = match child.wait().await {
            Ok(status) => status.code().unwrap_or(-1),
            Err(e) => {
                warn!(command = %command, error = %e, "Failed to wait for process");
                -1
            }
        };

        debug!(command = %command, exit_code, "Process exited");

        Ok(OperationOutcome {
            exit_code,
            stdout: stdout_text,
            stderr: stderr_text,
        })
    }
}

/// Reads `reader` line by line, forwarding each line to `sink` and returning
/// the full captured text.
async fn pump_lines<R>(reader: Option<R>, stream: OutputStream, sink: Option<LineSender>) -> String
where
    R: AsyncRead + Unpin,
{
    let Some(reader) = reader else {
        return String::new();
    };

    let mut reader = BufReader::new(reader);
    let mut captured = String::new();
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let text = decode_line(&buf);
                captured.push_str(&text);
                captured.push('\n');
                if let Some(sink) = &sink {
                    // A closed receiver means nobody is listening; keep draining
                    // so the child never blocks on a full pipe.
                    let _ = sink.send(StreamLine {
                        stream,
                        text,
                    });
                }
            }
            Err(e) => {
                warn!(%stream, error = %e, "Failed to read process output");
                break;
            }
        }
    }

    captured
}

fn decode_line(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_end_matches(&['\r', '\n'][..])
        .to_string()
}
