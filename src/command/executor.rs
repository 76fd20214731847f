//! Shell command execution.
//!
//! # Responsibilities
//! - Spawn a command line through the host shell
//! - Deliver stdin from a stream, text, or a JSON value
//! - Capture the full stdout and stderr without a size cap
//! - Report nonzero exits separately from spawn failures
//! - Fail the run when the input stream breaks, killing the child
//!
//! # Design Decisions
//! - Completion is a join of "stdin finished" and "all output collected",
//!   followed by the exit status
//! - No timeout unless one is configured; a configured timeout kills the child

use std::collections::BTreeMap;
use std::io;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use axum::body::Bytes;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use serde_json::Value;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{ChildStdin, Command};

/// Data written to the child's standard input.
pub enum CommandInput {
    /// Close stdin immediately.
    Empty,
    Text(String),
    /// Serialized to JSON before writing.
    Json(Value),
    /// Piped chunk by chunk; stdin closes when the stream ends.
    Stream(BoxStream<'static, io::Result<Bytes>>),
}

impl std::fmt::Debug for CommandInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandInput::Empty => write!(f, "Empty"),
            CommandInput::Text(text) => write!(f, "Text({} bytes)", text.len()),
            CommandInput::Json(_) => write!(f, "Json"),
            CommandInput::Stream(_) => write!(f, "Stream"),
        }
    }
}

/// How a command is spawned.
#[derive(Debug, Clone)]
pub struct ExecOptions {
    /// Shell that interprets the command line.
    pub shell: String,
    pub working_dir: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
    /// Put the child in its own process group.
    pub detached: bool,
    pub timeout: Option<Duration>,
}

impl Default for ExecOptions {
    fn default() -> Self {
        Self {
            shell: default_shell().to_string(),
            working_dir: None,
            env: BTreeMap::new(),
            detached: false,
            timeout: None,
        }
    }
}

fn default_shell() -> &'static str {
    if cfg!(windows) {
        "cmd"
    } else {
        "sh"
    }
}

/// Output of a command that exited with code 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// A command that ran but did not exit cleanly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionFailure {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub message: String,
}

/// Errors from [`execute`].
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// The shell itself could not be started.
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    /// The process ran and exited nonzero or was killed by a signal.
    #[error("{}", .0.message)]
    Exited(ExecutionFailure),

    /// The configured timeout expired; the child was killed.
    #[error("command timed out after {0:?}")]
    Timeout(Duration),

    /// The input stream failed before it was fully delivered; the child was killed.
    #[error("failed to read command input: {0}")]
    Input(#[source] io::Error),

    /// Waiting on the child failed.
    #[error("I/O error while running command: {0}")]
    Io(#[from] io::Error),
}

impl ExecutionError {
    /// Exit code carried by the failure, if the process got far enough to have one.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            ExecutionError::Exited(failure) => Some(failure.exit_code),
            _ => None,
        }
    }
}

/// Run `command` through the shell, feeding it `input`.
pub async fn execute(
    command: &str,
    input: CommandInput,
    options: &ExecOptions,
) -> Result<ExecutionOutput, ExecutionError> {
    let mut cmd = shell_command(&options.shell, command);
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        // Killing on drop is what enforces the timeout; without one the
        // child outlives a dropped request.
        .kill_on_drop(options.timeout.is_some());

    for (key, value) in &options.env {
        cmd.env(key, value);
    }

    if let Some(dir) = &options.working_dir {
        cmd.current_dir(dir);
    }

    if options.detached {
        detach(&mut cmd);
    }

    let start = Instant::now();
    let mut child = cmd.spawn().map_err(|source| ExecutionError::Spawn {
        command: command.to_string(),
        source,
    })?;

    tracing::debug!(
        command = %command,
        pid = child.id(),
        input = ?input,
        "Command spawned"
    );

    let stdin = child.stdin.take();
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let run = async move {
        let feed = async {
            let result = write_input(stdin, input).await;
            if let Err(InputError::Source(e)) = &result {
                tracing::warn!(error = %e, "Command input failed, killing child");
                if let Err(kill) = child.start_kill() {
                    tracing::debug!(error = %kill, "Child already exited");
                }
            }
            result
        };
        let (written, stdout, stderr) = tokio::join!(feed, read_all(stdout), read_all(stderr));
        let status = child.wait().await?;

        match written {
            Err(InputError::Source(e)) => return Err(ExecutionError::Input(e)),
            // The child is free to exit without reading its input.
            Err(InputError::Pipe(e)) => tracing::debug!(error = %e, "Command stdin closed early"),
            Ok(()) => {}
        }
        Ok::<_, ExecutionError>(Output {
            status,
            stdout: stdout?,
            stderr: stderr?,
        })
    };

    let output = match options.timeout {
        Some(limit) => tokio::time::timeout(limit, run)
            .await
            .map_err(|_| ExecutionError::Timeout(limit))??,
        None => run.await?,
    };

    let exit_code = exit_code(output.status);
    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    tracing::debug!(
        command = %command,
        exit_code,
        duration_ms = start.elapsed().as_millis() as u64,
        stdout_bytes = stdout.len(),
        stderr_bytes = stderr.len(),
        "Command finished"
    );

    if output.status.success() {
        Ok(ExecutionOutput {
            exit_code,
            stdout,
            stderr,
        })
    } else {
        Err(ExecutionError::Exited(ExecutionFailure {
            exit_code,
            message: format!("Command failed with exit code {}: {}", exit_code, command),
            stdout,
            stderr,
        }))
    }
}

fn shell_command(shell: &str, command: &str) -> Command {
    let mut cmd = Command::new(shell);
    if cfg!(windows) && shell.eq_ignore_ascii_case("cmd") {
        cmd.arg("/C");
    } else {
        cmd.arg("-c");
    }
    cmd.arg(command);
    cmd
}

#[cfg(unix)]
fn detach(cmd: &mut Command) {
    cmd.process_group(0);
}

#[cfg(not(unix))]
fn detach(_cmd: &mut Command) {}

struct Output {
    status: ExitStatus,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

/// Why stdin was not fully delivered.
enum InputError {
    /// The input itself failed.
    Source(io::Error),
    /// Writing to the child failed, usually because it exited.
    Pipe(io::Error),
}

async fn write_input(stdin: Option<ChildStdin>, input: CommandInput) -> Result<(), InputError> {
    let Some(mut stdin) = stdin else {
        return Ok(());
    };
    match input {
        CommandInput::Empty => {}
        CommandInput::Text(text) => stdin
            .write_all(text.as_bytes())
            .await
            .map_err(InputError::Pipe)?,
        CommandInput::Json(value) => {
            let bytes = serde_json::to_vec(&value)
                .map_err(|e| InputError::Source(io::Error::other(e)))?;
            stdin.write_all(&bytes).await.map_err(InputError::Pipe)?;
        }
        CommandInput::Stream(mut stream) => {
            let mut pipe_open = true;
            while let Some(chunk) = stream.next().await {
                let chunk = chunk.map_err(InputError::Source)?;
                if !pipe_open {
                    continue;
                }
                if let Err(e) = stdin.write_all(&chunk).await {
                    if e.kind() != io::ErrorKind::BrokenPipe {
                        return Err(InputError::Pipe(e));
                    }
                    // Keep consuming so a broken input is still reported.
                    pipe_open = false;
                }
            }
            if !pipe_open {
                return Ok(());
            }
        }
    }
    stdin.shutdown().await.map_err(InputError::Pipe)?;
    Ok(())
}

async fn read_all<R: AsyncRead + Unpin>(reader: Option<R>) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(mut reader) = reader {
        reader.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}

#[cfg(unix)]
fn exit_code(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|signal| 128 + signal))
        .unwrap_or(1)
}

#[cfg(not(unix))]
fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(1)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn captures_stdout_and_exit_code() {
        let output = execute("echo hello; echo oops >&2", CommandInput::Empty, &ExecOptions::default())
            .await
            .unwrap();
        assert_eq!(output.exit_code, 0);
        assert_eq!(output.stdout, "hello\n");
        assert_eq!(output.stderr, "oops\n");
    }

    #[tokio::test]
    async fn empty_input_closes_stdin() {
        let output = execute("cat", CommandInput::Empty, &ExecOptions::default())
            .await
            .unwrap();
        assert_eq!(output.stdout, "");
    }

    #[tokio::test]
    async fn text_input_is_piped() {
        let output = execute("cat", CommandInput::Text("plain text".into()), &ExecOptions::default())
            .await
            .unwrap();
        assert_eq!(output.stdout, "plain text");
    }

    #[tokio::test]
    async fn json_input_is_serialized() {
        let output = execute(
            "cat",
            CommandInput::Json(json!({"name": "Ada"})),
            &ExecOptions::default(),
        )
        .await
        .unwrap();
        assert_eq!(output.stdout, r#"{"name":"Ada"}"#);
    }

    #[tokio::test]
    async fn stream_input_is_piped_in_order() {
        let chunks = vec![
            Ok(Bytes::from_static(b"one ")),
            Ok(Bytes::from_static(b"two ")),
            Ok(Bytes::from_static(b"three")),
        ];
        let stream = futures_util::stream::iter(chunks).boxed();
        let output = execute("cat", CommandInput::Stream(stream), &ExecOptions::default())
            .await
            .unwrap();
        assert_eq!(output.stdout, "one two three");
    }

    #[tokio::test]
    async fn ignoring_stdin_is_not_an_error() {
        let big = "x".repeat(1024 * 1024);
        let output = execute("echo done", CommandInput::Text(big), &ExecOptions::default())
            .await
            .unwrap();
        assert_eq!(output.stdout, "done\n");
    }

    #[tokio::test]
    async fn large_output_is_not_truncated() {
        let output = execute(
            "head -c 3000000 /dev/zero | tr '\\0' 'a'",
            CommandInput::Empty,
            &ExecOptions::default(),
        )
        .await
        .unwrap();
        assert_eq!(output.stdout.len(), 3_000_000);
    }

    #[tokio::test]
    async fn nonzero_exit_is_a_failure_with_output() {
        let err = execute(
            "echo partial; echo broken >&2; exit 3",
            CommandInput::Empty,
            &ExecOptions::default(),
        )
        .await
        .unwrap_err();
        match err {
            ExecutionError::Exited(failure) => {
                assert_eq!(failure.exit_code, 3);
                assert_eq!(failure.stdout, "partial\n");
                assert_eq!(failure.stderr, "broken\n");
                assert!(failure.message.contains("exit code 3"));
            }
            other => panic!("expected Exited, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn unknown_command_exits_127() {
        let err = execute(
            "definitely-not-a-real-command-xyz",
            CommandInput::Empty,
            &ExecOptions::default(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.exit_code(), Some(127));
    }

    #[tokio::test]
    async fn missing_shell_is_a_spawn_error() {
        let options = ExecOptions {
            shell: "/nonexistent/shell".into(),
            ..ExecOptions::default()
        };
        let err = execute("echo hi", CommandInput::Empty, &options)
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::Spawn { .. }));
        assert_eq!(err.exit_code(), None);
    }

    #[tokio::test]
    async fn applies_env_and_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        let options = ExecOptions {
            working_dir: Some(dir.path().to_path_buf()),
            env: BTreeMap::from([("GREETING".to_string(), "hi".to_string())]),
            ..ExecOptions::default()
        };
        let output = execute("echo $GREETING; touch marker", CommandInput::Empty, &options)
            .await
            .unwrap();
        assert_eq!(output.stdout, "hi\n");
        assert!(dir.path().join("marker").exists());
    }

    #[tokio::test]
    async fn detached_child_output_is_still_captured() {
        let options = ExecOptions {
            detached: true,
            ..ExecOptions::default()
        };
        let output = execute("echo detached", CommandInput::Empty, &options)
            .await
            .unwrap();
        assert_eq!(output.stdout, "detached\n");
    }

    #[tokio::test]
    async fn broken_input_stream_fails_the_run() {
        let chunks = vec![
            Ok(Bytes::from_static(b"partial ")),
            Err(io::Error::other("client went away")),
        ];
        let stream = futures_util::stream::iter(chunks).boxed();
        let err = execute("cat", CommandInput::Stream(stream), &ExecOptions::default())
            .await
            .unwrap_err();
        match err {
            ExecutionError::Input(e) => assert_eq!(e.to_string(), "client went away"),
            other => panic!("expected Input, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn stream_error_after_child_exits_is_still_reported() {
        let chunks = vec![
            Ok(Bytes::from(vec![b'x'; 256 * 1024])),
            Ok(Bytes::from(vec![b'x'; 256 * 1024])),
            Err(io::Error::other("truncated")),
        ];
        let stream = futures_util::stream::iter(chunks).boxed();
        let err = execute("true", CommandInput::Stream(stream), &ExecOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::Input(_)));
    }

    #[tokio::test]
    async fn timeout_kills_the_child() {
        let options = ExecOptions {
            timeout: Some(Duration::from_millis(200)),
            ..ExecOptions::default()
        };
        let err = execute("sleep 10", CommandInput::Empty, &options)
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::Timeout(_)));
    }
}
