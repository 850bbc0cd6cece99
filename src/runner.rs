use std::borrow::Cow;
use std::io::{self, ErrorKind, Read, Write};
use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("command `{program}` does not exist")]
    NotFound { program: String },
    #[error("failed to spawn `{program}`: {source}")]
    SpawnFailed { program: String, source: io::Error },
    #[error("I/O error while piping through `{program}`: {source}")]
    Io { program: String, source: io::Error },
    #[error("`{program}` timed out after {timeout:?}")]
    TimedOut { program: String, timeout: Duration },
    #[error("empty command")]
    EmptyCommand,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    /// stdout and stderr, interleaved in the order they were written.
    pub combined_output: Vec<u8>,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    pub fn combined_output_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.combined_output)
    }
}

/// Runs a linter over a payload. Implementations must be shareable between
/// documents linted in parallel.
pub trait ProcessRunner: Send + Sync {
    fn run(&self, argv: &[String], input: &[u8]) -> Result<ProcessOutput, ProcessError>;
}

impl<R: ProcessRunner + ?Sized> ProcessRunner for &R {
    fn run(&self, argv: &[String], input: &[u8]) -> Result<ProcessOutput, ProcessError> {
        (**self).run(argv, input)
    }
}

/// Spawns the linter directly from its argv (no shell), pipes the payload
/// into stdin and collects stdout and stderr through a single pipe.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SubprocessRunner {
    pub timeout: Option<Duration>,
}

impl SubprocessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
        }
    }

    fn spawn(program: &str, args: &[String]) -> Result<(Child, io::PipeReader), ProcessError> {
        let io_error = |source| ProcessError::Io {
            program: program.to_string(),
            source,
        };
        let (reader, stdout_writer) = io::pipe().map_err(io_error)?;
        let stderr_writer = stdout_writer.try_clone().map_err(io_error)?;

        // The command owns the parent's copies of the write ends; it must be
        // dropped right after spawning or the reader never sees EOF.
        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::piped())
            .stdout(stdout_writer)
            .stderr(stderr_writer);
        let child = command.spawn().map_err(|source| match source.kind() {
            ErrorKind::NotFound => ProcessError::NotFound {
                program: program.to_string(),
            },
            _ => ProcessError::SpawnFailed {
                program: program.to_string(),
                source,
            },
        })?;
        drop(command);
        Ok((child, reader))
    }

    fn wait(&self, program: &str, child: &mut Child) -> Result<ExitStatus, ProcessError> {
        let io_error = |source| ProcessError::Io {
            program: program.to_string(),
            source,
        };
        let Some(timeout) = self.timeout else {
            return child.wait().map_err(io_error);
        };
        let start = Instant::now();
        loop {
            match child.try_wait() {
                Ok(Some(status)) => return Ok(status),
                Ok(None) => {}
                Err(source) => {
                    abandon(child);
                    return Err(io_error(source));
                }
            }
            if start.elapsed() >= timeout {
                abandon(child);
                return Err(ProcessError::TimedOut {
                    program: program.to_string(),
                    timeout,
                });
            }
            thread::sleep(Duration::from_millis(10));
        }
    }
}

impl ProcessRunner for SubprocessRunner {
    fn run(&self, argv: &[String], input: &[u8]) -> Result<ProcessOutput, ProcessError> {
        let (program, args) = argv.split_first().ok_or(ProcessError::EmptyCommand)?;
        let (mut child, reader) = Self::spawn(program, args)?;

        let output_handle = thread::spawn(move || read_pipe(reader));
        let input_handle = child
            .stdin
            .take()
            .map(|stdin| spawn_writer(stdin, input.to_vec()));

        // On timeout the reader is left detached: a grandchild may still hold
        // the write end of the pipe open.
        let status = self.wait(program, &mut child)?;

        let io_error = |source| ProcessError::Io {
            program: program.to_string(),
            source,
        };
        if let Some(handle) = input_handle {
            join(handle).map_err(io_error)?;
        }
        let combined_output = join(output_handle).map_err(io_error)?;

        Ok(ProcessOutput {
            exit_code: status.code(),
            combined_output,
        })
    }
}

fn spawn_writer(mut stdin: ChildStdin, input: Vec<u8>) -> JoinHandle<io::Result<()>> {
    thread::spawn(move || {
        let result = stdin.write_all(&input).and_then(|_| stdin.flush());
        // Dropping stdin closes it, which is the child's EOF.
        drop(stdin);
        match result {
            // The linter may exit without consuming its whole input.
            Err(e) if e.kind() == ErrorKind::BrokenPipe => Ok(()),
            other => other,
        }
    })
}

/// Kills and reaps a child whose result is no longer wanted.
fn abandon(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

fn read_pipe<R: Read>(mut pipe: R) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    pipe.read_to_end(&mut buf)?;
    Ok(buf)
}

fn join<T>(handle: JoinHandle<io::Result<T>>) -> io::Result<T> {
    handle
        .join()
        .unwrap_or_else(|_| Err(io::Error::other("pipe thread panicked")))
}
