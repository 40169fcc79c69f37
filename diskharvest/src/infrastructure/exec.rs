// /////////////////////////////////////////////////////////////////////////////
// Diskharvest
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Shell Executor
//!
//! Uniform child-process invocation for every external helper the pipeline
//! touches (lsblk, blkid, mdadm, mount, rsync, ...). Commands are argument
//! vectors, never shell strings; stdout and stderr are captured with a
//! hard bound so a chatty helper cannot balloon memory; a timeout kills
//! the child.
//!
//! ## Dry-run mode
//!
//! A `Shell` constructed with dry-run set records the command as a
//! structured log event and returns synthetic success without spawning.
//! Inspection commands never mutate the host, so the inspector uses a
//! non-dry shell even under `--dry-run` - the plan still needs a real
//! topology to describe.
//!
//! ## Downstream contract
//!
//! Every other infrastructure component invokes helpers exclusively
//! through this module; none of them construct `std::process::Command`
//! themselves.

use std::io::Read;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use diskharvest_domain::HarvestError;

/// Cap on captured stdout/stderr (each).
const CAPTURE_LIMIT: usize = 256 * 1024;

/// Default timeout for helper invocations.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

/// One command invocation.
#[derive(Debug, Clone)]
pub struct ExecRequest {
    pub argv: Vec<String>,
    pub stdin: Option<Vec<u8>>,
    pub env: Vec<(String, String)>,
    pub cwd: Option<PathBuf>,
    pub timeout: Duration,
}

impl ExecRequest {
    pub fn new<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            argv: argv.into_iter().map(Into::into).collect(),
            stdin: None,
            env: Vec::new(),
            cwd: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn stdin(mut self, bytes: Vec<u8>) -> Self {
        self.stdin = Some(bytes);
        self
    }

    fn display(&self) -> String {
        self.argv.join(" ")
    }
}

/// Captured result of a completed command.
#[derive(Debug, Clone)]
pub struct ExecOutput {
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

impl ExecOutput {
    fn synthetic() -> Self {
        Self {
            status: 0,
            stdout: String::new(),
            stderr: String::new(),
            duration: Duration::ZERO,
        }
    }
}

/// Child-process executor with optional dry-run.
#[derive(Debug, Clone)]
pub struct Shell {
    dry_run: bool,
}

impl Shell {
    /// Executor that honors the run's dry-run flag. Used by every
    /// component that mutates host state (layers, mount, chunker, ship).
    pub fn new(dry_run: bool) -> Self {
        Self { dry_run }
    }

    /// Executor for read-only queries (lsblk, blkid, findmnt): always
    /// spawns, even under `--dry-run`.
    pub fn read_only() -> Self {
        Self { dry_run: false }
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Run a command with the default timeout and no stdin.
    pub fn run<I, S>(&self, argv: I) -> Result<ExecOutput, HarvestError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.run_with(ExecRequest::new(argv))
    }

    /// Run a command, requiring exit status zero.
    pub fn run_checked<I, S>(&self, argv: I) -> Result<ExecOutput, HarvestError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let request = ExecRequest::new(argv);
        let command = request.display();
        let output = self.run_with(request)?;
        if output.status != 0 {
            return Err(HarvestError::ExecNonZero {
                command,
                status: output.status,
                stderr: output.stderr.clone(),
            });
        }
        Ok(output)
    }

    /// Run a full request. Non-zero exit is not an error here; callers
    /// that need success use [`Shell::run_checked`].
    pub fn run_with(&self, request: ExecRequest) -> Result<ExecOutput, HarvestError> {
        let command = request.display();
        if request.argv.is_empty() {
            return Err(HarvestError::Internal("empty argv".to_string()));
        }

        if self.dry_run {
            tracing::info!(command = %command, dry_run = true, "would execute");
            return Ok(ExecOutput::synthetic());
        }

        tracing::debug!(command = %command, "executing");
        let started = Instant::now();

        let mut builder = Command::new(&request.argv[0]);
        builder
            .args(&request.argv[1..])
            .stdin(if request.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        for (key, value) in &request.env {
            builder.env(key, value);
        }
        if let Some(cwd) = &request.cwd {
            builder.current_dir(cwd);
        }

        let mut child = builder.spawn().map_err(|err| HarvestError::ExecSpawn {
            command: command.clone(),
            detail: err.to_string(),
        })?;

        // Feed stdin from a helper thread so a full pipe cannot deadlock
        // against our stdout reader.
        let stdin_thread = match (request.stdin, child.stdin.take()) {
            (Some(bytes), Some(mut stdin)) => Some(std::thread::spawn(move || {
                use std::io::Write;
                let _ = stdin.write_all(&bytes);
            })),
            _ => None,
        };

        let stdout_thread = spawn_capture(child.stdout.take());
        let stderr_thread = spawn_capture(child.stderr.take());

        // Poll with a coarse tick; helper granularity, not a scheduler.
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {
                    if started.elapsed() > request.timeout {
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(HarvestError::ExecTimeout {
                            command,
                            timeout_secs: request.timeout.as_secs(),
                        });
                    }
                    std::thread::sleep(Duration::from_millis(25));
                }
                Err(err) => {
                    return Err(HarvestError::ExecSpawn {
                        command,
                        detail: err.to_string(),
                    })
                }
            }
        };

        if let Some(handle) = stdin_thread {
            let _ = handle.join();
        }
        let stdout = stdout_thread.join().unwrap_or_default();
        let stderr = stderr_thread.join().unwrap_or_default();
        let duration = started.elapsed();
        let code = status.code().unwrap_or(-1);

        tracing::debug!(
            command = %command,
            status = code,
            elapsed_ms = duration.as_millis() as u64,
            "command finished"
        );

        Ok(ExecOutput {
            status: code,
            stdout,
            stderr,
            duration,
        })
    }
}

/// Drain a pipe on a thread, keeping at most [`CAPTURE_LIMIT`] bytes.
pub(crate) fn spawn_capture<R: Read + Send + 'static>(
    pipe: Option<R>,
) -> std::thread::JoinHandle<String> {
    std::thread::spawn(move || {
        let Some(mut pipe) = pipe else {
            return String::new();
        };
        let mut captured = Vec::new();
        let mut buf = [0u8; 8192];
        loop {
            match pipe.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    if captured.len() < CAPTURE_LIMIT {
                        let room = CAPTURE_LIMIT - captured.len();
                        captured.extend_from_slice(&buf[..n.min(room)]);
                    }
                    // Keep draining past the cap so the child never blocks.
                }
                Err(_) => break,
            }
        }
        String::from_utf8_lossy(&captured).into_owned()
    })
}
