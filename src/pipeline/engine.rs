//! OCR engine adapter: run the external recogniser on one chunk.
//!
//! The engine is an isolated child process started from an argument vector
//! (never a shell string). Its combined stdout/stderr is read while it runs
//! but only the last [`DIAGNOSTIC_TAIL_LINES`] lines are kept, so a chatty
//! engine cannot grow the worker's memory or the job's error message.
//!
//! ## Timeouts
//!
//! Each invocation gets a wall-clock budget. On unix the engine leads its own
//! process group. When the budget runs out the whole group is killed and the
//! engine is reaped before [`OcrEngine::process`] returns, and any partial
//! output file is removed.

use crate::config::{EngineOptions, TextLayerMode};
use crate::error::PdfOcrError;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

/// Lines of engine output kept for diagnostics.
pub const DIAGNOSTIC_TAIL_LINES: usize = 30;

/// Longest single diagnostic line kept, in bytes.
const MAX_LINE_BYTES: usize = 2048;

/// How long to keep reading output after the engine has exited.
const OUTPUT_DRAIN_GRACE: Duration = Duration::from_secs(2);

/// One unit of engine work.
#[derive(Debug, Clone)]
pub struct ChunkJob<'a> {
    /// 1-based chunk index, for errors and logs.
    pub chunk: usize,
    pub input: &'a Path,
    pub output: &'a Path,
    pub options: &'a EngineOptions,
    pub timeout: Duration,
}

/// A text-recognition engine that turns a chunk PDF into a searchable one.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Fail with [`PdfOcrError::DependencyMissing`] naming every absent tool.
    ///
    /// Called once per job, before any chunk work.
    async fn check_dependencies(&self) -> Result<(), PdfOcrError>;

    /// Process one chunk, returning the path of the written artifact.
    ///
    /// On success exactly one file exists at `job.output`; on failure none.
    async fn process(&self, job: &ChunkJob<'_>) -> Result<PathBuf, PdfOcrError> {
        let start = Instant::now();
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.leading_args)
            .args(build_args(job.options, job.input, job.output))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // tesseract and gs run as children of the engine; a fresh group lets
        // a timeout take them down too.
        #[cfg(unix)]
        cmd.process_group(0);

        debug!("Chunk {}: running {:?}", job.chunk, cmd.as_std());

        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                PdfOcrError::DependencyMissing {
                    tools: vec![self.program.display().to_string()],
                }
            } else {
                PdfOcrError::io(&self.program, e)
            }
        })?;
        let mut group = GroupKill::new(&child);

        let tail = SharedTail::new(DIAGNOSTIC_TAIL_LINES);
        let mut readers = [
            tokio::spawn(collect_lines(child.stdout.take(), tail.clone())),
            tokio::spawn(collect_lines(child.stderr.take(), tail.clone())),
        ];

        let status = match tokio::time::timeout(job.timeout, child.wait()).await {
            Ok(Ok(status)) => {
                group.disarm();
                status
            }
            Ok(Err(e)) => {
                terminate(&mut child, &mut group, job.chunk).await;
                readers.iter().for_each(|r| r.abort());
                discard_partial(job.output).await;
                return Err(PdfOcrError::io(&self.program, e));
            }
            Err(_) => {
                warn!(
                    "Chunk {}: engine exceeded {}s, killing process group {:?}",
                    job.chunk,
                    job.timeout.as_secs(),
                    child.id()
                );
                terminate(&mut child, &mut group, job.chunk).await;
                readers.iter().for_each(|r| r.abort());
                discard_partial(job.output).await;
                return Err(PdfOcrError::EngineTimeout {
                    chunk: job.chunk,
                    secs: job.timeout.as_secs(),
                });
            }
        };

        // A straggler that inherited the pipes keeps them open after the
        // engine exits; stop reading after a short grace period.
        let drained = tokio::time::timeout(
            OUTPUT_DRAIN_GRACE,
            futures::future::join_all(readers.iter_mut()),
        )
        .await;
        if drained.is_err() {
            debug!("Chunk {}: output pipes still open after exit", job.chunk);
            readers.iter().for_each(|r| r.abort());
        }
        let tail = tail.render();

        if !status.success() {
            warn!(
                "Chunk {}: engine exited with {:?} after {:?}",
                job.chunk,
                status.code(),
                start.elapsed()
            );
            discard_partial(job.output).await;
            return Err(PdfOcrError::EngineFailure {
                chunk: job.chunk,
                exit_code: status.code(),
                tail,
            });
        }

        if tokio::fs::metadata(job.output).await.is_err() {
            return Err(PdfOcrError::EngineFailure {
                chunk: job.chunk,
                exit_code: status.code(),
                tail: format!("engine exited successfully but wrote no output\n{tail}"),
            });
        }

        info!("Chunk {}: OCR finished in {:?}", job.chunk, start.elapsed());
        Ok(job.output.to_path_buf())
    }
}

/// Kill the engine and everything in its process group, then reap it.
async fn terminate(child: &mut Child, group: &mut GroupKill, chunk: usize) {
    if group.fire() {
        if let Err(e) = child.wait().await {
            warn!("Chunk {}: failed to reap engine: {}", chunk, e);
        }
        return;
    }
    // kill() sends SIGKILL and waits, so the child is reaped here.
    if let Err(e) = child.kill().await {
        warn!("Chunk {}: failed to kill engine: {}", chunk, e);
    }
}

/// SIGKILLs the engine's process group when dropped while armed, so a
/// cancelled `process` future does not leave tesseract or gs behind.
struct GroupKill {
    pgid: Option<u32>,
}

impl GroupKill {
    fn new(child: &Child) -> Self {
        Self { pgid: child.id() }
    }

    /// The engine has been reaped; its id may be reused from here on.
    fn disarm(&mut self) {
        self.pgid = None;
    }

    /// Signal the group now. False when no signal was sent.
    fn fire(&mut self) -> bool {
        self.pgid.take().is_some_and(kill_group)
    }
}

impl Drop for GroupKill {
    fn drop(&mut self) {
        self.fire();
    }
}

#[cfg(unix)]
fn kill_group(pgid: u32) -> bool {
    let Ok(pgid) = libc::pid_t::try_from(pgid) else {
        return false;
    };
    // SAFETY: killpg only sends a signal. The group leader is our unreaped
    // child, so the id cannot have been recycled.
    if unsafe { libc::killpg(pgid, libc::SIGKILL) } == 0 {
        true
    } else {
        debug!("killpg({}) failed: {}", pgid, std::io::Error::last_os_error());
        false
    }
}

#[cfg(not(unix))]
fn kill_group(_pgid: u32) -> bool {
    false
}

/// True when `tool` can be spawned. The exit status is irrelevant: some
/// tools reject `--version` but are still installed.
async fn probe(tool: &str) -> bool {
    Command::new(tool)
        .arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .status()
        .await
        .is_ok()
}

/// Last lines of the engine's stdout and stderr, interleaved in the order
/// they were read.
#[derive(Clone)]
struct SharedTail {
    lines: Arc<Mutex<VecDeque<String>>>,
    limit: usize,
}

impl SharedTail {
    fn new(limit: usize) -> Self {
        Self {
            lines: Arc::new(Mutex::new(VecDeque::with_capacity(limit))),
            limit,
        }
    }

    fn push(&self, line: String) {
        if self.limit == 0 {
            return;
        }
        let mut lines = self.lines.lock().unwrap_or_else(|p| p.into_inner());
        if lines.len() == self.limit {
            lines.pop_front();
        }
        lines.push_back(line);
    }

    fn render(&self) -> String {
        let lines = self.lines.lock().unwrap_or_else(|p| p.into_inner());
        lines.iter().map(String::as_str).collect::<Vec<_>>().join("\n")
    }
}

/// Read `reader` to EOF, pushing each line into `tail`.
async fn collect_lines<R>(reader: Option<R>, tail: SharedTail)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let Some(reader) = reader else {
        return;
    };
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {
                buf.truncate(MAX_LINE_BYTES);
                tail.push(String::from_utf8_lossy(&buf).trim_end().to_string());
            }
        }
    }
}

async fn discard_partial(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!("Removed partial engine output {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove partial output {}: {}", path.display(), e),
    }
}
