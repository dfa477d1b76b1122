//! Subprocess invoker for the external CLI critics (spec §4.1).
//!
//! Spawns exactly one of `claude`, `codex`, or `gemini` directly — no shell
//! interpolation of caller-controlled text — and enforces the wall-clock
//! timeout, CPU-time ceiling, and output-size cap around it. Grounded on
//! `sven-tools::builtin::shell::ShellTool` for the POSIX process-group /
//! `kill_on_drop` / `pre_exec(setsid)` isolation pattern.

use std::collections::HashSet;
use std::process::Stdio;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use brutalist_types::CliAgent;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tracing::warn;
#[cfg(unix)]
use std::os::unix::process::CommandExt;

/// Default per-invocation wall-clock timeout (spec §4.1).
pub const DEFAULT_WALL_CLOCK_TIMEOUT: Duration = Duration::from_secs(25 * 60);

/// Minimum wall-clock timeout floor Codex and Gemini get regardless of the
/// caller's requested timeout — avoids pathological early cancellation.
pub const MIN_TIMEOUT_FLOOR: Duration = Duration::from_secs(3 * 60);

/// Default CPU-time ceiling; must stay greater than the wall-clock timeout.
pub const DEFAULT_CPU_TIME_CEILING: Duration = Duration::from_secs(30 * 60);

/// Per-stream output buffer cap; exceeding it kills the process tree.
pub const OUTPUT_BUFFER_CAP_BYTES: usize = 10 * 1024 * 1024;

/// Grace period between SIGTERM and SIGKILL during tree termination.
const KILL_GRACE_PERIOD: Duration = Duration::from_secs(5);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InvokeFailure {
    #[error("{0} CLI not found on PATH")]
    NotAvailable(String),
    #[error("{0} reported a rate limit")]
    RateLimited(String),
    #[error("analysis timed out after {0:?}")]
    TimedOut(Duration),
    #[error("output exceeded {OUTPUT_BUFFER_CAP_BYTES} bytes and was truncated")]
    BufferOverflow,
    #[error("target path not found: {0}")]
    TargetPathNotFound(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("{0} exited with a non-zero status: {1}")]
    Generic(String, String),
}

impl InvokeFailure {
    /// Maps this per-invocation failure onto the user-visible error taxonomy
    /// exposed to MCP clients (spec §7).
    pub fn classify(&self) -> brutalist_types::BrutalistError {
        use brutalist_types::BrutalistError;
        match self {
            InvokeFailure::TimedOut(_) => BrutalistError::Timeout,
            InvokeFailure::TargetPathNotFound(_) => BrutalistError::PathNotFound,
            InvokeFailure::PermissionDenied(_) => BrutalistError::Permission,
            InvokeFailure::NotAvailable(_)
            | InvokeFailure::RateLimited(_)
            | InvokeFailure::BufferOverflow
            | InvokeFailure::Generic(_, _) => BrutalistError::Generic,
        }
    }
}

pub struct InvokeRequest {
    pub agent: CliAgent,
    pub system_prompt: String,
    pub user_prompt: String,
    pub working_directory: Option<std::path::PathBuf>,
    pub timeout: Duration,
    pub model: Option<String>,
}

#[derive(Debug, Clone)]
pub struct InvokeResult {
    pub agent: CliAgent,
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub execution_time: Duration,
    pub exit_code: Option<i32>,
    pub command_summary: String,
    pub error: Option<InvokeFailure>,
}

/// Asserts the CPU-time ceiling exceeds the wall-clock timeout (spec §9 Open
/// Question 4: "CPU timeout should exceed process timeout").
pub fn assert_resource_limits_sane(
    cpu_time_ceiling: Duration,
    wall_clock_timeout: Duration,
) -> Result<()> {
    if cpu_time_ceiling <= wall_clock_timeout {
        anyhow::bail!(
            "MAX_CPU_TIME_SEC ({:?}) must exceed the wall-clock timeout ({:?}), \
             otherwise the CPU limit could fire before the wall-clock timeout",
            cpu_time_ceiling,
            wall_clock_timeout
        );
    }
    Ok(())
}

pub struct CliInvoker {
    cpu_time_ceiling: Duration,
    /// Process-group ids of currently running children, so a shutdown path
    /// can cut them short instead of waiting out their wall-clock timeout.
    active_groups: Mutex<HashSet<i32>>,
}

impl CliInvoker {
    pub fn new(cpu_time_ceiling: Duration) -> Result<Self> {
        assert_resource_limits_sane(cpu_time_ceiling, DEFAULT_WALL_CLOCK_TIMEOUT)?;
        Ok(CliInvoker {
            cpu_time_ceiling,
            active_groups: Mutex::new(HashSet::new()),
        })
    }

    /// Number of subprocess groups currently tracked as running.
    pub fn active_count(&self) -> usize {
        self.active_groups.lock().unwrap().len()
    }

    /// Sends SIGTERM to every currently tracked subprocess group. Used by
    /// the server's shutdown path; each invocation's own timeout/kill
    /// handling still applies if a child ignores the signal.
    pub fn abort_active(&self) {
        #[cfg(unix)]
        {
            let groups = self.active_groups.lock().unwrap();
            for &pgid in groups.iter() {
                unsafe {
                    libc::kill(-pgid, libc::SIGTERM);
                }
            }
        }
    }

    /// Effective wall-clock timeout for `request`, after applying the
    /// per-agent minimum floor.
    fn effective_timeout(&self, request: &InvokeRequest) -> Duration {
        let floor = match request.agent {
            CliAgent::Codex | CliAgent::Gemini => MIN_TIMEOUT_FLOOR,
            CliAgent::Claude => Duration::ZERO,
        };
        request.timeout.max(floor)
    }

    pub async fn invoke(&self, request: InvokeRequest) -> InvokeResult {
        let started = Instant::now();
        let timeout = self.effective_timeout(&request);
        let (program, args, stdin_payload, summary) = build_command(&request);

        if let Some(wd) = &request.working_directory {
            if let Some(error) = check_target_path(wd) {
                return InvokeResult {
                    agent: request.agent,
                    success: false,
                    stdout: String::new(),
                    stderr: String::new(),
                    execution_time: started.elapsed(),
                    exit_code: None,
                    command_summary: summary,
                    error: Some(error),
                };
            }
        }

        let mut cmd = Command::new(&program);
        cmd.args(&args);
        if let Some(wd) = &request.working_directory {
            cmd.current_dir(wd);
        }
        cmd.env(brutalist_config::SUBPROCESS_MARKER_VAR, "1");
        cmd.stdin(if stdin_payload.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);
        #[cfg(unix)]
        {
            let cpu_secs = self.cpu_time_ceiling.as_secs();
            unsafe {
                cmd.pre_exec(move || {
                    libc::setsid();
                    let limit = libc::rlimit {
                        rlim_cur: cpu_secs,
                        rlim_max: cpu_secs,
                    };
                    libc::setrlimit(libc::RLIMIT_CPU, &limit);
                    Ok(())
                });
            }
        }

        let mut child = match cmd.spawn() {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return InvokeResult {
                    agent: request.agent,
                    success: false,
                    stdout: String::new(),
                    stderr: String::new(),
                    execution_time: started.elapsed(),
                    exit_code: None,
                    command_summary: summary,
                    error: Some(InvokeFailure::NotAvailable(program)),
                };
            }
            Err(e) => {
                return InvokeResult {
                    agent: request.agent,
                    success: false,
                    stdout: String::new(),
                    stderr: String::new(),
                    execution_time: started.elapsed(),
                    exit_code: None,
                    command_summary: summary,
                    error: Some(InvokeFailure::Generic(program, e.to_string())),
                };
            }
        };

        let pgid = child.id().map(|pid| pid as i32);
        if let Some(pgid) = pgid {
            self.active_groups.lock().unwrap().insert(pgid);
        }
        let _guard = pgid.map(|pgid| ActiveGroupGuard {
            registry: &self.active_groups,
            pgid,
        });

        if let Some(payload) = stdin_payload {
            if let Some(mut stdin) = child.stdin.take() {
                let _ = stdin.write_all(payload.as_bytes()).await;
                let _ = stdin.shutdown().await;
            }
        }

        let run = tokio::time::timeout(timeout, run_to_completion(&mut child));
        match run.await {
            Ok(Ok((stdout, stderr, status, overflowed))) => {
                let execution_time = started.elapsed();
                let exit_code = status.code();
                if overflowed {
                    kill_tree(&child).await;
                    return InvokeResult {
                        agent: request.agent,
                        success: false,
                        stdout,
                        stderr,
                        execution_time,
                        exit_code,
                        command_summary: summary,
                        error: Some(InvokeFailure::BufferOverflow),
                    };
                }
                let error = classify_failure(&request.agent, exit_code, &stderr, &program);
                InvokeResult {
                    agent: request.agent,
                    success: error.is_none(),
                    stdout,
                    stderr,
                    execution_time,
                    exit_code,
                    command_summary: summary,
                    error,
                }
            }
            Ok(Err(e)) => InvokeResult {
                agent: request.agent,
                success: false,
                stdout: String::new(),
                stderr: String::new(),
                execution_time: started.elapsed(),
                exit_code: None,
                command_summary: summary,
                error: Some(InvokeFailure::Generic(program, e.to_string())),
            },
            Err(_elapsed) => {
                kill_tree(&child).await;
                InvokeResult {
                    agent: request.agent,
                    success: false,
                    stdout: String::new(),
                    stderr: String::new(),
                    execution_time: started.elapsed(),
                    exit_code: None,
                    command_summary: summary,
                    error: Some(InvokeFailure::TimedOut(timeout)),
                }
            }
        }
    }
}

/// Removes a spawned child's process-group id from the active registry once
/// `invoke` returns, regardless of which branch it returns from.
struct ActiveGroupGuard<'a> {
    registry: &'a Mutex<HashSet<i32>>,
    pgid: i32,
}

impl Drop for ActiveGroupGuard<'_> {
    fn drop(&mut self) {
        self.registry.lock().unwrap().remove(&self.pgid);
    }
}

/// Read stdout/stderr concurrently up to the buffer cap, then wait for exit.
async fn run_to_completion(
    child: &mut Child,
) -> std::io::Result<(String, String, std::process::ExitStatus, bool)> {
    let mut stdout = child.stdout.take().expect("stdout piped");
    let mut stderr = child.stderr.take().expect("stderr piped");

    let stdout_fut = read_capped(&mut stdout);
    let stderr_fut = read_capped(&mut stderr);
    let (out, err) = tokio::join!(stdout_fut, stderr_fut);
    let (out_bytes, out_overflow) = out?;
    let (err_bytes, err_overflow) = err?;

    let status = child.wait().await?;
    Ok((
        String::from_utf8_lossy(&out_bytes).into_owned(),
        String::from_utf8_lossy(&err_bytes).into_owned(),
        status,
        out_overflow || err_overflow,
    ))
}

async fn read_capped<R: tokio::io::AsyncRead + Unpin>(
    reader: &mut R,
) -> std::io::Result<(Vec<u8>, bool)> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 8192];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        if buf.len() > OUTPUT_BUFFER_CAP_BYTES {
            warn!(cap = OUTPUT_BUFFER_CAP_BYTES, "subprocess output exceeded buffer cap");
            return Ok((buf, true));
        }
    }
    Ok((buf, false))
}

/// Send SIGTERM to the whole process group, escalating to SIGKILL after
/// [`KILL_GRACE_PERIOD`] if the process is still alive.
async fn kill_tree(child: &Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        unsafe {
            libc::kill(-(pid as i32), libc::SIGTERM);
        }
        tokio::time::sleep(KILL_GRACE_PERIOD).await;
        unsafe {
            libc::kill(-(pid as i32), libc::SIGKILL);
        }
    }
    #[cfg(not(unix))]
    {
        let _ = child;
    }
}

/// Validates a filesystem-tool target directory before spawning, so a
/// missing or inaccessible path is reported as such rather than masquerading
/// as "CLI not found" (both surface as `ErrorKind::NotFound` from `spawn()`
/// once `current_dir` is involved).
fn check_target_path(path: &std::path::Path) -> Option<InvokeFailure> {
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_dir() => None,
        Ok(_) => Some(InvokeFailure::TargetPathNotFound(path.display().to_string())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Some(InvokeFailure::TargetPathNotFound(path.display().to_string()))
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            Some(InvokeFailure::PermissionDenied(path.display().to_string()))
        }
        Err(_) => Some(InvokeFailure::TargetPathNotFound(path.display().to_string())),
    }
}

fn classify_failure(
    agent: &CliAgent,
    exit_code: Option<i32>,
    stderr: &str,
    program: &str,
) -> Option<InvokeFailure> {
    match exit_code {
        Some(0) => None,
        Some(_) => {
            let lower = stderr.to_ascii_lowercase();
            if lower.contains("429") || lower.contains("rate limit") {
                Some(InvokeFailure::RateLimited(agent.to_string()))
            } else {
                Some(InvokeFailure::Generic(program.to_string(), stderr.to_string()))
            }
        }
        None => Some(InvokeFailure::Generic(
            program.to_string(),
            "process terminated by signal".to_string(),
        )),
    }
}

/// Shape argv/stdin for one agent (spec §4.1).
fn build_command(request: &InvokeRequest) -> (String, Vec<String>, Option<String>, String) {
    match request.agent {
        CliAgent::Claude => {
            let mut args = vec!["--print".to_string()];
            if let Some(model) = &request.model {
                args.push("--model".to_string());
                args.push(model.clone());
            }
            args.push("--append-system-prompt".to_string());
            args.push(request.system_prompt.clone());
            args.push(request.user_prompt.clone());
            let summary = "claude --print [--model] --append-system-prompt <...> <...>".to_string();
            ("claude".to_string(), args, None, summary)
        }
        CliAgent::Codex => {
            let mut args = vec!["exec".to_string()];
            if let Some(model) = &request.model {
                args.push("--model".to_string());
                args.push(model.clone());
            }
            args.push("--sandbox".to_string());
            args.push("read-only".to_string());
            if let Some(wd) = &request.working_directory {
                args.push("--cd".to_string());
                args.push(wd.display().to_string());
            }
            args.push(format!("{}\n\n{}", request.system_prompt, request.user_prompt));
            let summary = "codex exec [--model] --sandbox read-only --cd <wd> <prompt>".to_string();
            ("codex".to_string(), args, None, summary)
        }
        CliAgent::Gemini => {
            let mut args = Vec::new();
            if let Some(model) = &request.model {
                args.push("--model".to_string());
                args.push(model.clone());
            }
            args.push("--sandbox".to_string());
            args.push("--yolo".to_string());
            let stdin = format!("{}\n\n{}", request.system_prompt, request.user_prompt);
            let summary = "gemini [--model] --sandbox --yolo <stdin>".to_string();
            ("gemini".to_string(), args, Some(stdin), summary)
        }
    }
}
