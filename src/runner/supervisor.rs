//! Agent child-process supervision.
//!
//! Spawns the routed agent with the rendered args template, captures
//! stdout/stderr up to a fixed cap, and enforces the wall-clock ceiling
//! with a graceful SIGTERM followed by a hard kill.

use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};

use crate::board::models::AgentDef;
use crate::errors::SupervisorError;

pub const AGENT_TIMEOUT: Duration = Duration::from_secs(600);
pub const KILL_GRACE: Duration = Duration::from_secs(5);
pub const CAPTURE_LIMIT: usize = 10 * 1024 * 1024;

/// What happened to one agent run.
#[derive(Debug)]
pub struct Outcome {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
    pub timed_out: bool,
}

/// Substitute `{prompt}` and `{timestamp}` in the args template.
pub fn render_args(template: &[String], prompt: &str, timestamp: &str) -> Vec<String> {
    template
        .iter()
        .map(|arg| arg.replace("{prompt}", prompt).replace("{timestamp}", timestamp))
        .collect()
}

/// A spawned agent awaiting supervision. Exposes the pid for the status
/// surface before the caller commits to waiting.
#[derive(Debug)]
pub struct RunningAgent {
    child: Child,
    started: Instant,
    capture_limit: usize,
}

/// Spawn the agent process: command from PATH, rendered args, workspace as
/// cwd, environment inherited (plus HOME), stdin closed.
pub fn start(
    agent: &AgentDef,
    prompt: &str,
    workdir: &Path,
) -> Result<RunningAgent, SupervisorError> {
    start_with_capture_limit(agent, prompt, workdir, CAPTURE_LIMIT)
}

pub fn start_with_capture_limit(
    agent: &AgentDef,
    prompt: &str,
    workdir: &Path,
    capture_limit: usize,
) -> Result<RunningAgent, SupervisorError> {
    let timestamp = chrono::Utc::now().format("%Y%m%dT%H%M%S").to_string();
    let args = render_args(&agent.args, prompt, &timestamp);

    let mut cmd = Command::new(&agent.cmd);
    cmd.args(&args)
        .current_dir(workdir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Ok(home) = std::env::var("HOME") {
        cmd.env("HOME", home);
    }

    let child = cmd.spawn().map_err(|source| SupervisorError::SpawnFailed {
        cmd: agent.cmd.clone(),
        source,
    })?;

    Ok(RunningAgent {
        child,
        started: Instant::now(),
        capture_limit,
    })
}

impl RunningAgent {
    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    /// Wait for the process under the default ceiling.
    pub async fn supervise(self) -> Result<Outcome, SupervisorError> {
        self.supervise_with(AGENT_TIMEOUT, KILL_GRACE).await
    }

    /// Wait for the process, enforcing `timeout` with SIGTERM and a hard
    /// kill after `grace`. Output beyond the capture limit is drained and
    /// dropped so the child never blocks on a full pipe.
    pub async fn supervise_with(
        mut self,
        timeout: Duration,
        grace: Duration,
    ) -> Result<Outcome, SupervisorError> {
        let stdout = self.child.stdout.take();
        let stderr = self.child.stderr.take();
        let limit = self.capture_limit;

        let stdout_task = tokio::spawn(read_capped(stdout, limit));
        let stderr_task = tokio::spawn(read_capped(stderr, limit));

        let mut timed_out = false;
        let status = tokio::select! {
            status = self.child.wait() => status.map_err(SupervisorError::WaitFailed)?,
            _ = tokio::time::sleep(timeout) => {
                timed_out = true;
                terminate(&mut self.child, grace).await?
            }
        };

        let stdout = stdout_task.await.unwrap_or_default();
        let stderr = stderr_task.await.unwrap_or_default();
        let exit_code = status.code();

        Ok(Outcome {
            success: !timed_out && exit_code == Some(0),
            exit_code,
            stdout,
            stderr,
            duration_ms: self.started.elapsed().as_millis() as u64,
            timed_out,
        })
    }
}

/// SIGTERM, wait out the grace period, then SIGKILL.
async fn terminate(
    child: &mut Child,
    grace: Duration,
) -> Result<std::process::ExitStatus, SupervisorError> {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        use nix::sys::signal::{Signal, kill};
        use nix::unistd::Pid;
        let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
    }

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(status) => status.map_err(SupervisorError::WaitFailed),
        Err(_) => {
            let _ = child.kill().await;
            child.wait().await.map_err(SupervisorError::WaitFailed)
        }
    }
}

/// Read a stream to EOF, keeping at most `limit` bytes. Draining past the
/// cap keeps the child's pipe from filling up.
async fn read_capped<R>(stream: Option<R>, limit: usize) -> String
where
    R: tokio::io::AsyncRead + Unpin + Send,
{
    let Some(mut stream) = stream else {
        return String::new();
    };
    let mut captured: Vec<u8> = Vec::new();
    let mut buf = [0u8; 8192];
    loop {
        match stream.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                let room = limit.saturating_sub(captured.len());
                if room > 0 {
                    captured.extend_from_slice(&buf[..n.min(room)]);
                }
            }
            Err(_) => break,
        }
    }
    String::from_utf8_lossy(&captured).into_owned()
}
