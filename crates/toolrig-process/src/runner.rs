//! Subprocess runner (§4.4): explicit argv, sudo stdin piping, per-step
//! timeouts, line-streamed output with `progress_regex` support.

use regex::Regex;
use std::collections::VecDeque;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};

const TAIL_LINES: usize = 200;

/// What to run and how, for one step.
#[derive(Debug, Clone, Default)]
pub struct RunSpec {
    pub argv: Vec<String>,
    pub needs_sudo: bool,
    pub sudo_password: Option<String>,
    pub timeout: Option<Duration>,
    /// A `bash`-evaluated prefix (an earlier step's `post_env`), prepended
    /// for step types `tool`/`verify`/`command`/`build`/`install`.
    pub post_env_prefix: Option<String>,
    pub progress_regex: Option<String>,
    pub cwd: Option<std::path::PathBuf>,
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub ok: bool,
    pub returncode: i32,
    pub stdout_tail: String,
    pub stderr_tail: String,
    pub duration_ms: u64,
    pub timed_out: bool,
}

/// Run `spec` to completion (or until its timeout fires), invoking
/// `on_progress` with each parsed percentage from `progress_regex`.
pub async fn run(spec: RunSpec, mut on_progress: impl FnMut(u32) + Send + 'static) -> RunOutcome {
    let progress_regex = spec
        .progress_regex
        .as_deref()
        .and_then(|pattern| Regex::new(pattern).ok());

    let mut command = build_command(&spec);
    command.stdout(Stdio::piped());
    command.stderr(Stdio::piped());
    command.stdin(if spec.needs_sudo {
        Stdio::piped()
    } else {
        Stdio::null()
    });
    command.kill_on_drop(true);
    if let Some(cwd) = &spec.cwd {
        command.current_dir(cwd);
    }

    let started = Instant::now();
    tracing::debug!(argv = ?spec.argv, needs_sudo = spec.needs_sudo, "spawning step subprocess");
    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(err) => {
            tracing::warn!(%err, argv = ?spec.argv, "failed to spawn step subprocess");
            return RunOutcome {
                ok: false,
                returncode: -1,
                stdout_tail: String::new(),
                stderr_tail: format!("failed to spawn: {err}"),
                duration_ms: started.elapsed().as_millis() as u64,
                timed_out: false,
            };
        }
    };

    if spec.needs_sudo {
        pipe_sudo_password(&mut child, spec.sudo_password.as_deref()).await;
    }

    let stdout_tail = Arc::new(Mutex::new(VecDeque::with_capacity(TAIL_LINES)));
    let stderr_tail = Arc::new(Mutex::new(VecDeque::with_capacity(TAIL_LINES)));

    let stdout = child.stdout.take().expect("stdout piped");
    let stderr = child.stderr.take().expect("stderr piped");

    let (progress_tx, mut progress_rx) = tokio::sync::mpsc::unbounded_channel::<u32>();
    let stdout_task = tokio::spawn(stream_lines(
        stdout,
        stdout_tail.clone(),
        progress_regex.clone(),
        Some(progress_tx.clone()),
    ));
    let stderr_task = tokio::spawn(stream_lines(stderr, stderr_tail.clone(), progress_regex, Some(progress_tx)));

    let progress_forwarder = tokio::spawn(async move {
        while let Some(pct) = progress_rx.recv().await {
            on_progress(pct);
        }
    });

    let timeout = spec.timeout.unwrap_or(Duration::from_secs(600));
    let wait_result = tokio::time::timeout(timeout, child.wait()).await;
    let _ = stdout_task.await;
    let _ = stderr_task.await;
    drop(progress_forwarder);

    let duration_ms = started.elapsed().as_millis() as u64;
    let stdout_tail = join_tail(&stdout_tail);
    let stderr_tail = join_tail(&stderr_tail);

    match wait_result {
        Ok(Ok(status)) => {
            tracing::debug!(code = status.code(), duration_ms, "step subprocess exited");
            RunOutcome {
                ok: status.success(),
                returncode: status.code().unwrap_or(-1),
                stdout_tail,
                stderr_tail,
                duration_ms,
                timed_out: false,
            }
        }
        Ok(Err(err)) => {
            tracing::warn!(%err, "failed to wait on step subprocess");
            RunOutcome {
                ok: false,
                returncode: -1,
                stdout_tail,
                stderr_tail: format!("{stderr_tail}\nwait failed: {err}"),
                duration_ms,
                timed_out: false,
            }
        }
        Err(_) => {
            tracing::warn!(duration_ms, "step subprocess timed out, killing");
            let _ = child.start_kill();
            RunOutcome {
                ok: false,
                returncode: -1,
                stdout_tail,
                stderr_tail,
                duration_ms,
                timed_out: true,
            }
        }
    }
}

fn build_command(spec: &RunSpec) -> Command {
    if spec.needs_sudo {
        let mut command = Command::new("sudo");
        command.arg("-S").arg("-k");
        command.args(wrapped_argv(spec));
        return command;
    }

    if let Some(prefix) = &spec.post_env_prefix {
        let joined = shell_join(&spec.argv);
        let mut command = Command::new("bash");
        command.arg("-lc").arg(format!("{prefix} && {joined}"));
        return command;
    }

    let mut command = Command::new(&spec.argv[0]);
    command.args(&spec.argv[1..]);
    command
}

fn wrapped_argv(spec: &RunSpec) -> Vec<String> {
    match &spec.post_env_prefix {
        Some(prefix) => vec![
            "bash".to_string(),
            "-lc".to_string(),
            format!("{prefix} && {}", shell_join(&spec.argv)),
        ],
        None => spec.argv.clone(),
    }
}

fn shell_join(argv: &[String]) -> String {
    argv.iter()
        .map(|tok| shell_quote(tok))
        .collect::<Vec<_>>()
        .join(" ")
}

fn shell_quote(token: &str) -> String {
    if token.chars().all(|c| c.is_ascii_alphanumeric() || "-_./:=@".contains(c)) {
        token.to_string()
    } else {
        format!("'{}'", token.replace('\'', "'\\''"))
    }
}

async fn pipe_sudo_password(child: &mut Child, password: Option<&str>) {
    let Some(stdin) = child.stdin.take() else {
        return;
    };
    let Some(password) = password else {
        drop(stdin);
        return;
    };
    let payload = format!("{password}\n");
    let mut stdin = stdin;
    let _ = tokio::time::timeout(Duration::from_secs(10), async {
        stdin.write_all(payload.as_bytes()).await?;
        stdin.shutdown().await
    })
    .await;
}

async fn stream_lines<R>(
    reader: R,
    tail: Arc<Mutex<VecDeque<String>>>,
    progress_regex: Option<Regex>,
    progress_tx: Option<tokio::sync::mpsc::UnboundedSender<u32>>,
) where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if let Some(regex) = &progress_regex
            && let Some(captures) = regex.captures(&line)
            && let Some(sender) = &progress_tx
            && let Some(pct) = captures.get(1).and_then(|m| m.as_str().parse::<u32>().ok())
        {
            let _ = sender.send(pct);
        }
        let mut guard = tail.lock().expect("tail mutex poisoned");
        if guard.len() == TAIL_LINES {
            guard.pop_front();
        }
        guard.push_back(line);
    }
}

fn join_tail(tail: &Arc<Mutex<VecDeque<String>>>) -> String {
    tail.lock().expect("tail mutex poisoned").iter().cloned().collect::<Vec<_>>().join("\n")
}
