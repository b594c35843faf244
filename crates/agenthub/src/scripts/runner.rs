//! External program execution.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use log::{debug, info, warn};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;

use super::jobs::ScriptJobs;

/// Stdout line prefix carrying a progress JSON update.
pub const PROGRESS_PREFIX: &str = "progress*_*";
/// Stdout line prefix carrying the final response.
pub const RESPONSE_PREFIX: &str = "response-ready*_*";

/// Bytes of stderr kept in a failure report.
const STDERR_TAIL_BYTES: usize = 2048;

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{program} exited with status {code:?}: {stderr}")]
    Failed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("i/o error while running script: {0}")]
    Io(#[from] io::Error),
}

pub type ScriptResult<T> = Result<T, ScriptError>;

/// Runs one program to completion and returns its response text.
#[async_trait]
pub trait ScriptRunner: Send + Sync {
    async fn run(&self, json_config: &str, program: &str, tracking_id: &str)
    -> ScriptResult<String>;
}

/// Runs programs as child processes:
/// `<interpreter> <program> --json-param <config> --id <tracking_id>`.
#[derive(Debug, Clone)]
pub struct ProcessScriptRunner {
    interpreter: String,
    root: Option<PathBuf>,
    jobs: ScriptJobs,
}

impl ProcessScriptRunner {
    pub fn new(interpreter: impl Into<String>, root: Option<PathBuf>, jobs: ScriptJobs) -> Self {
        Self {
            interpreter: interpreter.into(),
            root,
            jobs,
        }
    }

    fn resolve(&self, program: &str) -> PathBuf {
        let path = Path::new(program);
        match &self.root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        }
    }
}

#[async_trait]
impl ScriptRunner for ProcessScriptRunner {
    async fn run(
        &self,
        json_config: &str,
        program: &str,
        tracking_id: &str,
    ) -> ScriptResult<String> {
        let path = self.resolve(program);
        info!("Running {} for {}", path.display(), tracking_id);

        let mut cmd = Command::new(&self.interpreter);
        cmd.arg(&path)
            .arg("--json-param")
            .arg(json_config)
            .arg("--id")
            .arg(tracking_id)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(root) = &self.root {
            cmd.current_dir(root);
        }

        let mut child = cmd.spawn().map_err(|source| ScriptError::Spawn {
            program: program.to_string(),
            source,
        })?;

        let stderr_task = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut buf = String::new();
                let _ = stderr.read_to_string(&mut buf).await;
                buf
            })
        });

        let mut response = None;
        let mut output = String::new();
        if let Some(stdout) = child.stdout.take() {
            let mut lines = BufReader::new(stdout).lines();
            while let Some(line) = lines.next_line().await? {
                if let Some(progress) = line.strip_prefix(PROGRESS_PREFIX) {
                    self.jobs.set_progress(tracking_id, progress.trim());
                } else if let Some(body) = line.strip_prefix(RESPONSE_PREFIX) {
                    response = Some(body.trim().to_string());
                } else {
                    output.push_str(&line);
                    output.push('\n');
                }
            }
        }

        let status = child.wait().await?;
        let stderr = match stderr_task {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };

        if !status.success() {
            warn!(
                "{} for {} exited with {:?}",
                program,
                tracking_id,
                status.code()
            );
            return Err(ScriptError::Failed {
                program: program.to_string(),
                code: status.code(),
                stderr: tail(&stderr, STDERR_TAIL_BYTES).trim().to_string(),
            });
        }

        if !stderr.trim().is_empty() {
            debug!("{} stderr: {}", program, stderr.trim());
        }
        Ok(response.unwrap_or_else(|| output.trim().to_string()))
    }
}

/// Last `max` bytes of `text`, cut on a char boundary.
fn tail(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut start = text.len() - max;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    &text[start..]
}
