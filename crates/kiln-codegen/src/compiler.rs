//! External compiler processes
//!
//! Runs solc/vyper via tokio. The child is killed when the invocation is
//! dropped, so cancellation or a timeout never leaves a compiler running.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use kiln_core::{CancelToken, Language};

use crate::error::{Error, Result};

/// One compiler invocation
#[derive(Debug, Clone)]
pub struct Invocation {
    /// Language of the invoking adapter (for error reporting)
    pub language: Language,
    /// Executable
    pub program: String,
    /// Arguments
    pub args: Vec<String>,
    /// Bytes written to the child's stdin
    pub stdin: Option<Vec<u8>>,
    /// Working directory
    pub current_dir: Option<PathBuf>,
    /// Caller-supplied timeout
    pub timeout: Option<Duration>,
    /// Source unit being compiled (for error reporting)
    pub unit: PathBuf,
}

impl Invocation {
    /// Create an invocation of `program` on behalf of `unit`
    pub fn new(language: Language, program: impl Into<String>, unit: impl Into<PathBuf>) -> Self {
        Self {
            language,
            program: program.into(),
            args: vec![],
            stdin: None,
            current_dir: None,
            timeout: None,
            unit: unit.into(),
        }
    }

    /// Append arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Feed `input` on stdin
    pub fn with_stdin(mut self, input: Vec<u8>) -> Self {
        self.stdin = Some(input);
        self
    }

    /// Set the working directory
    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Set the timeout
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Captured process output
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    /// Whether the process exited with status zero
    pub success: bool,
    /// Exit code, if the process exited normally
    pub code: Option<i32>,
    /// Captured stdout
    pub stdout: String,
    /// Captured stderr
    pub stderr: String,
}

/// Run an invocation to completion, racing it against `cancel`
pub async fn run(invocation: Invocation, cancel: &CancelToken) -> Result<ProcessOutput> {
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }

    tracing::debug!(
        "Running {} {}",
        invocation.program,
        invocation.args.join(" ")
    );

    let mut command = Command::new(&invocation.program);
    command
        .args(&invocation.args)
        .stdin(if invocation.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = &invocation.current_dir {
        command.current_dir(dir);
    }

    let mut child = command.spawn().map_err(|e| Error::Toolchain {
        language: invocation.language,
        message: format!("failed to run {}: {}", invocation.program, e),
    })?;

    let stdin = child.stdin.take();
    let input = invocation.stdin.clone();
    let work = async move {
        match (stdin, input) {
            (Some(mut pipe), Some(input)) => {
                let write = async move {
                    pipe.write_all(&input).await?;
                    pipe.shutdown().await
                };
                let ((), output) = tokio::try_join!(write, child.wait_with_output())?;
                Ok::<_, std::io::Error>(output)
            }
            _ => child.wait_with_output().await,
        }
    };

    let timed = async {
        match invocation.timeout {
            Some(limit) => tokio::time::timeout(limit, work)
                .await
                .map_err(|_| Error::Timeout {
                    unit: invocation.unit.clone(),
                    limit,
                })?
                .map_err(Error::from),
            None => work.await.map_err(Error::from),
        }
    };

    let output = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(Error::Cancelled),
        output = timed => output?,
    };

    Ok(ProcessOutput {
        success: output.status.success(),
        code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Run `<program> --version` and return its trimmed stdout
///
/// The check honours the run's cancellation and the compiler timeout.
pub async fn probe_version(
    language: Language,
    program: &str,
    timeout: Option<Duration>,
    cancel: &CancelToken,
) -> Result<String> {
    let invocation = Invocation::new(language, program, program)
        .args(["--version"])
        .with_timeout(timeout);
    let output = run(invocation, cancel).await?;
    if !output.success {
        return Err(Error::Toolchain {
            language,
            message: format!("`{} --version` failed: {}", program, output.stderr.trim()),
        });
    }
    Ok(output.stdout.trim().to_string())
}

/// Persist raw compiler output under the scratch directory
pub fn write_scratch(dir: &Path, name: &str, language: Language, contents: &str) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(format!("{}.{}.out", name, language.tag()));
    std::fs::write(&path, contents)?;
    tracing::debug!("Saved compiler output: {}", path.display());
    Ok(path)
}
