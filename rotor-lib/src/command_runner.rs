//! Execute external commands with a bounded wall-clock timeout, capturing
//! output. Generalizes the teacher's `ShellCommandExt` by adding an explicit
//! timeout, since the spec requires one and the caller decides the policy on
//! failure.

use async_trait::async_trait;
use thiserror::Error;

use std::time::Duration;

#[derive(Debug, Error)]
pub enum Error {
    #[error("command timed out")]
    Timeout,
    #[error("failed to spawn command: {0}")]
    SpawnError(#[source] std::io::Error),
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, command: &str, timeout: Duration) -> Result<CommandOutput, Error>;
}

/// Spawns `/bin/sh -c <command>` and waits up to `timeout` for completion.
pub struct ShellCommandRunner;

#[async_trait]
impl CommandRunner for ShellCommandRunner {
    async fn run(&self, command: &str, timeout: Duration) -> Result<CommandOutput, Error> {
        let mut cmd = tokio::process::Command::new("/bin/sh");
        cmd.arg("-c").arg(command);
        cmd.stdin(std::process::Stdio::null());
        cmd.stdout(std::process::Stdio::piped());
        cmd.stderr(std::process::Stdio::piped());

        let child = cmd.spawn().map_err(Error::SpawnError)?;
        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(source)) => return Err(Error::SpawnError(source)),
            Err(_) => {
                tracing::error!(command, "command timed out");
                return Err(Error::Timeout);
            }
        };

        Ok(CommandOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

#[cfg(any(test, feature = "test-util"))]
pub mod mock {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Queue of canned responses, returned in call order. Also records every
    /// command string it was asked to run, so tests can assert on the exact
    /// shell invocations a component issued.
    #[derive(Default)]
    pub struct MockCommandRunner {
        responses: Mutex<VecDeque<Result<CommandOutput, Error>>>,
        pub calls: Mutex<Vec<String>>,
    }

    impl MockCommandRunner {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn push_success(&self, stdout: &str) {
            self.responses.lock().unwrap().push_back(Ok(CommandOutput {
                success: true,
                stdout: stdout.to_string(),
                stderr: String::new(),
            }));
        }

        pub fn push_failure(&self, stderr: &str) {
            self.responses.lock().unwrap().push_back(Ok(CommandOutput {
                success: false,
                stdout: String::new(),
                stderr: stderr.to_string(),
            }));
        }

        pub fn push_timeout(&self) {
            self.responses.lock().unwrap().push_back(Err(Error::Timeout));
        }
    }

    #[async_trait]
    impl CommandRunner for MockCommandRunner {
        async fn run(&self, command: &str, _timeout: Duration) -> Result<CommandOutput, Error> {
            self.calls.lock().unwrap().push(command.to_string());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(CommandOutput {
                    success: true,
                    stdout: String::new(),
                    stderr: String::new(),
                }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn real_runner_reports_success_and_captures_stdout() {
        let runner = ShellCommandRunner;
        let out = runner.run("echo hello", Duration::from_secs(5)).await.unwrap();
        assert!(out.success);
        assert_eq!(out.stdout, "hello");
    }

    #[tokio::test]
    async fn real_runner_reports_nonzero_exit_as_failure() {
        let runner = ShellCommandRunner;
        let out = runner.run("exit 1", Duration::from_secs(5)).await.unwrap();
        assert!(!out.success);
    }

    #[tokio::test]
    async fn real_runner_times_out_long_commands() {
        let runner = ShellCommandRunner;
        let res = runner.run("sleep 5", Duration::from_millis(50)).await;
        assert!(matches!(res, Err(Error::Timeout)));
    }

    #[tokio::test]
    async fn mock_runner_records_calls_and_replays_responses() {
        let runner = mock::MockCommandRunner::new();
        runner.push_success("ok");
        runner.push_failure("boom");

        let first = runner.run("cmd-a", Duration::from_secs(1)).await.unwrap();
        let second = runner.run("cmd-b", Duration::from_secs(1)).await.unwrap();

        assert!(first.success);
        assert!(!second.success);
        assert_eq!(*runner.calls.lock().unwrap(), vec!["cmd-a", "cmd-b"]);
    }
}
