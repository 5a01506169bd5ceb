// src/exec/command.rs

//! Shell command work items.

use std::process::Stdio;

use anyhow::{Context, bail};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

use super::work::{WorkContext, WorkFuture, WorkItem};

/// Runs a command line through the platform shell.
///
/// Exit status 0 is success; anything else (including death by signal) is a
/// failure. Stdout lines are logged at `info`, stderr lines at `debug`.
///
/// Cancellation does not kill the command; it is only killed if its future is
/// dropped.
#[derive(Debug, Clone)]
pub struct ShellCommand {
    cmd: String,
}

impl ShellCommand {
    pub fn new(cmd: impl Into<String>) -> Self {
        Self { cmd: cmd.into() }
    }

    pub fn command_line(&self) -> &str {
        &self.cmd
    }

    async fn run_inner(&self, ctx: WorkContext) -> anyhow::Result<()> {
        info!(node = %ctx.node(), cmd = %self.cmd, "starting command");

        let mut cmd = if cfg!(windows) {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(&self.cmd);
            c
        } else {
            let mut c = Command::new("sh");
            c.arg("-c").arg(&self.cmd);
            c
        };

        cmd.stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawning process for node '{}'", ctx.node()))?;

        // Always consume both pipes so the child never blocks on a full buffer.
        if let Some(stdout) = child.stdout.take() {
            let node = ctx.node().to_string();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    info!(node = %node, "stdout: {}", line);
                }
            });
        }
        if let Some(stderr) = child.stderr.take() {
            let node = ctx.node().to_string();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(node = %node, "stderr: {}", line);
                }
            });
        }

        let status = child
            .wait()
            .await
            .with_context(|| format!("waiting for process of node '{}'", ctx.node()))?;

        let code = status.code().unwrap_or(-1);
        info!(
            node = %ctx.node(),
            exit_code = code,
            success = status.success(),
            "command exited"
        );

        if !status.success() {
            bail!("command `{}` exited with code {}", self.cmd, code);
        }
        Ok(())
    }
}

impl WorkItem for ShellCommand {
    fn run(&self, ctx: WorkContext) -> WorkFuture<'_> {
        Box::pin(self.run_inner(ctx))
    }

    fn describe(&self) -> String {
        self.cmd.clone()
    }
}
