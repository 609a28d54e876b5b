//! Publishes rendered reports by committing and pushing them with `git`

use super::{CollaboratorError, CollaboratorResult};
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::info;

#[derive(Debug, Clone)]
pub struct GitPublisher {
    /// Working directory for git; the process cwd when `None`
    repo_dir: Option<PathBuf>,
}

impl GitPublisher {
    pub fn new(repo_dir: Option<PathBuf>) -> Self {
        Self { repo_dir }
    }

    /// `git add <report>`, `git commit -m "<env> statistics update"`, `git push`
    pub async fn publish(&self, report: &Path, env_name: &str) -> CollaboratorResult<()> {
        let report = report.to_string_lossy();
        let message = format!("{env_name} statistics update");

        self.git(&["add", report.as_ref()]).await?;
        self.git(&["commit", "-m", message.as_str()]).await?;
        self.git(&["push"]).await?;

        info!(report = %report, "Report committed and pushed");
        Ok(())
    }

    async fn git(&self, args: &[&str]) -> CollaboratorResult<()> {
        let mut command = Command::new("git");
        command.args(args);
        if let Some(dir) = &self.repo_dir {
            command.current_dir(dir);
        }

        let output = command.output().await?;
        if !output.status.success() {
            return Err(CollaboratorError::CommandFailed {
                command: format!("git {}", args.join(" ")),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}
