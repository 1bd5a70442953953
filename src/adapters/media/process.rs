use crate::ports::media::CommandRunner;
use async_trait::async_trait;
use std::io;
use std::path::PathBuf;
use std::process::Output;
use tokio::process::Command;

/// Runs programs through `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioCommandRunner;

#[async_trait]
impl CommandRunner for TokioCommandRunner {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        current_dir: Option<PathBuf>,
    ) -> io::Result<Output> {
        let mut command = Command::new(program);
        command.args(args);
        if let Some(dir) = current_dir {
            command.current_dir(dir);
        }
        command.output().await
    }
}
