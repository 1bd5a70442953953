use crate::ports::media::{Archiver, CommandRunner, MediaError};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::info;

/// Archiver backed by the `zip` command line tool.
#[derive(Debug, Clone)]
pub struct ZipArchiver<R> {
    runner: R,
    out_dir: PathBuf,
}

impl<R: CommandRunner> ZipArchiver<R> {
    pub fn new(runner: R, out_dir: PathBuf) -> Self {
        Self { runner, out_dir }
    }
}

#[async_trait]
impl<R: CommandRunner> Archiver for ZipArchiver<R> {
    async fn archive(&self, dir: &Path, name: &str) -> Result<PathBuf, MediaError> {
        match tokio::fs::metadata(dir).await {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                return Err(MediaError::ArchiveFailure(format!(
                    "{} is not a directory",
                    dir.display()
                )))
            }
            Err(e) => {
                return Err(MediaError::ArchiveFailure(format!(
                    "{} does not exist: {}",
                    dir.display(),
                    e
                )))
            }
        }

        // zip runs inside `dir`, so the destination must not be relative.
        let out_dir = std::env::current_dir()?.join(&self.out_dir);
        tokio::fs::create_dir_all(&out_dir).await?;
        let zip_path = out_dir.join(format!("{}.zip", name));

        // Entries are stored relative to `dir`, so the archive has no parent folder.
        let args = vec![
            "-q".to_string(),
            "-r".to_string(),
            "-9".to_string(),
            zip_path.to_string_lossy().to_string(),
            ".".to_string(),
        ];
        let output = self
            .runner
            .run("zip", &args, Some(dir.to_path_buf()))
            .await
            .map_err(|e| MediaError::ArchiveFailure(format!("failed to run zip: {}", e)))?;

        if !output.status.success() {
            return Err(MediaError::ArchiveFailure(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        let size = tokio::fs::metadata(&zip_path)
            .await
            .map_err(|e| MediaError::ArchiveFailure(format!("zip produced no archive: {}", e)))?
            .len();
        info!(path = %zip_path.display(), bytes = size, "Archive created");

        Ok(zip_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::media::MockCommandRunner;
    use std::os::unix::process::ExitStatusExt;
    use std::process::{ExitStatus, Output};

    fn exit(code: i32, stderr: &str) -> std::io::Result<Output> {
        Ok(Output {
            status: ExitStatus::from_raw(code << 8),
            stdout: Vec::new(),
            stderr: stderr.as_bytes().to_vec(),
        })
    }

    #[tokio::test]
    async fn test_archive_runs_inside_directory() {
        let frames = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let frames_path = frames.path().to_path_buf();

        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .withf(move |program, args, cwd| {
                program == "zip"
                    && args.last().map(String::as_str) == Some(".")
                    && cwd.as_deref() == Some(frames_path.as_path())
            })
            .times(1)
            .returning(|_, args, _| {
                std::fs::write(&args[3], b"PK").unwrap();
                exit(0, "")
            });

        let archiver = ZipArchiver::new(runner, out.path().to_path_buf());
        let zip = archiver.archive(frames.path(), "idx-1-start-0-now-1").await.unwrap();
        assert_eq!(zip, out.path().join("idx-1-start-0-now-1.zip"));
    }

    #[tokio::test]
    async fn test_archive_missing_directory() {
        let out = tempfile::tempdir().unwrap();
        let mut runner = MockCommandRunner::new();
        runner.expect_run().times(0);

        let archiver = ZipArchiver::new(runner, out.path().to_path_buf());
        let err = archiver
            .archive(&out.path().join("nope"), "a")
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::ArchiveFailure(ref msg) if msg.contains("does not exist")));
    }

    #[tokio::test]
    async fn test_archive_rejects_file() {
        let out = tempfile::tempdir().unwrap();
        let file = out.path().join("frame.jpg");
        std::fs::write(&file, b"jpg").unwrap();

        let mut runner = MockCommandRunner::new();
        runner.expect_run().times(0);

        let archiver = ZipArchiver::new(runner, out.path().to_path_buf());
        let err = archiver.archive(&file, "a").await.unwrap_err();
        assert!(err.to_string().contains("is not a directory"));
    }

    #[tokio::test]
    async fn test_archive_tool_failure() {
        let frames = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();

        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .returning(|_, _, _| exit(12, "zip error: Nothing to do!"));

        let archiver = ZipArchiver::new(runner, out.path().to_path_buf());
        let err = archiver.archive(frames.path(), "a").await.unwrap_err();
        assert!(err.to_string().contains("Nothing to do"));
    }
}
