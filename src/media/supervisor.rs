use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, info, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::config::ToolsConfig;
use crate::error::{DubError, Result};
use super::{ToolClass, ToolCommand};

/// How an external tool invocation ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessStatus {
    Success,
    ExitFailure(Option<i32>),
    TimedOut,
    NotFound,
}

#[derive(Debug, Clone)]
pub struct ProcessResult {
    pub status: ProcessStatus,
    pub error_message: Option<String>,
    pub stdout: String,
}

impl ProcessResult {
    pub fn exited_ok(&self) -> bool {
        self.status == ProcessStatus::Success
    }

    pub fn timed_out(&self) -> bool {
        self.status == ProcessStatus::TimedOut
    }

    /// Convert into the crate error taxonomy, returning stdout on success.
    pub fn into_result(self, tool: &str, timeout: Duration) -> Result<String> {
        match self.status {
            ProcessStatus::Success => Ok(self.stdout),
            ProcessStatus::TimedOut => Err(DubError::ToolTimeout {
                tool: tool.to_string(),
                timeout,
            }),
            ProcessStatus::NotFound => Err(DubError::ToolMissing {
                tool: tool.to_string(),
                hint: install_hint(tool).to_string(),
            }),
            ProcessStatus::ExitFailure(_) => Err(DubError::ToolFailed {
                tool: tool.to_string(),
                message: self.error_message.unwrap_or_else(|| "unknown error".to_string()),
            }),
        }
    }
}

pub fn install_hint(tool: &str) -> &'static str {
    let name = Path::new(tool)
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    if name.starts_with("yt-dlp") {
        "Install it with: pip install yt-dlp or sudo apt install yt-dlp"
    } else if name.starts_with("ffmpeg") {
        "Install it with: sudo apt install ffmpeg"
    } else {
        "Make sure it is installed and on PATH"
    }
}

/// Runs external tools with a hard wall-clock limit per tool class
#[derive(Debug, Clone)]
pub struct ToolSupervisor {
    config: ToolsConfig,
}

impl ToolSupervisor {
    pub fn new(config: ToolsConfig) -> Self {
        Self { config }
    }

    pub fn timeout_for(&self, class: ToolClass) -> Duration {
        match class {
            ToolClass::Download => self.config.download_timeout(),
            ToolClass::Remux => self.config.remux_timeout(),
            ToolClass::VersionProbe => self.config.version_probe_timeout(),
            ToolClass::DurationProbe => self.config.duration_probe_timeout(),
            ToolClass::TitleProbe => self.config.title_probe_timeout(),
        }
    }

    /// Run a command with the limit of its tool class
    pub async fn run(&self, command: &ToolCommand) -> ProcessResult {
        self.run_with_timeout(command, self.timeout_for(command.class)).await
    }

    /// Run a command, killing it once `timeout` elapses
    pub async fn run_with_timeout(&self, command: &ToolCommand, timeout: Duration) -> ProcessResult {
        debug!("Executing {}: {}", command.description, command.display());

        let mut cmd = Command::new(&command.binary_path);
        cmd.args(&command.args)
            .envs(command.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own process group, so helpers the tool spawns die with it on timeout
        #[cfg(unix)]
        cmd.process_group(0);

        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return ProcessResult {
                    status: ProcessStatus::NotFound,
                    error_message: Some(format!("{} not found", command.binary_path)),
                    stdout: String::new(),
                };
            }
            Err(e) => {
                return ProcessResult {
                    status: ProcessStatus::ExitFailure(None),
                    error_message: Some(format!("Failed to start {}: {}", command.binary_path, e)),
                    stdout: String::new(),
                };
            }
        };

        let pid = child.id();

        // Dropping the wait future on timeout drops the child, which kills it.
        match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Err(_) => {
                kill_process_group(pid);
                warn!("{} timed out after {}s, process killed", command.description, timeout.as_secs());
                ProcessResult {
                    status: ProcessStatus::TimedOut,
                    error_message: Some(format!(
                        "{} timed out after {}s",
                        command.description,
                        timeout.as_secs()
                    )),
                    stdout: String::new(),
                }
            }
            Ok(Err(e)) => ProcessResult {
                status: ProcessStatus::ExitFailure(None),
                error_message: Some(format!("Failed to wait for {}: {}", command.binary_path, e)),
                stdout: String::new(),
            },
            Ok(Ok(output)) => {
                let stdout = String::from_utf8_lossy(&output.stdout).to_string();
                if output.status.success() {
                    ProcessResult {
                        status: ProcessStatus::Success,
                        error_message: None,
                        stdout,
                    }
                } else {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    ProcessResult {
                        status: ProcessStatus::ExitFailure(output.status.code()),
                        error_message: Some(format!(
                            "{} failed: {}",
                            command.description,
                            last_lines(&stderr, 5)
                        )),
                        stdout,
                    }
                }
            }
        }
    }

    /// Check that a tool is on PATH and answers a version probe
    pub async fn ensure_available(&self, command: &ToolCommand) -> Result<()> {
        let tool = command.binary_path.as_str();
        if which::which(tool).is_err() {
            return Err(DubError::ToolMissing {
                tool: tool.to_string(),
                hint: install_hint(tool).to_string(),
            });
        }

        let timeout = self.timeout_for(command.class);
        let version = self.run_with_timeout(command, timeout).await.into_result(tool, timeout)?;
        info!("{} is available: {}", tool, version.lines().next().unwrap_or("unknown version"));
        Ok(())
    }
}

#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    let Some(pid) = pid.and_then(|p| libc::pid_t::try_from(p).ok()) else {
        return;
    };
    // SAFETY: killpg only signals the group; a group that already exited yields ESRCH.
    if unsafe { libc::killpg(pid, libc::SIGKILL) } != 0 {
        debug!("Process group {} already gone: {}", pid, std::io::Error::last_os_error());
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}

fn last_lines(text: &str, count: usize) -> String {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(count);
    lines[start..].join("\n")
}

/// Job-scoped temporary artifact, removed on every exit path.
///
/// Files are named `{kind}_{uuid}.{ext}`. The guard deletes its path and every
/// sibling sharing the `{kind}_{uuid}` stem (partial downloads, other
/// extensions). Dropping it removes them synchronously on the current thread;
/// `release` does the same sweep on the blocking pool and is preferred where
/// the caller can await.
#[derive(Debug)]
pub struct ScratchFile {
    path: PathBuf,
    stem: String,
    released: bool,
}

impl ScratchFile {
    pub fn new(dir: &Path, kind: &str, extension: &str) -> Self {
        let stem = format!("{}_{}", kind, Uuid::new_v4().simple());
        Self {
            path: dir.join(format!("{}.{}", stem, extension)),
            stem,
            released: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Look for the artifact under another extension and adopt it.
    pub fn recover(&mut self) -> Option<PathBuf> {
        let found = self.siblings().into_iter().find(|p| {
            let name = p.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
            !name.ends_with(".part") && !name.ends_with(".ytdl")
        })?;
        self.path = found.clone();
        Some(found)
    }

    /// Remove the artifact and its siblings without blocking a runtime worker.
    pub async fn release(mut self) {
        self.released = true;
        let targets = self.targets();
        if let Err(e) = tokio::task::spawn_blocking(move || remove_all(&targets)).await {
            warn!("Temporary file cleanup task failed: {}", e);
        }
    }

    fn targets(&self) -> Vec<PathBuf> {
        let mut targets = self.siblings();
        if !targets.contains(&self.path) {
            targets.push(self.path.clone());
        }
        targets
    }

    fn siblings(&self) -> Vec<PathBuf> {
        let Some(dir) = self.path.parent() else {
            return Vec::new();
        };
        WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file() && e.file_name().to_string_lossy().starts_with(&self.stem))
            .map(|e| e.into_path())
            .collect()
    }
}

fn remove_all(targets: &[PathBuf]) {
    for target in targets {
        if target.exists() {
            match std::fs::remove_file(target) {
                Ok(()) => debug!("Removed temporary file {}", target.display()),
                Err(e) => warn!("Failed to remove temporary file {}: {}", target.display(), e),
            }
        }
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if !self.released {
            remove_all(&self.targets());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn supervisor() -> ToolSupervisor {
        ToolSupervisor::new(Config::default().tools)
    }

    fn shell(script: &str, class: ToolClass) -> ToolCommand {
        ToolCommand::new("sh", "Test script", class).arg("-c").arg(script)
    }

    #[test]
    fn test_class_timeouts() {
        let supervisor = supervisor();
        assert_eq!(supervisor.timeout_for(ToolClass::Download), Duration::from_secs(600));
        assert_eq!(supervisor.timeout_for(ToolClass::Remux), Duration::from_secs(900));
        assert_eq!(supervisor.timeout_for(ToolClass::VersionProbe), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_success_captures_stdout() {
        let result = supervisor().run(&shell("echo 212", ToolClass::DurationProbe)).await;
        assert!(result.exited_ok());
        assert_eq!(result.stdout.trim(), "212");
    }

    #[tokio::test]
    async fn test_exit_failure_is_structured() {
        let result = supervisor()
            .run(&shell("echo broken >&2; exit 3", ToolClass::Remux))
            .await;
        assert_eq!(result.status, ProcessStatus::ExitFailure(Some(3)));
        assert!(result.error_message.unwrap().contains("broken"));
    }

    #[tokio::test]
    async fn test_missing_binary_is_not_found() {
        let command = ToolCommand::new("dubfetch-no-such-tool", "Missing", ToolClass::Download);
        let result = supervisor().run(&command).await;
        assert_eq!(result.status, ProcessStatus::NotFound);

        let err = result.into_result("dubfetch-no-such-tool", Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, DubError::ToolMissing { .. }));
    }

    #[tokio::test]
    async fn test_timeout_kills_process() {
        let started = std::time::Instant::now();
        let result = supervisor()
            .run_with_timeout(&shell("sleep 10", ToolClass::Download), Duration::from_millis(200))
            .await;
        assert!(result.timed_out());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_scratch_removed_after_timeout() {
        let dir = tempfile::tempdir().unwrap();
        {
            let scratch = ScratchFile::new(dir.path(), "temp_video", "mp4");
            let script = format!(
                "echo partial > '{}.part'; echo data > '{}'; sleep 10",
                scratch.path().display(),
                scratch.path().display()
            );
            let result = supervisor()
                .run_with_timeout(&shell(&script, ToolClass::Download), Duration::from_millis(300))
                .await;
            assert!(result.timed_out());
            assert!(scratch.path().exists());
        }
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_scratch_removed_after_failure() {
        let dir = tempfile::tempdir().unwrap();
        {
            let scratch = ScratchFile::new(dir.path(), "temp_audio", "mp3");
            let script = format!("echo data > '{}'; exit 1", scratch.path().display());
            let result = supervisor().run(&shell(&script, ToolClass::Download)).await;
            assert!(!result.exited_ok());
        }
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_timeout_kills_background_helpers() {
        let dir = tempfile::tempdir().unwrap();
        {
            let scratch = ScratchFile::new(dir.path(), "temp_video", "mp4");
            let script = format!(
                "(sleep 1; echo late > '{}.part') & sleep 10",
                scratch.path().display()
            );
            let result = supervisor()
                .run_with_timeout(&shell(&script, ToolClass::Download), Duration::from_millis(200))
                .await;
            assert!(result.timed_out());
        }

        tokio::time::sleep(Duration::from_millis(1800)).await;
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_recover_adopts_other_extension() {
        let dir = tempfile::tempdir().unwrap();
        let unrelated = dir.path().join("other.txt");
        std::fs::write(&unrelated, "keep me").unwrap();

        let mut scratch = ScratchFile::new(dir.path(), "temp_video", "mp4");
        let webm = scratch.path().with_extension("webm");
        let part = scratch.path().with_extension("webm.part");
        std::fs::write(&webm, "video").unwrap();
        std::fs::write(&part, "partial").unwrap();

        assert_eq!(scratch.recover(), Some(webm.clone()));
        assert_eq!(scratch.path(), webm.as_path());

        drop(scratch);
        assert!(!webm.exists());
        assert!(!part.exists());
        assert!(unrelated.exists());
    }

    #[tokio::test]
    async fn test_release_sweeps_siblings() {
        let dir = tempfile::tempdir().unwrap();
        let neighbour = dir.path().join("movie.mp4");
        std::fs::write(&neighbour, "final output").unwrap();

        let scratch = ScratchFile::new(dir.path(), "temp_audio", "mp3");
        std::fs::write(scratch.path(), "audio").unwrap();
        std::fs::write(scratch.path().with_extension("mp3.part"), "partial").unwrap();

        scratch.release().await;

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["movie.mp4"]);
    }
}
