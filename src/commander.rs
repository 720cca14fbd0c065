use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::ArcError;

pub const ARC_TOOL: &str = "arc";

/// Runs one ARC Commander argument list inside an ARC directory. The first
/// token names the tool; the exit status is reported, not enforced.
pub trait ArcCommander: Send + Sync {
    fn run(&self, command: &[String], cwd: &Path) -> Result<(), ArcError>;

    fn version(&self) -> Option<String> {
        None
    }
}

#[derive(Debug, Clone)]
pub struct SystemArcCommander {
    executable: PathBuf,
}

impl SystemArcCommander {
    /// Uses `executable` when given, otherwise looks `arc` up on `PATH`.
    pub fn new(executable: Option<PathBuf>) -> Result<Self, ArcError> {
        let executable = match executable {
            Some(path) => path,
            None => find_in_path(ARC_TOOL)
                .ok_or_else(|| ArcError::MissingTool(format!("{ARC_TOOL} (ARC Commander)")))?,
        };
        Ok(Self { executable })
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }
}

impl ArcCommander for SystemArcCommander {
    fn run(&self, command: &[String], cwd: &Path) -> Result<(), ArcError> {
        let Some((_, args)) = command.split_first() else {
            return Ok(());
        };
        tracing::debug!(cwd = %cwd.display(), args = ?args, "arc");
        let output = Command::new(&self.executable)
            .args(args)
            .current_dir(cwd)
            .output()
            .map_err(|err| ArcError::CommandSpawn {
                program: self.executable.display().to_string(),
                message: err.to_string(),
            })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            tracing::warn!(
                status = ?output.status.code(),
                command = %command.join(" "),
                stderr = %stderr,
                "arc command exited unsuccessfully"
            );
        }
        Ok(())
    }

    fn version(&self) -> Option<String> {
        tool_version(&self.executable, &["--version"])
    }
}

fn find_in_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for path in std::env::split_paths(&path_var) {
        let exe = path.join(format!("{name}.exe"));
        if exe.is_file() {
            return Some(exe);
        }
        let plain = path.join(name);
        if plain.is_file() {
            return Some(plain);
        }
    }
    None
}

fn tool_version(path: &Path, args: &[&str]) -> Option<String> {
    let output = Command::new(path).args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if stdout.is_empty() {
        None
    } else {
        Some(stdout)
    }
}
