//! # Platform-specific utilities
//!
//! Questo modulo centralizza la logica cross-platform per i tool esterni
//! (ffmpeg, ffprobe): nome del comando, verifica disponibilità e istruzioni
//! di installazione da mostrare all'operatore quando mancano.

use crate::error::OptimizeError;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::OnceLock;
use tracing::debug;

/// Platform-specific command manager
pub struct PlatformCommands {
    commands: HashMap<&'static str, &'static str>,
    which_command: &'static str,
}

impl PlatformCommands {
    /// Get the singleton instance
    pub fn instance() -> &'static Self {
        static INSTANCE: OnceLock<PlatformCommands> = OnceLock::new();
        INSTANCE.get_or_init(Self::new)
    }

    fn new() -> Self {
        let mut commands = HashMap::new();
        let which_command = if cfg!(windows) {
            commands.insert("ffmpeg", "ffmpeg.exe");
            commands.insert("ffprobe", "ffprobe.exe");
            "where"
        } else {
            commands.insert("ffmpeg", "ffmpeg");
            commands.insert("ffprobe", "ffprobe");
            "which"
        };

        Self {
            commands,
            which_command,
        }
    }

    /// Get the platform-specific command name; unknown names and paths pass through
    pub fn get_command<'a>(&self, base_name: &'a str) -> &'a str {
        self.commands.get(base_name).copied().unwrap_or(base_name)
    }

    /// Get the command used to check if a program exists
    pub fn which_command(&self) -> &str {
        self.which_command
    }

    /// Check if a command can be executed (`<program> -version`, then which/where)
    pub async fn is_command_available(&self, program: &str) -> bool {
        let command_name = self.get_command(program);

        let probe = tokio::process::Command::new(command_name)
            .arg("-version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;

        if let Ok(status) = probe {
            if status.success() {
                return true;
            }
        }

        debug!("'{} -version' failed, trying {}", command_name, self.which_command);
        match tokio::process::Command::new(self.which_command)
            .arg(command_name)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
        {
            Ok(status) => status.success(),
            Err(_) => false,
        }
    }

    /// Fail with installation guidance when a required tool is missing
    pub async fn require(&self, program: &str, tool: &str) -> Result<(), OptimizeError> {
        if self.is_command_available(program).await {
            Ok(())
        } else {
            Err(OptimizeError::MissingDependency {
                tool: tool.to_string(),
                guidance: Self::install_guidance(tool),
            })
        }
    }

    /// Installation instructions for the current platform
    pub fn install_guidance(tool: &str) -> String {
        let package = match tool {
            "ffmpeg" | "ffprobe" => "ffmpeg",
            other => other,
        };

        let options = if cfg!(target_os = "windows") {
            format!(
                "   1. Using Winget: winget install Gyan.FFmpeg\n   \
                 2. Using Chocolatey: choco install {package}\n   \
                 3. Manual installation: https://ffmpeg.org/download.html"
            )
        } else if cfg!(target_os = "macos") {
            format!("   brew install {package}")
        } else {
            format!("   sudo apt-get install {package}")
        };

        format!(
            "❌ {tool} is not installed or not in your PATH.\n\
             🔧 Installation options:\n{options}\n\
             ⚠️  After installation, restart your terminal and try again."
        )
    }

    /// Get system information for debugging
    pub fn system_info() -> SystemInfo {
        SystemInfo {
            os: std::env::consts::OS,
            arch: std::env::consts::ARCH,
            family: std::env::consts::FAMILY,
        }
    }
}

/// System information structure
#[derive(Debug, Clone)]
pub struct SystemInfo {
    pub os: &'static str,
    pub arch: &'static str,
    pub family: &'static str,
}

impl std::fmt::Display for SystemInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} ({})", self.os, self.arch, self.family)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_commands() {
        let platform = PlatformCommands::instance();

        let ffmpeg = platform.get_command("ffmpeg");
        assert!(ffmpeg.starts_with("ffmpeg"));
        assert_eq!(platform.get_command("/opt/bin/ffmpeg"), "/opt/bin/ffmpeg");
        assert!(!platform.which_command().is_empty());
    }

    #[tokio::test]
    async fn test_missing_tool_reports_guidance() {
        let platform = PlatformCommands::instance();
        let err = platform
            .require("/definitely/not/installed/ffmpeg", "ffmpeg")
            .await
            .unwrap_err();

        match err {
            OptimizeError::MissingDependency { tool, guidance } => {
                assert_eq!(tool, "ffmpeg");
                assert!(guidance.contains("Installation options"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_system_info() {
        let info = PlatformCommands::system_info();
        assert!(!info.os.is_empty());
        assert!(!info.arch.is_empty());
        assert!(!info.family.is_empty());
    }
}
