//! Setup helpers: `--init-config` and `--symlink-cli`.

use crate::cli::Output;
use crate::config::CONFIG_TEMPLATE;
use crate::error::{Result, VpError};
use std::path::{Path, PathBuf};

/// User config directory, honoring `XDG_CONFIG_HOME`.
fn xdg_config_home() -> Result<PathBuf> {
    if let Some(dir) = std::env::var_os("XDG_CONFIG_HOME").filter(|d| !d.is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    dirs::home_dir()
        .map(|home| home.join(".config"))
        .ok_or_else(|| VpError::Config("Cannot determine the home directory".to_string()))
}

/// Replace whatever is at `link` with a symlink to `target`.
fn replace_symlink(target: &Path, link: &Path) -> Result<()> {
    if link.symlink_metadata().is_ok() {
        std::fs::remove_file(link)?;
    }
    #[cfg(unix)]
    std::os::unix::fs::symlink(target, link)?;
    #[cfg(windows)]
    std::os::windows::fs::symlink_file(target, link)?;
    Ok(())
}

/// Copy the config template into `project_dir` unless a config exists, then
/// link it into `config_home/video-processor/config.toml`.
pub fn init_config_in(project_dir: &Path, config_home: &Path) -> Result<PathBuf> {
    let local = project_dir.join("config.toml");
    if local.exists() {
        Output::info(&format!(
            "Local config already exists at {}, skipping template copy",
            local.display()
        ));
    } else {
        std::fs::write(&local, CONFIG_TEMPLATE)?;
        Output::success(&format!("Copied template to {}", local.display()));
    }

    let link_dir = config_home.join("video-processor");
    std::fs::create_dir_all(&link_dir)?;
    let link = link_dir.join("config.toml");
    let target = local.canonicalize()?;
    replace_symlink(&target, &link)?;
    Output::success(&format!("Symlinked {} -> {}", link.display(), target.display()));
    Ok(link)
}

/// Run `--init-config` for the current directory.
pub fn run_init_config() -> anyhow::Result<()> {
    init_config_in(&std::env::current_dir()?, &xdg_config_home()?)?;
    Ok(())
}

/// Link `executable` into `bin_dir` under its own file name.
pub fn symlink_cli_into(executable: &Path, bin_dir: &Path) -> Result<PathBuf> {
    let name = executable
        .file_name()
        .ok_or_else(|| VpError::InvalidInput(format!("Not a file: {}", executable.display())))?;
    std::fs::create_dir_all(bin_dir)?;
    let link = bin_dir.join(name);
    if link == executable {
        return Err(VpError::InvalidInput(format!(
            "{} is already the installed executable",
            link.display()
        )));
    }
    replace_symlink(executable, &link)?;
    Output::success(&format!("Symlinked {} -> {}", executable.display(), link.display()));
    Ok(link)
}

/// Run `--symlink-cli` for the running executable.
pub fn run_symlink_cli() -> anyhow::Result<()> {
    let executable = std::env::current_exe()?.canonicalize()?;
    let home = dirs::home_dir()
        .ok_or_else(|| anyhow::anyhow!("Cannot determine the home directory"))?;
    symlink_cli_into(&executable, &home.join("bin"))?;
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::config::Settings;

    #[test]
    fn test_init_config_copies_and_links() {
        let project = tempfile::tempdir().unwrap();
        let home = tempfile::tempdir().unwrap();

        let link = init_config_in(project.path(), home.path()).unwrap();
        assert!(link.symlink_metadata().unwrap().file_type().is_symlink());
        assert!(Settings::load_file(&link).is_ok());

        std::fs::write(project.path().join("config.toml"), "[llm]\nbackend = \"openai\"\n").unwrap();
        let link = init_config_in(project.path(), home.path()).unwrap();
        let content = std::fs::read_to_string(link).unwrap();
        assert!(content.contains("openai"));
    }

    #[test]
    fn test_symlink_cli_replaces_existing_link() {
        let dir = tempfile::tempdir().unwrap();
        let exe = dir.path().join("video-processor");
        std::fs::write(&exe, b"#!/bin/sh\n").unwrap();
        let bin = dir.path().join("bin");

        let link = symlink_cli_into(&exe, &bin).unwrap();
        assert_eq!(std::fs::read_link(&link).unwrap(), exe);
        let link = symlink_cli_into(&exe, &bin).unwrap();
        assert_eq!(std::fs::read_link(&link).unwrap(), exe);
    }
}
