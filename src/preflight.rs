//! Host checks done before touching the work directory.
use std::process::Command;

use anyhow::{Context, Result, bail};
use nix::unistd::geteuid;

use crate::{config::BuildOptions, layout::PreconditionError, profile::FetchMode};

/// The host tools a build with `options` runs.
pub fn required_tools(options: &BuildOptions) -> Vec<&'static str> {
    let mut tools = vec!["make", "gcc", "g++", "install"];
    if options.strip {
        tools.push("strip");
    }
    if options.mode == FetchMode::Repo {
        tools.push("git");
    }
    if options.tmpfs.is_some() && !geteuid().is_root() {
        tools.push("sudo");
    }
    tools
}

pub fn check_tools(options: &BuildOptions) -> Result<(), PreconditionError> {
    for tool in required_tools(options) {
        if which::which(tool).is_err() {
            return Err(PreconditionError::MissingTool(tool.to_string()));
        }
    }
    Ok(())
}

/// The triple of the machine running the build, as the host compiler reports it.
pub fn host_triple() -> Result<String> {
    let output = Command::new("gcc")
        .arg("-dumpmachine")
        .output()
        .context("running `gcc -dumpmachine`")?;
    if !output.status.success() {
        bail!("`gcc -dumpmachine` exited with status {}", output.status);
    }
    let triple = String::from_utf8(output.stdout).context("`gcc -dumpmachine` output")?;
    Ok(triple.trim().to_string())
}
