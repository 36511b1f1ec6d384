//! Build steps of the packages that make up a toolchain.
//!
//! Nothing in here runs anything: every function returns the [`Step`]s of a stage so that the
//! pipeline can be planned, inspected and then executed.
use std::ffi::OsString;

use anyhow::Result;

use crate::{
    commands::{Invocation, Step},
    profile::Toolchain,
};

pub mod binutils;
pub mod gcc;
pub mod glibc;
pub mod linux;

/// The environment every build step runs with: the toolchain's `bin` directory in front of `PATH`.
pub fn build_env(toolchain: &Toolchain) -> Result<Vec<(String, OsString)>> {
    Ok(vec![("PATH".into(), toolchain.env_path()?)])
}

/// `make -j<jobs> [targets]` in `workdir`.
fn make(
    title: &str,
    workdir: impl Into<std::path::PathBuf>,
    jobs: u64,
    targets: &[&str],
    env: &[(String, OsString)],
) -> Step {
    Invocation::make(title, workdir)
        .arg(format!("-j{jobs}"))
        .args(targets.iter().copied())
        .envs(env)
        .into()
}
