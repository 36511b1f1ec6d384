use anyhow::Result;

use super::{build_env, make};
use crate::{
    commands::{Invocation, Step},
    layout::Component,
    profile::Toolchain,
};

/// Configure, build and install binutils into the prefix.
pub fn binutils_steps(toolchain: &Toolchain, jobs: u64) -> Result<Vec<Step>> {
    let layout = &toolchain.layout;
    let objdir = layout.objdir(Component::Binutils);
    let env = build_env(toolchain)?;

    let configure = Invocation::new(
        "configure binutils",
        &objdir,
        layout.source_dir(Component::Binutils).join("configure"),
    )
    .args([
        format!("--target={}", toolchain.triple()),
        format!("--prefix={}", toolchain.dir().display()),
        "--disable-multilib".into(),
        "--disable-nls".into(),
        "--disable-werror".into(),
        "--disable-gdb".into(),
        "--disable-sim".into(),
    ])
    .envs(&env);

    Ok(vec![
        configure.into(),
        make("make binutils", &objdir, jobs, &[], &env),
        make("install binutils", &objdir, jobs, &["install"], &env),
    ])
}
