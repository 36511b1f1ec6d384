use anyhow::Result;

use super::build_env;
use crate::{
    commands::{Invocation, Step},
    layout::Component,
    profile::Toolchain,
};

/// Install the Linux UAPI headers into the sysroot.
pub fn kernel_headers_steps(toolchain: &Toolchain) -> Result<Vec<Step>> {
    let env = build_env(toolchain)?;
    let install = Invocation::make(
        "install linux headers",
        toolchain.layout.source_dir(Component::Linux),
    )
    .args([
        format!("ARCH={}", toolchain.target.kernel_arch()),
        format!("INSTALL_HDR_PATH={}", toolchain.sysroot().display()),
        "headers_install".into(),
    ])
    .envs(&env);

    Ok(vec![install.into()])
}
