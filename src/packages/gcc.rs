use anyhow::Result;

use super::{build_env, make};
use crate::{
    commands::{Invocation, Step},
    layout::Component,
    profile::Toolchain,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GccStage {
    /// Build just the compiler, which is then used to bootstrap glibc.
    Stage1,
    /// Build everything else (libgcc, libstdc++) against the installed glibc, reusing the stage 1
    /// objdir.
    Final,
}

pub fn gcc_steps(toolchain: &Toolchain, jobs: u64, stage: GccStage) -> Result<Vec<Step>> {
    let layout = &toolchain.layout;
    let objdir = layout.objdir(Component::Gcc);
    let env = build_env(toolchain)?;

    match stage {
        GccStage::Stage1 => {
            let configure = Invocation::new(
                "configure gcc",
                &objdir,
                layout.source_dir(Component::Gcc).join("configure"),
            )
            .args([
                format!("--target={}", toolchain.triple()),
                format!("--prefix={}", toolchain.dir().display()),
                "--enable-languages=c,c++".into(),
                "--disable-multilib".into(),
                "--disable-nls".into(),
                "--disable-werror".into(),
                "--disable-libsanitizer".into(),
            ])
            .envs(&env);

            Ok(vec![
                configure.into(),
                make("make all-gcc", &objdir, jobs, &["all-gcc"], &env),
                make("make install-gcc", &objdir, jobs, &["install-gcc"], &env),
            ])
        }
        GccStage::Final => Ok(vec![
            make("make gcc", &objdir, jobs, &[], &env),
            make("install gcc", &objdir, jobs, &["install"], &env),
        ]),
    }
}
