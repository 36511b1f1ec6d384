use anyhow::Result;

use super::{build_env, make};
use crate::{
    commands::{Invocation, Step},
    layout::Component,
    profile::Toolchain,
};

/// Bootstrap glibc with the stage 1 compiler.
///
/// The headers and start files go in first, together with an empty `libc.so`, which is enough for
/// libgcc to build. Then libgcc is built in the gcc objdir and glibc is built for real.
pub fn glibc_steps(toolchain: &Toolchain, jobs: u64) -> Result<Vec<Step>> {
    let layout = &toolchain.layout;
    let objdir = layout.objdir(Component::Glibc);
    let gcc_objdir = layout.objdir(Component::Gcc);
    let sysroot = toolchain.sysroot();
    let lib = sysroot.join("lib");
    let gnu_include = sysroot.join("include").join("gnu");
    let triple = toolchain.triple();
    let env = build_env(toolchain)?;

    let configure = Invocation::new(
        "configure glibc",
        &objdir,
        layout.source_dir(Component::Glibc).join("configure"),
    )
    .args([
        format!("--prefix={}", sysroot.display()),
        format!("--build={}", toolchain.build),
        format!("--host={triple}"),
        format!("--target={triple}"),
        format!("--with-headers={}", sysroot.join("include").display()),
        "--disable-multilib".into(),
        "--disable-werror".into(),
        "libc_cv_forced_unwind=yes".into(),
    ])
    .envs(&env);

    let install_headers = Invocation::make("install glibc headers", &objdir)
        .args(["install-bootstrap-headers=yes", "install-headers"])
        .envs(&env);

    let install_crt = Invocation::new("install crt files", &objdir, "install")
        .args(["csu/crt1.o", "csu/crti.o", "csu/crtn.o"])
        .arg(lib.display().to_string())
        .envs(&env);

    let empty_libc = Invocation::new("create empty libc.so", &objdir, toolchain.gcc_bin())
        .args([
            "-nostdlib",
            "-nostartfiles",
            "-shared",
            "-x",
            "c",
            "/dev/null",
            "-o",
        ])
        .arg(lib.join("libc.so").display().to_string())
        .envs(&env);

    Ok(vec![
        configure.into(),
        install_headers.into(),
        make("make csu/subdir_lib", &objdir, jobs, &["csu/subdir_lib"], &env),
        Step::CreateDir(lib),
        install_crt.into(),
        empty_libc.into(),
        Step::CreateDir(gnu_include.clone()),
        Step::Touch(gnu_include.join("stubs.h")),
        make("make libgcc", &gcc_objdir, jobs, &["all-target-libgcc"], &env),
        make(
            "install libgcc",
            &gcc_objdir,
            jobs,
            &["install-target-libgcc"],
            &env,
        ),
        make("make glibc", &objdir, jobs, &[], &env),
        make("install glibc", &objdir, jobs, &["install"], &env),
    ])
}
