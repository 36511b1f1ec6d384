mod common;

use std::path::PathBuf;

use anyhow::Result;
use common::{FakeExecutor, toolchain};
use cross_gcc::{
    commands::{Invocation, Step},
    interrupt,
    layout::Layout,
    pipeline::{self, Stage, plan},
    profile::{Arch, Source},
};
use serial_test::serial;

fn commands(steps: &[Step]) -> Vec<&Invocation> {
    steps
        .iter()
        .filter_map(|step| match step {
            Step::Command(invocation) => Some(invocation),
            _ => None,
        })
        .collect()
}

#[test]
fn every_step_runs_with_the_toolchain_on_path() -> Result<()> {
    let toolchain = toolchain(Arch::Arm, Source::Gnu, "8", Layout::new("/w", "/i"));
    for (stage, steps) in plan(&toolchain, 8)? {
        for invocation in commands(&steps) {
            let (_, path) = invocation
                .env
                .iter()
                .find(|(key, _)| key == "PATH")
                .unwrap_or_else(|| panic!("{stage}: {} has no PATH", invocation.title));
            let first = std::env::split_paths(path).next();
            assert_eq!(first, Some(PathBuf::from("/i/arm-linux-gnueabi/bin")));
        }
    }
    Ok(())
}

#[test]
fn binutils_and_kernel_headers() -> Result<()> {
    let toolchain = toolchain(Arch::Arm64, Source::Gnu, "8", Layout::new("/w", "/i"));
    let plan = plan(&toolchain, 4)?;

    let (stage, binutils) = &plan[0];
    assert_eq!(*stage, Stage::Binutils);
    let binutils = commands(binutils);
    assert_eq!(
        binutils[0].program,
        PathBuf::from("/w/build/binutils/configure")
    );
    assert_eq!(binutils[0].workdir, PathBuf::from("/w/build/build-binutils"));
    similar_asserts::assert_eq!(
        binutils[0].args,
        vec![
            "--target=aarch64-linux-gnu",
            "--prefix=/i/aarch64-linux-gnu",
            "--disable-multilib",
            "--disable-nls",
            "--disable-werror",
            "--disable-gdb",
            "--disable-sim",
        ]
    );
    assert_eq!(binutils[1].args, vec!["-j4"]);
    assert_eq!(binutils[2].args, vec!["-j4", "install"]);

    let (stage, headers) = &plan[1];
    assert_eq!(*stage, Stage::KernelHeaders);
    let headers = commands(headers);
    assert_eq!(headers.len(), 1);
    assert_eq!(headers[0].workdir, PathBuf::from("/w/build/linux"));
    similar_asserts::assert_eq!(
        headers[0].args,
        vec![
            "ARCH=arm64",
            "INSTALL_HDR_PATH=/i/aarch64-linux-gnu/aarch64-linux-gnu",
            "headers_install",
        ]
    );
    Ok(())
}

#[test]
fn glibc_bootstraps_with_the_stage1_compiler() -> Result<()> {
    let toolchain = toolchain(Arch::I686, Source::Gnu, "9", Layout::new("/w", "/i"));
    let plan = plan(&toolchain, 2)?;
    let (stage, steps) = &plan[3];
    assert_eq!(*stage, Stage::Glibc);

    let sysroot = PathBuf::from("/i/i686-linux-gnu/i686-linux-gnu");
    let configure = commands(steps)[0];
    assert!(configure.args.contains(&"--build=x86_64-pc-linux-gnu".to_string()));
    assert!(configure.args.contains(&"--host=i686-linux-gnu".to_string()));
    assert!(configure.args.contains(&format!("--prefix={}", sysroot.display())));
    assert!(configure.args.contains(&"libc_cv_forced_unwind=yes".to_string()));

    let libc_so = commands(steps)
        .into_iter()
        .find(|invocation| invocation.title == "create empty libc.so")
        .expect("libc.so step");
    assert_eq!(
        libc_so.program,
        PathBuf::from("/i/i686-linux-gnu/bin/i686-linux-gnu-gcc")
    );
    assert_eq!(
        libc_so.args.last().map(String::as_str),
        Some("/i/i686-linux-gnu/i686-linux-gnu/lib/libc.so")
    );

    assert!(steps.contains(&Step::Touch(sysroot.join("include/gnu/stubs.h"))));

    // libgcc is built between the bootstrap and the full glibc build
    let titles: Vec<&str> = commands(steps).iter().map(|i| i.title.as_str()).collect();
    let libgcc = titles.iter().position(|t| *t == "make libgcc");
    let crt = titles.iter().position(|t| *t == "install crt files");
    let full = titles.iter().position(|t| *t == "make glibc");
    assert!(crt < libgcc && libgcc < full, "{titles:?}");
    Ok(())
}

#[test]
fn final_gcc_reuses_the_stage1_objdir() -> Result<()> {
    let toolchain = toolchain(Arch::Arm, Source::Linaro, "7", Layout::new("/w", "/i"));
    let plan = plan(&toolchain, 16)?;
    let (_, stage1) = &plan[2];
    let (stage, last) = &plan[4];
    assert_eq!(*stage, Stage::GccFinal);

    let stage1 = commands(stage1);
    assert_eq!(stage1[0].program, PathBuf::from("/w/build/gcc/configure"));
    assert!(stage1[0].args.contains(&"--enable-languages=c,c++".to_string()));
    assert_eq!(stage1[1].args, vec!["-j16", "all-gcc"]);
    assert_eq!(stage1[2].args, vec!["-j16", "install-gcc"]);

    for invocation in commands(last) {
        assert_eq!(invocation.workdir, PathBuf::from("/w/build/build-gcc"));
    }
    Ok(())
}

#[test]
#[serial(interrupt)]
fn a_failing_step_stops_the_pipeline() -> Result<()> {
    interrupt::reset();
    let toolchain = toolchain(Arch::Arm, Source::Gnu, "8", Layout::new("/w", "/i"));
    let mut executor = FakeExecutor {
        fail_at: Some("make csu/subdir_lib"),
        ..Default::default()
    };

    let err = pipeline::run(&toolchain, 1, &mut executor).expect_err("glibc fails");
    assert!(format!("{err:#}").starts_with("glibc failed"));
    assert_eq!(executor.titles.last().map(String::as_str), Some("make csu/subdir_lib"));
    assert!(!executor.titles.iter().any(|t| t == "make gcc"));
    Ok(())
}

#[test]
#[serial(interrupt)]
fn stages_execute_in_bootstrap_order() -> Result<()> {
    interrupt::reset();
    let toolchain = toolchain(Arch::Arm, Source::Gnu, "8", Layout::new("/w", "/i"));
    let mut executor = FakeExecutor::default();
    pipeline::run(&toolchain, 1, &mut executor)?;

    let position = |title: &str| {
        executor
            .titles
            .iter()
            .position(|t| t == title)
            .unwrap_or_else(|| panic!("{title} never ran"))
    };
    let order = [
        position("install binutils"),
        position("install linux headers"),
        position("make install-gcc"),
        position("install glibc"),
        position("install gcc"),
    ];
    assert!(order.windows(2).all(|w| w[0] < w[1]), "{order:?}");
    Ok(())
}
