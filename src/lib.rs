use std::{
    path::{Path, PathBuf},
    process::Command,
    time::{Duration, Instant},
};

use anyhow::{Context, Result};

use crate::{
    commands::{Executor, SystemExecutor},
    config::BuildOptions,
    fetch::{Fetcher, NetworkFetcher},
    layout::{Component, StagingGuard},
    profile::{Arch, Toolchain},
    tmpfs::{Mounter, SystemMounter, TmpfsMount},
};

pub mod archive;
pub mod commands;
pub mod config;
pub mod download;
pub mod fetch;
pub mod finalize;
pub mod interrupt;
pub mod layout;
pub mod packages;
pub mod patches;
pub mod pipeline;
pub mod preflight;
pub mod profile;
pub mod tmpfs;
pub mod versions;

/// What a build touches outside of the filesystem.
pub struct Host<F: Fetcher, E: Executor, M: Mounter> {
    pub fetcher: F,
    pub executor: E,
    pub mounter: M,
}

#[derive(Debug)]
pub struct Report {
    pub dir: PathBuf,
    pub compiler: PathBuf,
    /// First line of `<triple>-gcc --version`.
    pub compiler_version: Option<String>,
    pub archive: Option<PathBuf>,
    pub elapsed: Duration,
}

fn compiler_version(gcc: &Path) -> Option<String> {
    let output = Command::new(gcc).arg("--version").output().ok()?;
    String::from_utf8(output.stdout)
        .ok()?
        .lines()
        .next()
        .map(str::to_string)
}

/// Resolve what to build for `arch` and GCC `version`, then check the host.
///
/// Resolution needs nothing from the host, so an unsupported request fails before the tools are
/// looked up or `host` is asked for the build triple.
pub fn resolve_toolchain(
    arch: Arch,
    version: &str,
    options: &BuildOptions,
    host: impl FnOnce() -> Result<String>,
) -> Result<Toolchain> {
    let release = versions::resolve(arch, options.source, version, options.mode)?;
    let layout = options.layout()?;
    preflight::check_tools(options)?;
    Ok(Toolchain {
        target: arch,
        release,
        layout,
        build: host()?,
    })
}

/// Build and install `toolchain` on this machine.
pub fn install_toolchain(toolchain: &Toolchain, options: &BuildOptions) -> Result<Report> {
    preflight::check_tools(options)?;

    let mut host = Host {
        fetcher: NetworkFetcher {
            shallow: options.shallow,
            verbose: options.verbose,
        },
        executor: SystemExecutor {
            verbose: options.verbose,
        },
        mounter: SystemMounter,
    };
    install_toolchain_with(toolchain, options, &mut host)
}

/// Like [`install_toolchain`] but with the given fetcher, executor and mounter.
///
/// On any error, including an interrupt, the tmpfs is unmounted and the staging tree and partial
/// install prefix are removed before this returns.
pub fn install_toolchain_with<F, E, M>(
    toolchain: &Toolchain,
    options: &BuildOptions,
    host: &mut Host<F, E, M>,
) -> Result<Report>
where
    F: Fetcher,
    E: Executor,
    M: Mounter,
{
    let start = Instant::now();
    let layout = &toolchain.layout;

    layout.clean(toolchain.triple())?;
    layout.prepare()?;

    // dropped last: the tmpfs is unmounted before the staging tree is removed
    let mut staging = StagingGuard::new(layout, toolchain.dir());
    let _tmpfs = match &options.tmpfs {
        Some(size) => Some(TmpfsMount::mount(&host.mounter, layout.staging(), size)?),
        None => None,
    };
    layout.prepare_objdirs()?;

    let artifacts = fetch::artifacts(toolchain);
    fetch::fetch_all(
        &artifacts,
        &layout.sources(),
        &mut host.fetcher,
        options.update,
    )?;

    if let Some(patch) = toolchain.release.patch
        && let Some(gcc) = artifacts.iter().find(|a| a.component == Component::Gcc)
    {
        patch.apply(layout.sources().join(&gcc.dir))?;
    }
    layout.link_sources(&artifacts)?;

    pipeline::run(toolchain, options.jobs, &mut host.executor)?;

    if options.strip {
        finalize::strip(toolchain, &mut host.executor)?;
    }
    interrupt::check()?;
    finalize::verify(toolchain)?;
    staging.commit();

    // the verified prefix is kept even if packaging is interrupted
    let archive = match options.package {
        Some(format) => match archive::package(toolchain, format) {
            Ok(path) => Some(path),
            Err(e) if e.downcast_ref::<interrupt::Interrupted>().is_some() => return Err(e),
            Err(e) => {
                log::error!("packaging failed: {e:#}");
                None
            }
        },
        None => None,
    };
    interrupt::check()?;

    let compiler = toolchain.gcc_bin();
    Ok(Report {
        dir: toolchain.dir(),
        compiler_version: compiler_version(&compiler),
        compiler,
        archive,
        elapsed: start.elapsed(),
    })
}

/// Remove every cached download, log and source tree.
pub fn prune_cache(work_dir: &Path) -> Result<()> {
    for dir in [download::cache_dir()?, work_dir.to_path_buf()] {
        if tmpfs::is_mountpoint(dir.join("build")) {
            return Err(layout::PreconditionError::StaleMount(dir.join("build")).into());
        }
        if dir.exists() {
            std::fs::remove_dir_all(&dir)
                .context(format!("failed to prune `{}`", dir.display()))?;
        }
    }
    Ok(())
}
