//! Stand-ins for the network, the host and `mount`.
#![allow(dead_code)]

use std::{
    cell::RefCell,
    path::{Path, PathBuf},
};

use anyhow::{Result, bail};
use cross_gcc::{
    commands::{Executor, Step},
    fetch::Fetcher,
    interrupt,
    layout::Layout,
    profile::{Arch, FetchMode, Source, Toolchain},
    tmpfs::Mounter,
};

pub fn toolchain(arch: Arch, source: Source, version: &str, layout: Layout) -> Toolchain {
    Toolchain::resolve(
        arch,
        source,
        version,
        FetchMode::Repo,
        layout,
        "x86_64-pc-linux-gnu",
    )
    .expect("supported toolchain")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchCall {
    Clone(String),
    Update(String),
    Download(String),
}

/// Creates the destination directory instead of fetching anything. With `interrupt_after`, the
/// call with that number is interrupted the way a killed `git` would be.
#[derive(Default)]
pub struct FakeFetcher {
    pub calls: Vec<FetchCall>,
    pub interrupt_after: Option<usize>,
}

impl FakeFetcher {
    fn record(&mut self, call: FetchCall) -> Result<()> {
        self.calls.push(call);
        if self.interrupt_after == Some(self.calls.len()) {
            interrupt::trigger();
            return Err(interrupt::Interrupted.into());
        }
        Ok(())
    }
}

impl Fetcher for FakeFetcher {
    fn clone_repo(&mut self, _url: &str, branch: &str, dest: &Path) -> Result<()> {
        self.record(FetchCall::Clone(branch.to_string()))?;
        std::fs::create_dir_all(dest)?;
        Ok(())
    }

    fn update_repo(&mut self, branch: &str, _dest: &Path) -> Result<()> {
        self.record(FetchCall::Update(branch.to_string()))
    }

    fn download_tarball(&mut self, url: &str, dest: &Path) -> Result<()> {
        self.record(FetchCall::Download(url.to_string()))?;
        std::fs::create_dir_all(dest)?;
        Ok(())
    }
}

/// Records step titles. Installs a fake compiler when gcc is installed, and can fail or be
/// interrupted at a given step.
#[derive(Default)]
pub struct FakeExecutor {
    pub titles: Vec<String>,
    pub compiler: Option<PathBuf>,
    pub fail_at: Option<&'static str>,
    pub interrupt_at: Option<&'static str>,
}

impl Executor for FakeExecutor {
    fn execute(&mut self, step: &Step) -> Result<()> {
        let title = match step {
            Step::Command(invocation) => invocation.title.clone(),
            Step::CreateDir(path) => format!("mkdir {}", path.display()),
            Step::Touch(path) => format!("touch {}", path.display()),
        };
        self.titles.push(title.clone());

        if self.interrupt_at == Some(title.as_str()) {
            interrupt::trigger();
            return Err(interrupt::Interrupted.into());
        }
        if self.fail_at == Some(title.as_str()) {
            bail!("{title} exited with status 2");
        }
        if title == "make install-gcc"
            && let Some(compiler) = &self.compiler
        {
            std::fs::create_dir_all(compiler.parent().expect("bin dir"))?;
            // an ELF header, so there is something to strip
            std::fs::write(compiler, [0x7f, b'E', b'L', b'F', 2, 1, 1, 0])?;
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingMounter {
    pub calls: RefCell<Vec<String>>,
}

impl Mounter for RecordingMounter {
    fn mount_tmpfs(&self, target: &Path, size: &str) -> Result<()> {
        self.calls
            .borrow_mut()
            .push(format!("mount {size} {}", target.display()));
        Ok(())
    }

    fn unmount(&self, target: &Path) -> Result<()> {
        self.calls
            .borrow_mut()
            .push(format!("umount {}", target.display()));
        Ok(())
    }
}
