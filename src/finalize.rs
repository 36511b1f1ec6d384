//! Post-build steps: stripping host binaries and checking the result.
use std::{
    fs::File,
    io::Read,
    path::{Path, PathBuf},
};

use anyhow::{Result, bail};
use walkdir::WalkDir;

use crate::{
    commands::{Executor, Invocation, Step},
    interrupt,
    profile::Toolchain,
};

const ELF_MAGIC: [u8; 4] = [0x7f, b'E', b'L', b'F'];

fn is_elf(path: &Path) -> bool {
    let mut magic = [0u8; 4];
    File::open(path)
        .and_then(|mut f| f.read_exact(&mut magic))
        .is_ok_and(|_| magic == ELF_MAGIC)
}

/// ELF files under the directories holding host executables.
///
/// Target libraries in the sysroot are left alone since the host `strip` can't handle them.
pub fn host_binaries(toolchain: &Toolchain) -> Vec<PathBuf> {
    let prefix = toolchain.dir();
    let dirs = [
        prefix.join("bin"),
        prefix.join("libexec"),
        prefix.join(toolchain.triple()).join("bin"),
    ];

    let mut binaries: Vec<PathBuf> = dirs
        .iter()
        .flat_map(|dir| WalkDir::new(dir).follow_links(false))
        .flatten()
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| is_elf(path))
        .collect();
    binaries.sort();
    binaries
}

/// Strip host executables. A failure only costs disk space, so it is logged and ignored. An
/// interrupt is not a failure and is returned.
pub fn strip(toolchain: &Toolchain, executor: &mut impl Executor) -> Result<()> {
    let binaries = host_binaries(toolchain);
    if binaries.is_empty() {
        return Ok(());
    }

    log::info!("=> strip {} host binaries", binaries.len());
    let step: Step = Invocation::new("strip", toolchain.dir(), "strip")
        .arg("--strip-unneeded")
        .args(binaries.iter().map(|path| path.display().to_string()))
        .into();
    if let Err(e) = executor.execute(&step) {
        if e.downcast_ref::<interrupt::Interrupted>().is_some() {
            return Err(e);
        }
        interrupt::check()?;
        log::warn!("stripping failed, the toolchain is left unstripped: {e:#}");
    }
    Ok(())
}

/// The build only counts as successful once the cross compiler exists.
pub fn verify(toolchain: &Toolchain) -> Result<()> {
    let gcc = toolchain.gcc_bin();
    if !gcc.is_file() {
        bail!(
            "the build finished but `{}` doesn't exist",
            gcc.display()
        );
    }
    Ok(())
}
