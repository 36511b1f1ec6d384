use std::{ffi::OsString, fmt::Display, path::PathBuf};

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::Deserialize;

use crate::{
    layout::Layout,
    versions::{Release, ResolveError, resolve},
};

/// Architectures a toolchain can be built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum Arch {
    Arm,
    Arm64,
    I686,
    #[value(name = "x86_64")]
    X86_64,
}

impl Arch {
    /// The GNU target triple the toolchain is configured for.
    pub fn triple(&self) -> &'static str {
        match self {
            Arch::Arm => "arm-linux-gnueabi",
            Arch::Arm64 => "aarch64-linux-gnu",
            Arch::I686 => "i686-linux-gnu",
            Arch::X86_64 => "x86_64-linux-gnu",
        }
    }

    /// The `ARCH=` value the Linux kernel build expects for `headers_install`.
    pub fn kernel_arch(&self) -> &'static str {
        match self {
            Arch::Arm => "arm",
            Arch::Arm64 => "arm64",
            Arch::I686 | Arch::X86_64 => "x86",
        }
    }
}

impl Display for Arch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Arch::Arm => write!(f, "arm"),
            Arch::Arm64 => write!(f, "arm64"),
            Arch::I686 => write!(f, "i686"),
            Arch::X86_64 => write!(f, "x86_64"),
        }
    }
}

/// Where GCC comes from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    #[default]
    Gnu,
    Linaro,
}

impl Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Source::Gnu => write!(f, "gnu"),
            Source::Linaro => write!(f, "linaro"),
        }
    }
}

/// Whether sources are fetched as git clones or as release archives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum FetchMode {
    #[default]
    Repo,
    Tarball,
}

impl Display for FetchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchMode::Repo => write!(f, "repo"),
            FetchMode::Tarball => write!(f, "tarball"),
        }
    }
}

/// A fully resolved toolchain build.
///
/// Produced once from the command line and passed by reference to every stage. Nothing in here
/// changes after resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolchain {
    pub target: Arch,
    pub release: Release,
    pub layout: Layout,
    /// The triple of the machine running the build, passed to glibc as `--build`.
    pub build: String,
}

impl Toolchain {
    pub fn resolve(
        target: Arch,
        source: Source,
        version: impl AsRef<str>,
        mode: FetchMode,
        layout: Layout,
        build: impl Into<String>,
    ) -> Result<Self, ResolveError> {
        let release = resolve(target, source, version.as_ref(), mode)?;
        Ok(Self {
            target,
            release,
            layout,
            build: build.into(),
        })
    }

    pub fn triple(&self) -> &'static str {
        self.target.triple()
    }

    /// A short identifier, e.g. `aarch64-linux-gnu-8.x-gnu`.
    pub fn id(&self) -> String {
        format!(
            "{}-{}.x-{}",
            self.triple(),
            self.release.major,
            self.release.source
        )
    }

    /// The install prefix.
    pub fn dir(&self) -> PathBuf {
        self.layout.prefix(self.triple())
    }

    /// Target headers and libraries live in `<prefix>/<triple>`.
    pub fn sysroot(&self) -> PathBuf {
        self.dir().join(self.triple())
    }

    pub fn bin_dir(&self) -> PathBuf {
        self.dir().join("bin")
    }

    pub fn gcc_bin(&self) -> PathBuf {
        self.bin_dir().join(format!("{}-gcc", self.triple()))
    }

    /// `$PATH` with the toolchain's `bin` directory in front.
    pub fn env_path(&self) -> Result<OsString> {
        let mut paths = vec![self.bin_dir()];
        if let Some(path) = std::env::var_os("PATH") {
            paths.extend(std::env::split_paths(&path));
        }
        std::env::join_paths(paths).context("toolchain bin directory contains a `:`")
    }
}

impl Display for Toolchain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "target:   {} ({})", self.triple(), self.target)?;
        writeln!(
            f,
            "gcc:      {} {} ({})",
            self.release.source, self.release.gcc, self.release.mode
        )?;
        writeln!(f, "binutils: {}", self.release.binutils)?;
        writeln!(f, "glibc:    {}", self.release.glibc)?;
        write!(f, "isl:      {}", self.release.isl)?;
        if let Some(patch) = self.release.patch {
            write!(f, "\npatch:    {patch}")?;
        }
        Ok(())
    }
}
