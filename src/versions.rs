//! The release table.
//!
//! Every supported `(source, major)` pair has exactly one row. A row carries the git branch used
//! in repo mode and the release archive used in tarball mode side by side, while the glibc, ISL
//! and patch columns are shared by both modes. Keeping both modes in the same row means the two
//! can't disagree about which glibc or ISL a given GCC is built against.
use std::fmt::Display;

use thiserror::Error;

use crate::{
    patches::PatchId,
    profile::{Arch, FetchMode, Source},
};

pub const DEFAULT_GLIBC: &str = "2.28";
pub const DEFAULT_ISL: &str = "0.20";
pub const BINUTILS_TARBALL: &str = "binutils-2.32";
pub const BINUTILS_BRANCH: &str = "binutils-2_32-branch";

pub const LINUX: &str = "4.19";
pub const GMP: &str = "6.1.2";
pub const MPFR: &str = "3.1.6";
pub const MPC: &str = "1.1.0";

#[derive(Debug, Clone, Copy)]
struct Row {
    source: Source,
    major: u8,
    branch: Option<&'static str>,
    tarball: Option<&'static str>,
    glibc: Option<&'static str>,
    isl: Option<&'static str>,
    patch: Option<PatchId>,
}

const fn row(source: Source, major: u8) -> Row {
    Row {
        source,
        major,
        branch: None,
        tarball: None,
        glibc: None,
        isl: None,
        patch: None,
    }
}

#[rustfmt::skip]
const RELEASES: &[Row] = &[
    Row { branch: Some("releases/gcc-4.9"), tarball: Some("gcc-4.9.4"), glibc: Some("2.26"), isl: Some("0.12.2"), patch: Some(PatchId::Gcc49ModernHost), ..row(Source::Gnu, 4) },
    Row { branch: Some("releases/gcc-5"), tarball: Some("gcc-5.5.0"), glibc: Some("2.27"), isl: Some("0.14"), ..row(Source::Gnu, 5) },
    Row { branch: Some("releases/gcc-6"), tarball: Some("gcc-6.5.0"), isl: Some("0.16.1"), ..row(Source::Gnu, 6) },
    Row { branch: Some("releases/gcc-7"), tarball: Some("gcc-7.5.0"), ..row(Source::Gnu, 7) },
    Row { branch: Some("releases/gcc-8"), tarball: Some("gcc-8.5.0"), ..row(Source::Gnu, 8) },
    Row { branch: Some("releases/gcc-9"), tarball: Some("gcc-9.5.0"), ..row(Source::Gnu, 9) },
    // development branch, no release archive
    Row { branch: Some("master"), ..row(Source::Gnu, 10) },

    Row { tarball: Some("gcc-linaro-4.9-2017.01"), glibc: Some("2.26"), isl: Some("0.12.2"), patch: Some(PatchId::Gcc49ModernHost), ..row(Source::Linaro, 4) },
    Row { branch: Some("linaro/gcc-5-branch"), tarball: Some("gcc-linaro-5.5-2017.10"), glibc: Some("2.27"), isl: Some("0.14"), ..row(Source::Linaro, 5) },
    Row { branch: Some("linaro/gcc-6-branch"), tarball: Some("gcc-linaro-6.4-2018.05"), isl: Some("0.16.1"), ..row(Source::Linaro, 6) },
    Row { branch: Some("linaro/gcc-7-branch"), tarball: Some("gcc-linaro-7.5-2019.12"), ..row(Source::Linaro, 7) },
];

/// A reference to a source tree: either a git branch or a release archive name such as
/// `gcc-8.5.0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceRef {
    Branch(String),
    Tarball(String),
}

impl SourceRef {
    pub fn name(&self) -> &str {
        match self {
            SourceRef::Branch(name) | SourceRef::Tarball(name) => name,
        }
    }
}

impl Display for SourceRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceRef::Branch(branch) => write!(f, "branch {branch}"),
            SourceRef::Tarball(tarball) => write!(f, "{tarball}"),
        }
    }
}

/// Everything needed to fetch the sources of one toolchain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Release {
    pub source: Source,
    pub major: u8,
    pub mode: FetchMode,
    pub gcc: SourceRef,
    pub binutils: SourceRef,
    pub glibc: &'static str,
    pub isl: &'static str,
    pub patch: Option<PatchId>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("`{0}` is not a valid GCC major version")]
    InvalidVersion(String),
    #[error("GCC {major} is not available from {from}")]
    UnsupportedVersion { from: Source, major: u8 },
    #[error("GCC {major} from {from} can't be fetched in {mode} mode")]
    UnsupportedInMode {
        from: Source,
        major: u8,
        mode: FetchMode,
    },
    #[error("GCC {major} does not bootstrap correctly for {arch}; use GCC 6 or newer")]
    KnownBadBootstrap { arch: Arch, major: u8 },
}

fn parse_major(version: &str) -> Result<u8, ResolveError> {
    version
        .trim()
        .parse()
        .map_err(|_| ResolveError::InvalidVersion(version.to_string()))
}

/// Resolve `(source, version)` to a complete release for `mode`.
///
/// Fails without touching the table for combinations that are known to produce a broken
/// toolchain.
pub fn resolve(
    arch: Arch,
    source: Source,
    version: &str,
    mode: FetchMode,
) -> Result<Release, ResolveError> {
    let major = parse_major(version)?;

    if arch == Arch::X86_64 && major <= 5 {
        return Err(ResolveError::KnownBadBootstrap { arch, major });
    }

    let row = RELEASES
        .iter()
        .find(|row| row.source == source && row.major == major)
        .ok_or(ResolveError::UnsupportedVersion {
            from: source,
            major,
        })?;

    let unsupported = ResolveError::UnsupportedInMode {
        from: source,
        major,
        mode,
    };
    let (gcc, binutils) = match mode {
        FetchMode::Repo => (
            SourceRef::Branch(row.branch.ok_or(unsupported)?.to_string()),
            SourceRef::Branch(BINUTILS_BRANCH.to_string()),
        ),
        FetchMode::Tarball => (
            SourceRef::Tarball(row.tarball.ok_or(unsupported)?.to_string()),
            SourceRef::Tarball(BINUTILS_TARBALL.to_string()),
        ),
    };

    Ok(Release {
        source,
        major,
        mode,
        gcc,
        binutils,
        glibc: row.glibc.unwrap_or(DEFAULT_GLIBC),
        isl: row.isl.unwrap_or(DEFAULT_ISL),
        patch: row.patch,
    })
}

/// All `(source, major)` pairs in the table.
pub fn supported() -> impl Iterator<Item = (Source, u8)> {
    RELEASES.iter().map(|row| (row.source, row.major))
}
