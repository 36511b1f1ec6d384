//! Fetching the sources of a toolchain.
use std::path::Path;

use anyhow::{Context, Result, bail};

use crate::{
    commands::{run_command_in, run_command_inherit_in},
    download::download_and_decompress,
    interrupt,
    layout::Component,
    profile::{FetchMode, Source, Toolchain},
    versions::{self, SourceRef},
};

const GNU_GCC_REPO: &str = "https://gcc.gnu.org/git/gcc.git";
const LINARO_GCC_REPO: &str = "https://git.linaro.org/toolchain/gcc.git";
const BINUTILS_REPO: &str = "https://sourceware.org/git/binutils-gdb.git";
const GLIBC_REPO: &str = "https://sourceware.org/git/glibc.git";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    Git { url: String, branch: String },
    Tarball { url: String },
}

/// A source tree the build needs, and where to get it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub component: Component,
    /// Directory name under the sources directory.
    pub dir: String,
    pub origin: Origin,
}

impl Artifact {
    fn git(component: Component, url: &str, branch: &str) -> Self {
        Self {
            component,
            dir: format!("{component}-git-{}", branch.replace('/', "-")),
            origin: Origin::Git {
                url: url.to_string(),
                branch: branch.to_string(),
            },
        }
    }

    /// `name` is the archive's top-level directory, e.g. `gmp-6.1.2`.
    fn tarball(component: Component, name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            component,
            dir: name.into(),
            origin: Origin::Tarball { url: url.into() },
        }
    }
}

fn gcc_tarball_url(source: Source, name: &str, major: u8) -> String {
    match source {
        Source::Gnu => {
            let ext = if major <= 10 { "gz" } else { "xz" };
            format!("https://ftp.gnu.org/gnu/gcc/{name}/{name}.tar.{ext}")
        }
        Source::Linaro => {
            let version = name.trim_start_matches("gcc-linaro-");
            format!(
                "https://releases.linaro.org/components/toolchain/gcc-linaro/{version}/{name}.tar.xz"
            )
        }
    }
}

/// Every source tree `toolchain` is built from, GCC first.
pub fn artifacts(toolchain: &Toolchain) -> Vec<Artifact> {
    let release = &toolchain.release;

    let gcc = match &release.gcc {
        SourceRef::Branch(branch) => {
            let url = match release.source {
                Source::Gnu => GNU_GCC_REPO,
                Source::Linaro => LINARO_GCC_REPO,
            };
            Artifact::git(Component::Gcc, url, branch)
        }
        SourceRef::Tarball(name) => Artifact::tarball(
            Component::Gcc,
            name.as_str(),
            gcc_tarball_url(release.source, name, release.major),
        ),
    };

    let binutils = match &release.binutils {
        SourceRef::Branch(branch) => Artifact::git(Component::Binutils, BINUTILS_REPO, branch),
        SourceRef::Tarball(name) => Artifact::tarball(
            Component::Binutils,
            name.as_str(),
            format!("https://ftp.gnu.org/gnu/binutils/{name}.tar.xz"),
        ),
    };

    let glibc = match release.mode {
        FetchMode::Repo => Artifact::git(
            Component::Glibc,
            GLIBC_REPO,
            &format!("release/{}/master", release.glibc),
        ),
        FetchMode::Tarball => {
            let name = format!("glibc-{}", release.glibc);
            let url = format!("https://ftp.gnu.org/gnu/glibc/{name}.tar.xz");
            Artifact::tarball(Component::Glibc, name, url)
        }
    };

    let linux = format!("linux-{}", versions::LINUX);
    let linux_major = versions::LINUX.split('.').next().unwrap_or_default();
    let gmp = format!("gmp-{}", versions::GMP);
    let mpfr = format!("mpfr-{}", versions::MPFR);
    let mpc = format!("mpc-{}", versions::MPC);
    let isl = format!("isl-{}", release.isl);

    vec![
        gcc,
        binutils,
        glibc,
        Artifact::tarball(
            Component::Linux,
            linux.as_str(),
            format!("https://cdn.kernel.org/pub/linux/kernel/v{linux_major}.x/{linux}.tar.xz"),
        ),
        Artifact::tarball(
            Component::Gmp,
            gmp.as_str(),
            format!("https://ftp.gnu.org/gnu/gmp/{gmp}.tar.xz"),
        ),
        Artifact::tarball(
            Component::Mpfr,
            mpfr.as_str(),
            format!("https://ftp.gnu.org/gnu/mpfr/{mpfr}.tar.xz"),
        ),
        Artifact::tarball(
            Component::Mpc,
            mpc.as_str(),
            format!("https://ftp.gnu.org/gnu/mpc/{mpc}.tar.gz"),
        ),
        Artifact::tarball(
            Component::Isl,
            isl.as_str(),
            format!("https://gcc.gnu.org/pub/gcc/infrastructure/{isl}.tar.bz2"),
        ),
    ]
}

/// Network operations needed to fetch sources.
pub trait Fetcher {
    fn clone_repo(&mut self, url: &str, branch: &str, dest: &Path) -> Result<()>;
    fn update_repo(&mut self, branch: &str, dest: &Path) -> Result<()>;
    fn download_tarball(&mut self, url: &str, dest: &Path) -> Result<()>;
}

/// Fetches with `git` and HTTP downloads.
#[derive(Debug, Clone, Copy)]
pub struct NetworkFetcher {
    /// Clone and fetch with `--depth=1`.
    pub shallow: bool,
    pub verbose: bool,
}

impl NetworkFetcher {
    fn git(&self, workdir: &Path, title: &str, args: &[String]) -> Result<()> {
        let env: Option<Vec<(&str, &str)>> = None;
        if self.verbose {
            run_command_inherit_in(workdir, title, "git", args, env)
        } else {
            run_command_in(workdir, title, "git", args, env)
        }
    }
}

impl Fetcher for NetworkFetcher {
    fn clone_repo(&mut self, url: &str, branch: &str, dest: &Path) -> Result<()> {
        let parent = dest
            .parent()
            .context(format!("`{}` has no parent directory", dest.display()))?;

        let mut args = vec![
            "clone".to_string(),
            "--branch".to_string(),
            branch.to_string(),
            "--single-branch".to_string(),
        ];
        if self.shallow {
            args.push("--depth=1".into());
        }
        args.push(url.to_string());
        args.push(dest.display().to_string());

        let result = self.git(parent, &format!("git clone {branch}"), &args);
        if result.is_err() {
            // a partial clone would be mistaken for a complete one on the next run
            let _ = std::fs::remove_dir_all(dest);
        }
        result
    }

    fn update_repo(&mut self, branch: &str, dest: &Path) -> Result<()> {
        let mut fetch = vec!["fetch".to_string()];
        if self.shallow {
            fetch.push("--depth=1".into());
        }
        fetch.push("origin".into());
        fetch.push(branch.to_string());

        self.git(dest, &format!("git fetch {branch}"), &fetch)?;
        self.git(
            dest,
            &format!("git reset {branch}"),
            &["reset".into(), "--hard".into(), "FETCH_HEAD".into()],
        )
    }

    fn download_tarball(&mut self, url: &str, dest: &Path) -> Result<()> {
        download_and_decompress(url, dest).map(|_| ())
    }
}

/// Make sure every artifact exists under `sources`.
///
/// Artifacts already on disk cause no network access, except for git clones when `update` is set.
pub fn fetch_all(
    artifacts: &[Artifact],
    sources: &Path,
    fetcher: &mut impl Fetcher,
    update: bool,
) -> Result<()> {
    std::fs::create_dir_all(sources).context(format!("creating `{}`", sources.display()))?;

    for artifact in artifacts {
        interrupt::check()?;
        let dest = sources.join(&artifact.dir);

        if dest.is_dir() {
            match &artifact.origin {
                Origin::Git { branch, .. } if update => {
                    log::info!("=> update {}", artifact.dir);
                    fetcher
                        .update_repo(branch, &dest)
                        .context(format!("failed to update {}", artifact.component))?;
                }
                _ => log::debug!("{} is present", artifact.dir),
            }
            continue;
        }

        log::info!("=> fetch {}", artifact.dir);
        let fetched = match &artifact.origin {
            Origin::Git { url, branch } => fetcher.clone_repo(url, branch, &dest),
            Origin::Tarball { url } => fetcher.download_tarball(url, &dest),
        };
        fetched.context(format!("failed to fetch {}", artifact.component))?;

        if !dest.is_dir() {
            bail!(
                "fetching {} did not produce `{}`",
                artifact.component,
                dest.display()
            );
        }
    }
    Ok(())
}
