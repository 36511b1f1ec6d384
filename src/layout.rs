//! On-disk layout of a build.
//!
//! ```text
//! <work>/src/                 sources, kept between runs
//! <work>/build/               staging tree, optionally a tmpfs
//!     gcc -> ../src/<gcc>     gmp, mpfr, mpc and isl are linked inside the gcc tree
//!     binutils glibc linux    links to their source trees
//!     build-binutils build-gcc build-glibc
//! <install>/<triple>/         install prefix
//! ```
use std::{
    fmt::Display,
    io,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use thiserror::Error;

use crate::{fetch::Artifact, tmpfs::is_mountpoint};

/// Source trees that make up a toolchain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Component {
    Gcc,
    Binutils,
    Glibc,
    Linux,
    Gmp,
    Mpfr,
    Mpc,
    Isl,
}

impl Component {
    pub fn name(&self) -> &'static str {
        match self {
            Component::Gcc => "gcc",
            Component::Binutils => "binutils",
            Component::Glibc => "glibc",
            Component::Linux => "linux",
            Component::Gmp => "gmp",
            Component::Mpfr => "mpfr",
            Component::Mpc => "mpc",
            Component::Isl => "isl",
        }
    }

    /// GCC builds its prerequisite libraries in-tree when they are linked into its source.
    pub fn is_gcc_prerequisite(&self) -> bool {
        matches!(
            self,
            Component::Gmp | Component::Mpfr | Component::Mpc | Component::Isl
        )
    }
}

impl Display for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Debug, Error)]
pub enum PreconditionError {
    #[error("`{0}` is still mounted from a previous run, unmount it first")]
    StaleMount(PathBuf),
    #[error("`{path}` is left over from a previous run and couldn't be removed")]
    StaleArtifact {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("`{0}` is required but wasn't found in PATH")]
    MissingTool(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    root: PathBuf,
    install_root: PathBuf,
}

fn remove_path(path: &Path) -> io::Result<()> {
    match path.symlink_metadata() {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
        Ok(meta) if meta.is_dir() => std::fs::remove_dir_all(path),
        Ok(_) => std::fs::remove_file(path),
    }
}

/// Point `link` at `target`, replacing whatever link was there before.
fn relink(target: &Path, link: &Path) -> Result<()> {
    if link.symlink_metadata().is_ok_and(|m| m.is_symlink()) {
        std::fs::remove_file(link).context(format!("removing `{}`", link.display()))?;
    }
    std::os::unix::fs::symlink(target, link).context(format!(
        "linking `{}` -> `{}`",
        link.display(),
        target.display()
    ))
}

impl Layout {
    pub fn new(root: impl Into<PathBuf>, install_root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            install_root: install_root.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn install_root(&self) -> &Path {
        &self.install_root
    }

    pub fn sources(&self) -> PathBuf {
        self.root.join("src")
    }

    pub fn staging(&self) -> PathBuf {
        self.root.join("build")
    }

    /// The staging link to a source tree, e.g. `build/gcc`.
    pub fn source_dir(&self, component: Component) -> PathBuf {
        self.staging().join(component.name())
    }

    /// The out-of-tree build directory of a component, e.g. `build/build-gcc`.
    pub fn objdir(&self, component: Component) -> PathBuf {
        self.staging().join(format!("build-{}", component.name()))
    }

    pub fn prefix(&self, triple: &str) -> PathBuf {
        self.install_root.join(triple)
    }

    /// Remove what a previous run left behind.
    ///
    /// Fails instead of guessing if the staging tree is still mounted or something can't be
    /// removed.
    pub fn clean(&self, triple: &str) -> Result<(), PreconditionError> {
        let staging = self.staging();
        if is_mountpoint(&staging) {
            return Err(PreconditionError::StaleMount(staging));
        }

        for path in [staging, self.prefix(triple)] {
            if path.symlink_metadata().is_ok() {
                log::debug!("removing {}", path.display());
            }
            remove_path(&path).map_err(|source| PreconditionError::StaleArtifact {
                path: path.clone(),
                source,
            })?;
        }
        Ok(())
    }

    /// Create the sources directory and the (empty) staging mount point.
    pub fn prepare(&self) -> Result<()> {
        for dir in [self.sources(), self.staging()] {
            std::fs::create_dir_all(&dir).context(format!("creating `{}`", dir.display()))?;
        }
        Ok(())
    }

    /// Create the out-of-tree build directories. Must run after the tmpfs is mounted.
    pub fn prepare_objdirs(&self) -> Result<()> {
        for component in [Component::Binutils, Component::Gcc, Component::Glibc] {
            let dir = self.objdir(component);
            std::fs::create_dir_all(&dir).context(format!("creating `{}`", dir.display()))?;
        }
        Ok(())
    }

    /// Link fetched sources into place: the main trees into the staging tree, and GCC's
    /// prerequisite libraries into the GCC tree.
    pub fn link_sources(&self, artifacts: &[Artifact]) -> Result<()> {
        let sources = self.sources();
        let gcc_src = artifacts
            .iter()
            .find(|a| a.component == Component::Gcc)
            .map(|a| sources.join(&a.dir))
            .context("no gcc source among the fetched artifacts")?;

        for artifact in artifacts {
            let target = sources.join(&artifact.dir);
            let link = if artifact.component.is_gcc_prerequisite() {
                gcc_src.join(artifact.component.name())
            } else {
                self.source_dir(artifact.component)
            };
            relink(&target, &link)?;
        }
        Ok(())
    }
}

/// Removes the staging tree when dropped, and the install prefix too unless the build was
/// committed.
pub struct StagingGuard<'a> {
    layout: &'a Layout,
    prefix: PathBuf,
    committed: bool,
}

impl<'a> StagingGuard<'a> {
    pub fn new(layout: &'a Layout, prefix: impl Into<PathBuf>) -> Self {
        Self {
            layout,
            prefix: prefix.into(),
            committed: false,
        }
    }

    /// Keep the install prefix.
    pub fn commit(&mut self) {
        self.committed = true;
    }
}

impl Drop for StagingGuard<'_> {
    fn drop(&mut self) {
        let staging = self.layout.staging();
        if is_mountpoint(&staging) {
            log::warn!(
                "`{}` is still mounted, leaving it in place",
                staging.display()
            );
        } else if let Err(e) = remove_path(&staging) {
            log::warn!("failed to remove `{}`: {e}", staging.display());
        }

        if !self.committed {
            log::info!("removing partial install {}", self.prefix.display());
            if let Err(e) = remove_path(&self.prefix) {
                log::warn!("failed to remove `{}`: {e}", self.prefix.display());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths() {
        let layout = Layout::new("/work", "/opt");
        assert_eq!(layout.source_dir(Component::Gcc), PathBuf::from("/work/build/gcc"));
        assert_eq!(
            layout.objdir(Component::Glibc),
            PathBuf::from("/work/build/build-glibc")
        );
        assert_eq!(
            layout.prefix("i686-linux-gnu"),
            PathBuf::from("/opt/i686-linux-gnu")
        );
    }

    #[test]
    fn clean_removes_previous_runs() -> Result<()> {
        let dir = tempfile::TempDir::new()?;
        let layout = Layout::new(dir.path(), dir.path());
        std::fs::create_dir_all(layout.objdir(Component::Gcc))?;
        std::fs::create_dir_all(layout.prefix("arm-linux-gnueabi").join("bin"))?;
        std::fs::create_dir_all(layout.sources().join("gcc-8.5.0"))?;

        layout.clean("arm-linux-gnueabi")?;

        assert!(!layout.staging().exists());
        assert!(!layout.prefix("arm-linux-gnueabi").exists());
        // sources are kept
        assert!(layout.sources().join("gcc-8.5.0").exists());
        Ok(())
    }

    #[test]
    fn clean_on_an_empty_work_dir() -> Result<()> {
        let dir = tempfile::TempDir::new()?;
        Layout::new(dir.path().join("nothing"), dir.path()).clean("x86_64-linux-gnu")?;
        Ok(())
    }

    #[test]
    fn guard_keeps_committed_prefix() -> Result<()> {
        let dir = tempfile::TempDir::new()?;
        let layout = Layout::new(dir.path(), dir.path());
        let prefix = layout.prefix("aarch64-linux-gnu");
        std::fs::create_dir_all(layout.objdir(Component::Gcc))?;
        std::fs::create_dir_all(&prefix)?;

        let mut guard = StagingGuard::new(&layout, &prefix);
        guard.commit();
        drop(guard);

        assert!(!layout.staging().exists());
        assert!(prefix.exists());
        Ok(())
    }

    #[test]
    fn guard_removes_partial_prefix() -> Result<()> {
        let dir = tempfile::TempDir::new()?;
        let layout = Layout::new(dir.path(), dir.path());
        let prefix = layout.prefix("aarch64-linux-gnu");
        std::fs::create_dir_all(prefix.join("bin"))?;

        drop(StagingGuard::new(&layout, &prefix));

        assert!(!prefix.exists());
        Ok(())
    }
}
