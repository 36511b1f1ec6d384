//! `cross-gcc.toml` parsing and handling.
//!
//! Builds check the current working directory for a configuration file or fallback to the global
//! configuration file in `$XDG_CONFIG_HOME`. Only one file is used: a local configuration replaces
//! the global one entirely. Command line flags take precedence over both.
//!
//! # Example configuration
//! ```toml
//! [build]
//! source = "linaro"
//! install-dir = "/opt/cross"
//! jobs = 16
//! package = "zst"
//! tmpfs-size = "12G"
//! ```
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::{
    archive::PackageFormat,
    layout::Layout,
    profile::{FetchMode, Source},
};

pub const CONFIG_FILE: &str = "cross-gcc.toml";
pub const DEFAULT_TMPFS_SIZE: &str = "75%";

/// The `[build]` table. Every key is optional.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct BuildSettings {
    pub source: Option<Source>,
    pub work_dir: Option<PathBuf>,
    pub install_dir: Option<PathBuf>,
    pub jobs: Option<u64>,
    pub package: Option<PackageFormat>,
    pub tmpfs: Option<bool>,
    pub tmpfs_size: Option<String>,
    pub update: Option<bool>,
    pub tarballs: Option<bool>,
    pub full_src: Option<bool>,
    pub strip: Option<bool>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub build: BuildSettings,
}

/// Load configuration in `filepath`.
pub fn load_config(filepath: impl AsRef<Path>) -> Result<Option<Settings>> {
    if !filepath.as_ref().exists() {
        return Ok(None);
    }

    let content = std::fs::read_to_string(&filepath).context(format!(
        "failed to read file at `{}`",
        filepath.as_ref().display()
    ))?;

    Ok(toml::from_str(content.as_str()).context(format!(
        "failed to parse TOML in `{}`",
        filepath.as_ref().display()
    ))?)
}

pub fn global_config_path() -> Option<PathBuf> {
    std::env::var_os("XDG_CONFIG_HOME")
        .filter(|dir| !dir.is_empty())
        .map(PathBuf::from)
        .or_else(dirs::config_dir)
        .map(|dir| dir.join(CONFIG_FILE))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingsOrigin {
    /// `cross-gcc.toml` in the current directory
    Local(PathBuf),
    /// The global configuration file
    Global(PathBuf),
    /// No configuration file exists
    Default,
}

/// Returns the settings to build with and where they came from.
///
/// Precedence:
/// - Local configuration `cross-gcc.toml`
/// - Global configuration
/// - Built in defaults
pub fn resolve_settings() -> Result<(Settings, SettingsOrigin)> {
    let local = Path::new(CONFIG_FILE);
    if let Some(settings) = load_config(local)? {
        let path = std::path::absolute(local).unwrap_or_else(|_| local.to_path_buf());
        return Ok((settings, SettingsOrigin::Local(path)));
    }
    log::debug!("no `{CONFIG_FILE}` detected in current directory, using the global configuration");

    if let Some(global) = global_config_path()
        && let Some(settings) = load_config(&global)?
    {
        return Ok((settings, SettingsOrigin::Global(global)));
    }
    Ok((Settings::default(), SettingsOrigin::Default))
}

/// Settings given on the command line.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Overrides {
    pub source: Option<Source>,
    pub work_dir: Option<PathBuf>,
    pub install_dir: Option<PathBuf>,
    pub jobs: Option<u64>,
    pub package: Option<PackageFormat>,
    pub tmpfs_size: Option<String>,
    pub no_tmpfs: bool,
    pub no_update: bool,
    pub tarballs: bool,
    pub full_src: bool,
    pub no_strip: bool,
    pub verbose: bool,
}

/// Everything about a build that isn't the toolchain itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOptions {
    pub source: Source,
    pub mode: FetchMode,
    pub work_dir: PathBuf,
    pub install_dir: PathBuf,
    pub jobs: u64,
    pub package: Option<PackageFormat>,
    /// Mount a tmpfs of this size on the staging tree.
    pub tmpfs: Option<String>,
    /// Refresh existing git clones.
    pub update: bool,
    /// Clone with `--depth=1`.
    pub shallow: bool,
    pub strip: bool,
    pub verbose: bool,
}

pub fn default_work_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("cross-gcc")
}

fn default_jobs() -> u64 {
    std::thread::available_parallelism()
        .map(|n| n.get() as u64)
        .unwrap_or(1)
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            source: Source::default(),
            mode: FetchMode::default(),
            work_dir: default_work_dir(),
            install_dir: PathBuf::from("."),
            jobs: default_jobs(),
            package: None,
            tmpfs: Some(DEFAULT_TMPFS_SIZE.to_string()),
            update: true,
            shallow: true,
            strip: true,
            verbose: false,
        }
    }
}

impl BuildOptions {
    /// Combine file settings and command line overrides, the latter winning.
    pub fn new(settings: &BuildSettings, overrides: &Overrides) -> Self {
        let defaults = Self::default();

        let tarballs = overrides.tarballs || settings.tarballs.unwrap_or(false);
        let tmpfs = !overrides.no_tmpfs && settings.tmpfs.unwrap_or(true);
        let tmpfs_size = overrides
            .tmpfs_size
            .clone()
            .or_else(|| settings.tmpfs_size.clone())
            .unwrap_or_else(|| DEFAULT_TMPFS_SIZE.to_string());

        Self {
            source: overrides.source.or(settings.source).unwrap_or(defaults.source),
            mode: if tarballs {
                FetchMode::Tarball
            } else {
                FetchMode::Repo
            },
            work_dir: overrides
                .work_dir
                .clone()
                .or_else(|| settings.work_dir.clone())
                .unwrap_or(defaults.work_dir),
            install_dir: overrides
                .install_dir
                .clone()
                .or_else(|| settings.install_dir.clone())
                .unwrap_or(defaults.install_dir),
            jobs: overrides
                .jobs
                .or(settings.jobs)
                .filter(|jobs| *jobs > 0)
                .unwrap_or(defaults.jobs),
            package: overrides.package.or(settings.package),
            tmpfs: tmpfs.then_some(tmpfs_size),
            update: !overrides.no_update && settings.update.unwrap_or(true),
            shallow: !(overrides.full_src || settings.full_src.unwrap_or(false)),
            strip: !overrides.no_strip && settings.strip.unwrap_or(true),
            verbose: overrides.verbose,
        }
    }

    /// The directory layout, with relative directories resolved against the current directory.
    pub fn layout(&self) -> Result<Layout> {
        let work = std::path::absolute(&self.work_dir)
            .context(format!("resolving `{}`", self.work_dir.display()))?;
        let install = std::path::absolute(&self.install_dir)
            .context(format!("resolving `{}`", self.install_dir.display()))?;
        Ok(Layout::new(work, install))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_the_file() {
        let settings = BuildSettings {
            source: Some(Source::Linaro),
            jobs: Some(8),
            tmpfs_size: Some("4G".into()),
            update: Some(false),
            ..Default::default()
        };
        let overrides = Overrides {
            jobs: Some(2),
            tarballs: true,
            ..Default::default()
        };

        let options = BuildOptions::new(&settings, &overrides);
        assert_eq!(options.source, Source::Linaro);
        assert_eq!(options.jobs, 2);
        assert_eq!(options.mode, FetchMode::Tarball);
        assert_eq!(options.tmpfs.as_deref(), Some("4G"));
        assert!(!options.update);
        assert!(options.shallow);
    }

    #[test]
    fn tmpfs_can_be_disabled_either_way() {
        let off_in_file = BuildSettings {
            tmpfs: Some(false),
            ..Default::default()
        };
        assert_eq!(
            BuildOptions::new(&off_in_file, &Overrides::default()).tmpfs,
            None
        );

        let off_on_cli = Overrides {
            no_tmpfs: true,
            ..Default::default()
        };
        assert_eq!(
            BuildOptions::new(&BuildSettings::default(), &off_on_cli).tmpfs,
            None
        );
    }

    #[test]
    fn zero_jobs_falls_back_to_the_default() {
        let overrides = Overrides {
            jobs: Some(0),
            ..Default::default()
        };
        assert!(BuildOptions::new(&BuildSettings::default(), &overrides).jobs > 0);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(toml::from_str::<Settings>("[build]\ngcc = \"8\"\n").is_err());
        let settings: Settings = toml::from_str("[build]\nfull-src = true\npackage = \"xz\"\n")
            .expect("valid config");
        assert_eq!(settings.build.full_src, Some(true));
        assert_eq!(settings.build.package, Some(PackageFormat::Xz));
    }
}
