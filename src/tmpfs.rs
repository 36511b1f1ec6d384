use std::{
    path::{Path, PathBuf},
    process::Command,
};

use anyhow::{Context, Result, bail};
use nix::{
    mount::{MntFlags, MsFlags, mount, umount2},
    unistd::geteuid,
};

pub trait Mounter {
    fn mount_tmpfs(&self, target: &Path, size: &str) -> Result<()>;
    fn unmount(&self, target: &Path) -> Result<()>;
}

/// Mounts with `mount(2)` when running as root and through `sudo mount` otherwise.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemMounter;

fn sudo(args: &[&str], target: &Path) -> Result<()> {
    let status = Command::new("sudo")
        .args(args)
        .arg(target)
        .status()
        .context("spawning `sudo`")?;
    if !status.success() {
        bail!("`sudo {}` exited with status {}", args.join(" "), status);
    }
    Ok(())
}

impl Mounter for SystemMounter {
    fn mount_tmpfs(&self, target: &Path, size: &str) -> Result<()> {
        let data = format!("size={size}");
        if geteuid().is_root() {
            mount(
                Some("tmpfs"),
                target,
                Some("tmpfs"),
                MsFlags::MS_NOSUID | MsFlags::MS_NODEV,
                Some(data.as_str()),
            )
            .context(format!("mounting tmpfs on `{}`", target.display()))
        } else {
            sudo(&["mount", "-t", "tmpfs", "-o", &data, "tmpfs"], target)
        }
    }

    fn unmount(&self, target: &Path) -> Result<()> {
        if geteuid().is_root() {
            umount2(target, MntFlags::MNT_DETACH)
                .context(format!("unmounting `{}`", target.display()))
        } else {
            sudo(&["umount", "-l"], target)
        }
    }
}

/// A mounted tmpfs, unmounted when dropped.
///
/// Dropping happens on every exit path of the build, including errors and interrupts.
pub struct TmpfsMount<'a, M: Mounter> {
    mounter: &'a M,
    target: PathBuf,
}

impl<'a, M: Mounter> TmpfsMount<'a, M> {
    pub fn mount(mounter: &'a M, target: impl Into<PathBuf>, size: &str) -> Result<Self> {
        let target = target.into();
        log::info!("=> mount tmpfs ({size}) on {}", target.display());
        mounter.mount_tmpfs(&target, size)?;
        Ok(Self { mounter, target })
    }

    pub fn target(&self) -> &Path {
        &self.target
    }
}

impl<M: Mounter> Drop for TmpfsMount<'_, M> {
    fn drop(&mut self) {
        log::debug!("unmounting {}", self.target.display());
        if let Err(e) = self.mounter.unmount(&self.target) {
            log::error!("failed to unmount `{}`: {e:#}", self.target.display());
        }
    }
}

/// Undo the octal escapes `/proc/self/mountinfo` uses for whitespace and backslashes.
fn unescape_mountinfo(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let mut chars = field.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            let digits: String = chars.clone().take(3).collect();
            if digits.len() == 3
                && let Ok(byte) = u8::from_str_radix(&digits, 8)
            {
                out.push(byte as char);
                chars.nth(2);
                continue;
            }
        }
        out.push(c);
    }
    out
}

/// Mount points listed in a `mountinfo` table.
pub fn mount_points(mountinfo: &str) -> Vec<PathBuf> {
    mountinfo
        .lines()
        .filter_map(|line| line.split_whitespace().nth(4))
        .map(|field| PathBuf::from(unescape_mountinfo(field)))
        .collect()
}

/// Whether `path` is currently a mount point.
pub fn is_mountpoint(path: impl AsRef<Path>) -> bool {
    let Ok(path) = path.as_ref().canonicalize() else {
        return false;
    };
    let Ok(mountinfo) = std::fs::read_to_string("/proc/self/mountinfo") else {
        return false;
    };
    mount_points(&mountinfo).contains(&path)
}
