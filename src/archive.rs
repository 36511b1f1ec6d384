//! Packaging an installed toolchain into a tarball.
use std::{
    fmt::Display,
    fs::File,
    io::{BufWriter, Write},
    path::PathBuf,
};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::ValueEnum;
use flate2::write::GzEncoder;
use serde::Deserialize;
use xz2::write::XzEncoder;

use crate::{
    interrupt::{self, Interruptible},
    profile::Toolchain,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageFormat {
    Gz,
    Xz,
    Zst,
}

impl PackageFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            PackageFormat::Gz => "gz",
            PackageFormat::Xz => "xz",
            PackageFormat::Zst => "zst",
        }
    }
}

impl Display for PackageFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.extension())
    }
}

/// `<triple>-<major>.x-<source>-<YYYYMMDD>.tar.<ext>`
pub fn archive_name(toolchain: &Toolchain, format: PackageFormat, date: NaiveDate) -> String {
    format!(
        "{}-{}.tar.{}",
        toolchain.id(),
        date.format("%Y%m%d"),
        format.extension()
    )
}

fn write_tar<W: Write>(toolchain: &Toolchain, out: W) -> Result<W> {
    let mut builder = tar::Builder::new(out);
    // keep the symlinks gcc installs (e.g. `<triple>/bin/gcc`) as symlinks
    builder.follow_symlinks(false);
    builder
        .append_dir_all(toolchain.triple(), toolchain.dir())
        .context(format!("archiving `{}`", toolchain.dir().display()))?;
    builder.into_inner().context("finishing the tar stream")
}

/// Archive the install prefix next to it, in the install root.
///
/// Writes stop at an interrupt, which is returned as [`interrupt::Interrupted`]. No `.partial`
/// file is left behind either way.
pub fn package(toolchain: &Toolchain, format: PackageFormat) -> Result<PathBuf> {
    let name = archive_name(toolchain, format, chrono::Local::now().date_naive());
    let path = toolchain.layout.install_root().join(&name);
    log::info!("=> package {name}");

    let mut partial = path.clone();
    partial.add_extension("partial");

    let file = Interruptible(BufWriter::new(
        File::create(&partial).context(format!("creating `{}`", partial.display()))?,
    ));
    let written = match format {
        PackageFormat::Gz => {
            write_tar(toolchain, GzEncoder::new(file, flate2::Compression::default()))
                .and_then(|enc| enc.finish().context("finishing gzip stream"))
        }
        PackageFormat::Xz => write_tar(toolchain, XzEncoder::new(file, 6))
            .and_then(|enc| enc.finish().context("finishing xz stream")),
        PackageFormat::Zst => zstd::Encoder::new(file, 19)
            .context("creating zstd encoder")
            .and_then(|enc| write_tar(toolchain, enc))
            .and_then(|enc| enc.finish().context("finishing zstd stream")),
    };

    let result = written
        .and_then(|mut file| file.flush().context("flushing archive"))
        .and_then(|_| std::fs::rename(&partial, &path).context("moving .partial archive"));
    if let Err(e) = result {
        let _ = std::fs::remove_file(&partial);
        interrupt::check()?;
        return Err(e);
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use super::*;
    use crate::{
        layout::Layout,
        profile::{Arch, FetchMode, Source},
    };

    fn toolchain(layout: Layout) -> Toolchain {
        Toolchain::resolve(
            Arch::Arm,
            Source::Linaro,
            "7",
            FetchMode::Repo,
            layout,
            "x86_64-pc-linux-gnu",
        )
        .unwrap()
    }

    #[test]
    fn names() {
        let toolchain = toolchain(Layout::new("/w", "/i"));
        let date = NaiveDate::from_ymd_opt(2019, 12, 3).unwrap();
        assert_eq!(
            archive_name(&toolchain, PackageFormat::Zst, date),
            "arm-linux-gnueabi-7.x-linaro-20191203.tar.zst"
        );
        assert_eq!(
            archive_name(&toolchain, PackageFormat::Gz, date),
            "arm-linux-gnueabi-7.x-linaro-20191203.tar.gz"
        );
    }

    #[test]
    #[serial_test::serial(interrupt)]
    fn interrupted_packaging_leaves_nothing_behind() -> Result<()> {
        interrupt::reset();
        let dir = tempfile::TempDir::new()?;
        let toolchain = toolchain(Layout::new(dir.path().join("work"), dir.path()));
        std::fs::create_dir_all(toolchain.bin_dir())?;
        std::fs::write(toolchain.gcc_bin(), "gcc")?;

        interrupt::trigger();
        let result = package(&toolchain, PackageFormat::Xz);
        interrupt::reset();

        let err = result.expect_err("interrupted");
        assert!(err.downcast_ref::<interrupt::Interrupted>().is_some());
        let left: Vec<_> = std::fs::read_dir(dir.path())?
            .flatten()
            .map(|entry| entry.file_name())
            .filter(|name| name != "arm-linux-gnueabi")
            .collect();
        assert!(left.is_empty(), "{left:?}");
        Ok(())
    }

    #[test]
    #[serial_test::serial(interrupt)]
    fn packages_the_prefix_under_the_triple() -> Result<()> {
        interrupt::reset();
        let dir = tempfile::TempDir::new()?;
        let toolchain = toolchain(Layout::new(dir.path().join("work"), dir.path()));
        let bin = toolchain.bin_dir();
        std::fs::create_dir_all(&bin)?;
        std::fs::write(bin.join("arm-linux-gnueabi-gcc"), "gcc")?;
        std::os::unix::fs::symlink("arm-linux-gnueabi-gcc", bin.join("arm-linux-gnueabi-cc"))?;

        let archive = package(&toolchain, PackageFormat::Gz)?;
        assert_eq!(archive.parent(), Some(dir.path()));

        let mut tar = tar::Archive::new(flate2::read::GzDecoder::new(File::open(&archive)?));
        let mut found = vec![];
        for entry in tar.entries()? {
            let mut entry = entry?;
            let path = entry.path()?.display().to_string();
            if path == "arm-linux-gnueabi/bin/arm-linux-gnueabi-gcc" {
                let mut contents = String::new();
                entry.read_to_string(&mut contents)?;
                assert_eq!(contents, "gcc");
            }
            if path == "arm-linux-gnueabi/bin/arm-linux-gnueabi-cc" {
                assert!(entry.header().entry_type().is_symlink());
            }
            found.push(path);
        }
        assert!(found.contains(&"arm-linux-gnueabi/bin/arm-linux-gnueabi-gcc".to_string()));
        assert!(found.contains(&"arm-linux-gnueabi/bin/arm-linux-gnueabi-cc".to_string()));
        Ok(())
    }
}
