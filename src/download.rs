use anyhow::{Context, Result, bail};
use flate2::read::GzDecoder;
use indicatif::{ProgressBar, ProgressStyle};
use std::{
    fs::{self, File},
    io::{self, BufReader, Read},
    path::{Path, PathBuf},
    time::Duration,
};
use tar::Archive;
use xz2::read::XzDecoder;

use crate::interrupt::{self, Interruptible};

pub fn cache_dir() -> Result<PathBuf> {
    let cache = dirs::cache_dir()
        .context("couldn't determine the user cache directory")?
        .join("cross-gcc");
    fs::create_dir_all(&cache).context("creating cross-gcc cache")?;
    Ok(cache)
}

pub fn logs_dir() -> Result<PathBuf> {
    let logs = cache_dir()?.join("logs");
    fs::create_dir_all(&logs).context("creating cross-gcc logs dir")?;
    Ok(logs)
}

pub fn archives_dir() -> Result<PathBuf> {
    let dir = cache_dir()?.join("archives");
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

pub enum DownloadResult {
    /// File was downloaded for the first time
    Created(PathBuf),
    /// File was found in cache
    Cached(PathBuf),
}

/// The cache file name of `url`: a short hash of the URL followed by its last segment.
pub fn archive_filename(url: impl AsRef<str>) -> Result<String> {
    let url = url.as_ref();
    let filename = url
        .rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .context(format!("couldn't derive a filename from URL: {url}"))?;
    let hash = &blake3::hash(url.as_bytes()).to_hex()[..12];
    Ok(format!("{hash}-{filename}"))
}

/// Download an archive into the cache, unless it's already there.
pub fn download_archive<S: AsRef<str>>(url: S) -> Result<DownloadResult> {
    let filename = archive_filename(&url)?;
    let url = url.as_ref();
    let file_path = archives_dir()?.join(&filename);

    if file_path.exists() {
        return Ok(DownloadResult::Cached(file_path));
    }
    interrupt::check()?;

    let response = reqwest::blocking::Client::builder()
        .user_agent("curl/8.5.0")
        .build()?
        .get(url)
        .send()
        .context(format!("sending GET request to {}", url))?
        .error_for_status()
        .context(format!("non-success status from {}", url))?;

    let style = ProgressStyle::with_template(
        "{msg:.dim} {bar:30.green/dim} {binary_bytes:>7}/{binary_total_bytes:7}",
    )?
    .progress_chars("--");

    let pb = match response.content_length() {
        Some(size) => ProgressBar::new(size),
        None => ProgressBar::new_spinner(),
    };

    pb.set_style(style);
    pb.set_message(filename.clone());

    let mut download_path = file_path.clone();
    download_path.add_extension("download");

    let mut dest = File::create(&download_path).context(format!("creating {}", filename))?;
    let mut source = pb.wrap_read(Interruptible(response));
    if let Err(e) = io::copy(&mut source, &mut dest) {
        pb.abandon();
        let _ = fs::remove_file(&download_path);
        interrupt::check()?;
        return Err(e).context(format!("writing {}", filename));
    }
    std::fs::rename(&download_path, &file_path).context("moving .download file")?;

    pb.finish();

    Ok(DownloadResult::Created(file_path))
}

pub fn decompress_tar<P: AsRef<Path>, Q: AsRef<Path>>(tar_path: P, dest_dir: Q) -> Result<()> {
    let tar_path = tar_path.as_ref();
    let dest_dir = dest_dir.as_ref();

    fs::create_dir_all(dest_dir).context(format!(
        "creating destination directory {}",
        dest_dir.display()
    ))?;

    let file = File::open(tar_path).context(format!("opening {}", tar_path.display()))?;

    let pb_entry = ProgressBar::new_spinner();
    pb_entry.set_style(ProgressStyle::with_template("{spinner:.dim} {msg:.dim}")?);
    pb_entry.enable_steady_tick(Duration::from_millis(100));

    // stream-decompress and extract
    let reader = Interruptible(BufReader::new(file));
    let extension = tar_path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default();
    let decoder: Box<dyn Read> = match extension {
        "xz" => Box::new(XzDecoder::new(reader)),
        "gz" => Box::new(GzDecoder::new(reader)),
        "bz2" => Box::new(bzip2::read::BzDecoder::new(reader)),
        other => bail!("unsupported archive format `.{other}`: {}", tar_path.display()),
    };
    let mut archive = Archive::new(decoder);

    for entry_res in archive.entries().context("reading .tar entries")? {
        interrupt::check()?;
        let mut entry = entry_res.context("reading a .tar entry")?;
        if let Ok(path) = entry.path() {
            pb_entry.set_message(path.display().to_string());
        }
        entry.unpack_in(dest_dir).context("extracting entry")?;
    }

    pb_entry.finish_and_clear();

    Ok(())
}

/// Download `url` and extract it next to `dest`, which must be the top-level directory of the
/// archive.
///
/// A half extracted tree is removed on failure so the next run downloads it again instead of
/// treating it as present.
pub fn download_and_decompress(url: impl AsRef<str>, dest: impl AsRef<Path>) -> Result<PathBuf> {
    let dest = dest.as_ref();
    let parent = dest
        .parent()
        .context(format!("`{}` has no parent directory", dest.display()))?;

    let archive_path = match download_archive(&url)? {
        DownloadResult::Cached(p) => {
            log::debug!("=> using cached {}", p.display());
            p
        }
        DownloadResult::Created(p) => p,
    };

    if let Err(e) = decompress_tar(&archive_path, parent) {
        let _ = fs::remove_dir_all(dest);
        return Err(e).context(format!("extracting {}", archive_path.display()));
    }

    Ok(dest.to_path_buf())
}

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;

    #[test]
    fn archive_filenames_are_prefixed_with_a_url_hash() -> Result<()> {
        let a = archive_filename("https://ftp.gnu.org/gnu/gmp/gmp-6.1.2.tar.xz")?;
        let b = archive_filename("https://mirror.example/gmp/gmp-6.1.2.tar.xz")?;
        assert!(a.ends_with("-gmp-6.1.2.tar.xz"));
        assert_eq!(a.len(), "-gmp-6.1.2.tar.xz".len() + 12);
        assert_ne!(a, b);
        Ok(())
    }

    #[test]
    fn url_without_a_filename_is_rejected() {
        assert!(archive_filename("https://example.com/").is_err());
    }

    #[test]
    #[serial(interrupt)]
    fn extracts_gzip_tarballs() -> Result<()> {
        let dir = tempfile::TempDir::new()?;
        let tarball = dir.path().join("mpc-1.1.0.tar.gz");
        {
            let encoder =
                flate2::write::GzEncoder::new(File::create(&tarball)?, Default::default());
            let mut builder = tar::Builder::new(encoder);
            let mut header = tar::Header::new_gnu();
            let contents = b"#!/bin/sh\n";
            header.set_size(contents.len() as u64);
            header.set_mode(0o755);
            header.set_cksum();
            builder.append_data(&mut header, "mpc-1.1.0/configure", &contents[..])?;
            builder.into_inner()?.finish()?;
        }

        let out = dir.path().join("src");
        decompress_tar(&tarball, &out)?;
        assert!(out.join("mpc-1.1.0/configure").is_file());
        Ok(())
    }

    #[test]
    fn unknown_extensions_fail() -> Result<()> {
        let dir = tempfile::TempDir::new()?;
        let file = dir.path().join("thing.rar");
        std::fs::write(&file, b"")?;
        assert!(decompress_tar(&file, dir.path()).is_err());
        Ok(())
    }
}
