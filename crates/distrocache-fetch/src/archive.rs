//! Downloading and unpacking single-version source archives.

use std::{
    fs::{self, File},
    io::{self, BufWriter},
    path::{Path, PathBuf},
};

use tracing::debug;

use crate::{
    error::{FetchError, Result},
    http_client::{self, AuthHeader},
};

/// Streams `url` into the file at `dest`, returning the number of bytes written.
pub fn download(url: &str, auth: Option<&AuthHeader>, dest: &Path) -> Result<u64> {
    let resp = http_client::get(url, auth)
        .call()
        .map_err(|e| FetchError::from_request(e, url))?;
    let mut reader = resp.into_body().into_reader();
    let mut writer = BufWriter::new(File::create(dest)?);
    let bytes = io::copy(&mut reader, &mut writer).map_err(|err| {
        // A body that stops mid-stream is a transport failure, not a local one.
        FetchError::from(ureq::Error::Io(err))
    })?;

    debug!(url, bytes, "downloaded archive");
    Ok(bytes)
}

/// Fetches a small file body into memory.
pub fn download_bytes(url: &str, auth: Option<&AuthHeader>) -> Result<Vec<u8>> {
    let resp = http_client::get(url, auth)
        .call()
        .map_err(|e| FetchError::from_request(e, url))?;
    let mut body = Vec::new();
    io::copy(&mut resp.into_body().into_reader(), &mut body)
        .map_err(|err| FetchError::from(ureq::Error::Io(err)))?;
    Ok(body)
}

/// Unpacks `archive` into `dest`, deletes the archive and returns the tree
/// root with a single wrapping top-level directory stripped.
pub fn unpack(archive: &Path, dest: &Path, url: &str) -> Result<PathBuf> {
    fs::create_dir_all(dest)?;
    compak::extract_archive(archive, dest).map_err(|source| {
        FetchError::CorruptArchive {
            url: url.to_string(),
            source,
        }
    })?;
    fs::remove_file(archive)?;

    strip_single_root(dest).and_then(|root| {
        root.ok_or_else(|| {
            FetchError::EmptyArchive {
                url: url.to_string(),
            }
        })
    })
}

/// Returns the lone subdirectory of `dir` if it is the only entry, `dir`
/// itself if it holds several entries, or `None` when it is empty.
pub fn strip_single_root(dir: &Path) -> Result<Option<PathBuf>> {
    let mut entries = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name() != "pax_global_header");

    let Some(first) = entries.next() else {
        return Ok(None);
    };
    if entries.next().is_some() {
        return Ok(Some(dir.to_path_buf()));
    }
    if first.file_type()?.is_dir() {
        Ok(Some(first.path()))
    } else {
        Ok(Some(dir.to_path_buf()))
    }
}
