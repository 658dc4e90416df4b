// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Credential bundle: the files needed to reach a cluster's engine.
//!
//! A bundle directory is either complete or treated as absent. Archives from
//! the provisioning service are unpacked next to the destination and renamed
//! into place only once every required file is there.

use std::collections::BTreeMap;
use std::io::{Cursor, Read};
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Error, Result};

pub const DOCKER_ENV: &str = "docker.env";
pub const CERT: &str = "cert.pem";
pub const KEY: &str = "key.pem";
pub const CA: &str = "ca.pem";
pub const CA_KEY: &str = "ca-key.pem";

/// Files that make a bundle complete.
pub const REQUIRED_FILES: [&str; 5] = [DOCKER_ENV, CERT, KEY, CA, CA_KEY];

/// Largest bundle file accepted from an archive.
pub const MAX_FILE_BYTES: u64 = 1024 * 1024;

static DOCKER_HOST: LazyLock<std::result::Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"DOCKER_HOST=tcp://(\d{1,3}(?:\.\d{1,3}){3}):(\d{1,5})"));

/// A complete, loaded bundle directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialBundle {
    dir: PathBuf,
    host: String,
    port: u16,
}

impl CredentialBundle {
    /// Load the bundle in `dir`. Every required file is checked before
    /// `docker.env` is read.
    pub fn load(dir: &Path) -> Result<Self> {
        if let Some(missing) = missing_file(dir) {
            return Err(Error::CredentialsNotFound { dir: dir.to_path_buf(), missing: missing.into() });
        }
        let env = std::fs::read_to_string(dir.join(DOCKER_ENV))?;
        let (host, port) = parse_docker_host(&env).ok_or_else(|| Error::CredentialsNotFound {
            dir: dir.to_path_buf(),
            missing: format!("DOCKER_HOST in {DOCKER_ENV}"),
        })?;
        Ok(Self { dir: dir.to_path_buf(), host, port })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// `host:port` of the engine.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn base_url(&self) -> String {
        format!("https://{}", self.endpoint())
    }

    pub fn cert_path(&self) -> PathBuf {
        self.dir.join(CERT)
    }

    pub fn key_path(&self) -> PathBuf {
        self.dir.join(KEY)
    }

    pub fn ca_path(&self) -> PathBuf {
        self.dir.join(CA)
    }

    pub fn ca_key_path(&self) -> PathBuf {
        self.dir.join(CA_KEY)
    }

    /// Environment that lets a process inside the container reach the same
    /// engine, with the bundle mounted at `cert_path`.
    pub fn container_env(&self, cert_path: &str) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("DOCKER_HOST".to_owned(), format!("tcp://{}", self.endpoint())),
            ("DOCKER_TLS_VERIFY".to_owned(), "1".to_owned()),
            ("DOCKER_CERT_PATH".to_owned(), cert_path.to_owned()),
        ])
    }
}

/// First required file absent from `dir`.
pub fn missing_file(dir: &Path) -> Option<&'static str> {
    REQUIRED_FILES.into_iter().find(|name| !dir.join(name).is_file())
}

pub fn is_complete(dir: &Path) -> bool {
    missing_file(dir).is_none()
}

/// Extract `host` and `port` from a `docker.env` file.
pub fn parse_docker_host(contents: &str) -> Option<(String, u16)> {
    let re = DOCKER_HOST.as_ref().ok()?;
    let caps = re.captures(contents)?;
    let host = caps.get(1)?.as_str();
    if host.split('.').any(|octet| octet.parse::<u8>().is_err()) {
        return None;
    }
    let port = caps.get(2)?.as_str().parse().ok()?;
    Some((host.to_owned(), port))
}

/// Reasons a downloaded archive cannot become a bundle.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("invalid zip archive: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("archive entry escapes the bundle directory: {0}")]
    UnsafePath(String),
    #[error("archive layout: {0}")]
    Layout(String),
    #[error("archive is missing {0}")]
    Missing(&'static str),
    #[error("archive entry {0} is larger than {MAX_FILE_BYTES} bytes")]
    TooLarge(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Unpack `bytes` into `dest`.
///
/// The archive holds one top-level directory with the bundle files. Nothing
/// appears at `dest` unless the result is complete; a stale partial `dest`
/// is replaced.
pub fn extract_archive(bytes: &[u8], dest: &Path) -> std::result::Result<(), ArchiveError> {
    let parent = dest
        .parent()
        .ok_or_else(|| ArchiveError::Layout(format!("no parent for {}", dest.display())))?;
    std::fs::create_dir_all(parent)?;
    let staging = tempfile::Builder::new().prefix(".bundle-").tempdir_in(parent)?;

    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;
    let mut top: Option<PathBuf> = None;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let name = entry.name().to_owned();
        let rel = safe_relative(&name).ok_or(ArchiveError::UnsafePath(name.clone()))?;

        let mut parts = rel.components();
        let Some(first) = parts.next() else { continue };
        let rest: PathBuf = parts.collect();
        let first = PathBuf::from(first.as_os_str());
        match &top {
            None => top = Some(first),
            Some(existing) if *existing != first => {
                return Err(ArchiveError::Layout(format!(
                    "more than one top-level entry: {} and {}",
                    existing.display(),
                    first.display()
                )));
            }
            Some(_) => {}
        }

        if entry.is_dir() {
            if rest.as_os_str().is_empty() {
                continue;
            }
            return Err(ArchiveError::Layout(format!("unexpected directory {name}")));
        }
        if rest.as_os_str().is_empty() || rest.components().count() != 1 {
            return Err(ArchiveError::Layout(format!("unexpected file {name}")));
        }

        let mut data = Vec::new();
        (&mut entry).take(MAX_FILE_BYTES + 1).read_to_end(&mut data)?;
        if data.len() as u64 > MAX_FILE_BYTES {
            return Err(ArchiveError::TooLarge(name));
        }
        let target = staging.path().join(&rest);
        std::fs::write(&target, &data)?;
        restrict_if_private(&target)?;
    }

    if let Some(missing) = missing_file(staging.path()) {
        return Err(ArchiveError::Missing(missing));
    }

    if dest.exists() {
        std::fs::remove_dir_all(dest)?;
    }
    let staged = staging.keep();
    if let Err(e) = std::fs::rename(&staged, dest) {
        let _ = std::fs::remove_dir_all(&staged);
        return Err(e.into());
    }
    Ok(())
}

/// Relative path with only normal components, or `None`.
fn safe_relative(name: &str) -> Option<PathBuf> {
    let path = Path::new(name);
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(out)
}

#[cfg(unix)]
fn restrict_if_private(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let private = matches!(path.file_name().and_then(|n| n.to_str()), Some(KEY | CA_KEY));
    if private {
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn restrict_if_private(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
#[path = "bundle_tests.rs"]
mod tests;
