use std::{
    ffi::OsString,
    fs::{self, OpenOptions, Permissions},
    io::Write,
    os::unix::fs::{OpenOptionsExt, PermissionsExt},
    path::{Path, PathBuf},
};

use flate2::{write::ZlibEncoder, Compression};
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use thiserror::Error;
use tracing::debug;

use crate::common::NgxPolicy;

const POLICY_FILE_MODE: u32 = 0o640;

#[derive(Error, Debug)]
pub enum PersistError {
    #[error("can't serialize policy {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("can't write policy {0}")]
    Io(#[from] std::io::Error),
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut path = OsString::from(path.as_os_str());
    path.push(suffix);
    PathBuf::from(path)
}

/// Tab indented json. Every map in the document is ordered so equal policies render to equal bytes.
pub fn render(policy: &NgxPolicy) -> Result<Vec<u8>, PersistError> {
    let mut rendered = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut rendered, PrettyFormatter::with_indent(b"\t"));
    policy.serialize(&mut serializer)?;
    Ok(rendered)
}

fn compress(data: &[u8]) -> Result<Vec<u8>, PersistError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Writes next to the target first and renames over it, so readers never see a partial file.
fn write_atomically(target: &Path, data: &[u8]) -> Result<(), PersistError> {
    let staging = with_suffix(target, ".old");
    let mut file = OpenOptions::new().write(true).create(true).truncate(true).mode(POLICY_FILE_MODE).open(&staging)?;
    fs::set_permissions(&staging, Permissions::from_mode(POLICY_FILE_MODE))?;
    file.write_all(data)?;
    file.sync_all()?;
    drop(file);
    fs::rename(&staging, target)?;
    Ok(())
}

/// Persists the policy at `path`, or zlib compressed at `path.bin`. Returns the written file.
pub fn persist(policy: &NgxPolicy, path: &Path, zip: bool) -> Result<PathBuf, PersistError> {
    let rendered = render(policy)?;
    let (target, data) = if zip { (with_suffix(path, ".bin"), compress(&rendered)?) } else { (path.to_path_buf(), rendered) };
    write_atomically(&target, &data)?;
    debug!("Policy written to {} ({} bytes)", target.display(), data.len());
    Ok(target)
}
