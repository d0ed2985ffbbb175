//! Single-member tar archives
//!
//! The container runtime's archive primitives and the pod exec protocol both
//! move files as tar streams. These helpers build and unpack archives holding
//! exactly one regular file, entirely in memory.

use std::io::Read;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{Error, Result};

/// Wrap `data` in a tar archive with one member called `name`
pub fn single_file(name: &str, data: &[u8], mode: u32) -> Result<Vec<u8>> {
    let mut header = tar::Header::new_gnu();
    header.set_size(data.len() as u64);
    header.set_mode(mode);
    header.set_entry_type(tar::EntryType::Regular);
    header.set_mtime(
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0),
    );

    let mut builder = tar::Builder::new(Vec::new());
    builder.append_data(&mut header, name, data)?;
    Ok(builder.into_inner()?)
}

/// Read a local file into a single-member archive named `name`
pub async fn pack_file(local: &Path, name: &str) -> Result<Vec<u8>> {
    let data = async_fs::read(local).await.map_err(|e| {
        Error::transfer(format!("cannot read {}: {}", local.display(), e))
    })?;
    let mode = file_mode(local).await;
    single_file(name, &data, mode)
}

#[cfg(unix)]
async fn file_mode(local: &Path) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    async_fs::metadata(local)
        .await
        .map(|m| m.permissions().mode() & 0o7777)
        .unwrap_or(0o644)
}

#[cfg(not(unix))]
async fn file_mode(_local: &Path) -> u32 {
    0o644
}

/// Return the contents of the regular-file member whose file name is `name`
///
/// A stream that ends early (for instance because the connection dropped
/// mid-transfer) is reported as an error instead of yielding truncated data.
pub fn extract_member(archive: &[u8], name: &str) -> Result<Vec<u8>> {
    let mut reader = tar::Archive::new(archive);
    let entries = reader
        .entries()
        .map_err(|e| Error::transfer(format!("unreadable tar stream: {}", e)))?;

    for entry in entries {
        let mut entry = entry.map_err(|e| Error::transfer(format!("corrupt tar stream: {}", e)))?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let matches = entry
            .path()
            .map(|p| p.file_name().map(|f| f == name).unwrap_or(false))
            .unwrap_or(false);
        if !matches {
            continue;
        }

        let expected = entry.size();
        let mut data = Vec::with_capacity(expected as usize);
        entry
            .read_to_end(&mut data)
            .map_err(|e| Error::transfer(format!("failed reading {}: {}", name, e)))?;
        if data.len() as u64 != expected {
            return Err(Error::transfer(format!(
                "truncated tar stream: {} has {} of {} bytes",
                name,
                data.len(),
                expected
            )));
        }
        return Ok(data);
    }

    Err(Error::transfer(format!("{} not found in tar stream", name)))
}

/// Extract member `name` from `archive` and write it to `local`
pub async fn unpack_to(archive: &[u8], name: &str, local: &Path) -> Result<()> {
    let data = extract_member(archive, name)?;
    crate::transport::ensure_parent(local).await?;
    async_fs::write(local, data).await?;
    Ok(())
}
