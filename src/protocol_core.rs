//! Shared protocol logic: frame header, fixed-width string fields and file-id helpers
//!
//! Every request and response on both tracker and storage connections is
//! prefixed by the same 10-byte header.

use crate::error::{FdfsError, Result};
use crate::net::{recv_exactly, send_bytes};
use crate::protocol::{GROUP_NAME_MAX_LEN, HEADER_LEN};
use std::io::{Read, Write};
use std::path::Path;

/// Frame header
/// Format: PKG_LEN (8, big-endian) | CMD (1) | STATUS (1)
///
/// `pkg_len` counts payload bytes only, never the header itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Header {
    pub pkg_len: u64,
    pub cmd: u8,
    pub status: u8,
}

impl Header {
    /// Request-side header; status is unused on send and always 0.
    pub fn request(cmd: u8, pkg_len: u64) -> Self {
        Header {
            pkg_len,
            cmd,
            status: 0,
        }
    }

    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut header = [0u8; HEADER_LEN];
        header[0..8].copy_from_slice(&self.pkg_len.to_be_bytes());
        header[8] = self.cmd;
        header[9] = self.status;
        header
    }

    pub fn decode(header: &[u8; HEADER_LEN]) -> Self {
        let mut len = [0u8; 8];
        len.copy_from_slice(&header[0..8]);
        Header {
            pkg_len: u64::from_be_bytes(len),
            cmd: header[8],
            status: header[9],
        }
    }

    pub fn send<W: Write + ?Sized>(&self, conn: &mut W) -> Result<()> {
        send_bytes(conn, &self.encode())
    }

    pub fn recv<R: Read + ?Sized>(conn: &mut R) -> Result<Self> {
        let buf = recv_exactly(conn, HEADER_LEN as u64)?;
        let header: [u8; HEADER_LEN] =
            buf.as_slice().try_into().map_err(|_| FdfsError::ShortRead {
                expected: HEADER_LEN,
                actual: buf.len(),
            })?;
        Ok(Header::decode(&header))
    }

    /// Nonzero status means the payload length cannot be trusted as a read boundary.
    pub fn check_status(&self) -> Result<()> {
        if self.status != 0 {
            return Err(FdfsError::Server {
                status: self.status,
            });
        }
        Ok(())
    }
}

/// Header and fixed request body go out in a single write.
pub fn send_frame<W: Write + ?Sized>(conn: &mut W, header: &Header, body: &[u8]) -> Result<()> {
    let mut frame = Vec::with_capacity(HEADER_LEN + body.len());
    frame.extend_from_slice(&header.encode());
    frame.extend_from_slice(body);
    send_bytes(conn, &frame)
}

/// Append `value` NUL-padded to exactly `width` bytes.
pub fn put_fixed(buf: &mut Vec<u8>, value: &str, width: usize, field: &str) -> Result<()> {
    let bytes = value.as_bytes();
    if bytes.len() > width {
        return Err(FdfsError::InvalidArgument(format!(
            "{} too long: {} bytes (max: {})",
            field,
            bytes.len(),
            width
        )));
    }
    if bytes.contains(&0) {
        return Err(FdfsError::InvalidArgument(format!(
            "{} contains NUL byte",
            field
        )));
    }
    buf.extend_from_slice(bytes);
    buf.resize(buf.len() + width - bytes.len(), 0);
    Ok(())
}

/// Decode a padded field: the content ends at the first NUL.
pub fn get_fixed(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}

/// Split `"<group>/<remote_filename>"` into its two parts.
pub fn split_file_id(file_id: &str) -> Result<(&str, &str)> {
    let invalid = || FdfsError::InvalidArgument(format!("invalid file id: {}", file_id));
    let (group, remote) = file_id.split_once('/').ok_or_else(invalid)?;
    if group.is_empty() || remote.is_empty() {
        return Err(invalid());
    }
    if group.len() > GROUP_NAME_MAX_LEN {
        return Err(FdfsError::InvalidArgument(format!(
            "group name too long in file id: {}",
            file_id
        )));
    }
    Ok((group, remote))
}

/// Extension sent with uploads: text after the last '.' of the file name,
/// or empty when there is none or it does not fit the 6-byte field.
pub fn file_ext_name(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .filter(|e| e.len() <= crate::protocol::FILE_EXT_NAME_MAX_LEN)
        .unwrap_or("")
        .to_string()
}
