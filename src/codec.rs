//! Fixed-layout request encoders and response decoders.
//!
//! Encoders concatenate fields in wire order, big-endian integers and
//! NUL-padded strings. Decoders take a body that has already been fully
//! received and slice it in the same order.

use crate::error::{FdfsError, Result};
use crate::protocol::{
    DOWNLOAD_REQ_LEN, FILE_EXT_NAME_MAX_LEN, FILE_PREFIX_MAX_LEN, GROUP_NAME_MAX_LEN,
    IP_ADDRESS_SIZE, STORAGE_LOOKUP_FETCH_LEN, STORAGE_LOOKUP_STORE_LEN, UPLOAD_REQ_LEN,
    UPLOAD_SLAVE_REQ_LEN,
};
use crate::protocol_core::{get_fixed, put_fixed};
use std::fmt;
use std::path::PathBuf;

/// Storage server chosen by the tracker. Carries no connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageServer {
    pub ip_addr: String,
    pub port: u16,
    pub group_name: String,
    pub store_path_index: u8,
}

impl StorageServer {
    /// Decode a lookup body: group (16) | ip (15) | port (8) [| store_path_index (1)]
    ///
    /// Fetch/update lookups omit the trailing index; it decodes as 0.
    pub fn decode(body: &[u8]) -> Result<Self> {
        if body.len() < STORAGE_LOOKUP_FETCH_LEN {
            return Err(FdfsError::MalformedResponse(format!(
                "storage lookup body too short: {} bytes (min: {})",
                body.len(),
                STORAGE_LOOKUP_FETCH_LEN
            )));
        }
        let (group, rest) = body.split_at(GROUP_NAME_MAX_LEN);
        let (ip, rest) = rest.split_at(IP_ADDRESS_SIZE - 1);
        let (port, rest) = rest.split_at(8);
        let port = u64::from_be_bytes(read_u64(port));
        let port = u16::try_from(port).map_err(|_| {
            FdfsError::MalformedResponse(format!("storage port out of range: {}", port))
        })?;
        let store_path_index = if body.len() >= STORAGE_LOOKUP_STORE_LEN {
            rest[0]
        } else {
            0
        };
        Ok(StorageServer {
            ip_addr: get_fixed(ip),
            port,
            group_name: get_fixed(group),
            store_path_index,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.ip_addr, self.port)
    }
}

impl fmt::Display for StorageServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} group={} store_path_index={}",
            self.ip_addr, self.port, self.group_name, self.store_path_index
        )
    }
}

fn read_u64(b: &[u8]) -> [u8; 8] {
    let mut out = [0u8; 8];
    out.copy_from_slice(&b[..8]);
    out
}

/// Tracker lookup body: group (16) [| remote_filename (N)]
pub fn encode_group_query(group_name: &str, remote_filename: Option<&str>) -> Result<Vec<u8>> {
    let tail = remote_filename.unwrap_or("");
    let mut buf = Vec::with_capacity(GROUP_NAME_MAX_LEN + tail.len());
    put_fixed(&mut buf, group_name, GROUP_NAME_MAX_LEN, "group name")?;
    buf.extend_from_slice(tail.as_bytes());
    Ok(buf)
}

#[derive(Debug, Clone)]
pub struct UploadFileRequest {
    pub store_path_index: u8,
    pub file_size: u64,
    pub file_ext_name: String,
}

impl UploadFileRequest {
    /// store_path_index (1) | file_size (8) | ext (6)
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(UPLOAD_REQ_LEN);
        buf.push(self.store_path_index);
        buf.extend_from_slice(&self.file_size.to_be_bytes());
        put_fixed(&mut buf, &self.file_ext_name, FILE_EXT_NAME_MAX_LEN, "file extension")?;
        Ok(buf)
    }
}

#[derive(Debug, Clone)]
pub struct UploadSlaveFileRequest {
    pub file_size: u64,
    pub prefix_name: String,
    pub file_ext_name: String,
    pub master_filename: String,
}

impl UploadSlaveFileRequest {
    /// Bytes this request occupies on the wire, excluding the file payload.
    pub fn encoded_len(&self) -> u64 {
        (UPLOAD_SLAVE_REQ_LEN + self.master_filename.len()) as u64
    }

    /// master_len (8) | file_size (8) | prefix (16) | ext (6) | master_filename (N)
    pub fn encode(&self) -> Result<Vec<u8>> {
        let master = self.master_filename.as_bytes();
        if master.is_empty() {
            return Err(FdfsError::InvalidArgument(
                "master filename is empty".to_string(),
            ));
        }
        let mut buf = Vec::with_capacity(UPLOAD_SLAVE_REQ_LEN + master.len());
        buf.extend_from_slice(&(master.len() as u64).to_be_bytes());
        buf.extend_from_slice(&self.file_size.to_be_bytes());
        put_fixed(&mut buf, &self.prefix_name, FILE_PREFIX_MAX_LEN, "prefix name")?;
        put_fixed(&mut buf, &self.file_ext_name, FILE_EXT_NAME_MAX_LEN, "file extension")?;
        buf.extend_from_slice(master);
        Ok(buf)
    }
}

#[derive(Debug, Clone)]
pub struct DownloadFileRequest {
    pub offset: u64,
    /// 0 = to the end of the file
    pub download_bytes: u64,
    pub group_name: String,
    pub remote_filename: String,
}

impl DownloadFileRequest {
    /// offset (8) | download_bytes (8) | group (16) | remote_filename (N)
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(DOWNLOAD_REQ_LEN + self.remote_filename.len());
        buf.extend_from_slice(&self.offset.to_be_bytes());
        buf.extend_from_slice(&self.download_bytes.to_be_bytes());
        put_fixed(&mut buf, &self.group_name, GROUP_NAME_MAX_LEN, "group name")?;
        buf.extend_from_slice(self.remote_filename.as_bytes());
        Ok(buf)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFileResponse {
    pub group_name: String,
    pub remote_file_id: String,
}

impl UploadFileResponse {
    /// group (16) | remote_file_id (remainder)
    pub fn decode(body: &[u8]) -> Result<Self> {
        if body.len() <= GROUP_NAME_MAX_LEN {
            return Err(FdfsError::MalformedResponse(format!(
                "upload response too short: {} bytes (need more than {})",
                body.len(),
                GROUP_NAME_MAX_LEN
            )));
        }
        let (group, remote) = body.split_at(GROUP_NAME_MAX_LEN);
        Ok(UploadFileResponse {
            group_name: get_fixed(group),
            remote_file_id: String::from_utf8_lossy(remote).into_owned(),
        })
    }

    /// Full id usable for later downloads: `<group>/<remote_file_id>`
    pub fn file_id(&self) -> String {
        format!("{}/{}", self.group_name, self.remote_file_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadContent {
    File(PathBuf),
    Buffer(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadFileResponse {
    /// Echoed from the request, not carried on the wire.
    pub remote_file_id: String,
    /// Bytes actually received.
    pub download_size: u64,
    pub content: DownloadContent,
}
