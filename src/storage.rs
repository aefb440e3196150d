//! Storage client: uploads and downloads against a storage server resolved by
//! the tracker.
//!
//! One pool is kept per storage server address, created the first time that
//! server is used.

use crate::codec::{
    DownloadContent, DownloadFileRequest, DownloadFileResponse, StorageServer,
    UploadFileRequest, UploadFileResponse, UploadSlaveFileRequest,
};
use crate::error::{FdfsError, Result};
use crate::logger::Logger;
use crate::net::{recv_exactly, recv_to_file, send_bytes, send_file};
use crate::pool::{ConnectionPool, Dialer, PoolLimits, TcpDialer};
use crate::protocol::{cmd, GROUP_NAME_MAX_LEN};
use crate::protocol_core::{file_ext_name, send_frame, Header};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Upload payload: a local file streamed from disk, or bytes already in memory.
#[derive(Debug, Clone, Copy)]
pub enum UploadSource<'a> {
    File(&'a Path),
    Buffer { data: &'a [u8], ext: &'a str },
}

impl<'a> UploadSource<'a> {
    /// Payload size and extension name sent in the request.
    fn resolve(&self) -> Result<(u64, String)> {
        match *self {
            UploadSource::File(path) => {
                let meta = std::fs::metadata(path).map_err(|e| FdfsError::file(path, e))?;
                if !meta.is_file() {
                    return Err(FdfsError::file(path, "not a regular file"));
                }
                if meta.len() == 0 {
                    return Err(FdfsError::file(path, "file size is zero"));
                }
                Ok((meta.len(), file_ext_name(path)))
            }
            UploadSource::Buffer { data, ext } => {
                if data.is_empty() {
                    return Err(FdfsError::InvalidArgument("upload buffer is empty".to_string()));
                }
                Ok((data.len() as u64, ext.to_string()))
            }
        }
    }

    fn send<W: Write + ?Sized>(&self, conn: &mut W, size: u64) -> Result<()> {
        match *self {
            UploadSource::File(path) => {
                let sent = send_file(conn, path)?;
                if sent != size {
                    return Err(FdfsError::file(
                        path,
                        format!("size changed during upload: {} != {}", sent, size),
                    ));
                }
                Ok(())
            }
            UploadSource::Buffer { data, .. } => send_bytes(conn, data),
        }
    }
}

struct SlaveTarget<'a> {
    master_filename: &'a str,
    prefix_name: &'a str,
}

pub struct StorageClient<D: Dialer + Clone = TcpDialer> {
    dialer: D,
    max_conns: usize,
    logger: Arc<dyn Logger>,
    // None once closed
    pools: Mutex<Option<HashMap<String, Arc<ConnectionPool<D>>>>>,
}

impl<D: Dialer + Clone> StorageClient<D> {
    pub fn new(dialer: D, max_conns: usize, logger: Arc<dyn Logger>) -> Result<Self> {
        PoolLimits {
            min_conns: 0,
            max_conns,
        }
        .validate()?;
        Ok(StorageClient {
            dialer,
            max_conns,
            logger,
            pools: Mutex::new(Some(HashMap::new())),
        })
    }

    pub fn upload_by_filename(
        &self,
        server: &StorageServer,
        path: &Path,
    ) -> Result<UploadFileResponse> {
        self.upload(server, UploadSource::File(path), None)
    }

    pub fn upload_by_buffer(
        &self,
        server: &StorageServer,
        data: &[u8],
        ext: &str,
    ) -> Result<UploadFileResponse> {
        self.upload(server, UploadSource::Buffer { data, ext }, None)
    }

    /// Upload `path` as a slave of `master_filename` (the remote filename of
    /// the master, without its group), named with `prefix_name`.
    pub fn upload_slave_by_filename(
        &self,
        server: &StorageServer,
        path: &Path,
        master_filename: &str,
        prefix_name: &str,
    ) -> Result<UploadFileResponse> {
        let slave = SlaveTarget {
            master_filename,
            prefix_name,
        };
        self.upload(server, UploadSource::File(path), Some(slave))
    }

    /// Download `length` bytes from `offset` (0 = to end of file) into `dest`.
    pub fn download_to_file(
        &self,
        server: &StorageServer,
        group_name: &str,
        remote_filename: &str,
        offset: u64,
        length: u64,
        dest: &Path,
    ) -> Result<DownloadFileResponse> {
        self.download(
            server,
            group_name,
            remote_filename,
            offset,
            length,
            Some(dest.to_path_buf()),
        )
    }

    pub fn download_to_buffer(
        &self,
        server: &StorageServer,
        group_name: &str,
        remote_filename: &str,
        offset: u64,
        length: u64,
    ) -> Result<DownloadFileResponse> {
        self.download(server, group_name, remote_filename, offset, length, None)
    }

    /// Close every per-server pool; later operations fail with `PoolClosed`.
    pub fn close(&self) {
        let pools = self.pools.lock().take();
        for pool in pools.into_iter().flat_map(|m| m.into_values()) {
            pool.close();
        }
    }

    /// Idle connections resting in the pool for `server`, 0 if none exists.
    pub fn idle_connections(&self, server: &StorageServer) -> usize {
        self.pools
            .lock()
            .as_ref()
            .and_then(|m| m.get(&server.addr()).map(|p| p.size()))
            .unwrap_or(0)
    }

    fn pool_for(&self, server: &StorageServer) -> Result<Arc<ConnectionPool<D>>> {
        let addr = server.addr();
        let mut guard = self.pools.lock();
        let pools = guard.as_mut().ok_or(FdfsError::PoolClosed)?;
        if let Some(pool) = pools.get(&addr) {
            return Ok(pool.clone());
        }
        let pool = Arc::new(ConnectionPool::new(
            vec![server.ip_addr.clone()],
            server.port,
            PoolLimits {
                min_conns: 0,
                max_conns: self.max_conns,
            },
            self.dialer.clone(),
            self.logger.clone(),
        )?);
        pools.insert(addr, pool.clone());
        Ok(pool)
    }

    fn upload(
        &self,
        server: &StorageServer,
        source: UploadSource<'_>,
        slave: Option<SlaveTarget<'_>>,
    ) -> Result<UploadFileResponse> {
        match self.try_upload(server, source, slave) {
            Ok((resp, bytes)) => {
                self.logger
                    .upload_done(&resp.group_name, &resp.remote_file_id, bytes);
                Ok(resp)
            }
            Err(e) => {
                self.logger.error("upload", &e.to_string());
                Err(e)
            }
        }
    }

    fn try_upload(
        &self,
        server: &StorageServer,
        source: UploadSource<'_>,
        slave: Option<SlaveTarget<'_>>,
    ) -> Result<(UploadFileResponse, u64)> {
        let (file_size, file_ext_name) = source.resolve()?;
        let (command, req) = match slave {
            None => (
                cmd::UPLOAD_FILE,
                UploadFileRequest {
                    store_path_index: server.store_path_index,
                    file_size,
                    file_ext_name,
                }
                .encode()?,
            ),
            Some(s) => (
                cmd::UPLOAD_SLAVE_FILE,
                UploadSlaveFileRequest {
                    file_size,
                    prefix_name: s.prefix_name.to_string(),
                    file_ext_name,
                    master_filename: s.master_filename.to_string(),
                }
                .encode()?,
            ),
        };

        let pool = self.pool_for(server)?;
        let mut conn = pool.acquire()?;
        conn.exchange(|c| {
            let header = Header::request(command, req.len() as u64 + file_size);
            send_frame(c, &header, &req)?;
            source.send(c, file_size)?;

            let header = Header::recv(c)?;
            header.check_status()?;
            let body = recv_exactly(c, header.pkg_len)?;
            if body.len() <= GROUP_NAME_MAX_LEN {
                return Err(FdfsError::MalformedResponse(format!(
                    "storage response length is not match, expect: {}, actual: {}",
                    header.pkg_len,
                    body.len()
                )));
            }
            UploadFileResponse::decode(&body).map(|resp| (resp, file_size))
        })
    }

    fn download(
        &self,
        server: &StorageServer,
        group_name: &str,
        remote_filename: &str,
        offset: u64,
        length: u64,
        dest: Option<PathBuf>,
    ) -> Result<DownloadFileResponse> {
        let req = DownloadFileRequest {
            offset,
            download_bytes: length,
            group_name: group_name.to_string(),
            remote_filename: remote_filename.to_string(),
        }
        .encode()?;

        let pool = self.pool_for(server)?;
        let mut conn = pool.acquire()?;
        let result = conn.exchange(|c| {
            send_frame(c, &Header::request(cmd::DOWNLOAD_FILE, req.len() as u64), &req)?;
            let header = Header::recv(c)?;
            header.check_status()?;

            let (download_size, content) = match dest {
                Some(path) => {
                    let n = recv_to_file(c, &path, header.pkg_len)?;
                    (n, DownloadContent::File(path))
                }
                None => {
                    let buf = recv_exactly(c, header.pkg_len)?;
                    (buf.len() as u64, DownloadContent::Buffer(buf))
                }
            };
            if download_size < header.pkg_len {
                // Stream ended early; the count received is what we report
                c.mark_broken();
                self.logger.error(
                    "download",
                    &format!(
                        "short body for {}: {}/{} bytes",
                        remote_filename, download_size, header.pkg_len
                    ),
                );
            }
            Ok(DownloadFileResponse {
                remote_file_id: remote_filename.to_string(),
                download_size,
                content,
            })
        });
        match &result {
            Ok(r) => self.logger.download_done(&r.remote_file_id, r.download_size),
            Err(e) => self.logger.error("download", &e.to_string()),
        }
        result
    }
}
