//! High-level client: resolve a storage server through the tracker, then run
//! the upload or download against it. File ids are `<group>/<remote_filename>`.

use crate::codec::{DownloadFileResponse, StorageServer, UploadFileResponse};
use crate::config::ClientConfig;
use crate::error::{FdfsError, Result};
use crate::logger::{Logger, NoopLogger, TextLogger};
use crate::pool::{ConnectionPool, Dialer, TcpDialer};
use crate::protocol_core::split_file_id;
use crate::storage::StorageClient;
use crate::tracker::TrackerClient;
use std::path::Path;
use std::sync::Arc;

pub struct FdfsClient<D: Dialer + Clone = TcpDialer> {
    tracker: TrackerClient<D>,
    storage: StorageClient<D>,
}

impl FdfsClient<TcpDialer> {
    /// Build from a resolved config. Pre-warms `min_conns` tracker connections.
    pub fn new(config: &ClientConfig) -> anyhow::Result<Self> {
        config.validate()?;
        let logger: Arc<dyn Logger> = match &config.log_file {
            Some(path) => Arc::new(TextLogger::new(path)?),
            None => Arc::new(NoopLogger),
        };
        Ok(Self::with_dialer(config, config.dialer(), logger)?)
    }
}

impl<D: Dialer + Clone> FdfsClient<D> {
    pub fn with_dialer(config: &ClientConfig, dialer: D, logger: Arc<dyn Logger>) -> Result<Self> {
        let pool = ConnectionPool::new(
            config.tracker_hosts.clone(),
            config.tracker_port,
            config.limits(),
            dialer.clone(),
            logger.clone(),
        )?;
        Ok(FdfsClient {
            tracker: TrackerClient::new(pool, logger.clone()),
            storage: StorageClient::new(dialer, config.max_conns, logger)?,
        })
    }

    pub fn upload_by_filename(&self, path: &Path) -> Result<UploadFileResponse> {
        let server = self.tracker.query_storage_for_upload()?;
        self.storage.upload_by_filename(&server, path)
    }

    pub fn upload_by_buffer(&self, data: &[u8], ext: &str) -> Result<UploadFileResponse> {
        let server = self.tracker.query_storage_for_upload()?;
        self.storage.upload_by_buffer(&server, data, ext)
    }

    /// Upload into a specific group.
    pub fn upload_by_filename_to_group(
        &self,
        path: &Path,
        group_name: &str,
    ) -> Result<UploadFileResponse> {
        let server = self.tracker.query_storage_for_upload_in_group(group_name)?;
        self.storage.upload_by_filename(&server, path)
    }

    /// Upload `path` as a slave of the file `master_file_id`. The slave lands
    /// on the storage server holding the master.
    pub fn upload_slave_by_filename(
        &self,
        path: &Path,
        master_file_id: &str,
        prefix_name: &str,
    ) -> Result<UploadFileResponse> {
        let (group, master_filename) = split_file_id(master_file_id)?;
        if prefix_name.is_empty() {
            return Err(FdfsError::InvalidArgument(
                "slave prefix name is empty".to_string(),
            ));
        }
        let server = self.tracker.query_storage_for_update(group, master_filename)?;
        self.storage
            .upload_slave_by_filename(&server, path, master_filename, prefix_name)
    }

    pub fn download_to_file(&self, file_id: &str, dest: &Path) -> Result<DownloadFileResponse> {
        let (group, remote) = split_file_id(file_id)?;
        let server = self.fetch_server(group, remote)?;
        self.storage
            .download_to_file(&server, group, remote, 0, 0, dest)
    }

    /// `length == 0` reads to the end of the file.
    pub fn download_to_buffer(
        &self,
        file_id: &str,
        offset: u64,
        length: u64,
    ) -> Result<DownloadFileResponse> {
        let (group, remote) = split_file_id(file_id)?;
        let server = self.fetch_server(group, remote)?;
        self.storage
            .download_to_buffer(&server, group, remote, offset, length)
    }

    pub fn query_storage(&self, group_name: Option<&str>) -> Result<StorageServer> {
        match group_name {
            Some(g) => self.tracker.query_storage_for_upload_in_group(g),
            None => self.tracker.query_storage_for_upload(),
        }
    }

    pub fn tracker(&self) -> &TrackerClient<D> {
        &self.tracker
    }

    pub fn storage(&self) -> &StorageClient<D> {
        &self.storage
    }

    pub fn close(&self) {
        self.tracker.close();
        self.storage.close();
    }

    fn fetch_server(&self, group: &str, remote: &str) -> Result<StorageServer> {
        self.tracker.query_storage_for_fetch(group, remote)
    }
}

impl<D: Dialer + Clone> Drop for FdfsClient<D> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::mock::MockDialer;
    use crate::protocol::{cmd, GROUP_NAME_MAX_LEN, HEADER_LEN, IP_ADDRESS_SIZE};
    use crate::protocol_core::{put_fixed, Header};

    fn config() -> ClientConfig {
        let mut c = ClientConfig::new(vec!["tracker1".to_string()]);
        c.max_conns = 4;
        c
    }

    fn framed(body: &[u8]) -> Vec<u8> {
        let mut out = Header::request(cmd::TRACKER_RESP, body.len() as u64)
            .encode()
            .to_vec();
        out.extend_from_slice(body);
        out
    }

    /// Store lookups carry a trailing store path index, fetch lookups do not.
    fn lookup(ip: &str, port: u64, spi: Option<u8>) -> Vec<u8> {
        let mut body = Vec::new();
        put_fixed(&mut body, "group1", GROUP_NAME_MAX_LEN, "group").unwrap();
        put_fixed(&mut body, ip, IP_ADDRESS_SIZE - 1, "ip").unwrap();
        body.extend_from_slice(&port.to_be_bytes());
        body.extend(spi);
        framed(&body)
    }

    #[test]
    fn test_upload_resolves_then_uploads() {
        let dialer = MockDialer::new();
        dialer.script(lookup("10.0.0.5", 23000, Some(2)));
        let mut resp = Vec::new();
        put_fixed(&mut resp, "group1", GROUP_NAME_MAX_LEN, "group").unwrap();
        resp.extend_from_slice(b"M00/00/00/abc.txt");
        dialer.script(framed(&resp));

        let c = FdfsClient::with_dialer(&config(), dialer.clone(), Arc::new(NoopLogger)).unwrap();
        let r = c.upload_by_buffer(b"hello", "txt").unwrap();
        assert_eq!(r.file_id(), "group1/M00/00/00/abc.txt");

        let handles = dialer.handles();
        assert_eq!(handles[0].addr, "tracker1:22122");
        assert_eq!(handles[1].addr, "10.0.0.5:23000");
        // Store path index from the lookup is carried into the upload request
        assert_eq!(handles[1].written()[HEADER_LEN], 2);
    }

    #[test]
    fn test_download_uses_fetch_lookup() {
        let dialer = MockDialer::new();
        dialer.script(lookup("10.0.0.6", 23000, None));
        dialer.script(framed(b"content"));

        let c = FdfsClient::with_dialer(&config(), dialer.clone(), Arc::new(NoopLogger)).unwrap();
        let r = c.download_to_buffer("group1/M00/00/00/abc.txt", 0, 0).unwrap();
        assert_eq!(r.download_size, 7);

        let tracker_req = dialer.handles()[0].written();
        assert_eq!(tracker_req[8], cmd::QUERY_FETCH_ONE);
        assert_eq!(&tracker_req[HEADER_LEN + GROUP_NAME_MAX_LEN..], b"M00/00/00/abc.txt");
    }

    #[test]
    fn test_bad_file_id_is_caller_error() {
        let dialer = MockDialer::new();
        let c = FdfsClient::with_dialer(&config(), dialer.clone(), Arc::new(NoopLogger)).unwrap();
        assert!(matches!(
            c.download_to_buffer("no-group-separator", 0, 0),
            Err(FdfsError::InvalidArgument(_))
        ));
        assert_eq!(dialer.dial_count(), 0);
    }

    #[test]
    fn test_close_rejects_further_calls() {
        let dialer = MockDialer::new();
        let c = FdfsClient::with_dialer(&config(), dialer, Arc::new(NoopLogger)).unwrap();
        c.close();
        assert!(matches!(c.query_storage(None), Err(FdfsError::PoolClosed)));
    }
}
