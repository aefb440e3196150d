//! Tracker client: asks the tracker which storage server to talk to.
//!
//! The tracker picks the node; the client only issues the request over a
//! pooled tracker connection.

use crate::codec::{encode_group_query, StorageServer};
use crate::error::{FdfsError, Result};
use crate::logger::Logger;
use crate::net::recv_exactly;
use crate::pool::{ConnectionPool, Dialer, TcpDialer};
use crate::protocol::{cmd, STORAGE_LOOKUP_FETCH_LEN, STORAGE_LOOKUP_STORE_LEN};
use crate::protocol_core::{send_frame, Header};
use std::sync::Arc;

pub struct TrackerClient<D: Dialer = TcpDialer> {
    pool: ConnectionPool<D>,
    logger: Arc<dyn Logger>,
}

impl<D: Dialer> TrackerClient<D> {
    pub fn new(pool: ConnectionPool<D>, logger: Arc<dyn Logger>) -> Self {
        TrackerClient { pool, logger }
    }

    /// Storage server for a new upload, any group.
    pub fn query_storage_for_upload(&self) -> Result<StorageServer> {
        self.query(
            "store",
            cmd::QUERY_STORE_WITHOUT_GROUP_ONE,
            Vec::new(),
            STORAGE_LOOKUP_STORE_LEN,
        )
    }

    /// Storage server for a new upload inside `group_name`.
    pub fn query_storage_for_upload_in_group(&self, group_name: &str) -> Result<StorageServer> {
        let body = encode_group_query(group_name, None)?;
        self.query(
            "store_group",
            cmd::QUERY_STORE_WITH_GROUP_ONE,
            body,
            STORAGE_LOOKUP_STORE_LEN,
        )
    }

    /// Storage server that can serve an existing file.
    pub fn query_storage_for_fetch(
        &self,
        group_name: &str,
        remote_filename: &str,
    ) -> Result<StorageServer> {
        let body = encode_group_query(group_name, Some(remote_filename))?;
        self.query("fetch", cmd::QUERY_FETCH_ONE, body, STORAGE_LOOKUP_FETCH_LEN)
    }

    /// Storage server holding the source copy of an existing file (needed for
    /// slave uploads against that file).
    pub fn query_storage_for_update(
        &self,
        group_name: &str,
        remote_filename: &str,
    ) -> Result<StorageServer> {
        let body = encode_group_query(group_name, Some(remote_filename))?;
        self.query("update", cmd::QUERY_UPDATE, body, STORAGE_LOOKUP_FETCH_LEN)
    }

    pub fn pool(&self) -> &ConnectionPool<D> {
        &self.pool
    }

    pub fn close(&self) {
        self.pool.close();
    }

    /// Store lookups answer with `STORAGE_LOOKUP_STORE_LEN` bytes (trailing
    /// store path index), fetch and update lookups with `STORAGE_LOOKUP_FETCH_LEN`.
    fn query(
        &self,
        kind: &str,
        command: u8,
        body: Vec<u8>,
        expected_len: usize,
    ) -> Result<StorageServer> {
        let mut conn = self.pool.acquire()?;
        let result = conn.exchange(|c| {
            send_frame(c, &Header::request(command, body.len() as u64), &body)?;
            let header = Header::recv(c)?;
            header.check_status()?;
            if header.pkg_len != expected_len as u64 {
                return Err(FdfsError::MalformedResponse(format!(
                    "{} lookup length is not match, expect: {}, actual: {}",
                    kind, expected_len, header.pkg_len
                )));
            }
            let resp = recv_exactly(c, header.pkg_len)?;
            if resp.len() != expected_len {
                return Err(FdfsError::MalformedResponse(format!(
                    "{} lookup body truncated: {}/{} bytes",
                    kind,
                    resp.len(),
                    expected_len
                )));
            }
            StorageServer::decode(&resp)
        });
        match &result {
            Ok(server) => self.logger.lookup_done(kind, server),
            Err(e) => self.logger.error(kind, &e.to_string()),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::NoopLogger;
    use crate::pool::mock::MockDialer;
    use crate::pool::PoolLimits;
    use crate::protocol::{GROUP_NAME_MAX_LEN, HEADER_LEN, IP_ADDRESS_SIZE};
    use crate::protocol_core::put_fixed;

    fn tracker(dialer: &MockDialer) -> TrackerClient<MockDialer> {
        let pool = ConnectionPool::new(
            vec!["127.0.0.1".to_string()],
            22122,
            PoolLimits {
                min_conns: 0,
                max_conns: 2,
            },
            dialer.clone(),
            Arc::new(NoopLogger),
        )
        .unwrap();
        TrackerClient::new(pool, Arc::new(NoopLogger))
    }

    /// `spi` is the store path index; fetch/update replies carry none.
    fn lookup_response(group: &str, ip: &str, port: u64, spi: Option<u8>) -> Vec<u8> {
        let mut body = Vec::new();
        put_fixed(&mut body, group, GROUP_NAME_MAX_LEN, "group").unwrap();
        put_fixed(&mut body, ip, IP_ADDRESS_SIZE - 1, "ip").unwrap();
        body.extend_from_slice(&port.to_be_bytes());
        body.extend(spi);
        let mut out = Header::request(cmd::TRACKER_RESP, body.len() as u64)
            .encode()
            .to_vec();
        out.extend_from_slice(&body);
        out
    }

    #[test]
    fn test_query_without_group() {
        let dialer = MockDialer::new();
        dialer.script(lookup_response("group1", "10.0.0.7", 23000, Some(1)));
        let t = tracker(&dialer);

        let s = t.query_storage_for_upload().unwrap();
        assert_eq!(
            s,
            StorageServer {
                ip_addr: "10.0.0.7".to_string(),
                port: 23000,
                group_name: "group1".to_string(),
                store_path_index: 1,
            }
        );

        let written = dialer.handles()[0].written();
        assert_eq!(written, Header::request(101, 0).encode());
        // Clean exchange: connection went back to the pool
        assert_eq!(t.pool().size(), 1);
    }

    #[test]
    fn test_query_with_group_sends_padded_name() {
        let dialer = MockDialer::new();
        dialer.script(lookup_response("group2", "10.0.0.8", 23000, Some(0)));
        let t = tracker(&dialer);

        let s = t.query_storage_for_upload_in_group("group2").unwrap();
        assert_eq!(s.group_name, "group2");

        let written = dialer.handles()[0].written();
        assert_eq!(written.len(), HEADER_LEN + GROUP_NAME_MAX_LEN);
        let header: [u8; HEADER_LEN] = written[..HEADER_LEN].try_into().unwrap();
        assert_eq!(Header::decode(&header), Header::request(104, 16));
        assert_eq!(&written[HEADER_LEN..HEADER_LEN + 6], b"group2");
    }

    #[test]
    fn test_query_fetch_body() {
        let dialer = MockDialer::new();
        dialer.script(lookup_response("group1", "10.0.0.9", 23000, None));
        let t = tracker(&dialer);

        t.query_storage_for_fetch("group1", "M00/00/00/abc.txt").unwrap();
        let written = dialer.handles()[0].written();
        assert_eq!(written[8], cmd::QUERY_FETCH_ONE);
        assert_eq!(&written[HEADER_LEN + GROUP_NAME_MAX_LEN..], b"M00/00/00/abc.txt");
    }

    #[test]
    fn test_store_lookup_requires_store_path_index() {
        // Header announces a full store reply but only 39 bytes follow
        let dialer = MockDialer::new();
        let mut resp = lookup_response("group1", "10.0.0.7", 23000, None);
        resp[..8].copy_from_slice(&(STORAGE_LOOKUP_STORE_LEN as u64).to_be_bytes());
        dialer.script(resp);
        let t = tracker(&dialer);

        assert!(matches!(
            t.query_storage_for_upload(),
            Err(FdfsError::MalformedResponse(_))
        ));
        assert!(dialer.handles()[0].is_closed());

        // A reply that declares 39 bytes is rejected too
        let dialer = MockDialer::new();
        dialer.script(lookup_response("group1", "10.0.0.7", 23000, None));
        let t = tracker(&dialer);
        assert!(matches!(
            t.query_storage_for_upload_in_group("group1"),
            Err(FdfsError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_fetch_lookup_rejects_store_sized_reply() {
        let dialer = MockDialer::new();
        dialer.script(lookup_response("group1", "10.0.0.9", 23000, Some(0)));
        let t = tracker(&dialer);

        assert!(matches!(
            t.query_storage_for_update("group1", "M00/00/00/abc.txt"),
            Err(FdfsError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_query_sends_single_frame() {
        let dialer = MockDialer::new();
        dialer.script(lookup_response("group1", "10.0.0.9", 23000, None));
        let t = tracker(&dialer);

        let s = t.query_storage_for_update("group1", "M00/00/00/abc.txt").unwrap();
        assert_eq!(s.store_path_index, 0);
        let written = dialer.handles()[0].writes();
        assert_eq!(written.len(), 1);
        assert_eq!(written[0].len(), HEADER_LEN + GROUP_NAME_MAX_LEN + 17);
        assert_eq!(written[0][8], cmd::QUERY_UPDATE);
    }

    #[test]
    fn test_query_server_error() {
        let dialer = MockDialer::new();
        let header = Header {
            pkg_len: 0,
            cmd: cmd::TRACKER_RESP,
            status: 2,
        };
        dialer.script(header.encode().to_vec());
        let t = tracker(&dialer);

        assert!(matches!(
            t.query_storage_for_upload(),
            Err(FdfsError::Server { status: 2 })
        ));
        // Connection is not reused after a failed exchange
        assert_eq!(t.pool().size(), 0);
        assert!(dialer.handles()[0].is_closed());
    }

    #[test]
    fn test_query_truncated_body() {
        let dialer = MockDialer::new();
        let mut resp = lookup_response("group1", "10.0.0.7", 23000, Some(1));
        resp.truncate(HEADER_LEN + 20);
        dialer.script(resp);
        let t = tracker(&dialer);

        assert!(matches!(
            t.query_storage_for_upload(),
            Err(FdfsError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_query_group_too_long_is_caller_error() {
        let dialer = MockDialer::new();
        let t = tracker(&dialer);
        assert!(matches!(
            t.query_storage_for_upload_in_group("this-group-name-is-too-long"),
            Err(FdfsError::InvalidArgument(_))
        ));
        assert_eq!(dialer.dial_count(), 0);
    }

    #[test]
    fn test_query_after_close() {
        let dialer = MockDialer::new();
        let t = tracker(&dialer);
        t.close();
        assert!(matches!(t.query_storage_for_upload(), Err(FdfsError::PoolClosed)));
    }
}
