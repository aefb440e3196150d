use crate::codec::StorageServer;
use anyhow::Result;
use chrono::Utc;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

/// Event sink handed to every client at construction.
pub trait Logger: Send + Sync {
    fn connect(&self, _addr: &str) {}
    fn lookup_done(&self, _kind: &str, _server: &StorageServer) {}
    fn upload_done(&self, _group: &str, _remote_file_id: &str, _bytes: u64) {}
    fn download_done(&self, _remote_file_id: &str, _bytes: u64) {}
    fn error(&self, _op: &str, _msg: &str) {}
}

pub struct NoopLogger;
impl Logger for NoopLogger {}

pub struct TextLogger {
    file: Mutex<File>,
}

impl TextLogger {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let f = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(f),
        })
    }

    fn line(&self, s: &str) {
        let mut f = self.file.lock();
        let _ = writeln!(f, "[{}] {}", Utc::now().to_rfc3339(), s);
    }
}

impl Logger for TextLogger {
    fn connect(&self, addr: &str) {
        self.line(&format!("CONNECT addr={}", addr));
    }
    fn lookup_done(&self, kind: &str, server: &StorageServer) {
        self.line(&format!("LOOKUP kind={} server={}", kind, server));
    }
    fn upload_done(&self, group: &str, remote_file_id: &str, bytes: u64) {
        self.line(&format!(
            "UPLOAD group={} file={} bytes={}",
            group, remote_file_id, bytes
        ));
    }
    fn download_done(&self, remote_file_id: &str, bytes: u64) {
        self.line(&format!("DOWNLOAD file={} bytes={}", remote_file_id, bytes));
    }
    fn error(&self, op: &str, msg: &str) {
        self.line(&format!("ERROR op={} msg={}", op, msg));
    }
}
