//! Blocking transport primitives: whole-buffer sends, streamed file sends and
//! bounded receives. No protocol knowledge lives here.

use crate::error::{FdfsError, Result};
use std::fs::File;
use std::io::{ErrorKind, Read, Write};
use std::net::TcpStream;
use std::path::Path;

const CHUNK: usize = 256 * 1024;

pub fn send_bytes<W: Write + ?Sized>(conn: &mut W, buf: &[u8]) -> Result<()> {
    conn.write_all(buf)?;
    Ok(())
}

/// Stream the whole content of `path` to `conn`. Returns the number of bytes sent.
///
/// An empty file is rejected before anything is written, since upload sizes
/// must be nonzero.
pub fn send_file<W: Write + ?Sized>(conn: &mut W, path: &Path) -> Result<u64> {
    let mut file = File::open(path).map_err(|e| FdfsError::file(path, e))?;
    let size = file
        .metadata()
        .map_err(|e| FdfsError::file(path, e))?
        .len();
    if size == 0 {
        return Err(FdfsError::file(path, "file size is zero"));
    }

    let mut buf = vec![0u8; CHUNK.min(size as usize)];
    let mut sent = 0u64;
    while sent < size {
        let n = match file.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(FdfsError::file(path, e)),
        };
        conn.write_all(&buf[..n])?;
        sent += n as u64;
    }
    if sent != size {
        return Err(FdfsError::file(
            path,
            format!("file changed while sending: {}/{} bytes", sent, size),
        ));
    }
    Ok(sent)
}

/// Read until `n` bytes are accumulated or the peer signals end of stream.
///
/// The returned buffer's length is the number of bytes actually read; it is
/// shorter than `n` only when the stream ended first.
pub fn recv_exactly<R: Read + ?Sized>(conn: &mut R, n: u64) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity((n as usize).min(CHUNK));
    conn.take(n).read_to_end(&mut buf)?;
    Ok(buf)
}

/// Receive up to `n` bytes into a freshly created (or truncated) file.
/// Returns bytes written.
pub fn recv_to_file<R: Read + ?Sized>(conn: &mut R, path: &Path, n: u64) -> Result<u64> {
    let mut file = File::create(path).map_err(|e| FdfsError::file(path, e))?;
    let mut buf = vec![0u8; CHUNK.min(n as usize).max(1)];
    let mut remaining = n;
    while remaining > 0 {
        let to_read = remaining.min(buf.len() as u64) as usize;
        let got = match conn.read(&mut buf[..to_read]) {
            Ok(0) => break,
            Ok(got) => got,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        file.write_all(&buf[..got])
            .map_err(|e| FdfsError::file(path, e))?;
        remaining -= got as u64;
    }
    file.flush().map_err(|e| FdfsError::file(path, e))?;
    Ok(n - remaining)
}

// Socket tuning: disable Nagle and keep idle pooled sockets alive
pub fn tune_socket(stream: &TcpStream) {
    let _ = stream.set_nodelay(true);
    #[cfg(unix)]
    {
        use std::os::fd::AsRawFd;
        let fd = stream.as_raw_fd();
        unsafe {
            let keepalive: libc::c_int = 1;
            let _ = libc::setsockopt(
                fd,
                libc::SOL_SOCKET,
                libc::SO_KEEPALIVE,
                &keepalive as *const _ as *const libc::c_void,
                std::mem::size_of_val(&keepalive) as libc::socklen_t,
            );

            #[cfg(target_os = "linux")]
            {
                let keepidle: libc::c_int = 60; // Start probes after 60s idle
                let keepintvl: libc::c_int = 10; // 10s between probes
                let keepcnt: libc::c_int = 6; // 6 probes before failure
                let _ = libc::setsockopt(
                    fd,
                    libc::IPPROTO_TCP,
                    libc::TCP_KEEPIDLE,
                    &keepidle as *const _ as *const libc::c_void,
                    std::mem::size_of_val(&keepidle) as libc::socklen_t,
                );
                let _ = libc::setsockopt(
                    fd,
                    libc::IPPROTO_TCP,
                    libc::TCP_KEEPINTVL,
                    &keepintvl as *const _ as *const libc::c_void,
                    std::mem::size_of_val(&keepintvl) as libc::socklen_t,
                );
                let _ = libc::setsockopt(
                    fd,
                    libc::IPPROTO_TCP,
                    libc::TCP_KEEPCNT,
                    &keepcnt as *const _ as *const libc::c_void,
                    std::mem::size_of_val(&keepcnt) as libc::socklen_t,
                );
            }
        }
    }
}
