//! Bounded pool of blocking connections to a set of candidate hosts.
//!
//! The pool caps *resting* connections, not in-flight ones: `acquire` dials a
//! new connection whenever the idle queue is empty, and `release` closes the
//! connection instead of queueing it once `max_conns` are already idle.
//!
//! Closing a connection means dropping it; for `TcpStream` that closes the socket.

use crate::error::{FdfsError, Result};
use crate::logger::Logger;
use crate::net::tune_socket;
use parking_lot::Mutex;
use rand::Rng;
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Opens a new connection to `host:port`.
pub trait Dialer: Send + Sync {
    type Conn: Read + Write + Send;

    fn dial(&self, addr: &str) -> io::Result<Self::Conn>;
}

#[derive(Debug, Clone, Default)]
pub struct TcpDialer {
    pub connect_timeout: Option<Duration>,
    /// Applied as both read and write timeout on every socket.
    pub io_timeout: Option<Duration>,
}

impl Dialer for TcpDialer {
    type Conn = TcpStream;

    fn dial(&self, addr: &str) -> io::Result<TcpStream> {
        let stream = match self.connect_timeout {
            None => TcpStream::connect(addr)?,
            Some(timeout) => {
                let mut last_err = None;
                let mut connected = None;
                for sa in addr.to_socket_addrs()? {
                    match TcpStream::connect_timeout(&sa, timeout) {
                        Ok(s) => {
                            connected = Some(s);
                            break;
                        }
                        Err(e) => last_err = Some(e),
                    }
                }
                match connected {
                    Some(s) => s,
                    None => {
                        return Err(last_err.unwrap_or_else(|| {
                            io::Error::new(io::ErrorKind::NotFound, "no address resolved")
                        }))
                    }
                }
            }
        };
        stream.set_read_timeout(self.io_timeout)?;
        stream.set_write_timeout(self.io_timeout)?;
        tune_socket(&stream);
        Ok(stream)
    }
}

/// Picks which candidate host the next dial goes to.
pub trait HostSelector: Send + Sync {
    fn select<'a>(&self, hosts: &'a [String]) -> &'a str;
}

/// Uniform random choice (default).
#[derive(Debug, Default)]
pub struct RandomSelector;

impl HostSelector for RandomSelector {
    fn select<'a>(&self, hosts: &'a [String]) -> &'a str {
        &hosts[rand::thread_rng().gen_range(0..hosts.len())]
    }
}

#[derive(Debug, Default)]
pub struct RoundRobinSelector {
    next: AtomicUsize,
}

impl HostSelector for RoundRobinSelector {
    fn select<'a>(&self, hosts: &'a [String]) -> &'a str {
        let i = self.next.fetch_add(1, Ordering::Relaxed);
        &hosts[i % hosts.len()]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolLimits {
    /// Connections dialed up front when the pool is created
    pub min_conns: usize,
    /// Capacity of the idle queue
    pub max_conns: usize,
}

impl PoolLimits {
    pub fn validate(&self) -> Result<()> {
        if self.max_conns == 0 || self.min_conns > self.max_conns {
            return Err(FdfsError::InvalidConfig(format!(
                "invalid conns settings: min={} max={}",
                self.min_conns, self.max_conns
            )));
        }
        Ok(())
    }
}

pub struct ConnectionPool<D: Dialer = TcpDialer> {
    hosts: Vec<String>,
    port: u16,
    max_conns: usize,
    dialer: D,
    selector: Box<dyn HostSelector>,
    logger: Arc<dyn Logger>,
    // None once closed
    idle: Mutex<Option<VecDeque<D::Conn>>>,
}

impl<D: Dialer> ConnectionPool<D> {
    pub fn new(
        hosts: Vec<String>,
        port: u16,
        limits: PoolLimits,
        dialer: D,
        logger: Arc<dyn Logger>,
    ) -> Result<Self> {
        Self::with_selector(hosts, port, limits, dialer, Box::new(RandomSelector), logger)
    }

    pub fn with_selector(
        hosts: Vec<String>,
        port: u16,
        limits: PoolLimits,
        dialer: D,
        selector: Box<dyn HostSelector>,
        logger: Arc<dyn Logger>,
    ) -> Result<Self> {
        limits.validate()?;
        if hosts.is_empty() {
            return Err(FdfsError::InvalidConfig("host list is empty".to_string()));
        }
        let pool = ConnectionPool {
            hosts,
            port,
            max_conns: limits.max_conns,
            dialer,
            selector,
            logger,
            idle: Mutex::new(Some(VecDeque::with_capacity(limits.max_conns))),
        };
        for _ in 0..limits.min_conns {
            // On failure the pool drops here, closing what was already dialed
            let conn = pool.dial()?;
            if let Some(q) = pool.idle.lock().as_mut() {
                q.push_back(conn);
            }
        }
        Ok(pool)
    }

    /// Hand out an idle connection, or dial a new one if none is resting.
    pub fn acquire(&self) -> Result<PooledConn<'_, D>> {
        let reused = match self.idle.lock().as_mut() {
            None => return Err(FdfsError::PoolClosed),
            Some(q) => q.pop_front(),
        };
        let conn = match reused {
            Some(conn) => conn,
            None => self.dial()?,
        };
        Ok(PooledConn {
            conn: Some(conn),
            pool: self,
            broken: false,
        })
    }

    /// Return a connection to the idle queue. Returns false if it was closed
    /// instead, either because the pool is closed or the queue is full.
    pub fn release(&self, conn: D::Conn) -> bool {
        let mut guard = self.idle.lock();
        if let Some(q) = guard.as_mut() {
            if q.len() < self.max_conns {
                q.push_back(conn);
                return true;
            }
        }
        drop(guard);
        drop(conn);
        false
    }

    /// Close every idle connection and reject further acquires. Connections
    /// currently checked out are closed when they come back.
    pub fn close(&self) {
        let drained = self.idle.lock().take();
        drop(drained);
    }

    pub fn is_closed(&self) -> bool {
        self.idle.lock().is_none()
    }

    /// Number of idle connections.
    pub fn size(&self) -> usize {
        self.idle.lock().as_ref().map_or(0, |q| q.len())
    }

    fn dial(&self) -> Result<D::Conn> {
        let host = self.selector.select(&self.hosts);
        let addr = format!("{}:{}", host, self.port);
        let conn = self
            .dialer
            .dial(&addr)
            .map_err(|source| FdfsError::Connect {
                addr: addr.clone(),
                source,
            })?;
        self.logger.connect(&addr);
        Ok(conn)
    }
}

/// A checked-out connection. Dropping it hands it back to the pool, unless it
/// saw an I/O error, an unexpected EOF, a failed exchange or a panic, in
/// which case it is closed so a half-finished exchange is never reused.
pub struct PooledConn<'p, D: Dialer> {
    conn: Option<D::Conn>,
    pool: &'p ConnectionPool<D>,
    broken: bool,
}

impl<'p, D: Dialer> PooledConn<'p, D> {
    pub fn mark_broken(&mut self) {
        self.broken = true;
    }

    pub fn is_broken(&self) -> bool {
        self.broken
    }

    /// Run one request/response exchange; an `Err` poisons the connection.
    pub fn exchange<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let result = f(self);
        if result.is_err() {
            self.broken = true;
        }
        result
    }

    fn inner(&mut self) -> io::Result<&mut D::Conn> {
        self.conn
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "connection released"))
    }

    fn track<T>(&mut self, r: io::Result<T>) -> io::Result<T> {
        if let Err(e) = &r {
            if e.kind() != io::ErrorKind::Interrupted {
                self.broken = true;
            }
        }
        r
    }
}

impl<'p, D: Dialer> Read for PooledConn<'p, D> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let r = self.inner().and_then(|c| c.read(buf));
        if matches!(r, Ok(0)) && !buf.is_empty() {
            // Peer closed mid-exchange
            self.broken = true;
        }
        self.track(r)
    }
}

impl<'p, D: Dialer> Write for PooledConn<'p, D> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let r = self.inner().and_then(|c| c.write(buf));
        self.track(r)
    }

    fn flush(&mut self) -> io::Result<()> {
        let r = self.inner().and_then(|c| c.flush());
        self.track(r)
    }
}

impl<'p, D: Dialer> Drop for PooledConn<'p, D> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            if self.broken || std::thread::panicking() {
                drop(conn);
            } else {
                self.pool.release(conn);
            }
        }
    }
}

/// In-memory connections for tests: canned input, captured output and a
/// closed flag set on drop.
#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use std::sync::atomic::AtomicBool;

    #[derive(Clone)]
    pub struct MockHandle {
        pub addr: String,
        input: Arc<Mutex<VecDeque<u8>>>,
        // One entry per write call
        written: Arc<Mutex<Vec<Vec<u8>>>>,
        closed: Arc<AtomicBool>,
    }

    impl MockHandle {
        pub fn feed(&self, bytes: &[u8]) {
            self.input.lock().extend(bytes.iter().copied());
        }

        pub fn written(&self) -> Vec<u8> {
            self.written.lock().concat()
        }

        pub fn writes(&self) -> Vec<Vec<u8>> {
            self.written.lock().clone()
        }

        pub fn is_closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }
    }

    pub struct MockConn {
        handle: MockHandle,
    }

    impl Read for MockConn {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let mut input = self.handle.input.lock();
            let n = buf.len().min(input.len());
            for (slot, b) in buf.iter_mut().zip(input.drain(..n)) {
                *slot = b;
            }
            Ok(n)
        }
    }

    impl Write for MockConn {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.handle.written.lock().push(buf.to_vec());
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Drop for MockConn {
        fn drop(&mut self) {
            self.handle.closed.store(true, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct MockState {
        scripted: VecDeque<Vec<u8>>,
        handles: Vec<MockHandle>,
        refuse: bool,
    }

    #[derive(Clone, Default)]
    pub struct MockDialer {
        state: Arc<Mutex<MockState>>,
    }

    impl MockDialer {
        pub fn new() -> Self {
            Self::default()
        }

        /// Input for the next dialed connection.
        pub fn script(&self, response: Vec<u8>) {
            self.state.lock().scripted.push_back(response);
        }

        pub fn refuse(&self, refuse: bool) {
            self.state.lock().refuse = refuse;
        }

        pub fn handles(&self) -> Vec<MockHandle> {
            self.state.lock().handles.clone()
        }

        pub fn dial_count(&self) -> usize {
            self.state.lock().handles.len()
        }
    }

    impl Dialer for MockDialer {
        type Conn = MockConn;

        fn dial(&self, addr: &str) -> io::Result<MockConn> {
            let mut state = self.state.lock();
            if state.refuse {
                return Err(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"));
            }
            let input = state.scripted.pop_front().unwrap_or_default();
            let handle = MockHandle {
                addr: addr.to_string(),
                input: Arc::new(Mutex::new(input.into_iter().collect())),
                written: Arc::new(Mutex::new(Vec::new())),
                closed: Arc::new(AtomicBool::new(false)),
            };
            state.handles.push(handle.clone());
            Ok(MockConn { handle })
        }
    }
}
