//! TCP accept loop.
//!
//! The listener runs non-blocking and is polled, so the loop notices
//! shutdown within one poll interval even when no client connects.
//! Connections are served one at a time: each runs on a named session
//! thread that is joined before the next accept, which keeps a panic in
//! one session from taking the daemon down.

use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::thread;
use std::time::Duration;

use log::{debug, error, info, warn};

use crate::protocol::mux::Multiplexer;
use crate::shutdown::Shutdown;

/// Accept poll period while idle.
const ACCEPT_POLL: Duration = Duration::from_millis(100);

pub struct TcpServer {
    listener: TcpListener,
    mux: Multiplexer,
    shutdown: Shutdown,
    read_timeout: Duration,
}

impl TcpServer {
    /// Bind `addr`.  Failure here is fatal for the daemon.
    pub fn bind(addr: &str, mux: Multiplexer, shutdown: Shutdown, read_timeout: Duration) -> io::Result<Self> {
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        Ok(Self {
            listener,
            mux,
            shutdown,
            read_timeout,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept and serve until shutdown is triggered.
    pub fn run(&self) -> io::Result<()> {
        info!("Listening on {}", self.local_addr()?);
        let mut accepted: u64 = 0;

        while !self.shutdown.is_triggered() {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    accepted += 1;
                    info!("Client {} connected (#{})", peer, accepted);
                    self.serve(stream, accepted);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => thread::sleep(ACCEPT_POLL),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!("accept failed: {}", e);
                    thread::sleep(ACCEPT_POLL);
                }
            }
        }

        info!("Accept loop stopped after {} connections", accepted);
        Ok(())
    }

    fn serve(&self, stream: TcpStream, id: u64) {
        if let Err(e) = stream
            .set_nonblocking(false)
            .and_then(|()| stream.set_read_timeout(Some(self.read_timeout)))
        {
            warn!("Session {}: socket setup failed: {}", id, e);
            return;
        }

        let mux = self.mux.clone();
        let spawned = thread::Builder::new()
            .name(format!("session-{}", id))
            .spawn(move || {
                let mut stream = stream;
                if let Err(e) = mux.serve(&mut stream) {
                    debug!("Session {} ended with I/O error: {}", id, e);
                }
            });

        match spawned {
            Ok(handle) => {
                if handle.join().is_err() {
                    error!("Session {} panicked", id);
                }
            }
            Err(e) => warn!("Session {}: could not start thread: {}", id, e),
        }
    }
}
