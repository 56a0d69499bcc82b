//! Shared fixtures: a fast-timing configuration, a processor wired to a
//! recording [`SimHal`], and a live TCP server on an ephemeral port.

use std::io::{self, Read, Write};
use std::net::{Shutdown as SocketShutdown, SocketAddr, TcpStream};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use iotctl::adapters::sim_hal::SimHal;
use iotctl::adapters::tcp::TcpServer;
use iotctl::app::service::CommandProcessor;
use iotctl::config::SystemConfig;
use iotctl::protocol::http::CommandReply;
use iotctl::protocol::mux::Multiplexer;
use iotctl::protocol::session::GREETING;
use iotctl::registry::CapabilityTable;
use iotctl::shutdown::Shutdown;

/// Millisecond-scale timings so background tasks finish quickly.
pub fn fast_config() -> SystemConfig {
    SystemConfig {
        bind_address: "127.0.0.1".into(),
        port: 0,
        web_root: "/nonexistent-web-root".into(),
        session_read_timeout_ms: 50,
        countdown_tick_ms: 60,
        alarm_duration_ms: 40,
        melody_note_ms: 40,
        auto_poll_interval_ms: 20,
        cancel_poll_ms: 5,
        join_timeout_ms: 2000,
        shutdown_grace_ms: 2000,
        ..SystemConfig::default()
    }
}

/// Poll `cond` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    cond()
}

pub struct Rig {
    pub hal: Arc<SimHal>,
    pub table: Arc<CapabilityTable>,
    pub processor: CommandProcessor,
    pub shutdown: Shutdown,
}

#[allow(dead_code)]
impl Rig {
    pub fn new() -> Self {
        Self::with(Arc::new(SimHal::new()), &fast_config())
    }

    pub fn with(hal: Arc<SimHal>, config: &SystemConfig) -> Self {
        let shutdown = Shutdown::new();
        let table = Arc::new(CapabilityTable::load(config, hal.clone(), &shutdown));
        let processor = CommandProcessor::new(Arc::clone(&table), shutdown.clone());
        Self {
            hal,
            table,
            processor,
            shutdown,
        }
    }

    /// Run one command and return the response text.
    pub fn run(&self, line: &str) -> String {
        self.processor.process(line).0.message
    }
}

impl Drop for Rig {
    fn drop(&mut self) {
        self.shutdown.trigger();
        self.table.unload();
    }
}

pub struct LiveServer {
    pub addr: SocketAddr,
    pub rig: Rig,
    handle: Option<JoinHandle<io::Result<()>>>,
}

#[allow(dead_code)]
impl LiveServer {
    pub fn start() -> Self {
        let config = fast_config();
        let rig = Rig::with(Arc::new(SimHal::new()), &config);
        let mux = Multiplexer::new(rig.processor.clone(), config.web_root.clone(), rig.shutdown.clone());
        let server = TcpServer::bind(
            &config.listen_addr(),
            mux,
            rig.shutdown.clone(),
            Duration::from_millis(config.session_read_timeout_ms),
        )
        .expect("bind ephemeral port");
        let addr = server.local_addr().expect("local addr");
        let handle = std::thread::spawn(move || server.run());
        Self {
            addr,
            rig,
            handle: Some(handle),
        }
    }

    /// Open a line session, send `lines`, half-close and collect every
    /// reply line after the greeting.
    pub fn line_session(&self, lines: &[&str]) -> Vec<String> {
        let mut stream = TcpStream::connect(self.addr).expect("connect");
        stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        for line in lines {
            stream.write_all(line.as_bytes()).unwrap();
            stream.write_all(b"\n").unwrap();
        }
        stream.shutdown(SocketShutdown::Write).unwrap();

        let mut out = String::new();
        stream.read_to_string(&mut out).unwrap();
        let mut replies = out.lines().map(str::to_string);
        assert_eq!(replies.next().as_deref(), Some(GREETING));
        replies.collect()
    }

    /// Send a raw HTTP request; returns status line and body.
    pub fn http(&self, request: &str) -> (String, String) {
        let mut stream = TcpStream::connect(self.addr).expect("connect");
        stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        stream.write_all(request.as_bytes()).unwrap();
        let mut out = String::new();
        stream.read_to_string(&mut out).unwrap();
        let status = out.lines().next().unwrap_or_default().to_string();
        let body = out.split_once("\r\n\r\n").map(|(_, b)| b.to_string()).unwrap_or_default();
        (status, body)
    }

    pub fn post_command(&self, command: &str) -> CommandReply {
        let body = serde_json::json!({ "command": command }).to_string();
        let request = format!(
            "POST /api/command HTTP/1.1\r\nHost: test\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
            body.len(),
            body
        );
        let (status, body) = self.http(&request);
        assert_eq!(status, "HTTP/1.1 200 OK");
        serde_json::from_str(&body).expect("JSON reply")
    }

    /// Wait for the accept loop to return.
    pub fn join(mut self) -> io::Result<()> {
        self.handle.take().map_or(Ok(()), |h| h.join().expect("server thread panicked"))
    }
}

impl Drop for LiveServer {
    fn drop(&mut self) {
        self.rig.shutdown.trigger();
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}
