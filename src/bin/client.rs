//! Interactive client for the line protocol.
//!
//! Each command opens a fresh connection, sends one line, prints the
//! reply and disconnects.  `quit`/`q` or end of input leaves; Ctrl+C
//! stops the prompt loop.

use std::io::{self, BufRead, Read, Write};
use std::net::{Shutdown as SocketShutdown, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use iotctl::protocol::session::GREETING;

/// Send commands to an iotctl daemon
#[derive(Parser, Debug)]
#[command(name = "iotctl-client", version, long_about = None)]
struct Args {
    /// Server address, e.g. 192.168.0.84
    server: String,

    /// Server port
    #[arg(default_value_t = 8080)]
    port: u16,

    /// Reply timeout in seconds
    #[arg(short, long, default_value_t = 5)]
    timeout: u64,
}

/// Send one command and return the reply without the greeting.
fn send_command(addr: &str, command: &str, timeout: Duration) -> Result<String> {
    let mut stream = TcpStream::connect(addr).with_context(|| format!("connection to {} failed", addr))?;
    stream.set_read_timeout(Some(timeout))?;
    stream.write_all(command.as_bytes())?;
    stream.write_all(b"\n")?;
    stream.shutdown(SocketShutdown::Write)?;

    let mut reply = String::new();
    stream.read_to_string(&mut reply).context("no reply from server")?;
    let body = reply
        .strip_prefix(GREETING)
        .map_or(reply.as_str(), |rest| rest.trim_start_matches(['\r', '\n']));
    Ok(body.trim_end().to_string())
}

fn main() -> Result<()> {
    let args = Args::parse();
    let addr = format!("{}:{}", args.server, args.port);
    let timeout = Duration::from_secs(args.timeout);

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = Arc::clone(&running);
        ctrlc::set_handler(move || running.store(false, Ordering::SeqCst))
            .context("cannot install signal handler")?;
    }

    println!("Connected target {} (HELP: command list, quit: exit)", addr);
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    while running.load(Ordering::SeqCst) {
        print!("> ");
        io::stdout().flush()?;

        let Some(line) = lines.next() else { break };
        let line = line?;
        let command = line.trim();
        if command.is_empty() {
            continue;
        }
        if command == "quit" || command == "q" {
            break;
        }

        match send_command(&addr, command, timeout) {
            Ok(reply) => println!("{}", reply),
            Err(e) => eprintln!("{:#}", e),
        }
    }

    println!("bye");
    Ok(())
}
