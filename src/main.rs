//! iotctl: device control daemon entry point.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │  TcpServer ──▶ Multiplexer ──▶ CommandProcessor                │
//! │  (accept)      (HTTP | line)        │                          │
//! │                                     ▼                          │
//! │                              CapabilityTable                   │
//! │                     LED · SEGMENT · BUZZER · CDS               │
//! │                                     │                          │
//! │  ──────────────── HalPort boundary ─┼──────────────────        │
//! │                                     ▼                          │
//! │                     SimHal / BoardHal (rppal)                  │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Startup: config → logging → PID file (daemon mode) → signal handler →
//! registry → listener.  Shutdown (signal or `QUIT`): accept loop stops,
//! devices are unloaded within a grace period, then the process exits.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use log::{error, info, warn};

use iotctl::adapters::sim_hal::SimHal;
use iotctl::adapters::tcp::TcpServer;
use iotctl::app::ports::HalPort;
use iotctl::app::service::CommandProcessor;
use iotctl::config::SystemConfig;
use iotctl::protocol::mux::Multiplexer;
use iotctl::registry::CapabilityTable;
use iotctl::shutdown::Shutdown;

/// Control daemon for the LED, numeric display, buzzer and light sensor
#[derive(Parser, Debug)]
#[command(name = "iotctl", version, long_about = None)]
struct Args {
    /// Run as a service: write the PID file and log without colours
    #[arg(short, long, default_value_t = false)]
    daemon: bool,

    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen port (overrides the configuration)
    #[arg(short, long)]
    port: Option<u16>,

    /// Directory containing index.html (overrides the configuration)
    #[arg(short, long)]
    web_root: Option<PathBuf>,

    /// Hardware access layer
    #[arg(long, value_enum, default_value_t = HalChoice::Sim)]
    hal: HalChoice,

    /// Enable verbose logging
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum HalChoice {
    /// In-memory pins, for hosts without the I/O board
    Sim,
    /// Raspberry Pi GPIO, PWM and I2C (needs the `rpi` feature)
    Board,
}

/// PID file removed again on drop.
struct PidFile(PathBuf);

impl PidFile {
    fn create(path: &Path) -> Result<Self> {
        fs::write(path, format!("{}\n", std::process::id()))
            .with_context(|| format!("cannot write PID file {}", path.display()))?;
        info!("PID file {}", path.display());
        Ok(Self(path.to_path_buf()))
    }

    fn remove(&self) {
        if let Err(e) = fs::remove_file(&self.0) {
            warn!("Could not remove PID file {}: {}", self.0.display(), e);
        }
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        self.remove();
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::from_default_env()
        .filter_level(if args.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .write_style(if args.daemon {
            env_logger::WriteStyle::Never
        } else {
            env_logger::WriteStyle::Auto
        })
        .init();

    let mut config = match &args.config {
        Some(path) => SystemConfig::load(path)?,
        None => SystemConfig::default(),
    };
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(root) = args.web_root {
        config.web_root = root;
    }
    config.validate()?;

    info!("iotctl {} starting", env!("CARGO_PKG_VERSION"));

    let pid_file = if args.daemon {
        Some(PidFile::create(&config.pid_file)?)
    } else {
        None
    };

    let shutdown = Shutdown::new();
    {
        let shutdown = shutdown.clone();
        ctrlc::set_handler(move || {
            if shutdown.trigger() {
                info!("Termination signal received, shutting down");
            }
        })
        .context("cannot install signal handler")?;
    }

    let hal = open_hal(args.hal)?;

    let table = Arc::new(CapabilityTable::load(&config, hal, &shutdown));
    if table.available_count() == 0 {
        bail!("no device capability could be bound");
    }

    let processor = CommandProcessor::new(Arc::clone(&table), shutdown.clone());
    let mux = Multiplexer::new(processor, config.web_root.clone(), shutdown.clone());
    let addr = config.listen_addr();
    let server = TcpServer::bind(
        &addr,
        mux,
        shutdown.clone(),
        Duration::from_millis(config.session_read_timeout_ms),
    )
    .with_context(|| format!("cannot listen on {} (port in use?)", addr))?;

    let served = server.run();
    if let Err(e) = &served {
        error!("Server loop failed: {}", e);
    }
    shutdown.trigger();

    if !unload_with_grace(Arc::clone(&table), config.shutdown_grace()) {
        if let Some(pid) = &pid_file {
            pid.remove();
        }
        warn!("Devices did not stop within {:?}, exiting anyway", config.shutdown_grace());
        std::process::exit(0);
    }

    info!("iotctl stopped");
    drop(pid_file);
    served.context("accept loop failed")
}

fn open_hal(choice: HalChoice) -> Result<Arc<dyn HalPort>> {
    match choice {
        HalChoice::Sim => {
            warn!("Using simulated hardware access layer");
            Ok(Arc::new(SimHal::new()))
        }
        HalChoice::Board => open_board(),
    }
}

#[cfg(feature = "rpi")]
fn open_board() -> Result<Arc<dyn HalPort>> {
    let hal = iotctl::adapters::rpi::open().context("cannot claim board peripherals")?;
    info!("Using Raspberry Pi peripherals");
    Ok(Arc::new(hal))
}

#[cfg(not(feature = "rpi"))]
fn open_board() -> Result<Arc<dyn HalPort>> {
    bail!("built without board support; rebuild with `--features rpi`")
}

/// Unload on a helper thread.  `false` if it did not finish in `grace`.
fn unload_with_grace(table: Arc<CapabilityTable>, grace: Duration) -> bool {
    let (tx, rx) = mpsc::channel();
    let spawned = thread::Builder::new().name("unload".into()).spawn(move || {
        table.unload();
        let _ = tx.send(());
    });
    match spawned {
        Ok(_) => rx.recv_timeout(grace).is_ok(),
        Err(e) => {
            warn!("Cannot start unload thread: {}", e);
            false
        }
    }
}
