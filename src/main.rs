//! Panel matrix controller
//!
//! Drives a chain of tiled 32x8 serpentine LED panels. Patterns are picked
//! and uploaded over HTTP; live frames arrive as UDP datagrams.
//!
//! ## Architecture
//! - **Render thread** (std::thread): owns the scheduler, frame buffer,
//!   stream socket and LED output
//! - **HTTP server** (tokio/axum): validates requests, sends commands via channel
//!
//! ## Rust concepts
//! - `#[tokio::main]` async entry point
//! - `std::thread::Builder` for the named render thread
//! - `std::sync::mpsc` channels between async and sync worlds
//! - Graceful shutdown driven by an `AtomicBool`
//!
//! ## Usage
//! ```sh
//! sudo ./target/release/panel-matrix-controller --panel-rows 4 --panels-wide 2
//! ```

use clap::Parser;
use panel_matrix_controller::config::ControllerConfig;
use panel_matrix_controller::output::{HeadlessOutput, OutputDriver};
use panel_matrix_controller::render::{SharedState, render_loop};
use panel_matrix_controller::scheduler::{ControlCommand, Scheduler};
use panel_matrix_controller::server::{self, AppState, PatternEntry};
use panel_matrix_controller::{DEFAULT_CAPACITY, is_running, setup_signal_handler};
use std::error::Error;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

/// Tiled LED panel controller with HTTP control and UDP streaming
#[derive(Parser)]
#[command(name = "panel-matrix-controller")]
#[command(about = "Controller for tiled serpentine LED panels")]
#[command(version)]
struct Args {
    /// HTTP port to listen on
    #[arg(long, default_value = "8080")]
    port: u16,

    /// UDP port for pixel streaming
    #[arg(long, default_value = "4210")]
    stream_port: u16,

    /// Panels side by side in one panel row
    #[arg(long, default_value = "1")]
    panels_wide: u16,

    /// Number of panel rows
    #[arg(long, default_value = "4")]
    panel_rows: u16,

    /// Frame buffer capacity in pixels
    #[arg(long, default_value_t = DEFAULT_CAPACITY)]
    capacity: usize,

    /// Animation cadence in milliseconds
    #[arg(long, default_value = "20")]
    frame_interval_ms: u64,

    /// How often control requests are serviced while streaming, in milliseconds
    #[arg(long, default_value = "200")]
    streaming_control_interval_ms: u64,

    /// Seconds in the status display before streaming starts (0 disables)
    #[arg(long, default_value = "60")]
    idle_timeout_secs: u64,

    /// Output brightness (0-100)
    #[arg(long, default_value = "30", value_parser = clap::value_parser!(u8).range(0..=100))]
    brightness: u8,

    /// Hours added to UTC for the clock patterns
    #[arg(long, default_value = "0", allow_hyphen_values = true)]
    utc_offset_hours: i8,

    /// Status line text (defaults to the listen address)
    #[arg(long)]
    status_text: Option<String>,
}

impl Args {
    fn into_config(self) -> ControllerConfig {
        let status_text = self.status_text.unwrap_or_else(|| {
            let ip = local_ip().unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
            format!("{}:{}", ip, self.port)
        });
        ControllerConfig {
            http_port: self.port,
            stream_port: self.stream_port,
            panels_wide: self.panels_wide,
            panel_rows: self.panel_rows,
            capacity: self.capacity,
            frame_interval: Duration::from_millis(self.frame_interval_ms),
            streaming_control_interval: Duration::from_millis(self.streaming_control_interval_ms),
            idle_timeout: ControllerConfig::idle_timeout_from_secs(self.idle_timeout_secs),
            brightness: self.brightness,
            utc_offset_hours: self.utc_offset_hours,
            status_text,
        }
    }
}

/// Address of the interface that routes outward. Connecting a UDP socket
/// sends nothing.
fn local_ip() -> Option<IpAddr> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    socket.local_addr().ok().map(|addr| addr.ip())
}

/// What the render thread hands back once its scheduler is built.
type Ready = Result<(SharedState, Vec<PatternEntry>), String>;

/// Build the scheduler on the render thread and run it.
fn run_scheduler<O: OutputDriver>(
    config: &ControllerConfig,
    commands: Receiver<ControlCommand>,
    socket: UdpSocket,
    output: O,
    ready: Sender<Ready>,
    running: Arc<AtomicBool>,
) {
    let now = Instant::now();
    let scheduler = match Scheduler::new(config, commands, socket, output, now) {
        Ok(scheduler) => scheduler,
        Err(e) => {
            let _ = ready.send(Err(e.to_string()));
            return;
        }
    };

    let shared = SharedState::new(scheduler.status(now), scheduler.snapshot());
    let patterns = scheduler
        .context()
        .registry
        .catalogue()
        .into_iter()
        .map(PatternEntry::from)
        .collect();
    if ready.send(Ok((shared.clone(), patterns))).is_err() {
        return;
    }

    render_loop(scheduler, shared, running);
}

/// Spawn the render thread and wait until it is ticking.
///
/// The LED matrix handle is not `Send`, so the output driver is opened on
/// the render thread itself. Without the hardware feature, or when the
/// matrix fails to open, frames only reach the preview.
fn spawn_render_thread(
    config: ControllerConfig,
    commands: Receiver<ControlCommand>,
    socket: UdpSocket,
    running: Arc<AtomicBool>,
) -> Result<(JoinHandle<()>, SharedState, Vec<PatternEntry>), Box<dyn Error>> {
    let (ready_tx, ready_rx) = mpsc::channel();

    let handle = thread::Builder::new()
        .name("render".to_string())
        .spawn(move || {
            #[cfg(feature = "hardware")]
            {
                use panel_matrix_controller::output::MatrixOutput;
                let opened = config
                    .layout()
                    .map_err(|e| e.to_string())
                    .and_then(|layout| {
                        MatrixOutput::new(&layout, config.brightness).map_err(|e| e.to_string())
                    });
                match opened {
                    Ok(output) => {
                        tracing::info!("LED matrix initialised");
                        return run_scheduler(&config, commands, socket, output, ready_tx, running);
                    }
                    Err(e) => tracing::error!("Failed to initialize LED matrix: {}; running headless", e),
                }
            }
            run_scheduler(
                &config,
                commands,
                socket,
                HeadlessOutput::default(),
                ready_tx,
                running,
            );
        })?;

    let (shared, patterns) = ready_rx
        .recv()
        .map_err(|_| "Render thread exited during startup")??;
    Ok((handle, shared, patterns))
}

/// Resolves once the ctrl-c handler clears `running`.
async fn shutdown_signal(running: Arc<AtomicBool>) {
    while is_running(&running) {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    tracing::info!("Shutdown requested");
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn Error>> {
    // RUST_LOG overrides the default level; no ANSI codes for journald.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_ansi(false)
        .compact()
        .init();

    let config = Args::parse().into_config();
    let layout = config.layout()?;

    tracing::info!("Panel matrix controller v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        "Layout: {} panel rows x {} wide ({}x{} pixels, capacity {})",
        layout.panel_rows(),
        layout.panels_wide(),
        layout.width(),
        layout.height(),
        config.capacity
    );
    tracing::info!(
        "Frame interval {:?}, idle timeout {:?}, brightness {}",
        config.frame_interval,
        config.idle_timeout,
        config.brightness
    );
    tracing::info!("Status text: {}", config.status_text);

    let running = setup_signal_handler();

    let socket = UdpSocket::bind(SocketAddr::from(([0, 0, 0, 0], config.stream_port)))?;
    socket.set_nonblocking(true)?;
    tracing::info!("Streaming on udp://{}", socket.local_addr()?);

    let (command_tx, command_rx) = mpsc::channel();
    let http_port = config.http_port;
    let capacity = config.capacity;
    let (render_handle, shared, patterns) =
        spawn_render_thread(config, command_rx, socket, running.clone())?;

    let app = server::create_router(AppState {
        command_tx,
        shared,
        patterns: Arc::new(patterns),
        capacity,
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], http_port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on http://{}", addr);
    tracing::info!("API Documentation: http://localhost:{}/docs", http_port);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(running.clone()))
        .await;

    running.store(false, Ordering::SeqCst);
    if render_handle.join().is_err() {
        tracing::error!("Render thread panicked");
    }
    served?;
    Ok(())
}
