//! RV64 virtual machine runner binary
use clap::Parser;
use command::Cli;
use eyre::{Result, WrapErr};
use rv64_vm::emu::Emulator;
use std::io::Read;
use std::time::{Duration, Instant};
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

mod command;

/// The redraw cadence the pacer batches steps against.
const FRAME_DURATION: Duration = Duration::from_micros(16_667);

/// Initialize the logger with a nice formatted output
fn init_logger() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    fmt::fmt().with_env_filter(filter).with_target(false).init();
}

/// Block on host stdin and feed the guest UART one byte at a time. The
/// push blocks whenever the guest has not drained the previous byte.
fn spawn_uart_reader(emu: &Emulator) {
    let input = emu.uart_input();
    std::thread::spawn(move || {
        let mut byte = [0; 1];
        loop {
            match std::io::stdin().read(&mut byte) {
                Ok(0) => break,
                Ok(_) => input.push_byte(byte[0]),
                Err(e) => {
                    error!("failed to read stdin: {e}");
                    break;
                }
            }
        }
    });
}

fn main() -> Result<()> {
    // Initialize the logger
    init_logger();

    // Parse command line arguments; bad usage exits 2.
    let cli = Cli::parse();

    let kernel = std::fs::read(&cli.kernel)
        .wrap_err_with(|| format!("failed to read kernel image {}", cli.kernel.display()))?;
    let disk = match &cli.disk {
        Some(path) => Some(
            std::fs::read(path)
                .wrap_err_with(|| format!("failed to read disk image {}", path.display()))?,
        ),
        None => None,
    };

    info!(
        "booting {} ({} bytes{})",
        cli.kernel.display(),
        kernel.len(),
        match &disk {
            Some(d) => format!(", disk {} bytes", d.len()),
            None => String::from(", no disk"),
        }
    );

    let mut emu = Emulator::new(&kernel, disk);
    spawn_uart_reader(&emu);

    // The pacer: a fixed batch of steps per frame interval. The host
    // framebuffer blitter would redraw from `emu.ram()` between batches.
    loop {
        let frame_start = Instant::now();
        if let Err(exception) = emu.run_ticks(cli.ticks_per_frame) {
            error!("fatal exception: {exception}");
            error!("\n{}", emu.hart.state);
            std::process::exit(1);
        }
        if let Some(remaining) = FRAME_DURATION.checked_sub(frame_start.elapsed()) {
            std::thread::sleep(remaining);
        }
    }
}
