//! CLI arguments for the virtual machine runner.
use clap::Parser;
use std::path::PathBuf;

/// RV64 virtual machine
#[derive(Parser)]
#[clap(name = "rv64-vm-cli", version, about, long_about = None)]
pub struct Cli {
    /// Raw kernel image, loaded at the bottom of RAM and entered in M-mode
    pub kernel: PathBuf,

    /// Disk image backing the block controller
    pub disk: Option<PathBuf>,

    /// How many instructions to run between frame intervals
    #[clap(long, default_value_t = 100_000)]
    pub ticks_per_frame: u32,
}
