//! Emulator facade: owns the hart and exposes the narrow interfaces the
//! outer program drives it through.

use crate::devices::kbd::KbdInput;
use crate::devices::uart::UartInput;
use crate::exception::Exception;
use crate::hart::Hart;
use crate::mem::{FRAMEBUFFER_BASE, RAM_BASE};

/// The whole machine: one hart, its bus and devices.
#[derive(Debug)]
pub struct Emulator {
    pub hart: Hart,
}

impl Emulator {
    /// Build the machine with the kernel image copied to the bottom of RAM
    /// and an optional disk image attached to the controller.
    pub fn new(kernel: &[u8], disk_image: Option<Vec<u8>>) -> Self {
        Self {
            hart: Hart::new(kernel, disk_image),
        }
    }

    /// Run one instruction plus the end-of-step interrupt poll. A fatal
    /// exception has already been delivered as a trap when this returns
    /// `Err`; the caller is expected to terminate.
    pub fn step(&mut self) -> Result<(), Exception> {
        self.hart.step()
    }

    /// Run a batch of steps, as the frame pacer does between redraws.
    pub fn run_ticks(&mut self, ticks: u32) -> Result<(), Exception> {
        for _ in 0..ticks {
            self.step()?;
        }
        Ok(())
    }

    /// RAM plus the framebuffer offset inside it, for the host blitter to
    /// read pixel data in place.
    pub fn ram(&self) -> (&[u8], usize) {
        (
            self.hart.bus.ram.bytes(),
            (FRAMEBUFFER_BASE - RAM_BASE) as usize,
        )
    }

    /// A handle for the host stdin loop to push UART bytes through.
    pub fn uart_input(&self) -> UartInput {
        self.hart.bus.uart.input_handle()
    }

    /// A handle for the host GUI loop to push keyboard scancodes through.
    pub fn kbd_input(&self) -> KbdInput {
        self.hart.bus.kbd.input_handle()
    }
}
