//! Keyboard scancode register.
//!
//! A single 32-bit read-only register that pops the next scancode from a
//! host-fed queue, or returns 0 when the queue is empty. The host GUI loop
//! owns a [`KbdInput`] handle and pushes scancodes from its own thread.

use crate::bus::WORD;
use crate::exception::Exception;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// The address which the keyboard device starts.
pub const KBD_BASE: u64 = 0x1000_2000;
/// The size of the keyboard register window.
pub const KBD_SIZE: u64 = 0x100;

/// Pop the next scancode, 0 if none.
pub const KBD_GET: u64 = KBD_BASE;

/// The keyboard device.
#[derive(Debug)]
pub struct Kbd {
    queue: Arc<Mutex<VecDeque<u32>>>,
}

/// Cloneable producer handle for the host input loop.
#[derive(Debug, Clone)]
pub struct KbdInput {
    queue: Arc<Mutex<VecDeque<u32>>>,
}

impl Kbd {
    pub fn new() -> Self {
        Self {
            queue: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    /// A handle the host input loop can push scancodes through.
    pub fn input_handle(&self) -> KbdInput {
        KbdInput {
            queue: Arc::clone(&self.queue),
        }
    }

    pub fn read(&mut self, addr: u64, size: u8) -> Result<u64, Exception> {
        if size != WORD {
            return Err(Exception::LoadAccessFault);
        }
        match addr {
            KBD_GET => {
                let mut queue = self.queue.lock().expect("failed to get the scancode queue");
                Ok(queue.pop_front().unwrap_or(0) as u64)
            }
            _ => Err(Exception::LoadAccessFault),
        }
    }

    pub fn write(&mut self, _addr: u64, _value: u64, _size: u8) -> Result<(), Exception> {
        // No writable registers in the window.
        Err(Exception::StoreAMOAccessFault)
    }
}

impl Default for Kbd {
    fn default() -> Self {
        Self::new()
    }
}

impl KbdInput {
    /// Queue one scancode for the guest.
    pub fn push_scancode(&self, scancode: u32) {
        let mut queue = self.queue.lock().expect("failed to get the scancode queue");
        queue.push_back(scancode);
    }
}
