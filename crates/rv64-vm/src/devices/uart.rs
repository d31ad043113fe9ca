//! 16550-compatible UART.
//!
//! The register window lives behind a mutex shared with the host stdin
//! reader. The reader owns a [`UartInput`] handle: it blocks until the
//! receive slot drains, deposits one byte, and raises a one-shot interrupt
//! flag that the hart consumes at its next poll.

use crate::bus::BYTE;
use crate::exception::Exception;
use std::io::{self, Write};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Condvar, Mutex,
};

/// The address which the UART starts.
pub const UART_BASE: u64 = 0x1000_0000;
/// The size of UART.
pub const UART_SIZE: u64 = 0x100;

/// The interrupt request of UART.
pub const UART_IRQ: u64 = 10;

/// Receive holding register (for input bytes).
pub const UART_RHR: u64 = UART_BASE;
/// Transmit holding register (for output bytes).
pub const UART_THR: u64 = UART_BASE;
/// Interrupt enable register.
pub const UART_IER: u64 = UART_BASE + 1;
/// FIFO control register (write) / interrupt status register (read).
pub const UART_FCR: u64 = UART_BASE + 2;
/// Line control register.
pub const UART_LCR: u64 = UART_BASE + 3;
/// Line status register.
pub const UART_LSR: u64 = UART_BASE + 5;

/// The receiver (RX) bit in the line status register.
pub const UART_LSR_RX: u8 = 1;
/// The transmitter (TX) bit in the line status register.
pub const UART_LSR_TX: u8 = 1 << 5;

/// The 16550-like UART.
#[derive(Debug)]
pub struct Uart {
    /// The register window, guarded against the producer thread. The condvar
    /// signals "RX slot drained" back to a blocked producer.
    uart: Arc<(Mutex<[u8; UART_SIZE as usize]>, Condvar)>,
    /// One-shot interrupt flag, cleared by the hart's next poll.
    interrupting: Arc<AtomicBool>,
}

/// Cloneable producer handle for host input threads.
#[derive(Debug, Clone)]
pub struct UartInput {
    uart: Arc<(Mutex<[u8; UART_SIZE as usize]>, Condvar)>,
    interrupting: Arc<AtomicBool>,
}

impl Uart {
    pub fn new() -> Self {
        let mut array = [0; UART_SIZE as usize];
        // Transmit is always ready.
        array[(UART_LSR - UART_BASE) as usize] |= UART_LSR_TX;

        Self {
            uart: Arc::new((Mutex::new(array), Condvar::new())),
            interrupting: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A handle the host input loop can push received bytes through.
    pub fn input_handle(&self) -> UartInput {
        UartInput {
            uart: Arc::clone(&self.uart),
            interrupting: Arc::clone(&self.interrupting),
        }
    }

    /// Return true if an interrupt is pending, consuming the flag.
    pub fn is_interrupting(&self) -> bool {
        self.interrupting.swap(false, Ordering::Acquire)
    }

    pub fn read(&mut self, addr: u64, size: u8) -> Result<u64, Exception> {
        if size != BYTE {
            return Err(Exception::LoadAccessFault);
        }
        let (uart, cvar) = &*self.uart;
        let mut array = uart.lock().expect("failed to get an UART object");
        match addr {
            UART_RHR => {
                // The byte is consumed; tell a blocked producer the slot is
                // free again.
                cvar.notify_one();
                array[(UART_LSR - UART_BASE) as usize] &= !UART_LSR_RX;
                Ok(array[(UART_RHR - UART_BASE) as usize] as u64)
            }
            _ => Ok(array[(addr - UART_BASE) as usize] as u64),
        }
    }

    pub fn write(&mut self, addr: u64, value: u64, size: u8) -> Result<(), Exception> {
        if size != BYTE {
            return Err(Exception::StoreAMOAccessFault);
        }
        let (uart, _cvar) = &*self.uart;
        let mut array = uart.lock().expect("failed to get an UART object");
        match addr {
            UART_THR => {
                print!("{}", value as u8 as char);
                io::stdout().flush().expect("failed to flush stdout");
            }
            _ => {
                array[(addr - UART_BASE) as usize] = value as u8;
            }
        }
        Ok(())
    }
}

impl Default for Uart {
    fn default() -> Self {
        Self::new()
    }
}

impl UartInput {
    /// Deposit one received byte. Blocks until the previous byte has been
    /// read out of RHR, then sets `LSR.RX` and raises the interrupt flag.
    pub fn push_byte(&self, byte: u8) {
        let (uart, cvar) = &*self.uart;
        let mut array = uart.lock().expect("failed to get an UART object");
        // Wait for the RX slot to drain.
        while (array[(UART_LSR - UART_BASE) as usize] & UART_LSR_RX) == 1 {
            array = cvar.wait(array).expect("the mutex is poisoned");
        }
        array[(UART_RHR - UART_BASE) as usize] = byte;
        array[(UART_LSR - UART_BASE) as usize] |= UART_LSR_RX;
        self.interrupting.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::WORD;

    #[test]
    fn push_read_drains_rx() {
        let mut uart = Uart::new();
        uart.input_handle().push_byte(b'a');
        assert!(uart.is_interrupting());
        // The flag is one-shot.
        assert!(!uart.is_interrupting());

        assert_eq!(
            uart.read(UART_LSR, BYTE).unwrap() as u8 & UART_LSR_RX,
            UART_LSR_RX
        );
        assert_eq!(uart.read(UART_RHR, BYTE).unwrap(), b'a' as u64);
        assert_eq!(uart.read(UART_LSR, BYTE).unwrap() as u8 & UART_LSR_RX, 0);
    }

    #[test]
    fn transmit_is_always_ready() {
        let mut uart = Uart::new();
        assert_eq!(
            uart.read(UART_LSR, BYTE).unwrap() as u8 & UART_LSR_TX,
            UART_LSR_TX
        );
    }

    #[test]
    fn only_byte_access() {
        let mut uart = Uart::new();
        assert_eq!(uart.read(UART_RHR, WORD), Err(Exception::LoadAccessFault));
        assert_eq!(
            uart.write(UART_THR, 0, WORD),
            Err(Exception::StoreAMOAccessFault)
        );
    }
}
