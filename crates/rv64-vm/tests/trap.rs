//! Trap delivery, delegation, return round-trips, and the device claim
//! protocol.

use rv64_vm::bus::WORD;
use rv64_vm::devices::disk::{
    DISK_BUFFER_ADDR_LO, DISK_BUFFER_LEN_LO, DISK_DIRECTION, DISK_DONE, DISK_NOTIFY, DISK_SECTOR,
};
use rv64_vm::devices::plic::PLIC_SCLAIM;
use rv64_vm::emu::Emulator;
use rv64_vm::hart::Mode;
use rv64_vm::mem::RAM_BASE;
use rv64_vm::reg::csr::{
    MCAUSE, MEDELEG, MEPC, MIDELEG, MIE, MIP, MSTATUS_MIE, MSTATUS_MPP, MTVEC, SCAUSE, SEIP_BIT,
    SEPC, SSTATUS, STVEC, XSTATUS_SIE,
};

fn program(words: &[u32]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_le_bytes()).collect()
}

#[test]
fn delegated_ecall_from_u_mode_traps_to_s() {
    let mut emu = Emulator::new(
        &program(&[
            0x00000073, // ecall
        ]),
        None,
    );
    emu.hart.mode = Mode::User;
    emu.hart.state.write(MEDELEG, 1 << 8);
    emu.hart.state.write(STVEC, 0x8000_3000);

    emu.step().unwrap();

    assert_eq!(emu.hart.mode, Mode::Supervisor);
    assert_eq!(emu.hart.pc, 0x8000_3000);
    assert_eq!(emu.hart.state.read(SEPC), RAM_BASE);
    assert_eq!(emu.hart.state.read(SCAUSE), 8);
    // SPP records that the trap came from U-mode.
    assert_eq!(emu.hart.state.read(SSTATUS) & 0x100, 0);
}

#[test]
fn undelegated_ecall_traps_to_m() {
    let mut emu = Emulator::new(
        &program(&[
            0x00000073, // ecall
        ]),
        None,
    );
    emu.hart.state.write(MTVEC, 0x8000_0100);

    emu.step().unwrap();

    assert_eq!(emu.hart.mode, Mode::Machine);
    assert_eq!(emu.hart.pc, 0x8000_0100);
    assert_eq!(emu.hart.state.read(MEPC), RAM_BASE);
    assert_eq!(emu.hart.state.read(MCAUSE), 11);
    // MPP records the interrupted privilege.
    assert_eq!(emu.hart.state.read_mstatus(MSTATUS_MPP), 0b11);
}

#[test]
fn mret_round_trips_through_a_trap() {
    // ecall at the base, mret at the machine vector.
    let mut emu = Emulator::new(
        &program(&[
            0x00000073, // ecall
        ]),
        None,
    );
    emu.hart.state.write(MTVEC, RAM_BASE + 0x100);
    emu.hart
        .bus
        .write(RAM_BASE + 0x100, 0x30200073, WORD) // mret
        .unwrap();
    emu.hart.state.write_mstatus(MSTATUS_MIE, 1);

    emu.step().unwrap();
    assert_eq!(emu.hart.pc, RAM_BASE + 0x100);
    assert_eq!(emu.hart.state.read_mstatus(MSTATUS_MIE), 0);

    emu.step().unwrap();

    // Back where the trap was taken, in the same mode, interrupts restored.
    assert_eq!(emu.hart.pc, RAM_BASE);
    assert_eq!(emu.hart.mode, Mode::Machine);
    assert_eq!(emu.hart.state.read_mstatus(MSTATUS_MIE), 1);
}

#[test]
fn sret_round_trips_through_a_delegated_trap() {
    let mut emu = Emulator::new(
        &program(&[
            0x00000073, // ecall
        ]),
        None,
    );
    emu.hart.mode = Mode::Supervisor;
    emu.hart.state.write(MEDELEG, 1 << 9);
    emu.hart.state.write(STVEC, RAM_BASE + 0x200);
    emu.hart
        .bus
        .write(RAM_BASE + 0x200, 0x10200073, WORD) // sret
        .unwrap();
    emu.hart.state.write_sstatus(XSTATUS_SIE, 1);

    emu.step().unwrap();
    assert_eq!(emu.hart.mode, Mode::Supervisor);
    assert_eq!(emu.hart.pc, RAM_BASE + 0x200);
    assert_eq!(emu.hart.state.read_sstatus(XSTATUS_SIE), 0);

    emu.step().unwrap();

    assert_eq!(emu.hart.pc, RAM_BASE);
    assert_eq!(emu.hart.mode, Mode::Supervisor);
    assert_eq!(emu.hart.state.read_sstatus(XSTATUS_SIE), 1);
}

#[test]
fn uart_byte_becomes_a_claimed_external_interrupt() {
    let mut emu = Emulator::new(
        &program(&[
            0x00000013, // nop
        ]),
        None,
    );
    emu.hart.mode = Mode::Supervisor;
    emu.hart.state.write(MIDELEG, 1 << 9);
    emu.hart.state.write(MIE, SEIP_BIT);
    emu.hart.state.write(STVEC, 0x8000_4000);
    emu.hart.state.write_sstatus(XSTATUS_SIE, 1);

    emu.uart_input().push_byte(b'x');
    emu.step().unwrap();

    assert_eq!(emu.hart.mode, Mode::Supervisor);
    assert_eq!(emu.hart.pc, 0x8000_4000);
    assert_eq!(emu.hart.state.read(SCAUSE), (1 << 63) | 9);
    assert_eq!(emu.hart.state.read(SEPC), RAM_BASE);
    // The claim register carries the UART IRQ, and the delivered bit was
    // cleared from mip.
    assert_eq!(emu.hart.bus.read(PLIC_SCLAIM, WORD).unwrap(), 10);
    assert_eq!(emu.hart.state.read(MIP) & SEIP_BIT, 0);
}

#[test]
fn disk_notify_runs_the_transfer_at_the_poll() {
    // Sector 1 of the image carries a recognizable pattern.
    let mut image = vec![0u8; 1024];
    for (i, byte) in image[512..544].iter_mut().enumerate() {
        *byte = i as u8 + 1;
    }

    let mut emu = Emulator::new(
        &program(&[
            0x00000013, // nop
        ]),
        Some(image),
    );
    // Interrupts must be globally enabled for the poll to run the claim
    // protocol; nothing needs to be deliverable.
    emu.hart.state.write_mstatus(MSTATUS_MIE, 1);

    let buffer = RAM_BASE + 0x4000;
    emu.hart
        .bus
        .write(DISK_BUFFER_ADDR_LO, buffer, WORD)
        .unwrap();
    emu.hart.bus.write(DISK_BUFFER_LEN_LO, 32, WORD).unwrap();
    emu.hart.bus.write(DISK_SECTOR, 1, WORD).unwrap();
    emu.hart.bus.write(DISK_DIRECTION, 0, WORD).unwrap();
    emu.hart.bus.write(DISK_NOTIFY, 1, WORD).unwrap();

    emu.step().unwrap();

    // The bytes arrived, done was cleared, notify reset to -1, the disk
    // IRQ was claimed, and SEIP latched in mip (nothing was enabled to
    // take it).
    for i in 0..32 {
        assert_eq!(
            emu.hart.bus.read(buffer + i, rv64_vm::bus::BYTE).unwrap(),
            i + 1
        );
    }
    assert_eq!(emu.hart.bus.read(DISK_DONE, WORD).unwrap(), 0);
    assert_eq!(emu.hart.bus.read(DISK_NOTIFY, WORD).unwrap(), u32::MAX as u64);
    assert_eq!(emu.hart.bus.read(PLIC_SCLAIM, WORD).unwrap(), 1);
    assert_ne!(emu.hart.state.read(MIP) & SEIP_BIT, 0);
}

#[test]
fn disk_write_back_reaches_the_image() {
    let mut emu = Emulator::new(
        &program(&[
            0x00000013, // nop
        ]),
        Some(vec![0u8; 1024]),
    );
    emu.hart.state.write_mstatus(MSTATUS_MIE, 1);

    let buffer = RAM_BASE + 0x4000;
    for i in 0..16 {
        emu.hart
            .bus
            .write(buffer + i, 0xa0 + i, rv64_vm::bus::BYTE)
            .unwrap();
    }
    emu.hart
        .bus
        .write(DISK_BUFFER_ADDR_LO, buffer, WORD)
        .unwrap();
    emu.hart.bus.write(DISK_BUFFER_LEN_LO, 16, WORD).unwrap();
    emu.hart.bus.write(DISK_SECTOR, 1, WORD).unwrap();
    emu.hart.bus.write(DISK_DIRECTION, 1, WORD).unwrap();
    emu.hart.bus.write(DISK_NOTIFY, 1, WORD).unwrap();

    emu.step().unwrap();

    let image = emu.hart.bus.disk.image().unwrap();
    for i in 0..16u64 {
        assert_eq!(image[512 + i as usize], 0xa0 + i as u8);
    }
}

#[test]
fn fetch_below_ram_is_a_fatal_access_fault() {
    use rv64_vm::exception::Exception;

    let mut emu = Emulator::new(&program(&[]), None);
    emu.hart.pc = 0;

    assert_eq!(emu.step(), Err(Exception::InstructionAccessFault));
}

#[test]
fn misaligned_pc_is_a_fatal_fetch_fault() {
    use rv64_vm::exception::Exception;

    let mut emu = Emulator::new(&program(&[]), None);
    emu.hart.pc = RAM_BASE + 2;

    assert_eq!(emu.step(), Err(Exception::InstructionAddressMisaligned));
}
