//! Instruction-level scenarios run through the emulator on literal
//! little-endian machine code.

use rv64_vm::bus::WORD;
use rv64_vm::emu::Emulator;
use rv64_vm::mem::RAM_BASE;

/// Flatten 32-bit instruction words into a little-endian kernel image.
fn program(words: &[u32]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_le_bytes()).collect()
}

#[test]
fn addi_writes_rd_and_advances_pc() {
    let mut emu = Emulator::new(
        &program(&[
            0x02a00093, // addi x1, x0, 42
        ]),
        None,
    );

    emu.step().unwrap();

    assert_eq!(emu.hart.regs.read(1), 42);
    assert_eq!(emu.hart.pc, RAM_BASE + 4);
}

#[test]
fn x0_reads_zero_after_writeback() {
    let mut emu = Emulator::new(
        &program(&[
            0x00500013, // addi x0, x0, 5
        ]),
        None,
    );

    emu.step().unwrap();

    assert_eq!(emu.hart.regs.read(0), 0);
}

#[test]
fn lui_sign_extends_from_bit_31() {
    let mut emu = Emulator::new(
        &program(&[
            0xfffff2b7, // lui x5, 0xfffff
        ]),
        None,
    );

    emu.step().unwrap();

    assert_eq!(emu.hart.regs.read(5), 0xffff_ffff_ffff_f000);
}

#[test]
fn auipc_adds_to_the_instruction_address() {
    let mut emu = Emulator::new(
        &program(&[
            0x00001317, // auipc x6, 0x1
        ]),
        None,
    );

    emu.step().unwrap();

    assert_eq!(emu.hart.regs.read(6), 0x8000_1000);
}

#[test]
fn addiw_sign_extends_the_32_bit_result() {
    let mut emu = Emulator::new(
        &program(&[
            0xfff0009b, // addiw x1, x0, -1
        ]),
        None,
    );

    emu.step().unwrap();

    assert_eq!(emu.hart.regs.read(1), 0xffff_ffff_ffff_ffff);
}

#[test]
fn store_byte_then_load_unsigned_and_signed() {
    let mut emu = Emulator::new(
        &program(&[
            0x0ff00093, // addi x1, x0, 255
            0x00110023, // sb x1, 0(x2)
            0x00014183, // lbu x3, 0(x2)
        ]),
        None,
    );
    emu.hart.regs.write(2, 0x8000_1000);

    emu.run_ticks(3).unwrap();
    assert_eq!(emu.hart.regs.read(3), 255);

    // The same bytes through lb come back sign-extended.
    let mut emu = Emulator::new(
        &program(&[
            0x0ff00093, // addi x1, x0, 255
            0x00110023, // sb x1, 0(x2)
            0x00010183, // lb x3, 0(x2)
        ]),
        None,
    );
    emu.hart.regs.write(2, 0x8000_1000);

    emu.run_ticks(3).unwrap();
    assert_eq!(emu.hart.regs.read(3), 0xffff_ffff_ffff_ffff);
}

#[test]
fn jal_links_and_jumps() {
    let mut emu = Emulator::new(
        &program(&[
            0x008000ef, // jal x1, 8
        ]),
        None,
    );

    emu.step().unwrap();

    assert_eq!(emu.hart.regs.read(1), RAM_BASE + 4);
    assert_eq!(emu.hart.pc, RAM_BASE + 8);
}

#[test]
fn branch_taken_and_not_taken() {
    let mut emu = Emulator::new(
        &program(&[
            0x00208463, // beq x1, x2, 8
        ]),
        None,
    );
    emu.hart.regs.write(1, 7);
    emu.hart.regs.write(2, 7);
    emu.step().unwrap();
    assert_eq!(emu.hart.pc, RAM_BASE + 8);

    let mut emu = Emulator::new(
        &program(&[
            0x00208463, // beq x1, x2, 8
        ]),
        None,
    );
    emu.hart.regs.write(1, 7);
    emu.hart.regs.write(2, 8);
    emu.step().unwrap();
    assert_eq!(emu.hart.pc, RAM_BASE + 4);
}

#[test]
fn amoadd_returns_original_and_stores_sum() {
    let mut emu = Emulator::new(
        &program(&[
            0x0020a1af, // amoadd.w x3, x2, (x1)
        ]),
        None,
    );
    emu.hart.bus.write(0x8000_2000, 5, WORD).unwrap();
    emu.hart.regs.write(1, 0x8000_2000);
    emu.hart.regs.write(2, 7);

    emu.step().unwrap();

    assert_eq!(emu.hart.regs.read(3), 5);
    assert_eq!(emu.hart.bus.read(0x8000_2000, WORD).unwrap(), 12);
}

#[test]
fn misaligned_amo_faults_without_touching_memory() {
    use rv64_vm::exception::Exception;

    let mut emu = Emulator::new(
        &program(&[
            0x0020a1af, // amoadd.w x3, x2, (x1)
        ]),
        None,
    );
    emu.hart.bus.write(0x8000_2000, 5, WORD).unwrap();
    emu.hart.regs.write(1, 0x8000_2001);
    emu.hart.regs.write(2, 7);

    // Misaligned AMOs are in the fatal class, so the step reports the
    // exception after trapping.
    assert_eq!(emu.step(), Err(Exception::LoadAddressMisaligned));
    assert_eq!(emu.hart.bus.read(0x8000_2000, WORD).unwrap(), 5);
}

#[test]
fn division_edge_cases() {
    // div x3, x1, x2 / divu x4, x1, x2 / rem x5, x1, x2
    let image = program(&[
        0x0220c1b3, // div x3, x1, x2
        0x0220d233, // divu x4, x1, x2
        0x0220e2b3, // rem x5, x1, x2
    ]);

    // Division by zero.
    let mut emu = Emulator::new(&image, None);
    emu.hart.regs.write(1, 42);
    emu.hart.regs.write(2, 0);
    emu.run_ticks(3).unwrap();
    assert_eq!(emu.hart.regs.read(3), u64::MAX);
    assert_eq!(emu.hart.regs.read(4), u64::MAX);
    assert_eq!(emu.hart.regs.read(5), 42);

    // Signed overflow: INT_MIN / -1.
    let mut emu = Emulator::new(&image, None);
    emu.hart.regs.write(1, i64::MIN as u64);
    emu.hart.regs.write(2, -1i64 as u64);
    emu.run_ticks(3).unwrap();
    assert_eq!(emu.hart.regs.read(3), i64::MIN as u64);
    assert_eq!(emu.hart.regs.read(5), 0);
}

#[test]
fn high_multiplies() {
    let image = program(&[
        0x022091b3, // mulh x3, x1, x2
        0x0220b233, // mulhu x4, x1, x2
        0x0220a2b3, // mulhsu x5, x1, x2
    ]);

    let mut emu = Emulator::new(&image, None);
    emu.hart.regs.write(1, -1i64 as u64);
    emu.hart.regs.write(2, -1i64 as u64);
    emu.run_ticks(3).unwrap();
    // (-1) * (-1) = 1: the signed high half is zero.
    assert_eq!(emu.hart.regs.read(3), 0);
    // Unsigned, the same bits are 2^64-1 squared.
    assert_eq!(emu.hart.regs.read(4), 0xffff_ffff_ffff_fffe);
    // Signed x unsigned: -1 * (2^64-1).
    assert_eq!(emu.hart.regs.read(5), 0xffff_ffff_ffff_ffff);
}

#[test]
fn unknown_encoding_is_an_illegal_instruction() {
    let mut emu = Emulator::new(&program(&[0xaaaaaaaa]), None);

    // Illegal instruction is not fatal; it traps to the (zeroed) machine
    // vector and records the cause.
    emu.step().unwrap();

    assert_eq!(emu.hart.state.read(rv64_vm::reg::csr::MCAUSE), 2);
    assert_eq!(emu.hart.state.read(rv64_vm::reg::csr::MEPC), RAM_BASE);
}
