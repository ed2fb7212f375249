use thiserror::Error;

use crate::opcodes::*;

pub const MEM_SIZE: usize = 256;
pub const NUM_REGISTERS: usize = 8;

/// Register index reserved for the stack pointer.
pub const SP: usize = 7;

/// Stack pointer value of a fresh machine. The stack grows downward from
/// here; SP equal to this value means the stack is empty.
pub const STACK_INIT: u8 = 0xF4;

#[derive(Debug, Error)]
pub enum CpuError {
    #[error("invalid memory address {0}")]
    InvalidAddress(usize),
    #[error("pop from empty stack")]
    StackEmpty,
    #[error("unsupported ALU operation 0x{0:02x}")]
    UnsupportedAluOp(u8),
    #[error("unrecognized instruction 0x{opcode:02x} at address {addr}")]
    UnrecognizedInstruction { opcode: u8, addr: usize },
}

/// Decoded instruction kind; the machine's dispatch table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    Hlt,
    Ldi,
    Prn,
    Add,
    Mul,
    Push,
    Pop,
    Call,
    Ret,
}

impl Instruction {
    pub fn decode(opcode: u8) -> Option<Self> {
        match opcode {
            HLT => Some(Self::Hlt),
            LDI => Some(Self::Ldi),
            PRN => Some(Self::Prn),
            ADD => Some(Self::Add),
            MUL => Some(Self::Mul),
            PUSH => Some(Self::Push),
            POP => Some(Self::Pop),
            CALL => Some(Self::Call),
            RET => Some(Self::Ret),
            _ => None,
        }
    }
}

/// The LS-8 machine: 256 bytes of flat memory, eight 8-bit registers
/// (R7 is the stack pointer), a program counter, and a halted flag.
///
/// Registers are a byte wide, matching the memory cells; ADD and MUL wrap
/// mod 256. PRN values are collected into `output` rather than printed
/// here, so the core stays free of I/O.
#[derive(Debug, Clone)]
pub struct Cpu {
    pub pc: usize,
    pub registers: [u8; NUM_REGISTERS],
    pub ram: [u8; MEM_SIZE],
    pub halted: bool,
    pub output: Vec<u8>,
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

impl Cpu {
    pub fn new() -> Self {
        let mut registers = [0u8; NUM_REGISTERS];
        registers[SP] = STACK_INIT;
        Self {
            pc: 0,
            registers,
            ram: [0u8; MEM_SIZE],
            halted: false,
            output: Vec::new(),
        }
    }

    /// Copy a program image into memory starting at address 0.
    pub fn load_program(&mut self, program: &[u8]) -> Result<(), CpuError> {
        if program.len() > MEM_SIZE {
            return Err(CpuError::InvalidAddress(MEM_SIZE));
        }
        self.ram[..program.len()].copy_from_slice(program);
        Ok(())
    }

    /// Run the fetch-decode-execute loop until HLT or a fatal fault.
    pub fn run(&mut self) -> Result<(), CpuError> {
        while !self.halted {
            self.step()?;
        }
        Ok(())
    }

    /// Execute one cycle. An unrecognized opcode halts the machine and is
    /// returned as the diagnostic; recoverable faults (bad addresses,
    /// popping an empty stack) are logged and execution continues.
    pub fn step(&mut self) -> Result<(), CpuError> {
        let opcode = self.fetch(self.pc);
        // Operands are prefetched unconditionally; instructions that take
        // fewer than two simply ignore the rest.
        let operand1 = self.fetch(self.pc + 1);
        let operand2 = self.fetch(self.pc + 2);

        let Some(instr) = Instruction::decode(opcode) else {
            self.halted = true;
            return Err(CpuError::UnrecognizedInstruction {
                opcode,
                addr: self.pc,
            });
        };

        match instr {
            Instruction::Hlt => self.halted = true,
            Instruction::Ldi => self.registers[reg(operand1)] = operand2,
            Instruction::Prn => self.output.push(self.registers[reg(operand1)]),
            Instruction::Add => self.alu(ADD, operand1, operand2)?,
            Instruction::Mul => self.alu(MUL, operand1, operand2)?,
            Instruction::Push => self.push(self.registers[reg(operand1)]),
            Instruction::Pop => self.pop(operand1),
            Instruction::Call => self.call(operand1),
            Instruction::Ret => self.ret(),
        }

        // CALL and RET place the next PC themselves; everything else skips
        // the opcode plus its encoded operand count.
        if !matches!(instr, Instruction::Call | Instruction::Ret) {
            self.pc += operand_count(opcode) + 1;
        }
        Ok(())
    }

    pub fn ram_read(&self, addr: usize) -> Result<u8, CpuError> {
        self.ram
            .get(addr)
            .copied()
            .ok_or(CpuError::InvalidAddress(addr))
    }

    pub fn ram_write(&mut self, addr: usize, value: u8) -> Result<(), CpuError> {
        match self.ram.get_mut(addr) {
            Some(cell) => {
                *cell = value;
                Ok(())
            }
            None => Err(CpuError::InvalidAddress(addr)),
        }
    }

    fn alu(&mut self, op: u8, reg_a: u8, reg_b: u8) -> Result<(), CpuError> {
        let (a, b) = (reg(reg_a), reg(reg_b));
        match op {
            ADD => self.registers[a] = self.registers[a].wrapping_add(self.registers[b]),
            MUL => self.registers[a] = self.registers[a].wrapping_mul(self.registers[b]),
            _ => return Err(CpuError::UnsupportedAluOp(op)),
        }
        Ok(())
    }

    // Recoverable read: a fetch past the top of memory is reported and
    // degrades to zero so the cycle can continue.
    fn fetch(&self, addr: usize) -> u8 {
        match self.ram_read(addr) {
            Ok(byte) => byte,
            Err(err) => {
                log::warn!("{err}");
                0
            }
        }
    }

    // Recoverable write counterpart of `fetch`.
    fn store(&mut self, addr: usize, value: u8) {
        if let Err(err) = self.ram_write(addr, value) {
            log::warn!("{err}");
        }
    }

    fn push(&mut self, value: u8) {
        self.registers[SP] = self.registers[SP].wrapping_sub(1);
        self.store(self.registers[SP] as usize, value);
    }

    fn pop(&mut self, reg_a: u8) {
        if self.registers[SP] == STACK_INIT {
            log::warn!("{}", CpuError::StackEmpty);
            return;
        }
        self.registers[reg(reg_a)] = self.fetch(self.registers[SP] as usize);
        self.registers[SP] = self.registers[SP].wrapping_add(1);
    }

    fn call(&mut self, reg_a: u8) {
        self.registers[SP] = self.registers[SP].wrapping_sub(1);
        self.store(self.registers[SP] as usize, (self.pc + 2) as u8);
        self.pc = self.registers[reg(reg_a)] as usize;
    }

    fn ret(&mut self) {
        self.pc = self.fetch(self.registers[SP] as usize) as usize;
        self.registers[SP] = self.registers[SP].wrapping_add(1);
    }

    /// One-line snapshot of the cycle about to execute: the PC, the three
    /// bytes at the PC, and the register file, all in hex.
    pub fn trace(&self) -> String {
        let mut line = format!(
            "TRACE: {:02X} | {:02X} {:02X} {:02X} |",
            self.pc,
            self.ram_read(self.pc).unwrap_or(0),
            self.ram_read(self.pc + 1).unwrap_or(0),
            self.ram_read(self.pc + 2).unwrap_or(0),
        );
        for value in &self.registers {
            line.push_str(&format!(" {value:02X}"));
        }
        line
    }
}

// Register operands use only the low three bits of the byte.
fn reg(operand: u8) -> usize {
    (operand & 0x07) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_program(program: &[u8]) -> Cpu {
        let mut cpu = Cpu::new();
        cpu.load_program(program).unwrap();
        cpu.run().unwrap();
        cpu
    }

    #[test]
    fn ldi_then_prn_reproduces_immediate() {
        // LDI R0,8; PRN R0; HLT
        let cpu = run_program(&[LDI, 0, 8, PRN, 0, HLT]);
        assert_eq!(cpu.output, vec![8]);
    }

    #[test]
    fn add_wraps_and_leaves_reg_b_unchanged() {
        // LDI R0,200; LDI R1,100; ADD R0,R1; HLT
        let cpu = run_program(&[LDI, 0, 200, LDI, 1, 100, ADD, 0, 1, HLT]);
        assert_eq!(cpu.registers[0], 44); // 300 mod 256
        assert_eq!(cpu.registers[1], 100);
    }

    #[test]
    fn mul_wraps_and_leaves_reg_b_unchanged() {
        // LDI R0,16; LDI R1,16; MUL R0,R1; HLT
        let cpu = run_program(&[LDI, 0, 16, LDI, 1, 16, MUL, 0, 1, HLT]);
        assert_eq!(cpu.registers[0], 0); // 256 mod 256
        assert_eq!(cpu.registers[1], 16);
    }

    #[test]
    fn mul_program_prints_72() {
        // LDI R0,8; LDI R1,9; MUL R0,R1; PRN R0; HLT
        let cpu = run_program(&[LDI, 0, 8, LDI, 1, 9, MUL, 0, 1, PRN, 0, HLT]);
        assert_eq!(cpu.output, vec![72]);
        assert!(cpu.halted);
    }

    #[test]
    fn push_then_pop_round_trips_value_and_stack_pointer() {
        // LDI R0,5; PUSH R0; LDI R0,0; POP R0; PRN R0; HLT
        let cpu = run_program(&[LDI, 0, 5, PUSH, 0, LDI, 0, 0, POP, 0, PRN, 0, HLT]);
        assert_eq!(cpu.output, vec![5]);
        assert_eq!(cpu.registers[0], 5);
        assert_eq!(cpu.registers[SP], STACK_INIT);
    }

    #[test]
    fn pop_on_empty_stack_is_a_reported_noop() {
        // POP R3; HLT
        let cpu = run_program(&[POP, 3, HLT]);
        assert_eq!(cpu.registers[3], 0);
        assert_eq!(cpu.registers[SP], STACK_INIT);
    }

    #[test]
    fn push_writes_below_initial_stack_pointer() {
        // LDI R0,99; PUSH R0; HLT
        let cpu = run_program(&[LDI, 0, 99, PUSH, 0, HLT]);
        assert_eq!(cpu.registers[SP], STACK_INIT - 1);
        assert_eq!(cpu.ram[(STACK_INIT - 1) as usize], 99);
    }

    #[test]
    fn call_resumes_after_the_call_operands() {
        // 0: LDI R1,9; 3: CALL R1; 5: LDI R0,0; 8: HLT
        // 9: LDI R0,42; 12: PRN R0; 14: RET
        let cpu = run_program(&[
            LDI, 1, 9, CALL, 1, LDI, 0, 0, HLT, LDI, 0, 42, PRN, 0, RET,
        ]);
        assert_eq!(cpu.output, vec![42]);
        assert_eq!(cpu.registers[0], 0); // caller ran after the return
        assert_eq!(cpu.registers[SP], STACK_INIT);
    }

    #[test]
    fn nested_calls_unwind_in_order() {
        // 0:  LDI R1,12; 3: LDI R2,20; 6: CALL R1; 8: LDI R3,9; 11: HLT
        // 12: CALL R2; 14: LDI R4,3; 17: PRN R4; 19: RET
        // 20: LDI R5,7; 23: PRN R5; 25: RET
        let cpu = run_program(&[
            LDI, 1, 12, LDI, 2, 20, CALL, 1, LDI, 3, 9, HLT, CALL, 2, LDI, 4, 3, PRN, 4, RET,
            LDI, 5, 7, PRN, 5, RET,
        ]);
        assert_eq!(cpu.output, vec![7, 3]);
        assert_eq!(cpu.registers[3], 9); // outer caller resumed and halted
        assert_eq!(cpu.registers[SP], STACK_INIT);
    }

    #[test]
    fn unrecognized_opcode_halts_with_diagnostic() {
        let mut cpu = Cpu::new();
        cpu.load_program(&[0xFF]).unwrap();
        let err = cpu.run().unwrap_err();
        assert!(matches!(
            err,
            CpuError::UnrecognizedInstruction {
                opcode: 0xFF,
                addr: 0
            }
        ));
        assert!(cpu.halted);
        assert_eq!(cpu.pc, 0); // no advance past the fault
    }

    #[test]
    fn operand_prefetch_past_top_of_memory_does_not_crash() {
        // HLT at the last cell; its operand prefetch reads past address 255.
        let mut image = vec![LDI, 0, 255, CALL, 0];
        image.resize(MEM_SIZE, 0);
        image[MEM_SIZE - 1] = HLT;
        let mut cpu = Cpu::new();
        cpu.load_program(&image).unwrap();
        cpu.run().unwrap();
        assert!(cpu.halted);
    }

    #[test]
    fn oversized_image_is_rejected() {
        let mut cpu = Cpu::new();
        let err = cpu.load_program(&[0u8; MEM_SIZE + 1]).unwrap_err();
        assert!(matches!(err, CpuError::InvalidAddress(_)));
    }

    #[test]
    fn alu_rejects_unknown_operation() {
        let mut cpu = Cpu::new();
        let err = cpu.alu(HLT, 0, 1).unwrap_err();
        assert!(matches!(err, CpuError::UnsupportedAluOp(_)));
    }

    #[test]
    fn trace_formats_pc_window_and_registers() {
        let mut cpu = Cpu::new();
        cpu.load_program(&[LDI, 0, 8]).unwrap();
        let line = cpu.trace();
        assert!(line.starts_with("TRACE: 00 | 82 00 08 |"), "line={line}");
        assert!(line.ends_with("F4"), "line={line}");
    }
}
