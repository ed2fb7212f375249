use crate::machine::Instruction;
use crate::opcodes::*;

/// Render a program image as one mnemonic per line. Register operands
/// print as `R<n>`, LDI's immediate as a decimal literal; bytes without a
/// registered handler print raw and advance by one.
pub fn disassemble(code: &[u8]) -> Vec<String> {
    let mut out = Vec::new();
    let mut pc = 0usize;
    while pc < code.len() {
        let op = code[pc];
        let a = code.get(pc + 1).copied().unwrap_or(0);
        let b = code.get(pc + 2).copied().unwrap_or(0);
        let line = match op {
            HLT | RET => format!("{:02x}: {}", pc, name(op)),
            LDI => format!("{:02x}: LDI R{},{}", pc, a & 0x07, b),
            ADD | MUL => format!("{:02x}: {} R{},R{}", pc, name(op), a & 0x07, b & 0x07),
            PRN | PUSH | POP | CALL => format!("{:02x}: {} R{}", pc, name(op), a & 0x07),
            _ => format!("{:02x}: 0x{:02x}", pc, op),
        };
        out.push(line);
        pc += match Instruction::decode(op) {
            Some(_) => operand_count(op) + 1,
            None => 1,
        };
    }
    out
}
