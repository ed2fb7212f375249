use clap::{Parser, Subcommand};
use ls8_in_rust::opcodes::{is_alu, name};
use ls8_in_rust::{disasm, load_file, Cpu, SP};
use serde::Serialize;

#[derive(Debug, Parser)]
#[command(name = "ls8", about = "Educational LS-8 CPU CLI")]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Debug, Subcommand)]
enum Cmd {
    /// Run an LS-8 program
    Run {
        /// Program file in the binary-literal text format
        program: String,
        /// Print the register file after the run
        #[arg(long)]
        dump_registers: bool,
        /// Dump final machine state as JSON to stdout or to a file path
        #[arg(long)]
        dump_state: Option<Option<String>>,
    },
    /// Disassemble a program
    Disasm {
        /// Program file in the binary-literal text format
        program: String,
    },
    /// Step-through trace
    Trace {
        /// Program file in the binary-literal text format
        program: String,
        /// Max steps
        #[arg(long, default_value_t = 10_000)]
        max_steps: usize,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    match cli.cmd {
        Cmd::Run {
            program,
            dump_registers,
            dump_state,
        } => run_cmd(&program, dump_registers, dump_state),
        Cmd::Disasm { program } => disasm_cmd(&program),
        Cmd::Trace { program, max_steps } => trace_cmd(&program, max_steps),
    }
}

fn run_cmd(program_path: &str, dump_registers: bool, dump_state: Option<Option<String>>) {
    let mut cpu = load_into_cpu(program_path);
    match cpu.run() {
        Ok(()) => {
            for value in &cpu.output {
                println!("{value}");
            }
            println!("halted: HLT");
            if dump_registers {
                for (i, value) in cpu.registers.iter().enumerate() {
                    println!("R{i} = 0x{value:02x}");
                }
            }
            if let Some(target) = dump_state {
                let json = state_to_json(&cpu);
                match target {
                    Some(path) => std::fs::write(&path, json)
                        .unwrap_or_else(|e| die(&format!("write state: {e}"))),
                    None => println!("{json}"),
                }
            }
        }
        Err(e) => die(&format!("execution error: {e}")),
    }
}

fn disasm_cmd(program_path: &str) {
    let program = load_file(program_path).unwrap_or_else(|e| die(&e.to_string()));
    for line in disasm::disassemble(&program) {
        println!("{line}");
    }
}

fn trace_cmd(program_path: &str, max_steps: usize) {
    let mut cpu = load_into_cpu(program_path);
    let mut steps = 0usize;
    let mut printed = 0usize;
    loop {
        if cpu.halted || steps >= max_steps {
            let status = if cpu.halted { "HLT" } else { "MAX-STEPS" };
            println!("-- halt: {status} --");
            break;
        }
        let op = cpu.ram_read(cpu.pc).unwrap_or(0);
        let class = if is_alu(op) { " [alu]" } else { "" };
        println!("{} {}{}", cpu.trace(), name(op), class);
        if let Err(e) = cpu.step() {
            die(&format!("step error: {e}"));
        }
        for value in &cpu.output[printed..] {
            println!("{value}");
        }
        printed = cpu.output.len();
        steps += 1;
    }
}

fn load_into_cpu(program_path: &str) -> Cpu {
    let program = load_file(program_path).unwrap_or_else(|e| die(&e.to_string()));
    let mut cpu = Cpu::new();
    if let Err(e) = cpu.load_program(&program) {
        die(&e.to_string());
    }
    cpu
}

#[derive(Serialize)]
struct StateDump {
    pc: usize,
    halted: bool,
    sp: u8,
    registers: Vec<u8>,
    output: Vec<u8>,
}

fn state_to_json(cpu: &Cpu) -> String {
    let dump = StateDump {
        pc: cpu.pc,
        halted: cpu.halted,
        sp: cpu.registers[SP],
        registers: cpu.registers.to_vec(),
        output: cpu.output.clone(),
    };
    serde_json::to_string_pretty(&dump).unwrap()
}

fn die(msg: &str) -> ! {
    eprintln!("{}", msg);
    std::process::exit(1);
}
