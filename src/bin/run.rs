use ls8_in_rust::{load_file, Cpu};
use std::env;

fn main() {
    env_logger::init();
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: ls8-run <program-file>");
        eprintln!("Example: ls8-run demos/print8.ls8");
        std::process::exit(1);
    }
    let program = match load_file(&args[1]) {
        Ok(program) => program,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };
    let mut cpu = Cpu::new();
    if let Err(e) = cpu.load_program(&program) {
        eprintln!("{e}");
        std::process::exit(1);
    }
    match cpu.run() {
        Ok(()) => {
            for value in &cpu.output {
                println!("{value}");
            }
            println!("halted: HLT");
        }
        Err(e) => {
            eprintln!("execution error: {e}");
            std::process::exit(2);
        }
    }
}
