use std::fs;
use std::io;
use std::path::Path;

use thiserror::Error;

use crate::machine::MEM_SIZE;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("program not found: {path}")]
    ProgramNotFound {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("invalid instruction literal {literal:?} on line {line}")]
    BadLiteral { line: usize, literal: String },
    #[error("program is {0} bytes but memory holds only {max}", max = MEM_SIZE)]
    TooLong(usize),
}

/// Parse the textual program format: one instruction byte per line as a
/// binary literal, with `#` comments; blank and comment-only lines are
/// skipped.
pub fn parse_program(source: &str) -> Result<Vec<u8>, LoadError> {
    let mut program = Vec::new();
    for (idx, raw) in source.lines().enumerate() {
        let payload = raw.split('#').next().unwrap_or("").trim();
        if payload.is_empty() {
            continue;
        }
        let byte = u8::from_str_radix(payload, 2).map_err(|_| LoadError::BadLiteral {
            line: idx + 1,
            literal: payload.to_string(),
        })?;
        program.push(byte);
    }
    if program.len() > MEM_SIZE {
        return Err(LoadError::TooLong(program.len()));
    }
    Ok(program)
}

/// Read a program file and parse it into a byte image.
pub fn load_file(path: impl AsRef<Path>) -> Result<Vec<u8>, LoadError> {
    let path = path.as_ref();
    let source = fs::read_to_string(path).map_err(|source| LoadError::ProgramNotFound {
        path: path.display().to_string(),
        source,
    })?;
    parse_program(&source)
}
