use super::class_file::Constant;
use super::BinaryName;
use std::fmt::{Display, Formatter, Result as FmtResult};

#[derive(Debug)]
pub enum Error {
    IoError(std::io::Error),

    /// Class file does not start with `0xCAFEBABE`
    BadMagic(u32),

    /// Structurally invalid class file
    Malformed(String),

    /// Constant pool index points at nothing
    MissingConstant(u16),

    /// Constant pool index points at a constant of the wrong kind
    BadConstant { index: u16, expected: &'static str },

    BadDescriptor(String),
    InvalidName(String),

    ConstantPoolOverflow {
        constant: Constant,
        offset: usize,
    },

    /// Re-encoded method body is longer than 65535 bytes
    MethodCodeOverflow(usize),

    /// Opcode that can't be decoded (`jsr` and `ret` fall in here)
    UnsupportedInstruction { opcode: u8, offset: usize },

    /// Error trying to compute frames
    VerifierError {
        item: usize,
        instruction: String,
        kind: VerifierErrorKind,
    },

    /// Two control flow paths reach the same instruction with irreconcilable operand stacks
    IncompatibleFrames { item: usize, details: String },

    MissingClass(BinaryName),
    ClassHierarchyCycle(BinaryName),
}

#[derive(Debug, PartialEq, Eq)]
pub enum VerifierErrorKind {
    EmptyStack,
    InvalidWidth(usize),
    NotArrayType,
    InvalidIndex,
    InvalidType,

    /// Control falls off the end of the code
    FallsOffEnd,
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::IoError(err)
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Error::IoError(err) => write!(f, "I/O error: {}", err),
            Error::BadMagic(magic) => write!(f, "bad class file magic {:#010x}", magic),
            Error::Malformed(msg) => write!(f, "malformed class file: {}", msg),
            Error::MissingConstant(index) => write!(f, "missing constant #{}", index),
            Error::BadConstant { index, expected } => {
                write!(f, "constant #{} should be a {}", index, expected)
            }
            Error::BadDescriptor(msg) => write!(f, "bad descriptor {}", msg),
            Error::InvalidName(msg) => write!(f, "invalid name: {}", msg),
            Error::ConstantPoolOverflow { constant, offset } => write!(
                f,
                "constant pool is full (adding {:?} at #{})",
                constant, offset
            ),
            Error::MethodCodeOverflow(len) => {
                write!(f, "method body is {} bytes long (max 65535)", len)
            }
            Error::UnsupportedInstruction { opcode, offset } => {
                write!(f, "unsupported opcode {:#04x} at {}", opcode, offset)
            }
            Error::VerifierError {
                item,
                instruction,
                kind,
            } => write!(
                f,
                "cannot type instruction {} ({}): {:?}",
                item, instruction, kind
            ),
            Error::IncompatibleFrames { item, details } => {
                write!(f, "incompatible frames at instruction {}: {}", item, details)
            }
            Error::MissingClass(name) => write!(f, "class {} could not be found", name),
            Error::ClassHierarchyCycle(name) => {
                write!(f, "class {} is its own superclass", name)
            }
        }
    }
}

impl std::error::Error for Error {}
