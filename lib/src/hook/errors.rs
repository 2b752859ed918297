use crate::jvm;
use crate::jvm::class_file::ConstantPoolOverflow;
use std::fmt::{Display, Formatter, Result as FmtResult};

#[derive(Debug)]
pub enum Error {
    /// Reading or writing the class failed
    ClassFile(jvm::Error),

    /// Hook spec that can't be applied to any class (bad names, mismatched arguments)
    InvalidHookSpec(String),

    /// Hook spec is fine, but the class it names can't carry it
    UnsupportedTarget(String),
}

impl From<jvm::Error> for Error {
    fn from(err: jvm::Error) -> Error {
        Error::ClassFile(err)
    }
}

impl From<ConstantPoolOverflow> for Error {
    fn from(overflow: ConstantPoolOverflow) -> Error {
        Error::ClassFile(jvm::Error::from(overflow))
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Error::ClassFile(err) => err.fmt(f),
            Error::InvalidHookSpec(msg) => write!(f, "invalid hook spec: {}", msg),
            Error::UnsupportedTarget(msg) => write!(f, "unsupported target: {}", msg),
        }
    }
}

impl std::error::Error for Error {}
