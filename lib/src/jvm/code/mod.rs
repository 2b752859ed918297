//! Bytecode representation, decoding, and encoding
//!
//! ### Structure
//!
//! Despite being pushed off into [just another method attribute](crate::jvm::class_file::Code),
//! the bytecode is arguably the most important part of the class file - it contains the actual
//! executable instructions. We split up the [list of bytecode instructions][0] into two groups:
//!
//!   - [`Instruction`] for straight-line instructions
//!   - [`BranchInstruction`] for instructions that may jump somewhere or end control flow
//!
//! A decoded method body is a [`MethodCode`]: a flat sequence of [`CodeItem`]s in which jump
//! targets, exception ranges, and local variable ranges are all expressed as [`SynLabel`]s
//! rather than bytecode offsets. That makes it possible to splice new items anywhere without
//! having to fix up offsets by hand.
//!
//! ### Encoding
//!
//! [`MethodCode::encode`] turns the items back into a `Code` attribute. This is where the hard
//! work happens: frames are inferred (see [`crate::jvm::verifier`]), oversized jumps are widened,
//! unreachable code gets neutralized, and `StackMapTable`, `LineNumberTable`, and
//! `LocalVariableTable` attributes are regenerated to match the new offsets.
//!
//! [0]: https://docs.oracle.com/javase/specs/jvms/se18/html/jvms-6.html#jvms-6.5

mod decode;
mod encode;
mod instruction;
mod jump_encoding;
mod label;
mod operands;

pub use encode::*;
pub use instruction::*;
pub use label::*;
pub use operands::*;

use crate::jvm::class_file::Utf8ConstantIndex;
use crate::jvm::BinaryName;
use std::collections::HashMap;

/// One element of a decoded method body
#[derive(Clone, Debug, PartialEq)]
pub enum CodeItem {
    /// Marks the position of the next instruction
    Label(SynLabel),

    /// Source line of the instructions that follow
    LineNumber(u16),

    Instruction(SymInstruction),
    Branch(BranchInstruction<SynLabel>),
}

/// Entry in the exception table
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TryCatchBlock {
    /// Start of the protected range (inclusive)
    pub start: SynLabel,

    /// End of the protected range (exclusive)
    pub end: SynLabel,

    pub handler: SynLabel,

    /// Class of exceptions caught (`None` catches everything)
    pub catch_type: Option<BinaryName>,
}

/// Entry in a `LocalVariableTable` or `LocalVariableTypeTable`
///
/// Names and descriptors stay as indices into the original constant pool, which is kept intact
/// when the class is rewritten.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalVariableRange {
    pub start: SynLabel,
    pub end: SynLabel,
    pub name_index: Utf8ConstantIndex,

    /// Field descriptor (or signature, for a `LocalVariableTypeTable` entry)
    pub descriptor_index: Utf8ConstantIndex,
    pub index: u16,
    pub is_type_table: bool,
}

/// Method body as a flat stream of labels and instructions
#[derive(Clone, Debug, Default)]
pub struct MethodCode {
    pub items: Vec<CodeItem>,
    pub exception_handlers: Vec<TryCatchBlock>,
    pub local_variables: Vec<LocalVariableRange>,

    /// Generator for labels that don't clash with any label already in the method
    pub labels: SynLabelGenerator,
}

impl MethodCode {
    pub fn new() -> MethodCode {
        MethodCode::default()
    }

    /// Get a label that is not used anywhere else in the method
    pub fn fresh_label(&mut self) -> SynLabel {
        self.labels.fresh_label()
    }

    /// Position in `items` of every label
    pub fn label_positions(&self) -> HashMap<SynLabel, usize> {
        self.items
            .iter()
            .enumerate()
            .filter_map(|(position, item)| match item {
                CodeItem::Label(label) => Some((*label, position)),
                _ => None,
            })
            .collect()
    }
}
