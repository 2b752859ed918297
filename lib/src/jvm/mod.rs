//! Read, rewrite, and write JVM classes
//!
//! A class file is parsed into a [`class_file::ClassFile`], whose constant pool can be turned into
//! an append-only [`class_file::ConstantsPool`]. Method bodies are decoded into a
//! [`code::MethodCode`]: a flat stream of labels, line numbers, and instructions whose operands
//! refer to classes, fields, and methods by name instead of by constant pool index. After the
//! stream has been edited, it gets re-encoded with freshly computed maximums and stack map frames.
//!
//! ```
//! use jvmhook::jvm::class_file::{ClassFile, Version};
//! use jvmhook::jvm::*;
//!
//! # fn rewrite(bytes: &[u8]) -> Result<(), Error> {
//! let class_file = ClassFile::parse(bytes)?;
//! let name: BinaryName = class_file.class_name()?;
//! if class_file.version >= Version::JAVA6 {
//!     log::info!("{:?} carries stack map frames", name);
//! }
//! let unchanged: Vec<u8> = class_file.to_bytes()?;
//! # assert_eq!(unchanged.len(), bytes.len());
//! # Ok(())
//! # }
//! ```

mod access_flags;
pub mod class_file;
pub mod class_graph;
pub mod code;
mod descriptors;
mod errors;
mod names;
pub mod verifier;

pub use access_flags::*;
pub use descriptors::*;
pub use errors::*;
pub use names::*;
