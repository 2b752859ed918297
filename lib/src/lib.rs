//! Splice reflective interface hooks into compiled JVM classes
//!
//! The crate is split in two layers:
//!
//!   - [`jvm`] reads and writes class files, decodes method bodies into a label-based instruction
//!     stream, and re-encodes them with freshly computed stack map frames
//!   - [`hook`] is the rewriting engine built on top: it adds a pair of synthetic static fields to
//!     a target class, resolves an external interface and its method into those fields from the
//!     static initializer, and injects `isInstance`/`Method.invoke` sequences into selected
//!     methods
//!
//! A typical use goes through [`hook::Transformer`], which maps class names to [`hook::HookSpec`]s
//! and returns the input bytes untouched for every class it has no hook for.

pub mod hook;
pub mod jvm;
mod util;
