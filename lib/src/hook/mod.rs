//! Splicing reflective interface calls into target classes
//!
//! ### Overview
//!
//! A [`HookSpec`] names an external interface method and the methods of a target class that
//! should defer to it. Rewriting a target class with [`patch_class`] (or, more conveniently,
//! through a [`Transformer`]):
//!
//!   - adds two `private static final` fields holding the interface `Class` and its reflective
//!     `Method` (see [`fields`])
//!   - prefixes (or creates) the static initializer with code that resolves both through a
//!     [`LoaderSource`] (see [`clinit`])
//!   - runs every target method through a small state machine looking for its trigger, and
//!     splices the hook in where it matches (see [`patcher`] and [`emitter`])
//!
//! The interface is never loaded at rewrite time: all references to it go through reflection,
//! and an object that doesn't implement it follows the original code path.
//!
//! ### Trigger shapes
//!
//! | Shape          | Fires                                   | Result of the interface call      |
//! |----------------|-----------------------------------------|-----------------------------------|
//! | `Entry`        | at method entry                         | returned                          |
//! | `EntrySelect`  | at method entry                         | picks one of two static fields    |
//! | `CallBranch`   | at the target of the jump after a call  | returned                          |
//! | `CallResult`   | right after the call result is stored   | stored over the call result       |
//! | `Aggregate`    | right after the call result is stored   | chunks concatenated and returned  |
//! | `Cache`        | right after the call result is stored   | cached in a reference and returned|
//!
//! A method whose body doesn't contain the trigger is left exactly as it was.

pub mod clinit;
pub mod emitter;
mod errors;
pub mod fields;
pub mod marshal;
pub mod patcher;
mod settings;
mod spec;
mod transform;

pub use clinit::LoaderSource;
pub use errors::*;
pub use settings::*;
pub use spec::*;
pub use transform::*;
