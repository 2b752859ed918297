mod attribute;
mod class;
mod constants;
mod field;
mod method;
mod parse;
mod pool;
mod serialize;
mod version;

pub use attribute::*;
pub use class::*;
pub use constants::*;
pub use field::*;
pub use method::*;
pub use parse::*;
pub use pool::*;
pub use serialize::*;
pub use version::*;
