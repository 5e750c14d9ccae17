mod field;
mod identity;
mod record;

pub use field::*;
pub use identity::*;
pub use record::*;
