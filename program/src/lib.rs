pub mod expression;
pub mod machine;
pub mod program;

pub use crate::expression::*;
pub use crate::machine::Machine;
pub use crate::program::*;
