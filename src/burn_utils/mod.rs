pub mod avoid_overflow;
pub mod distribution;
pub mod rand;
pub mod sequence;
pub mod tensor;
pub use avoid_overflow::*;
pub use sequence::*;
