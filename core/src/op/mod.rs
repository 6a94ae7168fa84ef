//! Operator ids and their dispatch over value kinds.

mod ops;


pub use ops::{AssignOp, Operator};
