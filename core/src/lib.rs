//! MAT: a bytecode virtual machine for a small dynamically-typed scripting
//! language. Decodes stub records, runs them on a stack interpreter and
//! provides the object model (tagged values, nominal types, closures,
//! interfaces and records) plus the built-in native table.

pub mod bytecode;
pub mod config;
pub mod op;
pub mod util;
pub mod val;
pub mod vm;


pub use config::VmConfig;
pub use val::{ObjectRef, TypeRef, Value};
pub use vm::{FatalError, Host, UnhandledError, Vm};
