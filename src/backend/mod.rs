//! Mug compiler backend
//!
//! Lowers checked units into an in-memory module that stands in for the native code generator:
//!
//! - `module` - the backend module: struct types, globals, functions, basic blocks, textual IR
//! - `emitter` - stack-discipline instruction builder for one function
//! - `local` - function body generation (statements and expressions)
//! - `irgen` - the phased whole-unit walk and the compilation [`Session`](irgen::Session)
//! - `toolchain` - the external C compiler and linker

pub mod emitter;
pub mod irgen;
pub mod local;
pub mod module;
pub mod toolchain;

pub use irgen::{IRGenerator, Session, UnitRole};
pub use module::BackendModule;
