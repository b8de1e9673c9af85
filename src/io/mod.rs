//! Model I/O
//!
//! Byte-level loading is pure ([`reader::load_model_from_bytes`]); the file
//! helpers here are the thin shell around it. Saving is atomic from the
//! caller's point of view.

pub mod reader;
pub mod writer;

pub use reader::{load_model, load_model_from_bytes};
pub use writer::{model_to_bytes, save_bytes_atomic, save_model};
