//! Extractor/transcoder subprocess client (component B, spec §4.2).

mod args;
mod client;
mod process;
mod stderr;

pub use args::mime_for_ext;
pub use client::{Extractor, StreamHandle};
