#[macro_use]
mod macros;

pub mod ebml;
pub mod error;
pub mod mkv;
mod read;
pub mod resolver;
pub mod sfv;
pub mod srr;
pub mod srs;
mod time_conv;
