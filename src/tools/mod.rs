//! Built-in tool implementations that ship with the crate (spec §6.3).

pub mod memory;
