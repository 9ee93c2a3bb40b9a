//! Small adapters controlling how domain types are rendered in `tracing`
//! fields and `Debug` output.

pub mod debug;
