//! Parsing, serialization, and construction of TCP headers and options.

mod tcp;
pub use tcp::{Control, OptionKind, SackBlock, TcpHeader, TcpOption};
