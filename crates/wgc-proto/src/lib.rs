//! Wire protocol for the wgconnect tunnel info exchange.
//!
//! Messages carry an ordered list of typed options. Each option is framed as
//! `code: u32 | length: u32 | value`, and the list is closed by the reserved
//! end-of-options code [`OPTION_EOF`].
//!
//! Two envelope shapes exist, one per address family:
//!
//! - [`V4Message`]: a request/response envelope with a fixed 24-byte header,
//!   a magic cookie, and the message type carried as an option.
//! - [`V6Message`]: a compact envelope with the message type and a 24-bit
//!   transaction id in a 4-byte header.
//!
//! The [`registry`] module maps `(code, family)` pairs to value kinds and is
//! the single source of truth for which codes each family understands.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod codes;
pub mod error;
pub mod family;
pub mod message;
pub mod option;
pub mod registry;
pub mod v4;
pub mod v6;

pub use codes::*;
pub use error::{ProtoError, Result};
pub use family::AddressFamily;
pub use message::{MessageSender, OptionList};
pub use option::{OptionKind, OptionValue, TunnelOption};
pub use registry::OptionSpec;
pub use v4::{Operation, V4Message, V4MessageType};
pub use v6::{V6Message, V6MessageType};
