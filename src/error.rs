//! Error types for the resolver.

use std::io;
use std::time::Duration;

use thiserror::Error;

/// Errors produced while decoding, encoding or forwarding DNS messages.
#[derive(Debug, Error)]
pub enum Error {
    #[error("message ended before all sections were read")]
    TruncatedMessage,

    #[error("malformed domain name at offset {offset}")]
    MalformedName { offset: usize },

    #[error("rdata of type {rtype} does not fit its length at offset {offset}")]
    MalformedRdata { rtype: u16, offset: usize },

    #[error("label of {0} bytes exceeds the 63 byte limit")]
    LabelTooLong(usize),

    #[error("domain name exceeds the 255 byte limit")]
    NameTooLong,

    #[error("rdata of {0} bytes does not fit a 16-bit length")]
    RdataTooLong(usize),

    #[error("section has more than 65535 entries")]
    TooManyEntries,

    #[error("upstream did not answer within {0:?}")]
    UpstreamTimeout(Duration),

    #[error("upstream reply id {got:#06x} does not match request id {expected:#06x}")]
    UnexpectedReply { expected: u16, got: u16 },

    #[error("upstream unreachable: {0}")]
    UpstreamUnreachable(#[source] io::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Whether the error came from decoding an invalid message.
    ///
    /// The encode-side limits (`LabelTooLong`, `NameTooLong`,
    /// `RdataTooLong`, `TooManyEntries`) are not part of this group.
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            Error::TruncatedMessage | Error::MalformedName { .. } | Error::MalformedRdata { .. }
        )
    }

    /// Whether the error came from the upstream round-trip.
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            Error::UpstreamTimeout(_) | Error::UnexpectedReply { .. } | Error::UpstreamUnreachable(_)
        )
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;
