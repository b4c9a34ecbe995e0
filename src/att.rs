//! Attribute Protocol ([Vol 3] Part F).

pub use {consts::*, handle::*};

mod consts;
mod handle;

/// `ATT_ERROR_RSP` parameters ([Vol 3] Part F, Section 3.4.1.1).
///
/// `req` is the raw request opcode, which may be one the server does not
/// recognize. `hdl` is the raw handle, zero when the error is not
/// handle-specific.
#[derive(Clone, Copy, Debug, Eq, PartialEq, thiserror::Error)]
#[error("ATT request {req:#04X} for handle {hdl:#06X} failed with {err}")]
pub struct ErrorRsp {
    pub req: u8,
    pub hdl: u16,
    pub err: ErrorCode,
}

impl ErrorRsp {
    #[inline]
    #[must_use]
    pub const fn new(req: u8, hdl: u16, err: ErrorCode) -> Self {
        Self { req, hdl, err }
    }
}

/// Result of a server-side request handler.
pub type RspResult<T> = std::result::Result<T, ErrorRsp>;
