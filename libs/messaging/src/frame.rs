//! Wire Framing
//!
//! Each transmitted unit is `[handle: i64 LE][payload]`. The payload belongs
//! to the object kind and is never inspected here.
//!
//! ## Invariants
//! - Decoding never panics; short or corrupt frames produce [`FrameError`].
//! - The payload returned by [`decode`] is a zero-copy slice of the frame.

use crate::handle::ObjectHandle;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Width of the handle prefix
pub const HANDLE_PREFIX_LEN: usize = ObjectHandle::WIRE_SIZE;

/// Reasons a received frame cannot be routed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("Frame too short: {len}B, need at least {HANDLE_PREFIX_LEN}B")]
    Truncated { len: usize },

    #[error("Frame carries invalid handle {0}")]
    InvalidHandle(i64),
}

/// Build a frame addressed to `handle`
pub fn encode(handle: ObjectHandle, payload: &[u8]) -> Bytes {
    let mut frame = BytesMut::with_capacity(HANDLE_PREFIX_LEN + payload.len());
    frame.put_i64_le(handle.raw());
    frame.put_slice(payload);
    frame.freeze()
}

/// Split a frame into its handle and payload
pub fn decode(mut frame: Bytes) -> Result<(ObjectHandle, Bytes), FrameError> {
    if frame.len() < HANDLE_PREFIX_LEN {
        return Err(FrameError::Truncated { len: frame.len() });
    }

    let handle = ObjectHandle::new(frame.get_i64_le());
    if !handle.is_valid() {
        return Err(FrameError::InvalidHandle(handle.raw()));
    }

    Ok((handle, frame))
}
