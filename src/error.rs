// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use crate::format::PixelFormat;
use std::io;
use thiserror::Error;

/// Why a request was judged unsuitable for the hardware decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometryReason {
    /// Both output dimensions fall below the minimum worth offloading.
    TooSmall,
    /// Output exceeds the largest surface the decoder can produce.
    TooLarge,
    /// Width scales up while height scales down, or the reverse.
    InconsistentScale,
    /// Upscale factor beyond what the post-processor supports.
    UpscaleLimit,
    /// Planar output requested for a chroma layout other than 4:2:0 or 4:2:2.
    UnsupportedSubsampling,
    /// The requested crop window does not fit inside the output.
    CropOutOfBounds,
    /// Scale ratio with a zero numerator or denominator.
    InvalidScale,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("no VC8000 decoder device available")]
    DeviceUnavailable,

    #[error("format negotiation failed on {queue} queue: {source}")]
    FormatNegotiationFailed {
        queue: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("buffer allocation failed on {queue} queue: {source}")]
    AllocationFailed {
        queue: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("geometry rejected: {0:?}")]
    GeometryRejected(GeometryReason),

    #[error("bitstream of {len} bytes exceeds OUTPUT capacity of {capacity} bytes")]
    BitstreamTooLarge { len: usize, capacity: usize },

    #[error("decode completion failed: {0}")]
    CompletionFailed(String),

    #[error("pixel format {0} has no hardware equivalent")]
    UnsupportedPixelFormat(PixelFormat),

    #[error("invalid state: {0}")]
    InvalidState(&'static str),

    #[error("software decode failed: {0}")]
    Software(#[from] turbojpeg::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// Distinct negative code identifying where a hardware attempt gave up.
    ///
    /// Codes are stable so they can be logged and compared across releases.
    pub fn reason_code(&self) -> i32 {
        match self {
            Error::DeviceUnavailable => -1,
            Error::UnsupportedPixelFormat(_) => -2,
            Error::GeometryRejected(GeometryReason::TooSmall) => -3,
            Error::GeometryRejected(GeometryReason::InconsistentScale) => -4,
            Error::GeometryRejected(GeometryReason::TooLarge) => -5,
            Error::GeometryRejected(GeometryReason::UpscaleLimit) => -6,
            Error::GeometryRejected(GeometryReason::UnsupportedSubsampling) => -7,
            Error::GeometryRejected(GeometryReason::CropOutOfBounds) => -8,
            Error::FormatNegotiationFailed { .. } => -9,
            Error::AllocationFailed { .. } => -10,
            Error::BitstreamTooLarge { .. } => -11,
            Error::CompletionFailed(_) => -12,
            Error::InvalidState(_) => -13,
            Error::Software(_) => -14,
            Error::Io(_) => -15,
            Error::GeometryRejected(GeometryReason::InvalidScale) => -16,
        }
    }

    /// True for errors the fallback coordinator absorbs by decoding in
    /// software. Software decode failures themselves are never recoverable.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Error::Software(_))
    }
}
