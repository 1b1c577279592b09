// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! One-shot decode with transparent software fallback.

use crate::{
    config::DecoderConfig,
    error::{Error, Result},
    geometry::{DecodeRequest, Geometry},
    image::DecodedImage,
    session::HardwareDecoder,
    software,
};
use std::time::Instant;
use tracing::{debug, instrument, warn};

/// Which decoder produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodePath {
    Hardware,
    /// Software decode after the hardware gave up with `reason`, a negative
    /// [`Error::reason_code`].
    Software { reason: i32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    Image(DecodedImage),
    /// The hardware wrote the image to the destination surface.
    Direct,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    pub output: Output,
    pub path: DecodePath,
}

impl Decoded {
    pub fn image(&self) -> Option<&DecodedImage> {
        match &self.output {
            Output::Image(image) => Some(image),
            Output::Direct => None,
        }
    }

    pub fn into_image(self) -> Option<DecodedImage> {
        match self.output {
            Output::Image(image) => Some(image),
            Output::Direct => None,
        }
    }

    pub fn is_hardware(&self) -> bool {
        self.path == DecodePath::Hardware
    }
}

/// JPEG decoder that tries the VC8000 first and falls back to libjpeg-turbo.
///
/// Concurrent calls are safe; hardware attempts serialize on the
/// [`HardwareDecoder`] lock.
///
/// # Example
///
/// ```no_run
/// use edgefirst_hwjpeg::{DecodeRequest, JpegDecoder, PixelFormat, Scale};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let jpeg = std::fs::read("frame.jpg")?;
/// let request = DecodeRequest::from_jpeg(&jpeg, PixelFormat::Bgra)?
///     .with_scale(Scale::new(1, 2));
///
/// let decoder = JpegDecoder::default();
/// let decoded = decoder.decode(&jpeg, &request)?;
/// println!("decoded via {:?}", decoded.path);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct JpegDecoder {
    hardware: HardwareDecoder,
}

impl JpegDecoder {
    pub fn new(config: DecoderConfig) -> Self {
        Self::with_hardware(HardwareDecoder::new(config))
    }

    pub fn with_hardware(hardware: HardwareDecoder) -> Self {
        Self { hardware }
    }

    pub fn hardware(&self) -> &HardwareDecoder {
        &self.hardware
    }

    /// Decodes `jpeg`, preferring the hardware.
    ///
    /// Every hardware failure is absorbed: the device is torn down, the
    /// reason is logged and the image is decoded in software with the same
    /// geometry. A direct-mode request that falls back returns the decoded
    /// image for the caller to place on its surface.
    ///
    /// # Errors
    ///
    /// Only software decode failures are returned.
    #[instrument(skip_all, fields(len = jpeg.len(), format = %request.format))]
    pub fn decode(&self, jpeg: &[u8], request: &DecodeRequest) -> Result<Decoded> {
        let start = Instant::now();
        let reason = match self.decode_hardware(jpeg, request) {
            Ok(output) => {
                debug!("hardware decode finished in {:?}", start.elapsed());
                return Ok(Decoded {
                    output,
                    path: DecodePath::Hardware,
                });
            }
            Err(Error::DeviceUnavailable) if !self.hardware.config().hardware => {
                debug!("hardware decode disabled");
                Error::DeviceUnavailable.reason_code()
            }
            Err(err) => {
                warn!(
                    "hardware decode unavailable ({}): {}, using software",
                    err.reason_code(),
                    err
                );
                err.reason_code()
            }
        };

        let image = software::decode(jpeg, request)?;
        debug!("software decode finished in {:?}", start.elapsed());
        Ok(Decoded {
            output: Output::Image(image),
            path: DecodePath::Software { reason },
        })
    }

    fn decode_hardware(&self, jpeg: &[u8], request: &DecodeRequest) -> Result<Output> {
        if !self.hardware.config().hardware {
            return Err(Error::DeviceUnavailable);
        }
        // Reject before waiting on the lock.
        Geometry::validate(request, self.hardware.config())?;

        let mut session = self.hardware.session()?;
        session.prepare(request)?;
        let result = session.submit(jpeg)?;
        let output = if result.direct {
            Output::Direct
        } else {
            Output::Image(session.read_image()?)
        };
        session.release();
        Ok(output)
    }
}
