// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use std::{path::PathBuf, time::Duration};

/// Number of `/dev/videoN` nodes probed for the decoder.
pub const DEFAULT_DEVICE_COUNT: usize = 4;

/// Largest surface the VC8000 post-processor can emit.
pub const MAX_OUTPUT_WIDTH: u32 = 1920;
pub const MAX_OUTPUT_HEIGHT: u32 = 1080;

/// Below this size (in both axes) software decode is cheaper than the
/// hardware round trip.
pub const MIN_USEFUL_OUTPUT: u32 = 64;

/// Tunables for the hardware decode path.
///
/// The defaults match the VC8000 on the MA35D1; the binary builds this from
/// its command line.
#[derive(Debug, Clone)]
pub struct DecoderConfig {
    /// Candidate device nodes, probed in order.
    pub devices: Vec<PathBuf>,
    /// Disable to force every request through software decode.
    pub hardware: bool,
    /// Minimum output width/height worth offloading outside direct mode.
    pub min_output: u32,
    pub max_output_width: u32,
    pub max_output_height: u32,
    pub output_buffers: u32,
    pub capture_buffers: u32,
    /// Bound on the completion wait. `None` waits forever, which is what the
    /// driver contract expects.
    pub poll_timeout: Option<Duration>,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            devices: (0..DEFAULT_DEVICE_COUNT)
                .map(|i| PathBuf::from(format!("/dev/video{i}")))
                .collect(),
            hardware: true,
            min_output: MIN_USEFUL_OUTPUT,
            max_output_width: MAX_OUTPUT_WIDTH,
            max_output_height: MAX_OUTPUT_HEIGHT,
            output_buffers: 1,
            capture_buffers: 1,
            poll_timeout: None,
        }
    }
}

impl DecoderConfig {
    pub fn with_devices<I, P>(mut self, devices: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.devices = devices.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_hardware(mut self, enabled: bool) -> Self {
        self.hardware = enabled;
        self
    }

    pub fn with_poll_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.poll_timeout = timeout;
        self
    }
}
