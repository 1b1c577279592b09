// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Decode session controller.
//!
//! A [`DecodeSession`] drives one device session through
//!
//! ```text
//! Idle -> GeometryValidated -> BuffersPrepared -> Streaming
//!      -> AwaitingCompletion -> Completed | Failed
//! ```
//!
//! [`DecodeSession::prepare`] validates the request and sets up both queues,
//! [`DecodeSession::submit`] feeds the bitstream and blocks until the device
//! finishes, and the read-out calls remap the CAPTURE buffer into the
//! caller's rows. Any failure tears the device state down before the error
//! is returned, and [`DecodeSession::release`] returns the session to `Idle`
//! so it can be prepared again.

use crate::{
    buffers::PlaneManager,
    device::{M2mDevice, NegotiatedFormat, PostProcessing, PpDestination, Queue},
    error::{Error, GeometryReason, Result},
    format::{NativeFormat, PixelFormat},
    geometry::{DecodeRequest, Geometry, SurfaceTarget},
    image::DecodedImage,
    remap::CaptureFrame,
    session::{DeviceSession, HardwareDecoder},
};
use std::time::Instant;
use tracing::{debug, instrument, trace, warn};
use vc8000_sys::V4L2_PIX_FMT_JPEG;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeState {
    Idle,
    GeometryValidated,
    BuffersPrepared,
    Streaming,
    AwaitingCompletion,
    Completed,
    Failed,
}

/// What a completed hardware decode produced.
///
/// Valid until the session is released or prepared again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeResult {
    /// CAPTURE buffer holding the pixels.
    pub index: u32,
    /// Captured surface size.
    pub width: u32,
    pub height: u32,
    pub native: NativeFormat,
    /// Pixels went straight to the destination surface; there is nothing to
    /// read back.
    pub direct: bool,
}

pub struct DecodeSession<'a> {
    device: DeviceSession<'a>,
    output: PlaneManager,
    capture: PlaneManager,
    state: DecodeState,
    request: Option<DecodeRequest>,
    geometry: Option<Geometry>,
    result: Option<DecodeResult>,
    next_scanline: u32,
}

impl HardwareDecoder {
    /// Opens the device and wraps it in a [`DecodeSession`].
    pub fn session(&self) -> Result<DecodeSession<'_>> {
        Ok(DecodeSession::new(self.open()?))
    }
}

impl<'a> DecodeSession<'a> {
    pub fn new(device: DeviceSession<'a>) -> Self {
        Self {
            device,
            output: PlaneManager::new(Queue::Output),
            capture: PlaneManager::new(Queue::Capture),
            state: DecodeState::Idle,
            request: None,
            geometry: None,
            result: None,
            next_scanline: 0,
        }
    }

    pub fn state(&self) -> DecodeState {
        self.state
    }

    pub fn geometry(&self) -> Option<&Geometry> {
        self.geometry.as_ref()
    }

    pub fn result(&self) -> Option<&DecodeResult> {
        self.result.as_ref()
    }

    /// Next output row [`DecodeSession::read_scanlines`] will produce.
    pub fn output_scanline(&self) -> u32 {
        self.next_scanline
    }

    /// Validates `request` and brings the device up to streaming.
    ///
    /// Geometry is checked before any device transaction, so a rejected
    /// request leaves the session `Idle` with nothing allocated.
    ///
    /// # Errors
    ///
    /// [`Error::GeometryRejected`] or [`Error::UnsupportedPixelFormat`] for
    /// requests the hardware cannot serve, [`Error::FormatNegotiationFailed`]
    /// and [`Error::AllocationFailed`] from queue setup, and
    /// [`Error::InvalidState`] while a previous decode is still held; call
    /// [`DecodeSession::release`] first.
    #[instrument(skip_all, fields(
        width = request.source_width,
        height = request.source_height,
        format = %request.format,
    ))]
    pub fn prepare(&mut self, request: &DecodeRequest) -> Result<Geometry> {
        if !matches!(self.state, DecodeState::Idle | DecodeState::Failed) {
            return Err(Error::InvalidState("prepare requires an idle session"));
        }

        let geometry = Geometry::validate(request, self.device.config())?;
        self.state = DecodeState::GeometryValidated;
        debug!(
            "geometry {}x{} -> {}x{} {} rotation {:?}{}",
            geometry.aligned_width,
            geometry.aligned_height,
            geometry.target_width,
            geometry.target_height,
            geometry.native,
            geometry.rotation,
            if geometry.direct { " direct" } else { "" }
        );

        if let Err(err) = self.bring_up(request, &geometry) {
            self.fail(&err);
            return Err(err);
        }

        self.request = Some(request.clone());
        self.geometry = Some(geometry);
        Ok(geometry)
    }

    fn bring_up(&mut self, request: &DecodeRequest, geometry: &Geometry) -> Result<()> {
        let config = self.device.config();
        let device = self.device.device();

        // OUTPUT buffers hold one byte per source pixel.
        let bitstream_size = request
            .source_width
            .checked_mul(request.source_height)
            .ok_or(Error::GeometryRejected(GeometryReason::TooLarge))?;
        self.output.setup_output(
            device,
            V4L2_PIX_FMT_JPEG,
            bitstream_size,
            config.output_buffers,
        )?;

        let (capture_width, capture_height) = geometry.capture_size();
        self.capture.setup_capture(
            device,
            geometry.native,
            config.capture_buffers,
            capture_width,
            capture_height,
        )?;

        let pp = post_processing(request, geometry, self.capture.format());
        device.set_post_processing(&pp)?;
        self.state = DecodeState::BuffersPrepared;

        self.capture.stream_on(device)?;
        self.output.stream_on(device)?;

        while let Some(index) = self.capture.free_index() {
            self.capture.queue(device, index, &[])?;
        }
        self.state = DecodeState::Streaming;
        Ok(())
    }

    /// Feeds `bitstream` to the decoder and waits for it to finish.
    ///
    /// The wait has no deadline unless the configuration sets a poll
    /// timeout.
    ///
    /// # Errors
    ///
    /// [`Error::BitstreamTooLarge`] when the data does not fit the OUTPUT
    /// buffer; the session stays streaming and can take a smaller bitstream
    /// or be released. Any other failure tears the session down.
    #[instrument(skip_all, fields(len = bitstream.len()))]
    pub fn submit(&mut self, bitstream: &[u8]) -> Result<DecodeResult> {
        if self.state != DecodeState::Streaming {
            return Err(Error::InvalidState("submit requires a streaming session"));
        }
        let index = self
            .output
            .free_index()
            .ok_or(Error::InvalidState("no free OUTPUT buffer"))?;

        let capacity = self.output.capacity();
        if bitstream.len() > capacity {
            return Err(Error::BitstreamTooLarge {
                len: bitstream.len(),
                capacity,
            });
        }

        let start = Instant::now();
        match self.await_completion(index, bitstream) {
            Ok(result) => {
                trace!("hardware decode took {:?}", start.elapsed());
                self.state = DecodeState::Completed;
                self.result = Some(result);
                self.next_scanline = 0;
                Ok(result)
            }
            Err(err) => {
                self.fail(&err);
                Err(err)
            }
        }
    }

    fn await_completion(&mut self, index: u32, bitstream: &[u8]) -> Result<DecodeResult> {
        let timeout = self.device.config().poll_timeout;
        let device = self.device.device();

        self.output.plane_mut(index, 0)?[..bitstream.len()].copy_from_slice(bitstream);
        self.output
            .queue(device, index, &[bitstream.len() as u32])?;
        self.state = DecodeState::AwaitingCompletion;

        let mut captured = None;
        loop {
            let ready = device
                .poll(timeout)
                .map_err(|err| Error::CompletionFailed(format!("poll: {err}")))?;

            if ready.capture_ready && self.capture.has_enqueued() {
                let buf = self.capture.dequeue(device)?;
                trace!(
                    "CAPTURE {} finished={} bytes={}",
                    buf.index,
                    buf.finished,
                    buf.bytes_used
                );
                captured = Some(buf);
            }

            if ready.output_drained && self.output.has_enqueued() {
                self.output.dequeue(device)?;
                break;
            }
        }

        let capture = match captured {
            Some(buf) if buf.finished => buf,
            Some(_) => {
                return Err(Error::CompletionFailed(
                    "decoder flagged the CAPTURE buffer as failed".into(),
                ))
            }
            None => {
                return Err(Error::CompletionFailed(
                    "bitstream consumed without a CAPTURE buffer".into(),
                ))
            }
        };

        let format = self
            .capture
            .format()
            .ok_or(Error::InvalidState("CAPTURE format missing"))?;
        let geometry = self
            .geometry
            .ok_or(Error::InvalidState("geometry missing"))?;
        Ok(DecodeResult {
            index: capture.index,
            width: format.width,
            height: format.height,
            native: geometry.native,
            direct: geometry.direct,
        })
    }

    fn completed(&self) -> Result<(DecodeResult, Geometry, PixelFormat)> {
        match (self.state, self.result, self.geometry, &self.request) {
            (DecodeState::Completed, Some(result), Some(geometry), Some(request)) => {
                if result.direct {
                    Err(Error::InvalidState("direct output has nothing to read back"))
                } else {
                    Ok((result, geometry, request.format))
                }
            }
            _ => Err(Error::InvalidState("no completed decode to read")),
        }
    }

    fn frame(&self, result: &DecodeResult) -> Result<CaptureFrame<'_>> {
        let data = self.capture.plane(result.index, 0)?;
        CaptureFrame::new(data, result.width, result.height, result.native)
    }

    /// Writes the next `rows.len()` output rows in the requested packed
    /// format, returning how many were written.
    ///
    /// Each row receives `output_width * bytes_per_pixel` bytes taken from
    /// the crop window. Fewer rows are written once the image runs out.
    #[instrument(skip_all, fields(rows = rows.len()))]
    pub fn read_scanlines(&mut self, rows: &mut [&mut [u8]]) -> Result<usize> {
        let (result, geometry, format) = self.completed()?;
        if format.is_planar() {
            return Err(Error::InvalidState("planar output is read with read_raw_data"));
        }
        let frame = self.frame(&result)?;

        let remaining = geometry.output_height.saturating_sub(self.next_scanline) as usize;
        let count = rows.len().min(remaining);
        for (i, row) in rows.iter_mut().take(count).enumerate() {
            frame.packed_row(
                geometry.origin_y + self.next_scanline + i as u32,
                geometry.origin_x + geometry.column_offset,
                geometry.output_width,
                format,
                row,
            )?;
        }
        self.next_scanline += count as u32;
        Ok(count)
    }

    /// Writes the next `y.len()` luma rows and their chroma rows, returning
    /// the number of luma rows written.
    ///
    /// 4:2:2 output has one chroma row per luma row. 4:2:0 output has one
    /// chroma row per even luma row, so `u` and `v` need half as many rows.
    #[instrument(skip_all, fields(rows = y.len()))]
    pub fn read_raw_data(
        &mut self,
        y: &mut [&mut [u8]],
        u: &mut [&mut [u8]],
        v: &mut [&mut [u8]],
    ) -> Result<usize> {
        let (result, geometry, format) = self.completed()?;
        if !format.is_planar() {
            return Err(Error::InvalidState("packed output is read with read_scanlines"));
        }
        let frame = self.frame(&result)?;
        let chroma_every = match result.native {
            NativeFormat::Nv12 => 2,
            _ => 1,
        };

        let remaining = geometry.output_height.saturating_sub(self.next_scanline) as usize;
        let count = y.len().min(remaining);
        let mut chroma_row = 0;
        for (i, luma) in y.iter_mut().take(count).enumerate() {
            let scanline = self.next_scanline + i as u32;
            let chroma = if scanline % chroma_every == 0 {
                let pair = u.get_mut(chroma_row).zip(v.get_mut(chroma_row));
                let (cb, cr) = pair.ok_or(Error::InvalidState("too few chroma rows"))?;
                chroma_row += 1;
                Some((&mut **cb, &mut **cr))
            } else {
                None
            };
            frame.planar_row(
                geometry.origin_y + scanline,
                geometry.origin_x + geometry.column_offset,
                geometry.output_width,
                luma,
                chroma,
            )?;
        }
        self.next_scanline += count as u32;
        Ok(count)
    }

    /// Reads the whole decoded image into host memory.
    pub fn read_image(&mut self) -> Result<DecodedImage> {
        let (result, geometry, format) = self.completed()?;
        let (width, height) = (geometry.output_width, geometry.output_height);
        self.next_scanline = 0;

        if format.is_planar() {
            let factors = match result.native {
                NativeFormat::Nv12 => (2, 2),
                _ => (2, 1),
            };
            let mut image = DecodedImage::planar(width, height, factors);
            if let Some([py, pu, pv]) = image.planes_mut() {
                let (mut y, mut u, mut v) = (py.rows_mut(), pu.rows_mut(), pv.rows_mut());
                self.read_raw_data(&mut y, &mut u, &mut v)?;
            }
            Ok(image)
        } else {
            let mut image = DecodedImage::packed(width, height, format);
            if let Some(data) = image.as_slice_mut() {
                let row_len = (width as usize * format.bytes_per_pixel()).max(1);
                let mut rows: Vec<&mut [u8]> = data.chunks_exact_mut(row_len).collect();
                self.read_scanlines(&mut rows)?;
            }
            Ok(image)
        }
    }

    /// Stops streaming and frees every buffer, returning the session to
    /// `Idle`. Safe to call repeatedly.
    #[instrument(skip_all)]
    pub fn release(&mut self) {
        self.teardown();
        self.state = DecodeState::Idle;
    }

    fn teardown(&mut self) {
        let device: &mut dyn M2mDevice = self.device.device();
        self.capture.teardown(device);
        self.output.teardown(device);
        self.request = None;
        self.geometry = None;
        self.result = None;
        self.next_scanline = 0;
    }

    fn fail(&mut self, err: &Error) {
        warn!("hardware decode failed in {:?}: {}", self.state, err);
        self.teardown();
        self.state = DecodeState::Failed;
    }
}

impl Drop for DecodeSession<'_> {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn post_processing(
    request: &DecodeRequest,
    geometry: &Geometry,
    capture: Option<&NegotiatedFormat>,
) -> PostProcessing {
    let fourcc = geometry.native.fourcc();
    let rotation = geometry.rotation.pp_op();
    match &request.destination {
        Some(dest) => PostProcessing {
            enabled: true,
            destination: match dest.target {
                SurfaceTarget::FrameBuffer(n) => PpDestination::FrameBuffer(n),
                SurfaceTarget::Physical { address, size } => {
                    PpDestination::Physical { address, size }
                }
            },
            surface_width: dest.surface_width,
            surface_height: dest.surface_height,
            x: dest.x,
            y: dest.y,
            width: dest.image_width,
            height: dest.image_height,
            fourcc,
            rotation,
        },
        None => {
            let (width, height) = capture.map_or(
                (geometry.target_width, geometry.target_height),
                |fmt| (fmt.width, fmt.height),
            );
            PostProcessing {
                enabled: true,
                destination: PpDestination::Internal,
                surface_width: width,
                surface_height: height,
                x: 0,
                y: 0,
                width,
                height,
                fourcc,
                rotation,
            }
        }
    }
}
