// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! In-process stand-in for the VC8000 M2M node.
//!
//! The device honours the V4L2 buffer protocol closely enough for the decode
//! controller: formats are sized like the driver sizes them, buffers are
//! anonymous shared mappings, and a poll after a bitstream is queued "decodes"
//! by painting a known pattern into the queued CAPTURE buffer. With
//! [`Behavior::decode_jpeg`] it decodes the real bitstream instead and lays
//! it out the way the post-processor does: MCU padding on the right and
//! bottom, then the configured rotation.

#![allow(dead_code)]

use edgefirst_hwjpeg::{
    device::{
        Capabilities, DequeuedBuffer, FormatRequest, Mapping, NegotiatedFormat, PlaneInfo,
        PostProcessing, Queue, QueuedPlane, Readiness,
    },
    DecodedImage, DecoderConfig, HardwareDecoder, M2mDevice, NativeFormat, PixelFormat, Rotation,
};
use std::{
    collections::{HashMap, VecDeque},
    io,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    thread,
    time::Duration,
};
use vc8000_sys::{
    V4L2_BUF_FLAG_DONE, V4L2_BUF_FLAG_ERROR, V4L2_CAP_STREAMING, V4L2_CAP_VIDEO_CAPTURE_MPLANE,
    V4L2_CAP_VIDEO_OUTPUT_MPLANE,
};

const CAPTURE_OFFSET: u32 = 0x4000_0000;

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    SetFormat(Queue, FormatRequest),
    RequestBuffers(Queue, u32),
    StreamOn(Queue),
    StreamOff(Queue),
    Queue(Queue, u32, u32),
    Dequeue(Queue),
    PostProcessing(PostProcessing),
    Poll,
}

/// How the simulated hardware misbehaves.
#[derive(Debug, Clone, Default)]
pub struct Behavior {
    /// Flag the CAPTURE buffer with `V4L2_BUF_FLAG_ERROR`.
    pub fail_capture: bool,
    /// Answer CAPTURE `S_FMT` with this fourcc instead of the requested one.
    pub substitute_fourcc: Option<u32>,
    /// Time spent "decoding" in each poll.
    pub decode_time: Duration,
    /// Decode the queued bitstream into BGRA captures at unit scale.
    pub decode_jpeg: bool,
}

/// State shared between a test and every device its decoder opens.
#[derive(Debug, Default)]
pub struct Shared {
    pub calls: Mutex<Vec<Call>>,
    pub opened: AtomicUsize,
    pub live: AtomicUsize,
    pub max_live: AtomicUsize,
}

impl Shared {
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| pred(c)).count()
    }
}

/// Test pattern the simulated post-processor writes at pixel `(x, y)`.
pub fn bgra_at(x: u32, y: u32) -> [u8; 4] {
    [x as u8, y as u8, (x ^ y) as u8, 0xFF]
}

/// Fill written into the MCU padding when decoding real bitstreams.
pub const PADDING_BGRA: [u8; 4] = [0xFF, 0x00, 0xFF, 0x7F];

pub const NV12_U: u8 = 90;
pub const NV12_V: u8 = 170;

pub fn yuyv_u(x: u32) -> u8 {
    (x / 2) as u8
}

pub fn yuyv_v(y: u32) -> u8 {
    200u8.wrapping_add(y as u8)
}

fn native_of(fourcc: u32) -> Option<NativeFormat> {
    [
        NativeFormat::Bgra32,
        NativeFormat::Rgb565,
        NativeFormat::Nv12,
        NativeFormat::Yuyv,
    ]
    .into_iter()
    .find(|native| native.fourcc() == fourcc)
}

pub struct SimDevice {
    shared: Arc<Shared>,
    behavior: Behavior,
    formats: HashMap<Queue, NegotiatedFormat>,
    /// Base address and length of each CAPTURE mapping, by buffer index.
    capture_maps: HashMap<u32, (usize, usize)>,
    output_maps: HashMap<u32, (usize, usize)>,
    /// OUTPUT index and payload length of the last queued bitstream.
    bitstream: Option<(u32, usize)>,
    post_processing: Option<PostProcessing>,
    queued: HashMap<Queue, VecDeque<u32>>,
    streaming: HashMap<Queue, bool>,
    decoded: Option<u32>,
}

impl SimDevice {
    pub fn new(shared: Arc<Shared>, behavior: Behavior) -> Self {
        shared.opened.fetch_add(1, Ordering::SeqCst);
        let live = shared.live.fetch_add(1, Ordering::SeqCst) + 1;
        shared.max_live.fetch_max(live, Ordering::SeqCst);
        Self {
            shared,
            behavior,
            formats: HashMap::new(),
            capture_maps: HashMap::new(),
            output_maps: HashMap::new(),
            bitstream: None,
            post_processing: None,
            queued: HashMap::new(),
            streaming: HashMap::new(),
            decoded: None,
        }
    }

    fn record(&self, call: Call) {
        self.shared.calls.lock().unwrap().push(call);
    }

    /// Decodes the queued bitstream, pads it to the MCU grid and applies the
    /// configured rotation. `None` when the capture cannot hold the result.
    fn render_jpeg(&self, width: u32, height: u32) -> Option<Vec<u8>> {
        let (index, len) = self.bitstream?;
        let &(addr, map_len) = self.output_maps.get(&index)?;
        // SAFETY: the OUTPUT mapping outlives the queued bitstream.
        let jpeg = unsafe { std::slice::from_raw_parts(addr as *const u8, len.min(map_len)) };
        let image = turbojpeg::decompress(jpeg, turbojpeg::PixelFormat::BGRA).ok()?;

        let (real_w, real_h) = (image.width, image.height);
        let (aligned_w, aligned_h) = (real_w.next_multiple_of(16), real_h.next_multiple_of(16));
        let mut frame = PADDING_BGRA.repeat(aligned_w * aligned_h);
        for y in 0..real_h {
            let src = &image.pixels[y * image.pitch..][..real_w * 4];
            frame[y * aligned_w * 4..][..real_w * 4].copy_from_slice(src);
        }

        let op = self.post_processing.map_or(0, |pp| pp.rotation);
        let rotation = [
            Rotation::None,
            Rotation::Right90,
            Rotation::Left90,
            Rotation::HorizontalFlip,
            Rotation::VerticalFlip,
            Rotation::Rotate180,
        ]
        .into_iter()
        .find(|r| r.pp_op() == op)?;
        let rotated =
            DecodedImage::from_packed(aligned_w as u32, aligned_h as u32, PixelFormat::Bgra, frame)
                .ok()?
                .rotate(rotation);
        if (rotated.width(), rotated.height()) != (width, height) {
            return None;
        }
        rotated.as_slice().map(<[u8]>::to_vec)
    }

    fn paint(&self, index: u32) {
        let (Some(format), Some(&(addr, len))) = (
            self.formats.get(&Queue::Capture),
            self.capture_maps.get(&index),
        ) else {
            return;
        };
        let Some(native) = native_of(format.fourcc) else {
            return;
        };
        // SAFETY: the mapping stays alive while its buffer is queued, and
        // the decoder does not touch queued buffers.
        let data = unsafe { std::slice::from_raw_parts_mut(addr as *mut u8, len) };
        let (width, height) = (format.width, format.height);
        if data.len() < native.frame_size(width, height) {
            return;
        }

        if self.behavior.decode_jpeg {
            if let Some(pixels) = self
                .render_jpeg(width, height)
                .filter(|_| native == NativeFormat::Bgra32)
            {
                data[..pixels.len()].copy_from_slice(&pixels);
            }
            return;
        }

        for y in 0..height {
            for x in 0..width {
                let i = (y * width + x) as usize;
                match native {
                    NativeFormat::Bgra32 => {
                        data[4 * i..4 * i + 4].copy_from_slice(&bgra_at(x, y));
                    }
                    NativeFormat::Rgb565 => {
                        data[2 * i..2 * i + 2].copy_from_slice(&(x as u16).to_le_bytes());
                    }
                    NativeFormat::Nv12 => data[i] = x as u8,
                    NativeFormat::Yuyv => {
                        data[2 * i] = x as u8;
                        data[2 * i + 1] = if x % 2 == 0 { yuyv_u(x) } else { yuyv_v(y) };
                    }
                }
            }
        }
        if native == NativeFormat::Nv12 {
            let luma = (width * height) as usize;
            for pair in data[luma..native.frame_size(width, height)].chunks_exact_mut(2) {
                pair[0] = NV12_U;
                pair[1] = NV12_V;
            }
        }
    }
}

impl Drop for SimDevice {
    fn drop(&mut self) {
        self.shared.live.fetch_sub(1, Ordering::SeqCst);
    }
}

impl M2mDevice for SimDevice {
    fn capabilities(&mut self) -> io::Result<Capabilities> {
        Ok(Capabilities {
            driver: "vc8000".into(),
            card: "sim".into(),
            capabilities: V4L2_CAP_VIDEO_CAPTURE_MPLANE
                | V4L2_CAP_VIDEO_OUTPUT_MPLANE
                | V4L2_CAP_STREAMING,
        })
    }

    fn set_format(
        &mut self,
        queue: Queue,
        request: &FormatRequest,
    ) -> io::Result<NegotiatedFormat> {
        self.record(Call::SetFormat(queue, *request));
        let fourcc = match (queue, self.behavior.substitute_fourcc) {
            (Queue::Capture, Some(other)) => other,
            _ => request.fourcc,
        };
        let size = match queue {
            Queue::Output => request.sizeimage.unwrap_or(request.width * request.height),
            Queue::Capture => match native_of(fourcc) {
                // No kernel table entry for RGB565.
                Some(NativeFormat::Rgb565) => request.sizeimage.unwrap_or(0),
                Some(native) => native.frame_size(request.width, request.height) as u32,
                None => return Err(io::Error::from_raw_os_error(libc::EINVAL)),
            },
        };
        let format = NegotiatedFormat {
            width: request.width,
            height: request.height,
            fourcc,
            plane_sizes: vec![size],
        };
        self.formats.insert(queue, format.clone());
        Ok(format)
    }

    fn request_buffers(&mut self, queue: Queue, count: u32) -> io::Result<u32> {
        self.record(Call::RequestBuffers(queue, count));
        if count == 0 {
            match queue {
                Queue::Capture => self.capture_maps.clear(),
                Queue::Output => self.output_maps.clear(),
            }
        }
        Ok(count)
    }

    fn query_buffer(
        &mut self,
        queue: Queue,
        index: u32,
        num_planes: usize,
    ) -> io::Result<Vec<PlaneInfo>> {
        let format = self
            .formats
            .get(&queue)
            .ok_or_else(|| io::Error::from_raw_os_error(libc::EINVAL))?;
        let base = match queue {
            Queue::Output => 0,
            Queue::Capture => CAPTURE_OFFSET,
        };
        Ok(format
            .plane_sizes
            .iter()
            .take(num_planes)
            .map(|&length| PlaneInfo {
                length,
                mem_offset: base | index,
            })
            .collect())
    }

    fn map_plane(&mut self, plane: &PlaneInfo) -> io::Result<Mapping> {
        if plane.length == 0 {
            return Err(io::Error::from_raw_os_error(libc::EINVAL));
        }
        let mapping = Mapping::anonymous(plane.length as usize)?;
        let region = (mapping.as_ptr() as usize, mapping.len());
        if plane.mem_offset & CAPTURE_OFFSET != 0 {
            self.capture_maps
                .insert(plane.mem_offset & !CAPTURE_OFFSET, region);
        } else {
            self.output_maps.insert(plane.mem_offset, region);
        }
        Ok(mapping)
    }

    fn queue_buffer(
        &mut self,
        queue: Queue,
        index: u32,
        planes: &[QueuedPlane],
        flags: u32,
    ) -> io::Result<()> {
        self.record(Call::Queue(queue, index, flags));
        if queue == Queue::Output {
            if let Some(plane) = planes.first().filter(|p| p.bytes_used > 0) {
                self.bitstream = Some((index, plane.bytes_used as usize));
            }
        }
        self.queued.entry(queue).or_default().push_back(index);
        Ok(())
    }

    fn dequeue_buffer(&mut self, queue: Queue, _num_planes: usize) -> io::Result<DequeuedBuffer> {
        self.record(Call::Dequeue(queue));
        let index = self
            .queued
            .get_mut(&queue)
            .and_then(VecDeque::pop_front)
            .ok_or_else(|| io::Error::from_raw_os_error(libc::EAGAIN))?;
        let (flags, bytes_used) = match queue {
            Queue::Capture if self.behavior.fail_capture => (V4L2_BUF_FLAG_ERROR, 0),
            Queue::Capture => (
                V4L2_BUF_FLAG_DONE,
                self.formats
                    .get(&Queue::Capture)
                    .and_then(|fmt| fmt.plane_sizes.first().copied())
                    .unwrap_or(0),
            ),
            Queue::Output => (V4L2_BUF_FLAG_DONE, 0),
        };
        Ok(DequeuedBuffer {
            index,
            flags,
            bytes_used,
        })
    }

    fn stream_on(&mut self, queue: Queue) -> io::Result<()> {
        self.record(Call::StreamOn(queue));
        self.streaming.insert(queue, true);
        Ok(())
    }

    fn stream_off(&mut self, queue: Queue) -> io::Result<()> {
        self.record(Call::StreamOff(queue));
        self.streaming.insert(queue, false);
        self.queued.remove(&queue);
        if queue == Queue::Capture {
            self.decoded = None;
        }
        Ok(())
    }

    fn set_post_processing(&mut self, params: &PostProcessing) -> io::Result<()> {
        self.record(Call::PostProcessing(*params));
        self.post_processing = Some(*params);
        Ok(())
    }

    fn poll(&mut self, _timeout: Option<Duration>) -> io::Result<Readiness> {
        self.record(Call::Poll);
        let output_pending = self
            .queued
            .get(&Queue::Output)
            .is_some_and(|q| !q.is_empty());
        if !output_pending {
            return Err(io::Error::from(io::ErrorKind::TimedOut));
        }
        if let Some(&index) = self.queued.get(&Queue::Capture).and_then(VecDeque::front) {
            if self.decoded != Some(index) {
                thread::sleep(self.behavior.decode_time);
                self.paint(index);
                self.decoded = Some(index);
            }
        }
        Ok(Readiness {
            capture_ready: true,
            output_drained: true,
        })
    }
}

/// A decoder whose every session opens a fresh [`SimDevice`].
pub fn sim_decoder(config: DecoderConfig, behavior: Behavior) -> (HardwareDecoder, Arc<Shared>) {
    let shared = Arc::new(Shared::default());
    let handle = shared.clone();
    let decoder = HardwareDecoder::with_opener(config, move |_| {
        Ok(Box::new(SimDevice::new(handle.clone(), behavior.clone())) as Box<dyn M2mDevice>)
    });
    (decoder, shared)
}

/// Gradient JPEG of the given size.
pub fn gradient_jpeg(width: u32, height: u32, subsamp: turbojpeg::Subsamp) -> Vec<u8> {
    let rgb: Vec<u8> = (0..width * height)
        .flat_map(|i| {
            let (x, y) = (i % width, i / width);
            [(x * 255 / width) as u8, (y * 255 / height) as u8, 96]
        })
        .collect();
    edgefirst_hwjpeg::image::encode_jpeg(
        &rgb,
        width,
        height,
        edgefirst_hwjpeg::PixelFormat::Rgb,
        90,
        subsamp,
    )
    .unwrap()
    .to_vec()
}
