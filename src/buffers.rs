// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Buffer plane manager for one V4L2 queue.
//!
//! A [`PlaneManager`] requests MMAP buffers on its queue, maps every plane and
//! tracks who owns each buffer. Mapped memory is only reachable through
//! [`PlaneManager::plane`] and [`PlaneManager::plane_mut`], which refuse while
//! the device owns the buffer.

use crate::{
    config::{MAX_OUTPUT_HEIGHT, MAX_OUTPUT_WIDTH},
    device::{FormatRequest, M2mDevice, Mapping, NegotiatedFormat, Queue, QueuedPlane},
    error::{Error, Result},
    format::NativeFormat,
};
use std::io;
use tracing::{debug, warn};
use vc8000_sys::{V4L2_BUF_FLAG_DONE, V4L2_BUF_FLAG_ERROR, V4L2_QCOM_BUF_FLAG_EOS};

/// Ownership of a buffer slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferState {
    /// Userspace owns the buffer and may touch its memory.
    Dequeued,
    /// The device owns the buffer.
    Enqueued,
}

#[derive(Debug)]
pub struct PlaneBuffer {
    index: u32,
    planes: Vec<Mapping>,
    plane_sizes: Vec<u32>,
    state: BufferState,
}

impl PlaneBuffer {
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn state(&self) -> BufferState {
        self.state
    }

    pub fn plane_sizes(&self) -> &[u32] {
        &self.plane_sizes
    }
}

/// Outcome of a dequeue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dequeued {
    pub index: u32,
    /// The device reports a complete, error-free buffer.
    pub finished: bool,
    pub bytes_used: u32,
}

impl Dequeued {
    /// A buffer is finished when the driver marks it DONE or it carries a
    /// payload, unless ERROR is set. DONE with zero bytes still counts: the
    /// driver returns drained OUTPUT buffers that way.
    fn from_flags(index: u32, flags: u32, bytes_used: u32) -> Self {
        let finished = (flags & V4L2_BUF_FLAG_DONE != 0 || bytes_used > 0)
            && flags & V4L2_BUF_FLAG_ERROR == 0;
        Self {
            index,
            finished,
            bytes_used,
        }
    }
}

/// Buffers of one queue.
#[derive(Debug)]
pub struct PlaneManager {
    queue: Queue,
    format: Option<NegotiatedFormat>,
    buffers: Vec<PlaneBuffer>,
    /// Buffers granted by REQBUFS and not yet freed.
    allocated: bool,
    streaming: bool,
}

impl PlaneManager {
    pub fn new(queue: Queue) -> Self {
        Self {
            queue,
            format: None,
            buffers: Vec::new(),
            allocated: false,
            streaming: false,
        }
    }

    pub fn queue_type(&self) -> Queue {
        self.queue
    }

    /// Format negotiated by the last setup.
    pub fn format(&self) -> Option<&NegotiatedFormat> {
        self.format.as_ref()
    }

    pub fn buffers(&self) -> &[PlaneBuffer] {
        &self.buffers
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    /// Length of the first plane of the first buffer.
    pub fn capacity(&self) -> usize {
        self.buffers
            .first()
            .and_then(|buf| buf.planes.first())
            .map_or(0, Mapping::len)
    }

    /// Negotiates the bitstream format and maps `count` OUTPUT buffers able
    /// to hold `max_bytes` each.
    ///
    /// # Errors
    ///
    /// [`Error::FormatNegotiationFailed`] when the driver rejects the format,
    /// [`Error::AllocationFailed`] when buffers cannot be requested or mapped.
    pub fn setup_output(
        &mut self,
        device: &mut dyn M2mDevice,
        codec: u32,
        max_bytes: u32,
        count: u32,
    ) -> Result<()> {
        let request = FormatRequest {
            width: MAX_OUTPUT_WIDTH,
            height: MAX_OUTPUT_HEIGHT,
            fourcc: codec,
            sizeimage: Some(max_bytes),
        };
        self.negotiate(device, &request)?;
        self.allocate(device, count)?;
        debug!(
            "OUTPUT ready: {} buffers of {} bytes (requested {})",
            self.buffers.len(),
            self.capacity(),
            max_bytes
        );
        Ok(())
    }

    /// Negotiates the pixel format and maps `count` CAPTURE buffers.
    pub fn setup_capture(
        &mut self,
        device: &mut dyn M2mDevice,
        native: NativeFormat,
        count: u32,
        width: u32,
        height: u32,
    ) -> Result<()> {
        let sizeimage = native
            .needs_manual_size()
            .then(|| native.frame_size(width, height) as u32);
        let request = FormatRequest {
            width,
            height,
            fourcc: native.fourcc(),
            sizeimage,
        };
        self.negotiate(device, &request)?;
        self.allocate(device, count)?;
        debug!(
            "CAPTURE ready: {} buffers {}x{} {} planes {:?}",
            self.buffers.len(),
            width,
            height,
            native,
            self.buffers.first().map(PlaneBuffer::plane_sizes)
        );
        Ok(())
    }

    fn negotiate(&mut self, device: &mut dyn M2mDevice, request: &FormatRequest) -> Result<()> {
        let format = device.set_format(self.queue, request).map_err(|source| {
            Error::FormatNegotiationFailed {
                queue: self.queue.name(),
                source,
            }
        })?;
        if format.fourcc != request.fourcc {
            return Err(Error::FormatNegotiationFailed {
                queue: self.queue.name(),
                source: io::Error::new(
                    io::ErrorKind::Unsupported,
                    format!(
                        "driver substituted fourcc {:#010x} for {:#010x}",
                        format.fourcc, request.fourcc
                    ),
                ),
            });
        }
        self.format = Some(format);
        Ok(())
    }

    fn allocate(&mut self, device: &mut dyn M2mDevice, count: u32) -> Result<()> {
        let queue = self.queue.name();
        let alloc_err = move |source: io::Error| Error::AllocationFailed { queue, source };

        let num_planes = self
            .format
            .as_ref()
            .map_or(1, |fmt| fmt.plane_sizes.len().max(1));

        let granted = device
            .request_buffers(self.queue, count)
            .map_err(alloc_err)?;
        self.allocated = true;
        if granted == 0 {
            return Err(alloc_err(io::Error::other("driver granted no buffers")));
        }

        for index in 0..granted {
            let infos = device
                .query_buffer(self.queue, index, num_planes)
                .map_err(alloc_err)?;
            let mut planes = Vec::with_capacity(infos.len());
            for info in &infos {
                // Planes mapped so far are unmapped when `planes` drops.
                planes.push(device.map_plane(info).map_err(alloc_err)?);
            }
            self.buffers.push(PlaneBuffer {
                index,
                plane_sizes: infos.iter().map(|info| info.length).collect(),
                planes,
                state: BufferState::Dequeued,
            });
        }
        Ok(())
    }

    /// Unmaps every plane. Safe to call any number of times.
    pub fn release(&mut self) {
        if !self.buffers.is_empty() {
            debug!("unmapping {} {} buffers", self.buffers.len(), self.queue);
        }
        self.buffers.clear();
    }

    /// Stops streaming, unmaps and frees the buffers. Failures are logged and
    /// the manager is left empty regardless.
    pub fn teardown(&mut self, device: &mut dyn M2mDevice) {
        if self.streaming {
            if let Err(err) = device.stream_off(self.queue) {
                warn!("STREAMOFF {} failed: {}", self.queue, err);
            }
            self.streaming = false;
        }
        self.release();
        if self.allocated {
            if let Err(err) = device.request_buffers(self.queue, 0) {
                warn!("REQBUFS(0) on {} failed: {}", self.queue, err);
            }
            self.allocated = false;
        }
        self.format = None;
    }

    pub fn stream_on(&mut self, device: &mut dyn M2mDevice) -> Result<()> {
        if !self.streaming {
            device.stream_on(self.queue)?;
            self.streaming = true;
        }
        Ok(())
    }

    /// First buffer userspace currently owns.
    pub fn free_index(&self) -> Option<u32> {
        self.buffers
            .iter()
            .find(|buf| buf.state == BufferState::Dequeued)
            .map(|buf| buf.index)
    }

    pub fn has_enqueued(&self) -> bool {
        self.buffers
            .iter()
            .any(|buf| buf.state == BufferState::Enqueued)
    }

    fn slot(&self, index: u32) -> Result<&PlaneBuffer> {
        self.buffers
            .get(index as usize)
            .ok_or(Error::InvalidState("buffer index out of range"))
    }

    fn slot_mut(&mut self, index: u32) -> Result<&mut PlaneBuffer> {
        self.buffers
            .get_mut(index as usize)
            .ok_or(Error::InvalidState("buffer index out of range"))
    }

    /// Hands buffer `index` to the device.
    ///
    /// `lengths` gives the bytes used per plane. A zero-length OUTPUT buffer
    /// signals end of stream.
    pub fn queue(
        &mut self,
        device: &mut dyn M2mDevice,
        index: u32,
        lengths: &[u32],
    ) -> Result<()> {
        let queue = self.queue;
        let buf = self.slot_mut(index)?;
        if buf.state == BufferState::Enqueued {
            return Err(Error::InvalidState("buffer is already enqueued"));
        }

        let planes: Vec<QueuedPlane> = buf
            .planes
            .iter()
            .enumerate()
            .map(|(i, plane)| QueuedPlane {
                bytes_used: lengths.get(i).copied().unwrap_or(0),
                length: plane.len() as u32,
            })
            .collect();

        let mut flags = 0;
        if queue == Queue::Output && lengths.first().copied().unwrap_or(0) == 0 {
            flags |= V4L2_QCOM_BUF_FLAG_EOS;
        }

        device.queue_buffer(queue, index, &planes, flags)?;
        buf.state = BufferState::Enqueued;
        Ok(())
    }

    /// Takes a buffer back from the device.
    pub fn dequeue(&mut self, device: &mut dyn M2mDevice) -> Result<Dequeued> {
        if !self.has_enqueued() {
            return Err(Error::InvalidState("no buffer is enqueued"));
        }
        let num_planes = self.buffers.first().map_or(1, |buf| buf.planes.len());
        let raw = device.dequeue_buffer(self.queue, num_planes)?;

        let buf = self.slot_mut(raw.index)?;
        if buf.state != BufferState::Enqueued {
            return Err(Error::InvalidState("device returned a buffer it did not own"));
        }
        buf.state = BufferState::Dequeued;
        Ok(Dequeued::from_flags(raw.index, raw.flags, raw.bytes_used))
    }

    /// Plane memory of a buffer userspace owns.
    pub fn plane(&self, index: u32, plane: usize) -> Result<&[u8]> {
        let buf = self.slot(index)?;
        if buf.state == BufferState::Enqueued {
            return Err(Error::InvalidState("buffer memory is owned by the device"));
        }
        buf.planes
            .get(plane)
            .map(Mapping::as_slice)
            .ok_or(Error::InvalidState("plane index out of range"))
    }

    pub fn plane_mut(&mut self, index: u32, plane: usize) -> Result<&mut [u8]> {
        let buf = self.slot_mut(index)?;
        if buf.state == BufferState::Enqueued {
            return Err(Error::InvalidState("buffer memory is owned by the device"));
        }
        buf.planes
            .get_mut(plane)
            .map(Mapping::as_mut_slice)
            .ok_or(Error::InvalidState("plane index out of range"))
    }
}
