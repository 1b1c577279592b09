// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! The memory-to-memory device surface the decoder drives.
//!
//! [`M2mDevice`] is the seam between the decode state machine and the kernel:
//! [`crate::v4l2::V4l2Device`] implements it with real ioctls, and the test
//! suite substitutes an in-process simulation.

use std::{
    ffi::c_void,
    fmt, io,
    ptr::{null_mut, NonNull},
    slice::{from_raw_parts, from_raw_parts_mut},
    time::Duration,
};
use tracing::warn;
use vc8000_sys::{
    V4L2_BUF_TYPE_VIDEO_CAPTURE_MPLANE, V4L2_BUF_TYPE_VIDEO_OUTPUT_MPLANE,
    V4L2_CAP_STREAMING, V4L2_CAP_VIDEO_CAPTURE_MPLANE, V4L2_CAP_VIDEO_OUTPUT_MPLANE,
};

/// The two queues of a memory-to-memory decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Queue {
    /// Compressed bitstream going into the decoder.
    Output,
    /// Decoded pixels coming out of it.
    Capture,
}

impl Queue {
    pub const fn buf_type(self) -> u32 {
        match self {
            Queue::Output => V4L2_BUF_TYPE_VIDEO_OUTPUT_MPLANE,
            Queue::Capture => V4L2_BUF_TYPE_VIDEO_CAPTURE_MPLANE,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Queue::Output => "OUTPUT",
            Queue::Capture => "CAPTURE",
        }
    }
}

impl fmt::Display for Queue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub driver: String,
    pub card: String,
    pub capabilities: u32,
}

impl Capabilities {
    /// Multi-planar capture, multi-planar output and streaming I/O.
    pub fn is_mplane_decoder(&self) -> bool {
        let required =
            V4L2_CAP_VIDEO_CAPTURE_MPLANE | V4L2_CAP_VIDEO_OUTPUT_MPLANE | V4L2_CAP_STREAMING;
        self.capabilities & required == required
    }
}

/// Format requested with `VIDIOC_S_FMT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatRequest {
    pub width: u32,
    pub height: u32,
    pub fourcc: u32,
    /// Explicit first-plane size, for formats the kernel cannot size itself.
    pub sizeimage: Option<u32>,
}

/// Format the driver settled on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiatedFormat {
    pub width: u32,
    pub height: u32,
    pub fourcc: u32,
    /// One entry per plane.
    pub plane_sizes: Vec<u32>,
}

/// Plane geometry reported by `VIDIOC_QUERYBUF`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaneInfo {
    pub length: u32,
    pub mem_offset: u32,
}

/// Per-plane sizes handed to `VIDIOC_QBUF`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueuedPlane {
    pub bytes_used: u32,
    pub length: u32,
}

/// What `VIDIOC_DQBUF` returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DequeuedBuffer {
    pub index: u32,
    pub flags: u32,
    /// Bytes used in the first plane.
    pub bytes_used: u32,
}

/// Events reported by one wait on the device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Readiness {
    /// A CAPTURE buffer can be dequeued.
    pub capture_ready: bool,
    /// An OUTPUT buffer has been consumed and can be dequeued.
    pub output_drained: bool,
}

/// Where the post-processor writes its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PpDestination {
    /// The CAPTURE buffer negotiated on the queue.
    Internal,
    FrameBuffer(u32),
    Physical { address: u32, size: u32 },
}

/// Post-processing record exchanged with the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostProcessing {
    pub enabled: bool,
    pub destination: PpDestination,
    pub surface_width: u32,
    pub surface_height: u32,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub fourcc: u32,
    pub rotation: i32,
}

/// Memory-to-memory decoder device.
///
/// Methods map one-to-one onto the V4L2 calls the decode protocol needs;
/// implementations perform no bookkeeping of their own beyond what the
/// hardware does.
pub trait M2mDevice: Send {
    fn capabilities(&mut self) -> io::Result<Capabilities>;

    fn set_format(&mut self, queue: Queue, request: &FormatRequest)
        -> io::Result<NegotiatedFormat>;

    /// Requests `count` buffers; zero frees them. Returns the granted count.
    fn request_buffers(&mut self, queue: Queue, count: u32) -> io::Result<u32>;

    fn query_buffer(
        &mut self,
        queue: Queue,
        index: u32,
        num_planes: usize,
    ) -> io::Result<Vec<PlaneInfo>>;

    fn map_plane(&mut self, plane: &PlaneInfo) -> io::Result<Mapping>;

    fn queue_buffer(
        &mut self,
        queue: Queue,
        index: u32,
        planes: &[QueuedPlane],
        flags: u32,
    ) -> io::Result<()>;

    fn dequeue_buffer(&mut self, queue: Queue, num_planes: usize)
        -> io::Result<DequeuedBuffer>;

    fn stream_on(&mut self, queue: Queue) -> io::Result<()>;

    fn stream_off(&mut self, queue: Queue) -> io::Result<()>;

    fn set_post_processing(&mut self, params: &PostProcessing) -> io::Result<()>;

    /// Waits for queue events. `None` blocks until something happens.
    fn poll(&mut self, timeout: Option<Duration>) -> io::Result<Readiness>;
}

impl<D: M2mDevice + ?Sized> M2mDevice for Box<D> {
    fn capabilities(&mut self) -> io::Result<Capabilities> {
        (**self).capabilities()
    }

    fn set_format(
        &mut self,
        queue: Queue,
        request: &FormatRequest,
    ) -> io::Result<NegotiatedFormat> {
        (**self).set_format(queue, request)
    }

    fn request_buffers(&mut self, queue: Queue, count: u32) -> io::Result<u32> {
        (**self).request_buffers(queue, count)
    }

    fn query_buffer(
        &mut self,
        queue: Queue,
        index: u32,
        num_planes: usize,
    ) -> io::Result<Vec<PlaneInfo>> {
        (**self).query_buffer(queue, index, num_planes)
    }

    fn map_plane(&mut self, plane: &PlaneInfo) -> io::Result<Mapping> {
        (**self).map_plane(plane)
    }

    fn queue_buffer(
        &mut self,
        queue: Queue,
        index: u32,
        planes: &[QueuedPlane],
        flags: u32,
    ) -> io::Result<()> {
        (**self).queue_buffer(queue, index, planes, flags)
    }

    fn dequeue_buffer(&mut self, queue: Queue, num_planes: usize) -> io::Result<DequeuedBuffer> {
        (**self).dequeue_buffer(queue, num_planes)
    }

    fn stream_on(&mut self, queue: Queue) -> io::Result<()> {
        (**self).stream_on(queue)
    }

    fn stream_off(&mut self, queue: Queue) -> io::Result<()> {
        (**self).stream_off(queue)
    }

    fn set_post_processing(&mut self, params: &PostProcessing) -> io::Result<()> {
        (**self).set_post_processing(params)
    }

    fn poll(&mut self, timeout: Option<Duration>) -> io::Result<Readiness> {
        (**self).poll(timeout)
    }
}

/// A shared memory mapping of one buffer plane.
///
/// The region is unmapped when dropped. Access is mediated by the buffer
/// plane manager, which only hands out slices while userspace owns the
/// buffer.
pub struct Mapping {
    ptr: NonNull<u8>,
    len: usize,
}

// SAFETY: the mapping is a plain memory region; exclusive access is enforced
// by `&mut self` on every mutable accessor.
unsafe impl Send for Mapping {}

impl Mapping {
    /// Maps `len` bytes of `fd` at `offset`, shared and read/write.
    pub fn map_fd(fd: i32, len: usize, offset: u32) -> io::Result<Self> {
        let ptr = unsafe {
            libc::mmap(
                null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                offset as libc::off_t,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: mmap succeeded, so ptr is a live mapping of len bytes.
        Ok(unsafe { Self::from_raw(ptr.cast(), len) })
    }

    /// Anonymous shared mapping, used by devices that emulate the hardware
    /// in process.
    pub fn anonymous(len: usize) -> io::Result<Self> {
        let ptr = unsafe {
            libc::mmap(
                null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: as above.
        Ok(unsafe { Self::from_raw(ptr.cast(), len) })
    }

    /// Wraps an existing mapping.
    ///
    /// # Safety
    ///
    /// `ptr` must be the start of a live `mmap` region of exactly `len`
    /// bytes that nothing else will unmap.
    pub unsafe fn from_raw(ptr: *mut u8, len: usize) -> Self {
        Self {
            ptr: NonNull::new_unchecked(ptr),
            len,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Base address, for devices that need to write into the region the way
    /// DMA would.
    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    pub(crate) fn as_slice(&self) -> &[u8] {
        unsafe { from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    pub(crate) fn as_mut_slice(&mut self) -> &mut [u8] {
        unsafe { from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl fmt::Debug for Mapping {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Mapping({:p}, {} bytes)", self.ptr, self.len)
    }
}

impl Drop for Mapping {
    fn drop(&mut self) {
        if unsafe { libc::munmap(self.ptr.as_ptr().cast::<c_void>(), self.len) } != 0 {
            warn!(
                "unmap of {:p} ({} bytes) failed: {}",
                self.ptr,
                self.len,
                io::Error::last_os_error()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_triplet() {
        let mut caps = Capabilities {
            capabilities: V4L2_CAP_VIDEO_CAPTURE_MPLANE | V4L2_CAP_VIDEO_OUTPUT_MPLANE,
            ..Default::default()
        };
        assert!(!caps.is_mplane_decoder());
        caps.capabilities |= V4L2_CAP_STREAMING;
        assert!(caps.is_mplane_decoder());
    }

    #[test]
    fn anonymous_mapping_is_writable() {
        let mut map = Mapping::anonymous(4096).unwrap();
        map.as_mut_slice()[4095] = 0xAB;
        assert_eq!(map.as_slice()[4095], 0xAB);
        assert_eq!(map.len(), 4096);
    }
}
