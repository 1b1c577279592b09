// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! [`M2mDevice`] backed by a real V4L2 device node.

use crate::device::{
    Capabilities, DequeuedBuffer, FormatRequest, M2mDevice, Mapping, NegotiatedFormat,
    PlaneInfo, PostProcessing, PpDestination, Queue, QueuedPlane, Readiness,
};
use std::{
    ffi::CStr,
    fs::OpenOptions,
    io,
    os::{
        fd::{AsRawFd, OwnedFd},
        raw::c_int,
    },
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::{debug, trace};
use vc8000_sys::{
    v4l2_buffer, v4l2_capability, v4l2_format, v4l2_plane, v4l2_requestbuffers, vc8k_pp_params,
    PP_OUT_DST_ADDRESS, V4L2_FIELD_NONE, V4L2_MEMORY_MMAP, VIDEO_MAX_PLANES,
};

/// An open V4L2 video device.
#[derive(Debug)]
pub struct V4l2Device {
    fd: OwnedFd,
    path: PathBuf,
}

fn errno<T, E: Into<io::Error>>(res: Result<T, E>) -> io::Result<()> {
    res.map(|_| ()).map_err(Into::into)
}

fn cstr(bytes: &[u8]) -> String {
    CStr::from_bytes_until_nul(bytes)
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|_| String::from_utf8_lossy(bytes).into_owned())
}

impl V4l2Device {
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        debug!("opened {} fd {}", path.display(), file.as_raw_fd());
        Ok(Self {
            fd: file.into(),
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn raw(&self) -> c_int {
        self.fd.as_raw_fd()
    }

    fn buffer(
        queue: Queue,
        planes: &mut [v4l2_plane; VIDEO_MAX_PLANES],
        num_planes: usize,
    ) -> v4l2_buffer {
        let mut buf = v4l2_buffer {
            type_: queue.buf_type(),
            memory: V4L2_MEMORY_MMAP,
            length: num_planes.min(VIDEO_MAX_PLANES) as u32,
            ..Default::default()
        };
        buf.m.planes = planes.as_mut_ptr();
        buf
    }
}

impl M2mDevice for V4l2Device {
    fn capabilities(&mut self) -> io::Result<Capabilities> {
        let mut cap = v4l2_capability::default();
        errno(unsafe { vc8000_sys::vidioc_querycap(self.raw(), &mut cap) })?;
        Ok(Capabilities {
            driver: cstr(&cap.driver),
            card: cstr(&cap.card),
            capabilities: cap.capabilities,
        })
    }

    fn set_format(
        &mut self,
        queue: Queue,
        request: &FormatRequest,
    ) -> io::Result<NegotiatedFormat> {
        let mut fmt = v4l2_format {
            type_: queue.buf_type(),
            ..Default::default()
        };
        unsafe {
            let pix = &mut fmt.fmt.pix_mp;
            pix.width = request.width;
            pix.height = request.height;
            pix.pixelformat = request.fourcc;
            pix.field = V4L2_FIELD_NONE;
            if let Some(size) = request.sizeimage {
                pix.plane_fmt[0].sizeimage = size;
            }
        }

        errno(unsafe { vc8000_sys::vidioc_s_fmt(self.raw(), &mut fmt) })?;

        let pix = unsafe { fmt.fmt.pix_mp };
        let plane_fmt = pix.plane_fmt;
        let num_planes = (pix.num_planes as usize).clamp(1, VIDEO_MAX_PLANES);
        let plane_sizes = plane_fmt[..num_planes]
            .iter()
            .map(|p| p.sizeimage)
            .collect();
        Ok(NegotiatedFormat {
            width: pix.width,
            height: pix.height,
            fourcc: pix.pixelformat,
            plane_sizes,
        })
    }

    fn request_buffers(&mut self, queue: Queue, count: u32) -> io::Result<u32> {
        let mut req = v4l2_requestbuffers {
            count,
            type_: queue.buf_type(),
            memory: V4L2_MEMORY_MMAP,
            ..Default::default()
        };
        errno(unsafe { vc8000_sys::vidioc_reqbufs(self.raw(), &mut req) })?;
        Ok(req.count)
    }

    fn query_buffer(
        &mut self,
        queue: Queue,
        index: u32,
        num_planes: usize,
    ) -> io::Result<Vec<PlaneInfo>> {
        let mut planes = [v4l2_plane::default(); VIDEO_MAX_PLANES];
        let mut buf = Self::buffer(queue, &mut planes, num_planes);
        buf.index = index;
        errno(unsafe { vc8000_sys::vidioc_querybuf(self.raw(), &mut buf) })?;
        Ok(planes[..buf.length as usize]
            .iter()
            .map(|p| PlaneInfo {
                length: p.length,
                mem_offset: unsafe { p.m.mem_offset },
            })
            .collect())
    }

    fn map_plane(&mut self, plane: &PlaneInfo) -> io::Result<Mapping> {
        Mapping::map_fd(self.raw(), plane.length as usize, plane.mem_offset)
    }

    fn queue_buffer(
        &mut self,
        queue: Queue,
        index: u32,
        lengths: &[QueuedPlane],
        flags: u32,
    ) -> io::Result<()> {
        let mut planes = [v4l2_plane::default(); VIDEO_MAX_PLANES];
        for (plane, len) in planes.iter_mut().zip(lengths) {
            plane.bytesused = len.bytes_used;
            plane.length = len.length;
        }
        let mut buf = Self::buffer(queue, &mut planes, lengths.len());
        buf.index = index;
        buf.flags = flags;
        errno(unsafe { vc8000_sys::vidioc_qbuf(self.raw(), &mut buf) })?;
        trace!("queued {} buffer {}", queue, index);
        Ok(())
    }

    fn dequeue_buffer(&mut self, queue: Queue, num_planes: usize) -> io::Result<DequeuedBuffer> {
        let mut planes = [v4l2_plane::default(); VIDEO_MAX_PLANES];
        let mut buf = Self::buffer(queue, &mut planes, num_planes);
        errno(unsafe { vc8000_sys::vidioc_dqbuf(self.raw(), &mut buf) })?;
        trace!(
            "dequeued {} buffer {} flags {:#x} bytesused {}",
            queue,
            buf.index,
            buf.flags,
            planes[0].bytesused
        );
        Ok(DequeuedBuffer {
            index: buf.index,
            flags: buf.flags,
            bytes_used: planes[0].bytesused,
        })
    }

    fn stream_on(&mut self, queue: Queue) -> io::Result<()> {
        let ty = queue.buf_type() as c_int;
        errno(unsafe { vc8000_sys::vidioc_streamon(self.raw(), &ty) })?;
        debug!("stream ON on {} queue", queue);
        Ok(())
    }

    fn stream_off(&mut self, queue: Queue) -> io::Result<()> {
        let ty = queue.buf_type() as c_int;
        errno(unsafe { vc8000_sys::vidioc_streamoff(self.raw(), &ty) })?;
        debug!("stream OFF on {} queue", queue);
        Ok(())
    }

    fn set_post_processing(&mut self, params: &PostProcessing) -> io::Result<()> {
        let (pp_out_dst, frame_buf_paddr, frame_buff_size) = match params.destination {
            PpDestination::Internal => (PP_OUT_DST_ADDRESS, 0, 0),
            PpDestination::FrameBuffer(n) => (n as c_int, 0, 0),
            PpDestination::Physical { address, size } => {
                (PP_OUT_DST_ADDRESS, address, size as c_int)
            }
        };
        let pp = vc8k_pp_params {
            enable_pp: params.enabled as c_int,
            frame_buf_paddr,
            frame_buff_size,
            frame_buf_w: params.surface_width as c_int,
            frame_buf_h: params.surface_height as c_int,
            img_out_x: params.x as c_int,
            img_out_y: params.y as c_int,
            img_out_w: params.width as c_int,
            img_out_h: params.height as c_int,
            img_out_fmt: params.fourcc as c_int,
            rotation: params.rotation,
            pp_out_dst,
            libjpeg_mode: 1,
            ..Default::default()
        };
        errno(unsafe { vc8000_sys::vc8kioc_pp_set_config(self.raw(), &pp) })?;
        debug!("post-processing {:?}", params);
        Ok(())
    }

    fn poll(&mut self, timeout: Option<Duration>) -> io::Result<Readiness> {
        let mut pfd = libc::pollfd {
            fd: self.raw(),
            events: libc::POLLIN
                | libc::POLLRDNORM
                | libc::POLLOUT
                | libc::POLLWRNORM
                | libc::POLLRDBAND
                | libc::POLLPRI,
            revents: 0,
        };
        let timeout_ms = timeout.map_or(-1, |t| t.as_millis().min(c_int::MAX as u128) as c_int);

        loop {
            match unsafe { libc::poll(&mut pfd, 1, timeout_ms) } {
                0 => return Err(io::Error::from(io::ErrorKind::TimedOut)),
                n if n < 0 => {
                    let err = io::Error::last_os_error();
                    if err.kind() == io::ErrorKind::Interrupted {
                        continue;
                    }
                    return Err(err);
                }
                _ => break,
            }
        }

        if pfd.revents & (libc::POLLERR | libc::POLLNVAL) != 0 {
            return Err(io::Error::other(format!(
                "device reported poll error (revents {:#x})",
                pfd.revents
            )));
        }

        Ok(Readiness {
            capture_ready: pfd.revents & (libc::POLLIN | libc::POLLRDNORM) != 0,
            output_drained: pfd.revents & (libc::POLLOUT | libc::POLLWRNORM) != 0,
        })
    }
}
