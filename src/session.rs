// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Exclusive access to the hardware decoder.
//!
//! The VC8000 exposes a single decode context, so every decode in the process
//! goes through one [`HardwareDecoder`]. Opening a [`DeviceSession`] takes the
//! decoder's lock before touching any device node and holds it until the
//! session is dropped.

use crate::{
    config::DecoderConfig,
    device::M2mDevice,
    error::{Error, Result},
    v4l2::V4l2Device,
};
use std::{
    fmt,
    path::Path,
    sync::{Mutex, MutexGuard, PoisonError},
};
use tracing::{debug, trace};

type Opener = dyn Fn(&DecoderConfig) -> Result<Box<dyn M2mDevice>> + Send + Sync;

/// Owner of the hardware decoder and its process-wide lock.
///
/// Share it between threads by reference (or `Arc`); concurrent callers of
/// [`HardwareDecoder::open`] are serialized.
pub struct HardwareDecoder {
    config: DecoderConfig,
    lock: Mutex<()>,
    opener: Box<Opener>,
}

impl fmt::Debug for HardwareDecoder {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("HardwareDecoder")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Default for HardwareDecoder {
    fn default() -> Self {
        Self::new(DecoderConfig::default())
    }
}

impl HardwareDecoder {
    /// Decoder that probes the V4L2 nodes listed in `config`.
    pub fn new(config: DecoderConfig) -> Self {
        Self::with_opener(config, probe)
    }

    /// Decoder whose device comes from `opener` instead of the V4L2 probe.
    ///
    /// The opener runs with the lock held, once per session.
    pub fn with_opener<F>(config: DecoderConfig, opener: F) -> Self
    where
        F: Fn(&DecoderConfig) -> Result<Box<dyn M2mDevice>> + Send + Sync + 'static,
    {
        Self {
            config,
            lock: Mutex::new(()),
            opener: Box::new(opener),
        }
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    /// Opens a session on the decoder, blocking while another session is
    /// live.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeviceUnavailable`] when hardware decode is disabled
    /// or no candidate node is a multi-planar streaming decoder. The lock is
    /// released before returning.
    pub fn open(&self) -> Result<DeviceSession<'_>> {
        if !self.config.hardware {
            return Err(Error::DeviceUnavailable);
        }

        // A panic in another session leaves no state behind the mutex.
        let guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        trace!("decoder lock acquired");

        let device = (self.opener)(&self.config)?;
        Ok(DeviceSession {
            device,
            config: &self.config,
            _guard: guard,
        })
    }
}

/// Probes the configured nodes in order and keeps the first decoder.
fn probe(config: &DecoderConfig) -> Result<Box<dyn M2mDevice>> {
    for path in &config.devices {
        match probe_node(path) {
            Ok(Some(device)) => return Ok(Box::new(device)),
            Ok(None) => {}
            Err(err) => debug!("skipping {}: {}", path.display(), err),
        }
    }
    Err(Error::DeviceUnavailable)
}

fn probe_node(path: &Path) -> std::io::Result<Option<V4l2Device>> {
    let mut device = V4l2Device::open(path)?;
    let caps = device.capabilities()?;
    if caps.is_mplane_decoder() {
        debug!(
            "using {} driver={} card={} caps={:#x}",
            path.display(),
            caps.driver,
            caps.card,
            caps.capabilities
        );
        Ok(Some(device))
    } else {
        debug!(
            "{} ({}) lacks multi-planar streaming decode, caps={:#x}",
            path.display(),
            caps.card,
            caps.capabilities
        );
        Ok(None)
    }
}

/// An open decoder device together with the lock that guards it.
///
/// Fields drop in declaration order, so the device is closed before the lock
/// is released.
pub struct DeviceSession<'a> {
    device: Box<dyn M2mDevice>,
    config: &'a DecoderConfig,
    _guard: MutexGuard<'a, ()>,
}

impl fmt::Debug for DeviceSession<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("DeviceSession").finish_non_exhaustive()
    }
}

impl<'a> DeviceSession<'a> {
    pub fn device(&mut self) -> &mut dyn M2mDevice {
        self.device.as_mut()
    }

    pub fn config(&self) -> &'a DecoderConfig {
        self.config
    }

    /// Closes the device and releases the lock.
    pub fn close(self) {
        drop(self);
        trace!("decoder lock released");
    }
}
