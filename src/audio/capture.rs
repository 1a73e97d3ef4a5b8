//! System audio capture on a dedicated thread.
//!
//! The capture thread owns the `cpal::Stream` exclusively (streams are
//! not `Send`). The stream callback downmixes interleaved hardware
//! buffers to mono f32 and publishes complete chunks into the shared
//! [`FrameSlot`]; the thread itself only parks between health checks
//! and rebuilds the stream after errors.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SampleFormat;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use super::shared::FrameSlot;
use crate::error::Error;
use crate::params::AudioParams;

/// Input-device name fragments that indicate a system-loopback source
/// ("what you hear"), checked case-insensitively.
const LOOPBACK_HINTS: [&str; 3] = ["loopback", "monitor", "stereo mix"];

/// Consecutive stream failures tolerated before capture gives up.
const MAX_STREAM_RETRIES: u32 = 5;

/// Base backoff between stream rebuild attempts (grows linearly).
const RETRY_BACKOFF: Duration = Duration::from_millis(250);

/// How often the capture thread wakes to check its flags.
const HEALTH_CHECK_INTERVAL: Duration = Duration::from_millis(100);

/// Negotiated stream parameters, reported once the device opens.
#[derive(Debug, Clone)]
pub struct StreamInfo {
    pub device_name: String,
    pub sample_rate: u32,
    pub channels: u16,
}

/// An available capture device, for `--list-devices`.
#[derive(Debug)]
pub struct DeviceInfo {
    pub name: String,
    pub is_default: bool,
}

/// Owns the capture thread and the shared frame slot.
pub struct CaptureSource {
    params: AudioParams,
    device_hint: Option<String>,
    slot: Arc<FrameSlot>,
    running: Arc<AtomicBool>,
    failed: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
    stream_info: Option<StreamInfo>,
}

impl CaptureSource {
    /// Construct without touching hardware.
    ///
    /// `device_hint` is a case-insensitive substring matched against
    /// input device names, overriding the loopback heuristic.
    pub fn new(params: AudioParams, device_hint: Option<String>) -> Self {
        let slot = Arc::new(FrameSlot::new(params.chunk_size));
        Self {
            params,
            device_hint,
            slot,
            running: Arc::new(AtomicBool::new(false)),
            failed: Arc::new(AtomicBool::new(false)),
            thread: None,
            stream_info: None,
        }
    }

    /// The slot the capture callback publishes into.
    pub fn frames(&self) -> Arc<FrameSlot> {
        Arc::clone(&self.slot)
    }

    /// Negotiated hardware sample rate, once capture has started.
    pub fn sample_rate(&self) -> Option<u32> {
        self.stream_info.as_ref().map(|info| info.sample_rate)
    }

    /// True once capture has given up after repeated device loss.
    pub fn failed(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }

    /// Open a device and start the capture thread.
    ///
    /// Blocks until the thread reports its first device-open attempt,
    /// so a missing device surfaces here as [`Error::Device`]. Calling
    /// while already running is a no-op.
    pub fn start(&mut self) -> Result<(), Error> {
        if self.thread.is_some() {
            return Ok(());
        }

        self.failed.store(false, Ordering::Release);
        self.running.store(true, Ordering::Release);

        let worker = CaptureWorker {
            chunk_size: self.params.chunk_size,
            device_hint: self.device_hint.clone(),
            slot: Arc::clone(&self.slot),
            running: Arc::clone(&self.running),
            failed: Arc::clone(&self.failed),
        };

        let (ready_tx, ready_rx) = mpsc::channel();
        let handle = thread::Builder::new()
            .name("audio-capture".to_string())
            .spawn(move || worker.run(ready_tx))
            .map_err(|e| Error::Capture(format!("failed to spawn capture thread: {e}")))?;

        match ready_rx.recv() {
            Ok(Ok(info)) => {
                log::info!(
                    "capture started on '{}' ({} Hz, {} ch)",
                    info.device_name,
                    info.sample_rate,
                    info.channels
                );
                self.stream_info = Some(info);
                self.thread = Some(handle);
                Ok(())
            }
            Ok(Err(e)) => {
                self.running.store(false, Ordering::Release);
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                self.running.store(false, Ordering::Release);
                let _ = handle.join();
                Err(Error::Capture(
                    "capture thread exited before reporting a device".to_string(),
                ))
            }
        }
    }

    /// Signal the thread to exit and wait for the device to be
    /// released. Safe to call at any time, any number of times.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.thread.take() {
            handle.thread().unpark();
            if handle.join().is_err() {
                log::warn!("capture thread panicked during shutdown");
            }
        }
        self.stream_info = None;
    }
}

impl Drop for CaptureSource {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Everything the capture thread needs, moved into it at spawn.
struct CaptureWorker {
    chunk_size: usize,
    device_hint: Option<String>,
    slot: Arc<FrameSlot>,
    running: Arc<AtomicBool>,
    failed: Arc<AtomicBool>,
}

impl CaptureWorker {
    fn run(self, ready_tx: mpsc::Sender<Result<StreamInfo, Error>>) {
        let host = cpal::default_host();
        let mut reported = false;
        let mut attempt: u32 = 0;

        while self.running.load(Ordering::Acquire) {
            // Stream errors land here asynchronously; data resets the
            // health flag so only *consecutive* failures count.
            let stream_error = Arc::new(AtomicBool::new(false));
            let healthy = Arc::new(AtomicBool::new(false));

            match self.open_stream(&host, &stream_error, &healthy) {
                Ok((stream, info)) => {
                    if !reported {
                        let _ = ready_tx.send(Ok(info));
                        reported = true;
                    }

                    while self.running.load(Ordering::Acquire)
                        && !stream_error.load(Ordering::Acquire)
                    {
                        thread::park_timeout(HEALTH_CHECK_INTERVAL);
                    }
                    drop(stream);

                    if !self.running.load(Ordering::Acquire) {
                        break;
                    }
                    attempt = if healthy.load(Ordering::Acquire) {
                        1
                    } else {
                        attempt + 1
                    };
                }
                Err(e) => {
                    if !reported {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                    attempt += 1;
                    log::warn!("stream rebuild failed (attempt {attempt}): {e}");
                }
            }

            if attempt >= MAX_STREAM_RETRIES {
                log::error!("device lost; giving up after {attempt} consecutive failures");
                self.failed.store(true, Ordering::Release);
                break;
            }
            if attempt > 0 {
                log::warn!("audio stream lost; retrying (attempt {attempt})");
                thread::sleep(RETRY_BACKOFF * attempt);
            }
        }
    }

    fn open_stream(
        &self,
        host: &cpal::Host,
        stream_error: &Arc<AtomicBool>,
        healthy: &Arc<AtomicBool>,
    ) -> Result<(cpal::Stream, StreamInfo), Error> {
        let device = select_device(host, self.device_hint.as_deref())?;
        let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());

        let supported = device
            .default_input_config()
            .map_err(|e| Error::Device(format!("no input config for '{device_name}': {e}")))?;
        let sample_format = supported.sample_format();
        let config: cpal::StreamConfig = supported.into();
        let channels = config.channels;
        let sample_rate = config.sample_rate.0;

        let stream = match sample_format {
            SampleFormat::F32 => self.build_stream::<f32>(&device, &config, stream_error, healthy),
            SampleFormat::I16 => self.build_stream::<i16>(&device, &config, stream_error, healthy),
            SampleFormat::U16 => self.build_stream::<u16>(&device, &config, stream_error, healthy),
            other => Err(Error::Device(format!(
                "unsupported sample format {other:?} on '{device_name}'"
            ))),
        }?;

        stream
            .play()
            .map_err(|e| Error::Capture(format!("failed to start stream: {e}")))?;

        Ok((
            stream,
            StreamInfo {
                device_name,
                sample_rate,
                channels,
            },
        ))
    }

    /// Build an input stream that downmixes to mono and publishes
    /// complete chunks. Short deliveries accumulate until a full chunk
    /// exists; the remainder carries over, so published frames are
    /// always exactly `chunk_size` samples.
    fn build_stream<T>(
        &self,
        device: &cpal::Device,
        config: &cpal::StreamConfig,
        stream_error: &Arc<AtomicBool>,
        healthy: &Arc<AtomicBool>,
    ) -> Result<cpal::Stream, Error>
    where
        T: cpal::SizedSample + Send + 'static,
        f32: cpal::FromSample<T>,
    {
        let channels = config.channels.max(1) as usize;
        let chunk_size = self.chunk_size;
        let slot = Arc::clone(&self.slot);
        let healthy = Arc::clone(healthy);
        let stream_error = Arc::clone(stream_error);
        let mut acc: Vec<f32> = Vec::with_capacity(chunk_size * 2);

        device
            .build_input_stream(
                config,
                move |data: &[T], _: &cpal::InputCallbackInfo| {
                    for frame in data.chunks(channels) {
                        let mut sum = 0.0f32;
                        for &s in frame {
                            let v: f32 = cpal::Sample::from_sample(s);
                            sum += v;
                        }
                        acc.push(sum / frame.len() as f32);
                    }
                    while acc.len() >= chunk_size {
                        slot.publish(&acc[..chunk_size]);
                        acc.drain(..chunk_size);
                        healthy.store(true, Ordering::Release);
                    }
                },
                move |err| {
                    log::warn!("audio stream error: {err}");
                    stream_error.store(true, Ordering::Release);
                },
                None,
            )
            .map_err(|e| Error::Capture(format!("failed to build input stream: {e}")))
    }
}

/// Pick a capture device: explicit hint first, then a loopback-named
/// device, then the host default input.
fn select_device(host: &cpal::Host, hint: Option<&str>) -> Result<cpal::Device, Error> {
    let input_devices = || {
        host.input_devices()
            .map_err(|e| Error::Device(format!("cannot enumerate input devices: {e}")))
    };

    if let Some(hint) = hint {
        let needle = hint.to_lowercase();
        for device in input_devices()? {
            if let Ok(name) = device.name() {
                if name.to_lowercase().contains(&needle) {
                    return Ok(device);
                }
            }
        }
        return Err(Error::Device(format!(
            "no input device matching '{hint}'"
        )));
    }

    for device in input_devices()? {
        if let Ok(name) = device.name() {
            let lower = name.to_lowercase();
            if LOOPBACK_HINTS.iter().any(|h| lower.contains(h)) {
                log::info!("using loopback device '{name}'");
                return Ok(device);
            }
        }
    }

    log::warn!("no loopback device found; falling back to default input");
    host.default_input_device()
        .ok_or_else(|| Error::Device("no default input device".to_string()))
}

/// List capture devices for `--list-devices`.
pub fn list_devices() -> Result<Vec<DeviceInfo>, Error> {
    let host = cpal::default_host();
    let default_name = host
        .default_input_device()
        .and_then(|d| d.name().ok());

    let devices = host
        .input_devices()
        .map_err(|e| Error::Device(format!("cannot enumerate input devices: {e}")))?;

    Ok(devices
        .filter_map(|device| device.name().ok())
        .map(|name| {
            let is_default = default_name.as_deref() == Some(name.as_str());
            DeviceInfo { name, is_default }
        })
        .collect())
}
