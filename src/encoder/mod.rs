//! Hardware encoder sessions.
//!
//! An [`EncoderSession`] owns one transcoder device for the lifetime of a
//! transfer. Starting the device is a two-phase affair: [`EncoderSession::start_init`]
//! hands the blocking start command to a helper thread and returns at once,
//! and [`EncoderSession::start_finish`] is polled until the session reports
//! that it is running. The transfer loop never blocks on startup latency.

mod device;
mod startup;
mod state;

pub use device::{ControlOp, HardwareEncoder, TranscoderDevice};
pub use startup::{StartupTask, TaskPoll};
pub use state::{EncoderEvent, EncoderState};

use std::fs::File;
use std::sync::Arc;

use streamproxy_common::{EncodingParams, Error, PidKind, PidMap, Result};

/// Encoder properties written from [`EncodingParams`], in write order.
const PROPERTY_NAMES: [&str; 5] = ["display_format", "bitrate", "profile", "level", "bframe"];

/// One transcoder device driven through its lifecycle.
pub struct EncoderSession<D: TranscoderDevice> {
    device: Option<Arc<D>>,
    state: EncoderState,
    startup: Option<StartupTask<Result<()>>>,
    pids: PidMap,
}

impl<D: TranscoderDevice> EncoderSession<D> {
    /// Configure `device` with `params` and program the stream PIDs.
    ///
    /// Empty parameters and unset PIDs are skipped. The session starts in
    /// [`EncoderState::Idle`].
    pub fn new(device: D, pids: &PidMap, params: &EncodingParams) -> Result<Self> {
        let mut session = Self {
            device: Some(Arc::new(device)),
            state: EncoderState::Idle,
            startup: None,
            pids: PidMap::new(),
        };

        let values = [
            &params.frame_size,
            &params.bitrate,
            &params.profile,
            &params.level,
            &params.bframes,
        ];
        for (name, value) in PROPERTY_NAMES.iter().zip(values) {
            if !value.is_empty() {
                session.setprop(name, value)?;
            }
        }

        for (kind, op) in [
            (PidKind::Video, ControlOp::SetVideoPid),
            (PidKind::Audio, ControlOp::SetAudioPid),
            (PidKind::Pmt, ControlOp::SetPmtPid),
        ] {
            if let Some(pid) = pids.get(kind) {
                session.live_device()?.control(op, u32::from(pid))?;
                session.pids.insert(kind, pid);
            }
        }

        Ok(session)
    }

    /// Read an encoder property.
    pub fn getprop(&self, name: &str) -> Result<String> {
        self.live_device()?.property(name)
    }

    /// Write an encoder property.
    pub fn setprop(&self, name: &str, value: &str) -> Result<()> {
        tracing::trace!(property = name, value, "Setting encoder property");
        self.live_device()?.set_property(name, value)
    }

    /// PIDs programmed into the device.
    pub fn pids(&self) -> &PidMap {
        &self.pids
    }

    /// Current lifecycle state.
    pub fn state(&self) -> EncoderState {
        self.state
    }

    /// True once the startup handshake has completed.
    pub fn is_running(&self) -> bool {
        self.state == EncoderState::Running
    }

    /// The device file, until the session is stopped.
    pub fn file(&self) -> Option<&File> {
        self.device.as_deref().map(TranscoderDevice::file)
    }

    /// Launch the start command on a helper thread.
    ///
    /// Returns immediately; `true` means the thread is running and the
    /// session moved to [`EncoderState::Initializing`]. Only valid from
    /// [`EncoderState::Idle`].
    pub fn start_init(&mut self) -> bool {
        if self.state != EncoderState::Idle {
            return false;
        }
        let Some(device) = self.device.clone() else {
            return false;
        };

        let task = StartupTask::spawn("encoder-start", move || {
            device.control(ControlOp::StartTranscoding, 0)
        });

        match task {
            Ok(task) => {
                self.startup = Some(task);
                self.transition(EncoderEvent::StartLaunched);
                true
            }
            Err(e) => {
                tracing::warn!("Failed to launch encoder start thread: {e}");
                false
            }
        }
    }

    /// Observe startup progress without blocking.
    ///
    /// Returns `Ok(false)` while the start command is in flight and on the
    /// cycle that observes its completion, then `Ok(true)` exactly once when
    /// the session enters [`EncoderState::Running`]. A failed start command
    /// is returned as its device-control error.
    pub fn start_finish(&mut self) -> Result<bool> {
        match self.state {
            EncoderState::Initializing => {
                let Some(task) = self.startup.as_mut() else {
                    return Ok(false);
                };

                let outcome = match task.poll() {
                    TaskPoll::Pending => return Ok(false),
                    TaskPoll::Ready(outcome) => outcome,
                };
                self.startup = None;

                match outcome {
                    Ok(Ok(())) => {
                        self.transition(EncoderEvent::StartCompleted);
                        Ok(false)
                    }
                    Ok(Err(e)) => Err(e),
                    Err(_) => Err(Error::device_control(
                        ControlOp::StartTranscoding.as_str(),
                        "start thread panicked",
                    )),
                }
            }
            EncoderState::Starting => {
                self.transition(EncoderEvent::Confirmed);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Drive the lifecycle one step and return the resulting state.
    ///
    /// Idle sessions launch their start command; sessions in the handshake
    /// check for completion; running and stopped sessions are left alone.
    pub fn advance(&mut self) -> Result<EncoderState> {
        match self.state {
            EncoderState::Idle => {
                if !self.start_init() {
                    return Err(Error::device_control(
                        ControlOp::StartTranscoding.as_str(),
                        "could not launch start thread",
                    ));
                }
            }
            EncoderState::Initializing | EncoderState::Starting => {
                self.start_finish()?;
            }
            EncoderState::Running | EncoderState::Stopped => {}
        }
        Ok(self.state)
    }

    /// Stop the device and release it.
    ///
    /// Safe from every state and idempotent. The stop command is only sent
    /// once a start has been attempted; a start still in flight is joined
    /// after the stop command so the driver can abort it.
    pub fn stop(&mut self) {
        if self.state == EncoderState::Stopped {
            return;
        }
        let previous = self.state;

        if previous != EncoderState::Idle {
            if let Some(device) = &self.device {
                if let Err(e) = device.control(ControlOp::StopTranscoding, 0) {
                    tracing::warn!("Encoder stop failed: {e}");
                }
            }
        }

        if let Some(mut task) = self.startup.take() {
            match task.join() {
                Some(Ok(Err(e))) => tracing::debug!("Encoder start aborted: {e}"),
                Some(Err(_)) => tracing::warn!("Encoder start thread panicked"),
                _ => {}
            }
        }

        self.device = None;
        self.transition(EncoderEvent::Stop);
        tracing::debug!(from = %previous, "Encoder stopped");
    }

    fn live_device(&self) -> Result<&Arc<D>> {
        self.device
            .as_ref()
            .ok_or_else(|| Error::device_control("device", "encoder session is stopped"))
    }

    fn transition(&mut self, event: EncoderEvent) {
        match self.state.on(event) {
            Some(next) => {
                tracing::trace!(from = %self.state, to = %next, "Encoder state change");
                self.state = next;
            }
            None => {
                tracing::warn!(state = %self.state, ?event, "Ignoring invalid encoder event");
            }
        }
    }
}

impl<D: TranscoderDevice> Drop for EncoderSession<D> {
    fn drop(&mut self) {
        self.stop();
    }
}
