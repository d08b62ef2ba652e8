//! Hardware transcoder devices.
//!
//! The set-top box exposes each transcoder as a character device that takes
//! raw transport stream on `write(2)`, produces transcoded transport stream on
//! `read(2)`, and is steered by a handful of bare ioctl codes. Encoding
//! parameters live in a per-encoder property directory under `/proc`.

use std::ffi::c_int;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};

use streamproxy_common::{Error, Result};

use crate::config::EncoderConfig;

mod ioctl {
    nix::ioctl_write_int_bad!(set_video_pid, 1);
    nix::ioctl_write_int_bad!(set_audio_pid, 2);
    nix::ioctl_write_int_bad!(set_pmt_pid, 3);
    nix::ioctl_none_bad!(start_transcoding, 100);
    nix::ioctl_none_bad!(stop_transcoding, 200);
}

/// Control operations understood by the transcoder driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlOp {
    /// Select the video PID to transcode.
    SetVideoPid,
    /// Select the audio PID to pass through.
    SetAudioPid,
    /// Select the PMT PID.
    SetPmtPid,
    /// Start transcoding. May block until the pipeline is up.
    StartTranscoding,
    /// Stop transcoding.
    StopTranscoding,
}

impl ControlOp {
    /// Numeric request code sent to the driver.
    pub fn code(self) -> u32 {
        match self {
            ControlOp::SetVideoPid => 1,
            ControlOp::SetAudioPid => 2,
            ControlOp::SetPmtPid => 3,
            ControlOp::StartTranscoding => 100,
            ControlOp::StopTranscoding => 200,
        }
    }

    /// Name used in errors and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            ControlOp::SetVideoPid => "set_video_pid",
            ControlOp::SetAudioPid => "set_audio_pid",
            ControlOp::SetPmtPid => "set_pmt_pid",
            ControlOp::StartTranscoding => "start_transcoding",
            ControlOp::StopTranscoding => "stop_transcoding",
        }
    }
}

impl fmt::Display for ControlOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A transcoder the encoder session can drive.
///
/// Implementations are shared with the startup helper thread, which issues
/// [`ControlOp::StartTranscoding`] while the control thread keeps polling the
/// device file.
pub trait TranscoderDevice: Send + Sync + 'static {
    /// The device file: written with source packets, read for output.
    fn file(&self) -> &File;

    /// Issue a control operation. `arg` is ignored by start and stop.
    fn control(&self, op: ControlOp, arg: u32) -> Result<()>;

    /// Read an encoder property.
    fn property(&self, name: &str) -> Result<String>;

    /// Write an encoder property.
    fn set_property(&self, name: &str, value: &str) -> Result<()>;
}

/// A transcoder character device plus its `/proc` property directory.
#[derive(Debug)]
pub struct HardwareEncoder {
    file: File,
    path: PathBuf,
    property_dir: PathBuf,
}

impl HardwareEncoder {
    /// Open the first free device listed in `config.device_paths`.
    ///
    /// The device's position in the list selects its property directory,
    /// `<property_root>/<index>`.
    pub fn open(config: &EncoderConfig) -> Result<Self> {
        let mut last_error = String::from("no device paths configured");

        for (index, path) in config.device_paths.iter().enumerate() {
            match OpenOptions::new().read(true).write(true).open(path) {
                Ok(file) => {
                    tracing::debug!(device = %path.display(), index, "Opened encoder device");
                    return Ok(Self {
                        file,
                        path: path.clone(),
                        property_dir: config.property_root.join(index.to_string()),
                    });
                }
                Err(e) => {
                    tracing::trace!(device = %path.display(), "Encoder device unavailable: {e}");
                    last_error = format!("{}: {e}", path.display());
                }
            }
        }

        Err(Error::device_control("open", last_error))
    }

    /// Path of the device node.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TranscoderDevice for HardwareEncoder {
    fn file(&self) -> &File {
        &self.file
    }

    fn control(&self, op: ControlOp, arg: u32) -> Result<()> {
        let fd = self.file.as_raw_fd();
        let arg = c_int::try_from(arg)
            .map_err(|_| Error::device_control(op.as_str(), format!("argument {arg} out of range")))?;
        tracing::trace!(%op, code = op.code(), arg, "Encoder control");

        // SAFETY: `fd` is owned by `self.file` and stays open for the call;
        // the driver's bad-ioctl requests take either nothing or an int.
        let result = unsafe {
            match op {
                ControlOp::SetVideoPid => ioctl::set_video_pid(fd, arg),
                ControlOp::SetAudioPid => ioctl::set_audio_pid(fd, arg),
                ControlOp::SetPmtPid => ioctl::set_pmt_pid(fd, arg),
                ControlOp::StartTranscoding => ioctl::start_transcoding(fd),
                ControlOp::StopTranscoding => ioctl::stop_transcoding(fd),
            }
        };

        result
            .map(drop)
            .map_err(|errno| Error::device_control(op.as_str(), errno.desc()))
    }

    fn property(&self, name: &str) -> Result<String> {
        let path = self.property_dir.join(name);
        fs::read_to_string(&path)
            .map(|value| value.trim().to_owned())
            .map_err(|e| Error::device_control(format!("getprop {name}"), e.to_string()))
    }

    fn set_property(&self, name: &str, value: &str) -> Result<()> {
        let path = self.property_dir.join(name);
        fs::write(&path, value)
            .map_err(|e| Error::device_control(format!("setprop {name}"), e.to_string()))
    }
}
