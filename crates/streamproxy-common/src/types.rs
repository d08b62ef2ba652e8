//! Request-level types handed from the request handler to the transfer engine.

use serde::{Deserialize, Serialize};

/// Encoder parameters.
///
/// Values are opaque strings passed through to the encoder unmodified; an
/// empty string leaves the device's current setting in place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodingParams {
    /// Output frame size, e.g. `720p`.
    #[serde(default)]
    pub frame_size: String,
    /// Output bitrate.
    #[serde(default)]
    pub bitrate: String,
    /// H.264 profile.
    #[serde(default)]
    pub profile: String,
    /// H.264 level.
    #[serde(default)]
    pub level: String,
    /// Number of B-frames.
    #[serde(default)]
    pub bframes: String,
}

impl EncodingParams {
    /// Fill every empty field from `defaults`.
    pub fn or_defaults(mut self, defaults: &EncodingParams) -> Self {
        fn fill(field: &mut String, default: &str) {
            if field.is_empty() {
                *field = default.to_owned();
            }
        }

        fill(&mut self.frame_size, &defaults.frame_size);
        fill(&mut self.bitrate, &defaults.bitrate);
        fill(&mut self.profile, &defaults.profile);
        fill(&mut self.level, &defaults.level);
        fill(&mut self.bframes, &defaults.bframes);
        self
    }
}

/// How a recording is delivered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamAction {
    /// Send the recording unchanged.
    Stream,
    /// Send the recording through the hardware encoder.
    #[default]
    Transcode,
}

impl StreamAction {
    /// Parse a request value; `None` for anything unrecognised.
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "stream" => Some(StreamAction::Stream),
            "transcode" => Some(StreamAction::Transcode),
            _ => None,
        }
    }
}

/// Requested start position.
///
/// At most one of the offsets is honoured: a byte offset wins over a
/// percentage, which wins over a time offset. Zero means "not requested".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeekRequest {
    /// Absolute byte offset.
    pub byte_offset: u64,
    /// Percentage of the stream length (0..=100).
    pub pct_offset: u32,
    /// Seconds from the start of the recording.
    pub time_offset_s: u32,
}

impl SeekRequest {
    /// Request starting at `byte_offset`.
    pub fn bytes(byte_offset: u64) -> Self {
        Self {
            byte_offset,
            ..Self::default()
        }
    }

    /// Request starting at `pct` percent of the stream.
    pub fn percent(pct: u32) -> Self {
        Self {
            pct_offset: pct,
            ..Self::default()
        }
    }

    /// Request starting `secs` seconds into the recording.
    pub fn time(secs: u32) -> Self {
        Self {
            time_offset_s: secs,
            ..Self::default()
        }
    }

    /// True when a time offset is requested; sources need to index PCRs
    /// up front to honour it.
    pub fn wants_time_seek(&self) -> bool {
        self.time_offset_s > 0
    }
}
