//! Mapping from logical stream names to transport-stream PIDs.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Highest valid 13-bit PID.
pub const MAX_PID: u16 = 0x1FFF;

/// Logical stream name.
///
/// Ordering is `Pmt < Video < Audio`, which is the order PID maps are
/// logged and programmed into the encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PidKind {
    /// Program Map Table.
    Pmt,
    /// Primary video elementary stream.
    Video,
    /// Primary audio elementary stream.
    Audio,
}

impl PidKind {
    /// All kinds in map order.
    pub const ALL: [PidKind; 3] = [PidKind::Pmt, PidKind::Video, PidKind::Audio];

    /// Lowercase name used in logs and JSON.
    pub fn as_str(&self) -> &'static str {
        match self {
            PidKind::Pmt => "pmt",
            PidKind::Video => "video",
            PidKind::Audio => "audio",
        }
    }
}

impl fmt::Display for PidKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered PID map. An absent entry is an unset PID.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PidMap(BTreeMap<PidKind, u16>);

impl PidMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a PID. Values outside the 13-bit range are ignored and leave
    /// the entry unset.
    pub fn insert(&mut self, kind: PidKind, pid: u16) {
        if pid <= MAX_PID {
            self.0.insert(kind, pid);
        }
    }

    /// Set a PID if one is present.
    pub fn insert_opt(&mut self, kind: PidKind, pid: Option<u16>) {
        if let Some(pid) = pid {
            self.insert(kind, pid);
        }
    }

    /// Look up a PID.
    pub fn get(&self, kind: PidKind) -> Option<u16> {
        self.0.get(&kind).copied()
    }

    /// Iterate set entries in map order.
    pub fn iter(&self) -> impl Iterator<Item = (PidKind, u16)> + '_ {
        self.0.iter().map(|(k, v)| (*k, *v))
    }

    /// Number of set entries.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when no PID is set.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for PidMap {
    /// Formats as `pmt=0x0064 video=0x0065`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (kind, pid) in self.iter() {
            if !first {
                f.write_str(" ")?;
            }
            write!(f, "{kind}={pid:#06x}")?;
            first = false;
        }
        Ok(())
    }
}

impl FromIterator<(PidKind, u16)> for PidMap {
    fn from_iter<I: IntoIterator<Item = (PidKind, u16)>>(iter: I) -> Self {
        let mut map = PidMap::new();
        for (kind, pid) in iter {
            map.insert(kind, pid);
        }
        map
    }
}
