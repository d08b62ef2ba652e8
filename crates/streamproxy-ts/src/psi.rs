//! PAT and PMT section parsing.
//!
//! Only single-packet sections are handled, which covers the PAT and PMT of
//! broadcast recordings. CRCs are not verified.

/// Table id of the Program Association Table.
pub const TABLE_ID_PAT: u8 = 0x00;

/// Table id of the Program Map Table.
pub const TABLE_ID_PMT: u8 = 0x02;

const VIDEO_STREAM_TYPES: &[u8] = &[0x01, 0x02, 0x1B, 0x24];
const AUDIO_STREAM_TYPES: &[u8] = &[0x03, 0x04, 0x0F, 0x11, 0x81, 0x87];

/// One program listed in the PAT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramEntry {
    /// Program number (never 0; the network PID entry is dropped).
    pub program_number: u16,
    /// PID carrying the program's PMT.
    pub pmt_pid: u16,
}

/// One elementary stream listed in a PMT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementaryStream {
    /// ISO/IEC 13818-1 stream type.
    pub stream_type: u8,
    /// PID carrying the stream.
    pub pid: u16,
}

impl ElementaryStream {
    /// True for MPEG-1/2, H.264 and H.265 video.
    pub fn is_video(&self) -> bool {
        VIDEO_STREAM_TYPES.contains(&self.stream_type)
    }

    /// True for MPEG audio, AAC, AC-3 and E-AC-3.
    pub fn is_audio(&self) -> bool {
        AUDIO_STREAM_TYPES.contains(&self.stream_type)
    }
}

/// Parsed PMT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramMap {
    /// PID carrying the program clock reference.
    pub pcr_pid: u16,
    /// Elementary streams in declaration order.
    pub streams: Vec<ElementaryStream>,
}

impl ProgramMap {
    /// First declared video stream.
    pub fn video(&self) -> Option<ElementaryStream> {
        self.streams.iter().copied().find(ElementaryStream::is_video)
    }

    /// First declared audio stream.
    pub fn audio(&self) -> Option<ElementaryStream> {
        self.streams.iter().copied().find(ElementaryStream::is_audio)
    }
}

/// Locate the section that starts in a packet payload.
///
/// `payload` must come from a packet with the payload-unit-start flag set;
/// the leading pointer field is honoured.
pub fn section(payload: &[u8]) -> Option<&[u8]> {
    let pointer = usize::from(*payload.first()?);
    let body = payload.get(1 + pointer..)?;
    if body.len() < 3 {
        return None;
    }

    let section_length = (usize::from(body[1] & 0x0F) << 8) | usize::from(body[2]);
    body.get(..3 + section_length)
}

/// Parse a PAT section.
pub fn parse_pat(section: &[u8]) -> Option<Vec<ProgramEntry>> {
    if *section.first()? != TABLE_ID_PAT || section.len() < 12 {
        return None;
    }

    let end = section.len() - 4;
    let mut programs = Vec::new();

    for entry in section[8..end].chunks_exact(4) {
        let program_number = u16::from_be_bytes([entry[0], entry[1]]);
        let pid = (u16::from(entry[2] & 0x1F) << 8) | u16::from(entry[3]);
        if program_number != 0 {
            programs.push(ProgramEntry {
                program_number,
                pmt_pid: pid,
            });
        }
    }

    Some(programs)
}

/// Parse a PMT section.
pub fn parse_pmt(section: &[u8]) -> Option<ProgramMap> {
    if *section.first()? != TABLE_ID_PMT || section.len() < 16 {
        return None;
    }

    let end = section.len() - 4;
    let pcr_pid = (u16::from(section[8] & 0x1F) << 8) | u16::from(section[9]);
    let program_info_length = (usize::from(section[10] & 0x0F) << 8) | usize::from(section[11]);

    let mut pos = 12 + program_info_length;
    let mut streams = Vec::new();

    while pos + 5 <= end {
        let stream_type = section[pos];
        let pid = (u16::from(section[pos + 1] & 0x1F) << 8) | u16::from(section[pos + 2]);
        let es_info_length =
            (usize::from(section[pos + 3] & 0x0F) << 8) | usize::from(section[pos + 4]);

        streams.push(ElementaryStream { stream_type, pid });
        pos += 5 + es_info_length;
    }

    Some(ProgramMap { pcr_pid, streams })
}
