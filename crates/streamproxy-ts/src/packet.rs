//! Transport-stream packet layout.

/// Size of one transport-stream packet.
pub const PACKET_SIZE: usize = 188;

/// First byte of every packet.
pub const SYNC_BYTE: u8 = 0x47;

/// PID carrying the Program Association Table.
pub const PAT_PID: u16 = 0x0000;

/// Fixed 4-byte packet header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    /// Transport error indicator.
    pub transport_error: bool,
    /// Payload unit start indicator.
    pub payload_unit_start: bool,
    /// 13-bit packet identifier.
    pub pid: u16,
    /// Adaptation field present.
    pub has_adaptation: bool,
    /// Payload present.
    pub has_payload: bool,
    /// Continuity counter.
    pub continuity: u8,
}

impl PacketHeader {
    /// Parse the header of `packet`. Returns `None` without a sync byte.
    pub fn parse(packet: &[u8]) -> Option<Self> {
        if packet.len() < 4 || packet[0] != SYNC_BYTE {
            return None;
        }

        Some(Self {
            transport_error: packet[1] & 0x80 != 0,
            payload_unit_start: packet[1] & 0x40 != 0,
            pid: (u16::from(packet[1] & 0x1F) << 8) | u16::from(packet[2]),
            has_adaptation: packet[3] & 0x20 != 0,
            has_payload: packet[3] & 0x10 != 0,
            continuity: packet[3] & 0x0F,
        })
    }
}

/// Payload bytes of a packet, after any adaptation field.
pub fn payload(packet: &[u8]) -> Option<&[u8]> {
    let header = PacketHeader::parse(packet)?;
    if !header.has_payload || header.transport_error {
        return None;
    }

    let start = if header.has_adaptation {
        5 + usize::from(*packet.get(4)?)
    } else {
        4
    };

    packet.get(start..PACKET_SIZE.min(packet.len()))
}

/// 33-bit PCR base (90 kHz units) carried in the adaptation field, if any.
pub fn pcr_base(packet: &[u8]) -> Option<u64> {
    let header = PacketHeader::parse(packet)?;
    if !header.has_adaptation || header.transport_error {
        return None;
    }

    let length = usize::from(*packet.get(4)?);
    if length < 7 {
        return None;
    }

    let af = packet.get(5..12)?;
    let pcr_flag = af[0] & 0x10 != 0;
    if !pcr_flag {
        return None;
    }

    Some(
        (u64::from(af[1]) << 25)
            | (u64::from(af[2]) << 17)
            | (u64::from(af[3]) << 9)
            | (u64::from(af[4]) << 1)
            | (u64::from(af[5]) >> 7),
    )
}

/// Convert a 90 kHz PCR base to milliseconds.
pub fn pcr_base_to_ms(base: u64) -> u64 {
    base / 90
}

/// Round `offset` down to a packet boundary.
pub fn align_down(offset: u64) -> u64 {
    offset - offset % PACKET_SIZE as u64
}
