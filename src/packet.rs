//! Opus packet framing.
//!
//! Implements the table-of-contents byte and the multi-frame packet layouts
//! from [section 3 of RFC 6716](https://datatracker.ietf.org/doc/html/rfc6716#section-3):
//! TOC synthesis, the one/two-byte frame length code, and the packet walker
//! that validates codes 0 to 3 including padding and self-delimited framing.

use bitflags::bitflags;
use log::trace;

/// Hard protocol limit: 120 ms of 2.5 ms frames.
pub const MAX_FRAMES_PER_PACKET: usize = 48;

/// Largest frame size representable by the two-byte length code.
pub const MAX_FRAME_BYTES: usize = 1275;

/// The remaining two bits of the `TOC` byte, labeled `c`, code the number
/// of frames per packet (codes 0 to 3) as follows
///
/// See [section-3.1](https://datatracker.ietf.org/doc/html/rfc6716#section-3.1)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameCountCode {
    /// 1 frame in the packet
    Single = 0,
    /// 2 frames in the packet, each with equal compressed size
    DoubleEqual = 1,
    /// 2 frames in the packet, with different compressed sizes
    DoubleDifferent = 2,
    /// an arbitrary number of frames in the packet
    Arbitrary = 3,
}

impl FrameCountCode {
    #[inline]
    pub const fn from_toc(toc: u8) -> Self {
        match toc & 0x03 {
            0 => FrameCountCode::Single,
            1 => FrameCountCode::DoubleEqual,
            2 => FrameCountCode::DoubleDifferent,
            _ => FrameCountCode::Arbitrary,
        }
    }
}

bitflags! {
    /// Flag bits of the code-3 frame-count byte.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Code3Flags: u8 {
        /// Frames are variable-size; all but the last carry a length prefix.
        const VBR = 0x80;
        /// Padding bytes trail the frame data.
        const PADDING = 0x40;
    }
}

/// See [section-3.1](https://datatracker.ietf.org/doc/html/rfc6716#section-3.1)
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Mode {
    SILK,
    CELT,
    HYBRID,
}

/// Bandwidth
///
/// See [section-2](https://datatracker.ietf.org/doc/html/rfc6716#section-2)
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Bandwidth {
    Narrow,
    Medium,
    Wide,
    SuperWide,
    Full,
}

impl Bandwidth {
    #[inline]
    pub const fn from_opus_int(value: i32) -> Option<Self> {
        match value {
            1101 => Some(Self::Narrow),
            1102 => Some(Self::Medium),
            1103 => Some(Self::Wide),
            1104 => Some(Self::SuperWide),
            1105 => Some(Self::Full),
            _ => None,
        }
    }

    #[inline]
    pub const fn to_opus_int(&self) -> i32 {
        match self {
            Bandwidth::Narrow => 1101,
            Bandwidth::Medium => 1102,
            Bandwidth::Wide => 1103,
            Bandwidth::SuperWide => 1104,
            Bandwidth::Full => 1105,
        }
    }

    #[inline]
    pub const fn sample_rate(&self) -> u16 {
        match self {
            Bandwidth::Narrow => 8000,
            Bandwidth::Medium => 12_000,
            Bandwidth::Wide => 16_000,
            Bandwidth::SuperWide => 24_000,
            Bandwidth::Full => 48_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketError {
    BadArgument,
    InvalidPacket,
}

impl PacketError {
    #[inline]
    pub const fn code(self) -> i32 {
        match self {
            PacketError::BadArgument => -1,
            PacketError::InvalidPacket => -4,
        }
    }
}

/// Frame layout recovered from one packet.
///
/// `payload_offset` is the first byte of frame data; `packet_offset` covers
/// the framing, the frames and any trailing padding, so for self-delimited
/// streams it is the offset of the next packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPacket<'a> {
    pub toc: u8,
    pub frame_count: usize,
    pub frames: [&'a [u8]; MAX_FRAMES_PER_PACKET],
    pub frame_sizes: [u16; MAX_FRAMES_PER_PACKET],
    pub payload_offset: usize,
    pub packet_offset: usize,
    pub padding_len: usize,
}

/// Builds the table-of-contents byte for a packet.
///
/// `framerate` is the frame rate in Hz (e.g. 50 for 20 ms frames); the frame
/// period code is the number of doublings needed to reach 400 Hz, biased per
/// mode family.
pub fn opus_gen_toc(mode: Mode, framerate: i32, bandwidth: Bandwidth, channels: usize) -> u8 {
    let mut framerate = framerate;
    let mut period = 0i32;
    while framerate < 400 {
        framerate <<= 1;
        period += 1;
    }

    let bw_int = bandwidth.to_opus_int();
    let mut toc = match mode {
        Mode::SILK => {
            let bw_index = (bw_int - Bandwidth::Narrow.to_opus_int()).clamp(0, 3);
            let period_index = (period - 2).clamp(0, 3);
            ((bw_index as u8) << 5) | ((period_index as u8) << 3)
        }
        Mode::CELT => {
            let bw_index = (bw_int - Bandwidth::Medium.to_opus_int()).max(0);
            let period_index = period.clamp(0, 3);
            0x80 | ((bw_index as u8) << 5) | ((period_index as u8) << 3)
        }
        Mode::HYBRID => {
            let bw_flag = u8::from(bandwidth == Bandwidth::Full);
            let period_index = (period - 2).clamp(0, 3);
            0x60 | (bw_flag << 4) | ((period_index as u8) << 3)
        }
    };

    if channels == 2 {
        toc |= 0x04;
    }
    toc
}

/// Emits the one- or two-byte frame length code for `size`, returning the
/// number of bytes written. Sizes below 252 use a single byte; the two-byte
/// form covers sizes up to [`MAX_FRAME_BYTES`].
pub fn encode_size(size: usize, data: &mut [u8]) -> usize {
    debug_assert!(size <= MAX_FRAME_BYTES);
    if size < 252 {
        data[0] = size as u8;
        1
    } else {
        data[0] = 252 + (size & 0x3) as u8;
        data[1] = ((size - usize::from(data[0])) >> 2) as u8;
        2
    }
}

/// Mirror of [`encode_size`]: decodes a length prefix from the first `len`
/// bytes of `data`, returning the value and the bytes consumed, or `None` on
/// truncation.
pub fn parse_size(data: &[u8], len: i32) -> Option<(u16, usize)> {
    if len < 1 {
        None
    } else if data[0] < 252 {
        Some((u16::from(data[0]), 1))
    } else if len < 2 {
        None
    } else {
        Some((4 * u16::from(data[1]) + u16::from(data[0]), 2))
    }
}

/// Walks the framing of one packet, validating it against the layout rules of
/// RFC 6716 section 3.4.
///
/// With `self_delimited` framing an extra length prefix describes the last
/// frame (and, for CBR code 3, every frame), so the packet need not be
/// delimited by the transport.
pub fn opus_packet_parse_impl(
    data: &[u8],
    len: usize,
    self_delimited: bool,
) -> Result<ParsedPacket<'_>, PacketError> {
    if len > data.len() {
        return Err(PacketError::BadArgument);
    }
    if len == 0 {
        return Err(PacketError::InvalidPacket);
    }

    // Frame duration at 48 kHz bounds the frame count below.
    let framesize = opus_packet_get_samples_per_frame(data, 48_000)? as i32;

    let toc = data[0];
    let mut cursor = 1usize;
    let mut len = len as i32 - 1;
    let mut last_size = len;
    let mut pad = 0i32;
    let mut cbr = false;
    let mut sizes = [0u16; MAX_FRAMES_PER_PACKET];

    let count = match FrameCountCode::from_toc(toc) {
        FrameCountCode::Single => 1,
        FrameCountCode::DoubleEqual => {
            cbr = true;
            if !self_delimited {
                if len & 0x1 != 0 {
                    return Err(PacketError::InvalidPacket);
                }
                last_size = len / 2;
                sizes[0] = last_size as u16;
            }
            2
        }
        FrameCountCode::DoubleDifferent => {
            let (size0, bytes) =
                parse_size(&data[cursor..], len).ok_or(PacketError::InvalidPacket)?;
            len -= bytes as i32;
            if i32::from(size0) > len {
                return Err(PacketError::InvalidPacket);
            }
            sizes[0] = size0;
            cursor += bytes;
            last_size = len - i32::from(size0);
            2
        }
        FrameCountCode::Arbitrary => {
            if len < 1 {
                return Err(PacketError::InvalidPacket);
            }
            let ch = data[cursor];
            cursor += 1;
            len -= 1;

            let count = usize::from(ch & 0x3F);
            if count == 0 || framesize * count as i32 > 5760 {
                return Err(PacketError::InvalidPacket);
            }
            let flags = Code3Flags::from_bits_truncate(ch);

            if flags.contains(Code3Flags::PADDING) {
                loop {
                    if len <= 0 {
                        return Err(PacketError::InvalidPacket);
                    }
                    let p = data[cursor];
                    cursor += 1;
                    len -= 1;
                    let run = if p == 255 { 254 } else { i32::from(p) };
                    len -= run;
                    pad += run;
                    if p != 255 {
                        break;
                    }
                }
            }
            if len < 0 {
                return Err(PacketError::InvalidPacket);
            }

            // Note the inversion: a clear bit 7 means constant frame sizes.
            cbr = !flags.contains(Code3Flags::VBR);
            if !cbr {
                last_size = len;
                for size in sizes.iter_mut().take(count - 1) {
                    let (value, bytes) =
                        parse_size(&data[cursor..], len).ok_or(PacketError::InvalidPacket)?;
                    len -= bytes as i32;
                    if i32::from(value) > len {
                        return Err(PacketError::InvalidPacket);
                    }
                    cursor += bytes;
                    *size = value;
                    last_size -= bytes as i32 + i32::from(value);
                }
                if last_size < 0 {
                    return Err(PacketError::InvalidPacket);
                }
            } else if !self_delimited {
                last_size = len / count as i32;
                if last_size * count as i32 != len {
                    return Err(PacketError::InvalidPacket);
                }
                for size in sizes.iter_mut().take(count - 1) {
                    *size = last_size as u16;
                }
            }
            count
        }
    };

    if self_delimited {
        // Self-delimited framing carries an extra size for the last frame.
        let (value, bytes) = parse_size(&data[cursor..], len).ok_or(PacketError::InvalidPacket)?;
        len -= bytes as i32;
        if i32::from(value) > len {
            return Err(PacketError::InvalidPacket);
        }
        cursor += bytes;
        sizes[count - 1] = value;
        if cbr {
            // For CBR packets the single size applies to every frame.
            if i32::from(value) * count as i32 > len {
                return Err(PacketError::InvalidPacket);
            }
            for size in sizes.iter_mut().take(count - 1) {
                *size = value;
            }
        } else if bytes as i32 + i32::from(value) > last_size {
            return Err(PacketError::InvalidPacket);
        }
    } else {
        // Without an explicit length the last frame (or, for CBR, every
        // frame) could exceed the wire maximum; reject those here.
        if last_size > MAX_FRAME_BYTES as i32 {
            return Err(PacketError::InvalidPacket);
        }
        sizes[count - 1] = last_size as u16;
    }

    let payload_offset = cursor;

    let mut frames: [&[u8]; MAX_FRAMES_PER_PACKET] = [&[]; MAX_FRAMES_PER_PACKET];
    for (frame, size) in frames.iter_mut().zip(sizes.iter()).take(count) {
        let next = cursor + usize::from(*size);
        *frame = &data[cursor..next];
        cursor = next;
    }

    let packet_offset = pad as usize + cursor;

    trace!(
        "parsed packet: toc=0x{toc:02x}, frames={count}, payload_offset={payload_offset}, \
         packet_offset={packet_offset}, padding={pad}"
    );

    Ok(ParsedPacket {
        toc,
        frame_count: count,
        frames,
        frame_sizes: sizes,
        payload_offset,
        packet_offset,
        padding_len: pad as usize,
    })
}

/// Parses a packet that is delimited by its transport.
#[inline]
pub fn opus_packet_parse(data: &[u8], len: usize) -> Result<ParsedPacket<'_>, PacketError> {
    opus_packet_parse_impl(data, len, false)
}

#[inline]
pub fn opus_packet_get_bandwidth(data: &[u8]) -> Result<Bandwidth, PacketError> {
    let toc = *data.first().ok_or(PacketError::BadArgument)?;

    let bandwidth = if toc & 0x80 != 0 {
        match (toc >> 5) & 0x03 {
            0 => Bandwidth::Narrow,
            1 => Bandwidth::Wide,
            2 => Bandwidth::SuperWide,
            _ => Bandwidth::Full,
        }
    } else if toc & 0x60 == 0x60 {
        if toc & 0x10 != 0 {
            Bandwidth::Full
        } else {
            Bandwidth::SuperWide
        }
    } else {
        match (toc >> 5) & 0x03 {
            0 => Bandwidth::Narrow,
            1 => Bandwidth::Medium,
            2 => Bandwidth::Wide,
            _ => Bandwidth::SuperWide,
        }
    };

    Ok(bandwidth)
}

#[inline]
pub fn opus_packet_get_nb_channels(data: &[u8]) -> Result<usize, PacketError> {
    let toc = *data.first().ok_or(PacketError::BadArgument)?;
    Ok(if toc & 0x04 != 0 { 2 } else { 1 })
}

/// Returns the operating mode encoded in the configuration bits.
#[inline]
pub fn opus_packet_get_mode(data: &[u8]) -> Result<Mode, PacketError> {
    let toc = *data.first().ok_or(PacketError::BadArgument)?;
    let mode = if toc & 0x80 != 0 {
        Mode::CELT
    } else if toc & 0x60 == 0x60 {
        Mode::HYBRID
    } else {
        Mode::SILK
    };
    Ok(mode)
}

/// Pure TOC decode of the per-frame sample count at `fs_hz`.
///
/// SILK-only configurations scale a 2.5 ms base by the period code, so the
/// four codes span 2.5 to 20 ms. CELT-only configurations scale a 10 ms base,
/// with period 3 standing for 60 ms; hybrid carries only the 10/20 ms pair.
/// All arithmetic stays in the signed 32-bit domain; the largest defined
/// result is 2880 samples (a 60 ms CELT frame at 48 kHz).
#[inline]
pub fn opus_packet_get_samples_per_frame(data: &[u8], fs_hz: i32) -> Result<usize, PacketError> {
    let toc = *data.first().ok_or(PacketError::BadArgument)?;

    let audiosize = if toc & 0x80 != 0 {
        let period = i32::from((toc >> 3) & 0x03);
        if period == 3 {
            fs_hz * 60 / 1000
        } else {
            (fs_hz << period) / 100
        }
    } else if toc & 0x60 == 0x60 {
        if toc & 0x08 != 0 {
            fs_hz / 50
        } else {
            fs_hz / 100
        }
    } else {
        let period = i32::from((toc >> 3) & 0x03);
        (fs_hz << period) / 400
    };

    Ok(audiosize as usize)
}

/// Fast frame count reading only the first two bytes.
#[inline]
pub fn opus_packet_get_nb_frames(packet: &[u8], len: usize) -> Result<usize, PacketError> {
    if len == 0 || len > packet.len() {
        return Err(PacketError::BadArgument);
    }

    match FrameCountCode::from_toc(packet[0]) {
        FrameCountCode::Single => Ok(1),
        FrameCountCode::DoubleEqual | FrameCountCode::DoubleDifferent => Ok(2),
        FrameCountCode::Arbitrary => {
            if len < 2 {
                Err(PacketError::InvalidPacket)
            } else {
                Ok(usize::from(packet[1] & 0x3F))
            }
        }
    }
}

/// Total decoded sample count of a packet at `fs_hz`, rejecting packets that
/// would exceed the 120 ms protocol cap.
#[inline]
pub fn opus_packet_get_nb_samples(
    packet: &[u8],
    len: usize,
    fs_hz: i32,
) -> Result<usize, PacketError> {
    let count = opus_packet_get_nb_frames(packet, len)?;
    let samples_per_frame = opus_packet_get_samples_per_frame(packet, fs_hz)?;
    let samples = count
        .checked_mul(samples_per_frame)
        .ok_or(PacketError::InvalidPacket)?;

    // 25 * samples > 3 * fs means more than 120 ms of audio.
    if (samples as i64).saturating_mul(25) > i64::from(fs_hz).saturating_mul(3) {
        Err(PacketError::InvalidPacket)
    } else {
        Ok(samples)
    }
}
