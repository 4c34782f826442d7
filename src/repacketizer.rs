//! Packet recombination: merging coded frames back into RFC 6716 framing.
//!
//! The repacketizer collects frames from compatible packets and re-emits them
//! in any of the four framing codes, choosing the most compact layout and
//! optionally growing the result with protocol padding. It is also the
//! backing for [`opus_packet_pad`] and [`opus_packet_unpad`].

use alloc::vec::Vec;

use log::trace;

use crate::packet::{
    encode_size, opus_packet_get_nb_frames, opus_packet_get_samples_per_frame,
    opus_packet_parse_impl, PacketError, MAX_FRAMES_PER_PACKET,
};

/// Errors surfaced by the repacketizer helpers, mirroring the C API codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepacketizerError {
    BadArgument,
    BufferTooSmall,
    InternalError,
    InvalidPacket,
}

impl RepacketizerError {
    #[inline]
    pub const fn code(self) -> i32 {
        match self {
            RepacketizerError::BadArgument => -1,
            RepacketizerError::BufferTooSmall => -2,
            RepacketizerError::InternalError => -3,
            RepacketizerError::InvalidPacket => -4,
        }
    }
}

impl From<PacketError> for RepacketizerError {
    #[inline]
    fn from(value: PacketError) -> Self {
        match value {
            PacketError::BadArgument | PacketError::InvalidPacket => {
                RepacketizerError::InvalidPacket
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct Frame {
    start: usize,
    len: u16,
}

/// Accumulates frames from compatible packets; the payload bytes are copied
/// into an owned buffer so the source packets need not outlive the state.
pub struct OpusRepacketizer {
    toc: u8,
    nb_frames: usize,
    frames: [Frame; MAX_FRAMES_PER_PACKET],
    framesize: usize,
    buffer: Vec<u8>,
}

impl Default for OpusRepacketizer {
    fn default() -> Self {
        Self::new()
    }
}

impl OpusRepacketizer {
    #[inline]
    pub fn new() -> Self {
        OpusRepacketizer {
            toc: 0,
            nb_frames: 0,
            frames: [Frame::default(); MAX_FRAMES_PER_PACKET],
            framesize: 0,
            buffer: Vec::new(),
        }
    }

    #[inline]
    pub fn opus_repacketizer_init(&mut self) -> &mut Self {
        self.nb_frames = 0;
        self.frames = [Frame::default(); MAX_FRAMES_PER_PACKET];
        self.framesize = 0;
        self.buffer.clear();
        self
    }

    fn cat_impl(
        &mut self,
        data: &[u8],
        len: usize,
        self_delimited: bool,
    ) -> Result<(), RepacketizerError> {
        if len < 1 || len > data.len() {
            return Err(RepacketizerError::InvalidPacket);
        }
        if self.nb_frames == 0 {
            self.toc = data[0];
            self.framesize = opus_packet_get_samples_per_frame(data, 8000)?;
        } else if (self.toc & 0xFC) != (data[0] & 0xFC) {
            // Every merged packet must share mode, bandwidth, duration and
            // channel count.
            return Err(RepacketizerError::InvalidPacket);
        }

        let curr_nb_frames = opus_packet_get_nb_frames(data, len)?;
        if (curr_nb_frames + self.nb_frames) * self.framesize > 960 {
            return Err(RepacketizerError::InvalidPacket);
        }

        let parsed = opus_packet_parse_impl(data, len, self_delimited)?;
        if parsed.frame_count == 0 {
            return Err(RepacketizerError::InvalidPacket);
        }

        let base = self.buffer.len();
        self.buffer.extend_from_slice(&data[..len]);

        let mut cursor = base + parsed.payload_offset;
        for (slot, size) in (self.nb_frames..self.nb_frames + parsed.frame_count)
            .zip(parsed.frame_sizes.iter())
        {
            self.frames[slot] = Frame {
                start: cursor,
                len: *size,
            };
            cursor = cursor
                .checked_add(usize::from(*size))
                .ok_or(RepacketizerError::InvalidPacket)?;
        }

        self.nb_frames += parsed.frame_count;
        Ok(())
    }

    /// Appends the frames of one transport-delimited packet.
    pub fn opus_repacketizer_cat(
        &mut self,
        data: &[u8],
        len: usize,
    ) -> Result<(), RepacketizerError> {
        self.cat_impl(data, len, false)
    }

    #[inline]
    pub fn opus_repacketizer_get_nb_frames(&self) -> usize {
        self.nb_frames
    }

    fn out_range_impl(
        &self,
        begin: usize,
        end: usize,
        data: &mut [u8],
        maxlen: usize,
        self_delimited: bool,
        pad: bool,
    ) -> Result<usize, RepacketizerError> {
        if begin >= end || end > self.nb_frames {
            return Err(RepacketizerError::BadArgument);
        }

        let count = end - begin;
        let frames = &self.frames[begin..end];
        let first_len = usize::from(frames[0].len);
        let last_len = usize::from(frames[count - 1].len);

        let self_delimited_bytes = 1 + usize::from(last_len >= 252);
        let mut tot_size = if self_delimited { self_delimited_bytes } else { 0 };
        let mut ptr = 0usize;

        if count == 1 {
            // Code 0
            tot_size += first_len + 1;
            if tot_size > maxlen {
                return Err(RepacketizerError::BufferTooSmall);
            }
            data[ptr] = self.toc & 0xFC;
            ptr += 1;
        } else if count == 2 {
            let second_len = usize::from(frames[1].len);
            if second_len == first_len {
                // Code 1
                tot_size += 2 * first_len + 1;
                if tot_size > maxlen {
                    return Err(RepacketizerError::BufferTooSmall);
                }
                data[ptr] = (self.toc & 0xFC) | 0x1;
                ptr += 1;
            } else {
                // Code 2
                tot_size += first_len + second_len + 2 + usize::from(first_len >= 252);
                if tot_size > maxlen {
                    return Err(RepacketizerError::BufferTooSmall);
                }
                data[ptr] = (self.toc & 0xFC) | 0x2;
                ptr += 1;
                ptr += encode_size(first_len, &mut data[ptr..]);
            }
        }

        if count > 2 || (pad && tot_size < maxlen) {
            // Code 3; padding forces it even for one or two frames.
            ptr = 0;
            tot_size = if self_delimited { self_delimited_bytes } else { 0 };

            let vbr = frames
                .iter()
                .skip(1)
                .any(|frame| usize::from(frame.len) != first_len);

            if vbr {
                tot_size += 2;
                for frame in frames.iter().take(count - 1) {
                    let len = usize::from(frame.len);
                    tot_size += 1 + usize::from(len >= 252) + len;
                }
                tot_size += last_len;
                if tot_size > maxlen {
                    return Err(RepacketizerError::BufferTooSmall);
                }
                data[ptr] = (self.toc & 0xFC) | 0x3;
                ptr += 1;
                data[ptr] = (count as u8) | 0x80;
                ptr += 1;
            } else {
                tot_size += count * first_len + 2;
                if tot_size > maxlen {
                    return Err(RepacketizerError::BufferTooSmall);
                }
                data[ptr] = (self.toc & 0xFC) | 0x3;
                ptr += 1;
                data[ptr] = count as u8;
                ptr += 1;
            }

            let pad_amount = if pad { maxlen - tot_size } else { 0 };
            if pad_amount != 0 {
                data[1] |= 0x40;
                let nb_255s = (pad_amount - 1) / 255;
                if ptr + nb_255s + 1 > maxlen {
                    return Err(RepacketizerError::BufferTooSmall);
                }
                for _ in 0..nb_255s {
                    data[ptr] = 255;
                    ptr += 1;
                }
                data[ptr] = (pad_amount - 255 * nb_255s - 1) as u8;
                ptr += 1;
                tot_size += pad_amount;
            }

            if vbr {
                for frame in frames.iter().take(count - 1) {
                    ptr += encode_size(usize::from(frame.len), &mut data[ptr..]);
                }
            }
        }

        if self_delimited {
            ptr += encode_size(last_len, &mut data[ptr..]);
        }

        // Copy the frame payloads.
        for frame in frames.iter() {
            let len = usize::from(frame.len);
            let src_end = frame.start + len;
            if src_end > self.buffer.len() {
                return Err(RepacketizerError::InternalError);
            }
            let dst_end = ptr + len;
            if dst_end > data.len() {
                return Err(RepacketizerError::BufferTooSmall);
            }
            data[ptr..dst_end].copy_from_slice(&self.buffer[frame.start..src_end]);
            ptr = dst_end;
        }

        if pad {
            for byte in data.iter_mut().take(maxlen).skip(ptr) {
                *byte = 0;
            }
        }

        trace!(
            "repacketized {count} frame(s) into {tot_size} bytes (code {}, pad={pad})",
            data[0] & 0x03
        );
        Ok(tot_size)
    }

    /// Emits frames `begin..end` as one packet, returning its length.
    #[inline]
    pub fn opus_repacketizer_out_range(
        &self,
        begin: usize,
        end: usize,
        data: &mut [u8],
        maxlen: usize,
    ) -> Result<usize, RepacketizerError> {
        self.out_range_impl(begin, end, data, maxlen, false, false)
    }

    /// Emits every collected frame as one packet, returning its length.
    #[inline]
    pub fn opus_repacketizer_out(
        &self,
        data: &mut [u8],
        maxlen: usize,
    ) -> Result<usize, RepacketizerError> {
        self.out_range_impl(0, self.nb_frames, data, maxlen, false, false)
    }
}

/// Grows a packet to exactly `new_len` bytes with protocol padding.
pub fn opus_packet_pad(
    data: &mut [u8],
    len: usize,
    new_len: usize,
) -> Result<(), RepacketizerError> {
    if len < 1 {
        return Err(RepacketizerError::BadArgument);
    }
    if len == new_len {
        return Ok(());
    }
    if len > new_len || new_len > data.len() {
        return Err(RepacketizerError::BadArgument);
    }

    let mut copy = Vec::with_capacity(len);
    copy.extend_from_slice(&data[..len]);

    let mut rp = OpusRepacketizer::new();
    rp.opus_repacketizer_cat(&copy, len)?;
    let written = rp.out_range_impl(0, rp.nb_frames, data, new_len, false, true)?;

    if written > 0 {
        Ok(())
    } else {
        Err(RepacketizerError::InternalError)
    }
}

/// Removes all padding from a packet in place, returning the new size.
pub fn opus_packet_unpad(data: &mut [u8], len: usize) -> Result<usize, RepacketizerError> {
    if len < 1 {
        return Err(RepacketizerError::BadArgument);
    }

    let mut rp = OpusRepacketizer::new();
    rp.opus_repacketizer_cat(data, len)?;
    let written = rp.out_range_impl(0, rp.nb_frames, data, len, false, false)?;
    debug_assert!(written > 0 && written <= len);
    if written == 0 || written > len {
        Err(RepacketizerError::InternalError)
    } else {
        Ok(written)
    }
}
