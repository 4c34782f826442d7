//! Decoder-side PCM soft clipping.
//!
//! Bounds floating-point PCM output to the [-1, 1] range with a quadratic
//! non-linearity, keeping the waveform and its derivative continuous across
//! frame boundaries via a per-channel coefficient memory.

use crate::celt::opus_limit2_checkwithin1;

/// Applies the soft-clipping non-linearity to one channel of interleaved PCM.
///
/// `a` is the coefficient left over from the previous frame; the return value
/// is the coefficient to carry into the next one. Samples are addressed as
/// `samples[i * stride + channel]`.
fn soft_clip_channel(
    samples: &mut [f32],
    frame_size: usize,
    stride: usize,
    channel: usize,
    mut a: f32,
    skip_detection: bool,
) -> f32 {
    let at = |i: usize| i * stride + channel;

    // Continue the previous frame's non-linearity until the waveform crosses
    // zero, so the stitch point stays smooth.
    for i in 0..frame_size {
        let x = samples[at(i)];
        if x * a >= 0.0 {
            break;
        }
        samples[at(i)] = x + a * x * x;
    }

    let x0 = samples[at(0)];
    let mut curr = 0usize;
    loop {
        // Find the next sample outside [-1, 1].
        let first_clipped = if skip_detection {
            frame_size
        } else {
            let mut scan = curr;
            while scan < frame_size && (-1.0..=1.0).contains(&samples[at(scan)]) {
                scan += 1;
            }
            scan
        };
        if first_clipped == frame_size {
            return 0.0;
        }

        let clipped = samples[at(first_clipped)];
        let mut peak_pos = first_clipped;
        let mut maxval = clipped.abs();

        // Expand to the surrounding zero crossings, tracking the peak.
        let mut start = first_clipped;
        while start > 0 && clipped * samples[at(start - 1)] >= 0.0 {
            start -= 1;
        }
        let mut end = first_clipped;
        while end < frame_size && clipped * samples[at(end)] >= 0.0 {
            let magnitude = samples[at(end)].abs();
            if magnitude > maxval {
                maxval = magnitude;
                peak_pos = end;
            }
            end += 1;
        }

        let special = start == 0 && clipped * samples[at(0)] >= 0.0;

        // Choose a so that maxval + a*maxval^2 == 1, nudged up by 2^-22 so
        // rounding cannot push the result past full scale.
        a = (maxval - 1.0) / (maxval * maxval);
        a += a * 2.4e-7;
        if clipped > 0.0 {
            a = -a;
        }

        for i in start..end {
            let x = samples[at(i)];
            samples[at(i)] = x + a * x * x;
        }

        if special && peak_pos >= 2 {
            // The excursion starts at the frame boundary: ramp linearly from
            // the previous frame's last sample up to the peak so there is no
            // step at sample zero.
            let mut offset = x0 - samples[at(0)];
            let delta = offset / peak_pos as f32;
            for i in curr..peak_pos {
                offset -= delta;
                let adjusted = (samples[at(i)] + offset).clamp(-1.0, 1.0);
                samples[at(i)] = adjusted;
            }
        }

        curr = end;
        if curr == frame_size {
            return a;
        }
    }
}

/// Soft-clips interleaved PCM in place, as `opus_pcm_soft_clip` does in the
/// reference implementation.
///
/// `softclip_mem` holds one coefficient per channel and must persist between
/// calls; frames must be presented in order. Inputs are first hard-limited to
/// [-2, 2], the domain of the quadratic; after processing, no sample exceeds
/// full scale.
pub fn opus_pcm_soft_clip(
    pcm: &mut [f32],
    frame_size: usize,
    channels: usize,
    softclip_mem: &mut [f32],
) {
    if frame_size == 0 || channels == 0 {
        return;
    }
    let Some(total) = frame_size.checked_mul(channels) else {
        return;
    };
    if pcm.len() < total || softclip_mem.len() < channels {
        return;
    }

    let samples = &mut pcm[..total];
    let all_within_unit = opus_limit2_checkwithin1(samples);

    for (channel, mem) in softclip_mem.iter_mut().enumerate().take(channels) {
        *mem = soft_clip_channel(samples, frame_size, channels, channel, *mem, all_within_unit);
    }
}
