//! Encoder front-end signal conditioning and frame-duration control.
//!
//! Everything the top-level encoder runs before handing PCM to the coding
//! cores lives here: the high-pass and DC-reject filters, the gain and
//! stereo cross-fades, the stereo width estimator that drives the SILK
//! stereo-coding decision, and the Viterbi search that picks a frame
//! duration from the transient-energy profile. All audio paths are
//! fixed-point; only the frame-duration heuristic works in floats, matching
//! the reference split.

use crate::biquad::{biquad_stride1, biquad_stride2};
use crate::celt::fixed_ops::{
    mac16_16, mult16_16, mult16_16_p15, mult16_16_q15, mult16_32_q15, pshr32, qconst16, qconst32,
    sat_add32, sat_sub32, saturate, shl32, shr32, smulbb, smulww, Q15ONE,
};
use crate::celt::math_fixed::{celt_ilog2, celt_sqrt, frac_div32};

/// Upper bound on the number of 2.5 ms sub-frames the frame sizer analyses.
pub const MAX_DYNAMIC_FRAMESIZE: usize = 24;

/// Largest 2.5 ms sub-frame, at 48 kHz.
const MAX_SUBFRAME_SAMPLES: usize = 120;

// ---------------------------------------------------------------------------
// High-pass filtering
// ---------------------------------------------------------------------------

/// Derives the Q28 biquad coefficients for a high-pass at `cutoff_hz`.
fn hp_coefficients(cutoff_hz: i32, fs: i32) -> ([i32; 3], [i32; 2]) {
    debug_assert!(cutoff_hz <= i32::MAX / qconst32(1.5 * 3.14159 / 1000.0, 19));
    let fc_q19 = smulbb(qconst32(1.5 * 3.14159 / 1000.0, 19), cutoff_hz) / (fs / 1000);
    debug_assert!(fc_q19 > 0 && fc_q19 < 32_768);

    let r_q28 = qconst32(1.0, 28) - qconst32(0.92, 9) * fc_q19;

    // b = r * [1, -2, 1]; a = [-r * (2 - Fc^2), r^2], all Q28.
    let b_q28 = [r_q28, shl32(-r_q28, 1), r_q28];
    let r_q22 = shr32(r_q28, 6);
    let a_q28 = [
        smulww(r_q22, smulww(fc_q19, fc_q19) - qconst32(2.0, 22)),
        smulww(r_q22, r_q22),
    ];
    (b_q28, a_q28)
}

/// High-pass filters `len` samples per channel through the Q28 biquad.
///
/// `hp_mem` carries two state words per channel across calls; stereo input is
/// interleaved and filtered with per-channel state.
pub fn hp_cutoff(
    input: &[i16],
    cutoff_hz: i32,
    output: &mut [i16],
    hp_mem: &mut [i32; 4],
    len: usize,
    channels: usize,
    fs: i32,
) {
    let (b_q28, a_q28) = hp_coefficients(cutoff_hz, fs);
    if channels == 1 {
        let mut state = [hp_mem[0], hp_mem[1]];
        biquad_stride1(&input[..len], &b_q28, &a_q28, &mut state, &mut output[..len]);
        hp_mem[0] = state[0];
        hp_mem[1] = state[1];
    } else {
        biquad_stride2(
            &input[..2 * len],
            &b_q28,
            &a_q28,
            hp_mem,
            &mut output[..2 * len],
        );
    }
}

/// Removes DC with two cascaded leaky integrators per channel.
///
/// The coefficient is a plain shift, `floor(log2(fs / (3 * cutoff_hz)))`, so
/// the filter costs two subtractions and two rounded shifts per sample.
pub fn dc_reject(
    input: &[i16],
    cutoff_hz: i32,
    output: &mut [i16],
    hp_mem: &mut [i32; 4],
    len: usize,
    channels: usize,
    fs: i32,
) {
    let shift = celt_ilog2(fs / (cutoff_hz * 3)) as u32;
    for c in 0..channels {
        let mut m0 = hp_mem[2 * c];
        let mut m1 = hp_mem[2 * c + 1];
        for i in 0..len {
            let x = shl32(i32::from(input[channels * i + c]), 15);
            // First stage
            let tmp = sat_sub32(x, m0);
            m0 = sat_add32(m0, pshr32(tmp, shift));
            // Second stage
            let y = sat_sub32(tmp, m1);
            m1 = sat_add32(m1, pshr32(y, shift));
            output[channels * i + c] = saturate(pshr32(y, 15), 32_767) as i16;
        }
        hp_mem[2 * c] = m0;
        hp_mem[2 * c + 1] = m1;
    }
}

// ---------------------------------------------------------------------------
// Cross-fades
// ---------------------------------------------------------------------------

/// Squared-window Q15 weight for sample `i` of the overlap, rounded to
/// nearest.
#[inline]
fn fade_weight(window: &[i16], i: usize, inc: usize) -> i16 {
    mult16_16_p15(window[i * inc], window[i * inc])
}

/// Interpolated Q15 gain: `w * g2 + (1 - w) * g1`.
#[inline]
fn fade_gain(w: i16, g1: i16, g2: i16) -> i16 {
    (mac16_16(mult16_16(w, g2), Q15ONE - w, g1) >> 15) as i16
}

/// Fades the side-channel attenuation of interleaved stereo from `g1` to
/// `g2` across the overlap, then holds `g2`.
///
/// The half-difference of the channels is scaled by the gain and folded back,
/// so `g2 == Q15ONE` collapses the pair to mono.
pub fn stereo_fade(
    pcm: &mut [i16],
    g1: i16,
    g2: i16,
    overlap48: usize,
    frame_size: usize,
    window: &[i16],
    fs: i32,
) {
    let inc = (48_000 / fs) as usize;
    let overlap = overlap48 / inc;
    for i in 0..frame_size {
        let g = if i < overlap {
            fade_gain(fade_weight(window, i, inc), g1, g2)
        } else {
            g2
        };
        let diff =
            (i32::from(pcm[2 * i]).wrapping_sub(i32::from(pcm[2 * i + 1])) >> 1) as i16;
        let diff = mult16_16_q15(g, diff);
        pcm[2 * i] = pcm[2 * i].wrapping_sub(diff);
        pcm[2 * i + 1] = pcm[2 * i + 1].wrapping_add(diff);
    }
}

/// Fades a uniform gain from `g1` to `g2` across the overlap, in place.
pub fn gain_fade(
    pcm: &mut [i16],
    g1: i16,
    g2: i16,
    overlap48: usize,
    frame_size: usize,
    channels: usize,
    window: &[i16],
    fs: i32,
) {
    let inc = (48_000 / fs) as usize;
    let overlap = overlap48 / inc;
    for i in 0..overlap {
        let g = fade_gain(fade_weight(window, i, inc), g1, g2);
        for c in 0..channels {
            pcm[i * channels + c] = mult16_16_q15(g, pcm[i * channels + c]);
        }
    }
    for i in overlap..frame_size {
        for c in 0..channels {
            pcm[i * channels + c] = mult16_16_q15(g2, pcm[i * channels + c]);
        }
    }
}

/// Blends `in1` into `in2` sample-wise across the overlap; past it the output
/// is `in2` alone.
pub fn smooth_fade(
    in1: &[i16],
    in2: &[i16],
    out: &mut [i16],
    overlap48: usize,
    frame_size: usize,
    channels: usize,
    window: &[i16],
    fs: i32,
) {
    let inc = (48_000 / fs) as usize;
    let overlap = overlap48 / inc;
    for i in 0..frame_size {
        for c in 0..channels {
            let idx = i * channels + c;
            out[idx] = if i < overlap {
                let w = fade_weight(window, i, inc);
                (mac16_16(mult16_16(w, in2[idx]), Q15ONE - w, in1[idx]) >> 15) as i16
            } else {
                in2[idx]
            };
        }
    }
}

// ---------------------------------------------------------------------------
// Stereo width
// ---------------------------------------------------------------------------

/// Recursive inter-channel statistics. Energies are Q18, the smoothed width
/// and its peak follower Q15; the state belongs to one encoder instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StereoWidthState {
    pub xx: i32,
    pub xy: i32,
    pub yy: i32,
    pub smoothed_width: i16,
    pub max_follower: i16,
}

/// One-second smoothing coefficient in Q15.
//
// The full-precision product is divided directly; do not refactor into
// 25 * (Q15ONE / frame_rate), which rounds differently.
#[inline]
fn width_smoothing_alpha(frame_rate: i32) -> i16 {
    (i32::from(Q15ONE) - mult16_16(25, Q15ONE) / frame_rate.max(50)) as i16
}

/// Estimates how much stereo image the signal carries, as a Q15 factor.
///
/// Correlated or loudness-balanced content scores low, hard-panned content
/// scores high; the result feeds the SILK stereo-width control. The estimate
/// combines the inter-channel correlation with the fourth-root loudness
/// difference, smoothed over roughly a second with a decaying peak hold.
pub fn compute_stereo_width(
    pcm: &[i16],
    frame_size: usize,
    fs: i32,
    mem: &mut StereoWidthState,
) -> i16 {
    if frame_size == 0 {
        return 0;
    }
    let frame_rate = fs / frame_size as i32;
    if frame_rate <= 0 {
        return 0;
    }
    let short_alpha = width_smoothing_alpha(frame_rate);

    let mut xx = 0i32;
    let mut xy = 0i32;
    let mut yy = 0i32;
    // Sum four-sample blocks at a 12-bit down-shift so 20 ms at 48 kHz fits
    // the Q18 accumulators.
    let mut i = 0;
    while i + 3 < frame_size {
        let mut pxx = 0i32;
        let mut pxy = 0i32;
        let mut pyy = 0i32;
        for k in 0..4 {
            let x = pcm[2 * (i + k)];
            let y = pcm[2 * (i + k) + 1];
            pxx += shr32(mult16_16(x, x), 2);
            pxy += shr32(mult16_16(x, y), 2);
            pyy += shr32(mult16_16(y, y), 2);
        }
        xx += shr32(pxx, 10);
        xy += shr32(pxy, 10);
        yy += shr32(pyy, 10);
        i += 4;
    }

    mem.xx += mult16_32_q15(short_alpha, xx - mem.xx);
    mem.xy += mult16_32_q15(short_alpha, xy - mem.xy);
    mem.yy += mult16_32_q15(short_alpha, yy - mem.yy);
    mem.xx = mem.xx.max(0);
    mem.xy = mem.xy.max(0);
    mem.yy = mem.yy.max(0);

    const EPSILON: i32 = 1;
    if mem.xx.max(mem.yy) > qconst32(8e-4, 18) {
        let sqrt_xx = celt_sqrt(mem.xx) as i16;
        let sqrt_yy = celt_sqrt(mem.yy) as i16;
        let qrrt_xx = celt_sqrt(i32::from(sqrt_xx)) as i16;
        let qrrt_yy = celt_sqrt(i32::from(sqrt_yy)) as i16;
        // Inter-channel correlation; the accumulators can drift past the
        // Cauchy-Schwarz bound, so clip before dividing.
        mem.xy = mem.xy.min(mult16_16(sqrt_xx, sqrt_yy));
        let corr = shr32(frac_div32(mem.xy, EPSILON + mult16_16(sqrt_xx, sqrt_yy)), 16) as i16;
        // Approximate loudness difference.
        let ldiff = (mult16_16(Q15ONE, (i32::from(qrrt_xx) - i32::from(qrrt_yy)).unsigned_abs() as i16)
            / (EPSILON + i32::from(qrrt_xx) + i32::from(qrrt_yy))) as i16;
        let width = mult16_16_q15(
            celt_sqrt(qconst32(1.0, 30) - mult16_16(corr, corr)) as i16,
            ldiff,
        );
        // Smoothing over one second.
        mem.smoothed_width += ((i32::from(width) - i32::from(mem.smoothed_width)) / frame_rate) as i16;
        // Peak follower with a slow decay.
        mem.max_follower = i16::max(
            mem.max_follower - (i32::from(qconst16(0.02, 15)) / frame_rate) as i16,
            mem.smoothed_width,
        );
        i32::min(i32::from(Q15ONE), mult16_16(20, mem.max_follower)) as i16
    } else {
        0
    }
}

// ---------------------------------------------------------------------------
// Frame duration selection
// ---------------------------------------------------------------------------

/// Frame durations a caller may request from [`frame_size_select`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameSizeRequest {
    /// Use the caller-supplied frame size unchanged.
    Arg,
    /// Variable duration under encoder control; selection starts from 20 ms.
    Variable,
    Ms2_5,
    Ms5,
    Ms10,
    Ms20,
    Ms40,
    Ms60,
}

impl FrameSizeRequest {
    /// Duration as a power-of-two multiple of 2.5 ms, for the fixed variants.
    #[inline]
    const fn log_duration(self) -> Option<u32> {
        match self {
            FrameSizeRequest::Ms2_5 => Some(0),
            FrameSizeRequest::Ms5 => Some(1),
            FrameSizeRequest::Ms10 => Some(2),
            FrameSizeRequest::Ms20 => Some(3),
            FrameSizeRequest::Ms40 => Some(4),
            FrameSizeRequest::Ms60 => Some(5),
            _ => None,
        }
    }
}

/// Resolves the frame size to encode with, in samples at `fs`.
///
/// Refuses sizes above the caller's `frame_size` and durations that are not
/// one of 2.5, 5, 10, 20, 40 or 60 ms at `fs`.
pub fn frame_size_select(
    frame_size: i32,
    variable_duration: FrameSizeRequest,
    fs: i32,
) -> Option<i32> {
    if frame_size < fs / 400 {
        return None;
    }

    let new_size = match variable_duration {
        FrameSizeRequest::Arg => frame_size,
        FrameSizeRequest::Variable => fs / 50,
        fixed => {
            let shift = fixed.log_duration()?;
            i32::min(3 * fs / 50, (fs / 400) << shift)
        }
    };

    if new_size > frame_size {
        return None;
    }

    let valid = 400 * new_size == fs
        || 200 * new_size == fs
        || 100 * new_size == fs
        || 50 * new_size == fs
        || 25 * new_size == fs
        || 50 * new_size == 3 * fs;
    valid.then_some(new_size)
}

/// Writes one 2.5 ms sub-frame of mono samples into `sub`.
///
/// `c1` selects the first channel; `c2 >= 0` adds a second one, and the
/// special value `-2` sums every remaining channel, which is how the frame
/// sizer asks for a full downmix of signed-integer PCM.
pub fn downmix_int(
    x: &[i16],
    sub: &mut [i32],
    subframe: usize,
    offset: usize,
    c1: i32,
    c2: i32,
    channels: usize,
) {
    for (j, out) in sub.iter_mut().enumerate().take(subframe) {
        *out = i32::from(x[(j + offset) * channels + c1 as usize]);
    }
    if c2 > -1 {
        for (j, out) in sub.iter_mut().enumerate().take(subframe) {
            *out += i32::from(x[(j + offset) * channels + c2 as usize]);
        }
    } else if c2 == -2 {
        for c in 1..channels {
            for (j, out) in sub.iter_mut().enumerate().take(subframe) {
                *out += i32::from(x[(j + offset) * channels + c]);
            }
        }
    }
}

/// How transient the energy profile looks for a frame of `2^lm` sub-frames
/// starting at the head of `e`, in [0, 1].
fn transient_boost(e: &[f32], e_1: &[f32], lm: usize, max_m: usize) -> f32 {
    let m = max_m.min((1 << lm) + 1);
    let mut sum_e = 0.0f32;
    let mut sum_e_1 = 0.0f32;
    for i in 0..m {
        sum_e += e[i];
        sum_e_1 += e_1[i];
    }
    let metric = sum_e * sum_e_1 / (m * m) as f32;
    libm::sqrtf((0.05 * (metric - 2.0)).max(0.0)).min(1.0)
}

/// Viterbi search over frame-duration combinations.
///
/// The 16 states encode where a frame begins and how far it has run: state 0
/// is unused, states 1, 2, 4 and 8 start a frame of 1, 2, 4 or 8 sub-frames,
/// and every other state is a continuation reached by `s -> s + 1` at no
/// marginal cost. New frames pay `(frame_cost + rate * 2^j)` scaled up by the
/// transient boost; the boost weight ramps in between 32 and 64 kbit/s
/// because VBR damping already shortens frames below that.
fn transient_viterbi(e: &[f32], e_1: &[f32], n: usize, frame_cost: i32, rate: i32) -> i32 {
    let mut cost = [[0.0f32; 16]; MAX_DYNAMIC_FRAMESIZE];
    let mut states = [[0i32; 16]; MAX_DYNAMIC_FRAMESIZE];

    let factor = if rate < 80 {
        0.0
    } else if rate > 160 {
        1.0
    } else {
        (rate - 80) as f32 / 80.0
    };

    for state in 0..16 {
        states[0][state] = -1;
        cost[0][state] = 1e10;
    }
    for j in 0..4usize {
        cost[0][1 << j] = (frame_cost + rate * (1 << j)) as f32
            * (1.0 + factor * transient_boost(e, e_1, j, n + 1));
        states[0][1 << j] = j as i32;
    }

    for i in 1..n {
        // Follow continuations.
        for j in 2..16 {
            cost[i][j] = cost[i - 1][j - 1];
            states[i][j] = j as i32 - 1;
        }

        // New frames can start after any terminating state.
        for j in 0..4usize {
            states[i][1 << j] = 1;
            let mut min_cost = cost[i - 1][1];
            for k in 1..4 {
                let ending = (1 << (k + 1)) - 1;
                if cost[i - 1][ending] < min_cost {
                    states[i][1 << j] = ending as i32;
                    min_cost = cost[i - 1][ending];
                }
            }
            let curr_cost = (frame_cost + rate * (1 << j)) as f32
                * (1.0 + factor * transient_boost(&e[i..], &e_1[i..], j, n - i + 1));
            cost[i][1 << j] = min_cost
                + if n - i < (1 << j) {
                    // Part of the frame falls outside the analysis window;
                    // only charge the covered share.
                    curr_cost * (n - i) as f32 / (1 << j) as f32
                } else {
                    curr_cost
                };
        }
    }

    let mut best_state = 1usize;
    let mut best_cost = cost[n - 1][1];
    for state in 2..16 {
        if cost[n - 1][state] < best_cost {
            best_state = state;
            best_cost = cost[n - 1][state];
        }
    }
    // Trace back to the state the path starts in; at row zero that is the
    // log-duration itself.
    let mut state = best_state as i32;
    for i in (0..n).rev() {
        state = states[i][state as usize];
    }
    state
}

/// Picks the frame duration code (LM, 0..=3) for the next frame from the
/// signal's transient-energy profile.
///
/// Sub-frame energies are summed squared first differences of the downmix.
/// `mem` carries up to three energies into the next call; `buffering` is the
/// encoder's look-ahead in samples and shifts the analysis window when
/// non-zero. `bitrate` is in bit/s and `tonality` in [0, 1].
pub fn optimize_framesize<F>(
    x: &[i16],
    len: usize,
    channels: usize,
    fs: i32,
    bitrate: i32,
    tonality: f32,
    mem: &mut [f32; 3],
    buffering: usize,
    mut downmix: F,
) -> i32
where
    F: FnMut(&[i16], &mut [i32], usize, usize, i32, i32, usize),
{
    const EPSILON: f32 = 1e-15;

    let subframe = (fs / 400) as usize;
    debug_assert!(subframe > 0 && subframe <= MAX_SUBFRAME_SAMPLES);
    let mut sub = [0i32; MAX_SUBFRAME_SAMPLES];
    let sub = &mut sub[..subframe];

    let mut e = [0.0f32; MAX_DYNAMIC_FRAMESIZE + 4];
    let mut e_1 = [0.0f32; MAX_DYNAMIC_FRAMESIZE + 4];
    let mut len = len;

    e[0] = mem[0];
    e_1[0] = 1.0 / (EPSILON + mem[0]);
    let (pos, offset) = if buffering != 0 {
        // The look-ahead sits between 2.5 and 4 ms, so indices 1 and 2 are
        // carried over from the previous call.
        debug_assert!(buffering <= 2 * subframe);
        let offset = 2 * subframe - buffering;
        len -= offset;
        e[1] = mem[1];
        e_1[1] = 1.0 / (EPSILON + mem[1]);
        e[2] = mem[2];
        e_1[2] = 1.0 / (EPSILON + mem[2]);
        (3usize, offset)
    } else {
        (1usize, 0usize)
    };

    let n = (len / subframe).min(MAX_DYNAMIC_FRAMESIZE);
    if n == 0 {
        return 0;
    }

    let mut memx = 0i32;
    for i in 0..n {
        let mut tmp = EPSILON;
        downmix(x, &mut *sub, subframe, i * subframe + offset, 0, -2, channels);
        if i == 0 {
            memx = sub[0];
        }
        for &sample in sub.iter() {
            let diff = (sample - memx) as f32;
            tmp += diff * diff;
            memx = sample;
        }
        e[i + pos] = tmp;
        e_1[i + pos] = 1.0 / tmp;
    }
    // The last sub-frame would need samples from the next frame; stand in
    // with the previous energy until they arrive.
    e[n + pos] = e[n + pos - 1];
    e_1[n + pos] = e_1[n + pos - 1];

    let n = if buffering != 0 {
        (n + 2).min(MAX_DYNAMIC_FRAMESIZE)
    } else {
        n
    };
    let frame_cost = ((1.0 + 0.5 * tonality) * (60 * channels + 40) as f32) as i32;
    let best_lm = transient_viterbi(&e[1..], &e_1[1..], n, frame_cost, bitrate / 400);

    let frame_subframes = 1usize << best_lm;
    mem[0] = e[frame_subframes];
    if buffering != 0 {
        mem[1] = e[frame_subframes + 1];
        mem[2] = e[frame_subframes + 2];
    }
    best_lm
}
