use rythmos::opus::opus_pcm_soft_clip;
use rythmos::opus_encoder::{
    compute_stereo_width, downmix_int, frame_size_select, optimize_framesize, FrameSizeRequest,
    StereoWidthState,
};
use rythmos::packet::{opus_gen_toc, Bandwidth, Mode};
use rythmos::{opus_get_version_string, opus_strerror};

#[test]
fn version_and_error_strings_are_stable() {
    assert!(opus_get_version_string().starts_with("rythmos "));
    assert_eq!(opus_strerror(0), "success");
    assert_eq!(opus_strerror(-4), "corrupted stream");
    assert_eq!(opus_strerror(42), "unknown error");
}

#[test]
fn gen_toc_produces_the_documented_silk_wideband_byte() {
    assert_eq!(opus_gen_toc(Mode::SILK, 50, Bandwidth::Wide, 1), 0x48);
}

#[test]
fn soft_clip_bounds_arbitrary_input() {
    let mut pcm = vec![0.0f32; 960];
    for (i, sample) in pcm.iter_mut().enumerate() {
        // A messy mixture that regularly exceeds full scale.
        let t = i as f32 / 48.0;
        *sample = 1.4 * libm::sinf(t) + 0.9 * libm::sinf(3.7 * t + 0.5);
    }
    let mut mem = [0.0f32; 2];

    opus_pcm_soft_clip(&mut pcm, 480, 2, &mut mem);

    let limit = 1.0 + 1.0 / 32_768.0;
    for (i, &sample) in pcm.iter().enumerate() {
        assert!(sample.abs() <= limit, "sample {i} = {sample}");
    }
}

#[test]
fn soft_clip_is_continuous_across_frames() {
    // A long over-range burst split across two calls; the second frame must
    // pick up the first frame's coefficient rather than restart.
    let mut full = vec![1.5f32; 96];
    for (i, sample) in full.iter_mut().enumerate() {
        *sample = 1.5 * libm::sinf(core::f32::consts::PI * i as f32 / 95.0);
    }
    let mut once = full.clone();
    let mut mem = [0.0f32];
    opus_pcm_soft_clip(&mut once, 96, 1, &mut mem);

    let mut split = full.clone();
    let mut mem = [0.0f32];
    opus_pcm_soft_clip(&mut split[..48], 48, 1, &mut mem);
    opus_pcm_soft_clip(&mut split[48..], 48, 1, &mut mem);

    for &sample in &split {
        assert!(sample.abs() <= 1.0 + 1.0 / 32_768.0);
    }
    // No step at the stitch point.
    assert!((split[48] - split[47]).abs() < 0.1);
}

#[test]
fn stereo_width_tracks_panning() {
    let mut mem = StereoWidthState::default();
    let mut mono = [0i16; 1920];
    for (i, pair) in mono.chunks_exact_mut(2).enumerate() {
        let s = (6000.0 * libm::sinf(i as f32 / 7.0)) as i16;
        pair[0] = s;
        pair[1] = s;
    }
    for _ in 0..25 {
        assert_eq!(compute_stereo_width(&mono, 960, 48_000, &mut mem), 0);
    }

    let mut panned = [0i16; 1920];
    for (i, pair) in panned.chunks_exact_mut(2).enumerate() {
        pair[0] = (6000.0 * libm::sinf(i as f32 / 7.0)) as i16;
        pair[1] = 0;
    }
    let mut mem = StereoWidthState::default();
    let mut width = 0;
    for _ in 0..25 {
        width = compute_stereo_width(&panned, 960, 48_000, &mut mem);
    }
    assert!(width > 0, "panned audio must report width");
}

#[test]
fn quiet_music_keeps_long_frames() {
    let pcm = [0i16; 1920];
    let mut mem = [0.0f32; 3];
    let lm = optimize_framesize(&pcm, 960, 2, 48_000, 64_000, 0.0, &mut mem, 0, downmix_int);
    assert_eq!(lm, 3);
}

#[test]
fn selected_lm_is_always_a_valid_duration_code() {
    let mut pcm = [0i16; 960];
    for (i, sample) in pcm.iter_mut().enumerate() {
        *sample = if i % 251 == 0 { 20_000 } else { (i % 101) as i16 };
    }
    for &bitrate in &[16_000, 32_000, 64_000, 128_000] {
        let mut mem = [0.0f32; 3];
        let lm = optimize_framesize(&pcm, 960, 1, 48_000, bitrate, 0.5, &mut mem, 0, downmix_int);
        assert!((0..=3).contains(&lm), "bitrate {bitrate} gave lm {lm}");
    }
}

#[test]
fn frame_size_select_matches_the_representable_durations() {
    // 20 ms at every supported rate.
    for &fs in &[8_000, 12_000, 16_000, 24_000, 48_000] {
        assert_eq!(
            frame_size_select(fs / 50, FrameSizeRequest::Ms20, fs),
            Some(fs / 50)
        );
    }
    // Durations that cannot be expressed at the given rate are refused.
    assert_eq!(frame_size_select(100, FrameSizeRequest::Arg, 8_000), None);
    assert_eq!(frame_size_select(59, FrameSizeRequest::Arg, 48_000), None);
}
