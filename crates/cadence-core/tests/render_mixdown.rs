use std::{cell::Cell, path::Path};

use cadence_core::{
    Config, DEFAULT_SAMPLE_RATE, DecodedAudio, LoadError, MASTER_VOLUME, RenderError, Track,
    render, render::MAX_RENDER_SECONDS,
};

const SMALL_RATE: u32 = 1_200;

fn ramp(frames: usize) -> Vec<f32> {
    (1..=frames).map(|frame| frame as f32 / frames as f32).collect()
}

fn mono_loader(
    sample_rate: u32,
    samples: Vec<f32>,
) -> impl Fn(&Path) -> Result<DecodedAudio, LoadError> {
    move |_path: &Path| Ok(DecodedAudio::mono(sample_rate, samples.clone()))
}

fn assert_close(actual: f32, expected: f32) {
    assert!(
        (actual - expected).abs() < 1e-5,
        "expected {expected}, got {actual}"
    );
}

#[test]
fn pattern_and_sequence_lengths_follow_tempo_and_measures() {
    let loader = mono_loader(44_100, ramp(100));
    let tracks = vec![Track::new("kick", "kick.wav", vec![0])];

    let single = render(&tracks, &Config::new(120, 4, 1), &loader).expect("render should work");
    assert_eq!(single.sample_rate, 44_100);
    assert_eq!(single.channels, 1);
    assert_eq!(single.frames(), 88_200);

    let repeated = render(&tracks, &Config::new(120, 4, 4), &loader).expect("render should work");
    assert_eq!(repeated.frames(), 352_800);
    assert_eq!(
        &repeated.samples[..88_200],
        &repeated.samples[88_200..176_400]
    );
    assert_eq!(&repeated.samples[..88_200], single.samples.as_slice());
}

#[test]
fn last_trigger_extends_pattern_by_whole_measures() {
    let loader = mono_loader(SMALL_RATE, ramp(10));
    let tracks = vec![Track::new("hat", "hat.wav", vec![48])];

    let rendered = render(&tracks, &Config::new(120, 4, 1), &loader).expect("render should work");
    assert_eq!(rendered.frames(), 8 * 600);
}

#[test]
fn empty_inputs_skip_the_loader() {
    let panicking = |_path: &Path| -> Result<DecodedAudio, LoadError> {
        panic!("loader must not be called without sounding tracks")
    };
    let config = Config::new(93, 7, 3);

    for tracks in [vec![], vec![Track::default()]] {
        let rendered = render(&tracks, &config, &panicking).expect("empty render should work");
        assert!(rendered.is_empty());
        assert_eq!(rendered.frames(), 0);
        assert_eq!(rendered.sample_rate, DEFAULT_SAMPLE_RATE);
    }

    let named_only = Track {
        name: Some("no sample yet".to_string()),
        timing: vec![0, 12],
        ..Track::default()
    };
    let rendered = render(&[named_only], &config, &panicking).expect("empty render should work");
    assert!(rendered.is_empty());
}

#[test]
fn mismatched_sample_rates_fail() {
    let loader = |path: &Path| -> Result<DecodedAudio, LoadError> {
        let rate = if path.ends_with("b.wav") { 48_000 } else { 44_100 };
        Ok(DecodedAudio::mono(rate, vec![0.5; 10]))
    };
    let tracks = vec![
        Track::new("a", "a.wav", vec![0]),
        Track::new("b", "b.wav", vec![12]),
    ];

    let error = render(&tracks, &Config::default(), &loader).expect_err("rates differ");
    match error {
        RenderError::SampleRateMismatch { rates } => assert_eq!(rates, vec![44_100, 48_000]),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn zero_sample_rate_is_rejected() {
    let loader = mono_loader(0, vec![0.5; 10]);
    let tracks = vec![Track::new("a", "a.wav", vec![0])];

    let error = render(&tracks, &Config::default(), &loader).expect_err("rate unknown");
    assert!(matches!(error, RenderError::MissingSampleRate { .. }));
}

#[test]
fn mixed_channel_counts_fail() {
    let loader = |path: &Path| -> Result<DecodedAudio, LoadError> {
        let channels = if path.ends_with("stereo.wav") { 2 } else { 1 };
        Ok(DecodedAudio {
            sample_rate: SMALL_RATE,
            channels,
            samples: vec![0.25; 20],
        })
    };
    let tracks = vec![
        Track::new("mono", "mono.wav", vec![0]),
        Track::new("stereo", "stereo.wav", vec![0]),
    ];

    let error = render(&tracks, &Config::default(), &loader).expect_err("channels differ");
    match error {
        RenderError::ChannelMismatch { channels } => assert_eq!(channels, vec![1, 2]),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn loader_errors_propagate_unchanged() {
    let loader = |path: &Path| -> Result<DecodedAudio, LoadError> {
        Err(LoadError::Malformed {
            path: path.to_path_buf(),
            reason: "not a riff file".to_string(),
        })
    };
    let tracks = vec![Track::new("broken", "broken.wav", vec![0])];

    let error = render(&tracks, &Config::default(), &loader).expect_err("load fails");
    assert!(matches!(
        error,
        RenderError::Load(LoadError::Malformed { ref reason, .. }) if reason == "not a riff file"
    ));
}

#[test]
fn invalid_config_fails_before_loading() {
    let calls = Cell::new(0);
    let loader = |_path: &Path| -> Result<DecodedAudio, LoadError> {
        calls.set(calls.get() + 1);
        Ok(DecodedAudio::mono(SMALL_RATE, vec![0.5]))
    };
    let tracks = vec![Track::new("a", "a.wav", vec![0])];

    for config in [
        Config::new(0, 4, 1),
        Config::new(120, 0, 1),
        Config::new(120, 4, 0),
    ] {
        let error = render(&tracks, &config, &loader).expect_err("config is invalid");
        assert!(matches!(error, RenderError::InvalidConfig(_)));
    }
    assert_eq!(calls.get(), 0);
}

#[test]
fn peak_is_normalized_to_master_volume() {
    let loader = mono_loader(SMALL_RATE, ramp(50));
    let tracks = vec![
        Track::new("kick", "kick.wav", vec![0, 12, 24]).with_volume(0.3),
        Track::new("snare", "snare.wav", vec![12, 13]).with_volume(0.2),
    ];

    let rendered = render(&tracks, &Config::new(120, 4, 2), &loader).expect("render should work");
    assert_close(rendered.peak(), MASTER_VOLUME);
}

#[test]
fn silent_samples_skip_normalization() {
    let loader = mono_loader(SMALL_RATE, vec![0.0; 40]);
    let tracks = vec![Track::new("silence", "silence.wav", vec![0, 6])];

    let rendered = render(&tracks, &Config::default(), &loader).expect("render should work");
    assert_eq!(rendered.frames(), 2_400);
    assert!(rendered.samples.iter().all(|sample| *sample == 0.0));
}

#[test]
fn volumes_scale_before_mixing() {
    let loader = mono_loader(SMALL_RATE, vec![1.0]);
    let tracks = vec![
        Track::new("loud", "impulse.wav", vec![0]),
        Track::new("quiet", "impulse.wav", vec![12]).with_volume(0.5),
    ];

    let rendered = render(&tracks, &Config::default(), &loader).expect("render should work");
    assert_close(rendered.samples[0], MASTER_VOLUME);
    assert_close(rendered.samples[600], MASTER_VOLUME / 2.0);
}

#[test]
fn overlapping_triggers_accumulate() {
    let loader = mono_loader(SMALL_RATE, vec![1.0, 1.0]);
    let tracks = vec![
        Track::new("a", "impulse.wav", vec![0, 24]),
        Track::new("b", "impulse.wav", vec![24]),
    ];

    let rendered = render(&tracks, &Config::default(), &loader).expect("render should work");
    assert_close(rendered.samples[1_200], MASTER_VOLUME);
    assert_close(rendered.samples[0], MASTER_VOLUME / 2.0);
}

#[test]
fn unsorted_and_duplicate_timings_render() {
    let loader = mono_loader(SMALL_RATE, vec![1.0]);
    let sorted = vec![Track::new("a", "a.wav", vec![0, 6, 30])];
    let shuffled = vec![Track::new("a", "a.wav", vec![30, 0, 6])];

    let first = render(&sorted, &Config::default(), &loader).expect("render should work");
    let second = render(&shuffled, &Config::default(), &loader).expect("render should work");
    assert_eq!(first, second);
}

#[test]
fn negative_start_is_clipped() {
    let loader = mono_loader(SMALL_RATE, ramp(100));
    // 0.05 s of attack at 1200 Hz pulls the start back 60 frames
    let tracks = vec![Track::new("kick", "kick.wav", vec![0]).with_attack(0.05)];

    let rendered = render(&tracks, &Config::default(), &loader).expect("render should work");
    assert_eq!(rendered.frames(), 2_400);
    assert_close(rendered.samples[0], 0.61 * MASTER_VOLUME);
    assert_close(rendered.samples[39], MASTER_VOLUME);
    assert!(rendered.samples[40..].iter().all(|sample| *sample == 0.0));
}

#[test]
fn end_past_pattern_is_clipped() {
    let loader = mono_loader(SMALL_RATE, ramp(100));
    // timing 47 starts 50 frames before the end of a 2400 frame pattern
    let tracks = vec![Track::new("crash", "crash.wav", vec![47])];

    let rendered = render(&tracks, &Config::default(), &loader).expect("render should work");
    assert_eq!(rendered.frames(), 2_400);
    assert!(rendered.samples[..2_350].iter().all(|sample| *sample == 0.0));
    let scale = MASTER_VOLUME / 0.5;
    assert_close(rendered.samples[2_350], 0.01 * scale);
    assert_close(rendered.samples[2_399], 0.5 * scale);
}

#[test]
fn trigger_entirely_outside_contributes_nothing() {
    let loader = mono_loader(SMALL_RATE, ramp(20));
    let audible = Track::new("kick", "kick.wav", vec![0, 12]);
    let hidden = Track::new("late", "late.wav", vec![0]).with_attack(10.0);

    let alone = render(std::slice::from_ref(&audible), &Config::default(), &loader)
        .expect("render should work");
    let together =
        render(&[audible, hidden], &Config::default(), &loader).expect("render should work");
    assert_eq!(alone, together);
}

#[test]
fn stereo_samples_keep_their_channels() {
    let loader = |_path: &Path| -> Result<DecodedAudio, LoadError> {
        Ok(DecodedAudio {
            sample_rate: SMALL_RATE,
            channels: 2,
            samples: vec![1.0, -0.5, 0.5, -0.25],
        })
    };
    let tracks = vec![Track::new("pan", "pan.wav", vec![6])];

    let rendered = render(&tracks, &Config::new(120, 4, 3), &loader).expect("render should work");
    assert_eq!(rendered.channels, 2);
    assert_eq!(rendered.frames(), 3 * 2_400);
    // timing 6 lands on frame 300
    let start = 300 * 2;
    assert_close(rendered.samples[start], MASTER_VOLUME);
    assert_close(rendered.samples[start + 1], -0.5 * MASTER_VOLUME);
    assert_close(rendered.samples[start + 3], -0.25 * MASTER_VOLUME);
    assert_eq!(rendered.samples[start - 1], 0.0);
}

#[test]
fn render_does_not_touch_caller_records() {
    let loader = mono_loader(SMALL_RATE, ramp(10));
    let tracks = vec![Track::new("kick", "kick.wav", vec![30, 0])];
    let config = Config::new(100, 3, 2);
    let before = (tracks.clone(), config);

    let _rendered = render(&tracks, &config, &loader).expect("render should work");
    assert_eq!((tracks, config), before);
}

#[test]
fn oversized_sequences_are_errors_not_crashes() {
    let loader = mono_loader(SMALL_RATE, ramp(10));
    let downbeat = vec![Track::new("a", "a.wav", vec![0])];
    let last_timing = vec![Track::new("a", "a.wav", vec![u32::MAX])];

    let cases = [
        (&downbeat, Config::new(120, 400_000_000, 1)),
        (&downbeat, Config::new(120, u32::MAX, 1)),
        (&downbeat, Config::new(120, 4, u32::MAX)),
        (&last_timing, Config::new(120, 4, 1)),
        (&last_timing, Config::new(1, u32::MAX / 12, 1)),
    ];
    for (tracks, config) in cases {
        let error = render(tracks, &config, &loader).expect_err("sequence is far too long");
        assert!(
            matches!(error, RenderError::SequenceTooLong { max_seconds, .. } if max_seconds == MAX_RENDER_SECONDS),
            "unexpected error for {config:?}: {error:?}"
        );
    }
}

#[test]
fn sequence_at_the_length_limit_renders() {
    let loader = mono_loader(SMALL_RATE, ramp(10));
    let tracks = vec![Track::new("a", "a.wav", vec![0])];
    // 2400 frame pattern, limit is one hour at 1200 Hz
    let repeat = MAX_RENDER_SECONDS * SMALL_RATE / 2_400;

    let rendered =
        render(&tracks, &Config::new(120, 4, repeat), &loader).expect("limit is inclusive");
    assert_eq!(rendered.duration_seconds(), f64::from(MAX_RENDER_SECONDS));

    let error = render(&tracks, &Config::new(120, 4, repeat + 1), &loader)
        .expect_err("one more repeat is past the limit");
    assert!(matches!(error, RenderError::SequenceTooLong { .. }));
}

#[test]
fn extreme_attack_values_are_clipped_away() {
    let loader = mono_loader(SMALL_RATE, ramp(20));
    let audible = Track::new("kick", "kick.wav", vec![0, 12]);
    let early = Track::new("early", "early.wav", vec![0, 47]).with_attack(f64::MAX);
    let late = Track::new("late", "late.wav", vec![0, 47]).with_attack(-f64::MAX);

    let alone = render(std::slice::from_ref(&audible), &Config::default(), &loader)
        .expect("render should work");
    let together = render(&[audible, early, late], &Config::default(), &loader)
        .expect("render should work");
    assert_eq!(alone, together);
}
