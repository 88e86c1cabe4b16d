// tests/runtime_scenarios.rs
//! End-to-end scenarios for the blend runtime, the estimator and the PCM engine
//!
//! Everything runs against `MockAudioOutput`, so no audio hardware is needed.

use avatar_stream::animation::{
    AnimationClip, BufferKind, JointFrame, LoopRange, MorphFrame, Quat,
};
use avatar_stream::runtime::{PlayChannel, TargetBuffer};
use avatar_stream::{
    AdaptiveBufferSizeEstimator, AnimationBlendRuntime, AvatarStreamError, BlendMode,
    CollectorSink, Condition, ConditionedMessage, Config, ContinuousPcmEngine, MockAudioOutput,
    NetworkStream, RuntimeCommand,
};
use proptest::prelude::*;
use std::sync::Arc;

const FRAME_MS: f64 = 1000.0 / 30.0;

type Runtime = AnimationBlendRuntime<MockAudioOutput>;

fn setup() -> (Runtime, Arc<CollectorSink>, MockAudioOutput) {
    let output = MockAudioOutput::new();
    let sink = Arc::new(CollectorSink::new());
    let runtime =
        AnimationBlendRuntime::from_config(&Config::default(), output.clone(), sink.clone())
            .unwrap();
    (runtime, sink, output)
}

fn frames(count: usize) -> (Vec<JointFrame>, Vec<MorphFrame>) {
    let joints = (0..count)
        .map(|i| JointFrame {
            rotations: vec![Quat::from_axis_angle([0.0, 1.0, 0.0], i as f32 * 0.01)],
            root_translation: [0.0, i as f32, 0.0],
        })
        .collect();
    let morphs = (0..count)
        .map(|_| MorphFrame {
            weights: vec![0.5; 4],
        })
        .collect();
    (joints, morphs)
}

fn clip(count: usize) -> AnimationClip {
    let (joints, morphs) = frames(count);
    AnimationClip::from_frames(joints, morphs)
}

fn switch(target: TargetBuffer, blend_in: BlendMode, blend_out: BlendMode) -> RuntimeCommand {
    RuntimeCommand::SwitchTarget {
        target,
        blend_in,
        blend_out,
    }
}

fn pcm_bytes(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

#[test]
fn test_hard_blend_in_is_full_weight_on_next_tick() {
    let (mut rt, _sink, _output) = setup();
    rt.load_clip(BufferKind::Local, clip(90));
    rt.sender()
        .send(switch(TargetBuffer::Local, BlendMode::Hard, BlendMode::Soft))
        .unwrap();

    let eval = rt.tick(FRAME_MS);
    assert_eq!(eval.joint_weight, 1.0);
    assert_eq!(eval.morph_weight, 1.0);
}

#[test]
fn test_hard_interrupt_is_zero_weight_on_first_tick() {
    let (mut rt, _sink, _output) = setup();
    let (joints, morphs) = frames(90);
    rt.append_streamed(joints, morphs);
    let sender = rt.sender();
    sender
        .send(switch(TargetBuffer::Streamed, BlendMode::Soft, BlendMode::Soft))
        .unwrap();
    for _ in 0..5 {
        rt.tick(FRAME_MS);
    }
    assert!(rt.evaluation().joint_weight > 0.0);

    sender.send_event_code(7, None).unwrap();
    let eval = rt.tick(FRAME_MS);
    assert_eq!(eval.joint_weight, 0.0);
    assert_eq!(eval.morph_weight, 0.0);
}

#[test]
fn test_local_finish_notifies_exactly_once() {
    let (mut rt, sink, _output) = setup();
    rt.load_clip(BufferKind::Local, clip(15));
    rt.sender()
        .send(switch(TargetBuffer::Local, BlendMode::Soft, BlendMode::Soft))
        .unwrap();

    let mut finished_at = None;
    for tick in 0..200 {
        rt.tick(FRAME_MS);
        if finished_at.is_none() && sink.count(Condition::AnimationFinished) == 1 {
            finished_at = Some(tick);
        }
    }

    let local = rt.control(BufferKind::Local);
    assert!(local.joint.paused && local.morph.paused);
    assert!(local.finished_notified);
    assert!(finished_at.is_some());
    assert_eq!(sink.count(Condition::AnimationFinished), 1);
    assert_eq!(sink.count(Condition::JointAnimationFinished), 1);
    assert_eq!(sink.count(Condition::MorphAnimationFinished), 1);
    assert_eq!(rt.evaluation().joint_weight, 0.0);
}

#[test]
fn test_loopable_clip_returns_to_loop_start() {
    let (mut rt, sink, _output) = setup();
    rt.load_clip(
        BufferKind::Local,
        clip(30).with_loop_range(LoopRange::new(5.0, 10.0)),
    );
    let sender = rt.sender();
    sender
        .send(switch(TargetBuffer::Local, BlendMode::Hard, BlendMode::Soft))
        .unwrap();
    sender.send_event_code(8, None).unwrap();

    let mut previous = 0.0;
    let mut wraps = 0;
    for _ in 0..40 {
        let t = rt.tick(FRAME_MS).rhs_joint_time;
        assert!(t <= 10.0, "frame time {t} passed the loop end");
        if previous == 10.0 {
            assert_eq!(t, 5.0);
            wraps += 1;
        }
        previous = t;
    }
    assert!(wraps >= 2);
    assert_eq!(sink.count(Condition::AnimationFinished), 0);
}

#[test]
fn test_soft_blend_in_reaches_one_at_blend_in_time() {
    let (mut rt, _sink, _output) = setup();
    let (joints, morphs) = frames(100);
    rt.append_streamed(joints, morphs);
    rt.sender()
        .send(switch(TargetBuffer::Streamed, BlendMode::Soft, BlendMode::Soft))
        .unwrap();

    // 0.3s at 30fps is nine ticks.
    let weights: Vec<f64> = (0..9).map(|_| rt.tick(FRAME_MS).joint_weight).collect();
    assert!(weights.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(weights[8], 1.0);
    assert_eq!(rt.tick(FRAME_MS).joint_weight, 1.0);
}

#[test]
fn test_cubic_blend_in_is_smooth() {
    let (mut rt, _sink, _output) = setup();
    let (joints, morphs) = frames(100);
    rt.append_streamed(joints, morphs);
    let sender = rt.sender();
    sender.send_event_code(11, None).unwrap();
    sender.send_event_code(3, None).unwrap();

    let first = rt.tick(FRAME_MS).joint_weight;
    // Cubic easing starts slower than linear (1/9).
    assert!(first > 0.0 && first < 1.0 / 9.0);
    for _ in 0..8 {
        rt.tick(FRAME_MS);
    }
    assert_eq!(rt.evaluation().joint_weight, 1.0);
}

#[test]
fn test_streamed_underrun_is_broken_not_finished() {
    let (mut rt, sink, _output) = setup();
    let (joints, morphs) = frames(3);
    rt.append_streamed(joints, morphs);
    rt.sender()
        .send(switch(TargetBuffer::Streamed, BlendMode::Soft, BlendMode::Soft))
        .unwrap();

    for _ in 0..3 {
        rt.tick(FRAME_MS);
    }
    assert_eq!(sink.count(Condition::JointStreamBroken), 0);

    rt.tick(FRAME_MS);
    assert_eq!(sink.count(Condition::JointStreamBroken), 1);
    assert_eq!(sink.count(Condition::JointAnimationFinished), 0);
    assert_eq!(sink.count(Condition::AnimationFinished), 0);
    assert!(!rt.control(BufferKind::Streamed).joint.paused);

    // The stream completes: the next exhaustion is a normal finish.
    rt.sender().send(RuntimeCommand::MarkStreamEnded).unwrap();
    for _ in 0..40 {
        rt.tick(FRAME_MS);
    }
    assert_eq!(sink.count(Condition::AnimationFinished), 1);
    assert_eq!(sink.count(Condition::JointAnimationFinished), 1);
}

#[test]
fn test_unknown_event_code_is_rejected() {
    let (rt, _sink, _output) = setup();
    let err = rt.sender().send_event_code(42, None).unwrap_err();
    assert!(matches!(err, AvatarStreamError::UnknownCommand { code: 42 }));
}

#[test]
fn test_conditions_flow_through_channel_sink() {
    let (tx, rx) = crossbeam_channel::unbounded::<ConditionedMessage>();
    let audio = ContinuousPcmEngine::new(MockAudioOutput::new());
    let mut rt =
        AnimationBlendRuntime::new(&Config::default().runtime, audio, Arc::new(tx)).unwrap();
    rt.load_clip(BufferKind::Local, clip(1));
    rt.sender().send_event_code(2, None).unwrap();
    for _ in 0..3 {
        rt.tick(FRAME_MS);
    }

    let first = rx.try_recv().unwrap();
    assert_eq!(first.condition, Condition::AnimationFinished);
    assert!(first.to_json().contains("\"condition\":17"));
}

#[test]
fn test_audio_rides_along_with_pause_and_delayed_play() {
    let (mut rt, _sink, output) = setup();
    let sender = rt.sender();
    rt.audio().append(&pcm_bytes(&[1000; 1600]));
    assert!(output.is_active());

    sender.send(RuntimeCommand::PauseAll).unwrap();
    rt.tick(FRAME_MS);
    assert!(rt.audio().is_paused());
    assert!(!output.is_active());

    sender.send(RuntimeCommand::ResumeAll).unwrap();
    rt.tick(FRAME_MS);
    assert!(output.is_active());

    sender
        .send(RuntimeCommand::DelayedPlay {
            channel: PlayChannel::Audio,
            delay: std::time::Duration::from_millis(20),
        })
        .unwrap();
    rt.tick(FRAME_MS);
    assert!(rt.audio().is_paused());

    // The default scheduler re-enqueues the resume from its own thread.
    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
    while rt.audio().is_paused() && std::time::Instant::now() < deadline {
        std::thread::sleep(std::time::Duration::from_millis(5));
        rt.tick(0.0);
    }
    assert!(!rt.audio().is_paused());
}

#[test]
fn test_gapless_playback_across_appends() {
    let output = MockAudioOutput::new();
    let engine = ContinuousPcmEngine::new(output.clone());

    let first: Vec<i16> = (0..800).map(|i| i as i16).collect();
    let second: Vec<i16> = (800..2000).map(|i| -(i as i16)).collect();
    engine.append(&pcm_bytes(&first));
    engine.append(&pcm_bytes(&second));
    while output.finish_current() {}

    let played: Vec<f32> = output
        .segments()
        .into_iter()
        .flat_map(|seg| seg.samples)
        .collect();
    let appended: Vec<f32> = first
        .iter()
        .chain(second.iter())
        .map(|&s| s as f32 / 32768.0)
        .collect();
    assert_eq!(played, appended);
    assert_eq!(engine.playback_position_samples(), 2000);
}

#[test]
fn test_estimator_feeds_stream_health_decisions() {
    let mut estimator = AdaptiveBufferSizeEstimator::new("motion");
    let mut stream = NetworkStream::new(0.0);
    for i in 0..10 {
        let recv = if i < 5 { i as f64 * 0.1 } else { 1.0 + i as f64 * 0.1 };
        stream.push(0.1, recv);
    }
    estimator.update_buffer_size_by_stream(&stream).unwrap();
    assert!(estimator.buffer_size() > 0.1);

    let (mut rt, _sink, _output) = setup();
    let (joints, morphs) = frames(30);
    rt.append_streamed(joints, morphs);
    let health = rt.stream_health();
    assert!(health.motion_health_seconds >= estimator.buffer_size());
}

fn soft_local_runtime(len: usize) -> Runtime {
    let (mut rt, _sink, _output) = setup();
    rt.load_clip(BufferKind::Idle, clip(40));
    rt.load_clip(BufferKind::Local, clip(len));
    rt.sender()
        .send(switch(TargetBuffer::Local, BlendMode::Soft, BlendMode::Soft))
        .unwrap();
    rt
}

proptest! {
    #[test]
    fn prop_paused_ticks_change_nothing(
        warmup in 0usize..40,
        deltas in proptest::collection::vec(0.0f64..500.0, 1..20),
    ) {
        let mut rt = soft_local_runtime(20);
        for _ in 0..warmup {
            rt.tick(FRAME_MS);
        }
        rt.pause_animation();
        let frozen = rt.tick(0.0);
        let joint_blend = *rt.joint_blend();
        for delta in deltas {
            prop_assert_eq!(rt.tick(delta), frozen);
        }
        prop_assert_eq!(*rt.joint_blend(), joint_blend);
    }

    #[test]
    fn prop_weights_stay_in_unit_range(
        len in 1usize..60,
        deltas in proptest::collection::vec(0.0f64..120.0, 1..120),
        interrupt_at in proptest::option::of(0usize..120),
    ) {
        let mut rt = soft_local_runtime(len);
        let sender = rt.sender();
        for (i, delta) in deltas.into_iter().enumerate() {
            if interrupt_at == Some(i) {
                sender.send(RuntimeCommand::Interrupt(BlendMode::Soft)).unwrap();
            }
            let eval = rt.tick(delta);
            prop_assert!((0.0..=1.0).contains(&eval.joint_weight));
            prop_assert!((0.0..=1.0).contains(&eval.morph_weight));
            prop_assert!(eval.rhs_joint_time <= len as f64);
        }
    }
}
