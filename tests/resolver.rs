//! Speech resolver integration tests
//!
//! Output tiers (bridge, chunked engine, tone) and input routing, driven by
//! in-memory engines and bridges

use std::sync::Arc;
use std::time::Duration;

use astrova_voice::bridge::{
    BridgeCapability, BridgeRegistry, BridgeRequest, CapabilityProvider, EnvironmentProbe,
};
use astrova_voice::platform::{RecognitionEngine, RecognitionEvent, SynthesisEngine, TonePlayer};
use astrova_voice::resolver::{OutputOptions, OutputTier, RecognitionRoute};
use astrova_voice::voice::{ChunkStatus, VoiceGender, chunk_text};
use astrova_voice::{
    Error, EventSink, SpeechInputResolver, SpeechOutputRequest, SpeechOutputResolver,
    VoiceErrorKind, VoiceEvent,
};
use tokio::sync::mpsc;

mod common;

use common::{
    FakeBridge, FakeRecognitionEngine, FakeSynthesisEngine, FakeTone, SpeakBehavior, drain, settle,
};

const WELCOME: &str = "Welcome to our hotel. How may I help you today? We offer room service, \
                       spa bookings, and concierge assistance.";

fn probe(bridges: &[&FakeBridge]) -> EnvironmentProbe {
    let mut registry = BridgeRegistry::new();
    for bridge in bridges {
        registry.register(Arc::new((*bridge).clone()) as Arc<dyn CapabilityProvider>);
    }
    EnvironmentProbe::new(registry).with_embedded_env(None)
}

fn output(
    bridges: &[&FakeBridge],
    engine: Option<&FakeSynthesisEngine>,
    tone: &FakeTone,
) -> (SpeechOutputResolver, mpsc::UnboundedReceiver<VoiceEvent>) {
    let (sink, rx) = EventSink::channel();
    let engine = engine.map(|e| Arc::new(e.clone()) as Arc<dyn SynthesisEngine>);
    let tone = Some(Arc::new(tone.clone()) as Arc<dyn TonePlayer>);
    (SpeechOutputResolver::new(probe(bridges), engine, tone, sink), rx)
}

fn request(text: &str) -> SpeechOutputRequest {
    SpeechOutputRequest::new(text, "en-IN", VoiceGender::Female)
}

fn speaking_events(events: &[VoiceEvent]) -> Vec<bool> {
    events
        .iter()
        .filter_map(|e| match e {
            VoiceEvent::SpeakingChanged { speaking } => Some(*speaking),
            _ => None,
        })
        .collect()
}

// -- output tiers -----------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_bridge_speaks_whole_text() {
    let bridge = FakeBridge::new("shell", &[BridgeCapability::SpeechOutput]);
    let engine = FakeSynthesisEngine::new();
    let tone = FakeTone::default();
    let (resolver, mut rx) = output(&[&bridge], Some(&engine), &tone);

    let outcome = resolver.speak(&request(WELCOME)).await;

    assert_eq!(outcome.tier, OutputTier::Bridge);
    assert!(outcome.success);
    assert_eq!(
        bridge.requests(),
        vec![BridgeRequest::Speak {
            text: WELCOME.to_string(),
            language_tag: "en-IN".to_string(),
        }]
    );
    assert!(engine.spoken().is_empty());
    assert_eq!(speaking_events(&drain(&mut rx)), vec![true, false]);
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_bridge_falls_through_to_engine() {
    let bridge = FakeBridge::new("shell", &[BridgeCapability::SpeechOutput]);
    bridge.set_reachable(false);
    let engine = FakeSynthesisEngine::new();
    let tone = FakeTone::default();
    let (resolver, _rx) = output(&[&bridge], Some(&engine), &tone);

    let outcome = resolver.speak(&request("Good morning.")).await;

    assert_eq!(outcome.tier, OutputTier::Engine);
    assert!(outcome.success);
    assert!(bridge.requests().is_empty());
    assert_eq!(engine.spoken_texts(), vec!["Good morning."]);
}

#[tokio::test(start_paused = true)]
async fn test_input_only_bridge_is_not_used_for_output() {
    let bridge = FakeBridge::new("mic-only", &[BridgeCapability::SpeechInput]);
    let engine = FakeSynthesisEngine::new();
    let tone = FakeTone::default();
    let (resolver, _rx) = output(&[&bridge], Some(&engine), &tone);

    let outcome = resolver.speak(&request("Good evening.")).await;

    assert_eq!(outcome.tier, OutputTier::Engine);
    assert!(bridge.requests().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_engine_speaks_chunks_in_order() {
    let engine = FakeSynthesisEngine::new();
    let tone = FakeTone::default();
    let (resolver, mut rx) = output(&[], Some(&engine), &tone);
    let resolver = resolver.with_options(OutputOptions {
        max_chunk_chars: 40,
        ..Default::default()
    });

    let outcome = resolver.speak(&request(WELCOME)).await;

    let expected: Vec<String> = chunk_text(WELCOME, 40).into_iter().map(|c| c.text).collect();
    assert!(expected.len() >= 3);
    assert_eq!(engine.spoken_texts(), expected);
    assert!(outcome.success);
    assert!(!outcome.cancelled);
    assert!(outcome.chunks.iter().all(|c| c.status == ChunkStatus::Done));
    assert_eq!(speaking_events(&drain(&mut rx)), vec![true, false]);
    assert_eq!(tone.plays(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_chunks_are_separated_by_a_pause() {
    let speak_time = Duration::from_millis(100);
    let engine = FakeSynthesisEngine::new().with_speak_time(speak_time);
    let tone = FakeTone::default();
    let (resolver, _rx) = output(&[], Some(&engine), &tone);
    let resolver = resolver.with_options(OutputOptions {
        max_chunk_chars: 40,
        ..Default::default()
    });

    let chunks = u32::try_from(chunk_text(WELCOME, 40).len()).unwrap();
    let started = tokio::time::Instant::now();
    let outcome = resolver.speak(&request(WELCOME)).await;
    let elapsed = started.elapsed();

    assert!(outcome.success);
    let expected = speak_time * chunks + Duration::from_millis(200) * (chunks - 1);
    assert!(elapsed >= expected, "{elapsed:?} < {expected:?}");
    assert!(elapsed < expected + Duration::from_millis(50), "{elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn test_zero_pause_speaks_chunks_back_to_back() {
    let speak_time = Duration::from_millis(100);
    let engine = FakeSynthesisEngine::new().with_speak_time(speak_time);
    let tone = FakeTone::default();
    let (resolver, _rx) = output(&[], Some(&engine), &tone);
    let resolver = resolver.with_options(OutputOptions {
        max_chunk_chars: 40,
        inter_chunk_pause: Duration::ZERO,
        ..Default::default()
    });

    let chunks = u32::try_from(chunk_text(WELCOME, 40).len()).unwrap();
    let started = tokio::time::Instant::now();
    let outcome = resolver.speak(&request(WELCOME)).await;
    let elapsed = started.elapsed();

    assert!(outcome.success);
    assert_eq!(engine.spoken().len(), chunks as usize);
    assert!(elapsed >= speak_time * chunks);
    assert!(elapsed < speak_time * chunks + Duration::from_millis(50), "{elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn test_failed_middle_chunk_does_not_stop_the_rest() {
    let engine = FakeSynthesisEngine::new();
    engine.script([SpeakBehavior::Succeed, SpeakBehavior::Fail, SpeakBehavior::Succeed]);
    let tone = FakeTone::default();
    let (resolver, _rx) = output(&[], Some(&engine), &tone);
    let resolver = resolver.with_options(OutputOptions {
        max_chunk_chars: 40,
        ..Default::default()
    });

    let outcome = resolver.speak(&request(WELCOME)).await;
    let statuses: Vec<ChunkStatus> = outcome.chunks.iter().map(|c| c.status).collect();

    assert_eq!(statuses[0], ChunkStatus::Done);
    assert_eq!(statuses[1], ChunkStatus::Failed);
    assert!(statuses[2..].iter().all(|s| *s == ChunkStatus::Done));
    assert_eq!(engine.spoken().len(), outcome.chunks.len());
    assert!(outcome.success);
}

#[tokio::test(start_paused = true)]
async fn test_hung_chunk_times_out() {
    let engine = FakeSynthesisEngine::new();
    engine.script([SpeakBehavior::Hang]);
    let tone = FakeTone::default();
    let (resolver, _rx) = output(&[], Some(&engine), &tone);
    let resolver = resolver.with_options(OutputOptions {
        max_chunk_chars: 40,
        ..Default::default()
    });

    let started = tokio::time::Instant::now();
    let outcome = resolver.speak(&request(WELCOME)).await;

    assert_eq!(outcome.chunks[0].status, ChunkStatus::Failed);
    assert!(outcome.chunks[1..].iter().all(|c| c.status == ChunkStatus::Done));
    assert!(outcome.success);
    assert!(engine.cancels() >= 1);
    // Short chunk: the 5s floor applies
    assert!(started.elapsed() >= Duration::from_secs(5));
}

#[tokio::test(start_paused = true)]
async fn test_all_chunks_failing_plays_tone() {
    let engine = FakeSynthesisEngine::new();
    engine.script([SpeakBehavior::Fail; 8]);
    let tone = FakeTone::default();
    let (resolver, mut rx) = output(&[], Some(&engine), &tone);
    let resolver = resolver.with_options(OutputOptions {
        max_chunk_chars: 40,
        ..Default::default()
    });

    let outcome = resolver.speak(&request(WELCOME)).await;

    assert_eq!(outcome.tier, OutputTier::Tone);
    assert!(!outcome.success);
    assert!(outcome.chunks.iter().all(|c| c.status == ChunkStatus::Failed));
    assert_eq!(tone.plays(), 1);

    let events = drain(&mut rx);
    assert!(events.iter().any(|e| matches!(
        e,
        VoiceEvent::Error {
            kind: VoiceErrorKind::ChunkFailure,
            ..
        }
    )));
    assert_eq!(speaking_events(&events), vec![true, false]);
}

#[tokio::test(start_paused = true)]
async fn test_no_engine_reports_unavailable_and_beeps() {
    let tone = FakeTone::default();
    let (resolver, mut rx) = output(&[], None, &tone);

    let outcome = resolver.speak(&request("Hello")).await;

    assert_eq!(outcome.tier, OutputTier::Tone);
    assert!(!outcome.success);
    assert_eq!(tone.plays(), 1);
    assert!(drain(&mut rx).iter().any(|e| matches!(
        e,
        VoiceEvent::Error {
            kind: VoiceErrorKind::CapabilityUnavailable,
            ..
        }
    )));
}

#[tokio::test(start_paused = true)]
async fn test_unavailable_engine_and_silent_tone() {
    let engine = FakeSynthesisEngine::new();
    engine.set_available(false);
    let tone = FakeTone::failing();
    let (resolver, _rx) = output(&[], Some(&engine), &tone);

    let outcome = resolver.speak(&request("Hello")).await;

    assert_eq!(outcome.tier, OutputTier::None);
    assert!(!outcome.success);
    assert!(engine.spoken().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_empty_text_is_rejected() {
    let engine = FakeSynthesisEngine::new();
    let tone = FakeTone::default();
    let (resolver, mut rx) = output(&[], Some(&engine), &tone);

    let outcome = resolver.speak(&request("   ")).await;

    assert_eq!(outcome.tier, OutputTier::None);
    assert!(!outcome.success);
    assert!(engine.spoken().is_empty());
    assert!(drain(&mut rx).is_empty());
}

// -- cancellation -----------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_stop_speaking_skips_remaining_chunks() {
    let engine = FakeSynthesisEngine::new();
    let tone = FakeTone::default();
    let (resolver, mut rx) = output(&[], Some(&engine), &tone);
    let resolver = Arc::new(resolver.with_options(OutputOptions {
        max_chunk_chars: 40,
        ..Default::default()
    }));

    let task = {
        let resolver = Arc::clone(&resolver);
        tokio::spawn(async move { resolver.speak(&request(WELCOME)).await })
    };

    // First chunk takes 100ms, then a 200ms pause
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(resolver.is_speaking());
    assert!(resolver.stop_speaking());

    let outcome = task.await.unwrap();
    assert!(outcome.cancelled);
    assert_eq!(engine.spoken().len(), 1);
    assert!(!resolver.is_speaking());
    assert!(!resolver.stop_speaking());
    assert_eq!(speaking_events(&drain(&mut rx)), vec![true, false]);
}

#[tokio::test(start_paused = true)]
async fn test_new_request_supersedes_current() {
    let engine = FakeSynthesisEngine::new();
    engine.script([SpeakBehavior::Hang]);
    let tone = FakeTone::default();
    let (resolver, mut rx) = output(&[], Some(&engine), &tone);
    let resolver = Arc::new(resolver);

    let first = {
        let resolver = Arc::clone(&resolver);
        tokio::spawn(async move { resolver.speak(&request("This reply is slow.")).await })
    };
    settle().await;

    let second = resolver.speak(&request("Your taxi is here.")).await;
    let first = first.await.unwrap();

    assert!(first.cancelled);
    assert!(second.success);
    assert_eq!(engine.spoken_texts(), vec!["This reply is slow.", "Your taxi is here."]);
    assert_eq!(speaking_events(&drain(&mut rx)), vec![true, false]);
    assert_eq!(tone.plays(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_superseding_request_keeps_its_first_chunk() {
    let engine = FakeSynthesisEngine::interrupting();
    engine.script([SpeakBehavior::Hang]);
    let tone = FakeTone::default();
    let (resolver, _rx) = output(&[], Some(&engine), &tone);
    let resolver = Arc::new(resolver);

    let first = {
        let resolver = Arc::clone(&resolver);
        tokio::spawn(async move { resolver.speak(&request("This reply is slow.")).await })
    };
    settle().await;

    let second = resolver.speak(&request("Your taxi is here.")).await;
    let first = first.await.unwrap();

    assert!(first.cancelled);
    assert!(second.success);
    assert_eq!(second.tier, OutputTier::Engine);
    assert_eq!(second.chunks.len(), 1);
    assert_eq!(second.chunks[0].status, ChunkStatus::Done);
    // Only the supersede itself cancels the engine
    assert_eq!(engine.cancels(), 1);
    assert_eq!(tone.plays(), 0);
}

// -- voice selection --------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_engine_gets_selected_voice_and_style() {
    let engine = FakeSynthesisEngine::new();
    let tone = FakeTone::default();
    let (resolver, _rx) = output(&[], Some(&engine), &tone);

    resolver.speak(&request("Hello")).await;
    resolver
        .speak(&SpeechOutputRequest::new("Hello", "en-IN", VoiceGender::Male))
        .await;
    resolver
        .speak(&SpeechOutputRequest::new("नमस्ते", "hi-IN", VoiceGender::Female))
        .await;
    resolver
        .speak(&SpeechOutputRequest::new("Bonjour", "fr-FR", VoiceGender::Female))
        .await;

    let voices: Vec<Option<String>> = engine
        .spoken()
        .into_iter()
        .map(|u| u.voice.map(|v| v.identifier))
        .collect();
    assert_eq!(
        voices,
        vec![
            Some("in-heera".to_string()),
            Some("in-ravi".to_string()),
            Some("hi-google".to_string()),
            None,
        ]
    );

    let style = engine.spoken()[0].style;
    assert!((style.rate - 0.9).abs() < f32::EPSILON);
    assert!((style.pitch - 1.1).abs() < f32::EPSILON);
}

// -- input routing ----------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_bridge_recognition_delivers_transcript() {
    let (transcripts_tx, mut transcripts) = mpsc::unbounded_channel();
    let bridge = FakeBridge::new("shell", &[BridgeCapability::SpeechInput])
        .with_transcript(transcripts_tx, "namaste");
    let engine = FakeRecognitionEngine::new();
    let input = SpeechInputResolver::new(
        probe(&[&bridge]),
        Some(Arc::new(engine.clone()) as Arc<dyn RecognitionEngine>),
    );

    let (tx, _rx) = mpsc::unbounded_channel();
    let route = input.start_recognition("hi-IN", tx).await.unwrap();

    assert!(matches!(route, Some(RecognitionRoute::Bridge(ref name)) if name == "shell"));
    assert_eq!(engine.created(), 0);
    let transcript = transcripts.recv().await.unwrap();
    assert_eq!(transcript.text, "namaste");
    assert_eq!(transcript.language_tag.as_deref(), Some("hi-IN"));
}

#[tokio::test(start_paused = true)]
async fn test_failing_bridge_falls_back_to_platform() {
    let bridge = FakeBridge::new("shell", &[BridgeCapability::SpeechInput]);
    bridge.set_failing(true);
    let engine = FakeRecognitionEngine::new();
    engine.set_foreground_transcript(Some("what time is checkout"));
    let input = SpeechInputResolver::new(
        probe(&[&bridge]),
        Some(Arc::new(engine.clone()) as Arc<dyn RecognitionEngine>),
    );

    let (tx, mut rx) = mpsc::unbounded_channel();
    let route = input.start_recognition("en-IN", tx).await.unwrap();

    assert!(matches!(route, Some(RecognitionRoute::Platform(_))));
    assert_eq!(bridge.requests().len(), 1);

    let options = engine.options();
    assert!(!options[0].continuous);
    assert!(!options[0].interim_results);
    assert_eq!(options[0].max_alternatives, 1);
    assert_eq!(options[0].language_tag, "en-IN");

    let mut transcripts = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let RecognitionEvent::Result { transcript, .. } = event {
            transcripts.push(transcript);
        }
    }
    assert_eq!(transcripts, vec!["what time is checkout"]);
}

#[tokio::test(start_paused = true)]
async fn test_no_input_available() {
    let input = SpeechInputResolver::new(probe(&[]), None);
    let (tx, _rx) = mpsc::unbounded_channel();
    assert!(input.start_recognition("en-IN", tx).await.unwrap().is_none());

    let engine = FakeRecognitionEngine::unavailable();
    let input = SpeechInputResolver::new(
        probe(&[]),
        Some(Arc::new(engine.clone()) as Arc<dyn RecognitionEngine>),
    );
    let (tx, _rx) = mpsc::unbounded_channel();
    assert!(input.start_recognition("en-IN", tx).await.unwrap().is_none());
    assert_eq!(engine.created(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_platform_start_failure_is_an_error() {
    let engine = FakeRecognitionEngine::new();
    engine.fail_next_starts([Error::Permission("microphone denied".to_string())]);
    let input = SpeechInputResolver::new(
        probe(&[]),
        Some(Arc::new(engine.clone()) as Arc<dyn RecognitionEngine>),
    );

    let (tx, _rx) = mpsc::unbounded_channel();
    let result = input.start_recognition("en-IN", tx).await;

    assert!(matches!(result, Err(Error::Permission(_))));
    assert_eq!(engine.live(), 0);
}
