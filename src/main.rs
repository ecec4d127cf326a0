use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use astrova_voice::bridge::{
    BridgeRegistry, BridgeTranscript, CommandBridge, EnvironmentProbe, ShellSocketBridge,
};
use astrova_voice::language::{LanguageScorer, speech_tag_for};
use astrova_voice::platform::{
    CloudRecognitionEngine, CloudSynthesisEngine, RecognitionEngine, RecognitionEvent,
    SpeakerTone, SynthesisEngine,
};
use astrova_voice::resolver::RecognitionRoute;
use astrova_voice::voice::{
    AudioCapture, AudioPlayback, PLAYBACK_SAMPLE_RATE, SAMPLE_RATE, SpeechToText, TextToSpeech,
    VoiceGender, chunk_text, rms_energy, tone,
};
use astrova_voice::{
    Config, EventSink, HttpResponseService, SpeechInputResolver, SpeechOutputRequest,
    SpeechOutputResolver, TurnController, TurnOptions, TurnParts, VoiceEvent,
};

/// Astrova - voice front end for the hospitality assistant
#[derive(Parser)]
#[command(name = "astrova", version, about)]
struct Cli {
    /// Config file (defaults to the user config directory)
    #[arg(short, long, env = "ASTROVA_CONFIG")]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Split text into speakable chunks
    Chunk {
        text: String,
        /// Maximum characters per chunk
        #[arg(short, long)]
        max: Option<usize>,
    },
    /// Detect the language of a transcript
    DetectLanguage { text: String },
    /// Show the detected host and reachable bridges
    Probe,
    /// Speak text through the output fallback chain
    Speak {
        text: String,
        /// Language code; detected from the text when omitted
        #[arg(short, long)]
        language: Option<String>,
        /// Preferred voice gender
        #[arg(short, long)]
        gender: Option<VoiceGender>,
    },
    /// Capture one utterance and print the transcript
    Listen {
        /// Language code to listen in
        #[arg(short, long)]
        language: Option<String>,
    },
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output
    TestSpeaker,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info,astrova_voice=info",
        1 => "info,astrova_voice=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli.config.as_deref();

    if let Some(cmd) = cli.command {
        return match cmd {
            Command::Chunk { text, max } => cmd_chunk(config_path, &text, max),
            Command::DetectLanguage { text } => cmd_detect_language(config_path, &text),
            Command::Probe => cmd_probe(config_path),
            Command::Speak {
                text,
                language,
                gender,
            } => cmd_speak(config_path, &text, language, gender).await,
            Command::Listen { language } => cmd_listen(config_path, language).await,
            Command::TestMic { duration } => test_mic(duration).await,
            Command::TestSpeaker => test_speaker().await,
        };
    }

    let config = Config::load(config_path)?;
    tracing::debug!(?config, "loaded configuration");

    let url = config.response.url.clone().context(
        "no response service configured; set ASTROVA_RESPONSE_URL or [response].url",
    )?;
    let response = HttpResponseService::new(
        &url,
        config.response.api_key.clone(),
        config.response.timeout,
        config.response.retry.clone(),
    )?;

    let (events, mut event_rx) = EventSink::channel();
    let (transcripts_tx, transcripts_rx) = mpsc::unbounded_channel();
    let probe = build_probe(&config, Some(transcripts_tx));
    let recognition = build_recognition(&config);

    let controller = TurnController::new(TurnParts {
        recognition: recognition.clone(),
        wake: config.wake.clone(),
        input: SpeechInputResolver::new(probe.clone(), recognition),
        output: Arc::new(build_output(&config, probe, events.clone())),
        scorer: LanguageScorer::new(&config.language.profiles, config.language.default.clone())?,
        response: Arc::new(response),
        bridge_transcripts: transcripts_rx,
        options: TurnOptions {
            language: config.language.default.clone(),
            auto_detect: config.language.auto_detect,
            gender: config.output.gender,
            capture_timeout: config.input.capture_timeout,
            ..TurnOptions::default()
        },
        events,
    });

    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            log_event(&event);
        }
    });

    if controller.session().is_some() {
        let phrase = config.wake.phrases.first().map_or("", String::as_str);
        tracing::info!("astrova ready - say \"{phrase}\"");
    } else {
        tracing::info!("astrova ready (no recognition engine, bridge input only)");
    }

    controller
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
            }
        })
        .await;

    Ok(())
}

fn log_event(event: &VoiceEvent) {
    match event {
        VoiceEvent::Activated => tracing::info!("wake word detected"),
        VoiceEvent::Transcript { text, language_tag } => {
            tracing::info!(%language_tag, "guest: {text}");
        }
        VoiceEvent::SpeakingChanged { speaking } => tracing::debug!(speaking, "speaking changed"),
        VoiceEvent::ListeningChanged { listening } => {
            tracing::debug!(listening, "listening changed");
        }
        // Already logged where raised
        VoiceEvent::Error { kind, .. } => tracing::trace!(%kind, "error event"),
    }
}

fn build_probe(
    config: &Config,
    transcripts: Option<mpsc::UnboundedSender<BridgeTranscript>>,
) -> EnvironmentProbe {
    let mut registry = BridgeRegistry::new();

    if let Some(path) = &config.bridges.shell_socket {
        let mut bridge = ShellSocketBridge::new(path.clone());
        if let Some(tx) = transcripts {
            bridge = bridge.with_transcripts(tx);
        }
        registry.register(Arc::new(bridge));
    }
    for command in &config.bridges.commands {
        registry.register(Arc::new(CommandBridge::new(
            *command,
            config.output.options.style,
        )));
    }

    EnvironmentProbe::new(registry).with_shell_socket(config.bridges.shell_socket.clone())
}

fn build_recognition(config: &Config) -> Option<Arc<dyn RecognitionEngine>> {
    let Some(key) = config.stt_key() else {
        tracing::warn!(
            provider = ?config.input.stt_provider,
            "no STT key, platform recognition disabled"
        );
        return None;
    };
    match SpeechToText::new(
        config.input.stt_provider,
        key.clone(),
        config.input.stt_model.clone(),
    ) {
        Ok(stt) => Some(Arc::new(CloudRecognitionEngine::new(
            stt,
            config.input.capture_timeout,
        ))),
        Err(e) => {
            tracing::warn!(error = %e, "STT unavailable");
            None
        }
    }
}

fn build_synthesis(config: &Config) -> Option<Arc<dyn SynthesisEngine>> {
    let Some(key) = config.tts_key() else {
        tracing::warn!(provider = ?config.output.tts_provider, "no TTS key, synthesis disabled");
        return None;
    };
    match TextToSpeech::new(
        config.output.tts_provider,
        key.clone(),
        config.output.tts_model.clone(),
    ) {
        Ok(tts) => Some(Arc::new(CloudSynthesisEngine::new(
            tts,
            config.output.voice.clone(),
            config.output.voices.clone(),
        ))),
        Err(e) => {
            tracing::warn!(error = %e, "TTS unavailable");
            None
        }
    }
}

fn build_output(
    config: &Config,
    probe: EnvironmentProbe,
    events: EventSink,
) -> SpeechOutputResolver {
    SpeechOutputResolver::new(
        probe,
        build_synthesis(config),
        Some(Arc::new(SpeakerTone::default())),
        events,
    )
    .with_selector(config.output.selector.clone())
    .with_options(config.output.options.clone())
}

fn cmd_chunk(
    config_path: Option<&std::path::Path>,
    text: &str,
    max: Option<usize>,
) -> anyhow::Result<()> {
    let max = match max {
        Some(max) => max,
        None => Config::load(config_path)?.output.options.max_chunk_chars,
    };
    anyhow::ensure!(max > 0, "--max must be positive");

    for chunk in chunk_text(text, max) {
        println!("[{}] ({} chars) {}", chunk.index, chunk.char_len(), chunk.text);
    }
    Ok(())
}

fn cmd_detect_language(config_path: Option<&std::path::Path>, text: &str) -> anyhow::Result<()> {
    let config = Config::load(config_path)?;
    let scorer = LanguageScorer::new(&config.language.profiles, config.language.default.clone())?;

    let score = scorer.score(text);
    for (code, count) in score.counts() {
        if *count > 0 {
            println!("{code}: {count}");
        }
    }
    let language = scorer.detect(text);
    println!("detected: {language} ({})", speech_tag_for(language));
    Ok(())
}

fn cmd_probe(config_path: Option<&std::path::Path>) -> anyhow::Result<()> {
    let config = Config::load(config_path)?;
    let report = build_probe(&config, None).probe();

    println!("host: {}", report.host_kind);
    let bridges = report.bridge_names();
    if bridges.is_empty() {
        println!("bridges: none");
    } else {
        println!("bridges: {}", bridges.join(", "));
    }

    let recognition = build_recognition(&config).is_some_and(|e| e.is_available());
    let synthesis = build_synthesis(&config).is_some_and(|e| e.is_available());
    println!("platform recognition: {}", if recognition { "yes" } else { "no" });
    println!("platform synthesis: {}", if synthesis { "yes" } else { "no" });
    Ok(())
}

async fn cmd_speak(
    config_path: Option<&std::path::Path>,
    text: &str,
    language: Option<String>,
    gender: Option<VoiceGender>,
) -> anyhow::Result<()> {
    let config = Config::load(config_path)?;
    let language = match language {
        Some(code) => code,
        None => LanguageScorer::new(&config.language.profiles, config.language.default.clone())?
            .detect(text)
            .to_string(),
    };

    let output = build_output(&config, build_probe(&config, None), EventSink::discard());
    let request = SpeechOutputRequest::new(
        text,
        speech_tag_for(&language),
        gender.unwrap_or(config.output.gender),
    );

    let outcome = output.speak(&request).await;
    println!("tier: {:?}, success: {}", outcome.tier, outcome.success);
    for chunk in &outcome.chunks {
        println!("  [{}] {:?}: {}", chunk.index, chunk.status, chunk.text);
    }
    anyhow::ensure!(outcome.success, "speech output failed");
    Ok(())
}

async fn cmd_listen(
    config_path: Option<&std::path::Path>,
    language: Option<String>,
) -> anyhow::Result<()> {
    let config = Config::load(config_path)?;
    let language = language.unwrap_or_else(|| config.language.default.clone());
    let tag = speech_tag_for(&language);

    let (transcripts_tx, mut transcripts_rx) = mpsc::unbounded_channel();
    let input = SpeechInputResolver::new(
        build_probe(&config, Some(transcripts_tx)),
        build_recognition(&config),
    );

    let (tx, mut rx) = mpsc::unbounded_channel();
    let route = input
        .start_recognition(&tag, tx)
        .await?
        .context("no speech input available")?;
    println!("Listening ({tag})...");

    let deadline = config.input.capture_timeout;
    let transcript = match route {
        RecognitionRoute::Bridge(_) => tokio::time::timeout(deadline, transcripts_rx.recv())
            .await
            .ok()
            .flatten()
            .map(|t| t.text),
        RecognitionRoute::Platform(mut recognizer) => {
            let result = tokio::time::timeout(deadline, async {
                while let Some(event) = rx.recv().await {
                    match event {
                        RecognitionEvent::Result {
                            transcript,
                            is_final: true,
                            ..
                        } => return Ok(Some(transcript)),
                        RecognitionEvent::Error(kind) if !kind.is_benign() => {
                            return Err(anyhow::anyhow!(kind.message()));
                        }
                        RecognitionEvent::Ended => break,
                        _ => {}
                    }
                }
                Ok(None)
            })
            .await;
            recognizer.abort();
            result.unwrap_or(Ok(None))?
        }
    };

    match transcript {
        Some(text) => println!("transcript: {text}"),
        None => println!("no speech detected"),
    }
    Ok(())
}

/// Test microphone input
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let mut capture = AudioCapture::open()?;
    capture.start()?;

    println!("Sample rate: {SAMPLE_RATE} Hz");
    println!("---");

    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let samples = capture.take_buffer();
        let energy = rms_energy(&samples);
        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "#".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!(
            "[{:2}s] RMS: {:.4} | Peak: {:.4} | [{}]",
            i + 1,
            energy,
            peak,
            meter
        );
    }

    capture.stop();

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: pactl info | grep 'Default Source'");
    println!("  3. Run: arecord -l (to list devices)");

    Ok(())
}

/// Test speaker output with a sine wave
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let clip = tone(440.0, Duration::from_secs(2), PLAYBACK_SAMPLE_RATE, 0.3);
    println!(
        "Playing {} samples at {} Hz...",
        clip.samples.len(),
        clip.sample_rate
    );

    tokio::task::spawn_blocking(move || {
        let never = AtomicBool::new(false);
        AudioPlayback::open(PLAYBACK_SAMPLE_RATE)?.play_blocking(clip, &never)
    })
    .await??;

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: pactl info | grep 'Default Sink'");
    println!("  2. Run: pactl list sinks short");

    Ok(())
}
