use std::path::PathBuf;
use std::time::{Duration, Instant};

use bataa_reader::{
    config::ReaderConfig,
    playback::SpeechParams,
    reader::{ReaderEvent, TextReader},
    recording::{CaptureHost, CaptureStream},
    CaptureError, EngineEvent, ReaderError, SpeechEngine, Utterance, VoiceDescriptor,
};

/// Prints utterances instead of speaking them.
struct ConsoleEngine;

impl SpeechEngine for ConsoleEngine {
    fn speak(&mut self, utterance: &Utterance) -> Result<(), ReaderError> {
        println!(
            "[engine] speaking {:?} as {} (rate {:.1}, pitch {:.1}, volume {:.1})",
            utterance.text,
            utterance
                .voice
                .as_ref()
                .map(|v| v.name.as_str())
                .unwrap_or("<default voice>"),
            utterance.rate,
            utterance.pitch,
            utterance.volume
        );
        Ok(())
    }

    fn pause(&mut self) {}

    fn resume(&mut self) {}

    fn cancel(&mut self) {}

    fn list_voices(&self) -> Vec<VoiceDescriptor> {
        vec![
            VoiceDescriptor::new("Microsoft David", "en-US").with_default(true),
            VoiceDescriptor::new("Google Bataa", "mn-MN"),
        ]
    }
}

/// A host without capture devices, like a browser that refused every prompt.
struct NoCapture;

impl CaptureHost for NoCapture {
    fn request_microphone(&mut self) -> Result<Box<dyn CaptureStream>, CaptureError> {
        Err(CaptureError::PermissionDenied("no microphone in demo".to_string()))
    }

    fn request_display_audio(&mut self) -> Result<Box<dyn CaptureStream>, CaptureError> {
        Err(CaptureError::NoAudioTrack)
    }

    fn is_mime_supported(&self, mime_type: &str) -> bool {
        mime_type == "audio/wav"
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let text = args.next().unwrap_or_else(|| "Сайн байна уу".to_string());
    let config = match args.next() {
        Some(path) => ReaderConfig::from_json_file(&PathBuf::from(path))?,
        None => ReaderConfig::default(),
    };

    let mut reader = TextReader::new(ConsoleEngine, NoCapture, config);
    let session = reader.play(&text, SpeechParams::default())?;

    // A real host delivers these from its own event loop.
    reader.on_engine_event(session, EngineEvent::Start);
    reader.on_engine_event(session, EngineEvent::End);

    for event in reader.take_events() {
        match event {
            ReaderEvent::RecordingFallback { strategy, reason, .. } => {
                println!("{strategy} unavailable: {reason}")
            }
            ReaderEvent::RecordingReady { strategy, size, .. } => {
                println!("Recording ready via {strategy}: {size} bytes")
            }
            other => println!("{other:?}"),
        }
    }

    let now = Instant::now();
    let artifact = reader.download(now)?;
    std::fs::write(&artifact.suggested_name, &artifact.bytes)?;
    println!("Saved to {}", artifact.suggested_name);

    reader.release_expired(now + Duration::from_secs(2));
    Ok(())
}
