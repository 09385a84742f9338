//! Microphone capture feeding the short-audio recognizer.
//!
//! The default input device is down-mixed to mono and resampled to 16kHz.
//! Every [`RECOGNIZE_INTERVAL`] the whole utterance so far is sent for
//! recognition and the result goes out as a partial transcript, so each
//! partial supersedes the previous one.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample};
use log::{debug, error, info, warn};
use murmur_session::{
    ActiveCapture, CaptureError, ConfigKey, ConfigStore, SpeechCapture, SpeechConfig,
    SpeechCredential,
};
use rubato::{FftFixedInOut, Resampler};
use tokio::sync::mpsc::UnboundedSender;

use super::recognizer::{ShortAudioRecognizer, SAMPLE_RATE};
use crate::config::Config;

pub const RECOGNIZE_INTERVAL: Duration = Duration::from_millis(1500);

/// The short-audio endpoint accepts at most 60 seconds per request
const MAX_UTTERANCE_SAMPLES: usize = 60 * SAMPLE_RATE as usize;

type AudioBuffer = Arc<Mutex<Vec<f32>>>;

fn lock(buffer: &AudioBuffer) -> MutexGuard<'_, Vec<f32>> {
    buffer.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Down-mixes interleaved frames to mono and resamples to 16kHz
pub struct MonoResampler {
    resampler: FftFixedInOut<f32>,
    channels: usize,
    pending: Vec<f32>,
}

impl MonoResampler {
    pub fn new(
        input_rate: usize,
        channels: usize,
    ) -> Result<Self, rubato::ResamplerConstructionError> {
        let resampler = FftFixedInOut::<f32>::new(input_rate, SAMPLE_RATE as usize, 1024, 1)?;
        Ok(Self {
            resampler,
            channels: channels.max(1),
            pending: Vec::new(),
        })
    }

    /// Feed interleaved samples; returns whatever complete chunks produced
    pub fn process_interleaved(&mut self, input: &[f32]) -> Vec<f32> {
        for frame in input.chunks(self.channels) {
            self.pending.push(frame.iter().sum::<f32>() / frame.len() as f32);
        }

        let mut output = Vec::new();
        loop {
            let needed = self.resampler.input_frames_next();
            if self.pending.len() < needed {
                break;
            }
            let chunk = vec![self.pending.drain(..needed).collect::<Vec<f32>>()];
            match self.resampler.process(&chunk, None) {
                Ok(mut resampled) => output.append(&mut resampled[0]),
                Err(e) => {
                    error!("Resampling failed: {}", e);
                    break;
                }
            }
        }
        output
    }
}

/// [`SpeechCapture`] over the default microphone and Azure short-audio REST
pub struct MicrophoneCapture {
    config: Config,
}

impl MicrophoneCapture {
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

impl SpeechCapture for MicrophoneCapture {
    fn start(
        &self,
        credential: SpeechCredential,
        partials: UnboundedSender<String>,
    ) -> Result<Box<dyn ActiveCapture>, CaptureError> {
        let language = self
            .config
            .get(&ConfigKey::SPEECH)
            .unwrap_or_else(SpeechConfig::default)
            .language;

        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<(), CaptureError>>(1);

        // cpal::Stream is not Send, so the stream lives on its own thread
        let thread = std::thread::Builder::new()
            .name("speech-capture".to_string())
            .spawn(move || run_capture(credential, language, partials, stop_rx, ready_tx))
            .map_err(|e| CaptureError::Unavailable(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Box::new(RunningCapture {
                stop_tx,
                thread: Some(thread),
            })),
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = thread.join();
                Err(CaptureError::Unavailable(
                    "capture thread exited during startup".to_string(),
                ))
            }
        }
    }
}

struct RunningCapture {
    stop_tx: mpsc::Sender<()>,
    thread: Option<JoinHandle<()>>,
}

impl ActiveCapture for RunningCapture {
    fn stop(mut self: Box<Self>) {
        let _ = self.stop_tx.send(());
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Speech capture thread panicked");
            }
        }
    }
}

impl Drop for RunningCapture {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(());
    }
}

fn run_capture(
    credential: SpeechCredential,
    language: String,
    partials: UnboundedSender<String>,
    stop_rx: mpsc::Receiver<()>,
    ready_tx: mpsc::SyncSender<Result<(), CaptureError>>,
) {
    let audio: AudioBuffer = Arc::new(Mutex::new(Vec::new()));
    let stream = match open_microphone(audio.clone()) {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };
    let _ = ready_tx.send(Ok(()));
    info!(
        "Speech capture started (region '{}', language '{}')",
        credential.region, language
    );

    let recognizer = ShortAudioRecognizer::new(&credential.region, &language, credential.token);
    let mut recognized_len = 0;

    loop {
        match stop_rx.recv_timeout(RECOGNIZE_INTERVAL) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
        if partials.is_closed() {
            debug!("Partial transcript receiver closed");
            break;
        }

        let samples = lock(&audio).clone();
        if samples.len() == recognized_len {
            continue;
        }
        recognized_len = samples.len();

        match recognizer.recognize(&samples) {
            Ok(Some(text)) => {
                debug!("Partial transcript ({} chars)", text.len());
                if partials.send(text).is_err() {
                    break;
                }
            }
            Ok(None) => {}
            Err(e) if e.is_unauthorized() => {
                error!("Speech token rejected, ending capture: {}", e);
                break;
            }
            Err(e) => warn!("Recognition failed: {}", e),
        }
    }

    if let Err(e) = stream.pause() {
        warn!("Failed to pause input stream: {}", e);
    }
    drop(stream);
    info!("Speech capture stopped");
}

fn open_microphone(audio: AudioBuffer) -> Result<cpal::Stream, CaptureError> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| CaptureError::Unavailable("no microphone detected".to_string()))?;
    let config = device
        .default_input_config()
        .map_err(|e| CaptureError::Unavailable(e.to_string()))?;

    let resampler = MonoResampler::new(config.sample_rate().0 as usize, config.channels() as usize)
        .map_err(|e| CaptureError::Unavailable(format!("resampler: {}", e)))?;
    let stream_config = config.config();

    let stream = match config.sample_format() {
        cpal::SampleFormat::I8 => build_input_stream::<i8>(&device, &stream_config, resampler, audio),
        cpal::SampleFormat::I16 => {
            build_input_stream::<i16>(&device, &stream_config, resampler, audio)
        }
        cpal::SampleFormat::I32 => {
            build_input_stream::<i32>(&device, &stream_config, resampler, audio)
        }
        cpal::SampleFormat::F32 => {
            build_input_stream::<f32>(&device, &stream_config, resampler, audio)
        }
        other => {
            return Err(CaptureError::Unavailable(format!(
                "unsupported sample format {:?}",
                other
            )))
        }
    }
    .map_err(|e| CaptureError::Unavailable(e.to_string()))?;

    stream
        .play()
        .map_err(|e| CaptureError::Unavailable(e.to_string()))?;
    Ok(stream)
}

fn build_input_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut resampler: MonoResampler,
    audio: AudioBuffer,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: Sample + cpal::SizedSample,
    f32: FromSample<T>,
{
    let mut truncated = false;
    device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            let samples: Vec<f32> = data.iter().map(|&s| s.to_sample::<f32>()).collect();
            let mono = resampler.process_interleaved(&samples);
            if mono.is_empty() {
                return;
            }

            let mut buffer = lock(&audio);
            let room = MAX_UTTERANCE_SAMPLES.saturating_sub(buffer.len());
            if room < mono.len() && !truncated {
                warn!("Utterance reached 60 seconds, ignoring further audio");
                truncated = true;
            }
            buffer.extend_from_slice(&mono[..mono.len().min(room)]);
        },
        |err| error!("Stream error: {}", err),
        None,
    )
}
