use std::io::Cursor;

use hound::{WavSpec, WavWriter};
use log::debug;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

/// Sample rate sent to the recognizer (16kHz mono)
pub const SAMPLE_RATE: u32 = 16000;

#[derive(Debug, thiserror::Error)]
pub enum RecognizeError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Recognizer returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Unexpected recognizer response: {0}")]
    Response(#[from] serde_json::Error),
    #[error("Audio encoding error: {0}")]
    Encoding(#[from] hound::Error),
}

impl RecognizeError {
    /// Expired or rejected token; retrying with the same token is pointless
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, RecognizeError::Status { status: 401 | 403, .. })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RecognitionResponse {
    recognition_status: String,
    #[serde(default)]
    display_text: Option<String>,
}

/// Text of a successful recognition, `None` for silence or no match
pub fn parse_recognition(body: &str) -> Result<Option<String>, serde_json::Error> {
    let response: RecognitionResponse = serde_json::from_str(body)?;
    if response.recognition_status != "Success" {
        debug!("Recognition status: {}", response.recognition_status);
        return Ok(None);
    }
    Ok(response
        .display_text
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty()))
}

/// Encode 16kHz mono f32 samples as a 16-bit PCM WAV file
pub fn encode_wav(samples: &[f32]) -> Result<Vec<u8>, hound::Error> {
    let spec = WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, spec)?;
        for &sample in samples {
            let clamped = sample.clamp(-1.0, 1.0);
            writer.write_sample((clamped * i16::MAX as f32) as i16)?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

/// Azure short-audio REST recognizer bound to one token
pub struct ShortAudioRecognizer {
    client: reqwest::blocking::Client,
    endpoint: String,
    token: SecretString,
}

impl ShortAudioRecognizer {
    pub fn new(region: &str, language: &str, token: SecretString) -> Self {
        Self {
            client: reqwest::blocking::Client::new(),
            endpoint: recognition_url(region, language),
            token,
        }
    }

    /// Recognize a complete utterance
    pub fn recognize(&self, samples: &[f32]) -> Result<Option<String>, RecognizeError> {
        let wav = encode_wav(samples)?;
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.token.expose_secret())
            .header(
                reqwest::header::CONTENT_TYPE,
                "audio/wav; codecs=audio/pcm; samplerate=16000",
            )
            .header(reqwest::header::ACCEPT, "application/json")
            .body(wav)
            .send()?;

        let status = response.status();
        let body = response.text()?;
        if !status.is_success() {
            return Err(RecognizeError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(parse_recognition(&body)?)
    }
}

pub fn recognition_url(region: &str, language: &str) -> String {
    format!(
        "https://{}.stt.speech.microsoft.com/speech/recognition/conversation/cognitiveservices/v1?language={}&format=simple",
        region, language
    )
}
