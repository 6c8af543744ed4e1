//! Google AI generative speech engine
//!
//! Tries the Gemini speech model first and falls back to a Cloud TTS Chirp
//! voice with the same speaker name before giving up:
//!
//! ```text
//! synthesize
//!     │
//!     ▼
//! ┌────────────┐  fail  ┌──────────────┐  fail
//! │ generative │──────▶│ cloud_chirp  │──────▶ TiersExhausted
//! └────────────┘        └──────────────┘
//!     │ ok                   │ ok
//!     ▼                      ▼
//!  WAV clip               MP3 clip
//! ```
//!
//! The generative tier returns raw 16-bit mono PCM, which is wrapped into a
//! WAV container before it is handed out.

use std::io::Cursor;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::config::GenerativeTtsConfig;
use crate::error::{ConfigError, FailedAttempt, SynthesisError};
use crate::ports::SpeechEngine;
use crate::providers::google_cloud::{
    CloudSynthesis, CloudSynthesizer, MAX_TEXT_LENGTH, language_code_for,
};
use crate::speed::SpeedRange;
use crate::types::{
    AudioArtifact, AudioFormat, CostTier, Credentials, EngineDescriptor, EngineInfo,
    GOOGLE_AI_API_KEY, QualityTier,
};

/// Engine id
pub const ENGINE_ID: &str = "google_ai_tts";

/// Prebuilt voice used when the request names none
pub const DEFAULT_VOICE: &str = "Kore";

/// Prebuilt voices shared by the generative model and Chirp 3 HD
pub const VOICES: &[&str] = &[
    "Kore", "Aoede", "Leda", "Zephyr", "Puck", "Charon", "Fenrir", "Orus",
];

/// PCM sample rate when the response does not state one
const DEFAULT_SAMPLE_RATE: u32 = 24_000;

/// Pace directives are only added outside this distance from 1.0
const PACE_TOLERANCE: f32 = 0.05;

const GENERATIVE_SPEED: SpeedRange = SpeedRange::multiplier(0.5, 2.0);
const CHIRP_SPEED: SpeedRange = SpeedRange::multiplier(0.25, 2.0);

/// One endpoint in the private fallback chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tier {
    Generative,
    CloudChirp,
}

impl Tier {
    const CHAIN: [Self; 2] = [Self::Generative, Self::CloudChirp];

    const fn name(self) -> &'static str {
        match self {
            Self::Generative => "generative",
            Self::CloudChirp => "cloud_chirp",
        }
    }
}

/// Prefix the prompt with a pace instruction when speed differs from 1.0
#[must_use]
pub fn pace_directive(speed: f32) -> Option<String> {
    let speed = GENERATIVE_SPEED.clamp(speed);
    if (speed - 1.0).abs() < PACE_TOLERANCE {
        return None;
    }

    let pace = if speed > 1.0 { "quickly" } else { "slowly" };
    Some(format!(
        "Read the following text {pace}, at about {speed:.1}x normal speaking pace:"
    ))
}

/// Map a prebuilt voice name to the matching Chirp 3 HD voice
///
/// Names that already carry a `xx-YY-` prefix are passed through.
#[must_use]
pub fn chirp_voice_name(voice: &str, language: &str) -> String {
    if language_code_for(voice, "").is_empty() {
        format!("{language}-Chirp3-HD-{voice}")
    } else {
        voice.to_string()
    }
}

/// Read the sample rate from a `audio/L16;codec=pcm;rate=24000` MIME type
fn sample_rate_from_mime(mime_type: Option<&str>) -> u32 {
    mime_type
        .into_iter()
        .flat_map(|mime| mime.split(';'))
        .filter_map(|param| param.trim().strip_prefix("rate="))
        .filter_map(|rate| rate.parse::<u32>().ok())
        .find(|&rate| rate > 0)
        .unwrap_or(DEFAULT_SAMPLE_RATE)
}

/// Wrap little-endian 16-bit mono PCM into a WAV container
fn pcm_to_wav(pcm: &[u8], sample_rate: u32) -> Result<Vec<u8>, hound::Error> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::with_capacity(pcm.len() + 44));
    let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
    for sample in pcm.chunks_exact(2) {
        writer.write_sample(i16::from_le_bytes([sample[0], sample[1]]))?;
    }
    writer.finalize()?;

    Ok(cursor.into_inner())
}

/// `generateContent` request body
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: [RequestContent<'a>; 1],
    generation_config: GenerationConfig<'a>,
}

#[derive(Debug, Serialize)]
struct RequestContent<'a> {
    parts: [RequestPart<'a>; 1],
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig<'a> {
    response_modalities: [&'static str; 1],
    speech_config: SpeechConfig<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SpeechConfig<'a> {
    voice_config: VoiceConfig<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceConfig<'a> {
    prebuilt_voice_config: PrebuiltVoiceConfig<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PrebuiltVoiceConfig<'a> {
    voice_name: &'a str,
}

/// `generateContent` response, audio parts only
#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<ResponseContent>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponsePart {
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: Option<String>,
    data: String,
}

/// Google AI speech engine with a Cloud TTS fallback tier
#[derive(Debug)]
pub struct GeminiTtsEngine {
    client: Client,
    config: GenerativeTtsConfig,
    descriptor: EngineDescriptor,
    cloud: CloudSynthesizer,
    timeout: Duration,
}

impl GeminiTtsEngine {
    /// Create a new engine
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::HttpClient` if the HTTP client cannot be built.
    pub fn new(config: GenerativeTtsConfig) -> Result<Self, ConfigError> {
        let client = Client::builder()
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        let timeout = Duration::from_millis(config.timeout_ms);
        let cloud = CloudSynthesizer::new(client.clone(), config.cloud_endpoint.clone(), timeout);

        let descriptor = EngineDescriptor::new(ENGINE_ID, MAX_TEXT_LENGTH)
            .with_byte_limit()
            .with_credential(GOOGLE_AI_API_KEY)
            .with_tiers(CostTier::Metered, QualityTier::High);

        Ok(Self {
            client,
            config,
            descriptor,
            cloud,
            timeout,
        })
    }

    async fn run_tier(
        &self,
        tier: Tier,
        text: &str,
        voice: &str,
        speed: f32,
        api_key: &SecretString,
    ) -> Result<AudioArtifact, SynthesisError> {
        match tier {
            Tier::Generative => {
                let wav = self.generate(text, voice, speed, api_key).await?;
                Ok(AudioArtifact::write(&wav, AudioFormat::Wav, ENGINE_ID).await?)
            },
            Tier::CloudChirp => {
                let voice = chirp_voice_name(voice, &self.config.language);
                let language_code = language_code_for(&voice, &self.config.language);
                let audio = self
                    .cloud
                    .synthesize(
                        api_key,
                        CloudSynthesis {
                            text,
                            voice: &voice,
                            language_code,
                            speaking_rate: CHIRP_SPEED.to_native(speed),
                            pitch: None,
                            volume_gain_db: 0.0,
                            format: AudioFormat::Mp3,
                        },
                    )
                    .await?;
                Ok(AudioArtifact::write(&audio, AudioFormat::Mp3, ENGINE_ID).await?)
            },
        }
    }

    /// Generative tier: returns WAV bytes
    async fn generate(
        &self,
        text: &str,
        voice: &str,
        speed: f32,
        api_key: &SecretString,
    ) -> Result<Vec<u8>, SynthesisError> {
        let prompt = match pace_directive(speed) {
            Some(directive) => format!("{directive}\n{text}"),
            None => text.to_string(),
        };

        let body = GenerateContentRequest {
            contents: [RequestContent {
                parts: [RequestPart { text: &prompt }],
            }],
            generation_config: GenerationConfig {
                response_modalities: ["AUDIO"],
                speech_config: SpeechConfig {
                    voice_config: VoiceConfig {
                        prebuilt_voice_config: PrebuiltVoiceConfig { voice_name: voice },
                    },
                },
            },
        };

        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        );

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", api_key.expose_secret())
            .json(&body)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| SynthesisError::http(&e, self.timeout))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SynthesisError::from_status(status, body));
        }

        let payload: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| SynthesisError::MalformedResponse(format!("Failed to parse response: {e}")))?;

        let inline = payload
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .and_then(|content| content.parts.into_iter().find_map(|part| part.inline_data))
            .ok_or_else(|| {
                SynthesisError::MalformedResponse("Response has no inline audio data".to_string())
            })?;

        let pcm = STANDARD
            .decode(inline.data.as_bytes())
            .map_err(|e| SynthesisError::MalformedResponse(format!("Invalid base64 audio: {e}")))?;

        if pcm.len() < 2 {
            return Err(SynthesisError::EmptyResult);
        }

        let sample_rate = sample_rate_from_mime(inline.mime_type.as_deref());
        debug!(pcm_size = pcm.len(), sample_rate, "Generative audio received");

        pcm_to_wav(&pcm, sample_rate)
            .map_err(|e| SynthesisError::MalformedResponse(format!("WAV encoding failed: {e}")))
    }
}

#[async_trait]
impl SpeechEngine for GeminiTtsEngine {
    fn descriptor(&self) -> &EngineDescriptor {
        &self.descriptor
    }

    async fn list_voices(&self) -> Vec<String> {
        VOICES.iter().map(ToString::to_string).collect()
    }

    fn describe(&self) -> EngineInfo {
        EngineInfo {
            name: "Google AI TTS".to_string(),
            cost_tier: self.descriptor.cost_tier,
            quality_tier: self.descriptor.quality_tier,
            description: format!(
                "Gemini speech generation ({}) with Chirp 3 HD fallback",
                self.config.model
            ),
        }
    }

    #[instrument(skip(self, text, credentials), fields(engine = ENGINE_ID, text_len = text.len()))]
    async fn synthesize(
        &self,
        text: &str,
        voice: &str,
        speed: f32,
        credentials: &Credentials,
    ) -> Result<Vec<AudioArtifact>, SynthesisError> {
        let api_key =
            credentials
                .get(GOOGLE_AI_API_KEY)
                .ok_or_else(|| SynthesisError::MissingCredential {
                    engine: ENGINE_ID.to_string(),
                    key: GOOGLE_AI_API_KEY.to_string(),
                })?;

        let voice = if voice.trim().is_empty() {
            DEFAULT_VOICE
        } else {
            voice.trim()
        };

        let mut failures: Vec<FailedAttempt> = Vec::new();

        for tier in Tier::CHAIN {
            if let Some(previous) = failures.last() {
                warn!(
                    tier = tier.name(),
                    previous_tier = %previous.source,
                    error = %previous.error,
                    "Falling back to next tier"
                );
            }

            match self.run_tier(tier, text, voice, speed, api_key).await {
                Ok(artifact) => {
                    if !failures.is_empty() {
                        info!(tier = tier.name(), failed_tiers = failures.len(), "Fallback tier succeeded");
                    }
                    return Ok(vec![artifact]);
                },
                Err(e) => {
                    debug!(tier = tier.name(), error = %e, "Tier failed");
                    failures.push(FailedAttempt::new(tier.name(), e));
                },
            }
        }

        warn!(tiers = failures.len(), "All tiers failed");
        Err(SynthesisError::TiersExhausted(failures))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const GENERATE_PATH: &str = "/v1beta/models/gemini-2.5-flash-preview-tts:generateContent";
    const CLOUD_PATH: &str = "/v1/text:synthesize";

    fn create_test_engine(mock_server: &MockServer) -> GeminiTtsEngine {
        let config = GenerativeTtsConfig {
            base_url: mock_server.uri(),
            cloud_endpoint: format!("{}{CLOUD_PATH}", mock_server.uri()),
            timeout_ms: 2000,
            ..Default::default()
        };
        GeminiTtsEngine::new(config).unwrap()
    }

    fn credentials() -> Credentials {
        Credentials::new().with(GOOGLE_AI_API_KEY, "test-ai-key")
    }

    fn pcm_response(samples: &[i16]) -> serde_json::Value {
        let pcm: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        serde_json::json!({
            "candidates": [{
                "content": {
                    "parts": [{
                        "inlineData": {
                            "mimeType": "audio/L16;codec=pcm;rate=24000",
                            "data": STANDARD.encode(pcm)
                        }
                    }]
                }
            }]
        })
    }

    mod helper_tests {
        use super::*;

        #[test]
        fn no_directive_at_normal_speed() {
            assert_eq!(pace_directive(1.0), None);
            assert_eq!(pace_directive(1.02), None);
        }

        #[test]
        fn directive_describes_pace() {
            let fast = pace_directive(1.5).unwrap();
            assert!(fast.contains("quickly"));
            assert!(fast.contains("1.5x"));

            let slow = pace_directive(0.1).unwrap();
            assert!(slow.contains("slowly"));
            assert!(slow.contains("0.5x"));
        }

        #[test]
        fn chirp_voice_mapping() {
            assert_eq!(chirp_voice_name("Kore", "ja-JP"), "ja-JP-Chirp3-HD-Kore");
            assert_eq!(
                chirp_voice_name("en-US-Chirp3-HD-Puck", "ja-JP"),
                "en-US-Chirp3-HD-Puck"
            );
        }

        #[test]
        fn sample_rate_parsing() {
            assert_eq!(sample_rate_from_mime(Some("audio/L16;codec=pcm;rate=16000")), 16000);
            assert_eq!(sample_rate_from_mime(Some("audio/L16")), DEFAULT_SAMPLE_RATE);
            assert_eq!(sample_rate_from_mime(None), DEFAULT_SAMPLE_RATE);
            assert_eq!(
                sample_rate_from_mime(Some("audio/L16;codec=pcm;rate=0")),
                DEFAULT_SAMPLE_RATE
            );
        }

        #[test]
        fn pcm_is_wrapped_as_wav() {
            let pcm: Vec<u8> = [0i16, 1000, -1000].iter().flat_map(|s| s.to_le_bytes()).collect();
            let wav = pcm_to_wav(&pcm, 24_000).unwrap();

            assert_eq!(&wav[..4], b"RIFF");
            let reader = hound::WavReader::new(Cursor::new(wav)).unwrap();
            assert_eq!(reader.spec().channels, 1);
            assert_eq!(reader.spec().sample_rate, 24_000);
            assert_eq!(reader.spec().bits_per_sample, 16);
            assert_eq!(reader.len(), 3);
        }
    }

    mod tier_tests {
        use super::*;

        #[tokio::test]
        async fn generative_tier_success() {
            let mock_server = MockServer::start().await;

            Mock::given(method("POST"))
                .and(path(GENERATE_PATH))
                .and(header("x-goog-api-key", "test-ai-key"))
                .and(body_partial_json(serde_json::json!({
                    "contents": [{"parts": [{"text": "こんにちは"}]}],
                    "generationConfig": {
                        "responseModalities": ["AUDIO"],
                        "speechConfig": {"voiceConfig": {"prebuiltVoiceConfig": {"voiceName": "Puck"}}}
                    }
                })))
                .respond_with(ResponseTemplate::new(200).set_body_json(pcm_response(&[1, 2, 3, 4])))
                .expect(1)
                .mount(&mock_server)
                .await;

            Mock::given(method("POST"))
                .and(path(CLOUD_PATH))
                .respond_with(ResponseTemplate::new(500))
                .expect(0)
                .mount(&mock_server)
                .await;

            let engine = create_test_engine(&mock_server);
            let clips = engine
                .synthesize("こんにちは", "Puck", 1.0, &credentials())
                .await
                .unwrap();

            assert_eq!(clips.len(), 1);
            assert_eq!(clips[0].format(), AudioFormat::Wav);
            assert_eq!(clips[0].engine_id(), ENGINE_ID);
            let reader = hound::WavReader::open(clips[0].path()).unwrap();
            assert_eq!(reader.len(), 4);
        }

        #[tokio::test]
        async fn speed_becomes_pace_directive() {
            let mock_server = MockServer::start().await;

            Mock::given(method("POST"))
                .and(path(GENERATE_PATH))
                .respond_with(ResponseTemplate::new(200).set_body_json(pcm_response(&[1, 2])))
                .expect(1)
                .mount(&mock_server)
                .await;

            let engine = create_test_engine(&mock_server);
            engine
                .synthesize("hello", "", 1.5, &credentials())
                .await
                .unwrap();

            let requests = mock_server.received_requests().await.unwrap();
            let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
            let prompt = body["contents"][0]["parts"][0]["text"].as_str().unwrap();
            assert!(prompt.contains("quickly"));
            assert!(prompt.ends_with("\nhello"));
            assert_eq!(
                body["generationConfig"]["speechConfig"]["voiceConfig"]["prebuiltVoiceConfig"]["voiceName"],
                DEFAULT_VOICE
            );
        }

        #[tokio::test]
        async fn falls_back_to_cloud_tier() {
            let mock_server = MockServer::start().await;

            Mock::given(method("POST"))
                .and(path(GENERATE_PATH))
                .respond_with(ResponseTemplate::new(500).set_body_string("internal"))
                .expect(1)
                .mount(&mock_server)
                .await;

            Mock::given(method("POST"))
                .and(path(CLOUD_PATH))
                .and(header("x-goog-api-key", "test-ai-key"))
                .and(body_partial_json(serde_json::json!({
                    "voice": {"name": "ja-JP-Chirp3-HD-Kore", "languageCode": "ja-JP"},
                    "audioConfig": {"audioEncoding": "MP3"}
                })))
                .respond_with(
                    ResponseTemplate::new(200)
                        .set_body_json(serde_json::json!({"audioContent": STANDARD.encode(b"ID3")})),
                )
                .expect(1)
                .mount(&mock_server)
                .await;

            let engine = create_test_engine(&mock_server);
            let clips = engine
                .synthesize("hello", "Kore", 1.0, &credentials())
                .await
                .unwrap();

            assert_eq!(clips.len(), 1);
            assert_eq!(clips[0].format(), AudioFormat::Mp3);
            assert_eq!(std::fs::read(clips[0].path()).unwrap(), b"ID3");
        }

        #[tokio::test]
        async fn malformed_generative_response_falls_back() {
            let mock_server = MockServer::start().await;

            Mock::given(method("POST"))
                .and(path(GENERATE_PATH))
                .respond_with(
                    ResponseTemplate::new(200).set_body_json(serde_json::json!({"candidates": []})),
                )
                .mount(&mock_server)
                .await;

            Mock::given(method("POST"))
                .and(path(CLOUD_PATH))
                .respond_with(
                    ResponseTemplate::new(200)
                        .set_body_json(serde_json::json!({"audioContent": STANDARD.encode(b"ID3")})),
                )
                .expect(1)
                .mount(&mock_server)
                .await;

            let engine = create_test_engine(&mock_server);
            let result = engine.synthesize("hello", "Kore", 1.0, &credentials()).await;

            assert!(result.is_ok());
        }

        #[tokio::test]
        async fn all_tiers_failing_reports_each_tier() {
            let mock_server = MockServer::start().await;

            Mock::given(method("POST"))
                .and(path(GENERATE_PATH))
                .respond_with(ResponseTemplate::new(403))
                .expect(1)
                .mount(&mock_server)
                .await;

            Mock::given(method("POST"))
                .and(path(CLOUD_PATH))
                .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
                .expect(1)
                .mount(&mock_server)
                .await;

            let engine = create_test_engine(&mock_server);
            let result = engine.synthesize("hello", "Kore", 1.0, &credentials()).await;

            let failures = match result {
                Err(SynthesisError::TiersExhausted(failures)) => failures,
                other => panic!("expected TiersExhausted, got {other:?}"),
            };
            assert_eq!(failures.len(), 2);
            assert_eq!(failures[0].source, "generative");
            assert!(matches!(failures[0].error, SynthesisError::AuthRejected { status: 403 }));
            assert_eq!(failures[1].source, "cloud_chirp");
            assert!(matches!(
                failures[1].error,
                SynthesisError::RequestFailed { status: 503, .. }
            ));
        }

        #[tokio::test]
        async fn missing_credential_skips_every_tier() {
            let mock_server = MockServer::start().await;

            Mock::given(method("POST"))
                .respond_with(ResponseTemplate::new(200))
                .expect(0)
                .mount(&mock_server)
                .await;

            let engine = create_test_engine(&mock_server);
            let result = engine
                .synthesize("hello", "Kore", 1.0, &Credentials::new())
                .await;

            assert!(matches!(
                result,
                Err(SynthesisError::MissingCredential { ref key, .. }) if key == GOOGLE_AI_API_KEY
            ));
        }
    }

    #[test]
    fn descriptor_is_metered_with_credential() {
        let engine = GeminiTtsEngine::new(GenerativeTtsConfig::default()).unwrap();
        let descriptor = engine.descriptor();

        assert_eq!(descriptor.id, ENGINE_ID);
        assert_eq!(descriptor.credential.as_deref(), Some(GOOGLE_AI_API_KEY));
        assert_eq!(descriptor.cost_tier, CostTier::Metered);
        assert!(!descriptor.requires_availability_probe);
        assert_eq!(descriptor.length_unit, crate::text::LengthUnit::Bytes);
    }
}
