//! Google Cloud Text-to-Speech engines
//!
//! One-shot JSON REST synthesis:
//!
//! ```text
//! POST {endpoint}
//! X-Goog-Api-Key: <key>
//! {"input":{"text":..},"voice":{"name":..,"languageCode":..},
//!  "audioConfig":{"audioEncoding":..,"speakingRate":..,"pitch":..,"volumeGainDb":..}}
//! -> {"audioContent":"<base64>"}
//! ```
//!
//! Two engines share this wire shape: the standard Neural2/WaveNet voices
//! and the Chirp HD voices, which reject a `pitch` field.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::config::CloudTtsConfig;
use crate::error::{ConfigError, SynthesisError};
use crate::ports::SpeechEngine;
use crate::speed::SpeedRange;
use crate::types::{
    AudioArtifact, AudioFormat, CostTier, Credentials, EngineDescriptor, EngineInfo,
    GOOGLE_CLOUD_API_KEY, QualityTier,
};

/// Longest input accepted by `text:synthesize`, in UTF-8 bytes
pub const MAX_TEXT_LENGTH: usize = 5000;

/// Static facts distinguishing the two Cloud TTS engines
#[derive(Debug, Clone, Copy)]
pub struct CloudVoiceProfile {
    /// Engine id
    pub id: &'static str,
    /// Display name
    pub name: &'static str,
    /// Short description
    pub description: &'static str,
    /// Voice used when the request names none
    pub default_voice: &'static str,
    /// Voices offered by [`SpeechEngine::list_voices`]
    pub voices: &'static [&'static str],
    /// Whether `audioConfig.pitch` is accepted
    pub supports_pitch: bool,
    /// `speakingRate` bounds
    pub speed_range: SpeedRange,
}

/// Neural2 and WaveNet voices
pub const STANDARD_VOICES: CloudVoiceProfile = CloudVoiceProfile {
    id: "google_cloud_tts",
    name: "Google Cloud TTS",
    description: "Google Cloud Text-to-Speech Neural2/WaveNet voices (paid)",
    default_voice: "ja-JP-Neural2-B",
    voices: &[
        "ja-JP-Neural2-B",
        "ja-JP-Neural2-C",
        "ja-JP-Neural2-D",
        "ja-JP-Wavenet-A",
        "ja-JP-Wavenet-B",
        "ja-JP-Wavenet-C",
        "ja-JP-Wavenet-D",
        "en-US-Neural2-D",
        "en-US-Neural2-F",
    ],
    supports_pitch: true,
    speed_range: SpeedRange::multiplier(0.25, 4.0),
};

/// Chirp 3 HD voices
pub const CHIRP_VOICES: CloudVoiceProfile = CloudVoiceProfile {
    id: "google_cloud_chirp",
    name: "Google Cloud TTS (Chirp 3 HD)",
    description: "Google Cloud Text-to-Speech Chirp 3 HD voices (paid)",
    default_voice: "ja-JP-Chirp3-HD-Aoede",
    voices: &[
        "ja-JP-Chirp3-HD-Aoede",
        "ja-JP-Chirp3-HD-Kore",
        "ja-JP-Chirp3-HD-Leda",
        "ja-JP-Chirp3-HD-Puck",
        "ja-JP-Chirp3-HD-Charon",
        "en-US-Chirp3-HD-Aoede",
        "en-US-Chirp3-HD-Puck",
    ],
    supports_pitch: false,
    speed_range: SpeedRange::multiplier(0.25, 2.0),
};

/// Infer the language code from a `xx-YY-...` voice name prefix
#[must_use]
pub fn language_code_for<'a>(voice: &'a str, default: &'a str) -> &'a str {
    let mut parts = voice.splitn(3, '-');
    let (Some(lang), Some(region), Some(rest)) = (parts.next(), parts.next(), parts.next()) else {
        return default;
    };

    let lang_ok = (2..=3).contains(&lang.len()) && lang.chars().all(|c| c.is_ascii_lowercase());
    let region_ok = region.len() == 2
        && region
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit());

    if lang_ok && region_ok && !rest.is_empty() {
        &voice[..lang.len() + 1 + region.len()]
    } else {
        default
    }
}

/// Cloud TTS request body
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeBody<'a> {
    input: TextInput<'a>,
    voice: VoiceSelection<'a>,
    audio_config: AudioConfig,
}

#[derive(Debug, Serialize)]
struct TextInput<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceSelection<'a> {
    name: &'a str,
    language_code: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AudioConfig {
    audio_encoding: &'static str,
    speaking_rate: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pitch: Option<f32>,
    volume_gain_db: f32,
}

/// Cloud TTS response
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeResponse {
    #[serde(default)]
    audio_content: Option<String>,
}

const fn encoding_name(format: AudioFormat) -> &'static str {
    match format {
        AudioFormat::Mp3 => "MP3",
        AudioFormat::Wav => "LINEAR16",
    }
}

/// Parameters for one `text:synthesize` call
#[derive(Debug, Clone, Copy)]
pub(crate) struct CloudSynthesis<'a> {
    pub text: &'a str,
    pub voice: &'a str,
    pub language_code: &'a str,
    pub speaking_rate: f32,
    pub pitch: Option<f32>,
    pub volume_gain_db: f32,
    pub format: AudioFormat,
}

/// `text:synthesize` client shared by the Cloud TTS engines and the
/// generative engine's second tier
#[derive(Debug, Clone)]
pub(crate) struct CloudSynthesizer {
    client: Client,
    endpoint: String,
    timeout: Duration,
}

impl CloudSynthesizer {
    pub(crate) fn new(client: Client, endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            timeout,
        }
    }

    /// Run one request and return the decoded audio bytes
    pub(crate) async fn synthesize(
        &self,
        api_key: &SecretString,
        params: CloudSynthesis<'_>,
    ) -> Result<Vec<u8>, SynthesisError> {
        let body = SynthesizeBody {
            input: TextInput { text: params.text },
            voice: VoiceSelection {
                name: params.voice,
                language_code: params.language_code,
            },
            audio_config: AudioConfig {
                audio_encoding: encoding_name(params.format),
                speaking_rate: params.speaking_rate,
                pitch: params.pitch,
                volume_gain_db: params.volume_gain_db,
            },
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("X-Goog-Api-Key", api_key.expose_secret())
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

        let payload: SynthesizeResponse = response
            .json()
            .await
            .map_err(|e| SynthesisError::MalformedResponse(format!("Failed to parse response: {e}")))?;

        let encoded = payload.audio_content.ok_or_else(|| {
            SynthesisError::MalformedResponse("Response has no audioContent".to_string())
        })?;

        let audio = STANDARD
            .decode(encoded.as_bytes())
            .map_err(|e| SynthesisError::MalformedResponse(format!("Invalid base64 audio: {e}")))?;

        if audio.is_empty() {
            return Err(SynthesisError::EmptyResult);
        }

        Ok(audio)
    }
}

/// Google Cloud Text-to-Speech engine
#[derive(Debug)]
pub struct GoogleCloudTtsEngine {
    profile: CloudVoiceProfile,
    descriptor: EngineDescriptor,
    synthesizer: CloudSynthesizer,
    config: CloudTtsConfig,
}

impl GoogleCloudTtsEngine {
    /// Create an engine for one voice profile
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::HttpClient` if the HTTP client cannot be built.
    pub fn new(profile: CloudVoiceProfile, config: CloudTtsConfig) -> Result<Self, ConfigError> {
        let client = Client::builder()
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        let synthesizer = CloudSynthesizer::new(
            client,
            config.endpoint.clone(),
            Duration::from_millis(config.timeout_ms),
        );

        let descriptor = EngineDescriptor::new(profile.id, MAX_TEXT_LENGTH)
            .with_byte_limit()
            .with_credential(GOOGLE_CLOUD_API_KEY)
            .with_tiers(CostTier::Paid, QualityTier::High);

        Ok(Self {
            profile,
            descriptor,
            synthesizer,
            config,
        })
    }
}

#[async_trait]
impl SpeechEngine for GoogleCloudTtsEngine {
    fn descriptor(&self) -> &EngineDescriptor {
        &self.descriptor
    }

    async fn list_voices(&self) -> Vec<String> {
        self.profile.voices.iter().map(ToString::to_string).collect()
    }

    fn describe(&self) -> EngineInfo {
        EngineInfo {
            name: self.profile.name.to_string(),
            cost_tier: self.descriptor.cost_tier,
            quality_tier: self.descriptor.quality_tier,
            description: self.profile.description.to_string(),
        }
    }

    #[instrument(skip(self, text, credentials), fields(engine = self.profile.id, text_len = text.len()))]
    async fn synthesize(
        &self,
        text: &str,
        voice: &str,
        speed: f32,
        credentials: &Credentials,
    ) -> Result<Vec<AudioArtifact>, SynthesisError> {
        let api_key =
            credentials
                .get(GOOGLE_CLOUD_API_KEY)
                .ok_or_else(|| SynthesisError::MissingCredential {
                    engine: self.profile.id.to_string(),
                    key: GOOGLE_CLOUD_API_KEY.to_string(),
                })?;

        let voice = if voice.trim().is_empty() {
            self.profile.default_voice
        } else {
            voice.trim()
        };
        let language_code = language_code_for(voice, &self.config.default_language);

        let audio = self
            .synthesizer
            .synthesize(
                api_key,
                CloudSynthesis {
                    text,
                    voice,
                    language_code,
                    speaking_rate: self.profile.speed_range.to_native(speed),
                    pitch: self.profile.supports_pitch.then_some(self.config.pitch),
                    volume_gain_db: self.config.volume_gain_db,
                    format: self.config.audio_encoding,
                },
            )
            .await?;

        debug!(audio_size = audio.len(), voice, language_code, "Cloud synthesis complete");

        let artifact =
            AudioArtifact::write(&audio, self.config.audio_encoding, self.profile.id).await?;
        Ok(vec![artifact])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn create_test_engine(mock_server: &MockServer, profile: CloudVoiceProfile) -> GoogleCloudTtsEngine {
        let config = CloudTtsConfig {
            endpoint: format!("{}/v1/text:synthesize", mock_server.uri()),
            timeout_ms: 2000,
            pitch: 2.0,
            ..Default::default()
        };
        GoogleCloudTtsEngine::new(profile, config).unwrap()
    }

    fn credentials() -> Credentials {
        Credentials::new().with(GOOGLE_CLOUD_API_KEY, "test-api-key")
    }

    fn audio_response(bytes: &[u8]) -> serde_json::Value {
        serde_json::json!({ "audioContent": STANDARD.encode(bytes) })
    }

    mod language_tests {
        use super::*;

        #[test]
        fn infers_language_from_prefix() {
            assert_eq!(language_code_for("ja-JP-Neural2-B", "en-US"), "ja-JP");
            assert_eq!(language_code_for("en-GB-Wavenet-A", "ja-JP"), "en-GB");
            assert_eq!(language_code_for("cmn-CN-Wavenet-A", "ja-JP"), "cmn-CN");
        }

        #[test]
        fn falls_back_without_prefix() {
            assert_eq!(language_code_for("Kore", "ja-JP"), "ja-JP");
            assert_eq!(language_code_for("ja-JP", "en-US"), "en-US");
            assert_eq!(language_code_for("JA-jp-Neural2-B", "en-US"), "en-US");
        }
    }

    mod synthesis_tests {
        use super::*;

        #[tokio::test]
        async fn synthesize_success() {
            let mock_server = MockServer::start().await;

            Mock::given(method("POST"))
                .and(path("/v1/text:synthesize"))
                .and(header("x-goog-api-key", "test-api-key"))
                .and(body_partial_json(serde_json::json!({
                    "input": {"text": "こんにちは"},
                    "voice": {"name": "ja-JP-Neural2-C", "languageCode": "ja-JP"},
                    "audioConfig": {"audioEncoding": "MP3", "speakingRate": 1.25, "pitch": 2.0}
                })))
                .respond_with(ResponseTemplate::new(200).set_body_json(audio_response(b"ID3audio")))
                .expect(1)
                .mount(&mock_server)
                .await;

            let engine = create_test_engine(&mock_server, STANDARD_VOICES);
            let clips = engine
                .synthesize("こんにちは", "ja-JP-Neural2-C", 1.25, &credentials())
                .await
                .unwrap();

            assert_eq!(clips.len(), 1);
            assert_eq!(clips[0].format(), AudioFormat::Mp3);
            assert_eq!(clips[0].engine_id(), "google_cloud_tts");
            assert_eq!(std::fs::read(clips[0].path()).unwrap(), b"ID3audio");
        }

        #[tokio::test]
        async fn chirp_voices_omit_pitch() {
            let mock_server = MockServer::start().await;

            Mock::given(method("POST"))
                .and(path("/v1/text:synthesize"))
                .respond_with(ResponseTemplate::new(200).set_body_json(audio_response(b"ID3")))
                .expect(1)
                .mount(&mock_server)
                .await;

            let engine = create_test_engine(&mock_server, CHIRP_VOICES);
            engine
                .synthesize("hello", "", 1.0, &credentials())
                .await
                .unwrap();

            let requests = mock_server.received_requests().await.unwrap();
            let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
            assert!(body["audioConfig"].get("pitch").is_none());
            assert_eq!(body["voice"]["name"], "ja-JP-Chirp3-HD-Aoede");
        }

        #[tokio::test]
        async fn speaking_rate_is_clamped() {
            let mock_server = MockServer::start().await;

            Mock::given(method("POST"))
                .and(path("/v1/text:synthesize"))
                .and(body_partial_json(serde_json::json!({
                    "audioConfig": {"speakingRate": 4.0}
                })))
                .respond_with(ResponseTemplate::new(200).set_body_json(audio_response(b"ID3")))
                .expect(1)
                .mount(&mock_server)
                .await;

            let engine = create_test_engine(&mock_server, STANDARD_VOICES);
            let result = engine
                .synthesize("hello", "en-US-Neural2-F", 9.0, &credentials())
                .await;

            assert!(result.is_ok());
        }

        #[tokio::test]
        async fn missing_credential_makes_no_request() {
            let mock_server = MockServer::start().await;

            Mock::given(method("POST"))
                .respond_with(ResponseTemplate::new(200).set_body_json(audio_response(b"ID3")))
                .expect(0)
                .mount(&mock_server)
                .await;

            let engine = create_test_engine(&mock_server, STANDARD_VOICES);
            let result = engine
                .synthesize("hello", "ja-JP-Neural2-B", 1.0, &Credentials::new())
                .await;

            assert!(matches!(result, Err(SynthesisError::MissingCredential { .. })));
        }

        #[tokio::test]
        async fn unauthorized_is_auth_rejected() {
            let mock_server = MockServer::start().await;

            Mock::given(method("POST"))
                .and(path("/v1/text:synthesize"))
                .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                    "error": {"code": 401, "message": "API key not valid", "status": "UNAUTHENTICATED"}
                })))
                .expect(1)
                .mount(&mock_server)
                .await;

            let engine = create_test_engine(&mock_server, STANDARD_VOICES);
            let result = engine
                .synthesize("hello", "ja-JP-Neural2-B", 1.0, &credentials())
                .await;

            assert!(matches!(result, Err(SynthesisError::AuthRejected { status: 401 })));
        }

        #[tokio::test]
        async fn missing_audio_content_is_malformed() {
            let mock_server = MockServer::start().await;

            Mock::given(method("POST"))
                .and(path("/v1/text:synthesize"))
                .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
                .mount(&mock_server)
                .await;

            let engine = create_test_engine(&mock_server, STANDARD_VOICES);
            let result = engine
                .synthesize("hello", "ja-JP-Neural2-B", 1.0, &credentials())
                .await;

            assert!(matches!(result, Err(SynthesisError::MalformedResponse(_))));
        }

        #[tokio::test]
        async fn non_json_body_is_malformed() {
            let mock_server = MockServer::start().await;

            Mock::given(method("POST"))
                .and(path("/v1/text:synthesize"))
                .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
                .mount(&mock_server)
                .await;

            let engine = create_test_engine(&mock_server, STANDARD_VOICES);
            let result = engine
                .synthesize("hello", "ja-JP-Neural2-B", 1.0, &credentials())
                .await;

            assert!(matches!(result, Err(SynthesisError::MalformedResponse(_))));
        }

        #[tokio::test]
        async fn empty_audio_content_is_empty_result() {
            let mock_server = MockServer::start().await;

            Mock::given(method("POST"))
                .and(path("/v1/text:synthesize"))
                .respond_with(
                    ResponseTemplate::new(200).set_body_json(serde_json::json!({"audioContent": ""})),
                )
                .mount(&mock_server)
                .await;

            let engine = create_test_engine(&mock_server, STANDARD_VOICES);
            let result = engine
                .synthesize("hello", "ja-JP-Neural2-B", 1.0, &credentials())
                .await;

            assert!(matches!(result, Err(SynthesisError::EmptyResult)));
        }

        #[tokio::test]
        async fn wav_encoding_requests_linear16() {
            let mock_server = MockServer::start().await;

            Mock::given(method("POST"))
                .and(body_partial_json(serde_json::json!({
                    "audioConfig": {"audioEncoding": "LINEAR16"}
                })))
                .respond_with(ResponseTemplate::new(200).set_body_json(audio_response(b"RIFF")))
                .expect(1)
                .mount(&mock_server)
                .await;

            let config = CloudTtsConfig {
                endpoint: mock_server.uri(),
                audio_encoding: AudioFormat::Wav,
                ..Default::default()
            };
            let engine = GoogleCloudTtsEngine::new(STANDARD_VOICES, config).unwrap();
            let clips = engine
                .synthesize("hello", "en-US-Neural2-F", 1.0, &credentials())
                .await
                .unwrap();

            assert_eq!(clips[0].format(), AudioFormat::Wav);
        }
    }

    #[test]
    fn descriptor_requires_credential_not_probe() {
        let engine = GoogleCloudTtsEngine::new(CHIRP_VOICES, CloudTtsConfig::default()).unwrap();
        let descriptor = engine.descriptor();

        assert_eq!(descriptor.id, "google_cloud_chirp");
        assert_eq!(descriptor.credential.as_deref(), Some(GOOGLE_CLOUD_API_KEY));
        assert!(!descriptor.requires_availability_probe);
        assert_eq!(descriptor.cost_tier, CostTier::Paid);
        assert_eq!(descriptor.max_text_length, 5000);
        assert_eq!(descriptor.length_unit, crate::text::LengthUnit::Bytes);
    }

    #[tokio::test]
    async fn lists_profile_voices() {
        let engine = GoogleCloudTtsEngine::new(STANDARD_VOICES, CloudTtsConfig::default()).unwrap();
        let voices = engine.list_voices().await;

        assert_eq!(voices.first().map(String::as_str), Some("ja-JP-Neural2-B"));
        assert_eq!(voices.len(), STANDARD_VOICES.voices.len());
    }
}
