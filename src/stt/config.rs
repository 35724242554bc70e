//! Stream session configuration.
//!
//! Carries the audio shape and recognition options for one session and
//! renders them as the service's WebSocket URL query string.

use url::form_urlencoded;

/// Production endpoint for realtime recognition.
pub const DEFAULT_BASE_URL: &str = "wss://api.deepgram.com/v1/listen";

pub const DEFAULT_SAMPLE_RATE: u32 = 48_000;
pub const DEFAULT_CHANNELS: u16 = 1;
pub const DEFAULT_MODEL: &str = "nova-2";
pub const DEFAULT_LANGUAGE: &str = "en";

/// Service-side default endpointing window in milliseconds. The parameter is
/// left out of the URL while the config still has this value.
pub const DEFAULT_ENDPOINTING_MS: u32 = 10;

/// Configuration for a [`StreamSession`](super::StreamSession).
#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub api_key: String,
    /// Rate of the mono int16 audio the session will be fed.
    pub sample_rate: u32,
    pub channels: u16,
    pub model: String,
    pub language: String,
    /// Emit partial hypotheses while speech is in progress.
    pub interim_results: bool,
    pub endpointing_ms: u32,
    pub punctuate: bool,
    pub smart_format: bool,
    pub diarize: bool,
    pub multichannel: bool,
    /// Override for tests and self-hosted deployments.
    pub base_url: String,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: DEFAULT_CHANNELS,
            model: DEFAULT_MODEL.to_string(),
            language: DEFAULT_LANGUAGE.to_string(),
            interim_results: true,
            endpointing_ms: DEFAULT_ENDPOINTING_MS,
            punctuate: false,
            smart_format: false,
            diarize: false,
            multichannel: false,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

impl StreamConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Default::default()
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Render the WebSocket URL for this configuration.
    ///
    /// Always carries encoding, rate, channel count, and model. Optional
    /// parameters appear only when they differ from the service defaults, so
    /// the URL stays minimal and cache-friendly.
    pub fn build_websocket_url(&self) -> String {
        let mut params: Vec<String> = Vec::with_capacity(10);
        params.push("encoding=linear16".to_string());
        params.push(format!("sample_rate={}", self.sample_rate));
        params.push(format!("channels={}", self.channels));
        params.push(format!("model={}", encode(&self.model)));
        if !self.language.is_empty() && self.language != DEFAULT_LANGUAGE {
            params.push(format!("language={}", encode(&self.language)));
        }
        if self.interim_results {
            params.push("interim_results=true".to_string());
        }
        if self.endpointing_ms != DEFAULT_ENDPOINTING_MS {
            params.push(format!("endpointing={}", self.endpointing_ms));
        }
        if self.punctuate {
            params.push("punctuate=true".to_string());
        }
        if self.smart_format {
            params.push("smart_format=true".to_string());
        }
        if self.diarize {
            params.push("diarize=true".to_string());
        }
        if self.multichannel {
            params.push("multichannel=true".to_string());
        }
        format!("{}?{}", self.base_url, params.join("&"))
    }
}

fn encode(value: &str) -> String {
    form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_url_shape() {
        let config = StreamConfig::new("key");
        let url = config.build_websocket_url();
        assert_eq!(
            url,
            "wss://api.deepgram.com/v1/listen?encoding=linear16&sample_rate=48000&channels=1&model=nova-2&interim_results=true"
        );
    }

    #[test]
    fn test_url_with_language_and_custom_rate() {
        let config = StreamConfig::new("key")
            .with_model("nova-2")
            .with_language("tr")
            .with_sample_rate(16000);
        let url = config.build_websocket_url();
        assert!(url.contains(
            "encoding=linear16&sample_rate=16000&channels=1&model=nova-2&language=tr&interim_results=true"
        ));
        assert!(!url.contains("punctuate"));
        assert!(!url.contains("smart_format"));
        assert!(!url.contains("diarize"));
        assert!(!url.contains("multichannel"));
        assert!(!url.contains("endpointing"));
    }

    #[test]
    fn test_english_language_is_omitted() {
        let config = StreamConfig::new("key").with_language("en");
        assert!(!config.build_websocket_url().contains("language="));
    }

    #[test]
    fn test_optional_flags_appear_when_enabled() {
        let mut config = StreamConfig::new("key");
        config.punctuate = true;
        config.smart_format = true;
        config.diarize = true;
        config.multichannel = true;
        config.endpointing_ms = 300;
        config.interim_results = false;

        let url = config.build_websocket_url();
        assert!(url.contains("endpointing=300"));
        assert!(url.contains("punctuate=true"));
        assert!(url.contains("smart_format=true"));
        assert!(url.contains("diarize=true"));
        assert!(url.contains("multichannel=true"));
        assert!(!url.contains("interim_results"));
    }

    #[test]
    fn test_default_endpointing_is_omitted() {
        let config = StreamConfig::new("key");
        assert!(!config.build_websocket_url().contains("endpointing"));
    }

    #[test]
    fn test_model_value_is_percent_encoded() {
        let config = StreamConfig::new("key").with_model("custom model+v2");
        let url = config.build_websocket_url();
        assert!(url.contains("model=custom+model%2Bv2"));
    }

    #[test]
    fn test_base_url_override() {
        let config = StreamConfig::new("key").with_base_url("ws://127.0.0.1:9000");
        let url = config.build_websocket_url();
        assert!(url.starts_with("ws://127.0.0.1:9000?"));
    }
}
