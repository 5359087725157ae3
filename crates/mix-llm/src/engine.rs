//! LLM transport and the mix decision call.
//!
//! Two backends: the Anthropic messages API (primary whenever a key is
//! configured) and a local Ollama server (fallback, or primary in fully
//! local mode). Transport is a blocking reqwest client: the calling loops
//! are plain OS threads with their own cadence.

use std::path::Path;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::action::MixAction;

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("request failed: {0}")]
    Transport(String),

    #[error("backend returned status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("all backends failed")]
    AllBackendsFailed,
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub anthropic_api_key: String,
    pub anthropic_model: String,
    pub ollama_host: String,
    pub ollama_model: String,
    /// fall back to Ollama when the primary fails
    pub use_fallback: bool,
    /// use Ollama as primary (fully local mode)
    pub ollama_primary: bool,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_ms: u64,

    /// Optional directory of prompt .txt files. When `core_prompt.txt`
    /// loads it replaces the built-in compact prompt; the other files are
    /// appended. Especially useful for local models that want the extra
    /// guidance.
    pub prompt_dir: String,
    /// Genre whose `genre_<name>.txt` is appended when present
    pub active_genre: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            anthropic_api_key: String::new(),
            anthropic_model: "claude-sonnet-4-20250514".into(),
            ollama_host: "http://localhost:11434".into(),
            ollama_model: "llama3:8b".into(),
            use_fallback: true,
            ollama_primary: false,
            max_tokens: 1024,
            temperature: 0.3,
            timeout_ms: 5000,
            prompt_dir: String::new(),
            active_genre: String::new(),
        }
    }
}

#[derive(Default)]
struct CallStats {
    total_calls: u32,
    failed_calls: u32,
    total_latency_ms: f64,
}

#[derive(Default)]
struct LoadedPrompts {
    core: String,
    balance_ref: String,
    troubleshooting: String,
    genre: String,
}

pub struct LlmEngine {
    config: LlmConfig,
    client: Client,
    stats: Mutex<CallStats>,
    prompts: Mutex<LoadedPrompts>,
}

// Anthropic messages API types

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    system: &'a str,
    messages: Vec<AnthropicMessage<'a>>,
}

#[derive(Serialize)]
struct AnthropicMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    content: Vec<AnthropicContent>,
}

#[derive(Deserialize)]
struct AnthropicContent {
    #[serde(default)]
    text: String,
}

// Ollama generate API types

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    system: &'a str,
    prompt: &'a str,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Deserialize)]
struct OllamaResponse {
    #[serde(default)]
    response: String,
}

impl LlmEngine {
    pub fn new(config: LlmConfig) -> Self {
        let engine = Self {
            config,
            client: Client::new(),
            stats: Mutex::new(CallStats::default()),
            prompts: Mutex::new(LoadedPrompts::default()),
        };
        if !engine.config.prompt_dir.is_empty() {
            engine.load_prompt_files();
        }
        engine
    }

    /// Main decision call: given mix state and session history, returns
    /// parsed actions. Failures yield an empty list, never an error.
    pub fn decide_mix_actions(&self, mix_state: &Value, session_context: &Value) -> Vec<MixAction> {
        let user = json!({
            "mix_state": mix_state,
            "recent_history": session_context,
        });

        match self.call_raw(&self.mix_system_prompt(), &user.to_string()) {
            Ok(response) => parse_actions(&response),
            Err(e) => {
                log::warn!("LLM decision call failed: {}", e);
                Vec::new()
            }
        }
    }

    /// Shared transport with timing and fallback. Used by the decision
    /// loop, chat handling and discovery review.
    pub fn call_raw(&self, system_prompt: &str, user_message: &str) -> Result<String, LlmError> {
        let start = Instant::now();
        {
            let mut stats = self.stats.lock();
            stats.total_calls += 1;
        }

        let (first, second): (Backend, Backend) = if self.config.ollama_primary {
            (Backend::Ollama, Backend::Anthropic)
        } else {
            (Backend::Anthropic, Backend::Ollama)
        };

        let mut result = self.call_backend(first, system_prompt, user_message);
        if result.is_err() && self.allows(second) {
            if let Err(e) = &result {
                log::warn!("{:?} call failed: {} - trying fallback", first, e);
            }
            result = self.call_backend(second, system_prompt, user_message);
        }

        let elapsed = start.elapsed().as_millis() as f64;
        let mut stats = self.stats.lock();
        stats.total_latency_ms += elapsed;

        match result {
            Ok(text) => {
                log::debug!("LLM response in {:.0}ms ({} chars)", elapsed, text.len());
                Ok(text)
            }
            Err(e) => {
                stats.failed_calls += 1;
                log::error!("All LLM backends failed: {}", e);
                Err(LlmError::AllBackendsFailed)
            }
        }
    }

    fn allows(&self, backend: Backend) -> bool {
        match backend {
            Backend::Anthropic => !self.config.anthropic_api_key.is_empty(),
            Backend::Ollama => self.config.use_fallback || self.config.ollama_primary,
        }
    }

    fn call_backend(
        &self,
        backend: Backend,
        system_prompt: &str,
        user_message: &str,
    ) -> Result<String, LlmError> {
        match backend {
            Backend::Anthropic => {
                if self.config.anthropic_api_key.is_empty() {
                    return Err(LlmError::Transport("no API key".into()));
                }
                self.call_anthropic(system_prompt, user_message)
            }
            Backend::Ollama => self.call_ollama(system_prompt, user_message),
        }
    }

    fn call_anthropic(&self, system_prompt: &str, user_message: &str) -> Result<String, LlmError> {
        let request = AnthropicRequest {
            model: &self.config.anthropic_model,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            system: system_prompt,
            messages: vec![AnthropicMessage { role: "user", content: user_message }],
        };

        let response = self
            .client
            .post("https://api.anthropic.com/v1/messages")
            .header("x-api-key", &self.config.anthropic_api_key)
            .header("anthropic-version", "2023-06-01")
            .timeout(Duration::from_millis(self.config.timeout_ms))
            .json(&request)
            .send()
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                message: body.chars().take(200).collect(),
            });
        }

        let parsed: AnthropicResponse = response
            .json()
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        parsed
            .content
            .first()
            .map(|c| c.text.clone())
            .ok_or_else(|| LlmError::InvalidResponse("empty content".into()))
    }

    fn call_ollama(&self, system_prompt: &str, user_message: &str) -> Result<String, LlmError> {
        let url = format!("{}/api/generate", self.config.ollama_host);
        let request = OllamaRequest {
            model: &self.config.ollama_model,
            system: system_prompt,
            prompt: user_message,
            stream: false,
            options: OllamaOptions {
                temperature: self.config.temperature,
                num_predict: self.config.max_tokens,
            },
        };

        let response = self
            .client
            .post(&url)
            // Local models can be slow; give them more room than the cloud
            .timeout(Duration::from_secs(30))
            .json(&request)
            .send()
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(LlmError::Api { status: status.as_u16(), message: "ollama error".into() });
        }

        let parsed: OllamaResponse = response
            .json()
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        Ok(parsed.response)
    }

    /// (Re)load prompt files from the configured directory. Returns true
    /// when the core prompt was found.
    pub fn load_prompt_files(&self) -> bool {
        let dir = Path::new(&self.config.prompt_dir);
        let read = |name: &str| std::fs::read_to_string(dir.join(name)).unwrap_or_default();

        let mut prompts = self.prompts.lock();
        prompts.core = read("core_prompt.txt");
        if prompts.core.is_empty() {
            // Missing core prompt: stay on the built-in
            prompts.balance_ref = String::new();
            prompts.troubleshooting = String::new();
            prompts.genre = String::new();
            return false;
        }
        prompts.balance_ref = read("balance_reference.txt");
        prompts.troubleshooting = read("troubleshooting.txt");
        prompts.genre = if self.config.active_genre.is_empty() {
            String::new()
        } else {
            read(&format!("genre_{}.txt", self.config.active_genre))
        };
        log::info!("Loaded prompt files from {}", self.config.prompt_dir);
        true
    }

    pub fn has_loaded_prompts(&self) -> bool {
        !self.prompts.lock().core.is_empty()
    }

    fn mix_system_prompt(&self) -> String {
        let prompts = self.prompts.lock();
        if !prompts.core.is_empty() {
            let mut full = prompts.core.clone();
            for extra in [&prompts.balance_ref, &prompts.troubleshooting, &prompts.genre] {
                if !extra.is_empty() {
                    full.push_str("\n\n");
                    full.push_str(extra);
                }
            }
            return full;
        }
        BUILT_IN_MIX_PROMPT.to_string()
    }

    pub fn total_calls(&self) -> u32 {
        self.stats.lock().total_calls
    }

    pub fn failed_calls(&self) -> u32 {
        self.stats.lock().failed_calls
    }

    pub fn avg_latency_ms(&self) -> f64 {
        let stats = self.stats.lock();
        if stats.total_calls > 0 {
            stats.total_latency_ms / stats.total_calls as f64
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Backend {
    Anthropic,
    Ollama,
}

/// Scan a response for the first JSON array and parse each element.
/// Arbitrary prose before and after the array is tolerated.
pub fn parse_actions(response: &str) -> Vec<MixAction> {
    let Some(start) = response.find('[') else {
        log::warn!("LLM response contains no JSON array");
        return Vec::new();
    };
    let Some(end) = response.rfind(']') else {
        log::warn!("LLM response contains no JSON array");
        return Vec::new();
    };
    if end < start {
        return Vec::new();
    }

    match serde_json::from_str::<Value>(&response[start..=end]) {
        Ok(Value::Array(items)) => items.iter().map(MixAction::from_json).collect(),
        Ok(_) => Vec::new(),
        Err(e) => {
            log::error!("Failed to parse LLM actions: {}", e);
            Vec::new()
        }
    }
}

const BUILT_IN_MIX_PROMPT: &str = r#"You are an expert live sound engineer AI assistant.
You are given the current state of a live mixing console and recent history.
Analyse the mix and suggest specific, safe adjustments.

RULES:
- Never change faders by more than 6dB in a single step
- Never boost EQ by more than 3dB in a single step - cuts are safer than boosts
- For feedback risks, suggest CUTS, never boosts
- Always prioritize vocal clarity
- Lead vocals should sit 4-6dB above backing vocals in the mix
- If something sounds fine, respond with no_action
- Kick and bass should not mask each other - use HPF separation or EQ notching
- Be conservative - small changes that compound over time
- CRITICAL: If "engineer_instructions" are present in the mix state, those are
  direct instructions from the human engineer. Follow them. They take priority
  over your own analysis. If the engineer says "leave the drums alone", do not
  suggest any drum changes. If the engineer says "more vocals", prioritize that.

Respond with a JSON array of actions:
[
  {
    "action": "set_fader|set_pan|set_eq|set_comp|set_gate|set_hpf|set_send|mute|unmute|no_action|observation",
    "channel": 1,
    "role": "Kick",
    "value": 0.75,
    "value2": 0.0,
    "value3": 1.0,
    "band": 1,
    "aux": 0,
    "urgency": "immediate|fast|normal|low",
    "reason": "brief explanation"
  }
]

For set_eq: value=frequency_hz, value2=gain_db, value3=q_factor, band=1-6
For set_comp: value=threshold_db, value2=ratio
For set_hpf: value=frequency_hz
For set_fader: value=0.0-1.0 normalized"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{ActionKind, Urgency};

    #[test]
    fn test_parse_plain_array() {
        let actions = parse_actions(
            r#"[{"action": "set_fader", "channel": 3, "value": 0.8, "urgency": "fast"}]"#,
        );
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].kind, ActionKind::SetFader);
        assert_eq!(actions[0].channel, 3);
        assert_eq!(actions[0].urgency, Urgency::Fast);
    }

    #[test]
    fn test_parse_array_wrapped_in_prose() {
        let response = r#"Looking at the mix, the kick is a bit hot.

[{"action": "set_fader", "channel": 1, "value": 0.6, "reason": "kick hot"}]

Let me know if you'd like further changes."#;
        let actions = parse_actions(response);
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].channel, 1);
    }

    #[test]
    fn test_parse_empty_input() {
        assert!(parse_actions("").is_empty());
        assert!(parse_actions("no array here").is_empty());
        assert!(parse_actions("] backwards [").is_empty());
    }

    #[test]
    fn test_parse_malformed_json() {
        assert!(parse_actions(r#"[{"action": "set_fader", "#).is_empty());
    }

    #[test]
    fn test_parse_unknown_actions_degrade() {
        let actions = parse_actions(r#"[{"action": "do_the_thing"}, {"action": "mute", "channel": 2}]"#);
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[0].kind, ActionKind::NoAction);
        assert_eq!(actions[1].kind, ActionKind::MuteChannel);
    }

    #[test]
    fn test_missing_prompt_dir_uses_built_in() {
        let engine = LlmEngine::new(LlmConfig {
            prompt_dir: "/nonexistent/prompts".into(),
            ..LlmConfig::default()
        });
        assert!(!engine.has_loaded_prompts());
        assert!(engine.mix_system_prompt().contains("live sound engineer"));
    }

    #[test]
    fn test_prompt_files_replace_built_in() {
        let dir = std::env::temp_dir().join("mixagent_prompt_test");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("core_prompt.txt"), "CUSTOM CORE").unwrap();
        std::fs::write(dir.join("troubleshooting.txt"), "FIX THINGS").unwrap();

        let engine = LlmEngine::new(LlmConfig {
            prompt_dir: dir.to_string_lossy().into_owned(),
            ..LlmConfig::default()
        });
        assert!(engine.has_loaded_prompts());
        let prompt = engine.mix_system_prompt();
        assert!(prompt.contains("CUSTOM CORE"));
        assert!(prompt.contains("FIX THINGS"));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_stats_start_empty() {
        let engine = LlmEngine::new(LlmConfig::default());
        assert_eq!(engine.total_calls(), 0);
        assert_eq!(engine.failed_calls(), 0);
        assert_eq!(engine.avg_latency_ms(), 0.0);
    }
}
