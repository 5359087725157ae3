//! The agent runtime: four cooperating loops over shared state.
//!
//! Thread map:
//! - DSP loop (50 ms): adapter keepalive, ring buffer drain -> FFT,
//!   issue detection, clipping fast path, periodic snapshots
//! - LLM loop (5 s): context assembly -> decision call -> queue
//! - Execution loop: approved-action drain -> validate -> execute -> learn
//! - UI loop (optional): approval queue + activity + chat
//!
//! Plus the adapter's own receive thread and a short-lived detached
//! thread per chat message so the UI never blocks on the LLM.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde_json::{json, Value};

use mix_audio::{AudioCapture, CaptureConfig, CpalCapture, NullCapture};
use mix_console::{ConsoleAdapter, ConsoleEvents};
use mix_core::{ChannelParam, ConsoleModel, ParameterUpdate, SpectralData, UpdateTarget};
use mix_dsp::{AudioAnalyser, FftAnalyser, IssueKind, MixIssue};
use mix_llm::{
    ActionKind, GenrePreset, GenrePresetLibrary, LlmConfig, LlmEngine, MixAction, PreferenceLearner,
    SessionMemory, Urgency,
};

use crate::approval::{ApprovalMode, ApprovalQueue};
use crate::bridge::MeterBridge;
use crate::discovery::name_classifier::NameClassifier;
use crate::discovery::{ChannelMap, DiscoveryOrchestrator};
use crate::executor::ActionExecutor;
use crate::ui::{ConnectionStatus, TerminalUi};
use crate::validator::ActionValidator;

const SESSION_MEMORY_CAP: usize = 200;
const LLM_STARTUP_DELAY: Duration = Duration::from_secs(2);
const STATUS_REFRESH: Duration = Duration::from_secs(5);
const SESSION_CONTEXT_ENTRIES: usize = 20;
const ACTIVE_INSTRUCTIONS: usize = 10;

#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// DSP analysis rate
    pub dsp_interval_ms: u64,
    /// LLM decision rate
    pub llm_interval_ms: u64,
    /// session memory snapshot rate
    pub snapshot_interval_ms: u64,
    pub meter_refresh_ms: u32,
    /// no UI
    pub headless: bool,

    pub audio_device_id: i32,
    /// 0 = disable audio capture
    pub audio_channels: u16,
    pub audio_sample_rate: f64,
    pub audio_fft_size: usize,

    pub approval_mode: ApprovalMode,
    pub genre: String,
    pub preferences_file: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            dsp_interval_ms: 50,
            llm_interval_ms: 5000,
            snapshot_interval_ms: 60_000,
            meter_refresh_ms: 50,
            headless: false,
            audio_device_id: -1,
            audio_channels: 0,
            audio_sample_rate: 48_000.0,
            audio_fft_size: 1024,
            approval_mode: ApprovalMode::AutoUrgent,
            genre: String::new(),
            preferences_file: String::new(),
        }
    }
}

struct AgentInner {
    adapter: Arc<dyn ConsoleAdapter>,
    model: Arc<ConsoleModel>,
    channel_map: Arc<ChannelMap>,
    llm: Arc<LlmEngine>,
    memory: Arc<SessionMemory>,
    analyser: Arc<AudioAnalyser>,
    validator: ActionValidator,
    executor: ActionExecutor,
    queue: Arc<ApprovalQueue>,
    ui: Arc<TerminalUi>,
    preferences: Arc<PreferenceLearner>,
    capture: Mutex<Box<dyn AudioCapture>>,
    active_preset: Option<GenrePreset>,

    latest_issues: Mutex<Vec<MixIssue>>,
    name_updates: Arc<AtomicUsize>,
    running: AtomicBool,
    config: AgentConfig,
}

/// Event sink wired into the console adapter. Runs on the adapter's
/// receive thread, so everything here must stay cheap and non-blocking.
struct AgentEvents {
    inner: Arc<AgentInner>,
    name_classifier: NameClassifier,
}

impl ConsoleEvents for AgentEvents {
    fn on_parameter_update(&self, update: &ParameterUpdate) {
        self.inner.model.apply_update(update);

        if update.param == ChannelParam::Name {
            self.inner.name_updates.fetch_add(1, Ordering::Relaxed);
        }

        // Live reclassification on channel renames
        if update.param == ChannelParam::Name && update.target == UpdateTarget::Channel {
            if let Some(mut profile) = self.inner.channel_map.profile(update.index) {
                if !profile.manually_overridden {
                    let name = update.value.text();
                    let result = self.name_classifier.classify(name);
                    profile.console_name = name.to_string();
                    profile.normalised_name = name.trim().to_lowercase();
                    profile.role = result.role;
                    profile.group = result.group;
                    profile.confidence = result.confidence;
                    profile.last_updated = Instant::now();
                    let role = profile.role;
                    self.inner.channel_map.update_profile(profile);

                    log::info!(
                        "ch{} renamed to '{}' - reclassified as {}",
                        update.index,
                        name,
                        role.as_str()
                    );
                    self.inner
                        .ui
                        .add_log(format!("Reclassified ch{} -> {}", update.index, role.as_str()));
                }
            }
        }

        // Fader moves arriving from the console that we did not initiate
        // would be engineer overrides; origin tagging is not implemented.
    }

    fn on_meter_update(&self, channel: u16, rms_db: f32, peak_db: f32) {
        self.inner.model.update_meter(channel, rms_db, peak_db);
    }

    fn on_connection_change(&self, connected: bool) {
        if connected {
            self.inner.ui.set_status("Connected");
        } else {
            log::error!("Console disconnected!");
            self.inner.ui.set_status("DISCONNECTED");
        }
        refresh_connection_status(&self.inner);
    }
}

pub struct Agent {
    inner: Arc<AgentInner>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl Agent {
    pub fn new(
        adapter: Arc<dyn ConsoleAdapter>,
        llm_config: LlmConfig,
        config: AgentConfig,
    ) -> Self {
        let model = Arc::new(ConsoleModel::new());

        // Genre preset: built-in name first, then a custom preset file
        let mut genre_library = GenrePresetLibrary::new();
        let active_preset = if config.genre.is_empty() {
            None
        } else if let Some(preset) = genre_library.get(&config.genre) {
            log::info!("Genre preset: {} - {}", preset.name, preset.description);
            Some(preset.clone())
        } else if genre_library.load_from_file(std::path::Path::new(&config.genre)) {
            log::info!("Loaded custom genre preset from {}", config.genre);
            genre_library.get("custom").cloned()
        } else {
            log::warn!("Unknown genre preset: '{}'", config.genre);
            None
        };

        let preferences = Arc::new(PreferenceLearner::new());
        if !config.preferences_file.is_empty()
            && preferences.load_from_file(std::path::Path::new(&config.preferences_file))
        {
            log::info!(
                "Loaded {} preference decisions from {}",
                preferences.total_decisions(),
                config.preferences_file
            );
        }

        let inner = Arc::new(AgentInner {
            executor: ActionExecutor::new(Arc::clone(&adapter), Arc::clone(&model)),
            adapter,
            model,
            channel_map: Arc::new(ChannelMap::new()),
            llm: Arc::new(LlmEngine::new(llm_config)),
            memory: Arc::new(SessionMemory::new(SESSION_MEMORY_CAP)),
            analyser: Arc::new(AudioAnalyser::new()),
            validator: ActionValidator::new(),
            queue: Arc::new(ApprovalQueue::new(config.approval_mode)),
            ui: Arc::new(TerminalUi::new()),
            preferences,
            capture: Mutex::new(Box::new(NullCapture)),
            active_preset,
            latest_issues: Mutex::new(Vec::new()),
            name_updates: Arc::new(AtomicUsize::new(0)),
            running: AtomicBool::new(false),
            config,
        });

        Self { inner, threads: Mutex::new(Vec::new()) }
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Relaxed)
    }

    pub fn approval_queue(&self) -> Arc<ApprovalQueue> {
        Arc::clone(&self.inner.queue)
    }

    pub fn session_memory(&self) -> Arc<SessionMemory> {
        Arc::clone(&self.inner.memory)
    }

    pub fn channel_map(&self) -> Arc<ChannelMap> {
        Arc::clone(&self.inner.channel_map)
    }

    /// Bring the agent up: negotiate capabilities, wire callbacks,
    /// discover channels, spawn the loops. Returns false when the console
    /// reports no usable channel layout.
    pub fn start(&self) -> bool {
        let inner = &self.inner;
        let caps = inner.adapter.capabilities();
        if caps.channel_count == 0 {
            log::error!("Console reports no channels - cannot start");
            return false;
        }

        inner.model.init(caps.channel_count, caps.bus_count);
        inner.channel_map.resize(caps.channel_count);
        log::info!(
            "Agent starting - {} ({} ch, {} bus)",
            caps.model,
            caps.channel_count,
            caps.bus_count
        );

        // Wire adapter events
        let sink = Arc::new(AgentEvents {
            inner: Arc::clone(inner),
            name_classifier: NameClassifier::new(),
        });
        inner.adapter.set_event_sink(sink);

        inner.adapter.subscribe_meter(inner.config.meter_refresh_ms);

        // Audio capture, falling back to console meters only
        if inner.config.audio_channels > 0 {
            let mut capture: Box<dyn AudioCapture> = Box::new(CpalCapture::new());
            let capture_config = CaptureConfig {
                device_id: inner.config.audio_device_id,
                channel_count: inner.config.audio_channels,
                sample_rate: inner.config.audio_sample_rate,
                frames_per_block: inner.config.audio_fft_size,
            };
            if capture.open(&capture_config) && capture.start() {
                log::info!(
                    "Audio capture started: {} ({} ch, {}Hz, FFT={})",
                    capture.backend_name(),
                    inner.config.audio_channels,
                    inner.config.audio_sample_rate,
                    inner.config.audio_fft_size
                );
                *inner.capture.lock() = capture;
            } else {
                log::warn!("Audio capture unavailable - falling back to console meters only");
            }
        } else {
            log::info!("Audio capture disabled - using console meters only");
        }

        // Rejections feed the preference learner
        let learner = Arc::clone(&inner.preferences);
        inner.queue.set_rejection_hook(Box::new(move |action: &MixAction| {
            learner.record_rejection(action, &action.role_name);
        }));

        // Channel discovery (blocking for the local pass)
        log::info!("Running channel discovery...");
        DiscoveryOrchestrator::new().run(
            &inner.adapter,
            &inner.model,
            &inner.channel_map,
            &inner.llm,
            &inner.name_updates,
        );

        inner.running.store(true, Ordering::Relaxed);
        let mut threads = self.threads.lock();

        let dsp = Arc::clone(inner);
        threads.push(std::thread::spawn(move || dsp_loop(dsp)));

        let llm = Arc::clone(inner);
        threads.push(std::thread::spawn(move || llm_loop(llm)));

        let exec = Arc::clone(inner);
        threads.push(std::thread::spawn(move || execution_loop(exec)));

        // Chat messages from the UI dispatch a detached LLM call
        let chat_inner = Arc::clone(inner);
        inner.ui.set_chat_handler(Box::new(move |message: &str| {
            let inner = Arc::clone(&chat_inner);
            let message = message.to_string();
            std::thread::spawn(move || handle_chat_message(inner, &message));
        }));

        refresh_connection_status(inner);

        if !inner.config.headless {
            let ui_inner = Arc::clone(inner);
            threads.push(std::thread::spawn(move || {
                if let Err(e) = ui_inner.ui.run(&ui_inner.queue) {
                    log::error!("UI error: {}", e);
                }
                // UI exit stops the agent
                if ui_inner.running.swap(false, Ordering::Relaxed) {
                    log::info!("UI exited - stopping agent");
                }
            }));
        }

        log::info!(
            "Agent running - DSP@{}ms LLM@{}ms Audio:{}",
            inner.config.dsp_interval_ms,
            inner.config.llm_interval_ms,
            if inner.capture.lock().is_running() { "active" } else { "off" }
        );
        inner.ui.set_status("Running");
        true
    }

    pub fn stop(&self) {
        if !self.inner.running.swap(false, Ordering::Relaxed) {
            return;
        }
        log::info!("Agent stopping...");

        self.inner.ui.stop();
        self.inner.adapter.unsubscribe_meter();
        self.inner.capture.lock().stop();

        for handle in self.threads.lock().drain(..) {
            let _ = handle.join();
        }

        // Persist learned preferences for the next session
        if !self.inner.config.preferences_file.is_empty() && self.inner.preferences.is_dirty() {
            let path = std::path::Path::new(&self.inner.config.preferences_file);
            match self.inner.preferences.save_to_file(path) {
                Ok(()) => log::info!("Saved preferences to {}", path.display()),
                Err(e) => log::warn!("Failed to save preferences: {}", e),
            }
        }

        log::info!("Agent stopped");
    }
}

impl Drop for Agent {
    fn drop(&mut self) {
        self.stop();
    }
}

// ── DSP loop ───────────────────────────────────────────────────────────

fn dsp_loop(inner: Arc<AgentInner>) {
    log::debug!("DSP thread started");

    let mut fft = FftAnalyser::new(inner.config.audio_fft_size);
    let sample_rate = inner.config.audio_sample_rate as f32;
    let mut last_snapshot = Instant::now();
    let mut last_status = Instant::now();

    while inner.running.load(Ordering::Relaxed) {
        let start = Instant::now();

        // Keep the console connection alive
        inner.adapter.tick();

        // Drain buffered audio through the FFT into analyser and model
        {
            let capture = inner.capture.lock();
            if capture.is_running() {
                let analyser = &inner.analyser;
                let model = &inner.model;
                while capture.consume(fft.size(), &mut |ch, samples| {
                    let result = fft.analyse(samples, sample_rate);
                    analyser.update_fft(ch, result);
                    model.update_spectral(
                        ch,
                        SpectralData {
                            bass: result.bands.bass,
                            mid: result.bands.mid,
                            presence: result.bands.presence,
                            crest_factor: result.crest_factor,
                            centroid: result.spectral_centroid,
                        },
                    );
                }) {}
            }
        }

        // Analyse and refresh the shared issue list
        let analysis = inner.analyser.analyse(&inner.model, inner.model.channel_count());
        let issues = inner.analyser.detect_issues(&analysis);

        for issue in &issues {
            if matches!(
                issue.kind,
                IssueKind::Boomy | IssueKind::Harsh | IssueKind::Thin | IssueKind::Masking
            ) {
                inner.ui.add_log(format!("DSP: {}", issue.description));
            }
        }
        *inner.latest_issues.lock() = issues;

        if analysis.has_feedback_risk {
            for warning in &analysis.warnings {
                inner.ui.add_log(format!("!! {}", warning));
            }
        }

        // Clipping fast path: bypass the LLM entirely
        if analysis.has_clipping {
            if let Some(snap) = inner.model.channel(analysis.clipping_channel) {
                let fix = MixAction {
                    kind: ActionKind::SetFader,
                    channel: analysis.clipping_channel,
                    value: snap.fader * 0.9,
                    urgency: Urgency::Immediate,
                    reason: "Clipping detected - reducing level".into(),
                    ..MixAction::default()
                };
                if inner.queue.submit(&fix) {
                    let validation = inner.validator.validate(&fix, &inner.model);
                    if validation.valid {
                        inner.executor.execute(&validation.clamped);
                    }
                }
            }
        }

        // Periodic compact snapshot into session memory
        if last_snapshot.elapsed().as_millis() as u64 > inner.config.snapshot_interval_ms {
            let bridge = MeterBridge::new(&inner.model, &inner.channel_map);
            inner.memory.record_snapshot(bridge.build_compact_state());
            last_snapshot = Instant::now();
        }

        if last_status.elapsed() > STATUS_REFRESH {
            refresh_connection_status(&inner);
            last_status = Instant::now();
        }

        sleep_remainder(&inner.running, start, inner.config.dsp_interval_ms);
    }
    log::debug!("DSP thread stopped");
}

// ── LLM loop ───────────────────────────────────────────────────────────

fn llm_loop(inner: Arc<AgentInner>) {
    log::debug!("LLM thread started");

    // Give discovery a moment before the first decision pass
    sleep_remainder(&inner.running, Instant::now(), LLM_STARTUP_DELAY.as_millis() as u64);

    while inner.running.load(Ordering::Relaxed) {
        let start = Instant::now();

        let mix_context = build_mix_context(&inner);
        let session_context = inner.memory.build_context(SESSION_CONTEXT_ENTRIES);
        let actions = inner.llm.decide_mix_actions(&mix_context, &session_context);
        log::debug!("LLM returned {} actions", actions.len());

        for action in actions {
            if !inner.running.load(Ordering::Relaxed) {
                break;
            }
            dispatch_action(&inner, action, &mix_context, "Auto");
        }

        sleep_remainder(&inner.running, start, inner.config.llm_interval_ms);
    }
    log::debug!("LLM thread stopped");
}

/// Shared submit path for LLM- and chat-proposed actions.
fn dispatch_action(inner: &Arc<AgentInner>, action: MixAction, mix_context: &Value, tag: &str) {
    match action.kind {
        ActionKind::NoAction => {
            log::debug!("LLM: no action needed - {}", action.reason);
            return;
        }
        ActionKind::Observation => {
            inner.memory.record_observation(&action.reason);
            inner.ui.add_log(format!("LLM: {}", action.reason));
            return;
        }
        _ => {}
    }

    if inner.queue.submit(&action) {
        // Auto-approved: validate and execute immediately
        let validation = inner.validator.validate(&action, &inner.model);
        if validation.valid {
            let result = inner.executor.execute(&validation.clamped);
            if result.success {
                inner.memory.record_action(&validation.clamped, mix_context.clone());
                inner.ui.add_log(format!("{}: {}", tag, validation.clamped.describe()));
            }
        } else {
            log::warn!("Validation failed: {}", validation.warning);
        }
    } else {
        inner.ui.add_log(format!("Queued: {}", action.describe()));
    }
}

// ── Execution loop ─────────────────────────────────────────────────────

fn execution_loop(inner: Arc<AgentInner>) {
    log::debug!("Execution thread started");

    while inner.running.load(Ordering::Relaxed) {
        let Some(action) = inner.queue.pop_approved(200) else {
            continue;
        };

        let validation = inner.validator.validate(&action, &inner.model);
        if !validation.valid {
            log::warn!("Validation failed for approved action: {}", validation.warning);
            inner.memory.record_rejection(&action, &validation.warning);
            continue;
        }

        let result = inner.executor.execute(&validation.clamped);
        if result.success {
            let bridge = MeterBridge::new(&inner.model, &inner.channel_map);
            inner.memory.record_action(&validation.clamped, bridge.build_compact_state());
            inner.ui.add_log(format!("Approved: {}", validation.clamped.describe()));
            inner
                .preferences
                .record_approval(&validation.clamped, &validation.clamped.role_name);
        } else {
            log::warn!("Execution failed: {}", result.error);
            inner.ui.add_log(format!("Failed: {}", result.error));
        }
    }
    log::debug!("Execution thread stopped");
}

// ── Chat handling ──────────────────────────────────────────────────────

fn handle_chat_message(inner: Arc<AgentInner>, message: &str) {
    log::info!("Engineer chat: {}", message);
    inner.memory.record_instruction(message);
    inner.preferences.record_instruction(message);

    let mix_context = build_mix_context(&inner);
    let prompt = json!({
        "mix_state": mix_context,
        "recent_history": inner.memory.build_context(10),
        "engineer_says": message,
    });

    let response = match inner.llm.call_raw(CHAT_SYSTEM_PROMPT, &prompt.to_string()) {
        Ok(r) => r,
        Err(e) => {
            log::error!("Chat LLM call failed: {}", e);
            inner
                .ui
                .add_chat_response(&format!("Error: couldn't reach the LLM - {}", e));
            return;
        }
    };

    match serde_json::from_str::<Value>(&response) {
        Ok(j) => {
            if let Some(reply) = j.get("reply").and_then(Value::as_str) {
                if !reply.is_empty() {
                    inner.ui.add_chat_response(reply);
                }
            }
            if let Some(actions) = j.get("actions").and_then(Value::as_array) {
                for item in actions {
                    let action = MixAction::from_json(item);
                    if matches!(action.kind, ActionKind::NoAction | ActionKind::Observation) {
                        if !action.reason.is_empty() {
                            inner.ui.add_log(format!("LLM: {}", action.reason));
                        }
                        continue;
                    }
                    dispatch_action(&inner, action, &mix_context, "Chat");
                }
            }
        }
        Err(_) => {
            // Not JSON: treat the whole response as a plain text reply
            let reply: String = response.chars().take(200).collect();
            inner.ui.add_chat_response(&reply);
        }
    }
}

// ── Context building ───────────────────────────────────────────────────

fn build_mix_context(inner: &Arc<AgentInner>) -> Value {
    let issues = inner.latest_issues.lock().clone();
    let bridge = MeterBridge::new(&inner.model, &inner.channel_map);
    let mut state = bridge.build_mix_state(&issues);

    let Some(obj) = state.as_object_mut() else { return state };

    let instructions = inner.memory.active_instructions(ACTIVE_INSTRUCTIONS);
    if !instructions.is_empty() {
        obj.insert("engineer_instructions".into(), json!(instructions));
    }

    obj.insert(
        "analysis_source".into(),
        json!(if inner.analyser.has_fft_data() { "fft_audio" } else { "console_meters" }),
    );

    if let Some(preset) = &inner.active_preset {
        obj.insert("genre_preset".into(), preset.to_json());
    }

    let prefs = inner.preferences.build_preferences();
    if !prefs.is_null() {
        obj.insert("engineer_preferences".into(), prefs);
    }

    state
}

fn refresh_connection_status(inner: &Arc<AgentInner>) {
    let capture = inner.capture.lock();
    let status = ConnectionStatus {
        console_connected: inner.adapter.is_connected(),
        console_type: inner.adapter.capabilities().model,
        audio_connected: capture.is_running(),
        audio_backend: capture.backend_name().to_string(),
        audio_channels: inner.config.audio_channels,
        audio_sample_rate: inner.config.audio_sample_rate as f32,
        // Judged by call outcomes; optimistic until a call fails
        llm_connected: true,
    };
    drop(capture);
    inner.ui.update_connection_status(status);
}

/// Sleep out the rest of a loop period in short slices so `stop()` is
/// observed promptly even for long intervals.
fn sleep_remainder(running: &AtomicBool, start: Instant, interval_ms: u64) {
    let interval = Duration::from_millis(interval_ms);
    while running.load(Ordering::Relaxed) {
        let elapsed = start.elapsed();
        if elapsed >= interval {
            break;
        }
        std::thread::sleep((interval - elapsed).min(Duration::from_millis(50)));
    }
}

const CHAT_SYSTEM_PROMPT: &str = r#"You are an expert live sound engineer AI assistant.
The engineer has sent you a message. Respond conversationally AND suggest
specific mix actions if appropriate.

If the message is a question about the current mix, answer it based on the
mix state provided.

If the message is an instruction (e.g. "bring up the vocals", "leave the
drums alone", "more reverb on the snare"), acknowledge it and produce actions.

Respond with JSON:
{
  "reply": "Your conversational response to the engineer",
  "actions": [
    {
      "action": "set_fader|set_eq|set_comp|set_hpf|set_send|mute|unmute|no_action|observation",
      "channel": 1, "role": "Kick", "value": 0.75,
      "value2": 0.0, "value3": 1.0, "band": 1, "aux": 0,
      "urgency": "normal", "reason": "explanation"
    }
  ]
}"#;

#[cfg(test)]
mod tests {
    use super::*;
    use mix_core::{BusParam, ConsoleCapabilities, ParamValue};

    /// Loopback adapter double: records writes, lets tests inject events.
    struct LoopbackAdapter {
        sink: parking_lot::RwLock<Option<Arc<dyn ConsoleEvents>>>,
        connected: AtomicBool,
    }

    impl LoopbackAdapter {
        fn new() -> Self {
            Self { sink: parking_lot::RwLock::new(None), connected: AtomicBool::new(true) }
        }

        fn inject_update(&self, update: ParameterUpdate) {
            if let Some(sink) = self.sink.read().as_ref() {
                sink.on_parameter_update(&update);
            }
        }
    }

    impl ConsoleAdapter for LoopbackAdapter {
        fn connect(&self, _ip: &str, _port: u16) -> bool {
            true
        }
        fn disconnect(&self) {
            self.connected.store(false, Ordering::Relaxed);
        }
        fn is_connected(&self) -> bool {
            self.connected.load(Ordering::Relaxed)
        }
        fn capabilities(&self) -> ConsoleCapabilities {
            ConsoleCapabilities {
                model: "Loopback".into(),
                firmware: String::new(),
                channel_count: 8,
                bus_count: 4,
                matrix_count: 0,
                dca_count: 0,
                fx_slots: 0,
                eq_bands: 4,
                has_motorized_faders: false,
                has_dynamic_eq: false,
                has_multiband_comp: false,
                meter_update_rate_ms: 50,
            }
        }
        fn request_full_sync(&self) {
            // Answer the sync synchronously so discovery completes at once
            if let Some(sink) = self.sink.read().as_ref() {
                for ch in 1..=8u16 {
                    sink.on_parameter_update(&ParameterUpdate::channel(
                        ch,
                        ChannelParam::Name,
                        ParamValue::Str(format!("CH {:02}", ch)),
                    ));
                }
                for bus in 1..=4u16 {
                    sink.on_parameter_update(&ParameterUpdate::bus(
                        bus,
                        ChannelParam::Name,
                        ParamValue::Str(format!("Bus {}", bus)),
                    ));
                }
            }
        }
        fn set_channel_param(&self, _ch: u16, _param: ChannelParam, _value: ParamValue) {}
        fn set_send_level(&self, _ch: u16, _bus: u16, _level: f32) {}
        fn set_bus_param(&self, _bus: u16, _param: BusParam, _value: f32) {}
        fn subscribe_meter(&self, _refresh_ms: u32) {}
        fn unsubscribe_meter(&self) {}
        fn tick(&self) {}
        fn set_event_sink(&self, sink: Arc<dyn ConsoleEvents>) {
            *self.sink.write() = Some(sink);
        }
    }

    fn test_agent(adapter: Arc<LoopbackAdapter>) -> Agent {
        let llm_config = LlmConfig {
            anthropic_api_key: String::new(),
            use_fallback: false,
            ..LlmConfig::default()
        };
        // Long intervals keep the loops quiet during tests
        let config = AgentConfig {
            headless: true,
            llm_interval_ms: 60_000,
            snapshot_interval_ms: 600_000,
            ..AgentConfig::default()
        };
        Agent::new(adapter, llm_config, config)
    }

    #[test]
    fn test_start_initialises_model_and_map() {
        let adapter = Arc::new(LoopbackAdapter::new());
        let agent = test_agent(Arc::clone(&adapter));
        assert!(agent.start());
        assert!(agent.is_running());

        assert_eq!(agent.inner.model.channel_count(), 8);
        assert_eq!(agent.inner.model.bus_count(), 4);
        assert_eq!(agent.channel_map().len(), 8);

        agent.stop();
        assert!(!agent.is_running());
    }

    #[test]
    fn test_parameter_update_flows_into_model() {
        let adapter = Arc::new(LoopbackAdapter::new());
        let agent = test_agent(Arc::clone(&adapter));
        assert!(agent.start());

        adapter.inject_update(ParameterUpdate::channel(
            3,
            ChannelParam::Fader,
            ParamValue::Float(0.42),
        ));
        assert_eq!(agent.inner.model.channel(3).unwrap().fader, 0.42);

        agent.stop();
    }

    #[test]
    fn test_name_change_reclassifies() {
        let adapter = Arc::new(LoopbackAdapter::new());
        let agent = test_agent(Arc::clone(&adapter));
        assert!(agent.start());

        adapter.inject_update(ParameterUpdate::channel(
            2,
            ChannelParam::Name,
            ParamValue::Str("Kick".into()),
        ));

        let profile = agent.channel_map().profile(2).unwrap();
        assert_eq!(profile.role, mix_core::InstrumentRole::Kick);
        assert_eq!(profile.console_name, "Kick");

        agent.stop();
    }

    #[test]
    fn test_manually_overridden_profile_keeps_role() {
        let adapter = Arc::new(LoopbackAdapter::new());
        let agent = test_agent(Arc::clone(&adapter));
        assert!(agent.start());

        let mut profile = agent.channel_map().profile(5).unwrap();
        profile.role = mix_core::InstrumentRole::Snare;
        profile.manually_overridden = true;
        agent.channel_map().update_profile(profile);

        adapter.inject_update(ParameterUpdate::channel(
            5,
            ChannelParam::Name,
            ParamValue::Str("Kick".into()),
        ));

        assert_eq!(agent.channel_map().profile(5).unwrap().role, mix_core::InstrumentRole::Snare);
        agent.stop();
    }

    #[test]
    fn test_stop_is_idempotent() {
        let adapter = Arc::new(LoopbackAdapter::new());
        let agent = test_agent(adapter);
        assert!(agent.start());
        agent.stop();
        agent.stop();
        assert!(!agent.is_running());
    }

    #[test]
    fn test_mix_context_includes_analysis_source() {
        let adapter = Arc::new(LoopbackAdapter::new());
        let agent = test_agent(adapter);
        assert!(agent.start());

        let context = build_mix_context(&agent.inner);
        assert_eq!(context["analysis_source"], "console_meters");
        assert!(context.get("engineer_instructions").is_none());

        agent.inner.memory.record_instruction("leave drums alone");
        let context = build_mix_context(&agent.inner);
        assert_eq!(context["engineer_instructions"][0], "leave drums alone");

        agent.stop();
    }
}
