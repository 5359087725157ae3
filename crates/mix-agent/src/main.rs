//! mixagent - autonomous live-sound engineering agent.
//!
//! Connects to a digital mixing console, watches the mix, and proposes
//! safe parameter changes through a human approval queue.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use mix_agent::{Agent, AgentConfig, ShowConfig};
use mix_agent::config::{env_or, load_dotenv};
use mix_console::{AvantisAdapter, ConsoleAdapter, WingAdapter, X32Adapter};
use mix_llm::LlmConfig;

fn main() {
    std::process::exit(run());
}

fn run() -> i32 {
    // .env first, never overriding real environment
    load_dotenv(Path::new(".env"));

    // MIXAGENT_LOG_LEVEL drives the log filter unless RUST_LOG is set
    let level = env_or("MIXAGENT_LOG_LEVEL", "info");
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    log::info!("MixAgent v{} starting", env!("CARGO_PKG_VERSION"));

    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config/show.json".into());
    let config = match ShowConfig::load(Path::new(&config_path)) {
        Ok(c) => c,
        Err(e) => {
            log::error!("Cannot load config file {}: {}", config_path, e);
            return 1;
        }
    };
    log::info!("Loaded config: {}", config_path);

    // Console adapter by type; port 0 defers to the protocol default
    let adapter: Arc<dyn ConsoleAdapter> = match config.console_type.as_str() {
        "x32" | "m32" => Arc::new(X32Adapter::new()),
        "wing" => Arc::new(WingAdapter::new()),
        "avantis" => Arc::new(AvantisAdapter::new()),
        other => {
            log::error!("Unknown console type: {}", other);
            return 1;
        }
    };
    log::info!(
        "Console: {} at {}:{}",
        config.console_type,
        config.console_ip,
        config.console_port
    );

    let mut llm_config = LlmConfig {
        anthropic_api_key: env_or("ANTHROPIC_API_KEY", ""),
        anthropic_model: env_or("MIXAGENT_MODEL", "claude-sonnet-4-20250514"),
        ollama_host: env_or("OLLAMA_HOST", "http://localhost:11434"),
        ollama_model: env_or("MIXAGENT_FALLBACK_MODEL", "llama3:8b"),
        ollama_primary: config.ollama_primary,
        temperature: config.llm_temperature,
        max_tokens: config.llm_max_tokens,
        prompt_dir: config.prompt_dir.clone(),
        active_genre: config.genre.clone(),
        ..LlmConfig::default()
    };
    llm_config.use_fallback = !llm_config.ollama_host.is_empty();

    // No key means fully local mode
    if llm_config.anthropic_api_key.is_empty() {
        llm_config.ollama_primary = true;
        log::info!("No ANTHROPIC_API_KEY set - using Ollama as primary LLM");
    }
    if llm_config.ollama_primary {
        log::info!("LLM mode: Ollama-primary ({})", llm_config.ollama_model);
    } else {
        log::info!("LLM mode: Anthropic-primary ({})", llm_config.anthropic_model);
    }

    let agent_config = AgentConfig {
        dsp_interval_ms: config.dsp_interval_ms,
        llm_interval_ms: config.llm_interval_ms,
        snapshot_interval_ms: config.snapshot_interval_ms,
        meter_refresh_ms: config.meter_refresh_ms,
        headless: config.headless,
        audio_device_id: config.audio_device_id,
        audio_channels: config.audio_channels,
        audio_sample_rate: config.audio_sample_rate,
        audio_fft_size: config.audio_fft_size,
        approval_mode: config.approval_mode(),
        genre: config.genre.clone(),
        preferences_file: config.preferences_file.clone(),
    };

    if !adapter.connect(&config.console_ip, config.console_port) {
        log::error!("Failed to connect to console");
        return 1;
    }

    // SIGINT and SIGTERM trigger graceful shutdown
    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = Arc::clone(&shutdown);
        if let Err(e) = ctrlc::set_handler(move || shutdown.store(true, Ordering::Relaxed)) {
            log::warn!("Could not install signal handler: {}", e);
        }
    }

    let agent = Agent::new(Arc::clone(&adapter), llm_config, agent_config);
    if !agent.start() {
        log::error!("Failed to start agent");
        adapter.disconnect();
        return 1;
    }

    log::info!("Agent running - press Ctrl+C to stop");

    // Block until the UI quits or a signal arrives
    while agent.is_running() && !shutdown.load(Ordering::Relaxed) {
        std::thread::sleep(Duration::from_millis(100));
    }

    agent.stop();
    adapter.disconnect();
    log::info!("MixAgent exited cleanly");
    0
}
