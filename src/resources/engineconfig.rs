//! Engine configuration resource.
//!
//! Runtime tunables loaded from an INI file. Provides defaults for safe
//! startup and methods to load/save configuration.
//!
//! # Configuration File Format
//!
//! ```ini
//! [events]
//! mailbox_capacity = 256
//! target_cooldown = 0.2
//! stage_cooldown = 0.2
//!
//! [clock]
//! time_scale = 1.0
//!
//! [render]
//! layer_sort = manual
//!
//! [faults]
//! on_setup = continue
//! on_tick = reset
//! backtraces = true
//! ```

use configparser::ini::Ini;
use log::{info, warn};
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

const DEFAULT_MAILBOX_CAPACITY: usize = 256;
const DEFAULT_TARGET_COOLDOWN: f64 = 0.2;
const DEFAULT_STAGE_COOLDOWN: f64 = 0.2;
const DEFAULT_TIME_SCALE: f64 = 1.0;
const DEFAULT_CONFIG_PATH: &str = "./spritecore.ini";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load config file: {0}")]
    Load(String),
    #[error("failed to save config file: {0}")]
    Save(String),
}

/// What happens after a script fault has been logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultAction {
    /// Keep running; only the faulting thread is gone.
    Continue,
    /// Full reset: every thread aborted, every shape torn down.
    Reset,
    /// Raise the engine's quit flag.
    Exit,
}

impl FromStr for FaultAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "continue" | "log" => Ok(FaultAction::Continue),
            "reset" => Ok(FaultAction::Reset),
            "exit" | "quit" => Ok(FaultAction::Exit),
            other => Err(format!("unknown fault action '{other}'")),
        }
    }
}

/// Fault escalation, split by whether the fault happened while the game
/// was still being set up or during steady-state ticking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaultPolicy {
    pub on_setup: FaultAction,
    pub on_tick: FaultAction,
    /// Capture a backtrace when a script reports a fault.
    pub backtraces: bool,
}

impl Default for FaultPolicy {
    fn default() -> Self {
        Self {
            on_setup: FaultAction::Continue,
            on_tick: FaultAction::Reset,
            backtraces: true,
        }
    }
}

impl FaultPolicy {
    pub fn action(&self, during_setup: bool) -> FaultAction {
        if during_setup {
            self.on_setup
        } else {
            self.on_tick
        }
    }
}

/// How sprite render order is decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LayerSortMode {
    /// Order is whatever scripts made it via front/back/shift calls.
    #[default]
    Manual,
    /// Sprites further down the screen (larger y) render in front.
    Vertical,
}

impl FromStr for LayerSortMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "manual" | "none" => Ok(LayerSortMode::Manual),
            "vertical" | "y" => Ok(LayerSortMode::Vertical),
            other => Err(format!("unknown layer sort mode '{other}'")),
        }
    }
}

impl LayerSortMode {
    fn as_str(&self) -> &'static str {
        match self {
            LayerSortMode::Manual => "manual",
            LayerSortMode::Vertical => "vertical",
        }
    }
}

impl FaultAction {
    fn as_str(&self) -> &'static str {
        match self {
            FaultAction::Continue => "continue",
            FaultAction::Reset => "reset",
            FaultAction::Exit => "exit",
        }
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Fixed capacity of the event mailbox.
    pub mailbox_capacity: usize,
    /// Seconds during which a second click on the same shape is ignored.
    pub target_cooldown: f64,
    /// Seconds during which a second stage click is ignored.
    pub stage_cooldown: f64,
    pub time_scale: f64,
    pub layer_sort: LayerSortMode,
    pub faults: FaultPolicy,
    /// Path to the configuration file.
    pub config_path: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineConfig {
    /// Create a new configuration with safe default values.
    pub fn new() -> Self {
        Self {
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
            target_cooldown: DEFAULT_TARGET_COOLDOWN,
            stage_cooldown: DEFAULT_STAGE_COOLDOWN,
            time_scale: DEFAULT_TIME_SCALE,
            layer_sort: LayerSortMode::Manual,
            faults: FaultPolicy::default(),
            config_path: PathBuf::from(DEFAULT_CONFIG_PATH),
        }
    }

    /// Create a new configuration with a custom config file path.
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: path.into(),
            ..Self::new()
        }
    }

    /// Load configuration from the INI file.
    ///
    /// Missing values retain their current (default) values. Unparseable
    /// enum values are logged and ignored.
    pub fn load_from_file(&mut self) -> Result<(), ConfigError> {
        let mut config = Ini::new();
        config.load(&self.config_path).map_err(ConfigError::Load)?;
        self.apply(&config);
        Ok(())
    }

    /// Load configuration from INI text.
    pub fn load_from_str(&mut self, text: &str) -> Result<(), ConfigError> {
        let mut config = Ini::new();
        config.read(text.to_string()).map_err(ConfigError::Load)?;
        self.apply(&config);
        Ok(())
    }

    fn apply(&mut self, config: &Ini) {
        // [events] section
        if let Some(capacity) = config.getuint("events", "mailbox_capacity").ok().flatten() {
            // A zero-capacity mailbox would be a rendezvous channel, which blocks producers.
            self.mailbox_capacity = (capacity as usize).max(1);
        }
        if let Some(cooldown) = config.getfloat("events", "target_cooldown").ok().flatten() {
            self.target_cooldown = cooldown.max(0.0);
        }
        if let Some(cooldown) = config.getfloat("events", "stage_cooldown").ok().flatten() {
            self.stage_cooldown = cooldown.max(0.0);
        }

        // [clock] section
        if let Some(scale) = config.getfloat("clock", "time_scale").ok().flatten() {
            self.time_scale = scale;
        }

        // [render] section
        if let Some(mode) = config.get("render", "layer_sort") {
            match mode.parse() {
                Ok(mode) => self.layer_sort = mode,
                Err(e) => warn!("Ignoring [render] layer_sort: {}", e),
            }
        }

        // [faults] section
        if let Some(action) = config.get("faults", "on_setup") {
            match action.parse() {
                Ok(action) => self.faults.on_setup = action,
                Err(e) => warn!("Ignoring [faults] on_setup: {}", e),
            }
        }
        if let Some(action) = config.get("faults", "on_tick") {
            match action.parse() {
                Ok(action) => self.faults.on_tick = action,
                Err(e) => warn!("Ignoring [faults] on_tick: {}", e),
            }
        }
        if let Some(backtraces) = config.getbool("faults", "backtraces").ok().flatten() {
            self.faults.backtraces = backtraces;
        }

        info!(
            "Loaded config: mailbox={}, cooldowns={}/{}s, time_scale={}, layer_sort={:?}, faults={:?}",
            self.mailbox_capacity,
            self.target_cooldown,
            self.stage_cooldown,
            self.time_scale,
            self.layer_sort,
            self.faults
        );
    }

    /// Save configuration to the INI file.
    ///
    /// Creates the file if it doesn't exist.
    pub fn save_to_file(&self) -> Result<(), ConfigError> {
        let mut config = Ini::new();

        config.set("events", "mailbox_capacity", Some(self.mailbox_capacity.to_string()));
        config.set("events", "target_cooldown", Some(self.target_cooldown.to_string()));
        config.set("events", "stage_cooldown", Some(self.stage_cooldown.to_string()));
        config.set("clock", "time_scale", Some(self.time_scale.to_string()));
        config.set("render", "layer_sort", Some(self.layer_sort.as_str().to_string()));
        config.set("faults", "on_setup", Some(self.faults.on_setup.as_str().to_string()));
        config.set("faults", "on_tick", Some(self.faults.on_tick.as_str().to_string()));
        config.set("faults", "backtraces", Some(self.faults.backtraces.to_string()));

        config
            .write(&self.config_path)
            .map_err(|e| ConfigError::Save(e.to_string()))?;

        info!("Saved config to {:?}", self.config_path);

        Ok(())
    }
}
