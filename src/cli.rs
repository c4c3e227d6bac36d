//! Command-line interface for the tarot adviser
//!
//! Provides argument parsing, inline card/spread specs, interactive input
//! and the configuration template.

use crate::adviser::{AdviseRequest, CardInput, SpreadInput};
use crate::client::StubMode;
use crate::error::{AppError, AppResult};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

/// Spread name used when none is given
pub const CUSTOM_SPREAD: &str = "Custom";

/// Resilient tarot reading generation
#[derive(Parser)]
#[command(name = "tarot-adviser")]
#[command(version)]
#[command(about = "Resilient tarot reading generation over unreliable text-generation backends")]
#[command(
    long_about = "tarot-adviser turns a question and a set of drawn cards into a structured \
    reading, using a remote text-generation backend when credentials are available and a \
    deterministic local reading otherwise."
)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml", global = true)]
    pub config: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the generation pipeline directly against one backend
    Read(ReadArgs),

    /// Generate a reading with caching, retries and fallback
    Advise(AdviseArgs),

    /// Serve the HTTP API
    Serve {
        /// Override `server.host`
        #[arg(long)]
        host: Option<String>,

        /// Override `server.port`
        #[arg(long)]
        port: Option<u16>,
    },

    /// Generate a template configuration file
    Config {
        /// Output file path (prints to stdout if not specified)
        #[arg(short, long)]
        output: Option<String>,
    },
}

/// Backend for the `read` command
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReadBackend {
    Stub,
    Openai,
}

impl ReadBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadBackend::Stub => "stub",
            ReadBackend::Openai => "openai",
        }
    }
}

/// Stub behavior for the `read` command
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    Valid,
    Invalid,
}

impl From<ModeArg> for StubMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Valid => StubMode::Valid,
            ModeArg::Invalid => StubMode::Invalid,
        }
    }
}

/// Request inputs shared by `read` and `advise`
#[derive(Debug, Clone, Default, Args)]
pub struct InputArgs {
    /// Question text
    #[arg(short, long)]
    pub question: Option<String>,

    /// Cards as "NAME@POS@SLOT,..." (POS: upright|reversed)
    #[arg(long)]
    pub cards: Option<String>,

    /// Spread as "NAME:slot1,slot2" (name optional)
    #[arg(long)]
    pub spread: Option<String>,

    /// User identifier echoed in the result
    #[arg(short, long)]
    pub user: Option<String>,

    /// Remote backend key (falls back to OPENAI_API_KEY)
    #[arg(long)]
    pub api_key: Option<String>,

    /// Remote model (falls back to OPENAI_MODEL)
    #[arg(long)]
    pub model: Option<String>,

    /// Output language: "ja" or anything else for English
    #[arg(long)]
    pub locale: Option<String>,

    /// Read the whole request from a JSON file
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Print only the reading summary
    #[arg(long)]
    pub summary: bool,
}

#[derive(Debug, Clone, Args)]
pub struct ReadArgs {
    #[command(flatten)]
    pub input: InputArgs,

    #[arg(long, value_enum, default_value_t = ReadBackend::Stub)]
    pub backend: ReadBackend,

    /// Stub client behavior
    #[arg(long, value_enum, default_value_t = ModeArg::Valid)]
    pub mode: ModeArg,
}

#[derive(Debug, Clone, Args)]
pub struct AdviseArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Backend preference (defaults to `adviser.backend`)
    #[arg(long, value_parser = ["auto", "stub", "openai"])]
    pub backend: Option<String>,
}

impl InputArgs {
    /// True when the request is described by flags rather than prompts
    pub fn has_inline_input(&self) -> bool {
        self.question.is_some() || self.cards.is_some() || self.spread.is_some()
    }

    /// Build the request from `--input` or inline flags
    ///
    /// Returns `Ok(None)` when neither is present and the caller should
    /// prompt interactively. Key, model and locale flags override values
    /// from the input file.
    pub fn to_request(&self) -> AppResult<Option<AdviseRequest>> {
        let request = if let Some(path) = &self.input {
            read_request_file(path)?
        } else if self.has_inline_input() {
            let cards = self.cards.as_deref().map(parse_cards_spec).unwrap_or_default();
            let spread = match self.spread.as_deref() {
                Some(spec) => parse_spread_spec(spec),
                None => derive_spread(&cards),
            };
            AdviseRequest {
                question: Some(self.question.clone().unwrap_or_default()),
                cards: Some(cards),
                spread: Some(spread),
                user_id: self.user.clone(),
                ..AdviseRequest::default()
            }
        } else {
            return Ok(None);
        };
        Ok(Some(self.apply_overrides(request)))
    }

    /// Apply key, model and locale flags to a request
    pub fn apply_overrides(&self, mut request: AdviseRequest) -> AdviseRequest {
        if self.api_key.is_some() {
            request.api_key = self.api_key.clone();
        }
        if self.model.is_some() {
            request.model = self.model.clone();
        }
        if self.locale.is_some() {
            request.locale = self.locale.clone();
        }
        request
    }
}

fn read_request_file(path: &Path) -> AppResult<AdviseRequest> {
    let path_display = path.display().to_string();
    let content = std::fs::read_to_string(path).map_err(|source| AppError::InputRead {
        path: path_display.clone(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| AppError::InputParse {
        path: path_display,
        source,
    })
}

/// Parse "NAME@POS@SLOT,..." into cards
///
/// Fields may also be separated by `:`, `/` or `|`. A missing position
/// means upright; blank chunks are skipped.
pub fn parse_cards_spec(spec: &str) -> Vec<CardInput> {
    spec.split(',')
        .map(str::trim)
        .filter(|chunk| !chunk.is_empty())
        .map(|chunk| {
            let mut parts = chunk.split(['@', ':', '/', '|']).map(str::trim);
            let name = parts.next().unwrap_or_default();
            let position = parts
                .next()
                .filter(|p| !p.is_empty())
                .unwrap_or("upright");
            let card = CardInput::new(name, position);
            match parts.next().filter(|s| !s.is_empty()) {
                Some(slot) => card.with_slot(slot),
                None => card,
            }
        })
        .collect()
}

/// Parse "NAME:slot1,slot2", ":slot1,slot2" or "slot1,slot2"
pub fn parse_spread_spec(spec: &str) -> SpreadInput {
    let (name, slots) = match spec.split_once(':') {
        Some((name, slots)) => {
            let name = name.trim();
            (if name.is_empty() { CUSTOM_SPREAD } else { name }, slots)
        }
        None => (CUSTOM_SPREAD, spec),
    };
    let slots = slots
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect();
    SpreadInput::new(name, slots)
}

/// `Custom` spread whose slots are the distinct card slots, in order
pub fn derive_spread(cards: &[CardInput]) -> SpreadInput {
    let mut slots: Vec<String> = Vec::new();
    for slot in cards.iter().filter_map(|c| c.slot.as_deref()) {
        let slot = slot.trim();
        if !slot.is_empty() && !slots.iter().any(|s| s == slot) {
            slots.push(slot.to_string());
        }
    }
    SpreadInput::new(CUSTOM_SPREAD, slots)
}

/// Ask for question, cards, spread name and user id
///
/// Cards are entered one at a time; a blank name or any answer other than
/// "y"/"yes" to "Add another?" ends the list.
pub fn prompt_interactive<R: BufRead, W: Write>(
    reader: &mut R,
    writer: &mut W,
) -> AppResult<AdviseRequest> {
    let question = ask(reader, writer, "Question: ")?;

    let mut cards = Vec::new();
    writeln!(writer, "Enter cards (blank name to finish):")?;
    loop {
        let name = ask(reader, writer, "  Card name: ")?;
        if name.is_empty() {
            break;
        }
        let position = ask(reader, writer, "  Position (upright/reversed) [upright]: ")?;
        let position = if position.is_empty() {
            "upright".to_string()
        } else {
            position
        };
        let slot = ask(
            reader,
            writer,
            "  Slot label (e.g., present/challenge/outcome): ",
        )?;
        cards.push(CardInput::new(name, position).with_slot(slot));

        let more = ask(reader, writer, "  Add another? (y/N): ")?.to_ascii_lowercase();
        if more != "y" && more != "yes" {
            break;
        }
    }

    let spread_name = ask(reader, writer, &format!("Spread name [{}]: ", CUSTOM_SPREAD))?;
    let mut spread = derive_spread(&cards);
    if !spread_name.is_empty() {
        spread.name = Some(spread_name);
    }

    let user_id = ask(reader, writer, "User ID (optional): ")?;

    Ok(AdviseRequest {
        question: Some(question),
        cards: Some(cards),
        spread: Some(spread),
        user_id: (!user_id.is_empty()).then_some(user_id),
        ..AdviseRequest::default()
    })
}

fn ask<R: BufRead, W: Write>(reader: &mut R, writer: &mut W, prompt: &str) -> AppResult<String> {
    write!(writer, "{}", prompt)?;
    writer.flush()?;
    let mut line = String::new();
    reader.read_line(&mut line)?;
    Ok(line.trim().to_string())
}

/// Generate template configuration content
pub fn generate_config_template() -> &'static str {
    r#"# tarot-adviser Configuration
# ===========================
#
# Every section and key is optional; omitted values take the defaults
# shown here.

# ─────────────────────────────────────────────────────────────────────────────
# ADVISER
# ─────────────────────────────────────────────────────────────────────────────

[adviser]
# Backend when a request does not name one:
#   - "auto":   remote when an API key is available, local readings otherwise
#   - "stub":   always use local deterministic readings
#   - "openai": always try the remote backend (falls back on failure)
backend = "auto"

# Remote model (OPENAI_MODEL overrides the default)
model = "gpt-4o-mini"

# Output language: "ja" for Japanese, anything else for English
locale = "ja"

# Per-attempt timeout for remote generation in milliseconds (max 300000)
timeout_ms = 20000

# ─────────────────────────────────────────────────────────────────────────────
# RETRY
# ─────────────────────────────────────────────────────────────────────────────
#
# Backoff before retry n (0-indexed) is base_ms * factor^n, optionally
# spread by +/-20% jitter.

[retry]
# Retries after the first attempt (0-10)
max_retries = 2

# Backoff before the first retry in milliseconds
base_ms = 500

# Backoff growth factor (>= 1.0)
factor = 2.0

# Randomize backoff to avoid synchronized retries
jitter = true

# ─────────────────────────────────────────────────────────────────────────────
# CACHE
# ─────────────────────────────────────────────────────────────────────────────

[cache]
# Reuse results for identical requests
enabled = true

# Lifetime of cached results in seconds
ttl_seconds = 60

# ─────────────────────────────────────────────────────────────────────────────
# REMOTE BACKEND
# ─────────────────────────────────────────────────────────────────────────────

[openai]
# OpenAI-compatible API base URL (OPENAI_BASE_URL overrides the default)
base_url = "https://api.openai.com/v1"

# Sampling temperature (0.0-2.0)
temperature = 0.2

# API key; prefer the OPENAI_API_KEY environment variable
# api_key = "sk-..."

# ─────────────────────────────────────────────────────────────────────────────
# SERVER
# ─────────────────────────────────────────────────────────────────────────────

[server]
# IP address to bind to (0.0.0.0 for all interfaces)
host = "127.0.0.1"

# Port to listen on
port = 3000

# ─────────────────────────────────────────────────────────────────────────────
# OBSERVABILITY
# ─────────────────────────────────────────────────────────────────────────────

[observability]
# Log level: trace, debug, info, warn, error (RUST_LOG takes precedence)
log_level = "info"
"#
}
