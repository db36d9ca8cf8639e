use anyhow::{bail, Context, Result};
use chrono::{FixedOffset, Local, Offset};
use std::path::PathBuf;

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";
pub const DEFAULT_ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com/v1";
pub const DEFAULT_ANTHROPIC_MODEL: &str = "claude-sonnet-4-20250514";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreMode {
    /// SQLite file inside a workspace directory.
    Workspace,
    /// In-memory store seeded with demo users; nothing survives the process.
    Demo,
}

#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
}

#[derive(Debug, Clone)]
pub struct AiConfig {
    pub openai: ProviderConfig,
    pub anthropic: ProviderConfig,
    pub timeout_secs: u64,
    pub max_tokens: u32,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub mode: StoreMode,
    pub workspace: Option<PathBuf>,
    /// Viewer wall-clock offset used when a request does not carry one.
    pub default_offset: FixedOffset,
    pub ai: AiConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let mode = match get("EDUCATORD_MODE").as_deref() {
            None | Some("workspace") => StoreMode::Workspace,
            Some("demo") => StoreMode::Demo,
            Some(other) => bail!("EDUCATORD_MODE must be 'workspace' or 'demo', got '{}'", other),
        };

        let default_offset = match get("EDUCATORD_UTC_OFFSET_MINUTES") {
            Some(raw) => {
                let minutes: i32 = raw
                    .parse()
                    .with_context(|| format!("EDUCATORD_UTC_OFFSET_MINUTES: '{}'", raw))?;
                offset_from_minutes(minutes).with_context(|| {
                    format!("EDUCATORD_UTC_OFFSET_MINUTES out of range: {}", minutes)
                })?
            }
            None => Local::now().offset().fix(),
        };

        let timeout_secs = match get("EDUCATORD_AI_TIMEOUT_SECS") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("EDUCATORD_AI_TIMEOUT_SECS: '{}'", raw))?,
            None => 60,
        };
        let max_tokens = match get("EDUCATORD_AI_MAX_TOKENS") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("EDUCATORD_AI_MAX_TOKENS: '{}'", raw))?,
            None => 1024,
        };

        Ok(Self {
            mode,
            workspace: get("EDUCATORD_WORKSPACE").map(PathBuf::from),
            default_offset,
            ai: AiConfig {
                openai: ProviderConfig {
                    api_key: get("OPENAI_API_KEY"),
                    base_url: get("OPENAI_BASE_URL")
                        .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
                    model: get("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
                },
                anthropic: ProviderConfig {
                    api_key: get("ANTHROPIC_API_KEY"),
                    base_url: get("ANTHROPIC_BASE_URL")
                        .unwrap_or_else(|| DEFAULT_ANTHROPIC_BASE_URL.to_string()),
                    model: get("ANTHROPIC_MODEL")
                        .unwrap_or_else(|| DEFAULT_ANTHROPIC_MODEL.to_string()),
                },
                timeout_secs,
                max_tokens,
            },
        })
    }
}

/// UTC offsets run from -12:00 to +14:00.
pub fn offset_from_minutes(minutes: i32) -> Option<FixedOffset> {
    if !(-12 * 60..=14 * 60).contains(&minutes) {
        return None;
    }
    FixedOffset::east_opt(minutes * 60)
}

pub fn validate(cfg: &Config) -> Result<()> {
    if cfg.mode == StoreMode::Demo && cfg.workspace.is_some() {
        bail!("EDUCATORD_WORKSPACE cannot be combined with EDUCATORD_MODE=demo");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn cfg(pairs: &[(&str, &str)]) -> Result<Config> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let c = cfg(&[("EDUCATORD_UTC_OFFSET_MINUTES", "0")]).unwrap();
        assert_eq!(c.mode, StoreMode::Workspace);
        assert!(c.workspace.is_none());
        assert_eq!(c.default_offset.local_minus_utc(), 0);
        assert_eq!(c.ai.openai.model, DEFAULT_OPENAI_MODEL);
        assert_eq!(c.ai.anthropic.base_url, DEFAULT_ANTHROPIC_BASE_URL);
        assert!(c.ai.openai.api_key.is_none());
        assert_eq!(c.ai.max_tokens, 1024);
    }

    #[test]
    fn blank_keys_count_as_unset() {
        let c = cfg(&[("OPENAI_API_KEY", "  "), ("EDUCATORD_MODE", "demo")]).unwrap();
        assert!(c.ai.openai.api_key.is_none());
        assert_eq!(c.mode, StoreMode::Demo);
    }

    #[test]
    fn bad_values_are_startup_errors() {
        assert!(cfg(&[("EDUCATORD_MODE", "cloud")]).is_err());
        assert!(cfg(&[("EDUCATORD_UTC_OFFSET_MINUTES", "-900")]).is_err());
        assert!(cfg(&[("EDUCATORD_AI_TIMEOUT_SECS", "soon")]).is_err());

        let c = cfg(&[("EDUCATORD_MODE", "demo"), ("EDUCATORD_WORKSPACE", "/tmp/x")]).unwrap();
        assert!(validate(&c).is_err());
    }

    #[test]
    fn offsets_accept_real_world_range() {
        assert_eq!(offset_from_minutes(330).unwrap().local_minus_utc(), 330 * 60);
        assert!(offset_from_minutes(14 * 60).is_some());
        assert!(offset_from_minutes(15 * 60).is_none());
    }
}
