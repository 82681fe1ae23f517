//! Configuration file support

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};
use canvas_ai::providers::openai::OpenAIConfig;
use serde::{Deserialize, Serialize};

/// Prompt used when no `system_prompt_file` is configured
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a data analyst for a college professor. \
Use the database schema provided to you to answer questions about the data and create charts.";

/// Configuration for canvas-chat
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Chat-completion endpoint base URL
    pub base_url: Option<String>,
    /// Model to request
    pub model: Option<String>,
    /// API key (alternative to `AI_KEY`)
    pub api_key: Option<String>,
    /// Custom system prompt file path
    pub system_prompt_file: Option<String>,
    /// Upper bound for a single capability invocation, in seconds
    pub tool_timeout_secs: Option<u64>,
}

impl Config {
    /// Get the config directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("canvas-chat")
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("CANVAS_CHAT_CONFIG") {
            return PathBuf::from(path);
        }
        Self::config_dir().join("config.toml")
    }

    /// Load config from file, falling back to defaults
    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("Warning: Failed to parse config file: {}", e);
                    Self::default()
                }
            },
            Err(e) => {
                eprintln!("Warning: Failed to read config file: {}", e);
                Self::default()
            }
        }
    }

    /// Save config to file
    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }

        let content = toml::to_string_pretty(self).map_err(std::io::Error::other)?;
        fs::write(path, content)
    }

    /// Create a default config file if it doesn't exist
    pub fn init() -> std::io::Result<PathBuf> {
        let path = Self::config_path();
        if path.exists() {
            return Ok(path);
        }

        let default_config = Config {
            base_url: Some("https://api.openai.com/v1".to_string()),
            model: Some("gpt-4o-mini".to_string()),
            tool_timeout_secs: Some(30),
            ..Config::default()
        };

        default_config.save_to(&path)?;
        Ok(path)
    }

    /// Resolve backend settings: CLI flag, then config file, then environment
    pub fn backend_config(
        &self,
        base_url: Option<String>,
        model: Option<String>,
    ) -> anyhow::Result<OpenAIConfig> {
        let Some(base_url) = resolve(base_url, &self.base_url, "AI_URL") else {
            bail!("No endpoint configured: pass --base-url, set base_url in the config file or AI_URL");
        };
        let Some(model) = resolve(model, &self.model, "AI_MODEL") else {
            bail!("No model configured: pass --model, set model in the config file or AI_MODEL");
        };
        let Some(api_key) = resolve(None, &self.api_key, "AI_KEY") else {
            bail!("No API key configured: set api_key in the config file or AI_KEY");
        };
        Ok(OpenAIConfig::new(base_url, api_key, model))
    }

    /// The system prompt, read from `system_prompt_file` when set
    pub fn system_prompt(&self) -> anyhow::Result<String> {
        let Some(file) = &self.system_prompt_file else {
            return Ok(DEFAULT_SYSTEM_PROMPT.to_string());
        };
        let path = expand_home(file);
        let prompt = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read system prompt file {}", path.display()))?;
        Ok(prompt.trim().to_string())
    }

    pub fn tool_timeout(&self) -> Option<Duration> {
        self.tool_timeout_secs.map(Duration::from_secs)
    }
}

/// First non-blank value among flag, file and environment
fn resolve(flag: Option<String>, file: &Option<String>, env_var: &str) -> Option<String> {
    let non_blank = |value: &String| !value.trim().is_empty();
    flag.filter(non_blank)
        .or_else(|| file.clone().filter(non_blank))
        .or_else(|| std::env::var(env_var).ok().filter(non_blank))
}

fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

/// Generate example config content
pub fn example_config() -> &'static str {
    r#"# canvas-chat configuration file
# Place at ~/.config/canvas-chat/config.toml (Linux) or set CANVAS_CHAT_CONFIG

# OpenAI-compatible endpoint (falls back to AI_URL)
base_url = "https://api.openai.com/v1"

# Model to request (falls back to AI_MODEL)
model = "gpt-4o-mini"

# API key (optional - AI_KEY is read when unset)
# api_key = "sk-..."

# Custom system prompt file (optional)
# system_prompt_file = "~/.config/canvas-chat/system_prompt.txt"

# Upper bound for a single capability invocation, in seconds
tool_timeout_secs = 30
"#
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("canvas-chat-config-{}", uuid::Uuid::new_v4()))
            .join(name)
    }

    #[test]
    fn test_example_config_parses() {
        let config: Config = toml::from_str(example_config()).unwrap();
        assert_eq!(config.model.as_deref(), Some("gpt-4o-mini"));
        assert_eq!(config.tool_timeout(), Some(Duration::from_secs(30)));
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: Config = toml::from_str("model = \"llama3\"").unwrap();
        assert_eq!(config.model.as_deref(), Some("llama3"));
        assert!(config.base_url.is_none());
        assert!(config.tool_timeout().is_none());
    }

    #[test]
    fn test_save_and_load() {
        let path = temp_path("config.toml");
        let config = Config {
            base_url: Some("http://localhost:11434/v1".into()),
            model: Some("llama3".into()),
            ..Config::default()
        };
        config.save_to(&path).unwrap();

        assert_eq!(Config::load_from(&path), config);
        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_missing_or_broken_file_falls_back() {
        let path = temp_path("config.toml");
        assert_eq!(Config::load_from(&path), Config::default());

        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "model = [").unwrap();
        assert_eq!(Config::load_from(&path), Config::default());
        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_resolve_precedence() {
        let file = Some("from-file".to_string());
        let unset = "CANVAS_CHAT_TEST_UNSET_VARIABLE";

        assert_eq!(
            resolve(Some("from-flag".into()), &file, unset).as_deref(),
            Some("from-flag")
        );
        assert_eq!(resolve(None, &file, unset).as_deref(), Some("from-file"));
        assert_eq!(resolve(None, &None, unset), None);
        assert_eq!(resolve(Some("  ".into()), &None, unset), None);
    }

    #[test]
    fn test_resolve_skips_blank_sources() {
        let var = "CANVAS_CHAT_TEST_BLANK_FALLBACK";
        // SAFETY: variable name is unique to this test
        unsafe { std::env::set_var(var, "from-env") };

        assert_eq!(
            resolve(Some(String::new()), &Some("from-file".into()), var).as_deref(),
            Some("from-file")
        );
        assert_eq!(resolve(None, &Some("".into()), var).as_deref(), Some("from-env"));
        assert_eq!(
            resolve(Some(" ".into()), &Some("\t".into()), var).as_deref(),
            Some("from-env")
        );

        unsafe { std::env::remove_var(var) };
        assert_eq!(resolve(None, &Some("".into()), var), None);
    }

    #[test]
    fn test_backend_config_from_file() {
        let config = Config {
            base_url: Some("http://localhost:8080/v1".into()),
            model: Some("file-model".into()),
            api_key: Some("file-key".into()),
            ..Config::default()
        };

        let resolved = config
            .backend_config(None, Some("flag-model".into()))
            .unwrap();
        assert_eq!(resolved.base_url, "http://localhost:8080/v1");
        assert_eq!(resolved.model, "flag-model");
        assert_eq!(resolved.api_key, "file-key");
    }

    #[test]
    fn test_system_prompt_default_and_file() {
        assert_eq!(Config::default().system_prompt().unwrap(), DEFAULT_SYSTEM_PROMPT);

        let path = temp_path("prompt.txt");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "  Answer in haiku.\n").unwrap();
        let config = Config {
            system_prompt_file: Some(path.display().to_string()),
            ..Config::default()
        };
        assert_eq!(config.system_prompt().unwrap(), "Answer in haiku.");

        let missing = Config {
            system_prompt_file: Some(temp_path("nope.txt").display().to_string()),
            ..Config::default()
        };
        assert!(missing.system_prompt().is_err());
        let _ = fs::remove_dir_all(path.parent().unwrap());
    }
}
