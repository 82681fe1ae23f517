//! Persistent input history

use std::fs;
use std::path::PathBuf;

/// Number of distinct inputs kept
pub const MAX_ENTRIES: usize = 50;

/// Recently sent inputs, newest first, without duplicates
#[derive(Debug, Default)]
pub struct InputHistory {
    entries: Vec<String>,
    path: Option<PathBuf>,
}

impl InputHistory {
    /// `<data_dir>/canvas-chat/history.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::data_dir().map(|dir| dir.join("canvas-chat").join("history.json"))
    }

    /// History that is never written to disk
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load history from `path`; a missing or unreadable file starts empty
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str::<Vec<String>>(&content).unwrap_or_else(|e| {
                tracing::warn!("Ignoring unreadable input history {}: {}", path.display(), e);
                Vec::new()
            }),
            Err(_) => Vec::new(),
        };

        let mut history = Self {
            entries: Vec::new(),
            path: Some(path),
        };
        // Oldest first so the newest ends up in front
        for entry in entries.iter().rev() {
            history.push(entry);
        }
        history
    }

    /// Record an input as the newest entry
    pub fn record(&mut self, input: &str) {
        self.push(input);
        if let Err(e) = self.save() {
            tracing::warn!("Failed to save input history: {}", e);
        }
    }

    fn push(&mut self, input: &str) {
        let input = input.trim();
        if input.is_empty() {
            return;
        }
        self.entries.retain(|entry| entry != input);
        self.entries.insert(0, input.to_string());
        self.entries.truncate(MAX_ENTRIES);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        if let Err(e) = self.save() {
            tracing::warn!("Failed to save input history: {}", e);
        }
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    fn save(&self) -> std::io::Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let content = serde_json::to_string_pretty(&self.entries).map_err(std::io::Error::other)?;
        fs::write(path, content)
    }
}
