use crate::keybind::{parse_keybind, Keybind};
use serde::{Deserialize, Serialize};

/// Viewport corner the surface anchors itself to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Position {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

impl Default for Position {
    fn default() -> Self {
        Position::TopRight
    }
}

impl Position {
    pub fn as_str(&self) -> &'static str {
        match self {
            Position::TopLeft => "top-left",
            Position::TopRight => "top-right",
            Position::BottomLeft => "bottom-left",
            Position::BottomRight => "bottom-right",
        }
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AskBarConfig {
    /// Whether the overlay feature is active at all. When disabled, show
    /// requests are no-ops and a visible surface is torn down.
    #[serde(default = "default_enabled")]
    pub is_enabled: bool,
    /// Toggle keybind string, e.g. "Cmd+F". Defaults apply when the field is
    /// missing or fails to parse.
    #[serde(default = "default_keybind")]
    pub keybind: String,
    #[serde(default)]
    pub position: Position,
}

impl Default for AskBarConfig {
    fn default() -> Self {
        Self {
            is_enabled: default_enabled(),
            keybind: default_keybind(),
            position: Position::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Features {
    #[serde(default)]
    pub ask_bar: AskBarConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub features: Features,
    /// When enabled the logger initialises at debug level. Defaults to
    /// `false` when the field is missing in the settings file.
    #[serde(default)]
    pub debug_logging: bool,
}

fn default_enabled() -> bool {
    true
}

fn default_keybind() -> String {
    "Cmd+F".to_string()
}

impl Settings {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path).unwrap_or_default();
        if content.is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, path: &str) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Parse the configured toggle keybind, falling back to the default
    /// binding when the string is invalid.
    pub fn ask_bar_keybind(&self) -> Keybind {
        let raw = &self.features.ask_bar.keybind;
        match parse_keybind(raw) {
            Some(k) => k,
            None => {
                tracing::warn!(
                    "provided keybind string '{}' is invalid; using default Cmd+F",
                    raw
                );
                Keybind::default()
            }
        }
    }
}
