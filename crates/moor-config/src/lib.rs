//! Configuration for moor attach sessions.

/// Default escape sequence for detaching from a session.
pub const DEFAULT_DETACH_KEYS: &str = "ctrl-p,ctrl-q";

/// Main configuration structure.
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct Config {
    /// Key sequence that detaches from a session without stopping the
    /// container. Format: comma-separated keys, e.g. "ctrl-p,ctrl-q".
    pub detach_keys: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            detach_keys: DEFAULT_DETACH_KEYS.to_string(),
        }
    }
}

/// Returns the config file path: ~/.config/moor/config.toml
#[must_use]
pub fn config_path() -> std::path::PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("~/.config"))
        .join("moor")
        .join("config.toml")
}

/// Load configuration from default path, falling back to defaults if not found.
pub fn load() -> eyre::Result<Config> {
    let path = config_path();
    if path.exists() {
        let content = std::fs::read_to_string(&path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    } else {
        Ok(Config::default())
    }
}

/// Parse a detach-keys string like "ctrl-p,ctrl-q" into the raw byte
/// sequence the input scanner matches against.
///
/// Each comma-separated key is either `ctrl-<key>` (letters and `@[\]^_`,
/// mapped to the corresponding control byte), a single printable ASCII
/// character, or one of the names `esc` / `del`.
pub fn parse_detach_keys(s: &str) -> eyre::Result<Vec<u8>> {
    let mut bytes = Vec::new();
    for key in s.split(',') {
        let key = key.trim();
        if key.is_empty() {
            eyre::bail!("empty key in detach sequence: {s}");
        }
        let lower = key.to_ascii_lowercase();
        if let Some(ctrl) = lower.strip_prefix("ctrl-") {
            let mut chars = ctrl.chars();
            let (Some(c), None) = (chars.next(), chars.next()) else {
                eyre::bail!("invalid ctrl key: {key}");
            };
            let c = c.to_ascii_uppercase();
            if !matches!(c, 'A'..='Z' | '@' | '[' | '\\' | ']' | '^' | '_') {
                eyre::bail!("invalid ctrl key: {key}");
            }
            bytes.push(c as u8 & 0x1f);
        } else if lower == "esc" {
            bytes.push(0x1b);
        } else if lower == "del" {
            bytes.push(0x7f);
        } else {
            let mut chars = key.chars();
            let (Some(c), None) = (chars.next(), chars.next()) else {
                eyre::bail!("invalid key: {key}");
            };
            if !c.is_ascii_graphic() && c != ' ' {
                eyre::bail!("invalid key: {key}");
            }
            bytes.push(c as u8);
        }
    }
    Ok(bytes)
}
