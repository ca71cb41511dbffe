// RDB - Replay Debugger
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Configuration system for the RDB TUI
//!
//! Manages user preferences including color schemes and panel settings. The
//! file lives at `~/.rdb.toml` unless [`RDB_CONFIG_PATH`] points elsewhere.

use eyre::{Context, Result};
use ratatui::style::Color;
use rdb_common::env::RDB_CONFIG_PATH;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fs, path::PathBuf};
use tracing::{debug, info, warn};

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Current theme configuration
    pub theme: ThemeConfig,
    /// Panel-specific settings
    pub panels: PanelConfig,
}

/// Theme configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThemeConfig {
    /// Current active theme name
    pub active: String,
    /// Available themes
    pub themes: HashMap<String, Theme>,
}

/// Individual theme definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Theme {
    /// Theme display name
    pub name: String,
    /// Theme description
    pub description: String,
    /// Color scheme for different UI elements
    pub colors: ColorScheme,
}

/// Color scheme definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorScheme {
    /// Panel border color
    pub border: String,
    /// Panel title color
    pub title: String,
    /// Current line background
    pub highlight_bg: String,
    /// Current line foreground
    pub highlight_fg: String,
    /// Line number color
    pub line_number: String,
    /// Help text color
    pub help_text: String,
    /// Success/positive color
    pub success: String,
    /// Error/negative color
    pub error: String,
    /// Warning color
    pub warning: String,
    /// Information color
    pub info: String,
}

/// Panel-specific configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PanelConfig {
    /// Source panel settings
    pub source: SourcePanelConfig,
    /// Variables panel settings
    pub variables: VariablesPanelConfig,
    /// Bytecode panel settings
    pub bytecode: BytecodePanelConfig,
}

/// Source panel configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourcePanelConfig {
    /// Show line numbers
    pub show_line_numbers: bool,
    /// Rows kept visible above the current line
    pub context_rows: u16,
}

/// Variables panel configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariablesPanelConfig {
    /// Show the global namespace next to the locals of a function frame
    pub show_globals: bool,
}

/// Bytecode panel configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BytecodePanelConfig {
    /// Instructions kept visible above the current one
    pub context_rows: u16,
}

impl Default for SourcePanelConfig {
    fn default() -> Self {
        Self { show_line_numbers: true, context_rows: 5 }
    }
}

impl Default for VariablesPanelConfig {
    fn default() -> Self {
        Self { show_globals: true }
    }
}

impl Default for BytecodePanelConfig {
    fn default() -> Self {
        Self { context_rows: 4 }
    }
}

fn scheme(
    border: &str,
    title: &str,
    highlight: (&str, &str),
    line_number: &str,
    help_text: &str,
    info: &str,
) -> ColorScheme {
    ColorScheme {
        border: border.to_string(),
        title: title.to_string(),
        highlight_bg: highlight.0.to_string(),
        highlight_fg: highlight.1.to_string(),
        line_number: line_number.to_string(),
        help_text: help_text.to_string(),
        success: "green".to_string(),
        error: "red".to_string(),
        warning: "yellow".to_string(),
        info: info.to_string(),
    }
}

impl Default for ThemeConfig {
    fn default() -> Self {
        let mut themes = HashMap::new();

        themes.insert(
            "default".to_string(),
            Theme {
                name: "Default".to_string(),
                description: "Default RDB theme with blue accents".to_string(),
                colors: scheme("cyan", "white", ("blue", "white"), "dark_gray", "yellow", "cyan"),
            },
        );

        themes.insert(
            "dark".to_string(),
            Theme {
                name: "Dark".to_string(),
                description: "Dark theme with minimal colors".to_string(),
                colors: scheme("gray", "white", ("dark_gray", "white"), "gray", "gray", "white"),
            },
        );

        themes.insert(
            "light".to_string(),
            Theme {
                name: "Light".to_string(),
                description: "Light theme with dark text on light backgrounds".to_string(),
                colors: scheme(
                    "blue",
                    "black",
                    ("light_blue", "black"),
                    "dark_gray",
                    "dark_gray",
                    "blue",
                ),
            },
        );

        themes.insert(
            "monokai".to_string(),
            Theme {
                name: "Monokai".to_string(),
                description: "Popular dark theme with vibrant colors".to_string(),
                colors: scheme(
                    "magenta",
                    "light_green",
                    ("magenta", "black"),
                    "dark_gray",
                    "cyan",
                    "cyan",
                ),
            },
        );

        Self { active: "default".to_string(), themes }
    }
}

impl Config {
    /// Get the config file path (`RDB_CONFIG_PATH`, else `~/.rdb.toml`)
    pub fn config_path() -> Result<PathBuf> {
        if let Some(path) = std::env::var_os(RDB_CONFIG_PATH).filter(|p| !p.is_empty()) {
            return Ok(PathBuf::from(path));
        }
        let home =
            dirs::home_dir().ok_or_else(|| eyre::eyre!("Unable to determine home directory"))?;
        Ok(home.join(".rdb.toml"))
    }

    /// Load configuration from file, creating default if it doesn't exist
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            info!("Config file not found, creating default at {:?}", config_path);
            let default_config = Self::default();
            default_config.save()?;
            return Ok(default_config);
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {config_path:?}"))?;

        let config: Self =
            toml::from_str(&content).with_context(|| "Failed to parse config file as TOML")?;

        debug!("Loaded configuration from {:?}", config_path);
        Ok(config)
    }

    /// Load the configuration, falling back to defaults when the file is unusable
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_else(|err| {
            warn!("Using default configuration: {err:#}");
            Self::default()
        })
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        let content =
            toml::to_string_pretty(self).with_context(|| "Failed to serialize config to TOML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {config_path:?}"))?;

        debug!("Saved configuration to {:?}", config_path);
        Ok(())
    }

    /// Get the currently active theme
    pub fn get_active_theme(&self) -> Option<&Theme> {
        self.theme.themes.get(&self.theme.active)
    }

    /// Colors of the active theme, the built-in default when it is missing
    pub fn colors(&self) -> ColorScheme {
        match self.get_active_theme() {
            Some(theme) => theme.colors.clone(),
            None => {
                warn!("Theme '{}' not found, using default colors", self.theme.active);
                scheme("cyan", "white", ("blue", "white"), "dark_gray", "yellow", "cyan")
            }
        }
    }

    /// Switch to a different theme
    pub fn set_theme(&mut self, theme_name: &str) -> Result<()> {
        if !self.theme.themes.contains_key(theme_name) {
            return Err(eyre::eyre!("Theme '{}' not found", theme_name));
        }

        self.theme.active = theme_name.to_string();
        info!("Switched to theme: {}", theme_name);
        Ok(())
    }

    /// List available themes
    pub fn list_themes(&self) -> Vec<(&String, &Theme)> {
        self.theme.themes.iter().collect()
    }

    /// Convert color string to ratatui Color
    pub fn parse_color(color_str: &str) -> Color {
        match color_str.to_lowercase().as_str() {
            "black" => Color::Black,
            "red" => Color::Red,
            "green" => Color::Green,
            "yellow" => Color::Yellow,
            "blue" => Color::Blue,
            "magenta" => Color::Magenta,
            "cyan" => Color::Cyan,
            "gray" | "light_gray" => Color::Gray,
            "dark_gray" => Color::DarkGray,
            "light_red" => Color::LightRed,
            "light_green" => Color::LightGreen,
            "light_yellow" => Color::LightYellow,
            "light_blue" => Color::LightBlue,
            "light_magenta" => Color::LightMagenta,
            "light_cyan" => Color::LightCyan,
            "white" => Color::White,
            _ => {
                warn!("Unknown color '{}', using default gray", color_str);
                Color::Gray
            }
        }
    }
}

impl ColorScheme {
    /// Get border color
    pub fn border(&self) -> Color {
        Config::parse_color(&self.border)
    }

    /// Get title color
    pub fn title(&self) -> Color {
        Config::parse_color(&self.title)
    }

    /// Get highlight background color
    pub fn highlight_bg(&self) -> Color {
        Config::parse_color(&self.highlight_bg)
    }

    /// Get highlight foreground color
    pub fn highlight_fg(&self) -> Color {
        Config::parse_color(&self.highlight_fg)
    }

    /// Get line number color
    pub fn line_number(&self) -> Color {
        Config::parse_color(&self.line_number)
    }

    /// Get help text color
    pub fn help_text(&self) -> Color {
        Config::parse_color(&self.help_text)
    }

    /// Get success color
    pub fn success(&self) -> Color {
        Config::parse_color(&self.success)
    }

    /// Get error color
    pub fn error(&self) -> Color {
        Config::parse_color(&self.error)
    }

    /// Get warning color
    pub fn warning(&self) -> Color {
        Config::parse_color(&self.warning)
    }

    /// Get info color
    pub fn info(&self) -> Color {
        Config::parse_color(&self.info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn with_config_path<T>(path: &std::path::Path, f: impl FnOnce() -> T) -> T {
        std::env::set_var(RDB_CONFIG_PATH, path);
        let out = f();
        std::env::remove_var(RDB_CONFIG_PATH);
        out
    }

    #[test]
    fn test_default_themes() {
        let config = Config::default();
        assert_eq!(config.theme.active, "default");
        assert_eq!(config.list_themes().len(), 4);
        let colors = config.colors();
        assert_eq!(colors.border(), Color::Cyan);
        assert_eq!(colors.highlight_bg(), Color::Blue);
    }

    #[test]
    fn test_set_theme() {
        let mut config = Config::default();
        config.set_theme("monokai").unwrap();
        assert_eq!(config.get_active_theme().unwrap().name, "Monokai");
        assert!(config.set_theme("solarized").is_err());
        assert_eq!(config.theme.active, "monokai");
    }

    #[test]
    fn test_parse_color() {
        assert_eq!(Config::parse_color("Light_Blue"), Color::LightBlue);
        assert_eq!(Config::parse_color("light_gray"), Color::Gray);
        assert_eq!(Config::parse_color("chartreuse"), Color::Gray);
    }

    #[test]
    fn test_missing_theme_falls_back() {
        let mut config = Config::default();
        config.theme.active = "gone".to_string();
        assert_eq!(config.colors().border(), Color::Cyan);
    }

    #[test]
    #[serial]
    fn test_load_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rdb.toml");
        let config = with_config_path(&path, Config::load).unwrap();
        assert_eq!(config, Config::default());
        assert!(path.exists());
    }

    #[test]
    #[serial]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rdb.toml");
        let mut config = Config::default();
        config.panels.source.show_line_numbers = false;
        config.panels.variables.show_globals = false;
        config.set_theme("dark").unwrap();

        let loaded = with_config_path(&path, || {
            config.save().unwrap();
            Config::load()
        })
        .unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    #[serial]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rdb.toml");
        fs::write(&path, "theme = 3").unwrap();
        assert!(with_config_path(&path, Config::load).is_err());
        assert_eq!(with_config_path(&path, Config::load_or_default), Config::default());
    }
}
