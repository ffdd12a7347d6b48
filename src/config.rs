// SPDX-License-Identifier: GPL-3.0-only
//! User configuration
//!
//! A single JSON document with optional `keyboard`, `display` and `usb`
//! sections. Object order matters for display layouts (first match wins, and
//! directives follow key order) and for setxkbmap arguments, so objects are
//! read into [`OrderedMap`] rather than a hash map.

use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::Deserialize;

use crate::error::ConfigError;
use crate::matcher::{ConfigKey, ConfigTable, Configuration, OutputSettings, Setting};

pub const APP_NAME: &str = "hotplug-brain";
const CONFIG_FILE: &str = "config.json";
const DEFAULT_SETTLE_DELAY_MS: u64 = 2000;

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Notification timeout in seconds, 0 disables notifications
    pub notification: f64,
    /// Time hardware gets to finish enumerating before we react
    pub settle_delay_ms: u64,
    pub keyboard: Option<KeyboardConfig>,
    pub display: Option<ConfigTable>,
    /// Keyed by `vvvv:pppp` USB product id
    pub usb: HashMap<String, UsbDeviceConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            notification: 0.0,
            settle_delay_ms: DEFAULT_SETTLE_DELAY_MS,
            keyboard: None,
            display: None,
            usb: HashMap::new(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct KeyboardConfig {
    /// Auto-repeat delay (ms) and rate (Hz), as passed to `xset r rate`
    pub rate: Option<(u32, u32)>,
    /// setxkbmap options without the leading dash, e.g. `layout`, `option`
    #[serde(default)]
    pub xkbmap: OrderedMap<String>,
    /// Extra symbols per layout, loaded through xkbcomp
    #[serde(default)]
    pub xkb_symbols: OrderedMap<Vec<String>>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct UsbDeviceConfig {
    /// `[name, shell command]` pairs; `%(PROPERTY)s` expands udev properties
    #[serde(default)]
    pub actions: Vec<(String, String)>,
}

impl Config {
    /// `$XDG_CONFIG_HOME/hotplug-brain/config.json`
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|dir| dir.join(APP_NAME).join(CONFIG_FILE))
            .ok_or(ConfigError::NoConfigDir)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        info!(
            "Loaded {} (display layouts: {}, usb devices: {}, keyboard: {})",
            path.display(),
            config.display.as_ref().map_or(0, ConfigTable::len),
            config.usb.len(),
            config.keyboard.is_some()
        );
        Ok(config)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// `None` when notifications are disabled
    pub fn notification_timeout(&self) -> Option<Duration> {
        if self.notification <= 0.0 {
            return None;
        }
        match Duration::try_from_secs_f64(self.notification) {
            Ok(timeout) => Some(timeout),
            Err(e) => {
                warn!("Ignoring notification timeout {}: {}, notifications disabled", self.notification, e);
                None
            }
        }
    }
}

/// JSON object that keeps its keys in document order
///
/// A repeated key keeps its first position and takes the last value.
#[derive(Clone, Debug, PartialEq)]
pub struct OrderedMap<V>(Vec<(String, V)>);

impl<V> OrderedMap<V> {
    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.0.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, value)| value)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_entries(self) -> Vec<(String, V)> {
        self.0
    }
}

impl<V> Default for OrderedMap<V> {
    fn default() -> Self {
        Self(Vec::new())
    }
}

impl<V> FromIterator<(String, V)> for OrderedMap<V> {
    fn from_iter<I: IntoIterator<Item = (String, V)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'de, V: Deserialize<'de>> Deserialize<'de> for OrderedMap<V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct OrderedMapVisitor<V>(PhantomData<V>);

        impl<'de, V: Deserialize<'de>> Visitor<'de> for OrderedMapVisitor<V> {
            type Value = OrderedMap<V>;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a JSON object")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut entries: Vec<(String, V)> = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((key, value)) = map.next_entry::<String, V>()? {
                    match entries.iter_mut().find(|(k, _)| *k == key) {
                        Some(entry) => entry.1 = value,
                        None => entries.push((key, value)),
                    }
                }
                Ok(OrderedMap(entries))
            }
        }

        deserializer.deserialize_map(OrderedMapVisitor(PhantomData))
    }
}

impl<'de> Deserialize<'de> for ConfigTable {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let layouts = OrderedMap::<Configuration>::deserialize(deserializer)?;
        Ok(ConfigTable::new(layouts.into_entries()))
    }
}

impl<'de> Deserialize<'de> for Configuration {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let outputs = OrderedMap::<OutputSettings>::deserialize(deserializer)?;
        Ok(Configuration::new(
            outputs
                .into_entries()
                .into_iter()
                .map(|(key, settings)| (ConfigKey::parse(&key), settings))
                .collect(),
        ))
    }
}

/// Accepts `null`/`false`/`"off"` (disable), an xrandr argument string, or an
/// object of xrandr options
impl<'de> Deserialize<'de> for OutputSettings {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SettingsVisitor;

        impl<'de> Visitor<'de> for SettingsVisitor {
            type Value = OutputSettings;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("xrandr options as a string or object, or null/false to switch the output off")
            }

            fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
                Ok(OutputSettings::Disable)
            }

            fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
                Ok(OutputSettings::Disable)
            }

            fn visit_bool<E: de::Error>(self, v: bool) -> Result<Self::Value, E> {
                if v {
                    Err(E::invalid_value(de::Unexpected::Bool(true), &self))
                } else {
                    Ok(OutputSettings::Disable)
                }
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                match v.trim() {
                    "off" | "--off" => Ok(OutputSettings::Disable),
                    args => parse_args(args).map(OutputSettings::Enable).map_err(E::custom),
                }
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut settings = Vec::new();
                while let Some(key) = map.next_key::<String>()? {
                    let key = key.trim_start_matches('-').to_string();
                    let values = match map.next_value::<serde_json::Value>()? {
                        serde_json::Value::Null | serde_json::Value::Bool(true) => Vec::new(),
                        serde_json::Value::Bool(false) => continue,
                        serde_json::Value::Array(items) => items
                            .into_iter()
                            .map(|item| option_value(&key, item))
                            .collect::<Result<_, _>>()
                            .map_err(de::Error::custom)?,
                        value => vec![option_value(&key, value).map_err(de::Error::custom)?],
                    };
                    settings.push(Setting::with_values(key, values));
                }
                Ok(OutputSettings::Enable(settings))
            }
        }

        deserializer.deserialize_any(SettingsVisitor)
    }
}

fn option_value(key: &str, value: serde_json::Value) -> Result<String, String> {
    match value {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(format!("unsupported value for xrandr option {key}: {other}")),
    }
}

/// Split `--mode 1920x1080 --set audio on` into settings
///
/// Words after an `--option` belong to it until the next `--option`.
fn parse_args(args: &str) -> Result<Vec<Setting>, String> {
    let mut settings: Vec<Setting> = Vec::new();
    for word in split_words(args)? {
        if let Some(key) = word.strip_prefix("--") {
            settings.push(Setting::with_values(key, Vec::new()));
            continue;
        }
        match settings.last_mut() {
            Some(setting) => setting.values.push(word),
            None => return Err(format!("xrandr argument {word:?} does not follow an --option")),
        }
    }
    Ok(settings)
}

/// Shell word splitting: quotes and backslash escapes, no expansions
fn split_words(text: &str) -> Result<Vec<String>, String> {
    let mut words = Vec::new();
    let mut word = String::new();
    let mut in_word = false;
    let mut chars = text.chars();

    while let Some(c) = chars.next() {
        match c {
            c if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut word));
                    in_word = false;
                }
            }
            '\'' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(c) => word.push(c),
                        None => return Err("unterminated single quote".into()),
                    }
                }
            }
            '"' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(c @ ('"' | '\\' | '$' | '`')) => word.push(c),
                            Some('\n') => {}
                            Some(c) => {
                                word.push('\\');
                                word.push(c);
                            }
                            None => return Err("unterminated double quote".into()),
                        },
                        Some(c) => word.push(c),
                        None => return Err("unterminated double quote".into()),
                    }
                }
            }
            '\\' => match chars.next() {
                Some('\n') => {}
                Some(c) => {
                    in_word = true;
                    word.push(c);
                }
                None => return Err("trailing backslash".into()),
            },
            c => {
                in_word = true;
                word.push(c);
            }
        }
    }
    if in_word {
        words.push(word);
    }
    Ok(words)
}
