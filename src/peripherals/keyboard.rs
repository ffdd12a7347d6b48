// SPDX-License-Identifier: GPL-3.0-only
//! Keyboard repeat rate and layout
//!
//! Re-applied whenever a keyboard is plugged in, since a new device starts
//! with the X server defaults.

use std::io::Write;
use std::path::Path;

use crate::command;
use crate::config::{KeyboardConfig, OrderedMap};
use crate::error::ApplyError;
use crate::hotplug::{HotplugAction, HotplugEvent};

/// A freshly added physical keyboard (not one of its sub-devices)
pub fn is_keyboard_added(event: &HotplugEvent) -> bool {
    event.action == HotplugAction::Add
        && event.property("ID_INPUT_KEYBOARD") == Some("1")
        && event.property("LIBINPUT_DEVICE_GROUP").is_some()
}

pub fn apply(config: &KeyboardConfig) -> Result<(), ApplyError> {
    if let Some(rate) = config.rate {
        command::run("xset", &rate_args(rate))?;
        info!("rate set");
    }
    if !config.xkbmap.is_empty() {
        setup_xkb(&config.xkbmap, &config.xkb_symbols)?;
        info!("xkb is up");
    }
    Ok(())
}

fn rate_args((delay, rate): (u32, u32)) -> Vec<String> {
    vec!["r".into(), "rate".into(), delay.to_string(), rate.to_string()]
}

fn setup_xkb(xkbmap: &OrderedMap<String>, symbols: &OrderedMap<Vec<String>>) -> Result<(), ApplyError> {
    if symbols.is_empty() {
        command::run("setxkbmap", &setxkbmap_args(xkbmap, None))?;
        return Ok(());
    }

    // xkbcomp resolves `file(section)` against <include dir>/symbols/file
    let include_dir = tempfile::tempdir()?;
    let symbols_dir = include_dir.path().join("symbols");
    std::fs::create_dir(&symbols_dir)?;

    let mut file = tempfile::NamedTempFile::new_in(&symbols_dir)?;
    file.write_all(symbols_source(symbols).as_bytes())?;
    file.flush()?;

    let file_name = file
        .path()
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut args = setxkbmap_args(xkbmap, Some((file_name.as_str(), symbols)));
    args.push("-print".into());

    let display = std::env::var("DISPLAY").unwrap_or_else(|_| ":0".to_string());
    command::pipe("setxkbmap", &args, "xkbcomp", &xkbcomp_args(include_dir.path(), &display))?;
    Ok(())
}

/// `-key value` pairs; `option` first clears previously set options
fn setxkbmap_args(xkbmap: &OrderedMap<String>, symbols: Option<(&str, &OrderedMap<Vec<String>>)>) -> Vec<String> {
    let mut args = Vec::new();
    for (key, value) in xkbmap.iter() {
        let value = match symbols {
            Some((file_name, symbols)) if key == "layout" => value
                .split(',')
                .map(|layout| {
                    if symbols.get(layout).is_some() {
                        format!("{layout}+{file_name}({layout}_extra)")
                    } else {
                        layout.to_string()
                    }
                })
                .collect::<Vec<_>>()
                .join(","),
            _ => value.clone(),
        };

        if key == "option" {
            args.push("-option".into());
            args.push(String::new());
        }
        args.push(format!("-{key}"));
        args.push(value);
    }
    args
}

fn symbols_source(symbols: &OrderedMap<Vec<String>>) -> String {
    symbols
        .iter()
        .map(|(layout, lines)| {
            format!(
                "xkb_symbols \"{layout}_extra\" {{\n\t\t{}\n\t}};\n",
                lines.join("\n\t\t")
            )
        })
        .collect()
}

fn xkbcomp_args(include_dir: &Path, display: &str) -> Vec<String> {
    vec![
        format!("-I{}", include_dir.display()),
        "-".into(),
        display.to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn xkbmap(entries: &[(&str, &str)]) -> OrderedMap<String> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_keyboard_detection() {
        let event = HotplugEvent::new(HotplugAction::Add, "input")
            .with_property("ID_INPUT_KEYBOARD", "1")
            .with_property("LIBINPUT_DEVICE_GROUP", "3/46d/c52b");
        assert!(is_keyboard_added(&event));

        let mut removed = event.clone();
        removed.action = HotplugAction::Remove;
        assert!(!is_keyboard_added(&removed));

        let subdevice = HotplugEvent::new(HotplugAction::Add, "input").with_property("ID_INPUT_KEYBOARD", "1");
        assert!(!is_keyboard_added(&subdevice));
    }

    #[test]
    fn test_rate_args() {
        assert_eq!(rate_args((250, 30)), ["r", "rate", "250", "30"]);
    }

    #[test]
    fn test_setxkbmap_args_clear_options() {
        let map = xkbmap(&[("layout", "us,ru"), ("option", "grp:caps_toggle")]);
        assert_eq!(
            setxkbmap_args(&map, None),
            ["-layout", "us,ru", "-option", "", "-option", "grp:caps_toggle"]
        );
    }

    #[test]
    fn test_setxkbmap_args_with_symbols() {
        let map = xkbmap(&[("layout", "us,ru")]);
        let symbols: OrderedMap<Vec<String>> =
            [("ru".to_string(), vec!["key <CAPS> { [ Escape ] };".to_string()])]
                .into_iter()
                .collect();
        assert_eq!(
            setxkbmap_args(&map, Some(("tmpabc", &symbols))),
            ["-layout", "us,ru+tmpabc(ru_extra)"]
        );
        assert_eq!(
            symbols_source(&symbols),
            "xkb_symbols \"ru_extra\" {\n\t\tkey <CAPS> { [ Escape ] };\n\t};\n"
        );
    }

    #[test]
    fn test_xkbcomp_args() {
        assert_eq!(
            xkbcomp_args(Path::new("/tmp/x"), ":1"),
            ["-I/tmp/x", "-", ":1"]
        );
    }
}
