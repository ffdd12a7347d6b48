// SPDX-License-Identifier: GPL-3.0-only

//! Integration with xrandr
//!
//! Reads the output inventory (connector, connection status, raw EDID) from
//! `xrandr --prop` and applies a display layout with a single `xrandr` call.

use std::collections::BTreeSet;
use std::fmt;

use crate::command;
use crate::edid::{Identity, SignatureToken};
use crate::error::{ApplyError, QueryError};
use crate::matcher::{Action, Directive};

const XRANDR: &str = "xrandr";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStatus {
    Connected,
    Disconnected,
    Unknown,
}

impl OutputStatus {
    fn parse(status: &str) -> Self {
        match status {
            "connected" => OutputStatus::Connected,
            "disconnected" => OutputStatus::Disconnected,
            _ => OutputStatus::Unknown,
        }
    }
}

impl fmt::Display for OutputStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OutputStatus::Connected => "connected",
            OutputStatus::Disconnected => "disconnected",
            OutputStatus::Unknown => "unknown",
        })
    }
}

/// One output as reported by the X server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Output {
    /// Output connector name (e.g., "DP-2", "HDMI-1", "eDP-1")
    pub connector_name: String,
    pub status: OutputStatus,
    /// Raw EDID, empty when the output does not expose one
    pub edid: Vec<u8>,
}

impl Output {
    pub fn is_connected(&self) -> bool {
        self.status == OutputStatus::Connected
    }

    pub fn identity(&self) -> Identity {
        Identity::resolve(&self.edid)
    }
}

/// Signature tokens of all connected outputs
pub fn live_signature(outputs: &[Output]) -> BTreeSet<SignatureToken> {
    outputs
        .iter()
        .filter(|output| output.is_connected())
        .map(|output| {
            let identity = output.identity();
            if identity.is_empty() {
                debug!("{} is connected but reports no EDID identity", output.connector_name);
            }
            SignatureToken::new(&output.connector_name, &identity)
        })
        .collect()
}

/// Source of the current output inventory
pub trait OutputQuery: Send + Sync {
    fn list_outputs(&self) -> Result<Vec<Output>, QueryError>;
}

/// Applies an ordered list of directives to the display server
pub trait ApplyOutputs: Send + Sync {
    fn apply(&self, directives: &[Directive], outputs: &[Output]) -> Result<(), ApplyError>;
}

/// Inventory and apply step backed by the `xrandr` tool
#[derive(Debug, Clone, Copy, Default)]
pub struct Xrandr;

impl OutputQuery for Xrandr {
    fn list_outputs(&self) -> Result<Vec<Output>, QueryError> {
        let stdout = command::output(XRANDR, &["--prop"])?;
        let text = String::from_utf8(stdout)?;
        let outputs = parse_outputs(&text)?;
        debug!("xrandr reported {} output(s)", outputs.len());
        Ok(outputs)
    }
}

impl ApplyOutputs for Xrandr {
    fn apply(&self, directives: &[Directive], outputs: &[Output]) -> Result<(), ApplyError> {
        for directive in directives {
            if let Some(output) = outputs.iter().find(|o| o.connector_name == directive.connector) {
                debug!(connector = %output.connector_name, status = %output.status, "{}", directive);
            }
        }
        command::run(XRANDR, &apply_args(directives))?;
        info!("xrandr succeeded");
        Ok(())
    }
}

/// Arguments for one xrandr call carrying every directive, in order
pub fn apply_args(directives: &[Directive]) -> Vec<String> {
    let mut args = Vec::new();
    for directive in directives {
        args.push("--output".to_string());
        args.push(directive.connector.clone());
        match &directive.action {
            Action::Disable => args.push("--off".to_string()),
            Action::Enable(settings) => {
                for setting in settings {
                    args.push(format!("--{}", setting.key));
                    args.extend(setting.values.iter().cloned());
                }
            }
        }
    }
    args
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    /// Outside of any output block (before the first header, after `Screen`)
    None,
    Properties,
    Edid,
    /// Block of a connector that was already seen
    Duplicate,
}

/// Parse `xrandr --prop` output into outputs, in the order xrandr lists them
///
/// Output headers start at column 0, properties are indented by one tab,
/// property values (such as the EDID hex dump) by two tabs and mode lines by
/// spaces.
pub fn parse_outputs(text: &str) -> Result<Vec<Output>, QueryError> {
    let mut outputs: Vec<Output> = Vec::new();
    let mut section = Section::None;

    for (index, line) in text.lines().enumerate() {
        let line_no = index + 1;
        if line.trim().is_empty() {
            continue;
        }

        if line.starts_with(' ') {
            // Mode line
            if section == Section::Edid {
                section = Section::Properties;
            }
            continue;
        }

        if !line.starts_with('\t') {
            if line.starts_with("Screen ") {
                section = Section::None;
                continue;
            }

            let mut fields = line.split_whitespace();
            let (Some(name), Some(status)) = (fields.next(), fields.next()) else {
                return Err(QueryError::Parse {
                    line: line_no,
                    reason: format!("output header without status: {line:?}"),
                });
            };

            if outputs.iter().any(|o| o.connector_name == name) {
                debug!("Ignoring repeated block for output {}", name);
                section = Section::Duplicate;
                continue;
            }

            outputs.push(Output {
                connector_name: name.to_string(),
                status: OutputStatus::parse(status),
                edid: Vec::new(),
            });
            section = Section::Properties;
            continue;
        }

        match section {
            Section::None => {
                return Err(QueryError::Parse {
                    line: line_no,
                    reason: "property outside of an output block".to_string(),
                });
            }
            Section::Duplicate => continue,
            Section::Properties | Section::Edid => {}
        }

        if line.starts_with("\t\t") {
            if section == Section::Edid {
                let Some(output) = outputs.last_mut() else {
                    continue;
                };
                let bytes = decode_hex(line.trim()).ok_or_else(|| QueryError::Parse {
                    line: line_no,
                    reason: format!("invalid EDID hex for {}", output.connector_name),
                })?;
                output.edid.extend(bytes);
            }
            continue;
        }

        section = if line.trim_start().starts_with("EDID:") {
            Section::Edid
        } else {
            Section::Properties
        };
    }

    Ok(outputs)
}

fn decode_hex(hex: &str) -> Option<Vec<u8>> {
    if hex.len() % 2 != 0 || !hex.is_ascii() {
        return None;
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).ok())
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::edid::tests::edid_with;
    use crate::matcher::Setting;

    fn hex_lines(edid: &[u8]) -> String {
        edid.chunks(16)
            .map(|chunk| {
                let hex: String = chunk.iter().map(|b| format!("{b:02x}")).collect();
                format!("\t\t{hex}\n")
            })
            .collect()
    }

    pub(crate) fn sample_xrandr(edid: &[u8]) -> String {
        format!(
            "Screen 0: minimum 320 x 200, current 1920 x 1080, maximum 16384 x 16384\n\
             eDP-1 disconnected (normal left inverted right x axis y axis)\n\
             \tBACKLIGHT: 400 \n\
             \t\trange: (0, 937)\n\
             HDMI-1 connected primary 1920x1080+0+0 (normal left inverted right x axis y axis) 531mm x 299mm\n\
             \tEDID: \n\
             {}\
             \tnon-desktop: 0 \n\
             \t\tsupported: 0, 1\n\
             \x20\x20 1920x1080     60.00*+  50.00    59.94  \n\
             \x20\x20 1280x720      60.00    50.00  \n\
             DP-1 unknown connection (normal left inverted right x axis y axis)\n",
            hex_lines(edid)
        )
    }

    #[test]
    fn test_parse_outputs() {
        let edid = edid_with(&[(0, 0xFC, b"SAMSUNG"), (1, 0xFF, b"SN123")]);
        let outputs = parse_outputs(&sample_xrandr(&edid)).unwrap();

        let names: Vec<_> = outputs.iter().map(|o| o.connector_name.as_str()).collect();
        assert_eq!(names, ["eDP-1", "HDMI-1", "DP-1"]);
        assert_eq!(outputs[0].status, OutputStatus::Disconnected);
        assert!(outputs[0].edid.is_empty());
        assert_eq!(outputs[1].status, OutputStatus::Connected);
        assert_eq!(outputs[1].edid, edid);
        assert_eq!(outputs[2].status, OutputStatus::Unknown);

        let live = live_signature(&outputs);
        let tokens: Vec<_> = live.iter().map(SignatureToken::as_str).collect();
        assert_eq!(tokens, ["HDMI-1=SAMSUNG:SN123"]);
    }

    #[test]
    fn test_edid_ends_at_mode_line() {
        let edid = edid_with(&[(0, 0xFC, b"LG")]);
        let text = format!(
            "HDMI-1 connected\n\tEDID: \n{}   1920x1080     60.00*+\n\t\tffff\n",
            hex_lines(&edid)
        );
        let outputs = parse_outputs(&text).unwrap();
        assert_eq!(outputs[0].edid, edid);
    }

    #[test]
    fn test_repeated_output_block_is_ignored() {
        let text = "DP-1 connected\n\tEDID: \n\t\t00ff\nDP-1 disconnected\n\tEDID: \n\t\t1234\n";
        let outputs = parse_outputs(text).unwrap();
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].edid, vec![0x00, 0xff]);
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            parse_outputs("\tEDID: \n"),
            Err(QueryError::Parse { line: 1, .. })
        ));
        assert!(matches!(
            parse_outputs("HDMI-1\n"),
            Err(QueryError::Parse { line: 1, .. })
        ));
        assert!(matches!(
            parse_outputs("HDMI-1 connected\n\tEDID: \n\t\t0g12\n"),
            Err(QueryError::Parse { line: 3, .. })
        ));
    }

    #[test]
    fn test_apply_args() {
        let directives = vec![
            Directive::enable(
                "HDMI-1",
                vec![
                    Setting::new("mode", Some("1920x1080")),
                    Setting::new("primary", None::<String>),
                ],
            ),
            Directive::disable("eDP-1"),
        ];
        assert_eq!(
            apply_args(&directives),
            ["--output", "HDMI-1", "--mode", "1920x1080", "--primary", "--output", "eDP-1", "--off"]
        );
    }

    #[test]
    fn test_apply_args_with_multi_word_option() {
        let directives = vec![Directive::enable(
            "HDMI-1",
            vec![
                Setting::new("auto", None::<String>),
                Setting::with_values("set", vec!["Broadcast RGB".into(), "Full".into()]),
            ],
        )];
        assert_eq!(
            apply_args(&directives),
            ["--output", "HDMI-1", "--auto", "--set", "Broadcast RGB", "Full"]
        );
    }
}
