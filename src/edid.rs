// SPDX-License-Identifier: GPL-3.0-only
//! EDID identity decoding
//!
//! A monitor is identified by the display descriptors of its base EDID block
//! (product name, serial string, free text). Together with the connector it
//! is plugged into, this forms the signature token used to pick a layout.

use std::fmt;

/// Offsets of the four 18-byte descriptor windows in the base EDID block
const DESCRIPTOR_OFFSETS: [usize; 4] = [54, 72, 90, 108];
const DESCRIPTOR_LEN: usize = 18;
/// Descriptor payload starts after the 3 zero bytes, the tag and a reserved byte
const PAYLOAD_OFFSET: usize = 5;

const TAG_SERIAL: u8 = 0xFF;
const TAG_TEXT: u8 = 0xFE;
const TAG_NAME: u8 = 0xFC;

/// Human-readable monitor identity taken from the EDID descriptors
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    pub name: Option<String>,
    pub serial: Option<String>,
    pub text: Option<String>,
}

impl Identity {
    /// Decode the descriptor windows of `edid`
    ///
    /// Never fails: short, truncated or garbled data only leaves fields
    /// absent. When a descriptor kind repeats, the later window wins.
    pub fn resolve(edid: &[u8]) -> Self {
        let mut identity = Self::default();

        for offset in DESCRIPTOR_OFFSETS {
            let Some(window) = edid.get(offset..edid.len().min(offset + DESCRIPTOR_LEN)) else {
                break;
            };
            if window.len() < 4 || window[..3] != [0, 0, 0] {
                continue;
            }

            let payload = window.get(PAYLOAD_OFFSET..).unwrap_or_default();
            let slot = match window[3] {
                TAG_SERIAL => &mut identity.serial,
                TAG_TEXT => &mut identity.text,
                TAG_NAME => &mut identity.name,
                _ => continue,
            };
            *slot = decode_field(payload, offset);
        }

        identity
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.serial.is_none() && self.text.is_none()
    }

    /// Identity part of a signature token: `name:serial:text`, absent fields
    /// skipped and whitespace replaced by `-`
    pub fn signature(&self) -> String {
        [&self.name, &self.serial, &self.text]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(":")
            .chars()
            .map(|c| if c.is_whitespace() { '-' } else { c })
            .collect()
    }
}

fn decode_field(payload: &[u8], offset: usize) -> Option<String> {
    let decoded = String::from_utf8_lossy(payload);
    if decoded.contains(char::REPLACEMENT_CHARACTER) {
        debug!(offset, "dropping undecodable bytes in EDID descriptor");
    }

    let cleaned: String = decoded
        .chars()
        .filter(|&c| c != char::REPLACEMENT_CHARACTER)
        .collect();
    let trimmed = cleaned.trim();

    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// `connector=identity`, the per-output element of a live signature
///
/// Ordering is the lexicographic order of the full token text.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SignatureToken {
    token: String,
    split: usize,
}

impl SignatureToken {
    pub fn new(connector: &str, identity: &Identity) -> Self {
        Self::from_parts(connector, &identity.signature())
    }

    pub fn from_parts(connector: &str, identity: &str) -> Self {
        Self {
            token: format!("{connector}={identity}"),
            split: connector.len(),
        }
    }

    /// Parse the textual `connector=identity` form
    pub fn parse(token: &str) -> Option<Self> {
        let (connector, identity) = token.split_once('=')?;
        Some(Self::from_parts(connector, identity))
    }

    pub fn connector(&self) -> &str {
        &self.token[..self.split]
    }

    pub fn identity(&self) -> &str {
        &self.token[self.split + 1..]
    }

    pub fn as_str(&self) -> &str {
        &self.token
    }
}

impl fmt::Display for SignatureToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.token)
    }
}
