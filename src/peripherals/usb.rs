// SPDX-License-Identifier: GPL-3.0-only
//! Per-device commands for USB devices
//!
//! Devices are keyed by `vendor:product` (four hex digits each). Command
//! templates may reference any udev property of the device as `%(NAME)s`.

use std::collections::BTreeMap;

use crate::error::TemplateError;
use crate::hotplug::{HotplugAction, HotplugEvent};

/// `vvvv:pppp` from the `PRODUCT` property (`vid/pid/bcdDevice`) of a USB `add`
pub fn product_id(event: &HotplugEvent) -> Option<String> {
    if event.action != HotplugAction::Add || !event.is_subsystem("usb") {
        return None;
    }
    let mut parts = event.property("PRODUCT")?.split('/');
    let vendor = parts.next()?;
    let product = parts.next()?;
    Some(format!("{vendor:0>4}:{product:0>4}"))
}

/// Vendor and model names from the hardware database
pub fn product_name(event: &HotplugEvent) -> String {
    format!(
        "{} {}",
        event.property("ID_VENDOR_FROM_DATABASE").unwrap_or_default(),
        event.property("ID_MODEL_FROM_DATABASE").unwrap_or_default()
    )
}

/// Replace `%(NAME)s` with the property value and `%%` with `%`
pub fn expand(template: &str, properties: &BTreeMap<String, String>) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(pos) = rest.find('%') {
        out.push_str(&rest[..pos]);
        let offset = template.len() - rest.len() + pos;
        let tail = &rest[pos + 1..];

        if let Some(after) = tail.strip_prefix('%') {
            out.push('%');
            rest = after;
            continue;
        }

        let placeholder = tail
            .strip_prefix('(')
            .and_then(|t| t.split_once(')'))
            .and_then(|(name, after)| Some((name, after.strip_prefix('s')?)));
        let Some((name, after)) = placeholder else {
            return Err(TemplateError::Malformed(offset));
        };

        let value = properties
            .get(name)
            .ok_or_else(|| TemplateError::MissingProperty(name.to_string()))?;
        out.push_str(value);
        rest = after;
    }

    out.push_str(rest);
    Ok(out)
}
