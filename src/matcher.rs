// SPDX-License-Identifier: GPL-3.0-only
//! Display configuration matching
//!
//! Selects the named configuration whose keys account for exactly the set of
//! connected outputs, and turns it into per-output directives.
//!
//! # Key forms
//!
//! - `HDMI-1=DELL-U2415:SN123` only accepts that identity on that connector
//! - `DELL-U2415:SN123` accepts that identity on any connector
//!
//! Connector-qualified keys are assigned first. Bare keys then take the first
//! free live token (in sorted order) with the same identity. When two
//! connected monitors report the same identity, bare keys cannot tell them
//! apart and the sorted-order assignment is the canonical one; this is logged
//! as a warning so the user can qualify the key.

use std::collections::BTreeSet;
use std::fmt;

use crate::edid::SignatureToken;

/// A key of a display configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigKey {
    ConnectorQualified { connector: String, identity: String },
    IdentityOnly { identity: String },
}

impl ConfigKey {
    pub fn parse(key: &str) -> Self {
        match key.split_once('=') {
            Some((connector, identity)) => ConfigKey::ConnectorQualified {
                connector: connector.trim().to_string(),
                identity: normalize_identity(identity),
            },
            None => ConfigKey::IdentityOnly {
                identity: normalize_identity(key),
            },
        }
    }

    pub fn identity(&self) -> &str {
        match self {
            ConfigKey::ConnectorQualified { identity, .. } | ConfigKey::IdentityOnly { identity } => {
                identity
            }
        }
    }

    /// Whether this key can be satisfied by `token`
    pub fn accepts(&self, token: &SignatureToken) -> bool {
        let on_connector = match self {
            ConfigKey::ConnectorQualified { connector, .. } => token.connector() == connector,
            ConfigKey::IdentityOnly { .. } => true,
        };
        on_connector && token.identity() == self.identity()
    }

    fn is_qualified(&self) -> bool {
        matches!(self, ConfigKey::ConnectorQualified { .. })
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigKey::ConnectorQualified { connector, identity } => write!(f, "{connector}={identity}"),
            ConfigKey::IdentityOnly { identity } => f.write_str(identity),
        }
    }
}

fn normalize_identity(identity: &str) -> String {
    identity
        .trim()
        .chars()
        .map(|c| if c.is_whitespace() { '-' } else { c })
        .collect()
}

/// One xrandr option for an output, rendered as `--key [values...]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Setting {
    pub key: String,
    /// Argument words following the option; `--set PROP VALUE` has two
    pub values: Vec<String>,
}

impl Setting {
    pub fn new(key: impl Into<String>, value: Option<impl Into<String>>) -> Self {
        Self::with_values(key, value.into_iter().map(Into::into).collect())
    }

    pub fn with_values(key: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            key: key.into(),
            values,
        }
    }
}

/// What a configuration says about one output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputSettings {
    Enable(Vec<Setting>),
    /// The output is expected to be connected but must be switched off
    Disable,
}

/// A named display layout: config key → settings, in file order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Configuration {
    entries: Vec<(ConfigKey, OutputSettings)>,
}

impl Configuration {
    pub fn new(entries: Vec<(ConfigKey, OutputSettings)>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[(ConfigKey, OutputSettings)] {
        &self.entries
    }
}

/// All display layouts; earlier entries win ties
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigTable {
    configurations: Vec<(String, Configuration)>,
}

impl ConfigTable {
    pub fn new(configurations: Vec<(String, Configuration)>) -> Self {
        Self { configurations }
    }

    pub fn is_empty(&self) -> bool {
        self.configurations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.configurations.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Configuration)> {
        self.configurations
            .iter()
            .map(|(name, configuration)| (name.as_str(), configuration))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Enable(Vec<Setting>),
    Disable,
}

/// Final instruction for one output, handed to the apply step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    pub connector: String,
    pub action: Action,
}

impl Directive {
    pub fn enable(connector: impl Into<String>, settings: Vec<Setting>) -> Self {
        Self {
            connector: connector.into(),
            action: Action::Enable(settings),
        }
    }

    pub fn disable(connector: impl Into<String>) -> Self {
        Self {
            connector: connector.into(),
            action: Action::Disable,
        }
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.action {
            Action::Disable => write!(f, "disable {}", self.connector),
            Action::Enable(settings) => {
                write!(f, "enable {}", self.connector)?;
                for setting in settings {
                    write!(f, " {}", setting.key)?;
                    if !setting.values.is_empty() {
                        write!(f, "={}", setting.values.join(","))?;
                    }
                }
                Ok(())
            }
        }
    }
}

/// Result of matching a live signature against the configuration table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchOutcome {
    /// Name of the selected configuration and its directives
    pub matched: Option<(String, Vec<Directive>)>,
    /// Sorted, comma-joined live tokens
    pub signature: String,
}

/// Canonical text form of a live signature
pub fn signature_string(live: &BTreeSet<SignatureToken>) -> String {
    live.iter()
        .map(SignatureToken::as_str)
        .collect::<Vec<_>>()
        .join(",")
}

/// Find the first configuration in `table` that exactly accounts for `live`
pub fn match_signature(live: &BTreeSet<SignatureToken>, table: &ConfigTable) -> MatchOutcome {
    let signature = signature_string(live);
    let tokens: Vec<&SignatureToken> = live.iter().collect();

    for (name, configuration) in table.iter() {
        if configuration.len() != tokens.len() {
            continue;
        }

        if let Some(assignment) = assign(configuration, &tokens) {
            for key in &assignment.ambiguous {
                warn!(
                    configuration = name,
                    key = %key,
                    "Identity is reported by several connected outputs; qualify the key with a connector to pin it"
                );
            }
            debug!(configuration = name, signature = %signature, "Display configuration matched");
            return MatchOutcome {
                matched: Some((name.to_string(), assignment.directives)),
                signature,
            };
        }
    }

    debug!(signature = %signature, "No display configuration matched");
    MatchOutcome {
        matched: None,
        signature,
    }
}

struct Assignment {
    directives: Vec<Directive>,
    ambiguous: Vec<String>,
}

/// Bijectively assign the keys of `configuration` to `tokens`
fn assign(configuration: &Configuration, tokens: &[&SignatureToken]) -> Option<Assignment> {
    let entries = configuration.entries();
    let mut consumed = vec![false; tokens.len()];
    let mut slots: Vec<Option<usize>> = vec![None; entries.len()];
    let mut ambiguous = Vec::new();

    // Qualified keys can only ever match one token, so they go first and
    // bare keys never steal their outputs
    let qualified_first = entries
        .iter()
        .enumerate()
        .filter(|(_, (key, _))| key.is_qualified())
        .chain(entries.iter().enumerate().filter(|(_, (key, _))| !key.is_qualified()));

    for (slot, (key, _)) in qualified_first {
        let mut candidates = tokens
            .iter()
            .enumerate()
            .filter(|&(index, token)| !consumed[index] && key.accepts(token))
            .map(|(index, _)| index);

        let index = candidates.next()?;
        if candidates.next().is_some() {
            ambiguous.push(key.to_string());
        }
        consumed[index] = true;
        slots[slot] = Some(index);
    }

    if consumed.iter().any(|used| !used) {
        return None;
    }

    let directives = entries
        .iter()
        .zip(slots)
        .map(|((_, settings), slot)| {
            let connector = slot.map(|index| tokens[index].connector()).unwrap_or_default();
            match settings {
                OutputSettings::Enable(settings) => Directive::enable(connector, settings.clone()),
                OutputSettings::Disable => Directive::disable(connector),
            }
        })
        .collect();

    Some(Assignment { directives, ambiguous })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn live(tokens: &[&str]) -> BTreeSet<SignatureToken> {
        tokens
            .iter()
            .map(|token| SignatureToken::parse(token).unwrap())
            .collect()
    }

    fn mode(value: &str) -> OutputSettings {
        OutputSettings::Enable(vec![Setting::new("mode", Some(value))])
    }

    fn table(configurations: Vec<(&str, Vec<(&str, OutputSettings)>)>) -> ConfigTable {
        ConfigTable::new(
            configurations
                .into_iter()
                .map(|(name, entries)| {
                    let entries = entries
                        .into_iter()
                        .map(|(key, settings)| (ConfigKey::parse(key), settings))
                        .collect();
                    (name.to_string(), Configuration::new(entries))
                })
                .collect(),
        )
    }

    #[test]
    fn test_parse_key_forms() {
        assert_eq!(
            ConfigKey::parse("HDMI-1=DELL U2415:SN1"),
            ConfigKey::ConnectorQualified {
                connector: "HDMI-1".into(),
                identity: "DELL-U2415:SN1".into()
            }
        );
        assert_eq!(
            ConfigKey::parse("DELL-U2415"),
            ConfigKey::IdentityOnly {
                identity: "DELL-U2415".into()
            }
        );
        // Only the first '=' separates the connector
        assert_eq!(ConfigKey::parse("DP-1=a=b").identity(), "a=b");
    }

    #[test]
    fn test_docked_scenario() {
        let table = table(vec![
            ("docked", vec![("HDMI-1=SAMSUNG:SN123", mode("1920x1080"))]),
            ("laptop", vec![]),
        ]);
        let outcome = match_signature(&live(&["HDMI-1=SAMSUNG:SN123"]), &table);

        let (name, directives) = outcome.matched.unwrap();
        assert_eq!(name, "docked");
        assert_eq!(directives, vec![Directive::enable("HDMI-1", vec![Setting::new("mode", Some("1920x1080"))])]);
        assert_eq!(directives[0].to_string(), "enable HDMI-1 mode=1920x1080");
        assert_eq!(outcome.signature, "HDMI-1=SAMSUNG:SN123");
    }

    #[test]
    fn test_no_match_reports_signature() {
        let table = table(vec![
            ("docked", vec![("HDMI-1=SAMSUNG:SN123", mode("1920x1080"))]),
            ("dual", vec![("HDMI-1=UNKNOWN", mode("1920x1080")), ("eDP-1=", mode("1920x1080"))]),
        ]);
        let outcome = match_signature(&live(&["HDMI-1=UNKNOWN"]), &table);
        assert_eq!(outcome.matched, None);
        assert_eq!(outcome.signature, "HDMI-1=UNKNOWN");
    }

    #[test]
    fn test_empty_signature_matches_only_empty_configuration() {
        let table = table(vec![
            ("single", vec![("eDP-1=", mode("1920x1080"))]),
            ("headless", vec![]),
        ]);
        let outcome = match_signature(&BTreeSet::new(), &table);
        assert_eq!(outcome.matched, Some(("headless".to_string(), vec![])));
        assert_eq!(outcome.signature, "");
    }

    #[test]
    fn test_bare_identity_matches_any_connector() {
        let table = table(vec![(
            "desk",
            vec![("DELL:A1", mode("2560x1440")), ("eDP-1=LGD", OutputSettings::Disable)],
        )]);

        for connector in ["DP-1", "HDMI-2"] {
            let token = format!("{connector}=DELL:A1");
            let outcome = match_signature(&live(&[&token, "eDP-1=LGD"]), &table);
            let (_, directives) = outcome.matched.unwrap();
            assert_eq!(
                directives,
                vec![
                    Directive::enable(connector, vec![Setting::new("mode", Some("2560x1440"))]),
                    Directive::disable("eDP-1"),
                ]
            );
        }
    }

    #[test]
    fn test_leftover_live_token_rejects() {
        // Same size, but two keys want the same single monitor
        let table = table(vec![("twice", vec![("DELL", mode("a")), ("HDMI-1=DELL", mode("b"))])]);
        let outcome = match_signature(&live(&["HDMI-1=DELL", "DP-1=LG"]), &table);
        assert_eq!(outcome.matched, None);
    }

    #[test]
    fn test_qualified_key_wins_over_bare_key_regardless_of_order() {
        // The bare key is listed first but must not take DP-1
        let table = table(vec![(
            "twins",
            vec![("DELL", mode("left")), ("DP-1=DELL", mode("right"))],
        )]);
        let outcome = match_signature(&live(&["DP-1=DELL", "DP-2=DELL"]), &table);
        let (_, directives) = outcome.matched.unwrap();
        assert_eq!(directives[0].connector, "DP-2");
        assert_eq!(directives[1].connector, "DP-1");
    }

    #[test]
    fn test_duplicate_identities_use_sorted_assignment() {
        let table = table(vec![("twins", vec![("DELL", mode("left")), ("DELL", mode("right"))])]);
        let outcome = match_signature(&live(&["DP-2=DELL", "DP-1=DELL"]), &table);
        let (_, directives) = outcome.matched.unwrap();
        assert_eq!(directives[0].connector, "DP-1");
        assert_eq!(directives[1].connector, "DP-2");
    }

    #[test]
    fn test_table_order_breaks_ties() {
        let table = table(vec![
            ("specific", vec![("HDMI-1=SAMSUNG", mode("1920x1080"))]),
            ("generic", vec![("SAMSUNG", mode("1280x720"))]),
        ]);
        let outcome = match_signature(&live(&["HDMI-1=SAMSUNG"]), &table);
        assert_eq!(outcome.matched.unwrap().0, "specific");

        let outcome = match_signature(&live(&["HDMI-2=SAMSUNG"]), &table);
        assert_eq!(outcome.matched.unwrap().0, "generic");
    }

    #[test]
    fn test_signature_is_independent_of_enumeration_order() {
        let a = live(&["HDMI-1=X", "DP-1=Y", "eDP-1=Z"]);
        let b = live(&["eDP-1=Z", "HDMI-1=X", "DP-1=Y"]);
        assert_eq!(signature_string(&a), "DP-1=Y,HDMI-1=X,eDP-1=Z");
        assert_eq!(signature_string(&a), signature_string(&b));
    }

    #[test]
    fn test_match_is_idempotent_and_accounts_for_every_token() {
        let table = table(vec![(
            "triple",
            vec![
                ("eDP-1=Z", mode("1920x1080")),
                ("X", OutputSettings::Disable),
                ("DP-1=Y", mode("2560x1440")),
            ],
        )]);
        let signature = live(&["HDMI-1=X", "DP-1=Y", "eDP-1=Z"]);

        let first = match_signature(&signature, &table);
        let second = match_signature(&signature, &table);
        assert_eq!(first, second);

        let (_, directives) = first.matched.unwrap();
        assert_eq!(directives.len(), signature.len());
        let connectors: BTreeSet<_> = directives.iter().map(|d| d.connector.as_str()).collect();
        let expected: BTreeSet<_> = signature.iter().map(SignatureToken::connector).collect();
        assert_eq!(connectors, expected);
    }

    #[test]
    fn test_directive_display() {
        let directive = Directive::enable(
            "DP-1",
            vec![Setting::new("mode", Some("1920x1080")), Setting::new("primary", None::<String>)],
        );
        assert_eq!(directive.to_string(), "enable DP-1 mode=1920x1080 primary");
        let directive = Directive::enable("HDMI-1", vec![Setting::with_values("set", vec!["audio".into(), "on".into()])]);
        assert_eq!(directive.to_string(), "enable HDMI-1 set=audio,on");
        assert_eq!(Directive::disable("VGA-1").to_string(), "disable VGA-1");
    }
}
