//! Vault configuration.
//!
//! The configuration lives in a line-oriented file under the user's home
//! directory (`~/.strongbox/strongbox.conf`):
//!
//! ```text
//! # Region where the vault lives
//! region = 'us-east-1'
//! identity_name = 'strongbox-user'
//! guardrail_enabled = False
//! ```
//!
//! Values may be single- or double-quoted. The literals `True` and `False`
//! are booleans. Lines starting with `#` are comments and lines that do not
//! look like `key = value` are skipped.
//!
//! A [`VaultConfig`] is built once at startup and handed to every component
//! by reference; nothing mutates it afterwards.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result, ResultExt};

/// Name of the configuration file inside [`config_dir`].
pub const CONFIG_FILE_NAME: &str = "strongbox.conf";

/// Every key the configuration file understands.
pub const KNOWN_KEYS: &[&str] = &[
    "region",
    "identity_name",
    "identity_policy_name",
    "key_alias",
    "param_path",
    "guardrail_enabled",
    "guardrail_policy_name",
    "member_role",
    "check_for_upgrades",
    "cleanup_old_versions",
];

/// Get the configuration directory.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".strongbox"),
        |dirs| dirs.home_dir().join(".strongbox"),
    )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    config_dir().join(CONFIG_FILE_NAME)
}

/// A single parsed configuration value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigValue {
    Bool(bool),
    Text(String),
}

/// Parse configuration file content into raw key/value pairs.
///
/// Later occurrences of a key override earlier ones.
pub fn parse_config_lines(content: &str) -> BTreeMap<String, ConfigValue> {
    let mut values = BTreeMap::new();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((key, raw)) = line.split_once('=') else {
            tracing::debug!(line = %line, "Skipping malformed configuration line");
            continue;
        };

        let key = key.trim();
        if key.is_empty() {
            continue;
        }

        let value = match unquote(raw.trim()) {
            "True" => ConfigValue::Bool(true),
            "False" => ConfigValue::Bool(false),
            other => ConfigValue::Text(other.to_string()),
        };
        values.insert(key.to_string(), value);
    }

    values
}

fn unquote(value: &str) -> &str {
    for quote in ['\'', '"'] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|v| v.strip_suffix(quote))
        {
            return inner;
        }
    }
    value
}

/// Settings for one vault installation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultConfig {
    /// Provider region hosting the key and the secret records
    pub region: String,
    /// Name of the dedicated vault identity (also the local credential profile)
    pub identity_name: String,
    /// Name of the inline access policy attached to the identity
    pub identity_policy_name: String,
    /// Key alias name, without the `alias/` prefix
    pub key_alias: String,
    /// Secret record path segment, without slashes
    pub param_path: String,
    /// Whether the organization-wide guardrail policy is part of the vault
    pub guardrail_enabled: bool,
    /// Guardrail policy name (required when the guardrail is enabled)
    pub guardrail_policy_name: Option<String>,
    /// Role ARN in the member account that holds the vault. The guardrail
    /// policy is attached to that account.
    pub member_role: Option<String>,
    pub check_for_upgrades: bool,
    pub cleanup_old_versions: bool,
}

impl VaultConfig {
    /// Load the configuration from the default location.
    pub fn load() -> Result<Self> {
        Self::load_from(&config_path())
    }

    /// Load the configuration from an explicit path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .context(format!("Unable to read configuration file {}", path.display()))?;
        let config = Self::parse(&content)?;

        tracing::debug!(path = %path.display(), "Loaded vault configuration");
        Ok(config)
    }

    /// Parse configuration file content.
    pub fn parse(content: &str) -> Result<Self> {
        Self::from_values(&parse_config_lines(content))
    }

    /// Build a configuration from parsed values.
    ///
    /// Missing keys are left empty; use
    /// [`validate_for`](Self::validate_for) to check them for an action.
    pub fn from_values(values: &BTreeMap<String, ConfigValue>) -> Result<Self> {
        let text = |key: &str| match values.get(key) {
            Some(ConfigValue::Text(v)) => Ok(v.clone()),
            Some(ConfigValue::Bool(b)) => Err(Error::Config(format!(
                "{key} must be text, found boolean {b}"
            ))),
            None => Ok(String::new()),
        };
        let flag = |key: &str| match values.get(key) {
            Some(ConfigValue::Bool(b)) => Ok(*b),
            Some(ConfigValue::Text(v)) => Err(Error::Config(format!(
                "{key} must be True or False, found '{v}'"
            ))),
            None => Ok(false),
        };
        let optional = |key: &str| -> Result<Option<String>> {
            Ok(Some(text(key)?).filter(|v| !v.is_empty()))
        };

        Ok(Self {
            region: text("region")?,
            identity_name: text("identity_name")?,
            identity_policy_name: text("identity_policy_name")?,
            key_alias: text("key_alias")?,
            param_path: text("param_path")?,
            guardrail_enabled: flag("guardrail_enabled")?,
            guardrail_policy_name: optional("guardrail_policy_name")?,
            member_role: optional("member_role")?,
            check_for_upgrades: flag("check_for_upgrades")?,
            cleanup_old_versions: flag("cleanup_old_versions")?,
        })
    }

    /// Full key alias, e.g. `alias/strongbox-key`.
    pub fn alias_name(&self) -> String {
        format!("alias/{}", self.key_alias)
    }

    /// Path prefix used to list every secret record, e.g. `/strongbox-vault`.
    pub fn records_root(&self) -> String {
        format!("/{}", self.param_path)
    }

    /// Storage path of one service's secret record.
    pub fn record_path(&self, service: &str) -> String {
        format!("/{}/{}", self.param_path, service)
    }

    /// ARN of the secret record path for the given account.
    pub fn secret_path_arn(&self, account_id: &str) -> String {
        format!(
            "arn:aws:ssm:{}:{}:parameter/{}",
            self.region, account_id, self.param_path
        )
    }

    /// Account id carried by `member_role`, e.g. `123456789012` for
    /// `arn:aws:iam::123456789012:role/vault`.
    pub fn member_account_id(&self) -> Option<&str> {
        let role = self.member_role.as_deref()?;
        let mut fields = role.split(':');
        if fields.next() != Some("arn") {
            return None;
        }
        fields
            .nth(3)
            .filter(|account| !account.is_empty() && account.bytes().all(|b| b.is_ascii_digit()))
    }

    /// Number of backing resources a complete installation consists of.
    pub fn required_component_count(&self) -> usize {
        if self.guardrail_enabled {
            3
        } else {
            2
        }
    }
}

/// Set one value in a configuration file, keeping every other line intact.
///
/// The last active line for the key is the one that takes effect, so that is
/// the line rewritten. Without an active line, a commented-out `# key = ...`
/// line is re-enabled. A known key with no line at all is appended.
pub fn set_config_value(path: &Path, key: &str, value: &str) -> Result<()> {
    if !KNOWN_KEYS.contains(&key) {
        return Err(Error::InvalidInput(format!(
            "{key} is not a known configuration key"
        )));
    }

    let content = fs::read_to_string(path)
        .context(format!("Unable to read configuration file {}", path.display()))?;

    let replacement = format!("{key} = '{value}'");
    let mut lines: Vec<String> = content.lines().map(str::to_string).collect();

    let active = lines
        .iter()
        .rposition(|line| key_line(line, key) == Some(KeyLine::Active));
    let target = active.or_else(|| {
        lines
            .iter()
            .position(|line| key_line(line, key) == Some(KeyLine::Commented))
    });

    match target {
        Some(index) => lines[index] = replacement,
        None => lines.push(replacement),
    }

    let mut output = lines.join("\n");
    output.push('\n');
    fs::write(path, output)
        .context(format!("Unable to write configuration file {}", path.display()))?;

    tracing::info!(key = %key, "Updated configuration value");
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyLine {
    Active,
    Commented,
}

fn key_line(line: &str, key: &str) -> Option<KeyLine> {
    let trimmed = line.trim_start();
    let (kind, body) = match trimmed.strip_prefix('#') {
        Some(rest) => (KeyLine::Commented, rest.trim_start_matches('#').trim_start()),
        None => (KeyLine::Active, trimmed),
    };
    body.strip_prefix(key)
        .is_some_and(|rest| rest.trim_start().starts_with('='))
        .then_some(kind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use test_case::test_case;

    const SAMPLE: &str = r#"
# Region where the vault lives
region = 'us-east-1'
identity_name = "strongbox-user"
identity_policy_name = 'strongbox-policy'
key_alias = 'strongbox-key'
param_path = 'strongbox-vault'

guardrail_enabled = False
# guardrail_policy_name = 'strongbox-guardrail'
check_for_upgrades = True
cleanup_old_versions = False
"#;

    #[test]
    fn parses_sample_file() {
        let config = VaultConfig::parse(SAMPLE).unwrap();
        assert_eq!(config.region, "us-east-1");
        assert_eq!(config.identity_name, "strongbox-user");
        assert_eq!(config.param_path, "strongbox-vault");
        assert!(!config.guardrail_enabled);
        assert!(config.guardrail_policy_name.is_none());
        assert!(config.check_for_upgrades);
        assert_eq!(config.required_component_count(), 2);
    }

    #[test_case("key = 'value'", "value" ; "single quotes")]
    #[test_case("key = \"value\"", "value" ; "double quotes")]
    #[test_case("key=value", "value" ; "no spaces")]
    #[test_case("  key   =   'a=b'  ", "a=b" ; "value containing equals")]
    fn parses_text_values(line: &str, expected: &str) {
        let values = parse_config_lines(line);
        assert_eq!(values.get("key"), Some(&ConfigValue::Text(expected.into())));
    }

    #[test_case("flag = True", true)]
    #[test_case("flag = 'False'", false)]
    fn parses_boolean_literals(line: &str, expected: bool) {
        let values = parse_config_lines(line);
        assert_eq!(values.get("flag"), Some(&ConfigValue::Bool(expected)));
    }

    #[test]
    fn skips_comments_and_garbage() {
        let values = parse_config_lines("# region = 'x'\nnot a setting\n= orphan\n");
        assert!(values.is_empty());
    }

    #[test]
    fn rejects_text_for_boolean_key() {
        let err = VaultConfig::parse("guardrail_enabled = 'yes'").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn derived_names() {
        let config = VaultConfig::parse(SAMPLE).unwrap();
        assert_eq!(config.alias_name(), "alias/strongbox-key");
        assert_eq!(config.records_root(), "/strongbox-vault");
        assert_eq!(config.record_path("github"), "/strongbox-vault/github");
        assert_eq!(
            config.secret_path_arn("123456789012"),
            "arn:aws:ssm:us-east-1:123456789012:parameter/strongbox-vault"
        );
    }

    #[test_case(Some("arn:aws:iam::210987654321:role/vault"), Some("210987654321") ; "role arn")]
    #[test_case(Some("arn:aws:iam:::role/vault"), None ; "no account")]
    #[test_case(Some("vault-role"), None ; "not an arn")]
    #[test_case(None, None ; "unset")]
    fn member_account_from_role(role: Option<&str>, expected: Option<&str>) {
        let config = VaultConfig {
            member_role: role.map(str::to_string),
            ..VaultConfig::default()
        };
        assert_eq!(config.member_account_id(), expected);
    }

    #[test]
    fn set_value_uncomments_existing_line() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(CONFIG_FILE_NAME);
        fs::write(&path, SAMPLE).unwrap();

        set_config_value(&path, "guardrail_policy_name", "vault-guardrail").unwrap();
        set_config_value(&path, "guardrail_enabled", "True").unwrap();

        let config = VaultConfig::load_from(&path).unwrap();
        assert!(config.guardrail_enabled);
        assert_eq!(
            config.guardrail_policy_name.as_deref(),
            Some("vault-guardrail")
        );
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("# Region where the vault lives"));
    }

    #[test]
    fn set_value_rewrites_active_line_over_commented_one() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "# region = 'eu-west-1'\nregion = 'us-east-1'\n").unwrap();

        set_config_value(&path, "region", "ap-south-1").unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, "# region = 'eu-west-1'\nregion = 'ap-south-1'\n");
        let values = parse_config_lines(&content);
        assert_eq!(
            values.get("region"),
            Some(&ConfigValue::Text("ap-south-1".into()))
        );
    }

    #[test]
    fn set_value_rewrites_last_of_duplicate_lines() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "region = 'eu-west-1'\nregion = 'us-east-1'\n").unwrap();

        set_config_value(&path, "region", "ap-south-1").unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, "region = 'eu-west-1'\nregion = 'ap-south-1'\n");
    }

    #[test]
    fn set_value_appends_missing_known_key() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(CONFIG_FILE_NAME);
        fs::write(&path, SAMPLE).unwrap();

        set_config_value(&path, "member_role", "arn:aws:iam::1:role/vault").unwrap();

        let config = VaultConfig::load_from(&path).unwrap();
        assert_eq!(config.member_role.as_deref(), Some("arn:aws:iam::1:role/vault"));
    }

    #[test]
    fn set_value_rejects_unknown_key() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(CONFIG_FILE_NAME);
        fs::write(&path, SAMPLE).unwrap();

        let err = set_config_value(&path, "colour", "blue").unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn load_missing_file_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let err = VaultConfig::load_from(&tmp.path().join("absent.conf")).unwrap_err();
        assert!(err.is_not_found());
    }
}
