//! Local storage for the vault identity's access key.
//!
//! The key minted at install time is written to the provider's shared
//! credentials file under a profile named after the identity, so that any
//! provider tooling can act as the vault identity. Teardown reads the key id
//! back to delete it from the provider, then removes the profile.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use strongbox_common::{Error, Result, ResultExt};
use zeroize::Zeroizing;

use crate::gateway::AccessKey;

/// Overrides the shared credentials file location.
pub const CREDENTIALS_FILE_ENV: &str = "AWS_SHARED_CREDENTIALS_FILE";
/// Overrides the shared config file location.
pub const CONFIG_FILE_ENV: &str = "AWS_CONFIG_FILE";

const ACCESS_KEY_ID: &str = "aws_access_key_id";
const SECRET_ACCESS_KEY: &str = "aws_secret_access_key";
const REGION: &str = "region";

/// Where the vault identity's access key lives on this machine.
pub trait AccessKeyStore: Send + Sync {
    /// Store the key and default region under `profile`, replacing any previous values.
    fn save(&self, profile: &str, key: &AccessKey, region: &str) -> Result<()>;

    /// Access key id stored under `profile`, if any.
    fn access_key_id(&self, profile: &str) -> Result<Option<String>>;

    /// Remove `profile`. Returns whether anything was removed.
    fn remove(&self, profile: &str) -> Result<bool>;
}

/// The provider's shared credentials and config files.
#[derive(Debug, Clone)]
pub struct SharedCredentialsFile {
    credentials_path: PathBuf,
    config_path: PathBuf,
}

impl SharedCredentialsFile {
    pub fn new(credentials_path: impl Into<PathBuf>, config_path: impl Into<PathBuf>) -> Self {
        Self {
            credentials_path: credentials_path.into(),
            config_path: config_path.into(),
        }
    }

    /// Resolve the file locations from the environment, falling back to
    /// `~/.aws/credentials` and `~/.aws/config`.
    pub fn from_env() -> Self {
        let aws_dir = directories::UserDirs::new().map_or_else(
            || PathBuf::from(".aws"),
            |dirs| dirs.home_dir().join(".aws"),
        );
        let resolve = |var: &str, default: &str| {
            std::env::var_os(var)
                .filter(|v| !v.is_empty())
                .map_or_else(|| aws_dir.join(default), PathBuf::from)
        };

        Self::new(
            resolve(CREDENTIALS_FILE_ENV, "credentials"),
            resolve(CONFIG_FILE_ENV, "config"),
        )
    }

    pub fn credentials_path(&self) -> &Path {
        &self.credentials_path
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }
}

/// Section header of a profile in the shared config file.
fn config_section(profile: &str) -> String {
    if profile == "default" {
        profile.to_string()
    } else {
        format!("profile {profile}")
    }
}

fn read_optional(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::from(e).with_context(format!("Unable to read {}", path.display()))),
    }
}

fn write_private(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).context(format!("Unable to create {}", parent.display()))?;
    }
    fs::write(path, content).context(format!("Unable to write {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))
            .context(format!("Unable to restrict permissions on {}", path.display()))?;
    }
    Ok(())
}

fn section_name(line: &str) -> Option<&str> {
    line.trim()
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .map(str::trim)
}

/// Line range `[start, end)` of a section, header included.
fn section_range(lines: &[&str], section: &str) -> Option<(usize, usize)> {
    let start = lines
        .iter()
        .position(|line| section_name(line) == Some(section))?;
    let end = lines[start + 1..]
        .iter()
        .position(|line| section_name(line).is_some())
        .map_or(lines.len(), |offset| start + 1 + offset);
    Some((start, end))
}

fn lookup(content: &str, section: &str, key: &str) -> Option<String> {
    let lines: Vec<&str> = content.lines().collect();
    let (start, end) = section_range(&lines, section)?;
    lines[start + 1..end].iter().find_map(|line| {
        let (k, v) = line.split_once('=')?;
        (k.trim() == key).then(|| v.trim().to_string())
    })
}

/// Replace `section` with the given values, appending it if absent.
fn upsert_section(content: &str, section: &str, values: &[(&str, &str)]) -> Zeroizing<String> {
    let lines: Vec<&str> = content.lines().collect();
    let mut body: Vec<String> = Vec::with_capacity(values.len() + 1);
    body.push(format!("[{section}]"));
    body.extend(values.iter().map(|(k, v)| format!("{k} = {v}")));

    let mut output: Vec<String> = Vec::with_capacity(lines.len() + body.len());
    match section_range(&lines, section) {
        Some((start, end)) => {
            output.extend(lines[..start].iter().map(|l| l.to_string()));
            // keep settings this store does not manage
            let managed: Vec<&str> = values.iter().map(|(k, _)| *k).collect();
            let kept = lines[start + 1..end].iter().filter(|line| {
                line.split_once('=')
                    .map_or(!line.trim().is_empty(), |(k, _)| !managed.contains(&k.trim()))
            });
            output.extend(body);
            output.extend(kept.map(|l| l.to_string()));
            output.push(String::new());
            output.extend(lines[end..].iter().map(|l| l.to_string()));
        }
        None => {
            output.extend(lines.iter().map(|l| l.to_string()));
            if output.last().is_some_and(|l| !l.trim().is_empty()) {
                output.push(String::new());
            }
            output.extend(body);
        }
    }

    let mut rendered = output.join("\n");
    rendered.push('\n');
    Zeroizing::new(rendered)
}

/// Drop `section` entirely. Returns `None` when it was not present.
fn remove_section(content: &str, section: &str) -> Option<String> {
    let lines: Vec<&str> = content.lines().collect();
    let (start, end) = section_range(&lines, section)?;
    let mut output: Vec<&str> = lines[..start].to_vec();
    output.extend_from_slice(&lines[end..]);
    let mut rendered = output.join("\n");
    if !rendered.is_empty() {
        rendered.push('\n');
    }
    Some(rendered)
}

impl AccessKeyStore for SharedCredentialsFile {
    fn save(&self, profile: &str, key: &AccessKey, region: &str) -> Result<()> {
        let credentials = read_optional(&self.credentials_path)?.unwrap_or_default();
        let updated = upsert_section(
            &credentials,
            profile,
            &[
                (ACCESS_KEY_ID, key.access_key_id.as_str()),
                (SECRET_ACCESS_KEY, key.secret_access_key.as_str()),
            ],
        );
        write_private(&self.credentials_path, &updated)?;

        let config = read_optional(&self.config_path)?.unwrap_or_default();
        let updated = upsert_section(&config, &config_section(profile), &[(REGION, region)]);
        write_private(&self.config_path, &updated)?;

        tracing::info!(
            profile = %profile,
            path = %self.credentials_path.display(),
            "Saved vault access key"
        );
        Ok(())
    }

    fn access_key_id(&self, profile: &str) -> Result<Option<String>> {
        Ok(read_optional(&self.credentials_path)?
            .and_then(|content| lookup(&content, profile, ACCESS_KEY_ID)))
    }

    fn remove(&self, profile: &str) -> Result<bool> {
        let mut removed = false;

        for (path, section) in [
            (&self.credentials_path, profile.to_string()),
            (&self.config_path, config_section(profile)),
        ] {
            let Some(content) = read_optional(path)? else {
                continue;
            };
            if let Some(updated) = remove_section(&content, &section) {
                write_private(path, &updated)?;
                removed = true;
            }
        }

        if removed {
            tracing::info!(profile = %profile, "Removed local vault profile");
        }
        Ok(removed)
    }
}

/// Access keys held in memory.
#[derive(Default)]
pub struct MemoryAccessKeyStore {
    entries: Mutex<HashMap<String, (AccessKey, String)>>,
    reject_saves: AtomicBool,
}

impl MemoryAccessKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later `save` fail.
    pub fn reject_saves(&self) {
        self.reject_saves.store(true, Ordering::SeqCst);
    }

    /// Region stored for `profile`.
    pub fn region(&self, profile: &str) -> Option<String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(profile)
            .map(|(_, region)| region.clone())
    }
}

impl AccessKeyStore for MemoryAccessKeyStore {
    fn save(&self, profile: &str, key: &AccessKey, region: &str) -> Result<()> {
        if self.reject_saves.load(Ordering::SeqCst) {
            return Err(Error::InvalidInput(format!(
                "profile {profile} cannot be written"
            )));
        }
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(profile.to_string(), (key.clone(), region.to_string()));
        Ok(())
    }

    fn access_key_id(&self, profile: &str) -> Result<Option<String>> {
        Ok(self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(profile)
            .map(|(key, _)| key.access_key_id.clone()))
    }

    fn remove(&self, profile: &str) -> Result<bool> {
        Ok(self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(profile)
            .is_some())
    }
}
