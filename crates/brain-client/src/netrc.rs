//! Host-keyed basic-auth credentials from a netrc file.
//!
//! The file must be readable by its owner only; anything looser is refused.

use std::path::{Path, PathBuf};
use tracing::warn;

use crate::error::{Error, ErrorKind, Result};

/// Login details for one host.
///
/// The password is redacted in Debug output.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct NetrcEntry {
    pub login: String,
    pub password: String,
    pub account: Option<String>,
}

impl std::fmt::Debug for NetrcEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetrcEntry")
            .field("login", &self.login)
            .field("password", &"[REDACTED]")
            .field("account", &self.account)
            .finish()
    }
}

/// Parsed netrc credential store.
#[derive(Debug, Clone, Default)]
pub struct NetrcStore {
    path: Option<PathBuf>,
    machines: Vec<(String, NetrcEntry)>,
    default: Option<NetrcEntry>,
}

impl NetrcStore {
    /// `~/.netrc`, if a home directory can be determined.
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".netrc"))
    }

    /// Open and parse the file at `path`, enforcing owner-only permissions.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(Error::new(ErrorKind::Credentials(
                "No .netrc file found in your HOME directory!".to_string(),
            )));
        }
        check_permissions(path)?;

        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::with_source(
                ErrorKind::Credentials(format!("could not read {}: {e}", path.display())),
                e,
            )
        })?;

        let mut store = Self::parse(&text)?;
        store.path = Some(path.to_path_buf());
        Ok(store)
    }

    /// Parse netrc text.
    pub fn parse(text: &str) -> Result<Self> {
        let mut store = Self::default();
        let mut tokens = tokenize(text).into_iter();

        // (machine name or None for `default`, entry being filled)
        let mut current: Option<(Option<String>, NetrcEntry)> = None;

        while let Some(token) = tokens.next() {
            match token.as_str() {
                "machine" | "default" => {
                    if let Some(done) = current.take() {
                        store.push(done);
                    }
                    let name = if token == "machine" {
                        Some(expect_value(&mut tokens, "machine")?)
                    } else {
                        None
                    };
                    current = Some((name, NetrcEntry::default()));
                }
                "login" | "user" | "password" | "passwd" | "account" => {
                    let value = expect_value(&mut tokens, &token)?;
                    let Some((_, entry)) = current.as_mut() else {
                        return Err(parse_error(format!("{token:?} outside of a machine entry")));
                    };
                    match token.as_str() {
                        "login" | "user" => entry.login = value,
                        "password" | "passwd" => entry.password = value,
                        _ => entry.account = Some(value),
                    }
                }
                other => return Err(parse_error(format!("unexpected token {other:?}"))),
            }
        }
        if let Some(done) = current.take() {
            store.push(done);
        }

        Ok(store)
    }

    fn push(&mut self, (name, entry): (Option<String>, NetrcEntry)) {
        match name {
            Some(host) => self.machines.push((host, entry)),
            None => self.default = Some(entry),
        }
    }

    /// The file this store was loaded from.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Credentials for `host`, falling back to the `default` entry.
    ///
    /// A host listed more than once resolves to its last entry.
    pub fn lookup(&self, host: &str) -> Option<&NetrcEntry> {
        self.machines
            .iter()
            .rev()
            .find(|(name, _)| name.eq_ignore_ascii_case(host))
            .map(|(_, entry)| entry)
            .or(self.default.as_ref())
    }

    /// Host names with an explicit entry.
    pub fn hosts(&self) -> impl Iterator<Item = &str> {
        self.machines.iter().map(|(name, _)| name.as_str())
    }

    /// Returns true if every host has an explicit entry; warns for each missing one.
    pub fn check(&self, hosts: &[&str]) -> bool {
        let mut complete = true;
        for host in hosts {
            if !self.hosts().any(|name| name.eq_ignore_ascii_case(host)) {
                warn!(host, "host not found in netrc, remote access to it will be unauthenticated");
                complete = false;
            }
        }
        complete
    }
}

fn parse_error(message: String) -> Error {
    Error::new(ErrorKind::Credentials(format!("malformed .netrc: {message}")))
}

fn expect_value(tokens: &mut impl Iterator<Item = String>, keyword: &str) -> Result<String> {
    tokens
        .next()
        .ok_or_else(|| parse_error(format!("missing value after {keyword:?}")))
}

/// Split into whitespace-separated tokens, honouring double quotes and
/// skipping `macdef` bodies (which run to the next blank line).
fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut in_macro = false;

    for line in text.lines() {
        if in_macro {
            if line.trim().is_empty() {
                in_macro = false;
            }
            continue;
        }
        if line.trim_start().starts_with('#') {
            continue;
        }

        let mut chars = line.chars().peekable();
        while let Some(&c) = chars.peek() {
            if c.is_whitespace() {
                chars.next();
                continue;
            }
            let mut token = String::new();
            if c == '"' {
                chars.next();
                while let Some(c) = chars.next() {
                    match c {
                        '"' => break,
                        '\\' => token.extend(chars.next()),
                        _ => token.push(c),
                    }
                }
            } else {
                while let Some(&c) = chars.peek() {
                    if c.is_whitespace() {
                        break;
                    }
                    token.push(c);
                    chars.next();
                }
            }

            if token == "macdef" {
                // macro name follows on this line, body on the next lines
                in_macro = true;
                break;
            }
            tokens.push(token);
        }
    }

    tokens
}

#[cfg(unix)]
fn check_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mode = std::fs::metadata(path)
        .map_err(|e| {
            Error::with_source(
                ErrorKind::Credentials(format!("could not stat {}: {e}", path.display())),
                e,
            )
        })?
        .permissions()
        .mode();

    if mode & 0o077 != 0 {
        return Err(Error::new(ErrorKind::Credentials(
            "your .netrc file does not have 600 permissions. Please fix this by running chmod 600 on it."
                .to_string(),
        )));
    }
    Ok(())
}

#[cfg(not(unix))]
fn check_permissions(_path: &Path) -> Result<()> {
    Ok(())
}
