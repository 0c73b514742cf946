//! Database login handling.
//!
//! Credentials live in two `key=value` files, one for usernames and one for
//! passwords, so one pair of files can hold logins for several targets. The
//! password is base64 encoded on disk. That keeps it out of plain sight; it
//! is not encryption.

use crate::error::{Result, SqlrigError};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::collections::HashMap;
use std::path::Path;

pub fn obfuscate(plain: &str) -> String {
    STANDARD.encode(plain.as_bytes())
}

pub fn deobfuscate(encoded: &str) -> Result<String> {
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|e| SqlrigError::Credentials(format!("stored password is not valid base64: {e}")))?;
    String::from_utf8(bytes)
        .map_err(|_| SqlrigError::Credentials("stored password is not valid UTF-8".to_string()))
}

/// Find `key` in a `key=value` file. A missing file yields `None`. A line
/// holding only the key yields an empty value.
pub fn lookup_from_file(file: &Path, key: &str) -> Result<Option<String>> {
    if !file.is_file() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(file)?;
    for line in content.lines() {
        match line.split_once('=') {
            Some((k, v)) if k == key => return Ok(Some(v.to_string())),
            None if line == key => return Ok(Some(String::new())),
            _ => {}
        }
    }
    Ok(None)
}

/// Append `key=value` to `file`, creating it and its directory if needed.
pub fn store_to_file(file: &Path, key: &str, value: &str) -> Result<()> {
    crate::io::append_text(file, &format!("{key}={value}\n"))
}

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Asks the user for a login.
pub trait CredentialPrompt {
    fn username(&mut self, prompt: &str) -> Result<String>;
    fn password(&mut self, prompt: &str) -> Result<String>;
}

/// Credentials resolved during one process, keyed by credential key.
#[derive(Debug, Default)]
pub struct CredentialStore {
    resolved: HashMap<String, Credentials>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the credentials for `key`, from this store, from the files or
    /// by asking. Asked credentials are written to the files when both are
    /// given.
    pub fn get_credentials(
        &mut self,
        key: &str,
        username_file: Option<&Path>,
        password_file: Option<&Path>,
        prompt: &mut dyn CredentialPrompt,
    ) -> Result<Credentials> {
        if let Some(found) = self.resolved.get(key) {
            return Ok(found.clone());
        }

        let creds = match (username_file, password_file) {
            (Some(ufile), Some(pfile)) => {
                match (lookup_from_file(ufile, key)?, lookup_from_file(pfile, key)?) {
                    (Some(username), Some(stored)) => Credentials {
                        username,
                        password: deobfuscate(&stored)?,
                    },
                    _ => {
                        tracing::info!(
                            username_file = %ufile.display(),
                            password_file = %pfile.display(),
                            "credentials are not yet defined; they will be stored"
                        );
                        let creds = ask(prompt)?;
                        store_to_file(ufile, key, &creds.username)?;
                        store_to_file(pfile, key, &obfuscate(&creds.password))?;
                        creds
                    }
                }
            }
            _ => ask(prompt)?,
        };

        self.resolved.insert(key.to_string(), creds.clone());
        Ok(creds)
    }
}

fn ask(prompt: &mut dyn CredentialPrompt) -> Result<Credentials> {
    let username = prompt.username("Username")?;
    let password = prompt.password("Password")?;
    Ok(Credentials { username, password })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct Scripted {
        asked: usize,
    }

    impl CredentialPrompt for Scripted {
        fn username(&mut self, _prompt: &str) -> Result<String> {
            self.asked += 1;
            Ok("deployer".to_string())
        }

        fn password(&mut self, _prompt: &str) -> Result<String> {
            Ok("p4ss=word".to_string())
        }
    }

    #[test]
    fn obfuscation_reverses() {
        let encoded = obfuscate("s3cret!");
        assert_ne!(encoded, "s3cret!");
        assert_eq!(deobfuscate(&encoded).unwrap(), "s3cret!");
        assert!(deobfuscate("not base64 ***").is_err());
    }

    #[test]
    fn lookup_handles_missing_file_and_keys() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("username");
        assert_eq!(lookup_from_file(&file, "cred").unwrap(), None);

        std::fs::write(&file, "sql01_DW=alice\ntrusted\nsql02_DW=bob=smith\n").unwrap();
        assert_eq!(lookup_from_file(&file, "sql01_DW").unwrap().as_deref(), Some("alice"));
        assert_eq!(
            lookup_from_file(&file, "sql02_DW").unwrap().as_deref(),
            Some("bob=smith")
        );
        assert_eq!(lookup_from_file(&file, "trusted").unwrap().as_deref(), Some(""));
        assert_eq!(lookup_from_file(&file, "other").unwrap(), None);
    }

    #[test]
    fn asks_once_then_reads_files() {
        let dir = TempDir::new().unwrap();
        let ufile = dir.path().join(".sqlrig/username");
        let pfile = dir.path().join(".sqlrig/password");
        let mut prompt = Scripted { asked: 0 };

        let mut store = CredentialStore::new();
        let creds = store
            .get_credentials("sql01_DW", Some(&ufile), Some(&pfile), &mut prompt)
            .unwrap();
        assert_eq!(creds.username, "deployer");
        assert_eq!(creds.password, "p4ss=word");
        assert_eq!(prompt.asked, 1);

        let stored = std::fs::read_to_string(&pfile).unwrap();
        assert!(!stored.contains("p4ss"));

        // Same store: served from memory.
        store
            .get_credentials("sql01_DW", Some(&ufile), Some(&pfile), &mut prompt)
            .unwrap();
        assert_eq!(prompt.asked, 1);

        // Fresh store: served from files.
        let again = CredentialStore::new()
            .get_credentials("sql01_DW", Some(&ufile), Some(&pfile), &mut prompt)
            .unwrap();
        assert_eq!(again, creds);
        assert_eq!(prompt.asked, 1);
    }

    #[test]
    fn without_files_always_asks_per_store() {
        let mut prompt = Scripted { asked: 0 };
        CredentialStore::new()
            .get_credentials("k", None, None, &mut prompt)
            .unwrap();
        CredentialStore::new()
            .get_credentials("k", None, None, &mut prompt)
            .unwrap();
        assert_eq!(prompt.asked, 2);
    }

    #[test]
    fn debug_redacts_password() {
        let creds = Credentials {
            username: "u".into(),
            password: "hunter2".into(),
        };
        assert!(!format!("{creds:?}").contains("hunter2"));
    }
}
