use secrecy::{ExposeSecret, SecretString};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

/// Key the API token is stored under
const TOKEN_KEY: &str = "token";

/// Supplies the current API credential at call time.
///
/// The session never owns the credential's lifecycle; it asks for it each
/// time a request or stream is opened.
pub trait CredentialProvider: Send + Sync {
    fn credential(&self) -> Option<SecretString>;
}

impl<F> CredentialProvider for F
where
    F: Fn() -> Option<SecretString> + Send + Sync,
{
    fn credential(&self) -> Option<SecretString> {
        self()
    }
}

/// A fixed credential, e.g. passed on the command line.
#[derive(Debug)]
pub struct StaticCredential(SecretString);

impl StaticCredential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(SecretString::new(token.into()))
    }
}

impl CredentialProvider for StaticCredential {
    fn credential(&self) -> Option<SecretString> {
        Some(SecretString::new(self.0.expose_secret().clone()))
    }
}

/// File-backed credential storage
///
/// Keeps the API token in a JSON file located in the user's home
/// directory, readable only by the owner.
#[derive(Debug)]
pub struct CredentialStore {
    /// Map of keys to secret values
    secrets: HashMap<String, SecretString>,
    /// Path to the credentials file
    file_path: PathBuf,
}

impl CredentialStore {
    /// Opens the store at the default path (~/.lexchat/credentials.json)
    pub fn new() -> io::Result<Self> {
        let home_dir = dirs::home_dir().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, "Could not find home directory")
        })?;
        Self::with_path(home_dir.join(".lexchat").join("credentials.json"))
    }

    /// Opens the store at an explicit path, loading any existing secrets.
    pub fn with_path(file_path: impl Into<PathBuf>) -> io::Result<Self> {
        let file_path = file_path.into();
        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut store = CredentialStore {
            secrets: HashMap::new(),
            file_path,
        };

        store.load()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    fn load(&mut self) -> io::Result<()> {
        match File::open(&self.file_path) {
            Ok(mut file) => {
                let mut contents = String::new();
                file.read_to_string(&mut contents)?;
                let secrets: HashMap<String, String> = serde_json::from_str(&contents)
                    .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err.to_string()))?;
                self.secrets = secrets
                    .into_iter()
                    .map(|(key, value)| (key, SecretString::new(value)))
                    .collect();
                Ok(())
            }
            Err(ref e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn save(&self) -> io::Result<()> {
        let secrets: HashMap<String, String> = self
            .secrets
            .iter()
            .map(|(key, value)| (key.clone(), value.expose_secret().clone()))
            .collect();
        let contents = serde_json::to_string_pretty(&secrets)?;
        let mut file = open_owner_only(&self.file_path)?;
        // `mode` only applies to new files; tighten an existing one before
        // the token is written.
        restrict_permissions(&self.file_path)?;
        file.write_all(contents.as_bytes())
    }

    /// Stores the API token and writes the file
    pub fn set_token(&mut self, token: &str) -> io::Result<()> {
        self.secrets
            .insert(TOKEN_KEY.to_string(), SecretString::new(token.to_string()));
        self.save()
    }

    /// Removes the API token. Returns whether one was stored.
    pub fn clear_token(&mut self) -> io::Result<bool> {
        let removed = self.secrets.remove(TOKEN_KEY).is_some();
        if removed {
            self.save()?;
        }
        Ok(removed)
    }

    pub fn token(&self) -> Option<&SecretString> {
        self.secrets.get(TOKEN_KEY)
    }
}

impl CredentialProvider for CredentialStore {
    fn credential(&self) -> Option<SecretString> {
        self.token()
            .map(|token| SecretString::new(token.expose_secret().clone()))
    }
}

fn open_owner_only(path: &Path) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options.open(path)
}

fn restrict_permissions(path: &Path) -> io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}
