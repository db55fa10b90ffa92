use crate::{
    api::Authenticator,
    error::ConsoleError,
};
use anyhow::{
    Context,
    Result,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    fmt,
    fs,
    io::{
        self,
        Write,
    },
    path::{
        Path,
        PathBuf,
    },
};

/// Opaque bearer credential issued by `POST /login`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthToken(String);

impl AuthToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthToken(<redacted>)")
    }
}

#[derive(Serialize, Deserialize)]
struct StoredSession {
    token: AuthToken,
}

/// JSON file holding the operator's token between runs.
#[derive(Clone, Debug)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Option<AuthToken>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let data = fs::read(&self.path).with_context(|| {
            format!("Failed to read session file {}", self.path.display())
        })?;
        if data.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        let stored: StoredSession = serde_json::from_slice(&data).with_context(|| {
            format!("Failed to parse session file {}", self.path.display())
        })?;
        if stored.token.expose().is_empty() {
            return Ok(None);
        }
        Ok(Some(stored.token))
    }

    pub fn save(&self, token: &AuthToken) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create session directory {}", parent.display())
            })?;
        }
        let json = serde_json::to_vec_pretty(&StoredSession {
            token: token.clone(),
        })
        .context("Failed to serialize session")?;
        let mut file = open_private(&self.path).with_context(|| {
            format!("Failed to open session file {}", self.path.display())
        })?;
        file.write_all(&json).with_context(|| {
            format!("Failed to write session file {}", self.path.display())
        })?;
        // a file left by an older run keeps its old mode until tightened here
        restrict_permissions(&self.path)
    }

    pub fn clear(&self) -> Result<()> {
        if !self.path.exists() {
            return Ok(());
        }
        fs::remove_file(&self.path).with_context(|| {
            format!("Failed to remove session file {}", self.path.display())
        })
    }
}

/// Opens for writing; a newly created file is readable by the owner only.
fn open_private(path: &Path) -> io::Result<fs::File> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options.open(path)
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).with_context(|| {
        format!("Failed to restrict permissions on {}", path.display())
    })
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

/// The operator's authenticated session for this process.
///
/// Created once at startup from the [`TokenStore`]; every API client is built
/// from the token held here.
#[derive(Debug)]
pub struct Session {
    store: TokenStore,
    token: Option<AuthToken>,
}

impl Session {
    /// An unreadable session file is treated as logged out.
    pub fn start(store: TokenStore) -> Self {
        let token = match store.load() {
            Ok(token) => token,
            Err(err) => {
                tracing::warn!(error = %err, "ignoring unreadable session file");
                None
            }
        };
        tracing::info!(
            path = %store.path().display(),
            authenticated = token.is_some(),
            "session started"
        );
        Self { store, token }
    }

    pub fn token(&self) -> Option<&AuthToken> {
        self.token.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    pub fn store(&self) -> &TokenStore {
        &self.store
    }

    pub async fn login<A: Authenticator>(
        &mut self,
        authenticator: &A,
        username: &str,
        password: &str,
    ) -> Result<AuthToken, ConsoleError> {
        let token = match authenticator.login(username, password).await {
            Ok(token) => token,
            Err(err) => {
                tracing::warn!(username, error = %err, "login failed");
                return Err(err);
            }
        };
        self.store
            .save(&token)
            .map_err(|err| ConsoleError::SessionStorage(format!("{err:#}")))?;
        tracing::info!(username, "operator logged in");
        self.token = Some(token.clone());
        Ok(token)
    }

    pub fn logout(&mut self) -> Result<(), ConsoleError> {
        self.token = None;
        self.store
            .clear()
            .map_err(|err| ConsoleError::SessionStorage(format!("{err:#}")))?;
        tracing::info!("operator logged out");
        Ok(())
    }

    /// The API rejected the token; drop it so the next start asks for credentials.
    pub fn expire(&mut self) -> Result<(), ConsoleError> {
        tracing::warn!("session expired");
        self.logout()
    }
}
