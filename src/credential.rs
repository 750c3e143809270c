//! Credential acquisition for the implicit grant flow.
//!
//! A [`Credential`] is recalled from a [`Store`] if one was persisted by an
//! earlier run. Otherwise it is taken from the fragment of the redirect the
//! identity provider sent the user back to:
//!
//! ```text
//! https://example.github.io/playheat/#access_token=BQD...&token_type=Bearer&expires_in=3600
//! ```
//!
//! When neither yields a token, the user has to be sent to
//! [`authorize_url`] to log in.

use std::{
    collections::HashMap,
    fmt, fs,
    io::Write,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use url::Url;
use veil::Redact;

use crate::{
    config::Config,
    error::{Error, Result},
};

/// Key under which the token is persisted.
pub const TOKEN_KEY: &str = "token";

/// Fragment field carrying the token.
const ACCESS_TOKEN_FIELD: &str = "access_token";

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Source {
    /// Parsed from a one-time redirect fragment.
    Redirect,
    /// Recalled from the persisted store.
    Store,
}

/// Opaque bearer token.
#[derive(Clone, Eq, PartialEq, Hash, Redact)]
pub struct Credential {
    #[redact]
    value: String,
    pub source: Source,
}

impl Credential {
    #[must_use]
    pub fn new(value: impl Into<String>, source: Source) -> Self {
        Self {
            value: value.into(),
            source,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.value
    }

    /// Value of the `Authorization` header.
    #[must_use]
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.value)
    }
}

/// Key-value store persisting the credential across runs.
pub trait Store {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&mut self, key: &str, value: &str) -> Result<()>;
    fn delete(&mut self, key: &str) -> Result<()>;
}

/// Navigational context that may carry a redirect fragment.
pub trait Location {
    /// The fragment without the leading `#`, if any.
    fn fragment(&self) -> Option<&str>;

    /// Removes the fragment so it is neither parsed twice nor leaked.
    fn clear_fragment(&mut self);
}

#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.entries.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn delete(&mut self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Store backed by a small TOML file of string keys.
///
/// Keep this file private: it grants access to the listening history of
/// the account.
#[derive(Clone, Debug)]
pub struct FileStore {
    path: PathBuf,
}

#[derive(Default, Deserialize, Serialize)]
#[serde(transparent)]
struct Entries(HashMap<String, String>);

impl FileStore {
    /// Prevent out-of-memory condition: the file should be small.
    const MAX_FILE_SIZE: u64 = 4096;

    /// Owner read and write only: the file holds a bearer token.
    #[cfg(unix)]
    const FILE_MODE: u32 = 0o600;

    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<Entries> {
        let attributes = match fs::metadata(&self.path) {
            Ok(attributes) => attributes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Entries::default()),
            Err(e) => return Err(e.into()),
        };

        if attributes.len() > Self::MAX_FILE_SIZE {
            return Err(Error::invalid_argument(format!(
                "{} is too large",
                self.path.display()
            )));
        }

        let contents = fs::read_to_string(&self.path)?;
        toml::from_str(&contents).map_err(|e| {
            Error::invalid_argument(format!("{} format is invalid: {e}", self.path.display()))
        })
    }

    fn write(&self, entries: &Entries) -> Result<()> {
        if entries.0.is_empty() {
            return match fs::remove_file(&self.path) {
                Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
                _ => Ok(()),
            };
        }

        let contents = toml::to_string(entries)?;

        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        std::os::unix::fs::OpenOptionsExt::mode(&mut options, Self::FILE_MODE);

        let mut file = options.open(&self.path)?;
        // The mode above only applies to newly created files.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(fs::Permissions::from_mode(Self::FILE_MODE))?;
        }

        file.write_all(contents.as_bytes())?;
        Ok(())
    }
}

impl Store for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.read()?.0.remove(key))
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.read()?;
        entries.0.insert(key.to_owned(), value.to_owned());
        self.write(&entries)
    }

    fn delete(&mut self, key: &str) -> Result<()> {
        let mut entries = self.read()?;
        if entries.0.remove(key).is_some() {
            self.write(&entries)?;
        }
        Ok(())
    }
}

/// The URL the identity provider redirected to, as handed to us by the user.
#[derive(Clone, Debug, Default)]
pub struct RedirectUrl(Option<Url>);

impl RedirectUrl {
    #[must_use]
    pub fn new(url: Url) -> Self {
        Self(Some(url))
    }

    /// A location without any redirect payload.
    #[must_use]
    pub fn none() -> Self {
        Self(None)
    }

    #[must_use]
    pub fn url(&self) -> Option<&Url> {
        self.0.as_ref()
    }
}

impl Location for RedirectUrl {
    fn fragment(&self) -> Option<&str> {
        self.0.as_ref().and_then(Url::fragment)
    }

    fn clear_fragment(&mut self) {
        if let Some(url) = self.0.as_mut() {
            url.set_fragment(None);
        }
    }
}

impl fmt::Display for RedirectUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Some(url) => write!(f, "{url}"),
            None => write!(f, "(none)"),
        }
    }
}

/// Extracts the `access_token` field of a `key=value&key=value` fragment.
#[must_use]
pub fn parse_fragment(fragment: &str) -> Option<String> {
    url::form_urlencoded::parse(fragment.as_bytes())
        .find(|(key, _)| key == ACCESS_TOKEN_FIELD)
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}

/// Recalls or extracts the credential.
///
/// A persisted credential wins over a redirect fragment. A token found in
/// the fragment is persisted and the fragment is cleared.
pub fn acquire<S, L>(store: &mut S, location: &mut L) -> Result<Option<Credential>>
where
    S: Store + ?Sized,
    L: Location + ?Sized,
{
    if let Some(token) = store.get(TOKEN_KEY)?.filter(|token| !token.is_empty()) {
        debug!("using persisted credential");
        return Ok(Some(Credential::new(token, Source::Store)));
    }

    let Some(token) = location.fragment().and_then(parse_fragment) else {
        debug!("no credential available");
        return Ok(None);
    };

    store.set(TOKEN_KEY, &token)?;
    location.clear_fragment();
    info!("stored credential from redirect");

    Ok(Some(Credential::new(token, Source::Redirect)))
}

/// Forgets the persisted credential.
pub fn purge<S>(store: &mut S) -> Result<()>
where
    S: Store + ?Sized,
{
    store.delete(TOKEN_KEY)?;
    info!("credential purged");
    Ok(())
}

/// Builds the authorization URL of the implicit grant flow.
#[must_use]
pub fn authorize_url(config: &Config) -> Url {
    let mut url = config.authorize_url.clone();
    url.query_pairs_mut()
        .append_pair("client_id", &config.client_id)
        .append_pair("redirect_uri", config.redirect_uri.as_str())
        .append_pair("scope", &config.scope)
        .append_pair("response_type", "token")
        .append_pair("show_dialog", "true");
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    fn redirect(url: &str) -> RedirectUrl {
        RedirectUrl::new(Url::parse(url).unwrap())
    }

    #[test]
    fn fragment_token_is_persisted_and_cleared() {
        let mut store = MemoryStore::new();
        let mut location =
            redirect("https://example.com/app/#access_token=abc123&token_type=Bearer");

        let credential = acquire(&mut store, &mut location).unwrap().unwrap();

        assert_eq!(credential.as_str(), "abc123");
        assert_eq!(credential.source, Source::Redirect);
        assert_eq!(store.get(TOKEN_KEY).unwrap().as_deref(), Some("abc123"));
        assert_eq!(location.fragment(), None);
        assert_eq!(location.url().unwrap().as_str(), "https://example.com/app/");
    }

    #[test]
    fn persisted_token_wins_over_fragment() {
        let mut store = MemoryStore::new();
        store.set(TOKEN_KEY, "stored").unwrap();
        let mut location = redirect("https://example.com/#access_token=fresh");

        let credential = acquire(&mut store, &mut location).unwrap().unwrap();

        assert_eq!(credential.as_str(), "stored");
        assert_eq!(credential.source, Source::Store);
        assert_eq!(location.fragment(), Some("access_token=fresh"));
    }

    #[test]
    fn no_token_anywhere_is_absent() {
        let mut store = MemoryStore::new();
        assert!(acquire(&mut store, &mut RedirectUrl::none()).unwrap().is_none());

        let mut location = redirect("https://example.com/#error=access_denied");
        assert!(acquire(&mut store, &mut location).unwrap().is_none());
    }

    #[test]
    fn fragment_parsing() {
        assert_eq!(
            parse_fragment("token_type=Bearer&access_token=x%2By&expires_in=3600"),
            Some("x+y".to_owned())
        );
        assert_eq!(parse_fragment("access_token="), None);
        assert_eq!(parse_fragment("access_token_type=x"), None);
        assert_eq!(parse_fragment(""), None);
    }

    #[test]
    fn purge_forgets_credential() {
        let mut store = MemoryStore::new();
        store.set(TOKEN_KEY, "stale").unwrap();

        purge(&mut store).unwrap();

        assert!(acquire(&mut store, &mut RedirectUrl::none()).unwrap().is_none());
    }

    #[test]
    fn debug_output_redacts_token() {
        let credential = Credential::new("supersecret", Source::Store);
        assert!(!format!("{credential:?}").contains("supersecret"));
        assert_eq!(credential.bearer(), "Bearer supersecret");
    }

    #[test]
    fn file_store_round_trips_and_deletes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.toml");
        let mut store = FileStore::new(&path);

        assert_eq!(store.get(TOKEN_KEY).unwrap(), None);
        store.set(TOKEN_KEY, "abc").unwrap();
        assert_eq!(FileStore::new(&path).get(TOKEN_KEY).unwrap().as_deref(), Some("abc"));

        store.delete(TOKEN_KEY).unwrap();
        assert!(!path.exists());
        assert_eq!(store.get(TOKEN_KEY).unwrap(), None);
    }

    #[cfg(unix)]
    #[test]
    fn file_store_is_private_to_owner() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let fresh = dir.path().join("fresh.toml");
        let existing = dir.path().join("existing.toml");
        fs::write(&existing, "").unwrap();
        fs::set_permissions(&existing, fs::Permissions::from_mode(0o644)).unwrap();

        for path in [&fresh, &existing] {
            FileStore::new(path).set(TOKEN_KEY, "abc").unwrap();
            let mode = fs::metadata(path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600, "{}", path.display());
        }
    }

    #[test]
    fn authorize_url_encodes_parameters() {
        let config = Config::new();
        let url = authorize_url(&config);

        assert_eq!(url.host_str(), Some("accounts.spotify.com"));
        let pairs: HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs["client_id"], config.client_id);
        assert_eq!(pairs["redirect_uri"], Config::DEFAULT_REDIRECT_URI);
        assert_eq!(pairs["scope"], "user-read-recently-played");
        assert_eq!(pairs["response_type"], "token");
        assert_eq!(pairs["show_dialog"], "true");
        assert!(url.as_str().contains("redirect_uri=https%3A%2F%2F"));
    }
}
