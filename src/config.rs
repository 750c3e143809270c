//! Application configuration.
//!
//! [`Config`] carries everything the fetch cycle needs that is not a
//! credential: the OAuth client registration, the API endpoints, the
//! `User-Agent` and the bucketing preferences. Defaults can be overridden
//! from an optional TOML settings file:
//!
//! ```toml
//! client_id = "5822ece2416a4358bab39c7799c035d0"
//! redirect_uri = "https://example.github.io/playheat/"
//! since = "2023-01-01"
//! utc_offset = "+02:00"
//! ```

use std::{fs, path::Path};

use serde::Deserialize;
use time::{macros::date, macros::format_description, Date, UtcOffset};
use url::Url;

use crate::error::{Error, Result};

/// Settings files are a handful of lines; anything larger is not one.
const MAX_SETTINGS_SIZE: u64 = 4096;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub app_name: String,
    pub app_version: String,

    /// OAuth client identifier registered with the identity provider.
    pub client_id: String,

    /// Where the identity provider sends the user back to, carrying the
    /// token in the fragment.
    pub redirect_uri: Url,

    /// Requested permission scope.
    pub scope: String,

    pub authorize_url: Url,
    pub recently_played_url: Url,

    pub user_agent: String,

    /// First day of the daily heatmap.
    pub since: Date,

    /// Offset in which play timestamps are bucketed into days and hours.
    pub utc_offset: UtcOffset,
}

/// Overrides read from the settings file. Every field is optional.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub client_id: Option<String>,
    pub redirect_uri: Option<Url>,
    pub scope: Option<String>,
    pub since: Option<String>,
    pub utc_offset: Option<String>,
}

impl Config {
    pub const DEFAULT_CLIENT_ID: &'static str = "5822ece2416a4358bab39c7799c035d0";
    pub const DEFAULT_REDIRECT_URI: &'static str = "https://ellyhonig.github.io/music-heatmap/";
    pub const DEFAULT_SCOPE: &'static str = "user-read-recently-played";

    const AUTHORIZE_URL: &'static str = "https://accounts.spotify.com/authorize";
    const RECENTLY_PLAYED_URL: &'static str =
        "https://api.spotify.com/v1/me/player/recently-played";

    const DEFAULT_SINCE: Date = date!(2023 - 01 - 01);

    /// Builds the default configuration.
    ///
    /// # Panics
    ///
    /// Panics if one of the built-in URLs does not parse.
    #[must_use]
    pub fn new() -> Self {
        let app_name = env!("CARGO_PKG_NAME").to_owned();
        let app_version = env!("CARGO_PKG_VERSION").to_owned();

        let user_agent = Self::user_agent(&app_name, &app_version);
        trace!("user agent: {user_agent}");

        Self {
            app_name,
            app_version,

            client_id: Self::DEFAULT_CLIENT_ID.to_owned(),
            redirect_uri: Url::parse(Self::DEFAULT_REDIRECT_URI).expect("invalid redirect uri"),
            scope: Self::DEFAULT_SCOPE.to_owned(),

            authorize_url: Url::parse(Self::AUTHORIZE_URL).expect("invalid authorize url"),
            recently_played_url: Url::parse(Self::RECENTLY_PLAYED_URL)
                .expect("invalid recently played url"),

            user_agent,

            since: Self::DEFAULT_SINCE,
            utc_offset: UtcOffset::UTC,
        }
    }

    /// `User-Agent` in the form `playheat/0.1.0 (Rust; linux/6.1)`.
    fn user_agent(app_name: &str, app_version: &str) -> String {
        let illegal_chars = |chr| chr == '/' || chr == ';';

        let os_name = match std::env::consts::OS {
            "macos" => "osx",
            other => other,
        };
        let os_version = sysinfo::System::os_version()
            .filter(|version| !version.is_empty() && !version.contains(illegal_chars))
            .unwrap_or_else(|| String::from("0"));

        format!("{app_name}/{app_version} (Rust; {os_name}/{os_version})")
    }

    /// Applies the overrides of a settings file.
    pub fn apply(&mut self, settings: Settings) -> Result<()> {
        if let Some(client_id) = settings.client_id {
            if client_id.trim().is_empty() {
                return Err(Error::invalid_argument("client_id must not be empty"));
            }
            self.client_id = client_id;
        }
        if let Some(redirect_uri) = settings.redirect_uri {
            self.redirect_uri = redirect_uri;
        }
        if let Some(scope) = settings.scope {
            self.scope = scope;
        }
        if let Some(since) = settings.since {
            self.since = parse_date(&since)?;
        }
        if let Some(offset) = settings.utc_offset {
            self.utc_offset = parse_offset(&offset)?;
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Settings {
    /// Reads a settings file.
    ///
    /// A missing file yields the empty settings.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let attributes = match fs::metadata(path) {
            Ok(attributes) => attributes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("no settings at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };

        if attributes.len() > MAX_SETTINGS_SIZE {
            return Err(Error::invalid_argument(format!(
                "{} is too large",
                path.display()
            )));
        }

        let contents = fs::read_to_string(path)?;
        let settings = toml::from_str(&contents)?;
        debug!("loaded settings from {}", path.display());

        Ok(settings)
    }
}

/// Parses a `YYYY-MM-DD` date.
pub fn parse_date(s: &str) -> Result<Date> {
    Date::parse(s, format_description!("[year]-[month]-[day]")).map_err(Into::into)
}

/// Parses a `+HH:MM` offset, or `local` for the offset of this machine.
pub fn parse_offset(s: &str) -> Result<UtcOffset> {
    if s.eq_ignore_ascii_case("local") {
        return UtcOffset::current_local_offset().map_err(|e| {
            Error::invalid_argument(format!("local offset cannot be determined: {e}"))
        });
    }

    UtcOffset::parse(
        s,
        format_description!("[offset_hour sign:mandatory]:[offset_minute]"),
    )
    .map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use time::macros::offset;

    use super::*;

    #[test]
    fn defaults_request_recently_played_scope() {
        let config = Config::new();
        assert_eq!(config.scope, "user-read-recently-played");
        assert_eq!(config.since, date!(2023 - 01 - 01));
        assert_eq!(config.utc_offset, UtcOffset::UTC);
        assert!(config.user_agent.starts_with("playheat/"));
    }

    #[test]
    fn settings_override_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "client_id = \"abc\"\nsince = \"2024-03-01\"\nutc_offset = \"+02:00\""
        )
        .unwrap();

        let settings = Settings::load(file.path()).unwrap();
        let mut config = Config::new();
        config.apply(settings).unwrap();

        assert_eq!(config.client_id, "abc");
        assert_eq!(config.since, date!(2024 - 03 - 01));
        assert_eq!(config.utc_offset, offset!(+2));
        assert_eq!(config.redirect_uri.as_str(), Config::DEFAULT_REDIRECT_URI);
    }

    #[test]
    fn missing_settings_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(dir.path().join("absent.toml")).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn unknown_settings_are_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "colour = \"blue\"").unwrap();
        assert!(Settings::load(file.path()).is_err());
    }

    #[test]
    fn negative_offsets_parse() {
        assert_eq!(parse_offset("-05:30").unwrap(), offset!(-5:30));
        assert!(parse_offset("5").is_err());
    }
}
