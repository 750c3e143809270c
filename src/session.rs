//! One fetch-aggregate-render cycle.
//!
//! A [`Session`] owns the credential store and the history fetcher. Each
//! call to [`Session::run`] acquires a credential, fetches the play history
//! for the configured [`Bucketing`], aggregates it and projects it into
//! heatmap cells.
//!
//! Failures stay inside the cycle:
//!
//! * an expired credential is purged and the session reports
//!   [`Outcome::Unauthenticated`] so the user can log in again;
//! * any other fetch failure is logged and yields an empty heatmap.
//!
//! `run` borrows the session mutably, so cycles of one session can never
//! overlap.

use time::OffsetDateTime;
use url::Url;

use crate::{
    aggregate::{self, Bucketing, TimeWindow},
    config::Config,
    credential::{self, Credential, Location, Store},
    error::{Error, ErrorKind, Result},
    heatmap::{self, VisualUnit},
    history::{Fetcher, Window},
    http::Transport,
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Options {
    pub bucketing: Bucketing,

    /// Paginate through the whole trailing day in hourly mode instead of
    /// looking at the 50 most recent plays only.
    pub full_history: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// No usable credential: send the user to `authorize_url`.
    Unauthenticated { authorize_url: Url },
    Heatmap(Vec<VisualUnit>),
}

pub struct Session<S, T> {
    config: Config,
    options: Options,
    store: S,
    fetcher: Fetcher<T>,
}

impl<S, T> Session<S, T>
where
    S: Store,
    T: Transport,
{
    pub fn new(config: Config, options: Options, store: S, transport: T) -> Self {
        let fetcher = Fetcher::new(transport, &config);
        Self {
            config,
            options,
            store,
            fetcher,
        }
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    #[must_use]
    pub fn fetcher(&self) -> &Fetcher<T> {
        &self.fetcher
    }

    /// Forgets the persisted credential.
    pub fn logout(&mut self) -> Result<()> {
        credential::purge(&mut self.store)
    }

    /// The credential for this cycle.
    ///
    /// Fails with `CredentialMissing` if neither the store nor `location`
    /// has a token.
    fn credential<L>(&mut self, location: &mut L) -> Result<Credential>
    where
        L: Location + ?Sized,
    {
        credential::acquire(&mut self.store, location)?.ok_or_else(|| {
            Error::credential_missing("no stored token and no token in the redirect address")
        })
    }

    fn unauthenticated(&self) -> Outcome {
        Outcome::Unauthenticated {
            authorize_url: credential::authorize_url(&self.config),
        }
    }

    /// The aggregation window and the fetch window that covers it.
    fn windows(&self, now: OffsetDateTime) -> (TimeWindow, Window) {
        match self.options.bucketing {
            Bucketing::Hourly => {
                let window = TimeWindow::trailing_day(now);
                let fetch = if self.options.full_history {
                    Window::Range {
                        after: window.after,
                        before: window.before,
                    }
                } else {
                    Window::Recent
                };
                (window, fetch)
            }
            Bucketing::Daily => {
                let window = TimeWindow::since(self.config.since, self.config.utc_offset, now);
                let fetch = Window::Range {
                    after: window.after,
                    before: window.before,
                };
                (window, fetch)
            }
        }
    }

    /// Runs a cycle ending now.
    ///
    /// # Errors
    ///
    /// Only fails if the credential store cannot be read or written. Fetch
    /// failures are handled inside the cycle.
    pub async fn run<L>(&mut self, location: &mut L) -> Result<Outcome>
    where
        L: Location + ?Sized,
    {
        self.run_at(location, OffsetDateTime::now_utc()).await
    }

    /// Runs a cycle ending at `now`.
    ///
    /// # Errors
    ///
    /// See [`Session::run`].
    pub async fn run_at<L>(&mut self, location: &mut L, now: OffsetDateTime) -> Result<Outcome>
    where
        L: Location + ?Sized,
    {
        let credential = match self.credential(location) {
            Ok(credential) => credential,
            Err(e) if e.kind == ErrorKind::CredentialMissing => {
                info!("{e}");
                return Ok(self.unauthenticated());
            }
            Err(e) => return Err(e),
        };

        let (window, fetch) = self.windows(now);
        debug!("fetching {fetch:?}");

        let mut events = match self.fetcher.fetch(&credential, fetch).await {
            Ok(events) => events,
            Err(e) if e.is_credential_error() => {
                warn!("{e}; please log in again");
                credential::purge(&mut self.store)?;
                return Ok(self.unauthenticated());
            }
            Err(e) => {
                error!("{e}");
                Vec::new()
            }
        };

        // History arrives newest first; aggregate in play order so that ties
        // go to the track that was played first.
        events.sort_by_key(|event| event.played_at);

        let summaries = aggregate::aggregate(
            &events,
            self.options.bucketing,
            &window,
            self.config.utc_offset,
        );
        info!(
            "{} plays in {} buckets",
            summaries.iter().map(|s| u64::from(s.count)).sum::<u64>(),
            summaries.len()
        );

        Ok(Outcome::Heatmap(heatmap::to_visual_units(&summaries)))
    }
}
