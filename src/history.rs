//! Play history retrieval.
//!
//! The [`Fetcher`] pages through the recently-played endpoint in one of two
//! [`Window`] modes:
//!
//! * [`Window::Range`] walks backwards from `before` with a millisecond
//!   cursor, one page of up to 50 events at a time, until a page comes back
//!   empty or reaches past `after`.
//! * [`Window::Recent`] issues exactly one request for the 50 most recent
//!   events. More than 50 plays inside the window of interest are silently
//!   undercounted; this is a known limitation of the mode, not a bug.
//!
//! Pages are requested strictly one after another since each request
//! depends on the previous page's last timestamp. Failures abort the fetch
//! without returning the pages gathered so far, and are never retried.

use time::OffsetDateTime;
use url::Url;

use crate::{
    config::Config,
    credential::Credential,
    error::{Error, Result},
    http::Transport,
    protocol::{self, recently_played::Page},
    track::{unix_millis, PlayEvent},
};

/// Which part of the history to fetch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Window {
    /// Everything in `[after, before)`, fully paginated.
    Range {
        after: OffsetDateTime,
        before: OffsetDateTime,
    },
    /// The most recent page only.
    Recent,
}

pub struct Fetcher<T> {
    transport: T,
    url: Url,
}

impl<T> Fetcher<T>
where
    T: Transport,
{
    /// Maximum number of events the endpoint returns per page.
    pub const PAGE_LIMIT: u32 = 50;

    pub fn new(transport: T, config: &Config) -> Self {
        Self {
            transport,
            url: config.recently_played_url.clone(),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Fetches the play events of `window`, newest first.
    ///
    /// # Errors
    ///
    /// * `CredentialExpired` if the remote rejected the credential
    /// * `FetchFailed` for any other non-success status
    /// * `Transport` if a request did not complete
    /// * `InvalidArgument` if a page could not be parsed
    pub async fn fetch(&self, credential: &Credential, window: Window) -> Result<Vec<PlayEvent>> {
        match window {
            Window::Recent => {
                let events = self.page(credential, None).await?;
                debug!("fetched {} recent events", events.len());
                Ok(events)
            }
            Window::Range { after, before } => self.range(credential, after, before).await,
        }
    }

    async fn range(
        &self,
        credential: &Credential,
        after: OffsetDateTime,
        before: OffsetDateTime,
    ) -> Result<Vec<PlayEvent>> {
        if after >= before {
            return Err(Error::invalid_argument(format!(
                "empty window: {after} is not before {before}"
            )));
        }

        let after_millis = unix_millis(after);
        let mut cursor = unix_millis(before);
        let mut events = Vec::new();
        let mut pages = 0_usize;

        loop {
            let page = self.page(credential, Some(cursor)).await?;
            pages += 1;

            let Some(oldest) = page.iter().map(PlayEvent::timestamp_millis).min() else {
                break;
            };

            if oldest >= cursor {
                warn!("history cursor did not advance past {cursor}, stopping");
                break;
            }

            events.extend(page.into_iter().filter(|event| {
                event.played_at >= after && event.timestamp_millis() < cursor
            }));

            if oldest < after_millis {
                break;
            }
            cursor = oldest;
        }

        debug!("fetched {} events in {pages} pages", events.len());
        Ok(events)
    }

    fn page_url(&self, before: Option<i64>) -> Url {
        let mut url = self.url.clone();
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("limit", &Self::PAGE_LIMIT.to_string());
            if let Some(before) = before {
                query.append_pair("before", &before.to_string());
            }
        }
        url
    }

    async fn page(&self, credential: &Credential, before: Option<i64>) -> Result<Vec<PlayEvent>> {
        let url = self.page_url(before);
        trace!("GET {url}");

        let response = self.transport.get(url, credential).await?;
        if !response.status.is_success() {
            return Err(Error::from_status(response.status));
        }

        let page: Page = protocol::json(&response.body, "recently-played")?;
        Ok(page.items.into_iter().map(PlayEvent::from).collect())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::{collections::VecDeque, sync::Mutex};

    use http::StatusCode;
    use serde_json::json;
    use time::{format_description::well_known::Rfc3339, macros::datetime};

    use super::*;
    use crate::{credential::Source, error::ErrorKind, http::Response};

    /// Transport replaying canned responses and recording requested URLs.
    #[derive(Default)]
    pub(crate) struct Scripted {
        responses: Mutex<VecDeque<Result<Response>>>,
        pub(crate) requests: Mutex<Vec<Url>>,
    }

    impl Scripted {
        pub(crate) fn new(responses: Vec<Result<Response>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                requests: Mutex::default(),
            }
        }

        pub(crate) fn requests(&self) -> Vec<Url> {
            self.requests.lock().unwrap().clone()
        }
    }

    impl Transport for Scripted {
        async fn get(&self, url: Url, credential: &Credential) -> Result<Response> {
            assert!(!credential.as_str().is_empty());
            self.requests.lock().unwrap().push(url);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(page(&[])))
        }
    }

    /// A 200 response with one item per `(track, artist, played_at)`.
    pub(crate) fn page(items: &[(&str, &str, OffsetDateTime)]) -> Response {
        let items: Vec<_> = items
            .iter()
            .map(|(track, artist, played_at)| {
                json!({
                    "track": {
                        "id": format!("id-{track}"),
                        "name": track,
                        "duration_ms": 200_000,
                        "artists": [{ "name": artist }],
                    },
                    "played_at": played_at.format(&Rfc3339).unwrap(),
                })
            })
            .collect();

        Response {
            status: StatusCode::OK,
            body: json!({ "items": items, "next": null, "cursors": null, "limit": 50 })
                .to_string(),
        }
    }

    pub(crate) fn status(status: StatusCode) -> Response {
        Response {
            status,
            body: r#"{"error":{"status":0,"message":"nope"}}"#.to_owned(),
        }
    }

    pub(crate) fn credential() -> Credential {
        Credential::new("token", Source::Store)
    }

    fn query(url: &Url, key: &str) -> Option<String> {
        url.query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }

    #[tokio::test]
    async fn recent_issues_a_single_request() {
        let t = datetime!(2024-05-01 10:00 UTC);
        let transport = Scripted::new(vec![Ok(page(&[("A", "X", t)]))]);
        let fetcher = Fetcher::new(transport, &Config::new());

        let events = fetcher.fetch(&credential(), Window::Recent).await.unwrap();

        assert_eq!(events.len(), 1);
        let requests = fetcher.transport().requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(query(&requests[0], "limit").as_deref(), Some("50"));
        assert_eq!(query(&requests[0], "before"), None);
    }

    #[tokio::test]
    async fn range_pages_until_empty() {
        let first = [
            ("C", "X", datetime!(2024-05-03 12:00 UTC)),
            ("B", "X", datetime!(2024-05-02 12:00 UTC)),
        ];
        let second = [("A", "X", datetime!(2024-05-01 12:00 UTC))];
        let transport = Scripted::new(vec![Ok(page(&first)), Ok(page(&second)), Ok(page(&[]))]);
        let fetcher = Fetcher::new(transport, &Config::new());

        let window = Window::Range {
            after: datetime!(2024-01-01 0:00 UTC),
            before: datetime!(2024-06-01 0:00 UTC),
        };
        let events = fetcher.fetch(&credential(), window).await.unwrap();

        let names: Vec<_> = events.iter().map(|e| e.track_name.as_str()).collect();
        assert_eq!(names, ["C", "B", "A"]);

        let requests = fetcher.transport().requests();
        assert_eq!(requests.len(), 3);
        assert_eq!(
            query(&requests[0], "before"),
            Some(unix_millis(datetime!(2024-06-01 0:00 UTC)).to_string())
        );
        assert_eq!(
            query(&requests[1], "before"),
            Some(unix_millis(datetime!(2024-05-02 12:00 UTC)).to_string())
        );
        assert_eq!(
            query(&requests[2], "before"),
            Some(unix_millis(datetime!(2024-05-01 12:00 UTC)).to_string())
        );
    }

    #[tokio::test]
    async fn range_stops_past_lower_bound() {
        let items = [
            ("B", "X", datetime!(2024-05-02 12:00 UTC)),
            ("A", "X", datetime!(2024-04-01 12:00 UTC)),
        ];
        let transport = Scripted::new(vec![Ok(page(&items))]);
        let fetcher = Fetcher::new(transport, &Config::new());

        let window = Window::Range {
            after: datetime!(2024-05-01 0:00 UTC),
            before: datetime!(2024-06-01 0:00 UTC),
        };
        let events = fetcher.fetch(&credential(), window).await.unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].track_name, "B");
        assert_eq!(fetcher.transport().requests().len(), 1);
    }

    #[tokio::test]
    async fn stalled_cursor_stops_without_duplicates() {
        let played_at = datetime!(2024-06-01 0:00 UTC);
        let transport = Scripted::new(vec![
            Ok(page(&[("A", "X", played_at)])),
            Ok(page(&[("A", "X", played_at)])),
        ]);
        let fetcher = Fetcher::new(transport, &Config::new());

        let window = Window::Range {
            after: datetime!(2024-05-01 0:00 UTC),
            before: played_at + time::Duration::MILLISECOND,
        };
        let events = fetcher.fetch(&credential(), window).await.unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].track_name, "A");
        assert_eq!(fetcher.transport().requests().len(), 2);
    }

    #[tokio::test]
    async fn unauthorized_is_credential_expired() {
        let transport = Scripted::new(vec![Ok(status(StatusCode::UNAUTHORIZED))]);
        let fetcher = Fetcher::new(transport, &Config::new());

        let err = fetcher.fetch(&credential(), Window::Recent).await.unwrap_err();

        assert_eq!(err.kind, ErrorKind::CredentialExpired);
    }

    #[tokio::test]
    async fn failure_mid_range_discards_earlier_pages() {
        let first = [("B", "X", datetime!(2024-05-02 12:00 UTC))];
        let transport = Scripted::new(vec![
            Ok(page(&first)),
            Ok(status(StatusCode::INTERNAL_SERVER_ERROR)),
        ]);
        let fetcher = Fetcher::new(transport, &Config::new());

        let window = Window::Range {
            after: datetime!(2024-01-01 0:00 UTC),
            before: datetime!(2024-06-01 0:00 UTC),
        };
        let err = fetcher.fetch(&credential(), window).await.unwrap_err();

        assert_eq!(err.kind, ErrorKind::FetchFailed);
        assert_eq!(err.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
        assert_eq!(fetcher.transport().requests().len(), 2);
    }

    #[tokio::test]
    async fn transport_errors_propagate() {
        let transport = Scripted::new(vec![Err(Error::transport("connection reset"))]);
        let fetcher = Fetcher::new(transport, &Config::new());

        let err = fetcher.fetch(&credential(), Window::Recent).await.unwrap_err();

        assert_eq!(err.kind, ErrorKind::Transport);
    }

    #[tokio::test]
    async fn empty_range_is_rejected() {
        let fetcher = Fetcher::new(Scripted::default(), &Config::new());
        let t = datetime!(2024-05-01 0:00 UTC);

        let err = fetcher
            .fetch(&credential(), Window::Range { after: t, before: t })
            .await
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::InvalidArgument);
        assert!(fetcher.transport().requests().is_empty());
    }
}
