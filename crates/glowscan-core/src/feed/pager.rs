use std::sync::Arc;

use futures::stream::{self, Stream};
use reqwest::header::AUTHORIZATION;
use reqwest::StatusCode;
use serde::Serialize;
use tracing::{debug, warn};

use super::ItemFilter;
use crate::api::{ApiClient, ApiError};
use crate::auth::{format_bearer, CredentialStore};
use crate::models::{CatalogEnvelope, Item};

pub const FIRST_PAGE: u32 = 1;

const PRODUCTS_PATH: &str = "/products";

/// One loaded page of the feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct FeedPage {
    pub key: u32,
    pub items: Vec<Item>,
    /// Absent on the first page.
    pub prev_key: Option<u32>,
    /// Absent once the server returns an empty page.
    pub next_key: Option<u32>,
}

impl FeedPage {
    pub fn is_last(&self) -> bool {
        self.next_key.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LoadState {
    #[default]
    Idle,
    Loading(u32),
    Loaded(FeedPage),
    Failed(ApiError),
}

/// Loads pages of the catalog feed.
///
/// One load at a time per pager: `load` takes `&mut self`. Keeping a second
/// request from starting while one is pending is up to the caller.
pub struct FeedPager {
    api: ApiClient,
    store: Arc<CredentialStore>,
    filter: ItemFilter,
    state: LoadState,
}

impl FeedPager {
    pub fn new(api: ApiClient, store: Arc<CredentialStore>) -> Self {
        Self {
            api,
            store,
            filter: ItemFilter::default(),
            state: LoadState::Idle,
        }
    }

    pub fn with_filter(mut self, filter: ItemFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn state(&self) -> &LoadState {
        &self.state
    }

    /// Load page `key` (page 1 when absent) of `size` items.
    pub async fn load(&mut self, key: Option<u32>, size: u32) -> Result<FeedPage, ApiError> {
        let key = key.unwrap_or(FIRST_PAGE).max(FIRST_PAGE);
        self.state = LoadState::Loading(key);

        let result = self.fetch(key, size).await;
        self.state = match &result {
            Ok(page) => LoadState::Loaded(page.clone()),
            Err(e) => {
                warn!(page = key, error = %e, "Feed page failed");
                LoadState::Failed(e.clone())
            }
        };
        result
    }

    async fn fetch(&self, key: u32, size: u32) -> Result<FeedPage, ApiError> {
        let token = self.store.bearer().ok_or(ApiError::NoValidToken)?;

        let url = self.api.endpoints().api(PRODUCTS_PATH);
        let builder = self
            .api
            .get(&url)
            .query(&[("page", key), ("size", size)])
            .header(AUTHORIZATION, format_bearer(&token));
        let response = self.api.execute(builder).await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(ApiError::SessionExpired);
        }
        let response = ApiClient::check_response(response).await?;
        let envelope: CatalogEnvelope = ApiClient::decode(response).await?;
        let raw = envelope.data.ok_or(ApiError::EmptyBody)?;

        // The end of the feed is decided on what the server sent, before
        // unknown kinds are skipped or the filter runs.
        let end_of_feed = raw.is_empty();
        let items: Vec<Item> = raw
            .into_iter()
            .filter_map(|r| {
                let kind = r.kind().to_string();
                Item::try_from(r)
                    .map_err(|e| warn!(page = key, kind = %kind, error = %e, "Skipping feed item"))
                    .ok()
            })
            .collect();
        let items = self.filter.apply(items);

        debug!(page = key, count = items.len(), end_of_feed, "Feed page loaded");
        Ok(FeedPage {
            key,
            items,
            prev_key: (key > FIRST_PAGE).then(|| key - 1),
            next_key: if end_of_feed { None } else { key.checked_add(1) },
        })
    }

    /// Every page from the first until the end of the feed. The stream
    /// stops after the first failure, which it yields.
    pub fn pages(self, size: u32) -> impl Stream<Item = Result<FeedPage, ApiError>> {
        stream::unfold(Some((self, FIRST_PAGE)), move |state| async move {
            let (mut pager, key) = state?;
            match pager.load(Some(key), size).await {
                Ok(page) => {
                    let next = page.next_key.map(|k| (pager, k));
                    Some((Ok(page), next))
                }
                Err(e) => Some((Err(e), None)),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{CredentialKind, MemoryVault};
    use crate::clock::ManualClock;
    use crate::config::Endpoints;
    use crate::models::ContentKind;
    use chrono::Duration;
    use futures::StreamExt;
    use mockito::{Matcher, Server};

    struct Fixture {
        pager: FeedPager,
        store: Arc<CredentialStore>,
        clock: ManualClock,
    }

    fn fixture(server: &Server) -> Fixture {
        let clock = ManualClock::default();
        let store = Arc::new(CredentialStore::with_clock(
            Box::new(MemoryVault::new()),
            Arc::new(clock.clone()),
        ));
        let api = ApiClient::new(Endpoints::single(&server.url()), store.clone()).unwrap();
        Fixture {
            pager: FeedPager::new(api, store.clone()),
            store,
            clock,
        }
    }

    fn page_body(ids: &[u32]) -> String {
        let items: Vec<String> = ids
            .iter()
            .map(|id| {
                format!(
                    r#"{{"id":{id},"name":"Item {id}","type":"product","skin_type":"{}"}}"#,
                    if id % 2 == 0 { "dry" } else { "oily" }
                )
            })
            .collect();
        format!(r#"{{"code":200,"status":"success","message":"ok","data":[{}]}}"#, items.join(","))
    }

    fn page_query(page: u32, size: u32) -> Matcher {
        Matcher::AllOf(vec![
            Matcher::UrlEncoded("page".into(), page.to_string()),
            Matcher::UrlEncoded("size".into(), size.to_string()),
        ])
    }

    #[tokio::test]
    async fn test_first_page_keys() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/products")
            .match_query(page_query(1, 2))
            .match_header("authorization", "Bearer acc")
            .with_status(200)
            .with_body(page_body(&[1, 2]))
            .create_async()
            .await;

        let mut f = fixture(&server);
        f.store.save(CredentialKind::Access, "acc").unwrap();

        let page = f.pager.load(None, 2).await.unwrap();
        assert_eq!(page.key, 1);
        assert_eq!(page.prev_key, None);
        assert_eq!(page.next_key, Some(2));
        assert_eq!(page.items.len(), 2);
        assert_eq!(f.pager.state(), &LoadState::Loaded(page));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_empty_page_ends_feed() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/products")
            .match_query(page_query(3, 10))
            .with_status(200)
            .with_body(page_body(&[]))
            .create_async()
            .await;

        let mut f = fixture(&server);
        f.store.save(CredentialKind::Session, "sess").unwrap();

        let page = f.pager.load(Some(3), 10).await.unwrap();
        assert!(page.items.is_empty());
        assert_eq!(page.prev_key, Some(2));
        assert_eq!(page.next_key, None);
        assert!(page.is_last());
    }

    #[tokio::test]
    async fn test_last_representable_key_ends_feed() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/products")
            .match_query(page_query(u32::MAX, 10))
            .with_status(200)
            .with_body(page_body(&[7]))
            .create_async()
            .await;

        let mut f = fixture(&server);
        f.store.save(CredentialKind::Access, "acc").unwrap();

        let page = f.pager.load(Some(u32::MAX), 10).await.unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.prev_key, Some(u32::MAX - 1));
        assert_eq!(page.next_key, None);
    }

    #[tokio::test]
    async fn test_no_valid_token_skips_network() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/products")
            .match_query(Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let mut f = fixture(&server);
        f.store.save(CredentialKind::Access, "acc").unwrap();
        f.clock.advance(Duration::minutes(5));

        let err = f.pager.load(Some(1), 10).await.unwrap_err();
        assert_eq!(err, ApiError::NoValidToken);
        assert_eq!(f.pager.state(), &LoadState::Failed(ApiError::NoValidToken));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_http_failure_carries_status() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/products")
            .match_query(Matcher::Any)
            .with_status(500)
            .create_async()
            .await;

        let mut f = fixture(&server);
        f.store.save(CredentialKind::Access, "acc").unwrap();

        let err = f.pager.load(Some(2), 10).await.unwrap_err();
        assert_eq!(err.status(), Some(500));
        assert!(matches!(f.pager.state(), LoadState::Failed(ApiError::Http { status: 500, .. })));
    }

    #[tokio::test]
    async fn test_unauthorized_is_session_expired() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/products")
            .match_query(Matcher::Any)
            .with_status(401)
            .create_async()
            .await;

        let mut f = fixture(&server);
        f.store.save(CredentialKind::Access, "acc").unwrap();

        let err = f.pager.load(None, 10).await.unwrap_err();
        assert_eq!(err, ApiError::SessionExpired);
        assert!(err.requires_login());
    }

    #[tokio::test]
    async fn test_missing_data_is_empty_body() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/products")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"code":200,"status":"success","message":"ok"}"#)
            .create_async()
            .await;

        let mut f = fixture(&server);
        f.store.save(CredentialKind::Access, "acc").unwrap();

        assert_eq!(f.pager.load(None, 10).await.unwrap_err(), ApiError::EmptyBody);
    }

    #[tokio::test]
    async fn test_filtered_out_page_does_not_end_feed() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/products")
            .match_query(page_query(1, 2))
            .with_status(200)
            .with_body(
                r#"{"data":[{"id":1,"name":"Clip","type":"video"},{"id":2,"name":"Poll","type":"poll"}]}"#,
            )
            .create_async()
            .await;

        let f = fixture(&server);
        f.store.save(CredentialKind::Access, "acc").unwrap();
        let mut pager = f.pager.with_filter(ItemFilter::kind(ContentKind::Product));

        let page = pager.load(None, 2).await.unwrap();
        assert!(page.items.is_empty());
        assert_eq!(page.next_key, Some(2));
    }

    #[tokio::test]
    async fn test_pages_stream_stops_at_empty_page() {
        let mut server = Server::new_async().await;
        for (page, ids) in [(1u32, vec![1u32, 2]), (2, vec![3]), (3, vec![])] {
            server
                .mock("GET", "/products")
                .match_query(page_query(page, 2))
                .with_status(200)
                .with_body(page_body(&ids))
                .create_async()
                .await;
        }

        let f = fixture(&server);
        f.store.save(CredentialKind::Access, "acc").unwrap();

        let pages: Vec<_> = f.pager.pages(2).collect().await;
        assert_eq!(pages.len(), 3);
        let keys: Vec<u32> = pages.iter().map(|p| p.as_ref().unwrap().key).collect();
        assert_eq!(keys, vec![1, 2, 3]);
        assert!(pages[2].as_ref().unwrap().is_last());
    }

    #[tokio::test]
    async fn test_pages_stream_stops_after_failure() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/products")
            .match_query(page_query(1, 2))
            .with_status(200)
            .with_body(page_body(&[1, 2]))
            .create_async()
            .await;
        server
            .mock("GET", "/products")
            .match_query(page_query(2, 2))
            .with_status(502)
            .create_async()
            .await;

        let f = fixture(&server);
        f.store.save(CredentialKind::Access, "acc").unwrap();

        let pages: Vec<_> = f.pager.pages(2).collect().await;
        assert_eq!(pages.len(), 2);
        assert!(pages[0].is_ok());
        assert_eq!(pages[1].as_ref().unwrap_err().status(), Some(502));
    }
}
