//! Paginated download of every handle of a prefix.
//!
//! Each page `p` of `page_size` identifiers is written as
//! `counter;prefix/postfix` lines, where the 1-based counter of the first
//! line is `p * page_size + 1`. The loop ends after `count` pages, or as soon
//! as the server's `totalCount` says the listing is exhausted.

use async_trait::async_trait;
use handle_core::api::HandlePage;
use handle_core::{HandleError, Result};
use std::io::Write;
use tracing::{debug, info};

use crate::session::Session;
use crate::throttle::Throttle;

/// Source of listing pages
#[async_trait]
pub trait PageSource: Sync {
    async fn fetch_page(&self, page: u64, page_size: u64) -> Result<HandlePage>;
}

/// Listing pages of one prefix through an open session
#[derive(Debug, Clone, Copy)]
pub struct PrefixPages<'a> {
    session: &'a Session,
    prefix: &'a str,
}

impl<'a> PrefixPages<'a> {
    pub fn new(session: &'a Session, prefix: &'a str) -> Self {
        Self { session, prefix }
    }
}

#[async_trait]
impl PageSource for PrefixPages<'_> {
    async fn fetch_page(&self, page: u64, page_size: u64) -> Result<HandlePage> {
        self.session.get_page(self.prefix, page, page_size).await
    }
}

/// Range of pages to request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    /// Zero-based first page
    pub start: u64,
    /// Maximum number of pages
    pub count: u64,
    /// Handles per page, at least 1
    pub page_size: u64,
}

impl PageWindow {
    /// First page index past the window
    pub fn stop(&self) -> u64 {
        self.start.saturating_add(self.count)
    }
}

/// Result of a download run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadSummary {
    /// Pages fetched
    pub pages: u64,
    /// Lines written
    pub handles: u64,
    /// `totalCount` reported by the last page
    pub total_count: Option<u64>,
    /// Page to resume from, or `None` when the listing is exhausted
    pub next_page: Option<u64>,
}

/// Download `window` from `source`, appending lines to `output`.
///
/// `output` is flushed after every page, so an aborted run leaves every
/// completed page on disk. There are no retries: the first failing page
/// ends the run with its error.
pub async fn download<S, W, T>(
    source: &S,
    window: PageWindow,
    output: &mut W,
    throttle: &mut T,
) -> Result<DownloadSummary>
where
    S: PageSource + ?Sized,
    W: Write,
    T: Throttle + ?Sized,
{
    if window.page_size == 0 {
        return Err(HandleError::Config(
            "Page size must be at least 1 when downloading".to_string(),
        ));
    }

    let stop = window.stop();
    let mut summary = DownloadSummary {
        pages: 0,
        handles: 0,
        total_count: None,
        next_page: Some(stop),
    };

    for page in window.start..stop {
        // One-based
        let first = page
            .checked_mul(window.page_size)
            .and_then(|n| n.checked_add(1))
            .ok_or_else(|| HandleError::Config(format!("Page {} is out of range", page)))?;

        let result = source.fetch_page(page, window.page_size).await?;
        for (offset, handle) in result.handles.iter().enumerate() {
            writeln!(output, "{};{}", first + offset as u64, handle)?;
        }
        output.flush()?;

        let size = result.handles.len() as u64;
        let last = first + size - 1;
        info!(
            "Got handles; page={}; size={}; first={}; last={}",
            page, size, first, last
        );

        summary.pages += 1;
        summary.handles += size;
        summary.total_count = Some(result.total_count);

        // The count, not a short page, decides: a page near the end may hold
        // fewer than page_size handles while more pages would still be empty
        if last >= result.total_count {
            debug!("No more results");
            summary.next_page = None;
            break;
        }

        if page + 1 < stop {
            throttle.pause().await;
        }
    }

    match summary.next_page {
        Some(next) => info!(
            "Done; start page={}; next page={}; page size={}",
            window.start, next, window.page_size
        ),
        None => info!(
            "Done; start page={}; next page=n/a; page size={}",
            window.start, window.page_size
        ),
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::HandleClient;
    use crate::test_utils::{EventLog, MockServer, RecordingThrottle};
    use std::sync::Mutex;

    /// In-memory listing that records requested pages
    struct FakeListing {
        handles: Vec<String>,
        total_count: u64,
        requested: Mutex<Vec<(u64, u64)>>,
        log: EventLog,
    }

    impl FakeListing {
        fn new(total: usize, log: EventLog) -> Self {
            Self {
                handles: (0..total).map(|i| format!("21.12102/H{:05}", i)).collect(),
                total_count: total as u64,
                requested: Mutex::new(Vec::new()),
                log,
            }
        }
    }

    #[async_trait]
    impl PageSource for FakeListing {
        async fn fetch_page(&self, page: u64, page_size: u64) -> Result<HandlePage> {
            self.requested.lock().unwrap().push((page, page_size));
            self.log.push(format!("page:{}", page));

            let handles = self
                .handles
                .iter()
                .skip((page * page_size) as usize)
                .take(page_size as usize)
                .cloned()
                .collect();
            Ok(HandlePage {
                response_code: 1,
                prefix: "21.12102".to_string(),
                total_count: self.total_count,
                page,
                page_size,
                handles,
            })
        }
    }

    fn lines(output: &[u8]) -> Vec<(u64, String)> {
        String::from_utf8(output.to_vec())
            .unwrap()
            .lines()
            .map(|line| {
                let (counter, handle) = line.split_once(';').unwrap();
                (counter.parse().unwrap(), handle.to_string())
            })
            .collect()
    }

    #[tokio::test]
    async fn test_stops_on_partial_last_page() {
        let log = EventLog::default();
        let listing = FakeListing::new(25, log.clone());
        let mut throttle = RecordingThrottle::with_log(log.clone());
        let mut output = Vec::new();

        let window = PageWindow {
            start: 0,
            count: 3,
            page_size: 10,
        };
        let summary = download(&listing, window, &mut output, &mut throttle)
            .await
            .unwrap();

        assert_eq!(summary.pages, 3);
        assert_eq!(summary.handles, 25);
        assert_eq!(summary.total_count, Some(25));
        assert_eq!(summary.next_page, None);
        assert_eq!(
            log.events(),
            vec!["page:0", "pause", "page:1", "pause", "page:2"]
        );
    }

    #[tokio::test]
    async fn test_stops_on_exact_full_last_page() {
        let log = EventLog::default();
        let listing = FakeListing::new(20, log.clone());
        let mut throttle = RecordingThrottle::with_log(log.clone());
        let mut output = Vec::new();

        let window = PageWindow {
            start: 0,
            count: 5,
            page_size: 10,
        };
        let summary = download(&listing, window, &mut output, &mut throttle)
            .await
            .unwrap();

        // No empty third page is requested
        assert_eq!(*listing.requested.lock().unwrap(), vec![(0, 10), (1, 10)]);
        assert_eq!(summary.next_page, None);
        assert_eq!(throttle.pauses(), 1);
    }

    #[tokio::test]
    async fn test_counters_follow_page_offsets() {
        let listing = FakeListing::new(100, EventLog::default());
        let mut throttle = RecordingThrottle::default();
        let mut output = Vec::new();

        let window = PageWindow {
            start: 2,
            count: 3,
            page_size: 7,
        };
        let summary = download(&listing, window, &mut output, &mut throttle)
            .await
            .unwrap();

        let written = lines(&output);
        assert_eq!(written.len(), 21);
        assert_eq!(summary.next_page, Some(5));
        for (i, (counter, handle)) in written.iter().enumerate() {
            let page = 2 + i as u64 / 7;
            let offset = i as u64 % 7;
            assert_eq!(*counter, page * 7 + offset + 1);
            // Counter n always names the n-th handle of the listing
            assert_eq!(handle, &format!("21.12102/H{:05}", counter - 1));
        }
        assert!(written.windows(2).all(|w| w[0].0 < w[1].0));
        // Throttled between pages, not after the last one
        assert_eq!(throttle.pauses(), 2);
    }

    #[tokio::test]
    async fn test_zero_pages_requests_nothing() {
        let listing = FakeListing::new(10, EventLog::default());
        let mut throttle = RecordingThrottle::default();
        let mut output = Vec::new();

        let window = PageWindow {
            start: 4,
            count: 0,
            page_size: 10,
        };
        let summary = download(&listing, window, &mut output, &mut throttle)
            .await
            .unwrap();

        assert!(listing.requested.lock().unwrap().is_empty());
        assert_eq!(summary.next_page, Some(4));
        assert!(output.is_empty());
    }

    #[tokio::test]
    async fn test_zero_page_size_is_rejected() {
        let listing = FakeListing::new(10, EventLog::default());
        let mut throttle = RecordingThrottle::default();
        let mut output = Vec::new();

        let window = PageWindow {
            start: 0,
            count: 1,
            page_size: 0,
        };
        let err = download(&listing, window, &mut output, &mut throttle)
            .await
            .unwrap_err();

        assert!(matches!(err, HandleError::Config(_)));
        assert!(listing.requested.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mock_server_scenario_25_handles() {
        let server = MockServer::new();
        server.state().set_listing("21.12102", 25);
        let (server, url) = server.start().await.unwrap();

        let client = HandleClient::new(&url, 5, None).unwrap();
        let session = Session::open_with(client).await.unwrap();
        let mut throttle = RecordingThrottle::default();
        let mut output = Vec::new();

        let window = PageWindow {
            start: 0,
            count: 3,
            page_size: 10,
        };
        let summary = download(
            &PrefixPages::new(&session, "21.12102"),
            window,
            &mut output,
            &mut throttle,
        )
        .await
        .unwrap();
        session.close().await;

        assert_eq!(summary.next_page, None);

        let pages = server.state().requests_to("GET", "/api/handles");
        let queries: Vec<_> = pages.iter().map(|r| r.query.clone().unwrap()).collect();
        assert_eq!(
            queries,
            vec![
                "prefix=21.12102&page=0&pageSize=10",
                "prefix=21.12102&page=1&pageSize=10",
                "prefix=21.12102&page=2&pageSize=10",
            ]
        );

        // Counters stripped, the file holds exactly the served listing
        let written: Vec<String> = lines(&output).into_iter().map(|(_, h)| h).collect();
        assert_eq!(written, server.state().listing());
        assert_eq!(throttle.pauses(), 2);
    }

    #[tokio::test]
    async fn test_grown_total_count_keeps_paging() {
        // The count changed between pages: a short page is not the end
        let server = MockServer::new();
        server.state().set_listing("21.12102", 15);
        server.state().set_total_count_override(Some(40));
        let (server, url) = server.start().await.unwrap();

        let client = HandleClient::new(&url, 5, None).unwrap();
        let session = Session::open_with(client).await.unwrap();
        let mut throttle = RecordingThrottle::default();
        let mut output = Vec::new();

        let window = PageWindow {
            start: 0,
            count: 3,
            page_size: 10,
        };
        let summary = download(
            &PrefixPages::new(&session, "21.12102"),
            window,
            &mut output,
            &mut throttle,
        )
        .await
        .unwrap();
        session.close().await;

        assert_eq!(server.state().count_requests("GET", "/api/handles"), 3);
        assert_eq!(summary.handles, 15);
        assert_eq!(summary.next_page, Some(3));
    }

    #[tokio::test]
    async fn test_failed_page_aborts_without_retry() {
        let server = MockServer::new();
        server.state().set_listing("21.12102", 30);
        server.state().set_failing_page(Some(1));
        let (server, url) = server.start().await.unwrap();

        let client = HandleClient::new(&url, 5, None).unwrap();
        let session = Session::open_with(client).await.unwrap();
        let mut throttle = RecordingThrottle::default();
        let mut output = Vec::new();

        let window = PageWindow {
            start: 0,
            count: 3,
            page_size: 10,
        };
        let err = download(
            &PrefixPages::new(&session, "21.12102"),
            window,
            &mut output,
            &mut throttle,
        )
        .await
        .unwrap_err();
        session.close().await;

        assert!(matches!(err, HandleError::Http { status: 500, .. }));
        assert_eq!(server.state().count_requests("GET", "/api/handles"), 2);
        // The first page was flushed before the failure
        assert_eq!(lines(&output).len(), 10);
    }
}
