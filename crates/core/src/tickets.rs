// crates/core/src/tickets.rs
//! Paginated ticket list per status, with client-side search over the
//! fetched page.

use async_trait::async_trait;
use chrono::FixedOffset;
use helpdesk_types::{Ticket, TicketStatus};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::TicketListError;
use crate::session::TicketSession;
use crate::transport::Transport;

pub const PAGE_SIZE: usize = 10;

/// Update time as shown in the list, and as matched by search.
pub const LIST_DATE_FORMAT: &str = "%a, %b %-d, %Y, %-I:%M %p";

pub const NO_TICKETS: &str = "No tickets found";

/// Body of a `getTickets` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub status: TicketStatus,
    pub limit: usize,
    pub offset: usize,
}

impl PageRequest {
    /// `None` for page 0.
    pub fn new(status: TicketStatus, page: usize) -> Option<Self> {
        let offset = page.checked_sub(1)? * PAGE_SIZE;
        Some(Self {
            status,
            limit: PAGE_SIZE,
            offset,
        })
    }
}

/// Where ticket pages come from.
#[async_trait]
pub trait TicketSource: Send + Sync {
    type Error: std::fmt::Display + Send;

    /// `Ok(None)` when the server answered without a `data` array.
    async fn fetch_tickets(&self, request: PageRequest) -> Result<Option<Vec<Ticket>>, Self::Error>;
}

pub struct TicketListStore<S> {
    source: S,
    status: TicketStatus,
    page: usize,
    tickets: Vec<Ticket>,
    query: String,
    error: Option<String>,
    tz: FixedOffset,
}

impl<S: TicketSource> TicketListStore<S> {
    /// An empty store showing page 1 of open tickets; times are formatted
    /// in `tz`.
    pub fn new(source: S, tz: FixedOffset) -> Self {
        Self {
            source,
            status: TicketStatus::Open,
            page: 1,
            tickets: Vec::new(),
            query: String::new(),
            error: None,
            tz,
        }
    }

    pub fn status(&self) -> TicketStatus {
        self.status
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn tickets(&self) -> &[Ticket] {
        &self.tickets
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Fetch one page. Replaces the list and resets the search on success;
    /// clears the list and records the error on failure.
    pub async fn fetch(
        &mut self,
        status: TicketStatus,
        page: usize,
    ) -> Result<usize, TicketListError<S::Error>> {
        let request = PageRequest::new(status, page).ok_or(TicketListError::InvalidPage(page))?;
        self.status = status;
        self.page = page;

        match self.source.fetch_tickets(request).await {
            Ok(Some(tickets)) => {
                info!(status = %status, page, count = tickets.len(), "tickets fetched");
                self.tickets = tickets;
                self.query.clear();
                self.error = None;
                Ok(self.tickets.len())
            }
            Ok(None) => {
                warn!(status = %status, page, "ticket response had no data");
                self.tickets.clear();
                self.query.clear();
                self.error = Some(NO_TICKETS.into());
                Ok(0)
            }
            Err(e) => {
                warn!(status = %status, page, error = %e, "ticket fetch failed");
                self.tickets.clear();
                self.query.clear();
                self.error = Some(e.to_string());
                Err(TicketListError::Source(e))
            }
        }
    }

    /// Set the search query. Never touches the network.
    pub fn search(&mut self, query: &str) {
        self.query = query.to_string();
    }

    /// Tickets matching the current query, in fetched order.
    pub fn filtered(&self) -> Vec<&Ticket> {
        let needle = self.query.trim().to_lowercase();
        if needle.is_empty() {
            return self.tickets.iter().collect();
        }
        self.tickets
            .iter()
            .filter(|t| self.matches(t, &needle))
            .collect()
    }

    fn matches(&self, ticket: &Ticket, needle: &str) -> bool {
        let contains = |field: &str| field.to_lowercase().contains(needle);
        [
            ticket.topic_name.as_deref(),
            ticket.user_team_name.as_deref(),
            ticket.user_name.as_deref(),
            Some(ticket.id.as_str()),
        ]
        .into_iter()
        .flatten()
        .any(contains)
            || self.format_update(ticket).is_some_and(|s| contains(&s))
    }

    /// `update_at` in the list's display form.
    pub fn format_update(&self, ticket: &Ticket) -> Option<String> {
        ticket
            .update_at
            .map(|at| at.with_timezone(&self.tz).format(LIST_DATE_FORMAT).to_string())
    }

    /// Switch status tabs: clears the search, closes any open chat, and
    /// fetches page 1.
    pub async fn change_status<T: Transport>(
        &mut self,
        status: TicketStatus,
        session: &mut TicketSession<T>,
    ) -> Result<usize, TicketListError<S::Error>> {
        self.query.clear();
        session.teardown();
        self.fetch(status, 1).await
    }

    /// Fetch `page` of the current status. Pages below 1 are ignored.
    pub async fn goto_page(&mut self, page: usize) -> Result<usize, TicketListError<S::Error>> {
        if page < 1 {
            return Ok(self.tickets.len());
        }
        self.fetch(self.status, page).await
    }

    /// Re-fetch what is on screen.
    pub async fn refresh(&mut self) -> Result<usize, TicketListError<S::Error>> {
        self.fetch(self.status, self.page).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryTransport;
    use chrono::{TimeZone, Utc};
    use helpdesk_types::Id;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeSource {
        requests: Mutex<Vec<PageRequest>>,
        reply: Mutex<Option<Result<Option<Vec<Ticket>>, String>>>,
    }

    impl FakeSource {
        fn replying(reply: Result<Option<Vec<Ticket>>, String>) -> Self {
            Self {
                requests: Mutex::default(),
                reply: Mutex::new(Some(reply)),
            }
        }

        fn set_reply(&self, reply: Result<Option<Vec<Ticket>>, String>) {
            *self.reply.lock().unwrap() = Some(reply);
        }

        fn requests(&self) -> Vec<PageRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TicketSource for FakeSource {
        type Error = String;

        async fn fetch_tickets(&self, request: PageRequest) -> Result<Option<Vec<Ticket>>, String> {
            self.requests.lock().unwrap().push(request);
            self.reply
                .lock()
                .unwrap()
                .clone()
                .unwrap_or(Ok(Some(Vec::new())))
        }
    }

    fn page_of_ten() -> Vec<Ticket> {
        (1..=10u64)
            .map(|i| {
                let mut t = Ticket::new(i, TicketStatus::Open);
                t.topic_name = Some("Withdrawal".into());
                t.user_team_name = Some("Support".into());
                t.user_name = Some("player".into());
                t
            })
            .collect()
    }

    fn store(source: FakeSource) -> TicketListStore<FakeSource> {
        TicketListStore::new(source, FixedOffset::east_opt(0).unwrap())
    }

    // ========================================================================
    // Paging
    // ========================================================================

    #[test]
    fn test_page_request_offsets() {
        let req = PageRequest::new(TicketStatus::Closed, 3).unwrap();
        assert_eq!((req.limit, req.offset), (10, 20));
        assert_eq!(PageRequest::new(TicketStatus::Open, 0), None);
    }

    #[tokio::test]
    async fn test_fetch_replaces_list() {
        let mut store = store(FakeSource::replying(Ok(Some(page_of_ten()))));
        assert_eq!(store.fetch(TicketStatus::Open, 1).await.unwrap(), 10);
        assert_eq!(store.tickets().len(), 10);
        assert_eq!(
            store.source().requests(),
            vec![PageRequest {
                status: TicketStatus::Open,
                limit: 10,
                offset: 0
            }]
        );
    }

    #[tokio::test]
    async fn test_fetch_page_zero_is_rejected_without_request() {
        let mut store = store(FakeSource::default());
        let err = store.fetch(TicketStatus::Open, 0).await.unwrap_err();
        assert!(matches!(err, TicketListError::InvalidPage(0)));
        assert!(store.source().requests().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_failure_clears_list() {
        let mut store = store(FakeSource::replying(Ok(Some(page_of_ten()))));
        store.fetch(TicketStatus::Open, 1).await.unwrap();
        store
            .source()
            .set_reply(Err("Server error. Please try again later.".into()));
        assert!(store.refresh().await.is_err());
        assert!(store.tickets().is_empty());
        assert_eq!(store.error(), Some("Server error. Please try again later."));
    }

    #[tokio::test]
    async fn test_missing_data_reports_no_tickets() {
        let mut store = store(FakeSource::replying(Ok(None)));
        assert_eq!(store.fetch(TicketStatus::Closed, 2).await.unwrap(), 0);
        assert_eq!(store.error(), Some(NO_TICKETS));
    }

    #[tokio::test]
    async fn test_goto_page_ignores_page_zero() {
        let mut store = store(FakeSource::default());
        store.goto_page(0).await.unwrap();
        assert!(store.source().requests().is_empty());
        store.goto_page(2).await.unwrap();
        assert_eq!(store.page(), 2);
        assert_eq!(store.source().requests()[0].offset, 10);
    }

    // ========================================================================
    // Search
    // ========================================================================

    #[tokio::test]
    async fn test_search_by_id() {
        let mut store = store(FakeSource::replying(Ok(Some(page_of_ten()))));
        store.fetch(TicketStatus::Open, 1).await.unwrap();
        store.search("7");
        let ids: Vec<&Id> = store.filtered().iter().map(|t| &t.id).collect();
        assert_eq!(ids, vec![&Id::from(7u64)]);
    }

    #[tokio::test]
    async fn test_search_is_non_destructive() {
        let mut store = store(FakeSource::replying(Ok(Some(page_of_ten()))));
        store.fetch(TicketStatus::Open, 1).await.unwrap();
        store.search("xyz");
        assert!(store.filtered().is_empty());
        store.search("");
        assert_eq!(store.filtered().len(), 10);
        assert_eq!(store.tickets(), page_of_ten().as_slice());
    }

    #[tokio::test]
    async fn test_search_matches_fields_case_insensitively() {
        let mut tickets = page_of_ten();
        tickets[2].topic_name = Some("KYC Rejected".into());
        tickets[4].update_at = Some(Utc.with_ymd_and_hms(2024, 1, 6, 15, 4, 0).unwrap());
        let mut store = store(FakeSource::replying(Ok(Some(tickets))));
        store.fetch(TicketStatus::Open, 1).await.unwrap();

        store.search("kyc");
        assert_eq!(store.filtered().len(), 1);
        store.search("Sat, Jan 6");
        assert_eq!(store.filtered()[0].id, Id::from(5u64));
        store.search("3:04 pm");
        assert_eq!(store.filtered().len(), 1);
    }

    #[tokio::test]
    async fn test_new_fetch_resets_search() {
        let mut store = store(FakeSource::replying(Ok(Some(page_of_ten()))));
        store.fetch(TicketStatus::Open, 1).await.unwrap();
        store.search("7");
        store.refresh().await.unwrap();
        assert_eq!(store.query(), "");
        assert_eq!(store.filtered().len(), 10);
    }

    #[test]
    fn test_format_update_uses_store_zone() {
        let store = TicketListStore::new(
            FakeSource::default(),
            FixedOffset::east_opt(5 * 3600 + 1800).unwrap(),
        );
        let mut ticket = Ticket::new(1u64, TicketStatus::Open);
        ticket.update_at = Some(Utc.with_ymd_and_hms(2024, 1, 6, 20, 0, 0).unwrap());
        assert_eq!(
            store.format_update(&ticket).as_deref(),
            Some("Sun, Jan 7, 2024, 1:30 AM")
        );
    }

    // ========================================================================
    // Status tabs
    // ========================================================================

    #[tokio::test]
    async fn test_change_status_tears_down_session() {
        let transport = MemoryTransport::new();
        let mut session = TicketSession::new("7").with_transport(transport.clone());
        let mut ticket = Ticket::new(42u64, TicketStatus::InProgress);
        ticket.user_id = Some(Id::from("501"));
        session
            .open(&ticket, &mut crate::session::AutoConfirm(true))
            .unwrap();

        let mut store = store(FakeSource::default());
        store.search("abc");
        store.goto_page(3).await.unwrap();
        store
            .change_status(TicketStatus::Closed, &mut session)
            .await
            .unwrap();

        assert_eq!(store.status(), TicketStatus::Closed);
        assert_eq!(store.page(), 1);
        assert_eq!(store.query(), "");
        assert!(session.current_ticket().is_none());
        assert_eq!(transport.names().last(), Some(&"leaveTicketRoom"));
    }
}
