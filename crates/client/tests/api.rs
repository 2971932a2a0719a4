//! REST ticket client against a mock server.

use chrono::FixedOffset;
use helpdesk_client::{ApiClient, ApiError, Console, ConsoleConfig, ConsoleError};
use helpdesk_core::{
    AgentContext, Endpoints, MemoryTransport, PageRequest, TicketListError, TicketListStore,
    TicketSession, TicketSource,
};
use helpdesk_types::{Id, Language, TicketStatus};
use mockito::Matcher;
use pretty_assertions::assert_eq;
use serde_json::json;

fn context(base: &str) -> AgentContext {
    AgentContext::new("7", Endpoints::new(base, "https://media.test/", base)).with_token("t0k")
}

fn page(status: TicketStatus, page: usize) -> PageRequest {
    PageRequest::new(status, page).unwrap()
}

#[tokio::test]
async fn test_fetch_tickets_posts_page_with_bearer_token() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/getTickets")
        .match_header("authorization", "Bearer t0k")
        .match_body(Matcher::Json(json!({"status": "in_progress", "limit": 10, "offset": 20})))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({"data": [
                {"id": 31, "status": "in_progress", "language": "hindi", "user_id": 501,
                 "user_name": "ravi_k", "topic_name": "Withdrawal", "update_at": "2024-01-06T15:04:00Z",
                 "agent_id": 7},
                {"id": "32", "status": "in_progress", "update_at": "not a date"}
            ]})
            .to_string(),
        )
        .create_async()
        .await;

    let client = ApiClient::new(&context(&server.url())).unwrap();
    let tickets = client
        .fetch_tickets(page(TicketStatus::InProgress, 3))
        .await
        .unwrap()
        .unwrap();

    mock.assert_async().await;
    assert_eq!(tickets.len(), 2);
    assert_eq!(tickets[0].id, Id::from("31"));
    assert_eq!(tickets[0].language, Language::Hindi);
    assert_eq!(tickets[0].agent_id, Some(Id::from(7u64)));
    assert_eq!(tickets[1].update_at, None);
}

#[tokio::test]
async fn test_missing_data_is_none() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/getTickets")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"message":"nothing here"}"#)
        .create_async()
        .await;

    let client = ApiClient::new(&context(&server.url())).unwrap();
    let result = client.fetch_tickets(page(TicketStatus::Open, 1)).await.unwrap();
    assert!(result.is_none());
}

#[tokio::test]
async fn test_unauthorized_is_session_fatal() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/getTickets")
        .with_status(401)
        .with_body(r#"{"message":"jwt expired"}"#)
        .create_async()
        .await;

    let client = ApiClient::new(&context(&server.url())).unwrap();
    let err = client.fetch_tickets(page(TicketStatus::Open, 1)).await.unwrap_err();
    assert!(err.is_session_fatal());
    assert_eq!(err.to_string(), "Session expired. Please log in again.");
}

#[tokio::test]
async fn test_console_logs_out_on_unauthorized() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/getTickets")
        .match_header("authorization", "Bearer t0k")
        .with_status(401)
        .create_async()
        .await;

    let url = server.url();
    let config = ConsoleConfig::from_lookup(|key| match key {
        "HELPDESK_API_URL" => Some(url.clone()),
        "HELPDESK_COOKIE" => Some("isLoggedIn=true; id=7; userToken=t0k; theme=dark".into()),
        _ => None,
    });
    let mut console = Console::new(&config).unwrap();
    assert_eq!(console.cookies().get("userToken"), Some("t0k"));

    let err = console.list(TicketStatus::Open, 1).await.unwrap_err();
    assert!(matches!(err, ConsoleError::Api(ApiError::Unauthorized)));
    assert_eq!(console.cookies().to_header(), "id=7; theme=dark");
}

#[tokio::test]
async fn test_validation_failure_unpacks_field_errors() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/getTickets")
        .with_status(422)
        .with_header("content-type", "application/json")
        .with_body(r#"{"errors":{"status":["must be one of open, in_progress, closed"]}}"#)
        .create_async()
        .await;

    let client = ApiClient::new(&context(&server.url())).unwrap();
    let err = client.fetch_tickets(page(TicketStatus::Open, 1)).await.unwrap_err();
    assert!(matches!(err, ApiError::Validation(ref m) if m.len() == 1));
    assert_eq!(err.to_string(), "must be one of open, in_progress, closed");
}

#[tokio::test]
async fn test_network_error() {
    // Nothing listens on port 9 locally.
    let client = ApiClient::new(&context("http://127.0.0.1:9/")).unwrap();
    let err = client.fetch_tickets(page(TicketStatus::Open, 1)).await.unwrap_err();
    assert!(matches!(err, ApiError::Network(_)));
    assert_eq!(err.to_string(), "Network error. Please check your internet connection.");
}

#[tokio::test]
async fn test_store_over_api_search_and_status_change() {
    let mut server = mockito::Server::new_async().await;
    let rows: Vec<_> = (1..=10)
        .map(|i| json!({"id": i, "status": "open", "user_name": "player", "topic_name": "Bonus"}))
        .collect();
    server
        .mock("POST", "/getTickets")
        .match_body(Matcher::PartialJson(json!({"status": "open"})))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"data": rows}).to_string())
        .create_async()
        .await;
    let closed = server
        .mock("POST", "/getTickets")
        .match_body(Matcher::PartialJson(json!({"status": "closed", "offset": 0})))
        .with_status(500)
        .create_async()
        .await;

    let client = ApiClient::new(&context(&server.url())).unwrap();
    let mut store = TicketListStore::new(client, FixedOffset::east_opt(0).unwrap());
    store.fetch(TicketStatus::Open, 1).await.unwrap();
    store.search("7");
    assert_eq!(store.filtered().len(), 1);
    assert_eq!(store.filtered()[0].id, Id::from("7"));

    let mut session: TicketSession<MemoryTransport> = TicketSession::new("7");
    let err = store
        .change_status(TicketStatus::Closed, &mut session)
        .await
        .unwrap_err();
    closed.assert_async().await;
    assert!(matches!(err, TicketListError::Source(ApiError::Server)));
    assert!(store.tickets().is_empty());
    assert_eq!(store.error(), Some("Server error. Please try again later."));
}
