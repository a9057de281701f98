use super::*;

fn params() -> CreateTicket {
    CreateTicket {
        target_agent: "agent-a".into(),
        origin_agent: "ui".into(),
        payload: serde_json::json!("hello"),
        metadata: Metadata::new(),
        expect_reply: true,
        timeout_ms: None,
    }
}

#[test]
fn new_ticket_is_pending_with_default_timeout_and_origin() {
    let now = Utc::now();
    let ticket = Ticket::new(params(), now);
    assert_eq!(ticket.status, TicketStatus::Pending);
    assert_eq!(ticket.timeout_ms, DEFAULT_TIMEOUT_MS);
    assert_eq!(ticket.metadata.get(META_ORIGIN).and_then(|v| v.as_str()), Some(DEFAULT_ORIGIN));
    assert!(ticket.response.is_none());
    assert_eq!(ticket.created_at, ticket.updated_at);
}

#[test]
fn explicit_origin_is_preserved() {
    let mut p = params();
    p.metadata.insert(META_ORIGIN.into(), serde_json::json!("agent-b"));
    let ticket = Ticket::new(p, Utc::now());
    assert_eq!(ticket.metadata.get(META_ORIGIN).and_then(|v| v.as_str()), Some("agent-b"));
}

#[test]
fn latency_ms_is_none_until_responded() {
    let ticket = Ticket::new(params(), Utc::now());
    assert!(ticket.latency_ms().is_none());
}

#[test]
fn latency_ms_measures_response_gap() {
    let created = Utc::now();
    let mut ticket = Ticket::new(params(), created);
    ticket.response = Some(TicketResponse {
        payload: serde_json::json!("hi"),
        metadata: Metadata::new(),
        at: created + chrono::Duration::milliseconds(40),
    });
    assert_eq!(ticket.latency_ms(), Some(40));
}

#[test]
fn is_reply_reads_metadata_flag() {
    let mut ticket = Ticket::new(params(), Utc::now());
    assert!(!ticket.is_reply());
    ticket.metadata.insert(META_IS_REPLY.into(), serde_json::json!(true));
    assert!(ticket.is_reply());
}

#[test]
fn terminal_states_are_responded_timeout_error() {
    assert!(!TicketStatus::Pending.is_terminal());
    assert!(!TicketStatus::Delivered.is_terminal());
    assert!(TicketStatus::Responded.is_terminal());
    assert!(TicketStatus::Timeout.is_terminal());
    assert!(TicketStatus::Error.is_terminal());
}
