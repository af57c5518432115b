use chatterm_cache::{LIST_METADATA_FILE, TtlCache};
use chatterm_core::test_support::TestDir;
use chatterm_core::{
    ChatError, ConversationFilter, ConversationId, FixtureClient, FixtureData, FixtureOperation,
    MessageId, MessagingClient,
};
use chatterm_tasks::TaskOrchestrator;
use chatterm_ui::{
    AppState, BannerLevel, BufferSurface, KeyStroke, Palette, Session, SessionSettings,
};
use ratatui::buffer::Buffer;
use ratatui::layout::{Position, Rect};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;

struct Harness {
    session: Session,
    client: Arc<FixtureClient>,
    downloads: TestDir,
}

async fn harness_with(
    data: FixtureData,
    settings: SessionSettings,
    cache_dir: Option<&TestDir>,
) -> Harness {
    let downloads = TestDir::new("ui-downloads");
    let client = Arc::new(FixtureClient::new(data, downloads.path()));
    client.connect().await.expect("connect fixture");

    let mut cache = TtlCache::new(Duration::from_secs(300));
    if let Some(dir) = cache_dir {
        cache = cache.with_metadata_dir(dir.path());
    }
    let settings = SessionSettings {
        download_dir: downloads.path().to_path_buf(),
        ..settings
    };
    let session = Session::new(
        Arc::clone(&client) as Arc<dyn MessagingClient>,
        settings,
        cache,
        TaskOrchestrator::new(Handle::current()),
    )
    .expect("session");
    Harness {
        session,
        client,
        downloads,
    }
}

async fn harness(data: FixtureData) -> Harness {
    harness_with(data, SessionSettings::default(), None).await
}

async fn settle(session: &mut Session) {
    for _ in 0..500 {
        session.tick();
        if session.active_task_count() == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("background work did not settle");
}

fn press(session: &mut Session, token: &str) {
    session.handle_key(KeyStroke::parse(token).expect("key token"));
}

fn type_text(session: &mut Session, text: &str) {
    for ch in text.chars() {
        let token = if ch == ' ' { "space".to_owned() } else { ch.to_string() };
        press(session, &token);
    }
}

fn unread_pattern() -> FixtureData {
    FixtureData::from_json_str(
        r#"{
            "conversations": [
                {"id": 1, "entity": {"kind": "user", "first_name": "Ada"}, "unread_count": 0,
                 "messages": [{"id": 1, "text": "hello", "sent_at": "2024-01-01T10:00:00Z"}]},
                {"id": 2, "entity": {"kind": "group", "title": "Builders"}, "unread_count": 5,
                 "messages": [
                    {"id": 10, "text": "first", "sent_at": "2024-01-01T10:00:00Z"},
                    {"id": 11, "text": "", "attachment": {"kind": "photo", "width": 4, "height": 3},
                     "sent_at": "2024-01-01T10:01:00Z"},
                    {"id": 12, "text": "latest", "sent_at": "2024-01-01T10:02:00Z"}
                 ]},
                {"id": 3, "entity": {"kind": "channel", "title": "News"}, "unread_count": 0,
                 "messages": []}
            ]
        }"#,
    )
    .expect("fixture json")
}

#[tokio::test]
async fn startup_loads_unread_conversations() {
    let mut harness = harness(FixtureData::sample()).await;
    assert_eq!(harness.session.state(), AppState::Init);

    harness.session.start();
    assert_eq!(harness.session.active_task_count(), 1);
    settle(&mut harness.session).await;

    assert_eq!(harness.session.state(), AppState::ConversationList);
    let ids: Vec<i64> = harness
        .session
        .conversations()
        .iter()
        .map(|conversation| conversation.id.get())
        .collect();
    assert_eq!(ids, vec![101, 202, 505]);
    assert!(!harness.session.cursor_visible());
}

#[tokio::test]
async fn filter_toggle_misses_cache_when_filter_differs() {
    let mut harness = harness(unread_pattern()).await;
    harness.session.start();
    settle(&mut harness.session).await;
    assert_eq!(harness.session.conversations().len(), 1);

    press(&mut harness.session, "tab");
    assert_eq!(harness.session.filter(), ConversationFilter::All);
    settle(&mut harness.session).await;
    assert_eq!(harness.session.conversations().len(), 3);
    assert_eq!(harness.session.selected_conversation(), 0);

    press(&mut harness.session, "tab");
    settle(&mut harness.session).await;
    assert_eq!(harness.session.conversations().len(), 1);
    assert_eq!(harness.client.calls().expect("calls").list_conversations, 3);
}

#[tokio::test]
async fn reopening_a_conversation_is_served_from_cache() {
    let mut harness = harness(unread_pattern()).await;
    harness.session.start();
    settle(&mut harness.session).await;

    press(&mut harness.session, "enter");
    assert_eq!(harness.session.state(), AppState::ChatView);
    settle(&mut harness.session).await;
    let texts: Vec<&str> = harness
        .session
        .messages()
        .iter()
        .map(|message| message.text.as_str())
        .collect();
    assert_eq!(texts, vec!["latest", "", "first"]);

    press(&mut harness.session, "left");
    assert_eq!(harness.session.state(), AppState::ConversationList);
    assert!(harness.session.messages().is_empty());
    settle(&mut harness.session).await;

    press(&mut harness.session, "right");
    assert_eq!(harness.session.messages().len(), 3);
    settle(&mut harness.session).await;

    let calls = harness.client.calls().expect("calls");
    assert_eq!(calls.list_messages, 1);
    assert_eq!(calls.list_conversations, 1);
}

#[tokio::test]
async fn selection_is_clamped_to_list_bounds() {
    let mut harness = harness(FixtureData::sample()).await;
    harness.session.start();
    settle(&mut harness.session).await;

    press(&mut harness.session, "up");
    assert_eq!(harness.session.selected_conversation(), 0);
    for _ in 0..10 {
        press(&mut harness.session, "j");
    }
    assert_eq!(harness.session.selected_conversation(), 2);
}

#[tokio::test]
async fn reply_is_sent_and_conversation_refreshed() {
    let mut harness = harness(unread_pattern()).await;
    harness.session.start();
    settle(&mut harness.session).await;
    press(&mut harness.session, "enter");
    settle(&mut harness.session).await;

    press(&mut harness.session, "r");
    assert_eq!(harness.session.state(), AppState::ReplyInput);
    assert!(harness.session.cursor_visible());

    type_text(&mut harness.session, "hix");
    press(&mut harness.session, "backspace");
    type_text(&mut harness.session, " there");
    assert_eq!(harness.session.draft(), "hi there");

    press(&mut harness.session, "enter");
    assert_eq!(harness.session.state(), AppState::ChatView);
    assert!(!harness.session.cursor_visible());
    settle(&mut harness.session).await;

    let banner = harness.session.banner().expect("banner");
    assert_eq!(banner.level, BannerLevel::Info);
    assert_eq!(banner.text, "reply sent");
    let newest = &harness.session.messages()[0];
    assert_eq!(newest.text, "hi there");
    assert_eq!(newest.sender, "me");

    let calls = harness.client.calls().expect("calls");
    assert_eq!(calls.send_message, 1);
    assert_eq!(calls.mark_read, 1);
    assert_eq!(calls.list_messages, 2);
    assert_eq!(
        harness.client.unread_count(ConversationId::new(2)).expect("unread"),
        Some(0)
    );
}

#[tokio::test]
async fn reply_keeps_its_target_when_a_refresh_shifts_the_list() {
    let mut harness = harness(unread_pattern()).await;
    harness.session.start();
    settle(&mut harness.session).await;
    press(&mut harness.session, "enter");
    settle(&mut harness.session).await;

    press(&mut harness.session, "j");
    let selected_id = |session: &Session| session.messages()[session.selected_message()].id;
    assert_eq!(selected_id(&harness.session), MessageId::new(11));

    press(&mut harness.session, "r");
    type_text(&mut harness.session, "one");
    press(&mut harness.session, "enter");
    press(&mut harness.session, "r");
    assert_eq!(harness.session.state(), AppState::ReplyInput);
    settle(&mut harness.session).await;

    assert_eq!(harness.session.messages()[0].text, "one");
    assert_eq!(selected_id(&harness.session), MessageId::new(11));
    assert_eq!(harness.session.state(), AppState::ReplyInput);

    type_text(&mut harness.session, "two");
    press(&mut harness.session, "enter");
    settle(&mut harness.session).await;

    let calls = harness.client.calls().expect("calls");
    assert_eq!(calls.send_message, 2);
    assert_eq!(calls.last_reply_to, Some(MessageId::new(11)));
    assert_eq!(harness.session.messages()[0].text, "two");
}

#[tokio::test]
async fn blank_reply_is_cancelled_without_sending() {
    let mut harness = harness(unread_pattern()).await;
    harness.session.start();
    settle(&mut harness.session).await;
    press(&mut harness.session, "enter");
    settle(&mut harness.session).await;

    press(&mut harness.session, "r");
    type_text(&mut harness.session, "   ");
    press(&mut harness.session, "enter");
    settle(&mut harness.session).await;

    assert_eq!(harness.session.state(), AppState::ChatView);
    assert_eq!(harness.session.draft(), "");
    assert_eq!(harness.client.calls().expect("calls").send_message, 0);
}

#[tokio::test]
async fn failed_send_restores_draft_and_shows_error() {
    let mut harness = harness(unread_pattern()).await;
    harness.session.start();
    settle(&mut harness.session).await;
    press(&mut harness.session, "enter");
    settle(&mut harness.session).await;

    harness
        .client
        .fail_next(FixtureOperation::SendMessage, ChatError::transient("timeout"))
        .expect("queue failure");
    press(&mut harness.session, "r");
    type_text(&mut harness.session, "ping");
    press(&mut harness.session, "enter");
    settle(&mut harness.session).await;

    let banner = harness.session.banner().expect("banner");
    assert_eq!(banner.level, BannerLevel::Error);
    assert!(banner.text.contains("timeout"));
    assert_eq!(harness.session.draft(), "ping");
}

#[tokio::test]
async fn attachment_download_reports_saved_path() {
    let mut harness = harness(unread_pattern()).await;
    harness.session.start();
    settle(&mut harness.session).await;
    press(&mut harness.session, "enter");
    settle(&mut harness.session).await;

    press(&mut harness.session, "s");
    let banner = harness.session.banner().expect("banner");
    assert_eq!(banner.level, BannerLevel::Error);
    assert_eq!(banner.text, "selected message has no attachment");

    press(&mut harness.session, "down");
    press(&mut harness.session, "s");
    settle(&mut harness.session).await;

    let banner = harness.session.banner().expect("banner");
    assert_eq!(banner.level, BannerLevel::Info);
    assert!(banner.text.starts_with("saved attachment to "));
    let saved: Vec<_> = std::fs::read_dir(harness.downloads.path())
        .expect("downloads dir")
        .collect();
    assert_eq!(saved.len(), 1);
}

#[tokio::test]
async fn startup_failure_enters_error_screen_and_retry_recovers() {
    let data = FixtureData::sample();
    let mut harness = harness(data).await;
    harness
        .client
        .fail_next(
            FixtureOperation::ListConversations,
            ChatError::transient("network down"),
        )
        .expect("queue failure");

    harness.session.start();
    settle(&mut harness.session).await;
    assert_eq!(harness.session.state(), AppState::Error);
    assert!(
        harness
            .session
            .error_message()
            .is_some_and(|message| message.contains("network down"))
    );

    press(&mut harness.session, "r");
    settle(&mut harness.session).await;
    assert_eq!(harness.session.state(), AppState::ConversationList);
    assert_eq!(harness.session.error_message(), None);
}

#[tokio::test]
async fn mark_read_invalidates_the_cached_list() {
    let mut harness = harness(unread_pattern()).await;
    harness.session.start();
    settle(&mut harness.session).await;
    press(&mut harness.session, "enter");
    settle(&mut harness.session).await;

    press(&mut harness.session, "m");
    settle(&mut harness.session).await;
    assert!(harness.session.cache().list_timestamp().is_none());

    press(&mut harness.session, "q");
    settle(&mut harness.session).await;
    assert!(harness.session.conversations().is_empty());
    assert_eq!(harness.client.calls().expect("calls").list_conversations, 2);
}

#[tokio::test]
async fn settings_screen_returns_to_previous_state() {
    let mut harness = harness(FixtureData::sample()).await;
    harness.session.start();
    settle(&mut harness.session).await;

    press(&mut harness.session, "o");
    assert_eq!(harness.session.state(), AppState::Settings);
    press(&mut harness.session, "esc");
    assert_eq!(harness.session.state(), AppState::ConversationList);
}

#[tokio::test]
async fn quit_and_global_interrupt_stop_the_session() {
    let mut first = harness(FixtureData::sample()).await;
    first.session.start();
    settle(&mut first.session).await;
    press(&mut first.session, "q");
    assert!(!first.session.is_running());

    let mut second = harness(FixtureData::sample()).await;
    second.session.start();
    settle(&mut second.session).await;
    press(&mut second.session, "enter");
    press(&mut second.session, "r");
    assert_eq!(second.session.state(), AppState::ReplyInput);
    press(&mut second.session, "ctrl+c");
    assert!(!second.session.is_running());
}

#[tokio::test]
async fn leaving_a_conversation_discards_its_late_messages() {
    let data = unread_pattern();
    let downloads = TestDir::new("ui-latency");
    let client = Arc::new(
        FixtureClient::new(data, downloads.path()).with_latency(Duration::from_millis(20)),
    );
    client.connect().await.expect("connect");
    let mut session = Session::new(
        Arc::clone(&client) as Arc<dyn MessagingClient>,
        SessionSettings::default(),
        TtlCache::new(Duration::from_secs(300)),
        TaskOrchestrator::new(Handle::current()),
    )
    .expect("session");
    session.start();
    settle(&mut session).await;

    press(&mut session, "enter");
    press(&mut session, "left");
    settle(&mut session).await;

    assert_eq!(session.state(), AppState::ConversationList);
    assert!(session.messages().is_empty());
    assert!(session.open_conversation().is_none());
}

#[tokio::test]
async fn expired_banner_is_cleared_on_tick() {
    let settings = SessionSettings {
        banner_ttl: Duration::ZERO,
        ..SessionSettings::default()
    };
    let mut harness = harness_with(unread_pattern(), settings, None).await;
    harness.session.start();
    settle(&mut harness.session).await;
    press(&mut harness.session, "enter");
    settle(&mut harness.session).await;

    press(&mut harness.session, "s");
    assert!(harness.session.banner().is_some());
    harness.session.tick();
    assert!(harness.session.banner().is_none());
}

#[tokio::test]
async fn shutdown_persists_cache_metadata() {
    let cache_dir = TestDir::new("ui-cache");
    let mut harness =
        harness_with(FixtureData::sample(), SessionSettings::default(), Some(&cache_dir)).await;
    harness.session.start();
    settle(&mut harness.session).await;

    harness.session.shutdown().await.expect("shutdown");
    assert!(cache_dir.join(LIST_METADATA_FILE).exists());
}

#[tokio::test]
async fn session_renders_conversation_list_into_buffer() {
    let mut harness = harness(FixtureData::sample()).await;
    harness.session.start();
    settle(&mut harness.session).await;

    let palette = Palette::default();
    let mut buffer = Buffer::empty(Rect::new(0, 0, 60, 12));
    {
        let mut surface = BufferSurface::new(&mut buffer, &palette);
        harness.session.render(&mut surface);
    }
    let row = |y: u16| -> String {
        (0..60u16)
            .map(|x| buffer[Position::new(x, y)].symbol())
            .collect::<String>()
            .trim_end()
            .to_owned()
    };
    assert_eq!(row(0), format!("{}Conversations (unread only)", " ".repeat(16)));
    assert_eq!(row(3), "  Rust Meetup [5]");
    assert!(row(11).starts_with(" ↑↓: navigate"));
}
