use chatterm_app::{CredentialPrompt, build_fixture_client, ensure_authorized, palette};
use chatterm_config::ChattermConfig;
use chatterm_core::test_support::TestDir;
use chatterm_core::{ChatError, ConversationId, FixtureClient, FixtureData, MessagingClient};
use chatterm_ui::{Palette, StyleToken};
use std::collections::VecDeque;

struct ScriptedPrompt {
    answers: VecDeque<&'static str>,
    asked: Vec<String>,
}

impl ScriptedPrompt {
    fn new(answers: &[&'static str]) -> Self {
        Self {
            answers: answers.iter().copied().collect(),
            asked: Vec::new(),
        }
    }
}

impl CredentialPrompt for ScriptedPrompt {
    fn ask(&mut self, label: &str) -> Result<String, ChatError> {
        self.asked.push(label.to_owned());
        self.answers
            .pop_front()
            .map(str::to_owned)
            .ok_or_else(|| ChatError::Unauthorized(format!("no answer for {label}")))
    }
}

fn signed_out(password: Option<&str>) -> FixtureData {
    FixtureData {
        authorized: false,
        password: password.map(str::to_owned),
        ..FixtureData::sample()
    }
}

#[tokio::test]
async fn authorized_client_skips_prompts() {
    let dir = TestDir::new("app-auth-skip");
    let client = FixtureClient::new(FixtureData::sample(), dir.path());
    client.connect().await.expect("connect");
    let mut prompt = ScriptedPrompt::new(&[]);

    ensure_authorized(&client, &mut prompt).await.expect("authorized");
    assert!(prompt.asked.is_empty());
}

#[tokio::test]
async fn code_sign_in_authorizes_the_client() {
    let dir = TestDir::new("app-auth-code");
    let client = FixtureClient::new(signed_out(None), dir.path());
    client.connect().await.expect("connect");
    let mut prompt = ScriptedPrompt::new(&["+15550100", "12345"]);

    ensure_authorized(&client, &mut prompt).await.expect("sign in");
    assert_eq!(prompt.asked, vec!["Phone number", "Login code"]);
    assert!(client.is_authorized().await.expect("status"));
}

#[tokio::test]
async fn password_is_requested_only_after_challenge() {
    let dir = TestDir::new("app-auth-password");
    let client = FixtureClient::new(signed_out(Some("hunter2")), dir.path());
    client.connect().await.expect("connect");
    let mut prompt = ScriptedPrompt::new(&["+15550100", "12345", "hunter2"]);

    ensure_authorized(&client, &mut prompt).await.expect("sign in");
    assert_eq!(prompt.asked, vec!["Phone number", "Login code", "Password"]);
    assert!(client.is_authorized().await.expect("status"));
}

#[tokio::test]
async fn wrong_code_fails_without_password_prompt() {
    let dir = TestDir::new("app-auth-wrong");
    let client = FixtureClient::new(signed_out(Some("hunter2")), dir.path());
    client.connect().await.expect("connect");
    let mut prompt = ScriptedPrompt::new(&["+15550100", "99999"]);

    let error = ensure_authorized(&client, &mut prompt)
        .await
        .expect_err("bad code");
    assert!(matches!(error, ChatError::Unauthorized(_)));
    assert_eq!(prompt.asked.len(), 2);
}

#[tokio::test]
async fn fixture_override_is_loaded_from_disk() {
    let dir = TestDir::new("app-fixture");
    std::fs::create_dir_all(dir.path()).expect("dir");
    let fixture = dir.join("fixture.json");
    std::fs::write(
        &fixture,
        r#"{"conversations": [{"id": 9, "entity": {"kind": "group", "title": "Ops"},
            "unread_count": 1, "messages": []}]}"#,
    )
    .expect("write fixture");

    let config = ChattermConfig::default();
    let client = build_fixture_client(&config, Some(&fixture)).expect("client");
    client.connect().await.expect("connect");
    let conversations = client.list_conversations(10, false).await.expect("list");
    assert_eq!(conversations.len(), 1);
    assert_eq!(conversations[0].id, ConversationId::new(9));
    assert_eq!(conversations[0].name, "Ops");
}

#[test]
fn missing_fixture_file_is_an_error() {
    let dir = TestDir::new("app-fixture-missing");
    let config = ChattermConfig::default();
    assert!(build_fixture_client(&config, Some(&dir.join("absent.json"))).is_err());
}

#[test]
fn palette_follows_configured_colors() {
    let mut config = ChattermConfig::default();
    config.ui.colors.header = "magenta".to_owned();
    let configured = palette(&config);
    assert_ne!(
        configured.style(StyleToken::Header),
        Palette::default().style(StyleToken::Header)
    );
    assert_eq!(
        configured.style(StyleToken::Error),
        Palette::default().style(StyleToken::Error)
    );
}
