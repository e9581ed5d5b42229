//! Dispatch tests: gating, backend selection, prompt substitution, failures.

use super::*;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::backend::ChatClient;

const OWNER: u64 = 1001;
const FRIEND: u64 = 1002;
const STRANGER: u64 = 666;
const BOT: &str = "chatbots_test_bot";

/// Records every prompt it receives; fails with `failure` when set.
struct Recorder {
    name: &'static str,
    calls: Mutex<Vec<String>>,
    failure: Option<String>,
}

impl Recorder {
    fn new(name: &'static str, failure: Option<&str>) -> Arc<Self> {
        Arc::new(Self {
            name,
            calls: Mutex::new(Vec::new()),
            failure: failure.map(str::to_string),
        })
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatClient for Recorder {
    async fn ask(&self, text: &str) -> Result<String, BackendError> {
        self.calls.lock().unwrap().push(text.to_string());
        match self.failure {
            Some(ref detail) => Err(BackendError::Api(detail.clone())),
            None => Ok(format!("{} says hi", self.name)),
        }
    }
}

/// Shared sink for formatted log lines, so tests can read what an operator would.
#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl std::io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for LogBuffer {
    type Writer = LogBuffer;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

struct Fixture {
    board: Switchboard,
    bard: Arc<Recorder>,
    chatgpt: Arc<Recorder>,
}

fn doctor_catalog() -> PromptCatalog {
    PromptCatalog::from_entries([
        ("Doctor", "You are a doctor."),
        ("Linux Terminal", "Act as a linux terminal."),
    ])
}

fn build(catalog: Option<PromptCatalog>, show_exceptions: bool, failure: Option<&str>) -> Fixture {
    let allow_list: AllowList = [OWNER, FRIEND].into_iter().collect();
    let sessions = SessionStore::new(&allow_list, Backend::ChatGpt);
    let bard = Recorder::new("bard", failure);
    let chatgpt = Recorder::new("chatgpt", failure);
    let backends = BackendAdapter::new(bard.clone(), chatgpt.clone());
    let settings = Settings {
        show_exceptions,
        source_url: "https://example.com/source".to_string(),
        bot_username: BOT.to_string(),
    };
    Fixture {
        board: Switchboard::new(allow_list, sessions, catalog, backends, settings),
        bard,
        chatgpt,
    }
}

fn fixture() -> Fixture {
    build(Some(doctor_catalog()), true, None)
}

fn msg(user_id: u64, text: &str) -> Inbound {
    Inbound {
        user_id,
        display_name: "Alice".to_string(),
        text: text.to_string(),
    }
}

/// Click a keyboard button as `user_id`.
fn click(f: &Fixture, user_id: u64, payload: &str) -> Reply {
    f.board.handle_choice(user_id, "Alice", payload)
}

// =============================================================================
// AUTHORIZATION
// =============================================================================

mod authorization {
    use super::*;

    #[tokio::test]
    async fn test_stranger_gets_anonymous_reply_everywhere() {
        let f = fixture();
        for text in [
            "/start",
            "/help",
            "/bard hi",
            "/chatgpt hi",
            "/awesome",
            "/check Doctor",
            "hello there",
        ] {
            let reply = f.board.handle(&msg(STRANGER, text)).await;
            assert!(reply.text.contains("not authorised"), "{text}: {}", reply.text);
            assert!(reply.text.contains("**Alice**"));
            assert!(reply.choices.is_empty());
        }
        assert!(f.bard.calls().is_empty());
        assert!(f.chatgpt.calls().is_empty());
    }

    #[tokio::test]
    async fn test_stranger_commands_do_not_touch_sessions() {
        let f = fixture();
        f.board.handle(&msg(STRANGER, "/bard hi")).await;
        assert!(f.board.sessions.get(STRANGER).is_err());
        assert_eq!(f.board.sessions.get(OWNER).unwrap().selected_backend, Backend::ChatGpt);
        assert_eq!(f.board.sessions.get(FRIEND).unwrap().selected_backend, Backend::ChatGpt);
    }

    #[tokio::test]
    async fn test_myid_is_open_to_everyone() {
        let f = fixture();
        let reply = f.board.handle(&msg(STRANGER, "/myid")).await;
        assert_eq!(reply.text, "Your Telegram ID is **666**");

        let reply = f.board.handle(&msg(OWNER, "/myid")).await;
        assert!(reply.text.contains("1001"));
    }

    #[tokio::test]
    async fn test_anonymous_reply_links_source() {
        let f = fixture();
        let reply = f.board.handle(&msg(STRANGER, "hi")).await;
        assert!(reply.text.contains("https://example.com/source"));
        assert!(reply.markup);
    }
}

// =============================================================================
// BACKEND SELECTION
// =============================================================================

mod selection {
    use super::*;

    #[tokio::test]
    async fn test_default_backend_for_free_text() {
        let f = fixture();
        let reply = f.board.handle(&msg(OWNER, "hello")).await;
        assert_eq!(reply.text, "chatgpt says hi");
        assert_eq!(f.chatgpt.calls(), vec!["hello".to_string()]);
        assert!(f.bard.calls().is_empty());
    }

    #[tokio::test]
    async fn test_bard_selection_persists() {
        let f = fixture();
        let reply = f.board.handle(&msg(OWNER, "/bard first")).await;
        assert_eq!(reply.text, "bard says hi");

        f.board.handle(&msg(OWNER, "second")).await;
        f.board.handle(&msg(OWNER, "third")).await;

        assert_eq!(f.bard.calls(), vec!["first", "second", "third"]);
        assert!(f.chatgpt.calls().is_empty());
    }

    #[tokio::test]
    async fn test_chatgpt_switches_back() {
        let f = fixture();
        f.board.handle(&msg(OWNER, "/bard one")).await;
        f.board.handle(&msg(OWNER, "/chatgpt two")).await;
        f.board.handle(&msg(OWNER, "three")).await;

        assert_eq!(f.bard.calls(), vec!["one"]);
        assert_eq!(f.chatgpt.calls(), vec!["two", "three"]);
    }

    #[tokio::test]
    async fn test_selection_is_per_user() {
        let f = fixture();
        f.board.handle(&msg(OWNER, "/bard mine")).await;
        f.board.handle(&msg(FRIEND, "theirs")).await;

        assert_eq!(f.bard.calls(), vec!["mine"]);
        assert_eq!(f.chatgpt.calls(), vec!["theirs"]);
    }

    #[tokio::test]
    async fn test_bare_switch_confirms_without_backend_call() {
        let f = fixture();
        let reply = f.board.handle(&msg(OWNER, "/bard")).await;
        assert!(reply.text.contains("**Bard**"));
        assert!(f.bard.calls().is_empty());
        assert_eq!(f.board.sessions.get(OWNER).unwrap().selected_backend, Backend::Bard);
    }

    #[tokio::test]
    async fn test_command_addressed_to_this_bot() {
        let f = fixture();
        f.board.handle(&msg(OWNER, &format!("/bard@{BOT} hey"))).await;
        assert_eq!(f.bard.calls(), vec!["hey"]);
    }

    #[tokio::test]
    async fn test_command_for_other_bot_is_free_text() {
        let f = fixture();
        f.board.handle(&msg(OWNER, "/bard@some_other_bot hey")).await;
        assert!(f.bard.calls().is_empty());
        assert_eq!(f.chatgpt.calls(), vec!["/bard@some_other_bot hey"]);
    }

    #[tokio::test]
    async fn test_help_shows_current_backend() {
        let f = fixture();
        let reply = f.board.handle(&msg(OWNER, "/help")).await;
        assert!(reply.text.contains("Current chatbot: **ChatGPT**"));
        assert!(reply.text.contains("/awesome"));

        f.board.handle(&msg(OWNER, "/bard")).await;
        let reply = f.board.handle(&msg(OWNER, "/start")).await;
        assert!(reply.text.contains("Current chatbot: **Bard**"));
        assert!(f.bard.calls().is_empty());
        assert!(f.chatgpt.calls().is_empty());
    }

    #[tokio::test]
    async fn test_help_omits_prompt_commands_without_catalog() {
        let f = build(None, true, None);
        let reply = f.board.handle(&msg(OWNER, "/help")).await;
        assert!(!reply.text.contains("/awesome"));
    }
}

// =============================================================================
// PROMPT TEMPLATES
// =============================================================================

mod templates {
    use super::*;

    fn enable(f: &Fixture, user_id: u64) {
        let payload = ToggleChoice { user_id, action: ToggleAction::Enable }.encode();
        click(f, user_id, &payload);
    }

    #[tokio::test]
    async fn test_disabled_substitution_passes_raw_text() {
        let f = fixture();
        f.board.handle(&msg(OWNER, "%(Doctor)s Hello")).await;
        assert_eq!(f.chatgpt.calls(), vec!["%(Doctor)s Hello"]);
    }

    #[tokio::test]
    async fn test_enabled_substitution_expands_title() {
        let f = fixture();
        enable(&f, OWNER);
        f.board.handle(&msg(OWNER, "%(Doctor)s Hello")).await;
        assert_eq!(f.chatgpt.calls(), vec!["You are a doctor. Hello"]);
    }

    #[tokio::test]
    async fn test_title_and_index_expand_identically() {
        let f = fixture();
        enable(&f, OWNER);
        f.board.handle(&msg(OWNER, "%(Doctor)s")).await;
        f.board.handle(&msg(OWNER, "%(0)s")).await;
        assert_eq!(f.chatgpt.calls(), vec!["You are a doctor.", "You are a doctor."]);
    }

    #[tokio::test]
    async fn test_substitution_applies_to_backend_commands() {
        let f = fixture();
        enable(&f, OWNER);
        f.board.handle(&msg(OWNER, "/bard %(1)s pwd")).await;
        assert_eq!(f.bard.calls(), vec!["Act as a linux terminal. pwd"]);
    }

    #[tokio::test]
    async fn test_missing_key_stops_before_backend() {
        let f = fixture();
        enable(&f, OWNER);
        let reply = f.board.handle(&msg(OWNER, "%(Unknown)s hi")).await;
        assert!(reply.text.contains("missing placeholder key"));
        assert!(reply.text.contains("Unknown"));
        assert!(f.chatgpt.calls().is_empty());
        assert!(f.bard.calls().is_empty());
    }

    #[tokio::test]
    async fn test_substitution_is_per_user() {
        let f = fixture();
        enable(&f, OWNER);
        f.board.handle(&msg(FRIEND, "%(Doctor)s")).await;
        assert_eq!(f.chatgpt.calls(), vec!["%(Doctor)s"]);
    }

    #[tokio::test]
    async fn test_check_returns_prompt() {
        let f = fixture();
        let reply = f.board.handle(&msg(OWNER, "/check Doctor")).await;
        assert_eq!(reply, Reply::plain("You are a doctor."));
    }

    #[tokio::test]
    async fn test_check_key_with_spaces_and_index() {
        let f = fixture();
        let reply = f.board.handle(&msg(OWNER, "/check   Linux Terminal ")).await;
        assert_eq!(reply.text, "Act as a linux terminal.");
        let reply = f.board.handle(&msg(OWNER, "/check 1")).await;
        assert_eq!(reply.text, "Act as a linux terminal.");
    }

    #[tokio::test]
    async fn test_check_unknown_key() {
        let f = fixture();
        let reply = f.board.handle(&msg(OWNER, "/check NoSuchKey")).await;
        assert!(reply.text.contains("No such key"));
        assert!(reply.text.contains("NoSuchKey"));
    }

    #[tokio::test]
    async fn test_check_without_key_shows_usage() {
        let f = fixture();
        let reply = f.board.handle(&msg(OWNER, "/check")).await;
        assert!(reply.text.contains("Usage"));
        assert!(reply.text.contains("**2**"));
    }

    #[tokio::test]
    async fn test_prompt_commands_without_catalog() {
        let f = build(None, true, None);
        let reply = f.board.handle(&msg(OWNER, "/check Doctor")).await;
        assert_eq!(reply.text, PROMPTS_DISABLED);
        let reply = f.board.handle(&msg(OWNER, "/awesome")).await;
        assert_eq!(reply.text, PROMPTS_DISABLED);
        assert!(reply.choices.is_empty());
    }
}

// =============================================================================
// AWESOME TOGGLE
// =============================================================================

mod toggle {
    use super::*;

    #[tokio::test]
    async fn test_menu_offers_three_choices_for_sender() {
        let f = fixture();
        let reply = f.board.handle(&msg(OWNER, "/awesome")).await;
        let payloads: Vec<&str> = reply.choices.iter().map(|c| c.payload.as_str()).collect();
        assert_eq!(payloads, vec!["awesome:1001:on", "awesome:1001:off", "awesome:1001:status"]);
    }

    #[test]
    fn test_enable_disable_status() {
        let f = fixture();
        let reply = click(&f, OWNER, "awesome:1001:on");
        assert!(reply.text.contains("**enabled**"));
        assert!(f.board.sessions.get(OWNER).unwrap().template_substitution_enabled);

        let reply = click(&f, OWNER, "awesome:1001:status");
        assert!(reply.text.contains("currently **enabled**"));

        let reply = click(&f, OWNER, "awesome:1001:off");
        assert!(reply.text.contains("**disabled**"));
        assert!(!f.board.sessions.get(OWNER).unwrap().template_substitution_enabled);
    }

    #[test]
    fn test_embedded_user_must_be_allow_listed() {
        let f = fixture();
        let reply = click(&f, OWNER, "awesome:666:on");
        assert!(reply.text.contains("not authorised"));
        assert!(f.board.sessions.get(STRANGER).is_err());
    }

    #[test]
    fn test_stranger_click_cannot_change_allow_listed_setting() {
        let f = fixture();
        let reply = click(&f, STRANGER, "awesome:1001:on");
        assert!(reply.text.contains("not authorised"), "{}", reply.text);
        assert!(reply.text.contains("**Alice**"));
        assert!(!f.board.sessions.get(OWNER).unwrap().template_substitution_enabled);
        assert!(f.board.sessions.get(STRANGER).is_err());
    }

    #[test]
    fn test_stranger_click_on_status_reveals_nothing() {
        let f = fixture();
        click(&f, OWNER, "awesome:1001:on");
        let reply = click(&f, STRANGER, "awesome:1001:status");
        assert!(!reply.text.contains("enabled"), "{}", reply.text);
    }

    #[test]
    fn test_embedded_user_decides_whose_setting_changes() {
        let f = fixture();
        click(&f, FRIEND, "awesome:1001:on");
        assert!(f.board.sessions.get(OWNER).unwrap().template_substitution_enabled);
        assert!(!f.board.sessions.get(FRIEND).unwrap().template_substitution_enabled);
    }

    #[test]
    fn test_malformed_payloads_change_nothing() {
        let f = fixture();
        for payload in ["", "awesome", "awesome:abc:on", "awesome:1001:maybe", "other:1001:on"] {
            let reply = click(&f, OWNER, payload);
            assert_eq!(reply.text, "Unknown option.", "{payload}");
        }
        assert!(!f.board.sessions.get(OWNER).unwrap().template_substitution_enabled);
    }

    #[test]
    fn test_payload_round_trip() {
        let choice = ToggleChoice { user_id: 42, action: ToggleAction::Status };
        assert_eq!(ToggleChoice::parse(&choice.encode()), Some(choice));
    }
}

// =============================================================================
// BACKEND FAILURES
// =============================================================================

mod failures {
    use super::*;

    #[tokio::test]
    async fn test_generic_message_when_exceptions_hidden() {
        let f = build(Some(doctor_catalog()), false, Some("quota exceeded for key sk-123"));
        let reply = f.board.handle(&msg(OWNER, "hello")).await;
        assert_eq!(reply.text, format!("**{GENERIC_FAILURE}**"));
        assert!(!reply.text.contains("quota"));
        assert_eq!(f.chatgpt.calls(), vec!["hello"]);
    }

    #[tokio::test]
    async fn test_hidden_detail_still_reaches_operator_log() {
        let logs = LogBuffer::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(logs.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::INFO)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let f = build(Some(doctor_catalog()), false, Some("quota exceeded for key sk-123"));
        let reply = f.board.handle(&msg(OWNER, "hello")).await;
        assert!(!reply.text.contains("quota"));

        let logged = logs.contents();
        let line = logged
            .lines()
            .find(|l| l.contains("quota exceeded"))
            .unwrap_or_else(|| panic!("failure detail missing from log:\n{logged}"));
        assert!(line.contains("ERROR"), "{line}");
        assert!(
            line.contains("ChatGPT failed for user 1001: API error: quota exceeded for key sk-123"),
            "{line}"
        );
    }

    #[tokio::test]
    async fn test_detail_shown_when_exceptions_enabled() {
        let f = build(Some(doctor_catalog()), true, Some("quota exceeded"));
        let reply = f.board.handle(&msg(OWNER, "/bard hello")).await;
        assert_eq!(reply.text, "**API error: quota exceeded**");
    }

    #[tokio::test]
    async fn test_failure_does_not_poison_later_turns() {
        let f = build(None, false, Some("down"));
        f.board.handle(&msg(OWNER, "one")).await;
        let reply = f.board.handle(&msg(OWNER, "/myid")).await;
        assert!(reply.text.contains("1001"));
        f.board.handle(&msg(OWNER, "two")).await;
        assert_eq!(f.chatgpt.calls(), vec!["one", "two"]);
    }
}
