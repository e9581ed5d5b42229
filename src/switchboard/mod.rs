//! Switchboard - routes one inbound message to help, ID echo, backend
//! selection, the prompt catalog, or a chat turn.
//!
//! Everything here is transport-free: the Telegram layer turns updates into
//! [`Inbound`] values and sends back whatever [`Reply`] comes out.

use teloxide::utils::command::BotCommands;
use tracing::{error, info, warn};

use crate::access::{anonymous_reply, AllowList};
use crate::backend::{Backend, BackendAdapter, BackendError};
use crate::prompts::PromptCatalog;
use crate::session::SessionStore;

#[cfg(test)]
mod tests;

const GENERIC_FAILURE: &str = "Error occurred while generating response!";
const PROMPTS_DISABLED: &str = "Awesome prompts are not enabled on this bot.";
const CHOICE_PREFIX: &str = "awesome";

#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "These commands are supported:")]
pub enum Command {
    #[command(description = "show the help message.")]
    Start(String),
    #[command(description = "show the help message.")]
    Help,
    #[command(description = "show your Telegram ID.")]
    MyId,
    #[command(description = "chat with Bard (Google).")]
    Bard(String),
    #[command(description = "chat with ChatGPT (OpenAI).")]
    ChatGpt(String),
    #[command(description = "turn awesome prompts on or off.")]
    Awesome,
    #[command(description = "show an awesome prompt by title or index.")]
    Check(String),
}

pub struct Settings {
    /// Show backend error details instead of a generic failure message.
    pub show_exceptions: bool,
    pub source_url: String,
    /// Used to accept `/cmd@this_bot` and ignore commands meant for other bots.
    pub bot_username: String,
}

/// A text message as far as the switchboard cares.
#[derive(Debug, Clone)]
pub struct Inbound {
    pub user_id: u64,
    pub display_name: String,
    pub text: String,
}

/// An inline keyboard button.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Choice {
    pub label: String,
    pub payload: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    /// Render `**bold**`, links and code as Telegram markup.
    pub markup: bool,
    pub choices: Vec<Choice>,
}

impl Reply {
    pub fn markup(text: impl Into<String>) -> Self {
        Self { text: text.into(), markup: true, choices: Vec::new() }
    }

    pub fn plain(text: impl Into<String>) -> Self {
        Self { text: text.into(), markup: false, choices: Vec::new() }
    }

    fn with_choices(mut self, choices: Vec<Choice>) -> Self {
        self.choices = choices;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleAction {
    Enable,
    Disable,
    Status,
}

/// Callback payload of the `/awesome` keyboard: `awesome:<user_id>:<on|off|status>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToggleChoice {
    pub user_id: u64,
    pub action: ToggleAction,
}

impl ToggleChoice {
    pub fn encode(&self) -> String {
        let action = match self.action {
            ToggleAction::Enable => "on",
            ToggleAction::Disable => "off",
            ToggleAction::Status => "status",
        };
        format!("{CHOICE_PREFIX}:{}:{action}", self.user_id)
    }

    pub fn parse(payload: &str) -> Option<Self> {
        let mut parts = payload.splitn(3, ':');
        if parts.next()? != CHOICE_PREFIX {
            return None;
        }
        let user_id = parts.next()?.parse().ok()?;
        let action = match parts.next()? {
            "on" => ToggleAction::Enable,
            "off" => ToggleAction::Disable,
            "status" => ToggleAction::Status,
            _ => return None,
        };
        Some(Self { user_id, action })
    }
}

pub struct Switchboard {
    allow_list: AllowList,
    sessions: SessionStore,
    catalog: Option<PromptCatalog>,
    backends: BackendAdapter,
    settings: Settings,
}

impl Switchboard {
    pub fn new(
        allow_list: AllowList,
        sessions: SessionStore,
        catalog: Option<PromptCatalog>,
        backends: BackendAdapter,
        settings: Settings,
    ) -> Self {
        Self { allow_list, sessions, catalog, backends, settings }
    }

    /// Process one message through to the reply.
    pub async fn handle(&self, inbound: &Inbound) -> Reply {
        let command = Command::parse(&inbound.text, &self.settings.bot_username).ok();
        let user_id = inbound.user_id;

        // The only command open to everyone, so people can ask to be allow-listed.
        if command == Some(Command::MyId) {
            return my_id_reply(user_id);
        }

        if !self.allow_list.permits(user_id) {
            info!("Unauthorised {} ({}) - denial", inbound.display_name, user_id);
            return Reply::markup(anonymous_reply(&inbound.display_name, &self.settings.source_url));
        }

        match command {
            Some(Command::Start(_)) | Some(Command::Help) => {
                self.help(user_id, &inbound.display_name)
            }
            Some(Command::MyId) => my_id_reply(user_id),
            Some(Command::Bard(text)) => self.select(user_id, Backend::Bard, &text).await,
            Some(Command::ChatGpt(text)) => self.select(user_id, Backend::ChatGpt, &text).await,
            Some(Command::Awesome) => self.awesome_menu(user_id),
            Some(Command::Check(key)) => self.check(&key),
            None => self.chat_turn(user_id, &inbound.text).await,
        }
    }

    /// Apply a `/awesome` keyboard selection clicked by `clicker_id`.
    ///
    /// The clicker must be allow-listed like any other sender. The user ID
    /// embedded in the payload then decides whose setting changes.
    pub fn handle_choice(&self, clicker_id: u64, clicker_name: &str, payload: &str) -> Reply {
        if !self.allow_list.permits(clicker_id) {
            info!("Unauthorised {clicker_name} ({clicker_id}) - choice denial");
            return Reply::markup(anonymous_reply(clicker_name, &self.settings.source_url));
        }

        let Some(choice) = ToggleChoice::parse(payload) else {
            warn!("Unrecognised callback payload {payload:?} from {clicker_id}");
            return Reply::plain("Unknown option.");
        };

        if !self.allow_list.permits(choice.user_id) {
            warn!(
                "Callback for non-allow-listed user {} (clicked by {clicker_id})",
                choice.user_id
            );
            return Reply::plain("You are not authorised to change this setting.");
        }

        // The embedded ID decides whose setting changes, not the clicker's.
        if clicker_id != choice.user_id {
            warn!("Callback for user {} was clicked by {clicker_id}", choice.user_id);
        }

        if self.catalog.is_none() {
            return Reply::plain(PROMPTS_DISABLED);
        }

        let result = match choice.action {
            ToggleAction::Enable => self.sessions.set_template_enabled(choice.user_id, true),
            ToggleAction::Disable => self.sessions.set_template_enabled(choice.user_id, false),
            ToggleAction::Status => Ok(()),
        };
        if let Err(e) = result {
            error!("Toggle failed: {e}");
            return Reply::plain("Could not update the setting.");
        }

        let enabled = match self.sessions.get(choice.user_id) {
            Ok(session) => session.template_substitution_enabled,
            Err(e) => {
                error!("Toggle status failed: {e}");
                return Reply::plain("Could not read the setting.");
            }
        };
        let state = if enabled { "enabled" } else { "disabled" };
        info!("Awesome prompts {state} for user {}", choice.user_id);

        match choice.action {
            ToggleAction::Status => {
                Reply::markup(format!("Awesome prompts are currently **{state}**."))
            }
            _ => Reply::markup(format!("Awesome prompts **{state}**.")),
        }
    }

    fn help(&self, user_id: u64, display_name: &str) -> Reply {
        let backend = self
            .sessions
            .get(user_id)
            .map(|s| s.selected_backend.to_string())
            .unwrap_or_else(|_| "none".to_string());

        let prompts = if self.catalog.is_some() {
            "/awesome : Turn awesome prompts on or off\n\
             /check <title or index> : Show an awesome prompt\n"
        } else {
            ""
        };

        Reply::markup(format!(
            "Hi **{display_name}**.\n\
             This bot lets you chat directly with **Bard** and **ChatGPT**.\n\n\
             Available commands:\n\n\
             /start or /help : Show this message\n\
             /myid : Show your Telegram ID\n\
             /bard <text> : Chat with Bard - **Google**\n\
             /chatgpt <text> : Chat with ChatGPT - **OpenAI**\n\
             {prompts}\n\
             Plain messages go to the chatbot you used most recently.\n\
             Current chatbot: **{backend}**.\n\n\
             Have some fun!"
        ))
    }

    async fn select(&self, user_id: u64, backend: Backend, text: &str) -> Reply {
        if let Err(e) = self.sessions.set_backend(user_id, backend) {
            error!("Backend switch failed: {e}");
            return Reply::plain("Could not switch chatbot.");
        }
        info!("User {user_id} switched to {backend}");

        let text = text.trim();
        if text.is_empty() {
            return Reply::markup(format!(
                "Now chatting with **{backend}**. Send a message to begin."
            ));
        }
        self.chat_turn(user_id, text).await
    }

    fn awesome_menu(&self, user_id: u64) -> Reply {
        if self.catalog.is_none() {
            return Reply::plain(PROMPTS_DISABLED);
        }

        let choice = |label: &str, action| Choice {
            label: label.to_string(),
            payload: ToggleChoice { user_id, action }.encode(),
        };
        Reply::markup(
            "**Awesome prompts**\n\
             Write `%(title)s` or `%(index)s` in a message to insert a prompt.",
        )
        .with_choices(vec![
            choice("Enable", ToggleAction::Enable),
            choice("Disable", ToggleAction::Disable),
            choice("Status", ToggleAction::Status),
        ])
    }

    fn check(&self, key: &str) -> Reply {
        let Some(ref catalog) = self.catalog else {
            return Reply::plain(PROMPTS_DISABLED);
        };

        let key = key.trim();
        if key.is_empty() {
            let example = catalog.titles().first().map(String::as_str).unwrap_or("0");
            return Reply::markup(format!(
                "Usage: /check <title or index>, e.g. `/check {example}`\n**{}** prompts loaded.",
                catalog.len()
            ));
        }

        match catalog.resolve(key) {
            Some(prompt) => Reply::plain(prompt),
            None => Reply::markup(format!("No such key: **{key}**")),
        }
    }

    async fn chat_turn(&self, user_id: u64, text: &str) -> Reply {
        let session = match self.sessions.get(user_id) {
            Ok(session) => session,
            Err(e) => {
                error!("Chat turn without session: {e}");
                return Reply::plain(GENERIC_FAILURE);
            }
        };

        let prompt = match self.catalog {
            Some(ref catalog) if session.template_substitution_enabled => {
                match catalog.substitute(text) {
                    Ok(prompt) => prompt,
                    Err(e) => {
                        warn!("Substitution failed for user {user_id}: {e}");
                        return Reply::markup(format!("**Awesome prompt error: {e}**"));
                    }
                }
            }
            _ => text.to_string(),
        };

        let backend = session.selected_backend;
        match self.backends.ask(backend, &prompt).await {
            Ok(answer) => {
                info!("{backend} answered user {user_id} ({} chars)", answer.len());
                Reply::markup(answer)
            }
            Err(e) => {
                error!("{backend} failed for user {user_id}: {e}");
                self.failure_reply(&e)
            }
        }
    }

    fn failure_reply(&self, error: &BackendError) -> Reply {
        let detail = if self.settings.show_exceptions {
            error.to_string()
        } else {
            GENERIC_FAILURE.to_string()
        };
        Reply::markup(format!("**{detail}**"))
    }
}

fn my_id_reply(user_id: u64) -> Reply {
    Reply::markup(format!("Your Telegram ID is **{user_id}**"))
}
