mod access;
mod backend;
mod config;
mod markup;
mod prompts;
mod session;
mod switchboard;
mod telegram;

use std::sync::Arc;

use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;
use tracing::{error, info, warn};
use tracing_subscriber::prelude::*;

use backend::{BackendAdapter, BardClient, ChatGptClient};
use config::Config;
use prompts::PromptCatalog;
use session::SessionStore;
use switchboard::{Command, Inbound, Settings, Switchboard};
use telegram::TelegramClient;

const PROG: &str = env!("CARGO_PKG_NAME");
const VERSION: &str = env!("CARGO_PKG_VERSION");

struct BotState {
    switchboard: Switchboard,
    telegram: TelegramClient,
}

impl BotState {
    async fn new(config: Config, bot: &Bot) -> Result<Self, backend::BackendError> {
        let bot_username = match bot.get_me().await {
            Ok(me) => {
                info!("Bot user ID: {}, username: @{}", me.id, me.username());
                me.username().to_string()
            }
            Err(e) => {
                warn!("Failed to get bot info: {e}");
                String::new()
            }
        };

        let catalog = match config.awesome_prompts_url {
            Some(ref url) => match PromptCatalog::fetch(url).await {
                Ok(catalog) if catalog.is_empty() => {
                    warn!("Awesome prompts catalog at {url} is empty");
                    Some(catalog)
                }
                Ok(catalog) => Some(catalog),
                Err(e) => {
                    warn!("Awesome prompts disabled, failed to load catalog: {e}");
                    None
                }
            },
            None => {
                info!("Awesome prompts disabled");
                None
            }
        };

        let bard = BardClient::new(config.bard_api_key.clone(), config.bard_model.clone())?;
        let chatgpt = ChatGptClient::new(
            config.openai_api_key.clone(),
            config.openai_api_base.clone(),
            config.openai_model.clone(),
        )?;
        let backends = BackendAdapter::new(Arc::new(bard), Arc::new(chatgpt));

        let sessions = SessionStore::new(&config.allow_list, config.default_backend);
        let settings = Settings {
            show_exceptions: config.show_exceptions,
            source_url: config.source_url.clone(),
            bot_username,
        };

        Ok(Self {
            switchboard: Switchboard::new(config.allow_list, sessions, catalog, backends, settings),
            telegram: TelegramClient::new(bot.clone()),
        })
    }
}

#[tokio::main]
async fn main() {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{PROG}: {e}");
            std::process::exit(1);
        }
    };

    // Setup logging
    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stdout)
        .with_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(config.log_level.into()),
        );

    let mut _guard = None;
    let file_layer = match config.log_file {
        Some(ref path) => match std::fs::OpenOptions::new().create(true).append(true).open(path) {
            Ok(log_file) => {
                let (non_blocking, guard) = tracing_appender::non_blocking(log_file);
                _guard = Some(guard);
                Some(
                    tracing_subscriber::fmt::layer()
                        .with_writer(non_blocking)
                        .with_ansi(false)
                        .with_filter(
                            tracing_subscriber::EnvFilter::from_default_env()
                                .add_directive(config.log_level.into()),
                        ),
                )
            }
            Err(e) => {
                eprintln!("{PROG}: can't open log file '{}': {e}", path.display());
                None
            }
        },
        None => None,
    };

    tracing_subscriber::registry()
        .with(stdout_layer)
        .with(file_layer)
        .init();

    info!("{PROG} - v{VERSION}");
    info!("I will show exceptions - {}", config.show_exceptions);
    if config.allow_list.is_empty() {
        warn!("No users in users_id, every chat command will be refused");
    } else {
        info!("Whitelisted users: {:?}", config.allow_list.ids());
    }
    info!("Default chatbot: {}", config.default_backend);

    let bot = Bot::new(&config.telegram_bot_token);

    let state = match BotState::new(config, &bot).await {
        Ok(state) => Arc::new(state),
        Err(e) => {
            error!("Failed to initialise chatbots: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = bot.set_my_commands(Command::bot_commands()).await {
        warn!("Failed to register bot commands: {e}");
    }

    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint(handle_message))
        .branch(Update::filter_callback_query().endpoint(handle_callback));

    info!("Bot is up and running!");

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
}

async fn handle_message(msg: Message, state: Arc<BotState>) -> ResponseResult<()> {
    let user = match msg.from {
        Some(ref u) => u,
        None => return Ok(()),
    };

    // Photos, stickers and the like have nothing to relay.
    let text = match msg.text() {
        Some(t) => t,
        None => return Ok(()),
    };

    let inbound = Inbound {
        user_id: user.id.0,
        display_name: user.first_name.clone(),
        text: text.to_string(),
    };

    let username = user.username.as_deref().unwrap_or(&user.first_name);
    let text_preview: String = text.chars().take(100).collect();
    info!("📨 Message from {username} ({}): \"{text_preview}\"", user.id);

    let reply = state.switchboard.handle(&inbound).await;
    if let Err(e) = state.telegram.send_reply(msg.chat.id, msg.id, &reply).await {
        warn!("Reply to {username} ({}) lost: {e}", user.id);
    }

    Ok(())
}

async fn handle_callback(query: CallbackQuery, state: Arc<BotState>) -> ResponseResult<()> {
    let Some(ref data) = query.data else {
        return Ok(());
    };

    info!("🔘 Choice {data:?} from {} ({})", query.from.first_name, query.from.id);

    let reply = state
        .switchboard
        .handle_choice(query.from.id.0, &query.from.first_name, data);
    if let Err(e) = state.telegram.answer_choice(&query, &reply).await {
        warn!("Choice outcome for {} lost: {e}", query.from.id);
    }

    Ok(())
}
