//! Chatrelay chat - terminal chat client for the relay

use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use clap::Parser;
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use chatrelay_client::config::ClientConfig;
use chatrelay_client::{
    ChatSession, ClientError, ClientResult, Conversation, ConversationView, SendOutcome,
    SendState, StreamConsumer,
};
use chatrelay_server::identity::{StaticCredentials, UserId};
use chatrelay_server::message::Role;
use chatrelay_server::store::{ChatId, ChatRecord, JsonFileStore};

const HELP: &str = "Commands: /new, /chats, /open <number|id>, /logout, /help, /quit";

#[derive(Parser)]
#[command(name = "chatrelay-chat")]
#[command(about = "Chat with the support assistant through a chatrelay server")]
#[command(version)]
pub struct Cli {
    #[clap(long, short = 'c', help = "Path to config file")]
    pub config: Option<PathBuf>,

    #[clap(long, help = "Relay chat endpoint URL")]
    pub relay_url: Option<String>,

    #[clap(long, short, help = "User ID to sign in as")]
    pub user: Option<String>,

    #[clap(long, short = 'd', help = "Path to chat data directory")]
    pub data_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn run() -> ClientResult<()> {
    init_logging();

    let cli = Cli::parse();

    let mut config = ClientConfig::load(cli.config.as_deref())?;
    if let Some(relay_url) = cli.relay_url {
        config.relay_url = relay_url;
    }
    if let Some(user) = cli.user {
        config.user = user;
    }
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = Some(data_dir);
    }

    let user = UserId::try_from(config.user.as_str())?;
    let store = JsonFileStore::open(config.data_dir()).await?;
    let consumer = StreamConsumer::new(config.relay_url()?, config.retry_policy());
    let view = TerminalView::new(config.retry_policy().delay.as_secs());

    let mut session = ChatSession::new(
        consumer,
        Arc::new(store),
        Arc::new(StaticCredentials::new(user.clone())),
        config.greeting.clone(),
    );

    println!("Signed in as {user}. {HELP}");
    session.new_chat().await?;
    print_conversation(session.conversation());

    let mut listed: Vec<ChatRecord> = Vec::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim_end_matches(['\r', '\n']);

        let result = match line.trim() {
            "" => Ok(()),
            "/quit" | "/exit" => break,
            "/help" => {
                println!("{HELP}");
                Ok(())
            }
            "/new" => session.new_chat().await.map(|_| {
                print_conversation(session.conversation());
            }),
            "/chats" => session.list_chats().await.map(|chats| {
                print_chats(&chats);
                listed = chats;
            }),
            "/logout" => {
                session.sign_out();
                println!("Signed out.");
                break;
            }
            command if command.starts_with("/open") => {
                let target = command.trim_start_matches("/open").trim();
                match resolve_chat(target, &listed) {
                    Ok(chat) => session.open_chat(chat).await.map(|_| {
                        print_conversation(session.conversation());
                    }),
                    Err(e) => Err(e),
                }
            }
            command if command.starts_with('/') => {
                println!("Unknown command. {HELP}");
                Ok(())
            }
            _ => send(&mut session, line, &view).await,
        };

        if let Err(e) = result {
            eprintln!("Error: {e}");
        }
    }

    Ok(())
}

async fn send(session: &mut ChatSession, text: &str, view: &TerminalView) -> ClientResult<()> {
    match session.send_message(text, view).await? {
        SendOutcome::Completed(_) => println!(),
        SendOutcome::Failed { apology, .. } => println!("assistant: {}", apology.content),
    }
    Ok(())
}

/// Chat from a `/open` argument: a number from the last `/chats` listing or
/// a full chat ID
fn resolve_chat(target: &str, listed: &[ChatRecord]) -> ClientResult<ChatId> {
    if let Ok(index) = target.parse::<usize>() {
        return listed
            .get(index.wrapping_sub(1))
            .map(|chat| chat.id)
            .ok_or(ClientError::UnknownChat(index));
    }
    Ok(ChatId::parse(target)?)
}

fn print_conversation(conversation: &Conversation) {
    for message in conversation.messages() {
        println!("{}: {}", speaker(message.role), message.content);
    }
}

fn print_chats(chats: &[ChatRecord]) {
    if chats.is_empty() {
        println!("No chats yet.");
        return;
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(["#", "Name", "Created", "ID"]);

    for (index, chat) in chats.iter().enumerate() {
        table.add_row([
            (index + 1).to_string(),
            chat.name.clone(),
            chat.created_at.format("%Y-%m-%d %H:%M").to_string(),
            chat.id.to_string(),
        ]);
    }

    println!("{table}");
}

fn speaker(role: Role) -> &'static str {
    match role {
        Role::User => "you",
        Role::Assistant | Role::System => "assistant",
    }
}

/// Prints reply text as it streams in
struct TerminalView {
    retry_delay_secs: u64,
    /// Bytes of the streaming reply already printed, `None` between replies
    printed: Mutex<Option<usize>>,
}

impl TerminalView {
    fn new(retry_delay_secs: u64) -> Self {
        Self {
            retry_delay_secs,
            printed: Mutex::new(None),
        }
    }
}

impl ConversationView for TerminalView {
    fn state_changed(&self, state: &SendState) {
        if let SendState::RetryWait { attempt } = state {
            eprintln!(
                "(rate limited on attempt {attempt}, retrying in {}s)",
                self.retry_delay_secs
            );
        }
    }

    fn conversation_updated(&self, conversation: &Conversation) {
        let mut printed = self
            .printed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let Some(reply) = conversation.pending_reply() else {
            *printed = None;
            return;
        };

        let offset = match *printed {
            Some(offset) => offset,
            None => {
                print!("assistant: ");
                0
            }
        };
        if let Some(delta) = reply.get(offset..) {
            print!("{delta}");
        }
        *printed = Some(reply.len());
        let _ = std::io::stdout().flush();
    }
}
