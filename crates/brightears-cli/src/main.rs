//! Bright Ears conversation client.
//!
//! # Usage
//!
//! ```bash
//! # Follow a booking conversation
//! BRIGHTEARS_TOKEN=... brightears --base-url https://brightears.example \
//!     --booking bk-42 --user-id cust-1 --user-name Nok watch
//!
//! # Send one message
//! brightears --booking bk-42 --user-id cust-1 --user-name Nok send "Is the 14th free?"
//! ```

use std::time::Duration;

use brightears_cli::{SessionConfig, session};
use brightears_client::{ChatConfig, ConversationId, http::HttpConfig};
use brightears_core::{MessageDraft, MessageId, Sender, SenderRole};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Bright Ears booking conversation client
#[derive(Parser, Debug)]
#[command(name = "brightears")]
#[command(about = "Join a Bright Ears booking conversation from the terminal")]
#[command(version)]
struct Args {
    /// Marketplace origin
    #[arg(long, env = "BRIGHTEARS_BASE_URL", default_value = "http://localhost:3000")]
    base_url: String,

    /// Bearer token from the identity provider
    #[arg(long, env = "BRIGHTEARS_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Booking whose conversation to join
    #[arg(short, long)]
    booking: String,

    /// Your user id
    #[arg(long)]
    user_id: String,

    /// Your display name
    #[arg(long)]
    user_name: String,

    /// Your role in the booking
    #[arg(long, value_enum, default_value = "customer")]
    role: Role,

    /// Disable automatic reconnection
    #[arg(long)]
    no_reconnect: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Follow the conversation until Ctrl-C
    Watch,

    /// Send a message and wait for confirmation
    Send {
        /// Message text
        text: String,

        /// Reply to this message id
        #[arg(long)]
        reply_to: Option<String>,

        /// Seconds to wait for the connection and the confirmation
        #[arg(long, default_value = "30")]
        timeout: u64,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Role {
    Customer,
    Artist,
    Admin,
}

impl From<Role> for SenderRole {
    fn from(role: Role) -> Self {
        match role {
            Role::Customer => Self::Customer,
            Role::Artist => Self::Artist,
            Role::Admin => Self::Admin,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    let mut http = HttpConfig::new(args.base_url);
    if let Some(token) = args.token {
        http = http.with_token(token);
    }
    let config = SessionConfig {
        http,
        conversation: ConversationId::new(args.booking),
        viewer: Sender {
            id: args.user_id,
            name: args.user_name,
            role: args.role.into(),
            avatar: None,
        },
        chat: ChatConfig { auto_reconnect: !args.no_reconnect, ..ChatConfig::default() },
    };

    match args.command {
        Command::Watch => session::watch(config).await?,
        Command::Send { text, reply_to, timeout } => {
            let mut draft = MessageDraft::text(text);
            if let Some(parent) = reply_to {
                draft = draft.replying_to(MessageId::new(parent));
            }
            session::send(config, draft, Duration::from_secs(timeout)).await?;
        },
    }

    Ok(())
}
