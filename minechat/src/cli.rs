use std::{path::PathBuf, time::Duration};

use clap::{Args, Parser, Subcommand};

use crate::{connector::TcpConnector, session::SessionConfig};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub server: ServerArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Join the chat from the terminal, reconnecting whenever the link drops.
    Chat(ChatArgs),
    /// Create an account and print its token.
    Register(RegisterArgs),
    /// Post a single message and exit.
    Send(SendArgs),
    /// Save the chat to a file without logging in.
    Listen(ListenArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServerArgs {
    /// Chat server host name.
    #[arg(long, env = "HOST", default_value = "minechat.dvmn.org", global = true)]
    pub host: String,

    /// Port of the read-only broadcast stream.
    #[arg(long, env = "READING_PORT", default_value_t = 5000, global = true)]
    pub reading_port: u16,

    /// Port of the command stream used to log in and post.
    #[arg(long, env = "SENDING_PORT", default_value_t = 5050, global = true)]
    pub sending_port: u16,
}

impl ServerArgs {
    pub fn connector(&self) -> TcpConnector {
        TcpConnector::new(self.host.clone(), self.reading_port, self.sending_port)
    }
}

#[derive(Args, Debug, Clone)]
pub struct ChatArgs {
    /// Account token. Leave empty to register a new account.
    #[arg(long, env = "TOKEN")]
    pub token: Option<String>,

    /// Nickname used if the server asks to register.
    #[arg(long, env = "NICKNAME")]
    pub nickname: Option<String>,

    #[command(flatten)]
    pub history: HistoryArgs,

    #[command(flatten)]
    pub timing: TimingArgs,
}

#[derive(Args, Debug, Clone)]
pub struct RegisterArgs {
    /// Nickname for the new account.
    #[arg(long, env = "NICKNAME")]
    pub nickname: String,
}

#[derive(Args, Debug, Clone)]
pub struct SendArgs {
    /// Account token.
    #[arg(long, env = "TOKEN")]
    pub token: String,

    /// Text to post. Line breaks are flattened into spaces.
    #[arg(long)]
    pub message: String,
}

#[derive(Args, Debug, Clone)]
pub struct ListenArgs {
    #[command(flatten)]
    pub history: HistoryArgs,

    /// Seconds to wait before reconnecting.
    #[arg(long, env = "RECONNECT_DELAY", default_value = "5", value_parser = parse_seconds)]
    pub reconnect_delay: Duration,
}

#[derive(Args, Debug, Clone)]
pub struct HistoryArgs {
    /// File the chat history is appended to.
    #[arg(long, env = "HISTORY_FILE", default_value = "history.txt")]
    pub history_file: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct TimingArgs {
    /// Seconds without any sign of life before the connection is dropped.
    #[arg(long, env = "WATCHDOG_TIMEOUT", default_value = "3", value_parser = parse_seconds)]
    pub watchdog_timeout: Duration,

    /// Seconds between keepalive messages.
    #[arg(long, env = "KEEPALIVE_INTERVAL", default_value = "2", value_parser = parse_seconds)]
    pub keepalive_interval: Duration,

    /// Seconds to wait before reconnecting.
    #[arg(long, env = "RECONNECT_DELAY", default_value = "5", value_parser = parse_seconds)]
    pub reconnect_delay: Duration,
}

impl From<TimingArgs> for SessionConfig {
    fn from(args: TimingArgs) -> Self {
        Self {
            watchdog_timeout: args.watchdog_timeout,
            keepalive_interval: args.keepalive_interval,
            reconnect_delay: args.reconnect_delay,
        }
    }
}

fn parse_seconds(value: &str) -> Result<Duration, String> {
    let seconds: f64 = value
        .trim()
        .parse()
        .map_err(|_| format!("'{value}' is not a number of seconds"))?;
    Duration::try_from_secs_f64(seconds).map_err(|err| format!("invalid duration '{value}': {err}"))
}
