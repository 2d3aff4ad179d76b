use anyhow::{Context, Result, bail};
use clap::Parser;
use tokio::select;
use tracing::{info, warn};

use minechat::{
    auth::Credentials,
    cli::{ChatArgs, Cli, Command, ListenArgs, RegisterArgs, SendArgs, ServerArgs},
    console,
    error::SessionError,
    history::HistoryFile,
    oneshot,
    session::Session,
};

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Command::Chat(args) => chat(&cli.server, args).await,
        Command::Register(args) => register(&cli.server, args).await,
        Command::Send(args) => send(&cli.server, args).await,
        Command::Listen(args) => listen(&cli.server, args).await,
    }
}

async fn chat(server: &ServerArgs, args: ChatArgs) -> Result<()> {
    let history = open_history(&args.history.history_file).await?;
    let previous_lines = history.load().await.unwrap_or_else(|error| {
        warn!(?error, "could not read the saved history");
        Vec::new()
    });

    let credentials = Credentials::new(args.token, args.nickname);
    let (mut session, presentation) = Session::new(
        server.connector(),
        args.timing.into(),
        credentials,
        history,
    );

    select! {
        outcome = session.run_until_ctrl_c() => match outcome {
            Ok(()) => Ok(()),
            Err(SessionError::InvalidToken) => bail!(
                "the server refused to register a new account; \
                 try `minechat register --nickname <name>`"
            ),
            Err(error) => Err(error.into()),
        },
        outcome = console::run(presentation, &previous_lines) => outcome,
    }
}

async fn register(server: &ServerArgs, args: RegisterArgs) -> Result<()> {
    let registration = oneshot::register(&server.connector(), &args.nickname)
        .await
        .context("registration failed")?;
    if let Some(nickname) = &registration.nickname {
        info!(%nickname, "registered");
    }
    println!("{}", registration.token);
    Ok(())
}

async fn send(server: &ServerArgs, args: SendArgs) -> Result<()> {
    oneshot::send_message(&server.connector(), &args.token, &args.message)
        .await
        .context("failed to post the message")
}

async fn listen(server: &ServerArgs, args: ListenArgs) -> Result<()> {
    let history = open_history(&args.history.history_file).await?;
    let connector = server.connector();

    select! {
        outcome = oneshot::listen(&connector, &history, args.reconnect_delay, |message| {
            println!("{message}");
        }) => match outcome {
            Ok(never) => match never {},
            Err(error) => Err(error).context("listening stopped"),
        },
        _ = tokio::signal::ctrl_c() => Ok(()),
    }
}

async fn open_history(path: &std::path::Path) -> Result<HistoryFile> {
    HistoryFile::open(path)
        .await
        .with_context(|| format!("cannot write chat history to {}", path.display()))
}
