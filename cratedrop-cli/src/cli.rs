use std::sync::Arc;

use clap::{Parser, Subcommand};
use cratedrop_controls::{
    Context, Player, Transport, client::Client, sink::RodioResource,
};
use cratedrop_database::Database;
use dialoguer::{Input, Password};
use snafu::prelude::*;
use tokio::sync::mpsc;
use tracing::info;

use crate::console::Console;

#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    /// Provide the library server url. (overrides any database value)
    #[clap(short, long, env = "CRATEDROP_SERVER_URL")]
    server_url: Option<String>,

    /// Provide an email. (overrides any database value)
    #[clap(short, long, env = "CRATEDROP_EMAIL")]
    email: Option<String>,

    #[clap(short, long, env = "CRATEDROP_PASSWORD", hide_env_values = true)]
    /// Provide a password. Prompted for when missing.
    password: Option<String>,

    #[clap(short, long)]
    /// Collection to refill the queue from: all, unsorted or a crate id.
    context: Option<Context>,

    #[clap(short, long)]
    /// Log level
    verbosity: Option<tracing::Level>,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open the player
    Open,
    /// Set configuration options
    Config {
        #[clap(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Set server url.
    #[clap(value_parser)]
    ServerUrl { url: Option<String> },
    /// Set email.
    #[clap(value_parser)]
    Email { email: Option<String> },
}

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("{error}"))]
    PlayerError { error: String },
    #[snafu(display("{error}"))]
    DatabaseError { error: String },
    #[snafu(display("{error}"))]
    TerminalError { error: String },
}

impl From<cratedrop_controls::error::Error> for Error {
    fn from(error: cratedrop_controls::error::Error) -> Self {
        Error::PlayerError {
            error: error.to_string(),
        }
    }
}

impl From<cratedrop_database::Error> for Error {
    fn from(error: cratedrop_database::Error) -> Self {
        Error::DatabaseError {
            error: error.to_string(),
        }
    }
}

impl From<dialoguer::Error> for Error {
    fn from(error: dialoguer::Error) -> Self {
        Error::TerminalError {
            error: error.to_string(),
        }
    }
}

pub async fn run() -> Result<(), Error> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity.unwrap_or(tracing::Level::WARN))
        .with_target(false)
        .compact()
        .init();

    let database = Database::new().await?;

    match cli.command {
        Commands::Open => {
            let database_credentials = database.get_credentials().await?;
            let database_configuration = database.get_configuration().await?;

            let server_url = match cli.server_url.or(database_configuration.server_url) {
                Some(server_url) => server_url,
                None => Input::new()
                    .with_prompt("Enter the library server url")
                    .interact_text()?,
            };

            let email = match cli.email.or(database_credentials.email) {
                Some(email) => email,
                None => Input::new().with_prompt("Enter your email").interact_text()?,
            };

            let password = match cli.password {
                Some(password) => password,
                None => Password::new()
                    .with_prompt("Enter your password (hidden)")
                    .interact()?,
            };

            let context = cli
                .context
                .or_else(|| {
                    database_configuration
                        .context
                        .and_then(|context| context.parse().ok())
                })
                .unwrap_or_default();

            let client = Arc::new(Client::new(server_url, email, password));
            client.login().await?;

            let transport = Transport::new(client.clone());
            transport.set_context(context.clone());
            info!("Refilling queue from {context}");

            let (events_tx, events) = mpsc::unbounded_channel();
            let resource = RodioResource::new(client.clone(), events_tx);
            let mut player = Player::new(transport.clone(), resource, events, client.clone());

            let console = Console::new(
                transport,
                player.controls(),
                player.progress(),
                client,
                database,
            );
            tokio::spawn(async move {
                console.run().await;
            });

            player.player_loop().await;
            Ok(())
        }
        Commands::Config { command } => match command {
            ConfigCommands::ServerUrl { url } => {
                let url = match url {
                    Some(url) => url,
                    None => Input::new()
                        .with_prompt("Enter the library server url")
                        .interact_text()?,
                };
                database.set_server_url(&url).await?;

                println!("Server url saved.");
                Ok(())
            }
            ConfigCommands::Email { email } => {
                let email = match email {
                    Some(email) => email,
                    None => Input::new().with_prompt("Enter your email").interact_text()?,
                };
                database.set_email(&email).await?;

                println!("Email saved.");
                Ok(())
            }
        },
    }
}
