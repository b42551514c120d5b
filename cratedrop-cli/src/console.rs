use std::{sync::Arc, time::Duration};

use cratedrop_controls::{
    Context, ProgressBar, Transport, client::Client, controls::Controls, player::Progress,
};
use cratedrop_database::Database;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::watch,
};
use tracing::warn;

const HELP: &str = "commands: play <track-id>, add <track-id>, next, prev, toggle, \
seek <percent>, context <all|unsorted|crate-id>, queue, status, crates, quit";

/// `seek <percent>` is applied as a click on a bar one hundred units wide.
const PERCENT_BAR: ProgressBar = ProgressBar {
    left: 0.0,
    width: 100.0,
};

#[derive(Debug, Clone, PartialEq)]
enum Command {
    Play(String),
    Add(String),
    Next,
    Prev,
    Toggle,
    Seek(f64),
    Context(Context),
    Queue,
    Status,
    Crates,
    Quit,
}

fn parse(line: &str) -> Option<Command> {
    let mut words = line.split_whitespace();
    let command = words.next()?;
    let argument = words.next();

    let command = match (command, argument) {
        ("play", Some(id)) => Command::Play(id.to_string()),
        ("add", Some(id)) => Command::Add(id.to_string()),
        ("next", None) => Command::Next,
        ("prev", None) => Command::Prev,
        ("toggle", None) => Command::Toggle,
        ("seek", Some(percent)) => Command::Seek(percent.trim_end_matches('%').parse().ok()?),
        ("context", Some(context)) => Command::Context(context.parse().ok()?),
        ("queue", None) => Command::Queue,
        ("status", None) => Command::Status,
        ("crates", None) => Command::Crates,
        ("quit" | "exit", None) => Command::Quit,
        _ => return None,
    };

    match words.next() {
        Some(_) => None,
        None => Some(command),
    }
}

fn format_time(duration: Duration) -> String {
    let seconds = duration.as_secs();
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

pub struct Console {
    transport: Transport,
    controls: Controls,
    progress: watch::Receiver<Progress>,
    client: Arc<Client>,
    database: Database,
}

impl Console {
    pub fn new(
        transport: Transport,
        controls: Controls,
        progress: watch::Receiver<Progress>,
        client: Arc<Client>,
        database: Database,
    ) -> Self {
        Self {
            transport,
            controls,
            progress,
            client,
            database,
        }
    }

    pub async fn run(self) {
        println!("{HELP}");
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(error) => {
                    warn!("unable to read input: {error}");
                    break;
                }
            };

            if line.trim().is_empty() {
                continue;
            }

            match parse(&line) {
                Some(Command::Quit) => break,
                Some(command) => self.execute(command).await,
                None => println!("{HELP}"),
            }
        }

        self.controls.quit();
    }

    async fn execute(&self, command: Command) {
        match command {
            Command::Play(id) => self.queue_track(&id, true).await,
            Command::Add(id) => self.queue_track(&id, false).await,
            Command::Next => {
                self.transport.next();
            }
            Command::Prev => {
                self.transport.prev();
            }
            Command::Toggle => self.transport.toggle(),
            Command::Seek(percent) => self.controls.seek_click(PERCENT_BAR, percent),
            Command::Context(context) => {
                if let Err(error) = self.database.set_context(&context.to_string()).await {
                    warn!("unable to remember context: {error}");
                }
                println!("Refilling from {context}");
                self.transport.set_context(context);
            }
            Command::Queue => self.print_queue(),
            Command::Status => self.print_status(),
            Command::Crates => match self.client.crates().await {
                Ok(crates) => {
                    for c in crates {
                        println!("{}  {}", c.id, c.name);
                    }
                }
                Err(error) => println!("{error}"),
            },
            Command::Quit => self.controls.quit(),
        }
    }

    async fn queue_track(&self, id: &str, replace: bool) {
        match self.client.track(id).await {
            Ok(item) => {
                println!("{} {}", if replace { "Playing" } else { "Queued" }, item.label());
                self.transport.play(item, replace);
            }
            Err(error) => println!("{error}"),
        }
    }

    fn print_queue(&self) {
        let tracklist = self.transport.tracklist();
        if tracklist.queue().is_empty() {
            println!("Queue is empty");
            return;
        }

        for (index, item) in tracklist.queue().iter().enumerate() {
            let marker = if index == tracklist.index() { ">" } else { " " };
            println!("{marker} {:>3}. {}", index + 1, item.label());
        }
    }

    fn print_status(&self) {
        let progress = self.progress.borrow().clone();
        let tracklist = self.transport.tracklist();
        let label = tracklist
            .current_item()
            .map(|item| item.label())
            .unwrap_or_else(|| "nothing".to_string());
        let duration = progress
            .duration
            .map(format_time)
            .unwrap_or_else(|| "--:--".to_string());

        println!(
            "{:?}: {label} [{} / {duration}]",
            progress.phase,
            format_time(progress.position)
        );
    }
}
