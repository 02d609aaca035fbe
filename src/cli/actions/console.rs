//! Console transport: hosts the gate over stdin/stdout.
//!
//! Each input line is one chat event. `@name` selects the sender, `#room`
//! marks a group message and a leading `!` makes it a command:
//!
//! ```text
//! @root !otp-add-command deploy
//! @alice !deploy prod
//! @alice 123456
//! ```

use crate::{
    cli::telemetry,
    gate::{
        backlog::Invocation,
        identity::{DirectUser, MessageKind, RoomOccupant, Sender},
        provisioning::QrMode,
        storage::JsonFileStore,
        totp::TotpConfig,
        CommandExecutor, Dispatcher, GateConfig, GateState, Identity, Notifier,
    },
};
use anyhow::{anyhow, Context, Result};
use chrono::TimeDelta;
use std::sync::Arc;
use tokio::{
    io::{self, AsyncBufReadExt, BufReader},
    task::JoinSet,
};
use tracing::{debug, info};

#[derive(Debug)]
pub struct Args {
    pub state_file: String,
    pub issuer: String,
    pub otp_ttl_seconds: i64,
    pub max_failures: u32,
    pub backlog_max: usize,
    pub backlog_ttl_seconds: i64,
    pub admins: Vec<String>,
    pub identity: String,
    pub qr_mode: QrMode,
}

impl Args {
    fn gate_config(&self) -> Result<GateConfig> {
        let seconds = |value: i64| {
            TimeDelta::try_seconds(value).ok_or_else(|| anyhow!("TTL out of range: {value}"))
        };

        Ok(GateConfig {
            totp: TotpConfig::new(self.issuer.as_str()),
            otp_ttl: seconds(self.otp_ttl_seconds)?,
            max_failures: self.max_failures,
            backlog_max: self.backlog_max,
            backlog_ttl: seconds(self.backlog_ttl_seconds)?,
            qr_mode: self.qr_mode,
        })
    }
}

/// Prints every notification on stdout.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdoutNotifier;

impl Notifier for StdoutNotifier {
    fn send(&self, target: &str, text: &str) {
        println!("[to {target}] {text}");
    }
}

/// Built-in commands available on the console.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleExecutor;

impl CommandExecutor for ConsoleExecutor {
    fn execute(&self, invocation: &Invocation) -> Result<String> {
        match invocation.command.as_str() {
            "echo" => Ok(invocation.args.clone()),
            "whoami" => Ok(invocation.identity.to_string()),
            other => Ok(format!("Command \"{other}\" not found.")),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Input {
    Command { command: String, args: String },
    Message(String),
}

struct Event {
    sender: Box<dyn Sender>,
    kind: MessageKind,
    input: Input,
}

/// Split `head rest` on the first whitespace.
fn split_word(text: &str) -> (&str, &str) {
    text.split_once(char::is_whitespace)
        .map_or((text, ""), |(head, rest)| (head, rest.trim_start()))
}

fn parse_line(line: &str, default_identity: &str) -> Option<Event> {
    let mut rest = line.trim();
    let mut person = default_identity;
    let mut room = None;

    if let Some(stripped) = rest.strip_prefix('@') {
        (person, rest) = split_word(stripped);
    }
    if let Some(stripped) = rest.strip_prefix('#') {
        let (name, tail) = split_word(stripped);
        room = Some(name);
        rest = tail;
    }
    if rest.is_empty() || person.is_empty() {
        return None;
    }

    let input = match rest.strip_prefix('!') {
        Some(command_line) => {
            let (command, args) = split_word(command_line);
            Input::Command {
                command: command.to_string(),
                args: args.to_string(),
            }
        }
        None => Input::Message(rest.to_string()),
    };

    let (sender, kind): (Box<dyn Sender>, MessageKind) = match room {
        Some(room) => (
            Box::new(RoomOccupant {
                room: format!("#{room}"),
                nick: person.to_string(),
                person: person.to_string(),
            }),
            MessageKind::Group,
        ),
        None => (
            Box::new(DirectUser {
                person: person.to_string(),
            }),
            MessageKind::Direct,
        ),
    };

    Some(Event {
        sender,
        kind,
        input,
    })
}

async fn handle(dispatcher: &Dispatcher<ConsoleExecutor, StdoutNotifier>, event: Event) {
    let outcome = match &event.input {
        Input::Command { command, args } => {
            dispatcher
                .on_command(event.sender.as_ref(), command, args)
                .await
        }
        Input::Message(body) => {
            dispatcher
                .on_message(event.sender.as_ref(), event.kind, body)
                .await
        }
    };
    debug!(?outcome, "event handled");
}

/// Run the console transport until stdin closes or Ctrl-C.
///
/// # Errors
/// Returns an error if the state file cannot be loaded or stdin fails.
pub async fn execute(args: Args) -> Result<()> {
    let store = Arc::new(JsonFileStore::new(&args.state_file));
    let state = Arc::new(
        GateState::open(args.gate_config()?, store)
            .with_context(|| format!("Failed to load state file: {}", args.state_file))?,
    );

    let admins = args.admins.iter().map(|admin| Identity::from(admin.as_str()));
    let dispatcher = Arc::new(Dispatcher::new(
        state,
        admins,
        ConsoleExecutor,
        StdoutNotifier,
    ));

    info!(state_file = %args.state_file, identity = %args.identity, "console ready");

    let mut lines = BufReader::new(io::stdin()).lines();
    let mut tasks = JoinSet::new();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    break;
                };
                if let Some(event) = parse_line(&line, &args.identity) {
                    let dispatcher = dispatcher.clone();
                    tasks.spawn(async move { handle(&dispatcher, event).await });
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, shutting down");
                break;
            }
        }
    }

    while tasks.join_next().await.is_some() {}
    telemetry::shutdown_tracer();

    Ok(())
}
