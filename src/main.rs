//! chat-realtime terminal client.
//!
//! Connects to the chat backend, prints every event and sends each stdin
//! line. Lines starting with `/` are commands:
//!
//! - `/cmd <text>`: send a backend command
//! - `/status <task-id>`: request task status
//! - `/cancel <task-id>`: cancel a task
//! - `/quit`: disconnect and exit

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

use chat_realtime::config::ClientConfig;
use chat_realtime::{DispatchEvent, EventKind, RealtimeConnection, TaskProgress};

/// One line of user input.
#[derive(Debug, PartialEq, Eq)]
enum Input<'a> {
    Empty,
    Text(&'a str),
    Command(&'a str),
    Status(&'a str),
    Cancel(&'a str),
    Quit,
    Unknown(&'a str),
}

impl<'a> Input<'a> {
    fn parse(line: &'a str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Self::Empty;
        }
        let Some(rest) = line.strip_prefix('/') else {
            return Self::Text(line);
        };
        let (name, arg) = rest.split_once(' ').unwrap_or((rest, ""));
        let arg = arg.trim();
        match (name, arg.is_empty()) {
            ("quit", _) => Self::Quit,
            ("cmd", false) => Self::Command(arg),
            ("status", false) => Self::Status(arg),
            ("cancel", false) => Self::Cancel(arg),
            _ => Self::Unknown(line),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so they do not interleave with the transcript.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = ClientConfig::from_env().context("loading configuration")?;
    let conn = RealtimeConnection::from_config(&config);
    tracing::info!(url = conn.url(), "starting chat client");

    let mut events = conn.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => print_event(&event),
                Err(RecvError::Lagged(n)) => {
                    tracing::warn!(lagged = n, "transcript lagged behind event bus");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    // A failed first attempt is already reported as events and retried.
    if let Err(err) = conn.connect().await {
        tracing::error!(error = %err, "initial connection failed");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("reading stdin")? {
        match Input::parse(&line) {
            Input::Empty => {}
            Input::Text(text) => {
                conn.send_text_message(text);
            }
            Input::Command(command) => {
                conn.send_command(command);
            }
            Input::Status(task_id) => {
                conn.request_task_status(task_id);
            }
            Input::Cancel(task_id) => {
                conn.cancel_task(task_id);
            }
            Input::Quit => break,
            Input::Unknown(line) => eprintln!("unknown command: {line}"),
        }
    }

    conn.disconnect();
    printer.abort();
    tracing::info!(status = %conn.status(), "chat client stopped");
    Ok(())
}

fn print_event(event: &DispatchEvent) {
    match event.kind {
        EventKind::Connected => println!("* connected"),
        EventKind::Disconnected => {
            let data = event.data.as_ref();
            let code = data.and_then(|d| d.get("code")).and_then(|c| c.as_u64());
            let reason = data
                .and_then(|d| d.get("reason"))
                .and_then(|r| r.as_str())
                .unwrap_or_default();
            match code {
                Some(code) if !reason.is_empty() => println!("* disconnected ({code}: {reason})"),
                Some(code) => println!("* disconnected ({code})"),
                None => println!("* disconnected"),
            }
        }
        EventKind::Error => println!("! {}", event.text().unwrap_or("error")),
        EventKind::TaskUpdate => match TaskProgress::from_event(event) {
            Some(task) => println!("# task {} {} {}%", task.task_id, task.status, task.progress),
            None => println!("# {}", event.text().unwrap_or_default()),
        },
        EventKind::System => println!("* {}", event.text().unwrap_or_default()),
        EventKind::Message => {
            if let Some(message) = &event.message {
                println!("{}: {}", message.role, message.content);
            }
        }
    }
}
