/**
 * xfpulse-watch
 *
 * Command-line client for the Postgres-backed realtime stack.
 *
 *   xfpulse-watch watch <kind>:<id>
 *   xfpulse-watch send <kind>:<id> <sender> <body...>
 *
 * `watch` opens a view of the conversation and prints every record as it
 * arrives, through whichever of the push and poll paths delivers it
 * first. `send` writes a record through the dual-dispatch writer.
 */

use std::collections::HashSet;

use uuid::Uuid;
use xfpulse::backend::realtime::{ChannelContext, ConsumerState, Dispatcher};
use xfpulse::backend::server::PgBackend;
use xfpulse::shared::{ChatRecord, ConversationIdentity, ConversationTimeline, RealtimeConfig};

const USAGE: &str = "usage:\n  xfpulse-watch watch <kind>:<id>\n  xfpulse-watch send <kind>:<id> <sender> <body...>";

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Watch {
        conversation: ConversationIdentity,
    },
    Send {
        conversation: ConversationIdentity,
        sender: String,
        body: String,
    },
}

impl Command {
    fn parse(args: &[String]) -> Result<Self, String> {
        let (name, rest) = args.split_first().ok_or("missing command")?;
        let conversation: ConversationIdentity = rest
            .first()
            .ok_or("missing conversation")?
            .parse()
            .map_err(|e| format!("{}", e))?;

        match name.as_str() {
            "watch" if rest.len() == 1 => Ok(Command::Watch { conversation }),
            "send" if rest.len() >= 3 => Ok(Command::Send {
                conversation,
                sender: rest[1].clone(),
                body: rest[2..].join(" "),
            }),
            "watch" | "send" => Err(format!("wrong number of arguments for '{}'", name)),
            other => Err(format!("unknown command '{}'", other)),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file if present
    dotenv::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&env_filter))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = match Command::parse(&args) {
        Ok(command) => command,
        Err(message) => {
            eprintln!("{}\n{}", message, USAGE);
            std::process::exit(2);
        }
    };

    let backend = PgBackend::connect(RealtimeConfig::load()?).await?;

    match command {
        Command::Send {
            conversation,
            sender,
            body,
        } => {
            let record = backend.writer.send(&conversation, &sender, &body).await?;
            println!("{} {}", record.id, record.created_at.to_rfc3339());
        }
        Command::Watch { conversation } => watch(&backend, conversation).await?,
    }
    Ok(())
}

async fn watch(
    backend: &PgBackend,
    conversation: ConversationIdentity,
) -> Result<(), Box<dyn std::error::Error>> {
    let (context, mut events) = ChannelContext::channel();
    let session = backend.start_session(Dispatcher::new(context)).await?;
    let (view, initial) = session.open_view(&conversation).await?;

    let mut printed = HashSet::new();
    for record in &initial {
        print_record(record, &mut printed);
    }
    let mut state = ConsumerState::new(backend.store.clone());
    state.insert_view(view, ConversationTimeline::with_records(conversation.clone(), initial));
    tracing::info!("Watching {} (Ctrl-C to stop)", conversation);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        let event = tokio::select! {
            _ = &mut shutdown => break,
            event = events.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        match state.apply(event).await {
            Ok(0) => {}
            Ok(_) => {
                for record in state.records(view) {
                    print_record(&record, &mut printed);
                }
            }
            Err(e) => tracing::warn!("Refresh failed, the poller will catch up: {}", e),
        }
    }

    session.shutdown().await;
    Ok(())
}

fn print_record(record: &ChatRecord, printed: &mut HashSet<Uuid>) {
    if printed.insert(record.id) {
        println!(
            "[{}] {}: {}",
            record.created_at.format("%H:%M:%S%.3f"),
            record.sender,
            record.body
        );
    }
}
