//! Terminal pool calculator.
//!
//! Play alone, host a table, or join one as a remote:
//!   cargo run -p poolcalc-broker
//!   cargo run -p poolcalc-cli            # then type `host`
//!   cargo run -p poolcalc-cli            # then `join`, `connect <code>`
//!
//! Type `help` for the command list.

mod config;
mod cues;
mod input;
mod transport;

use clap::Parser;
use cues::TerminalCues;
use input::Input;
use poolcalc_core::{Command, GameState, NameSlot, PeerId};
use poolcalc_session::{ConnectionStatus, CueSink, Role, Session, Transport};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;
use transport::WsTransport;

#[derive(Debug, Parser)]
#[command(name = "poolcalc", about = "Pool betting calculator with host/remote sync")]
struct Args {
    /// Broker WebSocket URL.
    #[arg(long, env = "POOLCALC_BROKER")]
    broker: Option<String>,

    /// TOML file with `broker`, `name1` and `name2`.
    #[arg(long, env = "POOLCALC_CONFIG")]
    config: Option<PathBuf>,

    /// Print cues without ringing the terminal bell.
    #[arg(long)]
    quiet: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("poolcalc=info".parse()?)
                .add_directive("poolcalc_session=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let file = match &args.config {
        Some(path) => config::load_file(path)?,
        None => config::FileConfig::default(),
    };
    let settings = config::Settings::resolve(args.broker, file, args.quiet);

    tracing::info!("Using broker {}", settings.broker);

    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let transport = WsTransport::new(settings.broker.clone(), events_tx);
    let mut session = Session::new(transport, TerminalCues::new(settings.bell));
    apply_names(&mut session, &settings);

    println!("{}", input::HELP);
    show(&session);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let Some(input) = input::parse(&line) else {
                    if !line.trim().is_empty() {
                        println!("? unknown command, try `help`");
                    }
                    continue;
                };
                if input == Input::Quit {
                    break;
                }
                handle_input(&mut session, &settings, input);
            }

            Some(event) = events_rx.recv() => {
                let before = snapshot(&session);
                session.handle_event(event);
                if snapshot(&session) != before {
                    show(&session);
                }
            }
        }
    }

    session.disconnect();
    Ok(())
}

fn handle_input<T: Transport, C: CueSink>(
    session: &mut Session<T, C>,
    settings: &config::Settings,
    input: Input,
) {
    match input {
        Input::Host => {
            session.start_host();
            apply_names(session, settings);
        }
        Input::Join => session.start_join(),
        Input::Connect(code) => {
            if let Err(e) = session.connect_to_host(&code) {
                println!("! {e}");
                return;
            }
        }
        Input::Disconnect => session.disconnect(),
        Input::Command(command) => session.dispatch(command),
        Input::Show => {}
        Input::Help => {
            println!("{}", input::HELP);
            return;
        }
        Input::Quit => return,
    }
    show(session);
}

/// Names from the config file apply wherever this instance owns the state.
fn apply_names<T: Transport, C: CueSink>(
    session: &mut Session<T, C>,
    settings: &config::Settings,
) {
    if session.role() == Role::Remote {
        return;
    }
    if let Some(name) = &settings.name1 {
        session.dispatch(Command::rename(NameSlot::First, name.clone()));
    }
    if let Some(name) = &settings.name2 {
        session.dispatch(Command::rename(NameSlot::Second, name.clone()));
    }
}

fn snapshot<T: Transport, C: CueSink>(
    session: &Session<T, C>,
) -> (GameState, Role, ConnectionStatus, Option<PeerId>) {
    (
        session.state().clone(),
        session.role(),
        session.status(),
        session.local_id().cloned(),
    )
}

fn show<T: Transport, C: CueSink>(session: &Session<T, C>) {
    let id = session.local_id().map(|id| id.as_str());
    println!(
        "[{}] {}",
        input::render_session(session.role(), session.status(), id),
        input::render(session.state())
    );
}
