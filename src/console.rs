//! Console front end: reads operator commands from stdin and prints
//! beacon feedback to stdout.

use crate::domain::models::{BeaconEvent, BeaconState, BeaconStatus};
use crate::infrastructure::bluetooth::protocol::hex_string;
use crate::infrastructure::bluetooth::BeaconHandle;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleCommand {
    Start { fuzz: bool },
    Stop,
    Status,
    Quit,
    Help,
}

impl ConsoleCommand {
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim().to_lowercase().as_str() {
            "start" | "s" => Some(Self::Start { fuzz: false }),
            "fuzz" | "f" => Some(Self::Start { fuzz: true }),
            "stop" | "x" => Some(Self::Stop),
            "status" | "st" => Some(Self::Status),
            "quit" | "exit" | "q" => Some(Self::Quit),
            "help" | "h" | "?" => Some(Self::Help),
            _ => None,
        }
    }
}

pub const HELP: &str = "Commands: start | fuzz | stop | status | quit";

/// One line of operator feedback per event
pub fn describe(event: &BeaconEvent) -> String {
    match event {
        BeaconEvent::TransmissionStarted { address, fuzz } => {
            let mode = if *fuzz { "fuzzing" } else { "broadcasting" };
            format!("Status: RUNNING ({} as {})", mode, address)
        }
        BeaconEvent::TransmissionFailed(reason) => format!("Transmission failed: {}", reason),
        BeaconEvent::TransmissionStopped => "Status: STOPPED".to_string(),
        BeaconEvent::FuzzTick {
            counter,
            mutated_bytes,
        } => format!(
            "Fuzz #{:<5} {} / {}",
            counter,
            hex_string(&mutated_bytes[..2]),
            hex_string(&mutated_bytes[2..])
        ),
        BeaconEvent::Pulse { fuzzed: true } => "pulse (fuzzed)".to_string(),
        BeaconEvent::Pulse { fuzzed: false } => "pulse".to_string(),
    }
}

pub fn describe_status(status: &BeaconStatus) -> String {
    let state = match status.state {
        BeaconState::Idle => "STOPPED",
        BeaconState::Transmitting => "RUNNING",
        BeaconState::TransmittingFuzzing => "RUNNING (fuzz)",
    };
    let mut line = format!("Status: {}", state);
    if let Some(address) = status.address {
        line.push_str(&format!(" as {}", address));
    }
    if let Some(bytes) = status.last_mutation {
        line.push_str(&format!(
            ", fuzz #{} {} / {}",
            status.counter,
            hex_string(&bytes[..2]),
            hex_string(&bytes[2..])
        ));
    }
    line
}

/// Run until the operator quits or stdin closes
pub async fn run(
    handle: BeaconHandle,
    mut events: mpsc::UnboundedReceiver<BeaconEvent>,
    verbose_pulses: bool,
) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("{}", HELP);

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    info!("stdin closed");
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }

                match ConsoleCommand::parse(&line) {
                    Some(ConsoleCommand::Start { fuzz }) => {
                        let state = handle.start(fuzz).await?;
                        if state == BeaconState::Idle {
                            error!("Start did not take effect");
                        }
                    }
                    Some(ConsoleCommand::Stop) => {
                        handle.stop().await?;
                    }
                    Some(ConsoleCommand::Status) => {
                        println!("{}", describe_status(&handle.status().await?));
                    }
                    Some(ConsoleCommand::Quit) => break,
                    Some(ConsoleCommand::Help) => println!("{}", HELP),
                    None => println!("Unknown command '{}'. {}", line.trim(), HELP),
                }
            }
            Some(event) = events.recv() => {
                if matches!(event, BeaconEvent::Pulse { .. }) && !verbose_pulses {
                    continue;
                }
                println!("{}", describe(&event));
            }
        }
    }

    handle.shutdown().await?;
    while let Ok(event) = events.try_recv() {
        if !matches!(event, BeaconEvent::Pulse { .. }) {
            println!("{}", describe(&event));
        }
    }
    Ok(())
}
