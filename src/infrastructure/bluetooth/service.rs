//! Beacon Service Module
//!
//! Runs the controller on a single task. Operator commands and scheduler
//! ticks are handled one at a time, so a tick can never overlap a start or
//! a stop.

use crate::domain::models::{BeaconState, BeaconStatus};
use crate::infrastructure::bluetooth::controller::BeaconController;
use crate::infrastructure::bluetooth::transport::BeaconTransport;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ServiceError {
    #[error("beacon service has shut down")]
    Closed,
}

#[derive(Debug)]
pub enum BeaconCommand {
    Start {
        fuzz: bool,
        done: Option<oneshot::Sender<BeaconState>>,
    },
    Stop {
        done: Option<oneshot::Sender<BeaconState>>,
    },
    Shutdown {
        done: Option<oneshot::Sender<BeaconState>>,
    },
    Status {
        done: oneshot::Sender<BeaconStatus>,
    },
}

/// Cloneable handle for sending commands to a running service
#[derive(Clone)]
pub struct BeaconHandle {
    command_sender: mpsc::UnboundedSender<BeaconCommand>,
}

impl BeaconHandle {
    /// Start a session; resolves with the state once the attempt finished
    pub async fn start(&self, fuzz: bool) -> Result<BeaconState, ServiceError> {
        self.request(|done| BeaconCommand::Start { fuzz, done }).await
    }

    /// Resolves once the radio is off and no further tick will run
    pub async fn stop(&self) -> Result<BeaconState, ServiceError> {
        self.request(|done| BeaconCommand::Stop { done }).await
    }

    pub async fn shutdown(&self) -> Result<BeaconState, ServiceError> {
        self.request(|done| BeaconCommand::Shutdown { done }).await
    }

    pub async fn status(&self) -> Result<BeaconStatus, ServiceError> {
        let (tx, rx) = oneshot::channel();
        self.command_sender
            .send(BeaconCommand::Status { done: tx })
            .map_err(|_| ServiceError::Closed)?;
        rx.await.map_err(|_| ServiceError::Closed)
    }

    async fn request(
        &self,
        command: impl FnOnce(Option<oneshot::Sender<BeaconState>>) -> BeaconCommand,
    ) -> Result<BeaconState, ServiceError> {
        let (tx, rx) = oneshot::channel();
        self.command_sender
            .send(command(Some(tx)))
            .map_err(|_| ServiceError::Closed)?;
        rx.await.map_err(|_| ServiceError::Closed)
    }
}

pub struct BeaconService;

impl BeaconService {
    /// Spawn the controller loop on the current runtime
    pub fn spawn<T>(controller: BeaconController<T>) -> (BeaconHandle, JoinHandle<()>)
    where
        T: BeaconTransport + Send + 'static,
    {
        let (command_sender, command_receiver) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(controller, command_receiver));
        (BeaconHandle { command_sender }, task)
    }
}

async fn run<T: BeaconTransport>(
    mut controller: BeaconController<T>,
    mut commands: mpsc::UnboundedReceiver<BeaconCommand>,
) {
    let mut ticker = interval(controller.tick_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(
        "Beacon service running, tick every {:?}",
        controller.tick_interval()
    );

    loop {
        tokio::select! {
            command = commands.recv() => {
                let Some(command) = command else {
                    debug!("All handles dropped");
                    controller.shutdown();
                    break;
                };

                match command {
                    BeaconCommand::Start { fuzz, done } => {
                        controller.start(fuzz).await;
                        // First tick lands a full period after the start pulse
                        ticker.reset();
                        reply(done, controller.state());
                    }
                    BeaconCommand::Stop { done } => {
                        controller.stop();
                        reply(done, controller.state());
                    }
                    BeaconCommand::Shutdown { done } => {
                        controller.shutdown();
                        reply(done, controller.state());
                        break;
                    }
                    BeaconCommand::Status { done } => {
                        let _ = done.send(controller.snapshot());
                    }
                }
            }
            _ = ticker.tick(), if controller.state().is_active() => {
                controller.tick().await;
            }
        }
    }

    info!("Beacon service stopped");
}

fn reply(done: Option<oneshot::Sender<BeaconState>>, state: BeaconState) {
    if let Some(done) = done {
        let _ = done.send(state);
    }
}
