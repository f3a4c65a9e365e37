//! Serialized presence runtime.
//!
//! One task owns the [`PresenceController`]. User commands, channel events
//! and session service completions all funnel into that task, so roster
//! mutations never interleave.

use crate::controller::{PresenceConfig, PresenceController, PresenceError, Selection};
use crate::event::PresenceEvent;
use crate::roster::BuddyList;
use crate::service::{ChatGrant, ServiceError, SessionService};
use buddy_protocol::{ConnectionData, ProtocolError, SessionInfo, Status};
use buddy_transport::{Connection, ConnectionId, Transport};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

enum Command {
    Select(String),
    Decline(String),
    SetStatus(Status),
    LeaveSession,
    Roster(oneshot::Sender<BuddyList>),
    Shutdown,
}

enum Completion {
    Requested {
        identifier: String,
        result: Result<ChatGrant, ServiceError>,
    },
    Joined {
        identifier: String,
        result: Result<ChatGrant, ServiceError>,
    },
}

/// Handle to a running presence runtime.
pub struct PresenceHandle {
    local_id: ConnectionId,
    session: SessionInfo,
    commands: mpsc::UnboundedSender<Command>,
    events: broadcast::Sender<PresenceEvent>,
    task: JoinHandle<()>,
}

/// Register with the session service, join the presence channel and start
/// the runtime task.
///
/// # Errors
///
/// Returns an error if registration or joining the channel fails.
pub async fn start(
    config: PresenceConfig,
    transport: Arc<dyn Transport>,
    service: Arc<dyn SessionService>,
) -> Result<PresenceHandle, PresenceError> {
    let session = service.register_session().await?;
    let token = service.register_device(&config.display_name).await?;
    let data = ConnectionData::new(config.display_name.clone())
        .to_json()
        .map_err(ProtocolError::from)?;

    let connection = transport.connect(&session, &token, data).await?;
    let local_id = connection.id().clone();

    info!(
        connection = %local_id,
        session = %session.session_id,
        transport = transport.name(),
        name = %config.display_name,
        "Presence started"
    );

    let (events, _) = broadcast::channel(config.event_capacity.max(1));
    let controller =
        PresenceController::new(local_id.clone(), connection.sink(), events.clone(), config);
    let (commands, rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(run(controller, connection, rx, service));

    Ok(PresenceHandle {
        local_id,
        session,
        commands,
        events,
        task,
    })
}

impl PresenceHandle {
    /// Get the local connection ID.
    #[must_use]
    pub fn local_id(&self) -> &ConnectionId {
        &self.local_id
    }

    /// Get the presence session this runtime joined.
    #[must_use]
    pub fn session(&self) -> &SessionInfo {
        &self.session
    }

    /// Subscribe to presence events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<PresenceEvent> {
        self.events.subscribe()
    }

    /// Check if the runtime task is still running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    fn send(&self, command: Command) -> Result<(), PresenceError> {
        self.commands.send(command).map_err(|_| PresenceError::Stopped)
    }

    /// Select a buddy: invite, accept or cancel depending on its state.
    ///
    /// # Errors
    ///
    /// Returns [`PresenceError::Stopped`] if the runtime is gone.
    pub fn select(&self, identifier: impl Into<String>) -> Result<(), PresenceError> {
        self.send(Command::Select(identifier.into()))
    }

    /// Decline a buddy's invitation.
    ///
    /// # Errors
    ///
    /// Returns [`PresenceError::Stopped`] if the runtime is gone.
    pub fn decline(&self, identifier: impl Into<String>) -> Result<(), PresenceError> {
        self.send(Command::Decline(identifier.into()))
    }

    /// Change and announce the local status.
    ///
    /// # Errors
    ///
    /// Returns [`PresenceError::Stopped`] if the runtime is gone.
    pub fn set_status(&self, status: Status) -> Result<(), PresenceError> {
        self.send(Command::SetStatus(status))
    }

    /// Leave the current chat and become available.
    ///
    /// # Errors
    ///
    /// Returns [`PresenceError::Stopped`] if the runtime is gone.
    pub fn leave_session(&self) -> Result<(), PresenceError> {
        self.send(Command::LeaveSession)
    }

    /// Get a snapshot of the roster.
    ///
    /// # Errors
    ///
    /// Returns [`PresenceError::Stopped`] if the runtime is gone.
    pub async fn roster(&self) -> Result<BuddyList, PresenceError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Roster(tx))?;
        rx.await.map_err(|_| PresenceError::Stopped)
    }

    /// Leave the channel and stop the runtime.
    ///
    /// # Errors
    ///
    /// Returns [`PresenceError::Stopped`] if the runtime task panicked.
    pub async fn shutdown(self) -> Result<(), PresenceError> {
        // The task may already have stopped on its own
        let _ = self.commands.send(Command::Shutdown);
        self.task.await.map_err(|_| PresenceError::Stopped)
    }
}

async fn run(
    mut controller: PresenceController,
    mut connection: Box<dyn Connection>,
    mut commands: mpsc::UnboundedReceiver<Command>,
    service: Arc<dyn SessionService>,
) {
    let (done_tx, mut done_rx) = mpsc::unbounded_channel();

    loop {
        tokio::select! {
            biased;

            Some(completion) = done_rx.recv() => match completion {
                Completion::Requested { identifier, result } => {
                    controller.chat_requested(&identifier, result);
                }
                Completion::Joined { identifier, result } => {
                    controller.chat_joined(&identifier, result);
                }
            },

            command = commands.recv() => match command {
                None | Some(Command::Shutdown) => break,
                Some(command) => handle_command(&mut controller, command, &service, &done_tx),
            },

            event = connection.recv() => match event {
                Some(event) => controller.handle_event(event),
                None => {
                    warn!(connection = %controller.local_id(), "Signaling connection closed");
                    break;
                }
            },
        }
    }

    if let Err(e) = connection.close().await {
        warn!(error = %e, "Failed to leave channel");
    }
    info!(connection = %controller.local_id(), "Presence stopped");
}

fn handle_command(
    controller: &mut PresenceController,
    command: Command,
    service: &Arc<dyn SessionService>,
    done: &mpsc::UnboundedSender<Completion>,
) {
    match command {
        Command::Select(identifier) => match controller.select(&identifier) {
            Selection::RequestChat(user) => {
                let service = Arc::clone(service);
                let done = done.clone();
                tokio::spawn(async move {
                    let result = service.request_chat(&user).await;
                    let _ = done.send(Completion::Requested {
                        identifier: user.identifier,
                        result,
                    });
                });
            }
            Selection::JoinChat(user) => {
                let service = Arc::clone(service);
                let done = done.clone();
                tokio::spawn(async move {
                    let result = service.join_chat(&user).await;
                    let _ = done.send(Completion::Joined {
                        identifier: user.identifier,
                        result,
                    });
                });
            }
            other => debug!(peer = %identifier, selection = ?other, "Selection handled"),
        },
        Command::Decline(identifier) => {
            controller.decline(&identifier);
        }
        Command::SetStatus(status) => {
            if let Err(e) = controller.set_status(status) {
                controller.report(e);
            }
        }
        Command::LeaveSession => {
            if let Err(e) = controller.leave_session() {
                controller.report(e);
            }
        }
        Command::Roster(reply) => {
            let _ = reply.send(controller.roster().clone());
        }
        Command::Shutdown => {}
    }
}
