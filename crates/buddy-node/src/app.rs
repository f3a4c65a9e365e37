//! Node wiring: the local buddy, simulated buddies and the console.
//!
//! Every buddy joins the same in-process hub. Simulated buddies answer
//! invitations on their own; the local buddy is driven from stdin.

use crate::config::{Config, PeerConfig};
use crate::metrics;
use crate::session::LocalSessionService;
use anyhow::Result;
use buddy_core::{view, BuddyList, PresenceEvent, PresenceHandle, SessionService};
use buddy_protocol::Status;
use buddy_transport::{LocalHub, Transport};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

/// A console command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Roster,
    Select(String),
    Decline(String),
    Status(Status),
    Leave,
    Help,
    Quit,
}

const HELP: &str = "commands: roster | select <name> | decline <name> | status online|busy | leave | quit";

impl std::str::FromStr for ConsoleCommand {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut parts = line.split_whitespace();
        let command = parts.next().unwrap_or_default();
        let argument = parts.collect::<Vec<_>>().join(" ");

        let require = |what: &str| {
            if argument.is_empty() {
                Err(format!("{command} needs a {what}"))
            } else {
                Ok(argument.clone())
            }
        };

        match command {
            "roster" | "ls" => Ok(ConsoleCommand::Roster),
            "select" | "s" => require("buddy").map(ConsoleCommand::Select),
            "decline" | "d" => require("buddy").map(ConsoleCommand::Decline),
            "status" => require("status")?
                .parse()
                .map(ConsoleCommand::Status)
                .map_err(str::to_string),
            "leave" => Ok(ConsoleCommand::Leave),
            "help" | "?" => Ok(ConsoleCommand::Help),
            "quit" | "exit" | "q" => Ok(ConsoleCommand::Quit),
            other => Err(format!("unknown command: {other}")),
        }
    }
}

/// Find a buddy by identifier or, case-insensitively, by name.
#[must_use]
pub fn resolve(roster: &BuddyList, needle: &str) -> Option<String> {
    roster
        .get(needle)
        .or_else(|| {
            roster
                .users()
                .iter()
                .find(|u| u.name.eq_ignore_ascii_case(needle))
        })
        .map(|u| u.identifier.clone())
}

/// Render the roster as console lines.
#[must_use]
pub fn render(roster: &BuddyList) -> Vec<String> {
    let mut lines = Vec::new();
    for section in view::sections(roster) {
        lines.push(format!("== {}", section.title));
        for row in &section.rows {
            match row.detail() {
                Some(detail) => lines.push(format!("  {} ({})", row.label(), detail)),
                None => lines.push(format!("  {}", row.label())),
            }
        }
    }
    lines
}

/// Run the node until the console quits.
///
/// # Errors
///
/// Returns an error if a buddy fails to start.
pub async fn run(config: Config) -> Result<()> {
    let hub = LocalHub::new();
    let transport: Arc<dyn Transport> = Arc::new(hub.clone());
    let service: Arc<dyn SessionService> = Arc::new(LocalSessionService::new(
        &config.session.api_key,
        &config.session.session_id,
    ));

    let (stop_tx, stop_rx) = watch::channel(false);
    let mut simulated = Vec::with_capacity(config.peers.len());
    for peer in &config.peers {
        let handle = buddy_core::start(
            config.presence_config_for(&peer.name),
            Arc::clone(&transport),
            Arc::clone(&service),
        )
        .await?;
        simulated.push(tokio::spawn(simulate(peer.clone(), handle, stop_rx.clone())));
    }

    let me = buddy_core::start(config.presence_config(), transport, service).await?;
    info!(
        connection = %me.local_id(),
        buddies = config.peers.len(),
        "Node ready; type `help` for commands"
    );

    console(&me).await;

    let _ = stop_tx.send(true);
    for task in simulated {
        if let Err(e) = task.await {
            warn!(error = %e, "Simulated buddy task failed");
        }
    }
    me.shutdown().await?;
    debug!(sessions = hub.session_count(), "Hub drained");

    Ok(())
}

/// Drive a simulated buddy until `stop` flips.
async fn simulate(peer: PeerConfig, handle: PresenceHandle, mut stop: watch::Receiver<bool>) {
    let mut events = handle.subscribe();
    if peer.status != Status::Online {
        let _ = handle.set_status(peer.status);
    }

    loop {
        tokio::select! {
            _ = stop.changed() => break,
            event = events.recv() => match event {
                Ok(PresenceEvent::InvitationReceived { peer: from }) if peer.auto_accept => {
                    debug!(buddy = %peer.name, from = %from, "Auto-accepting invitation");
                    let _ = handle.select(from);
                }
                Ok(PresenceEvent::SessionReady { peer: with, .. }) => {
                    info!(buddy = %peer.name, with = %with, "Simulated buddy joined chat");
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    if let Err(e) = handle.shutdown().await {
        warn!(buddy = %peer.name, error = %e, "Failed to stop simulated buddy");
    }
}

async fn console(me: &PresenceHandle) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut events = me.subscribe();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        warn!(error = %e, "Failed to read console input");
                        break;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                match line.parse::<ConsoleCommand>() {
                    Ok(ConsoleCommand::Quit) => break,
                    Ok(command) => {
                        if let Err(e) = execute(me, command).await {
                            println!("error: {e}");
                            break;
                        }
                    }
                    Err(e) => println!("{e}"),
                }
            }

            event = events.recv() => match event {
                Ok(event) => {
                    metrics::record_event(&event);
                    announce(me, &event).await;
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "Console fell behind presence events");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
}

async fn execute(me: &PresenceHandle, command: ConsoleCommand) -> Result<()> {
    match command {
        ConsoleCommand::Roster => {
            let roster = me.roster().await?;
            for line in render(&roster) {
                println!("{line}");
            }
        }
        ConsoleCommand::Select(needle) => match resolve(&me.roster().await?, &needle) {
            Some(id) => me.select(id)?,
            None => println!("no buddy named {needle}"),
        },
        ConsoleCommand::Decline(needle) => match resolve(&me.roster().await?, &needle) {
            Some(id) => me.decline(id)?,
            None => println!("no buddy named {needle}"),
        },
        ConsoleCommand::Status(status) => me.set_status(status)?,
        ConsoleCommand::Leave => me.leave_session()?,
        ConsoleCommand::Help => println!("{HELP}"),
        ConsoleCommand::Quit => {}
    }
    Ok(())
}

async fn announce(me: &PresenceHandle, event: &PresenceEvent) {
    match event {
        PresenceEvent::RosterChanged => {
            if let Ok(roster) = me.roster().await {
                metrics::set_roster(roster.len(), roster.invitations().len());
            }
        }
        PresenceEvent::InvitationReceived { peer } => {
            let name = me
                .roster()
                .await
                .ok()
                .and_then(|r| r.get(peer).map(|u| u.name.clone()))
                .unwrap_or_else(|| peer.clone());
            println!("invitation from {name}: `select {name}` to join, `decline {name}` to refuse");
        }
        PresenceEvent::SessionReady { peer, role, grant } => {
            println!(
                "chat with {peer} ready ({role:?}): session {} token {}",
                grant.session.session_id, grant.token
            );
        }
        PresenceEvent::Alert { message } => println!("error: {message}"),
        PresenceEvent::ProtocolViolation { peer } => {
            println!("error: {peer} accepted an invitation that was never sent");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!("ls".parse(), Ok(ConsoleCommand::Roster));
        assert_eq!(
            "select Alice Smith".parse(),
            Ok(ConsoleCommand::Select("Alice Smith".into()))
        );
        assert_eq!("status busy".parse(), Ok(ConsoleCommand::Status(Status::Busy)));
        assert_eq!("q".parse(), Ok(ConsoleCommand::Quit));

        assert!("select".parse::<ConsoleCommand>().is_err());
        assert!("status away".parse::<ConsoleCommand>().is_err());
        assert!("dance".parse::<ConsoleCommand>().is_err());
    }

    #[test]
    fn test_resolve_by_id_or_name() {
        let mut roster = BuddyList::new();
        roster.connect("conn_1", "Alice");
        roster.connect("conn_2", "Bob");

        assert_eq!(resolve(&roster, "conn_2"), Some("conn_2".into()));
        assert_eq!(resolve(&roster, "alice"), Some("conn_1".into()));
        assert_eq!(resolve(&roster, "Carol"), None);
    }

    #[test]
    fn test_render() {
        let mut roster = BuddyList::new();
        roster.connect("conn_1", "Alice");
        roster.update_status("conn_1", Status::Busy);

        assert_eq!(render(&roster), ["== Buddies", "  Alice (Busy)"]);
    }
}
