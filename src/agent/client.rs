//! Socket loop driving an [`AgentSession`].

use super::reconnect::{Decision, ReconnectController};
use super::session::{AgentSession, Effects, SessionState, SyncReport};
use super::{AgentConfig, Exit};
use crate::watcher::{FileChange, FileWatcher};
use crate::ws::protocol::Message;
use futures::{Sink, SinkExt, StreamExt};
use std::time::Duration;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};

enum Interrupt {
    Closed(Option<u16>),
    CtrlC,
}

/// Connect to the hub and keep the session alive until the hub shuts down,
/// the retry budget runs out or the user interrupts.
pub async fn run(config: AgentConfig) -> Exit {
    let AgentConfig {
        url,
        files,
        policy,
        stability,
    } = config;
    let mut session = AgentSession::new(files);
    let mut reconnect = ReconnectController::new(policy);

    loop {
        session.begin_connect();
        if reconnect.attempt() == 0 {
            tracing::info!("[agent] Connecting to {}...", url);
        } else {
            tracing::info!(
                "[agent] Reconnecting to {} (attempt {})...",
                url,
                reconnect.attempt() + 1
            );
        }

        let interrupt = tokio::select! {
            code = connect_and_sync(&url, &mut session, &mut reconnect, stability) => {
                Interrupt::Closed(code)
            }
            _ = tokio::signal::ctrl_c() => Interrupt::CtrlC,
        };
        let code = match interrupt {
            Interrupt::Closed(code) => code,
            Interrupt::CtrlC => {
                session.terminate();
                return Exit::Interrupted;
            }
        };

        session.on_disconnect();
        match reconnect.on_close(code) {
            Decision::Shutdown => {
                tracing::info!("[agent] Remote sandbox shut down. Exiting.");
                session.terminate();
                return Exit::HubShutdown;
            }
            Decision::GiveUp => {
                tracing::error!("[agent] Remote sandbox appears to be offline. Exiting.");
                session.terminate();
                return Exit::GaveUp;
            }
            Decision::Retry { attempt, delay } => {
                tracing::info!(
                    "[agent] Reconnecting in {:.1}s... (attempt {}/{})",
                    delay.as_secs_f64(),
                    attempt,
                    reconnect.policy().max_attempts
                );
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = tokio::signal::ctrl_c() => {
                        session.terminate();
                        return Exit::Interrupted;
                    }
                }
            }
        }
    }
}

/// One connection's lifetime. Returns the close code, or `None` when the
/// connection failed or dropped without a close frame.
async fn connect_and_sync(
    url: &str,
    session: &mut AgentSession,
    reconnect: &mut ReconnectController,
    stability: Duration,
) -> Option<u16> {
    let (ws, _) = match connect_async(url).await {
        Ok(conn) => conn,
        Err(e) => {
            tracing::warn!("[agent] Connection failed: {}", e);
            return None;
        }
    };
    reconnect.on_open();

    let (mut sink, mut stream) = ws.split();
    // Dropped on return, which tears the watch down while reconnecting
    let mut watcher: Option<FileWatcher> = None;

    let effects = session.on_open().await;
    if !apply(effects, &mut sink, &mut watcher, session, reconnect, stability).await {
        return None;
    }

    loop {
        tokio::select! {
            frame = stream.next() => {
                let effects = match frame {
                    Some(Ok(WsMessage::Text(text))) => match Message::decode(&text) {
                        Ok(msg) => session.on_message(msg).await,
                        Err(e) => {
                            tracing::debug!("[agent] Ignoring message: {}", e);
                            continue;
                        }
                    },
                    Some(Ok(WsMessage::Close(frame))) => {
                        return frame.map(|f| u16::from(f.code));
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        tracing::warn!("[agent] Connection error: {}", e);
                        return None;
                    }
                    None => return None,
                };
                if !apply(effects, &mut sink, &mut watcher, session, reconnect, stability).await {
                    return None;
                }
            }
            Some(change) = next_change(&mut watcher) => {
                let effects = session.on_local_change(&change.path).await;
                if !apply(effects, &mut sink, &mut watcher, session, reconnect, stability).await {
                    return None;
                }
            }
        }
    }
}

/// Carry out a transition's effects. Returns false if the socket is gone.
async fn apply<S>(
    effects: Effects,
    sink: &mut S,
    watcher: &mut Option<FileWatcher>,
    session: &AgentSession,
    reconnect: &mut ReconnectController,
    stability: Duration,
) -> bool
where
    S: Sink<WsMessage> + Unpin,
    S::Error: std::fmt::Display,
{
    for msg in effects.outbound {
        if let Err(e) = sink.send(WsMessage::Text(msg.encode())).await {
            tracing::warn!("[agent] Send failed: {}", e);
            return false;
        }
    }

    if effects.start_watcher {
        *watcher = None;
        match FileWatcher::new(&session.files().disk_paths(), stability) {
            Ok(w) => *watcher = Some(w),
            Err(e) => tracing::warn!("[agent] Watcher error: {}", e),
        }
    }

    if session.state() == SessionState::Synced && effects.start_watcher {
        reconnect.on_synced();
    }

    if let Some(report) = effects.report {
        print_banner(&report);
    }
    true
}

async fn next_change(watcher: &mut Option<FileWatcher>) -> Option<FileChange> {
    match watcher {
        Some(w) => w.recv().await,
        None => std::future::pending().await,
    }
}

fn print_banner(report: &SyncReport) {
    println!();
    println!("  ⚡ devsync");
    println!();
    if let Some(url) = &report.preview_url {
        println!("  ➜  Preview:   {}", url);
    }
    println!("  ➜  Editing:   {}", report.files.join(", "));
    println!("  ➜  Synced:    {}", report.direction_label());
    println!();
    println!("  Changes sync to the remote sandbox automatically.");
    println!("  Press Ctrl+C to stop.");
    println!();
}
