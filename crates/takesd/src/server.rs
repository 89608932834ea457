//! Unix socket server for the takes daemon.
//!
//! Line-oriented protocol: each request line is `<user-id> <command...>`
//! and each response is a single line. The `recent` command answers with
//! a JSON array; everything else answers with prose suitable for relaying
//! straight back to the user.
//!
//! The server holds no take state. Every request becomes a registry
//! command, so all guards live in one place.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Connection errors are logged and the connection dropped; the accept
//!   loop keeps running

use std::path::{Path, PathBuf};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use takes_core::{compact_duration, pretty_duration, TakeId, TakeView, UserId};

use std::sync::Arc;

use crate::command::{UserCommand, USAGE};
use crate::names::NameDirectory;
use crate::registry::{ReviewDecision, TakesError, TakesHandle};

/// Default socket path
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/takesd.sock";

/// Default listing size for `recent`.
const DEFAULT_RECENT_LIMIT: usize = 10;

/// Unix socket server for the takes daemon.
pub struct DaemonServer {
    socket_path: PathBuf,
    takes: TakesHandle,
    names: Arc<NameDirectory>,
    cancel_token: CancellationToken,
}

impl DaemonServer {
    pub fn new(
        socket_path: impl Into<PathBuf>,
        takes: TakesHandle,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            socket_path: socket_path.into(),
            takes,
            names: Arc::new(NameDirectory::identity()),
            cancel_token,
        }
    }

    /// Creates a server with the default socket path.
    pub fn with_default_path(takes: TakesHandle, cancel_token: CancellationToken) -> Self {
        Self::new(DEFAULT_SOCKET_PATH, takes, cancel_token)
    }

    /// Replaces the display-name directory (identity by default).
    pub fn with_names(mut self, names: NameDirectory) -> Self {
        self.names = Arc::new(names);
        self
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Runs the server.
    ///
    /// Listens for connections until the cancellation token is triggered.
    /// This method does not return until shutdown.
    pub async fn run(&self) -> Result<(), ServerError> {
        // Remove existing socket file if present
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path).map_err(|e| ServerError::SocketSetup {
                path: self.socket_path.clone(),
                error: e.to_string(),
            })?;
        }

        if let Some(parent) = self.socket_path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| ServerError::SocketSetup {
                    path: self.socket_path.clone(),
                    error: e.to_string(),
                })?;
            }
        }

        let listener =
            UnixListener::bind(&self.socket_path).map_err(|e| ServerError::SocketSetup {
                path: self.socket_path.clone(),
                error: e.to_string(),
            })?;

        info!(socket = %self.socket_path.display(), "Daemon server listening");

        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    info!("Server shutdown requested");
                    break;
                }

                result = listener.accept() => {
                    match result {
                        Ok((stream, _addr)) => {
                            let takes = self.takes.clone();
                            let names = Arc::clone(&self.names);
                            tokio::spawn(async move {
                                if let Err(e) = handle_connection(stream, takes, names).await {
                                    debug!(error = %e, "Connection ended with error");
                                }
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                        }
                    }
                }
            }
        }

        self.cleanup();
        Ok(())
    }

    fn cleanup(&self) {
        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(
                    socket = %self.socket_path.display(),
                    error = %e,
                    "Failed to remove socket file"
                );
            }
        }
        info!("Server cleanup complete");
    }
}

/// Serves one connection: one request line per response line until EOF.
async fn handle_connection(
    stream: UnixStream,
    takes: TakesHandle,
    names: Arc<NameDirectory>,
) -> std::io::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        let response = dispatch_line(&line, &takes, &names).await;
        writer.write_all(response.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }
    Ok(())
}

/// Parses one request line and routes it to the registry.
async fn dispatch_line(line: &str, takes: &TakesHandle, names: &NameDirectory) -> String {
    let trimmed = line.trim();
    let Some((user, rest)) = split_user(trimmed) else {
        return format!("error: expected '<user-id> <command>'; {USAGE}");
    };
    let user_id = UserId::new(user);

    match UserCommand::parse(rest) {
        UserCommand::Start {
            target,
            description,
        } => match takes.start(user_id, target, description).await {
            Ok(view) => format!(
                "started take {} ({})",
                view.id_short,
                view.description.as_deref().unwrap_or("no description")
            ),
            Err(e) => format!("error: {e}"),
        },
        UserCommand::Pause => match takes.pause(user_id).await {
            Ok(view) => format!("paused take {} at {}", view.id_short, view.elapsed_display),
            Err(e) => format!("error: {e}"),
        },
        UserCommand::Resume => match takes.resume(user_id).await {
            Ok(view) => format!("resumed take {} at {}", view.id_short, view.elapsed_display),
            Err(e) => format!("error: {e}"),
        },
        UserCommand::Stop { notes } => match takes.stop(user_id, notes).await {
            Ok(view) => format!(
                "stopped take {} at {}; please upload your video",
                view.id_short, view.elapsed_display
            ),
            Err(e) => format!("error: {e}"),
        },
        UserCommand::Status => match takes.status(user_id).await {
            Some(view) => format!(
                "take {} is {} with {} elapsed",
                view.id_short, view.status_label, view.elapsed_display
            ),
            None => "no take in progress".to_string(),
        },
        UserCommand::History => {
            let name = names.display_name(&user_id).await;
            let history = takes.history(user_id).await;
            if history.takes.is_empty() {
                return format!("{name} has no completed takes yet");
            }
            let items: Vec<String> = history
                .takes
                .iter()
                .map(|t| format!("{} {} {}", t.id_short, t.status_label, t.elapsed_display))
                .collect();
            format!(
                "{name} has {} approved; recent: {}",
                pretty_duration(chrono::Duration::seconds(history.total_secs)),
                items.join(", ")
            )
        }
        UserCommand::Uploaded { take_id } => {
            handle_uploaded(takes, user_id, TakeId::new(take_id)).await
        }
        UserCommand::Approve {
            take_id,
            multiplier,
        } => match takes
            .review(TakeId::new(take_id), ReviewDecision::Approve, multiplier)
            .await
        {
            Ok(view) => format!(
                "approved take {} at {}x ({})",
                view.id_short, view.multiplier, view.elapsed_display
            ),
            Err(e) => format!("error: {e}"),
        },
        UserCommand::Reject { take_id } => match takes
            .review(TakeId::new(take_id), ReviewDecision::Reject, 0.0)
            .await
        {
            Ok(view) => format!("rejected take {}", view.id_short),
            Err(e) => format!("error: {e}"),
        },
        UserCommand::Recent { limit } => {
            let views = takes.recent(limit.unwrap_or(DEFAULT_RECENT_LIMIT)).await;
            render_recent(&views)
        }
        UserCommand::Help => USAGE.to_string(),
    }
}

/// Runs the upload flow: take the lease, flip the take, release the lease.
///
/// The release is unconditional. `MarkUploaded` releases the take owner's
/// lease on success, but the issuer here is not necessarily the owner, and
/// the issuer's lease must never outlive the request.
async fn handle_uploaded(takes: &TakesHandle, user_id: UserId, take_id: TakeId) -> String {
    if let Err(e) = takes.begin_upload(user_id.clone()).await {
        return format!("error: {e}");
    }
    let result = takes.mark_uploaded(take_id).await;
    let _ = takes.end_upload(user_id).await;
    match result {
        Ok(view) => format!(
            "take {} uploaded ({} recorded), waiting for review",
            view.id_short,
            compact_duration(chrono::Duration::seconds(view.elapsed_secs))
        ),
        Err(e) => format!("error: {e}"),
    }
}

fn render_recent(views: &[TakeView]) -> String {
    match serde_json::to_string(views) {
        Ok(json) => json,
        Err(e) => {
            error!(error = %e, "Failed to serialize recent takes");
            "error: failed to serialize listing".to_string()
        }
    }
}

fn split_user(line: &str) -> Option<(&str, &str)> {
    let mut parts = line.splitn(2, char::is_whitespace);
    let user = parts.next().filter(|u| !u.is_empty())?;
    Some((user, parts.next().unwrap_or("")))
}

/// Errors that can occur in server operations.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to setup socket at {path}: {error}")]
    SocketSetup { path: PathBuf, error: String },

    #[error("Registry unavailable: {0}")]
    Registry(#[from] TakesError),
}
