use officer_sweep::{LinkService, MembershipDirectory, RoleChange};
use std::io::{self, BufRead};
use std::thread;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Reads lines on a dedicated OS thread and forwards them over a channel.
/// A blocked read never holds up runtime shutdown; the thread is left
/// behind and ends with the process.
pub fn spawn_line_reader<R>(reader: R) -> io::Result<mpsc::Receiver<String>>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = mpsc::channel(64);
    thread::Builder::new()
        .name("role-events".into())
        .spawn(move || {
            for line in reader.lines() {
                match line {
                    Ok(line) => {
                        if tx.blocking_send(line).is_err() {
                            return;
                        }
                    }
                    Err(err) => {
                        error!(error = %err, "failed reading role events");
                        return;
                    }
                }
            }
            info!("role event stream closed");
        })?;
    Ok(rx)
}

/// Applies one JSON-encoded [`RoleChange`] per line until the channel closes.
/// Returns how many links were removed.
pub async fn pump_role_events<D>(
    mut lines: mpsc::Receiver<String>,
    service: &LinkService<D>,
) -> u64
where
    D: MembershipDirectory + 'static,
{
    let mut removed = 0;
    while let Some(line) = lines.recv().await {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let change: RoleChange = match serde_json::from_str(line) {
            Ok(change) => change,
            Err(err) => {
                warn!(error = %err, "ignoring malformed role event");
                continue;
            }
        };
        match service.on_role_change(&change).await {
            Ok(true) => removed += 1,
            Ok(false) => {}
            Err(err) => {
                error!(principal = %change.principal_id, error = %err, "failed to apply role change");
            }
        }
    }
    removed
}
