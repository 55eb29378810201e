/*
[INPUT]:  Session terminations, reconnect policy, shutdown token
[OUTPUT]: A fresh session after each unexpected termination; the final termination
[POS]:    WebSocket layer - sole owner of session creation and teardown
[UPDATE]: When changing reconnection backoff or give-up semantics
*/

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::client::Shared;
use super::handler::ClientEvent;
use super::session::{self, Termination, TerminationCause};

/// Run sessions back to back until the caller disconnects, auto-reconnect
/// is off, or the reconnect policy gives up.
pub(crate) async fn supervise(
    shared: Arc<Shared>,
    events: mpsc::UnboundedSender<ClientEvent>,
    shutdown: CancellationToken,
) -> Termination {
    let policy = &shared.config.reconnect;
    let mut failures: u32 = 0;

    loop {
        let termination = session::run_session(&shared, &events, &shutdown).await;
        let _ = events.send(ClientEvent::Closed(termination.clone()));

        if shutdown.is_cancelled() || termination.cause.is_explicit() {
            return Termination {
                cause: TerminationCause::ExplicitClose,
                ..termination
            };
        }

        if !shared.config.auto_reconnect {
            info!(cause = %termination.cause, "auto-reconnect disabled; staying closed");
            return termination;
        }

        // Consecutive failures since the last session that reached `Open`.
        failures = if termination.was_open {
            1
        } else {
            failures.saturating_add(1)
        };

        if !policy.allows_attempt(failures) {
            warn!(
                attempt = failures,
                max_attempts = ?policy.max_attempts,
                cause = %termination.cause,
                "giving up reconnecting"
            );
            return termination;
        }

        let delay = policy.delay_for_attempt(failures);
        info!(
            attempt = failures,
            delay_ms = delay.as_millis() as u64,
            cause = %termination.cause,
            "reconnecting"
        );

        tokio::select! {
            _ = shutdown.cancelled() => {
                return Termination {
                    cause: TerminationCause::ExplicitClose,
                    ..termination
                };
            }
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
