//! Session runner: feeds a signal source through one controller until the
//! source runs dry, a threshold halts the session, or a stop is requested.

use tracing::{info, warn};

use crate::engine::session::SessionController;
use crate::engine::stop::StopListener;
use crate::signals::SignalSource;
use crate::types::{HaltReason, SessionTotals, TraderError};

pub async fn run_session(
    controller: &mut SessionController,
    source: &mut dyn SignalSource,
    stop: StopListener,
) -> SessionTotals {
    info!(session = %controller.name(), "Session runner started");

    loop {
        if stop.is_stopped() {
            controller.halt(HaltReason::Stopped);
            break;
        }
        if controller.status().is_halted() {
            break;
        }

        let Some(signal) = source.next_signal() else {
            controller.halt(HaltReason::SignalsExhausted);
            break;
        };

        match controller.submit_signal(signal).await {
            Ok(_) => {}
            Err(e @ (TraderError::AssetUnavailable(_) | TraderError::SignalExpired { .. })) => {
                warn!(session = %controller.name(), error = %e, "Signal skipped");
            }
            Err(TraderError::Cancelled) => {
                controller.halt(HaltReason::Stopped);
                break;
            }
            Err(TraderError::SessionHalted(_)) => break,
            Err(e) => {
                warn!(session = %controller.name(), error = %e, "Signal failed");
            }
        }
    }

    let totals = controller.current_status();
    info!(
        session = %controller.name(),
        status = %controller.status(),
        summary = %totals,
        "Session runner finished"
    );
    totals
}
