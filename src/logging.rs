//! Log output setup.
//!
//! The crate logs through `tracing` macros everywhere; linking a
//! subscriber is the embedding application's call. `init` installs a
//! plain fmt subscriber whose line timestamps match the classic SIP
//! error-log format: `YYYY-MM-DD HH:MM:SS+00`, always UTC.

use tracing_subscriber::fmt::time::UtcTime;

/// Install a global subscriber with UTC `YYYY-MM-DD HH:MM:SS+00` line
/// timestamps. Safe to call more than once; later calls are no-ops.
pub fn init() {
    let timer = UtcTime::new(time::macros::format_description!(
        "[year]-[month]-[day] [hour]:[minute]:[second]+00"
    ));
    let _ = tracing_subscriber::fmt()
        .with_timer(timer)
        .with_target(false)
        .try_init();
}
