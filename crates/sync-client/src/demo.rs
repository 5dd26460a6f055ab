//! Replay playback polling.
//!
//! The game reports its playback position in reply to `demo_goto`:
//!
//! ```text
//! Currently playing 450 of 9000 ticks. Minutes:7.50 File:match1.dem
//! ```
//!
//! No reply within the timeout means no replay is playing.

use regex::Regex;
use std::sync::OnceLock;
use std::time::Duration;
use sync_protocol::DemoStatus;
use tracing::trace;

use crate::correlator::Correlator;
use crate::error::ClientError;
use crate::matcher::{MatchResult, ResponsePattern};

/// Command that makes the game print its playback position.
pub const DEMO_TICK_COMMAND: &str = "demo_goto";

/// Expected reply to [`DEMO_TICK_COMMAND`].
pub const DEMO_TICK_PATTERN: &str =
    r"Currently playing ([0-9]+) of ([0-9]+) ticks\. Minutes:([0-9]+\.[0-9]+) File:([A-Za-z0-9_.\-]+)";

/// The compiled playback pattern.
///
/// # Errors
///
/// Returns an error if the pattern does not compile.
pub fn demo_tick_pattern() -> Result<ResponsePattern, regex::Error> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();

    if let Some(regex) = PATTERN.get() {
        return Ok(ResponsePattern::Regex(regex.clone()));
    }
    let regex = Regex::new(DEMO_TICK_PATTERN)?;
    Ok(ResponsePattern::Regex(PATTERN.get_or_init(|| regex).clone()))
}

/// Turn a playback match into a status.
///
/// # Errors
///
/// Returns [`ClientError::InvalidResponse`] if a group is missing or out of
/// range.
pub fn parse_demo_tick(result: &MatchResult) -> Result<DemoStatus, ClientError> {
    let group = |index: usize, name: &str| {
        result
            .group(index)
            .ok_or_else(|| ClientError::InvalidResponse(format!("missing {name}")))
    };

    let tick = group(1, "tick")?;
    let total = group(2, "total ticks")?;
    let minutes = group(3, "minutes")?;
    let file = group(4, "file name")?;

    Ok(DemoStatus::playing(
        tick.parse()
            .map_err(|e| ClientError::InvalidResponse(format!("tick {tick:?}: {e}")))?,
        total
            .parse()
            .map_err(|e| ClientError::InvalidResponse(format!("total ticks {total:?}: {e}")))?,
        minutes
            .parse()
            .map_err(|e| ClientError::InvalidResponse(format!("minutes {minutes:?}: {e}")))?,
        file,
    ))
}

/// Ask the game for its playback position.
///
/// A timeout reports an idle status; every other failure is returned.
///
/// # Errors
///
/// Returns an error if the socket is closed or the reply cannot be parsed.
pub async fn poll_demo_status(
    correlator: &Correlator,
    timeout: Duration,
) -> Result<DemoStatus, ClientError> {
    match correlator
        .send(DEMO_TICK_COMMAND, demo_tick_pattern()?, timeout)
        .await
    {
        Ok(result) => parse_demo_tick(&result),
        Err(ClientError::Timeout) => {
            trace!("No playback reply, assuming idle");
            Ok(DemoStatus::idle())
        }
        Err(e) => Err(e),
    }
}
