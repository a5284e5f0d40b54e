//! Primary-agent selection with staleness classification.

use std::time::Duration;

use chrono::{DateTime, Utc};

use threadgate_core::project::{AgentHandle, AgentPresence, Liveness, ProjectStatus};
use threadgate_core::{BridgeError, UnavailableReason};

/// Liveness of an agent last seen at `last_seen`, judged at `now`.
///
/// An age equal to the threshold already counts as stale.
pub fn classify(last_seen: Option<DateTime<Utc>>, now: DateTime<Utc>, threshold: Duration) -> Liveness {
    let Some(seen) = last_seen else {
        return Liveness::Unknown;
    };
    let age_ms = now.signed_duration_since(seen).num_milliseconds();
    let threshold_ms = i64::try_from(threshold.as_millis()).unwrap_or(i64::MAX);
    if age_ms >= threshold_ms {
        Liveness::Stale
    } else {
        Liveness::Live
    }
}

/// Pick the agent that answers for `status`.
///
/// Among several primaries the most recently seen wins; equal timestamps fall
/// back to the smallest identity so the choice is stable.
pub fn select(
    status: &ProjectStatus,
    now: DateTime<Utc>,
    threshold: Duration,
) -> Result<AgentHandle, BridgeError> {
    if status.agents.is_empty() {
        return Err(BridgeError::AgentUnavailable(UnavailableReason::NoAgents));
    }

    let primary = status
        .agents
        .iter()
        .filter(|a| a.is_primary)
        .min_by(|a, b| {
            b.last_seen
                .cmp(&a.last_seen)
                .then_with(|| a.identity.cmp(&b.identity))
        })
        .ok_or(BridgeError::AgentUnavailable(UnavailableReason::NoPrimary))?;

    match classify(primary.last_seen, now, threshold) {
        Liveness::Live => Ok(handle(primary, Liveness::Live)),
        Liveness::Stale | Liveness::Unknown => {
            tracing::debug!(
                project = %status.project,
                agent = %primary.identity,
                last_seen = ?primary.last_seen,
                "primary agent is stale"
            );
            Err(BridgeError::AgentUnavailable(UnavailableReason::Stale))
        }
    }
}

fn handle(agent: &AgentPresence, liveness: Liveness) -> AgentHandle {
    AgentHandle {
        identity: agent.identity.clone(),
        name: agent.name.clone(),
        liveness,
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    const THRESHOLD: Duration = Duration::from_secs(300);

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap()
    }

    fn agent(identity: &str, primary: bool, age_secs: Option<i64>) -> AgentPresence {
        AgentPresence {
            identity: identity.into(),
            name: identity.to_uppercase(),
            is_primary: primary,
            last_seen: age_secs.map(|s| now() - chrono::Duration::seconds(s)),
        }
    }

    fn status(agents: Vec<AgentPresence>) -> ProjectStatus {
        ProjectStatus {
            project: "demo".into(),
            backend: None,
            agents,
            updated_at: Some(now()),
        }
    }

    fn reason(result: Result<AgentHandle, BridgeError>) -> UnavailableReason {
        match result {
            Err(BridgeError::AgentUnavailable(r)) => r,
            other => panic!("expected unavailable, got {other:?}"),
        }
    }

    #[test]
    fn no_agents() {
        assert_eq!(reason(select(&status(vec![]), now(), THRESHOLD)), UnavailableReason::NoAgents);
    }

    #[test]
    fn no_primary() {
        let s = status(vec![agent("a", false, Some(1)), agent("b", false, Some(1))]);
        assert_eq!(reason(select(&s, now(), THRESHOLD)), UnavailableReason::NoPrimary);
    }

    #[test]
    fn staleness_boundary_is_inclusive() {
        let at = status(vec![agent("pm", true, Some(300))]);
        assert_eq!(reason(select(&at, now(), THRESHOLD)), UnavailableReason::Stale);

        let under = status(vec![agent("pm", true, Some(299))]);
        let handle = select(&under, now(), THRESHOLD).unwrap();
        assert_eq!(handle.identity, "pm");
        assert_eq!(handle.liveness, Liveness::Live);
    }

    #[test]
    fn missing_timestamp_is_unknown_and_rejected() {
        assert_eq!(classify(None, now(), THRESHOLD), Liveness::Unknown);
        let s = status(vec![agent("pm", true, None)]);
        assert_eq!(reason(select(&s, now(), THRESHOLD)), UnavailableReason::Stale);
    }

    #[test]
    fn most_recent_primary_wins() {
        let s = status(vec![
            agent("old", true, Some(100)),
            agent("fresh", true, Some(5)),
            agent("never", true, None),
            agent("helper", false, Some(0)),
        ]);
        assert_eq!(select(&s, now(), THRESHOLD).unwrap().identity, "fresh");
    }

    #[test]
    fn equal_timestamps_pick_smallest_identity() {
        let s = status(vec![agent("zed", true, Some(10)), agent("amy", true, Some(10))]);
        for _ in 0..3 {
            assert_eq!(select(&s, now(), THRESHOLD).unwrap().identity, "amy");
        }
    }

    #[test]
    fn future_timestamps_count_as_live() {
        assert_eq!(classify(Some(now() + chrono::Duration::seconds(30)), now(), THRESHOLD), Liveness::Live);
    }
}
