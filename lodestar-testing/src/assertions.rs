// Assertions for elections

use lodestar_distributed::{LeaderElection, LifecycleState};
use std::time::Duration;

/// Assert that an election is in a specific state
pub fn assert_state(election: &LeaderElection, expected: LifecycleState) {
    let actual = election.state();
    assert_eq!(
        actual,
        expected,
        "Expected {} to be {}, got {}",
        election.identity(),
        expected,
        actual
    );
}

/// Assert that exactly one of `elections` believes it leads, and return it
pub fn assert_single_leader(elections: &[LeaderElection]) -> &LeaderElection {
    let leaders: Vec<&LeaderElection> = elections.iter().filter(|e| e.is_leader()).collect();
    assert_eq!(
        leaders.len(),
        1,
        "Expected exactly one leader, got {:?}",
        leaders.iter().map(|e| e.identity()).collect::<Vec<_>>()
    );
    leaders[0]
}

/// Assert that none of `elections` believes it leads
pub fn assert_no_leader(elections: &[LeaderElection]) {
    let leaders: Vec<&str> = elections
        .iter()
        .filter(|e| e.is_leader())
        .map(|e| e.identity())
        .collect();
    assert!(leaders.is_empty(), "Expected no leader, got {:?}", leaders);
}

/// Wait until `election` reaches `expected`, for at most `timeout`.
///
/// Returns `false` on timeout.
pub async fn wait_for_state(
    election: &LeaderElection,
    expected: LifecycleState,
    timeout: Duration,
) -> bool {
    let mut states = election.subscribe();
    tokio::time::timeout(timeout, states.wait_for(|state| *state == expected))
        .await
        .is_ok_and(|result| result.is_ok())
}
