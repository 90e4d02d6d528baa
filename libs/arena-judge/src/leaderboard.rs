use arena_common::store::SubmissionStore;
use arena_common::types::{LeaderboardEntry, SubmissionFilter, SubmissionStatus};
use anyhow::Result;

/// Solved counts per user for one competition, recomputed on every call.
///
/// Counts completed, passed submissions. Sorted by count descending, then
/// user id.
pub async fn leaderboard(
    store: &dyn SubmissionStore,
    competition_id: &str,
) -> Result<Vec<LeaderboardEntry>> {
    let filter = SubmissionFilter {
        competition_id: competition_id.to_string(),
        status: Some(SubmissionStatus::Completed),
        passed: Some(true),
    };

    let mut entries: Vec<LeaderboardEntry> = store
        .count_submissions(&filter)
        .await?
        .into_iter()
        .map(|(user_id, num_solved)| LeaderboardEntry { user_id, num_solved })
        .collect();

    entries.sort_by(|a, b| {
        b.num_solved
            .cmp(&a.num_solved)
            .then_with(|| a.user_id.cmp(&b.user_id))
    });
    Ok(entries)
}
