use std::cmp::Ordering;

use crate::orders::WorkOrder;
use crate::workers::{LiveStatus, SkillAliases, WorkerSnapshot};

/// Whether `worker` has the skill family `order`'s category maps to and
/// serves its area.
pub fn is_eligible(worker: &WorkerSnapshot, order: &WorkOrder, aliases: &SkillAliases) -> bool {
    worker.serves(&aliases.family(&order.category), order.area())
}

/// Total order over candidates, best first: presence (ONLINE, BUSY,
/// OFFLINE), higher accept rate, fewer open assignments, faster average
/// response, then worker id.
pub fn compare_candidates(a: &WorkerSnapshot, b: &WorkerSnapshot) -> Ordering {
    a.live_status
        .cmp(&b.live_status)
        .then_with(|| b.historical_accept_rate.total_cmp(&a.historical_accept_rate))
        .then_with(|| a.open_assignment_count.cmp(&b.open_assignment_count))
        .then_with(|| a.average_response_minutes.total_cmp(&b.average_response_minutes))
        .then_with(|| a.id.cmp(&b.id))
}

/// Sorts candidates best first. OFFLINE workers are kept only when nobody
/// ONLINE or BUSY is left, and then only if `allow_offline_fallback`.
pub fn rank_candidates(
    mut candidates: Vec<WorkerSnapshot>,
    allow_offline_fallback: bool,
) -> Vec<WorkerSnapshot> {
    let any_reachable = candidates
        .iter()
        .any(|w| w.live_status != LiveStatus::Offline);
    if any_reachable || !allow_offline_fallback {
        candidates.retain(|w| w.live_status != LiveStatus::Offline);
    }
    candidates.sort_by(compare_candidates);
    candidates
}
