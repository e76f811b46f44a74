//! Scan budgets and the state machines that enforce them.
//!
//! Both multi-folder aggregation and the pending-reply scan stop for one of
//! two reasons: enough results were found, or too much work was done. The
//! transitions live here as pure functions so termination can be tested
//! without a store.

use crate::config::ScanConfig;

/// Where a bounded scan stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Scanning,
    /// The work budget ran out first.
    BudgetExhausted,
    /// Enough results were collected.
    TargetReached,
}

impl ScanState {
    pub fn is_scanning(self) -> bool {
        matches!(self, Self::Scanning)
    }
}

/// Limits for one multi-folder aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanBudget {
    /// Records taken from any single folder.
    pub max_items_per_container: usize,
    /// Records taken across all folders before aggregation stops.
    pub max_total_scanned: usize,
    /// Distinct records after which merging stops.
    pub target_total: Option<usize>,
}

/// Something that happened during aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateEvent {
    /// A record was merged; `distinct` records are now held.
    Merged { distinct: usize },
    /// A folder finished; `taken` records have been read from all folders so far.
    FolderDone { taken: usize },
}

impl ScanBudget {
    /// Budget for scanning `folder_count` folders.
    ///
    /// Per-folder cap: the configured maximum when searching, otherwise an
    /// even share of the total budget (never below the floor). A target
    /// raises the cap to its per-folder share, rounded up.
    pub fn for_folders(
        folder_count: usize,
        searching: bool,
        target_total: Option<usize>,
        scan: &ScanConfig,
    ) -> Self {
        let folders = folder_count.max(1);
        let mut cap = if searching {
            scan.max_per_folder
        } else {
            (scan.total_budget / folders).max(scan.min_per_folder)
        };
        let target_total = target_total.filter(|t| *t > 0);
        if let Some(target) = target_total {
            cap = cap.max(target.div_ceil(folders).max(1));
        }
        Self {
            max_items_per_container: cap,
            max_total_scanned: cap.saturating_mul(folders),
            target_total,
        }
    }

    /// Transition function of the aggregation state machine. Terminal
    /// states absorb every event.
    pub fn step(&self, state: ScanState, event: AggregateEvent) -> ScanState {
        if !state.is_scanning() {
            return state;
        }
        match event {
            AggregateEvent::Merged { distinct } => match self.target_total {
                Some(target) if distinct >= target => ScanState::TargetReached,
                _ => ScanState::Scanning,
            },
            AggregateEvent::FolderDone { taken } if taken >= self.max_total_scanned => {
                ScanState::BudgetExhausted
            }
            AggregateEvent::FolderDone { .. } => ScanState::Scanning,
        }
    }
}

/// Limits for one pending-reply scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingBudget {
    /// Accepted results after which the scan stops.
    pub max_results: usize,
    /// Candidates processed before the scan gives up.
    pub ceiling: usize,
}

impl PendingBudget {
    /// Ceiling is `max(max_results * multiplier, max_results + 25)`.
    pub fn new(max_results: usize, multiplier: usize) -> Self {
        Self {
            max_results,
            ceiling: max_results
                .saturating_mul(multiplier)
                .max(max_results.saturating_add(25)),
        }
    }

    /// State after a candidate was processed.
    ///
    /// `remaining` is the number of candidates not yet looked at. Hitting
    /// the ceiling with nothing left counts as a natural end, not as
    /// exhaustion.
    pub fn step(&self, state: ScanState, processed: usize, accepted: usize, remaining: usize) -> ScanState {
        if !state.is_scanning() {
            return state;
        }
        if accepted >= self.max_results {
            ScanState::TargetReached
        } else if processed >= self.ceiling && remaining > 0 {
            ScanState::BudgetExhausted
        } else {
            ScanState::Scanning
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ScanConfig {
        ScanConfig::default()
    }

    #[test]
    fn test_even_share_without_search() {
        let budget = ScanBudget::for_folders(3, false, None, &config());
        assert_eq!(budget.max_items_per_container, 50);
        assert_eq!(budget.max_total_scanned, 150);
        assert_eq!(budget.target_total, None);
    }

    #[test]
    fn test_floor_applies_with_many_folders() {
        let budget = ScanBudget::for_folders(100, false, None, &config());
        assert_eq!(budget.max_items_per_container, 5);
        assert_eq!(budget.max_total_scanned, 500);
    }

    #[test]
    fn test_zero_folders_counts_as_one() {
        let budget = ScanBudget::for_folders(0, false, None, &config());
        assert_eq!(budget.max_items_per_container, 150);
    }

    #[test]
    fn test_search_uses_hard_cap() {
        let budget = ScanBudget::for_folders(4, true, None, &config());
        assert_eq!(budget.max_items_per_container, 400);
    }

    #[test]
    fn test_target_raises_cap() {
        let budget = ScanBudget::for_folders(4, false, Some(401), &config());
        // ceil(401 / 4) = 101 > 150 / 4 = 37
        assert_eq!(budget.max_items_per_container, 101);
        assert_eq!(budget.target_total, Some(401));

        let small = ScanBudget::for_folders(4, false, Some(8), &config());
        assert_eq!(small.max_items_per_container, 37);
    }

    #[test]
    fn test_aggregate_target_reached() {
        let budget = ScanBudget::for_folders(2, false, Some(3), &config());
        let state = budget.step(ScanState::Scanning, AggregateEvent::Merged { distinct: 2 });
        assert_eq!(state, ScanState::Scanning);
        let state = budget.step(state, AggregateEvent::Merged { distinct: 3 });
        assert_eq!(state, ScanState::TargetReached);
        // Absorbing.
        let state = budget.step(state, AggregateEvent::FolderDone { taken: 1000 });
        assert_eq!(state, ScanState::TargetReached);
    }

    #[test]
    fn test_aggregate_budget_exhausted_at_folder_boundary() {
        let budget = ScanBudget {
            max_items_per_container: 5,
            max_total_scanned: 10,
            target_total: None,
        };
        let state = budget.step(ScanState::Scanning, AggregateEvent::Merged { distinct: 50 });
        assert_eq!(state, ScanState::Scanning);
        let state = budget.step(state, AggregateEvent::FolderDone { taken: 9 });
        assert_eq!(state, ScanState::Scanning);
        let state = budget.step(state, AggregateEvent::FolderDone { taken: 10 });
        assert_eq!(state, ScanState::BudgetExhausted);
    }

    #[test]
    fn test_pending_ceiling() {
        assert_eq!(PendingBudget::new(10, 4).ceiling, 40);
        assert_eq!(PendingBudget::new(5, 4).ceiling, 30);
        assert_eq!(PendingBudget::new(200, 4).ceiling, 800);
    }

    #[test]
    fn test_pending_transitions() {
        let budget = PendingBudget::new(2, 4);
        assert_eq!(budget.ceiling, 27);
        assert_eq!(budget.step(ScanState::Scanning, 1, 1, 5), ScanState::Scanning);
        assert_eq!(budget.step(ScanState::Scanning, 3, 2, 5), ScanState::TargetReached);
        assert_eq!(
            budget.step(ScanState::Scanning, 27, 1, 3),
            ScanState::BudgetExhausted
        );
        // Ceiling reached exactly as candidates run out.
        assert_eq!(budget.step(ScanState::Scanning, 27, 1, 0), ScanState::Scanning);
    }

    #[test]
    fn test_pending_target_wins_over_ceiling() {
        let budget = PendingBudget::new(1, 4);
        assert_eq!(
            budget.step(ScanState::Scanning, 26, 1, 10),
            ScanState::TargetReached
        );
    }
}
