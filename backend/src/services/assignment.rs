//! Round-robin lead assignment
//!
//! Unassigned leads go to the least-loaded employee; ties are broken by the
//! persisted cursor so consecutive passes rotate through the roster instead
//! of always favouring its head. A pass writes every assignee cell and the
//! new cursor in one batch, so either all of it lands or none of it does.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::config::Config;
use crate::error::AppResult;
use crate::services::ledger::{CursorSlot, LeadField, LeadTable, SheetLedger};
use shared::{Lead, RowNumber};

/// Index of the next employee: minimum load, ties broken by the first tied
/// roster index after the cursor, wrapping to the first tied index.
pub fn pick_next(counts: &[usize], cursor: Option<usize>) -> Option<usize> {
    let min = *counts.iter().min()?;
    let tied: Vec<usize> = (0..counts.len()).filter(|&i| counts[i] == min).collect();

    tied.iter()
        .copied()
        .find(|&i| cursor.map(|c| i > c).unwrap_or(true))
        .or_else(|| tied.first().copied())
}

/// One planned assignment
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Assignment {
    pub row_number: RowNumber,
    pub assignee: String,
}

/// Outcome of planning one batch, before anything is written
#[derive(Debug, Clone, PartialEq)]
pub struct AssignmentPlan {
    pub assignments: Vec<Assignment>,
    /// Cursor after the last pick
    pub cursor: Option<usize>,
    /// Per-roster counts after the batch
    pub counts: Vec<usize>,
    /// Leads whose assignee was not on the roster
    pub orphaned: Vec<RowNumber>,
    /// Unassigned leads left for a later pass
    pub remaining: usize,
}

fn roster_position(roster: &[String], assignee: &str) -> Option<usize> {
    roster
        .iter()
        .position(|member| member.eq_ignore_ascii_case(assignee.trim()))
}

/// Plan assignments for up to `batch_size` unassigned leads, oldest row first
pub fn plan_assignments(
    roster: &[String],
    leads: &[Lead],
    cursor: Option<usize>,
    batch_size: usize,
) -> AssignmentPlan {
    let mut counts = vec![0usize; roster.len()];
    let mut pending: Vec<RowNumber> = Vec::new();
    let mut orphaned = Vec::new();

    for lead in leads {
        match lead.assignee.as_deref() {
            None => pending.push(lead.row_number),
            Some(assignee) => match roster_position(roster, assignee) {
                Some(index) => counts[index] += 1,
                None => {
                    orphaned.push(lead.row_number);
                    pending.push(lead.row_number);
                }
            },
        }
    }

    if roster.is_empty() {
        return AssignmentPlan {
            assignments: Vec::new(),
            cursor,
            counts,
            orphaned,
            remaining: pending.len(),
        };
    }

    pending.sort_unstable();
    let remaining = pending.len().saturating_sub(batch_size);

    let mut cursor = cursor;
    let mut assignments = Vec::with_capacity(pending.len().min(batch_size));
    for row_number in pending.into_iter().take(batch_size) {
        let Some(index) = pick_next(&counts, cursor) else {
            break;
        };
        counts[index] += 1;
        cursor = Some(index);
        assignments.push(Assignment {
            row_number,
            assignee: roster[index].clone(),
        });
    }

    AssignmentPlan {
        assignments,
        cursor,
        counts,
        orphaned,
        remaining,
    }
}

/// Load of one employee
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct EmployeeLoad {
    pub username: String,
    pub assigned: usize,
}

/// Distribution metrics across the roster
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BalanceReport {
    pub employees: Vec<EmployeeLoad>,
    pub total: usize,
    pub max: usize,
    pub min: usize,
    pub spread: usize,
    /// Spread exceeds the configured share of all assigned leads
    pub imbalanced: bool,
}

impl BalanceReport {
    pub fn from_counts(roster: &[String], counts: &[usize], tolerance: f64) -> Self {
        let total: usize = counts.iter().sum();
        let max = counts.iter().copied().max().unwrap_or(0);
        let min = counts.iter().copied().min().unwrap_or(0);
        let spread = max - min;

        Self {
            employees: roster
                .iter()
                .zip(counts)
                .map(|(username, &assigned)| EmployeeLoad {
                    username: username.clone(),
                    assigned,
                })
                .collect(),
            total,
            max,
            min,
            spread,
            imbalanced: spread > 1 && spread as f64 > tolerance * total as f64,
        }
    }

    /// Current distribution of already-assigned leads
    pub fn from_leads(roster: &[String], leads: &[Lead], tolerance: f64) -> Self {
        let mut counts = vec![0usize; roster.len()];
        for lead in leads {
            if let Some(index) = lead
                .assignee
                .as_deref()
                .and_then(|a| roster_position(roster, a))
            {
                counts[index] += 1;
            }
        }
        Self::from_counts(roster, &counts, tolerance)
    }
}

/// What started a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Side effect of listing leads; throttled
    Automatic,
    /// Admin action; bypasses the cooldown
    Manual,
}

/// Why a pass did not run
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "reason")]
pub enum SkipReason {
    InFlight,
    Cooldown { retry_in_secs: u64 },
}

/// Process-local trigger state: cooldown timestamp, in-flight flag and the
/// cursor last seen in the ledger.
///
/// Only guards passes within this process; two instances can still race.
pub struct AssignmentGate {
    cooldown: Duration,
    last_run: Mutex<Option<Instant>>,
    busy: AtomicBool,
    /// Outer `None` until a pass has read or written the cursor
    cursor: Mutex<Option<Option<usize>>>,
}

/// Held for the duration of a pass; clears the in-flight flag on drop
pub struct GateGuard {
    gate: Arc<AssignmentGate>,
}

impl Drop for GateGuard {
    fn drop(&mut self) {
        self.gate.busy.store(false, Ordering::Release);
    }
}

impl AssignmentGate {
    pub fn new(cooldown: Duration) -> Arc<Self> {
        Arc::new(Self {
            cooldown,
            last_run: Mutex::new(None),
            busy: AtomicBool::new(false),
            cursor: Mutex::new(None),
        })
    }

    fn remember_cursor(&self, cursor: Option<usize>) {
        *self.cursor.lock().unwrap_or_else(|e| e.into_inner()) = Some(cursor);
    }

    /// Cursor as of the last pass in this process
    pub fn known_cursor(&self) -> Option<Option<usize>> {
        *self.cursor.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Claim the gate. The first automatic trigger after start always runs.
    pub fn try_begin(self: &Arc<Self>, trigger: Trigger) -> Result<GateGuard, SkipReason> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(SkipReason::InFlight);
        }
        let guard = GateGuard { gate: self.clone() };

        let mut last_run = self.last_run.lock().unwrap_or_else(|e| e.into_inner());
        if trigger == Trigger::Automatic {
            if let Some(previous) = *last_run {
                let elapsed = previous.elapsed();
                if elapsed < self.cooldown {
                    let retry_in_secs = (self.cooldown - elapsed).as_secs().max(1);
                    return Err(SkipReason::Cooldown { retry_in_secs });
                }
            }
        }
        *last_run = Some(Instant::now());
        Ok(guard)
    }
}

/// Result of an assignment trigger
#[derive(Debug, Clone, Serialize)]
pub struct AssignmentReport {
    pub ran: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped: Option<SkipReason>,
    pub assigned: Vec<Assignment>,
    pub remaining_unassigned: usize,
    pub reassigned_orphans: Vec<RowNumber>,
    pub cursor: Option<usize>,
    pub distribution: BalanceReport,
}

/// Assignment service
#[derive(Clone)]
pub struct AssignmentService {
    ledger: SheetLedger,
    roster: Arc<Vec<String>>,
    batch_size: usize,
    tolerance: f64,
    gate: Arc<AssignmentGate>,
}

impl AssignmentService {
    pub fn new(ledger: SheetLedger, config: &Config, gate: Arc<AssignmentGate>) -> Self {
        Self {
            ledger,
            roster: Arc::new(config.roster()),
            batch_size: config.assignment.effective_batch_size(),
            tolerance: config.assignment.imbalance_tolerance,
            gate,
        }
    }

    pub fn roster(&self) -> &[String] {
        &self.roster
    }

    pub fn is_on_roster(&self, username: &str) -> bool {
        roster_position(&self.roster, username).is_some()
    }

    /// Throttled pass over leads the caller already read. On success the
    /// table is updated in place with the new assignees.
    pub async fn auto_assign(&self, table: &mut LeadTable) -> AppResult<AssignmentReport> {
        match self.gate.try_begin(Trigger::Automatic) {
            Ok(_guard) => self.run(table).await,
            Err(reason) => {
                tracing::debug!(?reason, "Automatic assignment skipped");
                let cursor = match self.gate.known_cursor() {
                    Some(cursor) => cursor,
                    None => match self.ledger.read_cursor().await {
                        Ok(slot) => {
                            self.gate.remember_cursor(slot.value);
                            slot.value
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "Could not read assignment cursor");
                            None
                        }
                    },
                };
                Ok(self.skipped_report(reason, &table.leads, cursor))
            }
        }
    }

    /// Admin-triggered pass; ignores the cooldown, not the in-flight flag
    pub async fn manual_assign(&self) -> AppResult<AssignmentReport> {
        match self.gate.try_begin(Trigger::Manual) {
            Ok(_guard) => {
                let mut table = self.ledger.read_leads().await?;
                self.run(&mut table).await
            }
            Err(reason) => {
                tracing::info!(?reason, "Manual assignment skipped");
                let table = self.ledger.read_leads().await?;
                let cursor = self.ledger.read_cursor().await?.value;
                Ok(self.skipped_report(reason, &table.leads, cursor))
            }
        }
    }

    fn skipped_report(
        &self,
        reason: SkipReason,
        leads: &[Lead],
        cursor: Option<usize>,
    ) -> AssignmentReport {
        AssignmentReport {
            ran: false,
            skipped: Some(reason),
            assigned: Vec::new(),
            remaining_unassigned: leads.iter().filter(|l| l.is_unassigned()).count(),
            reassigned_orphans: Vec::new(),
            cursor,
            distribution: BalanceReport::from_leads(&self.roster, leads, self.tolerance),
        }
    }

    /// Plan, then write assignees and cursor together
    async fn run(&self, table: &mut LeadTable) -> AppResult<AssignmentReport> {
        if self.roster.is_empty() {
            tracing::warn!("No employees configured; leads stay unassigned");
        }

        let slot: CursorSlot = self.ledger.read_cursor().await?;
        self.gate.remember_cursor(slot.value);
        let plan = plan_assignments(&self.roster, &table.leads, slot.value, self.batch_size);

        if plan.assignments.is_empty() {
            return Ok(AssignmentReport {
                ran: true,
                skipped: None,
                assigned: Vec::new(),
                remaining_unassigned: plan.remaining,
                reassigned_orphans: Vec::new(),
                cursor: slot.value,
                distribution: BalanceReport::from_counts(&self.roster, &plan.counts, self.tolerance),
            });
        }

        if !plan.orphaned.is_empty() {
            tracing::warn!(rows = ?plan.orphaned, "Leads assigned to unknown employees will be reassigned");
        }

        let mut updates = plan
            .assignments
            .iter()
            .map(|a| table.update(a.row_number, LeadField::Assignee, a.assignee.clone()))
            .collect::<AppResult<Vec<_>>>()?;
        let cursor_cell = self.ledger.cursor_cell(&slot).await?;
        updates.push(crate::external::CellUpdate::new(
            cursor_cell,
            CursorSlot::encode(plan.cursor),
        ));

        if let Err(e) = self.ledger.write(&updates).await {
            tracing::error!(
                error = %e,
                batch = plan.assignments.len(),
                "Assignment batch write failed; nothing assigned, cursor unchanged"
            );
            return Err(e);
        }
        self.gate.remember_cursor(plan.cursor);

        for assignment in &plan.assignments {
            if let Some(lead) = table
                .leads
                .iter_mut()
                .find(|l| l.row_number == assignment.row_number)
            {
                lead.assignee = Some(assignment.assignee.clone());
            }
        }

        let distribution = BalanceReport::from_counts(&self.roster, &plan.counts, self.tolerance);
        if distribution.imbalanced {
            tracing::warn!(
                spread = distribution.spread,
                total = distribution.total,
                "Lead distribution is imbalanced"
            );
        }

        let orphans: Vec<RowNumber> = plan
            .orphaned
            .iter()
            .copied()
            .filter(|row| plan.assignments.iter().any(|a| a.row_number == *row))
            .collect();

        tracing::info!(
            assigned = plan.assignments.len(),
            remaining = plan.remaining,
            cursor = ?plan.cursor,
            "Assignment pass complete"
        );

        Ok(AssignmentReport {
            ran: true,
            skipped: None,
            assigned: plan.assignments,
            remaining_unassigned: plan.remaining,
            reassigned_orphans: orphans,
            cursor: plan.cursor,
            distribution,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pick_next_prefers_minimum_load() {
        assert_eq!(pick_next(&[2, 0, 1], None), Some(1));
        assert_eq!(pick_next(&[2, 0, 1], Some(1)), Some(1));
    }

    #[test]
    fn test_pick_next_tie_break_after_cursor() {
        assert_eq!(pick_next(&[0, 0, 0], None), Some(0));
        assert_eq!(pick_next(&[0, 0, 0], Some(0)), Some(1));
        assert_eq!(pick_next(&[0, 0, 0], Some(2)), Some(0));
        // Tied set is {0, 2}; cursor at 1 picks 2, cursor at 2 wraps to 0
        assert_eq!(pick_next(&[1, 2, 1], Some(1)), Some(2));
        assert_eq!(pick_next(&[1, 2, 1], Some(2)), Some(0));
    }

    #[test]
    fn test_pick_next_cursor_past_roster_wraps() {
        assert_eq!(pick_next(&[0, 0], Some(7)), Some(0));
        assert_eq!(pick_next(&[], None), None);
    }

    #[test]
    fn test_gate_first_automatic_run_ignores_cooldown() {
        let gate = AssignmentGate::new(Duration::from_secs(3600));
        let guard = gate.try_begin(Trigger::Automatic);
        assert!(guard.is_ok());
    }

    #[test]
    fn test_gate_in_flight_skips() {
        let gate = AssignmentGate::new(Duration::ZERO);
        let _held = gate.try_begin(Trigger::Automatic).unwrap();
        assert_eq!(
            gate.try_begin(Trigger::Manual).err(),
            Some(SkipReason::InFlight)
        );
    }

    #[test]
    fn test_gate_cooldown_and_manual_bypass() {
        let gate = AssignmentGate::new(Duration::from_secs(3600));
        drop(gate.try_begin(Trigger::Automatic).unwrap());

        assert!(matches!(
            gate.try_begin(Trigger::Automatic).err(),
            Some(SkipReason::Cooldown { .. })
        ));
        assert!(gate.try_begin(Trigger::Manual).is_ok());
    }

    #[test]
    fn test_gate_remembers_cursor() {
        let gate = AssignmentGate::new(Duration::ZERO);
        assert_eq!(gate.known_cursor(), None);
        gate.remember_cursor(None);
        assert_eq!(gate.known_cursor(), Some(None));
        gate.remember_cursor(Some(2));
        assert_eq!(gate.known_cursor(), Some(Some(2)));
    }

    #[test]
    fn test_balance_small_spread_is_not_imbalanced() {
        let roster = vec!["a".to_string(), "b".to_string()];
        let report = BalanceReport::from_counts(&roster, &[2, 1], 0.10);
        assert_eq!(report.spread, 1);
        assert!(!report.imbalanced);

        let report = BalanceReport::from_counts(&roster, &[10, 2], 0.10);
        assert!(report.imbalanced);
    }
}
