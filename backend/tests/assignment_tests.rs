//! Round-robin assignment tests
//!
//! Tests for lead distribution including:
//! - Fair spread across the roster
//! - Cursor persistence and resumption
//! - Batch caps and orphan reassignment
//! - Cooldown and failure behaviour of the service

mod common;

use common::*;
use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;

use crm_backend::external::MemoryLedger;
use crm_backend::services::assignment::{plan_assignments, SkipReason};
use crm_backend::services::{AssignmentGate, AssignmentService};
use shared::{Lead, LeadStatus};

fn roster(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn lead(row_number: u32, assignee: Option<&str>) -> Lead {
    Lead {
        row_number,
        order_date: String::new(),
        customer_name: format!("Customer {}", row_number),
        phone: String::new(),
        whatsapp: String::new(),
        governorate: String::new(),
        area: String::new(),
        address: String::new(),
        product: "Widget".to_string(),
        quantity: "1".to_string(),
        total_price: "100".to_string(),
        status: LeadStatus::New,
        notes: String::new(),
        source: String::new(),
        assignee: assignee.map(str::to_string),
    }
}

fn unassigned(count: usize) -> Vec<Lead> {
    (0..count).map(|i| lead(i as u32 + 2, None)).collect()
}

fn with_cursor(store: MemoryLedger, cursor: &str) -> MemoryLedger {
    store.with_sheet(SETTINGS, vec![vec!["round_robin_cursor", cursor]])
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_plan_rotates_through_roster() {
        let plan = plan_assignments(&roster(&["a", "b", "c"]), &unassigned(4), None, 100);
        let names: Vec<&str> = plan.assignments.iter().map(|a| a.assignee.as_str()).collect();

        assert_eq!(names, vec!["a", "b", "c", "a"]);
        assert_eq!(plan.cursor, Some(0));
        assert_eq!(plan.counts, vec![2, 1, 1]);
        assert_eq!(plan.remaining, 0);
    }

    #[test]
    fn test_plan_resumes_after_cursor() {
        let first = plan_assignments(&roster(&["a", "b", "c"]), &unassigned(1), Some(0), 100);
        assert_eq!(first.assignments[0].assignee, "b");

        let again = plan_assignments(&roster(&["a", "b", "c"]), &unassigned(1), Some(0), 100);
        assert_eq!(first, again);
    }

    #[test]
    fn test_plan_wraps_after_last_employee() {
        let plan = plan_assignments(&roster(&["a", "b", "c"]), &unassigned(1), Some(2), 100);
        assert_eq!(plan.assignments[0].assignee, "a");
        assert_eq!(plan.cursor, Some(0));
    }

    #[test]
    fn test_plan_fills_least_loaded_first() {
        let mut leads = vec![lead(2, Some("a")), lead(3, Some("A ")), lead(4, Some("b"))];
        leads.extend((5..8).map(|row| lead(row, None)));

        let plan = plan_assignments(&roster(&["a", "b", "c"]), &leads, None, 100);
        let names: Vec<&str> = plan.assignments.iter().map(|a| a.assignee.as_str()).collect();

        assert_eq!(names, vec!["c", "b", "c"]);
        assert_eq!(plan.counts, vec![2, 2, 2]);
    }

    #[test]
    fn test_plan_respects_batch_cap() {
        let plan = plan_assignments(&roster(&["a", "b"]), &unassigned(5), None, 2);

        assert_eq!(plan.assignments.len(), 2);
        assert_eq!(plan.remaining, 3);
        assert_eq!(plan.assignments[0].row_number, 2);
        assert_eq!(plan.assignments[1].row_number, 3);
    }

    #[test]
    fn test_plan_reassigns_orphans() {
        let leads = vec![lead(2, Some("ghost")), lead(3, Some("a"))];
        let plan = plan_assignments(&roster(&["a", "b"]), &leads, None, 100);

        assert_eq!(plan.orphaned, vec![2]);
        assert_eq!(plan.assignments.len(), 1);
        assert_eq!(plan.assignments[0].row_number, 2);
        assert_eq!(plan.assignments[0].assignee, "b");
    }

    #[test]
    fn test_plan_with_empty_roster_assigns_nothing() {
        let plan = plan_assignments(&[], &unassigned(3), Some(1), 100);
        assert!(plan.assignments.is_empty());
        assert_eq!(plan.remaining, 3);
        assert_eq!(plan.cursor, Some(1));
    }

    #[tokio::test]
    async fn test_service_writes_assignees_and_cursor() {
        let store = Arc::new(memory_ledger(
            &[
                ("Ali", "Widget", "1", "new", ""),
                ("Badr", "Widget", "1", "new", ""),
                ("Chen", "Widget", "1", "new", ""),
            ],
            &[],
        ));
        let service = assignment_service(&store, &["a", "b"], Duration::from_secs(60));
        let mut table = sheet_ledger(&store).read_leads().await.unwrap();

        let report = service.auto_assign(&mut table).await.unwrap();

        assert!(report.ran);
        assert_eq!(report.assigned.len(), 3);
        assert_eq!(report.cursor, Some(0));
        assert_eq!(store.cell(LEADS, 2, LEAD_ASSIGNEE_COL).await, "a");
        assert_eq!(store.cell(LEADS, 3, LEAD_ASSIGNEE_COL).await, "b");
        assert_eq!(store.cell(LEADS, 4, LEAD_ASSIGNEE_COL).await, "a");
        assert_eq!(store.cell(SETTINGS, 1, 1).await, "0");
        assert!(table.leads.iter().all(|l| l.assignee.is_some()));
    }

    #[tokio::test]
    async fn test_service_resumes_from_stored_cursor() {
        let store = Arc::new(with_cursor(
            memory_ledger(&[("Ali", "Widget", "1", "new", "")], &[]),
            "0",
        ));
        let service = assignment_service(&store, &["a", "b", "c"], Duration::from_secs(60));
        let mut table = sheet_ledger(&store).read_leads().await.unwrap();

        let report = service.auto_assign(&mut table).await.unwrap();

        assert_eq!(report.assigned[0].assignee, "b");
        assert_eq!(store.cell(SETTINGS, 1, 1).await, "1");
    }

    #[tokio::test]
    async fn test_cooldown_skip_writes_nothing() {
        let store = Arc::new(memory_ledger(
            &[
                ("Ali", "Widget", "1", "new", ""),
                ("Badr", "Widget", "1", "new", ""),
            ],
            &[],
        ));
        let service = assignment_service(&store, &["a", "b"], Duration::from_secs(3600));
        let mut table = sheet_ledger(&store).read_leads().await.unwrap();

        let first = service.auto_assign(&mut table).await.unwrap();
        let writes = store.write_count();

        let second = service.auto_assign(&mut table).await.unwrap();

        assert!(!second.ran);
        assert!(matches!(second.skipped, Some(SkipReason::Cooldown { .. })));
        assert!(second.assigned.is_empty());
        assert_eq!(store.write_count(), writes);
        assert_eq!(second.cursor, first.cursor);
        assert_eq!(second.distribution, first.distribution);
    }

    #[tokio::test]
    async fn test_cooldown_skip_reports_cursor_without_reading_settings() {
        let store = Arc::new(memory_ledger(
            &[
                ("Ali", "Widget", "1", "new", ""),
                ("Badr", "Widget", "1", "new", ""),
            ],
            &[],
        ));
        let service = assignment_service(&store, &["a", "b"], Duration::from_secs(3600));
        let mut table = sheet_ledger(&store).read_leads().await.unwrap();

        let first = service.auto_assign(&mut table).await.unwrap();
        assert_eq!(first.cursor, Some(1));
        store.fail_reads_from(SETTINGS).await;

        for _ in 0..3 {
            let skipped = service.auto_assign(&mut table).await.unwrap();
            assert!(!skipped.ran);
            assert_eq!(skipped.cursor, Some(1));
        }
    }

    #[tokio::test]
    async fn test_manual_trigger_bypasses_cooldown() {
        let store = Arc::new(memory_ledger(&[("Ali", "Widget", "1", "new", "")], &[]));
        let service = assignment_service(&store, &["a", "b"], Duration::from_secs(3600));
        let mut table = sheet_ledger(&store).read_leads().await.unwrap();
        service.auto_assign(&mut table).await.unwrap();

        let report = service.manual_assign().await.unwrap();

        assert!(report.ran);
        assert!(report.skipped.is_none());
        assert_eq!(report.remaining_unassigned, 0);
    }

    #[tokio::test]
    async fn test_failed_batch_leaves_cursor_and_leads_untouched() {
        let store = Arc::new(with_cursor(
            memory_ledger(
                &[
                    ("Ali", "Widget", "1", "new", ""),
                    ("Badr", "Widget", "1", "new", ""),
                ],
                &[],
            ),
            "1",
        ));
        store.fail_writes_to(LEADS).await;
        let service = assignment_service(&store, &["a", "b"], Duration::from_secs(60));
        let mut table = sheet_ledger(&store).read_leads().await.unwrap();

        assert!(service.auto_assign(&mut table).await.is_err());

        assert_eq!(store.cell(SETTINGS, 1, 1).await, "1");
        assert_eq!(store.cell(LEADS, 2, LEAD_ASSIGNEE_COL).await, "");
        assert_eq!(store.cell(LEADS, 3, LEAD_ASSIGNEE_COL).await, "");
        assert!(table.leads.iter().all(|l| l.assignee.is_none()));
    }

    #[tokio::test]
    async fn test_batch_cap_from_config() {
        let seeds: Vec<LeadSeed> = (0..5).map(|_| ("Ali", "Widget", "1", "new", "")).collect();
        let store = Arc::new(memory_ledger(&seeds, &[]));
        let mut config = config_with_roster(&["a", "b"]);
        config.assignment.batch_size = 2;
        let service = AssignmentService::new(
            sheet_ledger(&store),
            &config,
            AssignmentGate::new(Duration::from_secs(60)),
        );

        let report = service.manual_assign().await.unwrap();

        assert_eq!(report.assigned.len(), 2);
        assert_eq!(report.remaining_unassigned, 3);
        assert_eq!(store.cell(LEADS, 4, LEAD_ASSIGNEE_COL).await, "");
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        /// From equal loads, any batch leaves loads within one of each other
        #[test]
        fn prop_spread_stays_within_one(
            employees in 1usize..7,
            pending in 0usize..60,
            cursor in prop::option::of(0usize..7),
        ) {
            let names: Vec<String> = (0..employees).map(|i| format!("agent{}", i)).collect();
            let plan = plan_assignments(&names, &unassigned(pending), cursor, 200);

            let max = plan.counts.iter().copied().max().unwrap_or(0);
            let min = plan.counts.iter().copied().min().unwrap_or(0);
            prop_assert!(max - min <= 1);
            prop_assert_eq!(plan.assignments.len(), pending);
        }

        /// Every pick goes to an employee with the minimum load at that moment
        #[test]
        fn prop_each_pick_is_least_loaded(
            existing in prop::collection::vec(0usize..4, 1..5),
            pending in 1usize..20,
        ) {
            let names: Vec<String> = (0..existing.len()).map(|i| format!("agent{}", i)).collect();
            let mut leads = Vec::new();
            let mut row = 2u32;
            for (index, &count) in existing.iter().enumerate() {
                for _ in 0..count {
                    leads.push(lead(row, Some(names[index].as_str())));
                    row += 1;
                }
            }
            for _ in 0..pending {
                leads.push(lead(row, None));
                row += 1;
            }

            let plan = plan_assignments(&names, &leads, None, 200);

            let mut counts = existing.clone();
            for assignment in &plan.assignments {
                let index = names.iter().position(|n| *n == assignment.assignee).unwrap();
                let min = *counts.iter().min().unwrap();
                prop_assert_eq!(counts[index], min);
                counts[index] += 1;
            }
            prop_assert_eq!(counts, plan.counts);
        }
    }
}
