use walguard_protocol::{BackupLabel, BackupSource, SegmentSize, TimelineId, WalPosition};
use walguard_runtime::{EngineError, SimulatedEngine, SimulatedEngineConfig};

use super::*;
use crate::auth::Role;
use crate::registry::ProtectionState;

fn coordinator() -> BackupCoordinator<SimulatedEngine> {
	BackupCoordinator::new(SimulatedEngine::default(), CoordinatorConfig::default())
}

fn admin() -> Caller {
	Caller::superuser("postgres")
}

fn assert_consistent(coordinator: &BackupCoordinator<SimulatedEngine>) {
	let status = coordinator.status();
	assert_eq!(status.protection.active, status.protection.reference_count > 0);
	assert_eq!(status.sessions.len(), status.protection.reference_count as usize);
	assert_eq!(coordinator.engine().is_protected(), status.protection.active);
	assert!(status.poisoned.is_none());
}

#[test]
fn label_text_parses_back_to_recorded_start() {
	let coordinator = coordinator();
	let session = coordinator.begin(&admin(), "nightly", true).unwrap();

	let parsed = BackupLabel::parse(&session.token).unwrap();
	assert_eq!(parsed.start.position, session.start_position);
	assert_eq!(parsed.start.timeline, session.start_timeline);
	assert_eq!(parsed.label, "nightly");
	assert_eq!(parsed.backup_id, Some(session.backup_id));
	assert_eq!(parsed.start_time, Some(session.started_at));
	assert_eq!(parsed.source, BackupSource::Primary);
	assert!(session.token.starts_with("START WAL LOCATION: 0/1000028 (file 000000010000000000000001)\n"));
	assert_consistent(&coordinator);
}

#[test]
fn overlapping_sessions_share_protection() {
	let coordinator = coordinator();
	let b1 = coordinator.start_backup(&admin(), "b1", true).unwrap();
	let b2 = coordinator.start_backup(&admin(), "b2", false).unwrap();
	assert_ne!(b1, b2);
	assert_eq!(coordinator.status().protection.reference_count, 2);
	assert_consistent(&coordinator);

	let first = coordinator.end(&admin(), &b1).unwrap();
	assert!(!first.protection_released);
	assert_eq!(coordinator.status().protection.reference_count, 1);
	assert!(coordinator.engine().is_protected());
	assert_eq!(coordinator.engine().calls().end, 0);
	assert_consistent(&coordinator);

	let last = coordinator.end(&admin(), &b2).unwrap();
	assert!(last.protection_released);
	assert_eq!(coordinator.status().protection, ProtectionState::default());
	assert_eq!(coordinator.engine().calls().begin, 1);
	assert_eq!(coordinator.engine().calls().end, 1);
	assert_consistent(&coordinator);
}

#[test]
fn later_sessions_inherit_the_first_baseline() {
	let coordinator = coordinator();
	let first = coordinator.begin(&admin(), "first", true).unwrap();
	coordinator.engine().advance(0x0300_0000);
	let second = coordinator.begin(&admin(), "second", true).unwrap();
	assert_eq!(second.start(), first.start());
}

#[test]
fn stop_filename_names_the_preceding_segment() {
	let coordinator = coordinator();
	let token = coordinator.start_backup(&admin(), "x", true).unwrap();
	let info = coordinator.end(&admin(), &token).unwrap();

	assert_eq!(info.stop.position, WalPosition(0x0100_00C8));
	assert_eq!(info.stop_filename, "000000010000000000000001");
	assert_eq!(info.session.state, SessionState::Closed);
}

#[test]
fn recovery_uses_replay_timeline() {
	let coordinator = coordinator();
	coordinator.engine().enter_recovery(TimelineId(4));

	let session = coordinator.begin(&admin(), "standby copy", true).unwrap();
	assert_eq!(session.start_timeline, TimelineId(4));
	assert_eq!(session.source, BackupSource::Standby);
	assert_eq!(BackupLabel::parse(&session.token).unwrap().start.timeline, TimelineId(4));

	let info = coordinator.end(&admin(), &session.token).unwrap();
	assert_eq!(info.stop.timeline, TimelineId(4));
	assert!(info.stop_filename.starts_with("00000004"));
}

#[test]
fn promotion_mid_backup_names_stop_on_new_timeline() {
	let coordinator = coordinator();
	coordinator.engine().enter_recovery(TimelineId(2));
	let session = coordinator.begin(&admin(), "x", true).unwrap();

	coordinator.engine().promote(TimelineId(3));
	let info = coordinator.end(&admin(), &session.token).unwrap();

	assert_eq!(info.session.start_timeline, TimelineId(2));
	assert_eq!(info.stop.timeline, TimelineId(3));
	assert!(info.stop_filename.starts_with("00000003"));
}

#[test]
fn joining_session_keeps_standby_source_after_promotion() {
	let coordinator = coordinator();
	coordinator.engine().enter_recovery(TimelineId(2));
	let first = coordinator.begin(&admin(), "first", true).unwrap();

	coordinator.engine().promote(TimelineId(3));
	let second = coordinator.begin(&admin(), "second", true).unwrap();

	assert_eq!(first.source, BackupSource::Standby);
	assert_eq!(second.source, BackupSource::Standby);
	assert_eq!(second.start(), first.start());
	assert!(second.token.contains("\nBACKUP FROM: standby\n"));
	assert_eq!(BackupLabel::parse(&second.token).unwrap().source, BackupSource::Standby);
	assert_consistent(&coordinator);
}

#[test]
fn fresh_window_after_promotion_is_primary() {
	let coordinator = coordinator();
	coordinator.engine().enter_recovery(TimelineId(2));
	let standby = coordinator.begin(&admin(), "standby", true).unwrap();
	coordinator.engine().promote(TimelineId(3));
	coordinator.end(&admin(), &standby.token).unwrap();

	let primary = coordinator.begin(&admin(), "primary", true).unwrap();
	assert_eq!(primary.source, BackupSource::Primary);
	assert_eq!(primary.start_timeline, TimelineId(3));
}

#[test]
fn replay_position_failure_on_begin_changes_nothing() {
	let coordinator = coordinator();
	coordinator.engine().enter_recovery(TimelineId(2));
	coordinator.engine().fail_next_replay(EngineError::Unavailable("replay stalled".into()));

	let err = coordinator.begin(&admin(), "x", true).unwrap_err();
	assert_eq!(err, BackupError::EngineUnavailable(EngineError::Unavailable("replay stalled".into())));
	assert_eq!(coordinator.status().protection, ProtectionState::default());
	assert!(coordinator.status().sessions.is_empty());
	assert_eq!(coordinator.engine().calls().begin, 0);
	assert_consistent(&coordinator);
}

#[test]
fn replay_position_failure_on_end_keeps_session_open() {
	let coordinator = coordinator();
	coordinator.engine().enter_recovery(TimelineId(2));
	let session = coordinator.begin(&admin(), "x", true).unwrap();
	let before = coordinator.status();
	coordinator.engine().fail_next_replay(EngineError::Unavailable("replay stalled".into()));

	assert!(matches!(coordinator.end(&admin(), &session.token), Err(BackupError::EngineUnavailable(_))));
	assert_eq!(coordinator.status(), before);
	assert_eq!(coordinator.engine().calls().end, 0);
	assert_consistent(&coordinator);

	let info = coordinator.end(&admin(), &session.token).unwrap();
	assert_eq!(info.stop.timeline, TimelineId(2));
	assert_consistent(&coordinator);
}

#[test]
fn end_at_wal_address_limit_keeps_session_abortable() {
	let coordinator = coordinator();
	let token = coordinator.start_backup(&admin(), "x", true).unwrap();
	coordinator.engine().advance(u64::MAX);

	assert!(matches!(coordinator.end(&admin(), &token), Err(BackupError::EngineUnavailable(EngineError::Unavailable(_)))));
	assert_eq!(coordinator.status().protection.reference_count, 1);
	assert_eq!(coordinator.status().sessions.len(), 1);
	assert_consistent(&coordinator);

	assert!(coordinator.abort(&admin(), Some(&token)).unwrap().is_some());
	assert_eq!(coordinator.engine().calls().cancel, 1);
	assert_consistent(&coordinator);
}

#[test]
fn unauthorized_begin_creates_nothing() {
	let coordinator = coordinator();
	let err = coordinator.begin(&Caller::new("app", Role::Regular), "x", true).unwrap_err();
	assert_eq!(err, BackupError::PermissionDenied { caller: "app".to_string() });
	assert_eq!(coordinator.status().protection, ProtectionState::default());
	assert!(coordinator.status().sessions.is_empty());
	assert_eq!(coordinator.engine().calls(), Default::default());
}

#[test]
fn unauthorized_end_and_abort_leave_session_open() {
	let coordinator = coordinator();
	let token = coordinator.start_backup(&admin(), "x", true).unwrap();
	let app = Caller::new("app", Role::Regular);

	assert!(matches!(coordinator.end(&app, &token), Err(BackupError::PermissionDenied { .. })));
	assert!(matches!(coordinator.abort(&app, Some(&token)), Err(BackupError::PermissionDenied { .. })));
	assert_eq!(coordinator.status().protection.reference_count, 1);
}

#[test]
fn end_with_foreign_token_is_unknown_and_changes_nothing() {
	let coordinator = coordinator();
	coordinator.start_backup(&admin(), "x", true).unwrap();
	let before = coordinator.status();

	assert_eq!(coordinator.end(&admin(), "LABEL: forged\n"), Err(BackupError::UnknownSession));
	assert_eq!(coordinator.status(), before);
	assert_eq!(coordinator.engine().calls().end, 0);
}

#[test]
fn ending_twice_is_unknown_session() {
	let coordinator = coordinator();
	let token = coordinator.start_backup(&admin(), "x", true).unwrap();
	coordinator.stop_backup(&admin(), &token).unwrap();
	assert_eq!(coordinator.stop_backup(&admin(), &token), Err(BackupError::UnknownSession));
}

#[test]
fn engine_refusal_leaves_no_session() {
	let coordinator = BackupCoordinator::new(
		SimulatedEngine::new(SimulatedEngineConfig {
			read_only: true,
			..Default::default()
		}),
		CoordinatorConfig::default(),
	);
	let err = coordinator.begin(&admin(), "x", true).unwrap_err();
	assert_eq!(err, BackupError::EngineUnavailable(EngineError::ReadOnly));
	assert!(coordinator.status().sessions.is_empty());
	assert!(!coordinator.status().protection.active);
}

#[test]
fn failed_end_keeps_session_open_for_retry() {
	let coordinator = coordinator();
	let token = coordinator.start_backup(&admin(), "x", true).unwrap();
	coordinator.engine().fail_next_end(EngineError::Unavailable("archiver busy".into()));

	assert!(matches!(coordinator.end(&admin(), &token), Err(BackupError::EngineUnavailable(_))));
	assert_eq!(coordinator.status().sessions.len(), 1);
	assert_consistent(&coordinator);

	assert!(coordinator.end(&admin(), &token).unwrap().protection_released);
	assert_consistent(&coordinator);
}

#[test]
fn abort_twice_is_a_noop() {
	let coordinator = coordinator();
	let token = coordinator.start_backup(&admin(), "x", true).unwrap();

	let aborted = coordinator.abort(&admin(), Some(&token)).unwrap().unwrap();
	assert_eq!(aborted.state, SessionState::Aborted);
	assert_eq!(coordinator.abort(&admin(), Some(&token)).unwrap(), None);
	assert_eq!(coordinator.engine().calls().cancel, 1);
	assert_eq!(coordinator.stop_backup(&admin(), &token), Err(BackupError::UnknownSession));
	assert_consistent(&coordinator);
}

#[test]
fn abort_with_nothing_open_does_not_reach_engine() {
	let coordinator = coordinator();
	coordinator.abort_backup(&admin(), None).unwrap();
	coordinator.abort_backup(&admin(), Some("never issued")).unwrap();
	assert_eq!(coordinator.engine().calls().cancel, 0);
	assert_consistent(&coordinator);
}

#[test]
fn abort_without_token_takes_newest_session() {
	let coordinator = coordinator();
	let older = coordinator.begin(&admin(), "older", true).unwrap();
	let newer = coordinator.begin(&admin(), "newer", true).unwrap();

	let aborted = coordinator.abort(&admin(), None).unwrap().unwrap();
	assert_eq!(aborted.backup_id, newer.backup_id);
	assert_eq!(coordinator.status().sessions[0].backup_id, older.backup_id);
	assert_eq!(coordinator.engine().calls().cancel, 0);
	assert_consistent(&coordinator);
}

#[test]
fn abort_after_end_of_other_session_releases_protection() {
	let coordinator = coordinator();
	let a = coordinator.start_backup(&admin(), "a", true).unwrap();
	let b = coordinator.start_backup(&admin(), "b", true).unwrap();

	coordinator.stop_backup(&admin(), &a).unwrap();
	coordinator.abort_backup(&admin(), Some(&b)).unwrap();

	assert_eq!(coordinator.engine().calls().cancel, 1);
	assert_eq!(coordinator.engine().calls().end, 0);
	assert_consistent(&coordinator);
}

#[test]
fn protection_can_be_reacquired_after_release() {
	let coordinator = coordinator();
	let first = coordinator.begin(&admin(), "a", true).unwrap();
	coordinator.end(&admin(), &first.token).unwrap();
	let second = coordinator.begin(&admin(), "b", true).unwrap();

	assert!(second.start_position > first.start_position);
	assert_eq!(coordinator.engine().calls().begin, 2);
	assert_eq!(coordinator.engine().calls().overlapping_begins, 0);
}

#[test]
fn invalid_label_is_rejected_before_engine() {
	let coordinator = coordinator();
	assert!(matches!(coordinator.begin(&admin(), "two\nlines", true), Err(BackupError::InvalidLabel(_))));
	assert_eq!(coordinator.engine().calls().begin, 0);
}

#[test]
fn fast_flag_reaches_engine_verbatim() {
	let coordinator = coordinator();
	coordinator.start_backup(&admin(), "spread", false).unwrap();
	assert_eq!(coordinator.engine().calls().last_fast, Some(false));
}

#[test]
fn wait_for_archive_is_passed_through() {
	let coordinator = BackupCoordinator::new(
		SimulatedEngine::default(),
		CoordinatorConfig {
			wait_for_archive: true,
			..Default::default()
		},
	);
	let token = coordinator.start_backup(&admin(), "x", true).unwrap();
	coordinator.stop_backup(&admin(), &token).unwrap();
	assert_eq!(coordinator.engine().calls().last_wait_for_archive, Some(true));
}

#[test]
fn label_file_segment_follows_engine_segment_size() {
	let coordinator = BackupCoordinator::new(
		SimulatedEngine::new(SimulatedEngineConfig {
			insert_position: WalPosition::new(1, 0x0400_0000),
			segment_size: SegmentSize::from_megabytes(64).unwrap(),
			..Default::default()
		}),
		CoordinatorConfig::default(),
	);
	let token = coordinator.start_backup(&admin(), "x", true).unwrap();
	assert!(token.starts_with("START WAL LOCATION: 1/4000000 (file 000000010000000100000001)\n"));
}
