//! Check-in flow tests over the in-memory store.

mod common;

use chrono::DateTime;

use common::{at_day, at_day_second, memory_service, memory_service_with};
use rollcall::config::Config;
use rollcall::engine::{DayKey, LedgerError};
use rollcall::model::AdjustReason;
use rollcall::service::CheckInReport;

#[tokio::test]
async fn test_first_check_in_starts_streak() {
    let (service, _) = memory_service().await;

    let report = service.check_in("user-1", at_day(300)).await.unwrap();
    assert_eq!(
        report,
        CheckInReport::Completed {
            day: DayKey::from_days(300),
            streak: 1,
            longest_streak: 1,
            points_awarded: 100,
            balance: 100,
        }
    );

    let standing = service.streak("user-1").await.unwrap();
    assert_eq!(standing.current, 1);
    assert_eq!(standing.last_check_in_day, Some(DayKey::from_days(300)));
}

#[tokio::test]
async fn test_second_check_in_same_day_is_flagged() {
    let (service, _) = memory_service().await;

    service.check_in("user-1", at_day(300)).await.unwrap();

    // Later the same local day (17:00 local).
    let report = service
        .check_in("user-1", at_day_second(300, 8 * 3_600))
        .await
        .unwrap();
    assert_eq!(
        report,
        CheckInReport::AlreadyCheckedIn {
            day: DayKey::from_days(300),
            streak: 1,
            longest_streak: 1,
        }
    );

    // No second award.
    assert_eq!(service.balance("user-1").await.unwrap(), 100);
}

#[tokio::test]
async fn test_consecutive_days_extend_streak() {
    let (service, _) = memory_service().await;

    for day in 300..303 {
        service.check_in("user-1", at_day(day)).await.unwrap();
    }

    let standing = service.streak("user-1").await.unwrap();
    assert_eq!(standing.current, 3);
    assert_eq!(standing.longest, 3);
    assert_eq!(service.balance("user-1").await.unwrap(), 300);
}

#[tokio::test]
async fn test_gap_resets_streak_but_keeps_longest() {
    let mut config = Config::for_test();
    config.rewards.base_points = 10;
    let (service, _) = memory_service_with(config).await;

    // Days one and two, skip day three, back on day four.
    for day in [301, 302, 304] {
        let report = service.check_in("user-1", at_day(day)).await.unwrap();
        assert!(matches!(
            report,
            CheckInReport::Completed {
                points_awarded: 10,
                ..
            }
        ));
    }

    assert_eq!(service.balance("user-1").await.unwrap(), 30);
    let standing = service.streak("user-1").await.unwrap();
    assert_eq!(standing.current, 1);
    assert_eq!(standing.longest, 2);

    // Every award is on the audit log under its check-in day.
    let recent = service.recent_activity("user-1", 10).await.unwrap();
    assert_eq!(recent.len(), 3);
    assert!(recent.iter().all(|e| e.reason == AdjustReason::CheckIn));
    assert_eq!(
        recent[0].causation_key.as_deref(),
        Some("checkin:user-1:1970-11-01")
    );
}

#[tokio::test]
async fn test_backdated_instant_rejected() {
    let (service, _) = memory_service().await;

    service.check_in("user-1", at_day(310)).await.unwrap();

    let err = service.check_in("user-1", at_day(309)).await.unwrap_err();
    assert!(matches!(err, LedgerError::InvalidInput(_)));

    // The stored record is untouched.
    let standing = service.streak("user-1").await.unwrap();
    assert_eq!(standing.last_check_in_day, Some(DayKey::from_days(310)));
    assert_eq!(service.balance("user-1").await.unwrap(), 100);
}

#[tokio::test]
async fn test_pre_epoch_instant_rejected() {
    let (service, _) = memory_service().await;

    let before_epoch = DateTime::from_timestamp(-86_400, 0).unwrap();
    let err = service.check_in("user-1", before_epoch).await.unwrap_err();
    assert!(matches!(err, LedgerError::InvalidInput(_)));
}

#[tokio::test]
async fn test_malformed_user_ids_rejected() {
    let (service, _) = memory_service().await;

    let too_long = "x".repeat(65);
    for bad in ["", "has space", "has:colon", too_long.as_str()] {
        let err = service.check_in(bad, at_day(300)).await.unwrap_err();
        assert!(matches!(err, LedgerError::InvalidInput(_)), "id {bad:?}");
    }
}

#[tokio::test]
async fn test_local_day_boundary() {
    let (service, _) = memory_service().await;

    // 23:59:59 and 00:00:00 local time straddle the rollover at 15:00Z.
    service
        .check_in("user-1", at_day_second(300, 53_999))
        .await
        .unwrap();
    let report = service
        .check_in("user-1", at_day_second(300, 54_000))
        .await
        .unwrap();

    match report {
        CheckInReport::Completed { day, streak, .. } => {
            assert_eq!(day, DayKey::from_days(301));
            assert_eq!(streak, 2);
        }
        other => panic!("unexpected report: {other:?}"),
    }
}

#[tokio::test]
async fn test_milestone_bonus_lands_on_streak_day() {
    let mut config = Config::for_test();
    config.rewards.milestones.insert(3, 150);
    let (service, _) = memory_service_with(config).await;

    service.check_in("user-1", at_day(300)).await.unwrap();
    service.check_in("user-1", at_day(301)).await.unwrap();
    let report = service.check_in("user-1", at_day(302)).await.unwrap();

    assert!(matches!(
        report,
        CheckInReport::Completed {
            streak: 3,
            points_awarded: 250,
            balance: 450,
            ..
        }
    ));

    // A broken streak starts the milestone count over.
    service.check_in("user-1", at_day(304)).await.unwrap();
    let standing = service.streak("user-1").await.unwrap();
    assert_eq!(standing.current, 1);
    assert_eq!(service.balance("user-1").await.unwrap(), 550);
}
