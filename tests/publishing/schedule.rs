//! Time-triggered publishing

use std::time::Duration;

use chrono::{TimeZone, Utc};

use crate::common::*;

#[tokio::test]
async fn due_entries_publish_exactly_once() {
    let t = TestEngine::new();
    t.seed_site().await;
    let at = Utc.with_ymd_and_hms(2030, 1, 1, 9, 0, 0).unwrap();
    let entry = t.engine.schedule().schedule(&addr("pages/p"), at).await.unwrap();
    assert!(t.exists(&addr("pages/p@scheduled")).await);

    let scheduler = t.engine.scheduler();
    let early = at - chrono::Duration::minutes(1);
    assert_eq!(scheduler.run_once(early).await.unwrap(), 0);
    assert!(!t.exists(&addr("pages/p@published")).await);

    assert_eq!(scheduler.run_once(at).await.unwrap(), 1);
    assert!(t.exists(&addr("pages/p@published")).await);
    assert!(!t.exists(&entry).await);
    assert!(!t.exists(&addr("pages/p@scheduled")).await);

    assert_eq!(scheduler.run_once(at).await.unwrap(), 0);
}

#[tokio::test]
async fn unscheduled_pages_stay_unpublished() {
    let t = TestEngine::new();
    t.seed_site().await;
    let at = Utc.with_ymd_and_hms(2030, 1, 1, 9, 0, 0).unwrap();
    let schedule = t.engine.schedule();
    let entry = schedule.schedule(&addr("pages/p"), at).await.unwrap();

    let removed = schedule.unschedule(&entry).await.unwrap();
    assert_eq!(removed.publish, addr("pages/p"));
    assert_eq!(removed.due_at(), Some(at));
    assert!(!t.exists(&addr("pages/p@scheduled")).await);

    assert_eq!(t.engine.scheduler().run_once(at).await.unwrap(), 0);
    assert!(!t.exists(&addr("pages/p@published")).await);
    assert!(schedule.unschedule(&entry).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn failed_publish_consumes_the_entry() {
    let t = TestEngine::new();
    t.seed(&[(addr("pages/broken"), json!({"layout": addr("layouts/missing")}))])
        .await;
    let at = Utc.with_ymd_and_hms(2030, 1, 1, 9, 0, 0).unwrap();
    t.engine
        .schedule()
        .schedule(&addr("pages/broken"), at)
        .await
        .unwrap();

    let scheduler = t.engine.scheduler();
    assert_eq!(scheduler.run_once(at).await.unwrap(), 0);
    assert!(t.engine.schedule().list(SITE).await.unwrap().is_empty());
}

#[tokio::test]
async fn background_loop_publishes_and_stops() {
    let t = TestEngine::new();
    t.seed_site().await;
    t.engine
        .schedule()
        .schedule(&addr("pages/p"), Utc::now() - chrono::Duration::seconds(1))
        .await
        .unwrap();

    let scheduler = trellis::Scheduler::new(t.engine.clone(), Duration::from_millis(10));
    let handle = scheduler.start();

    let mut published = false;
    for _ in 0..100 {
        if t.exists(&addr("pages/p@published")).await {
            published = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(published);

    scheduler.shutdown();
    assert!(scheduler.is_shutdown());
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .unwrap()
        .unwrap();
}
