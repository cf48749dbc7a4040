use lms_core::model::{CourseId, CourseProgressUpdate, Stage, UserId};
use lms_core::time::{fixed_clock, fixed_now};
use services::{AppServices, DemoSeed};

const CALLERS: usize = 8;

/// Marks the course finished without going through sync, which would
/// issue the certificate itself.
async fn finish_course(app: &AppServices, learner: UserId, course: CourseId) {
    app.storage()
        .progress
        .merge_course_progress(&CourseProgressUpdate {
            user_id: learner,
            course_id: course,
            current_step: Stage::FinalProject,
            overall_progress: 100,
            time_spent_secs: 0,
            lessons_completed: 0,
            total_lessons: 8,
            completed_at: Some(fixed_now()),
            at: fixed_now(),
        })
        .await
        .unwrap();
}

/// Fires `CALLERS` issuance requests at once and returns every number seen.
async fn race(app: &AppServices, learner: UserId, course: CourseId) -> Vec<String> {
    let handles: Vec<_> = (0..CALLERS)
        .map(|_| {
            let certificates = app.certificates();
            tokio::spawn(async move { certificates.issue(learner, course).await })
        })
        .collect();

    let mut numbers = Vec::with_capacity(CALLERS);
    for handle in handles {
        let outcome = handle.await.unwrap().unwrap();
        numbers.push(outcome.into_certificate().cert_number);
    }
    numbers
}

async fn assert_single_certificate(app: &AppServices, seed: &DemoSeed, numbers: &[String]) {
    assert_eq!(numbers.len(), CALLERS);
    assert!(numbers.iter().all(|n| n == &numbers[0]));
    let mine = app.certificates().list_mine(seed.learner_id).await.unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].cert_number, numbers[0]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_issuance_in_memory_yields_one_row() {
    let app = AppServices::in_memory(fixed_clock());
    let seed = DemoSeed::default();
    app.seed_demo(&seed).await.unwrap();
    finish_course(&app, seed.learner_id, seed.course_id).await;

    let numbers = race(&app, seed.learner_id, seed.course_id).await;
    assert_single_certificate(&app, &seed, &numbers).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_issuance_on_sqlite_yields_one_row() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("race.sqlite3").display());
    let app = AppServices::new_sqlite(&url, fixed_clock()).await.unwrap();
    let seed = DemoSeed::default();
    app.seed_demo(&seed).await.unwrap();
    finish_course(&app, seed.learner_id, seed.course_id).await;

    let numbers = race(&app, seed.learner_id, seed.course_id).await;
    assert_single_certificate(&app, &seed, &numbers).await;
}
