use std::sync::Arc;
use std::time::Duration;

use platypus_app_core::OperationRunner;
use platypus_core::{OperationOutcome, OperationStatus};

#[test]
fn acquiring_a_scope_cancels_the_previous_one() {
    let runner = OperationRunner::new();
    let first = runner.acquire_scope();
    let second = runner.acquire_scope();

    assert!(first.is_cancelled());
    assert!(!second.is_cancelled());
    assert_eq!(runner.current_id(), Some(second.id()));
    assert!(!runner.current_token().is_cancelled());
}

#[test]
fn late_release_of_superseded_scope_keeps_replacement() {
    let runner = OperationRunner::new();
    let old = runner.acquire_scope();
    let new = runner.acquire_scope();

    assert!(!runner.release(&old));
    assert!(runner.is_active());
    assert_eq!(runner.current_id(), Some(new.id()));
    assert!(!new.is_cancelled());

    assert!(runner.release(&new));
    assert!(!runner.is_active());
}

#[tokio::test(flavor = "multi_thread")]
async fn cancel_current_ends_the_run_as_cancelled() {
    let runner = Arc::new(OperationRunner::new());

    let task = tokio::spawn({
        let runner = runner.clone();
        async move {
            runner
                .run(|scope| async move {
                    scope.token().cancelled().await;
                    anyhow::bail!("stopped early")
                })
                .await
        }
    });

    tokio::time::timeout(Duration::from_secs(5), async {
        while !runner.is_active() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("operation never started");

    assert!(runner.cancel_current());
    let outcome: OperationOutcome<()> = task.await.unwrap();
    assert!(outcome.is_cancelled());
    assert_eq!(outcome.status(), OperationStatus::Cancelled);
    assert!(!runner.is_active());
}

#[tokio::test]
async fn completed_and_faulted_outcomes() {
    let runner = OperationRunner::new();

    let done = runner.run(|_| async { Ok(41 + 1) }).await;
    assert_eq!(done.completed(), Some(42));

    let failed: OperationOutcome<u32> = runner
        .run(|_| async { anyhow::bail!("disk unplugged") })
        .await;
    assert_eq!(
        failed.status(),
        OperationStatus::Faulted {
            message: "disk unplugged".into()
        }
    );
    assert!(!runner.is_active());
}

#[tokio::test(flavor = "multi_thread")]
async fn starting_a_second_run_cancels_the_first() {
    let runner = Arc::new(OperationRunner::new());

    let first = tokio::spawn({
        let runner = runner.clone();
        async move {
            runner
                .run(|scope| async move {
                    scope.token().cancelled().await;
                    Ok("first")
                })
                .await
        }
    });
    tokio::time::timeout(Duration::from_secs(5), async {
        while !runner.is_active() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("first operation never started");

    let second = runner.run(|_| async { Ok("second") }).await;

    assert!(first.await.unwrap().is_cancelled());
    assert_eq!(second.completed(), Some("second"));
}
