use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use platypus_app_core::{AsyncRelayCommand, Command, Execution, RelayCommand};
use tokio::sync::Notify;

fn gated_command(calls: Arc<AtomicUsize>, release: Arc<Notify>) -> AsyncRelayCommand<()> {
    AsyncRelayCommand::new(move |()| {
        let calls = calls.clone();
        let release = release.clone();
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            release.notified().await;
            Ok(())
        }
    })
}

async fn wait_until_running(cmd: &AsyncRelayCommand<()>) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !cmd.is_running() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("command never started");
}

#[tokio::test(flavor = "multi_thread")]
async fn second_invocation_while_running_is_rejected() {
    let calls = Arc::new(AtomicUsize::new(0));
    let release = Arc::new(Notify::new());
    let cmd = gated_command(calls.clone(), release.clone());

    let first = tokio::spawn({
        let cmd = cmd.clone();
        async move { cmd.execute(()).await }
    });
    wait_until_running(&cmd).await;

    assert_eq!(cmd.execute(()).await.unwrap(), Execution::Rejected);
    assert!(!cmd.can_execute(&()));

    release.notify_one();
    assert_eq!(first.await.unwrap().unwrap(), Execution::Ran);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(!cmd.is_running());
}

#[tokio::test(flavor = "multi_thread")]
async fn can_execute_tracks_running_state() {
    let calls = Arc::new(AtomicUsize::new(0));
    let release = Arc::new(Notify::new());
    let cmd = gated_command(calls, release.clone());

    let published = Arc::new(Mutex::new(Vec::new()));
    let sink = published.clone();
    cmd.subscribe_can_execute_changed(Box::new(move |enabled| {
        sink.lock().unwrap().push(enabled);
    }));

    assert!(cmd.can_execute(&()));
    let run = tokio::spawn({
        let cmd = cmd.clone();
        async move { cmd.execute(()).await }
    });
    wait_until_running(&cmd).await;
    assert!(!cmd.can_execute(&()));
    assert!(!cmd.is_enabled());

    release.notify_one();
    run.await.unwrap().unwrap();

    assert!(cmd.can_execute(&()));
    assert!(cmd.is_enabled());
    assert_eq!(*published.lock().unwrap(), vec![false, true]);
}

#[tokio::test]
async fn failure_propagates_and_frees_the_command() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let cmd = AsyncRelayCommand::new(move |attempt: u32| {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            anyhow::ensure!(attempt > 1, "attempt {attempt} failed");
            Ok(())
        }
    });

    let err = cmd.execute(1).await.unwrap_err();
    assert_eq!(err.to_string(), "attempt 1 failed");
    assert!(!cmd.is_running());
    assert!(cmd.can_execute(&2));

    assert_eq!(cmd.execute(2).await.unwrap(), Execution::Ran);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn predicate_gates_async_command() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let cmd = AsyncRelayCommand::with_predicate(
        move |_: Option<String>| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        },
        Option::is_some,
    );

    assert_eq!(cmd.execute(None).await.unwrap(), Execution::Rejected);
    assert_eq!(cmd.execute(Some("x".into())).await.unwrap(), Execution::Ran);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn back_to_back_spawns_run_once() {
    let calls = Arc::new(AtomicUsize::new(0));
    let release = Arc::new(Notify::new());
    let cmd = gated_command(calls.clone(), release.clone());

    let first = cmd.spawn(()).unwrap();
    let second = cmd.spawn(()).unwrap();

    let rt = platypus_app_core::async_runtime::runtime().unwrap();
    assert_eq!(rt.block_on(second).unwrap().unwrap(), Execution::Rejected);
    release.notify_one();
    assert_eq!(rt.block_on(first).unwrap().unwrap(), Execution::Ran);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn dropping_a_running_invocation_clears_the_flag() {
    let calls = Arc::new(AtomicUsize::new(0));
    let release = Arc::new(Notify::new());
    let cmd = gated_command(calls, release);

    let pending = tokio::time::timeout(Duration::from_millis(20), cmd.execute(())).await;
    assert!(pending.is_err());
    assert!(!cmd.is_running());
    assert!(cmd.can_execute(&()));
}

#[test]
fn raising_can_execute_changed_picks_up_external_state() {
    let allowed = Arc::new(AtomicBool::new(false));
    let flag = allowed.clone();
    let ran = Arc::new(AtomicUsize::new(0));
    let counter = ran.clone();
    let cmd = RelayCommand::with_predicate(
        move |()| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        },
        move |_| flag.load(Ordering::SeqCst),
    );

    let published = Arc::new(Mutex::new(Vec::new()));
    let sink = published.clone();
    cmd.subscribe_can_execute_changed(Box::new(move |enabled| {
        sink.lock().unwrap().push(enabled);
    }));

    cmd.raise_can_execute_changed(&());
    assert!(!cmd.can_execute(&()));
    assert!(!cmd.is_enabled());
    assert_eq!(cmd.execute(()).unwrap(), Execution::Rejected);

    allowed.store(true, Ordering::SeqCst);
    // Nothing is tracked automatically.
    assert!(!cmd.is_enabled());
    cmd.raise_can_execute_changed(&());
    assert!(cmd.can_execute(&()));
    assert!(cmd.is_enabled());
    assert_eq!(cmd.execute(()).unwrap(), Execution::Ran);

    assert_eq!(ran.load(Ordering::SeqCst), 1);
    assert_eq!(*published.lock().unwrap(), vec![false, true]);
}
