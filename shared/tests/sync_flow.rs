mod common;

use std::sync::Arc;

use common::{backend_settings, FakeRemote, Shell};
use shared::app::FETCH_FAILED_MESSAGE;
use shared::capabilities::PageRange;
use shared::{DatasetSource, EmptyTablePolicy, Event, FallbackReason, Services};

async fn started(remote: &Arc<FakeRemote>) -> Shell {
    let mut shell = Shell::new(Services {
        remote: remote.clone(),
        ..Services::default()
    });
    shell.start(backend_settings()).await;
    shell
}

#[tokio::test]
async fn test_fetch_all_pages_in_order() {
    let remote = Arc::new(FakeRemote::with_rows(2500));
    let shell = started(&remote).await;

    assert_eq!(
        remote.ranges(),
        vec![
            PageRange { from: 0, to: 999 },
            PageRange { from: 1000, to: 1999 },
            PageRange { from: 2000, to: 2999 },
        ]
    );
    let progress: Vec<u8> = shell.renders().iter().filter_map(|v| v.progress).collect();
    assert!(progress.contains(&40));
    assert!(progress.contains(&80));
    assert!(progress.windows(2).all(|w| w[0] <= w[1]));

    let view = shell.view();
    assert_eq!(view.source, DatasetSource::Remote);
    assert_eq!(view.result_count, 2500);
    assert!(!view.is_loading);
    assert_eq!(view.progress, None);
    assert_eq!(view.connection_label, "Synced 2500 records");
}

#[tokio::test]
async fn test_exact_multiple_of_page_size_stops_on_total() {
    let remote = Arc::new(FakeRemote::with_rows(2000));
    let shell = started(&remote).await;

    assert_eq!(remote.ranges().len(), 2);
    assert_eq!(shell.view().result_count, 2000);
}

#[tokio::test]
async fn test_empty_table_falls_back() {
    let remote = Arc::new(FakeRemote::with_rows(0));
    let shell = started(&remote).await;

    let view = shell.view();
    assert_eq!(view.source, DatasetSource::Fallback(FallbackReason::EmptyRemote));
    assert_eq!(view.result_count, 10);
    assert!(view.results.iter().all(|r| r.is_local));
    assert_eq!(view.toast, None);
}

#[tokio::test]
async fn test_empty_table_shown_empty_when_configured() {
    let remote = Arc::new(FakeRemote::with_rows(0));
    let mut settings = backend_settings();
    settings.empty_table_policy = EmptyTablePolicy::ShowEmpty;
    let mut shell = Shell::new(Services {
        remote: remote.clone(),
        ..Services::default()
    });

    shell.start(settings).await;

    let view = shell.view();
    assert_eq!(view.source, DatasetSource::Remote);
    assert_eq!(view.result_count, 0);
}

#[tokio::test]
async fn test_failed_fetch_uses_bundled_data() {
    let remote = Arc::new(FakeRemote::failing());
    let shell = started(&remote).await;

    let view = shell.view();
    assert_eq!(view.source, DatasetSource::Fallback(FallbackReason::FetchFailed));
    assert_eq!(view.result_count, 10);
    assert_eq!(view.toast.map(|t| t.message).as_deref(), Some(FETCH_FAILED_MESSAGE));
    assert!(!view.is_loading);
}

#[tokio::test]
async fn test_manual_refresh_refetches() {
    let remote = Arc::new(FakeRemote::with_rows(3));
    let mut shell = started(&remote).await;
    shell.dispatch(Event::FetchRequested).await;

    assert_eq!(remote.ranges().len(), 2);
    assert_eq!(shell.view().result_count, 3);
}

#[tokio::test]
async fn test_search_over_synced_rows() {
    let remote = Arc::new(FakeRemote::with_rows(12));
    let mut shell = started(&remote).await;
    shell.dispatch(Event::QueryChanged("model 1".into())).await;

    // MODEL 1, MODEL 10, MODEL 11, MODEL 12
    assert_eq!(shell.view().result_count, 4);

    shell.dispatch(Event::QueryChanged("kss151".into())).await;
    assert_eq!(shell.view().result_count, 12);

    shell.dispatch(Event::QueryCleared).await;
    assert_eq!(shell.view().query, "");
    assert_eq!(shell.view().result_count, 12);
}
