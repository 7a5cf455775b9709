#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::{sync::Arc, time::Duration};

use pretty_assertions::assert_eq;
use tokio::{io::BufReader, sync::broadcast};
use tsq::{Dispatcher, Session, controller::Tsq};
use tsq_storage::{
    CachedQueueStore, DEFAULT_QUEUE_NAME, StorageService, TestQueueMedium,
};

async fn run_session(dispatcher: &Dispatcher, input: &str) -> String {
    let mut output = Vec::new();
    let (_tx, rx) = broadcast::channel(1);

    Session::new(dispatcher, BufReader::new(input.as_bytes()), &mut output)
        .run(rx)
        .await
        .unwrap();

    String::from_utf8(output).unwrap()
}

#[tokio::test]
async fn test_unbound_session_keeps_going() {
    let dispatcher = Dispatcher::new();

    assert_eq!(
        run_session(&dispatcher, "PUT a\nGET 1\n").await,
        " - No service is bound\n - No service is bound\n"
    );
}

#[tokio::test]
async fn test_cached_session_reads_backlog_from_cache() {
    let medium = TestQueueMedium::default();
    medium
        .seed(DEFAULT_QUEUE_NAME, &["from before"])
        .await
        .unwrap();
    let store = CachedQueueStore::new(Arc::new(medium.clone()));

    let mut dispatcher = Dispatcher::new();
    dispatcher.bind(Arc::new(store.clone())).await.unwrap();
    store.wait_for_warm(Duration::from_secs(5)).await.unwrap();

    assert_eq!(
        run_session(&dispatcher, "GET 1\nPUT from now\nGET 2\nGET 3\n").await,
        " - from before\n - Created: 2\n - from now\n \
         - Durable medium failure RESP=26 RESP2=1\n"
    );
    // Only the miss on 3 went to the medium
    assert_eq!(medium.reads(), 1);

    let bound: Arc<dyn StorageService> = Arc::clone(dispatcher.bound().unwrap());
    assert!(dispatcher.unbind(&bound).await.unwrap());
    assert_eq!(store.cache_len(), 0);
}

#[tokio::test]
#[cfg_attr(miri, ignore = "Calls an unsupported method")]
async fn test_file_config_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = format!(
        "Tsq (storage: Queue(medium: File(path: {:?})))",
        dir.path().display().to_string()
    );

    let first = Tsq::parse(&config)
        .unwrap()
        .run_action("PUT kept on disk")
        .await
        .unwrap();
    assert_eq!(first, " - Created: 1");

    let second = Tsq::parse(&config)
        .unwrap()
        .run_action("GET 1")
        .await
        .unwrap();
    assert_eq!(second, " - kept on disk");
}
