use std::time::{Duration, Instant};

use regex::Regex;
use tokio::{io::AsyncWriteExt, sync::broadcast, time};

use logwatch::{LogSource, ParserConfig, WatchError, WatchEvent, WatchOptions, Watcher};

async fn next_event(events: &mut broadcast::Receiver<WatchEvent>) -> WatchEvent {
    time::timeout(Duration::from_secs(3), events.recv())
        .await
        .expect("no event within 3s")
        .expect("event stream closed")
}

#[tokio::test]
async fn stream_chunks_are_reassembled_into_records() {
    let (mut writer, read_half) = tokio::io::duplex(256);
    let watcher = Watcher::new(
        LogSource::stream(read_half),
        ParserConfig::json(),
        WatchOptions::default(),
    )
    .unwrap();
    let mut events = watcher.subscribe();
    watcher.start().await.unwrap();

    // a complete record plus the head of the next one in a single write
    writer
        .write_all(b"{\"seq\": 1}\n{\"seq\"")
        .await
        .unwrap();
    let WatchEvent::Log(record) = next_event(&mut events).await else {
        panic!("expected the first record");
    };
    assert_eq!(record.get("seq").unwrap(), 1);

    writer.write_all(b": 2}\n").await.unwrap();
    let WatchEvent::Log(record) = next_event(&mut events).await else {
        panic!("expected the second record");
    };
    assert_eq!(record.get("seq").unwrap(), 2);

    watcher.stop().await;
}

#[tokio::test]
async fn end_of_stream_flushes_the_retained_record_immediately() {
    let (mut writer, read_half) = tokio::io::duplex(256);
    let config = ParserConfig::pattern(Regex::new(r"^msg=(.+)$").unwrap(), ["msg"]);
    let watcher = Watcher::new(
        LogSource::stream(read_half),
        config,
        WatchOptions::default(),
    )
    .unwrap();
    let mut events = watcher.subscribe();
    watcher.start().await.unwrap();

    writer.write_all(b"msg=last words\n").await.unwrap();
    writer.shutdown().await.unwrap();
    let closed_at = Instant::now();
    drop(writer);

    let WatchEvent::Log(record) = next_event(&mut events).await else {
        panic!("expected the retained record");
    };
    // EOF releases retention without waiting out the 300ms deadline
    assert!(closed_at.elapsed() < Duration::from_millis(250));
    assert_eq!(record.get("msg").unwrap(), "last words");

    watcher.stop().await;
}

#[tokio::test]
async fn clean_stream_eof_produces_no_notifications() {
    let (writer, read_half) = tokio::io::duplex(256);
    let watcher = Watcher::new(
        LogSource::stream(read_half),
        ParserConfig::json(),
        WatchOptions::default(),
    )
    .unwrap();
    let mut events = watcher.subscribe();
    watcher.start().await.unwrap();

    // dropping the write half is a clean EOF, not an error
    drop(writer);
    if let Ok(event) = time::timeout(Duration::from_millis(300), events.recv()).await {
        panic!("clean EOF must not produce notifications, got {event:?}");
    }
    watcher.stop().await;
}

#[tokio::test]
async fn a_stream_cannot_be_consumed_twice() {
    let (_writer, read_half) = tokio::io::duplex(256);
    let watcher = Watcher::new(
        LogSource::stream(read_half),
        ParserConfig::json(),
        WatchOptions::default(),
    )
    .unwrap();
    watcher.start().await.unwrap();
    watcher.stop().await;

    let err = watcher.start().await.expect_err("the stream is exhausted");
    assert!(matches!(err, WatchError::SourceExhausted));
}
