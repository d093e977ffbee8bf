use std::{fs::OpenOptions, io::Write, time::Duration};

use logwatch::{LogReader, ParserConfig, Template, WaitOptions, WatchOptions};
use logwatch_testkit::{expect_log, resilience};

#[tokio::test]
async fn a_harness_waits_truncates_and_waits_again() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sut.log");

    let reader = LogReader::started(path.as_path(), ParserConfig::json(), WatchOptions::default())
        .await
        .unwrap();

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .unwrap();
    writeln!(file, "{{\"phase\": \"warmup\"}}").unwrap();
    file.flush().unwrap();

    let record = expect_log(
        &reader,
        &Template::new().field("phase", "warmup"),
        WaitOptions::default(),
    )
    .await;
    assert_eq!(record.get("phase").unwrap(), "warmup");

    // provoke the SUT: empty its log out from under it, then write again
    resilience::truncate_file(&path).await.unwrap();
    assert_eq!(resilience::file_size(&path).await.unwrap(), 0);
    // let the watcher observe the shrunken size before new content lands
    tokio::time::sleep(Duration::from_millis(300)).await;

    writeln!(file, "{{\"phase\": \"recovered\"}}").unwrap();
    file.flush().unwrap();

    expect_log(
        &reader,
        &Template::new().field("phase", "recovered"),
        WaitOptions::default(),
    )
    .await;
    reader.stop().await;
}

#[tokio::test]
#[should_panic(expected = "no log matched within")]
async fn a_missed_expectation_panics_with_the_observed_records() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sut.log");

    let reader = LogReader::started(path.as_path(), ParserConfig::json(), WatchOptions::default())
        .await
        .unwrap();

    expect_log(
        &reader,
        &Template::new().field("msg", "never written"),
        WaitOptions::default().timeout(Duration::from_millis(200)),
    )
    .await;
}
