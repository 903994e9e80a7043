mod common;

use common::{init, key};
use futures::StreamExt;
use std::time::Duration;
use waitmap::WaitMap;

#[tokio::test]
async fn test_chan_before_set() {
    init();
    let map: WaitMap<String, String> = WaitMap::new();
    let mut stream = map.chan(key("foo"));

    let waiting = tokio::time::timeout(Duration::from_millis(100), stream.next()).await;
    assert!(waiting.is_err());

    map.set(key("foo"), key("bar"));

    assert_eq!(stream.next().await, Some(key("bar")));
    assert_eq!(stream.next().await, None);
}

#[tokio::test]
async fn test_chan_after_set_is_immediate() {
    init();
    let map = WaitMap::new();
    map.set(key("foo"), key("bar"));

    let mut stream = map.chan(key("foo"));
    let value = tokio::time::timeout(Duration::from_millis(100), stream.recv())
        .await
        .unwrap();
    assert_eq!(value, Some(key("bar")));
    assert_eq!(stream.recv().await, None);
}

#[tokio::test]
async fn test_chan_collects_single_item() {
    init();
    let map = WaitMap::new();
    let stream = map.chan(key("foo"));
    map.set(key("foo"), 42);

    let items: Vec<i32> = stream.collect().await;
    assert_eq!(items, vec![42]);
}

#[tokio::test]
async fn test_chan_select_with_timer() {
    init();
    let map: WaitMap<String, String> = WaitMap::new();

    let setter = {
        let map = map.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            map.set(key("foo"), key("bar"));
        })
    };

    // Re-arm the timer until the value shows up
    let mut stream = map.chan(key("foo"));
    let mut ticks = 0;
    let value = loop {
        tokio::select! {
            value = stream.next() => break value,
            () = tokio::time::sleep(Duration::from_millis(30)) => ticks += 1,
        }
    };

    assert_eq!(value, Some(key("bar")));
    assert!(ticks > 0);
    setter.await.unwrap();
}

#[tokio::test]
async fn test_chan_on_several_keys() {
    init();
    let map: WaitMap<String, i64> = WaitMap::new();
    let mut first = map.chan(key("a"));
    let mut second = map.chan(key("b"));

    map.set(key("b"), 2);
    let value = tokio::select! {
        v = first.next() => v,
        v = second.next() => v,
    };
    assert_eq!(value, Some(2));

    map.set(key("a"), 1);
    assert_eq!(first.next().await, Some(1));
}

#[tokio::test]
async fn test_dropped_chan_does_not_disturb_get() {
    init();
    let map: WaitMap<String, i64> = WaitMap::new();
    drop(map.chan(key("foo")));

    map.set(key("foo"), 1);
    assert_eq!(map.get_async(&key("foo")).await, 1);
}

#[test]
fn test_chan_without_runtime() {
    init();
    let map: WaitMap<String, String> = WaitMap::new();
    let mut stream = map.chan(key("foo"));

    let setter = {
        let map = map.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(100));
            map.set(key("foo"), key("bar"));
        })
    };

    assert_eq!(stream.blocking_recv(), Some(key("bar")));
    assert_eq!(stream.blocking_recv(), None);
    setter.join().unwrap();
}
