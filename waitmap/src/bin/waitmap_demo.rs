//! WaitMap Demo
//!
//! Readers wait for values that a producer computes later, one reader
//! multiplexes its wait with a timer, and closing the map releases a reader
//! whose key is never set.
//!
//! Run with `RUST_LOG=debug` to see the gate activity.

use futures::StreamExt;
use std::time::Duration;
use waitmap::WaitMap;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let map: WaitMap<String, u64> = WaitMap::with_hint("demo");

    // Readers start before anything is written
    let mut readers = Vec::new();
    for name in ["alpha", "beta", "gamma"] {
        let map = map.clone();
        readers.push(tokio::spawn(async move {
            let value = map.get_async(&name.to_string()).await;
            println!("({name}) got {value}");
        }));
    }

    // A reader on a plain thread
    let thread_reader = {
        let map = map.clone();
        std::thread::spawn(move || map.get(&"alpha".to_string()))
    };

    // A stream reader that gives up waiting after a while, then retries
    let mut stream = map.chan("delta".to_string());
    let stream_task = tokio::spawn(async move {
        loop {
            tokio::select! {
                value = stream.next() => {
                    match value {
                        Some(value) => println!("(delta) got {value}"),
                        None => println!("(delta) stream ended"),
                    }
                    break;
                }
                () = tokio::time::sleep(Duration::from_millis(50)) => {
                    println!("(delta) still waiting");
                }
            }
        }
    });

    // Producer
    let producer = {
        let map = map.clone();
        tokio::spawn(async move {
            for (i, name) in ["alpha", "beta", "gamma", "delta"].iter().enumerate() {
                tokio::time::sleep(Duration::from_millis(40)).await;
                map.set((*name).to_string(), (i as u64 + 1) * 100);
            }
        })
    };

    producer.await?;
    for reader in readers {
        reader.await?;
    }
    stream_task.await?;

    match thread_reader.join() {
        Ok(value) => println!("(thread) got {value}"),
        Err(_) => return Err("thread reader panicked".into()),
    }

    let mut keys = map.keys();
    keys.sort();
    println!("keys: {keys:?}");

    // Nobody ever sets "omega": closing the map releases the reader
    let orphan = {
        let map = map.clone();
        tokio::spawn(async move { map.get_async(&"omega".to_string()).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    map.close();
    println!("(omega) released with {}", orphan.await?);

    println!("closed: {}, {map:?}", map.is_closed());
    Ok(())
}
