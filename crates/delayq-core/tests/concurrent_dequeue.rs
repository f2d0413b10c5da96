use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use delayq_core::{DelayQueue, EmbeddedStore, ManualClock};

const PRODUCERS: usize = 4;
const PER_PRODUCER: usize = 250;
const CONSUMERS: usize = 8;

fn shared_store() -> (Arc<EmbeddedStore>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::starting_now());
    let store = Arc::new(EmbeddedStore::with_clock(clock.clone()).unwrap());
    (store, clock)
}

/// Independent clients racing on one queue never see the same message twice,
/// and together they see every message.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_consumers_receive_each_message_once() {
    let (store, _clock) = shared_store();

    let mut producers = Vec::new();
    for p in 0..PRODUCERS {
        let queue = DelayQueue::new(Arc::clone(&store));
        producers.push(tokio::spawn(async move {
            for i in 0..PER_PRODUCER {
                queue
                    .enqueue("jobs", format!("{p}-{i}").as_bytes(), 0)
                    .await
                    .unwrap();
            }
        }));
    }
    for producer in producers {
        producer.await.unwrap();
    }

    let mut consumers = Vec::new();
    for _ in 0..CONSUMERS {
        let queue = DelayQueue::new(Arc::clone(&store));
        consumers.push(tokio::spawn(async move {
            let mut seen = Vec::new();
            loop {
                let batch = queue.dequeue("jobs", 7).await.unwrap();
                if batch.is_empty() {
                    break;
                }
                seen.extend(batch);
            }
            seen
        }));
    }

    let mut all = Vec::new();
    for consumer in consumers {
        all.extend(consumer.await.unwrap());
    }

    let unique: HashSet<_> = all.iter().cloned().collect();
    assert_eq!(all.len(), PRODUCERS * PER_PRODUCER, "duplicate delivery");
    assert_eq!(unique.len(), PRODUCERS * PER_PRODUCER);
}

/// Messages become visible only once the store's clock reaches their due
/// time, regardless of how many clients poll.
#[tokio::test]
async fn visibility_follows_the_store_clock() {
    let (store, clock) = shared_store();
    let producer = DelayQueue::new(Arc::clone(&store));
    let consumer = DelayQueue::new(Arc::clone(&store));

    producer.enqueue("q", b"a", 1_000).await.unwrap();
    producer.enqueue("q", b"b", 2_000).await.unwrap();

    assert!(consumer.dequeue("q", 0).await.unwrap().is_empty());

    clock.advance(Duration::from_millis(1_000));
    assert_eq!(consumer.dequeue("q", 0).await.unwrap(), vec![b"a".to_vec()]);

    clock.advance(Duration::from_millis(999));
    assert!(consumer.dequeue("q", 0).await.unwrap().is_empty());

    clock.advance(Duration::from_millis(1));
    assert_eq!(consumer.dequeue("q", 0).await.unwrap(), vec![b"b".to_vec()]);
}

/// Each client owns its script cache; one client reloading after a flush
/// does not disturb the other.
#[tokio::test]
async fn clients_recover_from_flush_independently() {
    let (store, _clock) = shared_store();
    let a = DelayQueue::new(Arc::clone(&store));
    let b = DelayQueue::new(Arc::clone(&store));

    a.enqueue("q", b"1", 0).await.unwrap();
    b.enqueue("q", b"2", 0).await.unwrap();

    store.flush_scripts();

    a.enqueue("q", b"3", 0).await.unwrap();
    b.enqueue("q", b"4", 0).await.unwrap();

    assert_eq!(a.script_cache().reloads(), 1);
    assert_eq!(b.script_cache().reloads(), 1);
    assert_eq!(a.pending("q").await.unwrap(), 4);
}
