use crate::ImageId;
use log::trace;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::task::TaskTracker;

/// Bursts of candidate events for one image collapse into a single
/// invocation no more often than this.
pub const DEBOUNCE_DELAY: Duration = Duration::from_millis(500);

/// Trailing debounce keyed by image identity.
///
/// The last call in a burst wins and resets the delay window. Each identity
/// has its own window, so independent images are never serialized behind one
/// shared timer.
pub struct KeyedDebouncer {
    delay: Duration,
    pending: Arc<Mutex<HashMap<ImageId, u64>>>,
    generation: AtomicU64,
}

impl KeyedDebouncer {
    pub fn new(delay: Duration) -> Self {
        KeyedDebouncer {
            delay,
            pending: Arc::new(Mutex::new(HashMap::new())),
            generation: AtomicU64::new(0),
        }
    }

    /// Schedule `work` to run after the delay window, superseding any earlier
    /// schedule for the same key.
    pub fn call<F>(&self, tasks: &TaskTracker, key: ImageId, work: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        self.pending.lock().unwrap().insert(key.clone(), generation);

        let pending = Arc::clone(&self.pending);
        let delay = self.delay;
        tasks.spawn(async move {
            sleep(delay).await;
            {
                let mut pending = pending.lock().unwrap();
                if pending.get(&key) != Some(&generation) {
                    trace!("debounced call for {key} superseded");
                    return;
                }
                pending.remove(&key);
            }
            work.await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter_work(counter: &Arc<AtomicUsize>) -> impl Future<Output = ()> + Send + 'static {
        let counter = Arc::clone(counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn burst_collapses_to_one_invocation() {
        let debouncer = KeyedDebouncer::new(DEBOUNCE_DELAY);
        let tasks = TaskTracker::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let key = ImageId::from_src("https://e.com/a.png");

        for _ in 0..5 {
            debouncer.call(&tasks, key.clone(), counter_work(&counter));
            sleep(Duration::from_millis(50)).await;
        }

        tasks.close();
        tasks.wait().await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn later_call_resets_the_window() {
        let debouncer = KeyedDebouncer::new(DEBOUNCE_DELAY);
        let tasks = TaskTracker::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let key = ImageId::from_src("https://e.com/a.png");

        debouncer.call(&tasks, key.clone(), counter_work(&counter));
        sleep(Duration::from_millis(400)).await;
        debouncer.call(&tasks, key.clone(), counter_work(&counter));

        // 600ms after the first call the original window has passed but the
        // reset one has not.
        sleep(Duration::from_millis(200)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        sleep(Duration::from_millis(301)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        tasks.close();
        tasks.wait().await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn distinct_keys_fire_independently() {
        let debouncer = KeyedDebouncer::new(DEBOUNCE_DELAY);
        let tasks = TaskTracker::new();
        let counter = Arc::new(AtomicUsize::new(0));

        debouncer.call(
            &tasks,
            ImageId::from_src("https://e.com/a.png"),
            counter_work(&counter),
        );
        debouncer.call(
            &tasks,
            ImageId::from_src("https://e.com/b.png"),
            counter_work(&counter),
        );

        tasks.close();
        tasks.wait().await;
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }
}
