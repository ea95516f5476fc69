//! copy-on-write publication of state read by the audio callback
//!
//! The audio thread reads an [`ArcSwap`] with `load()`, which never blocks.
//! Control threads build a complete replacement and call [`publish`], which
//! swaps it in and then waits until no callback still holds the old value.
//! When `publish` returns the old value is owned solely by the caller, so it is
//! both safe to dispose of and guaranteed to be freed off the audio thread.
use arc_swap::ArcSwap;
use log::warn;
use std::{sync::Arc, thread, time::Duration};

// polling interval while an audio callback still holds the old value
const RELEASE_POLL: Duration = Duration::from_micros(50);
// a callback is expected to finish well within this many polls
const SLOW_RELEASE_POLLS: u32 = 20_000;

/// swap `next` in and block until the previous value is no longer referenced
/// by any reader, then hand it back
pub fn publish<T>(cell: &ArcSwap<T>, next: T) -> T {
    // swap settles outstanding reader guards into real references, so the
    // strong count of `old` accounts for every callback still using it
    let old = cell.swap(Arc::new(next));
    wait_for_release(old)
}

/// block until `value` is the last reference, then unwrap it
pub fn wait_for_release<T>(mut value: Arc<T>) -> T {
    let mut polls: u32 = 0;
    loop {
        match Arc::try_unwrap(value) {
            Ok(v) => return v,
            Err(shared) => {
                value = shared;
                polls += 1;
                if polls == SLOW_RELEASE_POLLS {
                    warn!("rt_swap: audio callback still holds a retired snapshot after {} polls", polls);
                }
                thread::sleep(RELEASE_POLL);
            }
        }
    }
}

#[cfg(test)]
mod test_rt_swap {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn publish_returns_old_value() {
        let cell = ArcSwap::from_pointee(vec![1, 2, 3]);
        let old = publish(&cell, vec![4]);
        assert_eq!(old, vec![1, 2, 3]);
        assert_eq!(*cell.load_full(), vec![4]);
    }

    #[test]
    fn publish_waits_for_reader() {
        let cell = Arc::new(ArcSwap::from_pointee(String::from("first")));
        let (held_tx, held_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let reader_cell = cell.clone();
        let reader = thread::spawn(move || {
            let guard = reader_cell.load();
            held_tx.send(()).unwrap();
            release_rx.recv().unwrap();
            let seen = guard.to_string();
            drop(guard);
            seen
        });
        held_rx.recv().unwrap();
        let releaser = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            release_tx.send(()).unwrap();
        });
        // blocks until the reader drops its guard
        let old = publish(&cell, String::from("second"));
        assert_eq!(old, "first");
        assert_eq!(reader.join().unwrap(), "first");
        releaser.join().unwrap();
    }
}
