use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

use crate::error::ServerError;

struct State<T> {
    items: VecDeque<T>,
    unfinished: usize,
}

/// A blocking, bounded multi-producer/multi-consumer FIFO queue. `maxsize ==
/// 0` means unbounded. All three condition variables share the same mutex as
/// the queue state, matching the classic bounded-buffer design: no item is
/// ever reordered, and `put`/`get` observe strict FIFO order across every
/// producer a single consumer sees.
pub struct WorkQueue<T> {
    state: Mutex<State<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    all_done: Condvar,
    maxsize: usize,
}

impl<T> WorkQueue<T> {
    pub fn new(maxsize: usize) -> Self {
        WorkQueue {
            state: Mutex::new(State {
                items: VecDeque::new(),
                unfinished: 0,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            all_done: Condvar::new(),
            maxsize,
        }
    }

    /// Blocks until there is room, then appends `item` and wakes one waiting
    /// consumer.
    pub fn put(&self, item: T) {
        let mut state = self.state.lock().unwrap();
        while self.maxsize > 0 && state.items.len() >= self.maxsize {
            state = self.not_full.wait(state).unwrap();
        }
        state.items.push_back(item);
        state.unfinished += 1;
        self.not_empty.notify_one();
    }

    /// Blocks until an item is available, then pops and returns it, waking one
    /// waiting producer.
    pub fn get(&self) -> T {
        let mut state = self.state.lock().unwrap();
        while state.items.is_empty() {
            state = self.not_empty.wait(state).unwrap();
        }
        let item = state.items.pop_front().unwrap();
        self.not_full.notify_one();
        item
    }

    /// Marks one previously-`put` item as finished. Once `unfinished` reaches
    /// zero every `join()` waiter is woken. Calling this more times than
    /// `put` is an error.
    pub fn task_done(&self) -> Result<(), ServerError> {
        let mut state = self.state.lock().unwrap();
        if state.unfinished == 0 {
            return Err(ServerError::protocol(
                "task_done() called more times than put()",
            ));
        }
        state.unfinished -= 1;
        if state.unfinished == 0 {
            self.all_done.notify_all();
        }
        Ok(())
    }

    /// Blocks until every `put` item has a matching `task_done`.
    pub fn join(&self) {
        let mut state = self.state.lock().unwrap();
        while state.unfinished > 0 {
            state = self.all_done.wait(state).unwrap();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn fifo_order_single_consumer() {
        let queue = WorkQueue::new(0);
        for i in 0..5 {
            queue.put(i);
        }
        let mut seen = Vec::new();
        for _ in 0..5 {
            seen.push(queue.get());
        }
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn join_waits_for_task_done() {
        let queue = Arc::new(WorkQueue::new(0));
        queue.put(1);
        queue.put(2);

        let worker_queue = queue.clone();
        let handle = thread::spawn(move || {
            worker_queue.get();
            worker_queue.task_done().unwrap();
            worker_queue.get();
            worker_queue.task_done().unwrap();
        });

        queue.join();
        handle.join().unwrap();
    }

    #[test]
    fn task_done_without_put_is_an_error() {
        let queue: WorkQueue<()> = WorkQueue::new(0);
        assert!(queue.task_done().is_err());
    }

    #[test]
    fn put_blocks_when_bounded_queue_is_full() {
        let queue = Arc::new(WorkQueue::new(1));
        queue.put(1);

        let producer_queue = queue.clone();
        let handle = thread::spawn(move || {
            producer_queue.put(2);
        });

        thread::sleep(std::time::Duration::from_millis(50));
        assert_eq!(queue.get(), 1);
        handle.join().unwrap();
        assert_eq!(queue.get(), 2);
    }
}
