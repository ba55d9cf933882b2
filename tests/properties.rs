//! Property-style checks of delivery order, lifetime safety, queue FIFO
//! behavior, and quit semantics.

use std::io::Write;
use std::os::fd::AsRawFd;
use std::os::unix::net::UnixStream;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;

use veille::app::Application;
use veille::app::Runtime;
use veille::app::RuntimeConfig;
use veille::types::Anchor;
use veille::types::EventFlags;
use veille::types::Signal;

fn runtime() -> Arc<Runtime> {
  Runtime::with_config(RuntimeConfig::default().process_events(false))
}

#[test]
fn delivery_follows_subscription_order() {
  let runtime: Arc<Runtime> = runtime();
  let signal: Signal<()> = Signal::new();
  let log: Arc<Mutex<Vec<usize>>> = Arc::new(Mutex::new(Vec::new()));

  for index in 0..5 {
    let log: Arc<Mutex<Vec<usize>>> = Arc::clone(&log);
    signal.connect_fn(move |_runtime, ()| log.lock().unwrap().push(index));
  }

  signal.emit(&runtime, ());
  runtime.quit(0);

  assert_eq!(Application::new(Arc::clone(&runtime)).exec(), 0);
  assert_eq!(log.lock().unwrap().as_slice(), &[0, 1, 2, 3, 4]);
}

#[test]
fn emits_interleave_at_whole_signal_granularity() {
  let runtime: Arc<Runtime> = runtime();
  let first: Signal<()> = Signal::new();
  let second: Signal<()> = Signal::new();
  let log: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

  for _ in 0..3 {
    let log: Arc<Mutex<Vec<&'static str>>> = Arc::clone(&log);
    first.connect_fn(move |_runtime, ()| log.lock().unwrap().push("first"));
  }
  for _ in 0..3 {
    let log: Arc<Mutex<Vec<&'static str>>> = Arc::clone(&log);
    second.connect_fn(move |_runtime, ()| log.lock().unwrap().push("second"));
  }

  first.emit(&runtime, ());
  second.emit(&runtime, ());
  runtime.quit(0);

  assert_eq!(Application::new(Arc::clone(&runtime)).exec(), 0);
  assert_eq!(
    log.lock().unwrap().as_slice(),
    &["first", "first", "first", "second", "second", "second"],
  );
}

#[test]
fn reentrant_emit_appends_after_current_entries() {
  let runtime: Arc<Runtime> = runtime();
  let signal: Signal<()> = Signal::new();
  let log: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
  let reemitted: Arc<AtomicBool> = Arc::new(AtomicBool::new(false));

  {
    let log: Arc<Mutex<Vec<&'static str>>> = Arc::clone(&log);
    let signal: Signal<()> = signal.clone();
    let reemitted: Arc<AtomicBool> = Arc::clone(&reemitted);

    signal.clone().connect_fn(move |runtime, ()| {
      log.lock().unwrap().push("a");

      if !reemitted.swap(true, Ordering::SeqCst) {
        signal.emit(runtime, ());
      }
    });
  }
  {
    let log: Arc<Mutex<Vec<&'static str>>> = Arc::clone(&log);

    signal.connect_fn(move |runtime, ()| {
      let mut log = log.lock().unwrap();

      log.push("b");

      // Quit on the second round, after the re-emitted entries ran.
      if log.iter().filter(|entry| **entry == "b").count() == 2 {
        runtime.quit(0);
      }
    });
  }

  signal.emit(&runtime, ());

  assert_eq!(Application::new(Arc::clone(&runtime)).exec(), 0);
  // The drain finishes the original entries before the appended ones.
  assert_eq!(log.lock().unwrap().as_slice(), &["a", "b", "a", "b"]);
}

#[test]
fn released_owner_skips_pending_delivery() {
  let runtime: Arc<Runtime> = runtime();
  let signal: Signal<()> = Signal::new();
  let hits: Arc<AtomicUsize> = Arc::new(AtomicUsize::new(0));

  let owner: Anchor = runtime.anchor();

  {
    let hits: Arc<AtomicUsize> = Arc::clone(&hits);
    signal.connect(&owner, move |_runtime, ()| {
      hits.fetch_add(1, Ordering::SeqCst);
    });
  }

  // Both deliveries are still pending in the queue when the owner dies.
  signal.emit(&runtime, ());
  signal.emit(&runtime, ());

  drop(owner);
  runtime.quit(0);

  assert_eq!(Application::new(Arc::clone(&runtime)).exec(), 0);
  assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[test]
fn released_owner_skips_descriptor_delivery() {
  let runtime: Arc<Runtime> = runtime();
  let (mut writer, reader): (UnixStream, UnixStream) = UnixStream::pair().unwrap();
  let hits: Arc<AtomicUsize> = Arc::new(AtomicUsize::new(0));

  let owner: Anchor = runtime.anchor();

  {
    let hits: Arc<AtomicUsize> = Arc::clone(&hits);

    runtime
      .connect_fd(reader.as_raw_fd(), EventFlags::READABLE, Some(&owner), move |_runtime, _fd, _flags| {
        hits.fetch_add(1, Ordering::SeqCst);
      })
      .unwrap();
  }

  writer.write_all(b"x").unwrap();
  drop(owner);

  runtime.start_timer(Duration::from_millis(100), None, None, |runtime| runtime.quit(0));

  assert_eq!(Application::new(Arc::clone(&runtime)).exec(), 0);
  assert_eq!(hits.load(Ordering::SeqCst), 0);

  drop((writer, reader));
}

#[test]
fn queue_is_fifo_for_a_single_producer() {
  let runtime: Arc<Runtime> = runtime();
  let log: Arc<Mutex<Vec<usize>>> = Arc::new(Mutex::new(Vec::new()));

  for index in 0..10 {
    let log: Arc<Mutex<Vec<usize>>> = Arc::clone(&log);
    runtime.enqueue(move |_runtime| log.lock().unwrap().push(index));
  }

  runtime.quit(0);

  assert_eq!(Application::new(Arc::clone(&runtime)).exec(), 0);
  assert_eq!(log.lock().unwrap().as_slice(), &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9]);
}

#[test]
fn queue_preserves_per_producer_order() {
  let runtime: Arc<Runtime> = runtime();
  let log: Arc<Mutex<Vec<(usize, usize)>>> = Arc::new(Mutex::new(Vec::new()));

  let producers: Vec<thread::JoinHandle<()>> = (0..4)
    .map(|producer| {
      let runtime: Arc<Runtime> = Arc::clone(&runtime);
      let log: Arc<Mutex<Vec<(usize, usize)>>> = Arc::clone(&log);

      thread::spawn(move || {
        for sequence in 0..50 {
          let log: Arc<Mutex<Vec<(usize, usize)>>> = Arc::clone(&log);
          runtime.enqueue(move |_runtime| log.lock().unwrap().push((producer, sequence)));
        }
      })
    })
    .collect();

  for producer in producers {
    producer.join().unwrap();
  }

  runtime.quit(0);

  assert_eq!(Application::new(Arc::clone(&runtime)).exec(), 0);

  let log = log.lock().unwrap();

  assert_eq!(log.len(), 200);

  for producer in 0..4 {
    let sequences: Vec<usize> = log
      .iter()
      .filter(|(who, _)| *who == producer)
      .map(|(_, sequence)| *sequence)
      .collect();

    assert_eq!(sequences, (0..50).collect::<Vec<usize>>(), "producer {producer}");
  }
}

#[test]
fn first_quit_wins_and_loop_terminates() {
  let runtime: Arc<Runtime> = runtime();

  runtime.quit(5);
  runtime.quit(9);

  assert_eq!(Application::new(Arc::clone(&runtime)).exec(), 5);
}

#[test]
fn quit_from_another_thread_wakes_a_blocked_loop() {
  let runtime: Arc<Runtime> = runtime();

  let waiter: thread::JoinHandle<i32> = {
    let runtime: Arc<Runtime> = Arc::clone(&runtime);

    thread::spawn(move || Application::new(runtime).exec())
  };

  // No watches and no timers: the loop is parked in the wait primitive.
  thread::sleep(Duration::from_millis(50));
  runtime.quit(7);

  assert_eq!(waiter.join().unwrap(), 7);
}

#[test]
fn panicking_subscriber_does_not_stop_dispatch() {
  let runtime: Arc<Runtime> = runtime();
  let signal: Signal<()> = Signal::new();
  let hits: Arc<AtomicUsize> = Arc::new(AtomicUsize::new(0));

  signal.connect_fn(|_runtime, ()| panic!("misbehaving subscriber"));

  {
    let hits: Arc<AtomicUsize> = Arc::clone(&hits);
    signal.connect_fn(move |_runtime, ()| {
      hits.fetch_add(1, Ordering::SeqCst);
    });
  }

  signal.emit(&runtime, ());
  runtime.quit(0);

  assert_eq!(Application::new(Arc::clone(&runtime)).exec(), 0);
  assert_eq!(hits.load(Ordering::SeqCst), 1);
}
