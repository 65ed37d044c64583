// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::sync::OnceLock;
use std::time::{Duration, Instant};

use pal::backend::no_os::NoOs;
use pal::{Domain, Error, Pal, Protocol, SocketType, ThreadReturn, Timeout};

fn ticks() -> Duration {
    static RESET: OnceLock<Instant> = OnceLock::new();
    RESET.get_or_init(Instant::now).elapsed()
}

fn no_os() -> Pal<NoOs> {
    Pal::new(NoOs::new(ticks))
}

#[test_log::test]
fn threads_run_to_completion_on_spawn() {
    let pal = no_os();

    let mut worker = pal.thread().name("inline").spawn(|| 7u64.pow(2)).unwrap();
    assert!(worker.is_finished());
    assert_eq!(worker.join().unwrap(), ThreadReturn::Value(49));
    assert_eq!(worker.join(), Err(Error::InvalidArgument));
}

#[test]
fn only_a_single_priority_exists() {
    let pal = no_os();
    assert_eq!(pal.lowest_priority(), 0);
    assert_eq!(pal.highest_priority(), 0);

    assert_eq!(
        pal.thread().priority(1).spawn(|| ()).unwrap_err(),
        Error::InvalidArgument
    );
}

#[test]
fn dma_stack_is_allocated_and_released() {
    let mut mem = vec![0u8; 0x2_0000];
    let pal = no_os();
    let base = mem.as_mut_ptr().expose_provenance();
    // Safety: `mem` outlives `pal` and the inline worker
    unsafe { pal.init(base, base, mem.len()) }.unwrap();

    let worker = pal.thread().dma_stack(true).spawn(|| ()).unwrap();
    let stack = worker.stack().unwrap();
    assert!(pal.dma().contains(stack.addr()));
    worker.destroy().unwrap();
}

#[test]
fn oversized_dma_stack_is_rejected() {
    let mut mem = vec![0u8; 0x2_0000];
    let pal = no_os();
    let base = mem.as_mut_ptr().expose_provenance();
    // Safety: `mem` outlives `pal`
    unsafe { pal.init(base, base, mem.len()) }.unwrap();

    let err = pal
        .thread()
        .stack_size(usize::MAX - 4)
        .dma_stack(true)
        .spawn(|| ())
        .unwrap_err();
    assert_eq!(err, Error::InvalidArgument);
    assert_eq!(pal.dma().cursor().unwrap(), base);
}

#[test]
fn mutex_is_not_reentrant() {
    let pal = no_os();
    let mutex = pal.mutex(5u32).unwrap();

    let guard = mutex.lock(Timeout::Infinite).unwrap();
    assert_eq!(*guard, 5);

    let start = Instant::now();
    assert_eq!(mutex.lock(Timeout::from_millis(10)).unwrap_err(), Error::Timeout);
    assert!(start.elapsed() >= Duration::from_millis(10));

    drop(guard);
    assert!(mutex.try_lock().is_some());
}

#[test]
fn semaphore_polls_against_the_tick_source() {
    let pal = no_os();
    let sem = pal.semaphore().unwrap();

    assert_eq!(sem.take(Timeout::from_millis(5)), Err(Error::Timeout));
    sem.give().unwrap();
    assert_eq!(sem.give(), Err(Error::OutOfRange));
    sem.take(Timeout::Infinite).unwrap();
}

#[test]
fn there_is_no_network() {
    let pal = no_os();
    let err = pal
        .socket(Domain::Ipv4, SocketType::Stream, Protocol::Tcp)
        .unwrap_err();
    assert_eq!(err, Error::NativeFailure);
}

#[test]
fn delay_busy_waits() {
    let pal = no_os();

    let before = pal.timestamp();
    pal.delay(Duration::from_millis(3));
    assert!(pal.timestamp().saturating_duration_since(before) >= Duration::from_millis(3));
}
