// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

#![cfg(target_os = "linux")]

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use pal::backend::hosted::{DmaArena, Hosted};
use pal::{Domain, Error, Pal, Protocol, SocketType, ThreadReturn, Timeout, htonl, ntohl};

const LOOPBACK: SocketAddr = SocketAddr::new(std::net::IpAddr::V4(Ipv4Addr::LOCALHOST), 0);

fn hosted() -> Pal<Hosted> {
    Pal::new(Hosted::new())
}

#[test_log::test]
fn join_returns_the_value() {
    let pal = hosted();

    let mut worker = pal.thread().name("worker").spawn(|| 6 * 7).unwrap();
    assert_eq!(worker.join().unwrap(), ThreadReturn::Value(42));
    assert_eq!(worker.name(), Some("worker"));
    assert_eq!(worker.priority(), pal.default_priority());
    worker.destroy().unwrap();
}

#[test]
fn join_after_the_thread_finished() {
    let pal = hosted();

    let mut worker = pal.thread().spawn(|| "done").unwrap();
    while !worker.is_finished() {
        pal.delay(Duration::from_millis(1));
    }

    assert_eq!(worker.join().unwrap().value(), Some("done"));
}

#[test]
fn second_join_is_rejected() {
    let pal = hosted();

    let mut worker = pal.thread().spawn(|| ()).unwrap();
    worker.join().unwrap();
    assert_eq!(worker.join(), Err(Error::InvalidArgument));
}

#[test]
fn priority_outside_the_range_is_rejected() {
    let pal = hosted();
    assert_eq!(pal.lowest_priority(), 1);
    assert_eq!(pal.highest_priority(), 99);

    for priority in [0, 100] {
        let err = pal.thread().priority(priority).spawn(|| ()).unwrap_err();
        assert_eq!(err, Error::InvalidArgument);
    }

    let mut worker = pal.thread().priority(99).spawn(|| ()).unwrap();
    assert_eq!(worker.priority(), 99);
    worker.join().unwrap();
}

#[test]
fn panicking_thread_has_no_value() {
    let pal = hosted();

    let mut worker = pal
        .thread()
        .spawn(|| -> u32 { panic!("worker gave up") })
        .unwrap();
    assert_eq!(worker.join(), Err(Error::NativeFailure));
}

#[test_log::test]
fn thread_runs_on_a_dma_stack() {
    let arena = DmaArena::new(1 << 20).unwrap();
    let pal = hosted();
    // Safety: `arena` outlives `pal` and the worker is joined below
    unsafe { pal.init(arena.base(), arena.base(), arena.len()) }.unwrap();

    let mut worker = pal
        .thread()
        .stack_size(256 * 1024)
        .dma_stack(true)
        .spawn(|| {
            let local = 0u8;
            (&raw const local).addr()
        })
        .unwrap();

    let stack = worker.stack().unwrap();
    assert!(stack.len() >= 256 * 1024);
    assert!(pal.dma().contains(stack.addr()));

    let sp = worker.join().unwrap().value().unwrap();
    assert!((stack.addr()..stack.end()).contains(&sp));

    worker.destroy().unwrap();
    pal.fin();
}

#[test]
fn dma_stack_needs_an_initialized_region() {
    let pal = hosted();
    let err = pal.thread().dma_stack(true).spawn(|| ()).unwrap_err();
    assert_eq!(err, Error::NotInitialized);
}

#[test]
fn destroy_without_join() {
    let pal = hosted();

    let worker = pal.thread().spawn(|| 1).unwrap();
    while !worker.is_finished() {
        pal.delay(Duration::from_millis(1));
    }
    worker.destroy().unwrap();
}

#[test]
fn destroying_a_running_thread_detaches_it() {
    let pal = hosted();
    let release = Arc::new(AtomicBool::new(false));

    let worker = {
        let release = Arc::clone(&release);
        pal.thread()
            .spawn(move || {
                while !release.load(Ordering::Acquire) {
                    std::thread::sleep(Duration::from_millis(1));
                }
            })
            .unwrap()
    };

    assert!(!worker.is_finished());
    worker.destroy().unwrap();
    release.store(true, Ordering::Release);
}

#[test]
fn destroying_a_running_thread_on_a_dma_stack_waits_for_it() {
    let config: pal_config::Config = "[memory]\ndma-size = 1048576".parse().unwrap();
    let pal = Pal::<Hosted>::from_config(&config).unwrap();
    let done = Arc::new(AtomicBool::new(false));

    let worker = {
        let done = Arc::clone(&done);
        pal.thread()
            .dma_stack(true)
            .spawn(move || {
                std::thread::sleep(Duration::from_millis(20));
                done.store(true, Ordering::Release);
            })
            .unwrap()
    };

    worker.destroy().unwrap();
    assert!(done.load(Ordering::Acquire));
}

#[test]
fn mutex_serializes_workers() {
    let pal = hosted();
    let counter = Arc::new(pal.mutex(0u32).unwrap());

    let mut workers = (0..4)
        .map(|_| {
            let counter = Arc::clone(&counter);
            pal.thread()
                .spawn(move || {
                    for _ in 0..1000 {
                        *counter.lock(Timeout::Infinite).unwrap() += 1;
                    }
                })
                .unwrap()
        })
        .collect::<Vec<_>>();

    for worker in &mut workers {
        worker.join().unwrap();
    }
    assert_eq!(*counter.lock(Timeout::ZERO).unwrap(), 4000);
}

#[test]
fn mutex_lock_times_out() {
    let pal = hosted();
    let mutex = Arc::new(pal.mutex(()).unwrap());
    let guard = mutex.lock(Timeout::Infinite).unwrap();

    let mut contender = {
        let mutex = Arc::clone(&mutex);
        pal.thread()
            .spawn(move || mutex.lock(Timeout::from_millis(20)).map(drop))
            .unwrap()
    };
    let res = contender.join().unwrap().value().unwrap();
    assert_eq!(res, Err(Error::Timeout));

    drop(guard);
    assert!(mutex.try_lock().is_some());
}

#[test]
fn semaphore_handoff() {
    let pal = hosted();
    let sem = Arc::new(pal.semaphore().unwrap());

    assert_eq!(sem.take(Timeout::ZERO), Err(Error::Timeout));

    let mut giver = {
        let sem = Arc::clone(&sem);
        pal.thread()
            .spawn(move || {
                std::thread::sleep(Duration::from_millis(10));
                sem.give()
            })
            .unwrap()
    };

    sem.take(Timeout::Infinite).unwrap();
    assert_eq!(giver.join().unwrap().value(), Some(Ok(())));

    sem.give().unwrap();
    assert_eq!(sem.give(), Err(Error::OutOfRange));
}

#[test_log::test]
fn tcp_loopback() {
    let pal = hosted();

    let listener = pal
        .socket(Domain::Ipv4, SocketType::Stream, Protocol::Tcp)
        .unwrap();
    listener.bind(LOOPBACK).unwrap();
    listener.listen(1).unwrap();
    let addr = listener.local_addr().unwrap();

    let mut client = pal
        .socket(Domain::Ipv4, SocketType::Stream, Protocol::Default)
        .unwrap();
    let mut worker = pal
        .thread()
        .spawn(move || {
            client.connect(addr).unwrap();
            assert_eq!(client.peer_addr(), Some(addr));
            client.send(b"ping").unwrap();

            let mut reply = [0u8; 4];
            let n = client.recv(&mut reply).unwrap();
            assert_eq!(n, 4);
            ntohl(u32::from_ne_bytes(reply))
        })
        .unwrap();

    let conn = listener.accept().unwrap();
    assert!(conn.peer_addr().is_some());

    let mut buf = [0u8; 4];
    assert_eq!(conn.recv(&mut buf).unwrap(), 4);
    assert_eq!(&buf, b"ping");
    conn.send(&htonl(0xdead_beef).to_ne_bytes()).unwrap();

    assert_eq!(worker.join().unwrap().value(), Some(0xdead_beef));
}

#[test]
fn udp_loopback() {
    let pal = hosted();

    let a = pal
        .socket(Domain::Ipv4, SocketType::Datagram, Protocol::Udp)
        .unwrap();
    let b = pal
        .socket(Domain::Ipv4, SocketType::Datagram, Protocol::Udp)
        .unwrap();
    a.bind(LOOPBACK).unwrap();
    b.bind(LOOPBACK).unwrap();

    let b_addr = b.local_addr().unwrap();
    assert_eq!(a.send_to(b"hello", b_addr).unwrap(), 5);

    let mut buf = [0u8; 16];
    let (n, from) = b.recv_from(&mut buf).unwrap();
    assert_eq!(&buf[..n], b"hello");
    assert_eq!(from, a.local_addr().unwrap());
}

#[test]
fn recv_times_out() {
    let pal = Pal::new(Hosted::new().with_recv_timeout(Some(Duration::from_millis(50))));

    let socket = pal
        .socket(Domain::Ipv4, SocketType::Datagram, Protocol::Udp)
        .unwrap();
    socket.bind(LOOPBACK).unwrap();

    let mut buf = [0u8; 8];
    assert_eq!(socket.recv(&mut buf), Err(Error::Timeout));
}

#[test]
fn connect_to_a_closed_port_fails() {
    let pal = hosted();

    // grab a free port, then close it again
    let addr = {
        let scratch = pal
            .socket(Domain::Ipv4, SocketType::Stream, Protocol::Tcp)
            .unwrap();
        scratch.bind(LOOPBACK).unwrap();
        scratch.local_addr().unwrap()
    };

    let mut socket = pal
        .socket(Domain::Ipv4, SocketType::Stream, Protocol::Tcp)
        .unwrap();
    assert_eq!(socket.connect(addr), Err(Error::NativeFailure));
    assert_eq!(socket.peer_addr(), None);
}

#[test]
fn timestamps_are_monotonic() {
    let pal = hosted();

    let before = pal.timestamp();
    pal.delay(Duration::from_millis(5));
    let after = pal.timestamp();

    assert!(after > before);
    assert!(after.saturating_duration_since(before) >= Duration::from_millis(5));
}

#[test]
fn configuration_is_applied() {
    let config: pal_config::Config = r#"
        name = "hosted-smoke"

        [threads]
        default-stack-size = 262144

        [network]
        recv-timeout-ms = 30
    "#
    .parse()
    .unwrap();

    let pal = Pal::new(Hosted::from_config(&config)).with_config(&config);
    assert_eq!(pal.default_stack_size(), 256 * 1024);

    let socket = pal
        .socket(Domain::Ipv4, SocketType::Datagram, Protocol::Udp)
        .unwrap();
    socket.bind(LOOPBACK).unwrap();
    let mut buf = [0u8; 1];
    assert_eq!(socket.recv(&mut buf), Err(Error::Timeout));
}

#[test]
fn configuration_sizes_the_dma_regions() {
    let config: pal_config::Config = r#"
        [memory]
        dma-size = 65536
        secure-dma-size = 8192
    "#
    .parse()
    .unwrap();

    let pal = Pal::<Hosted>::from_config(&config).unwrap();
    assert!(pal.dma().remaining().unwrap() >= 64 * 1024);
    assert!(pal.secure_dma().remaining().unwrap() >= 8 * 1024);

    let buf = pal.alloc_secure_dma(256).unwrap();
    assert!(pal.secure_dma().contains(buf.addr()));
    assert!(!pal.dma().contains(buf.addr()));

    // Safety: the buffer lies in the secure arena owned by `pal`
    unsafe { buf.as_mut_ptr().write_bytes(0x3c, buf.len()) };
    // Safety: written above
    assert_eq!(unsafe { buf.as_mut_ptr().add(255).read() }, 0x3c);
}

#[test]
fn zero_secure_size_leaves_the_secure_region_off() {
    let config = pal_config::Config::default();
    assert_eq!(config.memory.secure_dma_size, 0);

    let pal = Pal::<Hosted>::from_config(&config).unwrap();
    assert!(pal.dma().is_initialized());
    assert!(!pal.secure_dma().is_initialized());
    assert_eq!(pal.alloc_secure_dma(16), Err(Error::NotInitialized));

    let mut worker = pal.thread().dma_stack(true).spawn(|| 5u8).unwrap();
    assert_eq!(worker.join().unwrap().value(), Some(5));
}
