//! User-signal registration, exercised with real signal deliveries.

mod common;

use faultdump_core::disposition::current;
use faultdump_core::traceback::THREAD_ID_WIDTH;
use faultdump_core::{register, registered_signals, unregister};
use faultdump_host::FileRef;
use faultdump_host::sim::SimHost;
use nix::sys::signal::{Signal, raise};
use serial_test::serial;
use std::sync::Arc;

#[test]
#[serial]
fn test_signal_dumps_current_thread() {
    let host = common::host();
    host.bind_current_thread(0);
    let before = current(libc::SIGUSR1).unwrap().handler_address();
    let (file, out) = common::scratch();

    register(libc::SIGUSR1, Some(Arc::new(file)), false).unwrap();
    assert_eq!(registered_signals(), vec![libc::SIGUSR1]);
    raise(Signal::SIGUSR1).unwrap();
    raise(Signal::SIGUSR1).unwrap();

    assert!(unregister(libc::SIGUSR1));
    assert!(!unregister(libc::SIGUSR1));
    assert_eq!(current(libc::SIGUSR1).unwrap().handler_address(), before);
    assert!(registered_signals().is_empty());
    assert_eq!(common::read_back(out), common::MAIN_TRACEBACK.repeat(2));
}

#[test]
#[serial]
fn test_signal_dumps_all_threads() {
    let host = common::host();
    host.bind_current_thread(1);
    let (file, out) = common::scratch();

    register(libc::SIGUSR2, Some(Arc::new(file)), true).unwrap();
    raise(Signal::SIGUSR2).unwrap();
    assert!(unregister(libc::SIGUSR2));

    let expected = format!(
        "Thread 0x{:0w$x}:\n  \
         File \"main.py\", line 17, in serve\n  \
         File \"main.py\", line 3, in <module>\n\
         \n\
         Current thread 0x{:0w$x}:\n  \
         File \"worker.py\", line 8, in run\n",
        0x1000,
        0x2000,
        w = THREAD_ID_WIDTH
    );
    assert_eq!(common::read_back(out), expected);
}

#[test]
#[serial]
fn test_register_again_replaces_file_and_scope() {
    let host = common::host();
    host.bind_current_thread(0);
    let before = current(libc::SIGUSR1).unwrap().handler_address();
    let (first, first_out) = common::scratch();
    let (second, second_out) = common::scratch();
    let first: FileRef = Arc::new(first);

    register(libc::SIGUSR1, Some(first.clone()), true).unwrap();
    register(libc::SIGUSR1, Some(Arc::new(second)), false).unwrap();
    assert_eq!(Arc::strong_count(&first), 1);
    assert_eq!(registered_signals(), vec![libc::SIGUSR1]);

    raise(Signal::SIGUSR1).unwrap();
    assert!(unregister(libc::SIGUSR1));
    assert_eq!(current(libc::SIGUSR1).unwrap().handler_address(), before);

    assert_eq!(common::read_back(first_out), "");
    assert_eq!(common::read_back(second_out), common::MAIN_TRACEBACK);
}

#[test]
#[serial]
fn test_unregister_restores_ignored_disposition() {
    let host = common::host();
    host.bind_current_thread(0);
    let (file, out) = common::scratch();

    let ignored = unsafe { libc::signal(libc::SIGUSR1, libc::SIG_IGN) };
    register(libc::SIGUSR1, Some(Arc::new(file)), false).unwrap();
    assert!(unregister(libc::SIGUSR1));
    assert_eq!(current(libc::SIGUSR1).unwrap().handler_address(), libc::SIG_IGN);

    // Ignored again: the process survives and nothing is written.
    raise(Signal::SIGUSR1).unwrap();
    assert_eq!(common::read_back(out), "");
    unsafe { libc::signal(libc::SIGUSR1, ignored) };
}

#[test]
#[serial]
fn test_signal_on_unbound_thread_writes_nothing() {
    common::host();
    SimHost::unbind_current_thread();
    let (file, out) = common::scratch();

    register(libc::SIGUSR2, Some(Arc::new(file)), false).unwrap();
    raise(Signal::SIGUSR2).unwrap();
    assert!(unregister(libc::SIGUSR2));
    assert_eq!(common::read_back(out), "");
}

#[test]
#[serial]
fn test_uncatchable_signal_is_an_install_error() {
    common::host();
    let (file, _) = common::scratch();
    let file: FileRef = Arc::new(file);

    let err = register(libc::SIGKILL, Some(file.clone()), false).unwrap_err();
    assert!(err.to_string().starts_with("unable to install the handler of signal 9"));
    assert!(registered_signals().is_empty());
    assert_eq!(Arc::strong_count(&file), 1);
}
