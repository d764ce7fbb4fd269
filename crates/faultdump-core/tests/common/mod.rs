//! Shared helpers for the integration tests.

#![allow(dead_code)]

use faultdump_host::install_host;
use faultdump_host::sim::SimHost;
use once_cell::sync::OnceCell;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};

/// Install the simulated host once per test binary.
///
/// Thread 0 (`main`) is two frames deep, thread 1 (`worker`) one frame deep.
pub fn host() -> &'static SimHost {
    static HOST: OnceCell<&'static SimHost> = OnceCell::new();

    HOST.get_or_init(|| {
        let host = SimHost::builder()
            .thread(0x1000, |t| {
                t.call("main.py", "<module>", 3)
                    .call("main.py", "serve", 17)
            })
            .thread(0x2000, |t| t.call("worker.py", "run", 8))
            .stderr(std::sync::Arc::new(std::io::stderr()))
            .build()
            .leak();
        install_host(host).expect("host should install once");
        host
    })
}

pub const MAIN_TRACEBACK: &str = "Traceback (most recent call first):\n  \
    File \"main.py\", line 17, in serve\n  \
    File \"main.py\", line 3, in <module>\n";

/// A scratch file and a second handle on it for reading back.
pub fn scratch() -> (File, File) {
    let file = tempfile::tempfile().expect("tempfile should be created");
    let reader = file.try_clone().expect("tempfile should be cloned");
    (file, reader)
}

pub fn read_back(mut file: File) -> String {
    file.seek(SeekFrom::Start(0)).unwrap();
    let mut out = String::new();
    file.read_to_string(&mut out).unwrap();
    out
}
