//! Shared fixtures: a live mock server on a random port and a tracing
//! subscriber that writes through the test harness.

#![allow(dead_code)]

use std::sync::mpsc::Receiver;
use std::sync::Once;
use std::time::Duration;

use session_core::{Session, SessionConfig};

pub const WAIT: Duration = Duration::from_secs(10);

static TRACING: Once = Once::new();

pub fn init_tracing() {
    TRACING.call_once(|| {
        tracing_subscriber::fmt().with_test_writer().try_init().ok();
    });
}

/// Start the mock server on its own runtime thread and return its base URL.
pub fn start_server() -> String {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = std_listener.local_addr().unwrap();
    std_listener.set_nonblocking(true).unwrap();

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
            mock_server::run(listener).await
        })
    });

    format!("http://{addr}")
}

pub fn session() -> Session {
    init_tracing();
    Session::with_http1(SessionConfig::default()).unwrap()
}

pub fn session_with(config: SessionConfig) -> Session {
    init_tracing();
    Session::with_http1(config).unwrap()
}

pub fn recv<T>(rx: &Receiver<T>) -> T {
    rx.recv_timeout(WAIT).expect("no terminal notification")
}
