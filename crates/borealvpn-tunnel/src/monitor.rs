//! Network path observation
//!
//! A dedicated thread watches the local network path and reports changes
//! while the tunnel runs. The observation context is disjoint from the
//! configuration task queue: handlers are invoked directly on the monitor
//! thread and must treat events as interrupts — handle them quickly and
//! never block on other queues.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// How often the path source is sampled
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Reachability of the current network path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathStatus {
    /// The network is usable
    Satisfied,
    /// The network is not usable
    Unsatisfied,
    /// Usable only after establishing a connection (e.g. VPN-on-demand)
    RequiresConnection,
}

/// One observation of the local network path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkPath {
    /// Whether the path is usable
    pub status: PathStatus,
    /// Names of the available network interfaces, in enumeration order
    pub interfaces: Vec<String>,
}

/// Source of network path observations
pub trait PathSource: Send + 'static {
    /// Sample the current path
    fn current_path(&self) -> NetworkPath;
}

/// Path source backed by the operating system's interface table
pub struct SystemPathSource;

impl PathSource for SystemPathSource {
    fn current_path(&self) -> NetworkPath {
        let mut interfaces: Vec<String> = match get_if_addrs::get_if_addrs() {
            Ok(addrs) => addrs
                .into_iter()
                .filter(|interface| !interface.is_loopback())
                .map(|interface| interface.name)
                .collect(),
            Err(error) => {
                tracing::warn!("Failed to enumerate network interfaces: {}", error);
                Vec::new()
            }
        };
        interfaces.dedup();

        let status = if interfaces.is_empty() {
            PathStatus::Unsatisfied
        } else {
            PathStatus::Satisfied
        };

        NetworkPath { status, interfaces }
    }
}

/// Watches a [`PathSource`] and delivers change events to a handler.
///
/// Cancellation is synchronous: [`PathMonitor::cancel`] joins the thread,
/// guaranteeing no handler invocation races whatever follows the cancel.
pub struct PathMonitor {
    shutdown: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl PathMonitor {
    /// Start observing. `handler` runs on the monitor thread for the
    /// first observation and then on every change.
    pub fn start<S, F>(source: S, handler: F) -> Self
    where
        S: PathSource,
        F: FnMut(&NetworkPath) + Send + 'static,
    {
        Self::start_with_interval(source, POLL_INTERVAL, handler)
    }

    /// Start observing with an explicit sampling interval
    pub fn start_with_interval<S, F>(source: S, interval: Duration, mut handler: F) -> Self
    where
        S: PathSource,
        F: FnMut(&NetworkPath) + Send + 'static,
    {
        let shutdown = Arc::new(AtomicBool::new(false));
        let thread_shutdown = Arc::clone(&shutdown);

        let thread = std::thread::Builder::new()
            .name("network-path-monitor".to_string())
            .spawn(move || {
                let mut last_path: Option<NetworkPath> = None;

                while !thread_shutdown.load(Ordering::Relaxed) {
                    let path = source.current_path();
                    if last_path.as_ref() != Some(&path) {
                        tracing::debug!(
                            "Network path update: {:?} with interfaces {:?}",
                            path.status,
                            path.interfaces
                        );
                        handler(&path);
                        last_path = Some(path);
                    }

                    std::thread::sleep(interval);
                }
            })
            .ok();

        if thread.is_none() {
            tracing::error!("Failed to spawn the network path monitor");
        }

        Self {
            shutdown,
            thread,
        }
    }

    /// Stop observing and wait for the monitor thread to exit
    pub fn cancel(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for PathMonitor {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// A path source that replays a scripted sequence of observations
    struct ScriptedSource {
        paths: Mutex<Vec<NetworkPath>>,
        fallback: NetworkPath,
    }

    impl PathSource for ScriptedSource {
        fn current_path(&self) -> NetworkPath {
            let mut paths = self.paths.lock().unwrap();
            if paths.is_empty() {
                self.fallback.clone()
            } else {
                paths.remove(0)
            }
        }
    }

    fn path(status: PathStatus, interfaces: &[&str]) -> NetworkPath {
        NetworkPath {
            status,
            interfaces: interfaces.iter().map(|name| name.to_string()).collect(),
        }
    }

    #[test]
    fn test_handler_fires_on_change_only() {
        let source = ScriptedSource {
            paths: Mutex::new(vec![
                path(PathStatus::Satisfied, &["en0"]),
                path(PathStatus::Satisfied, &["en0"]),
                path(PathStatus::Satisfied, &["en0", "pdp_ip0"]),
            ]),
            fallback: path(PathStatus::Satisfied, &["en0", "pdp_ip0"]),
        };

        let seen = Arc::new(Mutex::new(Vec::new()));
        let handler_seen = Arc::clone(&seen);

        let mut monitor =
            PathMonitor::start_with_interval(source, Duration::from_millis(5), move |path| {
                handler_seen.lock().unwrap().push(path.clone());
            });

        // Wait until both distinct observations have been delivered.
        for _ in 0..200 {
            if seen.lock().unwrap().len() >= 2 {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        monitor.cancel();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].interfaces, vec!["en0"]);
        assert_eq!(seen[1].interfaces, vec!["en0", "pdp_ip0"]);
    }

    #[test]
    fn test_cancel_is_synchronous() {
        let source = ScriptedSource {
            paths: Mutex::new(Vec::new()),
            fallback: path(PathStatus::Satisfied, &["en0"]),
        };

        let fired = Arc::new(AtomicBool::new(false));
        let handler_fired = Arc::clone(&fired);

        let mut monitor =
            PathMonitor::start_with_interval(source, Duration::from_millis(5), move |_| {
                handler_fired.store(true, Ordering::Relaxed);
            });
        monitor.cancel();

        // After cancel returns the thread is gone; no further events can
        // be delivered.
        fired.store(false, Ordering::Relaxed);
        std::thread::sleep(Duration::from_millis(50));
        assert!(!fired.load(Ordering::Relaxed));
    }

    #[test]
    fn test_system_source_reports_some_path() {
        let path = SystemPathSource.current_path();
        // Whatever the machine looks like, the observation is coherent.
        match path.status {
            PathStatus::Satisfied => assert!(!path.interfaces.is_empty()),
            _ => assert!(path.interfaces.is_empty()),
        }
    }
}
