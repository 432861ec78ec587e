//! NAT traversal facade used by hosting and joining code.
//!
//! [`NatService`] owns the traversal config, the latest status and a
//! [`JobQueue`]. Callers either block on [`NatService::classify_nat`] or queue
//! the work with [`NatService::classify_nat_async`] and poll
//! [`NatService::status`] / [`NatService::status_text`] from the UI thread.

use crate::config::TraversalConfig;
use crate::error::{PunchError, ServiceError};
use crate::nat::hole_punch::parse_target;
use crate::nat::{AtomicNatType, Classification, HolePuncher, NatClassifier, NatType, status_text};
use crate::worker::{JobHandle, JobQueue};
use natprobe_stun::bind_udp_socket;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{info, warn};

/// Worker thread name
const QUEUE_NAME: &str = "natprobe-worker";

/// State shared with queued jobs
#[derive(Debug)]
struct Inner {
    config: TraversalConfig,
    status: AtomicNatType,
    last_error: Mutex<Option<String>>,
    last_report: Mutex<Option<Classification>>,
}

impl Inner {
    /// Full classification from a fresh server list and socket
    ///
    /// Caller has already moved the status to `Searching`.
    fn classify(&self, port: u16) -> NatType {
        let servers = match self.config.servers.load() {
            Ok(servers) => servers,
            Err(e) => {
                warn!("Cannot classify NAT: {}", e);
                return self.finish(NatType::Blocked, Some(e.to_string()), None);
            }
        };

        let bind_addr = self.config.bind_addr(port);
        let socket = match bind_udp_socket(bind_addr) {
            Ok(socket) => socket,
            Err(e) => {
                warn!("Cannot bind STUN socket on {}: {}", bind_addr, e);
                return self.finish(
                    NatType::Error,
                    Some(format!("cannot bind {bind_addr}: {e}")),
                    None,
                );
            }
        };

        info!(
            "Classifying NAT from {} against {} STUN servers",
            bind_addr,
            servers.len()
        );
        let classifier = NatClassifier::new(servers.into_vec(), self.config.transaction);
        let report = classifier.classify(&socket);
        self.finish(report.nat_type, report.last_error.clone(), Some(report))
    }

    fn finish(
        &self,
        nat_type: NatType,
        last_error: Option<String>,
        report: Option<Classification>,
    ) -> NatType {
        *lock(&self.last_error) = last_error;
        *lock(&self.last_report) = report;
        self.status.store(nat_type);
        nat_type
    }

    fn punch(&self, target_ip: &str, target_port: u16) -> Result<(), PunchError> {
        let target = parse_target(target_ip, target_port)?;
        let puncher = HolePuncher::bind(self.config.bind_addr(self.config.local_port))?
            .with_payload(self.config.punch_payload.clone());
        puncher.punch(target)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// NAT classification and hole punching service
#[derive(Debug)]
pub struct NatService {
    inner: Arc<Inner>,
    queue: JobQueue,
}

impl NatService {
    /// Create the service and start its worker thread
    ///
    /// # Errors
    ///
    /// Returns an error if the worker thread cannot be spawned.
    pub fn new(config: TraversalConfig) -> std::io::Result<Self> {
        let inner = Arc::new(Inner {
            config,
            status: AtomicNatType::new(NatType::Unknown),
            last_error: Mutex::new(None),
            last_report: Mutex::new(None),
        });
        let queue = JobQueue::new(QUEUE_NAME)?;
        Ok(Self { inner, queue })
    }

    /// Service configuration
    pub fn config(&self) -> &TraversalConfig {
        &self.inner.config
    }

    /// Latest NAT status
    pub fn status(&self) -> NatType {
        self.inner.status.load()
    }

    /// Last transport or configuration error message
    pub fn last_error(&self) -> Option<String> {
        lock(&self.inner.last_error).clone()
    }

    /// Full report of the last completed classification
    pub fn last_classification(&self) -> Option<Classification> {
        lock(&self.inner.last_report).clone()
    }

    /// Human-readable status line for the UI
    pub fn status_text(&self) -> String {
        status_text(self.status(), self.last_error().as_deref())
    }

    /// Classify the NAT on the calling thread
    ///
    /// Blocks for up to `servers × retries × timeout`. If a classification
    /// is already running, returns [`NatType::Searching`] without doing
    /// anything.
    pub fn classify_nat(&self, port: u16) -> NatType {
        if self.inner.status.try_begin_search().is_none() {
            info!("NAT classification already in progress");
            return NatType::Searching;
        }
        self.inner.classify(port)
    }

    /// Queue a classification on the worker thread
    ///
    /// The status reads [`NatType::Searching`] from the moment this returns
    /// until the job finishes.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::AlreadySearching`] if a classification is in flight
    /// - [`ServiceError::Queue`] if the worker is shutting down
    pub fn classify_nat_async(&self, port: u16) -> Result<JobHandle<NatType>, ServiceError> {
        let Some(previous) = self.inner.status.try_begin_search() else {
            return Err(ServiceError::AlreadySearching);
        };

        let inner = Arc::clone(&self.inner);
        self.queue
            .submit_with_result(move || inner.classify(port))
            .map_err(|e| {
                self.inner.status.store(previous);
                ServiceError::from(e)
            })
    }

    /// Queue a best-effort punch to `ip:port` from the configured local port
    ///
    /// Punch failures are logged, never returned.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Queue`] if the worker is shutting down.
    pub fn punch(&self, ip: &str, port: u16) -> Result<(), ServiceError> {
        let inner = Arc::clone(&self.inner);
        let ip = ip.to_string();
        self.queue.submit(move || {
            if let Err(e) = inner.punch(&ip, port) {
                warn!("Punch to {}:{} failed: {}", ip, port, e);
            }
        })?;
        Ok(())
    }

    /// Punch on the calling thread and report the outcome
    ///
    /// # Errors
    ///
    /// Returns `PunchError` if the target is invalid or the socket fails.
    pub fn punch_now(&self, ip: &str, port: u16) -> Result<(), PunchError> {
        self.inner.punch(ip, port)
    }
}
