// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Device session manager.
//!
//! Presents "send bytes to a device identity" over a session transport that
//! needs an explicit open handshake.
//!
//! Per destination device:
//!
//! ```text
//! NoSession --send--> Connecting --opened(ok)--> Open --closed--> NoSession
//!                         |   (messages buffered)
//!                         +--open failed / closed--> NoSession (buffered messages reported)
//! ```
//!
//! Only client-initiated sessions are tracked; sessions accepted on the
//! server side stay anonymous. Inbound bytes are handed to the
//! [`DeviceMessageReceiver`] through the [`WorkQueue`], never on the
//! transport thread.
//!
//! Opening a session is attempted `open_session_attempts` times on the
//! primary session name, then on the secondary one if configured. There is
//! no further automatic retry: a caller wanting one calls
//! [`SessionManager::send_message`] again.

use super::directory::DeviceDirectory;
use super::identity::DeviceIdentity;
use crate::config::MessengerConfig;
use crate::error::{CollaboratorError, MessengerError};
use crate::work_queue::WorkQueue;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

/// Which end of a session this process is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionSide {
    Server,
    Client,
}

/// Session callbacks registered with the transport.
pub trait SessionListener: Send + Sync {
    fn on_session_opened(&self, session_id: i32, result: i32);
    fn on_session_closed(&self, session_id: i32);
    fn on_bytes_received(&self, session_id: i32, data: &[u8]);
}

/// Session-oriented transport collaborator.
pub trait SessionTransport: Send + Sync {
    fn create_session_server(
        &self,
        package_name: &str,
        session_name: &str,
        listener: Arc<dyn SessionListener>,
    ) -> Result<(), CollaboratorError>;

    fn remove_session_server(&self, package_name: &str, session_name: &str) -> Result<(), CollaboratorError>;

    /// Request a client session; returns its id. Completion is reported
    /// through [`SessionListener::on_session_opened`].
    fn open_session(
        &self,
        my_session_name: &str,
        peer_session_name: &str,
        peer_network_id: &str,
    ) -> Result<i32, CollaboratorError>;

    fn send_bytes(&self, session_id: i32, data: &[u8]) -> Result<(), CollaboratorError>;

    fn session_side(&self, session_id: i32) -> SessionSide;

    fn peer_network_id(&self, session_id: i32) -> Result<String, CollaboratorError>;
}

/// Application consumer of inbound messages.
pub trait DeviceMessageReceiver: Send + Sync {
    fn on_message(&self, from: &DeviceIdentity, data: &[u8]);
}

impl<F> DeviceMessageReceiver for F
where
    F: Fn(&DeviceIdentity, &[u8]) + Send + Sync,
{
    fn on_message(&self, from: &DeviceIdentity, data: &[u8]) {
        self(from, data)
    }
}

/// Told about buffered messages that could not be delivered.
pub trait SendResultNotifier: Send + Sync {
    fn on_send_result(&self, transaction_no: u64, destination: &DeviceIdentity, result: &MessengerError);
}

impl<F> SendResultNotifier for F
where
    F: Fn(u64, &DeviceIdentity, &MessengerError) + Send + Sync,
{
    fn on_send_result(&self, transaction_no: u64, destination: &DeviceIdentity, result: &MessengerError) {
        self(transaction_no, destination, result)
    }
}

struct PendingSend {
    transaction_no: u64,
    destination: DeviceIdentity,
    data: Vec<u8>,
}

struct OpenSession {
    session_id: i32,
    identity: DeviceIdentity,
}

#[derive(Default)]
struct SessionState {
    pending: VecDeque<PendingSend>,
    opened: Vec<OpenSession>,
    /// Devices with an open request in flight, with the session id once the
    /// transport has returned it.
    connecting: HashMap<DeviceIdentity, Option<i32>>,
}

impl SessionState {
    /// Forget the in-flight request that owns `session_id`.
    fn take_connecting(&mut self, session_id: i32) -> Option<DeviceIdentity> {
        let identity = self
            .connecting
            .iter()
            .find(|(_, id)| **id == Some(session_id))
            .map(|(identity, _)| *identity)?;
        self.connecting.remove(&identity);
        Some(identity)
    }
}

struct SessionInner {
    config: MessengerConfig,
    transport: Arc<dyn SessionTransport>,
    directory: Arc<DeviceDirectory>,
    queue: Arc<WorkQueue>,
    receiver: Arc<dyn DeviceMessageReceiver>,
    notifier: Option<Arc<dyn SendResultNotifier>>,
    state: Mutex<SessionState>,
    active: AtomicBool,
}

/// Per-device session lifecycle and outbound buffering.
pub struct SessionManager {
    inner: Arc<SessionInner>,
}

/// Inputs of [`SessionManager::init`].
pub struct SessionManagerParams {
    pub config: MessengerConfig,
    pub transport: Arc<dyn SessionTransport>,
    pub directory: Arc<DeviceDirectory>,
    pub queue: Arc<WorkQueue>,
    pub receiver: Arc<dyn DeviceMessageReceiver>,
    pub notifier: Option<Arc<dyn SendResultNotifier>>,
}

impl SessionManager {
    /// Create the session servers and start accepting transport callbacks.
    ///
    /// The primary server is required; a secondary one that cannot be created
    /// is logged and skipped.
    pub fn init(params: SessionManagerParams) -> Result<Self, MessengerError> {
        let inner = Arc::new(SessionInner {
            config: params.config,
            transport: params.transport,
            directory: params.directory,
            queue: params.queue,
            receiver: params.receiver,
            notifier: params.notifier,
            state: Mutex::new(SessionState::default()),
            active: AtomicBool::new(true),
        });

        let listener: Arc<dyn SessionListener> = Arc::new(ListenerAdapter {
            inner: Arc::downgrade(&inner),
        });

        inner.create_server(&inner.config.primary_session_name, &listener)?;
        if let Some(secondary) = &inner.config.secondary_session_name {
            if let Err(e) = inner.create_server(secondary, &listener) {
                log::warn!("[session] secondary server {} unavailable: {}", secondary, e);
            }
        }

        Ok(Self { inner })
    }

    /// Remove the session servers and drop every buffered message and open
    /// session record. Idempotent.
    pub fn deinit(&self) {
        if !self.inner.active.swap(false, Ordering::AcqRel) {
            return;
        }
        let config = &self.inner.config;
        let names = std::iter::once(&config.primary_session_name).chain(&config.secondary_session_name);
        for name in names {
            if let Err(e) = self
                .inner
                .transport
                .remove_session_server(&config.package_name, name)
            {
                log::error!("[session] remove server {} failed: {}", name, e);
            }
        }

        let mut state = self.inner.state.lock();
        let dropped = state.pending.len();
        state.pending.clear();
        state.opened.clear();
        state.connecting.clear();
        drop(state);
        log::info!("[session] deinit done ({} buffered messages dropped)", dropped);
    }

    /// Send `data` to `destination`.
    ///
    /// Loopback to the local identity goes straight to the receiver (through
    /// the work queue). With an open session the bytes are written
    /// immediately; otherwise they are buffered and a session is requested
    /// unless one is already being opened for that device.
    pub fn send_message(
        &self,
        transaction_no: u64,
        destination: &DeviceIdentity,
        data: &[u8],
    ) -> Result<(), MessengerError> {
        self.inner.send_message(transaction_no, destination, data)
    }

    /// Listener to hand to a transport that was not given one through
    /// [`SessionTransport::create_session_server`].
    pub fn listener(&self) -> Arc<dyn SessionListener> {
        Arc::new(ListenerAdapter {
            inner: Arc::downgrade(&self.inner),
        })
    }

    pub fn pending_count(&self) -> usize {
        self.inner.state.lock().pending.len()
    }

    pub fn pending_count_for(&self, destination: &DeviceIdentity) -> usize {
        self.inner
            .state
            .lock()
            .pending
            .iter()
            .filter(|p| p.destination == *destination)
            .count()
    }

    pub fn open_session_count(&self) -> usize {
        self.inner.state.lock().opened.len()
    }

    pub fn opened_session(&self, destination: &DeviceIdentity) -> Option<i32> {
        self.inner.opened_session(destination)
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.deinit();
    }
}

impl SessionInner {
    fn create_server(&self, session_name: &str, listener: &Arc<dyn SessionListener>) -> Result<(), MessengerError> {
        let attempts = self.config.init_attempts.max(1);
        let mut last = None;
        for attempt in 1..=attempts {
            match self.transport.create_session_server(
                &self.config.package_name,
                session_name,
                Arc::clone(listener),
            ) {
                Ok(()) => {
                    log::info!("[session] server {} created", session_name);
                    return Ok(());
                }
                Err(e) => {
                    log::warn!(
                        "[session] create server {} attempt {}/{} failed: {}",
                        session_name,
                        attempt,
                        attempts,
                        e
                    );
                    last = Some(e);
                    if attempt < attempts {
                        std::thread::sleep(self.config.init_retry_interval());
                    }
                }
            }
        }
        Err(last
            .unwrap_or_else(|| CollaboratorError::new("create_session_server", -1))
            .into())
    }

    fn check_len(&self, len: usize) -> Result<(), MessengerError> {
        if len == 0 || len > self.config.max_message_len {
            return Err(MessengerError::InvalidMessage(len));
        }
        Ok(())
    }

    fn ensure_active(&self) -> Result<(), MessengerError> {
        if self.active.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(MessengerError::NotInitialized)
        }
    }

    fn send_message(
        &self,
        transaction_no: u64,
        destination: &DeviceIdentity,
        data: &[u8],
    ) -> Result<(), MessengerError> {
        self.ensure_active()?;
        self.check_len(data.len())?;

        if let Some((local, _)) = self.directory.self_identity() {
            if local == *destination {
                log::debug!("[session] loopback message, {} bytes", data.len());
                return self.dispatch_received(destination, data);
            }
        }

        if let Some(session_id) = self.opened_session(destination) {
            return self.transport.send_bytes(session_id, data).map_err(|e| {
                log::error!("[session] send to {} failed: {}", destination, e);
                e.into()
            });
        }

        let connecting = {
            let mut state = self.state.lock();
            state.pending.push_back(PendingSend {
                transaction_no,
                destination: *destination,
                data: data.to_vec(),
            });
            let connecting = state.connecting.contains_key(destination);
            if !connecting {
                state.connecting.insert(*destination, None);
            }
            connecting
        };

        if connecting {
            log::debug!("[session] {} already connecting, message buffered", destination);
            return Ok(());
        }
        self.open_session(destination)
    }

    fn opened_session(&self, destination: &DeviceIdentity) -> Option<i32> {
        let state = self.state.lock();
        let found = state
            .opened
            .iter()
            .find(|s| s.identity == *destination)
            .map(|s| s.session_id);
        log::trace!(
            "[session] device {} has {}",
            destination,
            if found.is_some() { "an open session" } else { "no open session" }
        );
        found
    }

    fn open_session(&self, destination: &DeviceIdentity) -> Result<(), MessengerError> {
        let Some(network_id) = self.directory.network_id_by_identity(destination) else {
            log::error!("[session] no network id for {}", destination);
            let err = MessengerError::DeviceNotFound(destination.mask_id());
            self.fail_pending(destination, &err);
            return Err(err);
        };

        let primary = &self.config.primary_session_name;
        let peer_names = std::iter::once(primary).chain(&self.config.secondary_session_name);
        for peer_name in peer_names {
            if let Some(session_id) = self.try_open(primary, peer_name, &network_id, destination) {
                // The transport may already have reported the outcome from
                // inside open_session, clearing the request.
                if let Some(slot) = self.state.lock().connecting.get_mut(destination) {
                    *slot = Some(session_id);
                }
                return Ok(());
            }
        }

        let err = MessengerError::SessionOpenFailed(destination.mask_id());
        self.fail_pending(destination, &err);
        Err(err)
    }

    fn try_open(
        &self,
        my_name: &str,
        peer_name: &str,
        network_id: &str,
        destination: &DeviceIdentity,
    ) -> Option<i32> {
        let attempts = self.config.open_session_attempts.max(1);
        for attempt in 1..=attempts {
            match self.transport.open_session(my_name, peer_name, network_id) {
                Ok(session_id) if session_id > 0 => {
                    log::info!(
                        "[session] open {} to {} -> session {}",
                        peer_name,
                        destination,
                        session_id
                    );
                    return Some(session_id);
                }
                Ok(session_id) => log::warn!(
                    "[session] open {} to {} attempt {}/{}: invalid session {}",
                    peer_name,
                    destination,
                    attempt,
                    attempts,
                    session_id
                ),
                Err(e) => log::warn!(
                    "[session] open {} to {} attempt {}/{}: {}",
                    peer_name,
                    destination,
                    attempt,
                    attempts,
                    e
                ),
            }
        }
        None
    }

    /// Drop every buffered message for `destination` and report each one.
    /// The next send to that device opens a fresh session.
    fn fail_pending(&self, destination: &DeviceIdentity, err: &MessengerError) {
        let failed: VecDeque<PendingSend> = {
            let mut state = self.state.lock();
            state.connecting.remove(destination);
            let (failed, kept) = std::mem::take(&mut state.pending)
                .into_iter()
                .partition(|p| p.destination == *destination);
            state.pending = kept;
            failed
        };
        if failed.is_empty() {
            return;
        }
        log::warn!(
            "[session] dropping {} buffered messages for {}: {}",
            failed.len(),
            destination,
            err
        );
        if let Some(notifier) = &self.notifier {
            for message in &failed {
                notifier.on_send_result(message.transaction_no, &message.destination, err);
            }
        }
    }

    fn identity_of_session(&self, session_id: i32) -> Option<DeviceIdentity> {
        let network_id = self
            .transport
            .peer_network_id(session_id)
            .map_err(|e| log::info!("[session] peer of session {} unknown: {}", session_id, e))
            .ok()?;
        self.directory.identity_by_network_id(&network_id)
    }

    fn on_session_opened(&self, session_id: i32, result: i32) {
        let side = self.transport.session_side(session_id);
        log::info!(
            "[session] session {} opened, side={:?}, result={}",
            session_id,
            side,
            result
        );
        if side == SessionSide::Server || !self.active.load(Ordering::Acquire) {
            return;
        }

        let requested = self.state.lock().take_connecting(session_id);

        if result != 0 {
            if let Some(identity) = requested.or_else(|| self.identity_of_session(session_id)) {
                self.fail_pending(&identity, &MessengerError::SessionOpenFailed(identity.mask_id()));
            }
            return;
        }

        let Some(identity) = self.identity_of_session(session_id).or(requested) else {
            log::error!("[session] cannot resolve peer of session {}", session_id);
            return;
        };

        let mut failures = Vec::new();
        {
            let mut state = self.state.lock();
            state.connecting.remove(&identity);
            state.opened.push(OpenSession {
                session_id,
                identity,
            });

            // Flush under the lock so a concurrent send cannot overtake
            // buffered messages.
            let (matching, kept): (VecDeque<_>, VecDeque<_>) = std::mem::take(&mut state.pending)
                .into_iter()
                .partition(|p| p.destination == identity);
            state.pending = kept;

            for message in matching {
                if let Err(e) = self.transport.send_bytes(session_id, &message.data) {
                    log::error!(
                        "[session] flush to {} (transaction {}) failed: {}",
                        identity,
                        message.transaction_no,
                        e
                    );
                    failures.push((message.transaction_no, MessengerError::from(e)));
                }
            }
        }

        if let Some(notifier) = &self.notifier {
            for (transaction_no, err) in &failures {
                notifier.on_send_result(*transaction_no, &identity, err);
            }
        }
    }

    fn on_session_closed(&self, session_id: i32) {
        let side = self.transport.session_side(session_id);
        log::info!("[session] session {} closed, side={:?}", session_id, side);
        if side == SessionSide::Server {
            return;
        }
        let aborted = {
            let mut state = self.state.lock();
            if let Some(pos) = state.opened.iter().position(|s| s.session_id == session_id) {
                let closed = state.opened.remove(pos);
                log::info!("[session] device {} session closed", closed.identity);
            }
            state.take_connecting(session_id)
        };
        if let Some(identity) = aborted {
            log::warn!("[session] session {} to {} closed before opening", session_id, identity);
            self.fail_pending(&identity, &MessengerError::SessionOpenFailed(identity.mask_id()));
        }
    }

    fn on_bytes_received(&self, session_id: i32, data: &[u8]) {
        if self.check_len(data.len()).is_err() {
            log::error!("[session] invalid message received, {} bytes", data.len());
            return;
        }
        let Some(identity) = self.identity_of_session(session_id) else {
            return;
        };
        log::info!("[session] device {} sent {} bytes", identity, data.len());
        if let Err(e) = self.dispatch_received(&identity, data) {
            log::error!("[session] message from {} dropped: {}", identity, e);
        }
    }

    /// Hand an inbound message to the receiver on the work queue thread.
    fn dispatch_received(&self, from: &DeviceIdentity, data: &[u8]) -> Result<(), MessengerError> {
        let receiver = Arc::clone(&self.receiver);
        let from = *from;
        self.queue
            .enqueue(data.to_vec(), move |data| receiver.on_message(&from, &data))
            .map_err(|e| MessengerError::Queue(e.kind))
    }
}

/// Transport-facing adapter; holds the manager weakly so the transport's
/// copy of the listener does not keep the manager alive.
struct ListenerAdapter {
    inner: Weak<SessionInner>,
}

impl SessionListener for ListenerAdapter {
    fn on_session_opened(&self, session_id: i32, result: i32) {
        if let Some(inner) = self.inner.upgrade() {
            inner.on_session_opened(session_id, result);
        }
    }

    fn on_session_closed(&self, session_id: i32) {
        if let Some(inner) = self.inner.upgrade() {
            inner.on_session_closed(session_id);
        }
    }

    fn on_bytes_received(&self, session_id: i32, data: &[u8]) {
        if let Some(inner) = self.inner.upgrade() {
            inner.on_bytes_received(session_id, data);
        }
    }
}
