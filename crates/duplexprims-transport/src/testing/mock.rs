//! Scripted, call-recording transport.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{watch, Notify};
use tracing::trace;

use crate::error::{Result, TransportError};
use crate::traits::{MessageKind, MessageTransport, Received, TransportState};

/// A call observed by a [`MockTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Receive {
        capacity: usize,
    },
    Send {
        data: Bytes,
        kind: MessageKind,
        end_of_message: bool,
    },
    CloseOutput {
        status: u16,
        reason: String,
    },
    Close {
        status: u16,
        reason: String,
    },
    Release,
}

/// A scripted result for the next receive.
#[derive(Debug)]
pub enum MockReceive {
    /// Deliver a data message; split across receives if it does not fit.
    Data(Bytes),
    /// Deliver the peer's close message.
    Close { status: u16, reason: String },
    /// Fail the receive with this error.
    Error(TransportError),
}

/// A transport that replays scripted inbound messages and records calls.
///
/// Cloning yields another handle onto the same transport, so a test can keep
/// one handle for assertions after moving the other into the code under test.
///
/// The mock only models one state transition on its own: an inbound close
/// moves `Open` to `CloseReceived` (and `CloseSent` to `Closed`), and a full
/// close moves to `Closed`. Everything else is driven with [`set_state`].
///
/// A receive with nothing scripted suspends until something is pushed.
///
/// [`set_state`]: MockTransport::set_state
#[derive(Clone, Default)]
pub struct MockTransport {
    inner: Arc<Inner>,
}

struct Inner {
    state: Mutex<TransportState>,
    inbound: Mutex<VecDeque<MockReceive>>,
    inbound_ready: Notify,
    calls: Mutex<Vec<Call>>,
    send_failure: Mutex<Option<TransportError>>,
    close_output_failure: Mutex<Option<TransportError>>,
    close_failure: Mutex<Option<TransportError>>,
    send_delay: Mutex<Option<Duration>>,
    sends_paused: watch::Sender<bool>,
    sends_in_flight: AtomicUsize,
    max_sends_in_flight: AtomicUsize,
}

impl Default for Inner {
    fn default() -> Self {
        Self {
            state: Mutex::new(TransportState::Open),
            inbound: Mutex::new(VecDeque::new()),
            inbound_ready: Notify::new(),
            calls: Mutex::new(Vec::new()),
            send_failure: Mutex::new(None),
            close_output_failure: Mutex::new(None),
            close_failure: Mutex::new(None),
            send_delay: Mutex::new(None),
            sends_paused: watch::Sender::new(false),
            sends_in_flight: AtomicUsize::new(0),
            max_sends_in_flight: AtomicUsize::new(0),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockTransport {
    /// Create a mock transport in state `Open`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock transport in the given state.
    pub fn with_state(state: TransportState) -> Self {
        let mock = Self::default();
        mock.set_state(state);
        mock
    }

    /// Force the reported connection state.
    pub fn set_state(&self, state: TransportState) {
        *lock(&self.inner.state) = state;
    }

    /// Script the next receive result.
    pub fn push_receive(&self, next: MockReceive) {
        lock(&self.inner.inbound).push_back(next);
        self.inner.inbound_ready.notify_one();
    }

    /// Script an inbound data message.
    pub fn push_data(&self, data: impl Into<Bytes>) {
        self.push_receive(MockReceive::Data(data.into()));
    }

    /// Script the peer's close message.
    pub fn push_close(&self, status: u16, reason: &str) {
        self.push_receive(MockReceive::Close {
            status,
            reason: reason.to_string(),
        });
    }

    /// Script a receive failure.
    pub fn push_error(&self, err: TransportError) {
        self.push_receive(MockReceive::Error(err));
    }

    /// Fail the next send with `err`.
    pub fn fail_next_send(&self, err: TransportError) {
        *lock(&self.inner.send_failure) = Some(err);
    }

    /// Fail the next half-close with `err`.
    pub fn fail_next_close_output(&self, err: TransportError) {
        *lock(&self.inner.close_output_failure) = Some(err);
    }

    /// Fail the next full close with `err`.
    pub fn fail_next_close(&self, err: TransportError) {
        *lock(&self.inner.close_failure) = Some(err);
    }

    /// Make every send take at least `delay`, widening race windows.
    pub fn set_send_delay(&self, delay: Duration) {
        *lock(&self.inner.send_delay) = Some(delay);
    }

    /// Hold sends in flight until [`resume_sends`](Self::resume_sends).
    pub fn pause_sends(&self) {
        self.inner.sends_paused.send_replace(true);
    }

    /// Let held sends complete.
    pub fn resume_sends(&self) {
        self.inner.sends_paused.send_replace(false);
    }

    /// Every call observed so far, in order.
    pub fn calls(&self) -> Vec<Call> {
        lock(&self.inner.calls).clone()
    }

    /// Payloads of completed sends, in order.
    pub fn sent(&self) -> Vec<Bytes> {
        lock(&self.inner.calls)
            .iter()
            .filter_map(|call| match call {
                Call::Send { data, .. } => Some(data.clone()),
                _ => None,
            })
            .collect()
    }

    /// Number of completed sends.
    pub fn send_count(&self) -> usize {
        self.count(|call| matches!(call, Call::Send { .. }))
    }

    /// Number of half-close attempts.
    pub fn close_output_count(&self) -> usize {
        self.count(|call| matches!(call, Call::CloseOutput { .. }))
    }

    /// Number of full close attempts.
    pub fn close_count(&self) -> usize {
        self.count(|call| matches!(call, Call::Close { .. }))
    }

    /// Number of release calls.
    pub fn release_count(&self) -> usize {
        self.count(|call| matches!(call, Call::Release))
    }

    /// Highest number of sends observed in flight at once.
    pub fn max_sends_in_flight(&self) -> usize {
        self.inner.max_sends_in_flight.load(Ordering::SeqCst)
    }

    fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        lock(&self.inner.calls).iter().filter(|call| pred(call)).count()
    }

    fn record(&self, call: Call) {
        trace!(?call, "mock transport call");
        lock(&self.inner.calls).push(call);
    }

    async fn next_scripted(&self) -> MockReceive {
        loop {
            if let Some(next) = lock(&self.inner.inbound).pop_front() {
                return next;
            }
            self.inner.inbound_ready.notified().await;
        }
    }

    async fn wait_until_sends_resume(&self) {
        let mut paused = self.inner.sends_paused.subscribe();
        // The sender lives in `inner`, so `wait_for` cannot observe a closed channel.
        let _ = paused.wait_for(|paused| !*paused).await;
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize, max: &AtomicUsize) -> Self {
        let now = counter.fetch_add(1, Ordering::SeqCst) + 1;
        max.fetch_max(now, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl MessageTransport for MockTransport {
    fn state(&self) -> TransportState {
        *lock(&self.inner.state)
    }

    async fn receive(&self, buf: &mut [u8]) -> Result<Received> {
        self.record(Call::Receive {
            capacity: buf.len(),
        });

        match self.next_scripted().await {
            MockReceive::Data(mut data) => {
                let n = data.len().min(buf.len());
                buf[..n].copy_from_slice(&data[..n]);
                let rest = data.split_off(n);
                let end_of_message = rest.is_empty();
                if !end_of_message {
                    lock(&self.inner.inbound).push_front(MockReceive::Data(rest));
                }
                Ok(Received::data(n, MessageKind::Binary, end_of_message))
            }
            MockReceive::Close { status, reason } => {
                let mut state = lock(&self.inner.state);
                *state = match *state {
                    TransportState::Open => TransportState::CloseReceived,
                    TransportState::CloseSent => TransportState::Closed,
                    other => other,
                };
                Ok(Received::close(Some(status), reason))
            }
            MockReceive::Error(err) => Err(err),
        }
    }

    async fn send(&self, buf: &[u8], kind: MessageKind, end_of_message: bool) -> Result<()> {
        let _in_flight = InFlight::enter(
            &self.inner.sends_in_flight,
            &self.inner.max_sends_in_flight,
        );

        self.wait_until_sends_resume().await;
        let delay = *lock(&self.inner.send_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(err) = lock(&self.inner.send_failure).take() {
            return Err(err);
        }

        self.record(Call::Send {
            data: Bytes::copy_from_slice(buf),
            kind,
            end_of_message,
        });
        Ok(())
    }

    async fn close_output(&self, status: u16, reason: &str) -> Result<()> {
        self.record(Call::CloseOutput {
            status,
            reason: reason.to_string(),
        });
        match lock(&self.inner.close_output_failure).take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn close(&self, status: u16, reason: &str) -> Result<()> {
        self.record(Call::Close {
            status,
            reason: reason.to_string(),
        });
        if let Some(err) = lock(&self.inner.close_failure).take() {
            return Err(err);
        }
        self.set_state(TransportState::Closed);
        Ok(())
    }

    fn release(&self) {
        self.record(Call::Release);
    }
}
