//! Transport state machine
//!
//! One [`TransportStateMachine`] tracks the lifecycle of a single broker
//! connection, its channel and its consumer. It performs no I/O: the lapin
//! binding in [`super::consumer`] performs each broker operation and reports
//! the outcome through the named event methods. Every event goes through
//! [`transition`], so an out-of-order callback is an error instead of a
//! silently corrupted state.

use crate::domain::errors::BrokerError;
use std::fmt;

/// Lifecycle state of one broker connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    ChannelOpening,
    QosPending,
    Consuming,
    Cancelling,
    Closing,
    Closed,
}

impl ConnectionState {
    /// States reached by a deliberate shutdown or a broker close
    pub fn is_shutting_down(self) -> bool {
        matches!(
            self,
            ConnectionState::Cancelling | ConnectionState::Closing | ConnectionState::Closed
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::ChannelOpening => "channel-opening",
            ConnectionState::QosPending => "qos-pending",
            ConnectionState::Consuming => "consuming",
            ConnectionState::Cancelling => "cancelling",
            ConnectionState::Closing => "closing",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Input to the transition table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportEvent {
    Connect,
    ConnectionOpened,
    ChannelOpened,
    QosOk,
    ConsumeOk,
    Stop,
    CancelOk,
    ChannelClosed,
    ConnectionClosed,
    Closed,
}

impl fmt::Display for TransportEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransportEvent::Connect => "connect",
            TransportEvent::ConnectionOpened => "connection-open",
            TransportEvent::ChannelOpened => "channel-open",
            TransportEvent::QosOk => "qos-ok",
            TransportEvent::ConsumeOk => "consume-ok",
            TransportEvent::Stop => "stop",
            TransportEvent::CancelOk => "cancel-ok",
            TransportEvent::ChannelClosed => "channel-closed",
            TransportEvent::ConnectionClosed => "connection-closed",
            TransportEvent::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// The transition table
///
/// # Errors
///
/// Returns [`BrokerError::InvalidTransition`] for any event the state cannot accept.
pub fn transition(
    state: ConnectionState,
    event: TransportEvent,
) -> Result<ConnectionState, BrokerError> {
    use ConnectionState::*;
    use TransportEvent as E;

    let next = match (state, event) {
        (Disconnected, E::Connect) => Connecting,
        (Connecting, E::ConnectionOpened) => ChannelOpening,
        (ChannelOpening, E::ChannelOpened) => QosPending,
        (QosPending, E::QosOk) => Consuming,
        (Consuming, E::ConsumeOk) => Consuming,

        (Disconnected, E::Stop) => Closed,
        (Connecting | ChannelOpening | QosPending, E::Stop) => Closing,
        (Consuming, E::Stop) => Cancelling,
        (Cancelling | Closing | Closed, E::Stop) => state,

        (Cancelling, E::CancelOk) => Closing,

        (ChannelOpening | QosPending | Consuming | Cancelling | Closing, E::ChannelClosed) => {
            Closing
        }
        (
            Connecting | ChannelOpening | QosPending | Consuming | Cancelling | Closing,
            E::ConnectionClosed,
        ) => Closed,

        (Closing | Closed, E::Closed) => Closed,

        _ => {
            return Err(BrokerError::InvalidTransition {
                state: state.to_string(),
                event: event.to_string(),
            })
        }
    };

    Ok(next)
}

/// Recorded when the connection ends without a deliberate shutdown
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectSignal {
    /// The instance had reached consume-ok before the disconnect
    pub was_consuming: bool,
    pub reason: String,
}

/// State plus reconnect bookkeeping for one connection attempt
#[derive(Debug)]
pub struct TransportStateMachine {
    state: ConnectionState,
    stopping: bool,
    consumed: bool,
    reconnect: Option<ReconnectSignal>,
}

impl Default for TransportStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl TransportStateMachine {
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            stopping: false,
            consumed: false,
            reconnect: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Whether a reconnect is due
    pub fn should_reconnect(&self) -> bool {
        self.reconnect.is_some()
    }

    pub fn reconnect_signal(&self) -> Option<&ReconnectSignal> {
        self.reconnect.as_ref()
    }

    /// True while consuming, or while a reconnect has been recorded
    pub fn is_healthy(&self) -> bool {
        self.state == ConnectionState::Consuming || self.reconnect.is_some()
    }

    pub fn connect(&mut self) -> Result<ConnectionState, BrokerError> {
        self.apply(TransportEvent::Connect)
    }

    pub fn on_connection_open(&mut self) -> Result<ConnectionState, BrokerError> {
        self.apply(TransportEvent::ConnectionOpened)
    }

    pub fn on_channel_open(&mut self) -> Result<ConnectionState, BrokerError> {
        self.apply(TransportEvent::ChannelOpened)
    }

    pub fn on_qos_ok(&mut self) -> Result<ConnectionState, BrokerError> {
        self.apply(TransportEvent::QosOk)
    }

    pub fn on_consume_ok(&mut self) -> Result<ConnectionState, BrokerError> {
        let next = self.apply(TransportEvent::ConsumeOk)?;
        self.consumed = true;
        Ok(next)
    }

    /// Begins a deliberate shutdown; repeated calls are no-ops
    pub fn stop(&mut self) -> Result<ConnectionState, BrokerError> {
        self.stopping = true;
        self.apply(TransportEvent::Stop)
    }

    pub fn on_cancel_ok(&mut self) -> Result<ConnectionState, BrokerError> {
        self.apply(TransportEvent::CancelOk)
    }

    /// Channel closed; records a reconnect unless shutting down deliberately
    pub fn on_channel_closed(&mut self, reason: &str) -> Result<ConnectionState, BrokerError> {
        let next = self.apply(TransportEvent::ChannelClosed)?;
        self.record_unexpected_close(reason);
        Ok(next)
    }

    /// Connection closed; records a reconnect unless shutting down deliberately
    pub fn on_connection_closed(&mut self, reason: &str) -> Result<ConnectionState, BrokerError> {
        let next = self.apply(TransportEvent::ConnectionClosed)?;
        self.record_unexpected_close(reason);
        Ok(next)
    }

    pub fn on_closed(&mut self) -> Result<ConnectionState, BrokerError> {
        self.apply(TransportEvent::Closed)
    }

    /// Delivery processing hit an infrastructure failure
    ///
    /// The delivery stays unsettled. The signal never counts as a consuming
    /// disconnect, so repeated failures back off instead of spinning.
    pub fn on_processing_failed(&mut self, reason: &str) {
        if self.reconnect.is_none() {
            self.reconnect = Some(ReconnectSignal {
                was_consuming: false,
                reason: reason.to_string(),
            });
        }
    }

    fn record_unexpected_close(&mut self, reason: &str) {
        if !self.stopping && self.reconnect.is_none() {
            self.reconnect = Some(ReconnectSignal {
                was_consuming: self.consumed,
                reason: reason.to_string(),
            });
        }
    }

    fn apply(&mut self, event: TransportEvent) -> Result<ConnectionState, BrokerError> {
        let next = transition(self.state, event)?;
        if next != self.state {
            tracing::debug!(from = %self.state, to = %next, event = %event, "Transport transition");
        }
        self.state = next;
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn consuming() -> TransportStateMachine {
        let mut machine = TransportStateMachine::new();
        machine.connect().unwrap();
        machine.on_connection_open().unwrap();
        machine.on_channel_open().unwrap();
        machine.on_qos_ok().unwrap();
        machine.on_consume_ok().unwrap();
        machine
    }

    #[test]
    fn test_happy_path_reaches_consuming() {
        let machine = consuming();
        assert_eq!(machine.state(), ConnectionState::Consuming);
        assert!(machine.is_healthy());
        assert!(!machine.should_reconnect());
    }

    #[test_case(ConnectionState::Disconnected, TransportEvent::QosOk)]
    #[test_case(ConnectionState::Connecting, TransportEvent::ChannelOpened)]
    #[test_case(ConnectionState::Consuming, TransportEvent::CancelOk)]
    #[test_case(ConnectionState::Closed, TransportEvent::Connect)]
    #[test_case(ConnectionState::Disconnected, TransportEvent::ChannelClosed)]
    fn test_invalid_transitions_rejected(state: ConnectionState, event: TransportEvent) {
        let err = transition(state, event).unwrap_err();
        assert!(matches!(err, BrokerError::InvalidTransition { .. }));
    }

    #[test]
    fn test_graceful_stop_sequence() {
        let mut machine = consuming();
        assert_eq!(machine.stop().unwrap(), ConnectionState::Cancelling);
        assert_eq!(machine.on_cancel_ok().unwrap(), ConnectionState::Closing);
        assert_eq!(machine.on_channel_closed("shutdown").unwrap(), ConnectionState::Closing);
        assert_eq!(machine.on_closed().unwrap(), ConnectionState::Closed);
        assert!(!machine.should_reconnect());
        assert!(!machine.is_healthy());
    }

    #[test]
    fn test_stop_is_idempotent() {
        let mut machine = consuming();
        machine.stop().unwrap();
        assert_eq!(machine.stop().unwrap(), ConnectionState::Cancelling);

        let mut idle = TransportStateMachine::new();
        assert_eq!(idle.stop().unwrap(), ConnectionState::Closed);
        assert_eq!(idle.stop().unwrap(), ConnectionState::Closed);
    }

    #[test]
    fn test_broker_close_while_consuming_records_reconnect() {
        let mut machine = consuming();
        machine.on_connection_closed("CONNECTION_FORCED").unwrap();

        assert_eq!(machine.state(), ConnectionState::Closed);
        let signal = machine.reconnect_signal().unwrap();
        assert!(signal.was_consuming);
        assert_eq!(signal.reason, "CONNECTION_FORCED");
        assert!(machine.is_healthy());
    }

    #[test]
    fn test_connect_failure_records_reconnect_without_consumption() {
        let mut machine = TransportStateMachine::new();
        machine.connect().unwrap();
        machine.on_connection_closed("refused").unwrap();

        assert!(machine.should_reconnect());
        assert!(!machine.reconnect_signal().unwrap().was_consuming);
    }

    #[test]
    fn test_close_during_stop_does_not_signal_reconnect() {
        let mut machine = consuming();
        machine.stop().unwrap();
        machine.on_connection_closed("shutdown").unwrap();
        assert!(!machine.should_reconnect());
    }

    #[test]
    fn test_processing_failure_signal_is_not_consuming() {
        let mut machine = consuming();
        machine.on_processing_failed("database unavailable");
        let signal = machine.reconnect_signal().unwrap();
        assert!(!signal.was_consuming);

        // Teardown after the failure keeps the first signal
        machine.stop().unwrap();
        machine.on_cancel_ok().unwrap();
        machine.on_closed().unwrap();
        assert_eq!(machine.reconnect_signal().unwrap().reason, "database unavailable");
    }

    #[test]
    fn test_first_close_reason_wins() {
        let mut machine = consuming();
        machine.on_channel_closed("channel error").unwrap();
        machine.on_connection_closed("connection error").unwrap();
        assert_eq!(machine.reconnect_signal().unwrap().reason, "channel error");
    }
}
