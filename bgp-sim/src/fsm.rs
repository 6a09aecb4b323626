//! The per-peer BGP finite state machine: states, event alphabet and the
//! transition table. Pure state transition logic lives here; the actual
//! sending of messages and (re)starting of timers is applied by the caller
//! in [`crate::router`], which returns an ordered list of effects rather
//! than mutating the peer directly.

#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub enum State {
    Idle,
    Connect,
    Active,
    OpenSent,
    OpenConfirm,
    Established,
}

impl State {
    pub fn as_str(&self) -> &'static str {
        match self {
            State::Idle => "Idle",
            State::Connect => "Connect",
            State::Active => "Active",
            State::OpenSent => "OpenSent",
            State::OpenConfirm => "OpenConfirm",
            State::Established => "Established",
        }
    }

    pub fn is_established(&self) -> bool {
        matches!(self, State::Established)
    }
}

/// The event alphabet. `Other` is the implicit "any other event" catchall
/// every row's `*` arm matches.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Event {
    ManualStart,
    ManualStop,
    ConnectRetryTimerExpires,
    HoldTimerExpires,
    KeepaliveTimerExpires,
    TcpCrAcked,
    TcpConnectionConfirmed,
    TcpConnectionFails,
    BgpOpen,
    BgpHeaderErr,
    BgpOpenMsgErr,
    KeepAliveMsg,
    Other,
}

/// A side effect the FSM transition demands of its caller. A single
/// transition may require several (e.g. OpenSent + BGPOpen clears the
/// retry timer, starts the hold timer and sends a KEEPALIVE).
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Effect {
    ResetRetryCounter,
    IncrementRetryCounter,
    StartRetryTimer,
    ClearRetryTimer,
    /// Starts (or restarts) the hold timer with the given countdown, in
    /// seconds.
    StartHoldTimer(u64),
    ClearHoldTimer,
    /// Starts (or restarts) the keepalive repeat timer with the given
    /// period, in seconds.
    StartKeepaliveTimer(u64),
    ClearKeepaliveTimer,
    SendOpen,
    SendKeepalive,
    /// FSM-driven NOTIFICATION; `None` means "whatever the triggering
    /// protocol error carries", non-`None` covers the generic
    /// catchall-triggered FSM Error (code 5) NOTIFICATION.
    SendNotificationFsmError,
    SendNotificationForError,
    DropConnection,
}

/// The outcome of feeding one event to a peer currently in `from`.
pub struct Transition {
    pub to: State,
    pub effects: Vec<Effect>,
}

impl Transition {
    fn new(to: State, effects: Vec<Effect>) -> Self {
        Self { to, effects }
    }
}

/// Default connect-retry countdown, seconds. The same default real BGP
/// implementations use for the equivalent retry timer.
pub const CONNECT_RETRY_TIME: u64 = 120;

/// Applies one event to `from`, returning the next state and the ordered
/// effects the caller must execute.
pub fn transition(from: State, event: Event) -> Transition {
    use Effect::*;
    use Event::*;
    use State::*;

    match (from, event) {
        (Idle, ManualStart) => {
            Transition::new(Connect, vec![ResetRetryCounter, StartRetryTimer])
        }
        (Idle, _) => Transition::new(Active, vec![]),

        (Connect, ManualStop) => Transition::new(Idle, vec![ResetRetryCounter, DropConnection]),
        (Connect, ConnectRetryTimerExpires) => {
            Transition::new(Connect, vec![StartRetryTimer])
        }
        (Connect, TcpCrAcked) | (Connect, TcpConnectionConfirmed) => Transition::new(
            OpenSent,
            vec![ClearRetryTimer, StartHoldTimer(240), SendOpen],
        ),
        (Connect, _) => Transition::new(Idle, vec![IncrementRetryCounter, DropConnection]),

        (Active, ManualStop) => Transition::new(Idle, vec![ResetRetryCounter, DropConnection]),
        (Active, ConnectRetryTimerExpires) => Transition::new(
            Connect,
            vec![StartRetryTimer, ClearKeepaliveTimer],
        ),
        (Active, TcpCrAcked) | (Active, TcpConnectionConfirmed) => {
            Transition::new(OpenSent, vec![ClearRetryTimer, StartHoldTimer(240)])
        }
        (Active, _) => Transition::new(Idle, vec![IncrementRetryCounter, DropConnection]),

        (OpenSent, TcpConnectionFails) => Transition::new(Active, vec![StartRetryTimer]),
        (OpenSent, BgpOpen) => Transition::new(
            OpenConfirm,
            vec![
                ClearRetryTimer,
                StartHoldTimer(60),
                StartKeepaliveTimer(60),
                SendKeepalive,
            ],
        ),
        (OpenSent, BgpHeaderErr) | (OpenSent, BgpOpenMsgErr) => Transition::new(
            Idle,
            vec![SendNotificationForError, IncrementRetryCounter, DropConnection],
        ),
        (OpenSent, _) => Transition::new(
            Idle,
            vec![
                SendNotificationFsmError,
                ClearRetryTimer,
                IncrementRetryCounter,
                DropConnection,
            ],
        ),

        (OpenConfirm, KeepaliveTimerExpires) => {
            Transition::new(OpenConfirm, vec![SendKeepalive, StartKeepaliveTimer(60)])
        }
        (OpenConfirm, TcpConnectionFails) => {
            Transition::new(Idle, vec![IncrementRetryCounter, DropConnection])
        }
        (OpenConfirm, BgpHeaderErr) | (OpenConfirm, BgpOpenMsgErr) => Transition::new(
            Idle,
            vec![SendNotificationForError, IncrementRetryCounter, DropConnection],
        ),
        (OpenConfirm, KeepAliveMsg) => {
            Transition::new(Established, vec![StartHoldTimer(60)])
        }
        (OpenConfirm, _) => Transition::new(
            Idle,
            vec![SendNotificationFsmError, IncrementRetryCounter, DropConnection],
        ),

        (Established, KeepaliveTimerExpires) => {
            Transition::new(Established, vec![SendKeepalive, StartKeepaliveTimer(60)])
        }
        (Established, _) => Transition::new(
            Idle,
            vec![SendNotificationFsmError, IncrementRetryCounter, DropConnection],
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_manual_start_goes_to_connect() {
        let t = transition(State::Idle, Event::ManualStart);
        assert_eq!(t.to, State::Connect);
        assert!(t.effects.contains(&Effect::StartRetryTimer));
    }

    #[test]
    fn idle_catchall_goes_to_active() {
        let t = transition(State::Idle, Event::TcpConnectionFails);
        assert_eq!(t.to, State::Active);
        assert!(t.effects.is_empty());
    }

    #[test]
    fn connect_confirmed_goes_to_opensent_and_sends_open() {
        let t = transition(State::Connect, Event::TcpConnectionConfirmed);
        assert_eq!(t.to, State::OpenSent);
        assert!(t.effects.contains(&Effect::SendOpen));
    }

    #[test]
    fn opensent_open_goes_to_openconfirm_and_sends_keepalive() {
        let t = transition(State::OpenSent, Event::BgpOpen);
        assert_eq!(t.to, State::OpenConfirm);
        assert!(t.effects.contains(&Effect::SendKeepalive));
    }

    #[test]
    fn openconfirm_keepalive_msg_goes_to_established() {
        let t = transition(State::OpenConfirm, Event::KeepAliveMsg);
        assert_eq!(t.to, State::Established);
    }

    #[test]
    fn established_catchall_drops_to_idle_with_notification() {
        let t = transition(State::Established, Event::BgpOpenMsgErr);
        assert_eq!(t.to, State::Idle);
        assert!(t.effects.contains(&Effect::SendNotificationFsmError));
        assert!(t.effects.contains(&Effect::IncrementRetryCounter));
    }

    #[test]
    fn established_keepalive_expires_stays_established() {
        let t = transition(State::Established, Event::KeepaliveTimerExpires);
        assert_eq!(t.to, State::Established);
        assert!(t.effects.contains(&Effect::SendKeepalive));
    }
}
