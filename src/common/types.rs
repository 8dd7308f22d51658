/// Intent declared by the client in its handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextState {
    Status,
    Login,
    Transfer,
    Unknown(u32),
}

impl From<u32> for NextState {
    fn from(code: u32) -> Self {
        match code {
            1 => NextState::Status,
            2 => NextState::Login,
            3 => NextState::Transfer,
            other => NextState::Unknown(other),
        }
    }
}

impl NextState {
    pub fn code(self) -> u32 {
        match self {
            NextState::Status => 1,
            NextState::Login => 2,
            NextState::Transfer => 3,
            NextState::Unknown(code) => code,
        }
    }
}

/// Fields decoded from a client handshake packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeInfo {
    pub protocol_version: u32,
    pub hostname: String,
    pub port: u16,
    pub next_state: NextState,
    /// Bytes the handshake frame occupies, length prefix included.
    pub frame_len: usize,
}

impl HandshakeInfo {
    /// Login and transfer-intent handshakes get a full relayed session.
    pub fn wants_session(&self) -> bool {
        matches!(self.next_state, NextState::Login | NextState::Transfer)
    }
}

/// Progress of a session through a backend outage.
///
/// Variants are declared in transition order; a session only ever moves
/// forward through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LimboState {
    Active,
    Frozen,
    WaitingGrace,
    PollingDown,
    PollingUpConfirmed,
    Transferring,
    Closed,
}
