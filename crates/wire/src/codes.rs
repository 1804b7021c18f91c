/// Auth handshake response codes (`spec.md` §4.5). `Unknown` is reserved
/// and must never be written to the wire: an `Unknown` in error-handling
/// code means "close without a reply frame".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ResponseCode {
    Unknown = 0,
    InternalError = 1,
    LoginTimeout = 2,
    InvalidToken = 3,
    InvalidServer = 4,
    LoginConflict = 5,
    LoginSuccess = 6,
}

impl ResponseCode {
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// UDP gameplay request codes (`spec.md` §4.4). Any byte not covered here
/// is an unknown request code and the packet is dropped silently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RequestCode {
    SyncPos = 1,
    Logout = 2,
    CreateLobby = 3,
    InviteLobby = 4,
    LeaveLobby = 5,
    AcceptLobbyInvites = 6,
}

impl RequestCode {
    pub fn from_u8(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::SyncPos),
            2 => Some(Self::Logout),
            3 => Some(Self::CreateLobby),
            4 => Some(Self::InviteLobby),
            5 => Some(Self::LeaveLobby),
            6 => Some(Self::AcceptLobbyInvites),
            _ => None,
        }
    }
}
