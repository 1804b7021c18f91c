use std::fmt;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;

use aes_gcm::aead::KeyInit;
use aes_gcm::Aes256Gcm;
use rand::RngCore;

use crate::error::SessionError;

/// Session index. Immutable for the session's lifetime; also the key used
/// in packet headers.
pub type Sidx = u32;

/// A session's place in the matchmaking/game lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameState {
    Idle,
    InLobby,
    Queued,
    InMatch,
}

struct MutableState {
    state_idx: i32,
    game_state: GameState,
}

/// A live, authenticated client session: its SIDX, identity, and AEAD key
/// material. `state_idx` and `game_state` are the only fields handlers
/// mutate after creation, so they alone sit behind a per-session mutex.
pub struct Session {
    sidx: Sidx,
    version: u8,
    uid: u64,
    login_time: Instant,
    shared_key: [u8; 32],
    cipher: Aes256Gcm,
    state: Mutex<MutableState>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("sidx", &self.sidx)
            .field("version", &self.version)
            .field("uid", &self.uid)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Build a fresh session for `sidx`/`uid` with a freshly generated
    /// 32-byte key. Used as the default factory passed to
    /// [`SessionTable::new_session`].
    pub fn generate(sidx: Sidx, uid: u64, version: u8) -> Result<Self, SessionError> {
        let mut shared_key = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut shared_key);
        let cipher =
            Aes256Gcm::new_from_slice(&shared_key).map_err(|_| SessionError::FactoryFailed)?;
        Ok(Self {
            sidx,
            version,
            uid,
            login_time: Instant::now(),
            shared_key,
            cipher,
            state: Mutex::new(MutableState {
                state_idx: -1,
                game_state: GameState::Idle,
            }),
        })
    }

    pub fn sidx(&self) -> Sidx {
        self.sidx
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn uid(&self) -> u64 {
        self.uid
    }

    pub fn login_time(&self) -> Instant {
        self.login_time
    }

    pub fn shared_key(&self) -> &[u8; 32] {
        &self.shared_key
    }

    pub(crate) fn cipher(&self) -> &Aes256Gcm {
        &self.cipher
    }

    pub fn state_idx(&self) -> i32 {
        self.state.lock().unwrap().state_idx
    }

    pub fn set_state_idx(&self, state_idx: i32) {
        self.state.lock().unwrap().state_idx = state_idx;
    }

    pub fn game_state(&self) -> GameState {
        self.state.lock().unwrap().game_state
    }

    pub fn set_game_state(&self, game_state: GameState) {
        self.state.lock().unwrap().game_state = game_state;
    }
}

/// One slot in the session table. `Reserved` is the sentinel a thread
/// parks in a slot while it runs the (possibly slow) session factory
/// outside the table's lock, per `spec.md`'s two-phase allocation.
enum SessionSlot {
    Empty,
    Reserved,
    Live(Arc<Session>),
}

struct Inner {
    slots: Vec<SessionSlot>,
    empty_count: usize,
}

/// The maximum number of slots the table will grow to, matching the
/// "table.len() <= 2^32" invariant.
const MAX_SLOTS: u64 = 1u64 << 32;

/// Dense, concurrently-accessed table mapping [`Sidx`] to [`Session`].
///
/// Reads (`get`, `get_from_uid`) take a shared lock; only allocation and
/// removal need exclusive access, so concurrent packet verification never
/// blocks on concurrent logins.
pub struct SessionTable {
    inner: RwLock<Inner>,
    max_slots: u64,
}

impl Default for SessionTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionTable {
    pub fn new() -> Self {
        Self::with_max_slots(MAX_SLOTS)
    }

    /// Builds a table with a caller-chosen slot ceiling instead of
    /// `MAX_SLOTS`, so tests can exercise the full-table path without
    /// allocating billions of slots.
    fn with_max_slots(max_slots: u64) -> Self {
        Self {
            inner: RwLock::new(Inner {
                slots: Vec::new(),
                empty_count: 0,
            }),
            max_slots,
        }
    }

    /// Reserve a SIDX, run `factory(sidx, uid)` outside the table lock, and
    /// install the result. Returns `SessionError::TableFull` if the table
    /// has grown to `MAX_SLOTS` with no empty slot to reuse, or
    /// `SessionError::FactoryFailed` if the factory itself fails; in both
    /// error cases the reserved slot is released.
    pub fn new_session<F>(&self, uid: u64, factory: F) -> Result<Arc<Session>, SessionError>
    where
        F: FnOnce(Sidx, u64) -> Option<Session>,
    {
        let sidx = {
            let mut inner = self.inner.write().unwrap();
            if let Some(pos) = inner
                .slots
                .iter()
                .position(|slot| matches!(slot, SessionSlot::Empty))
            {
                inner.slots[pos] = SessionSlot::Reserved;
                inner.empty_count -= 1;
                pos as Sidx
            } else {
                if inner.slots.len() as u64 >= self.max_slots {
                    return Err(SessionError::TableFull);
                }
                inner.slots.push(SessionSlot::Reserved);
                (inner.slots.len() - 1) as Sidx
            }
        };

        match factory(sidx, uid) {
            Some(session) => {
                let session = Arc::new(session);
                let mut inner = self.inner.write().unwrap();
                inner.slots[sidx as usize] = SessionSlot::Live(session.clone());
                Ok(session)
            }
            None => {
                let mut inner = self.inner.write().unwrap();
                inner.slots[sidx as usize] = SessionSlot::Empty;
                inner.empty_count += 1;
                Err(SessionError::FactoryFailed)
            }
        }
    }

    /// Bounds-checked lookup. Returns `None` for empty, reserved, or
    /// out-of-range slots.
    pub fn get(&self, sidx: Sidx) -> Option<Arc<Session>> {
        let inner = self.inner.read().unwrap();
        match inner.slots.get(sidx as usize) {
            Some(SessionSlot::Live(session)) => Some(session.clone()),
            _ => None,
        }
    }

    /// Linear scan over live slots for a matching uid. O(n); only the auth
    /// handshake's conflict check should call this.
    pub fn get_from_uid(&self, uid: u64) -> Option<Arc<Session>> {
        let inner = self.inner.read().unwrap();
        inner.slots.iter().find_map(|slot| match slot {
            SessionSlot::Live(session) if session.uid() == uid => Some(session.clone()),
            _ => None,
        })
    }

    /// Clear the slot at `sidx`, if non-empty, incrementing the empty count.
    pub fn remove(&self, sidx: Sidx) {
        let mut inner = self.inner.write().unwrap();
        if let Some(slot) = inner.slots.get_mut(sidx as usize) {
            if !matches!(slot, SessionSlot::Empty) {
                *slot = SessionSlot::Empty;
                inner.empty_count += 1;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn factory(sidx: Sidx, uid: u64) -> Option<Session> {
        Session::generate(sidx, uid, 1).ok()
    }

    #[test]
    fn new_session_then_get_returns_same_session() {
        let table = SessionTable::new();
        let session = table.new_session(42, factory).unwrap();
        let fetched = table.get(session.sidx()).unwrap();
        assert_eq!(fetched.uid(), 42);
        assert_eq!(fetched.sidx(), session.sidx());
    }

    #[test]
    fn remove_then_get_returns_none() {
        let table = SessionTable::new();
        let session = table.new_session(1, factory).unwrap();
        let sidx = session.sidx();
        table.remove(sidx);
        assert!(table.get(sidx).is_none());
    }

    #[test]
    fn get_out_of_range_returns_none() {
        let table = SessionTable::new();
        assert!(table.get(999).is_none());
    }

    #[test]
    fn removed_slot_is_reused_by_next_new_session() {
        let table = SessionTable::new();
        let first = table.new_session(1, factory).unwrap();
        let sidx = first.sidx();
        table.remove(sidx);
        let second = table.new_session(2, factory).unwrap();
        assert_eq!(second.sidx(), sidx);
    }

    #[test]
    fn failing_factory_releases_the_reserved_slot() {
        let table = SessionTable::new();
        assert_eq!(
            table.new_session(1, |_, _| None).unwrap_err(),
            SessionError::FactoryFailed
        );
        assert_eq!(table.len(), 1);
        // the released slot is reused rather than growing the table again
        let session = table.new_session(2, factory).unwrap();
        assert_eq!(session.sidx(), 0);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn get_from_uid_finds_live_session_only() {
        let table = SessionTable::new();
        let session = table.new_session(7, factory).unwrap();
        assert_eq!(table.get_from_uid(7).unwrap().sidx(), session.sidx());
        table.remove(session.sidx());
        assert!(table.get_from_uid(7).is_none());
    }

    #[test]
    fn new_session_on_a_full_table_returns_table_full() {
        let table = SessionTable::with_max_slots(2);
        table.new_session(1, factory).unwrap();
        table.new_session(2, factory).unwrap();
        assert_eq!(
            table.new_session(3, factory).unwrap_err(),
            SessionError::TableFull
        );
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn state_idx_and_game_state_round_trip_through_the_session_mutex() {
        let session = Session::generate(0, 1, 1).unwrap();
        assert_eq!(session.state_idx(), -1);
        assert_eq!(session.game_state(), GameState::Idle);
        session.set_state_idx(3);
        session.set_game_state(GameState::InLobby);
        assert_eq!(session.state_idx(), 3);
        assert_eq!(session.game_state(), GameState::InLobby);
    }
}
