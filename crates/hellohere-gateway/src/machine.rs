//! Room lifecycle.
//!
//! ```text
//! (none) --request--> waiting --accept--> accepted --leave--> left | deleted
//!                        \--reject--> rejected
//! (none) --createRoom--> accepted
//! ```
//!
//! `rejected` and `left` are terminal. Messages are only accepted while a
//! room is `accepted`.

use std::fmt;

use hellohere_types::models::{ChatRoom, RoomStatus};

use crate::error::ChatError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomAction {
    Accept,
    Reject,
    SendMessage,
    Leave,
}

impl RoomAction {
    pub const ALL: [RoomAction; 4] = [Self::Accept, Self::Reject, Self::SendMessage, Self::Leave];
}

impl fmt::Display for RoomAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Accept => "accept",
            Self::Reject => "reject",
            Self::SendMessage => "send to",
            Self::Leave => "leave",
        })
    }
}

/// Status after applying `action` to a room in `current`.
pub fn next_status(current: RoomStatus, action: RoomAction) -> Result<RoomStatus, ChatError> {
    use RoomAction::*;
    use RoomStatus::*;

    match (current, action) {
        (Waiting, Accept) => Ok(Accepted),
        (Waiting, Reject) => Ok(Rejected),
        (Accepted, SendMessage) => Ok(Accepted),
        (Accepted, Leave) => Ok(Left),
        (_, SendMessage) => Err(ChatError::RoomNotActive),
        (status, action) => Err(ChatError::Conflict(format!(
            "cannot {} a {} room",
            action, status
        ))),
    }
}

/// Whether a stored status may be overwritten with `to`.
pub fn can_transition(from: RoomStatus, to: RoomStatus) -> bool {
    RoomAction::ALL
        .iter()
        .any(|&action| from != to && next_status(from, action) == Ok(to))
}

/// Who may perform `action` on `room`: only the receiver answers a request,
/// either participant may write or leave.
pub fn authorize(room: &ChatRoom, user_id: &str, action: RoomAction) -> Result<(), ChatError> {
    match action {
        RoomAction::Accept | RoomAction::Reject if room.participant_b != user_id => Err(
            ChatError::Forbidden("only the receiver may answer a chat request".into()),
        ),
        _ if !room.is_participant(user_id) => {
            Err(ChatError::Forbidden("not a participant of this room".into()))
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    const STATUSES: [RoomStatus; 4] = [
        RoomStatus::Waiting,
        RoomStatus::Accepted,
        RoomStatus::Rejected,
        RoomStatus::Left,
    ];

    fn room(status: RoomStatus) -> ChatRoom {
        ChatRoom {
            room_id: "r1".into(),
            participant_a: "alice".into(),
            participant_b: "bob".into(),
            status,
            last_message: None,
            last_activity: 0,
            updated_at: Utc::now(),
            unread_count: None,
            is_active: None,
            metadata: None,
        }
    }

    #[test]
    fn test_every_status_action_pair_is_decided() {
        for status in STATUSES {
            for action in RoomAction::ALL {
                let got = next_status(status, action);
                let expected = match (status, action) {
                    (RoomStatus::Waiting, RoomAction::Accept) => Ok(RoomStatus::Accepted),
                    (RoomStatus::Waiting, RoomAction::Reject) => Ok(RoomStatus::Rejected),
                    (RoomStatus::Accepted, RoomAction::SendMessage) => Ok(RoomStatus::Accepted),
                    (RoomStatus::Accepted, RoomAction::Leave) => Ok(RoomStatus::Left),
                    (_, RoomAction::SendMessage) => Err(403),
                    _ => Err(409),
                };
                assert_eq!(
                    got.map_err(|e| e.status()),
                    expected,
                    "{:?} x {:?}",
                    status,
                    action
                );
            }
        }
    }

    #[test]
    fn test_terminal_states_have_no_exit() {
        for to in STATUSES {
            assert!(!can_transition(RoomStatus::Rejected, to));
            assert!(!can_transition(RoomStatus::Left, to));
        }
        assert!(can_transition(RoomStatus::Waiting, RoomStatus::Accepted));
        assert!(can_transition(RoomStatus::Accepted, RoomStatus::Left));
        assert!(!can_transition(RoomStatus::Accepted, RoomStatus::Accepted));
        assert!(!can_transition(RoomStatus::Accepted, RoomStatus::Waiting));
    }

    #[test]
    fn test_only_receiver_answers() {
        let r = room(RoomStatus::Waiting);
        assert!(authorize(&r, "bob", RoomAction::Accept).is_ok());
        assert_eq!(authorize(&r, "alice", RoomAction::Accept).unwrap_err().status(), 403);
        assert_eq!(authorize(&r, "mallory", RoomAction::Reject).unwrap_err().status(), 403);
    }

    #[test]
    fn test_outsiders_cannot_write_or_leave() {
        let r = room(RoomStatus::Accepted);
        assert!(authorize(&r, "alice", RoomAction::SendMessage).is_ok());
        assert!(authorize(&r, "bob", RoomAction::Leave).is_ok());
        assert!(authorize(&r, "mallory", RoomAction::SendMessage).is_err());
        assert!(authorize(&r, "mallory", RoomAction::Leave).is_err());
    }
}
