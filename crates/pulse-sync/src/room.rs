use std::fmt;

use pulse_db::path::check_segment;

use crate::error::{Result, SyncError};

/// Joins the two participant ids. Ids containing it are rejected so that
/// distinct pairs can never produce the same room id.
pub const SEPARATOR: char = '_';

/// Order-independent identifier of a two-party conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoomId(String);

impl RoomId {
    /// `derive(a, b) == derive(b, a)`: the ids are sorted and joined with `_`.
    pub fn derive(user_a: &str, user_b: &str) -> Result<Self> {
        check_participant(user_a)?;
        check_participant(user_b)?;
        if user_a == user_b {
            return Err(SyncError::InvalidParticipants);
        }

        let (first, second) = if user_a < user_b {
            (user_a, user_b)
        } else {
            (user_b, user_a)
        };
        Ok(Self(format!("{first}{SEPARATOR}{second}")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn check_participant(user_id: &str) -> Result<()> {
    if user_id.contains(SEPARATOR) || check_segment(user_id).is_err() {
        return Err(SyncError::InvalidParticipants);
    }
    Ok(())
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commutative() {
        let ab = RoomId::derive("u1", "u2").unwrap();
        let ba = RoomId::derive("u2", "u1").unwrap();
        assert_eq!(ab, ba);
        assert_eq!(ab.as_str(), "u1_u2");

        for (a, b) in [("zed", "amy"), ("uid-1", "uid-2"), ("B", "a"), ("x1", "x10")] {
            assert_eq!(RoomId::derive(a, b).unwrap(), RoomId::derive(b, a).unwrap());
        }
    }

    #[test]
    fn test_rejects_self_and_empty() {
        assert!(matches!(RoomId::derive("u1", "u1"), Err(SyncError::InvalidParticipants)));
        assert!(matches!(RoomId::derive("", "u1"), Err(SyncError::InvalidParticipants)));
        assert!(matches!(RoomId::derive("u1", ""), Err(SyncError::InvalidParticipants)));
    }

    #[test]
    fn test_rejects_ids_that_could_collide() {
        // "a_b" + "c" and "a" + "b_c" would both join to "a_b_c"
        assert!(RoomId::derive("a_b", "c").is_err());
        assert!(RoomId::derive("a", "b_c").is_err());
        assert!(RoomId::derive("a/b", "c").is_err());
    }
}
