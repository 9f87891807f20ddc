//! Lock protocol messages.
//!
//! Every message is a single byte on the wire. The client sends `'1'` to ask
//! for the lock and `'2'` to give it back; the service answers each with one
//! byte of its choosing.

/// One byte exchanged with the coordination service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMessage {
    /// Client asks for the lock.
    Acquire,
    /// Client gives the lock back.
    Release,
    /// Service acknowledges the previous request.
    Ack(u8),
}

impl LockMessage {
    /// Wire encoding.
    pub fn to_byte(self) -> u8 {
        match self {
            LockMessage::Acquire => b'1',
            LockMessage::Release => b'2',
            LockMessage::Ack(byte) => byte,
        }
    }

    /// Interpret a byte read from the service.
    pub fn from_reply(byte: u8) -> Self {
        LockMessage::Ack(byte)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requests_are_ascii_digits() {
        assert_eq!(LockMessage::Acquire.to_byte(), b'1');
        assert_eq!(LockMessage::Release.to_byte(), b'2');
        assert_eq!(LockMessage::from_reply(b'1'), LockMessage::Ack(b'1'));
    }
}
