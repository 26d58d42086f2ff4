use std::fmt::{Display, Formatter};

/// Tag for one accepted connection in log lines. ULIDs sort by creation
/// time, so a connection's lines group in accept order.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug)]
pub struct ConnectionId(ulid::Ulid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(ulid::Ulid::new())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for ConnectionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_distinct_and_ordered() {
        let first = ConnectionId::new();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = ConnectionId::new();
        assert_ne!(first, second);
        assert_eq!(first.to_string().len(), 26);
        assert!(first.to_string() < second.to_string());
    }
}
