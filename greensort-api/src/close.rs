// Websocket close code semantics

/// Clean, intentional close. The peer must not reconnect.
pub const CLOSE_NORMAL: u16 = 1000;

/// Server at capacity; the client retries with backoff
pub const CLOSE_TRY_AGAIN_LATER: u16 = 1013;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseKind {
    Clean,
    Abnormal,
}

impl CloseKind {
    /// Classify a close; `None` means the stream ended without a close frame
    pub fn from_code(code: Option<u16>) -> Self {
        match code {
            Some(CLOSE_NORMAL) => CloseKind::Clean,
            _ => CloseKind::Abnormal,
        }
    }

    pub fn should_reconnect(&self) -> bool {
        matches!(self, CloseKind::Abnormal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_1000_is_clean() {
        assert_eq!(CloseKind::from_code(Some(1000)), CloseKind::Clean);
        assert!(!CloseKind::Clean.should_reconnect());
        for code in [1001, 1006, 1011, CLOSE_TRY_AGAIN_LATER, 4000] {
            assert!(CloseKind::from_code(Some(code)).should_reconnect());
        }
        assert_eq!(CloseKind::from_code(None), CloseKind::Abnormal);
    }
}
