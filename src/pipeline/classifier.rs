//! Reply content classification. Pure, no I/O.

/// What a reply asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyIntent {
    /// Opt-out request.
    Stop,
    /// Anything else.
    Other,
}

/// Classify reply content. Only an exact `stop` (trimmed, any case) opts out.
pub fn classify(content: &str) -> ReplyIntent {
    if content.trim().to_lowercase() == "stop" {
        ReplyIntent::Stop
    } else {
        ReplyIntent::Other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_in_any_case_and_padding() {
        for content in ["stop", "STOP", "Stop", "  sToP\n", "\tstop "] {
            assert_eq!(classify(content), ReplyIntent::Stop, "{content:?}");
        }
    }

    #[test]
    fn everything_else_is_other() {
        for content in ["YES", "Hello", "", "   ", "stop please", "STOP!", "unsubscribe", "s t o p"] {
            assert_eq!(classify(content), ReplyIntent::Other, "{content:?}");
        }
    }
}
