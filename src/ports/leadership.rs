/// LeaderCheck defines the port (interface) deciding whether this replica
/// runs the health poller.
///
/// Leadership here is deliberately weak and best-effort: it is derived from
/// deployment wiring (an injected flag, an instance ordinal, ...), not from a
/// consensus protocol. The poller tolerates zero or multiple concurrent
/// leaders because probe recording is last-writer-wins idempotent per
/// observation; exactly one leader is simply the recommended deployment.
pub trait LeaderCheck: Send + Sync + 'static {
    /// Whether this process should run the polling loop
    fn is_leader(&self) -> bool;
}

/// Leadership decided once at startup from configuration.
pub struct StaticLeader(pub bool);

impl LeaderCheck for StaticLeader {
    fn is_leader(&self) -> bool {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_leader() {
        assert!(StaticLeader(true).is_leader());
        assert!(!StaticLeader(false).is_leader());
    }
}
