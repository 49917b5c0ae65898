//! Abstraction over iptables chain and rule operations for testability.
//!
//! Mirrors the shape of the `iptables` crate's API so [`RealIptablesOps`] is
//! a thin pass-through; tests substitute [`mock::MockIptablesOps`].

pub trait IptablesOps: Send + Sync {
    fn chain_exists(&self, table: &str, chain: &str) -> Result<bool, Box<dyn std::error::Error>>;
    fn new_chain(&self, table: &str, chain: &str) -> Result<(), Box<dyn std::error::Error>>;
    fn flush_chain(&self, table: &str, chain: &str) -> Result<(), Box<dyn std::error::Error>>;
    fn delete_chain(&self, table: &str, chain: &str) -> Result<(), Box<dyn std::error::Error>>;
    fn append(&self, table: &str, chain: &str, rule: &str) -> Result<(), Box<dyn std::error::Error>>;
    fn exists(&self, table: &str, chain: &str, rule: &str) -> Result<bool, Box<dyn std::error::Error>>;
}

/// Production [`IptablesOps`] backed by the `iptables` crate.
pub struct RealIptablesOps {
    inner: iptables::IPTables,
}

impl RealIptablesOps {
    pub fn new() -> Result<Self, Box<dyn std::error::Error>> {
        Ok(Self { inner: iptables::new(false)? })
    }
}

impl IptablesOps for RealIptablesOps {
    fn chain_exists(&self, table: &str, chain: &str) -> Result<bool, Box<dyn std::error::Error>> {
        self.inner.chain_exists(table, chain)
    }

    fn new_chain(&self, table: &str, chain: &str) -> Result<(), Box<dyn std::error::Error>> {
        self.inner.new_chain(table, chain)
    }

    fn flush_chain(&self, table: &str, chain: &str) -> Result<(), Box<dyn std::error::Error>> {
        self.inner.flush_chain(table, chain)
    }

    fn delete_chain(&self, table: &str, chain: &str) -> Result<(), Box<dyn std::error::Error>> {
        self.inner.delete_chain(table, chain)
    }

    fn append(&self, table: &str, chain: &str, rule: &str) -> Result<(), Box<dyn std::error::Error>> {
        self.inner.append(table, chain, rule)
    }

    fn exists(&self, table: &str, chain: &str, rule: &str) -> Result<bool, Box<dyn std::error::Error>> {
        self.inner.exists(table, chain, rule)
    }
}

#[cfg(any(test, feature = "test-util"))]
pub mod mock {
    use super::IptablesOps;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct MockIptablesOps {
        chains: Mutex<HashMap<(String, String), Vec<String>>>,
    }

    impl MockIptablesOps {
        pub fn new() -> Self {
            Self::default()
        }

        fn key(table: &str, chain: &str) -> (String, String) {
            (table.to_string(), chain.to_string())
        }
    }

    impl IptablesOps for MockIptablesOps {
        fn chain_exists(&self, table: &str, chain: &str) -> Result<bool, Box<dyn std::error::Error>> {
            Ok(self.chains.lock().unwrap().contains_key(&Self::key(table, chain)))
        }

        fn new_chain(&self, table: &str, chain: &str) -> Result<(), Box<dyn std::error::Error>> {
            self.chains.lock().unwrap().entry(Self::key(table, chain)).or_default();
            Ok(())
        }

        fn flush_chain(&self, table: &str, chain: &str) -> Result<(), Box<dyn std::error::Error>> {
            if let Some(rules) = self.chains.lock().unwrap().get_mut(&Self::key(table, chain)) {
                rules.clear();
            }
            Ok(())
        }

        fn delete_chain(&self, table: &str, chain: &str) -> Result<(), Box<dyn std::error::Error>> {
            self.chains.lock().unwrap().remove(&Self::key(table, chain));
            Ok(())
        }

        fn append(&self, table: &str, chain: &str, rule: &str) -> Result<(), Box<dyn std::error::Error>> {
            self.chains
                .lock()
                .unwrap()
                .entry(Self::key(table, chain))
                .or_default()
                .push(rule.to_string());
            Ok(())
        }

        fn exists(&self, table: &str, chain: &str, rule: &str) -> Result<bool, Box<dyn std::error::Error>> {
            Ok(self
                .chains
                .lock()
                .unwrap()
                .get(&Self::key(table, chain))
                .is_some_and(|rules| rules.iter().any(|r| r == rule)))
        }
    }

    impl MockIptablesOps {
        /// Test-only introspection: snapshot of the rules currently
        /// installed in `table`/`chain`.
        pub fn list_for_test(&self, table: &str, chain: &str) -> Vec<String> {
            self.chains
                .lock()
                .unwrap()
                .get(&Self::key(table, chain))
                .cloned()
                .unwrap_or_default()
        }
    }
}
