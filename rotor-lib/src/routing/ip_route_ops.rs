//! `ip rule` / `ip route` / `/etc/iproute2/rt_tables` operations. The
//! `iptables` crate has no equivalent for these, so they're shelled out via
//! [`CommandRunner`], mirroring the teacher's `ShellOps` abstraction.

use async_trait::async_trait;

use std::time::Duration;

use crate::command_runner::{self, CommandRunner};

const OP_TIMEOUT: Duration = Duration::from_secs(10);

#[async_trait]
pub trait IpRouteOps: Send + Sync {
    /// Appends `<id> <name>` to `/etc/iproute2/rt_tables` unless an entry
    /// with that name already exists (create-if-absent).
    async fn ensure_rt_table(&self, id: u32, name: &str) -> Result<(), command_runner::Error>;
    async fn ensure_fwmark_rule(&self, mark: u32, table: &str) -> Result<(), command_runner::Error>;
    async fn replace_default_route(&self, table: &str, interface: &str) -> Result<(), command_runner::Error>;
    async fn flush_route_cache(&self) -> Result<(), command_runner::Error>;
}

pub struct ShellIpRouteOps {
    runner: std::sync::Arc<dyn CommandRunner>,
}

impl ShellIpRouteOps {
    pub fn new(runner: std::sync::Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl IpRouteOps for ShellIpRouteOps {
    async fn ensure_rt_table(&self, id: u32, name: &str) -> Result<(), command_runner::Error> {
        let command = format!(
            "grep -qE '^{id}[[:space:]]+{name}$' /etc/iproute2/rt_tables || echo '{id} {name}' >> /etc/iproute2/rt_tables"
        );
        self.runner.run(&command, OP_TIMEOUT).await?;
        Ok(())
    }

    async fn ensure_fwmark_rule(&self, mark: u32, table: &str) -> Result<(), command_runner::Error> {
        let command = format!(
            "ip rule list | grep -q 'fwmark 0x{mark:x} lookup {table}' || ip rule add fwmark {mark} table {table}"
        );
        self.runner.run(&command, OP_TIMEOUT).await?;
        Ok(())
    }

    async fn replace_default_route(&self, table: &str, interface: &str) -> Result<(), command_runner::Error> {
        let command = format!("ip route replace default dev {interface} table {table}");
        self.runner.run(&command, OP_TIMEOUT).await?;
        Ok(())
    }

    async fn flush_route_cache(&self) -> Result<(), command_runner::Error> {
        self.runner.run("ip route flush cache", OP_TIMEOUT).await?;
        Ok(())
    }
}

#[cfg(any(test, feature = "test-util"))]
pub mod mock {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct MockIpRouteOps {
        pub calls: Mutex<Vec<String>>,
    }

    impl MockIpRouteOps {
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl IpRouteOps for MockIpRouteOps {
        async fn ensure_rt_table(&self, id: u32, name: &str) -> Result<(), command_runner::Error> {
            self.calls.lock().unwrap().push(format!("ensure_rt_table({id}, {name})"));
            Ok(())
        }

        async fn ensure_fwmark_rule(&self, mark: u32, table: &str) -> Result<(), command_runner::Error> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("ensure_fwmark_rule({mark}, {table})"));
            Ok(())
        }

        async fn replace_default_route(&self, table: &str, interface: &str) -> Result<(), command_runner::Error> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("replace_default_route({table}, {interface})"));
            Ok(())
        }

        async fn flush_route_cache(&self) -> Result<(), command_runner::Error> {
            self.calls.lock().unwrap().push("flush_route_cache()".to_string());
            Ok(())
        }
    }
}
