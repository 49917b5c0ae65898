//! Installs and atomically replaces kernel rules that route marked egress
//! traffic via a chosen interface.

pub mod ip_route_ops;
pub mod iptables_ops;

#[cfg(any(test, feature = "test-util"))]
pub mod mocks {
    pub use super::ip_route_ops::mock::MockIpRouteOps;
    pub use super::iptables_ops::mock::MockIptablesOps;
}

use thiserror::Error;

use crate::tunnel::Slot;
use ip_route_ops::IpRouteOps;
use iptables_ops::IptablesOps;

pub const MANGLE_TABLE: &str = "mangle";
pub const MARK_CHAIN: &str = "VPN_ROUTING";
pub const PRIMARY_TABLE: &str = "vpn_primary";
pub const PRIMARY_TABLE_ID: u32 = 100;
pub const SECONDARY_TABLE: &str = "vpn_secondary";
pub const SECONDARY_TABLE_ID: u32 = 101;
pub const PROTECTED_MARK: u32 = 100;

#[derive(Debug, Error)]
pub enum Error {
    #[error("routing switch failed: {0}")]
    SwitchFailed(String),
}

/// Encapsulates the critical egress-switching operation. `switch_to` must be
/// observationally atomic from the perspective of marked egress traffic.
pub struct RoutingSwitcher {
    iptables: Box<dyn IptablesOps>,
    ip_route: Box<dyn IpRouteOps>,
    /// UID of the protected identity, resolved once at startup (spec §9).
    protected_uid: u32,
}

impl RoutingSwitcher {
    pub fn new(iptables: Box<dyn IptablesOps>, ip_route: Box<dyn IpRouteOps>, protected_uid: u32) -> Self {
        Self {
            iptables,
            ip_route,
            protected_uid,
        }
    }

    /// Idempotent: ensures the two routing tables and the mark chain exist,
    /// tolerating pre-existing state.
    pub async fn setup(&self) -> Result<(), Error> {
        self.ip_route
            .ensure_rt_table(PRIMARY_TABLE_ID, PRIMARY_TABLE)
            .await
            .map_err(|e| Error::SwitchFailed(e.to_string()))?;
        self.ip_route
            .ensure_rt_table(SECONDARY_TABLE_ID, SECONDARY_TABLE)
            .await
            .map_err(|e| Error::SwitchFailed(e.to_string()))?;

        let chain_exists = self
            .iptables
            .chain_exists(MANGLE_TABLE, MARK_CHAIN)
            .map_err(|e| Error::SwitchFailed(e.to_string()))?;
        if !chain_exists {
            self.iptables
                .new_chain(MANGLE_TABLE, MARK_CHAIN)
                .map_err(|e| Error::SwitchFailed(e.to_string()))?;
            self.iptables
                .append(MANGLE_TABLE, "OUTPUT", &format!("-j {MARK_CHAIN}"))
                .map_err(|e| Error::SwitchFailed(e.to_string()))?;
        }

        tracing::info!("routing setup complete");
        Ok(())
    }

    /// Switches marked egress to `slot`'s interface via the five-step
    /// protocol of spec §4.6. Any step failing returns `SwitchFailed` and
    /// leaves the binding in whatever state it reached.
    pub async fn switch_to(&self, slot: Slot) -> Result<(), Error> {
        let interface = slot.interface();

        self.iptables
            .flush_chain(MANGLE_TABLE, MARK_CHAIN)
            .map_err(|e| Error::SwitchFailed(format!("flush mark chain: {e}")))?;

        let mark_rule = format!("-m owner --uid-owner {} -j MARK --set-mark {PROTECTED_MARK}", self.protected_uid);
        self.iptables
            .append(MANGLE_TABLE, MARK_CHAIN, &mark_rule)
            .map_err(|e| Error::SwitchFailed(format!("install mark rule: {e}")))?;

        self.ip_route
            .ensure_fwmark_rule(PROTECTED_MARK, PRIMARY_TABLE)
            .await
            .map_err(|e| Error::SwitchFailed(format!("ensure fwmark rule: {e}")))?;

        self.ip_route
            .replace_default_route(PRIMARY_TABLE, interface)
            .await
            .map_err(|e| Error::SwitchFailed(format!("replace default route: {e}")))?;

        self.ip_route
            .flush_route_cache()
            .await
            .map_err(|e| Error::SwitchFailed(format!("flush route cache: {e}")))?;

        tracing::info!(interface, "primary routing switched");
        Ok(())
    }

    /// Flushes and deletes the mark chain. Called at shutdown.
    pub async fn teardown(&self) -> Result<(), Error> {
        self.iptables
            .flush_chain(MANGLE_TABLE, MARK_CHAIN)
            .map_err(|e| Error::SwitchFailed(e.to_string()))?;
        self.iptables
            .delete_chain(MANGLE_TABLE, MARK_CHAIN)
            .map_err(|e| Error::SwitchFailed(e.to_string()))?;
        tracing::info!("routing torn down");
        Ok(())
    }
}
