//! Shared scaffolding for end-to-end rotation scenarios: forwarding wrappers
//! around the crate's mock collaborators (needed since traits can't be
//! implemented on a bare `Arc<Mock...>` from outside the defining crate) plus
//! a pre-seeded [`MockCommandRunner`] so every tunnel lifecycle call
//! succeeds regardless of call order.

use std::sync::Arc;
use std::time::Duration;

use rotor_lib::command_runner::mock::MockCommandRunner;
use rotor_lib::probe::{self, ReachabilityProbe, mock::MockProbe};
use rotor_lib::routing::ip_route_ops::{self, IpRouteOps};
use rotor_lib::routing::iptables_ops::{self, IptablesOps};
use rotor_lib::routing::mocks::{MockIpRouteOps, MockIptablesOps};
use rotor_lib::routing::RoutingSwitcher;
use rotor_lib::tunnel::{Slot, TunnelController};

pub struct ArcIptables(pub Arc<MockIptablesOps>);

impl iptables_ops::IptablesOps for ArcIptables {
    fn chain_exists(&self, t: &str, c: &str) -> Result<bool, Box<dyn std::error::Error>> {
        self.0.chain_exists(t, c)
    }
    fn new_chain(&self, t: &str, c: &str) -> Result<(), Box<dyn std::error::Error>> {
        self.0.new_chain(t, c)
    }
    fn flush_chain(&self, t: &str, c: &str) -> Result<(), Box<dyn std::error::Error>> {
        self.0.flush_chain(t, c)
    }
    fn delete_chain(&self, t: &str, c: &str) -> Result<(), Box<dyn std::error::Error>> {
        self.0.delete_chain(t, c)
    }
    fn append(&self, t: &str, c: &str, r: &str) -> Result<(), Box<dyn std::error::Error>> {
        self.0.append(t, c, r)
    }
    fn exists(&self, t: &str, c: &str, r: &str) -> Result<bool, Box<dyn std::error::Error>> {
        self.0.exists(t, c, r)
    }
}

pub struct ArcIpRoute(pub Arc<MockIpRouteOps>);

#[async_trait::async_trait]
impl ip_route_ops::IpRouteOps for ArcIpRoute {
    async fn ensure_rt_table(&self, id: u32, name: &str) -> Result<(), rotor_lib::command_runner::Error> {
        self.0.ensure_rt_table(id, name).await
    }
    async fn ensure_fwmark_rule(&self, mark: u32, table: &str) -> Result<(), rotor_lib::command_runner::Error> {
        self.0.ensure_fwmark_rule(mark, table).await
    }
    async fn replace_default_route(&self, table: &str, interface: &str) -> Result<(), rotor_lib::command_runner::Error> {
        self.0.replace_default_route(table, interface).await
    }
    async fn flush_route_cache(&self) -> Result<(), rotor_lib::command_runner::Error> {
        self.0.flush_route_cache().await
    }
}

pub struct ProbeHandle(pub Arc<MockProbe>);

#[async_trait::async_trait]
impl ReachabilityProbe for ProbeHandle {
    async fn probe(&self, slot: Slot) -> Result<bool, probe::Error> {
        self.0.probe(slot).await
    }
}

/// A command runner whose every response carries `"inet "` in stdout, so
/// disconnect/launch/liveness-poll calls all succeed regardless of which
/// queue slot a given call consumes.
pub fn seeded_runner() -> Arc<MockCommandRunner> {
    let runner = Arc::new(MockCommandRunner::new());
    for _ in 0..500 {
        runner.push_success("tun: <UP> inet 10.0.0.2/24");
    }
    runner
}

pub fn tunnel_controller(runner: Arc<MockCommandRunner>) -> TunnelController {
    TunnelController::new(runner, "openvpn", Duration::from_secs(30))
}

pub fn routing_switcher() -> (RoutingSwitcher, Arc<MockIptablesOps>, Arc<MockIpRouteOps>) {
    let iptables = Arc::new(MockIptablesOps::new());
    let ip_route = Arc::new(MockIpRouteOps::new());
    let switcher = RoutingSwitcher::new(Box::new(ArcIptables(iptables.clone())), Box::new(ArcIpRoute(ip_route.clone())), 1000);
    (switcher, iptables, ip_route)
}
