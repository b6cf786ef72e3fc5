//! Pure, deterministic Caddyfile generation. No I/O: given the same
//! placements/hosts/mappings, byte-identical output every time.

use fleet_client::entities::{domain::DomainMapping, host::Host, placement::ServicePlacement};

pub const RESERVED_HEALTH_PATH: &str = "/__fleet_health";
const MANAGED_HEADER: &str = "# managed-by: fleet-core -- generated, do not hand-edit\n";

/// One running or draining placement, resolved to the address of the
/// host it lives on. Draining placements stay in the upstream set so
/// in-flight requests keep completing during the drain window.
pub struct UpstreamTarget {
  pub address: String,
  pub port: u16,
}

/// Builds the full reverse-proxy config from current state. Inputs
/// are pre-filtered by the caller (running/draining placements only,
/// verified mappings only); this function does no filtering of its
/// own so its output is a pure function of what it's given.
pub fn generate(placements: &[ServicePlacement], hosts: &[Host], mappings: &[DomainMapping]) -> String {
  let mut targets: Vec<UpstreamTarget> = placements
    .iter()
    .filter_map(|p| {
      hosts
        .iter()
        .find(|h| h.id == p.host_id)
        .map(|h| UpstreamTarget { address: h.address.clone(), port: p.port })
    })
    .collect();
  targets.sort_by(|a, b| (&a.address, a.port).cmp(&(&b.address, b.port)));

  let mut sorted_mappings: Vec<&DomainMapping> = mappings.iter().collect();
  sorted_mappings.sort_by(|a, b| a.domain.cmp(&b.domain));

  let mut out = String::new();
  out.push_str(MANAGED_HEADER);
  out.push('\n');

  out.push_str("(upstreams) {\n");
  out.push_str("\treverse_proxy {\n");
  if targets.is_empty() {
    out.push_str("\t\t# no running placements\n");
  }
  for target in &targets {
    out.push_str(&format!("\t\tto {}:{}\n", target.address, target.port));
  }
  out.push_str("\t\thealth_uri ");
  out.push_str(RESERVED_HEALTH_PATH);
  out.push('\n');
  out.push_str("\t}\n");
  out.push_str("}\n\n");

  for mapping in &sorted_mappings {
    out.push_str(&mapping.domain);
    out.push_str(" {\n");
    if mapping.tls {
      out.push_str("\ttls internal\n");
    } else {
      out.push_str("\ttls off\n");
    }
    out.push_str("\timport upstreams\n");
    out.push_str("}\n\n");
  }

  out.push_str(":80, :443 {\n");
  out.push_str("\tabort\n");
  out.push_str("}\n");

  out
}

#[cfg(test)]
mod tests {
  use super::*;
  use fleet_client::entities::{
    domain::VerificationStatus,
    host::{HostAuth, HostFacts, HostStatus},
    placement::PlacementStatus,
    ServiceKind,
  };

  fn host(id: i64, address: &str) -> Host {
    Host {
      id,
      name: format!("h{id}"),
      address: address.to_string(),
      port: 22,
      user: "deployer".into(),
      auth: HostAuth::PrivateKey { path: "/k".into() },
      declared_roles: vec![ServiceKind::AppWorker],
      current_services: vec![ServiceKind::AppWorker],
      facts: HostFacts::default(),
      health_score: 100,
      last_probe_ts: None,
      consecutive_probe_failures: 0,
      status: HostStatus::Active,
      version: 0,
      created_ts: 0,
    }
  }

  fn placement(id: i64, host_id: i64, port: u16) -> ServicePlacement {
    ServicePlacement {
      id,
      name: format!("p{id}"),
      host_id,
      port,
      capacity: 1,
      current: 1,
      status: PlacementStatus::Running,
      last_seen_ts: None,
      created_ts: 0,
    }
  }

  fn mapping(id: i64, domain: &str, tls: bool) -> DomainMapping {
    DomainMapping {
      id,
      domain: domain.to_string(),
      target: "p1".into(),
      tls,
      cert_path: None,
      key_path: None,
      status: VerificationStatus::Verified,
      last_verified_ts: Some(1),
      created_ts: 0,
    }
  }

  #[test]
  fn same_inputs_produce_identical_output() {
    let hosts = vec![host(1, "10.0.0.5")];
    let placements = vec![placement(1, 1, 8069)];
    let mappings = vec![mapping(1, "tenant.example.com", true)];

    let a = generate(&placements, &hosts, &mappings);
    let b = generate(&placements, &hosts, &mappings);
    assert_eq!(a, b);
  }

  #[test]
  fn output_order_is_independent_of_input_order() {
    let hosts = vec![host(1, "10.0.0.5"), host(2, "10.0.0.6")];
    let placements = vec![placement(1, 1, 8069), placement(2, 2, 8070)];
    let mappings = vec![mapping(1, "b.example.com", false), mapping(2, "a.example.com", false)];

    let forward = generate(&placements, &hosts, &mappings);

    let mut placements_rev = placements.clone();
    placements_rev.reverse();
    let mut mappings_rev = mappings.clone();
    mappings_rev.reverse();
    let reversed = generate(&placements_rev, &hosts, &mappings_rev);

    assert_eq!(forward, reversed);
  }

  #[test]
  fn includes_catch_all_and_health_path() {
    let out = generate(&[], &[], &[]);
    assert!(out.contains(":80, :443 {"));
    assert!(out.contains("abort"));
    assert!(out.contains(RESERVED_HEALTH_PATH));
  }

  #[test]
  fn unverified_mappings_must_be_filtered_by_caller() {
    // generate() trusts its input; filtering verified-only happens
    // in mod.rs before calling this. Sanity check that an
    // unverified mapping passed in directly still renders -- this
    // documents the contract rather than testing a guard here.
    let unverified = DomainMapping { status: VerificationStatus::Unverified, ..mapping(1, "x.example.com", false) };
    let out = generate(&[], &[], &[unverified]);
    assert!(out.contains("x.example.com"));
  }
}
