//! Bootstrap script templating
//!
//! Each pool member runs a startup script rendered from a per-tier template.
//! The core does not interpret the script; it guarantees the substitution
//! values — the unit's role name, the peer group identifiers it was given
//! and, for orchestrator tiers, the fixed pool size — are resolved strings
//! by the time the script is rendered.

use groundplan_core::{GroupId, PlanError, Result};
use serde::Serialize;
use tera::{Context, Tera};

/// Renders a unit's bootstrap template with its resolved substitution
/// values.
pub struct BootstrapRenderer {
    context: Context,
}

impl BootstrapRenderer {
    pub fn new(role_name: &str, peer_groups: &[GroupId]) -> Self {
        let mut context = Context::new();
        context.insert("role_name", role_name);
        context.insert(
            "peer_groups",
            &peer_groups
                .iter()
                .map(|g| g.as_str().to_string())
                .collect::<Vec<_>>(),
        );
        Self { context }
    }

    /// Declared fixed pool size, supplied by the orchestrator tiers.
    pub fn pool_size(&mut self, size: u32) -> &mut Self {
        self.context.insert("pool_size", &size);
        self
    }

    pub fn variable(&mut self, key: &str, value: impl Serialize) -> &mut Self {
        self.context.insert(key, &value);
        self
    }

    pub fn render(&self, template: &str) -> Result<String> {
        Tera::one_off(template, &self.context, false)
            .map_err(|e| PlanError::TemplateRender(e.to_string()))
    }
}

/// Built-in startup scripts, one per tier.
pub mod scripts {
    /// Access host: nothing to start, just mark the role for operators.
    pub const ACCESS: &str = r#"#!/bin/bash
set -euo pipefail
# access host, running as {{ role_name }}
"#;

    /// Discovery servers form the cluster other tiers join.
    pub const DISCOVERY_SERVER: &str = r#"#!/bin/bash
set -euo pipefail

export FLEET_PEER_GROUPS="{{ peer_groups | join(sep=",") }}"

/opt/consul/bin/run-consul \
  --server \
  --cluster-tag-key "consul-servers" \
  --cluster-tag-value "auto-join"
"#;

    /// Secret store: joins discovery as a client, then starts the store
    /// against its storage, KV and unseal backends.
    pub const SECRET_STORE: &str = r#"#!/bin/bash
set -euo pipefail

/opt/vault/bin/update-certificate \
  --vault-role "{{ role_name }}" \
  --cert-name "vault" \
  --common-name "vault.service.consul" || true

/opt/consul/bin/run-consul \
  --user vault \
  --client \
  --cluster-tag-key "consul-servers" \
  --cluster-tag-value "auto-join" || true

/opt/vault/bin/run-vault \
  --enable-object-backend \
  --storage-bucket "{{ storage_bucket }}" \
  --storage-region "{{ region }}" \
  --enable-kv-backend \
  --kv-table "{{ kv_table }}" \
  --kv-region "{{ region }}" \
  --enable-auto-unseal \
  --auto-unseal-key-id "{{ unseal_key }}" \
  --auto-unseal-key-region "{{ region }}"
"#;

    /// Orchestrator servers need the expected server count for quorum.
    pub const ORCHESTRATOR_SERVER: &str = r#"#!/bin/bash
set -euo pipefail

/opt/vault/bin/generate-certificate \
  --vault-role "{{ role_name }}" \
  --tls-dir "/opt/nomad/tls" \
  --cert-name "nomad" \
  --common-name "nomad.service.consul" || true

/opt/consul/bin/run-consul \
  --user nomad \
  --client \
  --cluster-tag-key "consul-servers" \
  --cluster-tag-value "auto-join" || true

/opt/nomad/bin/run-nomad \
  --server \
  --num-servers {{ pool_size }}
"#;

    /// Orchestrator clients authenticate against the secret store first.
    pub const ORCHESTRATOR_CLIENT: &str = r#"#!/bin/bash
set -euo pipefail

export VAULT_ADDR=$(/opt/vault/bin/find-vault)
export FLEET_PEER_GROUPS="{{ peer_groups | join(sep=",") }}"

vault login -method=aws role="{{ role_name }}"

/opt/consul/bin/run-consul \
  --user nomad \
  --client \
  --cluster-tag-key "consul-servers" \
  --cluster-tag-value "auto-join" || true

/opt/nomad/bin/run-nomad --client
"#;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peer_groups_render_as_resolved_identifiers() {
        let renderer = BootstrapRenderer::new(
            "orchestrator-client",
            &[GroupId::new("sg-access-from-bastion"), GroupId::new("sg-discovery-client")],
        );
        let rendered = renderer.render(scripts::ORCHESTRATOR_CLIENT).unwrap();

        assert!(rendered.contains("sg-access-from-bastion,sg-discovery-client"));
        assert!(rendered.contains(r#"role="orchestrator-client""#));
    }

    #[test]
    fn orchestrator_server_receives_the_pool_size() {
        let mut renderer = BootstrapRenderer::new("orchestrator-server", &[]);
        renderer.pool_size(3);
        let rendered = renderer.render(scripts::ORCHESTRATOR_SERVER).unwrap();
        assert!(rendered.contains("--num-servers 3"));
    }

    #[test]
    fn missing_variable_is_a_template_error() {
        let renderer = BootstrapRenderer::new("secret-store", &[]);
        // SECRET_STORE also needs storage_bucket, kv_table, unseal_key, region
        let err = renderer.render(scripts::SECRET_STORE).unwrap_err();
        assert!(matches!(err, PlanError::TemplateRender(_)));
    }
}
