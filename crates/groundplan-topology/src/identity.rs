//! Identity and role policy model
//!
//! The identity a compute fleet assumes: a trusted principal plus a set of
//! permission statements. Immutable once built. A role with no granted
//! capability is rejected — at minimum a fleet must be able to describe its
//! own membership for discovery bootstrap.

use groundplan_core::{PlanError, Result};
use serde::Serialize;

/// Principal assumed by compute fleets.
pub const COMPUTE_PRINCIPAL: &str = "ec2.amazonaws.com";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Effect {
    Allow,
    Deny,
}

/// One permission statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyStatement {
    pub effect: Effect,
    pub actions: Vec<String>,
    pub resources: Vec<String>,
}

impl PolicyStatement {
    pub fn allow(actions: &[&str], resources: &[&str]) -> Self {
        Self {
            effect: Effect::Allow,
            actions: actions.iter().map(|a| a.to_string()).collect(),
            resources: resources.iter().map(|r| r.to_string()).collect(),
        }
    }
}

/// The identity a cluster unit's fleet runs as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RolePolicy {
    name: String,
    trusted_principal: String,
    statements: Vec<PolicyStatement>,
}

impl RolePolicy {
    /// Fails with [`PlanError::InvalidPolicy`] when `statements` is empty.
    pub fn new(
        name: impl Into<String>,
        trusted_principal: impl Into<String>,
        statements: Vec<PolicyStatement>,
    ) -> Result<Self> {
        let name = name.into();
        if statements.is_empty() {
            return Err(PlanError::InvalidPolicy(name));
        }
        Ok(Self {
            name,
            trusted_principal: trusted_principal.into(),
            statements,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn trusted_principal(&self) -> &str {
        &self.trusted_principal
    }

    pub fn statements(&self) -> &[PolicyStatement] {
        &self.statements
    }

    /// Stable name-derived identifier exported in the topology outputs.
    pub fn role_id(&self) -> String {
        format!("{}-role", self.name)
    }
}

/// The statement every tier carries: describe its own fleet membership so
/// instances can find their siblings during discovery bootstrap.
pub fn fleet_membership_statement() -> PolicyStatement {
    PolicyStatement::allow(
        &[
            "ec2:DescribeInstances",
            "ec2:DescribeTags",
            "autoscaling:DescribeAutoScalingGroups",
        ],
        &["*"],
    )
}

/// Full access to the secret store's object storage backend.
pub fn storage_backend_statement(bucket: &str) -> PolicyStatement {
    PolicyStatement {
        effect: Effect::Allow,
        actions: vec!["s3:*".to_string()],
        resources: vec![
            format!("arn:aws:s3:::{bucket}"),
            format!("arn:aws:s3:::{bucket}/*"),
        ],
    }
}

/// Use of the unseal key: encrypt, decrypt and describe, nothing more.
pub fn unseal_key_statement(key_id: &str) -> PolicyStatement {
    PolicyStatement::allow(
        &["kms:Encrypt", "kms:Decrypt", "kms:DescribeKey"],
        &[key_id],
    )
}

/// Read/write on the secret store's KV table.
pub fn kv_table_statement(table: &str) -> PolicyStatement {
    PolicyStatement::allow(
        &[
            "dynamodb:DescribeTable",
            "dynamodb:DescribeLimits",
            "dynamodb:DescribeTimeToLive",
            "dynamodb:ListTagsOfResource",
            "dynamodb:ListTables",
            "dynamodb:BatchGetItem",
            "dynamodb:BatchWriteItem",
            "dynamodb:GetItem",
            "dynamodb:GetRecords",
            "dynamodb:PutItem",
            "dynamodb:DeleteItem",
            "dynamodb:UpdateItem",
            "dynamodb:Query",
            "dynamodb:Scan",
        ],
        &[table],
    )
}

/// Identity lookups the secret store performs when authenticating fleets.
pub fn identity_lookup_statements() -> Vec<PolicyStatement> {
    vec![
        PolicyStatement::allow(
            &[
                "iam:GetInstanceProfile",
                "iam:GetRole",
                "iam:GetUser",
                "ec2:DescribeInstances",
            ],
            &["*"],
        ),
        PolicyStatement::allow(&["sts:GetCallerIdentity"], &["*"]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_statements_are_rejected() {
        let err = RolePolicy::new("discovery", COMPUTE_PRINCIPAL, Vec::new()).unwrap_err();
        assert_eq!(err, PlanError::InvalidPolicy("discovery".to_string()));
    }

    #[test]
    fn role_id_is_name_derived() {
        let role = RolePolicy::new(
            "secret-store",
            COMPUTE_PRINCIPAL,
            vec![fleet_membership_statement()],
        )
        .unwrap();
        assert_eq!(role.role_id(), "secret-store-role");
        assert_eq!(role.trusted_principal(), COMPUTE_PRINCIPAL);
    }

    #[test]
    fn storage_statement_covers_bucket_and_contents() {
        let statement = storage_backend_statement("secret-store-storage");
        assert_eq!(
            statement.resources,
            vec![
                "arn:aws:s3:::secret-store-storage",
                "arn:aws:s3:::secret-store-storage/*",
            ]
        );
    }
}
