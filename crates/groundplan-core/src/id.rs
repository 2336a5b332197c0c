//! Identifier newtypes for topology resources
//!
//! Resources are addressed by string identifiers throughout the request
//! graph. The newtypes keep a security group handle from being passed where
//! a subnet is expected once deferred values start flowing between units.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! identifier {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }
    };
}

identifier! {
    /// A security group identifier, materialized as `sg-<name>`.
    GroupId
}

identifier! {
    /// The enclosing network (VPC) identifier.
    VpcId
}

identifier! {
    /// A subnet identifier inside the network.
    SubnetId
}

identifier! {
    /// A machine image identifier produced by an image lookup.
    ImageId
}
