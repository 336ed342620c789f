// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Names and identities of virtual nodes, flow filter lists and flow conditions.

use crate::errors::ConfigError;
use std::fmt::Display;
use std::str::FromStr;

/// Maximum length of a virtual node or flow condition name.
const MAX_NAME_LEN: usize = 31;

fn check_name(name: &str) -> Result<(), ConfigError> {
    let invalid = |reason| Err(ConfigError::InvalidName(name.to_string(), reason));
    let Some(first) = name.chars().next() else {
        return invalid("name is empty");
    };
    if name.len() > MAX_NAME_LEN {
        return invalid("name is longer than 31 characters");
    }
    if !first.is_ascii_alphanumeric() {
        return invalid("name must start with an alphanumeric character");
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return invalid("name may only contain alphanumeric characters and '_'");
    }
    Ok(())
}

macro_rules! validated_name {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(String);

        impl $name {
            /// Validate and build a name.
            ///
            /// # Errors
            ///
            /// Returns [`ConfigError::InvalidName`] if `name` is empty, longer than 31 characters,
            /// or is not made of ASCII alphanumeric characters and underscores.
            pub fn new(name: impl Into<String>) -> Result<Self, ConfigError> {
                let name = name.into();
                check_name(&name)?;
                Ok(Self(name))
            }

            /// The name, as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl FromStr for $name {
            type Err = ConfigError;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

validated_name!(
    /// The name of a tenant, of a virtual bridge or terminal, or of a virtual interface.
    VNodeName
);

validated_name!(
    /// The name of a flow condition. Conditions are resolved by name, at evaluation time, by the
    /// [`FlowFilterContext`](crate::FlowFilterContext).
    ConditionName
);

/// The direction of the packets a flow filter list applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FlowDirection {
    /// Packets entering the virtual node.
    Input,
    /// Packets leaving the virtual node.
    Output,
}

impl Display for FlowDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FlowDirection::Input => f.write_str("IN"),
            FlowDirection::Output => f.write_str("OUT"),
        }
    }
}

/// The virtual node owning a flow filter list: a tenant, a virtual bridge or terminal inside a
/// tenant, or a virtual interface attached to a bridge or terminal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VNodePath {
    tenant: VNodeName,
    node: Option<VNodeName>,
    interface: Option<VNodeName>,
}

impl VNodePath {
    /// Path to a tenant.
    pub fn tenant(tenant: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            tenant: tenant.parse()?,
            node: None,
            interface: None,
        })
    }

    /// Path to a virtual bridge or terminal.
    pub fn node(tenant: &str, node: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            tenant: tenant.parse()?,
            node: Some(node.parse()?),
            interface: None,
        })
    }

    /// Path to a virtual interface.
    pub fn interface(tenant: &str, node: &str, interface: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            tenant: tenant.parse()?,
            node: Some(node.parse()?),
            interface: Some(interface.parse()?),
        })
    }

    #[must_use]
    pub fn tenant_name(&self) -> &VNodeName {
        &self.tenant
    }

    #[must_use]
    pub fn node_name(&self) -> Option<&VNodeName> {
        self.node.as_ref()
    }

    #[must_use]
    pub fn interface_name(&self) -> Option<&VNodeName> {
        self.interface.as_ref()
    }

    /// Returns true if this path designates a tenant, as opposed to a node inside it.
    #[must_use]
    pub fn is_tenant(&self) -> bool {
        self.node.is_none()
    }

    /// The virtual interface this path designates, if any.
    #[must_use]
    pub fn as_interface(&self) -> Option<VInterfacePath> {
        match (&self.node, &self.interface) {
            (Some(node), Some(interface)) => Some(VInterfacePath {
                tenant: self.tenant.clone(),
                node: node.clone(),
                interface: interface.clone(),
            }),
            _ => None,
        }
    }
}

impl Display for VNodePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.tenant)?;
        if let Some(node) = &self.node {
            write!(f, "/{node}")?;
        }
        if let Some(interface) = &self.interface {
            write!(f, "/{interface}")?;
        }
        Ok(())
    }
}

/// A fully qualified virtual interface.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VInterfacePath {
    pub tenant: VNodeName,
    pub node: VNodeName,
    pub interface: VNodeName,
}

impl Display for VInterfacePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.tenant, self.node, self.interface)
    }
}

/// The destination of a redirect flow filter: a virtual interface in the same tenant as the
/// filter list. The tenant is implied by the list the filter is configured on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RedirectDestination {
    pub node: VNodeName,
    pub interface: VNodeName,
}

impl RedirectDestination {
    pub fn new(node: &str, interface: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            node: node.parse()?,
            interface: interface.parse()?,
        })
    }

    /// Qualify the destination with the tenant of the given filter list owner.
    #[must_use]
    pub fn resolve(&self, owner: &VNodePath) -> VInterfacePath {
        VInterfacePath {
            tenant: owner.tenant.clone(),
            node: self.node.clone(),
            interface: self.interface.clone(),
        }
    }
}

impl Display for RedirectDestination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.node, self.interface)
    }
}

/// The identity of a flow filter list: the virtual node owning it and the direction of the
/// packets it filters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ListIdent {
    owner: VNodePath,
    direction: FlowDirection,
}

impl ListIdent {
    #[must_use]
    pub fn new(owner: VNodePath, direction: FlowDirection) -> Self {
        Self { owner, direction }
    }

    #[must_use]
    pub fn owner(&self) -> &VNodePath {
        &self.owner
    }

    #[must_use]
    pub fn direction(&self) -> FlowDirection {
        self.direction
    }
}

impl Display for ListIdent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}%{}", self.owner, self.direction)
    }
}
