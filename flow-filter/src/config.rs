// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Flow filter configuration records, as handed over by the management plane.
//!
//! The records are plain data: nothing is validated until a [`FlowFilter`] (or a whole
//! [`FlowFilterList`]) is built from them.
//!
//! [`FlowFilterList`]: crate::FlowFilterList

use crate::action::FlowAction;
use crate::errors::ConfigError;
use crate::filter::{FilterIndex, FilterKind, FlowFilter, Redirect};
use crate::ident::{ConditionName, RedirectDestination};
use crate::mac::Mac;
use etherparse::{IpDscp, VlanPcp};
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

/// The parameters of a flow action, before validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ActionSpec {
    SetDlSrc {
        address: Mac,
    },
    SetDlDst {
        address: Mac,
    },
    SetVlanPcp {
        priority: u8,
    },
    SetInetSrc {
        address: Ipv4Addr,
    },
    SetInetDst {
        address: Ipv4Addr,
    },
    SetInetDscp {
        dscp: u8,
    },
    SetPortSrc {
        port: u16,
    },
    SetPortDst {
        port: u16,
    },
    SetIcmpType {
        #[serde(rename = "icmp-type")]
        icmp_type: u8,
    },
    SetIcmpCode {
        code: u8,
    },
}

impl TryFrom<&ActionSpec> for FlowAction {
    type Error = ConfigError;

    fn try_from(spec: &ActionSpec) -> Result<Self, Self::Error> {
        let action = match *spec {
            ActionSpec::SetDlSrc { address } => FlowAction::SetDlSrc(address),
            ActionSpec::SetDlDst { address } => FlowAction::SetDlDst(address),
            ActionSpec::SetVlanPcp { priority } => FlowAction::SetVlanPcp(
                VlanPcp::try_new(priority).map_err(|_| ConfigError::BadVlanPcp(priority))?,
            ),
            ActionSpec::SetInetSrc { address } => FlowAction::SetInet4Src(address),
            ActionSpec::SetInetDst { address } => FlowAction::SetInet4Dst(address),
            ActionSpec::SetInetDscp { dscp } => FlowAction::SetDscp(
                IpDscp::try_new(dscp).map_err(|_| ConfigError::BadDscp(dscp))?,
            ),
            ActionSpec::SetPortSrc { port } => FlowAction::SetTpSrc(port),
            ActionSpec::SetPortDst { port } => FlowAction::SetTpDst(port),
            ActionSpec::SetIcmpType { icmp_type } => FlowAction::SetIcmpType(icmp_type),
            ActionSpec::SetIcmpCode { code } => FlowAction::SetIcmpCode(code),
        };
        action.validate()?;
        Ok(action)
    }
}

/// A flow action and its position in the action list of a filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionConfig {
    pub order: u32,
    #[serde(flatten)]
    pub action: ActionSpec,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterKindConfig {
    Pass,
    Drop,
    Redirect,
}

/// The interface redirected packets are sent to, in the tenant of the filter list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationConfig {
    pub node: String,
    pub interface: String,
}

/// A flow filter, before validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterConfig {
    pub index: u32,
    pub condition: String,
    pub kind: FilterKindConfig,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<ActionConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<DestinationConfig>,
    /// For redirect filters: dispatch packets as leaving through the destination.
    #[serde(default)]
    pub output: bool,
}

impl FlowFilter {
    /// Build a flow filter from its configuration record.
    ///
    /// The filter still has to be verified against the list it is configured on, which
    /// [`FlowFilterList::from_config`](crate::FlowFilterList::from_config) does.
    ///
    /// # Errors
    ///
    /// Fails if the index, the condition name, the destination or one of the actions is invalid.
    pub fn from_config(config: &FilterConfig) -> Result<Self, ConfigError> {
        let index = FilterIndex::new(config.index)?;
        let condition = ConditionName::new(config.condition.as_str())?;
        let kind = match (config.kind, &config.destination) {
            (FilterKindConfig::Redirect, Some(dest)) => FilterKind::Redirect(Redirect {
                destination: RedirectDestination::new(&dest.node, &dest.interface)?,
                output: config.output,
            }),
            (FilterKindConfig::Redirect, None) => {
                return Err(ConfigError::MissingParameter("destination"));
            }
            (_, Some(_)) => return Err(ConfigError::UnexpectedDestination(index)),
            (FilterKindConfig::Pass, None) => FilterKind::Pass,
            (FilterKindConfig::Drop, None) => FilterKind::Drop,
        };
        config
            .actions
            .iter()
            .try_fold(FlowFilter::new(index, condition, kind), |filter, a| {
                Ok(filter.with_action(a.order, FlowAction::try_from(&a.action)?))
            })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use super::*;
    use crate::ident::{FlowDirection, ListIdent, VNodePath};
    use crate::list::FlowFilterList;
    use pretty_assertions::assert_eq;

    const FILTERS: &str = r#"
- index: 20
  condition: web
  kind: redirect
  destination:
    node: br2
    interface: proxy
  actions:
    - order: 2
      type: set-port-dst
      port: 3128
    - order: 1
      type: set-dl-dst
      address: "02:00:00:00:00:aa"
- index: 10
  condition: blocked
  kind: drop
- index: 30
  condition: voice
  kind: pass
  actions:
    - order: 1
      type: set-inet-dscp
      dscp: 46
- index: 40
  condition: ping
  kind: pass
  actions:
    - order: 1
      type: set-icmp-type
      icmp-type: 0
    - order: 2
      type: set-icmp-code
      code: 0
"#;

    fn ident() -> ListIdent {
        ListIdent::new(
            VNodePath::interface("t1", "br1", "if1").unwrap(),
            FlowDirection::Input,
        )
    }

    #[test]
    fn list_from_yaml() {
        let config: Vec<FilterConfig> = serde_yaml_ng::from_str(FILTERS).unwrap();
        assert_eq!(config[0].kind, FilterKindConfig::Redirect);
        assert_eq!(
            config[0].actions[0].action,
            ActionSpec::SetPortDst { port: 3128 }
        );
        assert!(!config[0].output);
        assert_eq!(
            config[3].actions[0].action,
            ActionSpec::SetIcmpType { icmp_type: 0 }
        );

        let list = FlowFilterList::from_config(ident(), &config).unwrap();
        let summary: Vec<String> = list.iter().map(ToString::to_string).collect();
        assert_eq!(
            summary,
            vec![
                "10 blocked drop",
                "20 web redirect br2/proxy%IN 1:set-dl-dst(02:00:00:00:00:aa) 2:set-port-dst(3128)",
                "30 voice pass 1:set-inet-dscp(46)",
                "40 ping pass 1:set-icmp-type(0) 2:set-icmp-code(0)",
            ]
        );
    }

    fn record(kind: FilterKindConfig) -> FilterConfig {
        FilterConfig {
            index: 1,
            condition: "c1".to_string(),
            kind,
            actions: vec![],
            destination: None,
            output: false,
        }
    }

    #[test]
    fn actions_serialize_with_their_type() {
        let action = ActionConfig {
            order: 3,
            action: ActionSpec::SetIcmpType { icmp_type: 11 },
        };
        let yaml = serde_yaml_ng::to_string(&action).unwrap();
        assert_eq!(yaml, "order: 3\ntype: set-icmp-type\nicmp-type: 11\n");
        let back: ActionConfig = serde_yaml_ng::from_str(&yaml).unwrap();
        assert_eq!(back, action);
    }

    #[test]
    fn invalid_records() {
        assert_eq!(
            FlowFilter::from_config(&record(FilterKindConfig::Redirect)),
            Err(ConfigError::MissingParameter("destination"))
        );

        let mut config = record(FilterKindConfig::Pass);
        config.destination = Some(DestinationConfig {
            node: "br1".to_string(),
            interface: "if2".to_string(),
        });
        assert!(matches!(
            FlowFilter::from_config(&config),
            Err(ConfigError::UnexpectedDestination(_))
        ));

        let mut config = record(FilterKindConfig::Drop);
        config.index = 0;
        assert_eq!(
            FlowFilter::from_config(&config),
            Err(ConfigError::BadFilterIndex(0))
        );

        let mut config = record(FilterKindConfig::Drop);
        config.condition = String::new();
        assert!(matches!(
            FlowFilter::from_config(&config),
            Err(ConfigError::InvalidName(_, _))
        ));
    }

    #[test]
    fn invalid_action_parameters() {
        let mut config = record(FilterKindConfig::Pass);
        config.actions = vec![ActionConfig {
            order: 1,
            action: ActionSpec::SetVlanPcp { priority: 8 },
        }];
        assert_eq!(
            FlowFilter::from_config(&config),
            Err(ConfigError::BadVlanPcp(8))
        );

        config.actions[0].action = ActionSpec::SetInetDscp { dscp: 64 };
        assert_eq!(
            FlowFilter::from_config(&config),
            Err(ConfigError::BadDscp(64))
        );

        config.actions[0].action = ActionSpec::SetPortSrc { port: 0 };
        assert_eq!(FlowFilter::from_config(&config), Err(ConfigError::ZeroPort));
    }

    #[test]
    fn duplicate_indices_in_config() {
        let config = vec![
            record(FilterKindConfig::Pass),
            record(FilterKindConfig::Drop),
        ];
        assert!(matches!(
            FlowFilterList::from_config(ident(), &config),
            Err(ConfigError::DuplicateFilterIndex(_))
        ));
    }
}
