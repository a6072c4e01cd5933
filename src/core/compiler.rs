//! Rule compiler
//!
//! Turns a [`GeneralConfig`] into an immutable [`FilterSet`]. Definitions are
//! processed section by section (IP sets, port sets, actions), then every
//! filter group is compiled rule by rule in source order.
//!
//! Compilation is all-or-nothing: the first error aborts and is returned
//! wrapped with the set, action or rule/field it came from.

use crate::config::{Filter, GeneralConfig};
use crate::core::error::{ConfigError, RuleField, SetKind};
use crate::core::firewall::{
    CompiledRule, FilterSet, LayerSet, ProtocolType, TcpFlag, TcpFlagCriteria,
};
use crate::core::registry::SetRegistry;
use crate::validators::{parse_flag, parse_protocol_type};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum::IntoEnumIterator;
use tracing::{debug, info, warn};

/// What to do with a filter whose `type` is not a known protocol keyword.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownProtocolPolicy {
    /// Fail compilation with [`ConfigError::UnknownProtocol`]
    #[default]
    Reject,
    /// Treat the rule as matching any protocol, with a warning
    Any,
}

/// Compiler settings, read from the `options` section of a configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompileOptions {
    pub unknown_protocol: UnknownProtocolPolicy,
}

/// Builds a [`FilterSet`] from configuration records.
///
/// A compiler owns its [`SetRegistry`] for the duration of one compilation.
/// Definitions can also be added programmatically before calling
/// [`compile_rules`](Self::compile_rules).
#[derive(Debug)]
pub struct RuleCompiler {
    registry: SetRegistry,
    options: CompileOptions,
}

impl Default for RuleCompiler {
    fn default() -> Self {
        Self::new(SetRegistry::new())
    }
}

impl RuleCompiler {
    pub fn new(registry: SetRegistry) -> Self {
        Self {
            registry,
            options: CompileOptions::default(),
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: CompileOptions) -> Self {
        self.options = options;
        self
    }

    pub fn registry(&self) -> &SetRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut SetRegistry {
        &mut self.registry
    }

    /// Compiles a whole configuration using its own `options` section.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] encountered, wrapped with its
    /// location.
    pub fn compile(mut self, config: &GeneralConfig) -> Result<FilterSet, ConfigError> {
        self.options = config.options;
        self.define_ip_sets(&config.ipset)?;
        self.define_port_sets(&config.portset)?;
        self.define_actions(&config.action)?;
        let filters = self.compile_rules(&config.filter)?;

        info!(
            "Compiled {} filter groups with {} rules ({} IP sets, {} port sets, {} actions)",
            filters.len(),
            filters.rule_count(),
            config.ipset.len(),
            config.portset.len(),
            config.action.len()
        );
        Ok(filters)
    }

    /// Registers IP set definitions in order.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Set`] wrapping the first invalid entry.
    pub fn define_ip_sets(&mut self, sets: &[(String, Vec<String>)]) -> Result<(), ConfigError> {
        for (name, entries) in sets {
            self.registry
                .define_ip(name, entries)
                .map_err(|e| ConfigError::Set {
                    kind: SetKind::Ip,
                    name: name.clone(),
                    source: Box::new(e),
                })?;
        }
        Ok(())
    }

    /// Registers port set definitions in order.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Set`] wrapping the first invalid entry.
    pub fn define_port_sets(&mut self, sets: &[(String, Vec<String>)]) -> Result<(), ConfigError> {
        for (name, entries) in sets {
            self.registry
                .define_port(name, entries)
                .map_err(|e| ConfigError::Set {
                    kind: SetKind::Port,
                    name: name.clone(),
                    source: Box::new(e),
                })?;
        }
        Ok(())
    }

    /// Registers named actions in order.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Action`] if a target does not resolve.
    pub fn define_actions(&mut self, actions: &[(String, String)]) -> Result<(), ConfigError> {
        for (name, target) in actions {
            self.registry
                .define_action(name, target)
                .map_err(|e| ConfigError::Action {
                    name: name.clone(),
                    source: Box::new(e),
                })?;
        }
        Ok(())
    }

    /// Compiles filter groups against the definitions registered so far.
    ///
    /// A group name appearing twice keeps its later rule list.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Rule`] naming the group, rule index and field
    /// of the first invalid filter.
    pub fn compile_rules(
        &mut self,
        groups: &[(String, Vec<Filter>)],
    ) -> Result<FilterSet, ConfigError> {
        let mut compiled = BTreeMap::new();
        for (group, filters) in groups {
            let mut rules = Vec::with_capacity(filters.len());
            for (index, filter) in filters.iter().enumerate() {
                let rule = self.compile_filter(filter).map_err(|(field, e)| ConfigError::Rule {
                    group: group.clone(),
                    index,
                    field,
                    source: Box::new(e),
                })?;
                rules.push(rule);
            }
            debug!("Compiled filter group '{}': {} rules", group, rules.len());
            if compiled.insert(group.clone(), rules).is_some() {
                warn!("Filter group '{}' defined twice; later definition wins", group);
            }
        }
        Ok(FilterSet::from_groups(compiled))
    }

    fn compile_filter(&mut self, filter: &Filter) -> Result<CompiledRule, (RuleField, ConfigError)> {
        let src_ip = self
            .registry
            .resolve_ip(&filter.ip.from)
            .map_err(at(RuleField::IpFrom))?;
        let dst_ip = self
            .registry
            .resolve_ip(&filter.ip.to)
            .map_err(at(RuleField::IpTo))?;
        let src_port = self
            .registry
            .resolve_port(&filter.port.from)
            .map_err(at(RuleField::PortFrom))?;
        let dst_port = self
            .registry
            .resolve_port(&filter.port.to)
            .map_err(at(RuleField::PortTo))?;
        let protocols = self
            .protocol_class(&filter.protocol)
            .map_err(at(RuleField::Type))?;
        let action = self
            .registry
            .resolve_action(&filter.action)
            .map_err(at(RuleField::Action))?;

        let mut tcp_flags = TcpFlagCriteria::default();
        for flag in TcpFlag::iter() {
            let criterion =
                parse_flag(flag, filter.flags.get(flag)).map_err(at(RuleField::Flag(flag)))?;
            tcp_flags.set(flag, criterion);
        }

        Ok(CompiledRule {
            src_ip,
            dst_ip,
            src_port,
            dst_port,
            tcp_flags,
            protocols,
            action,
        })
    }

    fn protocol_class(&self, text: &str) -> Result<LayerSet, ConfigError> {
        match parse_protocol_type(text) {
            Some(protocol) => Ok(protocol.layers()),
            None => match self.options.unknown_protocol {
                UnknownProtocolPolicy::Reject => Err(ConfigError::UnknownProtocol(text.to_string())),
                UnknownProtocolPolicy::Any => {
                    warn!("Unknown protocol type '{}' treated as any protocol", text);
                    Ok(ProtocolType::Any.layers())
                }
            },
        }
    }
}

fn at(field: RuleField) -> impl FnOnce(ConfigError) -> (RuleField, ConfigError) {
    move |e| (field, e)
}

/// Compiles a configuration with the system services database.
///
/// # Errors
///
/// See [`RuleCompiler::compile`].
pub fn compile(config: &GeneralConfig) -> Result<FilterSet, ConfigError> {
    RuleCompiler::default().compile(config)
}
