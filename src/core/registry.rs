//! Named set and action registry
//!
//! The registry lives for one compilation. It resolves the textual address,
//! port and action fields of a configuration into shared, canonical values:
//!
//! - Named sets are unions of literals and previously defined sets.
//! - Literal strings used directly in rules are parsed once and memoized by
//!   their exact text, so every rule naming `"10.0.0.0/8"` shares one set.
//! - A defined name takes precedence over identical literal text.
//!
//! Once the [`FilterSet`](crate::core::firewall::FilterSet) is built the
//! registry is dropped; matching never consults it.

use crate::core::error::ConfigError;
use crate::core::firewall::{
    Action, BaseAction, IpCriterion, IpSet, NamedAction, PortCriterion, PortSet,
};
use crate::core::services::ServiceDirectory;
use crate::validators::{AddressRange, parse_address_literal, parse_port_literal};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};

/// Compile-time registry of named sets, memoized literals and actions.
#[derive(Debug)]
pub struct SetRegistry {
    ip: HashMap<String, Arc<IpSet>>,
    port: HashMap<String, Arc<PortSet>>,
    actions: HashMap<String, Action>,
    services: ServiceDirectory,
}

impl Default for SetRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SetRegistry {
    /// Registry using the system services database for port names.
    pub fn new() -> Self {
        Self::with_services(ServiceDirectory::system())
    }

    pub fn with_services(services: ServiceDirectory) -> Self {
        Self {
            ip: HashMap::new(),
            port: HashMap::new(),
            actions: HashMap::new(),
            services,
        }
    }

    // ─── Addresses ──────────────────────────────────────────────────────────

    /// Resolves an address field of a rule.
    ///
    /// The empty string is the wildcard. Anything else is a defined set name
    /// or an address literal; literals are parsed once and cached.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidAddress`] if the text is neither a known
    /// name nor a valid literal.
    pub fn resolve_ip(&mut self, text: &str) -> Result<IpCriterion, ConfigError> {
        if text.is_empty() {
            return Ok(IpCriterion::Any);
        }
        if let Some(set) = self.ip.get(text) {
            return Ok(IpCriterion::Set(Arc::clone(set)));
        }

        let set = Arc::new(parse_ip_literals(&[text])?);
        self.ip.insert(text.to_string(), Arc::clone(&set));
        Ok(IpCriterion::Set(set))
    }

    /// Binds `name` to the union of `entries`.
    ///
    /// Each entry that exactly matches an already registered name contributes
    /// that set's ranges; every other entry is parsed as an address literal.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError::InvalidAddress`] among the literal
    /// entries. Nothing is bound on error.
    pub fn define_ip<S: AsRef<str>>(&mut self, name: &str, entries: &[S]) -> Result<(), ConfigError> {
        let mut set = IpSet::default();
        let mut literals = Vec::with_capacity(entries.len());
        for entry in entries {
            let entry = entry.as_ref();
            match self.ip.get(entry) {
                Some(existing) => set.extend_from(existing),
                None => literals.push(entry),
            }
        }
        if !literals.is_empty() {
            set.extend_from(&parse_ip_literals(&literals)?);
        }
        set.clean();

        debug!(
            "Defined IP set '{}': {} IPv4 ranges, {} IPv6 ranges",
            name,
            set.v4.len(),
            set.v6.len()
        );
        if self.ip.insert(name.to_string(), Arc::new(set)).is_some() {
            warn!("IP set '{}' redefined; later definition wins", name);
        }
        Ok(())
    }

    // ─── Ports ──────────────────────────────────────────────────────────────

    /// Resolves a port field of a rule. Mirrors [`resolve_ip`](Self::resolve_ip).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidPort`] or [`ConfigError::UnknownService`]
    /// for text that is neither a known name nor a valid literal.
    pub fn resolve_port(&mut self, text: &str) -> Result<PortCriterion, ConfigError> {
        if text.is_empty() {
            return Ok(PortCriterion::Any);
        }
        if let Some(set) = self.port.get(text) {
            return Ok(PortCriterion::Set(Arc::clone(set)));
        }

        let set = Arc::new(self.parse_port_literals(&[text])?);
        self.port.insert(text.to_string(), Arc::clone(&set));
        Ok(PortCriterion::Set(set))
    }

    /// Binds `name` to the union of `entries`. Mirrors [`define_ip`](Self::define_ip).
    ///
    /// # Errors
    ///
    /// Returns the first port literal error. Nothing is bound on error.
    pub fn define_port<S: AsRef<str>>(
        &mut self,
        name: &str,
        entries: &[S],
    ) -> Result<(), ConfigError> {
        let mut set = PortSet::default();
        let mut literals = Vec::with_capacity(entries.len());
        for entry in entries {
            let entry = entry.as_ref();
            match self.port.get(entry) {
                Some(existing) => set.ranges.extend_from(&existing.ranges),
                None => literals.push(entry),
            }
        }
        if !literals.is_empty() {
            set.ranges
                .extend_from(&self.parse_port_literals(&literals)?.ranges);
        }
        set.ranges.clean();

        debug!("Defined port set '{}': {}", name, set.ranges);
        if self.port.insert(name.to_string(), Arc::new(set)).is_some() {
            warn!("Port set '{}' redefined; later definition wins", name);
        }
        Ok(())
    }

    fn parse_port_literals(&self, literals: &[&str]) -> Result<PortSet, ConfigError> {
        let mut set = PortSet::default();
        for literal in literals {
            set.ranges.push(parse_port_literal(literal, &self.services)?);
        }
        set.ranges.clean();
        Ok(set)
    }

    // ─── Actions ────────────────────────────────────────────────────────────

    /// Resolves an action name: `pass`, `block`, or a defined named action.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownAction`] for any other name.
    pub fn resolve_action(&self, name: &str) -> Result<Action, ConfigError> {
        if let Some(action) = self.actions.get(name) {
            return Ok(action.clone());
        }
        BaseAction::from_str(name)
            .map(Action::from)
            .map_err(|_| ConfigError::UnknownAction(name.to_string()))
    }

    /// Binds `name` to the action `target` resolves to.
    ///
    /// The new action keeps its own name and inherits the built-in verdict of
    /// `target`, which may itself be a named action.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownAction`] if `target` does not resolve.
    pub fn define_action(&mut self, name: &str, target: &str) -> Result<(), ConfigError> {
        let base = self.resolve_action(target)?.base();
        let action = Action::Named(Arc::new(NamedAction {
            name: name.to_string(),
            base,
        }));
        debug!("Defined action '{}' as {}", name, base);
        if self.actions.insert(name.to_string(), action).is_some() {
            warn!("Action '{}' redefined; later definition wins", name);
        }
        Ok(())
    }

    /// Number of cached IP entries (named sets and memoized literals).
    pub fn ip_entries(&self) -> usize {
        self.ip.len()
    }

    /// Number of cached port entries (named sets and memoized literals).
    pub fn port_entries(&self) -> usize {
        self.port.len()
    }
}

fn parse_ip_literals(literals: &[&str]) -> Result<IpSet, ConfigError> {
    let mut set = IpSet::default();
    for literal in literals {
        match parse_address_literal(literal)? {
            AddressRange::V4(range) => set.v4.push(range),
            AddressRange::V6(range) => set.v6.push(range),
        }
    }
    set.clean();
    Ok(set)
}
