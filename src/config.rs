//! Rule configuration records
//!
//! Plain serde types describing a policy file, before any name resolution.
//! Every section and every field is optional; a missing text field is the
//! empty string, which the compiler reads as a wildcard.
//!
//! The `ipset`, `portset`, `action` and `filter` sections keep the order
//! they appear in the document. Definitions may only reference names defined
//! above them, so a plain hash map would lose meaning here.

use crate::core::compiler::CompileOptions;
use crate::core::error::Result;
use crate::core::firewall::TcpFlag;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Complete policy configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Named IP sets: name → address literals or earlier set names
    #[serde(with = "ordered")]
    pub ipset: Vec<(String, Vec<String>)>,
    /// Named port sets: name → port literals or earlier set names
    #[serde(with = "ordered")]
    pub portset: Vec<(String, Vec<String>)>,
    /// Named actions: name → `pass`, `block` or an earlier action name
    #[serde(with = "ordered")]
    pub action: Vec<(String, String)>,
    /// Filter groups: group name → rules in evaluation order
    #[serde(with = "ordered")]
    pub filter: Vec<(String, Vec<Filter>)>,
    pub options: CompileOptions,
}

/// One filter record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Filter {
    pub ip: Endpoints,
    pub port: Endpoints,
    #[serde(rename = "type")]
    pub protocol: String,
    pub action: String,
    pub flags: Flags,
}

/// Source and destination text of an address or port criterion
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub from: String,
    pub to: String,
}

/// TCP flag text fields
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Flags {
    pub fin: String,
    pub syn: String,
    pub rst: String,
    pub psh: String,
    pub ack: String,
    pub urg: String,
    pub ece: String,
    pub cwr: String,
    pub ns: String,
}

impl Flags {
    pub fn get(&self, flag: TcpFlag) -> &str {
        match flag {
            TcpFlag::Fin => &self.fin,
            TcpFlag::Syn => &self.syn,
            TcpFlag::Rst => &self.rst,
            TcpFlag::Psh => &self.psh,
            TcpFlag::Ack => &self.ack,
            TcpFlag::Urg => &self.urg,
            TcpFlag::Ece => &self.ece,
            TcpFlag::Cwr => &self.cwr,
            TcpFlag::Ns => &self.ns,
        }
    }
}

/// Parses configuration text.
///
/// # Errors
///
/// Returns [`Error::Serialization`](crate::core::error::Error::Serialization)
/// if the text is not a valid policy document.
pub fn parse_config(text: &str) -> Result<GeneralConfig> {
    Ok(serde_json::from_str(text)?)
}

/// Reads and parses a configuration file.
///
/// # Async
/// Uses `tokio::fs` for non-blocking I/O.
pub async fn load_config(path: &Path) -> Result<GeneralConfig> {
    let text = tokio::fs::read_to_string(path).await?;
    parse_config(&text)
}

/// (De)serializes a JSON object as a `Vec` of entries in document order.
mod ordered {
    use serde::de::{Deserialize, Deserializer, MapAccess, Visitor};
    use serde::ser::{Serialize, Serializer};
    use std::fmt;
    use std::marker::PhantomData;

    #[allow(clippy::ptr_arg)]
    pub fn serialize<S, V>(entries: &Vec<(String, V)>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        V: Serialize,
    {
        serializer.collect_map(entries.iter().map(|(k, v)| (k, v)))
    }

    pub fn deserialize<'de, D, V>(deserializer: D) -> Result<Vec<(String, V)>, D::Error>
    where
        D: Deserializer<'de>,
        V: Deserialize<'de>,
    {
        deserializer.deserialize_map(OrderedVisitor(PhantomData))
    }

    struct OrderedVisitor<V>(PhantomData<V>);

    impl<'de, V: Deserialize<'de>> Visitor<'de> for OrderedVisitor<V> {
        type Value = Vec<(String, V)>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a map of names to definitions")
        }

        fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
            let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some(entry) = map.next_entry::<String, V>()? {
                entries.push(entry);
            }
            Ok(entries)
        }
    }
}
