use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// A named collection owned by the narrative state. The `kind` field is the
/// on-disk discriminator, so saved documents always rebuild the right variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Collection {
    /// Set-like list over a declared value domain.
    List {
        domain: Vec<String>,
        #[serde(default)]
        active: BTreeSet<String>,
    },
    Array {
        #[serde(default)]
        items: Vec<Value>,
    },
    Map {
        #[serde(default)]
        entries: BTreeMap<String, Value>,
    },
}

impl Collection {
    pub fn list<I, S>(domain: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = BTreeSet::new();
        let domain = domain
            .into_iter()
            .map(Into::into)
            .filter(|entry: &String| seen.insert(entry.clone()))
            .collect();
        Self::List {
            domain,
            active: BTreeSet::new(),
        }
    }

    pub fn array(items: Vec<Value>) -> Self {
        Self::Array { items }
    }

    pub fn map(entries: BTreeMap<String, Value>) -> Self {
        Self::Map { entries }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::List { .. } => "list",
            Self::Array { .. } => "array",
            Self::Map { .. } => "map",
        }
    }

    /// Plain value view used when a collection is exposed to scripts or hosts.
    pub fn to_value(&self) -> Value {
        match self {
            Self::List { domain, active } => Value::Array(
                domain
                    .iter()
                    .filter(|entry| active.contains(*entry))
                    .map(|entry| Value::String(entry.clone()))
                    .collect(),
            ),
            Self::Array { items } => Value::Array(items.clone()),
            Self::Map { entries } => Value::Map(entries.clone()),
        }
    }
}

#[cfg(test)]
mod collection_tests {
    use super::*;

    #[test]
    fn kind_tag_selects_variant_on_decode() {
        let decoded: Collection =
            serde_json::from_str(r#"{"kind":"list","domain":["a","b"],"active":["b"]}"#)
                .expect("decode list");
        assert_eq!(decoded.kind_name(), "list");
        assert_eq!(decoded.to_value(), Value::Array(vec![Value::from("b")]));

        let decoded: Collection =
            serde_json::from_str(r#"{"kind":"map"}"#).expect("decode empty map");
        assert_eq!(decoded, Collection::map(BTreeMap::new()));

        assert!(serde_json::from_str::<Collection>(r#"{"kind":"bag"}"#).is_err());
    }

    #[test]
    fn list_domain_drops_duplicates_and_keeps_order() {
        let Collection::List { domain, .. } = Collection::list(["b", "a", "b"]) else {
            panic!("expected list");
        };
        assert_eq!(domain, vec!["b".to_string(), "a".to_string()]);
    }
}
