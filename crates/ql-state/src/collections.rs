use std::collections::{BTreeMap, BTreeSet};

use ql_core::{codes, Collection, QuillError, Value};

use crate::state::{NarrativeState, RESERVED_PREFIX};

fn not_found(name: &str) -> QuillError {
    QuillError::new(
        codes::STATE_COLLECTION_NOT_FOUND,
        format!("Collection \"{}\" is not declared.", name),
    )
}

fn wrong_kind(name: &str, expected: &str, found: &Collection) -> QuillError {
    QuillError::new(
        codes::STATE_COLLECTION_KIND,
        format!(
            "Collection \"{}\" is a {}, not a {}.",
            name,
            found.kind_name(),
            expected
        ),
    )
}

fn out_of_range(name: &str, index: usize, len: usize) -> QuillError {
    QuillError::new(
        codes::STATE_INDEX_OUT_OF_RANGE,
        format!(
            "Index {} is out of range for array \"{}\" of length {}.",
            index, name, len
        ),
    )
}

impl NarrativeState {
    pub fn declare_collection(&mut self, name: &str, collection: Collection) -> Result<(), QuillError> {
        if name.is_empty() || name.starts_with(RESERVED_PREFIX) {
            return Err(QuillError::new(
                codes::STATE_RESERVED_NAME,
                format!("\"{}\" is not a usable collection name.", name),
            ));
        }
        if self.collections.contains_key(name) {
            return Err(QuillError::new(
                codes::STATE_COLLECTION_EXISTS,
                format!("Collection \"{}\" is already declared.", name),
            ));
        }
        if let Collection::List { domain, active } = &collection {
            if let Some(stray) = active.iter().find(|entry| !domain.contains(entry)) {
                return Err(QuillError::new(
                    codes::STATE_VALUE_OUT_OF_DOMAIN,
                    format!("Initial value \"{}\" is outside list \"{}\".", stray, name),
                ));
            }
        }
        self.collections.insert(name.to_string(), collection);
        Ok(())
    }

    pub fn has_collection(&self, name: &str) -> bool {
        self.collections.contains_key(name)
    }

    pub fn collection(&self, name: &str) -> Option<&Collection> {
        self.collections.get(name)
    }

    pub fn collections(&self) -> &BTreeMap<String, Collection> {
        &self.collections
    }

    pub fn remove_collection(&mut self, name: &str) -> Option<Collection> {
        self.collections.remove(name)
    }

    fn list_parts(
        &mut self,
        name: &str,
    ) -> Result<(&Vec<String>, &mut BTreeSet<String>), QuillError> {
        match self.collections.get_mut(name) {
            Some(Collection::List { domain, active }) => Ok((&*domain, active)),
            Some(other) => Err(wrong_kind(name, "list", other)),
            None => Err(not_found(name)),
        }
    }

    fn list_member<'a>(
        name: &str,
        domain: &[String],
        value: &'a str,
    ) -> Result<&'a str, QuillError> {
        if domain.iter().any(|entry| entry == value) {
            Ok(value)
        } else {
            Err(QuillError::new(
                codes::STATE_VALUE_OUT_OF_DOMAIN,
                format!("\"{}\" is not a declared value of list \"{}\".", value, name),
            ))
        }
    }

    // Lists

    /// Returns true when the value was not active before.
    pub fn list_add(&mut self, name: &str, value: &str) -> Result<bool, QuillError> {
        let (domain, active) = self.list_parts(name)?;
        let value = Self::list_member(name, domain, value)?;
        Ok(active.insert(value.to_string()))
    }

    /// Returns true when the value was active before.
    pub fn list_remove(&mut self, name: &str, value: &str) -> Result<bool, QuillError> {
        let (domain, active) = self.list_parts(name)?;
        let value = Self::list_member(name, domain, value)?;
        Ok(active.remove(value))
    }

    /// Returns the membership after toggling.
    pub fn list_toggle(&mut self, name: &str, value: &str) -> Result<bool, QuillError> {
        let (domain, active) = self.list_parts(name)?;
        let value = Self::list_member(name, domain, value)?;
        if active.remove(value) {
            Ok(false)
        } else {
            active.insert(value.to_string());
            Ok(true)
        }
    }

    pub fn list_contains(&self, name: &str, value: &str) -> Result<bool, QuillError> {
        match self.collections.get(name) {
            Some(Collection::List { active, .. }) => Ok(active.contains(value)),
            Some(other) => Err(wrong_kind(name, "list", other)),
            None => Err(not_found(name)),
        }
    }

    pub fn list_count(&self, name: &str) -> Result<usize, QuillError> {
        match self.collections.get(name) {
            Some(Collection::List { active, .. }) => Ok(active.len()),
            Some(other) => Err(wrong_kind(name, "list", other)),
            None => Err(not_found(name)),
        }
    }

    /// Active values in declaration order.
    pub fn list_active(&self, name: &str) -> Result<Vec<String>, QuillError> {
        match self.collections.get(name) {
            Some(Collection::List { domain, active }) => Ok(domain
                .iter()
                .filter(|entry| active.contains(*entry))
                .cloned()
                .collect()),
            Some(other) => Err(wrong_kind(name, "list", other)),
            None => Err(not_found(name)),
        }
    }

    // Arrays (0-based)

    fn array_items(&self, name: &str) -> Result<&Vec<Value>, QuillError> {
        match self.collections.get(name) {
            Some(Collection::Array { items }) => Ok(items),
            Some(other) => Err(wrong_kind(name, "array", other)),
            None => Err(not_found(name)),
        }
    }

    fn array_items_mut(&mut self, name: &str) -> Result<&mut Vec<Value>, QuillError> {
        match self.collections.get_mut(name) {
            Some(Collection::Array { items }) => Ok(items),
            Some(other) => Err(wrong_kind(name, "array", other)),
            None => Err(not_found(name)),
        }
    }

    pub fn array_get(&self, name: &str, index: usize) -> Result<Option<Value>, QuillError> {
        Ok(self.array_items(name)?.get(index).cloned())
    }

    pub fn array_set(&mut self, name: &str, index: usize, value: Value) -> Result<(), QuillError> {
        let items = self.array_items_mut(name)?;
        let len = items.len();
        let slot = items
            .get_mut(index)
            .ok_or_else(|| out_of_range(name, index, len))?;
        *slot = value;
        Ok(())
    }

    pub fn array_push(&mut self, name: &str, value: Value) -> Result<usize, QuillError> {
        let items = self.array_items_mut(name)?;
        items.push(value);
        Ok(items.len())
    }

    pub fn array_pop(&mut self, name: &str) -> Result<Option<Value>, QuillError> {
        Ok(self.array_items_mut(name)?.pop())
    }

    /// `index` may equal the length, which appends.
    pub fn array_insert(&mut self, name: &str, index: usize, value: Value) -> Result<(), QuillError> {
        let items = self.array_items_mut(name)?;
        if index > items.len() {
            return Err(out_of_range(name, index, items.len()));
        }
        items.insert(index, value);
        Ok(())
    }

    pub fn array_remove(&mut self, name: &str, index: usize) -> Result<Value, QuillError> {
        let items = self.array_items_mut(name)?;
        if index >= items.len() {
            return Err(out_of_range(name, index, items.len()));
        }
        Ok(items.remove(index))
    }

    pub fn array_contains(&self, name: &str, value: &Value) -> Result<bool, QuillError> {
        Ok(self.array_items(name)?.contains(value))
    }

    pub fn array_index_of(&self, name: &str, value: &Value) -> Result<Option<usize>, QuillError> {
        Ok(self.array_items(name)?.iter().position(|item| item == value))
    }

    pub fn array_len(&self, name: &str) -> Result<usize, QuillError> {
        Ok(self.array_items(name)?.len())
    }

    // Maps

    fn map_entries(&self, name: &str) -> Result<&BTreeMap<String, Value>, QuillError> {
        match self.collections.get(name) {
            Some(Collection::Map { entries }) => Ok(entries),
            Some(other) => Err(wrong_kind(name, "map", other)),
            None => Err(not_found(name)),
        }
    }

    fn map_entries_mut(&mut self, name: &str) -> Result<&mut BTreeMap<String, Value>, QuillError> {
        match self.collections.get_mut(name) {
            Some(Collection::Map { entries }) => Ok(entries),
            Some(other) => Err(wrong_kind(name, "map", other)),
            None => Err(not_found(name)),
        }
    }

    pub fn map_get(&self, name: &str, key: &str) -> Result<Option<Value>, QuillError> {
        Ok(self.map_entries(name)?.get(key).cloned())
    }

    pub fn map_set(&mut self, name: &str, key: &str, value: Value) -> Result<Option<Value>, QuillError> {
        Ok(self.map_entries_mut(name)?.insert(key.to_string(), value))
    }

    pub fn map_has(&self, name: &str, key: &str) -> Result<bool, QuillError> {
        Ok(self.map_entries(name)?.contains_key(key))
    }

    pub fn map_delete(&mut self, name: &str, key: &str) -> Result<Option<Value>, QuillError> {
        Ok(self.map_entries_mut(name)?.remove(key))
    }

    pub fn map_keys(&self, name: &str) -> Result<Vec<String>, QuillError> {
        Ok(self.map_entries(name)?.keys().cloned().collect())
    }

    pub fn map_values(&self, name: &str) -> Result<Vec<Value>, QuillError> {
        Ok(self.map_entries(name)?.values().cloned().collect())
    }

    pub fn map_size(&self, name: &str) -> Result<usize, QuillError> {
        Ok(self.map_entries(name)?.len())
    }
}
