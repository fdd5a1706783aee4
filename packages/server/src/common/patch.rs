//! Tri-state field for partial updates.
//!
//! A JSON payload distinguishes three cases per field:
//!
//! | JSON                 | `Patch<T>`   | effect            |
//! |----------------------|--------------|-------------------|
//! | key absent           | `Missing`    | leave as-is       |
//! | `"key": null`        | `Null`       | clear             |
//! | `"key": <value>`     | `Set(value)` | overwrite         |
//!
//! Fields must be annotated with `#[serde(default)]` so an absent key
//! deserializes to `Missing`.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Patch<T> {
    #[default]
    Missing,
    Null,
    Set(T),
}

impl<T> Patch<T> {
    pub fn is_missing(&self) -> bool {
        matches!(self, Patch::Missing)
    }

    /// True when the payload carries a non-null value.
    pub fn is_set(&self) -> bool {
        matches!(self, Patch::Set(_))
    }

    pub fn as_set(&self) -> Option<&T> {
        match self {
            Patch::Set(value) => Some(value),
            _ => None,
        }
    }

    /// Apply to an optional scalar column.
    pub fn apply_to(self, target: &mut Option<T>) {
        match self {
            Patch::Missing => {}
            Patch::Null => *target = None,
            Patch::Set(value) => *target = Some(value),
        }
    }

    /// The value the target would hold after `apply_to`, without mutating it.
    pub fn resolve<'a>(&'a self, current: &'a Option<T>) -> Option<&'a T> {
        match self {
            Patch::Missing => current.as_ref(),
            Patch::Null => None,
            Patch::Set(value) => Some(value),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Patch<U> {
        match self {
            Patch::Missing => Patch::Missing,
            Patch::Null => Patch::Null,
            Patch::Set(value) => Patch::Set(f(value)),
        }
    }

    /// Fallible map, keeping `Missing`/`Null` untouched.
    pub fn try_map<U, E>(self, f: impl FnOnce(T) -> Result<U, E>) -> Result<Patch<U>, E> {
        Ok(match self {
            Patch::Missing => Patch::Missing,
            Patch::Null => Patch::Null,
            Patch::Set(value) => Patch::Set(f(value)?),
        })
    }
}

impl<T> Patch<Vec<T>> {
    /// Apply to a set-valued collection: present means full replacement,
    /// explicit null clears.
    pub fn replace_into(self, target: &mut Vec<T>) {
        match self {
            Patch::Missing => {}
            Patch::Null => target.clear(),
            Patch::Set(values) => *target = values,
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Patch<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Option::<T>::deserialize(deserializer).map(|value| match value {
            Some(value) => Patch::Set(value),
            None => Patch::Null,
        })
    }
}

impl<T: Serialize> Serialize for Patch<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Patch::Set(value) => value.serialize(serializer),
            _ => serializer.serialize_none(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    #[serde(deny_unknown_fields)]
    struct Payload {
        #[serde(default)]
        tower: Patch<String>,
        #[serde(default)]
        floor: Patch<i16>,
    }

    #[test]
    fn absent_null_and_value_are_distinct() {
        let p: Payload = serde_json::from_str(r#"{"tower": null}"#).unwrap();
        assert_eq!(p.tower, Patch::Null);
        assert_eq!(p.floor, Patch::Missing);

        let p: Payload = serde_json::from_str(r#"{"floor": 5}"#).unwrap();
        assert_eq!(p.floor, Patch::Set(5));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(serde_json::from_str::<Payload>(r#"{"towr": "B"}"#).is_err());
    }

    #[test]
    fn apply_semantics() {
        let mut target = Some("A".to_string());
        Patch::Missing.apply_to(&mut target);
        assert_eq!(target.as_deref(), Some("A"));
        Patch::Set("B".to_string()).apply_to(&mut target);
        assert_eq!(target.as_deref(), Some("B"));
        Patch::<String>::Null.apply_to(&mut target);
        assert!(target.is_none());
    }

    #[test]
    fn collections_replace_wholesale() {
        let mut items = vec![1, 2, 3];
        Patch::Set(vec![9]).replace_into(&mut items);
        assert_eq!(items, vec![9]);
        Patch::<Vec<i32>>::Missing.replace_into(&mut items);
        assert_eq!(items, vec![9]);
        Patch::<Vec<i32>>::Null.replace_into(&mut items);
        assert!(items.is_empty());
    }
}
