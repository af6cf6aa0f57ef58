//! `{__type:"Map", entries:[...]}` / `{__type:"Set", values:[...]}` wrappers
//! (§4.C, §6) so maps and sets round-trip losslessly through JSON regardless
//! of whether their key type is itself a JSON object key.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::ops::{Deref, DerefMut};

use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone)]
pub struct TaggedMap<K, V>(pub HashMap<K, V>);

impl<K, V> Default for TaggedMap<K, V> {
    fn default() -> Self {
        TaggedMap(HashMap::new())
    }
}

impl<K, V> Deref for TaggedMap<K, V> {
    type Target = HashMap<K, V>;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<K, V> DerefMut for TaggedMap<K, V> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl<K: Serialize, V: Serialize> Serialize for TaggedMap<K, V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let entries: Vec<(&K, &V)> = self.0.iter().collect();
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("__type", "Map")?;
        map.serialize_entry("entries", &entries)?;
        map.end()
    }
}

impl<'de, K, V> Deserialize<'de> for TaggedMap<K, V>
where
    K: Deserialize<'de> + Eq + Hash,
    V: Deserialize<'de>,
{
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TaggedMapVisitor<K, V>(std::marker::PhantomData<(K, V)>);

        impl<'de, K, V> Visitor<'de> for TaggedMapVisitor<K, V>
        where
            K: Deserialize<'de> + Eq + Hash,
            V: Deserialize<'de>,
        {
            type Value = TaggedMap<K, V>;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "a tagged Map object")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut entries: Option<Vec<(K, V)>> = None;
                while let Some(key) = map.next_key::<String>()? {
                    match key.as_str() {
                        "entries" => entries = Some(map.next_value()?),
                        "__type" => {
                            let _: String = map.next_value()?;
                        }
                        _ => {
                            let _: serde::de::IgnoredAny = map.next_value()?;
                        }
                    }
                }
                let entries = entries.ok_or_else(|| de::Error::missing_field("entries"))?;
                Ok(TaggedMap(entries.into_iter().collect()))
            }
        }

        deserializer.deserialize_map(TaggedMapVisitor(std::marker::PhantomData))
    }
}

#[derive(Debug, Clone)]
pub struct TaggedSet<T>(pub HashSet<T>);

impl<T> Default for TaggedSet<T> {
    fn default() -> Self {
        TaggedSet(HashSet::new())
    }
}

impl<T> Deref for TaggedSet<T> {
    type Target = HashSet<T>;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T> DerefMut for TaggedSet<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl<T: Serialize> Serialize for TaggedSet<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let values: Vec<&T> = self.0.iter().collect();
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("__type", "Set")?;
        map.serialize_entry("values", &values)?;
        map.end()
    }
}

impl<'de, T> Deserialize<'de> for TaggedSet<T>
where
    T: Deserialize<'de> + Eq + Hash,
{
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TaggedSetVisitor<T>(std::marker::PhantomData<T>);

        impl<'de, T> Visitor<'de> for TaggedSetVisitor<T>
        where
            T: Deserialize<'de> + Eq + Hash,
        {
            type Value = TaggedSet<T>;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "a tagged Set object")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut values: Option<Vec<T>> = None;
                while let Some(key) = map.next_key::<String>()? {
                    match key.as_str() {
                        "values" => values = Some(map.next_value()?),
                        "__type" => {
                            let _: String = map.next_value()?;
                        }
                        _ => {
                            let _: serde::de::IgnoredAny = map.next_value()?;
                        }
                    }
                }
                let values = values.ok_or_else(|| de::Error::missing_field("values"))?;
                Ok(TaggedSet(values.into_iter().collect()))
            }
        }

        deserializer.deserialize_map(TaggedSetVisitor(std::marker::PhantomData))
    }
}

impl<K: Eq + Hash, V> FromIterator<(K, V)> for TaggedMap<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        TaggedMap(iter.into_iter().collect())
    }
}

impl<T: Eq + Hash> FromIterator<T> for TaggedSet<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        TaggedSet(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_round_trips_through_json() {
        let mut m: TaggedMap<String, i32> = TaggedMap::default();
        m.insert("a".to_string(), 1);
        m.insert("b".to_string(), 2);
        let json = serde_json::to_value(&m).unwrap();
        assert_eq!(json["__type"], "Map");
        let back: TaggedMap<String, i32> = serde_json::from_value(json).unwrap();
        assert_eq!(back.0, m.0);
    }

    #[test]
    fn set_round_trips_through_json() {
        let mut s: TaggedSet<String> = TaggedSet::default();
        s.insert("x".to_string());
        s.insert("y".to_string());
        let json = serde_json::to_value(&s).unwrap();
        assert_eq!(json["__type"], "Set");
        let back: TaggedSet<String> = serde_json::from_value(json).unwrap();
        assert_eq!(back.0, s.0);
    }

    #[test]
    fn unknown_fields_are_tolerated() {
        let json = serde_json::json!({"__type":"Set","values":["a"],"future_field": 42});
        let back: TaggedSet<String> = serde_json::from_value(json).unwrap();
        assert!(back.contains("a"));
    }
}
