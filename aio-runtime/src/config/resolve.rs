//! The composite configuration resolution algorithm.
//!
//! Pure functions over a `lookup` closure so the algorithm can be unit
//! tested without the full engine (storage, locking, versioning) in
//! the loop.

use aio_core::{ConfigItem, ConfigValue, Error, Result, ValueType};
use std::collections::{BTreeMap, HashSet};

/// Resolves `logical_key` under `(env, fallback)` into a JSON object,
/// expanding `ref` properties and casting primitives per their
/// `ValueType`. `visited` is the current recursion stack, used to
/// detect `ref` cycles; callers pass an empty set for a top-level call.
pub fn resolve_logical(
    logical_key: &str,
    env: &str,
    fallback: Option<&[String]>,
    lookup: &dyn Fn(&str) -> Option<ConfigItem>,
    visited: &mut HashSet<String>,
) -> Result<serde_json::Value> {
    if !visited.insert(logical_key.to_string()) {
        return Err(Error::invalid_argument(format!(
            "ref cycle detected while resolving '{logical_key}'"
        )));
    }

    let chain = aio_core::env::resolution_chain(env, fallback);
    let mut merged: BTreeMap<String, ConfigValue> = BTreeMap::new();
    for candidate in &chain {
        let storage_key = ConfigItem::storage_key(logical_key, candidate);
        if let Some(item) = lookup(&storage_key) {
            for (name, value) in &item.properties {
                // Outer (higher-priority, earlier-in-chain) layers win:
                // don't overwrite a key a previous candidate already set.
                merged.entry(name.clone()).or_insert_with(|| value.clone());
            }
        }
    }

    let mut obj = serde_json::Map::new();
    for (name, value) in &merged {
        let materialized = materialize(value, env, fallback, lookup, visited)?;
        obj.insert(name.clone(), materialized);
    }

    visited.remove(logical_key);
    Ok(serde_json::Value::Object(obj))
}

/// `true` if at least one chain candidate for `logical_key` under
/// `(env, fallback)` has a stored value. Distinguishes "resolved to an
/// empty object because the key is entirely absent" from "resolved to
/// an empty object because the stored item just has no properties" —
/// callers that must omit missing keys (rather than project them as
/// `{}`) check this before resolving.
pub fn logical_key_exists(
    logical_key: &str,
    env: &str,
    fallback: Option<&[String]>,
    lookup: &dyn Fn(&str) -> Option<ConfigItem>,
) -> bool {
    aio_core::env::resolution_chain(env, fallback)
        .iter()
        .any(|candidate| lookup(&ConfigItem::storage_key(logical_key, candidate)).is_some())
}

fn materialize(
    value: &ConfigValue,
    env: &str,
    fallback: Option<&[String]>,
    lookup: &dyn Fn(&str) -> Option<ConfigItem>,
    visited: &mut HashSet<String>,
) -> Result<serde_json::Value> {
    match value.value_type {
        ValueType::String | ValueType::Encrypted => Ok(serde_json::Value::String(value.value.clone())),
        ValueType::Int => {
            let n: i64 = value
                .value
                .parse()
                .map_err(|_| Error::invalid_argument(format!("'{}' is not a valid int", value.value)))?;
            Ok(serde_json::json!(n))
        }
        ValueType::Float => {
            let f: f64 = value
                .value
                .parse()
                .map_err(|_| Error::invalid_argument(format!("'{}' is not a valid float", value.value)))?;
            Ok(serde_json::json!(f))
        }
        ValueType::Bool => {
            let b: bool = value
                .value
                .parse()
                .map_err(|_| Error::invalid_argument(format!("'{}' is not a valid bool", value.value)))?;
            Ok(serde_json::Value::Bool(b))
        }
        ValueType::Object | ValueType::Array => serde_json::from_str(&value.value)
            .map_err(|e| Error::invalid_argument(format!("malformed stored json: {e}"))),
        ValueType::Ref => {
            let payload = value
                .parse_ref()
                .ok_or_else(|| Error::invalid_argument("malformed ref payload"))?;
            let resolved = resolve_logical(&payload.key, env, fallback, lookup, visited)?;
            match payload.property {
                Some(property) => Ok(resolved.get(&property).cloned().unwrap_or(serde_json::Value::Null)),
                None => Ok(resolved),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn item(logical: &str, env: &str, props: &[(&str, ConfigValue)]) -> ConfigItem {
        ConfigItem {
            logical_key: logical.to_string(),
            env: env.to_string(),
            properties: props.iter().map(|(k, v)| (k.to_string(), v.clone())).collect(),
            version: 1,
            metadata: BTreeMap::new(),
            description: String::new(),
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn environment_fallback_overlay() {
        let base = item(
            "app",
            "default",
            &[
                ("app_name", ConfigValue::string("MyApp")),
                ("max_conn", ConfigValue::int(100)),
                ("debug", ConfigValue::bool(false)),
            ],
        );
        let dev = item(
            "app",
            "dev",
            &[
                ("debug", ConfigValue::bool(true)),
                ("dev_tools", ConfigValue::bool(true)),
            ],
        );
        let prod = item("app", "prod", &[("max_conn", ConfigValue::int(1000))]);

        let lookup = |key: &str| match key {
            "app.default" => Some(base.clone()),
            "app.dev" => Some(dev.clone()),
            "app.prod" => Some(prod.clone()),
            _ => None,
        };

        let dev_resolved = resolve_logical("app", "dev", None, &lookup, &mut HashSet::new()).unwrap();
        assert_eq!(
            dev_resolved,
            serde_json::json!({"app_name": "MyApp", "max_conn": 100, "debug": true, "dev_tools": true})
        );

        let prod_resolved = resolve_logical("app", "prod", None, &lookup, &mut HashSet::new()).unwrap();
        assert_eq!(
            prod_resolved,
            serde_json::json!({"app_name": "MyApp", "max_conn": 1000, "debug": false})
        );
    }

    #[test]
    fn ref_resolves_nested_object_with_typed_int() {
        let db = item(
            "db.config",
            "default",
            &[
                ("host", ConfigValue::string("localhost")),
                ("port", ConfigValue::int(5432)),
            ],
        );
        let app = item(
            "app.full_config",
            "default",
            &[("database", ConfigValue::reference("db.config", None))],
        );

        let lookup = |key: &str| match key {
            "db.config.default" => Some(db.clone()),
            "app.full_config.default" => Some(app.clone()),
            _ => None,
        };

        let resolved = resolve_logical("app.full_config", "dev", None, &lookup, &mut HashSet::new()).unwrap();
        assert_eq!(
            resolved,
            serde_json::json!({"database": {"host": "localhost", "port": 5432}})
        );
    }

    #[test]
    fn ref_cycle_is_rejected() {
        let a = item("a", "default", &[("b", ConfigValue::reference("b", None))]);
        let b = item("b", "default", &[("a", ConfigValue::reference("a", None))]);
        let lookup = |key: &str| match key {
            "a.default" => Some(a.clone()),
            "b.default" => Some(b.clone()),
            _ => None,
        };
        let err = resolve_logical("a", "dev", None, &lookup, &mut HashSet::new()).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn ref_with_property_selector() {
        let db = item("db.config", "default", &[("port", ConfigValue::int(5432))]);
        let app = item(
            "app",
            "default",
            &[("db_port", ConfigValue::reference("db.config", Some("port".to_string())))],
        );
        let lookup = |key: &str| match key {
            "db.config.default" => Some(db.clone()),
            "app.default" => Some(app.clone()),
            _ => None,
        };
        let resolved = resolve_logical("app", "dev", None, &lookup, &mut HashSet::new()).unwrap();
        assert_eq!(resolved, serde_json::json!({"db_port": 5432}));
    }
}
