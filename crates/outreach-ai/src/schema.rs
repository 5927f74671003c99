//! JSON Schema derivation for structured LLM output. Any type that derives
//! `JsonSchema` and `Deserialize` gets a blanket [`StructuredOutput`] impl —
//! the schema it produces is fixed up to satisfy strict-mode providers
//! (OpenAI's `json_schema` response format, in particular), which require
//! every object to set `additionalProperties: false`, list all properties
//! (nullable ones included) as `required`, and carry no `$ref` indirection.

use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;

pub trait StructuredOutput: JsonSchema + DeserializeOwned {
    fn json_schema_strict() -> serde_json::Value {
        let schema = schema_for!(Self);
        let mut value = serde_json::to_value(schema).unwrap_or_default();

        fix_object_schemas(&mut value);
        inline_refs(&mut value);

        if let serde_json::Value::Object(map) = &mut value {
            map.remove("definitions");
            map.remove("$schema");
        }

        value
    }

    fn type_name() -> String {
        <Self as JsonSchema>::schema_name()
    }
}

impl<T: JsonSchema + DeserializeOwned> StructuredOutput for T {}

fn fix_object_schemas(value: &mut serde_json::Value) {
    if let serde_json::Value::Object(map) = value {
        if map.get("type") == Some(&serde_json::Value::String("object".to_string())) {
            map.insert(
                "additionalProperties".to_string(),
                serde_json::Value::Bool(false),
            );

            if let Some(serde_json::Value::Object(props)) = map.get("properties") {
                let all_keys: Vec<serde_json::Value> = props
                    .keys()
                    .map(|k| serde_json::Value::String(k.clone()))
                    .collect();
                map.insert("required".to_string(), serde_json::Value::Array(all_keys));
            }
        }

        for (_, v) in map.iter_mut() {
            fix_object_schemas(v);
        }
    } else if let serde_json::Value::Array(arr) = value {
        for item in arr.iter_mut() {
            fix_object_schemas(item);
        }
    }
}

fn inline_refs(value: &mut serde_json::Value) {
    let definitions = if let serde_json::Value::Object(map) = value {
        map.get("definitions").cloned()
    } else {
        None
    };

    if let Some(defs) = definitions {
        inline_refs_recursive(value, &defs);
    }
}

fn inline_refs_recursive(value: &mut serde_json::Value, definitions: &serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            if let Some(serde_json::Value::String(ref_path)) = map.get("$ref").cloned() {
                if ref_path.starts_with("#/definitions/") {
                    let type_name = ref_path.trim_start_matches("#/definitions/");
                    if let Some(def) = definitions.get(type_name) {
                        *value = def.clone();
                        inline_refs_recursive(value, definitions);
                        return;
                    }
                }
            }

            if let Some(serde_json::Value::Array(all_of)) = map.get("allOf").cloned() {
                if all_of.len() == 1 {
                    *value = all_of.into_iter().next().unwrap();
                    inline_refs_recursive(value, definitions);
                    return;
                }
            }

            for (_, v) in map.iter_mut() {
                inline_refs_recursive(v, definitions);
            }
        }
        serde_json::Value::Array(arr) => {
            for item in arr.iter_mut() {
                inline_refs_recursive(item, definitions);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize, JsonSchema)]
    struct Contact {
        phone: Option<String>,
        email: Option<String>,
        name: String,
    }

    #[test]
    fn marks_all_properties_required() {
        let schema = Contact::json_schema_strict();
        let obj = schema.as_object().unwrap();
        assert!(!obj.contains_key("definitions"));
        let required: Vec<&str> = obj
            .get("required")
            .unwrap()
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|v| v.as_str())
            .collect();
        assert!(required.contains(&"phone"));
        assert!(required.contains(&"email"));
        assert!(required.contains(&"name"));
    }

    #[derive(Deserialize, JsonSchema)]
    struct Inner {
        value: Option<String>,
    }

    #[derive(Deserialize, JsonSchema)]
    struct Outer {
        inner: Inner,
        title: String,
    }

    #[test]
    fn inlines_nested_struct_refs() {
        let schema = Outer::json_schema_strict();
        let obj = schema.as_object().unwrap();
        let properties = obj.get("properties").unwrap().as_object().unwrap();
        let inner = properties.get("inner").unwrap().as_object().unwrap();
        assert!(!inner.contains_key("$ref"));
        assert_eq!(
            inner.get("additionalProperties"),
            Some(&serde_json::Value::Bool(false))
        );
    }
}
