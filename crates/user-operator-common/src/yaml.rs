//! YAML parsing into `serde_json::Value` using yaml-rust2
//!
//! Rendered templates are parsed here before being turned into manifests.
//! JSON is the lingua franca for everything past this point.

use serde_json::{Map, Number, Value};
use thiserror::Error;
use yaml_rust2::{Yaml, YamlLoader};

/// Error type for YAML parsing
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct YamlError(String);

/// Parse a possibly multi-document YAML string.
///
/// Each document separated by `---` becomes one Value. Empty input, or input
/// holding only comments, yields no documents.
pub fn parse_yaml_documents(input: &str) -> Result<Vec<Value>, YamlError> {
    let docs = YamlLoader::load_from_str(input).map_err(|e| YamlError(e.to_string()))?;
    docs.into_iter().map(yaml_to_json).collect()
}

fn yaml_to_json(yaml: Yaml) -> Result<Value, YamlError> {
    match yaml {
        Yaml::Null => Ok(Value::Null),
        Yaml::Boolean(b) => Ok(Value::Bool(b)),
        Yaml::Integer(i) => Ok(Value::Number(i.into())),
        Yaml::Real(s) => {
            let f: f64 = s
                .parse()
                .map_err(|e: std::num::ParseFloatError| YamlError(e.to_string()))?;
            Ok(Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null))
        }
        Yaml::String(s) => Ok(Value::String(s)),
        Yaml::Array(arr) => arr
            .into_iter()
            .map(yaml_to_json)
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Yaml::Hash(map) => map
            .into_iter()
            .map(|(k, v)| {
                let key = match k {
                    Yaml::String(s) => s,
                    Yaml::Integer(i) => i.to_string(),
                    Yaml::Real(r) => r,
                    Yaml::Boolean(b) => b.to_string(),
                    Yaml::Null => "null".to_string(),
                    _ => return Err(YamlError("unsupported YAML key type".to_string())),
                };
                yaml_to_json(v).map(|v| (key, v))
            })
            .collect::<Result<Map<String, Value>, _>>()
            .map(Value::Object),
        Yaml::Alias(_) => Err(YamlError("YAML aliases not supported".to_string())),
        Yaml::BadValue => Err(YamlError("bad YAML value".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_configmap() {
        let yaml = r#"
apiVersion: v1
kind: ConfigMap
metadata:
  name: profile
data:
  user: alice
  quota: "10"
"#;
        let docs = parse_yaml_documents(yaml).expect("valid YAML");
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0]["kind"], "ConfigMap");
        assert_eq!(docs[0]["metadata"]["name"], "profile");
        assert_eq!(docs[0]["data"]["quota"], "10");
    }

    #[test]
    fn test_scalars_keep_their_types() {
        let docs = parse_yaml_documents("replicas: 3\nratio: 1.5\nready: true\nnote: null")
            .expect("valid YAML");
        assert_eq!(docs[0]["replicas"], 3);
        assert!((docs[0]["ratio"].as_f64().expect("float") - 1.5).abs() < f64::EPSILON);
        assert_eq!(docs[0]["ready"], true);
        assert!(docs[0]["note"].is_null());
    }

    #[test]
    fn test_multi_document() {
        let docs = parse_yaml_documents("name: first\n---\nname: second\n").expect("valid YAML");
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[1]["name"], "second");
    }

    #[test]
    fn test_empty_and_comment_only_input() {
        assert!(parse_yaml_documents("").expect("empty is valid").is_empty());
        let docs = parse_yaml_documents("# nothing rendered\n").expect("comments are valid");
        assert!(docs.iter().all(Value::is_null));
    }

    #[test]
    fn test_invalid_yaml() {
        assert!(parse_yaml_documents("not: valid: yaml: {{").is_err());
    }
}
