//! Projection of a full manifest down to its re-appliable subset.

use serde::Deserialize;
use serde_yaml::Value;

use crate::harvest::traits::{HarvestStage, ParseError};
use crate::model::{ObjectKind, ObjectMetadata, RawManifest, SanitizedManifest};

/// Shape of a fetched manifest. Every other field (namespace, uid,
/// resourceVersion, timestamps, owner references, status, ...) is dropped
/// by not being declared here.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FetchedManifest {
    api_version: Option<String>,
    kind: Option<String>,
    metadata: Option<FetchedMetadata>,
    #[serde(rename = "type")]
    type_: Option<String>,
    data: Option<Value>,
    string_data: Option<Value>,
    binary_data: Option<Value>,
    spec: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct FetchedMetadata {
    name: Option<String>,
}

/// Sanitizer stage: [`RawManifest`] → [`SanitizedManifest`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ManifestSanitizer {
    expected: Option<ObjectKind>,
}

impl ManifestSanitizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects manifests whose kind differs from `kind`.
    pub fn expecting(mut self, kind: ObjectKind) -> Self {
        self.expected = Some(kind);
        self
    }

    pub fn sanitize(&self, raw: &RawManifest) -> Result<SanitizedManifest, ParseError> {
        let object = raw.name.to_string();

        let fetched: FetchedManifest =
            serde_yaml::from_str(&raw.body).map_err(|e| ParseError::InvalidDocument {
                object: object.clone(),
                message: e.to_string(),
            })?;

        let api_version = required(fetched.api_version, &object, "apiVersion")?;
        let kind_name = required(fetched.kind, &object, "kind")?;
        let name = required(
            fetched.metadata.and_then(|m| m.name),
            &object,
            "metadata.name",
        )?;

        let kind = ObjectKind::from_manifest_kind(&kind_name).ok_or_else(|| {
            ParseError::UnsupportedKind {
                object: object.clone(),
                kind: kind_name.clone(),
            }
        })?;

        if let Some(expected) = self.expected {
            if expected != kind {
                return Err(ParseError::KindMismatch {
                    object,
                    expected: expected.manifest_kind().to_string(),
                    found: kind_name,
                });
            }
        }

        let mut manifest = SanitizedManifest {
            api_version,
            binary_data: None,
            data: None,
            kind: kind_name,
            metadata: ObjectMetadata { name },
            spec: None,
            string_data: None,
            type_: None,
        };

        match kind {
            ObjectKind::Secret => {
                manifest.data = fetched.data;
                manifest.string_data = fetched.string_data;
                manifest.type_ = fetched.type_;
            }
            ObjectKind::ConfigMap => {
                manifest.data = fetched.data;
                manifest.binary_data = fetched.binary_data;
            }
            ObjectKind::Deployment => {
                manifest.spec = fetched.spec.map(strip_template_timestamp);
            }
        }

        Ok(manifest)
    }
}

impl HarvestStage for ManifestSanitizer {
    type Input = RawManifest;
    type Output = SanitizedManifest;
    type Error = ParseError;

    fn execute(&self, input: Self::Input) -> Result<Self::Output, Self::Error> {
        self.sanitize(&input)
    }

    fn stage_name(&self) -> &'static str {
        "sanitize"
    }
}

fn required(
    value: Option<String>,
    object: &str,
    field: &'static str,
) -> Result<String, ParseError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ParseError::MissingField {
            object: object.to_string(),
            field,
        }),
    }
}

/// `kubectl get deployment -o yaml` reports `creationTimestamp: null` inside
/// the pod template.
fn strip_template_timestamp(mut spec: Value) -> Value {
    if let Some(metadata) = spec
        .get_mut("template")
        .and_then(|t| t.get_mut("metadata"))
        .and_then(Value::as_mapping_mut)
    {
        metadata.remove("creationTimestamp");
    }
    spec
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ObjectName;

    const SECRET: &str = r#"apiVersion: v1
data:
  password: cGFzcw==
  username: YWRtaW4=
kind: Secret
metadata:
  annotations:
    kubectl.kubernetes.io/last-applied-configuration: "{}"
  creationTimestamp: "2023-04-01T10:00:00Z"
  labels:
    app: db
  name: db-creds
  namespace: lion
  ownerReferences:
  - apiVersion: v1
    kind: Pod
    name: owner
    uid: 1b2c
  resourceVersion: "12345"
  uid: 6f1c0a52-59c8-4b3e-9a68-2f2c9f0b7d11
type: Opaque
"#;

    const CONFIG_MAP: &str = r#"apiVersion: v1
data:
  LOG_LEVEL: info
binaryData:
  blob: AAEC
kind: ConfigMap
metadata:
  name: app-settings
  namespace: lion
  resourceVersion: "99"
  uid: 1234
type: ignored
"#;

    const DEPLOYMENT: &str = r#"apiVersion: apps/v1
kind: Deployment
metadata:
  generation: 3
  name: web
  namespace: lion
spec:
  replicas: 2
  selector:
    matchLabels:
      app: web
  template:
    metadata:
      creationTimestamp: null
      labels:
        app: web
    spec:
      containers:
      - image: nginx:1.25
        name: web
status:
  availableReplicas: 2
"#;

    fn raw(name: &str, body: &str) -> RawManifest {
        RawManifest::new(ObjectName::new(name), body)
    }

    #[test]
    fn test_secret_projection() {
        let manifest = ManifestSanitizer::new()
            .sanitize(&raw("secret/db-creds", SECRET))
            .unwrap();

        assert_eq!(manifest.api_version, "v1");
        assert_eq!(manifest.kind, "Secret");
        assert_eq!(manifest.name(), "db-creds");
        assert_eq!(manifest.type_.as_deref(), Some("Opaque"));
        assert_eq!(
            manifest.data.as_ref().and_then(|d| d.get("password")),
            Some(&Value::String("cGFzcw==".to_string()))
        );

        let text = serde_yaml::to_string(&manifest).unwrap();
        for dropped in ["namespace", "resourceVersion", "uid", "creationTimestamp", "labels"] {
            assert!(!text.contains(dropped), "{} leaked into {}", dropped, text);
        }
    }

    #[test]
    fn test_config_map_has_no_type() {
        let manifest = ManifestSanitizer::new()
            .sanitize(&raw("configmap/app-settings", CONFIG_MAP))
            .unwrap();

        assert_eq!(manifest.type_, None);
        assert!(manifest.data.is_some());
        assert!(manifest.binary_data.is_some());

        let text = serde_yaml::to_string(&manifest).unwrap();
        assert!(!text.contains("type"));
        assert!(!text.contains("namespace"));
        assert!(!text.contains("resourceVersion"));
    }

    #[test]
    fn test_deployment_keeps_spec() {
        let manifest = ManifestSanitizer::new()
            .sanitize(&raw("deployment.apps/web", DEPLOYMENT))
            .unwrap();

        let spec = manifest.spec.as_ref().unwrap();
        assert_eq!(spec.get("replicas").and_then(Value::as_u64), Some(2));
        assert!(manifest.data.is_none());

        let text = serde_yaml::to_string(&manifest).unwrap();
        assert!(!text.contains("creationTimestamp"));
        assert!(!text.contains("status"));
        assert!(!text.contains("generation"));
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        let sanitizer = ManifestSanitizer::new();
        for (name, body) in [
            ("secret/db-creds", SECRET),
            ("configmap/app-settings", CONFIG_MAP),
            ("deployment.apps/web", DEPLOYMENT),
        ] {
            let once = sanitizer.sanitize(&raw(name, body)).unwrap();
            let text = serde_yaml::to_string(&once).unwrap();
            let twice = sanitizer.sanitize(&raw(name, &text)).unwrap();
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn test_serialized_form_parses_back() {
        let manifest = ManifestSanitizer::new()
            .sanitize(&raw("secret/db-creds", SECRET))
            .unwrap();
        let text = serde_yaml::to_string(&manifest).unwrap();
        let parsed: SanitizedManifest = serde_yaml::from_str(&text).unwrap();
        assert_eq!(parsed, manifest);
    }

    #[test]
    fn test_missing_fields() {
        let sanitizer = ManifestSanitizer::new();

        let err = sanitizer
            .sanitize(&raw("secret/x", "kind: Secret\nmetadata:\n  name: x\n"))
            .unwrap_err();
        assert!(matches!(err, ParseError::MissingField { field: "apiVersion", .. }));

        let err = sanitizer
            .sanitize(&raw("secret/x", "apiVersion: v1\nkind: Secret\nmetadata: {}\n"))
            .unwrap_err();
        assert!(matches!(err, ParseError::MissingField { field: "metadata.name", .. }));
    }

    #[test]
    fn test_invalid_documents() {
        let sanitizer = ManifestSanitizer::new();
        assert!(sanitizer.sanitize(&raw("secret/x", "")).is_err());
        assert!(matches!(
            sanitizer.sanitize(&raw("secret/x", "- just\n- a list\n")),
            Err(ParseError::InvalidDocument { .. })
        ));
        assert!(matches!(
            sanitizer.sanitize(&raw("secret/x", "apiVersion: [unclosed\n")),
            Err(ParseError::InvalidDocument { .. })
        ));
    }

    #[test]
    fn test_kind_checks() {
        let pod = "apiVersion: v1\nkind: Pod\nmetadata:\n  name: p\n";
        assert!(matches!(
            ManifestSanitizer::new().sanitize(&raw("pod/p", pod)),
            Err(ParseError::UnsupportedKind { .. })
        ));

        assert!(matches!(
            ManifestSanitizer::new()
                .expecting(ObjectKind::ConfigMap)
                .sanitize(&raw("secret/db-creds", SECRET)),
            Err(ParseError::KindMismatch { .. })
        ));
    }
}
