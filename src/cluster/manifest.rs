//! # Manifests
//!
//! Source of the YAML applied when an echo instance is deployed. Rendering
//! templates is left to the caller; the harness only applies the result.

use crate::echo::config::EchoConfig;
use crate::error::HarnessError;

/// Produces the deployment manifest for an echo config
///
/// The config passed in has its defaults filled. Renderers build the
/// container's port list with [`container_ports`](crate::echo::container_ports).
pub trait ManifestRenderer: Send + Sync {
    fn render(&self, cfg: &EchoConfig) -> Result<String, HarnessError>;
}

impl<F> ManifestRenderer for F
where
    F: Fn(&EchoConfig) -> Result<String, HarnessError> + Send + Sync,
{
    fn render(&self, cfg: &EchoConfig) -> Result<String, HarnessError> {
        self(cfg)
    }
}

/// Pre-rendered manifest text, used as-is for every config
#[derive(Debug, Clone)]
pub struct StaticManifest(String);

impl StaticManifest {
    pub fn new(contents: impl Into<String>) -> Self {
        Self(contents.into())
    }
}

impl ManifestRenderer for StaticManifest {
    fn render(&self, _cfg: &EchoConfig) -> Result<String, HarnessError> {
        if self.0.trim().is_empty() {
            return Err(HarnessError::Manifest("manifest is empty".to_string()));
        }
        Ok(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_manifest_rejects_empty_text() {
        let cfg = EchoConfig::new("apps", "a");
        assert!(StaticManifest::new("  \n").render(&cfg).is_err());
        assert_eq!(
            StaticManifest::new("kind: Service").render(&cfg).unwrap(),
            "kind: Service"
        );
    }

    #[test]
    fn test_closures_render() {
        let renderer = |cfg: &EchoConfig| -> Result<String, HarnessError> {
            Ok(format!("# {}", cfg.service))
        };
        let cfg = EchoConfig::new("apps", "b");
        assert_eq!(renderer.render(&cfg).unwrap(), "# b");
    }
}
