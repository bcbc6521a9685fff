//! Signature verification - the authorship gate of the import pipeline
//!
//! The verifier resolves a template's claimed `(keyId, algorithm)` against its
//! [`TrustStore`] and compares the key's tier with the required minimum.

use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::{SignatureError, TrustLevel, TrustStore, TrustedKey};
use crate::report::{Layer, LayerResult};
use crate::template::{Template, TemplateDocument};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VerifyOptions {
    /// Pass without consulting the store. Never the default.
    pub skip_verification: bool,
    /// Minimum tier a key must hold; `None` means [`TrustLevel::default`]
    pub trust_level: Option<TrustLevel>,
}

impl VerifyOptions {
    pub fn skipped() -> Self {
        Self {
            skip_verification: true,
            trust_level: None,
        }
    }

    pub fn requiring(trust_level: TrustLevel) -> Self {
        Self {
            skip_verification: false,
            trust_level: Some(trust_level),
        }
    }
}

#[derive(Clone, Default)]
pub struct SignatureVerifier {
    store: Arc<RwLock<TrustStore>>,
}

impl SignatureVerifier {
    pub fn new(store: TrustStore) -> Self {
        Self {
            store: Arc::new(RwLock::new(store)),
        }
    }

    pub async fn register(&self, key: TrustedKey) -> Option<TrustedKey> {
        self.store.write().await.register(key)
    }

    /// Check the template's signature claim, failing on the first violation
    pub async fn check(
        &self,
        template: &Template,
        options: VerifyOptions,
    ) -> Result<(), SignatureError> {
        if options.skip_verification {
            return Ok(());
        }

        let signature = &template.metadata().signature;
        let required = options.trust_level.unwrap_or_default();

        let store = self.store.read().await;
        let key = store
            .get(&signature.key_id, &signature.algorithm)
            .ok_or_else(|| SignatureError::UnknownKey {
                key_id: signature.key_id.clone(),
                algorithm: signature.algorithm.clone(),
            })?;

        if key.trust_level < required {
            return Err(SignatureError::TrustTooLow {
                key_id: key.key_id.clone(),
                actual: key.trust_level,
                required,
            });
        }

        debug!(
            "Signature key '{}' accepted at level {} (required {})",
            key.key_id, key.trust_level, required
        );
        Ok(())
    }

    /// Run [`check`](Self::check) and express the outcome as a layer result
    pub async fn verify(&self, template: &Template, options: VerifyOptions) -> LayerResult {
        if options.skip_verification {
            warn!(
                "Signature verification skipped for template '{}'",
                template.metadata().name
            );
            return LayerResult::skipped(Layer::Signature);
        }

        match self.check(template, options).await {
            Ok(()) => LayerResult::pass(Layer::Signature),
            Err(e) => {
                e.log_if_security_critical();
                LayerResult::fail(Layer::Signature, vec![e.to_string()])
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::FlatTemplate;

    fn template_signed_by(key_id: &str) -> Template {
        let yaml = format!(
            r#"
apiVersion: mission-template.v1
kind: MissionTemplate
metadata:
  name: triage
  version: 1.0.0
  author: ops
  signature:
    keyId: {key_id}
    algorithm: ed25519
    value: c2ln
  tags: [ops]
spec:
  objective: Triage incoming incidents
"#
        );
        Template::Flat(FlatTemplate::parse(&yaml).unwrap())
    }

    fn verifier_with(level: TrustLevel) -> SignatureVerifier {
        let mut store = TrustStore::new();
        store.register(TrustedKey::new("ops-key", "ed25519", "pk", level));
        SignatureVerifier::new(store)
    }

    #[tokio::test]
    async fn test_unknown_key_rejected() {
        let verifier = SignatureVerifier::new(TrustStore::new());
        let err = verifier
            .check(&template_signed_by("stranger"), VerifyOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, SignatureError::UnknownKey { .. }));
        assert!(err.to_string().starts_with("Untrusted signature"));
    }

    #[tokio::test]
    async fn test_known_key_accepted_at_default_level() {
        let verifier = verifier_with(TrustLevel::SignedKnown);
        let result = verifier
            .verify(&template_signed_by("ops-key"), VerifyOptions::default())
            .await;
        assert!(result.passed);
        assert!(!result.skipped);
    }

    #[tokio::test]
    async fn test_known_key_below_required_tier_rejected() {
        let verifier = verifier_with(TrustLevel::SignedKnown);
        let err = verifier
            .check(
                &template_signed_by("ops-key"),
                VerifyOptions::requiring(TrustLevel::VerifiedInternal),
            )
            .await
            .unwrap_err();

        assert_eq!(
            err,
            SignatureError::TrustTooLow {
                key_id: "ops-key".into(),
                actual: TrustLevel::SignedKnown,
                required: TrustLevel::VerifiedInternal,
            }
        );
    }

    #[tokio::test]
    async fn test_untrusted_key_fails_default_requirement() {
        let verifier = verifier_with(TrustLevel::Untrusted);
        let result = verifier
            .verify(&template_signed_by("ops-key"), VerifyOptions::default())
            .await;
        assert!(!result.passed);

        let relaxed = verifier
            .verify(
                &template_signed_by("ops-key"),
                VerifyOptions::requiring(TrustLevel::Untrusted),
            )
            .await;
        assert!(relaxed.passed);
    }

    #[tokio::test]
    async fn test_skip_passes_without_store() {
        let verifier = SignatureVerifier::new(TrustStore::new());
        let result = verifier
            .verify(&template_signed_by("stranger"), VerifyOptions::skipped())
            .await;
        assert!(result.passed);
        assert!(result.skipped);
    }

    #[tokio::test]
    async fn test_separate_stores_do_not_interfere() {
        let a = verifier_with(TrustLevel::VerifiedInternal);
        let b = SignatureVerifier::new(TrustStore::new());
        let template = template_signed_by("ops-key");

        assert!(a.verify(&template, VerifyOptions::default()).await.passed);
        assert!(!b.verify(&template, VerifyOptions::default()).await.passed);

        b.register(TrustedKey::new("ops-key", "ed25519", "pk", TrustLevel::SignedKnown))
            .await;
        assert!(b.verify(&template, VerifyOptions::default()).await.passed);
    }
}
