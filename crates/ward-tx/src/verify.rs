//! Signature verification seam.
//!
//! The cryptographic primitive lives outside the engine; admission only
//! needs a verdict. Implementations check the signature over the
//! envelope's namespace, nonce, and body against the resolved signer
//! address.

use thiserror::Error;

use crate::SignedTx;

#[derive(Error, Debug)]
#[error("signature verification failed: {0}")]
pub struct SignatureError(pub String);

pub trait SignatureVerifier: Send + Sync {
    fn verify(&self, tx: &SignedTx, signer_address: &str) -> Result<(), SignatureError>;
}

/// Accepts every payload. The verifier used when signature verification
/// is disabled and in tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopVerifier;

impl SignatureVerifier for NoopVerifier {
    fn verify(&self, _tx: &SignedTx, _signer_address: &str) -> Result<(), SignatureError> {
        Ok(())
    }
}

/// Rejects every payload. Used to exercise rejection paths in tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct RejectingVerifier;

impl SignatureVerifier for RejectingVerifier {
    fn verify(&self, _tx: &SignedTx, signer_address: &str) -> Result<(), SignatureError> {
        Err(SignatureError(format!(
            "rejected payload for {signer_address}"
        )))
    }
}
