//! World and admission errors.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorldError {
    #[error("state error: {0}")]
    State(#[from] ward_ecs::StateError),

    #[error("kv error: {0}")]
    Kv(#[from] ward_kv::KvError),

    #[error("codec error: {0}")]
    Codec(#[from] ward_codec::CodecError),

    #[error("transaction registry error: {0}")]
    Tx(#[from] ward_tx::TxError),

    #[error(transparent)]
    Admission(#[from] AdmissionError),

    #[error("recovery has not been performed; call load_state first")]
    RecoveryRequired,

    #[error("world state has not been loaded")]
    StateNotLoaded,

    #[error("registration is frozen after load_state")]
    SchemaFrozen,

    #[error("component registration must happen once: {0}")]
    ComponentRegistrationMustHappenOnce(String),

    #[error("component {0} is not registered")]
    ComponentNotRegistered(&'static str),

    #[error("system {system} failed: {source}")]
    System {
        system: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("tick cancelled")]
    TickCancelled,

    #[error("corrupt journal record: {0}")]
    CorruptJournal(String),
}

/// Rejections on the transaction admission path. The queue and the
/// nonce table are untouched when any of these is returned.
#[derive(Error, Debug)]
pub enum AdmissionError {
    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    #[error("persona tag {0:?} has no signer")]
    PersonaTagHasNoSigner(String),

    #[error("create persona transactions have not been processed")]
    CreatePersonaTxsNotProcessed,

    #[error("system transaction required")]
    SystemTransactionRequired,

    #[error("system transaction forbidden")]
    SystemTransactionForbidden,

    #[error("persona tag must not be empty")]
    EmptyPersonaTag,

    #[error("unknown transaction type: {0}")]
    UnknownTransactionType(String),

    #[error("kv error: {0}")]
    Kv(#[from] ward_kv::KvError),

    #[error("codec error: {0}")]
    Codec(#[from] ward_codec::CodecError),
}
