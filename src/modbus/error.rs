use thiserror::Error;

/// Register block decoding errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("register block length mismatch: expected {expected} words, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
}

/// Errors of a single bus transaction; all of them are retryable
#[derive(Debug, Error)]
pub enum BusError {
    #[error("bus lock not acquired for module {owner} after {waited_ms}ms")]
    LockTimeout { owner: u8, waited_ms: u64 },

    #[error("transport error on unit {unit}: {source}")]
    Transport {
        unit: u8,
        #[source]
        source: std::io::Error,
    },

    #[error("no response from unit {unit} within {timeout_ms}ms")]
    RequestTimeout { unit: u8, timeout_ms: u64 },

    #[error("bad register block from module {module_id}: {source}")]
    Decode {
        module_id: u8,
        #[source]
        source: DecodeError,
    },
}
