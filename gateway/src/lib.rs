use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("gateway unavailable: {0}")]
    GatewayUnavailable(String),
    #[error("gateway rejected the request ({code}): {message}")]
    Rejected { code: i64, message: String },
    #[error("invalid signature")]
    InvalidSignature,
    #[error("malformed notification: {0}")]
    MalformedNotification(String),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("invalid: {0}")]
    Invalid(String),
    #[error("{0} does not support {1}")]
    Unsupported(&'static str, &'static str),
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Self::GatewayUnavailable(err.to_string())
    }
}

pub type Result<T, E = Error> = core::result::Result<T, E>;

pub mod signature;

pub mod gateway;
pub use gateway::{Checkout, Method, Order, PaymentConfig, PaymentGateway};

pub mod momo;
pub use momo::Momo;

pub mod qr;
pub use qr::{CustomQr, VietQr};

static LAST_MS: AtomicU64 = AtomicU64::new(0);

pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Millisecond timestamp that never repeats inside this process.
pub fn unique_ms() -> u64 {
    let now = now_ms();
    let mut last = LAST_MS.load(Ordering::Relaxed);
    loop {
        let next = if now > last { now } else { last + 1 };
        match LAST_MS.compare_exchange_weak(last, next, Ordering::SeqCst, Ordering::Relaxed) {
            Ok(_) => return next,
            Err(current) => last = current,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn unique_ms_is_strictly_increasing() {
        let values = (0..1000).map(|_| unique_ms()).collect::<Vec<_>>();
        assert!(values.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(values.iter().collect::<HashSet<_>>().len(), values.len());
    }
}
