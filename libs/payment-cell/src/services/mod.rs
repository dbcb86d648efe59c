pub mod retry;
pub mod signature;
pub mod webhook;

pub use retry::RetryPolicy;
pub use signature::{compute_signature, verify_signature, SIGNATURE_TOLERANCE_SECONDS};
pub use webhook::PaymentService;
