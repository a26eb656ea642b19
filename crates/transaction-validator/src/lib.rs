//! Transaction Validation
//!
//! Provides the payment transaction data model and the input schema checks
//! that run before any feature is derived.

mod error;
mod transaction;
mod validator;

pub use error::ValidationError;
pub use transaction::{GeoPoint, PaymentChannel, SenderHistory, Transaction, TransactionRecord};
pub use validator::{ValidationConfig, Validator};
