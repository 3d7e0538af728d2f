//! Reconcilers turn one inbound event into a store transition and an
//! [`EventResult`](crate::result::EventResult).
//!
//! None of them lock: concurrent events for the same key are absorbed by the
//! "already exists" and "already closed" checks together with the per-key
//! atomic upsert of the call store. No error ever leaves a reconciler.

pub mod dialog;
pub mod external;
pub mod registration;

pub use dialog::DialogReconciler;
pub use external::ExternalDialogReconciler;
pub use registration::RegistrationReconciler;
