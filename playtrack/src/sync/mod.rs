pub mod engine;
pub mod entry;
pub mod fetcher;
pub mod reconciler;
pub mod retry;
pub mod session;
pub mod stats;
pub mod validator;
