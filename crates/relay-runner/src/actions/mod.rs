//! Built-in step actions.

pub mod cache;
pub mod checkout;
pub mod command;
pub mod publish;
pub mod release;
pub mod toolchain;

pub use cache::{CacheRestoreAction, CacheSaveAction};
pub use checkout::CheckoutAction;
pub use command::{LintAction, TestAction};
pub use publish::PublishAction;
pub use release::ReleaseAction;
pub use toolchain::ToolchainAction;
