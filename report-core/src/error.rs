use crate::launch::ItemId;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Occurs when `report.toml` fails to load.
    #[error("failed to load report.toml: {0}")]
    LoadError(String),
    /// Occurs when the specified key is not found in `report.toml`.
    #[error("the specified key \"{0}\" not found in report.toml")]
    ValueNotFound(String),
    /// No report item is registered under the symbolic key.
    #[error("no report item registered under \"{0}\"")]
    ItemNotFound(String),
    /// The launch does not know the item id.
    #[error("unknown report item {0}")]
    UnknownItem(ItemId),
    #[error("report item {0} has already been finished")]
    AlreadyFinished(ItemId),
    /// `step` or `log` was called while no test or step was executing on this thread.
    #[error("no report item is executing on the current thread")]
    NoActiveItem,
    #[error("no reporting session is active; call report::start first")]
    NoSession,
    #[error("a reporting session is already installed")]
    SessionActive,
    #[error("failed to render title \"{template}\": {reason}")]
    Title { template: String, reason: String },
    /// The async scheduler could not be obtained or created.
    #[error("async scheduler unavailable: {0}")]
    Scheduler(String),
    #[error("launch error: {0}")]
    Launch(String),
}
