//! Remote filesystem support: path canonicalization, attribute translation,
//! shell-token quoting, and the operations built on a session's connection.

pub mod attrs;
pub mod ops;
pub mod path;
pub mod quote;

pub use attrs::permission_string;
pub use ops::RemoteFs;
pub use path::normalize_path;
