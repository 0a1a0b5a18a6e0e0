//! モデル定義
//!
//! ライフサイクル管理で使用されるデータモデルを定義します。
//! 各モデルは機能ごとにモジュールに分離されています。

mod identity;
mod port;
mod service;
mod status;

// Re-exports
pub use identity::*;
pub use port::*;
pub use service::*;
pub use status::*;
