//! Typed - 型付き Worker API
//!
//! ワーカークラス名と引数の型を trait で対応付け、enqueue と実行の両側で
//! class の typo や引数の取り違えを型で排除します。
//!
//! # 二層構造
//! - **表層（Typed）**: `Worker` trait - 型安全
//! - **内部（Dyn）**: `DynWorker` trait - object-safe, type erasure
//!
//! payload の `args` は位置引数の JSON 配列なので、`codec` がその変換を受け持ちます。

pub mod codec;
pub mod context;
pub mod handler;
pub mod registry;
pub mod worker;

pub use self::codec::{decode_args, encode_args};
pub use self::context::JobContext;
pub use self::handler::{DynWorker, TypedWorker};
pub use self::registry::{RegisteredWorker, RegistryError, WorkerRegistry};
pub use self::worker::Worker;
