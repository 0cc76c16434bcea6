//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **MemoryKvStore**: 開発用・テスト用のストレージ
//! - **FileKvStore**: ファイルベースの永続ストレージ
//! - **WatchConnectivity**: 手動で状態を流す ConnectivitySource

pub mod file_kv;
pub mod memory_kv;
pub mod watch_connectivity;

pub use self::file_kv::FileKvStore;
pub use self::memory_kv::MemoryKvStore;
pub use self::watch_connectivity::WatchConnectivity;
