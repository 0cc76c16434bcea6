//! Ports - 抽象化レイヤー
//!
//! 各 trait は外部の協調者（端末ストレージ、ネットワーク状態、時刻、ID 生成）
//! へのインターフェースを提供し、実装の詳細を隠蔽します。

pub mod clock;
pub mod connectivity;
pub mod id_generator;
pub mod kv_store;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::connectivity::{ConnectivitySnapshot, ConnectivitySource};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::kv_store::KeyValueStore;
