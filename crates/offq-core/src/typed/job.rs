//! TypedJob trait - 型付き payload の定義
//!
//! # 学習ポイント
//! - Associated Constants (`const TYPE`)
//! - Trait bounds の組み合わせ (Serialize + DeserializeOwned + Send + Sync + 'static)

use serde::Serialize;
use serde::de::DeserializeOwned;

/// TypedJob は job_type と payload の型を対応付ける
///
/// # 使用例
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// struct SyncContacts {
///     since: Option<String>,
/// }
///
/// impl TypedJob for SyncContacts {
///     const TYPE: &'static str = "sync_contacts";
/// }
/// ```
///
/// The payload must serialize to a JSON object.
pub trait TypedJob: Serialize + DeserializeOwned + Send + Sync + 'static {
    const TYPE: &'static str;
}
