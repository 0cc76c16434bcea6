//! Typed - 型付き Job API
//!
//! job_type の typo を型で排除し、Handler との対応付けを静的に保証します。
//!
//! # 二層構造
//! - **表層（Typed）**: `TypedJob` trait, `TypedJobHandler<T>` trait - 型安全
//! - **内部（Dyn）**: `JobHandler` trait - object-safe, type erasure

pub mod handler;
pub mod job;

pub use self::handler::{TypedHandler, TypedJobHandler};
pub use self::job::TypedJob;
