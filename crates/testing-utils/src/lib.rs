//! # Courier Testing Utils
//!
//! 工作区共享的测试工具：内存版仓库实现和测试数据构造器，
//! 供各 crate 的单元测试在不依赖数据库的情况下使用。
//!
//! ```toml
//! [dev-dependencies]
//! courier-testing-utils = { path = "../testing-utils" }
//! ```

pub mod builders;
pub mod mocks;

pub use builders::*;
pub use mocks::*;
