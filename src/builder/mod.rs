//! 构建模块：规则累积与最终 ACL 生成
pub mod acl_builder;
pub mod finalizer;

// 导出核心接口
pub use self::acl_builder::AclBuilder;
pub use self::finalizer::AclFinalizer;
