//! 通用工具
pub mod name_validator;

pub use self::name_validator::NameValidator;
