//! 规则模块：规则数据模型与规则目录
pub mod catalog;
pub mod model;

// 导出核心接口
pub use self::catalog::{
    ExcludedRules, HeaderCondition, ManagedRuleGroup, ManagedRuleSelection, RateKey,
    RuleCategory, ThrottleAction,
};
pub use self::model::{
    AclDescription, ContentType, CustomResponseBody, PrioritizedRule, Rule, RuleAction,
    RuleVerdict, Statement, VisibilityConfig,
};
