//! wafacl - 声明式 WAF Web ACL 规则组装器
//!
//! 由高层意图（托管规则组、IP 黑名单、按 IP/路径限流）生成优先级连续、名称唯一的规则集，
//! 以及阻断规则引用的自定义响应体。
//!
//! ```no_run
//! use wafacl::{AclBuilder, TemplateIpSets};
//!
//! let mut ip_sets = TemplateIpSets::new();
//! let acl = AclBuilder::named("ApiAcl")
//!     .with_all_managed_rules()
//!     .with_ip_restriction_rule(["192.0.2.0/24"])
//!     .with_throttle_anonymous_user_ip(Some(100))
//!     .with_count_digitraffic_user_ip(Some(1000))
//!     .build(&mut ip_sets)?;
//! assert_eq!(acl.rules[0].priority, 0);
//! # Ok::<(), wafacl::AclError>(())
//! ```

// 导出全局错误类型
pub use self::error::{AclError, AclResult};

// 导出配置模块
pub use self::config::{AclConfig, AclConfigBuilder, AclScope, IpAddressVersion};

// 导出规则模块核心接口
pub use self::rule::{
    AclDescription, ContentType, CustomResponseBody, ExcludedRules, HeaderCondition,
    ManagedRuleGroup, ManagedRuleSelection, PrioritizedRule, RateKey, Rule, RuleAction,
    RuleCategory, RuleVerdict, Statement, ThrottleAction, VisibilityConfig,
};

// 导出构建模块核心接口
pub use self::builder::{AclBuilder, AclFinalizer};

// 导出外部资源接口
pub use self::resource::{AclTemplate, IpSetProvisioner, IpSetSpec, TemplateIpSets};

pub use self::intent::AclIntents;

// 声明所有子模块
pub mod builder;
pub mod config;
pub mod error;
pub mod intent;
pub mod resource;
pub mod rule;
pub mod utils;
