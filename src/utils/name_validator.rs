//! 名称校验工具
//! WAF 对规则名、指标名、ACL 名有字符集与长度限制；build 阶段只做告警，不阻断

use once_cell::sync::Lazy;
use regex::Regex;

// WAF 名称只接受 ASCII，关闭 Unicode 以免重复量词撑爆编译体积
static RULE_NAME_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?-u)^[\w-]{1,128}$").unwrap());
static METRIC_NAME_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?-u)^[\w#:.\-/]{1,255}$").unwrap());

/// 名称校验工具
pub struct NameValidator;

impl NameValidator {
    /// 规则名 / ACL 名：字母数字、下划线、连字符，1~128 个字符
    pub fn is_valid_rule_name(name: &str) -> bool {
        RULE_NAME_REGEX.is_match(name)
    }

    /// 指标名：额外允许 `# : . /`，1~255 个字符
    pub fn is_valid_metric_name(name: &str) -> bool {
        METRIC_NAME_REGEX.is_match(name)
    }
}
