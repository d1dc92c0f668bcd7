//! Web ACL 构建器
//! 链式累积规则：计数队列与阻断队列各自保持声明顺序，另维护自定义响应体表与待创建的 IP 集合。
//! 所有方法都只做追加，优先级与外部资源在 `build` 时才确定。

use std::collections::BTreeMap;

use tracing::warn;

use crate::config::AclConfig;
use crate::resource::IpSetSpec;
use crate::rule::catalog::{self, IP_BLOCKLIST_LOGICAL_ID};
use crate::rule::{
    CustomResponseBody, ExcludedRules, HeaderCondition, ManagedRuleSelection, RateKey, Rule,
    RuleCategory, ThrottleAction,
};

const PENDING_IP_SET_PREFIX: &str = "pending:ip-set:";

/// 已登记、尚未创建的 IP 集合
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PendingIpSet {
    /// 规则语句中使用的占位引用
    pub(crate) token: String,
    pub(crate) spec: IpSetSpec,
}

/// Web ACL 构建器（按值传递，每一步返回自身）
#[derive(Debug, Clone)]
pub struct AclBuilder {
    pub(crate) config: AclConfig,
    pub(crate) count_rules: Vec<Rule>,
    pub(crate) block_rules: Vec<Rule>,
    pub(crate) custom_response_bodies: BTreeMap<String, CustomResponseBody>,
    pub(crate) pending_ip_sets: Vec<PendingIpSet>,
}

impl Default for AclBuilder {
    fn default() -> Self {
        Self::new(AclConfig::default())
    }
}

impl AclBuilder {
    pub fn new(config: AclConfig) -> Self {
        Self {
            config,
            count_rules: Vec::new(),
            block_rules: Vec::new(),
            custom_response_bodies: BTreeMap::new(),
            pending_ip_sets: Vec::new(),
        }
    }

    /// 默认配置 + 指定 ACL 名称
    pub fn named(name: impl Into<String>) -> Self {
        Self::new(AclConfig::named(name))
    }

    pub fn config(&self) -> &AclConfig {
        &self.config
    }

    pub fn count_rules(&self) -> &[Rule] {
        &self.count_rules
    }

    pub fn block_rules(&self) -> &[Rule] {
        &self.block_rules
    }

    pub fn rule_count(&self) -> usize {
        self.count_rules.len() + self.block_rules.len()
    }

    pub fn custom_response_bodies(&self) -> &BTreeMap<String, CustomResponseBody> {
        &self.custom_response_bodies
    }

    fn push_rule(&mut self, category: RuleCategory, rule: Rule) {
        match category {
            RuleCategory::Count => self.count_rules.push(rule),
            RuleCategory::Block => self.block_rules.push(rule),
        }
    }

    /// 托管规则组（按规范顺序追加到阻断队列）
    pub fn with_managed_rules(
        mut self,
        selection: ManagedRuleSelection,
        excluded: &ExcludedRules,
    ) -> Self {
        for group in selection.groups() {
            let extra = excluded.get(&group).map(Vec::as_slice).unwrap_or_default();
            self.push_rule(RuleCategory::Block, catalog::managed_rule_group(group, extra));
        }
        self
    }

    /// 全部四个托管规则组，无额外排除
    pub fn with_all_managed_rules(self) -> Self {
        self.with_managed_rules(ManagedRuleSelection::All, &ExcludedRules::new())
    }

    /// IP 黑名单：登记待创建的 IP 集合，规则先引用占位符
    pub fn with_ip_restriction_rule<I, S>(mut self, addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let token = format!("{}{}", PENDING_IP_SET_PREFIX, self.pending_ip_sets.len());
        self.pending_ip_sets.push(PendingIpSet {
            token: token.clone(),
            spec: IpSetSpec {
                logical_id: IP_BLOCKLIST_LOGICAL_ID.to_string(),
                scope: self.config.scope,
                ip_address_version: self.config.ip_address_version,
                addresses: addresses.into_iter().map(Into::into).collect(),
            },
        });
        self.push_rule(RuleCategory::Block, catalog::ip_blocklist_rule(token));
        self
    }

    /// 通用限流规则，队列由 `action` 显式决定
    pub fn with_throttle_rule(
        mut self,
        name: impl Into<String>,
        limit: u64,
        header: HeaderCondition,
        key: RateKey,
        action: ThrottleAction,
    ) -> Self {
        let category = action.category();
        let rule = catalog::throttle_rule(name, limit, header, key, action, &self.config.user_header);
        self.push_rule(category, rule);
        self
    }

    /// 注册自定义响应体，key 已存在时覆盖并告警
    pub fn with_custom_response_body(
        mut self,
        key: impl Into<String>,
        body: CustomResponseBody,
    ) -> Self {
        let key = key.into();
        if self.custom_response_bodies.contains_key(&key) {
            warn!(
                method = "acl_builder.with_custom_response_body",
                acl = %self.config.name,
                key = %key,
                "自定义响应体已存在，将被覆盖"
            );
        }
        self.custom_response_bodies.insert(key, body);
        self
    }

    pub fn with_throttle_digitraffic_user_ip(self, limit: Option<u64>) -> Self {
        self.blocking_throttle(
            "with_throttle_digitraffic_user_ip",
            limit,
            "ThrottleRuleWithDigitrafficUser",
            "IP_THROTTLE_DIGITRAFFIC_USER",
            HeaderCondition::Required,
            RateKey::Ip,
        )
    }

    pub fn with_throttle_digitraffic_user_ip_and_uri_path(self, limit: Option<u64>) -> Self {
        self.blocking_throttle(
            "with_throttle_digitraffic_user_ip_and_uri_path",
            limit,
            "ThrottleRuleIPQueryWithDigitrafficUser",
            "IP_PATH_THROTTLE_DIGITRAFFIC_USER",
            HeaderCondition::Required,
            RateKey::IpAndUriPath,
        )
    }

    pub fn with_throttle_anonymous_user_ip(self, limit: Option<u64>) -> Self {
        self.blocking_throttle(
            "with_throttle_anonymous_user_ip",
            limit,
            "ThrottleRuleWithAnonymousUser",
            "IP_THROTTLE_ANONYMOUS_USER",
            HeaderCondition::Absent,
            RateKey::Ip,
        )
    }

    pub fn with_throttle_anonymous_user_ip_and_uri_path(self, limit: Option<u64>) -> Self {
        self.blocking_throttle(
            "with_throttle_anonymous_user_ip_and_uri_path",
            limit,
            "ThrottleRuleIPQueryWithAnonymousUser",
            "IP_PATH_THROTTLE_ANONYMOUS_USER",
            HeaderCondition::Absent,
            RateKey::IpAndUriPath,
        )
    }

    pub fn with_count_digitraffic_user_ip(self, limit: Option<u64>) -> Self {
        self.counting_throttle(
            "with_count_digitraffic_user_ip",
            limit,
            "CountRuleWithDigitrafficUser",
            HeaderCondition::Required,
            RateKey::Ip,
        )
    }

    pub fn with_count_digitraffic_user_ip_and_uri_path(self, limit: Option<u64>) -> Self {
        self.counting_throttle(
            "with_count_digitraffic_user_ip_and_uri_path",
            limit,
            "CountRuleIPQueryWithDigitrafficUser",
            HeaderCondition::Required,
            RateKey::IpAndUriPath,
        )
    }

    pub fn with_count_anonymous_user_ip(self, limit: Option<u64>) -> Self {
        self.counting_throttle(
            "with_count_anonymous_user_ip",
            limit,
            "CountRuleWithAnonymousUser",
            HeaderCondition::Absent,
            RateKey::Ip,
        )
    }

    pub fn with_count_anonymous_user_ip_and_uri_path(self, limit: Option<u64>) -> Self {
        self.counting_throttle(
            "with_count_anonymous_user_ip_and_uri_path",
            limit,
            "CountRuleIPQueryWithAnonymousUser",
            HeaderCondition::Absent,
            RateKey::IpAndUriPath,
        )
    }

    // 阻断型限流：响应体 key 由限额派生，相同限额共用一份响应体
    fn blocking_throttle(
        mut self,
        method: &'static str,
        limit: Option<u64>,
        name: &str,
        body_key_prefix: &str,
        header: HeaderCondition,
        key: RateKey,
    ) -> Self {
        let Some(limit) = limit else {
            self.log_missing_limit(method);
            return self;
        };
        let body_key = format!("{}_{}", body_key_prefix, limit);
        if !self.custom_response_bodies.contains_key(&body_key) {
            self.custom_response_bodies.insert(
                body_key.clone(),
                CustomResponseBody::text(catalog::throttle_response_content(limit)),
            );
        }
        self.with_throttle_rule(name, limit, header, key, ThrottleAction::block(body_key))
    }

    // 计数型限流：规则名带限额，便于并存多档观测
    fn counting_throttle(
        self,
        method: &'static str,
        limit: Option<u64>,
        name_prefix: &str,
        header: HeaderCondition,
        key: RateKey,
    ) -> Self {
        let Some(limit) = limit else {
            self.log_missing_limit(method);
            return self;
        };
        self.with_throttle_rule(
            format!("{}{}", name_prefix, limit),
            limit,
            header,
            key,
            ThrottleAction::Count,
        )
    }

    fn log_missing_limit(&self, method: &'static str) {
        warn!(
            method = %format!("acl_builder.{}", method),
            acl = %self.config.name,
            "未设置 limit，跳过该限流规则"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::{ManagedRuleGroup, RuleAction, RuleVerdict, Statement};

    // 告警路径输出到测试日志
    fn init_logging() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    }

    #[test]
    fn test_all_managed_rules_yields_four() {
        let builder = AclBuilder::default().with_all_managed_rules();
        assert_eq!(builder.block_rules().len(), 4);
        assert!(builder.count_rules().is_empty());
        let names: Vec<_> = builder.block_rules().iter().map(|r| r.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "AWS-AWSManagedRulesCommonRuleSet",
                "AWS-AWSManagedRulesAmazonIpReputationList",
                "AWS-AWSManagedRulesKnownBadInputsRuleSet",
                "AWS-AWSManagedRulesSQLiRuleSet",
            ]
        );
    }

    #[test]
    fn test_explicit_selection_yields_two() {
        let mut excluded = ExcludedRules::new();
        excluded.insert(ManagedRuleGroup::KnownBadInputsRuleSet, vec!["Log4JRCE".to_string()]);
        let builder = AclBuilder::default().with_managed_rules(
            vec![ManagedRuleGroup::KnownBadInputsRuleSet, ManagedRuleGroup::CommonRuleSet].into(),
            &excluded,
        );
        assert_eq!(builder.rule_count(), 2);
        let Statement::ManagedRuleGroup(group) = &builder.block_rules()[1].statement else {
            panic!("expected managed rule group")
        };
        assert_eq!(group.name, "AWSManagedRulesKnownBadInputsRuleSet");
        assert_eq!(group.excluded_rules.len(), 1);
    }

    #[test]
    fn test_ip_restriction_records_pending_ip_set() {
        let builder = AclBuilder::default().with_ip_restriction_rule(["1.2.3.4", "1.2.6.6"]);
        assert_eq!(builder.rule_count(), 1);
        let rule = &builder.block_rules()[0];
        assert_eq!(rule.name, "IpBlocklist");
        assert_eq!(rule.verdict, RuleVerdict::Action(RuleAction::Block { custom_response: None }));
        assert!(!rule.visibility_config.sampled_requests_enabled);

        let Statement::IpSetReference(reference) = &rule.statement else {
            panic!("expected IP set reference")
        };
        assert_eq!(builder.pending_ip_sets.len(), 1);
        assert_eq!(reference.arn, builder.pending_ip_sets[0].token);
        assert_eq!(builder.pending_ip_sets[0].spec.addresses, vec!["1.2.3.4", "1.2.6.6"]);
    }

    #[test]
    fn test_throttle_action_selects_queue() {
        let builder = AclBuilder::default()
            .with_throttle_rule("Counter", 100, HeaderCondition::Required, RateKey::Ip, ThrottleAction::Count)
            .with_throttle_rule(
                "Blocker",
                100,
                HeaderCondition::Absent,
                RateKey::Ip,
                ThrottleAction::block("BODY"),
            );
        assert_eq!(builder.count_rules()[0].name, "Counter");
        assert_eq!(builder.block_rules()[0].name, "Blocker");
    }

    #[test]
    fn test_missing_limit_is_noop() {
        init_logging();
        let builder = AclBuilder::default()
            .with_throttle_digitraffic_user_ip(None)
            .with_throttle_digitraffic_user_ip_and_uri_path(None)
            .with_throttle_anonymous_user_ip(None)
            .with_throttle_anonymous_user_ip_and_uri_path(None)
            .with_count_digitraffic_user_ip(None)
            .with_count_digitraffic_user_ip_and_uri_path(None)
            .with_count_anonymous_user_ip(None)
            .with_count_anonymous_user_ip_and_uri_path(None);
        assert_eq!(builder.rule_count(), 0);
        assert!(builder.custom_response_bodies().is_empty());
    }

    #[test]
    fn test_blocking_throttles_share_body_per_limit() {
        let builder = AclBuilder::default()
            .with_throttle_digitraffic_user_ip(Some(500))
            .with_throttle_anonymous_user_ip(Some(100))
            .with_throttle_anonymous_user_ip_and_uri_path(Some(100));
        assert_eq!(builder.block_rules().len(), 3);
        let keys: Vec<_> = builder.custom_response_bodies().keys().cloned().collect();
        assert_eq!(
            keys,
            vec![
                "IP_PATH_THROTTLE_ANONYMOUS_USER_100",
                "IP_THROTTLE_ANONYMOUS_USER_100",
                "IP_THROTTLE_DIGITRAFFIC_USER_500",
            ]
        );
        assert_eq!(
            builder.block_rules()[0].custom_response_key(),
            Some("IP_THROTTLE_DIGITRAFFIC_USER_500")
        );
    }

    #[test]
    fn test_existing_throttle_body_is_kept() {
        let custom = CustomResponseBody::text("slow down");
        let builder = AclBuilder::default()
            .with_custom_response_body("IP_THROTTLE_ANONYMOUS_USER_100", custom.clone())
            .with_throttle_anonymous_user_ip(Some(100));
        assert_eq!(builder.custom_response_bodies()["IP_THROTTLE_ANONYMOUS_USER_100"], custom);
    }

    #[test]
    fn test_count_rules_carry_limit_in_name() {
        let builder = AclBuilder::default()
            .with_count_anonymous_user_ip(Some(50))
            .with_count_digitraffic_user_ip_and_uri_path(Some(75));
        let names: Vec<_> = builder.count_rules().iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["CountRuleWithAnonymousUser50", "CountRuleIPQueryWithDigitrafficUser75"]);
        assert!(builder.block_rules().is_empty());
        assert!(builder.custom_response_bodies().is_empty());
    }

    #[test]
    fn test_custom_response_body_overwrite() {
        init_logging();
        let builder = AclBuilder::default()
            .with_custom_response_body("KEY", CustomResponseBody::text("first"))
            .with_custom_response_body("KEY", CustomResponseBody::text("second"));
        assert_eq!(builder.custom_response_bodies().len(), 1);
        assert_eq!(builder.custom_response_bodies()["KEY"].content, "second");
    }

    #[test]
    fn test_configured_user_header_is_used() {
        let builder = AclBuilder::new(AclConfig::custom().user_header("x-client").build())
            .with_throttle_digitraffic_user_ip(Some(100));
        let json = serde_json::to_value(&builder.block_rules()[0].statement).unwrap();
        assert_eq!(
            json["rateBasedStatement"]["scopeDownStatement"]["sizeConstraintStatement"]["fieldToMatch"]
                ["singleHeader"]["Name"],
            "x-client"
        );
    }
}
