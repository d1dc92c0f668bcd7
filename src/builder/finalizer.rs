//! ACL 终结器
//! 分配优先级 → 校验 → 物化 IP 集合 → 输出 AclDescription，全部成功或全部失败

use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::{debug, warn};

use super::acl_builder::{AclBuilder, PendingIpSet};
use crate::error::{AclError, AclResult};
use crate::resource::{IpSetProvisioner, IpSetSpec};
use crate::rule::model::{DefaultAction, IpSetReferenceStatement, Statement};
use crate::rule::{AclDescription, CustomResponseBody, PrioritizedRule, Rule};
use crate::utils::NameValidator;

/// ACL 终结器
pub struct AclFinalizer;

impl AclFinalizer {
    /// 消费构建器，生成最终 ACL
    pub fn finalize(
        builder: AclBuilder,
        provisioner: &mut dyn IpSetProvisioner,
    ) -> AclResult<AclDescription> {
        let AclBuilder {
            config,
            count_rules,
            block_rules,
            custom_response_bodies,
            pending_ip_sets,
        } = builder;
        let count_len = count_rules.len();

        // 1. 计数规则在前、阻断规则在后，优先级即下标
        let mut rules = Self::assign_priorities(count_rules, block_rules);

        // 2. 校验（任何外部资源创建之前）
        if rules.is_empty() {
            return Err(AclError::EmptyRuleSet { acl: config.name });
        }
        Self::check_unique_names(&config.name, &rules)?;
        Self::warn_invalid_name(&config.name, "acl", &config.name, NameValidator::is_valid_rule_name);
        Self::warn_invalid_name(
            &config.name,
            "metric",
            &config.visibility.metric_name,
            NameValidator::is_valid_metric_name,
        );
        for prioritized in &rules {
            Self::warn_invalid_name(
                &config.name,
                "rule",
                &prioritized.rule.name,
                NameValidator::is_valid_rule_name,
            );
            Self::warn_invalid_name(
                &config.name,
                "metric",
                &prioritized.rule.visibility_config.metric_name,
                NameValidator::is_valid_metric_name,
            );
            Self::check_rule(&prioritized.rule, &custom_response_bodies)?;
        }

        // 3. 按最终优先级顺序物化 IP 集合
        Self::materialize_ip_sets(&mut rules, pending_ip_sets, provisioner)?;

        debug!(
            acl = %config.name,
            count_rules = count_len,
            block_rules = rules.len() - count_len,
            response_bodies = custom_response_bodies.len(),
            "Web ACL 构建完成"
        );

        Ok(AclDescription {
            name: config.name,
            scope: config.scope,
            default_action: DefaultAction::Allow {},
            visibility_config: config.visibility,
            rules,
            custom_response_bodies,
        })
    }

    /// 拼接两个队列并分配连续优先级 [0, N)
    pub fn assign_priorities(count_rules: Vec<Rule>, block_rules: Vec<Rule>) -> Vec<PrioritizedRule> {
        count_rules
            .into_iter()
            .chain(block_rules)
            .zip(0u32..)
            .map(|(rule, priority)| PrioritizedRule { priority, rule })
            .collect()
    }

    /// 规则名必须两两不同，任何重复都是硬错误
    fn check_unique_names(acl: &str, rules: &[PrioritizedRule]) -> AclResult<()> {
        let mut seen = HashSet::with_capacity(rules.len());
        let mut duplicates: Vec<String> = Vec::new();
        for prioritized in rules {
            let name = prioritized.rule.name.as_str();
            if !seen.insert(name) && !duplicates.iter().any(|d| d == name) {
                duplicates.push(name.to_string());
            }
        }

        if duplicates.is_empty() {
            Ok(())
        } else {
            Err(AclError::DuplicateRuleName {
                acl: acl.to_string(),
                names: duplicates,
            })
        }
    }

    // 名称不合 WAF 字符约束只告警，交由部署端最终裁决
    fn warn_invalid_name(acl: &str, kind: &'static str, value: &str, is_valid: fn(&str) -> bool) {
        if !is_valid(value) {
            warn!(
                method = "acl_finalizer.finalize",
                acl = %acl,
                kind,
                value = %value,
                "名称不符合 WAF 字符约束，部署时可能被拒绝"
            );
        }
    }

    fn check_rule(
        rule: &Rule,
        bodies: &BTreeMap<String, CustomResponseBody>,
    ) -> AclResult<()> {
        if let Statement::RateBased(rate) = &rule.statement {
            if rate.limit == 0 {
                return Err(AclError::InvalidRateLimit {
                    rule: rule.name.clone(),
                    limit: rate.limit,
                });
            }
        }

        match rule.custom_response_key() {
            Some(key) if !bodies.contains_key(key) => Err(AclError::MissingResponseBody {
                rule: rule.name.clone(),
                key: key.to_string(),
            }),
            _ => Ok(()),
        }
    }

    /// 用 provisioner 返回的标识替换占位引用
    fn materialize_ip_sets(
        rules: &mut [PrioritizedRule],
        pending_ip_sets: Vec<PendingIpSet>,
        provisioner: &mut dyn IpSetProvisioner,
    ) -> AclResult<()> {
        let mut pending: HashMap<String, IpSetSpec> = pending_ip_sets
            .into_iter()
            .map(|p| (p.token, p.spec))
            .collect();

        for prioritized in rules.iter_mut() {
            prioritized
                .rule
                .statement
                .visit_ip_set_refs_mut(&mut |reference: &mut IpSetReferenceStatement| -> AclResult<()> {
                    let spec = pending
                        .remove(&reference.arn)
                        .ok_or_else(|| AclError::UnresolvedIpSet(reference.arn.clone()))?;
                    reference.arn = provisioner.create_ip_set(&spec)?;
                    Ok(())
                })?;
        }

        if let Some(token) = pending.keys().next() {
            return Err(AclError::UnresolvedIpSet(token.clone()));
        }
        Ok(())
    }
}

impl AclBuilder {
    /// 生成最终 ACL（消费构建器，只能调用一次）
    pub fn build(self, provisioner: &mut dyn IpSetProvisioner) -> AclResult<AclDescription> {
        AclFinalizer::finalize(self, provisioner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AclConfig;
    use crate::resource::TemplateIpSets;
    use crate::rule::{HeaderCondition, ManagedRuleGroup, RateKey, ThrottleAction};

    /// 记录调用顺序的 provisioner
    #[derive(Default)]
    struct RecordingProvisioner {
        created: Vec<IpSetSpec>,
    }

    impl IpSetProvisioner for RecordingProvisioner {
        fn create_ip_set(&mut self, spec: &IpSetSpec) -> AclResult<String> {
            self.created.push(spec.clone());
            Ok(format!("arn:aws:wafv2:ipset/{}", self.created.len()))
        }
    }

    fn build(builder: AclBuilder) -> AclResult<AclDescription> {
        builder.build(&mut TemplateIpSets::new())
    }

    #[test]
    fn test_empty_rule_set_fails() {
        let err = build(AclBuilder::named("Empty")).unwrap_err();
        assert!(matches!(err, AclError::EmptyRuleSet { ref acl } if acl == "Empty"));
        assert!(err.is_configuration_error());
    }

    #[test]
    fn test_empty_rule_set_with_only_bodies_fails() {
        let builder = AclBuilder::default().with_custom_response_body("K", CustomResponseBody::text("x"));
        assert!(matches!(build(builder), Err(AclError::EmptyRuleSet { .. })));
    }

    #[test]
    fn test_priorities_count_first_then_block() {
        let acl = build(
            AclBuilder::default()
                .with_all_managed_rules()
                .with_throttle_anonymous_user_ip(Some(100))
                .with_count_digitraffic_user_ip(Some(1000))
                .with_ip_restriction_rule(["1.2.3.4/32"])
                .with_count_anonymous_user_ip_and_uri_path(Some(20)),
        )
        .unwrap();

        let priorities: Vec<u32> = acl.rules.iter().map(|r| r.priority).collect();
        assert_eq!(priorities, (0..8).collect::<Vec<u32>>());
        assert_eq!(
            acl.rule_names(),
            vec![
                "CountRuleWithDigitrafficUser1000",
                "CountRuleIPQueryWithAnonymousUser20",
                "AWS-AWSManagedRulesCommonRuleSet",
                "AWS-AWSManagedRulesAmazonIpReputationList",
                "AWS-AWSManagedRulesKnownBadInputsRuleSet",
                "AWS-AWSManagedRulesSQLiRuleSet",
                "ThrottleRuleWithAnonymousUser",
                "IpBlocklist",
            ]
        );
        assert_eq!(acl.default_action, DefaultAction::Allow {});
    }

    #[test]
    fn test_duplicate_ip_blocklist_fails_before_provisioning() {
        let mut provisioner = RecordingProvisioner::default();
        let result = AclBuilder::default()
            .with_ip_restriction_rule(["1.2.3.4"])
            .with_ip_restriction_rule(["5.6.7.8"])
            .build(&mut provisioner);

        match result {
            Err(AclError::DuplicateRuleName { names, .. }) => assert_eq!(names, vec!["IpBlocklist"]),
            other => panic!("unexpected result {:?}", other),
        }
        assert!(provisioner.created.is_empty());
    }

    #[test]
    fn test_duplicate_custom_name_collides_with_managed_group() {
        let builder = AclBuilder::default()
            .with_managed_rules(vec![ManagedRuleGroup::SqliRuleSet].into(), &Default::default())
            .with_throttle_rule(
                "AWS-AWSManagedRulesSQLiRuleSet",
                100,
                HeaderCondition::Absent,
                RateKey::Ip,
                ThrottleAction::Count,
            );
        assert!(matches!(build(builder), Err(AclError::DuplicateRuleName { .. })));
    }

    #[test]
    fn test_ip_set_reference_is_materialized() {
        let mut provisioner = RecordingProvisioner::default();
        let acl = AclBuilder::default()
            .with_ip_restriction_rule(["1.2.3.4", "1.2.6.6"])
            .build(&mut provisioner)
            .unwrap();

        assert_eq!(acl.rules.len(), 1);
        let Statement::IpSetReference(reference) = &acl.rules[0].rule.statement else {
            panic!("expected IP set reference")
        };
        assert_eq!(reference.arn, "arn:aws:wafv2:ipset/1");
        assert_eq!(provisioner.created.len(), 1);
        assert_eq!(provisioner.created[0].logical_id, "BlocklistIpSet");
        assert!(acl.rules[0].rule.is_block());
    }

    #[test]
    fn test_response_keys_round_trip() {
        let acl = build(
            AclBuilder::default()
                .with_throttle_digitraffic_user_ip(Some(5000))
                .with_throttle_digitraffic_user_ip_and_uri_path(Some(500))
                .with_throttle_anonymous_user_ip(Some(100))
                .with_throttle_anonymous_user_ip_and_uri_path(Some(100)),
        )
        .unwrap();

        for prioritized in &acl.rules {
            let key = prioritized.rule.custom_response_key().unwrap();
            assert!(acl.custom_response_bodies.contains_key(key), "missing body {}", key);
        }
        assert_eq!(acl.custom_response_bodies.len(), 4);
    }

    #[test]
    fn test_unregistered_response_key_fails() {
        let builder = AclBuilder::default().with_throttle_rule(
            "Blocker",
            100,
            HeaderCondition::Required,
            RateKey::Ip,
            ThrottleAction::block("NOT_REGISTERED"),
        );
        assert!(matches!(
            build(builder),
            Err(AclError::MissingResponseBody { ref key, .. }) if key == "NOT_REGISTERED"
        ));
    }

    #[test]
    fn test_small_rate_limit_builds() {
        let acl = build(AclBuilder::default().with_count_anonymous_user_ip(Some(1))).unwrap();
        let Statement::RateBased(rate) = &acl.rules[0].rule.statement else {
            panic!("expected rate-based statement")
        };
        assert_eq!(rate.limit, 1);

        let five = AclBuilder::default().with_count_anonymous_user_ip(Some(5));
        assert_eq!(build(five).unwrap().rule_names(), vec!["CountRuleWithAnonymousUser5"]);
    }

    #[test]
    fn test_zero_rate_limit_fails() {
        let zero = AclBuilder::default().with_count_anonymous_user_ip(Some(0));
        let err = build(zero).unwrap_err();
        assert!(matches!(err, AclError::InvalidRateLimit { limit: 0, .. }));
        assert!(err.is_configuration_error());
        assert_eq!(
            err.to_string(),
            "规则 CountRuleWithAnonymousUser0 的速率限制无效：0（必须大于 0）"
        );
    }

    #[test]
    fn test_free_form_names_still_build() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();

        let spaced = AclBuilder::default().with_throttle_rule(
            "My Rule",
            100,
            HeaderCondition::Required,
            RateKey::Ip,
            ThrottleAction::Count,
        );
        assert_eq!(build(spaced).unwrap().rule_names(), vec!["My Rule"]);

        let acl = build(AclBuilder::new(AclConfig::named("web acl")).with_all_managed_rules()).unwrap();
        assert_eq!(acl.name, "web acl");
        assert_eq!(acl.rules.len(), 4);
    }

    #[test]
    fn test_serialized_acl_shape() {
        let acl = build(AclBuilder::default().with_managed_rules(
            vec![ManagedRuleGroup::AmazonIpReputationList].into(),
            &Default::default(),
        ))
        .unwrap();
        let json = serde_json::to_value(&acl).unwrap();
        assert_eq!(json["defaultAction"], serde_json::json!({ "allow": {} }));
        assert_eq!(json["scope"], "CLOUDFRONT");
        assert_eq!(json["visibilityConfig"]["metricName"], "WAF-Blocked");
        assert_eq!(json["rules"][0]["priority"], 0);
        assert_eq!(json["rules"][0]["overrideAction"], serde_json::json!({ "none": {} }));
        assert!(json["rules"][0].get("action").is_none());
    }
}
