//! 服务端校验与评分
//!
//! 不消耗 token 的本地检查：金额加总、15% 增值税、场所档案一致性、消费区间。

use serde_json::{Map, Value, json};

use crate::config::config::ValidationConfig;
use crate::models::analysis::ValidationReport;
use crate::models::receipt::ExtractedData;
use crate::services::qr::ZatcaInvoice;
use crate::services::venue_matcher::{VenueMatch, keyword_score};

const BASE_CONFIDENCE: i32 = 30;
const SUM_CONFIDENCE: i32 = 30;
const VAT_CONFIDENCE: i32 = 20;
const VENUE_CONFIDENCE: i32 = 20;
const SUM_FRAUD: i32 = 30;
const VAT_FRAUD: i32 = 20;
const MERCHANT_MISMATCH_FRAUD: i32 = 15;
const ADDRESS_MISMATCH_FRAUD: i32 = 10;
const SPENDING_RANGE_FRAUD: i32 = 10;

/// 校验器
#[derive(Debug, Clone, Default)]
pub struct Validator {
    config: ValidationConfig,
}

impl Validator {
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    /// 对抽取结果做本地检查并给出评分
    pub fn validate(
        &self,
        data: &ExtractedData,
        venue: Option<&VenueMatch>,
        qr: Option<&ZatcaInvoice>,
    ) -> ValidationReport {
        let cfg = &self.config;
        let mut checks = Map::new();
        let mut issues = Vec::new();
        let mut fraud = 0;
        let mut confidence = BASE_CONFIDENCE;

        let sum_ok = match (data.subtotal, data.tax, data.total) {
            (Some(subtotal), Some(tax), Some(total)) => {
                let ok = ((subtotal + tax) - total).abs() <= cfg.sum_tolerance;
                checks.insert("subtotal_plus_tax_equals_total".into(), json!(ok));
                if !ok {
                    issues.push(format!("Subtotal + Tax != Total (±{})", cfg.sum_tolerance));
                }
                ok
            }
            _ => false,
        };

        let vat_ok = match (data.subtotal, data.tax) {
            (Some(subtotal), Some(tax)) => {
                let tolerance = cfg.vat_abs_tolerance.max(cfg.vat_rel_tolerance * subtotal);
                let ok = (tax - subtotal * cfg.vat_rate).abs() <= tolerance;
                checks.insert("vat_rate_ok".into(), json!(ok));
                if !ok {
                    issues.push(format!(
                        "VAT not ~{}% of Subtotal",
                        (cfg.vat_rate * 100.0).round()
                    ));
                }
                ok
            }
            _ => false,
        };

        // 未能计算的检查同样计入欺诈分
        if sum_ok {
            confidence += SUM_CONFIDENCE;
        } else {
            fraud += SUM_FRAUD;
        }
        if vat_ok {
            confidence += VAT_CONFIDENCE;
        } else {
            fraud += VAT_FRAUD;
        }

        match venue {
            Some(found) => {
                confidence += VENUE_CONFIDENCE;
                let profile = &found.profile;

                // 缺失的商户名按 0 分计
                let merchant_score = data
                    .merchant_name
                    .as_deref()
                    .map_or(0.0, |name| keyword_score(&profile.merchant_keywords(), name));
                if merchant_score < cfg.merchant_match_threshold {
                    fraud += MERCHANT_MISMATCH_FRAUD;
                    issues.push("Merchant name mismatch".into());
                }

                let address_keywords = profile.address_keywords();
                let address_score = match data.merchant_address.as_deref() {
                    Some(addr) if !address_keywords.is_empty() => {
                        Some(keyword_score(&address_keywords, addr))
                    }
                    _ => None,
                };
                if let Some(score) = address_score {
                    if score < cfg.address_match_threshold {
                        fraud += ADDRESS_MISMATCH_FRAUD;
                        issues.push("Address mismatch".into());
                    }
                }

                checks.insert(
                    "venue_match".into(),
                    json!({
                        "matched": true,
                        "profile": profile.display_name(),
                        "score": round1(found.score),
                        "merchant_score": round1(merchant_score),
                        "address_score": address_score.map(round1),
                    }),
                );

                if let (Some((min, max)), Some(total)) = (profile.spending_bounds(), data.total) {
                    let ok = total >= min && total <= max;
                    checks.insert("spending_range_ok".into(), json!(ok));
                    if !ok {
                        fraud += SPENDING_RANGE_FRAUD;
                        issues.push("Total outside venue spending range".into());
                    }
                }
            }
            None => {
                checks.insert("venue_match".into(), json!({ "matched": false }));
            }
        }

        if let Some((qr_total, total)) = qr.and_then(|q| q.total).zip(data.total) {
            checks.insert(
                "qr_total_matches".into(),
                json!((qr_total - total).abs() <= cfg.sum_tolerance),
            );
        }

        ValidationReport {
            fraud_score: clamp_score(fraud),
            confidence_score: clamp_score(confidence),
            checks,
            issues,
        }
    }
}

/// 快速分析：模型自带评分时保留（规整到 0-100），缺失时用本地评分补齐
pub fn merge_model_scores(extra: &mut Map<String, Value>, report: &ValidationReport) {
    let fraud = extra
        .get("fraudScore")
        .and_then(score_from_value)
        .unwrap_or(report.fraud_score);
    let confident = extra
        .get("confidentScore")
        .and_then(score_from_value)
        .unwrap_or(report.confidence_score);
    extra.insert("fraudScore".into(), json!(fraud));
    extra.insert("confidentScore".into(), json!(confident));

    let has_reason = extra
        .get("reason")
        .and_then(Value::as_str)
        .is_some_and(|r| !r.trim().is_empty());
    if !has_reason {
        let reason = if report.issues.is_empty() {
            "Checks passed.".to_string()
        } else {
            report.issues.join("; ")
        };
        extra.insert("reason".into(), json!(reason));
    }
}

fn score_from_value(value: &Value) -> Option<u8> {
    let raw = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    Some(raw.round().clamp(0.0, 100.0) as u8)
}

fn clamp_score(score: i32) -> u8 {
    score.clamp(0, 100) as u8
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}
