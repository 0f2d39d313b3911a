//! 场所档案匹配
//!
//! 探测调用得到的商户名与地址经过阿拉伯文/英文统一规整后，与档案关键字做模糊匹配。
//! 加权分数 = 商户 0.7 + 地址 0.3，达到阈值才算命中；别名精确命中时直接返回。

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use unicode_normalization::UnicodeNormalization;

use crate::error::{AppError, Result};
use crate::models::venue::VenueProfile;

/// 默认命中阈值
pub const DEFAULT_MATCH_THRESHOLD: f64 = 55.0;
const MERCHANT_WEIGHT: f64 = 0.7;
const ADDRESS_WEIGHT: f64 = 0.3;

static NON_WORD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\w\x{0600}-\x{06FF}]+").expect("valid regex"));
static SPACES_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

/// 阿拉伯字母变体折叠
const ARABIC_FOLDS: &[(char, char)] = &[
    ('أ', 'ا'),
    ('إ', 'ا'),
    ('آ', 'ا'),
    ('ة', 'ه'),
    ('ى', 'ي'),
    ('ؤ', 'و'),
    ('ئ', 'ي'),
];

/// 文本规整：NFKC、小写、去标点、阿拉伯字母折叠、合并空白
pub fn normalize_text(s: &str) -> String {
    if s.is_empty() {
        return String::new();
    }
    let s: String = s.nfkc().collect::<String>().to_lowercase();
    let s = NON_WORD_RE.replace_all(&s, " ");
    let s: String = s
        .chars()
        .map(|c| {
            ARABIC_FOLDS
                .iter()
                .find(|(from, _)| *from == c)
                .map(|(_, to)| *to)
                .unwrap_or(c)
        })
        .collect();
    SPACES_RE.replace_all(&s, " ").trim().to_string()
}

/// 部分匹配相似度 (0-100)：短串与长串中等长窗口的最佳相似度
pub fn partial_ratio(a: &str, b: &str) -> f64 {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let (short, long) = if a_chars.len() <= b_chars.len() {
        (a_chars, b_chars)
    } else {
        (b_chars, a_chars)
    };
    if short.is_empty() {
        return 0.0;
    }

    let short: String = short.into_iter().collect();
    let width = short.chars().count();
    let mut best = 0.0_f64;
    for window in long.windows(width) {
        let candidate: String = window.iter().collect();
        let score = strsim::normalized_levenshtein(&short, &candidate);
        if score > best {
            best = score;
            if best >= 1.0 {
                break;
            }
        }
    }
    best * 100.0
}

/// 候选关键字（已规整）与查询串（已规整）的最佳分数
fn best_score(candidates: &[String], normalized_query: &str) -> f64 {
    candidates
        .iter()
        .map(|c| partial_ratio(c, normalized_query))
        .fold(0.0, f64::max)
}

/// 对原始关键字与原始文本打分，两侧都会先规整
pub fn keyword_score(keywords: &[String], text: &str) -> f64 {
    let query = normalize_text(text);
    let normalized: Vec<String> = keywords.iter().map(|k| normalize_text(k)).collect();
    best_score(&normalized, &query)
}

/// 匹配结果
#[derive(Debug, Clone)]
pub struct VenueMatch {
    pub profile: Arc<VenueProfile>,
    /// 加权总分
    pub score: f64,
    pub merchant_score: f64,
    pub address_score: f64,
    /// 是否通过别名精确命中
    pub exact: bool,
}

#[derive(Debug)]
struct IndexedProfile {
    profile: Arc<VenueProfile>,
    merchant: Vec<String>,
    address: Vec<String>,
}

/// 场所档案索引
#[derive(Debug, Default)]
pub struct VenueIndex {
    entries: Vec<IndexedProfile>,
    aliases: HashMap<String, usize>,
    threshold: f64,
}

impl VenueIndex {
    pub fn new(profiles: Vec<VenueProfile>, threshold: f64) -> Self {
        let mut aliases = HashMap::new();
        let entries = profiles
            .into_iter()
            .enumerate()
            .map(|(idx, profile)| {
                for alias in profile.alias_names() {
                    let normalized = normalize_text(&alias);
                    if !normalized.is_empty() {
                        // 重复别名以后出现的档案为准
                        aliases.insert(normalized, idx);
                    }
                }
                IndexedProfile {
                    merchant: profile
                        .merchant_keywords()
                        .iter()
                        .map(|k| normalize_text(k))
                        .collect(),
                    address: profile
                        .address_keywords()
                        .iter()
                        .map(|k| normalize_text(k))
                        .collect(),
                    profile: Arc::new(profile),
                }
            })
            .collect();

        Self {
            entries,
            aliases,
            threshold,
        }
    }

    /// 从 JSON 文件加载；文件不存在时返回空索引
    pub async fn load(path: &Path, threshold: f64) -> Result<Self> {
        let raw = match tokio::fs::read_to_string(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(
                    "Venue profiles file {} not found, matching disabled",
                    path.display()
                );
                return Ok(Self::new(Vec::new(), threshold));
            }
            Err(e) => return Err(e.into()),
        };

        let profiles: Vec<VenueProfile> = serde_json::from_str(&raw).map_err(|e| {
            AppError::Config(format!("场所档案文件格式错误 {}: {}", path.display(), e))
        })?;
        info!(
            "Loaded {} venue profiles from {}",
            profiles.len(),
            path.display()
        );
        Ok(Self::new(profiles, threshold))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 查找最匹配的档案
    pub fn find_best(&self, merchant: &str, address: &str) -> Option<VenueMatch> {
        let m = normalize_text(merchant);
        let a = normalize_text(address);
        if m.is_empty() && a.is_empty() {
            return None;
        }

        if let Some(&idx) = self.aliases.get(&m) {
            let entry = &self.entries[idx];
            return Some(VenueMatch {
                profile: entry.profile.clone(),
                score: 100.0,
                merchant_score: 100.0,
                address_score: best_score(&entry.address, &a),
                exact: true,
            });
        }

        let mut best: Option<VenueMatch> = None;
        let mut best_total = 0.0;
        for entry in &self.entries {
            let merchant_score = best_score(&entry.merchant, &m);
            let address_score = best_score(&entry.address, &a);
            let total = merchant_score * MERCHANT_WEIGHT + address_score * ADDRESS_WEIGHT;
            if total > best_total {
                best_total = total;
                best = Some(VenueMatch {
                    profile: entry.profile.clone(),
                    score: total,
                    merchant_score,
                    address_score,
                    exact: false,
                });
            }
        }

        best.filter(|found| found.score >= self.threshold)
    }
}
