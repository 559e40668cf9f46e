//! 閲覧履歴から時間減衰付きの人気スコアを算出する。
use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::{corpus::Corpus, util::time::time_decay};

/// 記事ごとの正規化済み人気スコア（0, 1]。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PopularityModel {
    scores: FxHashMap<String, f64>,
    /// スコア降順、同点は記事ID昇順。
    ranking: Vec<String>,
}

impl PopularityModel {
    /// 全ユーザーの閲覧履歴を集計し、公開日時による減衰をかけて最大値で正規化する。
    ///
    /// コーパスに存在しない記事IDへの閲覧はスキップし、件数だけログに残す。
    #[must_use]
    pub fn fit(corpus: &Corpus, now: DateTime<Utc>) -> Self {
        let mut view_counts: FxHashMap<&str, u64> = FxHashMap::default();
        for user in corpus.users() {
            for page in &user.history {
                *view_counts.entry(page.as_str()).or_insert(0) += 1;
            }
        }

        let mut scores: FxHashMap<String, f64> = FxHashMap::default();
        let mut unknown_articles = 0usize;
        let mut unknown_views = 0u64;
        for (page, count) in view_counts {
            let Some(article) = corpus.article(page) else {
                unknown_articles += 1;
                unknown_views += count;
                continue;
            };
            #[allow(clippy::cast_precision_loss)]
            let weighted = count as f64 * time_decay(now, article.published_at);
            scores.insert(page.to_string(), weighted);
        }
        if unknown_articles > 0 {
            tracing::warn!(
                unknown_articles,
                unknown_views,
                "history references articles missing from the corpus, skipped"
            );
        }

        let max = scores.values().copied().fold(0.0_f64, f64::max);
        if max > 0.0 {
            for score in scores.values_mut() {
                *score /= max;
            }
        }

        let mut ranking: Vec<String> = scores.keys().cloned().collect();
        ranking.sort_by(|a, b| scores[b].total_cmp(&scores[a]).then_with(|| a.cmp(b)));

        tracing::info!(scored_articles = scores.len(), "popularity scores computed");
        Self { scores, ranking }
    }

    #[must_use]
    pub fn score(&self, page: &str) -> Option<f64> {
        self.scores.get(page).copied()
    }

    /// 閲覧のなかった記事は 0。
    #[must_use]
    pub fn score_or_zero(&self, page: &str) -> f64 {
        self.score(page).unwrap_or(0.0)
    }

    /// 上位 `n` 件の `(記事ID, スコア)`。
    #[must_use]
    pub fn top(&self, n: usize) -> Vec<(&str, f64)> {
        self.ranking
            .iter()
            .take(n)
            .map(|page| (page.as_str(), self.scores[page]))
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.scores.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    pub(crate) fn check_consistency(&self) -> Result<(), String> {
        if self.ranking.len() != self.scores.len() {
            return Err(format!(
                "popularity ranking has {} entries for {} scores",
                self.ranking.len(),
                self.scores.len()
            ));
        }
        if let Some(page) = self.ranking.iter().find(|page| !self.scores.contains_key(*page)) {
            return Err(format!("ranked article {page} has no score"));
        }
        if let Some((page, score)) = self
            .scores
            .iter()
            .find(|(_, score)| !(**score > 0.0 && **score <= 1.0))
        {
            return Err(format!("popularity score {score} of {page} is outside (0, 1]"));
        }
        Ok(())
    }
}
