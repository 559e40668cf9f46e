use std::path::Path;

use chrono::{DateTime, TimeDelta, Utc};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use super::Recommendation;
use crate::{
    artifact::{self, ArtifactError},
    content::{ContentIndex, DEFAULT_MAX_FEATURES},
    corpus::{Corpus, CorpusLoader, PrepareError},
    popularity::PopularityModel,
    util::time::{is_within, now, time_decay},
};

/// コールドスタートで「新着」とみなす期間。
pub const RECENT_WINDOW_DAYS: i64 = 2;
/// 履歴がこの件数を超えるとコンテンツ類似度を重視する。
pub const HEAVY_HISTORY_THRESHOLD: usize = 5;
const HEAVY_HISTORY_CONTENT_WEIGHT: f64 = 0.7;
const LIGHT_HISTORY_CONTENT_WEIGHT: f64 = 0.3;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("unknown article: {0}")]
    UnknownArticle(String),
    #[error("unknown user: {0}")]
    UnknownUser(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrepareOptions {
    pub max_features: usize,
}

impl Default for PrepareOptions {
    fn default() -> Self {
        Self {
            max_features: DEFAULT_MAX_FEATURES,
        }
    }
}

/// 準備済みの推薦エンジンの状態。構築後は変更されない。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    corpus: Corpus,
    content: ContentIndex,
    popularity: PopularityModel,
    prepared_at: DateTime<Utc>,
}

impl Snapshot {
    /// コーパスディレクトリを読み込み、TF-IDF と人気スコアを計算する。
    ///
    /// # Errors
    /// 記事またはユーザーのパーティションがない場合は [`PrepareError::MissingInputData`]。
    pub fn prepare(dir: &Path) -> Result<Self, PrepareError> {
        Self::prepare_with(dir, &PrepareOptions::default(), now())
    }

    /// `now` を基準時刻として準備する（公開日時の既定値と人気スコアの減衰に使う）。
    ///
    /// # Errors
    /// [`CorpusLoader::load`] のエラーをそのまま返す。
    pub fn prepare_with(
        dir: &Path,
        options: &PrepareOptions,
        now: DateTime<Utc>,
    ) -> Result<Self, PrepareError> {
        info!(dir = %dir.display(), "preparing recommender snapshot");
        let corpus = CorpusLoader::new(now).load(dir)?;
        Ok(Self::from_corpus(corpus, options, now))
    }

    #[must_use]
    pub fn from_corpus(corpus: Corpus, options: &PrepareOptions, now: DateTime<Utc>) -> Self {
        let content = ContentIndex::build(corpus.articles(), options.max_features);
        let popularity = PopularityModel::fit(&corpus, now);
        info!(
            articles = corpus.articles().len(),
            users = corpus.users().len(),
            dimension = content.dimension(),
            scored_articles = popularity.len(),
            "snapshot prepared"
        );
        Self {
            corpus,
            content,
            popularity,
            prepared_at: now,
        }
    }

    #[must_use]
    pub fn corpus(&self) -> &Corpus {
        &self.corpus
    }

    #[must_use]
    pub fn content(&self) -> &ContentIndex {
        &self.content
    }

    #[must_use]
    pub fn popularity(&self) -> &PopularityModel {
        &self.popularity
    }

    #[must_use]
    pub fn prepared_at(&self) -> DateTime<Utc> {
        self.prepared_at
    }

    /// # Errors
    /// エンコードに失敗した場合は [`ArtifactError::Encode`]。
    pub fn to_bytes(&self) -> Result<Vec<u8>, ArtifactError> {
        artifact::serialize(self)
    }

    /// # Errors
    /// 構造が壊れている、またはフォーマットのバージョンが異なる場合はエラー。
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ArtifactError> {
        artifact::deserialize(bytes)
    }

    /// ユーザー向けの推薦。失敗しない。
    ///
    /// 履歴がなければコールドスタート、未知のユーザーや欠損データもコールドスタートに落とす。
    #[must_use]
    pub fn recommend_for_user(&self, user_id: &str, n: usize) -> Vec<Recommendation> {
        self.recommend_for_user_at(user_id, n, now())
    }

    #[must_use]
    pub fn recommend_for_user_at(
        &self,
        user_id: &str,
        n: usize,
        now: DateTime<Utc>,
    ) -> Vec<Recommendation> {
        match self.personalized(user_id, n, now) {
            Ok(Some(recommendations)) => recommendations,
            Ok(None) => self.cold_start(n, now),
            Err(error) => {
                warn!(user_id, %error, "falling back to cold-start recommendations");
                self.cold_start(n, now)
            }
        }
    }

    /// 人気順の上位 `n` 件。
    #[must_use]
    pub fn recommend_popular(&self, n: usize) -> Vec<Recommendation> {
        self.popularity
            .top(n)
            .into_iter()
            .filter_map(|(page, score)| {
                self.corpus
                    .article(page)
                    .map(|article| Recommendation::from_article(article, score))
            })
            .collect()
    }

    /// `article_id` に内容が近い記事。未知の記事なら空。
    #[must_use]
    pub fn recommend_similar(&self, article_id: &str, n: usize) -> Vec<Recommendation> {
        self.similar_articles(article_id, n).unwrap_or_else(|error| {
            warn!(article_id, %error, "content similarity query failed");
            Vec::new()
        })
    }

    /// # Errors
    /// `article_id` がインデックスにない場合は [`QueryError::UnknownArticle`]。
    pub fn similar_articles(
        &self,
        article_id: &str,
        n: usize,
    ) -> Result<Vec<Recommendation>, QueryError> {
        let row = self
            .corpus
            .article_row(article_id)
            .ok_or_else(|| QueryError::UnknownArticle(article_id.to_string()))?;
        let articles = self.corpus.articles();
        Ok(self
            .content
            .similar(row, n)
            .into_iter()
            .map(|(other, score)| Recommendation::from_article(&articles[other], f64::from(score)))
            .collect())
    }

    /// 履歴のないユーザー向けのブレンド。
    ///
    /// 直近 2 日の記事と全期間から、それぞれ人気順に `n / 2` 件（切り捨て）を取り、
    /// 先に出たものを残して重複を除く。奇数の `n` では結果が `n` 件に満たない。
    #[must_use]
    pub fn cold_start(&self, n: usize, now: DateTime<Utc>) -> Vec<Recommendation> {
        let window = TimeDelta::days(RECENT_WINDOW_DAYS);
        let articles = self.corpus.articles();

        let recent = self.top_by_popularity(
            (0..articles.len()).filter(|&row| is_within(now, articles[row].published_at, window)),
            n / 2,
        );
        let all_time = self.top_by_popularity(0..articles.len(), n / 2);

        let mut seen: FxHashSet<&str> = FxHashSet::default();
        let mut recommendations = Vec::with_capacity(n);
        for row in recent.into_iter().chain(all_time) {
            let article = &articles[row];
            if seen.insert(article.page.as_str()) {
                recommendations.push(Recommendation::from_article(
                    article,
                    self.popularity.score_or_zero(&article.page),
                ));
            }
        }
        recommendations.truncate(n);
        recommendations
    }

    /// 履歴に基づく推薦。履歴が空なら `Ok(None)`。
    ///
    /// 最後に読んだ記事を起点にしたコンテンツ候補、続いて人気候補を順に見て、
    /// 既読を除きながら `n` 件集める。スコアには出所ごとの重みと公開日時の減衰をかける。
    ///
    /// # Errors
    /// 未知のユーザーは [`QueryError::UnknownUser`]、候補の記事が見つからない場合は
    /// [`QueryError::UnknownArticle`]。
    pub fn personalized(
        &self,
        user_id: &str,
        n: usize,
        now: DateTime<Utc>,
    ) -> Result<Option<Vec<Recommendation>>, QueryError> {
        let user = self
            .corpus
            .user(user_id)
            .ok_or_else(|| QueryError::UnknownUser(user_id.to_string()))?;
        let Some(seed) = user.last_visited() else {
            return Ok(None);
        };

        let content_weight = if user.history_size() > HEAVY_HISTORY_THRESHOLD {
            HEAVY_HISTORY_CONTENT_WEIGHT
        } else {
            LIGHT_HISTORY_CONTENT_WEIGHT
        };

        let content_candidates = self.similar_articles(seed, n).unwrap_or_else(|error| {
            warn!(user_id, %error, "history seed is not indexed, using popularity only");
            Vec::new()
        });
        let popular_candidates = self.recommend_popular(n);

        let mut seen: FxHashSet<String> = user.history.iter().cloned().collect();
        let mut merged: Vec<Recommendation> = Vec::with_capacity(n);
        let candidates = content_candidates
            .into_iter()
            .map(|candidate| (candidate, content_weight))
            .chain(
                popular_candidates
                    .into_iter()
                    .map(|candidate| (candidate, 1.0 - content_weight)),
            );
        for (mut candidate, weight) in candidates {
            if merged.len() >= n {
                break;
            }
            if seen.contains(&candidate.article_id) {
                continue;
            }
            let article = self
                .corpus
                .article(&candidate.article_id)
                .ok_or_else(|| QueryError::UnknownArticle(candidate.article_id.clone()))?;
            candidate.score *= weight * time_decay(now, article.published_at);
            seen.insert(candidate.article_id.clone());
            merged.push(candidate);
        }

        // sort_by は安定ソートなので同点は候補の順序を保つ
        merged.sort_by(|a, b| b.score.total_cmp(&a.score));
        merged.truncate(n);
        Ok(Some(merged))
    }

    /// `rows` を人気スコア降順（同点は記事ID昇順）に並べた上位 `k` 行。
    fn top_by_popularity(&self, rows: impl Iterator<Item = usize>, k: usize) -> Vec<usize> {
        if k == 0 {
            return Vec::new();
        }
        let articles = self.corpus.articles();
        let mut scored: Vec<(usize, f64)> = rows
            .map(|row| (row, self.popularity.score_or_zero(&articles[row].page)))
            .collect();

        let by_rank = |a: &(usize, f64), b: &(usize, f64)| {
            b.1.total_cmp(&a.1)
                .then_with(|| articles[a.0].page.cmp(&articles[b.0].page))
        };
        if scored.len() > k {
            scored.select_nth_unstable_by(k - 1, by_rank);
            scored.truncate(k);
        }
        scored.sort_by(by_rank);
        scored.into_iter().map(|(row, _)| row).collect()
    }

    pub(crate) fn check_consistency(&self) -> Result<(), String> {
        self.corpus.check_consistency()?;
        self.content.check_consistency(self.corpus.articles().len())?;
        self.popularity.check_consistency()
    }
}
