//! 記事本文の TF-IDF インデックスとコンテンツ類似度。
pub mod vectorizer;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{corpus::Article, util::text::tokenize};

pub use vectorizer::{SparseVector, TfidfVectorizer};

/// 既定の語彙上限。
pub const DEFAULT_MAX_FEATURES: usize = 5000;

/// コーパスの行位置ごとの TF-IDF ベクトル。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentIndex {
    vectorizer: TfidfVectorizer,
    vectors: Vec<SparseVector>,
}

impl ContentIndex {
    /// 記事の結合テキストからベクトル空間を構築する。`vectors[i]` は `articles[i]` に対応する。
    #[must_use]
    pub fn build(articles: &[Article], max_features: usize) -> Self {
        let documents: Vec<Vec<String>> = articles
            .par_iter()
            .map(|article| tokenize(&article.content_text()))
            .collect();
        let vectorizer = TfidfVectorizer::fit(&documents, max_features);
        let vectors: Vec<SparseVector> = documents
            .par_iter()
            .map(|tokens| vectorizer.transform(tokens))
            .collect();

        let empty = vectors.iter().filter(|vector| vector.is_empty()).count();
        if empty > 0 {
            tracing::warn!(empty, "articles without any in-vocabulary term");
        }

        Self {
            vectorizer,
            vectors,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    #[must_use]
    pub fn dimension(&self) -> usize {
        self.vectorizer.dimension()
    }

    #[must_use]
    pub fn vectorizer(&self) -> &TfidfVectorizer {
        &self.vectorizer
    }

    /// `row` の記事に近い順に、自身を除いた最大 `n` 件の `(row, cosine)`。
    ///
    /// 同点は行位置（コーパス順）の昇順。`row` が範囲外なら空。
    #[must_use]
    pub fn similar(&self, row: usize, n: usize) -> Vec<(usize, f32)> {
        let Some(query) = self.vectors.get(row) else {
            return Vec::new();
        };
        if n == 0 {
            return Vec::new();
        }

        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .filter(|(other, _)| *other != row)
            .map(|(other, vector)| (other, query.dot(vector).clamp(-1.0, 1.0)))
            .collect();

        let by_rank = |a: &(usize, f32), b: &(usize, f32)| {
            b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0))
        };
        if scored.len() > n {
            scored.select_nth_unstable_by(n - 1, by_rank);
            scored.truncate(n);
        }
        scored.sort_by(by_rank);
        scored
    }

    pub(crate) fn check_consistency(&self, rows: usize) -> Result<(), String> {
        if self.vectors.len() != rows {
            return Err(format!(
                "content index has {} vectors for {rows} articles",
                self.vectors.len()
            ));
        }
        if !self.vectorizer.is_well_formed() {
            return Err("vocabulary and idf tables disagree".to_string());
        }
        let dimension = self.dimension();
        if let Some(row) = self
            .vectors
            .iter()
            .position(|vector| !vector.is_well_formed(dimension))
        {
            return Err(format!("vector at row {row} is malformed for dimension {dimension}"));
        }
        Ok(())
    }
}
