//! TF-IDF ベクトライザと疎ベクトル。
use std::collections::BTreeMap;

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

/// インデックス昇順に並んだ疎ベクトル。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SparseVector {
    indices: Vec<u32>,
    values: Vec<f32>,
}

impl SparseVector {
    #[must_use]
    pub fn nnz(&self) -> usize {
        self.indices.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// 内積。両方とも L2 正規化済みならコサイン類似度になる。
    #[must_use]
    pub fn dot(&self, other: &Self) -> f32 {
        let (mut i, mut j) = (0, 0);
        let mut sum = 0.0f32;
        while i < self.indices.len() && j < other.indices.len() {
            match self.indices[i].cmp(&other.indices[j]) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    sum += self.values[i] * other.values[j];
                    i += 1;
                    j += 1;
                }
            }
        }
        sum
    }

    fn l2_normalize(&mut self) {
        let norm = self.values.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut self.values {
                *value /= norm;
            }
        }
    }

    /// インデックスが昇順かつ `dimension` 未満であること。
    pub(crate) fn is_well_formed(&self, dimension: usize) -> bool {
        self.indices.len() == self.values.len()
            && self.indices.windows(2).all(|pair| pair[0] < pair[1])
            && self
                .indices
                .last()
                .is_none_or(|&last| (last as usize) < dimension)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TfidfVectorizer {
    vocabulary: Vec<String>,
    vocab_index: FxHashMap<String, u32>,
    idf: Vec<f32>,
}

impl TfidfVectorizer {
    /// コーパスから語彙と IDF を学習する。
    ///
    /// # Arguments
    /// * `documents` - トークン化済みの文書
    /// * `max_features` - 語彙の上限（文書頻度の高い順に採用）
    #[must_use]
    pub fn fit(documents: &[Vec<String>], max_features: usize) -> Self {
        // 1. 文書頻度（DF）
        let mut doc_freq: FxHashMap<&str, usize> = FxHashMap::default();
        for tokens in documents {
            let unique: FxHashSet<&str> = tokens.iter().map(String::as_str).collect();
            for token in unique {
                *doc_freq.entry(token).or_insert(0) += 1;
            }
        }
        let unique_terms = doc_freq.len();

        // 2. DF降順、同点は語の辞書順で上位 max_features 個
        let mut ranked: Vec<(&str, usize)> = doc_freq.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranked.truncate(max_features);

        // 3. IDF(t) = ln((N + 1) / (DF(t) + 1)) + 1
        #[allow(clippy::cast_precision_loss)]
        let n = documents.len() as f32;
        let mut vocabulary = Vec::with_capacity(ranked.len());
        let mut vocab_index = FxHashMap::default();
        let mut idf = Vec::with_capacity(ranked.len());
        for (position, (term, df)) in ranked.into_iter().enumerate() {
            #[allow(clippy::cast_precision_loss)]
            let df = df as f32;
            idf.push(((n + 1.0) / (df + 1.0)).ln() + 1.0);
            #[allow(clippy::cast_possible_truncation)]
            vocab_index.insert(term.to_string(), position as u32);
            vocabulary.push(term.to_string());
        }

        tracing::info!(
            documents = documents.len(),
            unique_terms,
            vocabulary = vocabulary.len(),
            max_features,
            "tf-idf vocabulary fitted"
        );

        Self {
            vocabulary,
            vocab_index,
            idf,
        }
    }

    /// 語彙サイズ＝ベクトルの次元。
    #[must_use]
    pub fn dimension(&self) -> usize {
        self.idf.len()
    }

    #[must_use]
    pub fn vocabulary(&self) -> &[String] {
        &self.vocabulary
    }

    #[must_use]
    pub fn idf(&self, term: &str) -> Option<f32> {
        self.vocab_index
            .get(term)
            .map(|&index| self.idf[index as usize])
    }

    /// トークン列を L2 正規化済みの TF-IDF ベクトルに変換する。語彙外のトークンは無視する。
    #[must_use]
    pub fn transform(&self, tokens: &[String]) -> SparseVector {
        let mut counts: BTreeMap<u32, f32> = BTreeMap::new();
        for token in tokens {
            if let Some(&index) = self.vocab_index.get(token.as_str()) {
                *counts.entry(index).or_insert(0.0) += 1.0;
            }
        }

        let mut vector = SparseVector {
            indices: Vec::with_capacity(counts.len()),
            values: Vec::with_capacity(counts.len()),
        };
        for (index, count) in counts {
            vector.indices.push(index);
            vector.values.push(count * self.idf[index as usize]);
        }
        vector.l2_normalize();
        vector
    }

    pub(crate) fn is_well_formed(&self) -> bool {
        self.vocabulary.len() == self.idf.len()
            && self.vocab_index.len() == self.vocabulary.len()
            && self
                .vocabulary
                .iter()
                .enumerate()
                .all(|(position, term)| {
                    self.vocab_index.get(term).map(|&i| i as usize) == Some(position)
                })
    }
}
